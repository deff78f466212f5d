//! Docker-backed container runtime.
//!
//! Note: bollard talks to the local daemon socket (or `DOCKER_HOST`). The
//! connection is verified with a ping at construction.

use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, InspectContainerOptions, LogsOptions, RemoveContainerOptions,
    StartContainerOptions, StopContainerOptions,
};
use bollard::errors::Error as BollardError;
use bollard::image::CreateImageOptions;
use bollard::models::{ContainerState, DeviceRequest, HostConfig};
use bollard::Docker;
use futures::TryStreamExt;
use tracing::{debug, info, warn};

use super::{ContainerHandle, ContainerRuntime, RunRequest, RuntimeError};
use crate::error::{DeployError, DeployResult};

/// Container runtime backed by the Docker Engine API.
#[derive(Debug, Clone)]
pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    /// Connect to the Docker daemon named by `DOCKER_HOST` (the local socket
    /// when unset) and check it responds.
    pub async fn connect() -> DeployResult<Self> {
        let docker = Docker::connect_with_defaults()
            .map_err(|err| DeployError::RuntimeUnavailable(err.to_string()))?;

        docker
            .ping()
            .await
            .map_err(|err| DeployError::RuntimeUnavailable(err.to_string()))?;

        info!("Connected to Docker daemon");

        Ok(Self { docker })
    }

    /// Wrap an existing client without pinging it.
    pub fn from_client(docker: Docker) -> Self {
        Self { docker }
    }

    async fn inspect_name(&self, id: &str) -> Option<String> {
        self.docker
            .inspect_container(id, None::<InspectContainerOptions>)
            .await
            .ok()
            .and_then(|inspect| inspect.name)
            .map(|name| name.trim_start_matches('/').to_string())
    }
}

fn runtime_error(err: BollardError) -> RuntimeError {
    RuntimeError::new(err.to_string())
}

fn is_status(err: &BollardError, code: u16) -> bool {
    matches!(err, BollardError::DockerResponseServerError { status_code, .. } if *status_code == code)
}

/// Status string exactly as the engine reports it; empty when it reports none.
fn status_text(state: Option<ContainerState>) -> String {
    state
        .and_then(|state| state.status)
        .map(|status| status.to_string())
        .unwrap_or_default()
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn prepare_image(&self, image: &str) -> Result<(), RuntimeError> {
        if self.docker.inspect_image(image).await.is_ok() {
            return Ok(());
        }

        info!(image = %image, "Pulling model image");

        let options = Some(CreateImageOptions {
            from_image: image.to_string(),
            ..Default::default()
        });
        let mut stream = self.docker.create_image(options, None, None);
        while let Some(_progress) = stream.try_next().await.map_err(runtime_error)? {}

        debug!(image = %image, "Model image pulled");
        Ok(())
    }

    async fn run(&self, request: RunRequest) -> Result<ContainerHandle, RuntimeError> {
        let device_requests = request.gpu.as_ref().map(|gpu| {
            vec![DeviceRequest {
                count: Some(gpu.count),
                capabilities: Some(gpu.capabilities.clone()),
                ..Default::default()
            }]
        });

        let host_config = HostConfig {
            auto_remove: Some(request.auto_remove),
            network_mode: Some(request.network.clone()),
            device_requests,
            ..Default::default()
        };

        let env: Vec<String> = request
            .environment
            .iter()
            .map(|(key, value)| format!("{}={}", key, value))
            .collect();

        let config = Config {
            image: Some(request.image.clone()),
            env: Some(env),
            host_config: Some(host_config),
            attach_stdout: Some(!request.detach),
            attach_stderr: Some(!request.detach),
            ..Default::default()
        };

        let create = self
            .docker
            .create_container(
                Some(CreateContainerOptions {
                    name: request.name.clone(),
                    platform: None,
                }),
                config,
            )
            .await
            .map_err(runtime_error)?;

        for warning in &create.warnings {
            warn!(container_name = %request.name, warning = %warning, "Docker create warning");
        }

        if let Err(err) = self
            .docker
            .start_container(&create.id, None::<StartContainerOptions<String>>)
            .await
        {
            let _ = self
                .docker
                .remove_container(
                    &create.id,
                    Some(RemoveContainerOptions {
                        force: true,
                        v: true,
                        ..Default::default()
                    }),
                )
                .await;
            return Err(runtime_error(err));
        }

        let name = self
            .inspect_name(&create.id)
            .await
            .unwrap_or_else(|| request.name.clone());

        debug!(container_id = %create.id, container_name = %name, "Container started");

        Ok(ContainerHandle {
            id: create.id,
            name,
        })
    }

    async fn get(&self, name: &str) -> Result<Option<ContainerHandle>, RuntimeError> {
        match self
            .docker
            .inspect_container(name, None::<InspectContainerOptions>)
            .await
        {
            Ok(inspect) => Ok(Some(ContainerHandle {
                id: inspect.id.unwrap_or_else(|| name.to_string()),
                name: inspect
                    .name
                    .map(|n| n.trim_start_matches('/').to_string())
                    .unwrap_or_else(|| name.to_string()),
            })),
            Err(err) if is_status(&err, 404) => Ok(None),
            Err(err) => Err(runtime_error(err)),
        }
    }

    async fn stop(&self, handle: &ContainerHandle) -> Result<(), RuntimeError> {
        match self
            .docker
            .stop_container(&handle.id, None::<StopContainerOptions>)
            .await
        {
            Ok(()) => Ok(()),
            // 304: already stopped
            Err(err) if is_status(&err, 304) => Ok(()),
            Err(err) => Err(runtime_error(err)),
        }
    }

    async fn remove(&self, name: &str) -> Result<(), RuntimeError> {
        let options = Some(RemoveContainerOptions {
            force: true,
            v: true,
            ..Default::default()
        });

        match self.docker.remove_container(name, options).await {
            Ok(()) => Ok(()),
            // 404: already gone
            Err(err) if is_status(&err, 404) => Ok(()),
            // 409: removal already in progress (auto_remove)
            Err(err) if is_status(&err, 409) => Ok(()),
            Err(err) => Err(runtime_error(err)),
        }
    }

    async fn logs(&self, handle: &ContainerHandle) -> Result<Vec<u8>, RuntimeError> {
        let options = LogsOptions::<String> {
            stdout: true,
            stderr: true,
            follow: false,
            tail: "all".to_string(),
            ..Default::default()
        };

        let mut stream = self.docker.logs(&handle.id, Some(options));
        let mut buffer = Vec::new();
        while let Some(output) = stream.try_next().await.map_err(runtime_error)? {
            buffer.extend_from_slice(&output.into_bytes());
        }
        Ok(buffer)
    }

    async fn status(&self, handle: &ContainerHandle) -> Result<String, RuntimeError> {
        let inspect = self
            .docker
            .inspect_container(&handle.id, None::<InspectContainerOptions>)
            .await
            .map_err(runtime_error)?;

        Ok(status_text(inspect.state))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bollard::models::ContainerStateStatusEnum;
    use std::collections::BTreeMap;
    use std::env;

    async fn docker_available() -> bool {
        if env::var("MLIL_DOCKER_TESTS").ok().as_deref() != Some("1") {
            return false;
        }

        match Docker::connect_with_defaults() {
            Ok(client) => client.ping().await.is_ok(),
            Err(_) => false,
        }
    }

    fn state(status: ContainerStateStatusEnum) -> Option<ContainerState> {
        Some(ContainerState {
            status: Some(status),
            ..Default::default()
        })
    }

    #[test]
    fn test_status_reported_verbatim() {
        assert_eq!(status_text(state(ContainerStateStatusEnum::RUNNING)), "running");
        assert_eq!(status_text(state(ContainerStateStatusEnum::EXITED)), "exited");
        assert_eq!(status_text(state(ContainerStateStatusEnum::RESTARTING)), "restarting");
        assert_eq!(status_text(state(ContainerStateStatusEnum::EMPTY)), "");
        assert_eq!(status_text(Some(ContainerState::default())), "");
        assert_eq!(status_text(None), "");
    }

    #[tokio::test]
    async fn test_run_get_stop() {
        if !docker_available().await {
            return;
        }
        let runtime = DockerRuntime::connect().await.expect("docker reachable");

        runtime
            .prepare_image("alpine:latest")
            .await
            .expect("Failed to pull image");

        let handle = runtime
            .run(RunRequest {
                image: "alpine:latest".to_string(),
                name: "mlil-runtime-test".to_string(),
                network: "bridge".to_string(),
                environment: BTreeMap::from([("MODEL_URI".to_string(), "models:/m/1".to_string())]),
                detach: true,
                auto_remove: true,
                gpu: None,
            })
            .await
            .expect("Failed to run container");
        assert_eq!(handle.name, "mlil-runtime-test");

        let found = runtime.get("mlil-runtime-test").await.unwrap();
        assert!(found.is_some());

        runtime.stop(&handle).await.expect("Failed to stop container");
        runtime
            .remove("mlil-runtime-test")
            .await
            .expect("removing a stopped container succeeds");
    }

    #[tokio::test]
    async fn test_get_missing_is_none() {
        if !docker_available().await {
            return;
        }
        let runtime = DockerRuntime::connect().await.expect("docker reachable");

        let found = runtime.get("mlil-definitely-not-a-container").await.unwrap();
        assert!(found.is_none());
    }
}
