//! Deployment registry and lifecycle manager.
//!
//! This module handles:
//! - Starting model containers and recording them in the registry
//! - Stopping containers by model triple
//! - Forwarding status and log queries to the runtime
//!
//! The registry only records what was last started successfully. It is never
//! mutated after a failed runtime call, so an entry means "we asked the
//! runtime to create this", not "the runtime currently has this".

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::{ManagerConfig, ResolvedConfig};
use crate::error::{DeployError, DeployResult};
use crate::model::{DeployedModel, ModelKey};
use crate::runtime::{
    ContainerHandle, ContainerRuntime, DockerRuntime, GpuRequest, RunRequest, RuntimeError,
};

/// Environment keys passed to every model container.
pub const ENV_CONTAINER_MODEL_URI: &str = "MODEL_URI";
pub const ENV_CONTAINER_MODEL_FLAVOR: &str = "MODEL_FLAVOR";
pub const ENV_CONTAINER_TRACKING_URI: &str = "MLFLOW_TRACKING_URI";

/// Manages deployed model containers.
///
/// The registry lock is held for the whole of each operation, so lookups
/// followed by runtime calls and registry updates are atomic with respect to
/// other callers sharing the manager.
pub struct ModelManager {
    /// Deployed models, in deployment order
    models: Mutex<Vec<DeployedModel>>,
    /// Container runtime
    runtime: Arc<dyn ContainerRuntime>,
    config: ResolvedConfig,
}

impl std::fmt::Debug for ModelManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelManager")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ModelManager {
    /// Resolve `config` and connect to the Docker daemon.
    pub async fn connect(config: ManagerConfig) -> DeployResult<Self> {
        let resolved = config.resolve()?;
        let runtime = DockerRuntime::connect().await?;
        Ok(Self::from_parts(Arc::new(runtime), resolved))
    }

    /// Build a manager over an existing runtime.
    pub fn with_runtime(
        config: ManagerConfig,
        runtime: Arc<dyn ContainerRuntime>,
    ) -> DeployResult<Self> {
        let resolved = config.resolve()?;
        Ok(Self::from_parts(runtime, resolved))
    }

    pub fn from_parts(runtime: Arc<dyn ContainerRuntime>, config: ResolvedConfig) -> Self {
        info!(
            image = %config.model_image,
            network = %config.model_network,
            tracking_uri = %config.tracking_uri,
            port = config.model_port,
            "Model manager initialized"
        );

        Self {
            models: Mutex::new(Vec::new()),
            runtime,
            config,
        }
    }

    pub fn config(&self) -> &ResolvedConfig {
        &self.config
    }

    /// Deploy a containerized model.
    ///
    /// # Arguments
    /// * `model_uri` - URI of the model in the tracking service
    /// * `model_name` - Name of the model
    /// * `model_flavor` - Flavor of the model
    /// * `model_version_or_alias` - Version or alias of the model
    /// * `use_gpu` - Give the container access to every available GPU
    ///
    /// # Returns
    /// The registry entry for the started container
    pub async fn deploy_model(
        &self,
        model_uri: &str,
        model_name: &str,
        model_flavor: &str,
        model_version_or_alias: &str,
        use_gpu: bool,
    ) -> DeployResult<DeployedModel> {
        let key = ModelKey::new(model_name, model_flavor, model_version_or_alias);
        let request = self.run_request(&key, model_uri, use_gpu);
        let container_name = request.name.clone();

        // Pulling touches no registry state, so it runs before taking the lock
        self.bounded_by(
            self.config.image_pull_timeout,
            self.runtime.prepare_image(&request.image),
        )
        .await
        .map_err(|err| DeployError::Deployment(err.to_string()))?;

        let mut models = self.models.lock().await;

        if models.iter().any(|m| m.matches(&key)) {
            warn!(model = %key, "Model already registered, deploying another container");
        }

        info!(
            model = %key,
            container_name = %request.name,
            image = %request.image,
            use_gpu = use_gpu,
            "Deploying model"
        );

        let handle = match self.bounded(self.runtime.run(request)).await {
            Ok(handle) => handle,
            Err(err) => {
                // A timed-out start may still have created the container
                if err.is_timeout() {
                    self.discard_container(&container_name).await;
                }
                return Err(DeployError::Deployment(err.to_string()));
            }
        };

        let deployed = DeployedModel::new(key, handle.name);
        models.push(deployed.clone());

        debug!(container_name = %deployed.container_name, registered = models.len(), "Model deployed");

        Ok(deployed)
    }

    /// Stop a deployed model's container and drop it from the registry.
    pub async fn remove_deployed_model(
        &self,
        model_name: &str,
        model_flavor: &str,
        model_version_or_alias: &str,
    ) -> DeployResult<()> {
        let key = ModelKey::new(model_name, model_flavor, model_version_or_alias);
        let mut models = self.models.lock().await;
        self.remove_locked(&mut models, &key).await
    }

    /// Remove every deployed model.
    ///
    /// Stops at the first failure. The error lists the models removed before
    /// it; the failing entry and everything after it stay registered.
    ///
    /// # Returns
    /// The triples that were removed, in registry order
    pub async fn remove_all_models(&self) -> DeployResult<Vec<ModelKey>> {
        let mut models = self.models.lock().await;
        let snapshot: Vec<ModelKey> = models.iter().map(DeployedModel::key).collect();
        let mut removed = Vec::with_capacity(snapshot.len());

        for key in snapshot {
            // Already removed as a duplicate of an earlier entry
            if !models.iter().any(|m| m.matches(&key)) {
                continue;
            }

            if let Err(err) = self.remove_locked(&mut models, &key).await {
                warn!(model = %key, removed = removed.len(), error = %err, "Bulk removal aborted");
                return Err(DeployError::PartialRemoval {
                    removed,
                    failed: key,
                    source: Box::new(err),
                });
            }
            removed.push(key);
        }

        info!(removed = removed.len(), "All models removed");

        Ok(removed)
    }

    /// Current runtime status of a deployed model's container.
    pub async fn get_model_status(
        &self,
        model_name: &str,
        model_flavor: &str,
        model_version_or_alias: &str,
    ) -> DeployResult<String> {
        let key = ModelKey::new(model_name, model_flavor, model_version_or_alias);
        let models = self.models.lock().await;
        let container_name = find_container(&models, &key)?;
        let handle = self.resolve(&container_name).await?;

        self.bounded(self.runtime.status(&handle))
            .await
            .map_err(|err| DeployError::Runtime(err.to_string()))
    }

    /// Full log output of a deployed model's container.
    pub async fn get_model_logs(
        &self,
        model_name: &str,
        model_flavor: &str,
        model_version_or_alias: &str,
    ) -> DeployResult<String> {
        let key = ModelKey::new(model_name, model_flavor, model_version_or_alias);
        let models = self.models.lock().await;
        let container_name = find_container(&models, &key)?;
        let handle = self.resolve(&container_name).await?;

        let bytes = self
            .bounded(self.runtime.logs(&handle))
            .await
            .map_err(|err| DeployError::Runtime(err.to_string()))?;

        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Snapshot of the registry.
    pub async fn list_deployed_models(&self) -> Vec<DeployedModel> {
        self.models.lock().await.clone()
    }

    fn run_request(&self, key: &ModelKey, model_uri: &str, use_gpu: bool) -> RunRequest {
        let environment = BTreeMap::from([
            (ENV_CONTAINER_MODEL_URI.to_string(), model_uri.to_string()),
            (ENV_CONTAINER_MODEL_FLAVOR.to_string(), key.model_flavor.clone()),
            (
                ENV_CONTAINER_TRACKING_URI.to_string(),
                self.config.tracking_uri.clone(),
            ),
        ]);

        RunRequest {
            image: self.config.model_image.clone(),
            name: key.container_name(),
            network: self.config.model_network.clone(),
            environment,
            detach: true,
            auto_remove: true,
            gpu: use_gpu.then(GpuRequest::all),
        }
    }

    async fn remove_locked(
        &self,
        models: &mut Vec<DeployedModel>,
        key: &ModelKey,
    ) -> DeployResult<()> {
        let container_name = find_container(models, key)?;
        let handle = self.resolve(&container_name).await?;

        info!(model = %key, container_name = %container_name, "Stopping model container");

        self.bounded(self.runtime.stop(&handle))
            .await
            .map_err(|err| DeployError::Stop(err.to_string()))?;

        let before = models.len();
        models.retain(|m| m.container_name != container_name);

        debug!(
            container_name = %container_name,
            dropped = before - models.len(),
            "Model removed"
        );

        Ok(())
    }

    /// Best-effort removal of a container that never made it into the
    /// registry.
    async fn discard_container(&self, container_name: &str) {
        match self.bounded(self.runtime.remove(container_name)).await {
            Ok(()) => info!(container_name = %container_name, "Discarded unregistered container"),
            Err(err) => warn!(
                container_name = %container_name,
                error = %err,
                "Failed to discard unregistered container"
            ),
        }
    }

    async fn resolve(&self, container_name: &str) -> DeployResult<ContainerHandle> {
        let handle = self
            .bounded(self.runtime.get(container_name))
            .await
            .map_err(|err| DeployError::Runtime(err.to_string()))?;

        handle.ok_or_else(|| {
            warn!(container_name = %container_name, "Registered container missing from runtime");
            DeployError::NotFound(container_name.to_string())
        })
    }

    async fn bounded<T, F>(&self, call: F) -> Result<T, RuntimeError>
    where
        F: Future<Output = Result<T, RuntimeError>>,
    {
        self.bounded_by(self.config.runtime_timeout, call).await
    }

    async fn bounded_by<T, F>(&self, limit: Duration, call: F) -> Result<T, RuntimeError>
    where
        F: Future<Output = Result<T, RuntimeError>>,
    {
        tokio::time::timeout(limit, call)
            .await
            .unwrap_or_else(|_| Err(RuntimeError::timeout(limit)))
    }
}

/// Container name of the first entry matching `key`.
fn find_container(models: &[DeployedModel], key: &ModelKey) -> DeployResult<String> {
    models
        .iter()
        .find(|m| m.matches(key))
        .map(|m| m.container_name.clone())
        .ok_or_else(|| DeployError::NotFound(key.to_string()))
}
