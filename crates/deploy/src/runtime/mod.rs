//! Container runtime capability consumed by the model manager.
//!
//! Any orchestration API that can run, look up, stop, read logs from and
//! report the status of a container by name can back the manager.

mod docker;
pub mod mock;

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub use docker::DockerRuntime;
pub use mock::MockRuntime;

/// Failure of a container runtime call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuntimeError {
    /// The runtime rejected the call. The message is the runtime's own
    /// detail, passed through unchanged.
    #[error("{0}")]
    Failed(String),

    /// The call did not finish within its time limit. Whatever it started
    /// may still have taken effect.
    #[error("runtime call timed out after {} ms", .0.as_millis())]
    Timeout(Duration),
}

impl RuntimeError {
    pub fn new(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }

    pub fn timeout(limit: Duration) -> Self {
        Self::Timeout(limit)
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

/// GPU devices requested for a container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GpuRequest {
    /// Number of devices; -1 requests every available device
    pub count: i64,
    /// Device capabilities, e.g. `[["gpu"]]`
    pub capabilities: Vec<Vec<String>>,
}

impl GpuRequest {
    /// Every available GPU device.
    pub fn all() -> Self {
        Self {
            count: -1,
            capabilities: vec![vec!["gpu".to_string()]],
        }
    }
}

/// Parameters for starting a container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRequest {
    pub image: String,
    pub name: String,
    pub network: String,
    pub environment: BTreeMap<String, String>,
    /// Return as soon as the container is started
    pub detach: bool,
    /// Remove the container once it stops
    pub auto_remove: bool,
    pub gpu: Option<GpuRequest>,
}

/// Reference to a container known to the runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerHandle {
    /// Runtime-assigned identifier
    pub id: String,
    /// Container name as reported by the runtime
    pub name: String,
}

/// Operations the model manager needs from a container runtime.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Make `image` available locally, fetching it if needed.
    ///
    /// Called before [`run`](Self::run) under its own, longer time limit.
    /// Runtimes without a separate fetch step can rely on the default.
    async fn prepare_image(&self, _image: &str) -> Result<(), RuntimeError> {
        Ok(())
    }

    /// Create and start a container from an already prepared image and
    /// return its handle.
    async fn run(&self, request: RunRequest) -> Result<ContainerHandle, RuntimeError>;

    /// Look a container up by name. `Ok(None)` means the runtime has no such
    /// container.
    async fn get(&self, name: &str) -> Result<Option<ContainerHandle>, RuntimeError>;

    /// Stop a running container.
    async fn stop(&self, handle: &ContainerHandle) -> Result<(), RuntimeError>;

    /// Force-remove a container by name, running or not. Removing a
    /// container that does not exist succeeds.
    async fn remove(&self, name: &str) -> Result<(), RuntimeError>;

    /// Full captured log output of a container.
    async fn logs(&self, handle: &ContainerHandle) -> Result<Vec<u8>, RuntimeError>;

    /// Current status string (e.g. "running", "exited", "paused").
    async fn status(&self, handle: &ContainerHandle) -> Result<String, RuntimeError>;
}
