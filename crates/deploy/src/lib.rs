//! MLIL Deploy - lifecycle manager for containerized models
//!
//! This crate tracks model containers deployed onto a container runtime.
//! Each deployment is identified by a model triple
//! `(model_name, model_flavor, model_version_or_alias)` and runs in a
//! container named `mlinsightlab__model__{name}__{flavor}__{version}`.
//!
//! - **Deploy**: start an auto-removing, detached model container
//! - **Remove**: stop one container, or every tracked container
//! - **Inspect**: forward status and log queries to the runtime
//!
//! # Example
//!
//! ```no_run
//! use mlil_deploy::{ManagerConfig, ModelManager};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ModelManager::connect(ManagerConfig::default()).await?;
//!
//! manager
//!     .deploy_model("models:/churn/1", "churn", "sklearn", "1", false)
//!     .await?;
//! println!("{}", manager.get_model_status("churn", "sklearn", "1").await?);
//!
//! manager.remove_all_models().await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod manager;
pub mod model;
pub mod runtime;

pub use config::{ManagerConfig, ResolvedConfig};
pub use error::{DeployError, DeployResult};
pub use manager::ModelManager;
pub use model::{DeployedModel, ModelKey};
pub use runtime::{ContainerHandle, ContainerRuntime, DockerRuntime, MockRuntime, RuntimeError};
