//! Error types for the deployment manager.
//!
//! Every runtime failure is surfaced to the caller immediately. Variants that
//! carry a `String` hold the runtime's own detail verbatim.

use thiserror::Error;

use crate::model::ModelKey;

/// Result type alias for deployment operations.
pub type DeployResult<T> = Result<T, DeployError>;

/// Errors that can occur while managing deployed model containers.
#[derive(Debug, Error)]
pub enum DeployError {
    /// A required configuration value is missing or malformed
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The container runtime could not be reached at construction
    #[error("container runtime unavailable: {0}")]
    RuntimeUnavailable(String),

    /// No registry entry or runtime container matches the request
    #[error("container for that model not found: {0}")]
    NotFound(String),

    /// The runtime rejected or failed a start request
    #[error("error trying to deploy containerized model: {0}")]
    Deployment(String),

    /// The runtime rejected or failed a stop request
    #[error("error trying to stop containerized model: {0}")]
    Stop(String),

    /// Opaque runtime failure while querying a container
    #[error("container runtime error: {0}")]
    Runtime(String),

    /// Bulk removal stopped at the first failing entry
    #[error("removal of {failed} failed after removing {} model(s): {source}", .removed.len())]
    PartialRemoval {
        /// Triples removed before the failure
        removed: Vec<ModelKey>,
        /// Triple whose removal failed
        failed: ModelKey,
        /// Underlying failure
        #[source]
        source: Box<DeployError>,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),
}

impl DeployError {
    /// Returns true for the not-found kind, including a bulk removal that
    /// stopped on a not-found entry.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound(_) => true,
            Self::PartialRemoval { source, .. } => source.is_not_found(),
            _ => false,
        }
    }
}
