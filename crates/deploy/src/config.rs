//! Manager configuration.
//!
//! Every value has a default. An empty value falls back to the matching
//! process environment variable; when that is missing too, resolution fails
//! with [`DeployError::Configuration`] naming the variable.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{DeployError, DeployResult};

/// Environment variable consulted when `model_image` is empty.
pub const ENV_MODEL_IMAGE: &str = "MODEL_CONTAINER_IMAGE";
/// Environment variable consulted when `model_network` is empty.
pub const ENV_MODEL_NETWORK: &str = "MODEL_NETWORK";
/// Environment variable consulted when `tracking_uri` is empty.
pub const ENV_TRACKING_URI: &str = "MLFLOW_TRACKING_URI";
/// Environment variable consulted when `model_port` is empty.
pub const ENV_MODEL_PORT: &str = "MODEL_PORT";

pub const DEFAULT_MODEL_IMAGE: &str = "ghcr.io/mlinsightlab/mlinsightlab-model-container:main";
pub const DEFAULT_MODEL_NETWORK: &str = "mlinsightlab_model_network";
pub const DEFAULT_TRACKING_URI: &str = "http://mlflow:2244";
pub const DEFAULT_MODEL_PORT: &str = "8888";

/// Default bound on a single container runtime call
pub const DEFAULT_RUNTIME_TIMEOUT: Duration = Duration::from_secs(60);

/// Default bound on fetching the model image before a deploy
pub const DEFAULT_IMAGE_PULL_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Configuration for the model manager, as supplied by the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Image every model container is started from
    pub model_image: String,

    /// Network the model containers are attached to
    pub model_network: String,

    /// Tracking service URI handed to each container
    pub tracking_uri: String,

    /// Port the model is served on inside the container
    pub model_port: String,

    /// Upper bound on each container runtime call
    #[serde(with = "humantime_serde")]
    pub runtime_timeout: Duration,

    /// Upper bound on pulling the model image, which can take far longer
    /// than any other runtime call
    #[serde(with = "humantime_serde")]
    pub image_pull_timeout: Duration,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            model_image: DEFAULT_MODEL_IMAGE.to_string(),
            model_network: DEFAULT_MODEL_NETWORK.to_string(),
            tracking_uri: DEFAULT_TRACKING_URI.to_string(),
            model_port: DEFAULT_MODEL_PORT.to_string(),
            runtime_timeout: DEFAULT_RUNTIME_TIMEOUT,
            image_pull_timeout: DEFAULT_IMAGE_PULL_TIMEOUT,
        }
    }
}

/// Configuration after environment fallback and validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedConfig {
    pub model_image: String,
    pub model_network: String,
    pub tracking_uri: String,
    pub model_port: u16,
    pub runtime_timeout: Duration,
    pub image_pull_timeout: Duration,
}

impl ManagerConfig {
    /// Load configuration from a TOML file. Missing keys take their defaults.
    pub fn from_file(path: &Path) -> DeployResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: ManagerConfig = toml::from_str(&contents)?;
        Ok(config)
    }

    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.model_image = image.into();
        self
    }

    pub fn with_network(mut self, network: impl Into<String>) -> Self {
        self.model_network = network.into();
        self
    }

    pub fn with_tracking_uri(mut self, uri: impl Into<String>) -> Self {
        self.tracking_uri = uri.into();
        self
    }

    pub fn with_port(mut self, port: impl Into<String>) -> Self {
        self.model_port = port.into();
        self
    }

    pub fn with_runtime_timeout(mut self, timeout: Duration) -> Self {
        self.runtime_timeout = timeout;
        self
    }

    pub fn with_image_pull_timeout(mut self, timeout: Duration) -> Self {
        self.image_pull_timeout = timeout;
        self
    }

    /// Resolve empty values from the process environment.
    pub fn resolve(&self) -> DeployResult<ResolvedConfig> {
        self.resolve_with(|key| std::env::var(key).ok())
    }

    /// Resolve empty values through `lookup` instead of the process environment.
    pub fn resolve_with<F>(&self, lookup: F) -> DeployResult<ResolvedConfig>
    where
        F: Fn(&str) -> Option<String>,
    {
        let model_image = fallback(&self.model_image, ENV_MODEL_IMAGE, &lookup)?;
        let model_network = fallback(&self.model_network, ENV_MODEL_NETWORK, &lookup)?;
        let tracking_uri = fallback(&self.tracking_uri, ENV_TRACKING_URI, &lookup)?;
        let port = fallback(&self.model_port, ENV_MODEL_PORT, &lookup)?;

        let model_port = port.trim().parse::<u16>().map_err(|_| {
            DeployError::Configuration(format!("model port must be a valid port number, got {:?}", port))
        })?;

        if self.runtime_timeout.is_zero() {
            return Err(DeployError::Configuration(
                "runtime timeout must be > 0".to_string(),
            ));
        }

        if self.image_pull_timeout.is_zero() {
            return Err(DeployError::Configuration(
                "image pull timeout must be > 0".to_string(),
            ));
        }

        Ok(ResolvedConfig {
            model_image,
            model_network,
            tracking_uri,
            model_port,
            runtime_timeout: self.runtime_timeout,
            image_pull_timeout: self.image_pull_timeout,
        })
    }
}

fn fallback<F>(explicit: &str, key: &str, lookup: &F) -> DeployResult<String>
where
    F: Fn(&str) -> Option<String>,
{
    if !explicit.is_empty() {
        return Ok(explicit.to_string());
    }

    lookup(key)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| DeployError::Configuration(format!("{} not set", key)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_config_defaults() {
        let resolved = ManagerConfig::default().resolve_with(env(&[])).unwrap();

        assert_eq!(resolved.model_image, DEFAULT_MODEL_IMAGE);
        assert_eq!(resolved.model_network, "mlinsightlab_model_network");
        assert_eq!(resolved.tracking_uri, "http://mlflow:2244");
        assert_eq!(resolved.model_port, 8888);
        assert_eq!(resolved.runtime_timeout, Duration::from_secs(60));
        assert_eq!(resolved.image_pull_timeout, Duration::from_secs(1800));
    }

    #[test]
    fn test_empty_value_falls_back_to_env() {
        let config = ManagerConfig::default().with_image("").with_port("");
        let resolved = config
            .resolve_with(env(&[
                (ENV_MODEL_IMAGE, "registry.local/model:dev"),
                (ENV_MODEL_PORT, "9000"),
            ]))
            .unwrap();

        assert_eq!(resolved.model_image, "registry.local/model:dev");
        assert_eq!(resolved.model_port, 9000);
    }

    #[test]
    fn test_explicit_value_wins_over_env() {
        let config = ManagerConfig::default().with_network("custom_net");
        let resolved = config
            .resolve_with(env(&[(ENV_MODEL_NETWORK, "env_net")]))
            .unwrap();

        assert_eq!(resolved.model_network, "custom_net");
    }

    #[test]
    fn test_missing_value_is_configuration_error() {
        let config = ManagerConfig::default().with_tracking_uri("");
        let err = config.resolve_with(env(&[])).unwrap_err();

        match err {
            DeployError::Configuration(msg) => assert!(msg.contains(ENV_TRACKING_URI)),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_invalid_port_rejected() {
        let config = ManagerConfig::default().with_port("eighty");
        assert!(matches!(
            config.resolve_with(env(&[])),
            Err(DeployError::Configuration(_))
        ));
    }

    #[test]
    fn test_zero_pull_timeout_rejected() {
        let config = ManagerConfig::default().with_image_pull_timeout(Duration::ZERO);
        assert!(matches!(
            config.resolve_with(env(&[])),
            Err(DeployError::Configuration(_))
        ));
    }

    #[test]
    fn test_from_file_partial() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "model_network = \"staging_net\"\nruntime_timeout = \"15s\"\nimage_pull_timeout = \"10m\""
        )
        .unwrap();

        let config = ManagerConfig::from_file(file.path()).unwrap();
        assert_eq!(config.model_network, "staging_net");
        assert_eq!(config.runtime_timeout, Duration::from_secs(15));
        assert_eq!(config.image_pull_timeout, Duration::from_secs(600));
        assert_eq!(config.model_image, DEFAULT_MODEL_IMAGE);
    }

    #[test]
    #[serial_test::serial]
    fn test_resolve_reads_process_env() {
        std::env::set_var(ENV_MODEL_PORT, "7777");
        let resolved = ManagerConfig::default().with_port("").resolve();
        std::env::remove_var(ENV_MODEL_PORT);

        assert_eq!(resolved.unwrap().model_port, 7777);
    }
}
