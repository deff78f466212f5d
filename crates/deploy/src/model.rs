//! Registry records for deployed model containers.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Prefix shared by every model container name.
pub const CONTAINER_NAME_PREFIX: &str = "mlinsightlab__model";

/// Identifying triple of a deployed model.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModelKey {
    /// Logical model name
    pub model_name: String,
    /// Serialization/runtime flavor (e.g. "sklearn", "pyfunc")
    pub model_flavor: String,
    /// Specific version or named alias
    pub model_version_or_alias: String,
}

impl ModelKey {
    pub fn new(
        model_name: impl Into<String>,
        model_flavor: impl Into<String>,
        model_version_or_alias: impl Into<String>,
    ) -> Self {
        Self {
            model_name: model_name.into(),
            model_flavor: model_flavor.into(),
            model_version_or_alias: model_version_or_alias.into(),
        }
    }

    /// Container name the runtime knows this model by.
    pub fn container_name(&self) -> String {
        format!(
            "{}__{}__{}__{}",
            CONTAINER_NAME_PREFIX, self.model_name, self.model_flavor, self.model_version_or_alias
        )
    }
}

impl fmt::Display for ModelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.model_name, self.model_flavor, self.model_version_or_alias
        )
    }
}

/// One running model container tracked by the manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployedModel {
    pub model_name: String,
    pub model_flavor: String,
    pub model_version_or_alias: String,
    /// Name reported by the runtime after start
    pub container_name: String,
}

impl DeployedModel {
    pub fn new(key: ModelKey, container_name: impl Into<String>) -> Self {
        Self {
            model_name: key.model_name,
            model_flavor: key.model_flavor,
            model_version_or_alias: key.model_version_or_alias,
            container_name: container_name.into(),
        }
    }

    pub fn key(&self) -> ModelKey {
        ModelKey::new(
            self.model_name.clone(),
            self.model_flavor.clone(),
            self.model_version_or_alias.clone(),
        )
    }

    /// Exact string match on all three identifying fields.
    pub fn matches(&self, key: &ModelKey) -> bool {
        self.model_name == key.model_name
            && self.model_flavor == key.model_flavor
            && self.model_version_or_alias == key.model_version_or_alias
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_container_name() {
        let key = ModelKey::new("m", "sklearn", "1");
        assert_eq!(key.container_name(), "mlinsightlab__model__m__sklearn__1");

        let key = ModelKey::new("churn", "pyfunc", "champion");
        assert_eq!(
            key.container_name(),
            "mlinsightlab__model__churn__pyfunc__champion"
        );
    }

    #[test]
    fn test_matches_is_exact() {
        let model = DeployedModel::new(ModelKey::new("m", "sklearn", "1"), "c");

        assert!(model.matches(&ModelKey::new("m", "sklearn", "1")));
        assert!(!model.matches(&ModelKey::new("M", "sklearn", "1")));
        assert!(!model.matches(&ModelKey::new("m", "sklearn", "01")));
        assert!(!model.matches(&ModelKey::new("m", "pyfunc", "1")));
    }

    #[test]
    fn test_key_roundtrip() {
        let key = ModelKey::new("m", "sklearn", "latest");
        let model = DeployedModel::new(key.clone(), key.container_name());
        assert_eq!(model.key(), key);
        assert_eq!(key.to_string(), "m/sklearn/latest");
    }
}
