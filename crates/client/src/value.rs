//! Values accepted by the variable store.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A value that can be stored in the variable store.
///
/// Serializes to plain JSON. Integers and floats are kept apart so an
/// integer written by one client reads back as an integer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VariableValue {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
    List(Vec<VariableValue>),
    Map(BTreeMap<String, VariableValue>),
}

impl VariableValue {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Integer(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }
}

impl From<bool> for VariableValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for VariableValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<i32> for VariableValue {
    fn from(value: i32) -> Self {
        Self::Integer(value.into())
    }
}

impl From<f64> for VariableValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for VariableValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for VariableValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl<T: Into<VariableValue>> From<Vec<T>> for VariableValue {
    fn from(values: Vec<T>) -> Self {
        Self::List(values.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<VariableValue>> From<Option<T>> for VariableValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

impl From<BTreeMap<String, VariableValue>> for VariableValue {
    fn from(map: BTreeMap<String, VariableValue>) -> Self {
        Self::Map(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integers_stay_integers() {
        let json = serde_json::to_string(&VariableValue::from(42)).unwrap();
        assert_eq!(json, "42");

        let parsed: VariableValue = serde_json::from_str("42").unwrap();
        assert_eq!(parsed, VariableValue::Integer(42));

        let parsed: VariableValue = serde_json::from_str("42.5").unwrap();
        assert_eq!(parsed, VariableValue::Float(42.5));
    }

    #[test]
    fn test_nested_shapes() {
        let value = VariableValue::Map(BTreeMap::from([
            ("name".to_string(), VariableValue::from("churn")),
            ("threshold".to_string(), VariableValue::from(0.75)),
            ("enabled".to_string(), VariableValue::from(true)),
            ("owner".to_string(), VariableValue::Null),
            (
                "features".to_string(),
                VariableValue::from(vec!["age", "tenure"]),
            ),
        ]));

        let json = serde_json::to_value(&value).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "name": "churn",
                "threshold": 0.75,
                "enabled": true,
                "owner": null,
                "features": ["age", "tenure"],
            })
        );

        let back: VariableValue = serde_json::from_value(json).unwrap();
        assert_eq!(back, value);
    }

    #[test]
    fn test_option_maps_to_null() {
        assert!(VariableValue::from(None::<i64>).is_null());
        assert_eq!(VariableValue::from(Some(3)).as_i64(), Some(3));
        assert_eq!(VariableValue::from(3).as_f64(), Some(3.0));
        assert_eq!(VariableValue::from("x").as_str(), Some("x"));
    }
}
