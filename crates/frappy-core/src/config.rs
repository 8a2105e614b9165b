//! The node loader's only contract with module construction: an
//! ordered, dotted-key map of scalar/array values. What a key means —
//! a module-level property, a parameter's initial value, or an
//! override of one of its properties (`<param>.<prop>`) — is entirely
//! up to each concrete module's own construction code; this type
//! carries no such semantics itself.

use indexmap::IndexMap;

/// One configured value. Mirrors TOML's scalar/array value space; there
/// is deliberately no "table" variant; a nested table in the source
/// file becomes a run of dotted keys instead (`value.unit`, not a
/// nested map), so the whole node descriptor collapses to one flat,
/// ordered map per module.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Array(Vec<ConfigValue>),
}

impl ConfigValue {
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ConfigValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ConfigValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ConfigValue::Int(v) => Some(*v as f64),
            ConfigValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ConfigValue::String(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_array(&self) -> Option<&[ConfigValue]> {
        match self {
            ConfigValue::Array(v) => Some(v),
            _ => None,
        }
    }

    /// The wire-shaped JSON this value would validate against, for
    /// handing straight to a `Datatype::import_value`.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            ConfigValue::Bool(b) => serde_json::Value::Bool(*b),
            ConfigValue::Int(v) => serde_json::json!(*v),
            ConfigValue::Float(v) => serde_json::json!(*v),
            ConfigValue::String(s) => serde_json::Value::String(s.clone()),
            ConfigValue::Array(items) => serde_json::Value::Array(items.iter().map(ConfigValue::to_json).collect()),
        }
    }
}

/// A module's whole configuration slice: dotted keys in declaration
/// order, exactly as they appeared in the node descriptor.
pub type ConfigMap = IndexMap<String, ConfigValue>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_to_json_round_trips_through_serde_json() {
        assert_eq!(ConfigValue::Float(300.0).to_json(), serde_json::json!(300.0));
        assert_eq!(ConfigValue::String("K".into()).to_json(), serde_json::json!("K"));
    }

    #[test]
    fn array_to_json_preserves_element_order() {
        let v = ConfigValue::Array(vec![ConfigValue::Int(1), ConfigValue::Int(2)]);
        assert_eq!(v.to_json(), serde_json::json!([1, 2]));
    }
}
