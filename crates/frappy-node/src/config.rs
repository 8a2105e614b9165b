//! Node descriptor loading: a TOML file with a `[node]` section and one
//! `[modules.<name>]` section per module, layered over the
//! `FRAPPY_CONFDIR` environment override the way the core's collaborator
//! contract expects it (component C only ever sees a flat, ordered
//! `ConfigMap` per module — this module is where the nested TOML shape
//! gets flattened into that contract).

use std::path::{Path, PathBuf};

use indexmap::IndexMap;

use frappy_core::{ConfigMap, ConfigValue};

use crate::error::NodeError;

/// A fully-loaded node descriptor: the `[node]` section plus one
/// `ConfigMap` per `[modules.<name>]` section, in declaration order.
pub struct NodeConfig {
    pub equipment_id: String,
    pub description: String,
    pub bind_addr: String,
    pub modules: IndexMap<String, ConfigMap>,
}

/// Resolve the descriptor path: an explicit `--config` flag wins,
/// otherwise `$FRAPPY_CONFDIR/node.toml`, otherwise `./node.toml`.
#[must_use]
pub fn resolve_config_path(explicit: Option<&Path>) -> PathBuf {
    if let Some(p) = explicit {
        return p.to_path_buf();
    }
    if let Ok(dir) = std::env::var("FRAPPY_CONFDIR") {
        return PathBuf::from(dir).join("node.toml");
    }
    PathBuf::from("node.toml")
}

pub fn load(path: &Path) -> Result<NodeConfig, NodeError> {
    let text = std::fs::read_to_string(path).map_err(|source| NodeError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let root: toml::Value = toml::from_str(&text).map_err(|source| NodeError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    let root_table = root.as_table().ok_or_else(|| NodeError::Shape {
        path: path.to_path_buf(),
        message: "top level must be a table".to_string(),
    })?;

    let node_table = root_table.get("node").and_then(toml::Value::as_table);
    let equipment_id = node_table
        .and_then(|t| t.get("equipment_id"))
        .and_then(toml::Value::as_str)
        .unwrap_or("frappy_node")
        .to_string();
    let description = node_table
        .and_then(|t| t.get("description"))
        .and_then(toml::Value::as_str)
        .unwrap_or("")
        .to_string();
    let bind_addr = node_table
        .and_then(|t| t.get("bind"))
        .and_then(toml::Value::as_str)
        .unwrap_or("0.0.0.0:10767")
        .to_string();

    let mut modules = IndexMap::new();
    if let Some(mods) = root_table.get("modules").and_then(toml::Value::as_table) {
        for (name, value) in mods {
            let table = value.as_table().ok_or_else(|| NodeError::Shape {
                path: path.to_path_buf(),
                message: format!("[modules.{name}] must be a table"),
            })?;
            let mut map = ConfigMap::new();
            flatten_table(table, "", &mut map);
            modules.insert(name.clone(), map);
        }
    }

    Ok(NodeConfig {
        equipment_id,
        description,
        bind_addr,
        modules,
    })
}

/// Walk a (possibly nested, from TOML's own dotted-key sugar) table and
/// flatten it into `prefix.joined.keys`, leaving arrays and scalars as
/// leaves. `value.default = 300` and `[modules.x.value] default = 300`
/// both arrive here as the same nested shape and flatten identically.
fn flatten_table(table: &toml::value::Table, prefix: &str, out: &mut ConfigMap) {
    for (key, value) in table {
        let full_key = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        match value {
            toml::Value::Table(nested) => flatten_table(nested, &full_key, out),
            other => {
                out.insert(full_key, to_config_value(other));
            }
        }
    }
}

fn to_config_value(value: &toml::Value) -> ConfigValue {
    match value {
        toml::Value::String(s) => ConfigValue::String(s.clone()),
        toml::Value::Integer(i) => ConfigValue::Int(*i),
        toml::Value::Float(f) => ConfigValue::Float(*f),
        toml::Value::Boolean(b) => ConfigValue::Bool(*b),
        toml::Value::Array(items) => ConfigValue::Array(items.iter().map(to_config_value).collect()),
        toml::Value::Datetime(dt) => ConfigValue::String(dt.to_string()),
        toml::Value::Table(_) => ConfigValue::String(String::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_section_and_module_classes_parse() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("node.toml");
        std::fs::write(
            &path,
            r#"
            [node]
            equipment_id = "demo.example.org"
            description = "a test node"
            bind = "127.0.0.1:10767"

            [modules.cryostat]
            class = "TemperatureLoop"
            value.default = 300.0
            ramp.default = 5.0

            [modules.cryostat.properties]
            group = "sample"
            "#,
        )
        .unwrap();

        let config = load(&path).unwrap();
        assert_eq!(config.equipment_id, "demo.example.org");
        assert_eq!(config.bind_addr, "127.0.0.1:10767");
        let cryostat = &config.modules["cryostat"];
        assert_eq!(cryostat["class"].as_str(), Some("TemperatureLoop"));
        assert_eq!(cryostat["value.default"].as_f64(), Some(300.0));
        assert_eq!(cryostat["properties.group"].as_str(), Some("sample"));
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let err = load(Path::new("/nonexistent/node.toml")).unwrap_err();
        assert!(matches!(err, NodeError::Read { .. }));
    }

    #[test]
    fn resolve_config_path_prefers_explicit_over_environment() {
        let explicit = Path::new("/tmp/explicit.toml");
        assert_eq!(resolve_config_path(Some(explicit)), explicit);
    }
}
