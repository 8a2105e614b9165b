//! The module registry and the descriptive JSON blob built once at node
//! start and served read-only thereafter by every `describe` request.

use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::json;

use frappy_core::{CommandDecl, Module, ParameterDecl, SecopError, SecopResult, Visibility};

use crate::dispatcher::HandlerTables;

fn describe_parameter(p: &ParameterDecl) -> serde_json::Value {
    json!({
        "description": p.description,
        "datatype": p.datatype.describe(),
        "readonly": p.readonly,
        "group": p.group,
        "visibility": visibility_code(p.visibility),
        "influences": p.influences,
    })
}

fn describe_command(c: &CommandDecl) -> serde_json::Value {
    json!({
        "description": c.description,
        "datatype": {
            "type": "command",
            "argument": c.argument.as_ref().map(frappy_datatypes::Datatype::describe),
            "result": c.result.as_ref().map(frappy_datatypes::Datatype::describe),
        },
        "group": c.group,
        "visibility": visibility_code(c.visibility),
    })
}

fn visibility_code(v: Visibility) -> i64 {
    v as i64
}

fn describe_module(module: &Module) -> serde_json::Value {
    let mut accessibles = serde_json::Map::new();
    for p in module.class().parameters() {
        if p.export {
            accessibles.insert(p.name.clone(), describe_parameter(p));
        }
    }
    for c in module.class().commands() {
        if c.export {
            accessibles.insert(c.name.clone(), describe_command(c));
        }
    }
    let properties: serde_json::Map<String, serde_json::Value> = module
        .class()
        .properties()
        .iter()
        .map(|(k, v)| (k.to_string(), json!(v)))
        .collect();
    json!({
        "description": module.class().description(),
        "interface_classes": module.class().interface_classes(),
        "accessibles": accessibles,
        "properties": properties,
    })
}

/// Node-wide identity reported at the top level of `describe()`, set once
/// at node start from the loaded configuration.
#[derive(Debug, Clone, Default)]
pub struct NodeInfo {
    pub equipment_id: String,
    pub firmware: String,
    pub version: String,
}

/// The fixed set of modules hosted on a node, plus the `describe` JSON
/// built once from their merged classes. Immutable after construction:
/// the module set is fixed at node start (no dynamic loading).
pub struct ModuleRegistry {
    modules: IndexMap<String, Arc<Module>>,
    describe_json: serde_json::Value,
}

impl ModuleRegistry {
    /// Build the registry for a set of modules under the given node
    /// identity, assembling the full `describe()` JSON once.
    #[must_use]
    pub fn new(node: NodeInfo, modules: Vec<Arc<Module>>) -> Self {
        let mut map = IndexMap::new();
        let mut module_descriptions = serde_json::Map::new();
        for module in modules {
            module_descriptions.insert(module.name().to_string(), describe_module(&module));
            map.insert(module.name().to_string(), module);
        }
        let describe_json = json!({
            "equipment_id": node.equipment_id,
            "firmware": node.firmware,
            "version": node.version,
            "modules": module_descriptions,
        });
        ModuleRegistry { modules: map, describe_json }
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Arc<Module>> {
        self.modules.get(name)
    }

    #[must_use]
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.modules.keys().map(String::as_str)
    }

    #[must_use]
    pub fn describe_json(&self) -> &serde_json::Value {
        &self.describe_json
    }
}

/// Class-build-time rejection of a
/// `read_<x>`/`write_<x>`/`do_<x>` wired to an unknown accessible: since
/// this port has no naming-convention reflection, the equivalent mistake
/// is a concrete module wiring a `CommonReadHandler`/`CommonWriteHandler`/
/// `CommandHandler` to a `(module, accessible)` key that the merged class
/// never declared. Called once at node start (and from each concrete
/// module's own tests), never per-request.
pub fn validate_handler_tables(registry: &ModuleRegistry, handlers: &HandlerTables) -> SecopResult<()> {
    for (module_name, parameter) in handlers.reads.keys() {
        require_parameter(registry, module_name, parameter)?;
    }
    for (module_name, parameter) in handlers.writes.keys() {
        require_parameter(registry, module_name, parameter)?;
    }
    for (module_name, command) in handlers.commands.keys() {
        let module = registry
            .get(module_name)
            .ok_or_else(|| SecopError::NoSuchModule(module_name.clone()))?;
        if module.class().command(command).is_none() {
            return Err(SecopError::ProgrammingError(format!(
                "handler wired to unknown command '{module_name}:{command}'"
            )));
        }
    }
    Ok(())
}

fn require_parameter(registry: &ModuleRegistry, module_name: &str, parameter: &str) -> SecopResult<()> {
    let module = registry
        .get(module_name)
        .ok_or_else(|| SecopError::NoSuchModule(module_name.clone()))?;
    if module.class().parameter(parameter).is_none() {
        return Err(SecopError::ProgrammingError(format!(
            "handler wired to unknown parameter '{module_name}:{parameter}'"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use frappy_core::{merge_class, ClassLevel};
    use frappy_datatypes::{Datatype, FloatRange};

    #[test]
    fn describe_json_lists_exported_parameters() {
        let level = ClassLevel {
            parameters: vec![ParameterDecl::new("value", Datatype::FloatRange(FloatRange::default()))],
            ..Default::default()
        };
        let module = Arc::new(Module::new("th", Arc::new(merge_class(&[level]).unwrap())));
        let registry = ModuleRegistry::new(NodeInfo::default(), vec![module]);
        assert!(registry.get("th").is_some());
        assert!(registry.describe_json()["modules"]["th"]["accessibles"]["value"].is_object());
    }

    #[test]
    fn handler_wired_to_unknown_parameter_is_rejected() {
        let level = ClassLevel {
            parameters: vec![ParameterDecl::new("value", Datatype::FloatRange(FloatRange::default()))],
            ..Default::default()
        };
        let module = Arc::new(Module::new("th", Arc::new(merge_class(&[level]).unwrap())));
        let registry = ModuleRegistry::new(NodeInfo::default(), vec![module]);

        let mut handlers = crate::dispatcher::HandlerTables::default();
        handlers.reads.insert(
            ("th".to_string(), "ghost".to_string()),
            frappy_core::CommonReadHandler::new(["ghost"], std::sync::Arc::new(|_m: &Module| Ok(()))),
        );

        assert!(validate_handler_tables(&registry, &handlers).is_err());
    }

    #[test]
    fn fully_wired_handlers_pass_validation() {
        let level = ClassLevel {
            parameters: vec![ParameterDecl::new("value", Datatype::FloatRange(FloatRange::default()))],
            ..Default::default()
        };
        let module = Arc::new(Module::new("th", Arc::new(merge_class(&[level]).unwrap())));
        let registry = ModuleRegistry::new(NodeInfo::default(), vec![module]);
        let handlers = crate::dispatcher::HandlerTables::default();
        assert!(validate_handler_tables(&registry, &handlers).is_ok());
    }
}
