//! Class-build-time assembly of a module's accessibles: merging
//! declarations across an ancestor chain, applying `paramOrder`, and
//! catching the handful of mistakes that can only be caught once, when
//! the class is put together (never per-instance).

use indexmap::IndexMap;

use crate::accessible::{CommandDecl, ParameterDecl};
use crate::error::SecopError;

/// One step of a module's ancestor chain, oldest ancestor first, ending
/// with the module itself. Each level may declare new accessibles or
/// `Override` entries modifying ones from earlier levels.
#[derive(Debug, Clone, Default)]
pub struct ClassLevel {
    pub parameters: Vec<ParameterDecl>,
    pub commands: Vec<CommandDecl>,
    pub overrides: Vec<ParameterOverride>,
    /// Names, in the order this level wants its own new accessibles to
    /// sort after inherited ones. An empty vec means "declaration order".
    pub param_order: Vec<String>,
    /// This level's contribution to the module's `describe()` text;
    /// `Some` replaces whatever an earlier level set, mirroring a
    /// subclass overriding its parent's docstring.
    pub description: Option<String>,
    /// Interface classes this level adds to the module's reported set
    /// (e.g. `"Readable"`, `"Drivable"`), accumulated across the whole
    /// ancestor chain in declaration order, de-duplicated.
    pub interface_classes: Vec<String>,
    /// Module-level (not per-parameter) property key/value pairs; a later
    /// level's key wins over an earlier one with the same name.
    pub properties: crate::accessible::PropertyBag,
}

/// A partial modification of an already-declared parameter (the
/// `Override` construct): every field is optional, and only the ones
/// set are applied on top of the inherited declaration.
#[derive(Debug, Clone, Default)]
pub struct ParameterOverride {
    pub name: String,
    pub description: Option<String>,
    pub readonly: Option<bool>,
    pub default: Option<frappy_datatypes::Value>,
    pub poll: Option<crate::accessible::PollPriority>,
    pub datatype: Option<frappy_datatypes::Datatype>,
}

/// The merged, final shape of a module's accessibles after walking its
/// whole ancestor chain. This is what `Module::new` instantiates
/// `ParamCell`s from.
#[derive(Debug, Clone, Default)]
pub struct MergedClass {
    parameters: IndexMap<String, ParameterDecl>,
    commands: IndexMap<String, CommandDecl>,
    description: String,
    interface_classes: Vec<String>,
    properties: crate::accessible::PropertyBag,
}

impl MergedClass {
    #[must_use]
    pub fn parameters(&self) -> impl Iterator<Item = &ParameterDecl> {
        self.parameters.values()
    }

    #[must_use]
    pub fn commands(&self) -> impl Iterator<Item = &CommandDecl> {
        self.commands.values()
    }

    #[must_use]
    pub fn parameter(&self, name: &str) -> Option<&ParameterDecl> {
        self.parameters.get(name)
    }

    #[must_use]
    pub fn command(&self, name: &str) -> Option<&CommandDecl> {
        self.commands.get(name)
    }

    #[must_use]
    pub fn has_parameter(&self, name: &str) -> bool {
        self.parameters.contains_key(name)
    }

    /// The module's `describe()` text, merged across its ancestor chain.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Interface classes reported in `describe()`, e.g. `["Drivable", "Readable"]`.
    #[must_use]
    pub fn interface_classes(&self) -> &[String] {
        &self.interface_classes
    }

    /// Module-level (not per-parameter) properties reported in `describe()`.
    #[must_use]
    pub fn properties(&self) -> &crate::accessible::PropertyBag {
        &self.properties
    }
}

/// Merge a module's ancestor chain (oldest first) into one flat set of
/// accessibles, applying overrides and `paramOrder` along the way.
///
/// This mirrors `HasAccessibles.__init_subclass__`: later levels may add
/// brand-new accessibles or `Override` an inherited one; a name cannot
/// be both a parameter and a command, and an `Override` naming something
/// that doesn't exist anywhere in the chain so far is a build-time
/// error, not a silent no-op.
pub fn merge_class(levels: &[ClassLevel]) -> Result<MergedClass, SecopError> {
    let mut parameters: IndexMap<String, ParameterDecl> = IndexMap::new();
    let mut commands: IndexMap<String, CommandDecl> = IndexMap::new();
    let mut description = String::new();
    let mut interface_classes: Vec<String> = Vec::new();
    let mut properties = crate::accessible::PropertyBag::new();

    for level in levels {
        if let Some(d) = &level.description {
            description = d.clone();
        }
        for class in &level.interface_classes {
            if !interface_classes.iter().any(|c| c == class) {
                interface_classes.push(class.clone());
            }
        }
        for (k, v) in level.properties.iter() {
            properties.set(k, v);
        }

        for p in &level.parameters {
            if commands.contains_key(&p.name) {
                return Err(SecopError::ProgrammingError(format!(
                    "'{}' is declared as both a command and a parameter",
                    p.name
                )));
            }
            parameters.insert(p.name.clone(), p.clone());
        }

        for c in &level.commands {
            if parameters.contains_key(&c.name) {
                return Err(SecopError::ProgrammingError(format!(
                    "'{}' is declared as both a parameter and a command",
                    c.name
                )));
            }
            commands.insert(c.name.clone(), c.clone());
        }

        for ov in &level.overrides {
            let Some(existing) = parameters.get_mut(&ov.name) else {
                return Err(SecopError::ProgrammingError(format!(
                    "Override of unknown parameter '{}'",
                    ov.name
                )));
            };
            if let Some(d) = &ov.description {
                existing.description = d.clone();
            }
            if let Some(r) = ov.readonly {
                existing.readonly = r;
            }
            if let Some(v) = &ov.default {
                existing.default = Some(v.clone());
            }
            if let Some(p) = ov.poll {
                existing.poll = p;
            }
            if let Some(dt) = &ov.datatype {
                existing.datatype = dt.clone();
            }
        }

        if !level.param_order.is_empty() {
            reorder(&mut parameters, &level.param_order);
        }
    }

    Ok(MergedClass {
        parameters,
        commands,
        description,
        interface_classes,
        properties,
    })
}

/// Move the named parameters to the end, in the given order, leaving
/// every other parameter in its existing relative order before them.
/// Names not present in the map are silently ignored (a `paramOrder`
/// hint naming a parameter the level doesn't actually have is harmless).
fn reorder(parameters: &mut IndexMap<String, ParameterDecl>, order: &[String]) {
    let mut tail = Vec::with_capacity(order.len());
    for name in order {
        if let Some((_, decl)) = parameters.shift_remove_entry(name) {
            tail.push((name.clone(), decl));
        }
    }
    for (name, decl) in tail {
        parameters.insert(name, decl);
    }
}

/// Validate the handful of build-time-only constraints that have no
/// runtime meaning: a module with a writable parameter lacking both a
/// `write_<p>` handler and a default is configured wrong, a parameter
/// with no `value`/`status` accessible pair on a `Readable` is wrong,
/// and so on. Concrete checks are wired in by each module's own
/// construction logic; this function holds only the checks that apply
/// uniformly to every merged class.
pub fn validate_module_class(merged: &MergedClass) -> Result<(), SecopError> {
    for p in merged.parameters() {
        if p.name.is_empty() {
            return Err(SecopError::ProgrammingError(
                "parameter declared with an empty name".into(),
            ));
        }
    }
    for c in merged.commands() {
        if c.name.is_empty() {
            return Err(SecopError::ProgrammingError(
                "command declared with an empty name".into(),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use frappy_datatypes::{Datatype, FloatRange};

    fn float_param(name: &str) -> ParameterDecl {
        ParameterDecl::new(name, Datatype::FloatRange(FloatRange::default()))
    }

    #[test]
    fn child_level_can_override_inherited_parameter() {
        let base = ClassLevel {
            parameters: vec![float_param("value").with_description("base")],
            ..Default::default()
        };
        let child = ClassLevel {
            overrides: vec![ParameterOverride {
                name: "value".into(),
                description: Some("child".into()),
                ..Default::default()
            }],
            ..Default::default()
        };
        let merged = merge_class(&[base, child]).unwrap();
        assert_eq!(merged.parameter("value").unwrap().description, "child");
    }

    #[test]
    fn interface_classes_accumulate_across_the_ancestor_chain() {
        let base = ClassLevel {
            interface_classes: vec!["Readable".into()],
            ..Default::default()
        };
        let child = ClassLevel {
            interface_classes: vec!["Readable".into(), "Drivable".into()],
            ..Default::default()
        };
        let merged = merge_class(&[base, child]).unwrap();
        assert_eq!(merged.interface_classes(), ["Readable".to_string(), "Drivable".to_string()]);
    }

    #[test]
    fn module_description_and_properties_are_merged() {
        let mut props = crate::accessible::PropertyBag::new();
        props.set("group", "sample");
        let base = ClassLevel {
            description: Some("base module".into()),
            properties: props,
            ..Default::default()
        };
        let mut child_props = crate::accessible::PropertyBag::new();
        child_props.set("group", "override-group");
        let child = ClassLevel {
            description: Some("demo temperature loop".into()),
            properties: child_props,
            ..Default::default()
        };
        let merged = merge_class(&[base, child]).unwrap();
        assert_eq!(merged.description(), "demo temperature loop");
        assert_eq!(merged.properties().get("group"), Some("override-group"));
    }

    #[test]
    fn override_of_unknown_parameter_is_a_build_error() {
        let level = ClassLevel {
            overrides: vec![ParameterOverride {
                name: "nope".into(),
                ..Default::default()
            }],
            ..Default::default()
        };
        assert!(merge_class(&[level]).is_err());
    }

    #[test]
    fn same_name_as_parameter_and_command_is_rejected() {
        let level = ClassLevel {
            parameters: vec![float_param("go")],
            commands: vec![CommandDecl::new("go")],
            ..Default::default()
        };
        assert!(merge_class(&[level]).is_err());
    }

    #[test]
    fn param_order_moves_named_params_to_the_end() {
        let level = ClassLevel {
            parameters: vec![float_param("a"), float_param("b"), float_param("c")],
            param_order: vec!["a".into()],
            ..Default::default()
        };
        let merged = merge_class(&[level]).unwrap();
        let names: Vec<_> = merged.parameters().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["b", "c", "a"]);
    }
}
