//! The static stand-in for dynamic module-class lookup by dotted import
//! path: one [`frappy_core::ModuleFactory`] per `class` string a node
//! descriptor can name, registered by the binary before any config is
//! loaded.

use std::collections::HashMap;
use std::sync::Arc;

use frappy_core::ModuleFactory;

/// A lookup table from a `[modules.*]` section's `class` string to the
/// concrete factory that builds it. The module set is fixed at node
/// start (no dynamic loading), so this is populated once in `main` and
/// never mutated afterwards.
#[derive(Default)]
pub struct FactoryRegistry {
    factories: HashMap<&'static str, Arc<dyn ModuleFactory>>,
}

impl FactoryRegistry {
    #[must_use]
    pub fn new() -> Self {
        FactoryRegistry::default()
    }

    /// Register a factory under its own `class_name()`. Registering two
    /// factories under the same name is a programming error caught here
    /// rather than silently letting the second shadow the first.
    ///
    /// # Panics
    ///
    /// Panics if a factory is already registered under this class name.
    pub fn register(&mut self, factory: Arc<dyn ModuleFactory>) {
        let name = factory.class_name();
        let previous = self.factories.insert(name, factory);
        assert!(previous.is_none(), "duplicate ModuleFactory registered for class '{name}'");
    }

    #[must_use]
    pub fn get(&self, class_name: &str) -> Option<&Arc<dyn ModuleFactory>> {
        self.factories.get(class_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use frappy_core::{BuiltModule, ConfigMap, Module, NodeHandle, SecopResult};
    use std::sync::Arc as StdArc;

    struct DummyFactory;

    impl ModuleFactory for DummyFactory {
        fn class_name(&self) -> &'static str {
            "Dummy"
        }

        fn build(&self, name: &str, _config: &ConfigMap, node: StdArc<dyn NodeHandle>) -> SecopResult<BuiltModule> {
            let class = StdArc::new(frappy_core::merge_class(&[frappy_core::ClassLevel::default()]).unwrap());
            Ok(BuiltModule::new(StdArc::new(Module::new(name, class).with_node(node))))
        }
    }

    #[test]
    fn registered_factory_is_found_by_class_name() {
        let mut registry = FactoryRegistry::new();
        registry.register(StdArc::new(DummyFactory));
        assert!(registry.get("Dummy").is_some());
        assert!(registry.get("Ghost").is_none());
    }

    #[test]
    #[should_panic(expected = "duplicate ModuleFactory")]
    fn duplicate_registration_panics() {
        let mut registry = FactoryRegistry::new();
        registry.register(StdArc::new(DummyFactory));
        registry.register(StdArc::new(DummyFactory));
    }
}
