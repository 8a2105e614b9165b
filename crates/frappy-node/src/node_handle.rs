//! Breaks the construction-order cycle between modules and the
//! dispatcher: every `ModuleFactory::build` needs a live `NodeHandle`
//! before the `Dispatcher` (the only real implementation) can exist,
//! because the dispatcher itself is built from the already-constructed
//! modules. Each module gets a `DeferredNodeHandle` instead and the
//! dispatcher is bound into it once assembled.

use std::sync::{Arc, OnceLock};

use frappy_core::{NodeHandle, Value};

/// A `NodeHandle` that forwards to whatever gets bound into it later.
/// Calls made before binding are silently dropped, matching
/// `NullNodeHandle`'s no-op behaviour — nothing can have subscribers
/// before the dispatcher exists to track them.
#[derive(Default)]
pub struct DeferredNodeHandle {
    inner: OnceLock<Arc<dyn NodeHandle>>,
}

impl DeferredNodeHandle {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Bind the real handle. Must be called exactly once, after the
    /// dispatcher is built from the modules this handle was handed to.
    ///
    /// # Panics
    ///
    /// Panics if called more than once.
    pub fn bind(&self, handle: Arc<dyn NodeHandle>) {
        self.inner
            .set(handle)
            .unwrap_or_else(|_| panic!("DeferredNodeHandle bound twice"));
    }
}

impl NodeHandle for DeferredNodeHandle {
    fn announce_update(&self, module: &str, parameter: &str, value: &Value, timestamp: f64) {
        if let Some(inner) = self.inner.get() {
            inner.announce_update(module, parameter, value, timestamp);
        }
    }

    fn announce_error(&self, module: &str, parameter: &str, kind: &str, error: &str, timestamp: f64) {
        if let Some(inner) = self.inner.get() {
            inner.announce_error(module, parameter, kind, error, timestamp);
        }
    }

    fn has_subscribers(&self, module: &str, parameter: &str) -> bool {
        self.inner
            .get()
            .is_some_and(|inner| inner.has_subscribers(module, parameter))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use frappy_core::NullNodeHandle;

    #[test]
    fn calls_before_binding_are_inert() {
        let deferred = DeferredNodeHandle::new();
        deferred.announce_update("m", "value", &Value::Int(1), 0.0);
        assert!(!deferred.has_subscribers("m", "value"));
    }

    #[test]
    fn calls_after_binding_reach_the_inner_handle() {
        let deferred = DeferredNodeHandle::new();
        deferred.bind(Arc::new(NullNodeHandle));
        assert!(!deferred.has_subscribers("m", "value"));
    }

    #[test]
    #[should_panic(expected = "bound twice")]
    fn binding_twice_panics() {
        let deferred = DeferredNodeHandle::new();
        deferred.bind(Arc::new(NullNodeHandle));
        deferred.bind(Arc::new(NullNodeHandle));
    }
}
