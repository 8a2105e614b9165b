//! Per-parameter value/error callbacks fired from inside
//! [`crate::module::Module::announce_update`]/`announce_error`, and the
//! `registerCallbacks` wiring that hooks one module's parameters into
//! another module's handlers, or forwards them verbatim.

use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;

use frappy_datatypes::Value;

use crate::module::Module;

pub type ValueCallback = Box<dyn Fn(&Value) + Send + Sync>;
/// `(kind, message)` — the wire error kind and its rendered message.
pub type ErrorCallback = Box<dyn Fn(&str, &str) + Send + Sync>;

/// Per-parameter callback lists a module consults after its own
/// unchanged-value/duplicate-error dedup has already decided a broadcast
/// is warranted.
#[derive(Default)]
pub struct CallbackRegistry {
    value: Mutex<IndexMap<String, Vec<ValueCallback>>>,
    error: Mutex<IndexMap<String, Vec<ErrorCallback>>>,
}

impl CallbackRegistry {
    pub fn on_value(&self, parameter: &str, cb: ValueCallback) {
        self.value.lock().entry(parameter.to_string()).or_default().push(cb);
    }

    pub fn on_error(&self, parameter: &str, cb: ErrorCallback) {
        self.error.lock().entry(parameter.to_string()).or_default().push(cb);
    }

    pub(crate) fn fire_value(&self, parameter: &str, value: &Value) {
        if let Some(cbs) = self.value.lock().get(parameter) {
            for cb in cbs {
                cb(value);
            }
        }
    }

    pub(crate) fn fire_error(&self, parameter: &str, kind: &str, message: &str) {
        if let Some(cbs) = self.error.lock().get(parameter) {
            for cb in cbs {
                cb(kind, message);
            }
        }
    }
}

/// The handlers `other` exposes for some of `this`'s parameters — an
/// explicit stand-in for a naming convention (`update_<p>` /
/// `error_update_<p>` methods found by attribute lookup).
#[derive(Default)]
pub struct UpdateHandlers {
    on_update: IndexMap<String, ValueCallback>,
    on_error: IndexMap<String, ErrorCallback>,
}

impl UpdateHandlers {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_update(mut self, parameter: impl Into<String>, cb: ValueCallback) -> Self {
        self.on_update.insert(parameter.into(), cb);
        self
    }

    #[must_use]
    pub fn with_error(mut self, parameter: impl Into<String>, cb: ErrorCallback) -> Self {
        self.on_error.insert(parameter.into(), cb);
        self
    }
}

/// Wire every one of `this`'s parameters into `other`: a parameter with
/// an explicit handler in `handlers` uses it; otherwise, if the
/// parameter's name is listed in `autoupdate`, both success and failure
/// are forwarded verbatim as an `announceUpdate`/error on `other`.
pub fn register_callbacks(this: &Module, other: &Arc<Module>, mut handlers: UpdateHandlers, autoupdate: &[String]) {
    for p in this.class().parameters() {
        let name = p.name.clone();
        let has_autoupdate = autoupdate.iter().any(|a| a == &name);

        match handlers.on_update.shift_remove(&name) {
            Some(cb) => this.callbacks().on_value(&name, cb),
            None if has_autoupdate => {
                let target = Arc::clone(other);
                let pname = name.clone();
                this.callbacks().on_value(
                    &name,
                    Box::new(move |v| target.announce_update(&pname, v.clone(), 0.0)),
                );
            }
            None => {}
        }

        match handlers.on_error.shift_remove(&name) {
            Some(cb) => this.callbacks().on_error(&name, cb),
            None if has_autoupdate => {
                let target = Arc::clone(other);
                let pname = name.clone();
                this.callbacks().on_error(
                    &name,
                    Box::new(move |kind, msg| target.announce_error_message(&pname, kind, msg)),
                );
            }
            None => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accessible::ParameterDecl;
    use crate::module_class::{merge_class, ClassLevel};
    use frappy_datatypes::{Datatype, FloatRange};
    use std::sync::atomic::{AtomicBool, Ordering};

    fn module(name: &str) -> Arc<Module> {
        let level = ClassLevel {
            parameters: vec![ParameterDecl::new("value", Datatype::FloatRange(FloatRange::default()))],
            ..Default::default()
        };
        Arc::new(Module::new(name, Arc::new(merge_class(&[level]).unwrap())))
    }

    #[test]
    fn autoupdate_forwards_value_to_the_other_module() {
        let source = module("src");
        let sink = module("sink");
        register_callbacks(&source, &sink, UpdateHandlers::new(), &["value".to_string()]);
        source.announce_update("value", Value::Double(3.0), 0.0);
        assert_eq!(sink.current_value("value"), Some(Value::Double(3.0)));
    }

    #[test]
    fn explicit_handler_takes_precedence_over_autoupdate() {
        let source = module("src");
        let sink = module("sink");
        let seen = Arc::new(AtomicBool::new(false));
        let seen_clone = Arc::clone(&seen);
        let handlers = UpdateHandlers::new().with_update(
            "value",
            Box::new(move |_| {
                seen_clone.store(true, Ordering::SeqCst);
            }),
        );
        register_callbacks(&source, &sink, handlers, &["value".to_string()]);
        source.announce_update("value", Value::Double(1.0), 0.0);
        assert!(seen.load(Ordering::SeqCst));
        assert_eq!(sink.current_value("value"), None);
    }

    #[test]
    fn parameter_not_listed_in_autoupdate_is_left_unwired() {
        let source = module("src");
        let sink = module("sink");
        register_callbacks(&source, &sink, UpdateHandlers::new(), &[]);
        source.announce_update("value", Value::Double(1.0), 0.0);
        assert_eq!(sink.current_value("value"), None);
    }
}
