//! Handler decorators: grouping several parameters behind one read or
//! write implementation, the common shape for a device where one bus
//! transaction refreshes (or sets) more than one SECoP parameter at
//! once.

use std::sync::Arc;

use frappy_datatypes::Value;

use crate::error::SecopResult;
use crate::module::Module;

pub type ReadFn = Arc<dyn Fn(&Module) -> SecopResult<()> + Send + Sync>;
pub type WriteFn = Arc<dyn Fn(&Module, &WriteParameters<'_>) -> SecopResult<()> + Send + Sync>;
/// A command implementation: takes the validated argument (if the
/// command declares one) and returns the validated result (if it
/// declares one), or `Ok(None)` for a command with no result.
pub type CommandFn = Arc<dyn Fn(&Module, Option<Value>) -> SecopResult<Option<Value>> + Send + Sync>;

/// A handler shared by several parameters' `read_<p>`. Only the first
/// key in `keys` is polled by the scheduler; the rest ride along for
/// free whenever that one is read, so they must not also be polled
/// independently (SECoP's group-handler poll rule).
#[derive(Clone)]
pub struct CommonReadHandler {
    keys: Vec<String>,
    read: ReadFn,
}

impl CommonReadHandler {
    #[must_use]
    pub fn new(keys: impl IntoIterator<Item = impl Into<String>>, read: ReadFn) -> Self {
        CommonReadHandler {
            keys: keys.into_iter().map(Into::into).collect(),
            read,
        }
    }

    #[must_use]
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    /// The one key the scheduler should actually poll for this group.
    #[must_use]
    pub fn polled_key(&self) -> &str {
        &self.keys[0]
    }

    /// Run the handler under the module's access lock. The handler is
    /// expected to call `module.announce_update` for each of `keys`
    /// itself; this wrapper only provides the lock discipline.
    pub fn invoke(&self, module: &Module) -> SecopResult<()> {
        module.with_access_lock(|| (self.read)(module))
    }
}

/// A view over a module's queued writes and current values for a fixed
/// set of keys, handed to a `CommonWriteHandler`. Looking up a key
/// first consumes any pending queued write for it (matching
/// `WriteParameters.__missing__`'s writeDict-first precedence), falling
/// back to the parameter's last known value.
pub struct WriteParameters<'a> {
    module: &'a Module,
    keys: &'a [String],
}

impl<'a> WriteParameters<'a> {
    #[must_use]
    pub fn new(module: &'a Module, keys: &'a [String]) -> Self {
        WriteParameters { module, keys }
    }

    /// Resolve one key: a still-queued write wins over the cached value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Value> {
        self.module
            .take_queued_write(key)
            .or_else(|| self.module.current_value(key))
    }

    /// Resolve every key this handler was built with, in declaration
    /// order, the handler-side equivalent of `.as_tuple(*keys)`.
    #[must_use]
    pub fn as_tuple(&self) -> Vec<Option<Value>> {
        self.keys.iter().map(|k| self.get(k)).collect()
    }
}

/// A handler shared by several parameters' `write_<p>`. After the
/// handler runs, every key it covers is guaranteed gone from the
/// module's queued-write set, whether or not the handler itself
/// happened to look each one up.
#[derive(Clone)]
pub struct CommonWriteHandler {
    keys: Vec<String>,
    write: WriteFn,
}

impl CommonWriteHandler {
    #[must_use]
    pub fn new(keys: impl IntoIterator<Item = impl Into<String>>, write: WriteFn) -> Self {
        CommonWriteHandler {
            keys: keys.into_iter().map(Into::into).collect(),
            write,
        }
    }

    #[must_use]
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn invoke(&self, module: &Module) -> SecopResult<()> {
        module.with_access_lock(|| {
            let params = WriteParameters::new(module, &self.keys);
            let result = (self.write)(module, &params);
            for key in &self.keys {
                module.take_queued_write(key);
            }
            result
        })
    }
}

/// A `do <mod>:<cmd>` implementation, run under the module's access
/// lock like any other handler so it can't race a concurrent read or
/// write of the parameters it touches.
#[derive(Clone)]
pub struct CommandHandler {
    name: String,
    run: CommandFn,
}

impl CommandHandler {
    #[must_use]
    pub fn new(name: impl Into<String>, run: CommandFn) -> Self {
        CommandHandler { name: name.into(), run }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn invoke(&self, module: &Module, argument: Option<Value>) -> SecopResult<Option<Value>> {
        module.with_access_lock(|| (self.run)(module, argument))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accessible::ParameterDecl;
    use crate::module_class::{merge_class, ClassLevel};
    use frappy_datatypes::{Datatype, FloatRange};
    use std::sync::atomic::{AtomicBool, Ordering};

    fn build_module() -> Module {
        let level = ClassLevel {
            parameters: vec![
                ParameterDecl::new("target", Datatype::FloatRange(FloatRange::default())).writable(),
                ParameterDecl::new("ramp", Datatype::FloatRange(FloatRange::default())).writable(),
            ],
            ..Default::default()
        };
        Module::new("th", std::sync::Arc::new(merge_class(&[level]).unwrap()))
    }

    #[test]
    fn common_write_handler_sees_queued_value_over_cached() {
        let module = build_module();
        module.queue_write("target", Value::Double(42.0));

        let seen = std::sync::Arc::new(std::sync::Mutex::new(None));
        let seen_clone = seen.clone();
        let handler = CommonWriteHandler::new(
            ["target", "ramp"],
            std::sync::Arc::new(move |_m: &Module, p: &WriteParameters<'_>| {
                *seen_clone.lock().unwrap() = p.get("target");
                Ok(())
            }),
        );

        handler.invoke(&module).unwrap();
        assert_eq!(*seen.lock().unwrap(), Some(Value::Double(42.0)));
        assert!(!module.has_queued_write("target"));
    }

    #[test]
    fn common_write_handler_drains_unaccessed_keys_too() {
        let module = build_module();
        module.queue_write("ramp", Value::Double(1.0));

        let handler = CommonWriteHandler::new(
            ["target", "ramp"],
            std::sync::Arc::new(|_m: &Module, _p: &WriteParameters<'_>| Ok(())),
        );
        handler.invoke(&module).unwrap();
        assert!(!module.has_queued_write("ramp"));
    }

    #[test]
    fn common_read_handler_runs_under_access_lock() {
        let module = build_module();
        let ran = AtomicBool::new(false);
        let handler = CommonReadHandler::new(
            ["target"],
            std::sync::Arc::new(move |_m: &Module| {
                ran.store(true, Ordering::SeqCst);
                Ok(())
            }),
        );
        assert_eq!(handler.polled_key(), "target");
        handler.invoke(&module).unwrap();
    }

    #[test]
    fn command_handler_returns_its_result() {
        let module = build_module();
        let handler = CommandHandler::new(
            "stop",
            std::sync::Arc::new(|_m: &Module, arg: Option<Value>| Ok(arg)),
        );
        let result = handler.invoke(&module, Some(Value::Double(1.0))).unwrap();
        assert_eq!(result, Some(Value::Double(1.0)));
    }
}
