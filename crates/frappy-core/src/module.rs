use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;

use frappy_datatypes::Value;

use crate::callbacks::CallbackRegistry;
use crate::error::{SecopError, SecopResult};
use crate::module_class::MergedClass;
use crate::node_ctx::{NodeHandle, NullNodeHandle};
use crate::param_cell::{now, ParamCell};
use crate::status;

/// The runtime instance of a module: its merged class shape plus the
/// per-instance state (`ParamCell`s, the deferred-write queue, and the
/// handle back to the node for broadcasting updates).
///
/// `access_lock` mirrors SECoP's per-module lock: every handler
/// invocation (read or write) runs while holding it, so a write landing
/// mid-poll-cycle can't race a read of the same parameter.
pub struct Module {
    name: String,
    class: Arc<MergedClass>,
    cells: Mutex<IndexMap<String, ParamCell>>,
    /// Values written before the module finished constructing, to be
    /// applied by the first poll/write handler invocation that runs
    /// after startup, draining as each is consumed.
    write_dict: Mutex<IndexMap<String, Value>>,
    access_lock: Mutex<()>,
    node: Arc<dyn NodeHandle>,
    disabled: Mutex<bool>,
    callbacks: CallbackRegistry,
}

impl Module {
    #[must_use]
    pub fn new(name: impl Into<String>, class: Arc<MergedClass>) -> Self {
        let mut cells = IndexMap::new();
        for p in class.parameters() {
            let mut cell = ParamCell::new(&p.name);
            if let Some(default) = &p.default {
                cell.set(default.clone());
            }
            cells.insert(p.name.clone(), cell);
        }
        Module {
            name: name.into(),
            class,
            cells: Mutex::new(cells),
            write_dict: Mutex::new(IndexMap::new()),
            access_lock: Mutex::new(()),
            node: Arc::new(NullNodeHandle),
            disabled: Mutex::new(false),
            callbacks: CallbackRegistry::default(),
        }
    }

    /// The registry [`crate::callbacks::register_callbacks`] and
    /// ad-hoc per-parameter wiring (e.g. auto-persistence) attach to.
    #[must_use]
    pub fn callbacks(&self) -> &CallbackRegistry {
        &self.callbacks
    }

    #[must_use]
    pub fn with_node(mut self, node: Arc<dyn NodeHandle>) -> Self {
        self.node = node;
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn class(&self) -> &MergedClass {
        &self.class
    }

    #[must_use]
    pub fn is_disabled(&self) -> bool {
        *self.disabled.lock()
    }

    pub fn set_disabled(&self, disabled: bool) {
        *self.disabled.lock() = disabled;
    }

    /// Queue a value to be picked up by the next handler invocation that
    /// consumes it (`CommonWriteHandler`'s `WriteParameters`), rather
    /// than applying it directly. Used for both configured initial
    /// values and persisted/factory-reset values.
    pub fn queue_write(&self, parameter: &str, value: Value) {
        self.write_dict.lock().insert(parameter.to_string(), value);
    }

    #[must_use]
    pub fn has_queued_write(&self, parameter: &str) -> bool {
        self.write_dict.lock().contains_key(parameter)
    }

    #[must_use]
    pub fn write_dict_is_empty(&self) -> bool {
        self.write_dict.lock().is_empty()
    }

    /// Snapshot of the parameter names currently queued for a
    /// deferred write, in insertion order. Used by the poller to know
    /// which `write_<p>` hooks to drive each cycle without consuming
    /// entries it has no handler for.
    #[must_use]
    pub fn pending_write_keys(&self) -> Vec<String> {
        self.write_dict.lock().keys().cloned().collect()
    }

    /// Pop a queued write if present, matching `WriteParameters.__missing__`'s
    /// "writeDict first" precedence.
    #[must_use]
    pub fn take_queued_write(&self, parameter: &str) -> Option<Value> {
        self.write_dict.lock().shift_remove(parameter)
    }

    /// Run `body` while holding the module's access lock, mirroring every
    /// handler invocation running under `module.accessLock`.
    pub fn with_access_lock<R>(&self, body: impl FnOnce() -> R) -> R {
        let _guard = self.access_lock.lock();
        body()
    }

    #[must_use]
    pub fn current_value(&self, parameter: &str) -> Option<Value> {
        self.cells.lock().get(parameter).and_then(|c| c.value().cloned())
    }

    #[must_use]
    pub fn current_error(&self, parameter: &str) -> Option<String> {
        self.cells.lock().get(parameter).and_then(|c| c.error().map(str::to_string))
    }

    /// `(kind, message)` of the parameter's currently stored read error,
    /// if any — the structured form `error_update`'s detail array needs.
    #[must_use]
    pub fn current_error_detail(&self, parameter: &str) -> Option<(String, String)> {
        self.cells.lock().get(parameter).and_then(|c| {
            let message = c.error()?;
            let kind = c.error_kind().unwrap_or("InternalError");
            Some((kind.to_string(), message.to_string()))
        })
    }

    #[must_use]
    pub fn timestamp(&self, parameter: &str) -> Option<f64> {
        self.cells.lock().get(parameter).map(ParamCell::timestamp)
    }

    /// Record a fresh value and, unless it's a within-window repeat of
    /// the previous good value, broadcast it through the node handle.
    /// The error-dedup rule takes priority: an incoming error is never
    /// treated as "unchanged" regardless of the window.
    pub fn announce_update(&self, parameter: &str, value: Value, omit_unchanged_within: f64) {
        let ts = now();
        let unchanged = {
            let cells = self.cells.lock();
            cells
                .get(parameter)
                .is_some_and(|c| c.is_unchanged_within(&value, omit_unchanged_within, ts))
        };

        {
            let mut cells = self.cells.lock();
            if let Some(cell) = cells.get_mut(parameter) {
                cell.set(value.clone());
            }
        }

        if !unchanged {
            self.callbacks.fire_value(parameter, &value);
            self.node.announce_update(&self.name, parameter, &value, ts);
        }
    }

    /// Record and broadcast a read/poll failure. An error whose rendered
    /// message is identical to the parameter's currently-stored error is
    /// a complete no-op: no cache mutation, no callbacks, no dispatcher
    /// notification. This dedup is checked *before*, and is independent
    /// of, the unchanged-value window `announce_update` uses, which only
    /// ever applies to non-error updates.
    pub fn announce_error(&self, parameter: &str, err: &SecopError) {
        self.announce_error_message(parameter, err.kind(), &err.to_string());
    }

    /// As [`Self::announce_error`], but from an already-rendered kind and
    /// message. Used both by `announce_error` itself and by callback
    /// forwarding (`registerCallbacks`'s autoupdate path), which has no
    /// [`SecopError`] of its own to re-render.
    pub fn announce_error_message(&self, parameter: &str, kind: &str, message: &str) {
        let duplicate = {
            let cells = self.cells.lock();
            cells.get(parameter).is_some_and(|c| c.error() == Some(message))
        };
        if duplicate {
            return;
        }

        let ts = now();
        {
            let mut cells = self.cells.lock();
            if let Some(cell) = cells.get_mut(parameter) {
                cell.set_error_message(kind, message);
            }
        }
        self.callbacks.fire_error(parameter, kind, message);
        self.node.announce_error(&self.name, parameter, kind, message, ts);
    }

    /// Whether `status`'s current code falls in the "busy" range. Used
    /// by the scheduler to switch a module to fast-poll mode.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.status_code().is_some_and(status::is_busy)
    }

    #[must_use]
    pub fn is_driving(&self) -> bool {
        self.status_code().is_some_and(status::is_driving)
    }

    fn status_code(&self) -> Option<i64> {
        match self.current_value("status")? {
            Value::Tuple(parts) => match parts.first() {
                Some(Value::Enum(e)) => Some(e.value),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn ensure_not_disabled(&self) -> SecopResult<()> {
        if self.is_disabled() {
            Err(SecopError::Disabled(self.name.clone()))
        } else {
            Ok(())
        }
    }

    pub fn ensure_writable(&self, parameter: &str) -> SecopResult<()> {
        let decl = self
            .class
            .parameter(parameter)
            .ok_or_else(|| SecopError::NoSuchParameter {
                module: self.name.clone(),
                parameter: parameter.to_string(),
            })?;
        if decl.readonly {
            return Err(SecopError::ReadOnly {
                module: self.name.clone(),
                parameter: parameter.to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accessible::ParameterDecl;
    use crate::module_class::{merge_class, ClassLevel};
    use frappy_datatypes::{Datatype, FloatRange};

    fn test_module() -> Module {
        let level = ClassLevel {
            parameters: vec![
                ParameterDecl::new("value", Datatype::FloatRange(FloatRange::default())),
                ParameterDecl::new("target", Datatype::FloatRange(FloatRange::default())).writable(),
            ],
            ..Default::default()
        };
        let merged = merge_class(&[level]).unwrap();
        Module::new("th", Arc::new(merged))
    }

    #[test]
    fn writable_parameter_accepts_changes() {
        let m = test_module();
        assert!(m.ensure_writable("target").is_ok());
        assert!(m.ensure_writable("value").is_err());
    }

    #[test]
    fn unknown_parameter_is_reported_by_name() {
        let m = test_module();
        let err = m.ensure_writable("nope").unwrap_err();
        assert!(matches!(err, SecopError::NoSuchParameter { .. }));
    }

    #[test]
    fn queued_write_is_consumed_once() {
        let m = test_module();
        m.queue_write("target", Value::Double(1.0));
        assert!(m.has_queued_write("target"));
        assert_eq!(m.take_queued_write("target"), Some(Value::Double(1.0)));
        assert!(!m.has_queued_write("target"));
    }

    #[test]
    fn announce_update_records_value() {
        let m = test_module();
        m.announce_update("value", Value::Double(3.0), 0.0);
        assert_eq!(m.current_value("value"), Some(Value::Double(3.0)));
    }

    #[test]
    fn disabled_module_rejects_access() {
        let m = test_module();
        m.set_disabled(true);
        assert!(matches!(m.ensure_not_disabled(), Err(SecopError::Disabled(_))));
    }

    #[test]
    fn repeated_identical_error_is_a_complete_no_op() {
        let m = test_module();
        m.announce_error("value", &SecopError::CommFailed("timeout".into()));
        let ts_after_first = m.timestamp("value").unwrap();
        m.announce_error("value", &SecopError::CommFailed("timeout".into()));
        assert_eq!(m.timestamp("value").unwrap(), ts_after_first);
    }

    #[test]
    fn distinct_error_message_is_not_suppressed() {
        let m = test_module();
        m.announce_error("value", &SecopError::CommFailed("timeout".into()));
        m.announce_error("value", &SecopError::CommFailed("reset".into()));
        assert_eq!(m.current_error("value").as_deref(), Some("communication failed: reset"));
    }
}
