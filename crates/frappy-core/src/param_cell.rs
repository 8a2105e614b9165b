use std::time::{SystemTime, UNIX_EPOCH};

use frappy_datatypes::Value;

use crate::error::SecopError;

/// Current POSIX timestamp in fractional seconds, the unit SECoP uses on
/// the wire for every `t` field.
#[must_use]
pub fn now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

/// Per-instance state backing one parameter: the last known value (or
/// read error), its timestamp, and whether it is currently considered
/// "readerror" for the purpose of `announceUpdate` dedup.
///
/// Kept separate from `ParameterDecl` (the class-level descriptor)
/// because the same declared parameter produces one independent cell per
/// module instance.
#[derive(Debug, Clone)]
pub struct ParamCell {
    name: String,
    value: Option<Value>,
    timestamp: f64,
    error: Option<String>,
    error_kind: Option<String>,
}

impl ParamCell {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        ParamCell {
            name: name.into(),
            value: None,
            timestamp: 0.0,
            error: None,
            error_kind: None,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn value(&self) -> Option<&Value> {
        self.value.as_ref()
    }

    #[must_use]
    pub fn timestamp(&self) -> f64 {
        self.timestamp
    }

    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// The wire `kind` string (`"CommFailed"`, `"HardwareError"`, …) of
    /// the currently stored error, if any.
    #[must_use]
    pub fn error_kind(&self) -> Option<&str> {
        self.error_kind.as_deref()
    }

    #[must_use]
    pub fn has_error(&self) -> bool {
        self.error.is_some()
    }

    /// Record a freshly read/written value at the current time, clearing
    /// any previous read error.
    pub fn set(&mut self, value: Value) {
        self.value = Some(value);
        self.timestamp = now();
        self.error = None;
        self.error_kind = None;
    }

    /// Record a read/write failure. The stale value is kept (a client
    /// asking for the parameter's value mid-error still gets the last
    /// good one on request, only the update broadcast carries the error).
    pub fn set_error(&mut self, err: &SecopError) {
        self.set_error_message(err.kind(), &err.to_string());
    }

    /// As [`Self::set_error`], but from an already-rendered kind and
    /// message — used when forwarding another module's error verbatim
    /// (e.g. `registerCallbacks`'s autoupdate forwarding), which has no
    /// `SecopError` of its own to re-render.
    pub fn set_error_message(&mut self, kind: &str, message: &str) {
        self.error = Some(message.to_string());
        self.error_kind = Some(kind.to_string());
        self.timestamp = now();
    }

    /// True if `candidate` would be an unchanged, error-free repeat of
    /// the cell's current content within `window` seconds — the test
    /// `announceUpdate` uses to decide whether to suppress a broadcast.
    /// Per the dedup priority rule, an error report is never suppressed
    /// by this check: callers must test `has_error`/incoming-error first.
    #[must_use]
    pub fn is_unchanged_within(&self, candidate: &Value, window: f64, now_ts: f64) -> bool {
        if self.has_error() {
            return false;
        }
        match &self.value {
            Some(v) if v == candidate => (now_ts - self.timestamp) < window,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_cell_has_no_value() {
        let cell = ParamCell::new("value");
        assert!(cell.value().is_none());
        assert!(!cell.has_error());
    }

    #[test]
    fn set_clears_previous_error() {
        let mut cell = ParamCell::new("value");
        cell.set_error(&SecopError::CommFailed("timeout".into()));
        assert!(cell.has_error());
        cell.set(Value::Double(1.0));
        assert!(!cell.has_error());
        assert_eq!(cell.value(), Some(&Value::Double(1.0)));
    }

    #[test]
    fn unchanged_within_window_is_detected() {
        let mut cell = ParamCell::new("value");
        cell.set(Value::Double(2.0));
        let ts = cell.timestamp();
        assert!(cell.is_unchanged_within(&Value::Double(2.0), 1.0, ts + 0.1));
        assert!(!cell.is_unchanged_within(&Value::Double(2.0), 1.0, ts + 2.0));
        assert!(!cell.is_unchanged_within(&Value::Double(3.0), 1.0, ts + 0.1));
    }

    #[test]
    fn error_state_is_never_considered_unchanged() {
        let mut cell = ParamCell::new("value");
        cell.set(Value::Double(2.0));
        cell.set_error(&SecopError::CommFailed("x".into()));
        assert!(!cell.is_unchanged_within(&Value::Double(2.0), 10.0, cell.timestamp()));
    }
}
