use frappy_datatypes::Value;

/// What a module needs from the node it's mounted on: a way to announce
/// parameter updates to subscribed clients, and to learn whether anyone
/// is currently listening at all (so a module can skip expensive work
/// nobody will see).
///
/// Implemented by the dispatcher crate; modules only ever see
/// `Arc<dyn NodeHandle>`, which keeps this crate free of a dependency on
/// the dispatcher and avoids a cycle.
pub trait NodeHandle: Send + Sync {
    /// Broadcast a value update for `module:parameter` to every
    /// subscriber of that specific accessible and to every client that
    /// has activated the whole node. Implementations apply the
    /// `omit_unchanged_within` suppression themselves; by the time a
    /// module calls this, the value is authoritative.
    fn announce_update(&self, module: &str, parameter: &str, value: &Value, timestamp: f64);

    /// Broadcast a read/poll error for `module:parameter`. Per the error-
    /// dedup rule this is never suppressed by `omit_unchanged_within`,
    /// only by repeating the identical error string (handled by the
    /// implementation).
    fn announce_error(&self, module: &str, parameter: &str, kind: &str, error: &str, timestamp: f64);

    /// True if at least one client is subscribed to this accessible or
    /// has activated the node as a whole.
    fn has_subscribers(&self, module: &str, parameter: &str) -> bool;
}

/// A `NodeHandle` that drops every update, useful for constructing and
/// unit-testing a module in isolation before it's mounted on a real
/// node.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullNodeHandle;

impl NodeHandle for NullNodeHandle {
    fn announce_update(&self, _module: &str, _parameter: &str, _value: &Value, _timestamp: f64) {}

    fn announce_error(&self, _module: &str, _parameter: &str, _kind: &str, _error: &str, _timestamp: f64) {}

    fn has_subscribers(&self, _module: &str, _parameter: &str) -> bool {
        false
    }
}
