//! The poll table entry: a scheduled parameter plus the (possibly
//! group-shared) handler that refreshes it.

use frappy_core::{CommonReadHandler, MergedClass, PollPriority};

/// One row of a module's poll table. `key` is the single parameter the
/// scheduler actually times and polls; if `handler` covers more than
/// one parameter (a group handler), the others ride along for free and
/// must not also appear as their own entry.
pub struct PollEntry {
    pub(crate) key: String,
    pub(crate) priority: PollPriority,
    pub(crate) handler: CommonReadHandler,
}

impl PollEntry {
    /// Build an entry from a handler and the already-resolved priority
    /// of its polled key (`ParameterDecl::resolved_poll`'s `Auto`
    /// conversion has already happened by the time this runs).
    #[must_use]
    pub fn new(priority: PollPriority, handler: CommonReadHandler) -> Self {
        let key = handler.polled_key().to_string();
        PollEntry { key, priority, handler }
    }

    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    #[must_use]
    pub fn priority(&self) -> PollPriority {
        self.priority
    }
}

/// Convenience builder: look up each handler's polled key in the merged
/// class to resolve its priority, skipping handlers whose key resolves
/// to `Never` (an explicit `nopoll` or `poll=false` declaration) since
/// those have nothing to schedule.
#[must_use]
pub fn poll_entries_from_class(class: &MergedClass, handlers: Vec<CommonReadHandler>) -> Vec<PollEntry> {
    handlers
        .into_iter()
        .filter_map(|handler| {
            let decl = class.parameter(handler.polled_key())?;
            let priority = decl.resolved_poll();
            if priority == PollPriority::Never {
                None
            } else {
                Some(PollEntry::new(priority, handler))
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use frappy_core::{merge_class, ClassLevel, ParameterDecl};
    use frappy_datatypes::{Datatype, FloatRange};
    use std::sync::Arc;

    #[test]
    fn nopoll_parameter_is_dropped_from_the_table() {
        let level = ClassLevel {
            parameters: vec![
                ParameterDecl::new("value", Datatype::FloatRange(FloatRange::default())),
                ParameterDecl::new("serial", Datatype::FloatRange(FloatRange::default())).nopoll(),
            ],
            ..Default::default()
        };
        let class = merge_class(&[level]).unwrap();
        let handlers = vec![
            CommonReadHandler::new(["value"], Arc::new(|_m| Ok(()))),
            CommonReadHandler::new(["serial"], Arc::new(|_m| Ok(()))),
        ];
        let entries = poll_entries_from_class(&class, handlers);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].key(), "value");
    }

    #[test]
    fn value_resolves_to_dynamic_priority() {
        let level = ClassLevel {
            parameters: vec![ParameterDecl::new("value", Datatype::FloatRange(FloatRange::default()))],
            ..Default::default()
        };
        let class = merge_class(&[level]).unwrap();
        let handlers = vec![CommonReadHandler::new(["value"], Arc::new(|_m| Ok(())))];
        let entries = poll_entries_from_class(&class, handlers);
        assert_eq!(entries[0].priority(), PollPriority::Dynamic);
    }
}
