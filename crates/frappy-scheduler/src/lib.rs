//! Per-module cooperative polling: the poll table (status/value ahead
//! of slower parameters, group-handler-aware), fast-poll toggling, and
//! deferred-write draining, one `tokio::task` per module instance.

pub mod entry;
pub mod poller;

pub use entry::{poll_entries_from_class, PollEntry};
pub use poller::Poller;
