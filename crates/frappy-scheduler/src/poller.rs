//! The per-module cooperative poller: one `tokio::task`, status read
//! before value, slow parameters at a multiple of `pollinterval`,
//! fast-poll while busy, and queued-write draining every cycle.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use indexmap::IndexMap;
use parking_lot::Mutex;
use tokio::sync::{watch, Notify};
use tokio::time::Instant;

use frappy_core::{CommonWriteHandler, Module, PollPriority};

use crate::entry::PollEntry;

/// Per-module scheduler state. Construct one per module instance and
/// either drive it manually with [`Poller::tick`] (tests) or hand an
/// `Arc<Poller>` to [`Poller::run`] as a spawned task.
pub struct Poller {
    module: Arc<Module>,
    entries: Vec<PollEntry>,
    write_handlers: IndexMap<String, Arc<CommonWriteHandler>>,
    pollinterval: Duration,
    slowinterval: Duration,
    fast_poll: AtomicBool,
    fast_interval: Mutex<Duration>,
    last_poll: Mutex<IndexMap<String, Instant>>,
    notify: Notify,
}

impl Poller {
    /// `slowinterval_multiple` is SECoP's "typically a small
    /// multiple of pollinterval" framing for `Slow`-priority parameters;
    /// `write_handlers` need not be distinct from the read-side
    /// `entries`' handlers, they're tracked separately since a
    /// write-only parameter has no poll entry at all.
    #[must_use]
    pub fn new(
        module: Arc<Module>,
        entries: Vec<PollEntry>,
        write_handlers: Vec<Arc<CommonWriteHandler>>,
        pollinterval: Duration,
        slowinterval_multiple: u32,
    ) -> Self {
        let mut handler_by_key = IndexMap::new();
        for handler in write_handlers {
            for key in handler.keys() {
                handler_by_key.insert(key.clone(), handler.clone());
            }
        }
        let fast_interval = pollinterval.checked_div(10).unwrap_or(pollinterval);
        Poller {
            module,
            entries,
            write_handlers: handler_by_key,
            pollinterval,
            slowinterval: pollinterval * slowinterval_multiple.max(1),
            fast_poll: AtomicBool::new(false),
            fast_interval: Mutex::new(fast_interval),
            last_poll: Mutex::new(IndexMap::new()),
            notify: Notify::new(),
        }
    }

    /// Flip fast-poll mode, optionally overriding the fast interval.
    /// Mirrors `setFastPoll(on, interval=None)`.
    pub fn set_fast_poll(&self, on: bool, interval: Option<Duration>) {
        self.fast_poll.store(on, Ordering::SeqCst);
        if let Some(i) = interval {
            *self.fast_interval.lock() = i;
        }
    }

    #[must_use]
    pub fn is_fast_poll(&self) -> bool {
        self.fast_poll.load(Ordering::SeqCst)
    }

    /// Wake the poller immediately instead of waiting out its current
    /// sleep. Mirrors `triggerPoll()`.
    pub fn trigger_poll(&self) {
        self.notify.notify_one();
    }

    fn effective_interval(&self, priority: PollPriority) -> Duration {
        match priority {
            PollPriority::Never => Duration::MAX,
            PollPriority::Slow => self.slowinterval,
            PollPriority::Regular | PollPriority::Auto => self.pollinterval,
            PollPriority::Dynamic => {
                if self.fast_poll.load(Ordering::SeqCst) || self.module.is_busy() {
                    *self.fast_interval.lock()
                } else {
                    self.pollinterval
                }
            }
        }
    }

    fn due(&self, key: &str, interval: Duration) -> bool {
        match self.last_poll.lock().get(key) {
            Some(t) => t.elapsed() >= interval,
            None => true,
        }
    }

    fn mark_polled(&self, key: &str) {
        self.last_poll.lock().insert(key.to_string(), Instant::now());
    }

    /// Run one scheduling pass: drain queued writes, then poll every
    /// due entry, `status` always ordered before `value` among entries
    /// that are due in the same pass (the "status precedes value"
    /// read-ordering guarantee). Exposed separately from [`Poller::run`]
    /// so tests can drive the schedule deterministically.
    pub fn tick(&self) {
        self.drain_writes();

        let mut ordered: Vec<&PollEntry> = self.entries.iter().collect();
        ordered.sort_by_key(|e| match e.key() {
            "status" => 0,
            "value" => 1,
            _ => 2,
        });

        for entry in ordered {
            if entry.priority() == PollPriority::Never {
                continue;
            }
            let interval = self.effective_interval(entry.priority());
            if !self.due(entry.key(), interval) {
                continue;
            }
            if let Err(err) = entry.handler.invoke(&self.module) {
                tracing::warn!(
                    module = self.module.name(),
                    parameter = entry.key(),
                    error = %err,
                    "poll failed"
                );
                self.module.announce_error(entry.key(), &err);
            }
            self.mark_polled(entry.key());
        }
    }

    /// Drain every parameter name currently queued for a deferred write,
    /// invoking each covering handler once even if it covers several
    /// queued keys at once.
    fn drain_writes(&self) {
        let mut handled = HashSet::new();
        for key in self.module.pending_write_keys() {
            if handled.contains(&key) {
                continue;
            }
            let Some(handler) = self.write_handlers.get(&key) else {
                continue;
            };
            if let Err(err) = handler.invoke(&self.module) {
                tracing::warn!(
                    module = self.module.name(),
                    parameter = %key,
                    error = %err,
                    "deferred write failed"
                );
            }
            for k in handler.keys() {
                handled.insert(k.clone());
            }
        }
    }

    /// The spawned main loop: ticks, then sleeps until either the
    /// granularity elapses, `trigger_poll` wakes it, or `shutdown`
    /// reports true.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let granularity = (*self.fast_interval.lock())
            .min(self.pollinterval)
            .max(Duration::from_millis(10));
        loop {
            if *shutdown.borrow() {
                break;
            }
            self.tick();
            tokio::select! {
                () = tokio::time::sleep(granularity) => {}
                () = self.notify.notified() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use frappy_core::{merge_class, ClassLevel, CommonReadHandler, ParameterDecl};
    use frappy_datatypes::{Datatype, FloatRange, Value};
    use std::sync::atomic::{AtomicU32, Ordering as AOrd};

    fn build_module() -> Arc<Module> {
        let level = ClassLevel {
            parameters: vec![
                ParameterDecl::new("status", Datatype::FloatRange(FloatRange::default())),
                ParameterDecl::new("value", Datatype::FloatRange(FloatRange::default())),
                ParameterDecl::new("extra", Datatype::FloatRange(FloatRange::default())),
            ],
            ..Default::default()
        };
        Arc::new(Module::new("th", Arc::new(merge_class(&[level]).unwrap())))
    }

    #[test]
    fn status_is_polled_before_value_in_the_same_tick() {
        let module = build_module();
        let order = Arc::new(Mutex::new(Vec::new()));

        let order_v = order.clone();
        let value_entry = PollEntry::new(
            PollPriority::Dynamic,
            CommonReadHandler::new(
                ["value"],
                Arc::new(move |m: &Module| {
                    order_v.lock().push("value");
                    m.announce_update("value", Value::Double(1.0), 0.0);
                    Ok(())
                }),
            ),
        );
        let order_s = order.clone();
        let status_entry = PollEntry::new(
            PollPriority::Dynamic,
            CommonReadHandler::new(
                ["status"],
                Arc::new(move |m: &Module| {
                    order_s.lock().push("status");
                    m.announce_update("status", Value::Double(0.0), 0.0);
                    Ok(())
                }),
            ),
        );

        let poller = Poller::new(
            module,
            vec![value_entry, status_entry],
            vec![],
            Duration::from_millis(100),
            4,
        );
        poller.tick();
        assert_eq!(*order.lock(), vec!["status", "value"]);
    }

    #[test]
    fn slow_parameter_is_not_due_again_immediately() {
        let module = build_module();
        let count = Arc::new(AtomicU32::new(0));
        let count_clone = count.clone();
        let entry = PollEntry::new(
            PollPriority::Slow,
            CommonReadHandler::new(
                ["extra"],
                Arc::new(move |_m: &Module| {
                    count_clone.fetch_add(1, AOrd::SeqCst);
                    Ok(())
                }),
            ),
        );
        let poller = Poller::new(module, vec![entry], vec![], Duration::from_secs(10), 4);
        poller.tick();
        poller.tick();
        assert_eq!(count.load(AOrd::SeqCst), 1, "slow interval should not have elapsed yet");
    }

    #[test]
    fn fast_poll_mode_shortens_the_dynamic_interval() {
        let module = build_module();
        let entry = PollEntry::new(
            PollPriority::Dynamic,
            CommonReadHandler::new(["value"], Arc::new(|_m: &Module| Ok(()))),
        );
        let poller = Poller::new(module, vec![entry], vec![], Duration::from_secs(10), 4);
        poller.set_fast_poll(true, Some(Duration::from_millis(1)));
        assert!(poller.is_fast_poll());
        assert_eq!(poller.effective_interval(PollPriority::Dynamic), Duration::from_millis(1));
    }

    #[test]
    fn queued_write_is_drained_on_tick() {
        let module = build_module();
        module.queue_write("extra", Value::Double(7.0));
        let seen = Arc::new(Mutex::new(None));
        let seen_clone = seen.clone();
        let handler = Arc::new(CommonWriteHandler::new(
            ["extra"],
            Arc::new(move |_m: &Module, p: &frappy_core::WriteParameters<'_>| {
                *seen_clone.lock() = p.get("extra");
                Ok(())
            }),
        ));
        let poller = Poller::new(module.clone(), vec![], vec![handler], Duration::from_secs(10), 4);
        poller.tick();
        assert_eq!(*seen.lock(), Some(Value::Double(7.0)));
        assert!(!module.has_queued_write("extra"));
    }
}
