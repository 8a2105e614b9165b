//! A cooperative, non-blocking per-module driver loop: state functions run
//! to completion synchronously and return where to go next, so `cycle()`
//! can be called from a single poller task without blocking it.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::param_cell::now;

/// A state function: given mutable access to the machine's context `C`,
/// does one step of work and says what happens next.
pub type StateFn<C> = Arc<dyn Fn(&mut C, &mut StateMachine<C>) -> StateResult<C> + Send + Sync>;

/// What a state function returns.
pub enum StateResult<C> {
    /// Move to a new state immediately; `cycle()` keeps chaining through
    /// `Next` transitions within the same call, up to `maxloops`.
    Next(StateFn<C>),
    /// Stay in the current (conceptual) state, but yield back to the
    /// poller; the same function runs again on the next cycle. Used for
    /// "not ready yet, check again later" waits.
    Retry(StateFn<C>),
    /// The state machine has reached a terminal state; `is_finished()`
    /// becomes true and `cycle()` stops invoking anything further.
    Finish,
}

/// A pending request to (re)start the machine in a new state, optionally
/// replacing the cleanup function. Matches `kwds.setdefault('cleanup',
/// None)`: a restart issued with no explicit cleanup clears whatever
/// cleanup was previously registered, it is not preserved.
struct StartRequest<C> {
    state: StateFn<C>,
    cleanup: Option<StateFn<C>>,
}

/// A pending request to stop the machine, running `cleanup` (if any)
/// before transitioning to `Finish`.
struct StopRequest<C> {
    cleanup: Option<StateFn<C>>,
}

enum Pending<C> {
    Start(StartRequest<C>),
    Stop(StopRequest<C>),
}

/// Why the machine most recently entered its cleanup function (or, having
/// none, went straight to `Finish`). Mirrors a `cleanup_reason`-style
/// runtime attribute; a concrete module's state functions read this via
/// [`StateMachine::cleanup_reason`] to decide whether to announce an
/// `InternalError` on its `status` parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupReason {
    /// An external `start()` replaced the running state before it reached
    /// a natural `Finish`.
    Start,
    /// An external `stop()` was issued.
    Stop,
    /// A single `cycle()` chained `maxloops` `Next` transitions without
    /// reaching `Retry`/`Finish` — almost certainly a programming error in
    /// a state function, not something the poller should hang retrying.
    MaxLoopsExceeded,
}

/// The driver itself: current state, optional cleanup, and timing used
/// by `delta()`. Requests injected from outside (`start`/`stop`) are
/// queued under a lock and only take effect at the top of `cycle()`.
pub struct StateMachine<C> {
    current: Option<StateFn<C>>,
    cleanup: Option<StateFn<C>>,
    last_transition: f64,
    finished: bool,
    status_prefix: Option<&'static str>,
    cleanup_reason: Option<CleanupReason>,
    pending: Mutex<Option<Pending<C>>>,
}

impl<C> StateMachine<C> {
    #[must_use]
    pub fn new(initial: StateFn<C>) -> Self {
        StateMachine {
            current: Some(initial),
            cleanup: None,
            last_transition: now(),
            finished: false,
            status_prefix: None,
            cleanup_reason: None,
            pending: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn idle() -> Self
    where
        C: 'static,
    {
        StateMachine {
            current: None,
            cleanup: None,
            last_transition: now(),
            finished: true,
            status_prefix: None,
            cleanup_reason: None,
            pending: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Seconds since the last state transition; state functions use this
    /// to implement timeouts without needing their own clock.
    #[must_use]
    pub fn delta(&self) -> f64 {
        now() - self.last_transition
    }

    #[must_use]
    pub fn delta_at_least(&self, mindelta: f64) -> bool {
        self.delta() >= mindelta
    }

    /// Request a (re)start from outside the cycle loop. Thread-safe: may
    /// be called from any task while a poller is mid-`cycle()`. The new
    /// state only takes effect at the next `cycle()` call — but `cycle`
    /// runs its outer loop twice specifically so a `start()` issued while
    /// the machine was idle still takes effect within that same call.
    pub fn start(&self, state: StateFn<C>, cleanup: Option<StateFn<C>>) {
        *self.pending.lock() = Some(Pending::Start(StartRequest { state, cleanup }));
    }

    /// Request a stop from outside the cycle loop, running `cleanup` (if
    /// given) before the machine reports finished. A `Stop` issued while
    /// a `Start` is already pending overrides it, and vice versa — only
    /// the most recent request wins.
    pub fn stop(&self, cleanup: Option<StateFn<C>>) {
        *self.pending.lock() = Some(Pending::Stop(StopRequest { cleanup }));
    }

    /// A short human status decoration layered over the module's own
    /// status text while a stop or restart is in flight, e.g.
    /// `"stopping (ramping)"`.
    #[must_use]
    pub fn status_decoration(&self, base: &str) -> String {
        match self.status_prefix {
            Some(prefix) => format!("{prefix} ({base})"),
            None => base.to_string(),
        }
    }

    /// The reason the machine most recently entered cleanup (or went
    /// straight to `Finish`), `None` if it has never done so. A concrete
    /// module's state functions consult this after a cycle to decide
    /// whether to announce an `InternalError`.
    #[must_use]
    pub fn cleanup_reason(&self) -> Option<CleanupReason> {
        self.cleanup_reason
    }

    fn take_pending(&self) -> Option<Pending<C>> {
        self.pending.lock().take()
    }

    fn apply_start(&mut self, req: StartRequest<C>) {
        self.current = Some(req.state);
        self.cleanup = req.cleanup;
        self.finished = false;
        self.status_prefix = Some("restarting");
        self.cleanup_reason = Some(CleanupReason::Start);
        self.last_transition = now();
    }

    fn apply_stop(&mut self, req: StopRequest<C>) {
        self.cleanup = req.cleanup.or_else(|| self.cleanup.take());
        self.status_prefix = Some("stopping");
        self.cleanup_reason = Some(CleanupReason::Stop);
        if let Some(cleanup) = self.cleanup.take() {
            self.current = Some(cleanup);
        } else {
            self.current = None;
            self.finished = true;
        }
        self.last_transition = now();
    }

    /// `maxloops` was exceeded mid-chain: break the loop by entering
    /// cleanup (if one is registered) tagged `MaxLoopsExceeded`, exactly
    /// as a `stop()` would, rather than leaving the machine spinning.
    fn apply_maxloops_exceeded(&mut self, maxloops: usize) {
        tracing::warn!(
            maxloops,
            "state machine chained the maximum number of transitions in one cycle; \
             entering cleanup as an internal error"
        );
        self.cleanup_reason = Some(CleanupReason::MaxLoopsExceeded);
        self.status_prefix = Some("internal error");
        if let Some(cleanup) = self.cleanup.take() {
            self.current = Some(cleanup);
        } else {
            self.current = None;
            self.finished = true;
        }
        self.last_transition = now();
    }

    /// Run the machine forward, chaining `Next` transitions within this
    /// call up to `maxloops` times (an infinite `Next` chain is a
    /// programming error in a state function, not something `cycle()`
    /// should hang on). Returns the number of transitions actually taken.
    ///
    /// The outer loop runs twice: a `Start`/`Stop` applied in the first
    /// pass — including one that replaces an already-finished machine's
    /// state — gets to run its first state function in the same call,
    /// rather than waiting for the next poller tick.
    pub fn cycle(&mut self, ctx: &mut C, maxloops: usize) -> usize {
        let mut total_transitions = 0;

        for _outer_pass in 0..2 {
            if let Some(pending) = self.take_pending() {
                match pending {
                    Pending::Start(req) => self.apply_start(req),
                    Pending::Stop(req) => self.apply_stop(req),
                }
            }

            if self.finished {
                continue;
            }

            let mut looped = false;
            for _ in 0..maxloops {
                looped = true;
                let Some(state_fn) = self.current.clone() else {
                    break;
                };
                match state_fn(ctx, self) {
                    StateResult::Next(next) => {
                        self.current = Some(next);
                        self.last_transition = now();
                        self.status_prefix = None;
                        total_transitions += 1;
                    }
                    StateResult::Retry(same) => {
                        self.current = Some(same);
                        break;
                    }
                    StateResult::Finish => {
                        self.current = None;
                        self.finished = true;
                        self.status_prefix = None;
                        break;
                    }
                }
                if self.finished {
                    break;
                }
            }
            if looped && !self.finished && self.current.is_some() && total_transitions >= maxloops {
                self.apply_maxloops_exceeded(maxloops);
            }
        }

        total_transitions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Counter {
        steps: u32,
    }

    fn count_up(ctx: &mut Counter, _sm: &mut StateMachine<Counter>) -> StateResult<Counter> {
        ctx.steps += 1;
        if ctx.steps < 3 {
            StateResult::Next(Arc::new(count_up))
        } else {
            StateResult::Finish
        }
    }

    fn wait_forever(_ctx: &mut Counter, _sm: &mut StateMachine<Counter>) -> StateResult<Counter> {
        StateResult::Retry(Arc::new(wait_forever))
    }

    #[test]
    fn next_chains_within_one_cycle_call() {
        let mut ctx = Counter { steps: 0 };
        let mut sm = StateMachine::new(Arc::new(count_up));
        sm.cycle(&mut ctx, 10);
        assert_eq!(ctx.steps, 3);
        assert!(sm.is_finished());
    }

    #[test]
    fn retry_does_not_advance_without_new_cycles() {
        let mut ctx = Counter { steps: 0 };
        let mut sm = StateMachine::new(Arc::new(wait_forever));
        sm.cycle(&mut ctx, 10);
        assert!(!sm.is_finished());
    }

    #[test]
    fn start_issued_while_idle_runs_within_the_same_cycle_call() {
        let mut ctx = Counter { steps: 0 };
        let mut sm: StateMachine<Counter> = StateMachine::idle();
        sm.start(Arc::new(count_up), None);
        sm.cycle(&mut ctx, 10);
        assert_eq!(ctx.steps, 3);
        assert!(sm.is_finished());
    }

    #[test]
    fn restart_without_explicit_cleanup_drops_previous_cleanup() {
        let mut ctx = Counter { steps: 0 };
        let mut sm = StateMachine::new(Arc::new(wait_forever));
        sm.start(Arc::new(wait_forever), Some(Arc::new(count_up)));
        sm.cycle(&mut ctx, 10);
        // restart again with no cleanup argument: old cleanup must be gone
        sm.start(Arc::new(wait_forever), None);
        sm.stop(None);
        sm.cycle(&mut ctx, 10);
        assert!(sm.is_finished());
        assert_eq!(ctx.steps, 0);
    }

    #[test]
    fn stop_runs_cleanup_before_finishing() {
        let mut ctx = Counter { steps: 0 };
        let mut sm = StateMachine::new(Arc::new(wait_forever));
        sm.cycle(&mut ctx, 10);
        sm.stop(Some(Arc::new(count_up)));
        sm.cycle(&mut ctx, 10);
        assert!(sm.is_finished());
        assert_eq!(ctx.steps, 3);
    }

    fn spin_forever(ctx: &mut Counter, _sm: &mut StateMachine<Counter>) -> StateResult<Counter> {
        ctx.steps += 1;
        StateResult::Next(Arc::new(spin_forever))
    }

    #[test]
    fn exceeding_maxloops_enters_cleanup_as_an_internal_error() {
        let mut ctx = Counter { steps: 0 };
        let mut sm = StateMachine::new(Arc::new(spin_forever));
        sm.cleanup = Some(Arc::new(count_up));
        sm.cycle(&mut ctx, 5);
        assert_eq!(sm.cleanup_reason(), Some(CleanupReason::MaxLoopsExceeded));
        // the runaway `spin_forever` chain is abandoned after `maxloops`
        // steps and the registered cleanup (`count_up`) takes over and
        // runs to its own completion within the same `cycle()` call.
        assert!(sm.is_finished());
        assert!(ctx.steps > 5);
    }

    #[test]
    fn exceeding_maxloops_without_a_cleanup_finishes_the_machine() {
        let mut ctx = Counter { steps: 0 };
        let mut sm = StateMachine::new(Arc::new(spin_forever));
        sm.cycle(&mut ctx, 5);
        assert_eq!(sm.cleanup_reason(), Some(CleanupReason::MaxLoopsExceeded));
        assert!(sm.is_finished());
    }
}
