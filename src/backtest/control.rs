//! Interactive control for [`super::BacktestRunner::start`]: a
//! mutex/condvar pause gate plus breakpoint predicates, per §4.8/§9. The
//! loop owns the caller's thread; every external control method is meant
//! to be called from a different thread via a cloned [`ControlHandle`].

use crate::clock::UnixNanos;
use std::sync::{Arc, Condvar, Mutex};

/// Observable run state of an interactive backtest. A paused runner
/// emits no further events until a control call wakes it.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum RunState {
    Paused,
    Running,
    Finished,
    Stopped,
}

/// Which event class [`ControlHandle::step_until`] should advance to.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum StepMode {
    Any,
    Trade,
    BookUpdate,
}

/// What the event loop has processed so far, passed to a
/// [`Breakpoint::Custom`] predicate.
#[derive(Clone, Copy, Debug)]
pub struct ReplayProgress {
    pub last_event_ts: UnixNanos,
    pub events_processed: u64,
    pub trades_processed: u64,
}

/// A condition that pauses the interactive runner at the next event
/// boundary where it holds.
pub enum Breakpoint {
    TimeAtLeast(UnixNanos),
    EventCountAtLeast(u64),
    TradeCountAtLeast(u64),
    Custom(Arc<dyn Fn(&ReplayProgress) -> bool + Send + Sync>),
}

impl Breakpoint {
    fn hit(&self, progress: &ReplayProgress) -> bool {
        match self {
            Breakpoint::TimeAtLeast(t) => progress.last_event_ts >= *t,
            Breakpoint::EventCountAtLeast(n) => progress.events_processed >= *n,
            Breakpoint::TradeCountAtLeast(n) => progress.trades_processed >= *n,
            Breakpoint::Custom(f) => f(progress),
        }
    }
}

enum StepRequest {
    None,
    One(StepMode),
}

struct Inner {
    state: RunState,
    step: StepRequest,
    stop_requested: bool,
    breakpoints: Vec<Breakpoint>,
    break_on_signal: bool,
}

/// Shared pause-gate state between the runner's event loop (which owns
/// the caller's thread inside `start`) and every [`ControlHandle`] clone
/// driving it from elsewhere.
pub(super) struct ControlState {
    inner: Mutex<Inner>,
    condvar: Condvar,
}

impl ControlState {
    pub(super) fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(Inner {
                state: RunState::Paused,
                step: StepRequest::None,
                stop_requested: false,
                breakpoints: Vec::new(),
                break_on_signal: false,
            }),
            condvar: Condvar::new(),
        })
    }

    /// Blocks the event loop's thread until told to proceed: either a
    /// step/resume request arrives, or a stop is requested.
    pub(super) fn wait_for_green_light(&self) {
        let mut guard = self.inner.lock().expect("backtest control state poisoned");
        while guard.state == RunState::Paused && !guard.stop_requested {
            guard = self.condvar.wait(guard).expect("backtest control state poisoned");
        }
    }

    pub(super) fn should_stop(&self) -> bool {
        self.inner.lock().expect("backtest control state poisoned").stop_requested
    }

    /// Called by the loop after processing one event: decides whether to
    /// pause again (one-shot step exhausted, or a breakpoint fired).
    pub(super) fn after_event(&self, kind: StepMode, progress: &ReplayProgress) {
        let mut guard = self.inner.lock().expect("backtest control state poisoned");
        let step_done = matches!(&guard.step, StepRequest::One(mode) if *mode == StepMode::Any || *mode == kind);
        if step_done {
            guard.step = StepRequest::None;
            guard.state = RunState::Paused;
            return;
        }
        if guard.breakpoints.iter().any(|b| b.hit(progress)) {
            guard.state = RunState::Paused;
        }
    }

    pub(super) fn mark_finished(&self) {
        let mut guard = self.inner.lock().expect("backtest control state poisoned");
        guard.state = if guard.stop_requested { RunState::Stopped } else { RunState::Finished };
        self.condvar.notify_all();
    }

    pub(super) fn break_on_signal(&self) -> bool {
        self.inner.lock().expect("backtest control state poisoned").break_on_signal
    }

    pub(super) fn trigger_signal_breakpoint(&self) {
        let mut guard = self.inner.lock().expect("backtest control state poisoned");
        guard.state = RunState::Paused;
    }
}

/// A handle external callers use to drive a paused/running interactive
/// backtest. Clone freely — every clone shares the same underlying gate.
#[derive(Clone)]
pub struct ControlHandle {
    pub(super) inner: Arc<ControlState>,
}

impl ControlHandle {
    /// Runs until the next breakpoint or end of stream.
    pub fn resume(&self) {
        let mut guard = self.inner.inner.lock().expect("backtest control state poisoned");
        if guard.state == RunState::Paused {
            guard.state = RunState::Running;
        }
        self.inner.condvar.notify_all();
    }

    /// Executes exactly one event, then pauses again.
    pub fn step(&self) {
        let mut guard = self.inner.inner.lock().expect("backtest control state poisoned");
        guard.step = StepRequest::One(StepMode::Any);
        guard.state = RunState::Running;
        self.inner.condvar.notify_all();
    }

    /// Runs until the next event of the requested class, then pauses.
    pub fn step_until(&self, mode: StepMode) {
        let mut guard = self.inner.inner.lock().expect("backtest control state poisoned");
        guard.step = StepRequest::One(mode);
        guard.state = RunState::Running;
        self.inner.condvar.notify_all();
    }

    /// Requests a pause at the next event boundary.
    pub fn pause(&self) {
        let mut guard = self.inner.inner.lock().expect("backtest control state poisoned");
        if guard.state == RunState::Running {
            guard.state = RunState::Paused;
        }
    }

    /// Terminates the loop; it will observe no further events.
    pub fn stop(&self) {
        let mut guard = self.inner.inner.lock().expect("backtest control state poisoned");
        guard.stop_requested = true;
        guard.state = RunState::Running;
        self.inner.condvar.notify_all();
    }

    /// Installs a breakpoint. Takes effect from the next event boundary
    /// onward.
    pub fn add_breakpoint(&self, breakpoint: Breakpoint) {
        self.inner.inner.lock().expect("backtest control state poisoned").breakpoints.push(breakpoint);
    }

    /// Enables or disables pausing whenever the strategy emits a signal.
    pub fn set_break_on_signal(&self, enabled: bool) {
        self.inner.inner.lock().expect("backtest control state poisoned").break_on_signal = enabled;
    }

    #[must_use]
    pub fn state(&self) -> RunState {
        self.inner.inner.lock().expect("backtest control state poisoned").state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_paused_and_resume_unblocks() {
        let control = ControlState::new();
        let handle = ControlHandle { inner: Arc::clone(&control) };
        assert_eq!(handle.state(), RunState::Paused);
        handle.resume();
        assert_eq!(handle.state(), RunState::Running);
    }

    #[test]
    fn step_pauses_after_exactly_one_event() {
        let control = ControlState::new();
        let handle = ControlHandle { inner: Arc::clone(&control) };
        handle.step();
        assert_eq!(handle.state(), RunState::Running);
        let progress = ReplayProgress { last_event_ts: UnixNanos::ZERO, events_processed: 1, trades_processed: 1 };
        control.after_event(StepMode::Any, &progress);
        assert_eq!(handle.state(), RunState::Paused);
    }

    #[test]
    fn event_count_breakpoint_fires() {
        let control = ControlState::new();
        let handle = ControlHandle { inner: Arc::clone(&control) };
        handle.add_breakpoint(Breakpoint::EventCountAtLeast(3));
        handle.resume();
        for n in 1..3 {
            let progress = ReplayProgress { last_event_ts: UnixNanos::ZERO, events_processed: n, trades_processed: 0 };
            control.after_event(StepMode::Trade, &progress);
            assert_eq!(handle.state(), RunState::Running);
        }
        let progress = ReplayProgress { last_event_ts: UnixNanos::ZERO, events_processed: 3, trades_processed: 0 };
        control.after_event(StepMode::Trade, &progress);
        assert_eq!(handle.state(), RunState::Paused);
    }
}
