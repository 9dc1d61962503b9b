//! The backtest runner (§4.8): replays a sorted `.floxlog` stream through
//! the simulated executor and a strategy, either straight through
//! ([`BacktestRunner::run`]) or under external pause/step/breakpoint
//! control ([`BacktestRunner::start`] plus a [`ControlHandle`]).

mod control;
mod error;
mod runner;
mod source;

pub use control::{Breakpoint, ControlHandle, ReplayProgress, RunState, StepMode};
pub use error::BacktestError;
pub use runner::{BacktestResult, BacktestRunner};
pub use source::{BufferedSource, EventSource};
