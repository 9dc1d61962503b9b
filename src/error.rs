//! Crate-wide error aggregation. Each module keeps its own focused error
//! enum (`BookError`, `ExecutionError`, `LogError`, ...); `FloxError`
//! exists only for call sites that cross module boundaries — the
//! backtest runner and the engine lifecycle — and should not be threaded
//! through leaf APIs.

use crate::backtest::BacktestError;
use crate::execution::ExecutionError;
use crate::log::LogError;
use crate::orderbook::BookError;
use crate::registry::RegistryError;
use thiserror::Error;

/// Aggregates every module-local error into one type via `#[from]`, for
/// components that legitimately call across several subsystems.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum FloxError {
    #[error(transparent)]
    Book(#[from] BookError),

    #[error(transparent)]
    Execution(#[from] ExecutionError),

    #[error(transparent)]
    Log(#[from] LogError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Backtest(#[from] BacktestError),

    #[error("configuration error: {0}")]
    Config(String),
}
