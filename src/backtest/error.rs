use crate::execution::ExecutionError;
use crate::ids::SymbolId;
use crate::log::LogError;
use crate::orderbook::BookError;
use thiserror::Error;

/// Failure modes for the backtest runner. A decode error from the event
/// source is fatal for [`super::BacktestRunner::run`] unless the caller
/// opted out of CRC verification at the reader layer; a book-grid
/// violation surfaces the same way it would on a live book.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum BacktestError {
    #[error("event source decode error: {0}")]
    Source(#[from] LogError),

    #[error("order book error for symbol {symbol}: {source}")]
    Book {
        symbol: SymbolId,
        #[source]
        source: BookError,
    },

    #[error("execution error: {0}")]
    Execution(#[from] ExecutionError),

    #[error("book update for symbol {0} references no tick size in the symbol registry")]
    UnknownSymbol(SymbolId),
}
