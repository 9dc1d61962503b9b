//! OHLCV bar synthesis: close policies, the single-policy aggregator, the
//! multi-timeframe fan-out, and the bounded bar history matrix.

pub mod aggregator;
pub mod matrix;
pub mod multi_timeframe;
pub mod policy;

pub use aggregator::BarAggregator;
pub use matrix::{BarMatrix, BarMatrixLimits, BarSeries};
pub use multi_timeframe::{MultiTimeframeAggregator, DEFAULT_MAX_TIMEFRAMES};
pub use policy::BarPolicyKind;
