//! The error type delivered to [`crate::subscriber::IMarketDataSubscriber::on_market_data_error`].

use crate::clock::UnixNanos;
use crate::ids::SymbolId;
use serde::{Deserialize, Serialize};

/// A typed reason code for a market-data-source failure.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Debug)]
pub enum MarketDataErrorCode {
    ConnectionLost,
    ConnectionTimeout,
    InvalidMessage,
    RateLimited,
    SubscriptionFailed,
    StaleData,
}

/// Delivered out-of-band to subscribers when a market data source fails;
/// never thrown across the bus boundary.
#[derive(Clone, PartialEq, Serialize, Deserialize, Debug)]
pub struct MarketDataError {
    pub code: MarketDataErrorCode,
    pub symbol: Option<SymbolId>,
    pub message: String,
    pub timestamp_ns: UnixNanos,
}
