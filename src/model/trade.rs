//! Trade messages.

use crate::clock::UnixNanos;
use crate::decimal::{Price, Quantity};
use crate::ids::SymbolId;
use crate::model::Instrument;
use serde::{Deserialize, Serialize};

/// A single executed trade. `is_buy` is the taker side.
#[derive(Clone, Copy, PartialEq, Serialize, Deserialize, Debug)]
pub struct Trade {
    pub symbol: SymbolId,
    pub instrument: Instrument,
    pub price: Price,
    pub quantity: Quantity,
    pub is_buy: bool,
    pub exchange_ts_ns: UnixNanos,
}

impl Trade {
    /// The notional value of this trade (`price * quantity`).
    #[must_use]
    pub fn notional(&self) -> crate::decimal::Volume {
        self.price * self.quantity
    }
}

/// Bus envelope around a [`Trade`]. Value-typed (no pooling — small and
/// fixed-size), carrying the same sequence/timestamp bookkeeping fields as
/// [`crate::model::BookUpdateEvent`].
#[derive(Clone, Copy, PartialEq, Serialize, Deserialize, Debug)]
pub struct TradeEvent {
    pub trade: Trade,
    /// Exchange-assigned sequence number, for gap detection.
    pub seq: u64,
    /// The exchange sequence number immediately preceding `seq`, if known.
    pub prev_seq: Option<u64>,
    /// Assigned by the bus at publish time; strictly increasing per bus.
    pub tick_sequence: i64,
    /// Monotonic local receive timestamp.
    pub recv: UnixNanos,
    /// Monotonic local publish timestamp (set by the bus producer).
    pub publish: UnixNanos,
}

impl TradeEvent {
    #[must_use]
    pub fn new(trade: Trade, seq: u64, prev_seq: Option<u64>, recv: UnixNanos) -> Self {
        Self {
            trade,
            seq,
            prev_seq,
            tick_sequence: -1,
            recv,
            publish: UnixNanos::ZERO,
        }
    }
}
