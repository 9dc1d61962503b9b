//! Aggregated bars (OHLCV) and the reason a bar closed.

use crate::clock::UnixNanos;
use crate::decimal::{Price, Quantity, Volume};
use crate::ids::SymbolId;
use crate::model::Instrument;
use serde::{Deserialize, Serialize};

/// Why a bar policy decided to close the bar it was accumulating.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Debug)]
pub enum CloseReason {
    /// The policy's threshold (interval elapsed, tick count, volume,
    /// Renko brick, or range span) was reached.
    Threshold,
    /// A timestamp gap beyond tolerance forced an early close.
    Gap,
    /// Externally forced, e.g. end of backtest or explicit flush.
    Forced,
    /// Emitted before the policy's first real threshold, to seed state.
    Warmup,
}

/// A single OHLCV bar for one symbol/timeframe.
#[derive(Clone, Copy, PartialEq, Serialize, Deserialize, Debug)]
pub struct Bar {
    pub open: Price,
    pub high: Price,
    pub low: Price,
    pub close: Price,
    pub volume: Volume,
    /// Sum of `price*qty` over trades where `is_buy` was true.
    pub buy_volume: Volume,
    pub trade_count: u32,
    pub start_time: UnixNanos,
    pub end_time: UnixNanos,
    pub close_reason: CloseReason,
}

impl Bar {
    /// Starts a new bar from its first trade.
    #[must_use]
    pub fn open_with(price: Price, qty: Quantity, is_buy: bool, ts: UnixNanos) -> Self {
        let notional = price * qty;
        Self {
            open: price,
            high: price,
            low: price,
            close: price,
            volume: notional,
            buy_volume: if is_buy { notional } else { Volume::ZERO },
            trade_count: 1,
            start_time: ts,
            end_time: ts,
            close_reason: CloseReason::Warmup,
        }
    }

    /// Folds one more trade into this bar in place.
    pub fn accumulate(&mut self, price: Price, qty: Quantity, is_buy: bool, ts: UnixNanos) {
        if price > self.high {
            self.high = price;
        }
        if price < self.low {
            self.low = price;
        }
        self.close = price;
        let notional = price * qty;
        self.volume = Volume::from_raw(self.volume.raw() + notional.raw());
        if is_buy {
            self.buy_volume = Volume::from_raw(self.buy_volume.raw() + notional.raw());
        }
        self.trade_count += 1;
        self.end_time = ts;
    }
}

/// Bus envelope around a completed [`Bar`], identifying the symbol,
/// instrument and timeframe it belongs to.
#[derive(Clone, Copy, PartialEq, Serialize, Deserialize, Debug)]
pub struct BarEvent {
    pub symbol: SymbolId,
    pub instrument: Instrument,
    pub timeframe: crate::ids::TimeframeId,
    pub bar: Bar,
    pub seq: u64,
    pub publish: UnixNanos,
}

impl BarEvent {
    #[must_use]
    pub fn new(
        symbol: SymbolId,
        instrument: Instrument,
        timeframe: crate::ids::TimeframeId,
        bar: Bar,
        seq: u64,
        publish: UnixNanos,
    ) -> Self {
        Self {
            symbol,
            instrument,
            timeframe,
            bar,
            seq,
            publish,
        }
    }
}
