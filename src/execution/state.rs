//! Per-symbol market snapshot and per-order trailing-stop state tracked
//! by the simulated executor.

use crate::decimal::Price;
use crate::model::Side;

/// The executor's view of one symbol's current market, folded from
/// trades and book updates. Presence flags distinguish "never seen" from
/// "seen and currently absent" (e.g. book emptied one side).
#[derive(Clone, Copy, Default, Debug)]
pub struct MarketState {
    pub best_bid: Option<Price>,
    pub best_ask: Option<Price>,
    pub last_trade: Option<Price>,
}

impl MarketState {
    #[must_use]
    pub fn has_any_data(&self) -> bool {
        self.best_bid.is_some() || self.best_ask.is_some() || self.last_trade.is_some()
    }
}

/// Per-order trailing-stop bookkeeping: which side it trails, the offset
/// rule, and the currently computed trigger.
#[derive(Clone, Copy, Debug)]
pub struct TrailingState {
    pub side: Side,
    pub offset: Option<Price>,
    pub callback_rate_bps: Option<u32>,
    pub current_trigger: Price,
}

impl TrailingState {
    /// The offset to apply against a reference price: the absolute
    /// offset when present, else `reference * callback_bps / 10_000`.
    #[must_use]
    pub fn effective_offset(&self, reference: Price) -> Price {
        if let Some(offset) = self.offset {
            return offset;
        }
        let bps = self.callback_rate_bps.unwrap_or(0) as i64;
        Price::from_raw((reference.raw() as i128 * bps as i128 / 10_000) as i64)
    }

    /// Given a new reference (last trade) price, returns the candidate
    /// trigger under this trailing rule: `reference - offset` for a
    /// SELL-side trail (stop follows price up), `reference + offset` for
    /// a BUY-side trail (stop follows price down).
    #[must_use]
    pub fn candidate_trigger(&self, reference: Price) -> Price {
        let offset = self.effective_offset(reference);
        match self.side {
            Side::Sell => Price::from_raw(reference.raw() - offset.raw()),
            Side::Buy => Price::from_raw(reference.raw() + offset.raw()),
        }
    }

    /// Whether `candidate` is a monotonic improvement over the current
    /// trigger: non-decreasing for SELL, non-increasing for BUY.
    #[must_use]
    pub fn is_improvement(&self, candidate: Price) -> bool {
        match self.side {
            Side::Sell => candidate.raw() > self.current_trigger.raw(),
            Side::Buy => candidate.raw() < self.current_trigger.raw(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sell_trail_only_advances_upward() {
        let mut state = TrailingState {
            side: Side::Sell,
            offset: Some(Price::from_parts(1, 0)),
            callback_rate_bps: None,
            current_trigger: Price::from_parts(99, 0),
        };
        let up = state.candidate_trigger(Price::from_parts(101, 0));
        assert!(state.is_improvement(up));
        state.current_trigger = up;
        let down = state.candidate_trigger(Price::from_parts(100, 0));
        assert!(!state.is_improvement(down));
    }
}
