//! Fans one trade stream out to up to `MaxTimeframes` independently
//! configured [`BarAggregator`]s, one per [`TimeframeId`].

use crate::bars::aggregator::BarAggregator;
use crate::bars::policy::BarPolicyKind;
use crate::clock::UnixNanos;
use crate::decimal::{Price, Quantity};
use crate::ids::{SymbolId, TimeframeId};
use crate::model::Bar;

/// Default maximum number of concurrently active timeframe slots.
pub const DEFAULT_MAX_TIMEFRAMES: usize = 16;

struct Slot {
    timeframe: TimeframeId,
    aggregator: BarAggregator,
}

/// Drives N independent bar policies off one trade stream. `on_trade`
/// folds the trade into every active slot and returns the bars (if any)
/// that closed as a result, each tagged with the [`TimeframeId`] that
/// produced it.
pub struct MultiTimeframeAggregator {
    max_timeframes: usize,
    slots: Vec<Slot>,
}

impl MultiTimeframeAggregator {
    #[must_use]
    pub fn new(max_timeframes: usize) -> Self {
        Self {
            max_timeframes,
            slots: Vec::new(),
        }
    }

    /// Activates a new timeframe slot under the given policy. Returns
    /// `false` (and registers nothing) if `timeframe` is already active
    /// or the slot capacity is exhausted.
    pub fn add_timeframe(&mut self, timeframe: TimeframeId, policy: BarPolicyKind) -> bool {
        if self.slots.iter().any(|s| s.timeframe == timeframe) {
            return false;
        }
        if self.slots.len() >= self.max_timeframes {
            return false;
        }
        self.slots.push(Slot {
            timeframe,
            aggregator: BarAggregator::new(policy),
        });
        true
    }

    #[must_use]
    pub fn active_timeframes(&self) -> Vec<TimeframeId> {
        self.slots.iter().map(|s| s.timeframe).collect()
    }

    /// Folds one trade into every active slot. Returns `(timeframe, bar)`
    /// for each slot that closed a bar as a result, in slot-registration
    /// order.
    pub fn on_trade(
        &mut self,
        symbol: SymbolId,
        price: Price,
        qty: Quantity,
        is_buy: bool,
        ts: UnixNanos,
    ) -> Vec<(TimeframeId, Bar)> {
        let mut out = Vec::new();
        for slot in &mut self.slots {
            if let Some(bar) = slot.aggregator.on_trade(symbol, price, qty, is_buy, ts) {
                out.push((slot.timeframe, bar));
            }
        }
        out
    }

    /// Flushes every active slot, forcing emission of in-flight bars.
    pub fn flush(&mut self) -> Vec<(TimeframeId, SymbolId, Bar)> {
        let mut out = Vec::new();
        for slot in &mut self.slots {
            for (symbol, bar) in slot.aggregator.flush() {
                out.push((slot.timeframe, symbol, bar));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::BarKind;

    fn px(v: i64) -> Price {
        Price::from_parts(v, 0)
    }
    fn qty(v: i64) -> Quantity {
        Quantity::from_parts(v, 0)
    }

    #[test]
    fn fans_out_to_every_active_slot_independently() {
        let mut agg = MultiTimeframeAggregator::new(DEFAULT_MAX_TIMEFRAMES);
        let tf_tick2 = TimeframeId::new(BarKind::Tick, 2);
        let tf_tick3 = TimeframeId::new(BarKind::Tick, 3);
        agg.add_timeframe(tf_tick2, BarPolicyKind::Tick { count: 2 });
        agg.add_timeframe(tf_tick3, BarPolicyKind::Tick { count: 3 });

        let sym = SymbolId(1);
        let mut closed = Vec::new();
        for (i, p) in [100, 101, 102].into_iter().enumerate() {
            closed.extend(agg.on_trade(sym, px(p), qty(1), true, UnixNanos(i as u64)));
        }
        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].0, tf_tick2);
    }

    #[test]
    fn duplicate_timeframe_registration_rejected() {
        let mut agg = MultiTimeframeAggregator::new(4);
        let tf = TimeframeId::new(BarKind::Time, 60);
        assert!(agg.add_timeframe(tf, BarPolicyKind::Time { interval_ns: 60_000_000_000 }));
        assert!(!agg.add_timeframe(tf, BarPolicyKind::Time { interval_ns: 60_000_000_000 }));
    }
}
