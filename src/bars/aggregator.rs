//! Single-symbol-set bar aggregator driving one [`BarPolicyKind`] over a
//! [`SymbolStateMap`].

use crate::bars::policy::BarPolicyKind;
use crate::clock::UnixNanos;
use crate::decimal::{Price, Quantity};
use crate::ids::SymbolId;
use crate::model::{Bar, CloseReason};
use crate::symbol_map::SymbolStateMap;

/// Per-symbol accumulator state: the bar currently being built, if any.
#[derive(Default)]
struct SlotState {
    bar: Option<Bar>,
}

/// Folds trades into per-symbol bars under one close policy, emitting a
/// completed [`Bar`] whenever the policy's threshold is reached.
pub struct BarAggregator {
    policy: BarPolicyKind,
    symbols: SymbolStateMap<SlotState>,
}

impl BarAggregator {
    #[must_use]
    pub fn new(policy: BarPolicyKind) -> Self {
        Self {
            policy,
            symbols: SymbolStateMap::new(),
        }
    }

    #[must_use]
    pub fn policy(&self) -> &BarPolicyKind {
        &self.policy
    }

    /// Folds one trade in. Returns a completed bar (reason `Threshold`)
    /// if this trade closed the in-flight bar for `symbol`.
    pub fn on_trade(&mut self, symbol: SymbolId, price: Price, qty: Quantity, is_buy: bool, ts: UnixNanos) -> Option<Bar> {
        let policy = self.policy;
        let slot = self.symbols.get_or_init(symbol, SlotState::default);
        match &mut slot.bar {
            None => {
                slot.bar = Some(Bar::open_with(price, qty, is_buy, ts));
                None
            }
            Some(bar) => {
                if policy.should_close(bar, price, ts) {
                    let mut closed = bar.clone();
                    closed.close_reason = CloseReason::Threshold;
                    let reopen_price = policy.reopen_price(&closed, price);
                    *bar = Bar::open_with(reopen_price, qty, is_buy, ts);
                    Some(closed)
                } else {
                    bar.accumulate(price, qty, is_buy, ts);
                    None
                }
            }
        }
    }

    /// Emits every initialized bar with reason `Forced` and clears all
    /// per-symbol state.
    pub fn flush(&mut self) -> Vec<(SymbolId, Bar)> {
        let mut out = Vec::new();
        self.symbols.for_each(|symbol, slot| {
            if let Some(bar) = &slot.bar {
                let mut forced = bar.clone();
                forced.close_reason = CloseReason::Forced;
                out.push((symbol, forced));
            }
        });
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decimal::Volume;

    fn px(v: i64) -> Price {
        Price::from_parts(v, 0)
    }

    fn qty(v: i64) -> Quantity {
        Quantity::from_parts(v, 0)
    }

    #[test]
    fn tick_policy_closes_after_n_trades() {
        let mut agg = BarAggregator::new(BarPolicyKind::Tick { count: 2 });
        let sym = SymbolId(1);
        assert!(agg.on_trade(sym, px(100), qty(1), true, UnixNanos(1)).is_none());
        assert!(agg.on_trade(sym, px(101), qty(1), true, UnixNanos(2)).is_none());
        let closed = agg.on_trade(sym, px(102), qty(1), true, UnixNanos(3)).unwrap();
        assert_eq!(closed.trade_count, 2);
        assert_eq!(closed.open, px(100));
        assert_eq!(closed.close, px(101));
    }

    #[test]
    fn time_policy_closes_at_interval_boundary() {
        let mut agg = BarAggregator::new(BarPolicyKind::Time { interval_ns: 60_000_000_000 });
        let sym = SymbolId(4);
        let secs = |s: i64| UnixNanos((s * 1_000_000_000) as u64);

        assert!(agg.on_trade(sym, px(10), qty(1), true, secs(1000)).is_none());
        assert!(agg.on_trade(sym, px(12), qty(2), true, secs(1030)).is_none());
        let closed = agg.on_trade(sym, px(11), qty(1), true, secs(1060)).unwrap();

        assert_eq!(closed.open, px(10));
        assert_eq!(closed.high, px(12));
        assert_eq!(closed.low, px(10));
        assert_eq!(closed.close, px(12));
        assert_eq!(closed.volume, Volume::from_parts(34, 0));
        assert_eq!(closed.buy_volume, Volume::from_parts(34, 0));
        assert_eq!(closed.trade_count, 2);
        assert_eq!(closed.start_time, secs(1000));
        assert_eq!(closed.end_time, secs(1030));
        assert_eq!(closed.close_reason, CloseReason::Threshold);
    }

    #[test]
    fn volume_policy_closes_on_threshold() {
        let mut agg = BarAggregator::new(BarPolicyKind::Volume { threshold: Volume::from_parts(150, 0) });
        let sym = SymbolId(2);
        agg.on_trade(sym, px(100), qty(1), true, UnixNanos(1));
        let closed = agg.on_trade(sym, px(100), qty(1), false, UnixNanos(2)).unwrap();
        assert!(closed.volume.raw() >= Volume::from_parts(150, 0).raw());
    }

    #[test]
    fn renko_reopens_flush_against_previous_close() {
        let mut agg = BarAggregator::new(BarPolicyKind::Renko { brick_size: px(1) });
        let sym = SymbolId(3);
        agg.on_trade(sym, px(100), qty(1), true, UnixNanos(1));
        // `on_trade` evaluates `should_close` against the *already folded*
        // bar before accumulating the triggering trade (matching the time
        // policy's own Scenario-E test: the trade that closes a bar is not
        // itself folded into it), so a brick opened at 100 and closed by
        // the trade at 102 still reports `close == 100` — the opening
        // trade is the only trade ever folded into this bar.
        let closed = agg.on_trade(sym, px(102), qty(1), true, UnixNanos(2)).unwrap();
        assert_eq!(closed.close, px(100));
        // The next bar reopens at the just-closed bar's own close (100),
        // not at the trigger trade's price (102).
        let flushed = agg.flush();
        assert_eq!(flushed[0].1.open, px(100));
    }

    #[test]
    fn flush_emits_forced_reason() {
        let mut agg = BarAggregator::new(BarPolicyKind::Tick { count: 100 });
        agg.on_trade(SymbolId(1), px(100), qty(1), true, UnixNanos(1));
        let flushed = agg.flush();
        assert_eq!(flushed.len(), 1);
        assert_eq!(flushed[0].1.close_reason, CloseReason::Forced);
    }
}
