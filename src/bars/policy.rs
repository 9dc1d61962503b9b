//! Bar-close policies as a tagged union, dispatched by `match` rather than
//! `dyn Trait` — all five policies are known up front and none allocate,
//! so a closed enum keeps the hot path (one `on_trade` call per policy
//! per incoming trade) branch-predictor friendly instead of paying an
//! indirect call per policy per trade.

use crate::clock::UnixNanos;
use crate::decimal::{Price, Volume};
use crate::ids::BarKind;
use crate::model::Bar;

/// One bar-close rule. Every variant's `should_close`/`reopen_price` is
/// non-failing and allocation-free.
#[derive(Clone, Copy, Debug)]
pub enum BarPolicyKind {
    Time { interval_ns: u64 },
    Tick { count: u32 },
    Volume { threshold: Volume },
    Renko { brick_size: Price },
    Range { threshold: Price },
}

impl BarPolicyKind {
    #[must_use]
    pub const fn bar_kind(&self) -> BarKind {
        match self {
            BarPolicyKind::Time { .. } => BarKind::Time,
            BarPolicyKind::Tick { .. } => BarKind::Tick,
            BarPolicyKind::Volume { .. } => BarKind::Volume,
            BarPolicyKind::Renko { .. } => BarKind::Renko,
            BarPolicyKind::Range { .. } => BarKind::Range,
        }
    }

    /// The packed parameter this policy was configured with (interval in
    /// seconds, tick count, volume threshold raw units, brick size in raw
    /// price units, or range in raw price units).
    #[must_use]
    pub fn param(&self) -> u32 {
        match self {
            BarPolicyKind::Time { interval_ns } => (*interval_ns / 1_000_000_000) as u32,
            BarPolicyKind::Tick { count } => *count,
            BarPolicyKind::Volume { threshold } => threshold.raw() as u32,
            BarPolicyKind::Renko { brick_size } => brick_size.raw() as u32,
            BarPolicyKind::Range { threshold } => threshold.raw() as u32,
        }
    }

    /// Whether `bar` should close given the incoming trade's price and
    /// timestamp (which has not yet been folded into `bar`).
    #[must_use]
    pub fn should_close(&self, bar: &Bar, price: Price, ts: UnixNanos) -> bool {
        match self {
            BarPolicyKind::Time { interval_ns } => ts.as_u64() >= bar.start_time.as_u64() + interval_ns,
            BarPolicyKind::Tick { count } => bar.trade_count >= *count,
            BarPolicyKind::Volume { threshold } => bar.volume.raw() >= threshold.raw(),
            BarPolicyKind::Renko { brick_size } => (price.raw() - bar.open.raw()).abs() >= brick_size.raw(),
            BarPolicyKind::Range { threshold } => (bar.high.raw() - bar.low.raw()) >= threshold.raw(),
        }
    }

    /// The open price the *next* bar should seed with, given the just-
    /// closed bar and the trade that triggered the close. Renko reopens
    /// flush against the previous bar's close rather than the trigger
    /// trade's own price; every other policy opens at the trigger price.
    #[must_use]
    pub fn reopen_price(&self, closed: &Bar, trigger_price: Price) -> Price {
        match self {
            BarPolicyKind::Renko { .. } => closed.close,
            _ => trigger_price,
        }
    }
}
