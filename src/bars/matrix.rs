//! `BarSeries`: an O(1) push ring buffer of bars, "index 0 = newest".
//! `BarMatrix`: a `(symbol, timeframe) -> BarSeries` table bounded by a
//! configured max symbol/timeframe count, that can subscribe to a
//! [`crate::model::BarEvent`] bus to auto-populate itself.

use crate::ids::{SymbolId, TimeframeId};
use crate::model::{Bar, BarEvent};
use std::collections::HashMap;

/// A fixed-capacity ring of the most recent bars for one (symbol,
/// timeframe) pair. Capacity must be a power of two; `push` is O(1) and
/// never allocates once constructed. `get(0)` is the newest bar.
pub struct BarSeries {
    capacity: usize,
    mask: usize,
    buf: Vec<Option<Bar>>,
    /// Index in `buf` the newest push landed at, or `None` if empty.
    head: Option<usize>,
    len: usize,
}

impl BarSeries {
    /// # Panics
    /// Panics if `capacity` is not a power of two.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        assert!(capacity.is_power_of_two(), "BarSeries capacity must be a power of two");
        Self {
            capacity,
            mask: capacity - 1,
            buf: vec![None; capacity],
            head: None,
            len: 0,
        }
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Pushes one newest bar, overwriting the oldest once at capacity.
    pub fn push(&mut self, bar: Bar) {
        let next = match self.head {
            None => 0,
            Some(h) => (h + 1) & self.mask,
        };
        self.buf[next] = Some(bar);
        self.head = Some(next);
        self.len = (self.len + 1).min(self.capacity);
    }

    /// Looks up the bar `index` steps back from the newest (`index == 0`
    /// is newest). `None` if `index >= len()`.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Bar> {
        if index >= self.len {
            return None;
        }
        let head = self.head?;
        let slot = (head + self.capacity - index) & self.mask;
        self.buf[slot].as_ref()
    }

    /// Preloads bars in newest-last order (i.e. `history[0]` is oldest),
    /// as if each had been `push`ed in sequence.
    pub fn warmup(&mut self, history: impl IntoIterator<Item = Bar>) {
        for bar in history {
            self.push(bar);
        }
    }
}

/// Bounds on how many distinct symbols/timeframes a [`BarMatrix`] will
/// track before `record`/`ensure` start returning `false`.
#[derive(Clone, Copy, Debug)]
pub struct BarMatrixLimits {
    pub max_symbols: usize,
    pub max_timeframes: usize,
    pub depth: usize,
}

impl Default for BarMatrixLimits {
    fn default() -> Self {
        Self {
            max_symbols: 4096,
            max_timeframes: 16,
            depth: 256,
        }
    }
}

/// A `(symbol, timeframe) -> BarSeries` history table. Subscribing to a
/// `BarEvent` bus (via [`Self::record`] from the consumer callback) keeps
/// it populated automatically.
pub struct BarMatrix {
    limits: BarMatrixLimits,
    series: HashMap<(SymbolId, TimeframeId), BarSeries>,
    symbols_seen: std::collections::HashSet<SymbolId>,
    timeframes_seen: std::collections::HashSet<TimeframeId>,
}

impl BarMatrix {
    #[must_use]
    pub fn new(limits: BarMatrixLimits) -> Self {
        Self {
            limits,
            series: HashMap::new(),
            symbols_seen: std::collections::HashSet::new(),
            timeframes_seen: std::collections::HashSet::new(),
        }
    }

    fn ensure_series(&mut self, symbol: SymbolId, timeframe: TimeframeId) -> Option<&mut BarSeries> {
        let key = (symbol, timeframe);
        if !self.series.contains_key(&key) {
            if !self.symbols_seen.contains(&symbol) && self.symbols_seen.len() >= self.limits.max_symbols {
                return None;
            }
            if !self.timeframes_seen.contains(&timeframe) && self.timeframes_seen.len() >= self.limits.max_timeframes {
                return None;
            }
            self.symbols_seen.insert(symbol);
            self.timeframes_seen.insert(timeframe);
            self.series.insert(key, BarSeries::new(self.limits.depth));
        }
        self.series.get_mut(&key)
    }

    /// Records one closed bar into its (symbol, timeframe) series.
    /// Returns `false` if the symbol/timeframe bound has been exhausted
    /// and a new slot could not be created.
    pub fn record(&mut self, symbol: SymbolId, timeframe: TimeframeId, bar: Bar) -> bool {
        match self.ensure_series(symbol, timeframe) {
            Some(series) => {
                series.push(bar);
                true
            }
            None => false,
        }
    }

    /// Convenience for a direct `BarEvent` bus subscriber.
    pub fn record_event(&mut self, event: &BarEvent) -> bool {
        self.record(event.symbol, event.timeframe, event.bar)
    }

    /// Preloads `history` (oldest-first) into one series.
    pub fn warmup(&mut self, symbol: SymbolId, timeframe: TimeframeId, history: impl IntoIterator<Item = Bar>) -> bool {
        match self.ensure_series(symbol, timeframe) {
            Some(series) => {
                series.warmup(history);
                true
            }
            None => false,
        }
    }

    /// O(1) lookup of one bar by `(symbol, timeframe, index)`; `index ==
    /// 0` is the newest bar in that series.
    #[must_use]
    pub fn get(&self, symbol: SymbolId, timeframe: TimeframeId, index: usize) -> Option<&Bar> {
        self.series.get(&(symbol, timeframe))?.get(index)
    }

    /// The set of timeframes with at least one series recorded for
    /// `symbol`. Linear over the small configured timeframe set, per
    /// §4.6.
    #[must_use]
    pub fn timeframes_for(&self, symbol: SymbolId) -> Vec<TimeframeId> {
        self.series.keys().filter(|(s, _)| *s == symbol).map(|(_, tf)| *tf).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::UnixNanos;
    use crate::decimal::{Price, Volume};
    use crate::ids::BarKind;
    use crate::model::CloseReason;

    fn bar(close: i64) -> Bar {
        Bar {
            open: Price::from_parts(close, 0),
            high: Price::from_parts(close, 0),
            low: Price::from_parts(close, 0),
            close: Price::from_parts(close, 0),
            volume: Volume::ZERO,
            buy_volume: Volume::ZERO,
            trade_count: 1,
            start_time: UnixNanos(0),
            end_time: UnixNanos(0),
            close_reason: CloseReason::Threshold,
        }
    }

    #[test]
    fn series_index_zero_is_newest_and_wraps_at_capacity() {
        let mut series = BarSeries::new(2);
        series.push(bar(1));
        series.push(bar(2));
        assert_eq!(series.get(0).unwrap().close.raw(), Price::from_parts(2, 0).raw());
        assert_eq!(series.get(1).unwrap().close.raw(), Price::from_parts(1, 0).raw());
        series.push(bar(3));
        assert_eq!(series.len(), 2);
        assert_eq!(series.get(0).unwrap().close.raw(), Price::from_parts(3, 0).raw());
        assert_eq!(series.get(1).unwrap().close.raw(), Price::from_parts(2, 0).raw());
        assert!(series.get(2).is_none());
    }

    #[test]
    fn matrix_records_independent_series_per_symbol_and_timeframe() {
        let mut matrix = BarMatrix::new(BarMatrixLimits { max_symbols: 4, max_timeframes: 4, depth: 4 });
        let tf = TimeframeId::new(BarKind::Time, 60);
        matrix.record(SymbolId(1), tf, bar(10));
        matrix.record(SymbolId(2), tf, bar(20));
        assert_eq!(matrix.get(SymbolId(1), tf, 0).unwrap().close.raw(), Price::from_parts(10, 0).raw());
        assert_eq!(matrix.get(SymbolId(2), tf, 0).unwrap().close.raw(), Price::from_parts(20, 0).raw());
    }
}
