//! The single-writer, tick-indexed order book.
//!
//! Two fixed-size arrays of [`Quantity`], indexed by `ticks = price /
//! tick_size` relative to a base index re-seated on every `SNAPSHOT`. No
//! allocation occurs after construction. Not internally synchronized —
//! the book must be installed behind a single consumer thread of its
//! driving bus.

mod error;

pub use error::BookError;

use crate::decimal::{Price, Quantity, Volume};
use crate::model::{BookKind, BookLevel};

/// Default maximum number of distinct price levels tracked per side.
pub const DEFAULT_MAX_LEVELS: usize = 8192;

#[derive(Clone, Copy)]
struct Bounds {
    min_tick: i64,
    max_tick: i64,
    best_tick: i64,
    has_levels: bool,
}

impl Bounds {
    const fn empty() -> Self {
        Self {
            min_tick: i64::MAX,
            max_tick: i64::MIN,
            best_tick: i64::MIN,
            has_levels: false,
        }
    }
}

/// One side (bids or asks) of an [`IndexedOrderBook`]: a flat array of
/// quantities indexed by tick offset from the book's base, plus cached
/// bounds for O(1) best-price access on the common path.
struct Side {
    levels: Box<[Quantity]>,
    bounds: Bounds,
    is_bid: bool,
}

impl Side {
    fn new(max_levels: usize, is_bid: bool) -> Self {
        Self {
            levels: vec![Quantity::ZERO; max_levels].into_boxed_slice(),
            bounds: Bounds::empty(),
            is_bid,
        }
    }

    fn reset(&mut self) {
        self.levels.iter_mut().for_each(|q| *q = Quantity::ZERO);
        self.bounds = Bounds::empty();
    }

    fn better(&self, a: i64, b: i64) -> bool {
        if self.is_bid {
            a > b
        } else {
            a < b
        }
    }

    fn set(&mut self, tick: i64, qty: Quantity) {
        let idx = tick as usize;
        if qty.is_zero() {
            self.levels[idx] = Quantity::ZERO;
            if self.bounds.has_levels && tick == self.bounds.best_tick {
                self.rescan_best_inward(tick);
            }
            return;
        }
        self.levels[idx] = qty;
        if !self.bounds.has_levels {
            self.bounds = Bounds {
                min_tick: tick,
                max_tick: tick,
                best_tick: tick,
                has_levels: true,
            };
            return;
        }
        self.bounds.min_tick = self.bounds.min_tick.min(tick);
        self.bounds.max_tick = self.bounds.max_tick.max(tick);
        if self.better(tick, self.bounds.best_tick) {
            self.bounds.best_tick = tick;
        }
    }

    /// The cached best was cleared; scan inward from it within
    /// `[min_tick, max_tick]` until a non-empty level is found.
    fn rescan_best_inward(&mut self, cleared: i64) {
        let (lo, hi) = (self.bounds.min_tick, self.bounds.max_tick);
        let mut found = None;
        if self.is_bid {
            let mut t = cleared - 1;
            while t >= lo {
                if !self.levels[t as usize].is_zero() {
                    found = Some(t);
                    break;
                }
                t -= 1;
            }
        } else {
            let mut t = cleared + 1;
            while t <= hi {
                if !self.levels[t as usize].is_zero() {
                    found = Some(t);
                    break;
                }
                t += 1;
            }
        }
        match found {
            Some(t) => self.bounds.best_tick = t,
            None => self.bounds = Bounds::empty(),
        }
    }

    fn best(&self) -> Option<i64> {
        self.bounds.has_levels.then_some(self.bounds.best_tick)
    }

    /// Top `n` occupied levels, best first.
    fn top_n(&self, n: usize, base: i64, tick_size: Price) -> Vec<BookLevel> {
        let mut out = Vec::with_capacity(n);
        let Some(mut t) = self.best() else { return out };
        loop {
            if out.len() >= n {
                break;
            }
            let qty = self.levels[t as usize];
            if !qty.is_zero() {
                out.push(BookLevel {
                    price: tick_to_price(base, t, tick_size),
                    qty,
                });
            }
            if self.is_bid {
                if t <= self.bounds.min_tick {
                    break;
                }
                t -= 1;
            } else {
                if t >= self.bounds.max_tick {
                    break;
                }
                t += 1;
            }
        }
        out
    }
}

fn tick_to_price(base: i64, tick: i64, tick_size: Price) -> Price {
    Price::from_raw((base + tick) * tick_size.raw())
}

/// A fixed-grid, tick-indexed order book for one symbol.
pub struct IndexedOrderBook {
    tick_size: Price,
    max_levels: usize,
    /// Absolute tick index of array slot 0, re-seated on every `SNAPSHOT`.
    base_tick: i64,
    bids: Side,
    asks: Side,
}

impl IndexedOrderBook {
    /// # Errors
    /// Returns [`BookError::InvalidTickSize`] if `tick_size` is not
    /// strictly positive.
    pub fn new(tick_size: Price, max_levels: usize) -> Result<Self, BookError> {
        if tick_size.raw() <= 0 {
            return Err(BookError::InvalidTickSize);
        }
        Ok(Self {
            tick_size,
            max_levels,
            base_tick: 0,
            bids: Side::new(max_levels, true),
            asks: Side::new(max_levels, false),
        })
    }

    #[must_use]
    pub fn tick_size(&self) -> Price {
        self.tick_size
    }

    /// Maps an absolute price to a tick offset from the current base.
    /// Returns `None` if the price falls outside the grid.
    fn offset_of(&self, price: Price) -> Option<i64> {
        if price.raw() % self.tick_size.raw() != 0 {
            return None;
        }
        let absolute = price.raw() / self.tick_size.raw();
        let offset = absolute - self.base_tick;
        if offset < 0 || offset as usize >= self.max_levels {
            return None;
        }
        Some(offset)
    }

    /// Applies a full book update. `kind == SNAPSHOT` clears all state and
    /// re-seats the base index at the update's median price before
    /// applying every level; `kind == DELTA` patches individual levels.
    ///
    /// # Errors
    /// Returns [`BookError::PriceOutsideGrid`] if any level's price does
    /// not fall on the tick grid within `max_levels` of the (possibly
    /// just re-seated) base — this is a fatal configuration error and
    /// must be surfaced, never silently dropped.
    pub fn apply(&mut self, kind: BookKind, bids: &[BookLevel], asks: &[BookLevel]) -> Result<(), BookError> {
        if kind == BookKind::Snapshot {
            self.bids.reset();
            self.asks.reset();
            self.base_tick = median_tick(bids, asks, self.tick_size).unwrap_or(0) - (self.max_levels as i64 / 2);
        }
        for level in bids {
            let offset = self.offset_of(level.price).ok_or(BookError::PriceOutsideGrid)?;
            self.bids.set(offset, level.qty);
        }
        for level in asks {
            let offset = self.offset_of(level.price).ok_or(BookError::PriceOutsideGrid)?;
            self.asks.set(offset, level.qty);
        }
        Ok(())
    }

    #[must_use]
    pub fn best_bid(&self) -> Option<Price> {
        self.bids.best().map(|t| tick_to_price(self.base_tick, t, self.tick_size))
    }

    #[must_use]
    pub fn best_ask(&self) -> Option<Price> {
        self.asks.best().map(|t| tick_to_price(self.base_tick, t, self.tick_size))
    }

    #[must_use]
    pub fn qty_at(&self, price: Price) -> Quantity {
        match self.offset_of(price) {
            Some(t) => {
                let bid_q = self.bids.levels[t as usize];
                if !bid_q.is_zero() {
                    return bid_q;
                }
                self.asks.levels[t as usize]
            }
            None => Quantity::ZERO,
        }
    }

    #[must_use]
    pub fn spread(&self) -> Option<Price> {
        Some(Price::from_raw(self.best_ask()?.raw() - self.best_bid()?.raw()))
    }

    #[must_use]
    pub fn mid(&self) -> Option<Price> {
        let (bid, ask) = (self.best_bid()?, self.best_ask()?);
        Some(Price::from_raw((bid.raw() + ask.raw()) / 2))
    }

    #[must_use]
    pub fn is_crossed(&self) -> bool {
        match (self.best_bid(), self.best_ask()) {
            (Some(b), Some(a)) => b > a,
            _ => false,
        }
    }

    #[must_use]
    pub fn bid_levels(&self, n: usize) -> Vec<BookLevel> {
        self.bids.top_n(n, self.base_tick, self.tick_size)
    }

    #[must_use]
    pub fn ask_levels(&self, n: usize) -> Vec<BookLevel> {
        self.asks.top_n(n, self.base_tick, self.tick_size)
    }

    /// Walks the ask side inward from best, consuming up to `need_qty`.
    /// Returns `(filled_qty, notional)`; notional accumulates in 128-bit
    /// intermediates to avoid overflow across many levels.
    #[must_use]
    pub fn consume_asks(&self, need_qty: Quantity) -> (Quantity, Volume) {
        consume_side(&self.asks, self.base_tick, self.tick_size, need_qty)
    }

    /// Bid-side sibling of [`Self::consume_asks`].
    #[must_use]
    pub fn consume_bids(&self, need_qty: Quantity) -> (Quantity, Volume) {
        consume_side(&self.bids, self.base_tick, self.tick_size, need_qty)
    }
}

fn consume_side(side: &Side, base: i64, tick_size: Price, need_qty: Quantity) -> (Quantity, Volume) {
    let mut remaining: i128 = need_qty.raw() as i128;
    let mut notional: i128 = 0;
    let mut filled: i128 = 0;
    let Some(mut t) = side.best() else {
        return (Quantity::ZERO, Volume::ZERO);
    };
    loop {
        if remaining <= 0 {
            break;
        }
        let qty = side.levels[t as usize];
        if !qty.is_zero() {
            let take = remaining.min(qty.raw() as i128);
            let price = tick_to_price(base, t, tick_size);
            notional += (price.raw() as i128) * take / crate::decimal::SCALE as i128;
            filled += take;
            remaining -= take;
        }
        let exhausted = if side.is_bid { t <= side.bounds.min_tick } else { t >= side.bounds.max_tick };
        if exhausted {
            break;
        }
        t += if side.is_bid { -1 } else { 1 };
    }
    (Quantity::from_raw(filled as i64), Volume::from_raw(notional as i64))
}

fn median_tick(bids: &[BookLevel], asks: &[BookLevel], tick_size: Price) -> Option<i64> {
    let best_bid = bids.iter().map(|l| l.price).max();
    let best_ask = asks.iter().map(|l| l.price).min();
    let price = match (best_bid, best_ask) {
        (Some(b), Some(a)) => Price::from_raw((b.raw() + a.raw()) / 2),
        (Some(b), None) => b,
        (None, Some(a)) => a,
        (None, None) => return None,
    };
    Some(price.raw() / tick_size.raw())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn px(v: &str) -> Price {
        let (whole, frac) = v.split_once('.').unwrap();
        let major: i64 = whole.parse().unwrap();
        let minor: i64 = format!("{:0<8}", frac).parse().unwrap();
        Price::from_parts(major, minor)
    }

    #[test]
    fn snapshot_then_delta_clears_level() {
        let mut book = IndexedOrderBook::new(px("0.01"), 8192).unwrap();
        let bids = vec![BookLevel { price: px("100.00"), qty: Quantity::from_parts(1, 0) }];
        let asks = vec![BookLevel { price: px("100.01"), qty: Quantity::from_parts(2, 0) }];
        book.apply(BookKind::Snapshot, &bids, &asks).unwrap();
        assert_eq!(book.best_bid(), Some(px("100.00")));
        assert_eq!(book.best_ask(), Some(px("100.01")));

        let clear = vec![BookLevel { price: px("100.00"), qty: Quantity::ZERO }];
        book.apply(BookKind::Delta, &clear, &[]).unwrap();
        assert_eq!(book.qty_at(px("100.00")), Quantity::ZERO);
        assert_eq!(book.best_bid(), None);
    }

    #[test]
    fn price_outside_grid_is_an_error() {
        // A SNAPSHOT always re-seats the base at its own median, so a
        // single-price snapshot can never land outside its own grid — the
        // error path only exists for a DELTA applied after the base has
        // already been seated elsewhere.
        let mut book = IndexedOrderBook::new(px("1.00"), 4).unwrap();
        let seed = vec![BookLevel { price: px("100.00"), qty: Quantity::from_parts(1, 0) }];
        book.apply(BookKind::Snapshot, &seed, &[]).unwrap();

        let far = vec![BookLevel { price: px("999999.00"), qty: Quantity::from_parts(1, 0) }];
        assert!(matches!(book.apply(BookKind::Delta, &far, &[]), Err(BookError::PriceOutsideGrid)));
    }

    #[test]
    fn consume_asks_walks_multiple_levels() {
        let mut book = IndexedOrderBook::new(px("1.00"), 64).unwrap();
        let asks = vec![
            BookLevel { price: px("100.00"), qty: Quantity::from_parts(1, 0) },
            BookLevel { price: px("101.00"), qty: Quantity::from_parts(1, 0) },
        ];
        book.apply(BookKind::Snapshot, &[], &asks).unwrap();
        let (filled, _notional) = book.consume_asks(Quantity::from_parts(1, 50_000_000));
        assert_eq!(filled, Quantity::from_parts(1, 50_000_000));
    }
}
