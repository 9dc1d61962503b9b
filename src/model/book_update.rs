//! Order-book update messages and their pooled bus envelope.

use crate::clock::UnixNanos;
use crate::decimal::{Price, Quantity};
use crate::ids::SymbolId;
use crate::model::Instrument;
use crate::pool::{PoolHandle, PoolReset};
use serde::{Deserialize, Serialize};

/// Whether a [`BookUpdate`] fully replaces book state or incrementally
/// patches it. `SNAPSHOT` is the sole way to reset book state.
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Debug)]
pub enum BookKind {
    Snapshot,
    Delta,
}

/// A single `(price, qty)` level. In a `DELTA`, `qty == 0` means "remove
/// this level".
#[derive(Clone, Copy, PartialEq, Serialize, Deserialize, Debug)]
pub struct BookLevel {
    pub price: Price,
    pub qty: Quantity,
}

/// Option-specific metadata carried by option book updates.
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Debug)]
pub enum OptionType {
    Call,
    Put,
}

/// A full-replace or incremental order-book update.
///
/// `bids`/`asks` live in a `Vec` that is reused across the lifetime of the
/// pool slot it is attached to (the "arena-allocator-backed dynamic
/// sequence" the design notes call for): [`PoolReset::clear`] truncates it
/// to length zero without releasing its allocation.
#[derive(Clone, PartialEq, Serialize, Deserialize, Debug, Default)]
pub struct BookUpdate {
    pub symbol: SymbolId,
    pub instrument: Option<Instrument>,
    pub kind: Option<BookKind>,
    pub bids: Vec<BookLevel>,
    pub asks: Vec<BookLevel>,
    pub exchange_ts_ns: UnixNanos,
    pub system_ts_ns: UnixNanos,
    pub strike: Option<Price>,
    pub expiry: Option<UnixNanos>,
    pub option_type: Option<OptionType>,
}

impl PoolReset for BookUpdate {
    fn clear(&mut self) {
        self.symbol = SymbolId(0);
        self.instrument = None;
        self.kind = None;
        self.bids.clear();
        self.asks.clear();
        self.exchange_ts_ns = UnixNanos::ZERO;
        self.system_ts_ns = UnixNanos::ZERO;
        self.strike = None;
        self.expiry = None;
        self.option_type = None;
    }
}

/// Bus envelope around a pooled [`BookUpdate`].
///
/// Acquired from [`crate::pool::ObjectPool`], populated by the producer,
/// reference-counted while in flight across consumers, and reclaimed
/// (slot cleared, returned to the free list) when the last [`PoolHandle`]
/// is dropped.
#[derive(Clone)]
pub struct BookUpdateEvent {
    pub update: PoolHandle<BookUpdate>,
    /// Exchange-assigned sequence number, for gap detection.
    pub seq: u64,
    /// The exchange sequence number immediately preceding `seq`.
    pub prev_seq: Option<u64>,
    /// Assigned by the bus at publish time.
    pub tick_sequence: i64,
    pub recv: UnixNanos,
    pub publish: UnixNanos,
}

impl BookUpdateEvent {
    #[must_use]
    pub fn new(update: PoolHandle<BookUpdate>, seq: u64, prev_seq: Option<u64>, recv: UnixNanos) -> Self {
        Self {
            update,
            seq,
            prev_seq,
            tick_sequence: -1,
            recv,
            publish: UnixNanos::ZERO,
        }
    }
}
