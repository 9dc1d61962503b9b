//! The tagged union a strategy emits to request order actions.

use crate::decimal::{Price, Quantity};
use crate::ids::{OrderId, SymbolId};
use crate::model::order::{OrderFlags, Side, TimeInForce};
use serde::{Deserialize, Serialize};

/// Shared submission modifiers carried by every order-placing [`Signal`]
/// variant.
#[derive(Clone, Copy, PartialEq, Serialize, Deserialize, Debug)]
pub struct OrderIntent {
    pub symbol: SymbolId,
    pub side: Side,
    pub quantity: Quantity,
    pub time_in_force: TimeInForce,
    pub flags: OrderFlags,
    pub client_order_id: Option<u64>,
}

/// A request a strategy hands to the backtest runner or live execution
/// bridge. The runner synthesizes an [`crate::model::Order`] from it
/// (assigning a fresh [`OrderId`] when the intent carries none) and
/// dispatches the result to the executor.
#[derive(Clone, Copy, PartialEq, Serialize, Deserialize, Debug)]
pub enum Signal {
    Market(OrderIntent),
    Limit(OrderIntent, Price),
    StopMarket(OrderIntent, Price),
    StopLimit(OrderIntent, Price, Price),
    TakeProfitMarket(OrderIntent, Price),
    TakeProfitLimit(OrderIntent, Price, Price),
    /// Absolute trailing offset, plus an optional callback rate in bps
    /// (used instead of the absolute offset when `offset` is zero).
    TrailingStop(OrderIntent, Price, Option<u32>),
    /// One-cancels-other: a resting limit leg and a stop leg, linked so
    /// that filling or canceling one cancels the other.
    Oco {
        limit: (OrderIntent, Price),
        stop: (OrderIntent, Price),
    },
    /// Translated by the runner into a replace (cancel + resubmit under a
    /// fresh [`OrderId`]).
    Modify {
        order_id: OrderId,
        new_price: Option<Price>,
        new_quantity: Option<Quantity>,
    },
    Cancel(OrderId),
    CancelAll(Option<SymbolId>),
}
