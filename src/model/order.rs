//! Orders, their lifecycle events, and fills.

use crate::clock::UnixNanos;
use crate::decimal::{Price, Quantity};
use crate::ids::{OrderId, SymbolId};
use bitflags::bitflags;
use serde::{Deserialize, Serialize};

/// The side of the book an order rests on or a trade executes against.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Debug)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    #[must_use]
    pub const fn opposite(self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

/// The order type taxonomy the simulated executor understands.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Debug)]
pub enum OrderType {
    Limit,
    Market,
    StopMarket,
    StopLimit,
    TakeProfitMarket,
    TakeProfitLimit,
    TrailingStop,
    Iceberg,
}

/// How long an order remains eligible for matching.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Debug)]
pub enum TimeInForce {
    Gtc,
    Ioc,
    Fok,
    Day,
}

bitflags! {
    /// Per-order behavioral modifiers, independent of [`OrderType`].
    #[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Debug)]
    pub struct OrderFlags: u8 {
        const REDUCE_ONLY    = 0b0000_0001;
        const CLOSE_POSITION = 0b0000_0010;
        const POST_ONLY      = 0b0000_0100;
    }
}

/// An order as submitted to (and subsequently tracked by) an execution
/// venue. Immutable after submission: a replace produces a new
/// [`OrderId`] rather than mutating this one in place.
#[derive(Clone, Copy, PartialEq, Serialize, Deserialize, Debug)]
pub struct Order {
    pub id: OrderId,
    pub side: Side,
    pub price: Option<Price>,
    pub quantity: Quantity,
    pub filled_quantity: Quantity,
    pub order_type: OrderType,
    pub symbol: SymbolId,
    pub time_in_force: TimeInForce,
    pub flags: OrderFlags,
    /// Stop/take-profit trigger price; `None` for plain limit/market orders.
    pub trigger_price: Option<Price>,
    /// Absolute trailing offset, for `TRAILING_STOP`. Mutually exclusive
    /// in practice with `trailing_callback_rate_bps`, though both fields
    /// can be set; the executor prefers the absolute offset when present.
    pub trailing_offset: Option<Price>,
    /// Trailing callback rate, in basis points, for `TRAILING_STOP`.
    pub trailing_callback_rate_bps: Option<u32>,
    pub client_order_id: Option<u64>,
    pub strategy_id: Option<u32>,
    pub order_tag: Option<u32>,
    /// Visible quantity for `ICEBERG`; `None` for fully-displayed orders.
    pub visible_quantity: Option<Quantity>,
    pub created_at: UnixNanos,
    pub exchange_ts: Option<UnixNanos>,
    pub last_updated: Option<UnixNanos>,
    pub expires_after: Option<UnixNanos>,
}

impl Order {
    #[must_use]
    pub fn remaining(&self) -> Quantity {
        Quantity::from_raw(self.quantity.raw() - self.filled_quantity.raw())
    }
}

/// A single execution against an [`Order`]. Append-only.
#[derive(Clone, Copy, PartialEq, Serialize, Deserialize, Debug)]
pub struct Fill {
    pub order_id: OrderId,
    pub symbol: SymbolId,
    pub side: Side,
    pub price: Price,
    pub quantity: Quantity,
    pub timestamp_ns: UnixNanos,
}

/// The lifecycle state an [`OrderEvent`] reports. `Filled`, `Canceled`,
/// `Expired`, `Rejected` and `Replaced` are terminal: no further event
/// follows for that order id.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Debug)]
pub enum OrderStatus {
    Submitted,
    Accepted,
    PendingTrigger,
    Triggered,
    TrailingUpdated,
    PartiallyFilled,
    Filled,
    PendingCancel,
    Canceled,
    Expired,
    Rejected,
    Replaced,
}

impl OrderStatus {
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            OrderStatus::Filled
                | OrderStatus::Canceled
                | OrderStatus::Expired
                | OrderStatus::Rejected
                | OrderStatus::Replaced
        )
    }
}

/// A lifecycle transition published for an [`Order`].
#[derive(Clone, Copy, PartialEq, Serialize, Deserialize, Debug)]
pub struct OrderEvent {
    pub status: OrderStatus,
    pub order: Order,
    pub fill_qty: Option<Quantity>,
    pub fill_price: Option<Price>,
    pub new_trailing_price: Option<Price>,
    /// The replacement order id, set when `status == Replaced`.
    pub new_order: Option<OrderId>,
    pub reject_reason: Option<RejectReason>,
    pub exchange_ts: UnixNanos,
}

/// A compact, serializable reason code for `status == Rejected`. The
/// human-readable form lives alongside it in logs, not in the wire event.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Debug)]
pub enum RejectReason {
    InsufficientLiquidity,
    PriceOutsideBookGrid,
    InvalidQuantity,
    DuplicateClientOrderId,
    PostOnlyWouldCross,
    ReduceOnlyWouldIncrease,
    Expired,
    Other,
}
