//! The wire-level data model shared by every component of the pipeline:
//! trades, book updates, orders, fills and bars.

pub mod bar;
pub mod book_update;
pub mod market_error;
pub mod order;
pub mod signal;
pub mod trade;

pub use bar::{Bar, BarEvent, CloseReason};
pub use book_update::{BookKind, BookLevel, BookUpdate, BookUpdateEvent, OptionType};

use serde::{Deserialize, Serialize};

/// The kind of instrument a [`Trade`] or [`BookUpdate`] refers to.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Debug)]
pub enum Instrument {
    Spot,
    Perpetual,
    Future,
    Option,
}
pub use market_error::{MarketDataError, MarketDataErrorCode};
pub use order::{Fill, Order, OrderEvent, OrderFlags, OrderStatus, OrderType, RejectReason, Side, TimeInForce};
pub use signal::{OrderIntent, Signal};
pub use trade::{Trade, TradeEvent};
