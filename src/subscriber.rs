//! Collaborator interfaces implemented by listeners external to the core:
//! market-data subscribers, order-execution listeners, and strategies.
//! The core only ever calls through these traits — it never owns a
//! concrete strategy or sink.

use crate::clock::UnixNanos;
use crate::decimal::{Price, Quantity};
use crate::ids::{OrderId, SymbolId};
use crate::model::{Bar, BookUpdate, MarketDataError, Order, RejectReason, Trade};

/// Implemented by anything that wants raw market data, independent of the
/// bus it arrived on. Default method bodies are no-ops so a listener only
/// needs to override what it cares about.
pub trait IMarketDataSubscriber: Send + Sync {
    fn on_trade(&self, _trade: &Trade) {}
    fn on_book_update(&self, _update: &BookUpdate) {}
    fn on_bar(&self, _bar: &Bar, _symbol: SymbolId) {}
    fn on_market_data_error(&self, _error: &MarketDataError) {}
}

/// Per-lifecycle callbacks for an execution venue (simulated or live).
/// Default implementations are no-ops; implement only the transitions a
/// listener cares about.
pub trait IOrderExecutionListener: Send + Sync {
    fn on_order_submitted(&self, _order: &Order) {}
    fn on_order_accepted(&self, _order: &Order) {}
    fn on_order_pending_trigger(&self, _order: &Order) {}
    fn on_order_triggered(&self, _order: &Order) {}
    fn on_trailing_stop_updated(&self, _order: &Order, _new_trigger: Price) {}
    fn on_order_partially_filled(&self, _order: &Order, _fill_qty: Quantity, _fill_price: Price) {}
    fn on_order_filled(&self, _order: &Order, _fill_qty: Quantity, _fill_price: Price) {}
    fn on_order_canceled(&self, _order: &Order) {}
    fn on_order_expired(&self, _order: &Order) {}
    fn on_order_rejected(&self, _order: &Order, _reason: RejectReason) {}
    fn on_order_replaced(&self, _old_order_id: OrderId, _new_order: &Order) {}
}

/// Implemented by the backtest runner (and, live, by an execution bridge)
/// to receive the signals a strategy emits.
pub trait ISignalHandler: Send + Sync {
    fn on_signal(&self, signal: &crate::model::Signal);
}

/// A strategy: receives market data and decides what signals to emit. The
/// runner drives `on_trade`/`on_book_update`/`on_bar` and forwards
/// whatever the strategy hands back via its bound [`ISignalHandler`].
pub trait IStrategy: IMarketDataSubscriber {
    fn start(&self, _now: UnixNanos) {}
    fn stop(&self, _now: UnixNanos) {}
}
