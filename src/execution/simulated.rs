//! The simulated execution venue: resting orders, five conditional
//! kinds, trailing-stop state, and OCO linkage, driven entirely by
//! trade/book updates fed in by the caller (backtest runner or a live
//! bridge in replay mode).

use crate::clock::IClock;
use crate::decimal::{Price, Quantity};
use crate::execution::capabilities::ExecutionCapabilities;
use crate::execution::error::ExecutionError;
use crate::execution::state::{MarketState, TrailingState};
use crate::ids::{OrderId, SymbolId};
use crate::model::{Fill, Order, OrderEvent, OrderStatus, OrderType, RejectReason, Side};
use crate::subscriber::IOrderExecutionListener;
use crate::symbol_map::SymbolStateMap;
use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;

const fn is_conditional(t: OrderType) -> bool {
    matches!(
        t,
        OrderType::StopMarket
            | OrderType::StopLimit
            | OrderType::TakeProfitMarket
            | OrderType::TakeProfitLimit
            | OrderType::TrailingStop
    )
}

/// Coerces a just-triggered conditional order's type into the concrete
/// order it becomes: stop/TP "Market" variants become `MARKET`,
/// "Limit" variants become `LIMIT`.
const fn coerce_triggered_type(t: OrderType) -> OrderType {
    match t {
        OrderType::StopMarket | OrderType::TakeProfitMarket | OrderType::TrailingStop => OrderType::Market,
        OrderType::StopLimit | OrderType::TakeProfitLimit => OrderType::Limit,
        other => other,
    }
}

fn stop_triggers(side: Side, last_trade: Price, trigger: Price) -> bool {
    match side {
        Side::Sell => last_trade.raw() <= trigger.raw(),
        Side::Buy => last_trade.raw() >= trigger.raw(),
    }
}

fn take_profit_triggers(side: Side, last_trade: Price, trigger: Price) -> bool {
    match side {
        Side::Sell => last_trade.raw() >= trigger.raw(),
        Side::Buy => last_trade.raw() <= trigger.raw(),
    }
}

/// The price at which `order` could fill immediately against `market`,
/// if any. Conditional order types never fill directly — they must
/// trigger and coerce to `MARKET`/`LIMIT` first.
fn immediate_fill_price(order: &Order, market: &MarketState) -> Option<Price> {
    match order.order_type {
        OrderType::Market => match order.side {
            Side::Buy => market.best_ask.or(market.last_trade),
            Side::Sell => market.best_bid.or(market.last_trade),
        },
        OrderType::Limit | OrderType::Iceberg => {
            let limit = order.price?;
            match order.side {
                Side::Buy => market.best_ask.filter(|ask| limit >= *ask),
                Side::Sell => market.best_bid.filter(|bid| limit <= *bid),
            }
        }
        _ => None,
    }
}

/// Resting (`LIMIT`/`MARKET`/`ICEBERG`) and conditional order book for
/// deterministic backtesting. Single-threaded with respect to order
/// mutation — callers must drive it from one consumer, matching every
/// other single-writer structure in the pipeline.
pub struct SimulatedExecutor {
    clock: Arc<dyn IClock>,
    pending: Vec<Order>,
    conditional: Vec<Order>,
    market: SymbolStateMap<MarketState>,
    trailing: HashMap<OrderId, TrailingState>,
    oco: HashMap<OrderId, OrderId>,
    known_ids: HashSet<OrderId>,
    fills: Vec<Fill>,
    listeners: Vec<Arc<dyn IOrderExecutionListener>>,
}

impl SimulatedExecutor {
    #[must_use]
    pub fn new(clock: Arc<dyn IClock>) -> Self {
        Self {
            clock,
            pending: Vec::new(),
            conditional: Vec::new(),
            market: SymbolStateMap::new(),
            trailing: HashMap::new(),
            oco: HashMap::new(),
            known_ids: HashSet::new(),
            fills: Vec::new(),
            listeners: Vec::new(),
        }
    }

    pub fn register_listener(&mut self, listener: Arc<dyn IOrderExecutionListener>) {
        self.listeners.push(listener);
    }

    #[must_use]
    pub fn capabilities(&self) -> ExecutionCapabilities {
        ExecutionCapabilities::simulated()
    }

    #[must_use]
    pub fn fills(&self) -> &[Fill] {
        &self.fills
    }

    #[must_use]
    pub fn pending_orders(&self) -> &[Order] {
        &self.pending
    }

    #[must_use]
    pub fn conditional_orders(&self) -> &[Order] {
        &self.conditional
    }

    fn market_state(&mut self, symbol: SymbolId) -> MarketState {
        *self.market.get_or_init(symbol, MarketState::default)
    }

    fn mk_event(&self, status: OrderStatus, order: Order, now: crate::clock::UnixNanos) -> OrderEvent {
        OrderEvent {
            status,
            order,
            fill_qty: None,
            fill_price: None,
            new_trailing_price: None,
            new_order: None,
            reject_reason: None,
            exchange_ts: now,
        }
    }

    fn dispatch(&self, event: &OrderEvent) {
        for listener in &self.listeners {
            match event.status {
                OrderStatus::Submitted => listener.on_order_submitted(&event.order),
                OrderStatus::Accepted => listener.on_order_accepted(&event.order),
                OrderStatus::PendingTrigger => listener.on_order_pending_trigger(&event.order),
                OrderStatus::Triggered => listener.on_order_triggered(&event.order),
                OrderStatus::TrailingUpdated => {
                    if let Some(price) = event.new_trailing_price {
                        listener.on_trailing_stop_updated(&event.order, price);
                    }
                }
                OrderStatus::PartiallyFilled => {
                    if let (Some(qty), Some(price)) = (event.fill_qty, event.fill_price) {
                        listener.on_order_partially_filled(&event.order, qty, price);
                    }
                }
                OrderStatus::Filled => {
                    if let (Some(qty), Some(price)) = (event.fill_qty, event.fill_price) {
                        listener.on_order_filled(&event.order, qty, price);
                    }
                }
                OrderStatus::Canceled => listener.on_order_canceled(&event.order),
                OrderStatus::Expired => listener.on_order_expired(&event.order),
                OrderStatus::Rejected => {
                    if let Some(reason) = event.reject_reason {
                        listener.on_order_rejected(&event.order, reason);
                    }
                }
                OrderStatus::Replaced => {
                    if let Some(new_id) = event.new_order {
                        listener.on_order_replaced(event.order.id, &Order { id: new_id, ..event.order });
                    }
                }
                OrderStatus::PendingCancel => {}
            }
        }
    }

    fn push_event(&self, events: &mut Vec<OrderEvent>, event: OrderEvent) {
        self.dispatch(&event);
        events.push(event);
    }

    /// Submits one order. Fails only on a duplicate id — a venue-side
    /// reject is a terminal `OrderEvent`, not an `Err`.
    ///
    /// # Errors
    /// Returns [`ExecutionError::DuplicateOrderId`] if `order.id` has
    /// already been submitted in this executor's lifetime.
    pub fn submit(&mut self, mut order: Order) -> Result<Vec<OrderEvent>, ExecutionError> {
        if !self.known_ids.insert(order.id) {
            return Err(ExecutionError::DuplicateOrderId(order.id));
        }
        let now = self.clock.now_ns();
        order.created_at = now;
        order.exchange_ts = Some(now);

        let mut events = Vec::new();
        self.push_event(&mut events, self.mk_event(OrderStatus::Submitted, order, now));
        self.push_event(&mut events, self.mk_event(OrderStatus::Accepted, order, now));

        if order.quantity.raw() <= 0 {
            let rejected = OrderEvent {
                reject_reason: Some(RejectReason::InvalidQuantity),
                ..self.mk_event(OrderStatus::Rejected, order, now)
            };
            self.push_event(&mut events, rejected);
            return Ok(events);
        }

        if is_conditional(order.order_type) {
            self.push_event(&mut events, self.mk_event(OrderStatus::PendingTrigger, order, now));
            if order.order_type == OrderType::TrailingStop {
                let market = self.market_state(order.symbol);
                let reference = market
                    .last_trade
                    .or(match order.side {
                        Side::Buy => market.best_ask,
                        Side::Sell => market.best_bid,
                    })
                    .or(order.trigger_price)
                    .unwrap_or(Price::ZERO);
                let mut trailing = TrailingState {
                    side: order.side,
                    offset: order.trailing_offset,
                    callback_rate_bps: order.trailing_callback_rate_bps,
                    current_trigger: Price::ZERO,
                };
                let trigger = trailing.candidate_trigger(reference);
                trailing.current_trigger = trigger;
                order.trigger_price = Some(trigger);
                self.trailing.insert(order.id, trailing);
            }
            self.conditional.push(order);
        } else {
            self.try_fill_or_rest(order, now, &mut events);
        }
        Ok(events)
    }

    /// Attempts an immediate fill; appends events and either leaves
    /// nothing resting (fully filled) or pushes the remainder to
    /// `pending`.
    fn try_fill_or_rest(&mut self, mut order: Order, now: crate::clock::UnixNanos, events: &mut Vec<OrderEvent>) {
        let market = self.market_state(order.symbol);
        match immediate_fill_price(&order, &market) {
            Some(price) => {
                let qty = order.remaining();
                self.settle_fill(&mut order, price, qty, now, events);
            }
            None => self.pending.push(order),
        }
    }

    fn settle_fill(
        &mut self,
        order: &mut Order,
        price: Price,
        qty: Quantity,
        now: crate::clock::UnixNanos,
        events: &mut Vec<OrderEvent>,
    ) {
        self.fills.push(Fill {
            order_id: order.id,
            symbol: order.symbol,
            side: order.side,
            price,
            quantity: qty,
            timestamp_ns: now,
        });
        order.filled_quantity = Quantity::from_raw(order.filled_quantity.raw() + qty.raw());
        self.market.get_or_init(order.symbol, MarketState::default).last_trade = Some(price);

        let status = if order.filled_quantity.raw() >= order.quantity.raw() {
            OrderStatus::Filled
        } else {
            OrderStatus::PartiallyFilled
        };
        let event = OrderEvent {
            fill_qty: Some(qty),
            fill_price: Some(price),
            ..self.mk_event(status, *order, now)
        };
        self.push_event(events, event);

        if status == OrderStatus::Filled {
            self.on_terminal(order.id, events, now);
        }
    }

    /// Evicts trailing state and, if `id` is one leg of an OCO pair,
    /// cancels the other leg (single-threaded executor: no double-cancel
    /// race is possible).
    fn on_terminal(&mut self, id: OrderId, events: &mut Vec<OrderEvent>, now: crate::clock::UnixNanos) {
        self.trailing.remove(&id);
        if let Some(other) = self.oco.remove(&id) {
            self.oco.remove(&other);
            self.cancel_if_present(other, events, now);
        }
    }

    fn cancel_if_present(&mut self, id: OrderId, events: &mut Vec<OrderEvent>, now: crate::clock::UnixNanos) {
        if let Some(pos) = self.pending.iter().position(|o| o.id == id) {
            let order = self.pending.remove(pos);
            self.push_event(events, self.mk_event(OrderStatus::Canceled, order, now));
            self.on_terminal(id, events, now);
            return;
        }
        if let Some(pos) = self.conditional.iter().position(|o| o.id == id) {
            let order = self.conditional.remove(pos);
            self.push_event(events, self.mk_event(OrderStatus::Canceled, order, now));
            self.on_terminal(id, events, now);
        }
    }

    /// Cancels `id` if it is still resting or pending-trigger.
    ///
    /// # Errors
    /// Returns [`ExecutionError::OrderNotFound`] if `id` is not in
    /// either list (already terminal, or never submitted).
    pub fn cancel_order(&mut self, id: OrderId) -> Result<Vec<OrderEvent>, ExecutionError> {
        let now = self.clock.now_ns();
        let mut events = Vec::new();
        let before = events.len();
        self.cancel_if_present(id, &mut events, now);
        if events.len() == before {
            return Err(ExecutionError::OrderNotFound(id));
        }
        Ok(events)
    }

    /// Cancels every resting/pending-trigger order, optionally scoped to
    /// one symbol.
    pub fn cancel_all_orders(&mut self, symbol: Option<SymbolId>) -> Vec<OrderEvent> {
        let now = self.clock.now_ns();
        let matches = |o: &Order| match symbol {
            Some(s) => o.symbol == s,
            None => true,
        };
        let ids: Vec<OrderId> = self
            .pending
            .iter()
            .chain(self.conditional.iter())
            .filter(|o| matches(o))
            .map(|o| o.id)
            .collect();
        let mut events = Vec::new();
        for id in ids {
            self.cancel_if_present(id, &mut events, now);
        }
        events
    }

    /// Registers a one-cancels-other link between two orders and submits
    /// both. If either leg fills (or is otherwise already terminal) by
    /// the time both submissions have run, the surviving leg is
    /// canceled.
    ///
    /// # Errors
    /// Propagates a [`ExecutionError::DuplicateOrderId`] from either leg.
    pub fn submit_oco(&mut self, order1: Order, order2: Order) -> Result<Vec<OrderEvent>, ExecutionError> {
        self.oco.insert(order1.id, order2.id);
        self.oco.insert(order2.id, order1.id);
        let mut events = self.submit(order1)?;
        events.extend(self.submit(order2)?);
        let now = self.clock.now_ns();
        let id1_terminal = events
            .iter()
            .any(|e| e.order.id == order1.id && e.status.is_terminal());
        let id2_terminal = events
            .iter()
            .any(|e| e.order.id == order2.id && e.status.is_terminal());
        if id1_terminal && !id2_terminal {
            self.oco.remove(&order1.id);
            self.oco.remove(&order2.id);
            self.cancel_if_present(order2.id, &mut events, now);
        } else if id2_terminal && !id1_terminal {
            self.oco.remove(&order1.id);
            self.oco.remove(&order2.id);
            self.cancel_if_present(order1.id, &mut events, now);
        }
        Ok(events)
    }

    /// Replaces a resting or pending-trigger order with a new one under a
    /// fresh id, per the `Modify` signal translation (§4.8/§9): the old
    /// order never mutates in place, since an order is immutable after
    /// submission. Emits a single `Replaced` event for the old order
    /// (`new_order = Some(new_id)`), then resubmits the same side/symbol/
    /// type/flags under `new_id` with `new_price`/`new_quantity`
    /// substituted where given. A trailing or OCO link the old order held
    /// is carried over to the new id.
    ///
    /// # Errors
    /// Returns [`ExecutionError::OrderNotFound`] if `id` is not resting or
    /// pending-trigger (already terminal, or never submitted).
    pub fn replace_order(
        &mut self,
        id: OrderId,
        new_id: OrderId,
        new_price: Option<Price>,
        new_quantity: Option<Quantity>,
    ) -> Result<Vec<OrderEvent>, ExecutionError> {
        let now = self.clock.now_ns();
        let old = if let Some(pos) = self.pending.iter().position(|o| o.id == id) {
            self.pending.remove(pos)
        } else if let Some(pos) = self.conditional.iter().position(|o| o.id == id) {
            self.conditional.remove(pos)
        } else {
            return Err(ExecutionError::OrderNotFound(id));
        };

        let mut events = Vec::new();
        let replaced = OrderEvent {
            new_order: Some(new_id),
            ..self.mk_event(OrderStatus::Replaced, old, now)
        };
        self.push_event(&mut events, replaced);

        let trailing = self.trailing.remove(&id);
        let linked = self.oco.remove(&id);

        // A "price" override lands on the limit price for order types that
        // carry one, and on the trigger price for pure stop/TP-market
        // types, which have no limit price to modify.
        let has_limit_price = matches!(
            old.order_type,
            OrderType::Limit | OrderType::Iceberg | OrderType::StopLimit | OrderType::TakeProfitLimit
        );
        let new_order = Order {
            id: new_id,
            price: if has_limit_price { new_price.or(old.price) } else { old.price },
            trigger_price: if has_limit_price { old.trigger_price } else { new_price.or(old.trigger_price) },
            quantity: new_quantity.unwrap_or(old.quantity),
            filled_quantity: Quantity::ZERO,
            created_at: now,
            exchange_ts: Some(now),
            last_updated: Some(now),
            ..old
        };
        self.known_ids.insert(new_id);

        if is_conditional(new_order.order_type) {
            self.push_event(&mut events, self.mk_event(OrderStatus::Submitted, new_order, now));
            self.push_event(&mut events, self.mk_event(OrderStatus::Accepted, new_order, now));
            self.push_event(&mut events, self.mk_event(OrderStatus::PendingTrigger, new_order, now));
            if let Some(mut trailing) = trailing {
                if let Some(trigger) = new_order.trigger_price {
                    trailing.current_trigger = trigger;
                }
                self.trailing.insert(new_id, trailing);
            }
            self.conditional.push(new_order);
        } else {
            self.push_event(&mut events, self.mk_event(OrderStatus::Submitted, new_order, now));
            self.push_event(&mut events, self.mk_event(OrderStatus::Accepted, new_order, now));
            self.try_fill_or_rest(new_order, now, &mut events);
        }

        if let Some(other) = linked {
            self.oco.insert(new_id, other);
            self.oco.insert(other, new_id);
        }
        Ok(events)
    }

    /// Folds in one trade: updates `lastTrade`, advances trailing
    /// triggers, checks conditional triggers (last-trade-only, per the
    /// reference engine — book changes alone never trigger a stop), then
    /// retries matching on the resting book.
    pub fn on_trade(&mut self, symbol: SymbolId, price: Price) -> Vec<OrderEvent> {
        let now = self.clock.now_ns();
        let mut events = Vec::new();
        self.market.get_or_init(symbol, MarketState::default).last_trade = Some(price);

        self.advance_trailing(symbol, price, now, &mut events);
        self.check_conditional_triggers(symbol, price, now, &mut events);
        self.retry_pending(symbol, now, &mut events);
        events
    }

    fn advance_trailing(&mut self, symbol: SymbolId, price: Price, now: crate::clock::UnixNanos, events: &mut Vec<OrderEvent>) {
        let ids: Vec<OrderId> = self
            .conditional
            .iter()
            .filter(|o| o.symbol == symbol && o.order_type == OrderType::TrailingStop)
            .map(|o| o.id)
            .collect();
        for id in ids {
            let Some(trailing) = self.trailing.get(&id).copied() else { continue };
            let candidate = trailing.candidate_trigger(price);
            if trailing.is_improvement(candidate) {
                self.trailing.get_mut(&id).unwrap().current_trigger = candidate;
                let order_copy = self.conditional.iter_mut().find(|o| o.id == id).map(|order| {
                    order.trigger_price = Some(candidate);
                    *order
                });
                if let Some(order_copy) = order_copy {
                    let event = OrderEvent {
                        new_trailing_price: Some(candidate),
                        ..self.mk_event(OrderStatus::TrailingUpdated, order_copy, now)
                    };
                    self.dispatch(&event);
                    events.push(event);
                }
            }
        }
    }

    fn check_conditional_triggers(
        &mut self,
        symbol: SymbolId,
        last_trade: Price,
        now: crate::clock::UnixNanos,
        events: &mut Vec<OrderEvent>,
    ) {
        let triggered: Vec<usize> = self
            .conditional
            .iter()
            .enumerate()
            .filter(|(_, o)| o.symbol == symbol)
            .filter_map(|(idx, o)| {
                let trigger = o.trigger_price?;
                let fires = match o.order_type {
                    OrderType::StopMarket | OrderType::StopLimit | OrderType::TrailingStop => {
                        stop_triggers(o.side, last_trade, trigger)
                    }
                    OrderType::TakeProfitMarket | OrderType::TakeProfitLimit => {
                        take_profit_triggers(o.side, last_trade, trigger)
                    }
                    _ => false,
                };
                fires.then_some(idx)
            })
            .collect();

        // Remove back-to-front so earlier indices stay valid.
        for &idx in triggered.iter().rev() {
            let mut order = self.conditional.remove(idx);
            order.order_type = coerce_triggered_type(order.order_type);
            self.push_event(events, self.mk_event(OrderStatus::Triggered, order, now));
            self.try_fill_or_rest(order, now, events);
        }
    }

    /// Attempts to match every resting pending order for `symbol`
    /// against the current market, after a trade or book update moved
    /// price.
    fn retry_pending(&mut self, symbol: SymbolId, now: crate::clock::UnixNanos, events: &mut Vec<OrderEvent>) {
        let market = self.market_state(symbol);
        let matches: Vec<usize> = self
            .pending
            .iter()
            .enumerate()
            .filter(|(_, o)| o.symbol == symbol)
            .filter_map(|(idx, o)| immediate_fill_price(o, &market).map(|price| (idx, price)))
            .map(|(idx, _)| idx)
            .collect();
        for &idx in matches.iter().rev() {
            let mut order = self.pending.remove(idx);
            let market = self.market_state(order.symbol);
            if let Some(price) = immediate_fill_price(&order, &market) {
                let qty = order.remaining();
                self.settle_fill(&mut order, price, qty, now, events);
            } else {
                self.pending.push(order);
            }
        }
    }

    /// Folds in a book update's best bid/ask for `symbol` (conditional
    /// triggers never fire from this path, per §4.7/§9).
    pub fn on_book_bbo(&mut self, symbol: SymbolId, best_bid: Option<Price>, best_ask: Option<Price>) -> Vec<OrderEvent> {
        let now = self.clock.now_ns();
        {
            let state = self.market.get_or_init(symbol, MarketState::default);
            state.best_bid = best_bid;
            state.best_ask = best_ask;
        }
        let mut events = Vec::new();
        self.retry_pending(symbol, now, &mut events);
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SimClock;
    use crate::clock::UnixNanos;
    use crate::ids::SymbolId;
    use crate::model::{OrderFlags, TimeInForce};

    fn base_order(id: u64, side: Side, order_type: OrderType, price: Option<Price>, qty: i64) -> Order {
        Order {
            id: OrderId(id),
            side,
            price,
            quantity: Quantity::from_parts(qty, 0),
            filled_quantity: Quantity::ZERO,
            order_type,
            symbol: SymbolId(1),
            time_in_force: TimeInForce::Gtc,
            flags: OrderFlags::empty(),
            trigger_price: None,
            trailing_offset: None,
            trailing_callback_rate_bps: None,
            client_order_id: None,
            strategy_id: None,
            order_tag: None,
            visible_quantity: None,
            created_at: UnixNanos::ZERO,
            exchange_ts: None,
            last_updated: None,
            expires_after: None,
        }
    }

    fn executor() -> SimulatedExecutor {
        SimulatedExecutor::new(Arc::new(SimClock::new(UnixNanos::ZERO)))
    }

    #[test]
    fn scenario_a_limit_fill_against_resting_ask() {
        let mut exec = executor();
        exec.on_book_bbo(SymbolId(1), Some(Price::from_parts(100, 0)), Some(Price::from_parts(100, 50_000_000)));
        let order = base_order(1, Side::Buy, OrderType::Limit, Some(Price::from_parts(100, 50_000_000)), 2);
        let events = exec.submit(order).unwrap();
        let statuses: Vec<_> = events.iter().map(|e| e.status).collect();
        assert_eq!(statuses, vec![OrderStatus::Submitted, OrderStatus::Accepted, OrderStatus::Filled]);
        let last = events.last().unwrap();
        assert_eq!(last.fill_qty, Some(Quantity::from_parts(2, 0)));
        assert_eq!(last.fill_price, Some(Price::from_parts(100, 50_000_000)));
    }

    #[test]
    fn scenario_b_stop_market_trigger_then_fill() {
        let mut exec = executor();
        exec.on_book_bbo(SymbolId(1), Some(Price::from_parts(98, 0)), Some(Price::from_parts(98, 50_000_000)));
        let mut order = base_order(2, Side::Sell, OrderType::StopMarket, None, 1);
        order.trigger_price = Some(Price::from_parts(99, 0));
        let submit_events = exec.submit(order).unwrap();
        assert_eq!(submit_events.last().unwrap().status, OrderStatus::PendingTrigger);

        let events_no_trigger = exec.on_trade(SymbolId(1), Price::from_parts(99, 50_000_000));
        assert!(events_no_trigger.is_empty());

        let events_trigger = exec.on_trade(SymbolId(1), Price::from_parts(98, 50_000_000));
        let statuses: Vec<_> = events_trigger.iter().map(|e| e.status).collect();
        assert_eq!(statuses, vec![OrderStatus::Triggered, OrderStatus::Filled]);
        assert_eq!(events_trigger.last().unwrap().fill_price, Some(Price::from_parts(98, 0)));
    }

    #[test]
    fn scenario_c_trailing_stop_monotonic_updates() {
        let mut exec = executor();
        exec.market.get_or_init(SymbolId(1), MarketState::default).last_trade = Some(Price::from_parts(100, 0));
        let mut order = base_order(3, Side::Sell, OrderType::TrailingStop, None, 1);
        order.trailing_offset = Some(Price::from_parts(1, 0));
        exec.submit(order).unwrap();

        let mut triggers = Vec::new();
        for price in [Price::from_parts(101, 0), Price::from_parts(102, 0), Price::from_parts(101, 50_000_000)] {
            for e in exec.on_trade(SymbolId(1), price) {
                if e.status == OrderStatus::TrailingUpdated {
                    triggers.push(e.new_trailing_price.unwrap());
                }
            }
        }
        assert_eq!(triggers, vec![Price::from_parts(100, 0), Price::from_parts(101, 0)]);

        exec.on_book_bbo(SymbolId(1), Some(Price::from_parts(100, 99_000_000)), Some(Price::from_parts(101, 0)));
        let events = exec.on_trade(SymbolId(1), Price::from_parts(100, 99_000_000));
        let statuses: Vec<_> = events.iter().map(|e| e.status).collect();
        assert_eq!(statuses, vec![OrderStatus::Triggered, OrderStatus::Filled]);
    }

    #[test]
    fn scenario_d_oco_cancels_surviving_leg() {
        let mut exec = executor();
        exec.on_book_bbo(SymbolId(1), Some(Price::from_parts(110, 0)), Some(Price::from_parts(110, 10_000_000)));
        let limit = base_order(4, Side::Sell, OrderType::Limit, Some(Price::from_parts(110, 0)), 1);
        let mut stop = base_order(5, Side::Sell, OrderType::StopMarket, None, 1);
        stop.trigger_price = Some(Price::from_parts(90, 0));

        let events = exec.submit_oco(limit, stop).unwrap();
        let limit_filled = events.iter().any(|e| e.order.id == OrderId(4) && e.status == OrderStatus::Filled);
        let stop_canceled = events.iter().any(|e| e.order.id == OrderId(5) && e.status == OrderStatus::Canceled);
        assert!(limit_filled);
        assert!(stop_canceled);
        assert!(exec.conditional_orders().is_empty());
    }

    #[test]
    fn duplicate_order_id_rejected_as_error() {
        let mut exec = executor();
        let order = base_order(6, Side::Buy, OrderType::Market, None, 1);
        exec.submit(order).unwrap();
        let err = exec.submit(order).unwrap_err();
        assert_eq!(err, ExecutionError::DuplicateOrderId(OrderId(6)));
    }

    #[test]
    fn replace_order_carries_new_price_under_fresh_id() {
        let mut exec = executor();
        let order = base_order(7, Side::Buy, OrderType::Limit, Some(Price::from_parts(100, 0)), 1);
        exec.submit(order).unwrap();

        let events = exec.replace_order(OrderId(7), OrderId(8), Some(Price::from_parts(99, 0)), None).unwrap();
        let statuses: Vec<_> = events.iter().map(|e| e.status).collect();
        assert_eq!(
            statuses,
            vec![OrderStatus::Replaced, OrderStatus::Submitted, OrderStatus::Accepted]
        );
        assert_eq!(events[0].new_order, Some(OrderId(8)));
        assert!(exec.pending_orders().iter().any(|o| o.id == OrderId(8) && o.price == Some(Price::from_parts(99, 0))));
        assert!(!exec.pending_orders().iter().any(|o| o.id == OrderId(7)));

        let err = exec.replace_order(OrderId(7), OrderId(9), None, None).unwrap_err();
        assert_eq!(err, ExecutionError::OrderNotFound(OrderId(7)));
    }
}
