//! The backtest runner: replays a sorted `.floxlog` event stream through
//! the simulated executor and a strategy, advancing a virtual clock as it
//! goes. Two entry points: [`BacktestRunner::run`] (drive straight
//! through, collect the fill/trade log) and [`BacktestRunner::start`]
//! (pause-at-start, externally controlled via [`ControlHandle`]).

use crate::backtest::control::{ControlHandle, ControlState, ReplayProgress, StepMode};
use crate::backtest::error::BacktestError;
use crate::backtest::source::EventSource;
use crate::clock::{IClock, SimClock, UnixNanos};
use crate::decimal::{Price, Quantity};
use crate::execution::SimulatedExecutor;
use crate::ids::{OrderId, SymbolId};
use crate::log::{BookRecord, LogRecord, TradeRecord};
use crate::model::{
    Bar, BookKind, BookUpdate, Fill, Order, OrderEvent, OrderFlags, OrderIntent, OrderStatus, OrderType, Signal,
    Trade,
};
use crate::orderbook::{IndexedOrderBook, DEFAULT_MAX_LEVELS};
use crate::registry::SymbolRegistry;
use crate::strategy_support::OrderIdGenerator;
use crate::subscriber::{IMarketDataSubscriber, ISignalHandler, IStrategy};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

fn trade_from_record(r: &TradeRecord) -> Trade {
    Trade {
        symbol: r.symbol,
        instrument: r.instrument,
        price: r.price,
        quantity: r.quantity,
        is_buy: r.is_buy,
        exchange_ts_ns: r.exchange_ts_ns,
    }
}

fn book_update_from_record(r: &BookRecord) -> BookUpdate {
    BookUpdate {
        symbol: r.symbol,
        instrument: Some(r.instrument),
        kind: Some(r.kind),
        bids: r.bids.clone(),
        asks: r.asks.clone(),
        exchange_ts_ns: r.exchange_ts_ns,
        system_ts_ns: r.system_ts_ns,
        strike: None,
        expiry: None,
        option_type: None,
    }
}

/// The fill/trade/event log a completed (or paused) backtest has
/// accumulated.
#[derive(Clone, Debug, Default)]
pub struct BacktestResult {
    pub trades: Vec<Trade>,
    pub fills: Vec<Fill>,
    pub order_events: Vec<OrderEvent>,
    pub bars: Vec<Bar>,
    pub events_processed: u64,
    pub trades_processed: u64,
    pub book_updates_processed: u64,
}

/// Builds an [`Order`] from a strategy's [`OrderIntent`] plus the
/// type-specific fields a given [`Signal`] variant carries.
#[allow(clippy::too_many_arguments)]
fn build_order(
    id: OrderId,
    intent: &OrderIntent,
    order_type: OrderType,
    price: Option<Price>,
    trigger_price: Option<Price>,
    trailing_offset: Option<Price>,
    trailing_callback_rate_bps: Option<u32>,
    now: UnixNanos,
) -> Order {
    Order {
        id,
        side: intent.side,
        price,
        quantity: intent.quantity,
        filled_quantity: Quantity::ZERO,
        order_type,
        symbol: intent.symbol,
        time_in_force: intent.time_in_force,
        flags: intent.flags,
        trigger_price,
        trailing_offset,
        trailing_callback_rate_bps,
        client_order_id: intent.client_order_id,
        strategy_id: None,
        order_tag: None,
        visible_quantity: None,
        created_at: now,
        exchange_ts: None,
        last_updated: None,
        expires_after: None,
    }
}

/// Drives the simulated executor from a sorted event stream. Implements
/// [`ISignalHandler`] so a strategy can be bound to it directly: a
/// strategy holds an `Arc<dyn ISignalHandler>` (never an owning reference
/// to the runner itself, per §9's cyclic-reference note) and calls
/// `on_signal` synchronously from inside `on_trade`/`on_book_update`.
pub struct BacktestRunner {
    clock: Arc<SimClock>,
    registry: Option<Arc<SymbolRegistry>>,
    executor: Mutex<SimulatedExecutor>,
    books: Mutex<HashMap<SymbolId, IndexedOrderBook>>,
    order_ids: OrderIdGenerator,
    order_events: Mutex<Vec<OrderEvent>>,
    control: Arc<ControlState>,
}

impl BacktestRunner {
    /// Builds a runner with a fresh [`SimClock`] starting at zero and an
    /// executor driven by that same clock.
    #[must_use]
    pub fn new(registry: Option<Arc<SymbolRegistry>>) -> Self {
        let clock = Arc::new(SimClock::new(UnixNanos::ZERO));
        Self {
            executor: Mutex::new(SimulatedExecutor::new(Arc::clone(&clock) as Arc<dyn IClock>)),
            clock,
            registry,
            books: Mutex::new(HashMap::new()),
            order_ids: OrderIdGenerator::starting_at(1),
            order_events: Mutex::new(Vec::new()),
            control: ControlState::new(),
        }
    }

    #[must_use]
    pub fn clock(&self) -> Arc<SimClock> {
        Arc::clone(&self.clock)
    }

    /// A handle external callers use to drive [`Self::start`] from
    /// another thread. Obtain this before calling `start`.
    #[must_use]
    pub fn control_handle(&self) -> ControlHandle {
        ControlHandle { inner: Arc::clone(&self.control) }
    }

    fn record(&self, events: Vec<OrderEvent>) {
        self.order_events.lock().extend(events);
    }

    /// Applies one decoded record to the order book (if a `Book` record),
    /// the executor, and the strategy, in that order, and advances the
    /// virtual clock to the record's timestamp first.
    fn apply_record(
        &self,
        record: &LogRecord,
        strategy: &dyn IStrategy,
        result: &mut BacktestResult,
    ) -> Result<StepMode, BacktestError> {
        self.clock.advance_to(record.timestamp_ns());
        match record {
            LogRecord::Trade(t) => {
                let trade = trade_from_record(t);
                let events = self.executor.lock().on_trade(trade.symbol, trade.price);
                self.record(events);
                strategy.on_trade(&trade);
                result.trades.push(trade);
                result.trades_processed += 1;
                Ok(StepMode::Trade)
            }
            LogRecord::Book(b) => {
                let update = book_update_from_record(b);
                let bbo = self.apply_book_record(b)?;
                let events = self.executor.lock().on_book_bbo(b.symbol, bbo.0, bbo.1);
                self.record(events);
                strategy.on_book_update(&update);
                result.book_updates_processed += 1;
                Ok(StepMode::BookUpdate)
            }
        }
    }

    /// Folds `record` into this symbol's per-backtest order book
    /// (constructed lazily from the registry's tick size on first sight)
    /// and returns the resulting best bid/ask.
    fn apply_book_record(&self, record: &BookRecord) -> Result<(Option<Price>, Option<Price>), BacktestError> {
        let mut books = self.books.lock();
        if !books.contains_key(&record.symbol) {
            let tick_size = self
                .registry
                .as_ref()
                .and_then(|r| r.resolve(record.symbol))
                .map(|info| info.tick_size)
                .filter(|t| t.raw() > 0)
                .ok_or(BacktestError::UnknownSymbol(record.symbol))?;
            let book = IndexedOrderBook::new(tick_size, DEFAULT_MAX_LEVELS)
                .map_err(|source| BacktestError::Book { symbol: record.symbol, source })?;
            books.insert(record.symbol, book);
        }
        let book = books.get_mut(&record.symbol).expect("just inserted above");
        book.apply(record.kind, &record.bids, &record.asks)
            .map_err(|source| BacktestError::Book { symbol: record.symbol, source })?;
        Ok((book.best_bid(), book.best_ask()))
    }

    /// Runs `source` to completion on the caller's thread: decodes every
    /// record, advances the clock, forwards to the executor then the
    /// strategy, and collects fills/trades. Starts and stops the
    /// strategy's lifecycle hooks around the loop.
    ///
    /// # Errors
    /// Returns the first [`BacktestError`] a record's decode or book
    /// application raises.
    pub fn run<S: EventSource>(&self, mut source: S, strategy: &dyn IStrategy) -> Result<BacktestResult, BacktestError> {
        strategy.start(self.clock.now_ns());
        let mut result = BacktestResult::default();
        while let Some(record) = source.next_record() {
            self.apply_record(&record, strategy, &mut result)?;
            result.events_processed += 1;
        }
        strategy.stop(self.clock.now_ns());
        result.fills = self.executor.lock().fills().to_vec();
        result.order_events = self.order_events.lock().clone();
        Ok(result)
    }

    /// Runs `source` on the caller's thread under interactive control
    /// (§4.8): begins paused, and advances only in response to
    /// [`ControlHandle::resume`]/`step`/`step_until` calls made from
    /// another thread holding a handle obtained via
    /// [`Self::control_handle`].
    ///
    /// # Errors
    /// Same as [`Self::run`].
    pub fn start<S: EventSource>(&self, mut source: S, strategy: &dyn IStrategy) -> Result<BacktestResult, BacktestError> {
        strategy.start(self.clock.now_ns());
        let mut result = BacktestResult::default();
        loop {
            self.control.wait_for_green_light();
            if self.control.should_stop() {
                break;
            }
            let Some(record) = source.next_record() else { break };
            let kind = self.apply_record(&record, strategy, &mut result)?;
            result.events_processed += 1;
            let progress = ReplayProgress {
                last_event_ts: record.timestamp_ns(),
                events_processed: result.events_processed,
                trades_processed: result.trades_processed,
            };
            self.control.after_event(kind, &progress);
        }
        strategy.stop(self.clock.now_ns());
        self.control.mark_finished();
        result.fills = self.executor.lock().fills().to_vec();
        result.order_events = self.order_events.lock().clone();
        Ok(result)
    }
}

impl ISignalHandler for BacktestRunner {
    fn on_signal(&self, signal: &Signal) {
        let now = self.clock.now_ns();
        let outcome = {
            let mut exec = self.executor.lock();
            match signal {
                Signal::Market(intent) => {
                    let id = self.order_ids.next_id();
                    exec.submit(build_order(id, intent, OrderType::Market, None, None, None, None, now))
                }
                Signal::Limit(intent, price) => {
                    let id = self.order_ids.next_id();
                    exec.submit(build_order(id, intent, OrderType::Limit, Some(*price), None, None, None, now))
                }
                Signal::StopMarket(intent, trigger) => {
                    let id = self.order_ids.next_id();
                    exec.submit(build_order(id, intent, OrderType::StopMarket, None, Some(*trigger), None, None, now))
                }
                Signal::StopLimit(intent, trigger, limit) => {
                    let id = self.order_ids.next_id();
                    exec.submit(build_order(id, intent, OrderType::StopLimit, Some(*limit), Some(*trigger), None, None, now))
                }
                Signal::TakeProfitMarket(intent, trigger) => {
                    let id = self.order_ids.next_id();
                    exec.submit(build_order(id, intent, OrderType::TakeProfitMarket, None, Some(*trigger), None, None, now))
                }
                Signal::TakeProfitLimit(intent, trigger, limit) => {
                    let id = self.order_ids.next_id();
                    exec.submit(build_order(
                        id,
                        intent,
                        OrderType::TakeProfitLimit,
                        Some(*limit),
                        Some(*trigger),
                        None,
                        None,
                        now,
                    ))
                }
                Signal::TrailingStop(intent, offset, callback_bps) => {
                    let id = self.order_ids.next_id();
                    exec.submit(build_order(
                        id,
                        intent,
                        OrderType::TrailingStop,
                        None,
                        None,
                        Some(*offset),
                        *callback_bps,
                        now,
                    ))
                }
                Signal::Oco { limit, stop } => {
                    let (limit_intent, limit_price) = limit;
                    let (stop_intent, stop_trigger) = stop;
                    let limit_id = self.order_ids.next_id();
                    let stop_id = self.order_ids.next_id();
                    let limit_order = build_order(limit_id, limit_intent, OrderType::Limit, Some(*limit_price), None, None, None, now);
                    let stop_order =
                        build_order(stop_id, stop_intent, OrderType::StopMarket, None, Some(*stop_trigger), None, None, now);
                    exec.submit_oco(limit_order, stop_order)
                }
                Signal::Modify { order_id, new_price, new_quantity } => {
                    let new_id = self.order_ids.next_id();
                    exec.replace_order(*order_id, new_id, *new_price, *new_quantity)
                }
                Signal::Cancel(id) => exec.cancel_order(*id),
                Signal::CancelAll(symbol) => Ok(exec.cancel_all_orders(*symbol)),
            }
        };
        match outcome {
            Ok(events) => {
                if self.control.break_on_signal() {
                    self.control.trigger_signal_breakpoint();
                }
                self.record(events);
            }
            Err(err) => tracing::warn!(error = %err, "backtest signal rejected"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backtest::control::RunState;
    use crate::backtest::source::BufferedSource;
    use crate::clock::UnixNanos;
    use crate::decimal::{Price, Quantity};
    use crate::ids::SymbolId;
    use crate::log::TradeRecord;
    use crate::model::{BookLevel, Instrument, Side, TimeInForce};
    use std::sync::atomic::{AtomicU32, Ordering};

    struct BuyOnceStrategy {
        handler: Arc<BacktestRunner>,
        fired: AtomicU32,
    }

    impl IMarketDataSubscriber for BuyOnceStrategy {
        fn on_trade(&self, trade: &Trade) {
            if self.fired.fetch_add(1, Ordering::SeqCst) == 0 {
                self.handler.on_signal(&Signal::Market(OrderIntent {
                    symbol: trade.symbol,
                    side: Side::Buy,
                    quantity: Quantity::from_parts(1, 0),
                    time_in_force: TimeInForce::Gtc,
                    flags: OrderFlags::empty(),
                    client_order_id: None,
                }));
            }
        }
    }
    impl IStrategy for BuyOnceStrategy {}

    fn trade_record(ts: u64, price: i64) -> LogRecord {
        LogRecord::Trade(TradeRecord {
            symbol: SymbolId(1),
            instrument: Instrument::Spot,
            price: Price::from_parts(price, 0),
            quantity: Quantity::from_parts(1, 0),
            is_buy: true,
            exchange_ts_ns: UnixNanos(ts),
            seq: ts,
        })
    }

    #[test]
    fn run_advances_clock_and_collects_fills_from_strategy_signal() {
        let runner = Arc::new(BacktestRunner::new(None));
        let strategy = BuyOnceStrategy { handler: Arc::clone(&runner), fired: AtomicU32::new(0) };

        let source = BufferedSource::new(vec![trade_record(1_000, 100), trade_record(2_000, 101)]);
        let result = runner.run(source, &strategy).unwrap();

        assert_eq!(result.trades_processed, 2);
        assert_eq!(runner.clock().now_ns(), UnixNanos(2_000));
        assert_eq!(result.fills.len(), 1);
        assert_eq!(result.fills[0].price, Price::from_parts(100, 0));
    }

    #[test]
    fn interactive_start_begins_paused_and_steps_one_event_at_a_time() {
        let runner = Arc::new(BacktestRunner::new(None));
        let strategy = BuyOnceStrategy { handler: Arc::clone(&runner), fired: AtomicU32::new(0) };
        let control = runner.control_handle();
        let source = BufferedSource::new(vec![trade_record(1_000, 100), trade_record(2_000, 101)]);

        std::thread::scope(|scope| {
            let handle = scope.spawn(|| runner.start(source, &strategy));
            // give the loop thread a moment to reach the pause gate
            std::thread::sleep(std::time::Duration::from_millis(20));
            assert_eq!(control.state(), RunState::Paused);
            control.step();
            std::thread::sleep(std::time::Duration::from_millis(20));
            assert_eq!(control.state(), RunState::Paused);
            control.resume();
            let result = handle.join().unwrap();
            assert_eq!(result.unwrap().trades_processed, 2);
        });
    }

    fn book_record(ts: u64, kind: BookKind, bids: Vec<BookLevel>, asks: Vec<BookLevel>) -> LogRecord {
        LogRecord::Book(BookRecord {
            symbol: SymbolId(1),
            instrument: Instrument::Spot,
            kind,
            bids,
            asks,
            exchange_ts_ns: UnixNanos(ts),
            system_ts_ns: UnixNanos(ts),
            seq: ts,
        })
    }

    #[test]
    fn scenario_a_limit_fill_against_published_book() {
        use crate::registry::SymbolInfo;

        let mut registry = SymbolRegistry::new();
        registry.insert(
            SymbolId(1),
            SymbolInfo {
                exchange: crate::ids::ExchangeId(1),
                symbol: "TEST".into(),
                tick_size: Price::from_parts(0, 1_000_000),
                instrument: Instrument::Spot,
            },
        );
        let runner = Arc::new(BacktestRunner::new(Some(Arc::new(registry))));

        struct LimitBuyStrategy {
            handler: Arc<BacktestRunner>,
        }
        impl IMarketDataSubscriber for LimitBuyStrategy {
            fn on_book_update(&self, update: &BookUpdate) {
                self.handler.on_signal(&Signal::Limit(
                    OrderIntent {
                        symbol: update.symbol,
                        side: Side::Buy,
                        quantity: Quantity::from_parts(2, 0),
                        time_in_force: TimeInForce::Gtc,
                        flags: OrderFlags::empty(),
                        client_order_id: None,
                    },
                    Price::from_parts(100, 50_000_000),
                ));
            }
        }
        impl IStrategy for LimitBuyStrategy {}

        let strategy = LimitBuyStrategy { handler: Arc::clone(&runner) };
        let source = BufferedSource::new(vec![book_record(
            1_000,
            BookKind::Snapshot,
            vec![BookLevel { price: Price::from_parts(100, 0), qty: Quantity::from_parts(5, 0) }],
            vec![BookLevel { price: Price::from_parts(100, 50_000_000), qty: Quantity::from_parts(5, 0) }],
        )]);
        let result = runner.run(source, &strategy).unwrap();
        assert_eq!(result.fills.len(), 1);
        assert_eq!(result.fills[0].quantity, Quantity::from_parts(2, 0));
        assert_eq!(result.fills[0].price, Price::from_parts(100, 50_000_000));
    }
}
