//! Drives a `.floxlog` segment written to disk back through a
//! `BacktestRunner`: `SegmentWriter` -> `DirectoryReader` ->
//! `BufferedSource` -> strategy signals -> fills, with no in-process
//! shortcut between the writer and the reader.

use floxcore::backtest::{BacktestRunner, BufferedSource};
use floxcore::clock::UnixNanos;
use floxcore::config::SegmentConfig;
use floxcore::decimal::{Price, Quantity};
use floxcore::ids::{ExchangeId, SymbolId};
use floxcore::log::{DirectoryReader, LogRecord, ReadOptions, SegmentWriter, TradeRecord};
use floxcore::model::{Instrument, OrderFlags, OrderIntent, Side, Signal, TimeInForce, Trade};
use floxcore::subscriber::{IMarketDataSubscriber, ISignalHandler, IStrategy};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

const SYMBOL: SymbolId = SymbolId(1);

fn write_trades(dir: &std::path::Path, count: u64) {
    let mut writer = SegmentWriter::create(dir, SegmentConfig::default(), ExchangeId(7), || UnixNanos::ZERO).unwrap();
    for i in 0..count {
        let price = 100 + (i % 5) as i64;
        writer
            .append(LogRecord::Trade(TradeRecord {
                symbol: SYMBOL,
                instrument: Instrument::Spot,
                price: Price::from_parts(price, 0),
                quantity: Quantity::from_parts(1, 0),
                is_buy: i % 2 == 0,
                exchange_ts_ns: UnixNanos(1_000 + i * 10),
                seq: i,
            }))
            .unwrap();
    }
    writer.close().unwrap();
}

/// Buys once on the first trade it sees, tracking how many trades it
/// was handed so the assertions below can cross-check against the
/// runner's own `trades_processed` counter.
struct BuyOnceStrategy {
    handler: Arc<BacktestRunner>,
    seen: AtomicU64,
    submitted: AtomicU32,
}

impl IMarketDataSubscriber for BuyOnceStrategy {
    fn on_trade(&self, trade: &Trade) {
        self.seen.fetch_add(1, Ordering::SeqCst);
        if self.submitted.fetch_add(1, Ordering::SeqCst) == 0 {
            self.handler.on_signal(&Signal::Market(OrderIntent {
                symbol: trade.symbol,
                side: Side::Buy,
                quantity: Quantity::from_parts(3, 0),
                time_in_force: TimeInForce::Gtc,
                flags: OrderFlags::empty(),
                client_order_id: None,
            }));
        }
    }
}

impl IStrategy for BuyOnceStrategy {}

#[test]
fn ten_thousand_trades_round_trip_through_a_directory_reader_into_a_backtest() {
    let dir = tempfile::tempdir().unwrap();
    write_trades(dir.path(), 10_000);

    let directory = DirectoryReader::open(dir.path()).unwrap();
    let source = BufferedSource::from_directory(&directory, &ReadOptions::default()).unwrap();
    assert_eq!(source.len(), 10_000);

    let runner = Arc::new(BacktestRunner::new(None));
    let strategy = BuyOnceStrategy {
        handler: Arc::clone(&runner),
        seen: AtomicU64::new(0),
        submitted: AtomicU32::new(0),
    };

    let result = runner.run(source, &strategy).unwrap();

    assert_eq!(result.trades_processed, 10_000);
    assert_eq!(strategy.seen.load(Ordering::SeqCst), 10_000);
    assert_eq!(runner.clock().now_ns(), UnixNanos(1_000 + 9_999 * 10));

    assert_eq!(result.fills.len(), 1);
    assert_eq!(result.fills[0].quantity, Quantity::from_parts(3, 0));
    assert_eq!(result.fills[0].price, Price::from_parts(100, 0));
}

#[test]
fn rotated_segments_replay_in_timestamp_order_across_files() {
    let dir = tempfile::tempdir().unwrap();
    // Forces rotation well before 10,000 records would otherwise need it.
    let mut small_segment_config = SegmentConfig::default();
    small_segment_config.max_segment_bytes = 4096;
    let mut writer = SegmentWriter::create(dir.path(), small_segment_config, ExchangeId(7), || UnixNanos::ZERO).unwrap();
    for i in 0..200u64 {
        writer
            .append(LogRecord::Trade(TradeRecord {
                symbol: SYMBOL,
                instrument: Instrument::Spot,
                price: Price::from_parts(100, 0),
                quantity: Quantity::from_parts(1, 0),
                is_buy: true,
                exchange_ts_ns: UnixNanos(i),
                seq: i,
            }))
            .unwrap();
    }
    writer.close().unwrap();
    assert!(writer_wrote_multiple_segments(dir.path()));

    let directory = DirectoryReader::open(dir.path()).unwrap();
    assert!(directory.segment_paths().len() > 1);

    let source = BufferedSource::from_directory(&directory, &ReadOptions::default()).unwrap();
    assert_eq!(source.len(), 200);

    let runner = BacktestRunner::new(None);
    struct NoopStrategy;
    impl IMarketDataSubscriber for NoopStrategy {}
    impl IStrategy for NoopStrategy {}
    let result = runner.run(source, &NoopStrategy).unwrap();
    assert_eq!(result.trades_processed, 200);
    assert_eq!(runner.clock().now_ns(), UnixNanos(199));
}

fn writer_wrote_multiple_segments(dir: &std::path::Path) -> bool {
    std::fs::read_dir(dir)
        .unwrap()
        .filter_map(Result::ok)
        .filter(|e| e.path().extension().and_then(|e| e.to_str()) == Some("floxlog"))
        .count()
        > 1
}

#[test]
fn unknown_symbol_book_update_is_rejected_without_a_registry() {
    use floxcore::log::BookRecord;
    use floxcore::model::{BookKind, BookLevel};

    let dir = tempfile::tempdir().unwrap();
    let mut writer = SegmentWriter::create(dir.path(), SegmentConfig::default(), ExchangeId(7), || UnixNanos::ZERO).unwrap();
    writer
        .append(LogRecord::Book(BookRecord {
            symbol: SYMBOL,
            instrument: Instrument::Spot,
            kind: BookKind::Snapshot,
            bids: vec![BookLevel { price: Price::from_parts(100, 0), qty: Quantity::from_parts(1, 0) }],
            asks: vec![BookLevel { price: Price::from_parts(101, 0), qty: Quantity::from_parts(1, 0) }],
            exchange_ts_ns: UnixNanos(1),
            system_ts_ns: UnixNanos(1),
            seq: 0,
        }))
        .unwrap();
    writer.close().unwrap();

    let directory = DirectoryReader::open(dir.path()).unwrap();
    let source = BufferedSource::from_directory(&directory, &ReadOptions::default()).unwrap();

    let runner = BacktestRunner::new(None);
    struct NoopStrategy;
    impl IMarketDataSubscriber for NoopStrategy {}
    impl IStrategy for NoopStrategy {}
    let err = runner.run(source, &NoopStrategy).unwrap_err();
    assert!(matches!(err, floxcore::BacktestError::UnknownSymbol(SYMBOL)));
}
