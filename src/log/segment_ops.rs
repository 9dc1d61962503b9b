//! Offline transforms over already-written segments: merge, split,
//! export, recompress, filter, and the two common filter shorthands
//! (`extract_symbols`, `extract_time_range`). Every transform here
//! preserves the invariant that its output segments are internally
//! timestamp-sorted, the same guarantee [`crate::log::writer`] upholds
//! for freshly recorded segments.

use crate::clock::UnixNanos;
use crate::config::{CompressionKind, SegmentConfig};
use crate::ids::{ExchangeId, SymbolId};
use crate::log::reader::{DirectoryReader, ReadOptions, SegmentReader};
use crate::log::writer::SegmentWriter;
use crate::log::{LogError, LogRecord};
use std::io::Write as _;
use std::path::Path;

/// How an [`export`] call should render records.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ExportFormat {
    Csv,
    Json,
    JsonLines,
    /// Re-encodes into a fresh `.floxlog` segment, i.e. a filtered copy.
    Binary,
}

/// Where a [`split`] call should cut a segment stream into pieces.
#[derive(Clone, Debug)]
pub enum SplitPoint {
    ByTime { interval_ns: u64 },
    ByEventCount { count: u64 },
    BySizeBytes { bytes: u64 },
    BySymbol,
}

/// Concatenates many segments (in any directory layout) into one
/// timestamp-sorted output segment sequence written to `dest_dir`.
///
/// # Errors
/// Returns a decode error from any source segment, or a write error
/// constructing the destination.
pub fn merge(
    sources: &[&Path],
    dest_dir: impl AsRef<Path>,
    config: SegmentConfig,
    exchange_id: ExchangeId,
) -> Result<(), LogError> {
    let mut all_records: Vec<LogRecord> = Vec::new();
    for path in sources {
        let reader = SegmentReader::open(path)?;
        reader.for_each(&ReadOptions::default(), |record| {
            all_records.push(record);
            Ok(())
        })?;
    }
    all_records.sort_by_key(LogRecord::timestamp_ns);

    let mut writer = SegmentWriter::create(dest_dir, config, exchange_id, || UnixNanos::ZERO)?;
    for record in all_records {
        writer.append(record)?;
    }
    writer.close()
}

/// Splits one segment's records into several output segments at the
/// given [`SplitPoint`] boundaries, writing them into `dest_dir`.
///
/// # Errors
/// Returns a decode error reading `source`, or a write error
/// constructing an output segment.
pub fn split(
    source: impl AsRef<Path>,
    dest_dir: impl AsRef<Path>,
    point: SplitPoint,
    config: SegmentConfig,
    exchange_id: ExchangeId,
) -> Result<(), LogError> {
    let reader = SegmentReader::open(source)?;
    let dest_dir = dest_dir.as_ref();
    std::fs::create_dir_all(dest_dir)?;

    match point {
        SplitPoint::ByTime { interval_ns } => {
            split_by(&reader, dest_dir, &config, exchange_id, |record, state: &mut Option<u64>| {
                let bucket = record.timestamp_ns().as_u64() / interval_ns.max(1);
                let changed = *state != Some(bucket);
                *state = Some(bucket);
                changed
            })
        }
        SplitPoint::ByEventCount { count } => {
            let mut seen = 0u64;
            split_by(&reader, dest_dir, &config, exchange_id, |_record, _state: &mut Option<u64>| {
                let changed = seen > 0 && seen % count.max(1) == 0;
                seen += 1;
                changed
            })
        }
        SplitPoint::BySizeBytes { bytes } => {
            let mut running = 0u64;
            split_by(&reader, dest_dir, &config, exchange_id, |record, _state: &mut Option<u64>| {
                running += record.encode_payload().len() as u64;
                let changed = running >= bytes.max(1);
                if changed {
                    running = 0;
                }
                changed
            })
        }
        SplitPoint::BySymbol => split_by_symbol(&reader, dest_dir, &config, exchange_id),
    }
}

fn split_by(
    reader: &SegmentReader,
    dest_dir: &Path,
    config: &SegmentConfig,
    exchange_id: ExchangeId,
    mut starts_new_segment: impl FnMut(&LogRecord, &mut Option<u64>) -> bool,
) -> Result<(), LogError> {
    let mut part = 0u32;
    let mut state = None;
    let mut writer = SegmentWriter::create(dest_dir.join(format!("part-{part:04}")), config.clone(), exchange_id, || UnixNanos::ZERO)?;
    reader.for_each(&ReadOptions::default(), |record| {
        if starts_new_segment(&record, &mut state) {
            let old = std::mem::replace(
                &mut writer,
                SegmentWriter::create(dest_dir.join(format!("part-{:04}", part + 1)), config.clone(), exchange_id, || UnixNanos::ZERO)?,
            );
            old.close()?;
            part += 1;
        }
        writer.append(record)
    })?;
    writer.close()
}

fn split_by_symbol(
    reader: &SegmentReader,
    dest_dir: &Path,
    config: &SegmentConfig,
    exchange_id: ExchangeId,
) -> Result<(), LogError> {
    use std::collections::HashMap;
    let mut writers: HashMap<SymbolId, SegmentWriter> = HashMap::new();
    reader.for_each(&ReadOptions::default(), |record| {
        let symbol = record.symbol();
        let writer = match writers.get_mut(&symbol) {
            Some(w) => w,
            None => {
                let writer = SegmentWriter::create(dest_dir.join(format!("symbol-{}", symbol.0)), config.clone(), exchange_id, || UnixNanos::ZERO)?;
                writers.entry(symbol).or_insert(writer)
            }
        };
        writer.append(record)
    })?;
    for (_, writer) in writers {
        writer.close()?;
    }
    Ok(())
}

/// Renders a segment's (optionally filtered) records to `dest` in the
/// given [`ExportFormat`]. `Binary` re-encodes through a fresh
/// [`SegmentWriter`]; the text formats write directly to `dest` as a
/// flat file.
///
/// # Errors
/// Returns a decode error reading `source`, or an I/O error writing
/// `dest`.
pub fn export(
    source: impl AsRef<Path>,
    dest: impl AsRef<Path>,
    format: ExportFormat,
    opts: &ReadOptions,
    config: SegmentConfig,
    exchange_id: ExchangeId,
) -> Result<(), LogError> {
    let reader = SegmentReader::open(source)?;
    match format {
        ExportFormat::Binary => {
            let mut writer = SegmentWriter::create(dest, config, exchange_id, || UnixNanos::ZERO)?;
            reader.for_each(opts, |record| writer.append(record))?;
            writer.close()
        }
        ExportFormat::Csv => {
            let mut file = std::fs::File::create(dest)?;
            writeln!(file, "kind,symbol,timestamp_ns,price,quantity,is_buy")?;
            reader.for_each(opts, |record| {
                write_csv_row(&mut file, &record)?;
                Ok(())
            })
        }
        ExportFormat::Json => {
            let mut file = std::fs::File::create(dest)?;
            let mut rows = Vec::new();
            reader.for_each(opts, |record| {
                rows.push(record_to_json(&record));
                Ok(())
            })?;
            writeln!(file, "[{}]", rows.join(","))?;
            Ok(())
        }
        ExportFormat::JsonLines => {
            let mut file = std::fs::File::create(dest)?;
            reader.for_each(opts, |record| {
                writeln!(file, "{}", record_to_json(&record))?;
                Ok(())
            })
        }
    }
}

fn write_csv_row(file: &mut std::fs::File, record: &LogRecord) -> Result<(), LogError> {
    match record {
        LogRecord::Trade(t) => {
            writeln!(
                file,
                "trade,{},{},{},{},{}",
                t.symbol.0,
                t.exchange_ts_ns.as_u64(),
                t.price.raw(),
                t.quantity.raw(),
                t.is_buy
            )?;
        }
        LogRecord::Book(b) => {
            writeln!(file, "book,{},{},,,", b.symbol.0, b.exchange_ts_ns.as_u64())?;
        }
    }
    Ok(())
}

fn record_to_json(record: &LogRecord) -> String {
    match record {
        LogRecord::Trade(t) => format!(
            "{{\"kind\":\"trade\",\"symbol\":{},\"ts\":{},\"price\":{},\"qty\":{},\"is_buy\":{}}}",
            t.symbol.0,
            t.exchange_ts_ns.as_u64(),
            t.price.raw(),
            t.quantity.raw(),
            t.is_buy
        ),
        LogRecord::Book(b) => format!(
            "{{\"kind\":\"book\",\"symbol\":{},\"ts\":{},\"bids\":{},\"asks\":{}}}",
            b.symbol.0,
            b.exchange_ts_ns.as_u64(),
            b.bids.len(),
            b.asks.len()
        ),
    }
}

/// Rewrites a segment with a different [`CompressionKind`], preserving
/// its record order and content.
///
/// # Errors
/// Returns a decode error reading `source`, or a write error
/// constructing the recompressed destination.
pub fn recompress(
    source: impl AsRef<Path>,
    dest_dir: impl AsRef<Path>,
    compression: CompressionKind,
    exchange_id: ExchangeId,
) -> Result<(), LogError> {
    let reader = SegmentReader::open(&source)?;
    let mut config = SegmentConfig { compression, ..SegmentConfig::default() };
    config.max_segment_bytes = config.max_segment_bytes.max(1024 * 1024);
    let mut writer = SegmentWriter::create(dest_dir, config, exchange_id, || UnixNanos::ZERO)?;
    reader.for_each(&ReadOptions::default(), |record| writer.append(record))?;
    writer.close()
}

/// Writes only the records `predicate` accepts from `source` into a
/// fresh segment under `dest_dir`.
///
/// # Errors
/// Returns a decode error reading `source`, or a write error
/// constructing the destination.
pub fn filter(
    source: impl AsRef<Path>,
    dest_dir: impl AsRef<Path>,
    config: SegmentConfig,
    exchange_id: ExchangeId,
    mut predicate: impl FnMut(&LogRecord) -> bool,
) -> Result<(), LogError> {
    let reader = SegmentReader::open(&source)?;
    let mut writer = SegmentWriter::create(dest_dir, config, exchange_id, || UnixNanos::ZERO)?;
    reader.for_each(&ReadOptions::default(), |record| {
        if predicate(&record) {
            writer.append(record)?;
        }
        Ok(())
    })?;
    writer.close()
}

/// `filter` shorthand: keeps only the given symbols.
///
/// # Errors
/// Same as [`filter`].
pub fn extract_symbols(
    source: impl AsRef<Path>,
    dest_dir: impl AsRef<Path>,
    config: SegmentConfig,
    exchange_id: ExchangeId,
    symbols: &[SymbolId],
) -> Result<(), LogError> {
    filter(source, dest_dir, config, exchange_id, |record| symbols.contains(&record.symbol()))
}

/// `filter` shorthand: keeps only records whose timestamp falls in
/// `[from_ns, to_ns]` inclusive.
///
/// # Errors
/// Same as [`filter`].
pub fn extract_time_range(
    source: impl AsRef<Path>,
    dest_dir: impl AsRef<Path>,
    config: SegmentConfig,
    exchange_id: ExchangeId,
    from_ns: UnixNanos,
    to_ns: UnixNanos,
) -> Result<(), LogError> {
    filter(source, dest_dir, config, exchange_id, |record| {
        let ts = record.timestamp_ns();
        ts >= from_ns && ts <= to_ns
    })
}

/// Merges every segment found under `dir` (via [`DirectoryReader`])
/// into one timestamp-sorted output segment sequence.
///
/// # Errors
/// Returns [`LogError::EmptyDataset`] if `dir` has no segments, or a
/// decode/write error otherwise.
pub fn merge_directory(
    dir: impl AsRef<Path>,
    dest_dir: impl AsRef<Path>,
    config: SegmentConfig,
    exchange_id: ExchangeId,
) -> Result<(), LogError> {
    let dir_reader = DirectoryReader::open(dir)?;
    let paths: Vec<&Path> = dir_reader.segment_paths().iter().map(|p| p.as_path()).collect();
    merge(&paths, dest_dir, config, exchange_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decimal::{Price, Quantity};
    use crate::ids::SymbolId;
    use crate::log::format::TradeRecord;
    use crate::model::Instrument;

    fn trade(seq: u64, ts: u64, symbol: u32) -> LogRecord {
        LogRecord::Trade(TradeRecord {
            symbol: SymbolId(symbol),
            instrument: Instrument::Spot,
            price: Price::from_parts(100, 0),
            quantity: Quantity::from_parts(1, 0),
            is_buy: true,
            exchange_ts_ns: UnixNanos(ts),
            seq,
        })
    }

    fn write_segment(dir: &Path, start_ts: u64, symbol: u32) -> std::path::PathBuf {
        let config = SegmentConfig { max_segment_bytes: 1024 * 1024, ..SegmentConfig::default() };
        let mut writer = SegmentWriter::create(dir, config, ExchangeId(1), move || UnixNanos(start_ts)).unwrap();
        for i in 0..5 {
            writer.append(trade(i, start_ts + i, symbol)).unwrap();
        }
        let path = writer.current_path().to_path_buf();
        writer.close().unwrap();
        path
    }

    #[test]
    fn merge_produces_sorted_output() {
        let src_dir = tempfile::tempdir().unwrap();
        let a_dir = src_dir.path().join("a");
        let b_dir = src_dir.path().join("b");
        std::fs::create_dir_all(&a_dir).unwrap();
        std::fs::create_dir_all(&b_dir).unwrap();
        let a = write_segment(&a_dir, 2_000, 1);
        let b = write_segment(&b_dir, 1_000, 1);

        let dest = src_dir.path().join("merged");
        std::fs::create_dir_all(&dest).unwrap();
        merge(&[&a, &b], &dest, SegmentConfig::default(), ExchangeId(1)).unwrap();

        let reader = SegmentReader::open(dest.join("segment-000000.floxlog")).unwrap();
        let mut seen = Vec::new();
        reader.for_each(&ReadOptions::default(), |r| {
            seen.push(r.timestamp_ns().as_u64());
            Ok(())
        }).unwrap();
        let mut sorted = seen.clone();
        sorted.sort_unstable();
        assert_eq!(seen, sorted);
    }

    #[test]
    fn extract_symbols_keeps_only_requested() {
        let src_dir = tempfile::tempdir().unwrap();
        let config = SegmentConfig { max_segment_bytes: 1024 * 1024, ..SegmentConfig::default() };
        let mut writer = SegmentWriter::create(src_dir.path(), config.clone(), ExchangeId(1), || UnixNanos(1)).unwrap();
        for i in 0..5 {
            writer.append(trade(i, 1000 + i, 1)).unwrap();
            writer.append(trade(i, 1000 + i, 2)).unwrap();
        }
        let path = writer.current_path().to_path_buf();
        writer.close().unwrap();

        let dest = src_dir.path().join("filtered");
        std::fs::create_dir_all(&dest).unwrap();
        extract_symbols(&path, &dest, config, ExchangeId(1), &[SymbolId(1)]).unwrap();

        let reader = SegmentReader::open(dest.join("segment-000000.floxlog")).unwrap();
        assert_eq!(reader.header().event_count, 5);
    }
}
