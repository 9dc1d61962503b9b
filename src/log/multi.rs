//! Multi-segment parallel reading: one worker thread per segment feeding
//! a bounded channel, merged (optionally) into a single timestamp-ordered
//! stream by the calling thread.

use crate::clock::UnixNanos;
use crate::log::reader::{ReadOptions, SegmentReader};
use crate::log::{LogError, LogRecord};
use crossbeam::channel::{bounded, Receiver};
use std::path::PathBuf;
use std::thread;

/// Tuning knobs for [`ParallelReader::read`].
#[derive(Clone, Debug)]
pub struct MergeOptions {
    pub read: ReadOptions,
    /// Per-worker channel depth before a segment's reader thread blocks.
    pub channel_capacity: usize,
    /// Merge every worker's output into one timestamp-ascending stream.
    /// When `false`, records arrive in whatever order workers produce
    /// them, which is cheaper but not globally ordered.
    pub sort_output: bool,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self { read: ReadOptions::default(), channel_capacity: 1024, sort_output: true }
    }
}

/// Tuning knobs for [`ParallelReader::map_reduce`].
#[derive(Clone, Debug, Default)]
pub struct MapReduceOptions {
    pub read: ReadOptions,
}

/// Reads many `.floxlog` segments concurrently, one OS thread per
/// segment. Each worker decodes its segment independently; the calling
/// thread only merges or reduces results, never decodes itself.
pub struct ParallelReader {
    segments: Vec<PathBuf>,
}

impl ParallelReader {
    #[must_use]
    pub fn new(segments: Vec<PathBuf>) -> Self {
        Self { segments }
    }

    /// Spawns one reader thread per segment and merges their output.
    ///
    /// With `opts.sort_output`, this performs a k-way merge by
    /// timestamp across all segments' channels, so the result is fully
    /// ordered even though decoding happened in parallel. Without it,
    /// `visit` is called as soon as any worker produces a record.
    ///
    /// # Errors
    /// Returns the first decode or I/O error surfaced by any worker.
    pub fn read(&self, opts: &MergeOptions, mut visit: impl FnMut(LogRecord) -> Result<(), LogError>) -> Result<(), LogError> {
        let mut receivers = Vec::with_capacity(self.segments.len());
        let mut handles = Vec::with_capacity(self.segments.len());
        for path in &self.segments {
            let (tx, rx) = bounded::<Result<LogRecord, LogError>>(opts.channel_capacity);
            let path = path.clone();
            let read_opts = opts.read.clone();
            let handle = thread::spawn(move || {
                let result = (|| -> Result<(), LogError> {
                    let reader = SegmentReader::open(&path)?;
                    reader.for_each(&read_opts, |record| {
                        let _ = tx.send(Ok(record));
                        Ok(())
                    })
                })();
                if let Err(err) = result {
                    let _ = tx.send(Err(err));
                }
            });
            receivers.push(rx);
            handles.push(handle);
        }

        let result = if opts.sort_output {
            merge_sorted(receivers, &mut visit)
        } else {
            merge_unordered(receivers, &mut visit)
        };

        for handle in handles {
            let _ = handle.join();
        }
        result
    }

    /// Runs `map` independently against each segment on its own thread
    /// and concatenates the per-segment results in segment order.
    ///
    /// # Errors
    /// Returns the first error any worker's `map` call produces.
    pub fn map_reduce<T: Send + 'static>(
        &self,
        opts: &MapReduceOptions,
        map: impl Fn(&SegmentReader, &ReadOptions) -> Result<T, LogError> + Send + Sync + Clone + 'static,
    ) -> Result<Vec<T>, LogError> {
        let mut handles = Vec::with_capacity(self.segments.len());
        for path in &self.segments {
            let path = path.clone();
            let read_opts = opts.read.clone();
            let map = map.clone();
            handles.push(thread::spawn(move || -> Result<T, LogError> {
                let reader = SegmentReader::open(&path)?;
                map(&reader, &read_opts)
            }));
        }
        let mut results = Vec::with_capacity(handles.len());
        for handle in handles {
            results.push(handle.join().expect("map_reduce worker panicked")?);
        }
        Ok(results)
    }
}

fn merge_unordered(
    receivers: Vec<Receiver<Result<LogRecord, LogError>>>,
    visit: &mut impl FnMut(LogRecord) -> Result<(), LogError>,
) -> Result<(), LogError> {
    for rx in receivers {
        for item in rx {
            visit(item?)?;
        }
    }
    Ok(())
}

/// A k-way merge by timestamp across all worker channels. Each channel is
/// already in ascending timestamp order (its segment was read
/// sequentially), so draining the lowest head across all channels
/// produces a globally ordered stream.
fn merge_sorted(
    receivers: Vec<Receiver<Result<LogRecord, LogError>>>,
    visit: &mut impl FnMut(LogRecord) -> Result<(), LogError>,
) -> Result<(), LogError> {
    struct Head {
        record: LogRecord,
        rx_index: usize,
    }

    let mut heads: Vec<Option<Head>> = Vec::with_capacity(receivers.len());
    for (i, rx) in receivers.iter().enumerate() {
        heads.push(match rx.recv() {
            Ok(Ok(record)) => Some(Head { record, rx_index: i }),
            Ok(Err(err)) => return Err(err),
            Err(_) => None,
        });
    }

    loop {
        let next = heads
            .iter()
            .enumerate()
            .filter_map(|(i, h)| h.as_ref().map(|h| (i, h.record.timestamp_ns())))
            .min_by_key(|(_, ts): &(usize, UnixNanos)| *ts);

        let Some((slot, _)) = next else { break };
        let head = heads[slot].take().expect("slot selected by min_by_key must be Some");
        visit(head.record)?;
        heads[slot] = match receivers[head.rx_index].recv() {
            Ok(Ok(record)) => Some(Head { record, rx_index: head.rx_index }),
            Ok(Err(err)) => return Err(err),
            Err(_) => None,
        };
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SegmentConfig;
    use crate::decimal::{Price, Quantity};
    use crate::ids::{ExchangeId, SymbolId};
    use crate::log::format::TradeRecord;
    use crate::log::writer::SegmentWriter;
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

    fn write_segment(dir: &std::path::Path, name_hint: u32, start_ts: u64) -> PathBuf {
        let sub = dir.join(format!("seg-{name_hint}"));
        std::fs::create_dir_all(&sub).unwrap();
        let config = SegmentConfig { max_segment_bytes: 1024 * 1024, ..SegmentConfig::default() };
        let mut writer = SegmentWriter::create(&sub, config, ExchangeId(1), move || UnixNanos(start_ts)).unwrap();
        for i in 0..5 {
            writer.append(trade(i, start_ts + i, name_hint)).unwrap();
        }
        let path = writer.current_path().to_path_buf();
        writer.close().unwrap();
        path
    }

    #[test]
    fn merges_segments_in_timestamp_order() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_segment(dir.path(), 1, 2_000);
        let b = write_segment(dir.path(), 2, 1_000);

        let reader = ParallelReader::new(vec![a, b]);
        let mut seen = Vec::new();
        reader
            .read(&MergeOptions::default(), |record| {
                seen.push(record.timestamp_ns().as_u64());
                Ok(())
            })
            .unwrap();

        let mut sorted = seen.clone();
        sorted.sort_unstable();
        assert_eq!(seen, sorted);
        assert_eq!(seen.len(), 10);
    }

    #[test]
    fn map_reduce_counts_events_per_segment() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_segment(dir.path(), 1, 1_000);
        let b = write_segment(dir.path(), 2, 2_000);

        let reader = ParallelReader::new(vec![a, b]);
        let counts = reader
            .map_reduce(&MapReduceOptions::default(), |r, _opts| Ok(r.header().event_count))
            .unwrap();
        assert_eq!(counts, vec![5, 5]);
    }
}
