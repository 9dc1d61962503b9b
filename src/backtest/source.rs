//! The event source the backtest runner pulls records from. Pull-based,
//! not the reader's push-based `for_each`, so the interactive runner can
//! stop after exactly one record: [`BufferedSource`] drains a
//! [`DirectoryReader`]/[`SegmentReader`] (or a plain `Vec`, for tests)
//! into memory up front and hands records out one at a time.

use crate::log::{DirectoryReader, LogError, LogRecord, ReadOptions, SegmentReader};
use std::collections::VecDeque;

/// A sorted stream of decoded log records, pulled one at a time.
pub trait EventSource: Send {
    /// Returns the next record in timestamp order, or `None` at
    /// end-of-stream.
    fn next_record(&mut self) -> Option<LogRecord>;
}

/// An in-memory, already-decoded record stream. Used both for tests (a
/// `Vec` of synthetic records) and as the backing store behind a
/// directory/segment reader, since the mmap-backed readers are
/// push-based (`for_each`) rather than pull-based.
pub struct BufferedSource {
    records: VecDeque<LogRecord>,
}

impl BufferedSource {
    #[must_use]
    pub fn new(records: Vec<LogRecord>) -> Self {
        Self { records: records.into() }
    }

    /// Drains one segment's records, in on-disk order, respecting `opts`.
    ///
    /// # Errors
    /// Propagates any decode error the segment reader encounters.
    pub fn from_segment(reader: &SegmentReader, opts: &ReadOptions) -> Result<Self, LogError> {
        let mut records = Vec::new();
        reader.for_each(opts, |record| {
            records.push(record);
            Ok(())
        })?;
        Ok(Self::new(records))
    }

    /// Drains every segment in a directory, in global timestamp order.
    ///
    /// # Errors
    /// Propagates any decode error encountered opening or reading a
    /// segment.
    pub fn from_directory(reader: &DirectoryReader, opts: &ReadOptions) -> Result<Self, LogError> {
        let mut records = Vec::new();
        reader.for_each(opts, |record| {
            records.push(record);
            Ok(())
        })?;
        Ok(Self::new(records))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl EventSource for BufferedSource {
    fn next_record(&mut self) -> Option<LogRecord> {
        self.records.pop_front()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::UnixNanos;
    use crate::decimal::{Price, Quantity};
    use crate::ids::SymbolId;
    use crate::log::TradeRecord;
    use crate::model::Instrument;

    fn trade(ts: u64) -> LogRecord {
        LogRecord::Trade(TradeRecord {
            symbol: SymbolId(1),
            instrument: Instrument::Spot,
            price: Price::from_parts(10, 0),
            quantity: Quantity::from_parts(1, 0),
            is_buy: true,
            exchange_ts_ns: UnixNanos(ts),
            seq: 0,
        })
    }

    #[test]
    fn drains_in_order_then_ends() {
        let mut source = BufferedSource::new(vec![trade(1), trade(2)]);
        assert_eq!(source.len(), 2);
        assert!(source.next_record().is_some());
        assert!(source.next_record().is_some());
        assert!(source.next_record().is_none());
    }
}
