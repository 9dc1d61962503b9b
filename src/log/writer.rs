//! A memory-mapped, segment-rotating `.floxlog` writer, in the style of
//! the reference engine's mmap-backed event journal: each segment is
//! preallocated to `max_segment_bytes`, written into directly through the
//! mapping, and truncated down to its actual used length on rotation or
//! finalize.

use crate::clock::UnixNanos;
use crate::config::{CompressionKind, SegmentConfig};
use crate::ids::{ExchangeId, SymbolId};
use crate::log::format::{
    BLOCK_MAGIC, CompressedBlockHeader, FrameHeader, IndexEntry, RECORD_KIND_BOOK, RECORD_KIND_TRADE,
    SegmentFlags, SegmentHeader, SegmentIndexHeader,
};
use crate::log::{LogRecord, LogError};
use memmap2::MmapMut;
use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Default)]
struct StatsInner {
    segments_written: AtomicU64,
    events_written: AtomicU64,
    bytes_written: AtomicU64,
    compressed_bytes: AtomicU64,
    uncompressed_bytes: AtomicU64,
}

/// Monotonic counters a [`SegmentWriter`] maintains across its lifetime.
/// Cheap to clone and safe to poll from another thread while the writer
/// runs on its own.
#[derive(Clone, Default)]
pub struct WriterStats {
    inner: Arc<StatsInner>,
}

impl WriterStats {
    #[must_use]
    pub fn segments_written(&self) -> u64 {
        self.inner.segments_written.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn events_written(&self) -> u64 {
        self.inner.events_written.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn bytes_written(&self) -> u64 {
        self.inner.bytes_written.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn compressed_bytes(&self) -> u64 {
        self.inner.compressed_bytes.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn uncompressed_bytes(&self) -> u64 {
        self.inner.uncompressed_bytes.load(Ordering::Relaxed)
    }
}

struct HeaderState {
    flags: SegmentFlags,
    created_ns: UnixNanos,
    first_event_ns: Option<UnixNanos>,
    last_event_ns: UnixNanos,
    event_count: u64,
    symbols: HashSet<SymbolId>,
    index_offset: u64,
}

impl HeaderState {
    fn new(now: UnixNanos, compressed: bool) -> Self {
        let mut flags = SegmentFlags::empty();
        if compressed {
            flags |= SegmentFlags::COMPRESSED;
        }
        Self {
            flags,
            created_ns: now,
            first_event_ns: None,
            last_event_ns: UnixNanos::ZERO,
            event_count: 0,
            symbols: HashSet::new(),
            index_offset: 0,
        }
    }

    fn record(&mut self, symbol: SymbolId, ts: UnixNanos, event_count: u64) {
        self.first_event_ns.get_or_insert(ts);
        self.last_event_ns = ts;
        self.event_count += event_count;
        self.symbols.insert(symbol);
    }

    fn finalize(&self, index_offset: u64) -> SegmentHeader {
        let mut flags = self.flags;
        if index_offset > 0 {
            flags |= SegmentFlags::HAS_INDEX;
        }
        SegmentHeader {
            version: crate::log::format::SEGMENT_VERSION,
            flags,
            exchange_id: ExchangeId(0),
            created_ns: self.created_ns,
            first_event_ns: self.first_event_ns.unwrap_or(UnixNanos::ZERO),
            last_event_ns: self.last_event_ns,
            event_count: self.event_count,
            symbol_count: self.symbols.len() as u32,
            compressed: self.flags.contains(SegmentFlags::COMPRESSED),
            index_offset,
        }
    }
}

struct PendingBlock {
    bytes: Vec<u8>,
    events: u32,
    first_ts: Option<UnixNanos>,
}

impl PendingBlock {
    fn new() -> Self {
        Self { bytes: Vec::new(), events: 0, first_ts: None }
    }

    fn is_empty(&self) -> bool {
        self.events == 0
    }
}

/// Appends [`LogRecord`]s to a rotating sequence of `.floxlog` segment
/// files under one directory. Single-writer: the caller must serialize
/// calls to [`Self::append`], matching every other single-writer
/// structure in the pipeline.
pub struct SegmentWriter {
    dir: PathBuf,
    config: SegmentConfig,
    exchange_id: ExchangeId,
    clock_source: Arc<dyn Fn() -> UnixNanos + Send + Sync>,
    naming: Option<Box<dyn Fn(u32) -> String + Send>>,
    next_segment_index: u32,

    file: File,
    mmap: MmapMut,
    path: PathBuf,
    write_pos: usize,
    capacity: usize,
    header: HeaderState,
    index_entries: Vec<IndexEntry>,
    events_since_index: u32,

    pending: PendingBlock,
    stats: WriterStats,
}

impl SegmentWriter {
    /// Opens (creating if needed) a writer rooted at `dir`, starting a
    /// fresh first segment.
    ///
    /// # Errors
    /// Returns [`LogError::Io`] if the directory or first segment file
    /// cannot be created.
    pub fn create(
        dir: impl AsRef<Path>,
        config: SegmentConfig,
        exchange_id: ExchangeId,
        now: impl Fn() -> UnixNanos + Send + Sync + 'static,
    ) -> Result<Self, LogError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        let clock_source: Arc<dyn Fn() -> UnixNanos + Send + Sync> = Arc::new(now);
        let mut writer = Self {
            dir,
            config,
            exchange_id,
            clock_source,
            naming: None,
            next_segment_index: 0,
            file: tempfile_placeholder()?,
            mmap: MmapMut::map_anon(1)?,
            path: PathBuf::new(),
            write_pos: 0,
            capacity: 0,
            header: HeaderState::new(UnixNanos::ZERO, false),
            index_entries: Vec::new(),
            events_since_index: 0,
            pending: PendingBlock::new(),
            stats: WriterStats::default(),
        };
        writer.open_new_segment()?;
        Ok(writer)
    }

    /// Installs a callback that names segment files by index, overriding
    /// the default `segment-{index:06}.floxlog`.
    pub fn set_naming(&mut self, naming: impl Fn(u32) -> String + Send + 'static) {
        self.naming = Some(Box::new(naming));
    }

    #[must_use]
    pub fn stats(&self) -> WriterStats {
        self.stats.clone()
    }

    #[must_use]
    pub fn current_path(&self) -> &Path {
        &self.path
    }

    fn segment_name(&self, index: u32) -> String {
        match &self.naming {
            Some(f) => f(index),
            None => format!("segment-{index:06}.floxlog"),
        }
    }

    fn open_new_segment(&mut self) -> Result<(), LogError> {
        let name = self.segment_name(self.next_segment_index);
        self.next_segment_index += 1;
        let path = self.dir.join(name);
        let capacity = self.config.max_segment_bytes as usize;

        let file = OpenOptions::new().read(true).write(true).create(true).truncate(true).open(&path)?;
        file.set_len(capacity as u64)?;
        // SAFETY: `file` is freshly created and exclusively owned by this
        // writer; nothing else maps or truncates it while we hold `mmap`.
        let mmap = unsafe { MmapMut::map_mut(&file)? };

        self.file = file;
        self.mmap = mmap;
        self.path = path;
        self.capacity = capacity;
        self.write_pos = SegmentHeader::SIZE;
        self.header = HeaderState::new((self.clock_source)(), self.config.compression != CompressionKind::None);
        self.index_entries.clear();
        self.events_since_index = 0;
        self.pending = PendingBlock::new();
        self.stats.inner.segments_written.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn remaining(&self) -> usize {
        self.capacity.saturating_sub(self.write_pos)
    }

    fn write_raw(&mut self, bytes: &[u8]) -> Result<(), LogError> {
        let end = self.write_pos + bytes.len();
        if end > self.capacity {
            return Err(LogError::SegmentFull { record_bytes: bytes.len(), remaining: self.remaining() });
        }
        self.mmap[self.write_pos..end].copy_from_slice(bytes);
        self.write_pos = end;
        self.stats.inner.bytes_written.fetch_add(bytes.len() as u64, Ordering::Relaxed);
        Ok(())
    }

    fn maybe_index(&mut self, ts: UnixNanos, offset: u64) {
        if self.config.index_interval == 0 {
            return;
        }
        self.events_since_index += 1;
        if self.events_since_index >= self.config.index_interval {
            self.index_entries.push(IndexEntry { timestamp_ns: ts, file_offset: offset });
            self.events_since_index = 0;
        }
    }

    /// Appends one record, rotating to a new segment first if it does
    /// not fit in the current one.
    ///
    /// # Errors
    /// Returns [`LogError::RecordTooLarge`] if the record alone exceeds
    /// `max_segment_bytes`, or [`LogError::Io`] on a write failure.
    pub fn append(&mut self, record: LogRecord) -> Result<(), LogError> {
        match self.config.compression {
            CompressionKind::None => self.append_uncompressed(record),
            CompressionKind::Lz4 => self.append_compressed(record),
        }
    }

    fn append_uncompressed(&mut self, record: LogRecord) -> Result<(), LogError> {
        let ts = record.timestamp_ns();
        let symbol = record.symbol();
        let kind = record.record_kind();
        let payload = record.encode_payload();
        let frame_len = FrameHeader::SIZE + payload.len();
        if frame_len > self.capacity - SegmentHeader::SIZE {
            return Err(LogError::RecordTooLarge(frame_len));
        }
        if frame_len > self.remaining() {
            self.rotate()?;
        }
        let offset = self.write_pos as u64;
        let crc = crc32fast::hash(&payload);
        let header = FrameHeader { record_kind: kind, size: payload.len() as u32, crc32: crc, timestamp_ns: ts };
        self.write_raw(&header.encode())?;
        self.write_raw(&payload)?;
        self.header.record(symbol, ts, 1);
        self.maybe_index(ts, offset);
        self.stats.inner.events_written.fetch_add(1, Ordering::Relaxed);
        self.stats.inner.uncompressed_bytes.fetch_add(frame_len as u64, Ordering::Relaxed);
        Ok(())
    }

    fn append_compressed(&mut self, record: LogRecord) -> Result<(), LogError> {
        let ts = record.timestamp_ns();
        let symbol = record.symbol();
        let kind = record.record_kind();
        let payload = record.encode_payload();

        self.pending.first_ts.get_or_insert(ts);
        self.pending.bytes.extend_from_slice(&[kind]);
        self.pending.bytes.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        self.pending.bytes.extend_from_slice(&ts.as_u64().to_le_bytes());
        self.pending.bytes.extend_from_slice(&payload);
        self.pending.events += 1;
        self.header.record(symbol, ts, 1);

        let at_event_cap = self.pending.events >= self.config.compression_block_events;
        let at_byte_cap = self.pending.bytes.len() as u32 >= self.config.compression_block_bytes;
        if at_event_cap || at_byte_cap {
            self.flush_pending_block()?;
        }
        Ok(())
    }

    fn flush_pending_block(&mut self) -> Result<(), LogError> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let pending = std::mem::replace(&mut self.pending, PendingBlock::new());
        let crc = crc32fast::hash(&pending.bytes);
        let compressed = lz4_flex::compress(&pending.bytes);
        let block_len = CompressedBlockHeader::SIZE + compressed.len();
        if block_len > self.capacity - SegmentHeader::SIZE {
            return Err(LogError::RecordTooLarge(block_len));
        }
        if block_len > self.remaining() {
            // Segment rotation clears `self.pending`, which we already
            // took ownership of above, so this re-entrant flush call
            // sees an empty pending block and returns immediately.
            self.rotate()?;
        }
        let offset = self.write_pos as u64;
        let header = CompressedBlockHeader {
            compressed_size: compressed.len() as u32,
            original_size: pending.bytes.len() as u32,
            event_count: pending.events,
            crc32: crc,
        };
        self.write_raw(&header.encode())?;
        self.write_raw(&compressed)?;
        if let Some(first_ts) = pending.first_ts {
            self.maybe_index(first_ts, offset);
        }
        self.stats.inner.events_written.fetch_add(u64::from(pending.events), Ordering::Relaxed);
        self.stats.inner.uncompressed_bytes.fetch_add(pending.bytes.len() as u64, Ordering::Relaxed);
        self.stats.inner.compressed_bytes.fetch_add(compressed.len() as u64, Ordering::Relaxed);
        Ok(())
    }

    fn write_index(&mut self) -> Result<u64, LogError> {
        if self.config.index_interval == 0 || self.index_entries.is_empty() {
            return Ok(0);
        }
        let offset = self.write_pos as u64;
        let mut entry_bytes = Vec::with_capacity(self.index_entries.len() * IndexEntry::SIZE);
        for entry in &self.index_entries {
            entry_bytes.extend_from_slice(&entry.encode());
        }
        let crc = crc32fast::hash(&entry_bytes);
        let first_ts = self.index_entries.first().map(|e| e.timestamp_ns).unwrap_or(UnixNanos::ZERO);
        let last_ts = self.index_entries.last().map(|e| e.timestamp_ns).unwrap_or(UnixNanos::ZERO);
        let index_header = SegmentIndexHeader {
            interval: self.config.index_interval,
            entry_count: self.index_entries.len() as u32,
            crc32: crc,
            first_ts,
            last_ts,
        };
        self.write_raw(&index_header.encode())?;
        self.write_raw(&entry_bytes)?;
        Ok(offset)
    }

    /// Flushes any pending compressed block, writes the index section,
    /// rewrites the final header, truncates the segment to its actual
    /// length, and opens the next one.
    ///
    /// # Errors
    /// Returns [`LogError::Io`] on a write/flush/truncate failure.
    pub fn rotate(&mut self) -> Result<(), LogError> {
        self.finalize_current_segment()?;
        self.open_new_segment()
    }

    fn finalize_current_segment(&mut self) -> Result<(), LogError> {
        self.flush_pending_block()?;
        let index_offset = self.write_index()?;
        let header = self.header.finalize(index_offset);
        self.mmap[0..SegmentHeader::SIZE].copy_from_slice(&header.encode());
        self.mmap.flush()?;
        self.file.set_len(self.write_pos as u64)?;
        if self.config.fsync_on_rotate {
            self.file.sync_all()?;
        }
        Ok(())
    }

    /// Finalizes the last open segment. Calling this more than once, or
    /// letting the writer drop without calling it, is safe: [`Drop`]
    /// performs a best-effort finalize and logs any failure rather than
    /// propagating it.
    ///
    /// # Errors
    /// Returns [`LogError::Io`] on a write/flush/truncate failure.
    pub fn close(mut self) -> Result<(), LogError> {
        self.finalize_current_segment()
    }
}

impl Drop for SegmentWriter {
    fn drop(&mut self) {
        if let Err(err) = self.finalize_current_segment() {
            tracing::error!(error = %err, path = %self.path.display(), "failed to finalize floxlog segment on drop");
        }
    }
}

/// A placeholder `File`/`MmapMut` pair used only to give `SegmentWriter`
/// a valid value to construct before its first real segment is opened.
fn tempfile_placeholder() -> Result<File, LogError> {
    Ok(OpenOptions::new().read(true).write(true).open("/dev/null").or_else(|_| {
        let path = std::env::temp_dir().join("floxcore-writer-placeholder");
        OpenOptions::new().read(true).write(true).create(true).truncate(true).open(path)
    })?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decimal::{Price, Quantity};
    use crate::ids::SymbolId;
    use crate::model::Instrument;
    use crate::log::format::TradeRecord;

    fn trade(seq: u64, ts: u64) -> LogRecord {
        LogRecord::Trade(TradeRecord {
            symbol: SymbolId(1),
            instrument: Instrument::Spot,
            price: Price::from_parts(100, 0),
            quantity: Quantity::from_parts(1, 0),
            is_buy: true,
            exchange_ts_ns: UnixNanos(ts),
            seq,
        })
    }

    #[test]
    fn writes_and_finalizes_a_single_segment() {
        let dir = tempfile::tempdir().unwrap();
        let config = SegmentConfig { max_segment_bytes: 1024 * 1024, ..SegmentConfig::default() };
        let mut writer = SegmentWriter::create(dir.path(), config, ExchangeId(1), || UnixNanos(1)).unwrap();
        for i in 0..10 {
            writer.append(trade(i, 1000 + i)).unwrap();
        }
        let stats = writer.stats();
        writer.close().unwrap();
        assert_eq!(stats.events_written(), 10);
        assert_eq!(stats.segments_written(), 1);

        let entries: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn rotates_when_segment_is_full() {
        let dir = tempfile::tempdir().unwrap();
        let small_capacity = (SegmentHeader::SIZE + 3 * (FrameHeader::SIZE + TradeRecord::SIZE)) as u64;
        let config = SegmentConfig { max_segment_bytes: small_capacity, index_interval: 0, ..SegmentConfig::default() };
        let mut writer = SegmentWriter::create(dir.path(), config, ExchangeId(1), || UnixNanos(1)).unwrap();
        for i in 0..9 {
            writer.append(trade(i, 1000 + i)).unwrap();
        }
        writer.close().unwrap();
        let entries: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 3);
    }
}
