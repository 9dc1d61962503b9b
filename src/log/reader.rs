//! Read-only access to `.floxlog` segments: a single memory-mapped
//! [`SegmentReader`] plus a [`DirectoryReader`] that walks a whole
//! directory of segments in timestamp order.

use crate::clock::UnixNanos;
use crate::ids::SymbolId;
use crate::log::format::{
    CompressedBlockHeader, Cursor, FrameHeader, IndexEntry, SegmentFlags, SegmentHeader, SegmentIndexHeader,
};
use crate::log::{LogError, LogRecord};
use memmap2::Mmap;
use std::fs::File;
use std::path::{Path, PathBuf};

/// Controls what a reader checks and returns as it walks a segment.
#[derive(Clone, Debug)]
pub struct ReadOptions {
    pub verify_crc: bool,
    pub symbols: Option<Vec<SymbolId>>,
    pub from_ns: Option<UnixNanos>,
    pub to_ns: Option<UnixNanos>,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self { verify_crc: true, symbols: None, from_ns: None, to_ns: None }
    }
}

impl ReadOptions {
    fn accepts(&self, record: &LogRecord) -> bool {
        if let Some(symbols) = &self.symbols {
            if !symbols.contains(&record.symbol()) {
                return false;
            }
        }
        let ts = record.timestamp_ns();
        if let Some(from) = self.from_ns {
            if ts < from {
                return false;
            }
        }
        if let Some(to) = self.to_ns {
            if ts > to {
                return false;
            }
        }
        true
    }
}

/// A single memory-mapped `.floxlog` segment opened for reading.
pub struct SegmentReader {
    mmap: Mmap,
    path: PathBuf,
    header: SegmentHeader,
    index: Vec<IndexEntry>,
}

impl SegmentReader {
    /// Opens `path` and parses its header (and index section, if
    /// present).
    ///
    /// # Errors
    /// Returns [`LogError::Io`] if the file cannot be opened or mapped,
    /// or a decode error if the header or index is malformed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, LogError> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        // SAFETY: read-only mapping of a file this reader exclusively
        // owns for its lifetime; callers must not truncate it concurrently.
        let mmap = unsafe { Mmap::map(&file)? };
        if mmap.len() < SegmentHeader::SIZE {
            return Err(LogError::TruncatedFrame(0));
        }
        let header = SegmentHeader::decode(&mmap[0..SegmentHeader::SIZE])?;
        let index = if header.flags.contains(SegmentFlags::HAS_INDEX) && header.index_offset > 0 {
            read_index(&mmap, header.index_offset)?
        } else {
            Vec::new()
        };
        Ok(Self { mmap, path, header, index })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn header(&self) -> &SegmentHeader {
        &self.header
    }

    #[must_use]
    pub fn index(&self) -> &[IndexEntry] {
        &self.index
    }

    fn body_end(&self) -> usize {
        if self.header.flags.contains(SegmentFlags::HAS_INDEX) && self.header.index_offset > 0 {
            self.header.index_offset as usize
        } else {
            self.mmap.len()
        }
    }

    /// Visits every record in the segment in on-disk order, starting from
    /// the byte right after the 64-byte header.
    ///
    /// A trailing frame or block that is truncated (e.g. the process
    /// crashed mid-write) is tolerated: decoding stops there rather than
    /// returning an error, since everything fully written before it is
    /// still valid data.
    ///
    /// # Errors
    /// Returns [`LogError::CrcMismatch`] if `opts.verify_crc` is set and a
    /// checksum fails, or a decode error for a non-truncation malformation.
    pub fn for_each(
        &self,
        opts: &ReadOptions,
        mut visit: impl FnMut(LogRecord) -> Result<(), LogError>,
    ) -> Result<(), LogError> {
        self.for_each_from(0, opts, &mut visit)
    }

    /// Like [`Self::for_each`], but starts at the last index entry whose
    /// timestamp is `<= from_ns`, falling back to the start of the
    /// segment if there is no index or `from_ns` precedes every entry.
    ///
    /// # Errors
    /// Same as [`Self::for_each`].
    pub fn for_each_from(
        &self,
        start_offset: u64,
        opts: &ReadOptions,
        visit: &mut impl FnMut(LogRecord) -> Result<(), LogError>,
    ) -> Result<(), LogError> {
        let body_end = self.body_end();
        let mut pos = (start_offset as usize).max(SegmentHeader::SIZE);
        if self.header.compressed {
            while pos < body_end {
                let Some(header_bytes) = self.mmap.get(pos..pos + CompressedBlockHeader::SIZE) else { break };
                let mut c = Cursor::new(header_bytes, pos as u64);
                let block_header = match CompressedBlockHeader::decode(&mut c) {
                    Ok(h) => h,
                    Err(_) => break,
                };
                let block_start = pos + CompressedBlockHeader::SIZE;
                let block_end = block_start + block_header.compressed_size as usize;
                let Some(compressed) = self.mmap.get(block_start..block_end) else { break };
                if opts.verify_crc {
                    let decompressed = lz4_flex::decompress(compressed, block_header.original_size as usize)
                        .map_err(|e| LogError::Compression(e.to_string()))?;
                    let crc = crc32fast::hash(&decompressed);
                    if crc != block_header.crc32 {
                        return Err(LogError::CrcMismatch { offset: pos as u64, expected: block_header.crc32, found: crc });
                    }
                    self.visit_block(&decompressed, opts, visit)?;
                } else {
                    let decompressed = lz4_flex::decompress(compressed, block_header.original_size as usize)
                        .map_err(|e| LogError::Compression(e.to_string()))?;
                    self.visit_block(&decompressed, opts, visit)?;
                }
                pos = block_end;
            }
        } else {
            while pos < body_end {
                let Some(header_bytes) = self.mmap.get(pos..pos + FrameHeader::SIZE) else { break };
                let mut c = Cursor::new(header_bytes, pos as u64);
                let frame_header = match FrameHeader::decode(&mut c) {
                    Ok(h) => h,
                    Err(_) => break,
                };
                let payload_start = pos + FrameHeader::SIZE;
                let payload_end = payload_start + frame_header.size as usize;
                let Some(payload) = self.mmap.get(payload_start..payload_end) else { break };
                if opts.verify_crc {
                    let crc = crc32fast::hash(payload);
                    if crc != frame_header.crc32 {
                        return Err(LogError::CrcMismatch { offset: pos as u64, expected: frame_header.crc32, found: crc });
                    }
                }
                let record = LogRecord::decode_payload(frame_header.record_kind, payload, payload_start as u64)?;
                if opts.accepts(&record) {
                    visit(record)?;
                }
                pos = payload_end;
            }
        }
        Ok(())
    }

    fn visit_block(
        &self,
        decompressed: &[u8],
        opts: &ReadOptions,
        visit: &mut impl FnMut(LogRecord) -> Result<(), LogError>,
    ) -> Result<(), LogError> {
        let mut offset = 0usize;
        while offset < decompressed.len() {
            let Some(kind_bytes) = decompressed.get(offset..offset + 1) else { break };
            let kind = kind_bytes[0];
            let Some(len_bytes) = decompressed.get(offset + 1..offset + 5) else { break };
            let size = u32::from_le_bytes(len_bytes.try_into().unwrap()) as usize;
            let Some(ts_bytes) = decompressed.get(offset + 5..offset + 13) else { break };
            let ts = u64::from_le_bytes(ts_bytes.try_into().unwrap());
            let payload_start = offset + 13;
            let Some(payload) = decompressed.get(payload_start..payload_start + size) else { break };
            let record = LogRecord::decode_payload(kind, payload, 0)?;
            debug_assert_eq!(record.timestamp_ns(), UnixNanos(ts));
            if opts.accepts(&record) {
                visit(record)?;
            }
            offset = payload_start + size;
        }
        Ok(())
    }

    /// Byte offset of the last index entry at or before `from_ns`, or the
    /// start of the segment body if there is no usable index entry.
    #[must_use]
    pub fn seek_offset(&self, from_ns: UnixNanos) -> u64 {
        match self.index.partition_point(|e| e.timestamp_ns <= from_ns) {
            0 => SegmentHeader::SIZE as u64,
            n => self.index[n - 1].file_offset,
        }
    }
}

fn read_index(mmap: &Mmap, offset: u64) -> Result<Vec<IndexEntry>, LogError> {
    let offset = offset as usize;
    let header_bytes = mmap
        .get(offset..offset + SegmentIndexHeader::SIZE)
        .ok_or(LogError::TruncatedFrame(offset as u64))?;
    let mut c = Cursor::new(header_bytes, offset as u64);
    let index_header = SegmentIndexHeader::decode(&mut c)?;
    let entries_start = offset + SegmentIndexHeader::SIZE;
    let entries_len = index_header.entry_count as usize * IndexEntry::SIZE;
    let entries_bytes = mmap
        .get(entries_start..entries_start + entries_len)
        .ok_or(LogError::TruncatedFrame(entries_start as u64))?;
    let crc = crc32fast::hash(entries_bytes);
    if crc != index_header.crc32 {
        return Err(LogError::CrcMismatch { offset: entries_start as u64, expected: index_header.crc32, found: crc });
    }
    let mut c = Cursor::new(entries_bytes, entries_start as u64);
    let mut entries = Vec::with_capacity(index_header.entry_count as usize);
    for _ in 0..index_header.entry_count {
        entries.push(IndexEntry::decode(&mut c)?);
    }
    Ok(entries)
}

/// Summary statistics over every segment found in a directory, as
/// produced by [`DirectoryReader::inspect`].
#[derive(Clone, Debug, Default)]
pub struct DatasetInspection {
    pub segment_count: usize,
    pub total_events: u64,
    pub first_event_ns: Option<UnixNanos>,
    pub last_event_ns: Option<UnixNanos>,
    pub symbol_count: u32,
    pub compressed_segments: usize,
    pub segment_paths: Vec<PathBuf>,
}

/// Iterates every `.floxlog` segment in a directory, in ascending
/// `first_event_ns` order, as one logical timestamp-ordered stream.
pub struct DirectoryReader {
    segments: Vec<PathBuf>,
}

impl DirectoryReader {
    /// Discovers and orders every `.floxlog` file directly under `dir`.
    ///
    /// # Errors
    /// Returns [`LogError::Io`] if `dir` cannot be listed, or
    /// [`LogError::EmptyDataset`] if it contains no segments.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, LogError> {
        let dir = dir.as_ref();
        let mut segments = discover_segments(dir)?;
        if segments.is_empty() {
            return Err(LogError::EmptyDataset(dir.to_path_buf()));
        }
        segments.sort_by_key(|(_, header)| header.first_event_ns);
        Ok(Self { segments: segments.into_iter().map(|(path, _)| path).collect() })
    }

    #[must_use]
    pub fn segment_paths(&self) -> &[PathBuf] {
        &self.segments
    }

    /// Visits every record across all segments in timestamp order.
    ///
    /// # Errors
    /// Returns the first error encountered opening or decoding a segment.
    pub fn for_each(&self, opts: &ReadOptions, mut visit: impl FnMut(LogRecord) -> Result<(), LogError>) -> Result<(), LogError> {
        for path in &self.segments {
            let reader = SegmentReader::open(path)?;
            reader.for_each(opts, &mut visit)?;
        }
        Ok(())
    }

    /// Computes summary statistics over every segment in `dir` without
    /// materializing the records themselves.
    ///
    /// # Errors
    /// Returns [`LogError::Io`] or a header-decode error for a malformed
    /// segment.
    pub fn inspect(dir: impl AsRef<Path>) -> Result<DatasetInspection, LogError> {
        let dir = dir.as_ref();
        let mut segments = discover_segments(dir)?;
        segments.sort_by_key(|(_, header)| header.first_event_ns);
        let mut inspection = DatasetInspection { segment_count: segments.len(), ..DatasetInspection::default() };
        let mut symbols = std::collections::HashSet::new();
        for (path, header) in &segments {
            inspection.total_events += header.event_count;
            inspection.first_event_ns = Some(match inspection.first_event_ns {
                Some(existing) => existing.min(header.first_event_ns),
                None => header.first_event_ns,
            });
            inspection.last_event_ns = Some(match inspection.last_event_ns {
                Some(existing) => existing.max(header.last_event_ns),
                None => header.last_event_ns,
            });
            if header.compressed {
                inspection.compressed_segments += 1;
            }
            symbols.insert(header.symbol_count);
            inspection.segment_paths.push(path.clone());
        }
        inspection.symbol_count = symbols.into_iter().max().unwrap_or(0);
        Ok(inspection)
    }
}

fn discover_segments(dir: &Path) -> Result<Vec<(PathBuf, SegmentHeader)>, LogError> {
    let mut out = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("floxlog") {
            continue;
        }
        let file = File::open(&path)?;
        // SAFETY: read-only mapping, closed at the end of this loop body.
        let mmap = unsafe { Mmap::map(&file)? };
        if mmap.len() < SegmentHeader::SIZE {
            continue;
        }
        let header = SegmentHeader::decode(&mmap[0..SegmentHeader::SIZE])?;
        out.push((path, header));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SegmentConfig;
    use crate::decimal::{Price, Quantity};
    use crate::ids::ExchangeId;
    use crate::log::format::TradeRecord;
    use crate::log::writer::SegmentWriter;
    use crate::model::Instrument;

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
    fn reads_back_everything_written() {
        let dir = tempfile::tempdir().unwrap();
        let config = SegmentConfig { max_segment_bytes: 1024 * 1024, index_interval: 2, ..SegmentConfig::default() };
        let mut writer = SegmentWriter::create(dir.path(), config, ExchangeId(1), || UnixNanos(1)).unwrap();
        for i in 0..20 {
            writer.append(trade(i, 1_000 + i)).unwrap();
        }
        let path = writer.current_path().to_path_buf();
        writer.close().unwrap();

        let reader = SegmentReader::open(&path).unwrap();
        assert_eq!(reader.header().event_count, 20);
        assert!(!reader.index().is_empty());

        let mut seen = Vec::new();
        reader
            .for_each(&ReadOptions::default(), |record| {
                seen.push(record.timestamp_ns().as_u64());
                Ok(())
            })
            .unwrap();
        assert_eq!(seen.len(), 20);
        assert_eq!(seen, (1_000..1_020).collect::<Vec<_>>());
    }

    #[test]
    fn directory_reader_merges_segments_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let small_capacity =
            (SegmentHeader::SIZE + 4 * (FrameHeader::SIZE + TradeRecord::SIZE)) as u64;
        let config = SegmentConfig { max_segment_bytes: small_capacity, index_interval: 0, ..SegmentConfig::default() };
        let mut writer = SegmentWriter::create(dir.path(), config, ExchangeId(1), || UnixNanos(1)).unwrap();
        for i in 0..12 {
            writer.append(trade(i, 1_000 + i)).unwrap();
        }
        writer.close().unwrap();

        let inspection = DirectoryReader::inspect(dir.path()).unwrap();
        assert_eq!(inspection.total_events, 12);

        let dir_reader = DirectoryReader::open(dir.path()).unwrap();
        let mut seen = Vec::new();
        dir_reader
            .for_each(&ReadOptions::default(), |record| {
                seen.push(record.timestamp_ns().as_u64());
                Ok(())
            })
            .unwrap();
        assert_eq!(seen, (1_000..1_012).collect::<Vec<_>>());
    }

    #[test]
    fn crc_mismatch_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let config = SegmentConfig { max_segment_bytes: 1024 * 1024, ..SegmentConfig::default() };
        let mut writer = SegmentWriter::create(dir.path(), config, ExchangeId(1), || UnixNanos(1)).unwrap();
        writer.append(trade(0, 1_000)).unwrap();
        let path = writer.current_path().to_path_buf();
        writer.close().unwrap();

        {
            let file = std::fs::OpenOptions::new().write(true).open(&path).unwrap();
            use std::io::{Seek, SeekFrom, Write};
            let mut file = file;
            file.seek(SeekFrom::Start(SegmentHeader::SIZE as u64 + FrameHeader::SIZE as u64)).unwrap();
            file.write_all(&[0xFFu8]).unwrap();
        }

        let reader = SegmentReader::open(&path).unwrap();
        let err = reader.for_each(&ReadOptions::default(), |_| Ok(())).unwrap_err();
        assert!(matches!(err, LogError::CrcMismatch { .. }));
    }
}
