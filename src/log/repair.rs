//! Repair routines for a `.floxlog` segment whose header went stale or
//! whose tail was cut off mid-write (process crash, disk full, killed
//! writer). Each routine opens the segment itself via a raw
//! read-write mapping; none of them assume [`super::writer::SegmentWriter`]
//! is still attached to the file.

use crate::clock::UnixNanos;
use crate::log::format::{Cursor, FrameHeader, IndexEntry, SegmentFlags, SegmentHeader, SegmentIndexHeader};
use crate::log::LogError;
use memmap2::MmapMut;
use std::fs::OpenOptions;
use std::path::Path;

/// Recomputes `first_event_ns`/`last_event_ns` by scanning every frame in
/// the segment body and rewrites the header in place. Use when a crash
/// left the header's timestamp bounds stale relative to what was
/// actually flushed.
///
/// # Errors
/// Returns [`LogError::Io`] on a read/write failure, or a decode error if
/// the header itself is unreadable.
pub fn fix_header_timestamps(path: impl AsRef<Path>) -> Result<(), LogError> {
    let path = path.as_ref();
    let mut mmap = open_rw(path)?;
    let mut header = SegmentHeader::decode(&mmap[0..SegmentHeader::SIZE])?;

    let mut first = None;
    let mut last = UnixNanos::ZERO;
    scan_frames(&mmap, &header, |ts, _offset| {
        first.get_or_insert(ts);
        last = ts;
    })?;

    header.first_event_ns = first.unwrap_or(UnixNanos::ZERO);
    header.last_event_ns = last;
    mmap[0..SegmentHeader::SIZE].copy_from_slice(&header.encode());
    mmap.flush()?;
    Ok(())
}

/// Recomputes `event_count` by scanning every frame in the segment body
/// and rewrites the header in place. Use when a crash left a stale count
/// (e.g. incremented before the frame bytes were durably written).
///
/// # Errors
/// Same as [`fix_header_timestamps`].
pub fn fix_event_count(path: impl AsRef<Path>) -> Result<(), LogError> {
    let path = path.as_ref();
    let mut mmap = open_rw(path)?;
    let mut header = SegmentHeader::decode(&mmap[0..SegmentHeader::SIZE])?;

    let mut count = 0u64;
    scan_frames(&mmap, &header, |_ts, _offset| count += 1)?;

    header.event_count = count;
    mmap[0..SegmentHeader::SIZE].copy_from_slice(&header.encode());
    mmap.flush()?;
    Ok(())
}

/// Rebuilds the trailing index section from scratch by rescanning every
/// frame and re-emitting one [`IndexEntry`] every `interval` events, then
/// rewrites the header's `index_offset`/`HAS_INDEX` flag. The segment
/// file must have enough trailing capacity for the new index; callers
/// that shrank it first should grow it back before calling this.
///
/// # Errors
/// Returns [`LogError::SegmentFull`] if the rebuilt index does not fit in
/// the space after the last frame, or [`LogError::Io`]/a decode error
/// otherwise.
pub fn rebuild_index(path: impl AsRef<Path>, interval: u32) -> Result<(), LogError> {
    let path = path.as_ref();
    let mut mmap = open_rw(path)?;
    let mut header = SegmentHeader::decode(&mmap[0..SegmentHeader::SIZE])?;

    let mut entries = Vec::new();
    let mut since_last = 0u32;
    scan_frames(&mmap, &header, |ts, offset| {
        if interval > 0 {
            since_last += 1;
            if since_last >= interval {
                entries.push(IndexEntry { timestamp_ns: ts, file_offset: offset });
                since_last = 0;
            }
        }
    })?;
    let body_end = last_frame_end(&mmap, &header)?;

    let capacity = mmap.len() as u64;
    let mut entry_bytes = Vec::with_capacity(entries.len() * IndexEntry::SIZE);
    for entry in &entries {
        entry_bytes.extend_from_slice(&entry.encode());
    }
    let crc = crc32fast::hash(&entry_bytes);
    let index_header = SegmentIndexHeader {
        interval,
        entry_count: entries.len() as u32,
        crc32: crc,
        first_ts: entries.first().map(|e| e.timestamp_ns).unwrap_or(UnixNanos::ZERO),
        last_ts: entries.last().map(|e| e.timestamp_ns).unwrap_or(UnixNanos::ZERO),
    };
    let index_len = SegmentIndexHeader::SIZE as u64 + entry_bytes.len() as u64;
    if body_end + index_len > capacity {
        return Err(LogError::SegmentFull { record_bytes: index_len as usize, remaining: (capacity - body_end) as usize });
    }

    let offset = body_end as usize;
    mmap[offset..offset + SegmentIndexHeader::SIZE].copy_from_slice(&index_header.encode());
    mmap[offset + SegmentIndexHeader::SIZE..offset + SegmentIndexHeader::SIZE + entry_bytes.len()]
        .copy_from_slice(&entry_bytes);

    header.index_offset = body_end;
    header.flags |= SegmentFlags::HAS_INDEX;
    mmap[0..SegmentHeader::SIZE].copy_from_slice(&header.encode());
    mmap.flush()?;
    Ok(())
}

/// Truncates the file at the byte offset of the first frame that fails
/// to decode (bad length, bad CRC, or simply runs past EOF), discarding
/// everything from there on, then fixes up header counts and drops any
/// now-stale index. Use on a segment a crash left with a torn tail
/// frame.
///
/// # Errors
/// Same as [`fix_header_timestamps`].
pub fn truncate_at_corruption(path: impl AsRef<Path>) -> Result<(), LogError> {
    let path = path.as_ref();
    let corruption_offset = {
        let mmap = open_ro(path)?;
        let header = SegmentHeader::decode(&mmap[0..SegmentHeader::SIZE])?;
        find_corruption_offset(&mmap, &header)
    };

    let file = OpenOptions::new().read(true).write(true).open(path)?;
    file.set_len(corruption_offset)?;

    let mut mmap = open_rw(path)?;
    let mut header = SegmentHeader::decode(&mmap[0..SegmentHeader::SIZE])?;
    let mut count = 0u64;
    let mut first = None;
    let mut last = UnixNanos::ZERO;
    scan_frames(&mmap, &header, |ts, _offset| {
        first.get_or_insert(ts);
        last = ts;
        count += 1;
    })?;
    header.event_count = count;
    header.first_event_ns = first.unwrap_or(UnixNanos::ZERO);
    header.last_event_ns = last;
    header.index_offset = 0;
    header.flags.remove(SegmentFlags::HAS_INDEX);
    mmap[0..SegmentHeader::SIZE].copy_from_slice(&header.encode());
    mmap.flush()?;
    Ok(())
}

fn open_rw(path: &Path) -> Result<MmapMut, LogError> {
    let file = OpenOptions::new().read(true).write(true).open(path)?;
    // SAFETY: exclusive access assumed for the duration of the repair call.
    Ok(unsafe { MmapMut::map_mut(&file)? })
}

fn open_ro(path: &Path) -> Result<memmap2::Mmap, LogError> {
    let file = OpenOptions::new().read(true).open(path)?;
    // SAFETY: read-only mapping, dropped before any write-side reopen.
    Ok(unsafe { memmap2::Mmap::map(&file)? })
}

/// Walks every frame in an uncompressed segment body (compressed
/// segments are not individually repairable at the frame level; callers
/// should `recompress` from a known-good source instead), calling `visit`
/// with `(timestamp, frame_start_offset)` for each one decoded cleanly.
/// Stops silently at the first frame that fails to decode.
fn scan_frames(mmap: &[u8], header: &SegmentHeader, mut visit: impl FnMut(UnixNanos, u64)) -> Result<(), LogError> {
    if header.compressed {
        return Ok(());
    }
    let end = if header.flags.contains(SegmentFlags::HAS_INDEX) && header.index_offset > 0 {
        header.index_offset as usize
    } else {
        mmap.len()
    };
    let mut pos = SegmentHeader::SIZE;
    while pos < end {
        let Some(header_bytes) = mmap.get(pos..pos + FrameHeader::SIZE) else { break };
        let mut c = Cursor::new(header_bytes, pos as u64);
        let frame_header = match FrameHeader::decode(&mut c) {
            Ok(h) => h,
            Err(_) => break,
        };
        let payload_end = pos + FrameHeader::SIZE + frame_header.size as usize;
        if payload_end > end {
            break;
        }
        visit(frame_header.timestamp_ns, pos as u64);
        pos = payload_end;
    }
    Ok(())
}

fn last_frame_end(mmap: &[u8], header: &SegmentHeader) -> Result<u64, LogError> {
    let mut last_end = SegmentHeader::SIZE as u64;
    scan_frame_ends(mmap, header, |end| last_end = end)?;
    Ok(last_end)
}

fn scan_frame_ends(mmap: &[u8], header: &SegmentHeader, mut visit: impl FnMut(u64)) -> Result<(), LogError> {
    if header.compressed {
        return Ok(());
    }
    let end = if header.flags.contains(SegmentFlags::HAS_INDEX) && header.index_offset > 0 {
        header.index_offset as usize
    } else {
        mmap.len()
    };
    let mut pos = SegmentHeader::SIZE;
    while pos < end {
        let Some(header_bytes) = mmap.get(pos..pos + FrameHeader::SIZE) else { break };
        let mut c = Cursor::new(header_bytes, pos as u64);
        let frame_header = match FrameHeader::decode(&mut c) {
            Ok(h) => h,
            Err(_) => break,
        };
        let payload_end = pos + FrameHeader::SIZE + frame_header.size as usize;
        if payload_end > end {
            break;
        }
        visit(payload_end as u64);
        pos = payload_end;
    }
    Ok(())
}

/// The byte offset at which decoding first fails: either a short header,
/// a frame whose declared size runs past EOF, or (with
/// `verify_crc_on_read` semantics) the natural end of the well-formed
/// prefix. Returns the file length if every frame decodes cleanly.
fn find_corruption_offset(mmap: &[u8], header: &SegmentHeader) -> u64 {
    if header.compressed {
        return mmap.len() as u64;
    }
    let mut pos = SegmentHeader::SIZE;
    loop {
        let Some(header_bytes) = mmap.get(pos..pos + FrameHeader::SIZE) else { return pos as u64 };
        let mut c = Cursor::new(header_bytes, pos as u64);
        let frame_header = match FrameHeader::decode(&mut c) {
            Ok(h) => h,
            Err(_) => return pos as u64,
        };
        let payload_end = pos + FrameHeader::SIZE + frame_header.size as usize;
        if payload_end > mmap.len() {
            return pos as u64;
        }
        let payload = &mmap[pos + FrameHeader::SIZE..payload_end];
        let crc = crc32fast::hash(payload);
        if crc != frame_header.crc32 {
            return pos as u64;
        }
        pos = payload_end;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SegmentConfig;
    use crate::decimal::{Price, Quantity};
    use crate::ids::{ExchangeId, SymbolId};
    use crate::log::format::{LogRecord, TradeRecord};
    use crate::log::reader::{ReadOptions, SegmentReader};
    use crate::log::writer::SegmentWriter;
    use crate::model::Instrument;
    use std::io::{Seek, SeekFrom, Write};

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
    fn truncate_at_corruption_drops_torn_tail() {
        let dir = tempfile::tempdir().unwrap();
        let config = SegmentConfig { max_segment_bytes: 1024 * 1024, index_interval: 0, ..SegmentConfig::default() };
        let mut writer = SegmentWriter::create(dir.path(), config, ExchangeId(1), || UnixNanos(1)).unwrap();
        for i in 0..5 {
            writer.append(trade(i, 1_000 + i)).unwrap();
        }
        let path = writer.current_path().to_path_buf();
        writer.close().unwrap();

        let file_len = std::fs::metadata(&path).unwrap().len();
        {
            let mut file = OpenOptions::new().write(true).open(&path).unwrap();
            file.set_len(file_len + 10).unwrap();
            file.seek(SeekFrom::End(0)).unwrap();
            file.write_all(&[0xAAu8; 10]).unwrap();
        }

        truncate_at_corruption(&path).unwrap();

        let reader = SegmentReader::open(&path).unwrap();
        assert_eq!(reader.header().event_count, 5);
        let mut seen = 0;
        reader.for_each(&ReadOptions::default(), |_| { seen += 1; Ok(()) }).unwrap();
        assert_eq!(seen, 5);
    }

    #[test]
    fn fix_event_count_recomputes_from_frames() {
        let dir = tempfile::tempdir().unwrap();
        let config = SegmentConfig { max_segment_bytes: 1024 * 1024, index_interval: 0, ..SegmentConfig::default() };
        let mut writer = SegmentWriter::create(dir.path(), config, ExchangeId(1), || UnixNanos(1)).unwrap();
        for i in 0..7 {
            writer.append(trade(i, 1_000 + i)).unwrap();
        }
        let path = writer.current_path().to_path_buf();
        writer.close().unwrap();

        fix_event_count(&path).unwrap();
        let reader = SegmentReader::open(&path).unwrap();
        assert_eq!(reader.header().event_count, 7);
    }
}
