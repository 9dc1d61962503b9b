//! The `.floxlog` segment binary layout: magic numbers, fixed-size
//! headers, and the two payload record kinds. All multibyte fields are
//! little-endian; decimal fields carry raw scaled [`Price`]/[`Quantity`]
//! units, matching [`crate::registry`] and [`crate::manifest`].

use crate::clock::UnixNanos;
use crate::decimal::{Price, Quantity};
use crate::ids::{ExchangeId, SymbolId};
use crate::log::LogError;
use crate::model::{BookKind, BookLevel, Instrument};
use bitflags::bitflags;

/// Little-endian ASCII `"FLOX"`.
pub const SEGMENT_MAGIC: u32 = 0x584F_4C46;
pub const SEGMENT_VERSION: u32 = 1;
/// Little-endian ASCII `"FBLK"`.
pub const BLOCK_MAGIC: u32 = 0x4B4C_4246;
/// Little-endian ASCII `"INDX"`.
pub const INDEX_MAGIC: u32 = 0x5844_4E49;

bitflags! {
    /// [`SegmentHeader`] feature flags.
    #[derive(Clone, Copy, PartialEq, Eq, Debug)]
    pub struct SegmentFlags: u8 {
        const HAS_INDEX  = 0b0000_0001;
        const COMPRESSED = 0b0000_0010;
    }
}

/// A little-endian byte cursor over a borrowed buffer. Every read is
/// bounds-checked; running past the end reports
/// [`LogError::TruncatedFrame`] with the offset the read started at,
/// rather than panicking — callers decode untrusted disk bytes.
pub(crate) struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
    base_offset: u64,
}

impl<'a> Cursor<'a> {
    pub(crate) fn new(buf: &'a [u8], base_offset: u64) -> Self {
        Self { buf, pos: 0, base_offset }
    }

    pub(crate) fn position(&self) -> usize {
        self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], LogError> {
        if self.pos + n > self.buf.len() {
            return Err(LogError::TruncatedFrame(self.base_offset + self.pos as u64));
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub(crate) fn u8(&mut self) -> Result<u8, LogError> {
        Ok(self.take(1)?[0])
    }

    pub(crate) fn u16(&mut self) -> Result<u16, LogError> {
        Ok(u16::from_le_bytes(self.take(2)?.try_into().unwrap()))
    }

    pub(crate) fn u32(&mut self) -> Result<u32, LogError> {
        Ok(u32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }

    pub(crate) fn u64(&mut self) -> Result<u64, LogError> {
        Ok(u64::from_le_bytes(self.take(8)?.try_into().unwrap()))
    }

    pub(crate) fn i64(&mut self) -> Result<i64, LogError> {
        Ok(i64::from_le_bytes(self.take(8)?.try_into().unwrap()))
    }

    pub(crate) fn skip(&mut self, n: usize) -> Result<(), LogError> {
        self.take(n).map(|_| ())
    }

    pub(crate) fn bytes(&mut self, n: usize) -> Result<&'a [u8], LogError> {
        self.take(n)
    }
}

fn instrument_tag(i: Instrument) -> u8 {
    match i {
        Instrument::Spot => 0,
        Instrument::Perpetual => 1,
        Instrument::Future => 2,
        Instrument::Option => 3,
    }
}

fn instrument_from_tag(tag: u8) -> Result<Instrument, LogError> {
    match tag {
        0 => Ok(Instrument::Spot),
        1 => Ok(Instrument::Perpetual),
        2 => Ok(Instrument::Future),
        3 => Ok(Instrument::Option),
        other => Err(LogError::InvalidTag(other)),
    }
}

fn book_kind_tag(k: BookKind) -> u8 {
    match k {
        BookKind::Snapshot => 0,
        BookKind::Delta => 1,
    }
}

fn book_kind_from_tag(tag: u8) -> Result<BookKind, LogError> {
    match tag {
        0 => Ok(BookKind::Snapshot),
        1 => Ok(BookKind::Delta),
        other => Err(LogError::InvalidTag(other)),
    }
}

/// The on-disk segment header, 64 bytes, written at offset 0 of every
/// `.floxlog` file and rewritten in place once the segment is finalized.
#[derive(Clone, Copy, Debug)]
pub struct SegmentHeader {
    pub version: u32,
    pub flags: SegmentFlags,
    pub exchange_id: ExchangeId,
    pub created_ns: UnixNanos,
    pub first_event_ns: UnixNanos,
    pub last_event_ns: UnixNanos,
    pub event_count: u64,
    pub symbol_count: u32,
    pub compressed: bool,
    pub index_offset: u64,
}

impl SegmentHeader {
    pub const SIZE: usize = 64;

    #[must_use]
    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0..4].copy_from_slice(&SEGMENT_MAGIC.to_le_bytes());
        buf[4..8].copy_from_slice(&self.version.to_le_bytes());
        buf[8] = self.flags.bits();
        // buf[9] reserved padding byte
        buf[10..12].copy_from_slice(&self.exchange_id.0.to_le_bytes());
        buf[12..20].copy_from_slice(&self.created_ns.as_u64().to_le_bytes());
        buf[20..28].copy_from_slice(&self.first_event_ns.as_u64().to_le_bytes());
        buf[28..36].copy_from_slice(&self.last_event_ns.as_u64().to_le_bytes());
        buf[36..44].copy_from_slice(&self.event_count.to_le_bytes());
        buf[44..48].copy_from_slice(&self.symbol_count.to_le_bytes());
        buf[48] = u8::from(self.compressed);
        // buf[49..52] reserved padding
        buf[52..60].copy_from_slice(&self.index_offset.to_le_bytes());
        // buf[60..64] reserved
        buf
    }

    /// # Errors
    /// Returns [`LogError::BadMagic`] or [`LogError::UnsupportedVersion`]
    /// on a malformed header.
    pub fn decode(buf: &[u8]) -> Result<Self, LogError> {
        let mut c = Cursor::new(buf, 0);
        let magic = c.u32()?;
        if magic != SEGMENT_MAGIC {
            return Err(LogError::BadMagic { expected: SEGMENT_MAGIC, found: magic });
        }
        let version = c.u32()?;
        if version != SEGMENT_VERSION {
            return Err(LogError::UnsupportedVersion(version));
        }
        let flags = SegmentFlags::from_bits_truncate(c.u8()?);
        c.skip(1)?;
        let exchange_id = ExchangeId(c.u16()?);
        let created_ns = UnixNanos(c.u64()?);
        let first_event_ns = UnixNanos(c.u64()?);
        let last_event_ns = UnixNanos(c.u64()?);
        let event_count = c.u64()?;
        let symbol_count = c.u32()?;
        let compressed = c.u8()? != 0;
        c.skip(3)?;
        let index_offset = c.u64()?;
        Ok(Self {
            version,
            flags,
            exchange_id,
            created_ns,
            first_event_ns,
            last_event_ns,
            event_count,
            symbol_count,
            compressed,
            index_offset,
        })
    }
}

/// Per-frame header in uncompressed mode: 24 bytes.
#[derive(Clone, Copy, Debug)]
pub struct FrameHeader {
    pub record_kind: u8,
    pub size: u32,
    pub crc32: u32,
    pub timestamp_ns: UnixNanos,
}

impl FrameHeader {
    pub const SIZE: usize = 24;

    #[must_use]
    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0] = self.record_kind;
        // buf[1..8] reserved padding
        buf[8..12].copy_from_slice(&self.size.to_le_bytes());
        buf[12..16].copy_from_slice(&self.crc32.to_le_bytes());
        buf[16..24].copy_from_slice(&self.timestamp_ns.as_u64().to_le_bytes());
        buf
    }

    pub(crate) fn decode(c: &mut Cursor) -> Result<Self, LogError> {
        let record_kind = c.u8()?;
        c.skip(7)?;
        let size = c.u32()?;
        let crc32 = c.u32()?;
        let timestamp_ns = UnixNanos(c.u64()?);
        Ok(Self { record_kind, size, crc32, timestamp_ns })
    }
}

/// Per-block header in compressed mode: 24 bytes.
#[derive(Clone, Copy, Debug)]
pub struct CompressedBlockHeader {
    pub compressed_size: u32,
    pub original_size: u32,
    pub event_count: u32,
    pub crc32: u32,
}

impl CompressedBlockHeader {
    pub const SIZE: usize = 24;

    #[must_use]
    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0..4].copy_from_slice(&BLOCK_MAGIC.to_le_bytes());
        buf[4..8].copy_from_slice(&self.compressed_size.to_le_bytes());
        buf[8..12].copy_from_slice(&self.original_size.to_le_bytes());
        buf[12..16].copy_from_slice(&self.event_count.to_le_bytes());
        // buf[16..20] flags reserved, currently always zero
        buf[20..24].copy_from_slice(&self.crc32.to_le_bytes());
        buf
    }

    pub(crate) fn decode(c: &mut Cursor) -> Result<Self, LogError> {
        let magic = c.u32()?;
        if magic != BLOCK_MAGIC {
            return Err(LogError::BadMagic { expected: BLOCK_MAGIC, found: magic });
        }
        let compressed_size = c.u32()?;
        let original_size = c.u32()?;
        let event_count = c.u32()?;
        c.skip(4)?;
        let crc32 = c.u32()?;
        Ok(Self { compressed_size, original_size, event_count, crc32 })
    }
}

/// The trailing index section's own header: 40 bytes, followed by
/// `entry_count` [`IndexEntry`] records.
#[derive(Clone, Copy, Debug)]
pub struct SegmentIndexHeader {
    pub interval: u32,
    pub entry_count: u32,
    pub crc32: u32,
    pub first_ts: UnixNanos,
    pub last_ts: UnixNanos,
}

impl SegmentIndexHeader {
    pub const SIZE: usize = 40;
    pub const VERSION: u32 = 1;

    #[must_use]
    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0..4].copy_from_slice(&INDEX_MAGIC.to_le_bytes());
        buf[4..8].copy_from_slice(&Self::VERSION.to_le_bytes());
        buf[8..12].copy_from_slice(&self.interval.to_le_bytes());
        buf[12..16].copy_from_slice(&self.entry_count.to_le_bytes());
        buf[16..20].copy_from_slice(&self.crc32.to_le_bytes());
        // buf[20..24] reserved padding
        buf[24..32].copy_from_slice(&self.first_ts.as_u64().to_le_bytes());
        buf[32..40].copy_from_slice(&self.last_ts.as_u64().to_le_bytes());
        buf
    }

    pub(crate) fn decode(c: &mut Cursor) -> Result<Self, LogError> {
        let magic = c.u32()?;
        if magic != INDEX_MAGIC {
            return Err(LogError::BadMagic { expected: INDEX_MAGIC, found: magic });
        }
        let version = c.u32()?;
        if version != Self::VERSION {
            return Err(LogError::UnsupportedVersion(version));
        }
        let interval = c.u32()?;
        let entry_count = c.u32()?;
        let crc32 = c.u32()?;
        c.skip(4)?;
        let first_ts = UnixNanos(c.u64()?);
        let last_ts = UnixNanos(c.u64()?);
        Ok(Self { interval, entry_count, crc32, first_ts, last_ts })
    }
}

/// One `(timestamp, file_offset)` index entry: 16 bytes.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct IndexEntry {
    pub timestamp_ns: UnixNanos,
    pub file_offset: u64,
}

impl IndexEntry {
    pub const SIZE: usize = 16;

    #[must_use]
    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0..8].copy_from_slice(&self.timestamp_ns.as_u64().to_le_bytes());
        buf[8..16].copy_from_slice(&self.file_offset.to_le_bytes());
        buf
    }

    pub(crate) fn decode(c: &mut Cursor) -> Result<Self, LogError> {
        let timestamp_ns = UnixNanos(c.u64()?);
        let file_offset = c.u64()?;
        Ok(Self { timestamp_ns, file_offset })
    }
}

/// A decoded `TradeRecord` payload: 48 bytes on disk.
#[derive(Clone, Copy, PartialEq, Debug)]
pub struct TradeRecord {
    pub symbol: SymbolId,
    pub instrument: Instrument,
    pub price: Price,
    pub quantity: Quantity,
    pub is_buy: bool,
    pub exchange_ts_ns: UnixNanos,
    pub seq: u64,
}

impl TradeRecord {
    pub const SIZE: usize = 48;

    #[must_use]
    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0..4].copy_from_slice(&self.symbol.0.to_le_bytes());
        buf[4] = instrument_tag(self.instrument);
        // buf[5..8] reserved padding
        buf[8..16].copy_from_slice(&self.price.raw().to_le_bytes());
        buf[16..24].copy_from_slice(&self.quantity.raw().to_le_bytes());
        buf[24] = u8::from(self.is_buy);
        // buf[25..32] reserved padding
        buf[32..40].copy_from_slice(&self.exchange_ts_ns.as_u64().to_le_bytes());
        buf[40..48].copy_from_slice(&self.seq.to_le_bytes());
        buf
    }

    pub(crate) fn decode(c: &mut Cursor) -> Result<Self, LogError> {
        let symbol = SymbolId(c.u32()?);
        let instrument = instrument_from_tag(c.u8()?)?;
        c.skip(3)?;
        let price = Price::from_raw(c.i64()?);
        let quantity = Quantity::from_raw(c.i64()?);
        let is_buy = c.u8()? != 0;
        c.skip(7)?;
        let exchange_ts_ns = UnixNanos(c.u64()?);
        let seq = c.u64()?;
        Ok(Self { symbol, instrument, price, quantity, is_buy, exchange_ts_ns, seq })
    }
}

/// A decoded `BookRecordHeader` (40 bytes) plus its variable-length
/// bid/ask level arrays.
#[derive(Clone, PartialEq, Debug)]
pub struct BookRecord {
    pub symbol: SymbolId,
    pub instrument: Instrument,
    pub kind: BookKind,
    pub bids: Vec<BookLevel>,
    pub asks: Vec<BookLevel>,
    pub exchange_ts_ns: UnixNanos,
    pub system_ts_ns: UnixNanos,
    pub seq: u64,
}

impl BookRecord {
    pub const HEADER_SIZE: usize = 40;
    const LEVEL_SIZE: usize = 16;

    #[must_use]
    pub fn encoded_len(&self) -> usize {
        Self::HEADER_SIZE + (self.bids.len() + self.asks.len()) * Self::LEVEL_SIZE
    }

    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = vec![0u8; self.encoded_len()];
        buf[0..4].copy_from_slice(&self.symbol.0.to_le_bytes());
        buf[4] = instrument_tag(self.instrument);
        // buf[5..8] reserved padding
        buf[8] = book_kind_tag(self.kind);
        // buf[9..12] reserved padding
        buf[12..14].copy_from_slice(&(self.bids.len() as u16).to_le_bytes());
        buf[14..16].copy_from_slice(&(self.asks.len() as u16).to_le_bytes());
        buf[16..24].copy_from_slice(&self.exchange_ts_ns.as_u64().to_le_bytes());
        buf[24..32].copy_from_slice(&self.system_ts_ns.as_u64().to_le_bytes());
        buf[32..40].copy_from_slice(&self.seq.to_le_bytes());
        let mut offset = Self::HEADER_SIZE;
        for level in self.bids.iter().chain(self.asks.iter()) {
            buf[offset..offset + 8].copy_from_slice(&level.price.raw().to_le_bytes());
            buf[offset + 8..offset + 16].copy_from_slice(&level.qty.raw().to_le_bytes());
            offset += Self::LEVEL_SIZE;
        }
        buf
    }

    pub(crate) fn decode(c: &mut Cursor) -> Result<Self, LogError> {
        let symbol = SymbolId(c.u32()?);
        let instrument = instrument_from_tag(c.u8()?)?;
        c.skip(3)?;
        let kind = book_kind_from_tag(c.u8()?)?;
        c.skip(3)?;
        let bid_count = c.u16()? as usize;
        let ask_count = c.u16()? as usize;
        let exchange_ts_ns = UnixNanos(c.u64()?);
        let system_ts_ns = UnixNanos(c.u64()?);
        let seq = c.u64()?;
        let mut bids = Vec::with_capacity(bid_count);
        for _ in 0..bid_count {
            bids.push(decode_level(c)?);
        }
        let mut asks = Vec::with_capacity(ask_count);
        for _ in 0..ask_count {
            asks.push(decode_level(c)?);
        }
        Ok(Self { symbol, instrument, kind, bids, asks, exchange_ts_ns, system_ts_ns, seq })
    }
}

fn decode_level(c: &mut Cursor) -> Result<BookLevel, LogError> {
    let price = Price::from_raw(c.i64()?);
    let qty = Quantity::from_raw(c.i64()?);
    Ok(BookLevel { price, qty })
}

/// Which [`LogRecord`] variant a frame carries, tagged in its
/// [`FrameHeader::record_kind`] byte.
pub const RECORD_KIND_TRADE: u8 = 0;
pub const RECORD_KIND_BOOK: u8 = 1;

/// A decoded market-data record: either side of the `.floxlog` payload
/// union.
#[derive(Clone, PartialEq, Debug)]
pub enum LogRecord {
    Trade(TradeRecord),
    Book(BookRecord),
}

impl LogRecord {
    #[must_use]
    pub fn record_kind(&self) -> u8 {
        match self {
            LogRecord::Trade(_) => RECORD_KIND_TRADE,
            LogRecord::Book(_) => RECORD_KIND_BOOK,
        }
    }

    #[must_use]
    pub fn timestamp_ns(&self) -> UnixNanos {
        match self {
            LogRecord::Trade(t) => t.exchange_ts_ns,
            LogRecord::Book(b) => b.exchange_ts_ns,
        }
    }

    #[must_use]
    pub fn symbol(&self) -> SymbolId {
        match self {
            LogRecord::Trade(t) => t.symbol,
            LogRecord::Book(b) => b.symbol,
        }
    }

    #[must_use]
    pub fn encode_payload(&self) -> Vec<u8> {
        match self {
            LogRecord::Trade(t) => t.encode().to_vec(),
            LogRecord::Book(b) => b.encode(),
        }
    }

    /// # Errors
    /// Returns [`LogError::UnknownRecordKind`] for an unrecognized tag, or
    /// a decode error propagated from the underlying record type.
    pub fn decode_payload(kind: u8, buf: &[u8], base_offset: u64) -> Result<Self, LogError> {
        let mut c = Cursor::new(buf, base_offset);
        match kind {
            RECORD_KIND_TRADE => Ok(LogRecord::Trade(TradeRecord::decode(&mut c)?)),
            RECORD_KIND_BOOK => Ok(LogRecord::Book(BookRecord::decode(&mut c)?)),
            other => Err(LogError::UnknownRecordKind(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trade_record_round_trips() {
        let record = TradeRecord {
            symbol: SymbolId(7),
            instrument: Instrument::Perpetual,
            price: Price::from_parts(100, 0),
            quantity: Quantity::from_parts(2, 0),
            is_buy: true,
            exchange_ts_ns: UnixNanos(123_456),
            seq: 9,
        };
        let encoded = record.encode();
        assert_eq!(encoded.len(), TradeRecord::SIZE);
        let mut c = Cursor::new(&encoded, 0);
        let decoded = TradeRecord::decode(&mut c).unwrap();
        assert_eq!(decoded, record);
    }

    #[test]
    fn book_record_round_trips_with_levels() {
        let record = BookRecord {
            symbol: SymbolId(1),
            instrument: Instrument::Spot,
            kind: BookKind::Snapshot,
            bids: vec![BookLevel { price: Price::from_parts(100, 0), qty: Quantity::from_parts(5, 0) }],
            asks: vec![
                BookLevel { price: Price::from_parts(101, 0), qty: Quantity::from_parts(3, 0) },
                BookLevel { price: Price::from_parts(102, 0), qty: Quantity::from_parts(1, 0) },
            ],
            exchange_ts_ns: UnixNanos(1_000),
            system_ts_ns: UnixNanos(1_001),
            seq: 42,
        };
        let encoded = record.encode();
        assert_eq!(encoded.len(), record.encoded_len());
        let mut c = Cursor::new(&encoded, 0);
        let decoded = BookRecord::decode(&mut c).unwrap();
        assert_eq!(decoded, record);
    }

    #[test]
    fn segment_header_round_trips() {
        let header = SegmentHeader {
            version: SEGMENT_VERSION,
            flags: SegmentFlags::HAS_INDEX,
            exchange_id: ExchangeId(3),
            created_ns: UnixNanos(1),
            first_event_ns: UnixNanos(10),
            last_event_ns: UnixNanos(20),
            event_count: 5,
            symbol_count: 2,
            compressed: false,
            index_offset: 4096,
        };
        let encoded = header.encode();
        let decoded = SegmentHeader::decode(&encoded).unwrap();
        assert_eq!(decoded.event_count, 5);
        assert_eq!(decoded.flags, SegmentFlags::HAS_INDEX);
        assert_eq!(decoded.index_offset, 4096);
    }

    #[test]
    fn truncated_buffer_is_reported_not_panicked() {
        let buf = [0u8; 4];
        let mut c = Cursor::new(&buf, 100);
        let err = c.u64().unwrap_err();
        assert!(matches!(err, LogError::TruncatedFrame(100)));
    }
}
