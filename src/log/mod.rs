//! The `.floxlog` segmented binary market-data log: encode/decode
//! ([`format`]), a memory-mapped writer ([`writer`]) and reader
//! ([`reader`]), a parallel multi-segment reader ([`multi`]), offline
//! segment transforms ([`segment_ops`]), and repair tools ([`repair`]).

pub mod format;
pub mod multi;
pub mod reader;
pub mod repair;
pub mod segment_ops;
pub mod writer;

pub use format::{BookRecord, IndexEntry, LogRecord, SegmentHeader, TradeRecord};
pub use multi::{MapReduceOptions, MergeOptions, ParallelReader};
pub use reader::{DatasetInspection, DirectoryReader, ReadOptions, SegmentReader};
pub use writer::{SegmentWriter, WriterStats};

use std::io;
use thiserror::Error;

/// Failure modes across the `.floxlog` read/write/repair surface.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum LogError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("bad magic: expected {expected:#010x}, found {found:#010x}")]
    BadMagic { expected: u32, found: u32 },

    #[error("unsupported segment version: {0}")]
    UnsupportedVersion(u32),

    #[error("CRC mismatch at offset {offset}: expected {expected:#010x}, found {found:#010x}")]
    CrcMismatch { offset: u64, expected: u32, found: u32 },

    #[error("truncated frame at offset {0}")]
    TruncatedFrame(u64),

    #[error("unknown record kind tag {0}")]
    UnknownRecordKind(u8),

    #[error("invalid tag byte {0}")]
    InvalidTag(u8),

    #[error("segment is already at capacity: record of {record_bytes} bytes does not fit in {remaining} remaining bytes")]
    SegmentFull { record_bytes: usize, remaining: usize },

    #[error("record of {0} bytes exceeds the configured max_segment_bytes and can never be written")]
    RecordTooLarge(usize),

    #[error("compression error: {0}")]
    Compression(String),

    #[error("no segments found in {0}")]
    EmptyDataset(std::path::PathBuf),
}
