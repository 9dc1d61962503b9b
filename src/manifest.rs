//! The `"FMAN"` manifest format: a small index of the segments that make
//! up a dataset, with aggregate counts, so tooling can answer "how much
//! data is here" without opening every segment.

use crate::clock::UnixNanos;
use std::io::{self, Read, Write};
use thiserror::Error;

/// Little-endian ASCII `"FMAN"`.
pub const MAGIC: u32 = 0x4E41_4D46;
pub const VERSION: u32 = 1;

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ManifestError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("bad magic: expected {MAGIC:#010x}, found {found:#010x}")]
    BadMagic { found: u32 },
    #[error("unsupported manifest version: {0}")]
    UnsupportedVersion(u32),
}

/// One dataset segment's summary, as recorded in the manifest.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct ManifestEntry {
    pub file_name: String,
    pub first_event_ns: UnixNanos,
    pub last_event_ns: UnixNanos,
    pub event_count: u64,
}

/// The full listing for one dataset directory.
#[derive(Clone, Default, Debug)]
pub struct Manifest {
    pub entries: Vec<ManifestEntry>,
}

impl Manifest {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn total_events(&self) -> u64 {
        self.entries.iter().map(|e| e.event_count).sum()
    }

    #[must_use]
    pub fn time_bounds(&self) -> Option<(UnixNanos, UnixNanos)> {
        let first = self.entries.iter().map(|e| e.first_event_ns).min()?;
        let last = self.entries.iter().map(|e| e.last_event_ns).max()?;
        Some((first, last))
    }

    /// # Errors
    /// Returns [`ManifestError::Io`] on a write failure.
    pub fn write_to<W: Write>(&self, mut w: W) -> Result<(), ManifestError> {
        w.write_all(&MAGIC.to_le_bytes())?;
        w.write_all(&VERSION.to_le_bytes())?;
        w.write_all(&(self.entries.len() as u32).to_le_bytes())?;
        for entry in &self.entries {
            let name_bytes = entry.file_name.as_bytes();
            w.write_all(&(name_bytes.len() as u16).to_le_bytes())?;
            w.write_all(name_bytes)?;
            w.write_all(&entry.first_event_ns.as_u64().to_le_bytes())?;
            w.write_all(&entry.last_event_ns.as_u64().to_le_bytes())?;
            w.write_all(&entry.event_count.to_le_bytes())?;
        }
        Ok(())
    }

    /// # Errors
    /// Returns [`ManifestError`] on a bad magic, unsupported version, or
    /// truncated record.
    pub fn read_from<R: Read>(mut r: R) -> Result<Self, ManifestError> {
        let magic = read_u32(&mut r)?;
        if magic != MAGIC {
            return Err(ManifestError::BadMagic { found: magic });
        }
        let version = read_u32(&mut r)?;
        if version != VERSION {
            return Err(ManifestError::UnsupportedVersion(version));
        }
        let count = read_u32(&mut r)?;
        let mut entries = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let name_len = read_u16(&mut r)?;
            let mut name_buf = vec![0u8; name_len as usize];
            r.read_exact(&mut name_buf)?;
            let file_name = String::from_utf8_lossy(&name_buf).into_owned();
            let first_event_ns = UnixNanos(read_u64(&mut r)?);
            let last_event_ns = UnixNanos(read_u64(&mut r)?);
            let event_count = read_u64(&mut r)?;
            entries.push(ManifestEntry {
                file_name,
                first_event_ns,
                last_event_ns,
                event_count,
            });
        }
        Ok(Self { entries })
    }
}

fn read_u16<R: Read>(r: &mut R) -> io::Result<u16> {
    let mut buf = [0u8; 2];
    r.read_exact(&mut buf)?;
    Ok(u16::from_le_bytes(buf))
}

fn read_u32<R: Read>(r: &mut R) -> io::Result<u32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_u64<R: Read>(r: &mut R) -> io::Result<u64> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_and_aggregates() {
        let manifest = Manifest {
            entries: vec![
                ManifestEntry {
                    file_name: "segment-000001.floxlog".into(),
                    first_event_ns: UnixNanos(1_000),
                    last_event_ns: UnixNanos(2_000),
                    event_count: 50,
                },
                ManifestEntry {
                    file_name: "segment-000002.floxlog".into(),
                    first_event_ns: UnixNanos(2_001),
                    last_event_ns: UnixNanos(3_500),
                    event_count: 75,
                },
            ],
        };
        let mut buf = Vec::new();
        manifest.write_to(&mut buf).unwrap();
        let loaded = Manifest::read_from(&buf[..]).unwrap();
        assert_eq!(loaded.total_events(), 125);
        assert_eq!(loaded.time_bounds(), Some((UnixNanos(1_000), UnixNanos(3_500))));
    }
}
