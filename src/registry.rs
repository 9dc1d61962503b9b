//! `SymbolRegistry`: resolves [`SymbolId`] to [`SymbolInfo`] and
//! (de)serializes the table in the little-endian `"SREG"` binary format
//! fixed by §6. Version 2 adds a per-symbol `tick_size`; version 1 files
//! (without it) still load, with every symbol's tick size defaulting to
//! zero raw units — callers that need tick size must re-save as v2.

use crate::decimal::Price;
use crate::ids::{ExchangeId, SymbolId};
use crate::model::Instrument;
use crate::validation::{Severity, ValidationIssue};
use std::collections::HashMap;
use std::io::{self, Read, Write};
use thiserror::Error;

/// Little-endian ASCII `"SREG"`.
pub const MAGIC: u32 = 0x4745_5253;
pub const CURRENT_VERSION: u32 = 2;

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum RegistryError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("bad magic: expected {MAGIC:#010x}, found {found:#010x}")]
    BadMagic { found: u32 },
    #[error("unsupported registry version: {0}")]
    UnsupportedVersion(u32),
    #[error("truncated record at symbol index {0}")]
    Truncated(u32),
    #[error("invalid instrument tag {0}")]
    InvalidInstrumentTag(u8),
}

/// What the registry knows about one tradable symbol.
#[derive(Clone, PartialEq, Debug)]
pub struct SymbolInfo {
    pub exchange: ExchangeId,
    /// The exchange-native ticker, e.g. `"BTC-USDT"`.
    pub symbol: String,
    pub tick_size: Price,
    pub instrument: Instrument,
}

fn instrument_tag(i: Instrument) -> u8 {
    match i {
        Instrument::Spot => 0,
        Instrument::Perpetual => 1,
        Instrument::Future => 2,
        Instrument::Option => 3,
    }
}

fn instrument_from_tag(tag: u8) -> Result<Instrument, RegistryError> {
    match tag {
        0 => Ok(Instrument::Spot),
        1 => Ok(Instrument::Perpetual),
        2 => Ok(Instrument::Future),
        3 => Ok(Instrument::Option),
        other => Err(RegistryError::InvalidInstrumentTag(other)),
    }
}

/// An in-memory `SymbolId -> SymbolInfo` table, loadable from and
/// savable to the `"SREG"` binary format.
#[derive(Clone, Default, Debug)]
pub struct SymbolRegistry {
    entries: HashMap<SymbolId, SymbolInfo>,
}

impl SymbolRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: SymbolId, info: SymbolInfo) {
        self.entries.insert(id, info);
    }

    #[must_use]
    pub fn resolve(&self, id: SymbolId) -> Option<&SymbolInfo> {
        self.entries.get(&id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&SymbolId, &SymbolInfo)> {
        self.entries.iter()
    }

    /// Writes this table in the current (v2) `"SREG"` format.
    ///
    /// # Errors
    /// Returns [`RegistryError::Io`] on a write failure.
    pub fn write_to<W: Write>(&self, mut w: W) -> Result<(), RegistryError> {
        w.write_all(&MAGIC.to_le_bytes())?;
        w.write_all(&CURRENT_VERSION.to_le_bytes())?;
        w.write_all(&(self.entries.len() as u32).to_le_bytes())?;
        for (id, info) in &self.entries {
            w.write_all(&id.0.to_le_bytes())?;
            w.write_all(&info.exchange.0.to_le_bytes())?;
            w.write_all(&[instrument_tag(info.instrument)])?;
            w.write_all(&info.tick_size.raw().to_le_bytes())?;
            let sym_bytes = info.symbol.as_bytes();
            w.write_all(&(sym_bytes.len() as u16).to_le_bytes())?;
            w.write_all(sym_bytes)?;
        }
        Ok(())
    }

    /// Loads a table previously written by [`Self::write_to`] (version 1
    /// or 2). Returns the registry plus any non-fatal diagnostics
    /// collected along the way.
    ///
    /// # Errors
    /// Returns [`RegistryError`] on a bad magic, unsupported version, or
    /// a truncated/malformed record.
    pub fn read_from<R: Read>(mut r: R) -> Result<(Self, Vec<ValidationIssue>), RegistryError> {
        let mut issues = Vec::new();
        let magic = read_u32(&mut r)?;
        if magic != MAGIC {
            return Err(RegistryError::BadMagic { found: magic });
        }
        let version = read_u32(&mut r)?;
        if version != 1 && version != 2 {
            return Err(RegistryError::UnsupportedVersion(version));
        }
        let count = read_u32(&mut r)?;
        let mut registry = Self::new();
        for idx in 0..count {
            let symbol_raw = read_u32(&mut r).map_err(|_| RegistryError::Truncated(idx))?;
            let exchange_raw = read_u16(&mut r).map_err(|_| RegistryError::Truncated(idx))?;
            let mut tag_buf = [0u8; 1];
            r.read_exact(&mut tag_buf).map_err(|_| RegistryError::Truncated(idx))?;
            let instrument = instrument_from_tag(tag_buf[0])?;
            let tick_size = if version >= 2 {
                Price::from_raw(read_i64(&mut r).map_err(|_| RegistryError::Truncated(idx))?)
            } else {
                issues.push(
                    ValidationIssue::new(Severity::Info, "v1 registry record has no tick_size, defaulting to 0")
                        .at_event(idx as u64),
                );
                Price::ZERO
            };
            let name_len = read_u16(&mut r).map_err(|_| RegistryError::Truncated(idx))?;
            let mut name_buf = vec![0u8; name_len as usize];
            r.read_exact(&mut name_buf).map_err(|_| RegistryError::Truncated(idx))?;
            let symbol = String::from_utf8_lossy(&name_buf).into_owned();
            registry.insert(
                SymbolId(symbol_raw),
                SymbolInfo {
                    exchange: ExchangeId(exchange_raw),
                    symbol,
                    tick_size,
                    instrument,
                },
            );
        }
        Ok((registry, issues))
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

fn read_i64<R: Read>(r: &mut R) -> io::Result<i64> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf)?;
    Ok(i64::from_le_bytes(buf))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> SymbolRegistry {
        let mut reg = SymbolRegistry::new();
        reg.insert(
            SymbolId(1),
            SymbolInfo {
                exchange: ExchangeId(7),
                symbol: "BTC-USDT".into(),
                tick_size: Price::from_parts(0, 1_000_000),
                instrument: Instrument::Spot,
            },
        );
        reg.insert(
            SymbolId(2),
            SymbolInfo {
                exchange: ExchangeId(7),
                symbol: "ETH-USDT-PERP".into(),
                tick_size: Price::from_parts(0, 100_000),
                instrument: Instrument::Perpetual,
            },
        );
        reg
    }

    #[test]
    fn round_trips_through_v2_binary_format() {
        let reg = sample();
        let mut buf = Vec::new();
        reg.write_to(&mut buf).unwrap();
        let (loaded, issues) = SymbolRegistry::read_from(&buf[..]).unwrap();
        assert!(issues.is_empty());
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded.resolve(SymbolId(1)).unwrap().symbol, "BTC-USDT");
        assert_eq!(loaded.resolve(SymbolId(2)).unwrap().instrument, Instrument::Perpetual);
    }

    #[test]
    fn bad_magic_is_rejected() {
        let buf = [0u8; 16];
        let err = SymbolRegistry::read_from(&buf[..]).unwrap_err();
        assert!(matches!(err, RegistryError::BadMagic { .. }));
    }

    #[test]
    fn v1_record_defaults_tick_size_and_reports_info() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&MAGIC.to_le_bytes());
        buf.extend_from_slice(&1u32.to_le_bytes()); // version 1
        buf.extend_from_slice(&1u32.to_le_bytes()); // count
        buf.extend_from_slice(&5u32.to_le_bytes()); // symbol id
        buf.extend_from_slice(&9u16.to_le_bytes()); // exchange id
        buf.push(0); // Spot
        let name = b"XBT";
        buf.extend_from_slice(&(name.len() as u16).to_le_bytes());
        buf.extend_from_slice(name);

        let (reg, issues) = SymbolRegistry::read_from(&buf[..]).unwrap();
        assert_eq!(issues.len(), 1);
        assert_eq!(reg.resolve(SymbolId(5)).unwrap().tick_size, Price::ZERO);
    }
}
