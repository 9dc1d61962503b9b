//! The plain configuration struct the core consumes. No file or
//! environment parsing lives here — per §6, "No environment variables
//! are read inside the core" — loading `EngineConfig` from TOML/JSON/env
//! is an embedding application's job; this type only needs to be
//! `Serialize`/`Deserialize` so that job is possible.

use crate::bus::ComponentType;
use serde::{Deserialize, Serialize};

/// Default power-of-two ring capacity for a [`crate::bus::BroadcastBus`].
pub const DEFAULT_BUS_CAPACITY: usize = 4096;
/// Default maximum number of subscribers a single bus accepts.
pub const DEFAULT_MAX_CONSUMERS: usize = 128;
/// Default `.floxlog` segment rotation size.
pub const DEFAULT_MAX_SEGMENT_BYTES: u64 = 256 * 1024 * 1024;
/// Default number of events between index entries.
pub const DEFAULT_INDEX_INTERVAL: u32 = 100;

/// Realtime scheduling priority assigned to a bus consumer thread by the
/// [`ComponentType`] it was registered under, per §6's priority table.
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Debug)]
pub struct PriorityTable {
    pub market_data: u8,
    pub execution: u8,
    pub strategy: u8,
    pub risk: u8,
    pub general: u8,
}

impl Default for PriorityTable {
    fn default() -> Self {
        Self {
            market_data: ComponentType::MarketData.priority(),
            execution: ComponentType::Execution.priority(),
            strategy: ComponentType::Strategy.priority(),
            risk: ComponentType::Risk.priority(),
            general: ComponentType::General.priority(),
        }
    }
}

impl PriorityTable {
    #[must_use]
    pub const fn for_component(&self, component: ComponentType) -> u8 {
        match component {
            ComponentType::MarketData => self.market_data,
            ComponentType::Execution => self.execution,
            ComponentType::Strategy => self.strategy,
            ComponentType::Risk => self.risk,
            ComponentType::General => self.general,
        }
    }
}

/// Compression algorithm a `.floxlog` segment writer may apply to event
/// blocks.
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Debug, Default)]
pub enum CompressionKind {
    #[default]
    None,
    Lz4,
}

/// Segment writer tuning knobs.
#[derive(Clone, PartialEq, Serialize, Deserialize, Debug)]
pub struct SegmentConfig {
    pub max_segment_bytes: u64,
    pub compression: CompressionKind,
    /// Events between index entries; `0` disables indexing.
    pub index_interval: u32,
    /// Maximum events buffered into one compressed block before flushing.
    pub compression_block_events: u32,
    /// Maximum bytes buffered into one compressed block before flushing.
    pub compression_block_bytes: u32,
    pub fsync_on_rotate: bool,
    pub verify_crc_on_read: bool,
}

impl Default for SegmentConfig {
    fn default() -> Self {
        Self {
            max_segment_bytes: DEFAULT_MAX_SEGMENT_BYTES,
            compression: CompressionKind::None,
            index_interval: DEFAULT_INDEX_INTERVAL,
            compression_block_events: 4096,
            compression_block_bytes: 1024 * 1024,
            fsync_on_rotate: true,
            verify_crc_on_read: true,
        }
    }
}

/// Top-level configuration consumed by the engine and its subsystems.
#[derive(Clone, PartialEq, Serialize, Deserialize, Debug)]
pub struct EngineConfig {
    pub bus_capacity: usize,
    pub max_consumers: usize,
    pub priorities: PriorityTable,
    pub segment: SegmentConfig,
    /// Enables per-consumer CPU core pinning (no-op without the
    /// `affinity` feature; disabling it never changes correctness).
    pub enable_affinity: bool,
    /// Enables `drain-on-stop` semantics on buses the engine constructs.
    pub drain_on_stop: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            bus_capacity: DEFAULT_BUS_CAPACITY,
            max_consumers: DEFAULT_MAX_CONSUMERS,
            priorities: PriorityTable::default(),
            segment: SegmentConfig::default(),
            enable_affinity: false,
            drain_on_stop: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_round_trips_through_json() {
        let cfg = EngineConfig::default();
        let json = serde_json::to_string(&cfg).unwrap();
        let back: EngineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(cfg, back);
    }
}
