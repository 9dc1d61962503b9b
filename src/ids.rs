//! Process-wide identifiers used throughout the pipeline.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies a tradable instrument within this process.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Debug, Default)]
#[serde(transparent)]
pub struct SymbolId(pub u32);

impl fmt::Display for SymbolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sym#{}", self.0)
    }
}

/// Identifies a single order.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Debug)]
#[serde(transparent)]
pub struct OrderId(pub u64);

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "order#{}", self.0)
    }
}

/// Identifies an exchange venue. `0xFFFF` is the reserved "invalid" sentinel.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Debug)]
#[serde(transparent)]
pub struct ExchangeId(pub u16);

impl ExchangeId {
    /// The sentinel value meaning "no exchange" / "unresolved".
    pub const INVALID: ExchangeId = ExchangeId(0xFFFF);

    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.0 != Self::INVALID.0
    }
}

/// Identifies a bus subscriber, unique across the process. Conventionally
/// the address of the subscriber's listener, but any process-unique value
/// works.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Debug)]
#[serde(transparent)]
pub struct SubscriberId(pub u64);

impl SubscriberId {
    /// Derives a subscriber id from the address of `value`. Two distinct
    /// listener objects never compare equal; dropping and re-subscribing
    /// the same listener address (unusual but possible) reuses the id.
    #[must_use]
    pub fn of<T: ?Sized>(value: &T) -> Self {
        Self(value as *const T as *const () as u64)
    }
}

/// The kind of bar a [`TimeframeId`] describes.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Debug)]
#[repr(u8)]
pub enum BarKind {
    Time = 0,
    Tick = 1,
    Volume = 2,
    Renko = 3,
    Range = 4,
}

impl BarKind {
    const fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Self::Time),
            1 => Some(Self::Tick),
            2 => Some(Self::Volume),
            3 => Some(Self::Renko),
            4 => Some(Self::Range),
            _ => None,
        }
    }
}

/// Identity of a bar stream: a 4-bit [`BarKind`] tag packed with a 28-bit
/// parameter (interval in seconds, tick count, volume threshold, brick
/// size in ticks, or range in ticks, depending on `kind`).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Debug)]
pub struct TimeframeId {
    kind: BarKind,
    param: u32,
}

const PARAM_MASK: u32 = 0x0FFF_FFFF;

impl TimeframeId {
    /// Builds a `TimeframeId`. `param` is truncated to 28 bits.
    #[must_use]
    pub fn new(kind: BarKind, param: u32) -> Self {
        Self {
            kind,
            param: param & PARAM_MASK,
        }
    }

    #[must_use]
    pub const fn kind(&self) -> BarKind {
        self.kind
    }

    #[must_use]
    pub const fn param(&self) -> u32 {
        self.param
    }

    /// Packs into a single `u32`: top 4 bits are the kind tag, low 28 bits
    /// are the parameter.
    #[must_use]
    pub fn to_raw(&self) -> u32 {
        ((self.kind as u32) << 28) | (self.param & PARAM_MASK)
    }

    /// Unpacks a raw `u32` produced by [`Self::to_raw`]. Returns `None` if
    /// the tag nibble does not map to a known [`BarKind`].
    #[must_use]
    pub fn from_raw(raw: u32) -> Option<Self> {
        let tag = (raw >> 28) as u8;
        let kind = BarKind::from_u8(tag)?;
        Some(Self {
            kind,
            param: raw & PARAM_MASK,
        })
    }
}

impl fmt::Display for TimeframeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self.kind {
            BarKind::Time => "time",
            BarKind::Tick => "tick",
            BarKind::Volume => "volume",
            BarKind::Renko => "renko",
            BarKind::Range => "range",
        };
        write!(f, "{label}-{}", self.param)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeframe_id_round_trips_through_raw() {
        for (kind, param) in [
            (BarKind::Time, 60u32),
            (BarKind::Tick, 100),
            (BarKind::Volume, 1_000_000),
            (BarKind::Renko, 5),
            (BarKind::Range, 20),
        ] {
            let tf = TimeframeId::new(kind, param);
            let raw = tf.to_raw();
            assert_eq!(TimeframeId::from_raw(raw), Some(tf));
        }
    }

    #[test]
    fn exchange_id_invalid_sentinel() {
        assert!(!ExchangeId::INVALID.is_valid());
        assert!(ExchangeId(1).is_valid());
    }
}
