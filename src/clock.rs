//! The `IClock` collaborator interface and its two implementations: a
//! real wall-clock and a simulated clock for backtesting.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Nanoseconds since the Unix epoch.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Debug, Default)]
#[serde(transparent)]
pub struct UnixNanos(pub u64);

impl UnixNanos {
    pub const ZERO: UnixNanos = UnixNanos(0);

    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl std::ops::Sub for UnixNanos {
    type Output = u64;
    fn sub(self, rhs: Self) -> u64 {
        self.0.saturating_sub(rhs.0)
    }
}

impl std::ops::Add<u64> for UnixNanos {
    type Output = UnixNanos;
    fn add(self, rhs: u64) -> UnixNanos {
        UnixNanos(self.0 + rhs)
    }
}

/// A clock. A simulated clock must never report a time earlier than one it
/// has already reported.
pub trait IClock: Send + Sync {
    /// The current time.
    fn now_ns(&self) -> UnixNanos;

    /// Advances the clock to (at least) `to`. Implementations that track
    /// real wall-clock time may treat this as a no-op.
    fn advance_to(&self, to: UnixNanos);
}

/// Reads the OS wall clock. `advance_to` is a no-op: real time cannot be
/// steered.
#[derive(Debug, Default)]
pub struct SystemClock;

impl IClock for SystemClock {
    fn now_ns(&self) -> UnixNanos {
        let dur = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        UnixNanos(dur.as_nanos() as u64)
    }

    fn advance_to(&self, _to: UnixNanos) {}
}

/// A clock driven entirely by [`SimClock::advance_to`], used by the
/// backtest runner to replay recorded timestamps. Monotonic: advancing to
/// an earlier time than the current value is a no-op rather than an error,
/// since out-of-order timestamps in a feed are a decode-layer concern
/// (surfaced there), not a clock-layer panic.
#[derive(Debug, Default)]
pub struct SimClock {
    now: AtomicU64,
}

impl SimClock {
    #[must_use]
    pub fn new(start: UnixNanos) -> Self {
        Self {
            now: AtomicU64::new(start.0),
        }
    }
}

impl IClock for SimClock {
    fn now_ns(&self) -> UnixNanos {
        UnixNanos(self.now.load(Ordering::Acquire))
    }

    fn advance_to(&self, to: UnixNanos) {
        self.now.fetch_max(to.0, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sim_clock_never_goes_backwards() {
        let clock = SimClock::new(UnixNanos(100));
        clock.advance_to(UnixNanos(200));
        clock.advance_to(UnixNanos(50));
        assert_eq!(clock.now_ns(), UnixNanos(200));
    }
}
