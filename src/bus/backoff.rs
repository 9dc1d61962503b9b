//! Adaptive busy-wait: spin, then yield, then sleep. Used symmetrically by
//! the producer (waiting for ring space) and consumers (waiting for data).

use std::hint;
use std::thread;
use std::time::Duration;

const SPIN_LIMIT: u32 = 100;
const YIELD_LIMIT: u32 = 200;
const SLEEP_STEP: Duration = Duration::from_micros(1);
const SLEEP_CAP: Duration = Duration::from_micros(200);

/// Tracks how long a wait loop has been spinning and escalates the delay
/// it recommends: ~100 `spin_loop` hints, then ~100 cooperative
/// `thread::yield_now`, then microsecond sleeps growing to a cap.
#[derive(Default)]
pub struct AdaptiveWait {
    attempts: u32,
}

impl AdaptiveWait {
    #[must_use]
    pub fn new() -> Self {
        Self { attempts: 0 }
    }

    /// Performs one wait step and advances internal state.
    pub fn wait(&mut self) {
        self.attempts += 1;
        if self.attempts <= SPIN_LIMIT {
            hint::spin_loop();
        } else if self.attempts <= YIELD_LIMIT {
            thread::yield_now();
        } else {
            let steps = self.attempts - YIELD_LIMIT;
            let dur = (SLEEP_STEP * steps).min(SLEEP_CAP);
            thread::sleep(dur);
        }
    }

    /// Resets to the spin phase, for reuse across independent wait loops.
    pub fn reset(&mut self) {
        self.attempts = 0;
    }
}
