//! The raw ring storage: `capacity` pre-allocated slots plus a parallel
//! array of published-sequence stamps. No gating logic lives here — that
//! is [`super::BroadcastBus`]'s job. This type only knows how to place an
//! event at `seq & mask` and hand back a reference once its stamp is set.

use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicI64, Ordering};

/// Sentinel meaning "this slot has never been written".
pub const EMPTY: i64 = -1;

pub struct Ring<E> {
    mask: i64,
    slots: Box<[UnsafeCell<MaybeUninit<E>>]>,
    /// `published[i]` holds the sequence number currently occupying slot
    /// `i`, or [`EMPTY`]. Writers store with `Release`; readers load with
    /// `Acquire` before touching `slots[i]`.
    published: Box<[AtomicI64]>,
}

// SAFETY: `slots` is only ever mutated by the single producer thread (via
// `write`), and only ever read by a consumer thread after observing the
// matching `published` stamp with Acquire ordering — which happens-after
// the producer's Release store in `write`. No two threads touch the same
// slot without that synchronization edge.
unsafe impl<E: Send> Sync for Ring<E> {}

impl<E> Drop for Ring<E> {
    fn drop(&mut self) {
        for idx in 0..self.slots.len() {
            if self.published[idx].load(Ordering::Relaxed) != EMPTY {
                // SAFETY: a non-EMPTY stamp means this slot's last `write`
                // left an initialized value in it, and nothing else can be
                // concurrently touching it while `self` is being dropped.
                unsafe { (*self.slots[idx].get()).assume_init_drop() };
            }
        }
    }
}

impl<E> Ring<E> {
    /// `capacity` must be a power of two.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity.is_power_of_two(), "ring capacity must be a power of two");
        let mut slots = Vec::with_capacity(capacity);
        let mut published = Vec::with_capacity(capacity);
        for _ in 0..capacity {
            slots.push(UnsafeCell::new(MaybeUninit::uninit()));
            published.push(AtomicI64::new(EMPTY));
        }
        Self {
            mask: capacity as i64 - 1,
            slots: slots.into_boxed_slice(),
            published: published.into_boxed_slice(),
        }
    }

    #[must_use]
    pub fn capacity(&self) -> i64 {
        self.mask + 1
    }

    fn index(&self, seq: i64) -> usize {
        (seq & self.mask) as usize
    }

    /// Places `event` at `seq`'s slot and publishes it with `Release`.
    ///
    /// If the slot already held a previous lap's event, that event is
    /// dropped in place first — a slot is destructed exactly when the
    /// producer reclaims it, which gating guarantees is only after every
    /// consumer (required and optional) has advanced past it.
    ///
    /// # Safety
    /// The caller (the single producer) must have already confirmed, via
    /// gating, that no consumer is still reading the slot's previous
    /// occupant.
    pub unsafe fn write(&self, seq: i64, event: E) {
        let idx = self.index(seq);
        let cell = &mut *self.slots[idx].get();
        if self.published[idx].load(Ordering::Relaxed) != EMPTY {
            cell.assume_init_drop();
        }
        cell.write(event);
        self.published[idx].store(seq, Ordering::Release);
    }

    /// Returns the sequence currently published at `seq`'s slot index,
    /// which equals `seq` once the producer's write for that exact lap is
    /// visible, or a different value if the slot holds a stale or not-yet
    /// written lap.
    pub fn published_at(&self, seq: i64) -> i64 {
        let idx = self.index(seq);
        self.published[idx].load(Ordering::Acquire)
    }

    /// Reads the event at `seq`. Caller must first confirm
    /// `published_at(seq) == seq`.
    ///
    /// # Safety
    /// Valid only while the slot still holds lap `seq`'s data — i.e.
    /// called promptly after observing `published_at(seq) == seq`, before
    /// the producer can have lapped the buffer again (guaranteed by bus
    /// gating for any consumer still being gated on).
    pub unsafe fn read(&self, seq: i64) -> &E {
        let idx = self.index(seq);
        (*self.slots[idx].get()).assume_init_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    struct DropCounter(Arc<AtomicUsize>);

    impl Drop for DropCounter {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn overwriting_a_slot_drops_its_previous_occupant() {
        let drops = Arc::new(AtomicUsize::new(0));
        let ring: Ring<DropCounter> = Ring::new(2);
        unsafe {
            ring.write(0, DropCounter(drops.clone()));
            ring.write(1, DropCounter(drops.clone()));
            assert_eq!(drops.load(Ordering::SeqCst), 0);
            // Laps back onto slot 0 — must drop the first occupant first.
            ring.write(2, DropCounter(drops.clone()));
            assert_eq!(drops.load(Ordering::SeqCst), 1);
        }
        drop(ring);
        assert_eq!(drops.load(Ordering::SeqCst), 3, "dropping the ring must drop every live slot exactly once");
    }

    #[test]
    fn dropping_an_empty_ring_does_not_panic() {
        let ring: Ring<DropCounter> = Ring::new(4);
        drop(ring);
    }
}
