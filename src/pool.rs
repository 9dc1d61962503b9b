//! Reference-counted object pool for variable-size pooled events.
//!
//! `BookUpdate` carries `Vec`s whose capacity is worth preserving across
//! reuse, so (unlike the fixed-size, unpooled `TradeEvent`/`BarEvent`) it is
//! acquired from a fixed-capacity pool of pre-allocated slots addressed by a
//! reference-counted handle. A slot's destructor (`PoolReset::clear`) runs
//! exactly once, when the last handle referencing it drops, and the slot is
//! then returned to the free list for reuse — never before every consumer
//! has released it.

use crossbeam::queue::SegQueue;
use std::cell::UnsafeCell;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Implemented by pooled payload types to reset themselves to an empty,
/// reusable state without releasing backing allocations (e.g. a `Vec`'s
/// capacity survives a `clear()`).
pub trait PoolReset: Default {
    fn clear(&mut self);
}

struct Slot<T> {
    value: UnsafeCell<T>,
    refcount: AtomicUsize,
}

// SAFETY: access to `value` is governed entirely by `refcount`: the pool
// only hands out a `&mut T` when creating a fresh handle (refcount 0 -> 1,
// no other handle can exist), and only readers holding a live `PoolHandle`
// dereference it afterwards. Concurrent readers never produce a `&mut`.
unsafe impl<T> Sync for Slot<T> {}

struct PoolInner<T> {
    slots: Box<[Slot<T>]>,
    free: SegQueue<usize>,
}

/// A fixed-capacity pool of reusable `T` slots, addressed by index.
pub struct ObjectPool<T: PoolReset> {
    inner: Arc<PoolInner<T>>,
}

impl<T: PoolReset> Clone for ObjectPool<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: PoolReset> ObjectPool<T> {
    /// Builds a pool of `capacity` pre-allocated, default-valued slots.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        let free = SegQueue::new();
        for i in 0..capacity {
            slots.push(Slot {
                value: UnsafeCell::new(T::default()),
                refcount: AtomicUsize::new(0),
            });
            free.push(i);
        }
        Self {
            inner: Arc::new(PoolInner {
                slots: slots.into_boxed_slice(),
                free,
            }),
        }
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.inner.slots.len()
    }

    /// Number of slots currently checked out.
    #[must_use]
    pub fn in_use(&self) -> usize {
        self.capacity() - self.inner.free.len()
    }

    /// Acquires a free slot and hands the caller a fresh, refcount-1
    /// handle to populate. Returns `None` if every slot is checked out.
    pub fn acquire(&self) -> Option<PoolHandle<T>> {
        let idx = self.inner.free.pop()?;
        let slot = &self.inner.slots[idx];
        debug_assert_eq!(slot.refcount.load(Ordering::Acquire), 0);
        slot.refcount.store(1, Ordering::Release);
        Some(PoolHandle {
            inner: Arc::clone(&self.inner),
            idx,
        })
    }
}

/// A reference-counted handle into an [`ObjectPool`] slot. Cloning
/// increments the slot's refcount; dropping the last clone calls
/// [`PoolReset::clear`] on the slot and returns it to the free list.
pub struct PoolHandle<T: PoolReset> {
    inner: Arc<PoolInner<T>>,
    idx: usize,
}

impl<T: PoolReset> PoolHandle<T> {
    fn slot(&self) -> &Slot<T> {
        &self.inner.slots[self.idx]
    }

    /// Current refcount. Exposed for invariant tests only.
    #[must_use]
    pub fn refcount(&self) -> usize {
        self.slot().refcount.load(Ordering::Acquire)
    }
}

impl<T: PoolReset> Clone for PoolHandle<T> {
    fn clone(&self) -> Self {
        self.slot().refcount.fetch_add(1, Ordering::AcqRel);
        Self {
            inner: Arc::clone(&self.inner),
            idx: self.idx,
        }
    }
}

impl<T: PoolReset> Deref for PoolHandle<T> {
    type Target = T;
    fn deref(&self) -> &T {
        // SAFETY: this handle holds one of the live refcounts; no `&mut`
        // can exist concurrently since the last one is only taken below,
        // after the refcount reaches zero and no handle remains to race.
        unsafe { &*self.slot().value.get() }
    }
}

impl<T: PoolReset> DerefMut for PoolHandle<T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: `&mut self` proves this is the only reference path a
        // caller can use to mutate through; pooled data races across
        // clones are a caller bug the same as any other shared `&mut`.
        unsafe { &mut *self.slot().value.get() }
    }
}

impl<T: PoolReset> Drop for PoolHandle<T> {
    fn drop(&mut self) {
        if self.slot().refcount.fetch_sub(1, Ordering::AcqRel) == 1 {
            // SAFETY: refcount just reached zero under this drop; no other
            // handle to this slot exists, so exclusive access is sound.
            unsafe { &mut *self.slot().value.get() }.clear();
            self.inner.free.push(self.idx);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Counter(u32);

    impl PoolReset for Counter {
        fn clear(&mut self) {
            self.0 = 0;
        }
    }

    #[test]
    fn acquire_exhausts_capacity_then_reclaims_on_drop() {
        let pool: ObjectPool<Counter> = ObjectPool::new(2);
        let a = pool.acquire().unwrap();
        let b = pool.acquire().unwrap();
        assert!(pool.acquire().is_none());
        drop(a);
        let c = pool.acquire();
        assert!(c.is_some());
        drop(b);
        drop(c);
        assert_eq!(pool.in_use(), 0);
    }

    #[test]
    fn clone_keeps_slot_alive_until_last_drop() {
        let pool: ObjectPool<Counter> = ObjectPool::new(1);
        let mut h = pool.acquire().unwrap();
        h.0 = 7;
        let h2 = h.clone();
        assert_eq!(h2.refcount(), 2);
        drop(h);
        assert_eq!(pool.in_use(), 1);
        assert_eq!(h2.0, 7);
        drop(h2);
        assert_eq!(pool.in_use(), 0);

        let reused = pool.acquire().unwrap();
        assert_eq!(reused.0, 0, "clear() must run before reuse");
    }
}
