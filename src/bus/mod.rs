//! The broadcast bus: one logical producer, up to `max_consumers`
//! registered subscribers, each driven by its own thread, all observing
//! events in the exact order they were published.
//!
//! Gating follows the classic single-producer ring buffer: the producer
//! may not overwrite a slot until every consumer still gating on it has
//! moved past the lap that currently occupies it. Required consumers
//! always gate. An optional consumer gates too, as long as it is keeping
//! up; the moment it falls more than one full lap behind, it is marked
//! "lagged" (a [`tracing::warn!`] is emitted), dropped from gating, and
//! fast-forwarded to the producer's current position — satisfying both
//! halves of the contract: an optional consumer never blocks the producer
//! indefinitely, yet normally participates in the same safety gating a
//! required consumer does.

mod affinity;
mod backoff;
mod ring;

pub use affinity::ComponentType;
pub use backoff::AdaptiveWait;

use ring::Ring;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Implemented by anything that wants to observe a bus's events. Runs on
/// the bus's dedicated consumer thread for this subscription; must not
/// panic (a panic unwinds that thread only, silently ending delivery to
/// this subscriber — not a partial-state hazard for the bus itself, but
/// almost certainly a bug in the listener).
pub trait BusConsumer<E>: Send + Sync {
    fn on_event(&self, seq: i64, event: &E);
}

/// Outcome of [`BroadcastBus::try_publish`].
#[derive(Debug)]
pub enum TryPublishOutcome {
    Success(i64),
    Timeout,
    Stopped,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[repr(u8)]
enum BusState {
    Configuring = 0,
    Running = 1,
    Stopping = 2,
    Stopped = 3,
}

impl BusState {
    const fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Configuring,
            1 => Self::Running,
            2 => Self::Stopping,
            _ => Self::Stopped,
        }
    }
}

struct Subscription<E> {
    listener: Arc<dyn BusConsumer<E>>,
    required: bool,
    component: ComponentType,
    /// Highest sequence this subscriber has fully processed, or -1.
    consumed: Arc<AtomicI64>,
    /// Set once an optional consumer has fallen more than one lap behind
    /// and been dropped from gating.
    lagged: Arc<AtomicBool>,
}

/// A typed broadcast queue. See the module docs for the gating contract.
pub struct BroadcastBus<E: Send + Sync + 'static> {
    ring: Arc<Ring<E>>,
    capacity: i64,
    max_consumers: usize,
    next_seq: Arc<AtomicI64>,
    subscriptions: Mutex<Vec<Subscription<E>>>,
    threads: Mutex<Vec<JoinHandle<()>>>,
    state: Arc<AtomicU8>,
    drain_on_stop: bool,
}

impl<E: Send + Sync + 'static> BroadcastBus<E> {
    /// `capacity` must be a power of two.
    #[must_use]
    pub fn new(capacity: usize, max_consumers: usize, drain_on_stop: bool) -> Self {
        Self {
            ring: Arc::new(Ring::new(capacity)),
            capacity: capacity as i64,
            max_consumers,
            next_seq: Arc::new(AtomicI64::new(0)),
            subscriptions: Mutex::new(Vec::new()),
            threads: Mutex::new(Vec::new()),
            state: Arc::new(AtomicU8::new(BusState::Configuring as u8)),
            drain_on_stop,
        }
    }

    fn state(&self) -> BusState {
        BusState::from_u8(self.state.load(Ordering::Acquire))
    }

    #[must_use]
    pub fn is_stopped(&self) -> bool {
        matches!(self.state(), BusState::Stopping | BusState::Stopped)
    }

    /// Registers a listener. Must be called before [`Self::start`]; fails
    /// if the bus is already running/stopped or at `max_consumers`
    /// capacity.
    pub fn subscribe(&self, listener: Arc<dyn BusConsumer<E>>, required: bool, component: ComponentType) -> bool {
        if self.state() != BusState::Configuring {
            return false;
        }
        let mut subs = self.subscriptions.lock().expect("bus subscriptions poisoned");
        if subs.len() >= self.max_consumers {
            return false;
        }
        subs.push(Subscription {
            listener,
            required,
            component,
            consumed: Arc::new(AtomicI64::new(-1)),
            lagged: Arc::new(AtomicBool::new(false)),
        });
        true
    }

    /// The minimum consumed sequence across every consumer still gating
    /// (required, or optional-and-not-yet-lagged). `i64::MAX` if no
    /// consumer gates (nothing to wait for).
    fn min_gating_consumed(&self, subs: &[Subscription<E>]) -> i64 {
        subs.iter()
            .filter(|s| s.required || !s.lagged.load(Ordering::Acquire))
            .map(|s| s.consumed.load(Ordering::Acquire))
            .min()
            .unwrap_or(i64::MAX)
    }

    /// The minimum consumed sequence across required consumers only.
    /// `i64::MAX` if there are none.
    fn min_required_consumed(&self, subs: &[Subscription<E>]) -> i64 {
        subs.iter()
            .filter(|s| s.required)
            .map(|s| s.consumed.load(Ordering::Acquire))
            .min()
            .unwrap_or(i64::MAX)
    }

    /// Spawns one consumer thread per registered subscriber.
    pub fn start(&self) -> bool {
        if self
            .state
            .compare_exchange(
                BusState::Configuring as u8,
                BusState::Running as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            return false;
        }
        let subs = self.subscriptions.lock().expect("bus subscriptions poisoned");
        let mut threads = self.threads.lock().expect("bus threads poisoned");
        for (idx, sub) in subs.iter().enumerate() {
            let ring = Arc::clone(&self.ring);
            let capacity = self.capacity;
            let listener = Arc::clone(&sub.listener);
            let required = sub.required;
            let component = sub.component;
            let consumed = Arc::clone(&sub.consumed);
            let lagged = Arc::clone(&sub.lagged);
            let next_seq_flag = Arc::clone(&self.next_seq);
            let stopping = Arc::clone(&self.state);
            threads.push(
                std::thread::Builder::new()
                    .name(format!("flox-bus-consumer-{idx}"))
                    .spawn(move || {
                        run_consumer(
                            ring, capacity, listener, required, component, idx, consumed, lagged, next_seq_flag,
                            stopping,
                        );
                    })
                    .expect("failed to spawn bus consumer thread"),
            );
        }
        true
    }

    /// Reserves the next publish sequence, or `None` if doing so would
    /// overflow `i64` — at which point the bus is latched into the
    /// `Stopped` state, since a wrapped sequence would break the
    /// strictly-monotonic-per-publish invariant for every consumer.
    fn reserve_seq(&self) -> Option<i64> {
        loop {
            let current = self.next_seq.load(Ordering::Acquire);
            if current == i64::MAX {
                self.state.store(BusState::Stopped as u8, Ordering::Release);
                return None;
            }
            if self
                .next_seq
                .compare_exchange(current, current + 1, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return Some(current);
            }
        }
    }

    /// Blocks until a free slot exists, writes `event`, and returns the
    /// assigned sequence. Returns -1 if the bus is stopped, including the
    /// (practically unreachable) case where the next sequence would
    /// overflow `i64`.
    pub fn publish(&self, event: E) -> i64 {
        if self.is_stopped() {
            return -1;
        }
        let Some(seq) = self.reserve_seq() else {
            return -1;
        };
        let mut waiter = AdaptiveWait::new();
        loop {
            let subs = self.subscriptions.lock().expect("bus subscriptions poisoned");
            let min_gate = self.min_gating_consumed(&subs);
            drop(subs);
            if min_gate >= seq - self.capacity {
                break;
            }
            if self.is_stopped() {
                return -1;
            }
            waiter.wait();
        }
        // SAFETY: gating above confirmed every tracked consumer has moved
        // past this slot's previous occupant.
        unsafe {
            self.ring.write(seq, event);
        }
        seq
    }

    /// Like [`Self::publish`] but bounded by `timeout`.
    pub fn try_publish(&self, event: E, timeout: Duration) -> TryPublishOutcome {
        if self.is_stopped() {
            return TryPublishOutcome::Stopped;
        }
        let Some(seq) = self.reserve_seq() else {
            return TryPublishOutcome::Stopped;
        };
        let deadline = Instant::now() + timeout;
        let mut waiter = AdaptiveWait::new();
        loop {
            let subs = self.subscriptions.lock().expect("bus subscriptions poisoned");
            let min_gate = self.min_gating_consumed(&subs);
            drop(subs);
            if min_gate >= seq - self.capacity {
                break;
            }
            if self.is_stopped() {
                return TryPublishOutcome::Stopped;
            }
            if Instant::now() >= deadline {
                return TryPublishOutcome::Timeout;
            }
            waiter.wait();
        }
        // SAFETY: see `publish`.
        unsafe {
            self.ring.write(seq, event);
        }
        TryPublishOutcome::Success(seq)
    }

    /// Blocks until every required consumer has processed at least `seq`.
    pub fn wait_consumed(&self, seq: i64) {
        let mut waiter = AdaptiveWait::new();
        loop {
            let subs = self.subscriptions.lock().expect("bus subscriptions poisoned");
            let min_required = self.min_required_consumed(&subs);
            drop(subs);
            if min_required == i64::MAX || min_required >= seq {
                return;
            }
            waiter.wait();
        }
    }

    /// Blocks until every published event has been consumed by every
    /// (non-lagged) consumer, required or optional.
    pub fn flush(&self) {
        let last_published = self.next_seq.load(Ordering::Acquire) - 1;
        if last_published < 0 {
            return;
        }
        let mut waiter = AdaptiveWait::new();
        loop {
            let subs = self.subscriptions.lock().expect("bus subscriptions poisoned");
            let min_gate = self.min_gating_consumed(&subs);
            drop(subs);
            if min_gate >= last_published {
                return;
            }
            waiter.wait();
        }
    }

    /// Requests a pause at the next event boundary for every consumer
    /// thread, optionally draining in-flight events first, then joins all
    /// consumer threads.
    pub fn stop(&self) {
        if self
            .state
            .compare_exchange(
                BusState::Running as u8,
                BusState::Stopping as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            return;
        }
        if self.drain_on_stop {
            self.flush();
        }
        let mut threads = self.threads.lock().expect("bus threads poisoned");
        for handle in threads.drain(..) {
            let _ = handle.join();
        }
        self.state.store(BusState::Stopped as u8, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    struct Recorder {
        seen: Mutex<Vec<(i64, u32)>>,
    }

    impl Recorder {
        fn new() -> Arc<Self> {
            Arc::new(Self { seen: Mutex::new(Vec::new()) })
        }

        fn snapshot(&self) -> Vec<(i64, u32)> {
            self.seen.lock().expect("recorder poisoned").clone()
        }
    }

    impl BusConsumer<u32> for Recorder {
        fn on_event(&self, seq: i64, event: &u32) {
            self.seen.lock().expect("recorder poisoned").push((seq, *event));
        }
    }

    struct SlowRecorder {
        recorder: Arc<Recorder>,
        delay: Duration,
    }

    impl BusConsumer<u32> for SlowRecorder {
        fn on_event(&self, seq: i64, event: &u32) {
            std::thread::sleep(self.delay);
            self.recorder.on_event(seq, event);
        }
    }

    #[test]
    fn fifo_delivery_in_publish_order() {
        let bus: BroadcastBus<u32> = BroadcastBus::new(8, 4, false);
        let a = Recorder::new();
        let b = Recorder::new();
        assert!(bus.subscribe(a.clone(), true, ComponentType::Strategy));
        assert!(bus.subscribe(b.clone(), true, ComponentType::MarketData));
        assert!(bus.start());

        let mut seqs = Vec::new();
        for i in 0..50u32 {
            seqs.push(bus.publish(i));
        }
        let last = *seqs.last().unwrap();
        bus.wait_consumed(last);
        bus.stop();

        for rec in [&a, &b] {
            let seen = rec.snapshot();
            assert_eq!(seen.len(), 50);
            for (idx, (seq, value)) in seen.iter().enumerate() {
                assert_eq!(*seq, idx as i64);
                assert_eq!(*value, idx as u32);
            }
        }
    }

    #[test]
    fn no_loss_with_drain_on_stop() {
        let bus: BroadcastBus<u32> = BroadcastBus::new(4, 2, true);
        let recorder = Recorder::new();
        let slow = Arc::new(SlowRecorder { recorder: recorder.clone(), delay: Duration::from_micros(200) });
        assert!(bus.subscribe(slow, true, ComponentType::General));
        assert!(bus.start());

        for i in 0..100u32 {
            bus.publish(i);
        }
        bus.stop();

        let seen = recorder.snapshot();
        assert_eq!(seen.len(), 100, "drain-on-stop must deliver every published event");
        for (idx, (seq, value)) in seen.iter().enumerate() {
            assert_eq!(*seq, idx as i64);
            assert_eq!(*value, idx as u32);
        }
    }

    #[test]
    fn optional_lagging_consumer_never_blocks_producer() {
        let bus: BroadcastBus<u32> = BroadcastBus::new(4, 2, false);
        let slow = Arc::new(SlowRecorder {
            recorder: Recorder::new(),
            delay: Duration::from_millis(50),
        });
        assert!(bus.subscribe(slow, false, ComponentType::General));
        assert!(bus.start());

        let start = Instant::now();
        for i in 0..64u32 {
            bus.publish(i);
        }
        // A required consumer falling this far behind would have forced
        // the producer to block for the full backlog; an optional one
        // must not, even though it is provably still on the first event.
        assert!(start.elapsed() < Duration::from_millis(500));
        bus.stop();
    }

    #[test]
    fn try_publish_times_out_on_a_full_ring() {
        let bus: BroadcastBus<u32> = BroadcastBus::new(2, 1, false);
        let recorder = Arc::new(SlowRecorder { recorder: Recorder::new(), delay: Duration::from_secs(3600) });
        assert!(bus.subscribe(recorder, true, ComponentType::General));
        assert!(bus.start());

        // Fill the ring; the required consumer is asleep and will not
        // advance past slot 0 within the test's lifetime.
        assert!(matches!(bus.try_publish(1, Duration::from_millis(50)), TryPublishOutcome::Success(0)));
        assert!(matches!(bus.try_publish(2, Duration::from_millis(50)), TryPublishOutcome::Success(1)));
        let outcome = bus.try_publish(3, Duration::from_millis(20));
        assert!(matches!(outcome, TryPublishOutcome::Timeout));
    }

    #[test]
    fn subscribe_after_start_fails() {
        let bus: BroadcastBus<u32> = BroadcastBus::new(4, 4, false);
        assert!(bus.start());
        assert!(!bus.subscribe(Recorder::new(), true, ComponentType::General));
    }

    #[test]
    fn publish_sequence_overflow_is_detected_and_stops_the_bus() {
        let bus: BroadcastBus<u32> = BroadcastBus::new(4, 4, false);
        assert!(bus.start());
        bus.next_seq.store(i64::MAX, Ordering::Release);

        assert_eq!(bus.publish(1), -1);
        assert!(bus.is_stopped());
        assert!(matches!(bus.try_publish(2, Duration::from_millis(10)), TryPublishOutcome::Stopped));
    }
}

#[allow(clippy::too_many_arguments)]
fn run_consumer<E: Send + Sync + 'static>(
    ring: Arc<Ring<E>>,
    capacity: i64,
    listener: Arc<dyn BusConsumer<E>>,
    required: bool,
    component: ComponentType,
    idx: usize,
    consumed: Arc<AtomicI64>,
    lagged: Arc<AtomicBool>,
    producer_next: Arc<AtomicI64>,
    state: Arc<AtomicU8>,
) {
    affinity::pin_current_thread(component, idx);
    let mut expected: i64 = 0;
    let mut waiter = AdaptiveWait::new();
    loop {
        let stamp = ring.published_at(expected);
        if stamp == expected {
            // SAFETY: stamp matches the lap we expect; the producer
            // cannot have overwritten it again because gating (for a
            // required or not-yet-lagged consumer) prevents that, and a
            // lagged consumer never re-enters this branch for stale laps.
            let event = unsafe { ring.read(expected) };
            listener.on_event(expected, event);
            consumed.store(expected, Ordering::Release);
            expected += 1;
            waiter.reset();
            continue;
        }
        let is_stopping = BusState::from_u8(state.load(Ordering::Acquire)) != BusState::Running;
        if is_stopping && expected >= producer_next.load(Ordering::Acquire) {
            break;
        }
        if !required && producer_next.load(Ordering::Acquire) - expected > capacity {
            lagged.store(true, Ordering::Release);
            tracing::warn!(consumer = idx, "optional bus consumer lagged more than one lap, skipping ahead");
            expected = producer_next.load(Ordering::Acquire) - capacity + 1;
            consumed.store(expected - 1, Ordering::Release);
            waiter.reset();
            continue;
        }
        waiter.wait();
    }
}
