//! Per-consumer CPU affinity and a default realtime priority schedule.
//! Disabling the `affinity` feature must not affect correctness — only
//! scheduling — so every function here degrades to a no-op when the
//! feature is off or pinning fails.

/// The kind of work a bus consumer thread performs, used to pick both its
/// pinned core (when the `affinity` feature is enabled) and its priority
/// weight.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum ComponentType {
    MarketData,
    Execution,
    Strategy,
    Risk,
    General,
}

impl ComponentType {
    /// Default realtime priority constants from the component schedule.
    #[must_use]
    pub const fn priority(self) -> u8 {
        match self {
            ComponentType::MarketData => 90,
            ComponentType::Execution => 85,
            ComponentType::Strategy => 80,
            ComponentType::Risk => 75,
            ComponentType::General => 70,
        }
    }
}

#[cfg(feature = "affinity")]
pub fn pin_current_thread(component: ComponentType, consumer_index: usize) {
    let Some(cores) = core_affinity::get_core_ids() else {
        tracing::debug!(?component, "core_affinity: no core ids available, skipping pin");
        return;
    };
    if cores.is_empty() {
        return;
    }
    let core = cores[consumer_index % cores.len()];
    if !core_affinity::set_for_current(core) {
        tracing::debug!(?component, ?core, "core_affinity: failed to pin thread");
    }
}

#[cfg(not(feature = "affinity"))]
pub fn pin_current_thread(_component: ComponentType, _consumer_index: usize) {}
