//! A hybrid O(1) per-symbol state map: a flat array for small symbol ids
//! plus an overflow sequence for the rest. Not synchronized — the owning
//! component (bar aggregator, simulated executor) must serialize access,
//! matching the single-writer posture of the structures built on top of
//! it.

use crate::ids::SymbolId;

const FLAT_CAPACITY: usize = 256;

/// `state[symbol]`, created on first access. Small ids (`< 256`) resolve
/// in a flat array; larger ids fall back to a linear-scanned overflow
/// list, which stays small in practice since most venues assign dense,
/// low-valued ids.
pub struct SymbolStateMap<S> {
    flat: Box<[Option<S>; FLAT_CAPACITY]>,
    overflow: Vec<(SymbolId, S)>,
}

impl<S> Default for SymbolStateMap<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> SymbolStateMap<S> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            flat: Box::new(std::array::from_fn(|_| None)),
            overflow: Vec::new(),
        }
    }

    /// Returns the state for `symbol`, constructing it via `init` on
    /// first access.
    pub fn get_or_init(&mut self, symbol: SymbolId, init: impl FnOnce() -> S) -> &mut S {
        let idx = symbol.0 as usize;
        if idx < FLAT_CAPACITY {
            return self.flat[idx].get_or_insert_with(init);
        }
        if let Some(pos) = self.overflow.iter().position(|(id, _)| *id == symbol) {
            return &mut self.overflow[pos].1;
        }
        self.overflow.push((symbol, init()));
        let last = self.overflow.len() - 1;
        &mut self.overflow[last].1
    }

    #[must_use]
    pub fn get(&self, symbol: SymbolId) -> Option<&S> {
        let idx = symbol.0 as usize;
        if idx < FLAT_CAPACITY {
            return self.flat[idx].as_ref();
        }
        self.overflow.iter().find(|(id, _)| *id == symbol).map(|(_, s)| s)
    }

    /// Visits every initialized entry.
    pub fn for_each(&self, mut visit: impl FnMut(SymbolId, &S)) {
        for (idx, slot) in self.flat.iter().enumerate() {
            if let Some(s) = slot {
                visit(SymbolId(idx as u32), s);
            }
        }
        for (id, s) in &self.overflow {
            visit(*id, s);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_and_overflow_both_initialize_once() {
        let mut map: SymbolStateMap<u32> = SymbolStateMap::new();
        let mut inits = 0;
        for sym in [SymbolId(5), SymbolId(5), SymbolId(500), SymbolId(500)] {
            *map.get_or_init(sym, || {
                inits += 1;
                0
            }) += 1;
        }
        assert_eq!(inits, 2);
        assert_eq!(*map.get(SymbolId(5)).unwrap(), 2);
        assert_eq!(*map.get(SymbolId(500)).unwrap(), 2);
    }

    #[test]
    fn for_each_visits_every_initialized_entry() {
        let mut map: SymbolStateMap<u32> = SymbolStateMap::new();
        map.get_or_init(SymbolId(1), || 10);
        map.get_or_init(SymbolId(300), || 20);
        let mut seen = Vec::new();
        map.for_each(|id, v| seen.push((id, *v)));
        assert_eq!(seen.len(), 2);
    }
}
