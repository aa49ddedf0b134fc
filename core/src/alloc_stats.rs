//! Allocation counters
//!
//! The generational collector triggers on a heuristic allocation count
//! rather than on every allocation. `AllocStats` is the small counter block
//! a `Global` context keeps to drive that heuristic; it is deliberately not
//! thread-safe (`Cell`, not `Atomic*`) because a `Global` context is never
//! touched from more than one thread at a time.

use std::cell::Cell;

/// Per-generation allocation bookkeeping for the garbage collector.
#[derive(Debug, Default)]
pub struct AllocStats {
    /// Variables allocated into the `newest` generation since the last
    /// minor collection.
    newest_count: Cell<u64>,
    /// Total variables ever allocated (monotonic, diagnostic only).
    lifetime_count: Cell<u64>,
    /// Total collections run so far, split by the oldest generation they reached.
    minor_collections: Cell<u64>,
    major_collections: Cell<u64>,
}

impl AllocStats {
    pub fn new() -> Self {
        AllocStats::default()
    }

    pub fn record_allocation(&self) {
        self.newest_count.set(self.newest_count.get() + 1);
        self.lifetime_count.set(self.lifetime_count.get() + 1);
    }

    pub fn newest_count(&self) -> u64 {
        self.newest_count.get()
    }

    pub fn lifetime_count(&self) -> u64 {
        self.lifetime_count.get()
    }

    pub fn record_minor_collection(&self) {
        self.minor_collections.set(self.minor_collections.get() + 1);
        self.newest_count.set(0);
    }

    pub fn record_major_collection(&self) {
        self.major_collections.set(self.major_collections.get() + 1);
    }

    pub fn minor_collections(&self) -> u64 {
        self.minor_collections.get()
    }

    pub fn major_collections(&self) -> u64 {
        self.major_collections.get()
    }

    /// Heuristic: a minor collection is due once enough variables have
    /// joined `newest` since the last sweep.
    pub fn should_collect(&self, threshold: u64) -> bool {
        self.newest_count.get() >= threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heuristic_trips_at_threshold() {
        let stats = AllocStats::new();
        for _ in 0..9 {
            stats.record_allocation();
        }
        assert!(!stats.should_collect(10));
        stats.record_allocation();
        assert!(stats.should_collect(10));
    }

    #[test]
    fn minor_collection_resets_newest_not_lifetime() {
        let stats = AllocStats::new();
        stats.record_allocation();
        stats.record_allocation();
        stats.record_minor_collection();
        assert_eq!(stats.newest_count(), 0);
        assert_eq!(stats.lifetime_count(), 2);
        assert_eq!(stats.minor_collections(), 1);
    }
}
