//! Local-cache statistics for monitoring and debugging.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for local-cache operations.
///
/// Lookups are classified three ways: a ready hit, an in-flight hit (the
/// key is held by a placeholder), or a miss.
#[derive(Debug, Default)]
pub struct CacheStats {
    /// Total number of lookups.
    lookups: AtomicU64,
    /// Lookups that found a ready value.
    hits: AtomicU64,
    /// Lookups that found a placeholder.
    in_flight_hits: AtomicU64,
    /// Lookups that found nothing.
    misses: AtomicU64,
    /// Number of entries stored.
    inserts: AtomicU64,
    /// Number of whole-cache clears.
    clears: AtomicU64,
}

impl CacheStats {
    /// Creates new statistics.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a lookup that found a ready value.
    #[inline]
    pub fn record_hit(&self) {
        self.lookups.fetch_add(1, Ordering::Relaxed);
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a lookup that found a placeholder.
    #[inline]
    pub fn record_in_flight_hit(&self) {
        self.lookups.fetch_add(1, Ordering::Relaxed);
        self.in_flight_hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a lookup that found nothing.
    #[inline]
    pub fn record_miss(&self) {
        self.lookups.fetch_add(1, Ordering::Relaxed);
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    /// Records an insertion.
    #[inline]
    pub fn record_insert(&self) {
        self.inserts.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a whole-cache clear.
    #[inline]
    pub fn record_clear(&self) {
        self.clears.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns total lookups.
    pub fn lookups(&self) -> u64 {
        self.lookups.load(Ordering::Relaxed)
    }

    /// Returns ready hits.
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Returns in-flight hits.
    pub fn in_flight_hits(&self) -> u64 {
        self.in_flight_hits.load(Ordering::Relaxed)
    }

    /// Returns misses.
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Returns insertions.
    pub fn inserts(&self) -> u64 {
        self.inserts.load(Ordering::Relaxed)
    }

    /// Returns whole-cache clears.
    pub fn clears(&self) -> u64 {
        self.clears.load(Ordering::Relaxed)
    }

    /// Returns the ready-hit ratio (0.0 to 1.0).
    pub fn hit_ratio(&self) -> f64 {
        let lookups = self.lookups();
        if lookups == 0 {
            0.0
        } else {
            self.hits() as f64 / lookups as f64
        }
    }

    /// Resets all statistics.
    pub fn reset(&self) {
        self.lookups.store(0, Ordering::Relaxed);
        self.hits.store(0, Ordering::Relaxed);
        self.in_flight_hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.inserts.store(0, Ordering::Relaxed);
        self.clears.store(0, Ordering::Relaxed);
    }
}

impl Clone for CacheStats {
    fn clone(&self) -> Self {
        Self {
            lookups: AtomicU64::new(self.lookups()),
            hits: AtomicU64::new(self.hits()),
            in_flight_hits: AtomicU64::new(self.in_flight_hits()),
            misses: AtomicU64::new(self.misses()),
            inserts: AtomicU64::new(self.inserts()),
            clears: AtomicU64::new(self.clears()),
        }
    }
}

impl std::fmt::Display for CacheStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "CacheStats {{ lookups: {}, hits: {}, in_flight: {}, misses: {}, hit_ratio: {:.2}%, inserts: {}, clears: {} }}",
            self.lookups(),
            self.hits(),
            self.in_flight_hits(),
            self.misses(),
            self.hit_ratio() * 100.0,
            self.inserts(),
            self.clears()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_classification() {
        let stats = CacheStats::new();

        stats.record_hit();
        stats.record_in_flight_hit();
        stats.record_miss();
        stats.record_miss();

        assert_eq!(stats.lookups(), 4);
        assert_eq!(stats.hits(), 1);
        assert_eq!(stats.in_flight_hits(), 1);
        assert_eq!(stats.misses(), 2);
        assert!((stats.hit_ratio() - 0.25).abs() < 0.001);
    }

    #[test]
    fn test_reset() {
        let stats = CacheStats::new();

        stats.record_hit();
        stats.record_clear();
        stats.reset();

        assert_eq!(stats.lookups(), 0);
        assert_eq!(stats.clears(), 0);
        assert_eq!(stats.hit_ratio(), 0.0);
    }

    #[test]
    fn test_clone() {
        let stats = CacheStats::new();
        stats.record_insert();
        stats.record_hit();

        let cloned = stats.clone();
        assert_eq!(cloned.inserts(), 1);
        assert_eq!(cloned.hits(), 1);
    }
}
