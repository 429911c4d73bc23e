//! Cache Statistics Module
//!
//! Process-local read counters owned by a facade instance.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

// == Cache Stats ==
/// Point-in-time view of the facade's counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStats {
    /// Reads that returned a value
    pub hits: u64,
    /// Reads that returned nothing (absent, expired, malformed or unreachable)
    pub misses: u64,
    /// Read operations counted, one per requested key
    pub total_operations: u64,
    /// Reads and writes served by the fallback store
    pub fallback_operations: u64,
    /// Primary store failures absorbed by the facade
    pub primary_errors: u64,
    /// Keys currently held by the fallback store
    pub fallback_entries: usize,
    /// Keys dropped by the fallback store to stay within capacity
    pub fallback_evictions: u64,
    /// hits / (hits + misses), rounded to two decimals
    pub hit_rate: f64,
}

impl CacheStats {
    /// Calculates the hit rate; 0.0 when nothing has been read.
    pub fn compute_hit_rate(hits: u64, misses: u64) -> f64 {
        let total = hits + misses;
        if total == 0 {
            0.0
        } else {
            (hits as f64 / total as f64 * 100.0).round() / 100.0
        }
    }
}

// == Stats Recorder ==
/// Lock-free counters shared by every facade operation.
#[derive(Debug, Default)]
pub struct StatsRecorder {
    hits: AtomicU64,
    misses: AtomicU64,
    total_operations: AtomicU64,
    fallback_operations: AtomicU64,
    primary_errors: AtomicU64,
}

impl StatsRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
        self.total_operations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
        self.total_operations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fallback(&self) {
        self.fallback_operations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_primary_error(&self) {
        self.primary_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Clears every counter. Stored data is untouched.
    pub fn reset(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.total_operations.store(0, Ordering::Relaxed);
        self.fallback_operations.store(0, Ordering::Relaxed);
        self.primary_errors.store(0, Ordering::Relaxed);
    }

    /// Snapshot of the counters; fallback size fields are filled in by the caller.
    pub fn snapshot(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        CacheStats {
            hits,
            misses,
            total_operations: self.total_operations.load(Ordering::Relaxed),
            fallback_operations: self.fallback_operations.load(Ordering::Relaxed),
            primary_errors: self.primary_errors.load(Ordering::Relaxed),
            fallback_entries: 0,
            fallback_evictions: 0,
            hit_rate: CacheStats::compute_hit_rate(hits, misses),
        }
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_new() {
        let stats = StatsRecorder::new().snapshot();
        assert_eq!(stats, CacheStats::default());
    }

    #[test]
    fn test_hit_rate_no_requests() {
        assert_eq!(CacheStats::compute_hit_rate(0, 0), 0.0);
    }

    #[test]
    fn test_hit_rate_is_rounded() {
        assert_eq!(CacheStats::compute_hit_rate(3, 4), 0.43);
        assert_eq!(CacheStats::compute_hit_rate(1, 2), 0.33);
        assert_eq!(CacheStats::compute_hit_rate(2, 0), 1.0);
    }

    #[test]
    fn test_record_and_reset() {
        let recorder = StatsRecorder::new();
        recorder.record_hit();
        recorder.record_miss();
        recorder.record_miss();
        recorder.record_fallback();
        recorder.record_primary_error();

        let stats = recorder.snapshot();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 2);
        assert_eq!(stats.total_operations, 3);
        assert_eq!(stats.fallback_operations, 1);
        assert_eq!(stats.primary_errors, 1);

        recorder.reset();
        assert_eq!(recorder.snapshot(), CacheStats::default());
    }
}
