//! Hot-key cache accounting
//!
//! Counters are per-cache fields, written by the serialized writer and
//! read by anyone; readers may observe slightly stale values.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for one cache instance
pub struct HotCacheStats {
    /// Bytes held by value-carrying entries: Σ (|key| + |value| + 8)
    bytes: AtomicU64,
    /// Number of update calls routed at the cache
    puts: AtomicU64,
    /// Number of update calls that found their key cached
    hits: AtomicU64,
    /// Number of promotions skipped because the key was already cached
    duplicates: AtomicU64,
}

impl HotCacheStats {
    /// Create zeroed counters
    pub fn new() -> Self {
        Self {
            bytes: AtomicU64::new(0),
            puts: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            duplicates: AtomicU64::new(0),
        }
    }

    /// Record an update call
    pub fn record_put(&self) {
        self.puts.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an update call that hit a cached key
    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a skipped duplicate promotion
    pub fn record_duplicate(&self) {
        self.duplicates.fetch_add(1, Ordering::Relaxed);
    }

    /// Account bytes added by a promotion, revival, or growth
    pub fn add_bytes(&self, delta: u64) {
        self.bytes.fetch_add(delta, Ordering::Relaxed);
    }

    /// Account bytes released by a deletion or shrink
    pub fn sub_bytes(&self, delta: u64) {
        self.bytes.fetch_sub(delta, Ordering::Relaxed);
    }

    /// Bytes held by value-carrying entries
    pub fn bytes(&self) -> u64 {
        self.bytes.load(Ordering::Relaxed)
    }

    /// Number of update calls seen
    pub fn puts(&self) -> u64 {
        self.puts.load(Ordering::Relaxed)
    }

    /// Number of update calls that hit
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Number of skipped duplicate promotions
    pub fn duplicates(&self) -> u64 {
        self.duplicates.load(Ordering::Relaxed)
    }

    /// Fraction of update calls that hit (0.0 when none were made)
    pub fn hit_rate(&self) -> f64 {
        let puts = self.puts();
        if puts == 0 {
            return 0.0;
        }
        self.hits() as f64 / puts as f64
    }

    /// Snapshot all counters
    pub fn summary(&self) -> CacheReport {
        CacheReport {
            bytes: self.bytes(),
            puts: self.puts(),
            hits: self.hits(),
            duplicates: self.duplicates(),
            hit_rate: self.hit_rate(),
        }
    }
}

impl Default for HotCacheStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time snapshot of a cache's counters
#[derive(Debug, Clone, PartialEq)]
pub struct CacheReport {
    /// Bytes held by value-carrying entries
    pub bytes: u64,
    /// Number of update calls seen
    pub puts: u64,
    /// Number of update calls that hit
    pub hits: u64,
    /// Number of skipped duplicate promotions
    pub duplicates: u64,
    /// `hits / puts`, 0.0 when no updates were made
    pub hit_rate: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_stats() {
        let stats = HotCacheStats::new();
        assert_eq!(stats.bytes(), 0);
        assert_eq!(stats.puts(), 0);
        assert_eq!(stats.hits(), 0);
        assert_eq!(stats.duplicates(), 0);
        assert_eq!(stats.hit_rate(), 0.0);
    }

    #[test]
    fn test_record_operations() {
        let stats = HotCacheStats::new();

        stats.record_put();
        stats.record_put();
        stats.record_hit();
        stats.record_duplicate();

        assert_eq!(stats.puts(), 2);
        assert_eq!(stats.hits(), 1);
        assert_eq!(stats.duplicates(), 1);
        assert_eq!(stats.hit_rate(), 0.5);
    }

    #[test]
    fn test_byte_accounting() {
        let stats = HotCacheStats::new();

        stats.add_bytes(100);
        stats.add_bytes(16);
        stats.sub_bytes(40);

        assert_eq!(stats.bytes(), 76);
    }

    #[test]
    fn test_summary_snapshot() {
        let stats = HotCacheStats::new();
        stats.record_put();
        stats.record_hit();
        stats.add_bytes(16);

        let report = stats.summary();
        assert_eq!(report.bytes, 16);
        assert_eq!(report.puts, 1);
        assert_eq!(report.hits, 1);
        assert_eq!(report.duplicates, 0);
        assert_eq!(report.hit_rate, 1.0);
    }
}
