//! Cache statistics tracking and reporting.

use std::time::Instant;

/// Counters for monitoring and debugging the tile cache.
#[derive(Debug, Clone)]
pub struct CacheStats {
    /// Pyramids built and published.
    pub pyramids_built: u64,
    /// Pyramid builds that failed (never published).
    pub builds_failed: u64,
    /// Pyramids disposed by window eviction.
    pub pyramids_evicted: u64,
    /// Refresh requests dropped because another refresh was in flight.
    pub refreshes_dropped: u64,
    /// Leaf tiles persisted to scratch storage.
    pub tiles_persisted: u64,
    /// Leaf tiles reloaded from scratch storage.
    pub tiles_reloaded: u64,
    /// Raw bytes written to scratch storage.
    pub bytes_persisted: u64,
    /// When tracking started.
    pub created_at: Instant,
}

impl Default for CacheStats {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheStats {
    pub fn new() -> Self {
        Self {
            pyramids_built: 0,
            builds_failed: 0,
            pyramids_evicted: 0,
            refreshes_dropped: 0,
            tiles_persisted: 0,
            tiles_reloaded: 0,
            bytes_persisted: 0,
            created_at: Instant::now(),
        }
    }

    /// Fraction of attempted builds that succeeded (0.0 to 1.0).
    pub fn build_success_rate(&self) -> f64 {
        let total = self.pyramids_built + self.builds_failed;
        if total == 0 {
            0.0
        } else {
            self.pyramids_built as f64 / total as f64
        }
    }

    /// Uptime since tracking started.
    pub fn uptime(&self) -> std::time::Duration {
        self.created_at.elapsed()
    }

    pub fn record_pyramid_built(&mut self) {
        self.pyramids_built += 1;
    }

    pub fn record_build_failed(&mut self) {
        self.builds_failed += 1;
    }

    pub fn record_pyramid_evicted(&mut self) {
        self.pyramids_evicted += 1;
    }

    pub fn record_refresh_dropped(&mut self) {
        self.refreshes_dropped += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_stats_are_zero() {
        let stats = CacheStats::new();
        assert_eq!(stats.pyramids_built, 0);
        assert_eq!(stats.builds_failed, 0);
        assert_eq!(stats.pyramids_evicted, 0);
        assert_eq!(stats.refreshes_dropped, 0);
        assert_eq!(stats.build_success_rate(), 0.0);
    }

    #[test]
    fn test_record_mutators() {
        let mut stats = CacheStats::new();
        stats.record_pyramid_built();
        stats.record_pyramid_built();
        stats.record_build_failed();
        stats.record_pyramid_evicted();
        stats.record_refresh_dropped();

        assert_eq!(stats.pyramids_built, 2);
        assert_eq!(stats.builds_failed, 1);
        assert_eq!(stats.pyramids_evicted, 1);
        assert_eq!(stats.refreshes_dropped, 1);
    }

    #[test]
    fn test_build_success_rate() {
        let mut stats = CacheStats::new();
        stats.record_pyramid_built();
        stats.record_pyramid_built();
        stats.record_pyramid_built();
        stats.record_build_failed();
        assert_eq!(stats.build_success_rate(), 0.75);
    }
}
