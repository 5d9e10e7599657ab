//! Cache statistics and runtime counters.

use std::sync::atomic::{AtomicU64, Ordering};

use super::entry::Origin;

/// Per-call event counters.
///
/// These are cumulative since the cache was created and are never reset by
/// `clear()`.
#[derive(Debug, Default)]
pub struct CacheMetrics {
    /// Reads served from the memory tier
    pub memory_hits: AtomicU64,
    /// Reads served from the durable tier (and promoted)
    pub durable_hits: AtomicU64,
    /// Remote fetches started
    pub remote_fetches: AtomicU64,
    /// Remote fetches that failed or timed out
    pub fetch_failures: AtomicU64,
    /// Expired durable values served because the fetch failed
    pub stale_fallbacks: AtomicU64,
    /// Reads that returned nothing
    pub misses: AtomicU64,
    /// Reads that joined a fetch already in flight
    pub coalesced: AtomicU64,
}

impl CacheMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current snapshot of all counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            memory_hits: self.memory_hits.load(Ordering::Relaxed),
            durable_hits: self.durable_hits.load(Ordering::Relaxed),
            remote_fetches: self.remote_fetches.load(Ordering::Relaxed),
            fetch_failures: self.fetch_failures.load(Ordering::Relaxed),
            stale_fallbacks: self.stale_fallbacks.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            coalesced: self.coalesced.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of cache counters at a point in time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub memory_hits: u64,
    pub durable_hits: u64,
    pub remote_fetches: u64,
    pub fetch_failures: u64,
    pub stale_fallbacks: u64,
    pub misses: u64,
    pub coalesced: u64,
}

/// Entry count per origin tag.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OriginBreakdown {
    pub remote: usize,
    pub durable: usize,
    pub fallback: usize,
}

impl OriginBreakdown {
    pub fn record(&mut self, origin: Origin) {
        match origin {
            Origin::Remote => self.remote += 1,
            Origin::Durable => self.durable += 1,
            Origin::Fallback => self.fallback += 1,
        }
    }
}

/// Statistics about the memory tier, computed at call time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of entries currently in memory.
    pub total_entries: usize,
    /// Entries still valid at the time of the call.
    pub valid_entries: usize,
    /// Entries past their TTL or the max-age ceiling.
    pub expired_entries: usize,
    /// Entry count by provenance tag.
    pub by_origin: OriginBreakdown,
    /// Cumulative event counters.
    pub metrics: MetricsSnapshot,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0).
    ///
    /// Stale fallbacks count as neither hits nor misses.
    pub fn hit_rate(&self) -> f64 {
        let hits = self.metrics.memory_hits + self.metrics.durable_hits;
        let total = hits + self.metrics.remote_fetches;
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_stats_hit_rate() {
        let stats = CacheStats {
            metrics: MetricsSnapshot {
                memory_hits: 60,
                durable_hits: 20,
                remote_fetches: 20,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!((stats.hit_rate() - 0.8).abs() < 0.001);

        let empty_stats = CacheStats::default();
        assert!((empty_stats.hit_rate() - 0.0).abs() < 0.001);
    }

    #[test]
    fn test_origin_breakdown() {
        let mut breakdown = OriginBreakdown::default();
        breakdown.record(Origin::Remote);
        breakdown.record(Origin::Remote);
        breakdown.record(Origin::Durable);

        assert_eq!(
            breakdown,
            OriginBreakdown {
                remote: 2,
                durable: 1,
                fallback: 0
            }
        );
    }

    #[test]
    fn test_metrics_snapshot() {
        let metrics = CacheMetrics::new();
        CacheMetrics::incr(&metrics.memory_hits);
        CacheMetrics::incr(&metrics.memory_hits);
        CacheMetrics::incr(&metrics.stale_fallbacks);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.memory_hits, 2);
        assert_eq!(snapshot.stale_fallbacks, 1);
        assert_eq!(snapshot.remote_fetches, 0);
    }
}
