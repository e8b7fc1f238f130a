//! Metrics collection for pool monitoring
//!
//! Lock-free metrics counters using atomic operations.
//! Collected in hot path, exported via snapshots in cold path.

use crossbeam_utils::CachePadded;
use std::sync::atomic::{AtomicU64, Ordering};

/// Pool metrics collector
///
/// Thread-safe counters updated from the hot path. One collector can be
/// shared by every pool a scaling strategy owns, so snapshots aggregate
/// across the whole strategy. Counters never reset.
pub struct PoolMetrics {
    /// Total acquire calls
    acquires: CachePadded<AtomicU64>,
    /// Acquires served by the factory because the pool was empty
    fresh_allocations: CachePadded<AtomicU64>,
    /// Total release calls
    releases: CachePadded<AtomicU64>,
    /// Releases dropped because the pool was at capacity
    overflow_drops: CachePadded<AtomicU64>,
    /// Baskets allocated past the first
    basket_extensions: AtomicU64,
    /// Pool nodes appended by the growable-list strategy
    nodes_appended: AtomicU64,
    /// Abandoned nodes or slots taken over by a new owner thread
    nodes_reclaimed: AtomicU64,
}

/// Metrics snapshot for export
#[derive(Debug, Clone, Copy)]
pub struct MetricsSnapshot {
    pub acquires: u64,
    pub fresh_allocations: u64,
    pub releases: u64,
    pub overflow_drops: u64,
    pub basket_extensions: u64,
    pub nodes_appended: u64,
    pub nodes_reclaimed: u64,
    /// Fraction of acquires served from the pool rather than the factory
    pub recycle_rate: f64,
}

impl PoolMetrics {
    /// Create new metrics collector
    pub fn new() -> Self {
        Self {
            acquires: CachePadded::new(AtomicU64::new(0)),
            fresh_allocations: CachePadded::new(AtomicU64::new(0)),
            releases: CachePadded::new(AtomicU64::new(0)),
            overflow_drops: CachePadded::new(AtomicU64::new(0)),
            basket_extensions: AtomicU64::new(0),
            nodes_appended: AtomicU64::new(0),
            nodes_reclaimed: AtomicU64::new(0),
        }
    }

    /// Record an acquire call
    #[inline]
    pub fn record_acquire(&self) {
        self.acquires.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an acquire that fell back to the factory
    #[inline]
    pub fn record_fresh_allocation(&self) {
        self.fresh_allocations.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a release call
    #[inline]
    pub fn record_release(&self) {
        self.releases.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a release dropped at capacity
    #[inline]
    pub fn record_overflow_drop(&self) {
        self.overflow_drops.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a lazy basket allocation
    #[inline]
    pub fn record_basket_extension(&self) {
        self.basket_extensions.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a node appended to a growable list
    #[inline]
    pub fn record_node_appended(&self) {
        self.nodes_appended.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an abandoned node or slot taken over
    #[inline]
    pub fn record_node_reclaimed(&self) {
        self.nodes_reclaimed.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current snapshot of metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        let acquires = self.acquires.load(Ordering::Relaxed);
        let fresh = self.fresh_allocations.load(Ordering::Relaxed);

        let recycle_rate = if acquires > 0 {
            (acquires - fresh.min(acquires)) as f64 / acquires as f64
        } else {
            0.0
        };

        MetricsSnapshot {
            acquires,
            fresh_allocations: fresh,
            releases: self.releases.load(Ordering::Relaxed),
            overflow_drops: self.overflow_drops.load(Ordering::Relaxed),
            basket_extensions: self.basket_extensions.load(Ordering::Relaxed),
            nodes_appended: self.nodes_appended.load(Ordering::Relaxed),
            nodes_reclaimed: self.nodes_reclaimed.load(Ordering::Relaxed),
            recycle_rate,
        }
    }
}

impl Default for PoolMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_collector_creation() {
        let metrics = PoolMetrics::new();
        let snapshot = metrics.snapshot();

        assert_eq!(snapshot.acquires, 0);
        assert_eq!(snapshot.releases, 0);
        assert_eq!(snapshot.overflow_drops, 0);
        assert_eq!(snapshot.recycle_rate, 0.0);
    }

    #[test]
    fn test_record_operations() {
        let metrics = PoolMetrics::new();

        for _ in 0..4 {
            metrics.record_acquire();
        }
        metrics.record_fresh_allocation();
        metrics.record_release();
        metrics.record_overflow_drop();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.acquires, 4);
        assert_eq!(snapshot.fresh_allocations, 1);
        assert_eq!(snapshot.releases, 1);
        assert_eq!(snapshot.overflow_drops, 1);
        assert_eq!(snapshot.recycle_rate, 0.75);
    }

    #[test]
    fn test_recycle_rate_with_no_acquires() {
        let metrics = PoolMetrics::new();
        metrics.record_release();
        assert_eq!(metrics.snapshot().recycle_rate, 0.0);
    }

    #[test]
    fn test_concurrent_recording() {
        use std::sync::Arc;
        use std::thread;

        let metrics = Arc::new(PoolMetrics::new());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let metrics = Arc::clone(&metrics);
                thread::spawn(move || {
                    for _ in 0..1_000 {
                        metrics.record_acquire();
                        metrics.record_release();
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.acquires, 8_000);
        assert_eq!(snapshot.releases, 8_000);
    }
}
