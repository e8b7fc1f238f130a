//! Round-robin sharded pool
//!
//! Deterministic, stateless fan-out over a fixed power-of-two array of
//! single pools. An acquire and a release may land on different shards,
//! so shard fill levels drift under skewed load; that is acceptable
//! because the goal here is contention reduction, not per-thread
//! affinity.

use crossbeam_utils::CachePadded;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use crate::core::SinglePool;
use crate::infrastructure::config::PoolConfig;
use crate::infrastructure::metrics::PoolMetrics;
use crate::scaling::Recycler;
use crate::{PoolError, Result};

/// Fixed shard array selected by free-running cursors
pub struct RoundRobinPool<T> {
    shards: Box<[SinglePool<T>]>,
    /// shard_count - 1; selection is a mask, not a modulo
    mask: u32,
    /// Independent cursors keep acquires and releases from hammering the
    /// same shard. Padded: both are written on every operation.
    acquire_cursor: CachePadded<AtomicU32>,
    release_cursor: CachePadded<AtomicU32>,
    metrics: Arc<PoolMetrics>,
}

impl<T: Default + Send + 'static> RoundRobinPool<T> {
    /// Create a sharded pool of default-constructed objects
    pub fn new(config: &PoolConfig) -> Result<Self> {
        Self::with_factory(config, Arc::new(T::default))
    }
}

impl<T: Send + 'static> RoundRobinPool<T> {
    /// Create a sharded pool around an object factory
    ///
    /// # Errors
    /// Returns a configuration error unless `shard_count` is a power of
    /// two, or when the basket geometry is rejected by the single pool.
    pub fn with_factory(
        config: &PoolConfig,
        factory: Arc<dyn Fn() -> T + Send + Sync>,
    ) -> Result<Self> {
        let count = config.shard_count;
        if count == 0 || !count.is_power_of_two() {
            return Err(PoolError::Config(format!(
                "shard_count must be a non-zero power of two, got {count}"
            )));
        }

        let metrics = Arc::new(PoolMetrics::new());
        let shards = (0..count)
            .map(|_| {
                SinglePool::with_metrics(
                    config.basket_size,
                    config.max_baskets,
                    config.pre_allocate,
                    factory.clone(),
                    metrics.clone(),
                )
            })
            .collect::<Result<Vec<_>>>()?
            .into_boxed_slice();

        Ok(Self {
            shards,
            mask: (count - 1) as u32,
            acquire_cursor: CachePadded::new(AtomicU32::new(0)),
            // Phase shift of half a revolution: an acquire and a release
            // issued together start on opposite shards. Tunable, not
            // load-bearing.
            release_cursor: CachePadded::new(AtomicU32::new((count / 2) as u32)),
            metrics,
        })
    }

    /// Number of shards
    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    /// Total objects currently pooled across all shards (racy)
    pub fn len(&self) -> usize {
        self.shards.iter().map(SinglePool::len).sum()
    }

    /// Check if every shard is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Shared metrics collector aggregated over all shards
    pub fn metrics(&self) -> &PoolMetrics {
        &self.metrics
    }
}

impl<T: Send + 'static> Recycler<T> for RoundRobinPool<T> {
    fn acquire(&self) -> T {
        let cursor = self.acquire_cursor.fetch_add(1, Ordering::Relaxed);
        self.shards[(cursor & self.mask) as usize].acquire()
    }

    fn release(&self, obj: T) {
        let cursor = self.release_cursor.fetch_add(1, Ordering::Relaxed);
        self.shards[(cursor & self.mask) as usize].release(obj)
    }
}
