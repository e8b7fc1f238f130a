//! Pool scaling strategies
//!
//! Three alternative designs that fan the recycling contract out across
//! many single pools to cut cross-thread CAS contention:
//! - RoundRobinPool: fixed power-of-two shard array, phase-shifted cursors
//! - AffinityPool: CPU-partitioned fixed array with slot reclamation
//! - GrowableListPool: lock-free list of thread-owned pools (preferred)
//!
//! All three answer the same contract; pick one through configuration.

pub mod affinity;
pub mod growable;
pub mod liveness;
pub mod round_robin;

pub use affinity::AffinityPool;
pub use growable::GrowableListPool;
pub use liveness::ThreadToken;
pub use round_robin::RoundRobinPool;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::infrastructure::config::{PoolConfig, Strategy};
use crate::Result;

/// Recycling contract shared by the single pool and every scaling strategy
///
/// Both operations are infallible under any concurrent interleaving: an
/// empty pool constructs, a saturated pool drops.
pub trait Recycler<T>: Send + Sync {
    /// Take an object out of the pool, constructing fresh when empty
    fn acquire(&self) -> T;

    /// Give an object back; silently dropped when the pool is saturated
    fn release(&self, obj: T);
}

/// Build the configured scaling strategy for a default-constructible type
pub fn build_recycler<T>(config: &PoolConfig) -> Result<Box<dyn Recycler<T>>>
where
    T: Default + Send + 'static,
{
    build_recycler_with(config, Arc::new(T::default))
}

/// Build the configured scaling strategy around an object factory
pub fn build_recycler_with<T>(
    config: &PoolConfig,
    factory: Arc<dyn Fn() -> T + Send + Sync>,
) -> Result<Box<dyn Recycler<T>>>
where
    T: Send + 'static,
{
    let recycler: Box<dyn Recycler<T>> = match config.strategy {
        Strategy::RoundRobin => Box::new(RoundRobinPool::with_factory(config, factory)?),
        Strategy::Affinity => Box::new(AffinityPool::with_factory(config, factory)?),
        Strategy::Growable => Box::new(GrowableListPool::with_factory(config, factory)?),
    };
    Ok(recycler)
}

static NEXT_POOL_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique id distinguishing pool instances in thread-local caches
pub(crate) fn next_pool_id() -> u64 {
    NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed)
}
