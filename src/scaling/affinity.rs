//! CPU-affinity-partitioned pool array
//!
//! A fixed array of `logical CPUs x pools_per_cpu` single pools. A
//! thread claims an unowned slot on first use and keeps writing through
//! it; slots abandoned by terminated threads are reclaimed
//! opportunistically. Unlike the growable list, the array never grows:
//! when every slot is owned by a live thread, surplus threads share a
//! slot picked by thread id, which stays correct because the single
//! pool tolerates any number of concurrent callers.

use std::cell::Cell;
use std::sync::Arc;
use tracing::debug;

use crate::core::SinglePool;
use crate::infrastructure::config::PoolConfig;
use crate::infrastructure::metrics::PoolMetrics;
use crate::scaling::liveness::{self, Claim, OwnerCell};
use crate::scaling::{next_pool_id, Recycler};
use crate::{PoolError, Result};

struct Slot<T> {
    pool: SinglePool<T>,
    owner: OwnerCell,
}

/// Fixed array of thread-claimed pools sized by processor count
pub struct AffinityPool<T> {
    slots: Box<[Slot<T>]>,
    /// Distinguishes instances in the thread-local resolution cache
    id: u64,
    metrics: Arc<PoolMetrics>,
}

thread_local! {
    /// Last resolved (pool id, slot index) of this thread
    static RESOLVED: Cell<(u64, usize)> = const { Cell::new((0, 0)) };
}

impl<T: Default + Send + 'static> AffinityPool<T> {
    /// Create an affinity pool of default-constructed objects
    pub fn new(config: &PoolConfig) -> Result<Self> {
        Self::with_factory(config, Arc::new(T::default))
    }
}

impl<T: Send + 'static> AffinityPool<T> {
    /// Create an affinity pool around an object factory
    ///
    /// The slot count is `num_cpus::get() * config.pools_per_cpu`.
    pub fn with_factory(
        config: &PoolConfig,
        factory: Arc<dyn Fn() -> T + Send + Sync>,
    ) -> Result<Self> {
        if config.pools_per_cpu == 0 {
            return Err(PoolError::Config("pools_per_cpu must be at least 1".into()));
        }
        let slot_count = num_cpus::get() * config.pools_per_cpu;
        Self::with_slot_count(slot_count, config, factory)
    }

    fn with_slot_count(
        slot_count: usize,
        config: &PoolConfig,
        factory: Arc<dyn Fn() -> T + Send + Sync>,
    ) -> Result<Self> {
        let metrics = Arc::new(PoolMetrics::new());
        let slots = (0..slot_count)
            .map(|_| {
                Ok(Slot {
                    pool: SinglePool::with_metrics(
                        config.basket_size,
                        config.max_baskets,
                        config.pre_allocate,
                        factory.clone(),
                        metrics.clone(),
                    )?,
                    owner: OwnerCell::new(),
                })
            })
            .collect::<Result<Vec<_>>>()?
            .into_boxed_slice();

        Ok(Self {
            slots,
            id: next_pool_id(),
            metrics,
        })
    }

    /// Slot serving the calling thread
    fn resolve(&self) -> &Slot<T> {
        if let Ok((id, index)) = RESOLVED.try_with(Cell::get) {
            if id == self.id {
                return &self.slots[index];
            }
        }

        let index = self.claim_slot();
        let _ = RESOLVED.try_with(|cell| cell.set((self.id, index)));
        &self.slots[index]
    }

    fn claim_slot(&self) -> usize {
        let token = match liveness::current_thread() {
            Some(token) => token,
            // Thread-local teardown: share slot 0 without claiming.
            None => return 0,
        };

        for (index, slot) in self.slots.iter().enumerate() {
            match slot.owner.try_claim(&token) {
                Some(Claim::Reclaimed) => {
                    self.metrics.record_node_reclaimed();
                    debug!(target: "pool", thread = token.id, slot = index, "reclaimed abandoned pool slot");
                    return index;
                }
                Some(Claim::Fresh) | Some(Claim::Retained) => return index,
                None => continue,
            }
        }

        // Every slot is owned by a live thread. Affinity is best-effort:
        // fall back to sharing a slot spread by thread id.
        (token.id as usize) % self.slots.len()
    }

    /// Number of pool slots
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Total objects currently pooled across all slots (racy)
    pub fn len(&self) -> usize {
        self.slots.iter().map(|slot| slot.pool.len()).sum()
    }

    /// Check if every slot's pool is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Shared metrics collector aggregated over all slots
    pub fn metrics(&self) -> &PoolMetrics {
        &self.metrics
    }
}

impl<T: Send + 'static> Recycler<T> for AffinityPool<T> {
    fn acquire(&self) -> T {
        self.resolve().pool.acquire()
    }

    fn release(&self, obj: T) {
        self.resolve().pool.release(obj)
    }
}
