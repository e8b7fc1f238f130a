//! Single lock-free recycling pool
//!
//! A bounded stack of reusable objects addressed by one packed atomic
//! word. acquire and release never block and never fail: an empty pool
//! falls through to the object factory, a saturated pool silently drops
//! the returned object, and contention is resolved by optimistic retry
//! on the head CAS.

use std::hint;
use std::ptr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::core::head::HeadWord;
use crate::core::storage::BasketStorage;
use crate::infrastructure::metrics::PoolMetrics;
use crate::scaling::Recycler;
use crate::{PoolError, Result};

/// Lock-free recycling pool for one object type
///
/// Objects live as boxed heap values while pooled; the slot arrays store
/// their raw addresses. The packed head word is the single point of
/// synchronization - every mutation goes through a CAS on it, except the
/// rare basket-extension lock inside the storage.
///
/// # Example
/// ```
/// use repool::SinglePool;
///
/// let pool: SinglePool<Vec<u8>> = SinglePool::new(100, 10, 16).unwrap();
///
/// let mut buf = pool.acquire();
/// buf.push(42);
/// pool.release(buf);
/// ```
pub struct SinglePool<T> {
    /// Packed index + tag + lock bit; see HeadWord for the layout
    head: AtomicU64,
    storage: BasketStorage<T>,
    /// Highest index the pool will fill; release drops objects beyond it
    max_index: u64,
    factory: Arc<dyn Fn() -> T + Send + Sync>,
    metrics: Arc<PoolMetrics>,
}

impl<T: Default + 'static> SinglePool<T> {
    /// Create a pool of default-constructed objects
    ///
    /// `pre_allocate` objects are built eagerly into the first basket for
    /// data locality under first load; it must fit into one basket.
    ///
    /// # Errors
    /// Returns a configuration error when the basket geometry is out of
    /// the addressable index range.
    pub fn new(basket_size: usize, max_baskets: usize, pre_allocate: usize) -> Result<Self> {
        Self::with_factory(basket_size, max_baskets, pre_allocate, T::default)
    }
}

impl<T> SinglePool<T> {
    /// Create a pool that builds fresh objects with `factory`
    pub fn with_factory<F>(
        basket_size: usize,
        max_baskets: usize,
        pre_allocate: usize,
        factory: F,
    ) -> Result<Self>
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self::with_metrics(
            basket_size,
            max_baskets,
            pre_allocate,
            Arc::new(factory),
            Arc::new(PoolMetrics::new()),
        )
    }

    /// Create a pool reporting into a shared metrics collector
    ///
    /// Scaling strategies pass one collector to every pool they own so
    /// counters aggregate across the whole strategy.
    pub fn with_metrics(
        basket_size: usize,
        max_baskets: usize,
        pre_allocate: usize,
        factory: Arc<dyn Fn() -> T + Send + Sync>,
        metrics: Arc<PoolMetrics>,
    ) -> Result<Self> {
        if basket_size == 0 {
            return Err(PoolError::Config("basket_size must be at least 1".into()));
        }
        if max_baskets == 0 {
            return Err(PoolError::Config("max_baskets must be at least 1".into()));
        }
        let total = basket_size as u128 * max_baskets as u128;
        if total - 1 > HeadWord::MAX_INDEX as u128 {
            return Err(PoolError::Config(format!(
                "maximum allowed total size (basket_size * max_baskets) is {}",
                HeadWord::MAX_INDEX + 1
            )));
        }
        if pre_allocate > basket_size {
            return Err(PoolError::Config(format!(
                "pre_allocate ({pre_allocate}) must fit into one basket ({basket_size})"
            )));
        }

        let storage = BasketStorage::new(basket_size, max_baskets);

        // Fill a prefix of the first basket with fresh objects. Slot 0 is
        // the empty-marker sentinel and is never written, so pre_allocate
        // objects occupy slots 1..pre_allocate and the stack top starts at
        // pre_allocate - 1. Under real load objects get reordered anyway.
        let top = pre_allocate.saturating_sub(1) as u64;
        for index in 1..=top {
            let obj = Box::into_raw(Box::new(factory()));
            storage.slot(index).store(obj, Ordering::Relaxed);
        }

        Ok(Self {
            head: AtomicU64::new(HeadWord::with_index(top).as_raw()),
            storage,
            max_index: (total - 1) as u64,
            factory,
            metrics,
        })
    }

    /// Take an object out of the pool
    ///
    /// Returns a recycled instance when the pool is non-empty, otherwise
    /// a fresh one from the factory. Never blocks, never fails.
    pub fn acquire(&self) -> T {
        self.metrics.record_acquire();

        loop {
            let head = HeadWord::from_raw(self.head.load(Ordering::Acquire));

            // It might not be obvious, but reading past the lock bit is
            // not allowed: the top slot belongs to an uncommitted release.
            if head.is_locked() {
                hint::spin_loop();
                continue;
            }

            let index = head.index();
            if index == 0 {
                // Empty. Fall through to a fresh instance without
                // touching the array.
                self.metrics.record_fresh_allocation();
                return (self.factory)();
            }

            // Read the slot before the CAS. A losing CAS discards the raw
            // pointer without materializing ownership, so two racing
            // acquires can never both box the same address.
            let obj = self.storage.slot(index).load(Ordering::Acquire);
            let next = head.transition(index - 1, false);

            if self
                .head
                .compare_exchange(
                    head.as_raw(),
                    next.as_raw(),
                    Ordering::AcqRel,
                    Ordering::Acquire,
                )
                .is_ok()
            {
                debug_assert!(!obj.is_null(), "committed slot held a null object");
                return *unsafe { Box::from_raw(obj) };
            }
        }
    }

    /// Give an object back to the pool
    ///
    /// At capacity the object is dropped silently; saturation is an
    /// expected steady-state condition, not a failure. Never blocks
    /// beyond bounded CAS retry, never fails.
    pub fn release(&self, obj: T) {
        self.metrics.record_release();
        // Boxed only once a slot is actually claimed; a saturated pool
        // drops the object without a heap round-trip.
        let mut pending = Some(obj);
        let mut slot_ptr: *mut T = ptr::null_mut();

        loop {
            let head = HeadWord::from_raw(self.head.load(Ordering::Acquire));
            if head.is_locked() {
                hint::spin_loop();
                continue;
            }

            let index = head.index();
            if index == self.max_index {
                // Pool is full. Just drain the object.
                self.metrics.record_overflow_drop();
                if !slot_ptr.is_null() {
                    drop(unsafe { Box::from_raw(slot_ptr) });
                }
                return;
            }

            // Pre-publish: claim slot index+1 exclusively. Acquires that
            // observe the lock bit spin until the write below commits.
            let locked = head.transition(index, true);
            if self
                .head
                .compare_exchange(
                    head.as_raw(),
                    locked.as_raw(),
                    Ordering::AcqRel,
                    Ordering::Acquire,
                )
                .is_err()
            {
                continue;
            }

            let slot_index = index + 1;
            if self.storage.ensure_basket(slot_index) {
                self.metrics.record_basket_extension();
            }
            if let Some(obj) = pending.take() {
                slot_ptr = Box::into_raw(Box::new(obj));
            }
            self.storage.slot(slot_index).store(slot_ptr, Ordering::Release);

            // Commit. Only the thread holding the lock bit can move the
            // head, so this CAS cannot normally fail; restart the whole
            // operation from the top if it somehow does.
            let committed = locked.transition(slot_index, false);
            if self
                .head
                .compare_exchange(
                    locked.as_raw(),
                    committed.as_raw(),
                    Ordering::AcqRel,
                    Ordering::Acquire,
                )
                .is_ok()
            {
                return;
            }
        }
    }

    /// Current stack-top index
    ///
    /// Diagnostic accessor for harnesses; racy under concurrent load.
    #[inline]
    pub fn len(&self) -> usize {
        HeadWord::from_raw(self.head.load(Ordering::Acquire)).index() as usize
    }

    /// Check if the pool holds no recycled objects
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Hard ceiling on simultaneously pooled objects
    #[inline]
    pub fn capacity(&self) -> usize {
        self.max_index as usize
    }

    /// Raw address stored at `index`, null when the slot was never written
    ///
    /// Diagnostic accessor for harnesses verifying slot invariants; not
    /// part of the recycling contract. The address is only meaningful as
    /// an identity while the object is actually pooled.
    pub fn peek_slot(&self, index: usize) -> *const T {
        match self.storage.try_slot(index as u64) {
            Some(slot) => slot.load(Ordering::Acquire),
            None => ptr::null(),
        }
    }

    /// Shared metrics collector of this pool
    pub fn metrics(&self) -> &PoolMetrics {
        &self.metrics
    }
}

impl<T: Send> Recycler<T> for SinglePool<T> {
    fn acquire(&self) -> T {
        SinglePool::acquire(self)
    }

    fn release(&self, obj: T) {
        SinglePool::release(self, obj)
    }
}

impl<T> Drop for SinglePool<T> {
    fn drop(&mut self) {
        // Exclusive access: drain the live range. Slots above the head
        // index are stale addresses of objects that left the pool.
        let top = HeadWord::from_raw(*self.head.get_mut()).index();
        for index in 1..=top {
            let obj = self.storage.slot(index).load(Ordering::Relaxed);
            if !obj.is_null() {
                drop(unsafe { Box::from_raw(obj) });
            }
        }
    }
}

// Objects move wholesale between threads; no &T is ever shared through
// the pool, so Send on T is the only requirement.
unsafe impl<T: Send> Send for SinglePool<T> {}
unsafe impl<T: Send> Sync for SinglePool<T> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::TrackedObject;
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_empty_pool_falls_back_to_factory() {
        let pool: SinglePool<TrackedObject> = SinglePool::new(10, 2, 0).unwrap();

        assert!(pool.is_empty());
        let first = pool.acquire();
        let second = pool.acquire();
        assert_ne!(first.id, second.id);
        assert!(pool.is_empty());
    }

    #[test]
    fn test_pre_allocate_sets_initial_index() {
        let pool: SinglePool<TrackedObject> = SinglePool::new(100, 10, 75).unwrap();
        assert_eq!(pool.len(), 74);
    }

    #[test]
    fn test_pre_allocate_zero_and_one_start_empty() {
        let zero: SinglePool<TrackedObject> = SinglePool::new(10, 2, 0).unwrap();
        let one: SinglePool<TrackedObject> = SinglePool::new(10, 2, 1).unwrap();
        assert_eq!(zero.len(), 0);
        assert_eq!(one.len(), 0);
    }

    #[test]
    fn test_round_trip_leaves_index_unchanged() {
        let pool: SinglePool<TrackedObject> = SinglePool::new(50, 4, 30).unwrap();
        let initial = pool.len();

        for _ in 0..1000 {
            let obj = pool.acquire();
            pool.release(obj);
        }

        assert_eq!(pool.len(), initial);
    }

    #[test]
    fn test_release_past_capacity_drops_silently() {
        // Capacity = 4 * 2 - 1 = 7 slots.
        let pool: SinglePool<TrackedObject> = SinglePool::new(4, 2, 0).unwrap();
        let capacity = pool.capacity();
        assert_eq!(capacity, 7);

        let mut released = HashSet::new();
        for _ in 0..capacity + 3 {
            let obj = TrackedObject::default();
            released.insert(obj.id);
            pool.release(obj);
        }

        assert_eq!(pool.len(), capacity);
        // The extras are gone for good: draining yields exactly capacity
        // recycled objects before the factory kicks in.
        for _ in 0..capacity {
            assert!(released.contains(&pool.acquire().id));
        }
        assert!(pool.is_empty());
    }

    #[test]
    fn test_release_extends_into_later_baskets() {
        let pool: SinglePool<TrackedObject> = SinglePool::new(4, 4, 0).unwrap();

        for _ in 0..10 {
            pool.release(TrackedObject::default());
        }

        assert_eq!(pool.len(), 10);
        for index in 1..=10 {
            assert!(!pool.peek_slot(index).is_null());
        }
    }

    #[test]
    fn test_recycles_most_recently_released() {
        let pool: SinglePool<TrackedObject> = SinglePool::new(10, 2, 0).unwrap();

        let obj = TrackedObject::default();
        let id = obj.id;
        pool.release(obj);

        assert_eq!(pool.acquire().id, id);
    }

    #[test]
    fn test_config_rejects_zero_geometry() {
        assert!(SinglePool::<TrackedObject>::new(0, 10, 0).is_err());
        assert!(SinglePool::<TrackedObject>::new(10, 0, 0).is_err());
    }

    #[test]
    fn test_config_rejects_overflowing_capacity() {
        let result = SinglePool::<TrackedObject>::new(1 << 20, 1 << 20, 0);
        assert!(matches!(result, Err(PoolError::Config(_))));
    }

    #[test]
    fn test_config_rejects_pre_allocate_beyond_first_basket() {
        assert!(SinglePool::<TrackedObject>::new(10, 10, 11).is_err());
    }

    #[test]
    fn test_concurrent_acquire_never_double_issues() {
        let pool: Arc<SinglePool<TrackedObject>> = Arc::new(SinglePool::new(100, 100, 100).unwrap());
        let threads = 8;
        let per_thread = 5_000;

        let handles: Vec<_> = (0..threads)
            .map(|_| {
                let pool = Arc::clone(&pool);
                thread::spawn(move || {
                    let mut seen = HashSet::with_capacity(per_thread);
                    for _ in 0..per_thread {
                        seen.insert(pool.acquire().id);
                    }
                    seen
                })
            })
            .collect();

        let batches: Vec<HashSet<u64>> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        // Ids are unique per construction, so any id observed by two
        // threads means the same instance was issued twice concurrently.
        let total: usize = batches.iter().map(|b| b.len()).sum();
        let merged: HashSet<u64> = batches.into_iter().flatten().collect();
        assert_eq!(merged.len(), total);
    }

    #[test]
    fn test_concurrent_release_loses_nothing() {
        let pool: Arc<SinglePool<TrackedObject>> = Arc::new(SinglePool::new(100, 100, 0).unwrap());
        let threads = 8;
        // 8_000 releases stay below the 9_999-slot capacity, so nothing
        // may be dropped and the final index is exact.
        let per_thread = 1_000;

        let handles: Vec<_> = (0..threads)
            .map(|_| {
                let pool = Arc::clone(&pool);
                thread::spawn(move || {
                    for _ in 0..per_thread {
                        pool.release(TrackedObject::default());
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        let expected = threads * per_thread;
        assert_eq!(pool.len(), expected);

        // Every slot below the head is non-null and pairwise distinct.
        let mut addresses = HashSet::with_capacity(expected);
        for index in 1..=expected {
            let addr = pool.peek_slot(index);
            assert!(!addr.is_null(), "slot {index} lost an object");
            assert!(addresses.insert(addr as usize), "slot {index} duplicated");
        }
    }

    #[test]
    fn test_balanced_cycles_restore_initial_state() {
        // The concrete scenario: basket 100, max baskets 10, pre-allocate
        // 75 -> initial top 74; balanced cycles leave it at 74 with no
        // duplicate identities among occupied slots.
        let pool: Arc<SinglePool<TrackedObject>> = Arc::new(SinglePool::new(100, 10, 75).unwrap());
        assert_eq!(pool.len(), 74);

        let threads = 8;
        let cycles = 1_000_000;

        let handles: Vec<_> = (0..threads)
            .map(|_| {
                let pool = Arc::clone(&pool);
                thread::spawn(move || {
                    for _ in 0..cycles {
                        let obj = pool.acquire();
                        pool.release(obj);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(pool.len(), 74);

        let mut addresses = HashSet::new();
        for index in 1..=74 {
            let addr = pool.peek_slot(index);
            assert!(!addr.is_null());
            assert!(addresses.insert(addr as usize));
        }
    }

    #[test]
    fn test_interleaved_rent_and_return_batches() {
        let pool: Arc<SinglePool<TrackedObject>> = Arc::new(SinglePool::new(64, 64, 64).unwrap());
        let initial = pool.len();
        let threads = 4;

        let handles: Vec<_> = (0..threads)
            .map(|_| {
                let pool = Arc::clone(&pool);
                thread::spawn(move || {
                    for _ in 0..20_000 {
                        let a = pool.acquire();
                        let b = pool.acquire();
                        let c = pool.acquire();
                        pool.release(a);
                        pool.release(b);
                        pool.release(c);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(pool.len(), initial);
    }

    #[test]
    fn test_metrics_track_hot_path_outcomes() {
        let pool: SinglePool<TrackedObject> = SinglePool::new(4, 1, 0).unwrap();

        let obj = pool.acquire(); // miss: empty pool
        pool.release(obj);
        let obj = pool.acquire(); // hit
        pool.release(obj);
        for _ in 0..5 {
            pool.release(TrackedObject::default()); // fills to 3, drops 2
        }

        let snapshot = pool.metrics().snapshot();
        assert_eq!(snapshot.acquires, 2);
        assert_eq!(snapshot.fresh_allocations, 1);
        assert_eq!(snapshot.releases, 7);
        assert_eq!(snapshot.overflow_drops, 2);
    }

    mod model {
        use super::*;
        use proptest::prelude::*;

        #[derive(Debug, Clone)]
        enum Op {
            Acquire,
            Release,
        }

        fn op_strategy() -> impl Strategy<Value = Op> {
            prop_oneof![Just(Op::Acquire), Just(Op::Release)]
        }

        proptest! {
            // Sequentially the pool must behave exactly like a bounded
            // stack of identities.
            #[test]
            fn test_matches_reference_stack(ops in proptest::collection::vec(op_strategy(), 0..400)) {
                let pool: SinglePool<TrackedObject> = SinglePool::new(8, 4, 0).unwrap();
                let capacity = pool.capacity();
                let mut model: Vec<u64> = Vec::new();

                for op in ops {
                    match op {
                        Op::Acquire => {
                            let obj = pool.acquire();
                            if let Some(expected) = model.pop() {
                                prop_assert_eq!(obj.id, expected);
                            }
                        }
                        Op::Release => {
                            let obj = TrackedObject::default();
                            if model.len() < capacity {
                                model.push(obj.id);
                            }
                            pool.release(obj);
                        }
                    }
                    prop_assert_eq!(pool.len(), model.len());
                }
            }
        }
    }
}
