//! Growable list of thread-owned pools
//!
//! The preferred scaling strategy. Each thread resolves, once, to a pool
//! node that it alone writes through in the steady state, which removes
//! cross-thread CAS contention from the hot path entirely. The node list
//! only grows: nodes are never freed while the pool lives, only re-owned
//! when their owner thread terminates. Bounded thread churn is assumed,
//! not unbounded node growth.
//!
//! Affinity is best-effort. A thread that finds every node owned by a
//! live thread appends its own; a thread that cannot claim ownership at
//! all (thread-local teardown) shares the first node, which stays
//! correct because the single pool tolerates any number of callers.

use std::cell::Cell;
use std::ptr;
use std::sync::atomic::{AtomicPtr, Ordering};
use std::sync::Arc;
use tracing::debug;

use crate::core::SinglePool;
use crate::infrastructure::config::PoolConfig;
use crate::infrastructure::metrics::PoolMetrics;
use crate::scaling::liveness::{self, Claim, OwnerCell, ThreadToken};
use crate::scaling::{next_pool_id, Recycler};
use crate::Result;

struct Node<T> {
    pool: SinglePool<T>,
    owner: OwnerCell,
    next: AtomicPtr<Node<T>>,
}

/// Lock-free growable list of thread-owned pools
pub struct GrowableListPool<T> {
    /// First node, created unowned at construction; never null
    head: AtomicPtr<Node<T>>,
    /// Append hint; may lag behind the true tail
    tail: AtomicPtr<Node<T>>,
    /// Distinguishes instances in the thread-local resolution cache
    id: u64,
    basket_size: usize,
    max_baskets: usize,
    pre_allocate: usize,
    factory: Arc<dyn Fn() -> T + Send + Sync>,
    metrics: Arc<PoolMetrics>,
}

thread_local! {
    /// Last resolved (pool id, node address) of this thread
    static RESOLVED: Cell<(u64, *mut ())> = const { Cell::new((0, ptr::null_mut())) };
}

impl<T: Default + Send + 'static> GrowableListPool<T> {
    /// Create a growable pool of default-constructed objects
    pub fn new(config: &PoolConfig) -> Result<Self> {
        Self::with_factory(config, Arc::new(T::default))
    }
}

impl<T: Send + 'static> GrowableListPool<T> {
    /// Create a growable pool around an object factory
    pub fn with_factory(
        config: &PoolConfig,
        factory: Arc<dyn Fn() -> T + Send + Sync>,
    ) -> Result<Self> {
        let metrics = Arc::new(PoolMetrics::new());

        // Validate geometry and seed the list with one unowned node so
        // append never has to race an empty list.
        let first = SinglePool::with_metrics(
            config.basket_size,
            config.max_baskets,
            config.pre_allocate,
            factory.clone(),
            metrics.clone(),
        )?;
        let first = Box::into_raw(Box::new(Node {
            pool: first,
            owner: OwnerCell::new(),
            next: AtomicPtr::new(ptr::null_mut()),
        }));

        Ok(Self {
            head: AtomicPtr::new(first),
            tail: AtomicPtr::new(first),
            id: next_pool_id(),
            basket_size: config.basket_size,
            max_baskets: config.max_baskets,
            pre_allocate: config.pre_allocate,
            factory,
            metrics,
        })
    }

    /// Pool node serving the calling thread
    ///
    /// Cache hit is the steady state; the scan/claim/append path runs
    /// once per thread per pool instance.
    fn resolve(&self) -> &Node<T> {
        if let Ok((id, node)) = RESOLVED.try_with(Cell::get) {
            if id == self.id && !node.is_null() {
                return unsafe { &*(node as *mut Node<T>) };
            }
        }

        let node = match liveness::current_thread() {
            Some(token) => self.claim_or_append(&token),
            // Thread-local teardown: ownership is out of reach, share
            // the head node.
            None => unsafe { &*self.head.load(Ordering::Acquire) },
        };

        let _ = RESOLVED.try_with(|cell| {
            cell.set((self.id, node as *const Node<T> as *mut ()));
        });
        node
    }

    fn claim_or_append(&self, token: &ThreadToken) -> &Node<T> {
        // Scan for a node whose owner is absent or terminated.
        let mut cursor = self.head.load(Ordering::Acquire);
        while !cursor.is_null() {
            let node = unsafe { &*cursor };
            match node.owner.try_claim(token) {
                Some(Claim::Reclaimed) => {
                    self.metrics.record_node_reclaimed();
                    debug!(target: "pool", thread = token.id, "reclaimed abandoned pool node");
                    return node;
                }
                Some(Claim::Fresh) | Some(Claim::Retained) => return node,
                None => cursor = node.next.load(Ordering::Acquire),
            }
        }

        // Nothing reclaimable: append a brand-new node owned by us. The
        // geometry was validated when the seed node was built, so this
        // cannot fail.
        let pool = SinglePool::with_metrics(
            self.basket_size,
            self.max_baskets,
            self.pre_allocate,
            self.factory.clone(),
            self.metrics.clone(),
        )
        .expect("pool geometry validated at construction");

        let node = Box::into_raw(Box::new(Node {
            pool,
            owner: OwnerCell::owned_by(token),
            next: AtomicPtr::new(ptr::null_mut()),
        }));

        let mut tail = self.tail.load(Ordering::Acquire);
        loop {
            // Chase forward; the hint may be stale.
            let next = unsafe { &*tail }.next.load(Ordering::Acquire);
            if !next.is_null() {
                tail = next;
                continue;
            }
            match unsafe { &*tail }.next.compare_exchange(
                ptr::null_mut(),
                node,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                // Another thread's append won the race; retry behind it.
                Err(winner) => tail = winner,
            }
        }
        self.tail.store(node, Ordering::Release);
        self.metrics.record_node_appended();
        debug!(target: "pool", thread = token.id, "appended pool node for new owner thread");

        unsafe { &*node }
    }

    /// Number of nodes currently in the list (racy)
    pub fn node_count(&self) -> usize {
        let mut count = 0;
        let mut cursor = self.head.load(Ordering::Acquire);
        while !cursor.is_null() {
            count += 1;
            cursor = unsafe { &*cursor }.next.load(Ordering::Acquire);
        }
        count
    }

    /// Total objects currently pooled across all nodes (racy)
    pub fn len(&self) -> usize {
        let mut total = 0;
        let mut cursor = self.head.load(Ordering::Acquire);
        while !cursor.is_null() {
            let node = unsafe { &*cursor };
            total += node.pool.len();
            cursor = node.next.load(Ordering::Acquire);
        }
        total
    }

    /// Check if every node's pool is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Shared metrics collector aggregated over all nodes
    pub fn metrics(&self) -> &PoolMetrics {
        &self.metrics
    }
}

impl<T: Send + 'static> Recycler<T> for GrowableListPool<T> {
    fn acquire(&self) -> T {
        self.resolve().pool.acquire()
    }

    fn release(&self, obj: T) {
        self.resolve().pool.release(obj)
    }
}

impl<T> Drop for GrowableListPool<T> {
    fn drop(&mut self) {
        // Exclusive access: walk the list and free every node. Stale
        // thread-local caches keyed by this instance's id can never
        // match a later pool, so the dangling addresses are inert.
        let mut cursor = *self.head.get_mut();
        while !cursor.is_null() {
            let next = unsafe { &*cursor }.next.load(Ordering::Relaxed);
            drop(unsafe { Box::from_raw(cursor) });
            cursor = next;
        }
    }
}

// The raw node pointers hide SinglePool<T> from the auto traits; the
// same reasoning as for the single pool applies.
unsafe impl<T: Send> Send for GrowableListPool<T> {}
unsafe impl<T: Send> Sync for GrowableListPool<T> {}
