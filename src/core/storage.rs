//! Basket storage - lazily extended backing array
//!
//! Objects are held as raw box pointers in fixed-size baskets. Splitting
//! the flat slot range into baskets means full capacity is never
//! committed upfront: only the first basket exists at construction, the
//! rest are allocated on demand under a coarse lock. Extension is rare
//! and stays off the hot path.

use parking_lot::Mutex;
use std::marker::PhantomData;
use std::ptr;
use std::sync::atomic::{AtomicPtr, Ordering};
use tracing::debug;

/// One basket: a dense array of object slots
struct Basket<T> {
    slots: Box<[AtomicPtr<T>]>,
}

impl<T> Basket<T> {
    fn new(basket_size: usize) -> Self {
        let slots = (0..basket_size)
            .map(|_| AtomicPtr::new(ptr::null_mut()))
            .collect();
        Self { slots }
    }
}

/// Jagged backing store addressed by a flat slot index
///
/// Slot `i` lives in basket `i / basket_size` at offset `i % basket_size`.
/// The division is unsigned; the head word's top bit is a lock flag, so
/// indices handed in here are always masked non-negative values.
///
/// The storage does not own the pooled objects. Slots hold whatever raw
/// pointer was last written; which of them are live is decided solely by
/// the pool's head index.
pub struct BasketStorage<T> {
    baskets: Box<[AtomicPtr<Basket<T>>]>,
    basket_size: usize,
    /// Guards lazy basket allocation only; never taken on the hot path
    extend_lock: Mutex<()>,
    _marker: PhantomData<Box<T>>,
}

impl<T> BasketStorage<T> {
    /// Create storage with the first basket allocated eagerly
    pub fn new(basket_size: usize, max_baskets: usize) -> Self {
        let baskets: Box<[AtomicPtr<Basket<T>>]> = (0..max_baskets)
            .map(|_| AtomicPtr::new(ptr::null_mut()))
            .collect();

        let first = Box::into_raw(Box::new(Basket::new(basket_size)));
        baskets[0].store(first, Ordering::Release);

        Self {
            baskets,
            basket_size,
            extend_lock: Mutex::new(()),
            _marker: PhantomData,
        }
    }

    #[inline(always)]
    fn split(&self, index: u64) -> (usize, usize) {
        let index = index as usize;
        (index / self.basket_size, index % self.basket_size)
    }

    /// Slot cell for `index`; the owning basket must already exist
    ///
    /// Release ensures the basket before publishing any index that maps
    /// into it, so every index at or below a committed head is safe.
    #[inline(always)]
    pub fn slot(&self, index: u64) -> &AtomicPtr<T> {
        let (i, j) = self.split(index);
        let basket = self.baskets[i].load(Ordering::Acquire);
        debug_assert!(!basket.is_null(), "slot read before basket allocation");
        unsafe { &(*basket).slots[j] }
    }

    /// Slot cell for `index`, or None when the basket was never allocated
    pub fn try_slot(&self, index: u64) -> Option<&AtomicPtr<T>> {
        let (i, j) = self.split(index);
        if i >= self.baskets.len() {
            return None;
        }
        let basket = self.baskets[i].load(Ordering::Acquire);
        if basket.is_null() {
            return None;
        }
        Some(unsafe { &(*basket).slots[j] })
    }

    /// Make sure the basket holding `index` exists; returns true if this
    /// call allocated it
    ///
    /// Double-checked under the coarse extension lock; the first writer
    /// wins and later callers observe its basket.
    pub fn ensure_basket(&self, index: u64) -> bool {
        let (i, _) = self.split(index);
        if !self.baskets[i].load(Ordering::Acquire).is_null() {
            return false;
        }

        let _guard = self.extend_lock.lock();
        if self.baskets[i].load(Ordering::Acquire).is_null() {
            let basket = Box::into_raw(Box::new(Basket::new(self.basket_size)));
            self.baskets[i].store(basket, Ordering::Release);
            debug!(target: "pool", basket = i, "extended storage with new basket");
            return true;
        }
        false
    }

    /// Number of baskets currently allocated
    pub fn allocated_baskets(&self) -> usize {
        self.baskets
            .iter()
            .filter(|b| !b.load(Ordering::Acquire).is_null())
            .count()
    }
}

impl<T> Drop for BasketStorage<T> {
    fn drop(&mut self) {
        // Frees the basket arrays only. Live objects are drained by the
        // owning pool first; stale slot pointers belong to objects whose
        // ownership left the pool and must not be touched here.
        for cell in self.baskets.iter() {
            let basket = cell.load(Ordering::Relaxed);
            if !basket.is_null() {
                drop(unsafe { Box::from_raw(basket) });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_basket_exists_at_construction() {
        let storage: BasketStorage<u32> = BasketStorage::new(10, 5);
        assert_eq!(storage.allocated_baskets(), 1);
        assert!(storage.try_slot(0).is_some());
        assert!(storage.try_slot(9).is_some());
        assert!(storage.try_slot(10).is_none());
    }

    #[test]
    fn test_split_geometry() {
        let storage: BasketStorage<u32> = BasketStorage::new(100, 10);
        assert_eq!(storage.split(0), (0, 0));
        assert_eq!(storage.split(99), (0, 99));
        assert_eq!(storage.split(100), (1, 0));
        assert_eq!(storage.split(250), (2, 50));
    }

    #[test]
    fn test_ensure_basket_is_idempotent() {
        let storage: BasketStorage<u32> = BasketStorage::new(10, 5);

        assert!(storage.ensure_basket(25));
        assert!(!storage.ensure_basket(25));
        assert_eq!(storage.allocated_baskets(), 2);
        assert!(storage.try_slot(25).is_some());
    }

    #[test]
    fn test_slot_roundtrip() {
        let storage: BasketStorage<u32> = BasketStorage::new(4, 4);
        storage.ensure_basket(6);

        let obj = Box::into_raw(Box::new(42u32));
        storage.slot(6).store(obj, Ordering::Release);
        let read = storage.slot(6).load(Ordering::Acquire);
        assert_eq!(read, obj);

        drop(unsafe { Box::from_raw(obj) });
    }

    #[test]
    fn test_concurrent_extension_single_winner() {
        use std::sync::Arc;
        use std::thread;

        let storage: Arc<BasketStorage<u32>> = Arc::new(BasketStorage::new(8, 16));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let storage = Arc::clone(&storage);
                thread::spawn(move || {
                    for index in (8..128).step_by(8) {
                        storage.ensure_basket(index as u64);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(storage.allocated_baskets(), 16);
    }
}
