//! Thread liveness probe
//!
//! Pool ownership needs a portable answer to "is the owning thread still
//! alive". Every thread lazily registers an alive flag; a thread-local
//! guard clears the flag from its Drop when the thread exits. Owner
//! cells hold a strong reference to the flag they point at, so probing
//! never dereferences freed memory.

use std::sync::atomic::{AtomicBool, AtomicPtr, AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_THREAD_ID: AtomicU64 = AtomicU64::new(1);

/// Identity and liveness handle of one OS thread
#[derive(Clone)]
pub struct ThreadToken {
    /// Process-unique, monotonically assigned
    pub id: u64,
    /// True until the owning thread runs its exit destructors
    pub alive: Arc<AtomicBool>,
}

struct TokenGuard {
    token: ThreadToken,
}

impl Drop for TokenGuard {
    fn drop(&mut self) {
        // Runs at thread exit and flips every pool slot owned by this
        // thread to "abandoned" in one store.
        self.token.alive.store(false, Ordering::Release);
    }
}

thread_local! {
    static TOKEN: TokenGuard = TokenGuard {
        token: ThreadToken {
            id: NEXT_THREAD_ID.fetch_add(1, Ordering::Relaxed),
            alive: Arc::new(AtomicBool::new(true)),
        },
    };
}

/// Token of the calling thread
///
/// None only while the thread is already tearing down its locals; a
/// caller in that state cannot claim ownership and must fall back to
/// shared pool use.
pub fn current_thread() -> Option<ThreadToken> {
    TOKEN.try_with(|guard| guard.token.clone()).ok()
}

/// Outcome of a successful ownership claim
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Claim {
    /// The cell was unowned
    Fresh,
    /// A terminated thread's ownership was taken over
    Reclaimed,
    /// The calling thread already owned the cell
    Retained,
}

/// CAS-claimable owner field of a pool slot or list node
///
/// Stores a raw strong reference to the owner thread's alive flag. A
/// reference installed here is released only when the cell itself drops
/// (pool teardown); replacing a dead owner deliberately forgets the old
/// reference so concurrent probes can never observe a freed flag. The
/// flags are one machine word each and thread churn is assumed bounded,
/// the same non-reclamation trade-off the node list makes.
pub(crate) struct OwnerCell {
    flag: AtomicPtr<AtomicBool>,
}

impl OwnerCell {
    /// Unowned cell
    pub fn new() -> Self {
        Self {
            flag: AtomicPtr::new(std::ptr::null_mut()),
        }
    }

    /// Cell pre-owned by `token`, for nodes built by their first owner
    pub fn owned_by(token: &ThreadToken) -> Self {
        let flag = Arc::into_raw(token.alive.clone()) as *mut AtomicBool;
        Self {
            flag: AtomicPtr::new(flag),
        }
    }

    /// True when the cell is unowned or its owner thread has terminated
    pub fn is_abandoned(&self) -> bool {
        let current = self.flag.load(Ordering::Acquire);
        current.is_null() || !unsafe { &*current }.load(Ordering::Acquire)
    }

    /// Attempt to take ownership for `token`; first claimant wins
    ///
    /// A cell the calling thread already owns is recognized by flag
    /// identity, so a thread whose resolution cache was evicted finds
    /// its way back to its own slot instead of claiming another.
    pub fn try_claim(&self, token: &ThreadToken) -> Option<Claim> {
        let current = self.flag.load(Ordering::Acquire);
        if current == Arc::as_ptr(&token.alive) as *mut AtomicBool {
            return Some(Claim::Retained);
        }
        let claim = if current.is_null() {
            Claim::Fresh
        } else if !unsafe { &*current }.load(Ordering::Acquire) {
            Claim::Reclaimed
        } else {
            return None;
        };

        let mine = Arc::into_raw(token.alive.clone()) as *mut AtomicBool;
        match self
            .flag
            .compare_exchange(current, mine, Ordering::AcqRel, Ordering::Acquire)
        {
            // The dead owner's reference is forgotten, not dropped: a
            // concurrent prober may still be reading through it.
            Ok(_) => Some(claim),
            Err(_) => {
                drop(unsafe { Arc::from_raw(mine) });
                None
            }
        }
    }
}

impl Drop for OwnerCell {
    fn drop(&mut self) {
        // Exclusive access at pool teardown: release the current owner's
        // reference.
        let current = *self.flag.get_mut();
        if !current.is_null() {
            drop(unsafe { Arc::from_raw(current as *const AtomicBool) });
        }
    }
}
