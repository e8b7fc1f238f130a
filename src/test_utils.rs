//! Test utilities
//!
//! Identity-tagged default-constructible object for pool tests. Every
//! construction gets a process-unique id, so duplicate-issue checks are
//! a matter of comparing ids across concurrent batches.

use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Default-constructible object with a unique identity
#[derive(Debug)]
pub struct TrackedObject {
    pub id: u64,
}

impl Default for TrackedObject {
    fn default() -> Self {
        Self {
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_unique() {
        let a = TrackedObject::default();
        let b = TrackedObject::default();
        assert_ne!(a.id, b.id);
    }
}
