//! Lock-free object recycling pools
//!
//! Core library for allocation-minimizing object reuse under heavy
//! multi-threaded load. A single pool is a lock-free stack addressed by
//! one packed atomic word; the scaling layer fans that contract out
//! across many pools to cut cross-thread CAS contention.

pub mod core;
pub mod infrastructure;
pub mod scaling;

#[cfg(test)]
pub mod test_utils;

// Re-export commonly used types
pub use self::core::{HeadWord, SinglePool};
pub use infrastructure::config::{PoolConfig, Strategy};
pub use infrastructure::metrics::{MetricsSnapshot, PoolMetrics};
pub use scaling::{build_recycler, AffinityPool, GrowableListPool, Recycler, RoundRobinPool};

use thiserror::Error;

/// Main error type for the recycling engine
///
/// A bad configuration at construction is the only fatal condition in
/// the subsystem; acquire/release never fail.
#[derive(Error, Debug)]
pub enum PoolError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, PoolError>;
