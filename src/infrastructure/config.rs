//! Configuration management for the recycling engine
//!
//! Loads configuration from pool.toml at startup. All tuning values are
//! configurable to avoid hardcoded constants.

use serde::{Deserialize, Serialize};

use crate::{PoolError, Result};

/// Scaling strategy layered over the single pools
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    /// Fixed power-of-two shard array with phase-shifted cursors
    RoundRobin,
    /// CPU-partitioned fixed array with abandoned-slot reclamation
    Affinity,
    /// Lock-free growable list of thread-owned pools
    Growable,
}

/// Pool configuration
///
/// Loaded from pool.toml at startup. Contains all tunable parameters
/// to avoid hardcoded values throughout the codebase.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PoolConfig {
    /// Objects per basket; smaller baskets improve memory locality but
    /// make pool extension more frequent
    #[serde(default = "default_basket_size")]
    pub basket_size: usize,

    /// Maximum basket count; bounds the capacity ceiling at
    /// basket_size * max_baskets - 1 pooled objects
    #[serde(default = "default_max_baskets")]
    pub max_baskets: usize,

    /// Objects eagerly constructed into the first basket at startup;
    /// trades startup cost for early data locality
    #[serde(default = "default_pre_allocate")]
    pub pre_allocate: usize,

    /// Which scaling strategy serves acquire/release
    #[serde(default = "default_strategy")]
    pub strategy: Strategy,

    /// Shard count for the round-robin strategy; must be a power of two
    #[serde(default = "default_shard_count")]
    pub shard_count: usize,

    /// Pool slots per logical CPU for the affinity strategy
    #[serde(default = "default_pools_per_cpu")]
    pub pools_per_cpu: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            basket_size: default_basket_size(),
            max_baskets: default_max_baskets(),
            pre_allocate: default_pre_allocate(),
            strategy: default_strategy(),
            shard_count: default_shard_count(),
            pools_per_cpu: default_pools_per_cpu(),
        }
    }
}

fn default_basket_size() -> usize {
    1000
}

fn default_max_baskets() -> usize {
    100_000
}

fn default_pre_allocate() -> usize {
    100
}

fn default_strategy() -> Strategy {
    Strategy::Growable
}

fn default_shard_count() -> usize {
    16
}

fn default_pools_per_cpu() -> usize {
    2
}

impl PoolConfig {
    /// Load configuration from pool.toml
    ///
    /// The path can be overridden with POOL_CONFIG_PATH. A missing file
    /// yields the defaults.
    /// # Errors
    /// Returns an error if the file exists but cannot be parsed.
    pub fn load() -> Result<Self> {
        let config_path =
            std::env::var("POOL_CONFIG_PATH").unwrap_or_else(|_| "pool.toml".to_string());

        match std::fs::read_to_string(&config_path) {
            Ok(contents) => {
                let config: PoolConfig = toml::from_str(&contents)
                    .map_err(|e| PoolError::Config(format!("failed to parse {config_path}: {e}")))?;
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // File not found - use defaults
                Ok(PoolConfig::default())
            }
            Err(e) => Err(PoolError::Io(e)),
        }
    }

    /// Total addressable slots including the reserved sentinel slot 0
    #[inline]
    pub fn total_slots(&self) -> u128 {
        self.basket_size as u128 * self.max_baskets as u128
    }
}
