//! Hot-key cache configuration

use crate::skiplist::{DEFAULT_BRANCHING, DEFAULT_HEIGHT_LIMIT, DEFAULT_HEIGHT_SEED};

/// Configuration for a [`HotKeyCache`](crate::cache::HotKeyCache)
#[derive(Debug, Clone)]
pub struct HotCacheConfig {
    /// Tallest level a skip-list node may reach (default 12, enough
    /// for working sets into the millions of keys)
    pub max_height: usize,
    /// Branching factor of the height distribution: each extra level
    /// is drawn with probability 1/branching (default 4)
    pub branching: u32,
    /// Seed for the deterministic height generator
    pub height_seed: u64,
    /// Initial capacity of the direct index; sizing for the expected
    /// hot set avoids rehash spikes on the write path
    pub initial_capacity: usize,
}

impl Default for HotCacheConfig {
    fn default() -> Self {
        Self {
            max_height: DEFAULT_HEIGHT_LIMIT,
            branching: DEFAULT_BRANCHING,
            height_seed: DEFAULT_HEIGHT_SEED,
            initial_capacity: 1024,
        }
    }
}

impl HotCacheConfig {
    /// Create the default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the skip-list height limit (clamped to at least 1)
    pub fn with_max_height(mut self, max_height: usize) -> Self {
        self.max_height = max_height.max(1);
        self
    }

    /// Set the height-distribution branching factor (clamped to at
    /// least 2)
    pub fn with_branching(mut self, branching: u32) -> Self {
        self.branching = branching.max(2);
        self
    }

    /// Set the height generator seed
    pub fn with_height_seed(mut self, seed: u64) -> Self {
        self.height_seed = seed;
        self
    }

    /// Set the direct index's initial capacity
    pub fn with_initial_capacity(mut self, capacity: usize) -> Self {
        self.initial_capacity = capacity;
        self
    }
}
