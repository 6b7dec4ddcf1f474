//! Configuration for TrieKV
//!
//! Centralized configuration with sensible defaults.

use crate::error::{Result, TrieKvError};

/// Hard upper bound for the base arena block size (1 GiB)
const MAX_ARENA_BLOCK_SIZE: usize = 1 << 30;

/// Configuration for a memtable representation instance
#[derive(Debug, Clone)]
pub struct MemTableConfig {
    // -------------------------------------------------------------------------
    // Sharding Configuration
    // -------------------------------------------------------------------------
    /// Number of mutexes in the shard lock array.
    /// 0 means auto-select: `2 * available_parallelism + 3`.
    pub sharding_count: usize,

    // -------------------------------------------------------------------------
    // Arena Configuration
    // -------------------------------------------------------------------------
    /// Base arena block size in bytes. The first trie's arena holds one
    /// block of this size; each appended trie doubles it.
    pub arena_block_size: usize,
}

impl Default for MemTableConfig {
    fn default() -> Self {
        Self {
            sharding_count: 0,
            arena_block_size: 4096,
        }
    }
}

impl MemTableConfig {
    /// Create a new config builder
    pub fn builder() -> MemTableConfigBuilder {
        MemTableConfigBuilder::default()
    }

    /// Validate field ranges
    pub fn validate(&self) -> Result<()> {
        if self.arena_block_size == 0 {
            return Err(TrieKvError::Config(
                "arena_block_size must be non-zero".to_string(),
            ));
        }
        if self.arena_block_size > MAX_ARENA_BLOCK_SIZE {
            return Err(TrieKvError::Config(format!(
                "arena_block_size {} exceeds maximum {}",
                self.arena_block_size, MAX_ARENA_BLOCK_SIZE
            )));
        }
        Ok(())
    }

    /// Effective shard count: the configured value, or `2 * parallelism + 3`
    /// when left at 0.
    pub fn effective_sharding_count(&self) -> usize {
        if self.sharding_count > 0 {
            self.sharding_count
        } else {
            let parallelism = std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1);
            parallelism * 2 + 3
        }
    }
}

/// Builder for MemTableConfig
#[derive(Default)]
pub struct MemTableConfigBuilder {
    config: MemTableConfig,
}

impl MemTableConfigBuilder {
    pub fn sharding_count(mut self, count: usize) -> Self {
        self.config.sharding_count = count;
        self
    }

    pub fn arena_block_size(mut self, bytes: usize) -> Self {
        self.config.arena_block_size = bytes;
        self
    }

    pub fn build(self) -> MemTableConfig {
        self.config
    }
}
