//! # TrieKV
//!
//! A write-optimized, ordered, in-memory index ("memtable representation")
//! for log-structured key-value stores, with:
//! - A multi-trie patricia index over user keys with geometric arena growth
//! - Per-key version chains ordered newest-first by tag
//! - Sharded-mutex write discipline and a lock-free sealed read path
//! - A merging iterator across tries
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     MemTableRep surface                      │
//! │      insert / contains / get / seal / iterate                │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                    Trie vector  T[0] T[1] …                  │
//! │        (arena of T[i] doubles; appended when full)           │
//! └──────┬──────────────────────────────────────┬───────────────┘
//!        │ user key                             │ lex cursors
//!        ▼                                      ▼
//! ┌─────────────┐   payload slot        ┌──────────────┐
//! │  Patricia   │──────────────────────▶│   Merging    │
//! │    trie     │                       │   iterator   │
//! └──────┬──────┘                       └──────────────┘
//!        │ chain header
//!        ▼
//! ┌─────────────┐      shard(slot)      ┌──────────────┐
//! │   Version   │◀─────────────────────▶│ Shard mutex  │
//! │    chain    │   (skipped if sealed) │    array     │
//! └─────────────┘                       └──────────────┘
//! ```
//!
//! Writes are serialized by the caller; readers are wait-free through the
//! trie and lock a chain's shard only until the representation is sealed.

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod encoding;
pub mod arena;
pub mod chain;
pub mod trie;
pub mod rep;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{Result, TrieKvError};
pub use config::MemTableConfig;
pub use arena::SliceArena;
pub use rep::{
    new_patricia_rep_factory, BytewiseComparator, EntryHandle, MemTableRep, MemTableRepFactory,
    PatriciaRep, PatriciaRepFactory, RepIterator, SkipListRep, SkipListRepFactory, UserComparator,
};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of TrieKV
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
