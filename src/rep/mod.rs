//! Memtable representation
//!
//! The public surface a log-structured store programs against.
//!
//! ## Responsibilities
//! - The [`MemTableRep`] operations: two-phase `allocate`/`insert`, point
//!   `contains`/`get`, the one-way `mark_read_only` seal, memory accounting,
//!   and ordered iteration through [`RepIterator`]
//! - The patricia-trie representation ([`PatriciaRep`]) and the skiplist
//!   fallback ([`SkipListRep`])
//! - Factories that pick a representation per comparator
//!
//! ## Concurrency Model
//! One writer at a time (`insert` calls are serialized by the caller; the
//! factories report `is_insert_concurrently_supported() == false` for the
//! trie representation). Readers run concurrently with the writer and each
//! other. After `mark_read_only` no writer may run and readers skip all
//! locking. Iterators are owned by a single thread.

pub mod factory;
mod iter;
mod patricia;
mod shard;
mod skiplist;

pub use factory::{new_patricia_rep_factory, MemTableRepFactory, PatriciaRepFactory, SkipListRepFactory};
pub use patricia::PatriciaRep;
pub use skiplist::SkipListRep;

use crate::encoding::{encode_entry, MAX_VARINT32_LEN};
use crate::error::Result;

// =============================================================================
// Comparators
// =============================================================================

/// User-key ordering. Only [`BytewiseComparator`] is served by the trie
/// representation; factories delegate everything else.
pub trait UserComparator: Send + Sync {
    /// Stable identifier compared by factories.
    fn name(&self) -> &'static str;

    fn compare(&self, a: &[u8], b: &[u8]) -> std::cmp::Ordering;
}

/// Plain lexicographic byte ordering.
#[derive(Debug, Clone, Copy, Default)]
pub struct BytewiseComparator;

impl UserComparator for BytewiseComparator {
    fn name(&self) -> &'static str {
        "triekv.BytewiseComparator"
    }

    fn compare(&self, a: &[u8], b: &[u8]) -> std::cmp::Ordering {
        a.cmp(b)
    }
}

// =============================================================================
// Entry handle
// =============================================================================

/// Caller-owned buffer for one encoded record.
///
/// `allocate` hands out a handle, the caller encodes into it, and `insert`
/// consumes it; the buffer is freed when `insert` returns. The
/// representation copies what it needs into its arena, so the handle never
/// outlives the call.
pub struct EntryHandle {
    buf: Vec<u8>,
}

impl EntryHandle {
    /// Zero-filled buffer of exactly `len` bytes, with slack for varint
    /// re-encoding.
    pub fn with_len(len: usize) -> Self {
        let mut buf = Vec::with_capacity(len + 4);
        buf.resize(len, 0);
        Self { buf }
    }

    /// Wrap an already encoded record.
    pub fn from_encoded(bytes: Vec<u8>) -> Self {
        Self { buf: bytes }
    }

    /// Encode a record from its parts. Convenience for callers and tests.
    pub fn encode(user_key: &[u8], tag: u64, value: &[u8]) -> Self {
        Self {
            buf: encode_entry(user_key, tag, value),
        }
    }

    /// The buffer to encode into.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.buf
    }

    pub(crate) fn bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Worst-case encoded size for a record with the given key and value
    /// lengths. Useful with [`EntryHandle::with_len`].
    pub fn encoded_len(user_key_len: usize, value_len: usize) -> usize {
        MAX_VARINT32_LEN + user_key_len + 8 + MAX_VARINT32_LEN + value_len
    }
}

// =============================================================================
// Representation traits
// =============================================================================

/// Ordered in-memory index for fully encoded records.
pub trait MemTableRep: Send + Sync {
    /// Reserve a buffer for a record of `len` encoded bytes.
    fn allocate(&self, len: usize) -> EntryHandle {
        EntryHandle::with_len(len)
    }

    /// Insert one encoded record. The caller guarantees `(user_key, tag)`
    /// uniqueness and serializes `insert` calls; the buffer is freed before
    /// returning.
    fn insert(&self, handle: EntryHandle) -> Result<()>;

    /// Is a record with exactly this internal key present?
    fn contains(&self, internal_key: &[u8]) -> bool;

    /// Visit the revisions of the key, newest first, starting at the newest
    /// revision whose tag is <= the lookup tag. The callback receives the
    /// fully encoded record and returns false to stop. The slice is only
    /// valid for the duration of the call.
    fn get(&self, internal_key: &[u8], callback: &mut dyn FnMut(&[u8]) -> bool);

    /// One-way transition to immutable. After this returns no writer may
    /// run and readers skip shard locking. Idempotent.
    fn mark_read_only(&self);

    /// Bytes held by the representation's index structures.
    fn approximate_memory_usage(&self) -> usize;

    /// Number of records inserted.
    fn num_entries(&self) -> usize;

    /// Estimated records between two internal keys. Representations may
    /// decline to estimate.
    fn approximate_num_entries(&self, _start_internal_key: &[u8], _end_internal_key: &[u8]) -> u64 {
        0
    }

    /// Cursor over all records: user keys ascending, revisions within a key
    /// by descending tag. Starts out invalid; position it with a seek.
    fn iter(&self) -> Box<dyn RepIterator + '_>;
}

/// Cursor over a representation's records.
///
/// `key` borrows an internal buffer that is rewritten by every reposition;
/// callers copy it out before the next operation. Iterators are not
/// thread-safe.
pub trait RepIterator {
    fn valid(&self) -> bool;

    /// Encoded record at the current position. Only meaningful while
    /// `valid`.
    fn key(&self) -> &[u8];

    /// Advance. No-op when already past the end.
    fn next(&mut self);

    /// Retreat. No-op when already past the front.
    fn prev(&mut self);

    /// Position at the first record with internal key >= the target.
    fn seek(&mut self, internal_key: &[u8]);

    /// Position at the last record with internal key <= the target.
    fn seek_for_prev(&mut self, internal_key: &[u8]);

    fn seek_to_first(&mut self);

    fn seek_to_last(&mut self);
}
