//! Patricia-trie representation
//!
//! The write-optimized representation: an append-only vector of patricia
//! tries keyed on the user key, each trie slot pointing at a version chain
//! holding that key's revisions in descending tag order.
//!
//! ## Data flow
//! A write allocates a version node in the shared arena, then offers the
//! user key to the tries in order. If the key already lives in a trie, the
//! new node is spliced into the existing chain under that chain's shard
//! lock. If the key is new and the trie has arena room, a fresh chain is
//! built and published atomically through the trie slot. If the trie's
//! arena refuses, the next trie (with a doubled arena) takes the insert,
//! appending it first when none exists yet.

use std::ptr::NonNull;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

use crate::arena::SliceArena;
use crate::chain::{self, ChainRoot, NIL};
use crate::encoding::{encode_entry_into, parse_entry, split_internal_key};
use crate::error::Result;
use crate::trie::{Trie, TrieInsert};

use super::iter::MergeIterator;
use super::shard::ShardedMutexes;
use super::{EntryHandle, MemTableRep, RepIterator};

/// Upfront trie-vector reserve. A memtable would need to grow its trie
/// arenas through 2^31 times the base block size to exhaust it.
const TRIE_VEC_CAPACITY: usize = 32;

// =============================================================================
// Trie vector
// =============================================================================

/// Append-only trie sequence with stable element references. Only the
/// serialized writer appends; readers load the length once per scan and see
/// a valid prefix.
pub(super) struct TrieVec {
    slots: Box<[OnceLock<Trie>]>,
    len: AtomicUsize,
}

impl TrieVec {
    fn new(first: Trie) -> Self {
        let slots: Box<[OnceLock<Trie>]> = (0..TRIE_VEC_CAPACITY)
            .map(|_| OnceLock::new())
            .collect::<Vec<_>>()
            .into_boxed_slice();
        let vec = Self {
            slots,
            len: AtomicUsize::new(0),
        };
        vec.push(first);
        vec
    }

    pub(super) fn len(&self) -> usize {
        self.len.load(Ordering::Acquire)
    }

    pub(super) fn get(&self, i: usize) -> Option<&Trie> {
        if i >= self.len() {
            return None;
        }
        self.slots.get(i)?.get()
    }

    pub(super) fn iter(&self) -> impl Iterator<Item = &Trie> {
        (0..self.len()).filter_map(move |i| self.get(i))
    }

    fn push(&self, trie: Trie) -> &Trie {
        let len = self.len.load(Ordering::Relaxed);
        debug_assert!(len < self.slots.len(), "trie vector reserve exhausted");
        let slot = &self.slots[len];
        let trie_ref = slot.get_or_init(|| trie);
        self.len.store(len + 1, Ordering::Release);
        trie_ref
    }
}

// =============================================================================
// Representation
// =============================================================================

/// Multi-trie patricia memtable representation.
pub struct PatriciaRep {
    tries: TrieVec,
    shards: ShardedMutexes,
    arena: Arc<SliceArena>,
    immutable: AtomicBool,
    num_entries: AtomicUsize,
}

impl PatriciaRep {
    /// Build over a shared arena. `sharding_count == 0` selects
    /// `2 * available_parallelism + 3`.
    pub fn new(sharding_count: usize, arena: Arc<SliceArena>) -> Self {
        let count = if sharding_count > 0 {
            sharding_count
        } else {
            crate::config::MemTableConfig::default().effective_sharding_count()
        };
        let first = Trie::new(arena.block_size());
        Self {
            tries: TrieVec::new(first),
            shards: ShardedMutexes::new(count),
            arena,
            immutable: AtomicBool::new(false),
            num_entries: AtomicUsize::new(0),
        }
    }

    /// Build from a validated config, owning a fresh arena.
    pub fn with_config(config: &crate::config::MemTableConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::new(
            config.effective_sharding_count(),
            Arc::new(SliceArena::new(config.arena_block_size)),
        ))
    }

    /// Number of tries currently backing the representation.
    pub fn trie_count(&self) -> usize {
        self.tries.len()
    }

    pub(super) fn tries(&self) -> &TrieVec {
        &self.tries
    }

    pub(super) fn shards(&self) -> &ShardedMutexes {
        &self.shards
    }

    pub(super) fn is_sealed(&self) -> bool {
        self.immutable.load(Ordering::Acquire)
    }

    /// Walk one chain from the newest revision with tag <= `tag`, invoking
    /// the callback with rebuilt records until it declines.
    fn emit_chain(
        &self,
        user_key: &[u8],
        tag: u64,
        slot: NonNull<usize>,
        sealed: bool,
        callback: &mut dyn FnMut(&[u8]) -> bool,
    ) {
        let chain = unsafe { chain_at(slot) };
        let _guard = (!sealed).then(|| self.shards.lock(slot.as_ptr() as usize));
        let mut buffer = Vec::new();
        unsafe {
            let mut node = chain.lower_bound(tag);
            while node != NIL {
                encode_entry_into(
                    &mut buffer,
                    user_key,
                    chain::node_tag(node),
                    chain::node_prefixed_value(node),
                );
                if !callback(&buffer) {
                    break;
                }
                node = chain::move_next(node);
            }
        }
    }

    /// Collect `(tag, prefixed_value)` pairs from one chain, newest first.
    fn collect_chain(
        &self,
        tag: u64,
        slot: NonNull<usize>,
        sealed: bool,
        out: &mut Vec<(u64, Vec<u8>)>,
    ) {
        let chain = unsafe { chain_at(slot) };
        let _guard = (!sealed).then(|| self.shards.lock(slot.as_ptr() as usize));
        unsafe {
            let mut node = chain.lower_bound(tag);
            while node != NIL {
                out.push((
                    chain::node_tag(node),
                    chain::node_prefixed_value(node).to_vec(),
                ));
                node = chain::move_next(node);
            }
        }
    }
}

/// Chain header behind a published payload slot.
///
/// # Safety
/// The slot must have been published by a trie insert; its pointee is
/// immutable after publication.
pub(super) unsafe fn chain_at<'a>(slot: NonNull<usize>) -> &'a ChainRoot {
    &*((*slot.as_ptr()) as *const ChainRoot)
}

impl MemTableRep for PatriciaRep {
    fn insert(&self, handle: EntryHandle) -> Result<()> {
        let entry = parse_entry(handle.bytes())?;
        let node = chain::alloc_node(&self.arena, entry.tag, entry.prefixed_value);

        let mut i = 0usize;
        while let Some(trie) = self.tries.get(i) {
            let arena = &self.arena;
            let outcome = trie.insert(entry.user_key, |slot| {
                // first revision of this key in this trie: build the chain
                // and publish its header through the slot
                let chain_ptr = ChainRoot::alloc_in(arena);
                unsafe {
                    (*chain_ptr.as_ptr()).insert_multi(node);
                    slot.as_ptr().write(chain_ptr.as_ptr() as usize);
                }
            });
            match outcome {
                TrieInsert::Inserted(_) => break,
                TrieInsert::Existed(slot) => {
                    let _guard = self.shards.lock(slot.as_ptr() as usize);
                    let chain = unsafe { chain_at(slot) };
                    unsafe { chain.insert_multi(node) };
                    break;
                }
                TrieInsert::ArenaFull => {
                    if i + 1 == self.tries.len() {
                        let arena_size = self
                            .arena
                            .block_size()
                            .checked_shl((i + 1) as u32)
                            .unwrap_or(usize::MAX);
                        tracing::debug!(trie = i + 1, arena_size, "appending trie");
                        self.tries.push(Trie::new(arena_size));
                    }
                    i += 1;
                }
            }
        }

        self.num_entries.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn contains(&self, internal_key: &[u8]) -> bool {
        let Ok((user_key, tag)) = split_internal_key(internal_key) else {
            return false;
        };
        let sealed = self.is_sealed();
        // a key may straddle tries, so a tag miss in one trie keeps probing
        for trie in self.tries.iter() {
            let Some(slot) = trie.lookup(user_key) else {
                continue;
            };
            let chain = unsafe { chain_at(slot) };
            let found = if sealed {
                unsafe { chain.equal_unique(tag) != NIL }
            } else {
                let _guard = self.shards.lock(slot.as_ptr() as usize);
                unsafe { chain.equal_unique(tag) != NIL }
            };
            if found {
                return true;
            }
        }
        false
    }

    fn get(&self, internal_key: &[u8], callback: &mut dyn FnMut(&[u8]) -> bool) {
        let Ok((user_key, tag)) = split_internal_key(internal_key) else {
            return;
        };
        let sealed = self.is_sealed();
        let mut slots: Vec<NonNull<usize>> = Vec::new();
        for trie in self.tries.iter() {
            if let Some(slot) = trie.lookup(user_key) {
                slots.push(slot);
            }
        }
        match slots.len() {
            0 => {}
            1 => self.emit_chain(user_key, tag, slots[0], sealed, callback),
            _ => {
                // the key straddles tries: merge the chains by tag before
                // emitting, locking one chain at a time
                let mut revisions: Vec<(u64, Vec<u8>)> = Vec::new();
                for slot in &slots {
                    self.collect_chain(tag, *slot, sealed, &mut revisions);
                }
                revisions.sort_by(|a, b| b.0.cmp(&a.0));
                let mut buffer = Vec::new();
                for (rev_tag, prefixed_value) in &revisions {
                    encode_entry_into(&mut buffer, user_key, *rev_tag, prefixed_value);
                    if !callback(&buffer) {
                        break;
                    }
                }
            }
        }
    }

    fn mark_read_only(&self) {
        if !self.immutable.swap(true, Ordering::AcqRel) {
            tracing::debug!(
                entries = self.num_entries.load(Ordering::Relaxed),
                tries = self.tries.len(),
                "memtable representation sealed"
            );
        }
    }

    fn approximate_memory_usage(&self) -> usize {
        self.tries.iter().map(|t| t.mem_size()).sum()
    }

    fn num_entries(&self) -> usize {
        self.num_entries.load(Ordering::Relaxed)
    }

    fn iter(&self) -> Box<dyn RepIterator + '_> {
        Box::new(MergeIterator::new(self))
    }
}
