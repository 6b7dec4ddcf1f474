//! Concurrent patricia trie
//!
//! Radix tree over user-key byte strings with per-node path compression and
//! a one-machine-word payload per stored key.
//!
//! ## Responsibilities
//! - Single-writer insert with a run-exactly-once `init_value` closure that
//!   fills the payload slot before the key becomes visible
//! - Wait-free lookup for concurrent readers (release-ordered publication,
//!   acquire-ordered traversal, copy-on-write structural changes)
//! - `ArenaFull` refusal once the trie's bounded arena is exhausted, which
//!   the representation answers by appending a geometrically larger trie
//! - Lexicographic cursors ([`LexCursor`]) over the stored keys
//!
//! ## Concurrency contract
//! Inserts are serialized by the representation (the factory reports no
//! concurrent-insert support). Readers never block: every pointer a reader
//! can follow was release-published after the memory behind it was fully
//! written, and superseded nodes stay arena-resident, so a reader or cursor
//! holding a stale node still observes the complete set of keys that existed
//! when it read that pointer.

mod cursor;
mod node;

pub use cursor::LexCursor;

use std::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::arena::SliceArena;

use node::{alloc_block, TrieNode};

/// Chunk granularity cap for per-trie arenas.
const MAX_TRIE_CHUNK: usize = 64 * 1024;

/// Outcome of [`Trie::insert`].
pub enum TrieInsert {
    /// First insertion of this key into this trie; `init_value` ran and the
    /// returned payload slot is now published.
    Inserted(NonNull<usize>),
    /// The key already lives in this trie; the payload slot is returned and
    /// `init_value` did not run.
    Existed(NonNull<usize>),
    /// The trie's arena refused to grow; nothing changed and `init_value`
    /// did not run.
    ArenaFull,
}

/// A single patricia trie with a bounded arena.
pub struct Trie {
    arena: SliceArena,
    /// Root node address, 0 while empty.
    root: AtomicUsize,
    num_words: AtomicUsize,
}

// Safety: shared state is published through atomics; node bodies are
// immutable after publication and arena chunks are pinned.
unsafe impl Send for Trie {}
unsafe impl Sync for Trie {}

impl Trie {
    /// Create a trie whose arena refuses to reserve more than `arena_limit`
    /// bytes.
    pub fn new(arena_limit: usize) -> Self {
        let chunk = arena_limit.min(MAX_TRIE_CHUNK);
        Self {
            arena: SliceArena::with_limit(chunk, arena_limit),
            root: AtomicUsize::new(0),
            num_words: AtomicUsize::new(0),
        }
    }

    /// Number of stored keys. Relaxed; used for emptiness checks and cursor
    /// refresh heuristics.
    pub fn num_words(&self) -> usize {
        self.num_words.load(Ordering::Relaxed)
    }

    /// Bytes reserved by this trie's arena.
    pub fn mem_size(&self) -> usize {
        self.arena.mem_size()
    }

    /// Wait-free point lookup. Returns the payload slot for `key`.
    pub fn lookup(&self, key: &[u8]) -> Option<NonNull<usize>> {
        let mut cur = self.root.load(Ordering::Acquire);
        if cur == 0 {
            return None;
        }
        let mut pos = 0usize;
        loop {
            let n = unsafe { TrieNode::at(cur) };
            let prefix = n.prefix();
            if key.len() - pos < prefix.len() || &key[pos..pos + prefix.len()] != prefix {
                return None;
            }
            pos += prefix.len();
            if pos == key.len() {
                return NonNull::new(n.payload() as *mut usize);
            }
            let (child, _) = n.find_child(key[pos])?;
            cur = child;
        }
    }

    /// Insert `key`, running `init_value` on the freshly allocated payload
    /// slot exactly when this is the first insertion of `key` into this trie.
    /// The closure must fully initialize the slot; publication happens after
    /// it returns.
    pub fn insert<F>(&self, key: &[u8], init_value: F) -> TrieInsert
    where
        F: FnOnce(NonNull<usize>),
    {
        let root = self.root.load(Ordering::Relaxed);
        if root == 0 {
            let Some((node_addr, slot)) = self.alloc_leaf(key) else {
                return TrieInsert::ArenaFull;
            };
            init_value(slot);
            self.root.store(node_addr, Ordering::Release);
            self.num_words.fetch_add(1, Ordering::Relaxed);
            return TrieInsert::Inserted(slot);
        }

        let mut cur = root;
        let mut pos = 0usize;
        // cell to publish a copy-on-write replacement of `cur` into
        let mut parent_cell: Option<&AtomicUsize> = None;
        loop {
            let n = unsafe { TrieNode::at(cur) };
            let prefix = n.prefix();
            let rem = &key[pos..];
            let m = common_prefix(prefix, rem);

            if m == prefix.len() {
                pos += m;
                if pos == key.len() {
                    // key ends exactly at this node
                    if let Some(slot) = NonNull::new(n.payload() as *mut usize) {
                        return TrieInsert::Existed(slot);
                    }
                    let Some(slot) = self.alloc_slot() else {
                        return TrieInsert::ArenaFull;
                    };
                    init_value(slot);
                    n.set_payload(slot.as_ptr() as usize);
                    self.num_words.fetch_add(1, Ordering::Relaxed);
                    return TrieInsert::Inserted(slot);
                }
                let byte = key[pos];
                if let Some((child, cell)) = n.find_child(byte) {
                    parent_cell = Some(cell);
                    cur = child;
                    continue;
                }
                // branch off with a fresh leaf
                let Some((leaf, slot)) = self.alloc_leaf(&key[pos..]) else {
                    return TrieInsert::ArenaFull;
                };
                init_value(slot);
                if !n.append_child(&self.arena, byte, leaf) {
                    return TrieInsert::ArenaFull;
                }
                self.num_words.fetch_add(1, Ordering::Relaxed);
                return TrieInsert::Inserted(slot);
            }

            // the prefix diverges at m: split this node
            return match self.split(n, key, pos, m, init_value) {
                Some((replacement, slot)) => {
                    match parent_cell {
                        Some(cell) => cell.store(replacement, Ordering::Release),
                        None => self.root.store(replacement, Ordering::Release),
                    }
                    self.num_words.fetch_add(1, Ordering::Relaxed);
                    TrieInsert::Inserted(slot)
                }
                None => TrieInsert::ArenaFull,
            };
        }
    }

    /// Build the replacement subtree for a split of `n` at prefix offset `m`.
    /// All allocation happens before the caller publishes, so a refusal
    /// leaves the trie untouched.
    fn split<F>(
        &self,
        n: &TrieNode,
        key: &[u8],
        pos: usize,
        m: usize,
        init_value: F,
    ) -> Option<(usize, NonNull<usize>)>
    where
        F: FnOnce(NonNull<usize>),
    {
        let prefix = n.prefix();
        // suffix half of the old node; shares the old prefix bytes
        let suffix_byte = prefix[m];
        let old_half = TrieNode::alloc(
            &self.arena,
            unsafe { n.prefix_ptr().add(m) },
            prefix.len() - m,
            n.payload_snapshot(),
            n.children_snapshot(),
        )?;

        let slot = self.alloc_slot()?;
        let (payload, block) = if pos + m == key.len() {
            // the new key ends at the split point
            let block = alloc_block(&self.arena, 4, &[(suffix_byte, old_half)])?;
            (slot.as_ptr() as usize, block)
        } else {
            let (leaf, _) = self.alloc_leaf_with_slot(&key[pos + m..], slot)?;
            let block = alloc_block(
                &self.arena,
                4,
                &[(suffix_byte, old_half), (key[pos + m], leaf)],
            )?;
            (0, block)
        };
        let replacement = TrieNode::alloc(&self.arena, n.prefix_ptr(), m, payload, block)?;
        init_value(slot);
        Some((replacement, slot))
    }

    fn alloc_slot(&self) -> Option<NonNull<usize>> {
        let ptr = self
            .arena
            .try_allocate_aligned(std::mem::size_of::<usize>())?;
        Some(ptr.cast())
    }

    /// Leaf node owning a stable copy of `suffix` plus a fresh payload slot.
    fn alloc_leaf(&self, suffix: &[u8]) -> Option<(usize, NonNull<usize>)> {
        let slot = self.alloc_slot()?;
        self.alloc_leaf_with_slot(suffix, slot)
    }

    fn alloc_leaf_with_slot(
        &self,
        suffix: &[u8],
        slot: NonNull<usize>,
    ) -> Option<(usize, NonNull<usize>)> {
        let prefix = self.arena.try_allocate_copy(suffix)?;
        let node = TrieNode::alloc(
            &self.arena,
            prefix.as_ptr(),
            suffix.len(),
            slot.as_ptr() as usize,
            0,
        )?;
        Some((node, slot))
    }

    fn root_node(&self) -> usize {
        self.root.load(Ordering::Acquire)
    }
}

fn common_prefix(a: &[u8], b: &[u8]) -> usize {
    let max = a.len().min(b.len());
    let mut i = 0;
    while i < max && a[i] == b[i] {
        i += 1;
    }
    i
}
