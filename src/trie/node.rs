//! Trie node layout
//!
//! Nodes live in the trie's bounded arena. A node body is immutable after
//! publication except for two atomic cells: the payload slot pointer (set
//! once when the node's word becomes a stored key) and the children block
//! pointer (swapped when the child array grows). Superseded copy-on-write
//! nodes stay arena-resident, so a stale reader or cursor always sees a
//! consistent (if dated) subtree.

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::arena::SliceArena;

/// Node header. The prefix bytes and the children block are separate arena
/// allocations referenced by address.
#[repr(C)]
pub(crate) struct TrieNode {
    prefix_ptr: *const u8,
    prefix_len: u32,
    _pad: u32,
    /// Address of the one-word payload slot; 0 while no key ends here.
    payload: AtomicUsize,
    /// Address of the children block; 0 while the node is a leaf.
    children: AtomicUsize,
}

/// Children block: a length-tracked, unsorted array of (byte, child address)
/// pairs. The length lives inside the block so a reader never pairs a new
/// length with an old block.
///
/// Layout: header, `cap` key bytes (padded to a word), `cap` child cells.
#[repr(C)]
struct ChildBlock {
    len: AtomicUsize,
    cap: usize,
}

const HEADER: usize = std::mem::size_of::<ChildBlock>();

#[inline]
fn keys_offset() -> usize {
    HEADER
}

#[inline]
fn cells_offset(cap: usize) -> usize {
    HEADER + ((cap + 7) & !7)
}

#[inline]
fn block_size(cap: usize) -> usize {
    cells_offset(cap) + cap * std::mem::size_of::<AtomicUsize>()
}

#[inline]
unsafe fn block(addr: usize) -> *const ChildBlock {
    addr as *const ChildBlock
}

#[inline]
unsafe fn block_key(addr: usize, i: usize) -> u8 {
    *((addr + keys_offset() + i) as *const u8)
}

#[inline]
unsafe fn block_cell(addr: usize, i: usize) -> &'static AtomicUsize {
    let cap = (*block(addr)).cap;
    &*((addr + cells_offset(cap) + i * std::mem::size_of::<AtomicUsize>()) as *const AtomicUsize)
}

impl TrieNode {
    /// Allocate a node in `arena`. `prefix_ptr` must already point at stable
    /// arena bytes. Returns the node address, or None when the arena refuses.
    pub(crate) fn alloc(
        arena: &SliceArena,
        prefix_ptr: *const u8,
        prefix_len: usize,
        payload: usize,
        children: usize,
    ) -> Option<usize> {
        let ptr = arena.try_allocate_aligned(std::mem::size_of::<TrieNode>())?;
        let addr = ptr.as_ptr() as usize;
        unsafe {
            let node = addr as *mut TrieNode;
            (*node).prefix_ptr = prefix_ptr;
            (*node).prefix_len = prefix_len as u32;
            (*node)._pad = 0;
            (*node).payload = AtomicUsize::new(payload);
            (*node).children = AtomicUsize::new(children);
        }
        Some(addr)
    }

    #[inline]
    pub(crate) unsafe fn at<'a>(addr: usize) -> &'a TrieNode {
        &*(addr as *const TrieNode)
    }

    #[inline]
    pub(crate) fn prefix(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.prefix_ptr, self.prefix_len as usize) }
    }

    #[inline]
    pub(crate) fn prefix_ptr(&self) -> *const u8 {
        self.prefix_ptr
    }

    /// Payload slot address, 0 when absent. Acquire-paired with the release
    /// publication in `set_payload`.
    #[inline]
    pub(crate) fn payload(&self) -> usize {
        self.payload.load(Ordering::Acquire)
    }

    /// Publish the payload slot. The slot must be fully initialized first.
    #[inline]
    pub(crate) fn set_payload(&self, slot: usize) {
        self.payload.store(slot, Ordering::Release);
    }

    #[inline]
    pub(crate) fn payload_snapshot(&self) -> usize {
        self.payload.load(Ordering::Relaxed)
    }

    #[inline]
    pub(crate) fn children_snapshot(&self) -> usize {
        self.children.load(Ordering::Relaxed)
    }

    /// Child for exactly `byte`, along with the cell it was read from (the
    /// cell is the publication point for copy-on-write replacements).
    pub(crate) fn find_child(&self, byte: u8) -> Option<(usize, &AtomicUsize)> {
        let blk = self.children.load(Ordering::Acquire);
        if blk == 0 {
            return None;
        }
        unsafe {
            let len = (*block(blk)).len.load(Ordering::Acquire);
            for i in 0..len {
                if block_key(blk, i) == byte {
                    let cell = block_cell(blk, i);
                    return Some((cell.load(Ordering::Acquire), cell));
                }
            }
        }
        None
    }

    /// Smallest child byte strictly above `bound` (`None` = no bound).
    pub(crate) fn min_child_above(&self, bound: Option<u8>) -> Option<(u8, usize)> {
        let blk = self.children.load(Ordering::Acquire);
        if blk == 0 {
            return None;
        }
        unsafe {
            let len = (*block(blk)).len.load(Ordering::Acquire);
            let mut best: Option<(u8, usize)> = None;
            for i in 0..len {
                let key = block_key(blk, i);
                if let Some(b) = bound {
                    if key <= b {
                        continue;
                    }
                }
                if best.map_or(true, |(bk, _)| key < bk) {
                    best = Some((key, i));
                }
            }
            best.map(|(key, i)| (key, block_cell(blk, i).load(Ordering::Acquire)))
        }
    }

    /// Largest child byte strictly below `bound` (`None` = no bound).
    pub(crate) fn max_child_below(&self, bound: Option<u8>) -> Option<(u8, usize)> {
        let blk = self.children.load(Ordering::Acquire);
        if blk == 0 {
            return None;
        }
        unsafe {
            let len = (*block(blk)).len.load(Ordering::Acquire);
            let mut best: Option<(u8, usize)> = None;
            for i in 0..len {
                let key = block_key(blk, i);
                if let Some(b) = bound {
                    if key >= b {
                        continue;
                    }
                }
                if best.map_or(true, |(bk, _)| key > bk) {
                    best = Some((key, i));
                }
            }
            best.map(|(key, i)| (key, block_cell(blk, i).load(Ordering::Acquire)))
        }
    }

    /// Append a child, growing or creating the block as needed. Single-writer
    /// only. Returns false when the arena refuses.
    pub(crate) fn append_child(&self, arena: &SliceArena, byte: u8, child: usize) -> bool {
        let blk = self.children.load(Ordering::Relaxed);
        if blk == 0 {
            let Some(new_blk) = alloc_block(arena, 4, &[(byte, child)]) else {
                return false;
            };
            self.children.store(new_blk, Ordering::Release);
            return true;
        }
        unsafe {
            let len = (*block(blk)).len.load(Ordering::Relaxed);
            let cap = (*block(blk)).cap;
            if len < cap {
                *((blk + keys_offset() + len) as *mut u8) = byte;
                block_cell(blk, len).store(child, Ordering::Relaxed);
                // publishes the new entry together with the key byte above
                (*block(blk)).len.store(len + 1, Ordering::Release);
                return true;
            }
            // grow by copy; the old block stays valid for stale readers
            let mut entries = Vec::with_capacity(len + 1);
            for i in 0..len {
                entries.push((block_key(blk, i), block_cell(blk, i).load(Ordering::Relaxed)));
            }
            entries.push((byte, child));
            let Some(new_blk) = alloc_block(arena, cap * 2, &entries) else {
                return false;
            };
            self.children.store(new_blk, Ordering::Release);
        }
        true
    }
}

/// Allocate a children block pre-filled with `entries`.
pub(crate) fn alloc_block(arena: &SliceArena, cap: usize, entries: &[(u8, usize)]) -> Option<usize> {
    let cap = cap.max(entries.len());
    let ptr = arena.try_allocate_aligned(block_size(cap))?;
    let addr = ptr.as_ptr() as usize;
    unsafe {
        let hdr = addr as *mut ChildBlock;
        (*hdr).len = AtomicUsize::new(entries.len());
        (*hdr).cap = cap;
        for (i, &(byte, child)) in entries.iter().enumerate() {
            *((addr + keys_offset() + i) as *mut u8) = byte;
            block_cell(addr, i).store(child, Ordering::Relaxed);
        }
    }
    Some(addr)
}
