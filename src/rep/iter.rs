//! Merging iterator
//!
//! Forward/backward cursor over every record in a [`PatriciaRep`]: user keys
//! in lexicographic order, revisions within a user key in descending tag
//! order. One lex cursor per trie feeds a binary heap; at each trie position
//! the iterator descends into the version chain under that position's shard
//! lock (skipped once the representation is sealed).
//!
//! A single-trie representation bypasses the heap entirely, mirroring the
//! four single/multi x locked/unlocked behavior variants.
//!
//! The emitted record lives in one reusable buffer that is rewritten on
//! every reposition; callers copy it out before the next operation.

use crate::chain::{self, NIL};
use crate::encoding::{encode_entry_into, parse_entry, split_internal_key};
use crate::trie::{LexCursor, Trie};

use super::patricia::{chain_at, PatriciaRep};
use super::RepIterator;

/// One trie's cursor plus its growth snapshot.
struct Item<'r> {
    trie: &'r Trie,
    cursor: LexCursor<'r>,
}

impl<'r> Item<'r> {
    fn new(trie: &'r Trie) -> Self {
        Self {
            trie,
            cursor: LexCursor::new(trie),
        }
    }
}

pub(super) struct MergeIterator<'r> {
    rep: &'r PatriciaRep,
    items: Vec<Item<'r>>,
    /// Indices into `items`, heap-ordered per `direction`. Unused when
    /// `single`.
    heap: Vec<usize>,
    single: bool,
    /// Shard locking captured at creation; sealed representations iterate
    /// lock-free.
    locked: bool,
    /// -1 backward, 0 unpositioned, 1 forward.
    direction: i8,
    /// Current version node, NIL when invalid.
    where_: usize,
    /// Item owning the current position.
    cur: usize,
    buffer: Vec<u8>,
}

impl<'r> MergeIterator<'r> {
    pub(super) fn new(rep: &'r PatriciaRep) -> Self {
        let items: Vec<Item<'r>> = rep.tries().iter().map(Item::new).collect();
        let single = items.len() == 1;
        let heap = Vec::with_capacity(items.len());
        Self {
            rep,
            items,
            heap,
            single,
            locked: !rep.is_sealed(),
            direction: 0,
            where_: NIL,
            cur: 0,
            buffer: Vec::new(),
        }
    }

    // -------------------------------------------------------------------------
    // Heap rebuild
    // -------------------------------------------------------------------------

    /// Re-seek every cursor and rebuild the heap for the given direction.
    fn rebuild<F>(&mut self, forward: bool, seek: F)
    where
        F: Fn(&mut LexCursor<'r>) -> bool,
    {
        self.direction = if forward { 1 } else { -1 };
        self.heap.clear();
        for (i, item) in self.items.iter_mut().enumerate() {
            item.cursor.refresh();
            if item.trie.num_words() > 0 && seek(&mut item.cursor) {
                self.heap.push(i);
            }
        }
        heapify(&self.items, &mut self.heap, forward);
    }

    /// Re-seek the current item when its trie grew past the refresh
    /// interval; the cursor returns to the word recorded in the buffer.
    fn refresh_current(&mut self) {
        let cur = self.cur;
        let Self { items, buffer, .. } = self;
        let item = &mut items[cur];
        if item.cursor.refresh() {
            item.cursor.seek_lower_bound(buffer_user_key(buffer));
        }
    }

    // -------------------------------------------------------------------------
    // Chain entry and record building
    // -------------------------------------------------------------------------

    /// Position `where_` at the front (newest) or back (oldest) of the
    /// current item's chain.
    fn enter_chain(&mut self, front: bool) -> bool {
        let Some(slot) = self.items[self.cur].cursor.payload() else {
            self.where_ = NIL;
            return false;
        };
        let chain = unsafe { chain_at(slot) };
        let _guard = self
            .locked
            .then(|| self.rep.shards().lock(slot.as_ptr() as usize));
        self.where_ = unsafe {
            if front {
                chain.most_left()
            } else {
                chain.most_right()
            }
        };
        self.where_ != NIL
    }

    /// Apply a chain positioning function under the current shard lock.
    fn chain_position<F>(&mut self, position: F) -> bool
    where
        F: FnOnce(&crate::chain::ChainRoot) -> usize,
    {
        let Some(slot) = self.items[self.cur].cursor.payload() else {
            self.where_ = NIL;
            return false;
        };
        let chain = unsafe { chain_at(slot) };
        let _guard = self
            .locked
            .then(|| self.rep.shards().lock(slot.as_ptr() as usize));
        self.where_ = position(chain);
        self.where_ != NIL
    }

    fn build_current(&mut self) {
        if self.where_ == NIL {
            return;
        }
        let cur = self.cur;
        let where_ = self.where_;
        let Self { items, buffer, .. } = self;
        unsafe {
            encode_entry_into(
                buffer,
                items[cur].cursor.word(),
                chain::node_tag(where_),
                chain::node_prefixed_value(where_),
            );
        }
    }

    // -------------------------------------------------------------------------
    // Trie-position stepping
    // -------------------------------------------------------------------------

    /// Advance to the next trie position and enter its chain at the front.
    fn item_next(&mut self) -> bool {
        if self.single {
            self.refresh_current();
            if !self.items[0].cursor.incr() {
                return false;
            }
        } else {
            if self.direction != 1 {
                let word = buffer_user_key(&self.buffer).to_vec();
                self.rebuild(true, |c| c.seek_lower_bound(&word));
                // skip the trie positions at or before the current one:
                // same word, same or lower trie index
                loop {
                    let Some(&top) = self.heap.first() else {
                        return false;
                    };
                    if self.items[top].cursor.word() == word.as_slice() && top <= self.cur {
                        self.advance_top();
                    } else {
                        break;
                    }
                }
            } else {
                self.refresh_current();
                self.advance_top();
            }
            let Some(&top) = self.heap.first() else {
                return false;
            };
            self.cur = top;
        }
        self.direction = 1;
        self.enter_chain(true)
    }

    /// Retreat to the previous trie position and enter its chain at the
    /// back.
    fn item_prev(&mut self) -> bool {
        if self.single {
            self.refresh_current();
            if !self.items[0].cursor.decr() {
                return false;
            }
        } else {
            if self.direction != -1 {
                let word = buffer_user_key(&self.buffer).to_vec();
                self.rebuild(false, |c| c.seek_rev_lower_bound(&word));
                // skip the positions at or before the current one in
                // backward order: same word, same or higher trie index
                loop {
                    let Some(&top) = self.heap.first() else {
                        return false;
                    };
                    if self.items[top].cursor.word() == word.as_slice() && top >= self.cur {
                        self.retreat_top();
                    } else {
                        break;
                    }
                }
            } else {
                self.refresh_current();
                self.retreat_top();
            }
            let Some(&top) = self.heap.first() else {
                return false;
            };
            self.cur = top;
        }
        self.direction = -1;
        self.enter_chain(false)
    }

    /// Pop the heap top, step its cursor forward, and push it back while it
    /// remains valid.
    fn advance_top(&mut self) {
        if let Some(idx) = heap_pop(&self.items, &mut self.heap, true) {
            if self.items[idx].cursor.incr() {
                heap_push(&self.items, &mut self.heap, true, idx);
            }
        }
    }

    fn retreat_top(&mut self) {
        if let Some(idx) = heap_pop(&self.items, &mut self.heap, false) {
            if self.items[idx].cursor.decr() {
                heap_push(&self.items, &mut self.heap, false, idx);
            }
        }
    }
}

impl RepIterator for MergeIterator<'_> {
    fn valid(&self) -> bool {
        self.where_ != NIL
    }

    fn key(&self) -> &[u8] {
        &self.buffer
    }

    fn next(&mut self) {
        if self.where_ == NIL {
            return;
        }
        if let Some(slot) = self.items[self.cur].cursor.payload() {
            let _guard = self
                .locked
                .then(|| self.rep.shards().lock(slot.as_ptr() as usize));
            self.where_ = unsafe { chain::move_next(self.where_) };
        } else {
            self.where_ = NIL;
        }
        if self.where_ == NIL && !self.item_next() {
            return;
        }
        self.build_current();
    }

    fn prev(&mut self) {
        if self.where_ == NIL {
            return;
        }
        if let Some(slot) = self.items[self.cur].cursor.payload() {
            let _guard = self
                .locked
                .then(|| self.rep.shards().lock(slot.as_ptr() as usize));
            self.where_ = unsafe { chain::move_prev(self.where_) };
        } else {
            self.where_ = NIL;
        }
        if self.where_ == NIL && !self.item_prev() {
            return;
        }
        self.build_current();
    }

    fn seek(&mut self, internal_key: &[u8]) {
        let Ok((user_key, tag)) = split_internal_key(internal_key) else {
            self.where_ = NIL;
            return;
        };
        if self.single {
            self.direction = 1;
            let item = &mut self.items[0];
            item.cursor.refresh();
            if item.trie.num_words() == 0 || !item.cursor.seek_lower_bound(user_key) {
                self.where_ = NIL;
                return;
            }
            self.cur = 0;
            let exact = self.items[0].cursor.word() == user_key;
            let positioned = if exact {
                // the tag bound belongs to this user key
                self.chain_position(|chain| unsafe { chain.lower_bound(tag) })
            } else {
                self.enter_chain(true)
            };
            if !positioned && (!exact || !self.item_next()) {
                self.where_ = NIL;
                return;
            }
        } else {
            self.rebuild(true, |c| c.seek_lower_bound(user_key));
            loop {
                let Some(&top) = self.heap.first() else {
                    self.where_ = NIL;
                    return;
                };
                self.cur = top;
                if self.items[top].cursor.word() == user_key {
                    if self.chain_position(|chain| unsafe { chain.lower_bound(tag) }) {
                        break;
                    }
                    // every revision here is newer than the bound; an older
                    // chain for the same key may live in another trie
                    self.advance_top();
                } else {
                    if !self.enter_chain(true) {
                        self.where_ = NIL;
                        return;
                    }
                    break;
                }
            }
        }
        self.build_current();
    }

    fn seek_for_prev(&mut self, internal_key: &[u8]) {
        let Ok((user_key, tag)) = split_internal_key(internal_key) else {
            self.where_ = NIL;
            return;
        };
        if self.single {
            self.direction = -1;
            let item = &mut self.items[0];
            item.cursor.refresh();
            if item.trie.num_words() == 0 || !item.cursor.seek_rev_lower_bound(user_key) {
                self.where_ = NIL;
                return;
            }
            self.cur = 0;
            let exact = self.items[0].cursor.word() == user_key;
            let positioned = if exact {
                self.chain_position(|chain| unsafe { chain.reverse_lower_bound(tag) })
            } else {
                self.enter_chain(false)
            };
            if !positioned && (!exact || !self.item_prev()) {
                self.where_ = NIL;
                return;
            }
        } else {
            self.rebuild(false, |c| c.seek_rev_lower_bound(user_key));
            loop {
                let Some(&top) = self.heap.first() else {
                    self.where_ = NIL;
                    return;
                };
                self.cur = top;
                if self.items[top].cursor.word() == user_key {
                    if self.chain_position(|chain| unsafe { chain.reverse_lower_bound(tag) }) {
                        break;
                    }
                    // every revision here is older than the bound; the same
                    // key may have a newer chain in another trie
                    self.retreat_top();
                } else {
                    if !self.enter_chain(false) {
                        self.where_ = NIL;
                        return;
                    }
                    break;
                }
            }
        }
        self.build_current();
    }

    fn seek_to_first(&mut self) {
        if self.single {
            self.direction = 1;
            let item = &mut self.items[0];
            item.cursor.refresh();
            if item.trie.num_words() == 0 || !item.cursor.seek_begin() {
                self.where_ = NIL;
                return;
            }
            self.cur = 0;
        } else {
            self.rebuild(true, |c| c.seek_begin());
            let Some(&top) = self.heap.first() else {
                self.where_ = NIL;
                return;
            };
            self.cur = top;
        }
        if self.enter_chain(true) {
            self.build_current();
        }
    }

    fn seek_to_last(&mut self) {
        if self.single {
            self.direction = -1;
            let item = &mut self.items[0];
            item.cursor.refresh();
            if item.trie.num_words() == 0 || !item.cursor.seek_end() {
                self.where_ = NIL;
                return;
            }
            self.cur = 0;
        } else {
            self.rebuild(false, |c| c.seek_end());
            let Some(&top) = self.heap.first() else {
                self.where_ = NIL;
                return;
            };
            self.cur = top;
        }
        if self.enter_chain(false) {
            self.build_current();
        }
    }
}

/// User key recorded in the iterator's output buffer.
fn buffer_user_key(buffer: &[u8]) -> &[u8] {
    parse_entry(buffer).map(|e| e.user_key).unwrap_or(&[])
}

// =============================================================================
// Binary heap over item indices
// =============================================================================

/// Heap priority: ascending word for forward iteration, descending for
/// backward. Equal words tie-break on trie index. A key's newer chain
/// always sits at a lower trie index (a fresh chain is only ever created in
/// a trie earlier in the insert scan than the existing one), so forward
/// iteration visits lower indices first to keep revisions newest-first.
fn item_before(items: &[Item<'_>], a: usize, b: usize, forward: bool) -> bool {
    let wa = items[a].cursor.word();
    let wb = items[b].cursor.word();
    match (forward, wa.cmp(wb)) {
        (true, std::cmp::Ordering::Less) => true,
        (true, std::cmp::Ordering::Greater) => false,
        (true, std::cmp::Ordering::Equal) => a < b,
        (false, std::cmp::Ordering::Greater) => true,
        (false, std::cmp::Ordering::Less) => false,
        (false, std::cmp::Ordering::Equal) => a > b,
    }
}

fn heapify(items: &[Item<'_>], heap: &mut [usize], forward: bool) {
    for i in (0..heap.len() / 2).rev() {
        sift_down(items, heap, i, forward);
    }
}

fn sift_down(items: &[Item<'_>], heap: &mut [usize], mut pos: usize, forward: bool) {
    loop {
        let left = pos * 2 + 1;
        if left >= heap.len() {
            return;
        }
        let mut best = left;
        let right = left + 1;
        if right < heap.len() && item_before(items, heap[right], heap[left], forward) {
            best = right;
        }
        if item_before(items, heap[best], heap[pos], forward) {
            heap.swap(best, pos);
            pos = best;
        } else {
            return;
        }
    }
}

fn sift_up(items: &[Item<'_>], heap: &mut [usize], mut pos: usize, forward: bool) {
    while pos > 0 {
        let parent = (pos - 1) / 2;
        if item_before(items, heap[pos], heap[parent], forward) {
            heap.swap(pos, parent);
            pos = parent;
        } else {
            return;
        }
    }
}

fn heap_pop(items: &[Item<'_>], heap: &mut Vec<usize>, forward: bool) -> Option<usize> {
    if heap.is_empty() {
        return None;
    }
    let last = heap.len() - 1;
    heap.swap(0, last);
    let top = heap.pop();
    if !heap.is_empty() {
        sift_down(items, heap, 0, forward);
    }
    top
}

fn heap_push(items: &[Item<'_>], heap: &mut Vec<usize>, forward: bool, idx: usize) {
    heap.push(idx);
    let last = heap.len() - 1;
    sift_up(items, heap, last, forward);
}
