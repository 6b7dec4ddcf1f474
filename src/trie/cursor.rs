//! Lexicographic trie cursor
//!
//! An explicit-stack cursor over the stored words of one trie, in byte-wise
//! lexicographic order. A word that is a prefix of another word sorts first,
//! which the node shape mirrors: a node's terminal precedes all of its
//! children.
//!
//! The cursor snapshots the trie's key count when created; `refresh` reports
//! when the trie has since grown past the refresh interval, at which point
//! the owner re-seeks to its last emitted word. Between refreshes the cursor
//! may hold superseded copy-on-write nodes: those still reach every word
//! published before the cursor read them, so nothing already observed is
//! ever lost.

use std::ptr::NonNull;

use super::node::TrieNode;
use super::{common_prefix, Trie};

/// Trie growth (in published keys) after which a cursor should re-seek.
pub const REFRESH_INTERVAL: usize = 1024;

struct Frame {
    node: usize,
    /// Length of the cursor key up to and including this node's prefix.
    key_len: usize,
    /// Child byte this frame descended into; None while the frame is the
    /// current position.
    came_from: Option<u8>,
}

/// Cursor over one trie's words in lexicographic order.
pub struct LexCursor<'t> {
    trie: &'t Trie,
    stack: Vec<Frame>,
    key: Vec<u8>,
    words_at_acquire: usize,
}

impl<'t> LexCursor<'t> {
    /// A cursor starts unpositioned; call a seek before reading.
    pub fn new(trie: &'t Trie) -> Self {
        Self {
            trie,
            stack: Vec::new(),
            key: Vec::new(),
            words_at_acquire: trie.num_words(),
        }
    }

    /// Positioned at a word?
    pub fn valid(&self) -> bool {
        !self.stack.is_empty()
    }

    /// The current word. Only meaningful while `valid`.
    pub fn word(&self) -> &[u8] {
        &self.key
    }

    /// Payload slot of the current word.
    pub fn payload(&self) -> Option<NonNull<usize>> {
        let top = self.stack.last()?;
        NonNull::new(unsafe { TrieNode::at(top.node) }.payload() as *mut usize)
    }

    /// True when the trie grew past [`REFRESH_INTERVAL`] since this cursor
    /// last snapshotted it; the snapshot is renewed and the owner must
    /// re-seek.
    pub fn refresh(&mut self) -> bool {
        let now = self.trie.num_words();
        if now - self.words_at_acquire > REFRESH_INTERVAL {
            self.words_at_acquire = now;
            return true;
        }
        false
    }

    // -------------------------------------------------------------------------
    // Seeks
    // -------------------------------------------------------------------------

    /// Position at the smallest word.
    pub fn seek_begin(&mut self) -> bool {
        self.clear();
        let root = self.trie.root_node();
        if root == 0 {
            return false;
        }
        self.descend_first(root)
    }

    /// Position at the largest word.
    pub fn seek_end(&mut self) -> bool {
        self.clear();
        let root = self.trie.root_node();
        if root == 0 {
            return false;
        }
        self.descend_last(root)
    }

    /// Position at the smallest word >= `target`.
    pub fn seek_lower_bound(&mut self, target: &[u8]) -> bool {
        self.clear();
        let root = self.trie.root_node();
        if root == 0 {
            return false;
        }
        let mut node = root;
        let mut pos = 0usize;
        loop {
            let n = unsafe { TrieNode::at(node) };
            let prefix = n.prefix();
            let rem = &target[pos..];
            let m = common_prefix(prefix, rem);
            self.push(node);

            if m == prefix.len() {
                pos += m;
                if pos == target.len() {
                    // exact word, or else everything below extends the target
                    if n.payload() != 0 {
                        return true;
                    }
                    return self.first_from_top();
                }
                let byte = target[pos];
                if let Some((child, _)) = n.find_child(byte) {
                    self.set_came_from(byte);
                    node = child;
                    continue;
                }
                return match n.min_child_above(Some(byte)) {
                    Some((next, child)) => {
                        self.set_came_from(next);
                        self.descend_first(child)
                    }
                    None => self.pop_advance(),
                };
            }
            if m == rem.len() || rem[m] < prefix[m] {
                // the whole subtree sorts after the target
                return self.first_from_top();
            }
            // the whole subtree sorts before the target
            return self.pop_advance();
        }
    }

    /// Position at the largest word <= `target`.
    pub fn seek_rev_lower_bound(&mut self, target: &[u8]) -> bool {
        self.clear();
        let root = self.trie.root_node();
        if root == 0 {
            return false;
        }
        let mut node = root;
        let mut pos = 0usize;
        loop {
            let n = unsafe { TrieNode::at(node) };
            let prefix = n.prefix();
            let rem = &target[pos..];
            let m = common_prefix(prefix, rem);
            self.push(node);

            if m == prefix.len() {
                pos += m;
                if pos == target.len() {
                    if n.payload() != 0 {
                        return true;
                    }
                    // subtree words all extend (exceed) the target
                    return self.pop_retreat();
                }
                let byte = target[pos];
                if let Some((child, _)) = n.find_child(byte) {
                    self.set_came_from(byte);
                    node = child;
                    continue;
                }
                if let Some((below, child)) = n.max_child_below(Some(byte)) {
                    self.set_came_from(below);
                    return self.descend_last(child);
                }
                if n.payload() != 0 {
                    // the node's own word is a proper prefix of the target
                    return true;
                }
                return self.pop_retreat();
            }
            if m == rem.len() || rem[m] < prefix[m] {
                return self.pop_retreat();
            }
            return self.last_from_top();
        }
    }

    // -------------------------------------------------------------------------
    // Stepping
    // -------------------------------------------------------------------------

    /// Advance to the next word. Invalidates at the end.
    pub fn incr(&mut self) -> bool {
        let Some(top) = self.stack.last() else {
            return false;
        };
        let n = unsafe { TrieNode::at(top.node) };
        if let Some((byte, child)) = n.min_child_above(None) {
            self.set_came_from(byte);
            return self.descend_first(child);
        }
        self.pop_advance()
    }

    /// Retreat to the previous word. Invalidates at the front.
    pub fn decr(&mut self) -> bool {
        if self.stack.is_empty() {
            return false;
        }
        self.pop_retreat()
    }

    // -------------------------------------------------------------------------
    // Internals
    // -------------------------------------------------------------------------

    fn clear(&mut self) {
        self.stack.clear();
        self.key.clear();
    }

    fn push(&mut self, node: usize) {
        let prefix = unsafe { TrieNode::at(node) }.prefix();
        self.key.extend_from_slice(prefix);
        self.stack.push(Frame {
            node,
            key_len: self.key.len(),
            came_from: None,
        });
    }

    fn set_came_from(&mut self, byte: u8) {
        if let Some(top) = self.stack.last_mut() {
            top.came_from = Some(byte);
        }
    }

    /// Smallest word at or below the node already on top of the stack.
    fn first_from_top(&mut self) -> bool {
        let Some(top) = self.stack.last() else {
            return false;
        };
        let n = unsafe { TrieNode::at(top.node) };
        if n.payload() != 0 {
            return true;
        }
        match n.min_child_above(None) {
            Some((byte, child)) => {
                self.set_came_from(byte);
                self.descend_first(child)
            }
            None => self.pop_advance(),
        }
    }

    /// Largest word at or below the node already on top of the stack.
    fn last_from_top(&mut self) -> bool {
        let Some(top) = self.stack.last() else {
            return false;
        };
        let n = unsafe { TrieNode::at(top.node) };
        match n.max_child_below(None) {
            Some((byte, child)) => {
                self.set_came_from(byte);
                self.descend_last(child)
            }
            None => {
                if n.payload() != 0 {
                    true
                } else {
                    self.pop_retreat()
                }
            }
        }
    }

    /// Walk down to the smallest word in `node`'s subtree.
    fn descend_first(&mut self, mut node: usize) -> bool {
        loop {
            self.push(node);
            let n = unsafe { TrieNode::at(node) };
            if n.payload() != 0 {
                return true;
            }
            match n.min_child_above(None) {
                Some((byte, child)) => {
                    self.set_came_from(byte);
                    node = child;
                }
                None => return self.pop_advance(),
            }
        }
    }

    /// Walk down to the largest word in `node`'s subtree.
    fn descend_last(&mut self, mut node: usize) -> bool {
        loop {
            self.push(node);
            let n = unsafe { TrieNode::at(node) };
            match n.max_child_below(None) {
                Some((byte, child)) => {
                    self.set_came_from(byte);
                    node = child;
                }
                None => {
                    if n.payload() != 0 {
                        return true;
                    }
                    return self.pop_retreat();
                }
            }
        }
    }

    /// Pop the current subtree and continue forward at the nearest unvisited
    /// right sibling.
    fn pop_advance(&mut self) -> bool {
        loop {
            self.stack.pop();
            let Some(parent) = self.stack.last() else {
                self.key.clear();
                return false;
            };
            let (pnode, pkey_len) = (parent.node, parent.key_len);
            let Some(from) = parent.came_from else {
                return false;
            };
            self.key.truncate(pkey_len);
            let n = unsafe { TrieNode::at(pnode) };
            if let Some((byte, child)) = n.min_child_above(Some(from)) {
                self.set_came_from(byte);
                return self.descend_first(child);
            }
        }
    }

    /// Pop the current subtree and continue backward: nearest left sibling's
    /// last word, else the parent's own word.
    fn pop_retreat(&mut self) -> bool {
        loop {
            self.stack.pop();
            let Some(parent) = self.stack.last() else {
                self.key.clear();
                return false;
            };
            let (pnode, pkey_len) = (parent.node, parent.key_len);
            let Some(from) = parent.came_from else {
                return false;
            };
            self.key.truncate(pkey_len);
            let n = unsafe { TrieNode::at(pnode) };
            if let Some((byte, child)) = n.max_child_below(Some(from)) {
                self.set_came_from(byte);
                return self.descend_last(child);
            }
            if n.payload() != 0 {
                self.set_came_from_none();
                return true;
            }
        }
    }

    fn set_came_from_none(&mut self) {
        if let Some(top) = self.stack.last_mut() {
            top.came_from = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::{Trie, TrieInsert};
    use super::*;

    fn build(keys: &[&[u8]]) -> Trie {
        let trie = Trie::new(1 << 20);
        for (i, key) in keys.iter().enumerate() {
            match trie.insert(key, |slot| unsafe { slot.as_ptr().write(i + 1) }) {
                TrieInsert::Inserted(_) => {}
                _ => panic!("insert failed for {:?}", key),
            }
        }
        trie
    }

    fn forward_words(trie: &Trie) -> Vec<Vec<u8>> {
        let mut cursor = LexCursor::new(trie);
        let mut words = Vec::new();
        let mut ok = cursor.seek_begin();
        while ok {
            words.push(cursor.word().to_vec());
            ok = cursor.incr();
        }
        words
    }

    #[test]
    fn test_forward_order() {
        let trie = build(&[b"banana", b"apple", b"app", b"cherry", b"apricot", b""]);
        let words = forward_words(&trie);
        let expected: Vec<Vec<u8>> = vec![
            b"".to_vec(),
            b"app".to_vec(),
            b"apple".to_vec(),
            b"apricot".to_vec(),
            b"banana".to_vec(),
            b"cherry".to_vec(),
        ];
        assert_eq!(words, expected);
    }

    #[test]
    fn test_backward_order() {
        let trie = build(&[b"banana", b"apple", b"app", b"cherry"]);
        let mut cursor = LexCursor::new(&trie);
        let mut words = Vec::new();
        let mut ok = cursor.seek_end();
        while ok {
            words.push(cursor.word().to_vec());
            ok = cursor.decr();
        }
        let expected: Vec<Vec<u8>> = vec![
            b"cherry".to_vec(),
            b"banana".to_vec(),
            b"apple".to_vec(),
            b"app".to_vec(),
        ];
        assert_eq!(words, expected);
    }

    #[test]
    fn test_lower_bound() {
        let trie = build(&[b"app", b"apple", b"banana", b"cherry"]);
        let mut cursor = LexCursor::new(&trie);
        assert!(cursor.seek_lower_bound(b"apple"));
        assert_eq!(cursor.word(), b"apple");
        assert!(cursor.seek_lower_bound(b"applf"));
        assert_eq!(cursor.word(), b"banana");
        assert!(cursor.seek_lower_bound(b"a"));
        assert_eq!(cursor.word(), b"app");
        assert!(!cursor.seek_lower_bound(b"dzz"));
        assert!(!cursor.valid());
    }

    #[test]
    fn test_rev_lower_bound() {
        let trie = build(&[b"app", b"apple", b"banana", b"cherry"]);
        let mut cursor = LexCursor::new(&trie);
        assert!(cursor.seek_rev_lower_bound(b"apple"));
        assert_eq!(cursor.word(), b"apple");
        assert!(cursor.seek_rev_lower_bound(b"applf"));
        assert_eq!(cursor.word(), b"apple");
        assert!(cursor.seek_rev_lower_bound(b"azzz"));
        assert_eq!(cursor.word(), b"apple");
        assert!(cursor.seek_rev_lower_bound(b"b"));
        assert_eq!(cursor.word(), b"apple");
        assert!(cursor.seek_rev_lower_bound(b"zzz"));
        assert_eq!(cursor.word(), b"cherry");
        assert!(!cursor.seek_rev_lower_bound(b"aa"));
        assert!(!cursor.valid());
    }

    #[test]
    fn test_many_keys_round_trip() {
        let keys: Vec<Vec<u8>> = (0..500u32)
            .map(|i| format!("key{:05}", i * 7 % 500).into_bytes())
            .collect();
        let refs: Vec<&[u8]> = keys.iter().map(|k| k.as_slice()).collect();
        let trie = build(&refs);
        let words = forward_words(&trie);
        assert_eq!(words.len(), 500);
        for pair in words.windows(2) {
            assert!(pair[0] < pair[1]);
        }
    }
}
