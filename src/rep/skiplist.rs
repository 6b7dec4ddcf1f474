//! Skiplist representation
//!
//! Fallback memtable representation over a lock-free concurrent skip list.
//! Serves any comparator the trie representation declines (the trie only
//! understands bytewise ordering), and is the default fallback factory.
//!
//! Records are keyed by their internal key with (user key ascending, tag
//! descending) ordering, so iteration order matches the trie
//! representation's.

use std::ops::Bound;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crossbeam_skiplist::map::Entry;
use crossbeam_skiplist::SkipMap;

use crate::encoding::{
    encode_entry_into, make_internal_key, parse_entry, read_fixed64, split_internal_key, TAG_LEN,
};
use crate::error::Result;

use super::{EntryHandle, MemTableRep, RepIterator};

/// Internal key with memtable ordering: user key ascending, then tag
/// descending (newest revision first).
#[derive(Debug, PartialEq, Eq)]
pub struct InternalKey(Box<[u8]>);

impl InternalKey {
    fn new(user_key: &[u8], tag: u64) -> Self {
        Self(make_internal_key(user_key, tag).into_boxed_slice())
    }

    fn user_key(&self) -> &[u8] {
        &self.0[..self.0.len().saturating_sub(TAG_LEN)]
    }

    fn tag(&self) -> u64 {
        read_fixed64(&self.0[self.0.len().saturating_sub(TAG_LEN)..]).unwrap_or(0)
    }
}

impl Ord for InternalKey {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.user_key()
            .cmp(other.user_key())
            .then_with(|| other.tag().cmp(&self.tag()))
    }
}

impl PartialOrd for InternalKey {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// Skip-list backed memtable representation.
pub struct SkipListRep {
    map: SkipMap<InternalKey, Box<[u8]>>,
    mem_usage: AtomicUsize,
    num_entries: AtomicUsize,
    immutable: AtomicBool,
}

impl SkipListRep {
    pub fn new() -> Self {
        Self {
            map: SkipMap::new(),
            mem_usage: AtomicUsize::new(0),
            num_entries: AtomicUsize::new(0),
            immutable: AtomicBool::new(false),
        }
    }
}

impl Default for SkipListRep {
    fn default() -> Self {
        Self::new()
    }
}

impl MemTableRep for SkipListRep {
    fn insert(&self, handle: EntryHandle) -> Result<()> {
        let entry = parse_entry(handle.bytes())?;
        let key = InternalKey::new(entry.user_key, entry.tag);
        let value: Box<[u8]> = entry.prefixed_value.into();
        self.mem_usage
            .fetch_add(key.0.len() + value.len(), Ordering::Relaxed);
        self.map.insert(key, value);
        self.num_entries.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn contains(&self, internal_key: &[u8]) -> bool {
        let Ok((user_key, tag)) = split_internal_key(internal_key) else {
            return false;
        };
        self.map.get(&InternalKey::new(user_key, tag)).is_some()
    }

    fn get(&self, internal_key: &[u8], callback: &mut dyn FnMut(&[u8]) -> bool) {
        let Ok((user_key, tag)) = split_internal_key(internal_key) else {
            return;
        };
        let start = InternalKey::new(user_key, tag);
        let mut cursor = self.map.lower_bound(Bound::Included(&start));
        let mut buffer = Vec::new();
        while let Some(entry) = cursor {
            if entry.key().user_key() != user_key {
                break;
            }
            encode_entry_into(&mut buffer, user_key, entry.key().tag(), entry.value());
            if !callback(&buffer) {
                break;
            }
            cursor = entry.next();
        }
    }

    fn mark_read_only(&self) {
        self.immutable.store(true, Ordering::Release);
    }

    fn approximate_memory_usage(&self) -> usize {
        self.mem_usage.load(Ordering::Relaxed)
    }

    fn num_entries(&self) -> usize {
        self.num_entries.load(Ordering::Relaxed)
    }

    fn iter(&self) -> Box<dyn RepIterator + '_> {
        Box::new(SkipIterator {
            map: &self.map,
            current: None,
            buffer: Vec::new(),
        })
    }
}

struct SkipIterator<'a> {
    map: &'a SkipMap<InternalKey, Box<[u8]>>,
    current: Option<Entry<'a, InternalKey, Box<[u8]>>>,
    buffer: Vec<u8>,
}

impl SkipIterator<'_> {
    fn rebuild_buffer(&mut self) {
        if let Some(entry) = &self.current {
            encode_entry_into(
                &mut self.buffer,
                entry.key().user_key(),
                entry.key().tag(),
                entry.value(),
            );
        }
    }
}

impl RepIterator for SkipIterator<'_> {
    fn valid(&self) -> bool {
        self.current.is_some()
    }

    fn key(&self) -> &[u8] {
        &self.buffer
    }

    fn next(&mut self) {
        self.current = self.current.take().and_then(|e| e.next());
        self.rebuild_buffer();
    }

    fn prev(&mut self) {
        self.current = self.current.take().and_then(|e| e.prev());
        self.rebuild_buffer();
    }

    fn seek(&mut self, internal_key: &[u8]) {
        self.current = match split_internal_key(internal_key) {
            Ok((user_key, tag)) => self
                .map
                .lower_bound(Bound::Included(&InternalKey::new(user_key, tag))),
            Err(_) => None,
        };
        self.rebuild_buffer();
    }

    fn seek_for_prev(&mut self, internal_key: &[u8]) {
        self.current = match split_internal_key(internal_key) {
            Ok((user_key, tag)) => self
                .map
                .upper_bound(Bound::Included(&InternalKey::new(user_key, tag))),
            Err(_) => None,
        };
        self.rebuild_buffer();
    }

    fn seek_to_first(&mut self) {
        self.current = self.map.front();
        self.rebuild_buffer();
    }

    fn seek_to_last(&mut self) {
        self.current = self.map.back();
        self.rebuild_buffer();
    }
}
