//! Patricia trie tests
//!
//! Tests verify:
//! - Insert/lookup including prefix-of-another-key shapes
//! - init_value runs exactly once per key per trie
//! - Arena refusal on bounded arenas
//! - Payload slot address stability across later growth
//! - Lexicographic cursor order against a model
//! - Cursor behavior while the trie keeps growing

use std::collections::BTreeSet;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use triekv::trie::{LexCursor, Trie, TrieInsert};

fn insert_value(trie: &Trie, key: &[u8], value: usize) -> TrieInsert {
    trie.insert(key, |slot| unsafe { slot.as_ptr().write(value) })
}

fn must_insert(trie: &Trie, key: &[u8], value: usize) {
    match insert_value(trie, key, value) {
        TrieInsert::Inserted(_) => {}
        TrieInsert::Existed(_) => panic!("duplicate insert for {:?}", key),
        TrieInsert::ArenaFull => panic!("arena refused {:?}", key),
    }
}

fn read(trie: &Trie, key: &[u8]) -> Option<usize> {
    trie.lookup(key).map(|slot| unsafe { *slot.as_ptr() })
}

// =============================================================================
// Insert / Lookup Tests
// =============================================================================

#[test]
fn test_insert_and_lookup_model() {
    let mut rng = StdRng::seed_from_u64(11);
    let trie = Trie::new(1 << 22);
    let mut model = BTreeSet::new();
    let mut keys: Vec<Vec<u8>> = (0..2000u32)
        .map(|i| format!("user/{:06}/attr{}", i % 700, i % 13).into_bytes())
        .collect();
    keys.shuffle(&mut rng);

    for (i, key) in keys.iter().enumerate() {
        match insert_value(&trie, key, i) {
            TrieInsert::Inserted(_) => assert!(model.insert(key.clone())),
            TrieInsert::Existed(_) => assert!(model.contains(key)),
            TrieInsert::ArenaFull => panic!("arena refused"),
        }
    }
    assert_eq!(trie.num_words(), model.len());

    for key in &model {
        assert!(read(&trie, key).is_some(), "missing {:?}", key);
    }
    assert_eq!(read(&trie, b"user/"), None);
    assert_eq!(read(&trie, b"zzz"), None);
}

#[test]
fn test_prefix_shapes() {
    let trie = Trie::new(1 << 20);
    must_insert(&trie, b"a", 1);
    must_insert(&trie, b"ab", 2);
    must_insert(&trie, b"abc", 3);
    must_insert(&trie, b"abd", 4);
    must_insert(&trie, b"b", 5);
    must_insert(&trie, b"", 6);

    assert_eq!(read(&trie, b"a"), Some(1));
    assert_eq!(read(&trie, b"ab"), Some(2));
    assert_eq!(read(&trie, b"abc"), Some(3));
    assert_eq!(read(&trie, b"abd"), Some(4));
    assert_eq!(read(&trie, b"b"), Some(5));
    assert_eq!(read(&trie, b""), Some(6));
    assert_eq!(read(&trie, b"abe"), None);
    assert_eq!(read(&trie, b"abcd"), None);
}

#[test]
fn test_init_value_runs_once() {
    let trie = Trie::new(1 << 20);
    let mut runs = 0;
    for _ in 0..3 {
        let outcome = trie.insert(b"same-key", |slot| {
            runs += 1;
            unsafe { slot.as_ptr().write(99) };
        });
        match outcome {
            TrieInsert::Inserted(_) => assert_eq!(runs, 1),
            TrieInsert::Existed(slot) => assert_eq!(unsafe { *slot.as_ptr() }, 99),
            TrieInsert::ArenaFull => panic!("arena refused"),
        }
    }
    assert_eq!(runs, 1);
    assert_eq!(trie.num_words(), 1);
}

// =============================================================================
// Arena Bound Tests
// =============================================================================

#[test]
fn test_bounded_arena_refuses_and_stays_consistent() {
    let trie = Trie::new(512);
    let mut inserted = Vec::new();
    for i in 0..1000u32 {
        let key = format!("key-{i:05}").into_bytes();
        match insert_value(&trie, &key, i as usize) {
            TrieInsert::Inserted(_) => inserted.push((key, i as usize)),
            TrieInsert::ArenaFull => break,
            TrieInsert::Existed(_) => panic!("duplicate"),
        }
    }
    assert!(!inserted.is_empty());
    assert!(inserted.len() < 1000, "512 bytes cannot hold 1000 keys");
    assert_eq!(trie.num_words(), inserted.len());
    // everything inserted before the refusal is still readable
    for (key, value) in &inserted {
        assert_eq!(read(&trie, key), Some(*value));
    }
    assert!(trie.mem_size() <= 512);
}

#[test]
fn test_payload_slots_stable_under_growth() {
    let trie = Trie::new(1 << 22);
    must_insert(&trie, b"pinned", 1234);
    let slot = trie.lookup(b"pinned").unwrap();
    for i in 0..3000u32 {
        must_insert(&trie, format!("churn/{i:06}").as_bytes(), i as usize);
    }
    assert_eq!(trie.lookup(b"pinned").unwrap(), slot);
    assert_eq!(unsafe { *slot.as_ptr() }, 1234);
}

// =============================================================================
// Cursor Tests
// =============================================================================

#[test]
fn test_cursor_matches_model_order() {
    let mut rng = StdRng::seed_from_u64(23);
    let trie = Trie::new(1 << 22);
    let mut model = BTreeSet::new();
    for _ in 0..1500 {
        let len = rng.gen_range(0..12);
        let key: Vec<u8> = (0..len).map(|_| rng.gen_range(b'a'..=b'f')).collect();
        match insert_value(&trie, &key, 1) {
            TrieInsert::Inserted(_) => {
                model.insert(key);
            }
            TrieInsert::Existed(_) => {}
            TrieInsert::ArenaFull => panic!("arena refused"),
        }
    }

    let mut cursor = LexCursor::new(&trie);
    let mut forward = Vec::new();
    let mut ok = cursor.seek_begin();
    while ok {
        forward.push(cursor.word().to_vec());
        ok = cursor.incr();
    }
    let expected: Vec<Vec<u8>> = model.iter().cloned().collect();
    assert_eq!(forward, expected);

    let mut backward = Vec::new();
    ok = cursor.seek_end();
    while ok {
        backward.push(cursor.word().to_vec());
        ok = cursor.decr();
    }
    let mut reversed = expected.clone();
    reversed.reverse();
    assert_eq!(backward, reversed);
}

#[test]
fn test_cursor_bound_seeks_match_model() {
    let mut rng = StdRng::seed_from_u64(31);
    let trie = Trie::new(1 << 22);
    let mut model = BTreeSet::new();
    for i in 0..800u32 {
        let key = format!("{:04}", (i * 37) % 1000).into_bytes();
        if matches!(insert_value(&trie, &key, 1), TrieInsert::Inserted(_)) {
            model.insert(key);
        }
    }

    let mut cursor = LexCursor::new(&trie);
    for _ in 0..500 {
        let probe = format!("{:04}", rng.gen_range(0..1100)).into_bytes();

        let expected_lb = model.range(probe.clone()..).next();
        let got = cursor.seek_lower_bound(&probe);
        assert_eq!(got, expected_lb.is_some(), "lower bound of {:?}", probe);
        if let Some(expected) = expected_lb {
            assert_eq!(cursor.word(), expected.as_slice());
        }

        let expected_rlb = model.range(..=probe.clone()).next_back();
        let got = cursor.seek_rev_lower_bound(&probe);
        assert_eq!(got, expected_rlb.is_some(), "rev lower bound of {:?}", probe);
        if let Some(expected) = expected_rlb {
            assert_eq!(cursor.word(), expected.as_slice());
        }
    }
}

#[test]
fn test_cursor_sees_preexisting_keys_despite_growth() {
    let trie = Trie::new(1 << 22);
    for i in 0..100u32 {
        must_insert(&trie, format!("stable/{i:03}").as_bytes(), i as usize);
    }
    let mut cursor = LexCursor::new(&trie);
    assert!(cursor.seek_begin());
    let mut seen = vec![cursor.word().to_vec()];

    // interleave stepping with inserts that restructure the trie
    for i in 0..100u32 {
        must_insert(&trie, format!("zz-late/{i:04}").as_bytes(), i as usize);
        if cursor.incr() {
            seen.push(cursor.word().to_vec());
        }
    }
    while cursor.incr() {
        seen.push(cursor.word().to_vec());
    }
    // every pre-positioning key must be visited, in order
    let stable: Vec<&Vec<u8>> = seen.iter().filter(|w| w.starts_with(b"stable/")).collect();
    assert_eq!(stable.len(), 100);
    for pair in seen.windows(2) {
        assert!(pair[0] < pair[1]);
    }
}

#[test]
fn test_cursor_refresh_threshold() {
    let trie = Trie::new(1 << 24);
    must_insert(&trie, b"first", 0);
    let mut cursor = LexCursor::new(&trie);
    assert!(!cursor.refresh());
    for i in 0..1500u32 {
        must_insert(&trie, format!("grow/{i:05}").as_bytes(), i as usize);
    }
    // grew past the interval: one refresh fires, then the snapshot is renewed
    assert!(cursor.refresh());
    assert!(!cursor.refresh());
}
