//! Version chain tests
//!
//! Tests verify:
//! - Strict descending tag order under arbitrary insertion orders
//! - Bound queries (lower_bound / reverse_lower_bound / equal_unique)
//! - Bidirectional threaded traversal
//! - Duplicate tag tolerance

use rand::seq::SliceRandom;
use rand::SeedableRng;

use triekv::arena::SliceArena;
use triekv::chain::{self, ChainRoot, NIL};
use triekv::encoding::put_varint32;

fn alloc_rev(arena: &SliceArena, tag: u64, value: &[u8]) -> usize {
    let mut prefixed = Vec::new();
    put_varint32(&mut prefixed, value.len() as u32);
    prefixed.extend_from_slice(value);
    chain::alloc_node(arena, tag, &prefixed)
}

fn forward_tags(root: &ChainRoot) -> Vec<u64> {
    let mut tags = Vec::new();
    unsafe {
        let mut node = root.most_left();
        while node != NIL {
            tags.push(chain::node_tag(node));
            node = chain::move_next(node);
        }
    }
    tags
}

fn backward_tags(root: &ChainRoot) -> Vec<u64> {
    let mut tags = Vec::new();
    unsafe {
        let mut node = root.most_right();
        while node != NIL {
            tags.push(chain::node_tag(node));
            node = chain::move_prev(node);
        }
    }
    tags
}

// =============================================================================
// Ordering Tests
// =============================================================================

#[test]
fn test_empty_chain() {
    let root = ChainRoot::new();
    unsafe {
        assert_eq!(root.most_left(), NIL);
        assert_eq!(root.most_right(), NIL);
        assert_eq!(root.lower_bound(u64::MAX), NIL);
        assert_eq!(root.equal_unique(0), NIL);
    }
}

#[test]
fn test_single_node() {
    let arena = SliceArena::new(4096);
    let root = ChainRoot::new();
    let node = alloc_rev(&arena, 42, b"v");
    unsafe {
        root.insert_multi(node);
        assert_eq!(root.most_left(), node);
        assert_eq!(root.most_right(), node);
        assert_eq!(chain::move_next(node), NIL);
        assert_eq!(chain::move_prev(node), NIL);
    }
}

#[test]
fn test_descending_order_random_insertion() {
    let mut rng = rand::rngs::StdRng::seed_from_u64(7);
    for round in 0..8 {
        let arena = SliceArena::new(1 << 16);
        let root = ChainRoot::new();
        let mut tags: Vec<u64> = (1..=500u64).map(|t| t * 3).collect();
        tags.shuffle(&mut rng);
        for &tag in &tags {
            unsafe { root.insert_multi(alloc_rev(&arena, tag, b"value")) };
        }
        let mut expected: Vec<u64> = tags.clone();
        expected.sort_unstable_by(|a, b| b.cmp(a));
        assert_eq!(forward_tags(&root), expected, "round {round}");

        let mut reversed = expected.clone();
        reversed.reverse();
        assert_eq!(backward_tags(&root), reversed, "round {round}");
    }
}

#[test]
fn test_sequential_insertions_stay_balanced() {
    // ascending and descending runs are the classic degenerate inputs
    let arena = SliceArena::new(1 << 18);
    let asc = ChainRoot::new();
    for tag in 0..4096u64 {
        unsafe { asc.insert_multi(alloc_rev(&arena, tag, b"x")) };
    }
    assert_eq!(forward_tags(&asc).len(), 4096);
    assert_eq!(forward_tags(&asc)[0], 4095);

    let desc = ChainRoot::new();
    for tag in (0..4096u64).rev() {
        unsafe { desc.insert_multi(alloc_rev(&arena, tag, b"x")) };
    }
    assert_eq!(forward_tags(&desc), forward_tags(&asc));
}

#[test]
fn test_duplicate_tags_tolerated() {
    let arena = SliceArena::new(4096);
    let root = ChainRoot::new();
    for _ in 0..3 {
        unsafe { root.insert_multi(alloc_rev(&arena, 9, b"dup")) };
    }
    unsafe { root.insert_multi(alloc_rev(&arena, 5, b"old")) };
    unsafe { root.insert_multi(alloc_rev(&arena, 11, b"new")) };
    assert_eq!(forward_tags(&root), vec![11, 9, 9, 9, 5]);
    unsafe {
        assert_ne!(root.equal_unique(9), NIL);
    }
}

// =============================================================================
// Bound Query Tests
// =============================================================================

#[test]
fn test_lower_bound_semantics() {
    let arena = SliceArena::new(4096);
    let root = ChainRoot::new();
    for tag in [10u64, 20, 30, 40] {
        unsafe { root.insert_multi(alloc_rev(&arena, tag, b"v")) };
    }
    unsafe {
        // newest revision no newer than the bound
        assert_eq!(chain::node_tag(root.lower_bound(u64::MAX)), 40);
        assert_eq!(chain::node_tag(root.lower_bound(40)), 40);
        assert_eq!(chain::node_tag(root.lower_bound(39)), 30);
        assert_eq!(chain::node_tag(root.lower_bound(10)), 10);
        assert_eq!(root.lower_bound(9), NIL);
    }
}

#[test]
fn test_reverse_lower_bound_semantics() {
    let arena = SliceArena::new(4096);
    let root = ChainRoot::new();
    for tag in [10u64, 20, 30, 40] {
        unsafe { root.insert_multi(alloc_rev(&arena, tag, b"v")) };
    }
    unsafe {
        // oldest revision no older than the bound
        assert_eq!(chain::node_tag(root.reverse_lower_bound(0)), 10);
        assert_eq!(chain::node_tag(root.reverse_lower_bound(10)), 10);
        assert_eq!(chain::node_tag(root.reverse_lower_bound(11)), 20);
        assert_eq!(chain::node_tag(root.reverse_lower_bound(40)), 40);
        assert_eq!(root.reverse_lower_bound(41), NIL);
    }
}

#[test]
fn test_equal_unique() {
    let arena = SliceArena::new(1 << 16);
    let root = ChainRoot::new();
    for tag in (0..200u64).map(|t| t * 2) {
        unsafe { root.insert_multi(alloc_rev(&arena, tag, b"v")) };
    }
    unsafe {
        for tag in (0..200u64).map(|t| t * 2) {
            assert_eq!(chain::node_tag(root.equal_unique(tag)), tag);
        }
        assert_eq!(root.equal_unique(1), NIL);
        assert_eq!(root.equal_unique(399), NIL);
    }
}

#[test]
fn test_walk_from_lower_bound() {
    let arena = SliceArena::new(4096);
    let root = ChainRoot::new();
    for tag in [100u64, 200, 300, 400, 500] {
        unsafe { root.insert_multi(alloc_rev(&arena, tag, b"v")) };
    }
    // walking forward from a bound enumerates every tag <= the bound
    let mut seen = Vec::new();
    unsafe {
        let mut node = root.lower_bound(350);
        while node != NIL {
            seen.push(chain::node_tag(node));
            node = chain::move_next(node);
        }
    }
    assert_eq!(seen, vec![300, 200, 100]);
}

// =============================================================================
// Value Storage Tests
// =============================================================================

#[test]
fn test_values_accessible_after_many_inserts() {
    let arena = SliceArena::new(1 << 16);
    let root = ChainRoot::new();
    for tag in 0..300u64 {
        let value = format!("value-{tag}");
        unsafe { root.insert_multi(alloc_rev(&arena, tag, value.as_bytes())) };
    }
    unsafe {
        let node = root.equal_unique(123);
        assert_ne!(node, NIL);
        let prefixed = chain::node_prefixed_value(node);
        // one-byte varint length followed by the value
        assert_eq!(prefixed[0] as usize, "value-123".len());
        assert_eq!(&prefixed[1..], b"value-123");
    }
}
