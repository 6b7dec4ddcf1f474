//! Representation factories
//!
//! A factory turns a comparator and an arena into a memtable representation.
//! The patricia factory serves only the bytewise comparator and hands
//! everything else to a fallback factory, the skiplist factory by default.

use std::sync::Arc;

use crate::arena::SliceArena;

use super::{BytewiseComparator, MemTableRep, PatriciaRep, SkipListRep, UserComparator};

/// Creates memtable representations.
pub trait MemTableRepFactory: Send + Sync {
    /// Build a representation for the given user comparator over the given
    /// shared arena.
    fn create_rep(
        &self,
        comparator: &dyn UserComparator,
        arena: Arc<SliceArena>,
    ) -> Arc<dyn MemTableRep>;

    /// Stable identifier for logs and options files.
    fn name(&self) -> &'static str;

    /// May `insert` be called from several threads at once?
    fn is_insert_concurrently_supported(&self) -> bool {
        false
    }
}

/// Factory for [`PatriciaRep`], delegating non-bytewise comparators.
pub struct PatriciaRepFactory {
    sharding_count: usize,
    fallback: Arc<dyn MemTableRepFactory>,
}

impl MemTableRepFactory for PatriciaRepFactory {
    fn create_rep(
        &self,
        comparator: &dyn UserComparator,
        arena: Arc<SliceArena>,
    ) -> Arc<dyn MemTableRep> {
        if comparator.name() == BytewiseComparator.name() {
            Arc::new(PatriciaRep::new(self.sharding_count, arena))
        } else {
            tracing::debug!(
                comparator = comparator.name(),
                fallback = self.fallback.name(),
                "comparator not bytewise, delegating memtable representation"
            );
            self.fallback.create_rep(comparator, arena)
        }
    }

    fn name(&self) -> &'static str {
        "PatriciaTrieRepFactory"
    }

    fn is_insert_concurrently_supported(&self) -> bool {
        false
    }
}

/// Factory for [`SkipListRep`].
pub struct SkipListRepFactory;

impl MemTableRepFactory for SkipListRepFactory {
    fn create_rep(
        &self,
        _comparator: &dyn UserComparator,
        _arena: Arc<SliceArena>,
    ) -> Arc<dyn MemTableRep> {
        Arc::new(SkipListRep::new())
    }

    fn name(&self) -> &'static str {
        "SkipListRepFactory"
    }

    fn is_insert_concurrently_supported(&self) -> bool {
        true
    }
}

/// Build the patricia factory. `sharding_count == 0` selects
/// `2 * available_parallelism + 3`; a missing fallback defaults to the
/// skiplist factory.
pub fn new_patricia_rep_factory(
    sharding_count: usize,
    fallback: Option<Arc<dyn MemTableRepFactory>>,
) -> Arc<dyn MemTableRepFactory> {
    Arc::new(PatriciaRepFactory {
        sharding_count,
        fallback: fallback.unwrap_or_else(|| Arc::new(SkipListRepFactory)),
    })
}
