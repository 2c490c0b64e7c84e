//! A single cache layer: primary map, age index, pending invalidations, and an optional
//! master (parent) layer.

use std::collections::HashSet;

use tracing::trace;

use crate::dual_index::KeyedStore;
use crate::prevout::{Prevout, PrevoutKey};
use crate::registry::CacheHandle;

/// `2^31 - 1`, the spec's "no limit" sentinel for `max_item_count`.
pub(crate) const DEFAULT_MAX_ITEM_COUNT: u64 = i32::MAX as u64;

/// The sentinel returned for "no cached value" / "not present".
pub const MISSING_OUTPUT_ID: i64 = -1;

/// A single layer of the UTXO cache.
///
/// Holds its own keyed storage and invalidation queue, and an optional non-owning reference
/// to a parent ("master") layer, expressed as a [`CacheHandle`] rather than a Rust reference
/// — see `DESIGN.md` for why a borrowed reference doesn't work here.
#[derive(Debug, Default)]
pub(crate) struct CacheInstance {
    store: KeyedStore,
    invalidated: HashSet<PrevoutKey>,
    pub(crate) master: Option<CacheHandle>,
    max_item_count: u64,
}

impl CacheInstance {
    pub(crate) fn new() -> Self {
        Self {
            store: KeyedStore::default(),
            invalidated: HashSet::new(),
            master: None,
            max_item_count: DEFAULT_MAX_ITEM_COUNT,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.store.len()
    }

    pub(crate) fn set_max_item_count(&mut self, count: u64) {
        self.max_item_count = count;
    }

    /// Caches `prevout -> transaction_output_id`, evicting the oldest entries first if this
    /// would exceed `max_item_count`. A duplicate key updates the value in place and keeps
    /// its original `insert_id` (age order is not disturbed by updates).
    pub(crate) fn cache_utxo(&mut self, prevout: Prevout, transaction_output_id: i64) {
        self.ensure_capacity(self.max_item_count);
        let key = prevout.key();
        if !self.store.update_value(&key, transaction_output_id) {
            self.store
                .insert(key, transaction_output_id, prevout.insert_id());
        }
    }

    /// Local-only lookup; does not walk the master chain and does not mutate age order. The
    /// registry is responsible for the cross-layer chain walk (see `registry.rs`).
    pub(crate) fn get_local(&self, key: &PrevoutKey) -> Option<i64> {
        self.store.get(key)
    }

    pub(crate) fn invalidate_utxo(&mut self, prevout: Prevout) {
        self.invalidated.insert(prevout.key());
    }

    /// Evicts oldest-first until `size` is strictly below `target`. No-op when `target < 1`.
    /// This is the "make room for exactly one more insert" form used by `cache_utxo` and
    /// commit-drain — see `prune_to_at_most` for the distinct `prune_half` semantics.
    pub(crate) fn ensure_capacity(&mut self, target: u64) {
        if target < 1 {
            return;
        }
        while self.store.len() as u64 >= target {
            if !self.store.evict_oldest() {
                break;
            }
        }
    }

    /// Evicts oldest-first until `size <= target`.
    fn prune_to_at_most(&mut self, target: usize) {
        while self.store.len() > target {
            if !self.store.evict_oldest() {
                break;
            }
        }
    }

    pub(crate) fn prune_half(&mut self) {
        let target = self.store.len() / 2;
        self.prune_to_at_most(target);
    }

    /// Applies this cache's own pending invalidations to its own map, then clears the queue.
    pub(crate) fn commit_self(&mut self) {
        let pending: Vec<PrevoutKey> = self.invalidated.drain().collect();
        for key in pending {
            if self.store.remove(&key).is_some() {
                trace!(?key, "commit_self: removed invalidated entry");
            }
        }
    }

    /// Drains `child`'s invalidations and map into `parent`, atomically from the caller's
    /// point of view. Invalidations are applied first, then inserts/updates — see
    /// `SPEC_FULL.md` §4.2 for why that order matters.
    pub(crate) fn commit_drain(parent: &mut CacheInstance, child: &mut CacheInstance) {
        let invalidations: Vec<PrevoutKey> = child.invalidated.drain().collect();
        let invalidation_count = invalidations.len();
        for key in invalidations {
            parent.store.remove(&key);
        }

        let inserts = child.store.drain_all();
        trace!(
            invalidation_count,
            insert_count = inserts.len(),
            "commit_drain applying child entries"
        );
        for (key, transaction_output_id, insert_id) in inserts {
            if !parent.store.update_value(&key, transaction_output_id) {
                parent.ensure_capacity(parent.max_item_count);
                parent.store.insert(key, transaction_output_id, insert_id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prevout(b: u8, index: i32) -> Prevout {
        Prevout::new([b; 32], index)
    }

    fn key(b: u8, index: i32) -> PrevoutKey {
        PrevoutKey::new([b; 32], index)
    }

    #[test]
    fn cache_then_get() {
        let mut cache = CacheInstance::new();
        cache.cache_utxo(prevout(1, 0), 42);
        assert_eq!(cache.get_local(&key(1, 0)), Some(42));
        assert_eq!(cache.get_local(&key(1, 1)), None);
    }

    #[test]
    fn duplicate_insert_updates_value_preserves_age() {
        let mut cache = CacheInstance::new();
        cache.cache_utxo(prevout(1, 0), 1);
        cache.cache_utxo(prevout(2, 0), 2);

        // Re-cache the same identity with a new value; a fresh Prevout is constructed (new
        // insert_id minted) but the stored insert_id must stay the original one.
        cache.cache_utxo(prevout(1, 0), 99);
        assert_eq!(cache.get_local(&key(1, 0)), Some(99));

        // Force an eviction by shrinking capacity to 1: since key(1,0)'s age wasn't
        // refreshed, key(2,0) (inserted after it) should survive, not key(1,0).
        cache.set_max_item_count(1);
        cache.ensure_capacity(1);
        assert_eq!(cache.get_local(&key(2, 0)), Some(2));
        assert_eq!(cache.get_local(&key(1, 0)), None);
    }

    #[test]
    fn lru_eviction_keeps_newest_entries() {
        let mut cache = CacheInstance::new();
        cache.set_max_item_count(2);
        cache.cache_utxo(prevout(1, 0), 1); // A
        cache.cache_utxo(prevout(2, 0), 2); // B
        cache.cache_utxo(prevout(3, 0), 3); // C, evicts A

        assert_eq!(cache.get_local(&key(1, 0)), None);
        assert_eq!(cache.get_local(&key(2, 0)), Some(2));
        assert_eq!(cache.get_local(&key(3, 0)), Some(3));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn invalidate_then_commit_self_removes_entry() {
        let mut cache = CacheInstance::new();
        cache.cache_utxo(prevout(1, 0), 1);
        cache.invalidate_utxo(prevout(1, 0));

        // Not removed until commit.
        assert_eq!(cache.get_local(&key(1, 0)), Some(1));

        cache.commit_self();
        assert_eq!(cache.get_local(&key(1, 0)), None);
    }

    #[test]
    fn idempotent_invalidation() {
        let mut cache = CacheInstance::new();
        cache.cache_utxo(prevout(1, 0), 1);
        cache.invalidate_utxo(prevout(1, 0));
        cache.invalidate_utxo(prevout(1, 0));
        assert_eq!(cache.invalidated.len(), 1);
        cache.commit_self();
        assert_eq!(cache.get_local(&key(1, 0)), None);
    }

    #[test]
    fn prune_half_halves_size() {
        let mut cache = CacheInstance::new();
        for i in 0..10u8 {
            cache.cache_utxo(prevout(i, 0), i as i64);
        }
        cache.prune_half();
        assert_eq!(cache.len(), 5);
        // The 5 most recently inserted (5..10) should survive.
        for i in 5..10u8 {
            assert_eq!(cache.get_local(&key(i, 0)), Some(i as i64));
        }
        for i in 0..5u8 {
            assert_eq!(cache.get_local(&key(i, 0)), None);
        }
    }

    #[test]
    fn commit_drain_applies_invalidations_before_inserts() {
        let mut parent = CacheInstance::new();
        parent.cache_utxo(prevout(1, 0), 1);

        let mut child = CacheInstance::new();
        child.invalidate_utxo(prevout(1, 0));
        child.cache_utxo(prevout(1, 0), 2);

        CacheInstance::commit_drain(&mut parent, &mut child);

        assert_eq!(parent.get_local(&key(1, 0)), Some(2));
        assert_eq!(child.len(), 0);
        assert!(child.invalidated.is_empty());
    }

    #[test]
    fn commit_drain_empties_child() {
        let mut parent = CacheInstance::new();
        let mut child = CacheInstance::new();
        child.cache_utxo(prevout(1, 0), 1);
        child.invalidate_utxo(prevout(2, 0));

        CacheInstance::commit_drain(&mut parent, &mut child);

        assert_eq!(child.len(), 0);
        assert!(child.invalidated.is_empty());
        assert_eq!(parent.get_local(&key(1, 0)), Some(1));
    }

    #[test]
    fn commit_drain_respects_parent_capacity() {
        let mut parent = CacheInstance::new();
        parent.set_max_item_count(1);
        parent.cache_utxo(prevout(1, 0), 1);

        let mut child = CacheInstance::new();
        child.cache_utxo(prevout(2, 0), 2);

        CacheInstance::commit_drain(&mut parent, &mut child);

        assert_eq!(parent.len(), 1);
        assert_eq!(parent.get_local(&key(1, 0)), None);
        assert_eq!(parent.get_local(&key(2, 0)), Some(2));
    }
}
