//! Keeps a cache's primary map and age index in lockstep.
//!
//! Every live key lives in both the primary map (keyed by identity, for `O(1)` lookup and
//! update) and the age index (ordered by `insert_id`, for oldest-first eviction). The two
//! must never drift apart, so all access goes through this wrapper rather than through the
//! raw collections directly.

use std::collections::{BTreeSet, HashMap};

use crate::prevout::PrevoutKey;

/// Dual-indexed storage: `PrevoutKey -> transaction_output_id`, plus an age ordering.
#[derive(Debug, Default)]
pub(crate) struct KeyedStore {
    map: HashMap<PrevoutKey, (i64, u64)>,
    age_index: BTreeSet<(u64, PrevoutKey)>,
}

impl KeyedStore {
    pub(crate) fn len(&self) -> usize {
        self.map.len()
    }

    pub(crate) fn get(&self, key: &PrevoutKey) -> Option<i64> {
        self.map.get(key).map(|(id, _)| *id)
    }

    pub(crate) fn contains(&self, key: &PrevoutKey) -> bool {
        self.map.contains_key(key)
    }

    /// Updates the value of an existing entry in place, leaving its `insert_id` untouched.
    /// Returns `false` if the key wasn't present.
    pub(crate) fn update_value(&mut self, key: &PrevoutKey, transaction_output_id: i64) -> bool {
        match self.map.get_mut(key) {
            Some(entry) => {
                entry.0 = transaction_output_id;
                true
            }
            None => false,
        }
    }

    /// Inserts a brand-new entry. Caller must have already confirmed the key is absent.
    pub(crate) fn insert(&mut self, key: PrevoutKey, transaction_output_id: i64, insert_id: u64) {
        self.age_index.insert((insert_id, key));
        self.map.insert(key, (transaction_output_id, insert_id));
    }

    /// Removes an entry from both indexes, if present.
    pub(crate) fn remove(&mut self, key: &PrevoutKey) -> Option<(i64, u64)> {
        let (transaction_output_id, insert_id) = self.map.remove(key)?;
        self.age_index.remove(&(insert_id, *key));
        Some((transaction_output_id, insert_id))
    }

    /// Removes and returns the entry with the smallest `insert_id`. Returns `false` if empty.
    pub(crate) fn evict_oldest(&mut self) -> bool {
        let Some(oldest) = self.age_index.iter().next().copied() else {
            return false;
        };
        self.age_index.remove(&oldest);
        self.map.remove(&oldest.1);
        true
    }

    /// Empties both indexes, returning every entry as `(key, transaction_output_id, insert_id)`.
    pub(crate) fn drain_all(&mut self) -> Vec<(PrevoutKey, i64, u64)> {
        self.age_index.clear();
        self.map
            .drain()
            .map(|(key, (id, insert_id))| (key, id, insert_id))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(b: u8) -> PrevoutKey {
        PrevoutKey::new([b; 32], 0)
    }

    #[test]
    fn insert_then_get() {
        let mut store = KeyedStore::default();
        store.insert(key(1), 42, 0);
        assert_eq!(store.get(&key(1)), Some(42));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn update_preserves_insert_id_ordering() {
        let mut store = KeyedStore::default();
        store.insert(key(1), 1, 10);
        store.insert(key(2), 2, 20);

        assert!(store.update_value(&key(1), 99));
        assert_eq!(store.get(&key(1)), Some(99));

        // key(1) still has the older insert_id (10), so it is still evicted first.
        assert!(store.evict_oldest());
        assert_eq!(store.get(&key(1)), None);
        assert_eq!(store.get(&key(2)), Some(2));
    }

    #[test]
    fn evict_oldest_picks_smallest_insert_id() {
        let mut store = KeyedStore::default();
        store.insert(key(3), 3, 30);
        store.insert(key(1), 1, 10);
        store.insert(key(2), 2, 20);

        assert!(store.evict_oldest());
        assert_eq!(store.get(&key(1)), None);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn evict_oldest_on_empty_returns_false() {
        let mut store = KeyedStore::default();
        assert!(!store.evict_oldest());
    }

    #[test]
    fn remove_clears_both_indexes() {
        let mut store = KeyedStore::default();
        store.insert(key(1), 1, 10);
        assert!(store.remove(&key(1)).is_some());
        assert!(store.remove(&key(1)).is_none());
        assert_eq!(store.len(), 0);
        // Nothing left to evict either.
        assert!(!store.evict_oldest());
    }

    #[test]
    fn drain_all_empties_store() {
        let mut store = KeyedStore::default();
        store.insert(key(1), 1, 10);
        store.insert(key(2), 2, 20);

        let drained = store.drain_all();
        assert_eq!(drained.len(), 2);
        assert_eq!(store.len(), 0);
        assert!(!store.evict_oldest());
    }
}
