//! The fixed-size, process-wide table of cache instances, addressed by small integer
//! handles. This is the crate's public API surface — see `SPEC_FULL.md` §6.

use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use crate::cache::{CacheInstance, MISSING_OUTPUT_ID};
use crate::error::HandleError;
use crate::prevout::{Prevout, PrevoutKey};

/// Number of slots in the registry. Matches the original JNI boundary's fixed `CACHES[256]`
/// table; a growable slab could replace it without changing the handle contract (`0..256`,
/// `-1` as "no handle"), but fidelity to that contract is kept literal here.
pub const MAX_CACHES: usize = 256;

/// Sentinel meaning "no handle" / "not present", used both for cache handles and for
/// transaction output ids.
pub const NO_HANDLE: i32 = -1;

/// A validated index into the registry's slot table. Never constructed directly; always the
/// result of bounds-checking a raw `i32` handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct CacheHandle(u8);

impl CacheHandle {
    fn index(self) -> usize {
        self.0 as usize
    }
}

/// Bounds-checks `handle` only; does not require the slot to be occupied. Used for a
/// secondary handle (e.g. a master) where pointing at an empty slot is valid.
fn resolve_handle(handle: i32) -> Result<CacheHandle, HandleError> {
    if handle < 0 || handle as usize >= MAX_CACHES {
        return Err(HandleError::OutOfRange(handle));
    }
    Ok(CacheHandle(handle as u8))
}

/// Bounds-checks `handle` and requires its slot to hold a cache. This is the check every
/// operation that reads/mutates a specific cache's own state needs.
fn resolve_occupied(slots: &[Option<CacheInstance>], handle: i32) -> Result<CacheHandle, HandleError> {
    let target = resolve_handle(handle)?;
    if slots[target.index()].is_none() {
        return Err(HandleError::Empty(handle));
    }
    Ok(target)
}

/// Emits the `trace!` this codebase's error-handling convention requires at the point an
/// internal error is discarded rather than surfaced — see `SPEC_FULL.md` §7.
fn log_discard(op: &'static str, err: HandleError) {
    trace!(op, %err, "discarding handle error");
}

/// The process-wide cache registry.
///
/// Slot-table mutations (`create_cache`, `delete_cache`, `init`, `destroy`) and per-cache
/// data-plane operations both go through the same mutex: the registry doesn't coordinate
/// concurrent data-plane access to a single cache beyond that (callers are responsible for
/// serializing mutations on any one cache/master domain — see `SPEC_FULL.md` §5).
pub struct UtxoCacheRegistry {
    slots: Mutex<Vec<Option<CacheInstance>>>,
}

impl Default for UtxoCacheRegistry {
    fn default() -> Self {
        Self::init()
    }
}

impl UtxoCacheRegistry {
    /// Allocates the slot table, all slots empty.
    pub fn init() -> Self {
        Self {
            slots: Mutex::new((0..MAX_CACHES).map(|_| None).collect()),
        }
    }

    /// Releases every occupied slot.
    pub fn destroy(&self) {
        let mut slots = self.slots.lock();
        let occupied = slots.iter().filter(|s| s.is_some()).count();
        for slot in slots.iter_mut() {
            *slot = None;
        }
        debug!(occupied, "registry destroyed");
    }

    /// Scans from index 0 for the first empty slot, places a new cache there. Returns `-1`
    /// when the table is full.
    pub fn create_cache(&self) -> i32 {
        let mut slots = self.slots.lock();
        for (i, slot) in slots.iter_mut().enumerate() {
            if slot.is_none() {
                *slot = Some(CacheInstance::new());
                debug!(handle = i, "cache created");
                return i as i32;
            }
        }
        warn!("registry full; create_cache refused");
        NO_HANDLE
    }

    /// Releases the cache at `handle`, if any, and clears any other slot's master reference
    /// that pointed at it (see `DESIGN.md`'s resolution of the dangling-master question).
    pub fn delete_cache(&self, handle: i32) {
        let mut slots = self.slots.lock();
        let target = match resolve_occupied(&slots, handle) {
            Ok(target) => target,
            Err(err) => {
                log_discard("delete_cache", err);
                return;
            }
        };
        slots[target.index()] = None;
        for slot in slots.iter_mut().flatten() {
            if slot.master == Some(target) {
                slot.master = None;
            }
        }
        debug!(handle, "cache deleted");
    }

    /// Assigns `handle`'s master to `master_handle`, or clears it when `master_handle == -1`.
    pub fn set_master_cache(&self, handle: i32, master_handle: i32) {
        let mut slots = self.slots.lock();
        let target = match resolve_occupied(&slots, handle) {
            Ok(target) => target,
            Err(err) => {
                log_discard("set_master_cache", err);
                return;
            }
        };

        let new_master = if master_handle == NO_HANDLE {
            None
        } else {
            match resolve_handle(master_handle) {
                Ok(master) => Some(master),
                Err(err) => {
                    log_discard("set_master_cache", err);
                    return;
                }
            }
        };

        if let Some(cache) = slots[target.index()].as_mut() {
            cache.master = new_master;
        }
    }

    pub fn set_max_item_count(&self, handle: i32, count: i64) {
        let mut slots = self.slots.lock();
        let target = match resolve_occupied(&slots, handle) {
            Ok(target) => target,
            Err(err) => {
                log_discard("set_max_item_count", err);
                return;
            }
        };
        if let Some(cache) = slots[target.index()].as_mut() {
            cache.set_max_item_count(count.max(0) as u64);
        }
    }

    /// Caches `(hash, index) -> transaction_output_id` under `handle`. Callers must not pass
    /// `-1` as `transaction_output_id` (reserved for "not present").
    pub fn cache_utxo(&self, handle: i32, transaction_hash: [u8; 32], transaction_output_index: i32, transaction_output_id: i64) {
        debug_assert_ne!(
            transaction_output_id, MISSING_OUTPUT_ID,
            "callers must not cache the missing-output sentinel"
        );
        let mut slots = self.slots.lock();
        let target = match resolve_occupied(&slots, handle) {
            Ok(target) => target,
            Err(err) => {
                log_discard("cache_utxo", err);
                return;
            }
        };
        if let Some(cache) = slots[target.index()].as_mut() {
            cache.cache_utxo(
                Prevout::new(transaction_hash, transaction_output_index),
                transaction_output_id,
            );
        }
    }

    /// Resolves `(hash, index)` against `handle`, walking the master chain on local miss.
    /// Side-effect free: does not mutate age order and does not mint an `insert_id`.
    pub fn get_cached_utxo(&self, handle: i32, transaction_hash: [u8; 32], transaction_output_index: i32) -> i64 {
        let slots = self.slots.lock();
        let target = match resolve_occupied(&slots, handle) {
            Ok(target) => target,
            Err(err) => {
                log_discard("get_cached_utxo", err);
                return MISSING_OUTPUT_ID;
            }
        };
        let key = PrevoutKey::new(transaction_hash, transaction_output_index);
        Self::chain_lookup(&slots, target, &key)
    }

    /// Walks `[self, master, master.master, ...]` returning the first hit, bounded at
    /// `MAX_CACHES` hops as a defensive guard against a misconfigured cycle (the spec
    /// disallows multi-parent chains, so a cycle should never occur in practice).
    fn chain_lookup(slots: &[Option<CacheInstance>], start: CacheHandle, key: &PrevoutKey) -> i64 {
        let mut current = start;
        for _ in 0..MAX_CACHES {
            let Some(cache) = slots[current.index()].as_ref() else {
                return MISSING_OUTPUT_ID;
            };
            if let Some(id) = cache.get_local(key) {
                return id;
            }
            match cache.master {
                Some(next) => current = next,
                None => return MISSING_OUTPUT_ID,
            }
        }
        warn!("master chain walk exceeded MAX_CACHES hops; treating as miss");
        MISSING_OUTPUT_ID
    }

    pub fn invalidate_utxo(&self, handle: i32, transaction_hash: [u8; 32], transaction_output_index: i32) {
        let mut slots = self.slots.lock();
        let target = match resolve_occupied(&slots, handle) {
            Ok(target) => target,
            Err(err) => {
                log_discard("invalidate_utxo", err);
                return;
            }
        };
        if let Some(cache) = slots[target.index()].as_mut() {
            cache.invalidate_utxo(Prevout::new(transaction_hash, transaction_output_index));
        }
    }

    /// Applies `handle`'s own pending invalidations to its own map.
    pub fn commit_self(&self, handle: i32) {
        let mut slots = self.slots.lock();
        let target = match resolve_occupied(&slots, handle) {
            Ok(target) => target,
            Err(err) => {
                log_discard("commit_self", err);
                return;
            }
        };
        if let Some(cache) = slots[target.index()].as_mut() {
            cache.commit_self();
        }
    }

    /// Drains `child_handle`'s accumulated mutations and invalidations into
    /// `parent_handle`, atomically from the caller's point of view.
    pub fn commit_drain(&self, parent_handle: i32, child_handle: i32) {
        let mut slots = self.slots.lock();
        let parent = match resolve_occupied(&slots, parent_handle) {
            Ok(target) => target,
            Err(err) => {
                log_discard("commit_drain(parent)", err);
                return;
            }
        };
        let child = match resolve_occupied(&slots, child_handle) {
            Ok(target) => target,
            Err(err) => {
                log_discard("commit_drain(child)", err);
                return;
            }
        };
        if parent == child {
            // Draining a cache into itself isn't representable as two distinct mutable
            // borrows and isn't a meaningful operation; treat it as a silent no-op.
            return;
        }
        let (parent_cache, child_cache) = borrow_pair_mut(&mut slots, parent.index(), child.index());
        CacheInstance::commit_drain(parent_cache, child_cache);
        debug!(parent_handle, child_handle, "commit_drain complete");
    }

    /// Bulk-load form of `cache_utxo`: takes an explicit `insert_id` and advances the global
    /// counter so subsequently auto-assigned ids stay strictly greater.
    pub fn load_utxo(
        &self,
        handle: i32,
        insert_id: i64,
        transaction_hash: [u8; 32],
        transaction_output_index: i32,
        transaction_output_id: i64,
    ) {
        let mut slots = self.slots.lock();
        let target = match resolve_occupied(&slots, handle) {
            Ok(target) => target,
            Err(err) => {
                log_discard("load_utxo", err);
                return;
            }
        };
        if let Some(cache) = slots[target.index()].as_mut() {
            cache.cache_utxo(
                Prevout::with_insert_id(insert_id.max(0) as u64, transaction_hash, transaction_output_index),
                transaction_output_id,
            );
        }
    }

    pub fn prune_half(&self, handle: i32) {
        let mut slots = self.slots.lock();
        let target = match resolve_occupied(&slots, handle) {
            Ok(target) => target,
            Err(err) => {
                log_discard("prune_half", err);
                return;
            }
        };
        if let Some(cache) = slots[target.index()].as_mut() {
            cache.prune_half();
        }
    }
}

/// Returns mutable references to two distinct slots in one borrow. Panics if `a == b`
/// (callers must have already rejected that case).
fn borrow_pair_mut(
    slots: &mut [Option<CacheInstance>],
    a: usize,
    b: usize,
) -> (&mut CacheInstance, &mut CacheInstance) {
    assert_ne!(a, b, "borrow_pair_mut requires distinct indices");
    let (lo, hi) = if a < b { (a, b) } else { (b, a) };
    let (left, right) = slots.split_at_mut(hi);
    let (lo_ref, hi_ref) = (
        left[lo].as_mut().expect("slot occupancy checked by caller"),
        right[0].as_mut().expect("slot occupancy checked by caller"),
    );
    if a < b {
        (lo_ref, hi_ref)
    } else {
        (hi_ref, lo_ref)
    }
}
