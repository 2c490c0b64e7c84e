//! Identity and age-tagging for UTXO references.
//!
//! A [`PrevoutKey`] is the bare identity of a transaction output reference — the
//! (transaction hash, output index) pair a cache keys its map on. A [`Prevout`] is a
//! `PrevoutKey` plus an `insert_id`: a process-wide, monotonically increasing tag assigned
//! at construction time that drives age-ordered eviction. The split exists so that a pure
//! lookup (`get_cached_utxo`) can be built from a `PrevoutKey` alone, without minting (and
//! therefore without burning) an `insert_id` — see `SPEC_FULL.md` §9.

use std::sync::atomic::{AtomicU64, Ordering};

/// The bare identity of a transaction output reference.
///
/// Ordering is lexicographic over `transaction_hash` (unsigned byte order, via `[u8; 32]`'s
/// native `Ord`) and then `transaction_output_index`. Deriving `Eq`/`Ord` from the same field
/// list keeps them consistent with each other by construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PrevoutKey {
    pub transaction_hash: [u8; 32],
    pub transaction_output_index: i32,
}

impl PrevoutKey {
    pub fn new(transaction_hash: [u8; 32], transaction_output_index: i32) -> Self {
        Self {
            transaction_hash,
            transaction_output_index,
        }
    }
}

/// Global, process-wide counter from which `insert_id`s are drawn.
static NEXT_INSERT_ID: AtomicU64 = AtomicU64::new(0);

/// A [`PrevoutKey`] tagged with the insertion-order id that determines age-based eviction.
///
/// `insert_id` is deliberately excluded from `PrevoutKey`'s equality and ordering: it is age
/// metadata, not part of the key's identity.
#[derive(Debug, Clone, Copy)]
pub struct Prevout {
    key: PrevoutKey,
    insert_id: u64,
}

impl Prevout {
    /// Construct a prevout with a freshly minted `insert_id` from the global counter.
    pub fn new(transaction_hash: [u8; 32], transaction_output_index: i32) -> Self {
        let insert_id = NEXT_INSERT_ID.fetch_add(1, Ordering::Relaxed);
        Self {
            key: PrevoutKey::new(transaction_hash, transaction_output_index),
            insert_id,
        }
    }

    /// Bulk-load constructor: takes a caller-supplied `insert_id` and advances the global
    /// counter so that every subsequently auto-assigned id is strictly greater than it.
    pub fn with_insert_id(
        insert_id: u64,
        transaction_hash: [u8; 32],
        transaction_output_index: i32,
    ) -> Self {
        atomic_set_max(&NEXT_INSERT_ID, insert_id.saturating_add(1));
        Self {
            key: PrevoutKey::new(transaction_hash, transaction_output_index),
            insert_id,
        }
    }

    pub fn key(&self) -> PrevoutKey {
        self.key
    }

    pub fn insert_id(&self) -> u64 {
        self.insert_id
    }
}

/// Lock-free compare-exchange loop that leaves `counter` holding `max(counter, value)`.
fn atomic_set_max(counter: &AtomicU64, value: u64) {
    let mut current = counter.load(Ordering::Relaxed);
    while current < value {
        match counter.compare_exchange_weak(current, value, Ordering::Relaxed, Ordering::Relaxed)
        {
            Ok(_) => return,
            Err(observed) => current = observed,
        }
    }
}
