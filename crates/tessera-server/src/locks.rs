//! Striped per-entity locks.
//!
//! Operations on the same device (or topic) must not interleave, but keeping a
//! mutex per entity would grow without bound. Each entity hashes onto one of a
//! fixed number of stripes instead; unrelated entities sharing a stripe only
//! costs some parallelism.
//!
//! Lock order is device stripe, then topic stripe. At most one stripe per
//! table is held at a time.

#![allow(clippy::disallowed_types, reason = "Guards held across synchronous calls only")]

use std::{
    collections::hash_map::DefaultHasher,
    hash::{Hash, Hasher},
    sync::{Mutex, MutexGuard, PoisonError},
};

/// A fixed table of mutexes indexed by key hash.
pub(crate) struct LockTable {
    stripes: Box<[Mutex<()>]>,
}

impl LockTable {
    /// Create a table with `stripes` locks (at least one).
    pub(crate) fn new(stripes: usize) -> Self {
        Self { stripes: (0..stripes.max(1)).map(|_| Mutex::new(())).collect() }
    }

    /// Block until the stripe for `key` is held.
    ///
    /// A poisoned stripe is taken over: it guards no data, only ordering.
    pub(crate) fn lock(&self, key: &[u8]) -> MutexGuard<'_, ()> {
        self.stripes[self.stripe(key)].lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn stripe(&self, key: &[u8]) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() % self.stripes.len() as u64) as usize
    }
}
