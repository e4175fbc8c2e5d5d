//! # Tip Limiter
//!
//! Bounded ordered set of tips keyed by `(cumulative_difficulty, hash)`.
//! A balanced tree rather than a plain priority queue: eviction pops the
//! weakest key, but promotion and absorption must also remove specific
//! tips by identity.

use super::value_objects::TipKey;
use ember_types::{Hash, U256};
use std::collections::BTreeSet;

/// Ordered tip set with a hard capacity.
#[derive(Debug)]
pub struct TipLimiter {
    entries: BTreeSet<TipKey>,
    capacity: usize,
}

impl TipLimiter {
    /// Create a limiter holding at most `capacity` tips.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: BTreeSet::new(),
            capacity,
        }
    }

    /// Insert a tip key; if the set overflows, the weakest key is evicted
    /// and returned. The evicted key may be the one just inserted.
    pub fn insert(&mut self, key: TipKey) -> Option<TipKey> {
        self.entries.insert(key);
        if self.entries.len() <= self.capacity {
            return None;
        }
        let weakest = *self.entries.iter().next().expect("set is non-empty");
        self.entries.remove(&weakest);
        Some(weakest)
    }

    /// Remove a specific tip by identity.
    pub fn remove(&mut self, cumulative_difficulty: U256, hash: Hash) -> bool {
        self.entries.remove(&TipKey {
            cumulative_difficulty,
            hash,
        })
    }

    /// Whether the exact key is present.
    pub fn contains(&self, cumulative_difficulty: U256, hash: Hash) -> bool {
        self.entries.contains(&TipKey {
            cumulative_difficulty,
            hash,
        })
    }

    /// Current number of tips.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no tips are tracked.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The weakest key currently tracked.
    pub fn weakest(&self) -> Option<&TipKey> {
        self.entries.iter().next()
    }

    /// Iterate keys, weakest first.
    pub fn iter(&self) -> impl Iterator<Item = &TipKey> {
        self.entries.iter()
    }
}
