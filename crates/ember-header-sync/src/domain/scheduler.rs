//! # Request Scheduler
//!
//! Deadline min-heap driving outgoing header requests for unresolved
//! anchors. Each entry is keyed by the anchor slot (the missing parent
//! hash) and a generation counter; superseding a slot's request bumps the
//! generation, and stale heap entries are discarded lazily on poll instead
//! of being mutated in place.

use ember_types::Hash;
use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashMap};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct PendingRequest {
    due_at: u64,
    parent_hash: Hash,
    generation: u64,
}

impl Ord for PendingRequest {
    fn cmp(&self, other: &Self) -> Ordering {
        self.due_at
            .cmp(&other.due_at)
            .then_with(|| self.parent_hash.cmp(&other.parent_hash))
            .then_with(|| self.generation.cmp(&other.generation))
    }
}

impl PartialOrd for PendingRequest {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Min-heap of pending anchor-extension requests.
#[derive(Debug)]
pub struct RequestScheduler {
    heap: BinaryHeap<Reverse<PendingRequest>>,
    generations: HashMap<Hash, u64>,
    next_generation: u64,
    retry_interval: u64,
}

impl RequestScheduler {
    /// Create a scheduler re-arming polled slots after `retry_interval`
    /// seconds.
    pub fn new(retry_interval: u64) -> Self {
        Self {
            heap: BinaryHeap::new(),
            generations: HashMap::new(),
            next_generation: 0,
            retry_interval,
        }
    }

    /// Enqueue (or supersede) the request for an anchor slot, due at
    /// `due_at`. Any previously pending entry for the slot becomes stale.
    pub fn schedule(&mut self, parent_hash: Hash, due_at: u64) {
        self.next_generation += 1;
        self.generations.insert(parent_hash, self.next_generation);
        self.heap.push(Reverse(PendingRequest {
            due_at,
            parent_hash,
            generation: self.next_generation,
        }));
    }

    /// Drop the pending request for a slot. Heap entries are discarded
    /// lazily on the next poll.
    pub fn cancel(&mut self, parent_hash: &Hash) {
        self.generations.remove(parent_hash);
    }

    /// Whether a slot currently has a live request.
    pub fn is_scheduled(&self, parent_hash: &Hash) -> bool {
        self.generations.contains_key(parent_hash)
    }

    /// Number of live slots.
    pub fn len(&self) -> usize {
        self.generations.len()
    }

    /// True when no slot has a live request.
    pub fn is_empty(&self) -> bool {
        self.generations.is_empty()
    }

    /// Return every slot whose deadline has passed, re-arming each at
    /// `now + retry_interval`.
    pub fn poll(&mut self, now: u64) -> Vec<Hash> {
        let mut due = Vec::new();
        while let Some(Reverse(head)) = self.heap.peek().copied() {
            if head.due_at > now {
                break;
            }
            self.heap.pop();
            if self.generations.get(&head.parent_hash) != Some(&head.generation) {
                continue; // superseded or cancelled
            }
            due.push(head.parent_hash);
            self.heap.push(Reverse(PendingRequest {
                due_at: now + self.retry_interval,
                ..head
            }));
        }
        due
    }
}
