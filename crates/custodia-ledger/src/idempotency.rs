//! Bounded idempotency guard for externally referenced operations.
//!
//! The chain scanner may report the same confirmed deposit more than once.
//! Each external reference is admitted once; a second admission fails with
//! [`CustodiaError::DuplicateDeposit`].
//!
//! The guard keeps a bounded FIFO of references so memory stays predictable
//! in long-running processes. References older than the window are
//! forgotten.

use std::collections::{HashSet, VecDeque};
use std::hash::Hash;

use custodia_types::{CustodiaError, Result};

/// Admits each key at most once within a bounded window.
#[derive(Debug)]
pub struct IdempotencyGuard<K = String> {
    seen: HashSet<K>,
    /// Insertion order for eviction (front = oldest).
    order: VecDeque<K>,
    max_size: usize,
}

impl<K: Hash + Eq + Clone + std::fmt::Display> IdempotencyGuard<K> {
    /// Create a guard remembering at most `max_size` keys (minimum one).
    pub fn new(max_size: usize) -> Self {
        let max_size = max_size.max(1);
        Self {
            seen: HashSet::new(),
            order: VecDeque::new(),
            max_size,
        }
    }

    /// Admit `key`, or fail if it was already admitted.
    pub fn admit(&mut self, key: K) -> Result<()> {
        if self.seen.contains(&key) {
            return Err(CustodiaError::DuplicateDeposit(key.to_string()));
        }

        if self.seen.len() >= self.max_size {
            if let Some(oldest) = self.order.pop_front() {
                self.seen.remove(&oldest);
            }
        }

        self.seen.insert(key.clone());
        self.order.push_back(key);
        Ok(())
    }

    /// Withdraw an admission whose operation did not commit, so a retry of
    /// the same key is accepted.
    pub fn release(&mut self, key: &K) {
        if self.seen.remove(key) {
            self.order.retain(|k| k != key);
        }
    }

    pub fn contains(&self, key: &K) -> bool {
        self.seen.contains(key)
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}
