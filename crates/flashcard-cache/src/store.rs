//! L1 in-memory tier.

use crate::eviction::LruStore;
use std::hash::Hash;

/// Thin wrapper around [`LruStore`] tracking entry count and byte budget.
pub(crate) struct L1Store<K, V> {
    inner: LruStore<K, V>,
}

impl<K: Hash + Eq, V> L1Store<K, V> {
    pub(crate) fn new(capacity: usize, max_bytes: Option<usize>) -> Self {
        Self {
            inner: LruStore::new(capacity, max_bytes),
        }
    }

    pub(crate) fn get(&mut self, key: &K) -> Option<&V> {
        self.inner.get(key)
    }

    /// Returns `true` if inserting this entry evicted at least one other.
    pub(crate) fn insert(&mut self, key: K, value: V, size_bytes: usize) -> bool {
        !self.inner.insert(key, value, size_bytes).is_empty()
    }

    pub(crate) fn remove(&mut self, key: &K) {
        self.inner.remove(key);
    }
}
