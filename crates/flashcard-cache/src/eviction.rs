//! L1 in-memory eviction.
//!
//! Capacity is bounded by entry count and, if configured, total estimated
//! bytes; whichever limit is hit first evicts the least-recently-used entry.

use std::hash::Hash;
use std::num::NonZeroUsize;

/// LRU store bounded by entry count and an optional byte budget.
///
/// Byte accounting is advisory: callers report a size with every insert, and
/// the store evicts least-recently-used entries until the running total fits
/// under `max_bytes`, in addition to the `lru::LruCache`'s own count-based cap.
pub(crate) struct LruStore<K, V> {
    cache: lru::LruCache<K, (V, usize)>,
    max_bytes: Option<usize>,
    bytes_used: usize,
}

impl<K: Hash + Eq, V> LruStore<K, V> {
    pub(crate) fn new(capacity: usize, max_bytes: Option<usize>) -> Self {
        let cap = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::new(1).unwrap());
        Self {
            cache: lru::LruCache::new(cap),
            max_bytes,
            bytes_used: 0,
        }
    }

    pub(crate) fn get(&mut self, key: &K) -> Option<&V> {
        self.cache.get(key).map(|(v, _)| v)
    }

    /// Inserts `value` with an estimated `size_bytes`, evicting LRU entries
    /// (by count, then by byte budget) as needed. Returns evicted entries.
    pub(crate) fn insert(&mut self, key: K, value: V, size_bytes: usize) -> Vec<(K, V)> {
        let mut evicted = Vec::new();
        if let Some((_, old_size)) = self.cache.peek(&key) {
            self.bytes_used -= *old_size;
        }
        if let Some((k, (v, s))) = self.cache.push(key, (value, size_bytes)) {
            self.bytes_used -= s;
            evicted.push((k, v));
        }
        self.bytes_used += size_bytes;

        if let Some(max_bytes) = self.max_bytes {
            while self.bytes_used > max_bytes {
                match self.cache.pop_lru() {
                    Some((k, (v, s))) => {
                        self.bytes_used -= s;
                        evicted.push((k, v));
                    }
                    None => break,
                }
            }
        }

        evicted
    }

    pub(crate) fn remove(&mut self, key: &K) -> Option<V> {
        self.cache.pop(key).map(|(v, s)| {
            self.bytes_used -= s;
            v
        })
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.cache.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evicts_by_count() {
        let mut store = LruStore::new(2, None);
        assert!(store.insert("a", 1, 1).is_empty());
        assert!(store.insert("b", 2, 1).is_empty());
        let evicted = store.insert("c", 3, 1);
        assert_eq!(evicted, vec![("a", 1)]);
    }

    #[test]
    fn evicts_by_byte_budget() {
        let mut store = LruStore::new(10, Some(7));
        store.insert("a", 1, 3);
        store.insert("b", 2, 3);
        let evicted = store.insert("c", 3, 3);
        assert_eq!(evicted, vec![("a", 1)]);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn get_promotes_recency() {
        let mut store = LruStore::new(2, None);
        store.insert("a", 1, 1);
        store.insert("b", 2, 1);
        assert_eq!(store.get(&"a"), Some(&1));
        let evicted = store.insert("c", 3, 1);
        assert_eq!(evicted, vec![("b", 2)]);
    }
}
