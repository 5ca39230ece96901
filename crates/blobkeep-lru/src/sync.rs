use std::borrow::Borrow;
use std::hash::Hash;
use std::sync::Mutex;

use crate::cache::LruCache;

/// An LRU cache safe for concurrent access.
///
/// Wraps [`LruCache`] in a `Mutex`; every operation, including lookups
/// (which reorder the recency list), takes the lock. Values are cloned out
/// so no reference outlives the critical section.
pub struct SyncLruCache<K, V> {
    inner: Mutex<LruCache<K, V>>,
}

impl<K: Hash + Eq + Clone, V: Clone> SyncLruCache<K, V> {
    /// Create a cache holding at most `max_entries` items; 0 means no limit.
    pub fn new(max_entries: usize) -> Self {
        Self {
            inner: Mutex::new(LruCache::new(max_entries)),
        }
    }

    pub fn add(&self, key: K, value: V) -> Option<(K, V)> {
        self.inner.lock().expect("lru lock poisoned").add(key, value)
    }

    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.inner.lock().expect("lru lock poisoned").get(key).cloned()
    }

    pub fn remove<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.inner.lock().expect("lru lock poisoned").remove(key)
    }

    pub fn remove_oldest(&self) -> Option<(K, V)> {
        self.inner.lock().expect("lru lock poisoned").remove_oldest()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("lru lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().expect("lru lock poisoned").is_empty()
    }
}

impl<K, V> std::fmt::Debug for SyncLruCache<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.inner.try_lock() {
            Ok(cache) => f.debug_tuple("SyncLruCache").field(&*cache).finish(),
            Err(_) => f.write_str("SyncLruCache(<locked>)"),
        }
    }
}
