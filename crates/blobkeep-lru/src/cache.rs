use std::borrow::Borrow;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;

/// Sentinel link for "no neighbour".
const NIL: usize = usize::MAX;

struct Entry<K, V> {
    key: K,
    value: V,
    /// Towards the most recently used end.
    prev: usize,
    /// Towards the least recently used end.
    next: usize,
}

/// An LRU cache that is not safe for concurrent access.
///
/// Entries live densely in a `Vec` and are threaded into a doubly-linked
/// recency list by index (most recently used at `head`). A `HashMap` maps
/// each key to its slot. Removal uses `swap_remove` and relinks the entry
/// that moved into the vacated slot, so slots never dangle.
pub struct LruCache<K, V> {
    max_entries: usize,
    entries: Vec<Entry<K, V>>,
    index: HashMap<K, usize>,
    head: usize,
    tail: usize,
}

impl<K: Hash + Eq + Clone, V> LruCache<K, V> {
    /// Create a cache holding at most `max_entries` items; 0 means no limit.
    pub fn new(max_entries: usize) -> Self {
        Self {
            max_entries,
            entries: Vec::new(),
            index: HashMap::new(),
            head: NIL,
            tail: NIL,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Insert or update `key`, making it the most recently used entry.
    ///
    /// Returns the entry evicted to stay within `max_entries`, if any.
    pub fn add(&mut self, key: K, value: V) -> Option<(K, V)> {
        if let Some(&slot) = self.index.get(&key) {
            self.entries[slot].value = value;
            self.promote(slot);
            return None;
        }

        let slot = self.entries.len();
        self.entries.push(Entry {
            key: key.clone(),
            value,
            prev: NIL,
            next: NIL,
        });
        self.index.insert(key, slot);
        self.attach_front(slot);

        if self.max_entries > 0 && self.entries.len() > self.max_entries {
            return self.remove_oldest();
        }
        None
    }

    /// Look up `key` and mark it most recently used.
    pub fn get<Q>(&mut self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let slot = *self.index.get(key)?;
        self.promote(slot);
        Some(&self.entries[slot].value)
    }

    /// Look up `key` without touching its recency.
    pub fn peek<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.index.get(key).map(|&slot| &self.entries[slot].value)
    }

    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.index.contains_key(key)
    }

    /// Remove and return the least recently used entry.
    pub fn remove_oldest(&mut self) -> Option<(K, V)> {
        if self.tail == NIL {
            return None;
        }
        Some(self.remove_slot(self.tail))
    }

    /// Remove `key` if present and return its value.
    pub fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let slot = *self.index.get(key)?;
        Some(self.remove_slot(slot).1)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.index.clear();
        self.head = NIL;
        self.tail = NIL;
    }

    /// Keys from most to least recently used.
    pub fn keys(&self) -> Keys<'_, K, V> {
        Keys {
            entries: &self.entries,
            cursor: self.head,
        }
    }

    fn promote(&mut self, slot: usize) {
        if self.head == slot {
            return;
        }
        self.detach(slot);
        self.attach_front(slot);
    }

    fn detach(&mut self, slot: usize) {
        let (prev, next) = (self.entries[slot].prev, self.entries[slot].next);
        if prev == NIL {
            self.head = next;
        } else {
            self.entries[prev].next = next;
        }
        if next == NIL {
            self.tail = prev;
        } else {
            self.entries[next].prev = prev;
        }
        self.entries[slot].prev = NIL;
        self.entries[slot].next = NIL;
    }

    fn attach_front(&mut self, slot: usize) {
        self.entries[slot].prev = NIL;
        self.entries[slot].next = self.head;
        if self.head == NIL {
            self.tail = slot;
        } else {
            self.entries[self.head].prev = slot;
        }
        self.head = slot;
    }

    fn remove_slot(&mut self, slot: usize) -> (K, V) {
        self.detach(slot);
        let removed = self.entries.swap_remove(slot);
        self.index.remove(&removed.key);

        // The former last entry now lives in `slot`; point its neighbours
        // and its index entry at the new position.
        if slot < self.entries.len() {
            let (prev, next) = (self.entries[slot].prev, self.entries[slot].next);
            if prev == NIL {
                self.head = slot;
            } else {
                self.entries[prev].next = slot;
            }
            if next == NIL {
                self.tail = slot;
            } else {
                self.entries[next].prev = slot;
            }
            if let Some(position) = self.index.get_mut(&self.entries[slot].key) {
                *position = slot;
            }
        }

        (removed.key, removed.value)
    }
}

impl<K, V> fmt::Debug for LruCache<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LruCache")
            .field("len", &self.entries.len())
            .field("max_entries", &self.max_entries)
            .finish()
    }
}

/// Iterator over cache keys in recency order, see [`LruCache::keys`].
pub struct Keys<'a, K, V> {
    entries: &'a [Entry<K, V>],
    cursor: usize,
}

impl<'a, K, V> Iterator for Keys<'a, K, V> {
    type Item = &'a K;

    fn next(&mut self) -> Option<Self::Item> {
        let entry = self.entries.get(self.cursor)?;
        self.cursor = entry.next;
        Some(&entry.key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::VecDeque;

    impl<K: Hash + Eq + Clone + fmt::Debug, V> LruCache<K, V> {
        /// Walk the list both ways and cross-check it against the index.
        fn assert_consistent(&self) {
            let forward: Vec<&K> = self.keys().collect();
            assert_eq!(forward.len(), self.entries.len());
            assert_eq!(self.index.len(), self.entries.len());
            for (key, &slot) in &self.index {
                assert_eq!(&self.entries[slot].key, key);
            }
            let mut backward = Vec::new();
            let mut cursor = self.tail;
            while cursor != NIL {
                backward.push(&self.entries[cursor].key);
                cursor = self.entries[cursor].prev;
            }
            backward.reverse();
            assert_eq!(forward, backward);
            if self.max_entries > 0 {
                assert!(self.entries.len() <= self.max_entries);
            }
        }
    }

    #[test]
    fn get_returns_added_value() {
        let mut cache = LruCache::new(0);
        cache.add("myKey".to_string(), 1234);
        assert_eq!(cache.get("myKey"), Some(&1234));
        assert_eq!(cache.get("nonsense"), None);
    }

    #[test]
    fn add_updates_existing_value() {
        let mut cache = LruCache::new(2);
        cache.add("a".to_string(), 1);
        cache.add("a".to_string(), 2);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.peek("a"), Some(&2));
        cache.assert_consistent();
    }

    #[test]
    fn evicts_least_recently_added() {
        let mut cache = LruCache::new(2);
        assert_eq!(cache.add("a".to_string(), 1), None);
        assert_eq!(cache.add("b".to_string(), 2), None);
        assert_eq!(cache.add("c".to_string(), 3), Some(("a".to_string(), 1)));
        assert_eq!(cache.len(), 2);
        assert!(!cache.contains("a"));
        cache.assert_consistent();
    }

    #[test]
    fn get_promotes_entry_past_eviction() {
        let mut cache = LruCache::new(3);
        for (k, v) in [("a", 1), ("b", 2), ("c", 3)] {
            cache.add(k.to_string(), v);
        }
        // "a" is the oldest; touching it makes "b" the next victim.
        assert_eq!(cache.get("a"), Some(&1));
        let evicted = cache.add("d".to_string(), 4);
        assert_eq!(evicted, Some(("b".to_string(), 2)));
        assert!(cache.contains("a"));
        cache.assert_consistent();
    }

    #[test]
    fn re_adding_promotes_entry() {
        let mut cache = LruCache::new(2);
        cache.add("a".to_string(), 1);
        cache.add("b".to_string(), 2);
        cache.add("a".to_string(), 10);
        assert_eq!(cache.add("c".to_string(), 3), Some(("b".to_string(), 2)));
        assert_eq!(cache.peek("a"), Some(&10));
    }

    #[test]
    fn peek_does_not_promote() {
        let mut cache = LruCache::new(2);
        cache.add("a".to_string(), 1);
        cache.add("b".to_string(), 2);
        assert_eq!(cache.peek("a"), Some(&1));
        assert_eq!(cache.add("c".to_string(), 3), Some(("a".to_string(), 1)));
    }

    #[test]
    fn remove_oldest_in_order() {
        let mut cache = LruCache::new(0);
        cache.add(1, "one");
        cache.add(2, "two");
        cache.add(3, "three");
        assert_eq!(cache.remove_oldest(), Some((1, "one")));
        assert_eq!(cache.remove_oldest(), Some((2, "two")));
        assert_eq!(cache.remove_oldest(), Some((3, "three")));
        assert_eq!(cache.remove_oldest(), None);
        assert!(cache.is_empty());
        cache.assert_consistent();
    }

    #[test]
    fn remove_from_middle_relinks() {
        let mut cache = LruCache::new(0);
        for i in 0..5 {
            cache.add(i, i * 10);
        }
        assert_eq!(cache.remove(&0), Some(0));
        assert_eq!(cache.remove(&2), Some(20));
        assert_eq!(cache.remove(&2), None);
        cache.assert_consistent();
        let order: Vec<i32> = cache.keys().copied().collect();
        assert_eq!(order, vec![4, 3, 1]);
    }

    #[test]
    fn unbounded_cache_never_evicts() {
        let mut cache = LruCache::new(0);
        for i in 0..1000 {
            assert_eq!(cache.add(i, i), None);
        }
        assert_eq!(cache.len(), 1000);
    }

    #[test]
    fn clear_empties_cache() {
        let mut cache = LruCache::new(4);
        cache.add("x".to_string(), 1);
        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.remove_oldest(), None);
        cache.add("y".to_string(), 2);
        cache.assert_consistent();
    }

    #[derive(Clone, Debug)]
    enum Op {
        Add(u8, u32),
        Get(u8),
        RemoveOldest,
        Remove(u8),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0u8..16, any::<u32>()).prop_map(|(k, v)| Op::Add(k, v)),
            (0u8..16).prop_map(Op::Get),
            Just(Op::RemoveOldest),
            (0u8..16).prop_map(Op::Remove),
        ]
    }

    proptest! {
        #[test]
        fn behaves_like_reference_model(cap in 0usize..6, ops in prop::collection::vec(op(), 0..200)) {
            let mut cache = LruCache::new(cap);
            // Front = most recently used.
            let mut model: VecDeque<(u8, u32)> = VecDeque::new();

            for op in ops {
                match op {
                    Op::Add(k, v) => {
                        model.retain(|(mk, _)| *mk != k);
                        model.push_front((k, v));
                        let expected = if cap > 0 && model.len() > cap { model.pop_back() } else { None };
                        prop_assert_eq!(cache.add(k, v), expected);
                    }
                    Op::Get(k) => {
                        let expected = model.iter().position(|(mk, _)| *mk == k).map(|i| {
                            let entry = model.remove(i).unwrap_or((k, 0));
                            model.push_front(entry);
                            entry.1
                        });
                        prop_assert_eq!(cache.get(&k).copied(), expected);
                    }
                    Op::RemoveOldest => {
                        prop_assert_eq!(cache.remove_oldest(), model.pop_back());
                    }
                    Op::Remove(k) => {
                        let expected = model.iter().position(|(mk, _)| *mk == k)
                            .and_then(|i| model.remove(i)).map(|(_, v)| v);
                        prop_assert_eq!(cache.remove(&k), expected);
                    }
                }
                cache.assert_consistent();
                let keys: Vec<u8> = cache.keys().copied().collect();
                let model_keys: Vec<u8> = model.iter().map(|(k, _)| *k).collect();
                prop_assert_eq!(keys, model_keys);
            }
        }

        #[test]
        fn len_never_exceeds_capacity(cap in 1usize..8, keys in prop::collection::vec(any::<u16>(), 0..100)) {
            let mut cache = LruCache::new(cap);
            for k in keys {
                cache.add(k, ());
                prop_assert!(cache.len() <= cap);
            }
        }
    }
}
