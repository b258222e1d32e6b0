use linked_hash_map::LinkedHashMap;

/// Returns the size of a cached value in bytes.
pub trait ByteSize {
    /// Returns the number of bytes this value accounts for in the cache
    /// budget.
    ///
    /// Note that most probably this is an approximation which represents the
    /// "largest" part of an instance (e.g. for a string this would be the
    /// bytes on the heap, discarding the length and capacity fields).
    fn byte_size(&self) -> usize;
}

impl ByteSize for String {
    fn byte_size(&self) -> usize {
        self.len()
    }
}

impl ByteSize for Vec<u8> {
    fn byte_size(&self) -> usize {
        self.len()
    }
}

/// Invoked with the key and value of every entry discarded by the cache.
pub type EvictionCallback<V> = Box<dyn FnMut(String, V) + Send>;

/// Provides a size constrained LRU cache.
///
/// The cache behaves just like a map as long as there is no shortage in
/// storage. Once the bytes occupied by all keys and values exceed the given
/// budget, the least recently used entries are evicted until the cache fits
/// again - hence the name LRU cache.
///
/// A budget of **0** disables eviction entirely, the cache then grows without
/// bounds. The budget is advisory for a single entry: an entry larger than
/// the whole budget is still accepted (everything else is evicted to make
/// room), as rejecting it would turn hot oversized values into permanent
/// cache misses.
///
/// Note that the cache itself is not thread safe and even
/// [get](LruCache::get) needs `&mut self` as it updates the recency order.
/// Synchronization is the job of the caller.
///
/// # Examples
/// ```
/// # use callisto::lru::LruCache;
/// // Each entry occupies key.len() + value.len() bytes, so two of the
/// // entries below fit into a budget of 12 bytes...
/// let mut lru = LruCache::new(12);
///
/// lru.add("a".to_owned(), "12345".to_owned());
/// lru.add("b".to_owned(), "12345".to_owned());
/// assert_eq!(lru.len(), 2);
///
/// // ...and adding a third one will evict the least recently used entry.
/// lru.add("c".to_owned(), "12345".to_owned());
/// assert_eq!(lru.get("a"), None);
/// assert_eq!(lru.get("b").is_some(), true);
/// assert_eq!(lru.get("c").is_some(), true);
/// ```
pub struct LruCache<V: ByteSize> {
    max_bytes: usize,
    used_bytes: usize,
    map: LinkedHashMap<String, V>,
    on_evicted: Option<EvictionCallback<V>>,
}

impl<V: ByteSize> LruCache<V> {
    /// Creates a new cache which may occupy up to `max_bytes` of memory.
    ///
    /// Passing **0** creates an unbounded cache.
    pub fn new(max_bytes: usize) -> Self {
        LruCache {
            max_bytes,
            used_bytes: 0,
            map: LinkedHashMap::new(),
            on_evicted: None,
        }
    }

    /// Creates a bounded cache which reports every evicted entry to the given
    /// callback.
    ///
    /// The callback runs synchronously while an [add](LruCache::add) or
    /// [remove_oldest](LruCache::remove_oldest) is in progress. It receives
    /// ownership of the discarded pair and must not touch the cache it was
    /// installed on.
    ///
    /// # Examples
    /// ```
    /// # use callisto::lru::LruCache;
    /// # use std::sync::{Arc, Mutex};
    /// let evicted = Arc::new(Mutex::new(Vec::new()));
    /// let log = evicted.clone();
    ///
    /// let mut lru = LruCache::with_callback(10, move |key, _value: String| {
    ///     log.lock().unwrap().push(key);
    /// });
    ///
    /// lru.add("a".to_owned(), "1234".to_owned());
    /// lru.add("b".to_owned(), "1234".to_owned());
    /// lru.add("c".to_owned(), "1234".to_owned());
    ///
    /// assert_eq!(*evicted.lock().unwrap(), vec!["a".to_owned()]);
    /// ```
    pub fn with_callback(
        max_bytes: usize,
        callback: impl FnMut(String, V) + Send + 'static,
    ) -> Self {
        LruCache {
            max_bytes,
            used_bytes: 0,
            map: LinkedHashMap::new(),
            on_evicted: Some(Box::new(callback)),
        }
    }

    /// Returns the value stored for the given key and marks it as most
    /// recently used.
    ///
    /// Looking a key up does not change the byte accounting.
    pub fn get(&mut self, key: &str) -> Option<&V> {
        match self.map.get_refresh(key) {
            Some(value) => Some(&*value),
            None => None,
        }
    }

    /// Stores the given value for the given key.
    ///
    /// If the key is already present, its value is replaced and the entry
    /// becomes the most recently used one. Afterwards, least recently used
    /// entries are evicted until the cache fits into its budget again. The
    /// entry just added is never evicted by this pass, even if it exceeds the
    /// budget on its own.
    pub fn add(&mut self, key: String, value: V) {
        let value_size = value.byte_size();

        if let Some(previous) = self.map.get_refresh(&key) {
            self.used_bytes = self.used_bytes - previous.byte_size() + value_size;
            *previous = value;
        } else {
            self.used_bytes += key.len() + value_size;
            let _ = self.map.insert(key, value);
        }

        while self.max_bytes > 0 && self.used_bytes > self.max_bytes && self.map.len() > 1 {
            self.remove_oldest();
        }
    }

    /// Discards the least recently used entry.
    ///
    /// If an eviction callback is installed, it receives the discarded pair.
    /// Calling this on an empty cache does nothing.
    pub fn remove_oldest(&mut self) {
        if let Some((key, value)) = self.map.pop_front() {
            self.used_bytes -= key.len() + value.byte_size();
            if let Some(callback) = self.on_evicted.as_mut() {
                callback(key, value);
            }
        }
    }

    /// Returns the number of live entries.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Determines if the cache is completely empty.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Returns the bytes currently occupied by all keys and values.
    pub fn used_bytes(&self) -> usize {
        self.used_bytes
    }

    /// Returns the memory budget of this cache (0 = unbounded).
    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }
}

#[cfg(test)]
mod tests {
    use super::LruCache;
    use std::sync::{Arc, Mutex};

    #[test]
    fn hits_and_misses_are_reported() {
        let mut lru = LruCache::new(0);

        lru.add("key1".to_owned(), "1234".to_owned());
        assert_eq!(lru.get("key1"), Some(&"1234".to_owned()));
        assert_eq!(lru.get("key2"), None);
    }

    #[test]
    fn byte_accounting_matches_the_live_entries() {
        let mut lru = LruCache::new(0);

        lru.add("Hello".to_owned(), "World".to_owned());
        lru.add("Hello1".to_owned(), "World1".to_owned());
        assert_eq!(lru.used_bytes(), 10 + 12);
        assert_eq!(lru.len(), 2);

        // Replacing a value adjusts the accounting by the size delta...
        lru.add("Hello".to_owned(), "W".to_owned());
        assert_eq!(lru.used_bytes(), 6 + 12);
        assert_eq!(lru.len(), 2);

        // ...and so does restoring the previous one.
        lru.add("Hello".to_owned(), "World".to_owned());
        assert_eq!(lru.used_bytes(), 10 + 12);

        // Reads never change the accounting.
        let _ = lru.get("Hello");
        assert_eq!(lru.used_bytes(), 10 + 12);
    }

    #[test]
    fn replacing_a_value_keeps_a_single_entry() {
        let mut lru = LruCache::new(0);

        lru.add("key".to_owned(), "v1".to_owned());
        lru.add("key".to_owned(), "v2".to_owned());

        assert_eq!(lru.len(), 1);
        assert_eq!(lru.get("key"), Some(&"v2".to_owned()));
        assert_eq!(lru.used_bytes(), 3 + 2);
    }

    #[test]
    fn the_least_recently_used_entry_is_evicted_first() {
        // Each entry occupies 5 bytes, so the budget holds two of them...
        let evicted = Arc::new(Mutex::new(Vec::new()));
        let log = evicted.clone();
        let mut lru = LruCache::with_callback(10, move |key, value: String| {
            log.lock().unwrap().push((key, value));
        });

        lru.add("a".to_owned(), "1234".to_owned());
        lru.add("b".to_owned(), "1234".to_owned());
        lru.add("c".to_owned(), "1234".to_owned());

        assert_eq!(lru.len(), 2);
        assert_eq!(lru.get("a"), None);
        assert_eq!(lru.get("b").is_some(), true);
        assert_eq!(lru.get("c").is_some(), true);
        assert_eq!(
            *evicted.lock().unwrap(),
            vec![("a".to_owned(), "1234".to_owned())]
        );
    }

    #[test]
    fn reading_an_entry_saves_it_from_eviction() {
        let mut lru = LruCache::new(10);

        lru.add("a".to_owned(), "1234".to_owned());
        lru.add("b".to_owned(), "1234".to_owned());

        // "a" is now the most recently used entry, so "b" has to go...
        let _ = lru.get("a");
        lru.add("c".to_owned(), "1234".to_owned());

        assert_eq!(lru.get("a").is_some(), true);
        assert_eq!(lru.get("b"), None);
        assert_eq!(lru.get("c").is_some(), true);
    }

    #[test]
    fn an_exactly_fitting_entry_is_kept() {
        let mut lru = LruCache::new(5);

        lru.add("a".to_owned(), "1234".to_owned());
        assert_eq!(lru.len(), 1);
        assert_eq!(lru.used_bytes(), 5);

        // A second distinct key evicts the first...
        lru.add("b".to_owned(), "1234".to_owned());
        assert_eq!(lru.len(), 1);
        assert_eq!(lru.get("a"), None);
        assert_eq!(lru.get("b").is_some(), true);
    }

    #[test]
    fn an_oversized_entry_evicts_everything_else_but_stays() {
        let evicted = Arc::new(Mutex::new(Vec::new()));
        let log = evicted.clone();
        let mut lru = LruCache::with_callback(10, move |key, _value: String| {
            log.lock().unwrap().push(key);
        });

        lru.add("a".to_owned(), "1234".to_owned());
        lru.add("b".to_owned(), "1234".to_owned());
        lru.add("big".to_owned(), "X".repeat(64));

        // The budget is advisory for a single entry: the oversized value
        // survives even though it exceeds the budget on its own.
        assert_eq!(lru.len(), 1);
        assert_eq!(lru.get("big").is_some(), true);
        assert_eq!(lru.used_bytes(), 3 + 64);
        assert_eq!(*evicted.lock().unwrap(), vec!["a".to_owned(), "b".to_owned()]);
    }

    #[test]
    fn a_zero_budget_disables_eviction() {
        let mut lru = LruCache::new(0);

        for index in 0..100 {
            lru.add(format!("key{}", index), "X".repeat(1024));
        }

        assert_eq!(lru.len(), 100);
    }

    #[test]
    fn remove_oldest_pops_in_recency_order() {
        let mut lru = LruCache::new(0);

        lru.add("a".to_owned(), "1".to_owned());
        lru.add("b".to_owned(), "2".to_owned());
        let _ = lru.get("a");

        lru.remove_oldest();
        assert_eq!(lru.get("b"), None);
        assert_eq!(lru.get("a").is_some(), true);

        lru.remove_oldest();
        assert!(lru.is_empty());
        assert_eq!(lru.used_bytes(), 0);

        // Popping an empty cache is a no-op.
        lru.remove_oldest();
        assert!(lru.is_empty());
    }
}
