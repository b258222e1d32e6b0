use crate::byteview::ByteView;
use crate::lru::LruCache;
use std::sync::Mutex;

/// Wraps the LRU engine for concurrent use by a group.
///
/// The engine is guarded by an exclusive lock. A reader/writer lock would be
/// pointless here as even `get` reorders the recency list. The engine itself
/// is only allocated once the first value arrives, so groups which never see
/// a load stay cheap.
pub(crate) struct MemCache {
    max_bytes: usize,
    engine: Mutex<Option<LruCache<ByteView>>>,
}

impl MemCache {
    /// Creates a wrapper which will build its engine with the given byte
    /// budget on the first write.
    pub(crate) fn new(max_bytes: usize) -> Self {
        MemCache {
            max_bytes,
            engine: Mutex::new(None),
        }
    }

    /// Returns the cached view for the given key and bumps its recency.
    ///
    /// A lookup before the first write is a miss and does not allocate the
    /// engine.
    pub(crate) fn get(&self, key: &str) -> Option<ByteView> {
        match self.engine.lock().unwrap().as_mut() {
            Some(engine) => engine.get(key).cloned(),
            None => None,
        }
    }

    /// Stores the given view, evicting older entries as needed.
    pub(crate) fn add(&self, key: &str, value: ByteView) {
        self.engine
            .lock()
            .unwrap()
            .get_or_insert_with(|| LruCache::new(self.max_bytes))
            .add(key.to_owned(), value);
    }

    /// Returns the number of live entries.
    pub(crate) fn len(&self) -> usize {
        self.engine
            .lock()
            .unwrap()
            .as_ref()
            .map(|engine| engine.len())
            .unwrap_or(0)
    }

    /// Returns the bytes currently occupied by the cached entries.
    pub(crate) fn used_bytes(&self) -> usize {
        self.engine
            .lock()
            .unwrap()
            .as_ref()
            .map(|engine| engine.used_bytes())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::MemCache;
    use crate::byteview::ByteView;

    #[test]
    fn lookups_before_the_first_write_do_not_allocate_the_engine() {
        let cache = MemCache::new(1024);

        assert!(cache.get("key").is_none());
        assert!(cache.engine.lock().unwrap().is_none());

        cache.add("key", ByteView::new(b"value".to_vec()));
        assert!(cache.engine.lock().unwrap().is_some());
        assert_eq!(cache.get("key").unwrap().to_vec(), b"value".to_vec());
    }

    #[test]
    fn the_engine_budget_is_applied() {
        let cache = MemCache::new(10);

        cache.add("a", ByteView::new(b"1234".to_vec()));
        cache.add("b", ByteView::new(b"1234".to_vec()));
        cache.add("c", ByteView::new(b"1234".to_vec()));

        assert_eq!(cache.len(), 2);
        assert!(cache.used_bytes() <= 10);
        assert!(cache.get("a").is_none());
        assert!(cache.get("c").is_some());
    }

    #[test]
    fn views_can_be_read_concurrently() {
        use std::sync::Arc;

        let cache = Arc::new(MemCache::new(1024));
        cache.add("key", ByteView::new(b"value".to_vec()));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let cache = cache.clone();
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        assert_eq!(cache.get("key").unwrap().to_vec(), b"value".to_vec());
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
    }
}
