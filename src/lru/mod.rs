//! Provides the byte-bounded LRU cache which backs every group.
//!
//! The [LruCache] itself is a single-threaded recency store. Concurrent access
//! is provided by the `MemCache` wrapper which guards the engine with an
//! exclusive lock - note that even reads mutate the recency order, therefore
//! a reader/writer lock would be of no use here.
mod lru_cache;
mod mem_cache;

pub use lru_cache::{ByteSize, EvictionCallback, LruCache};
pub(crate) use mem_cache::MemCache;
