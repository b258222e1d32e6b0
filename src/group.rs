//! Provides the cache groups and the registry which manages them.
//!
//! A [Group] is a named cache namespace. It owns a byte-bounded local cache,
//! a user-supplied [Loader] which can produce the authoritative value for a
//! key, and a coalescer which ensures that a hot key never hits the backing
//! store more than once concurrently. If a [PeerPicker] has been registered,
//! keys owned by other nodes are fetched from there instead of invoking the
//! loader.
//!
//! A read request therefore flows as: local cache probe, coalescing gate,
//! peer dispatch, loader invocation, cache population.
//!
//! Groups are created through the [Registry], live for the whole process and
//! are never destroyed.
//!
//! # Examples
//! ```
//! use callisto::group::Registry;
//! use std::sync::Arc;
//!
//! fn load_from_slow_db(key: &str) -> anyhow::Result<Vec<u8>> {
//!     match key {
//!         "Tom" => Ok(b"630".to_vec()),
//!         _ => Err(anyhow::anyhow!("{} not exist", key)),
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let registry = Registry::new();
//!     let group = registry
//!         .create("scores", 2 << 10, Arc::new(load_from_slow_db))
//!         .unwrap();
//!
//!     // The first read invokes the loader, the second one is served from
//!     // the local cache...
//!     assert_eq!(group.get("Tom").await.unwrap().to_string(), "630");
//!     assert_eq!(group.get("Tom").await.unwrap().to_string(), "630");
//!     assert_eq!(group.stats().local_loads(), 1);
//!
//!     // ...and unknown keys surface the loader error.
//!     assert!(group.get("Nobody").await.is_err());
//! }
//! ```
use crate::byteview::ByteView;
use crate::lru::MemCache;
use crate::peers::PeerPicker;
use crate::platform::Platform;
use crate::singleflight::SingleFlight;
use async_trait::async_trait;
use once_cell::sync::OnceCell;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

/// Produces the authoritative bytes for a key.
///
/// A loader is supplied by the application when a group is created and is
/// only consulted when a key is neither cached locally nor owned by a remote
/// peer. It may perform arbitrary I/O. Returning an empty byte vector without
/// an error is a valid, cacheable empty value.
///
/// Plain functions and closures of the shape
/// `Fn(&str) -> anyhow::Result<Vec<u8>>` implement this trait out of the box;
/// implement it manually when the source requires async I/O.
#[async_trait]
pub trait Loader: Send + Sync {
    /// Loads the value for the given key from the backing store.
    async fn load(&self, key: &str) -> anyhow::Result<Vec<u8>>;
}

#[async_trait]
impl<F> Loader for F
where
    F: Fn(&str) -> anyhow::Result<Vec<u8>> + Send + Sync,
{
    async fn load(&self, key: &str) -> anyhow::Result<Vec<u8>> {
        self(key)
    }
}

/// Counts the observable events of a group.
///
/// All counters start at zero and only ever grow. They are updated with
/// relaxed ordering - the numbers are for observability, not for
/// synchronization.
#[derive(Default)]
pub struct GroupStats {
    gets: AtomicU64,
    hits: AtomicU64,
    local_loads: AtomicU64,
    peer_loads: AtomicU64,
    peer_errors: AtomicU64,
    loader_errors: AtomicU64,
}

impl GroupStats {
    /// Returns the total number of non-rejected `get` calls.
    pub fn gets(&self) -> u64 {
        self.gets.load(Ordering::Relaxed)
    }

    /// Returns how many `get` calls were answered from the local cache.
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Returns how many values were produced by the loader.
    pub fn local_loads(&self) -> u64 {
        self.local_loads.load(Ordering::Relaxed)
    }

    /// Returns how many values were fetched from a peer.
    pub fn peer_loads(&self) -> u64 {
        self.peer_loads.load(Ordering::Relaxed)
    }

    /// Returns how many peer fetches failed and fell through to the loader.
    pub fn peer_errors(&self) -> u64 {
        self.peer_errors.load(Ordering::Relaxed)
    }

    /// Returns how many loader invocations ended in an error.
    pub fn loader_errors(&self) -> u64 {
        self.loader_errors.load(Ordering::Relaxed)
    }

    /// Returns the cache hit rate in percent.
    pub fn hit_rate(&self) -> f32 {
        match self.gets() {
            0 => 0.,
            total => self.hits() as f32 / total as f32 * 100.,
        }
    }
}

/// A named cache namespace.
///
/// See the [module docs](crate::group) for the request pipeline and an
/// example.
pub struct Group {
    name: String,
    loader: Arc<dyn Loader>,
    cache: MemCache,
    peers: OnceCell<Arc<dyn PeerPicker>>,
    flights: SingleFlight<ByteView>,
    stats: GroupStats,
}

impl Group {
    fn new(name: &str, max_bytes: usize, loader: Arc<dyn Loader>) -> Self {
        Group {
            name: name.to_owned(),
            loader,
            cache: MemCache::new(max_bytes),
            peers: OnceCell::new(),
            flights: SingleFlight::new(),
            stats: GroupStats::default(),
        }
    }

    /// Returns the name under which this group was registered.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the event counters of this group.
    pub fn stats(&self) -> &GroupStats {
        &self.stats
    }

    /// Returns the number of entries currently held in the local cache.
    pub fn cached_entries(&self) -> usize {
        self.cache.len()
    }

    /// Returns the bytes currently occupied by the local cache.
    pub fn cached_bytes(&self) -> usize {
        self.cache.used_bytes()
    }

    /// Installs the peer picker which routes keys to their owner nodes.
    ///
    /// Without a picker, every miss is answered by the loader. The picker can
    /// be installed at most once.
    ///
    /// # Panics
    /// Panics if a picker has already been installed.
    pub fn register_peers(&self, peers: Arc<dyn PeerPicker>) {
        if self.peers.set(peers).is_err() {
            panic!(
                "register_peers called more than once on group '{}'",
                self.name
            );
        }
    }

    /// Returns the value for the given key.
    ///
    /// A locally cached value is returned directly. Otherwise the load is
    /// coalesced with all concurrent requests for the same key and answered
    /// by the owning peer or, failing that, by the group's loader. Values
    /// produced by the loader populate the local cache; values fetched from
    /// a peer do not, as the owner already caches them authoritatively.
    ///
    /// An empty key is rejected, as are loader errors - in both cases nothing
    /// is cached, so a later call retries the source.
    pub async fn get(&self, key: &str) -> anyhow::Result<ByteView> {
        if key.is_empty() {
            return Err(anyhow::anyhow!("key is required"));
        }

        self.stats.gets.fetch_add(1, Ordering::Relaxed);

        if let Some(view) = self.cache.get(key) {
            self.stats.hits.fetch_add(1, Ordering::Relaxed);
            log::debug!("[{}] cache hit for '{}'", self.name, key);
            return Ok(view);
        }

        self.load(key).await
    }

    /// Produces a missing value, deduplicating concurrent loads per key.
    async fn load(&self, key: &str) -> anyhow::Result<ByteView> {
        self.flights
            .run(key, || self.load_uncached(key))
            .await
            .map_err(|error| anyhow::anyhow!("{:#}", error))
    }

    /// The actual load path executed by exactly one caller per key at a time.
    async fn load_uncached(&self, key: &str) -> anyhow::Result<ByteView> {
        if let Some(peers) = self.peers.get() {
            if let Some(fetcher) = peers.pick_peer(key) {
                match fetcher.fetch(&self.name, key).await {
                    Ok(bytes) => {
                        self.stats.peer_loads.fetch_add(1, Ordering::Relaxed);
                        return Ok(ByteView::new(bytes));
                    }
                    Err(error) => {
                        self.stats.peer_errors.fetch_add(1, Ordering::Relaxed);
                        log::warn!(
                            "[{}] failed to fetch '{}' from its owner, falling back to the local loader: {:#}",
                            self.name,
                            key,
                            error
                        );
                    }
                }
            }
        }

        self.load_locally(key).await
    }

    /// Invokes the loader and populates the local cache on success.
    async fn load_locally(&self, key: &str) -> anyhow::Result<ByteView> {
        let bytes = match self.loader.load(key).await {
            Ok(bytes) => bytes,
            Err(error) => {
                self.stats.loader_errors.fetch_add(1, Ordering::Relaxed);
                return Err(error);
            }
        };

        let view = ByteView::new(bytes);
        self.stats.local_loads.fetch_add(1, Ordering::Relaxed);
        self.cache.add(key, view.clone());

        Ok(view)
    }
}

/// The process-wide mapping of group names to groups.
///
/// Lookups vastly outnumber creations, therefore the registry uses a
/// reader/writer lock: any number of concurrent
/// [find_group](Registry::find_group) calls proceed in parallel while
/// [create](Registry::create) is serialized.
pub struct Registry {
    groups: RwLock<HashMap<String, Arc<Group>>>,
}

impl Registry {
    /// Creates an empty registry.
    pub fn new() -> Arc<Self> {
        Arc::new(Registry {
            groups: RwLock::new(HashMap::new()),
        })
    }

    /// Creates a registry and registers it in the given platform.
    ///
    /// Note that this is called by the [Builder](crate::builder::Builder)
    /// unless disabled.
    pub fn install(platform: &Arc<Platform>) -> Arc<Self> {
        let registry = Registry::new();
        platform.register::<Registry>(registry.clone());

        registry
    }

    /// Creates and registers a group with the given name, cache budget (in
    /// bytes, 0 = unbounded) and loader.
    ///
    /// Group names are unique - creating a second group under an existing
    /// name is rejected so that no caller can silently lose its cache.
    pub fn create(
        &self,
        name: &str,
        max_bytes: usize,
        loader: Arc<dyn Loader>,
    ) -> anyhow::Result<Arc<Group>> {
        let mut groups = self.groups.write().unwrap();
        if groups.contains_key(name) {
            return Err(anyhow::anyhow!("a group named '{}' already exists", name));
        }

        log::info!(
            "Creating group '{}' with a cache budget of {}...",
            name,
            crate::fmt::format_size(max_bytes)
        );

        let group = Arc::new(Group::new(name, max_bytes, loader));
        let _ = groups.insert(name.to_owned(), group.clone());

        Ok(group)
    }

    /// Returns the group registered under the given name.
    pub fn find_group(&self, name: &str) -> Option<Arc<Group>> {
        self.groups.read().unwrap().get(name).cloned()
    }
}
