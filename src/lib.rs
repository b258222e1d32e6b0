//! Callisto is a library for running a distributed in-memory key/value cache
//! organized into named groups.
//!
//! # Introduction
//! Each node holds a bounded local cache. A cluster of peer nodes partitions
//! the keyspace by consistent hashing so that every key has a deterministic
//! owner node. When a key is absent from the local cache, the request is
//! either forwarded to the owning peer or answered by an application-provided
//! loader which fetches the value from the authoritative backing store.
//!
//! The cache defends that backing store against thundering herds: concurrent
//! identical loads are collapsed into a single in-flight operation and every
//! caller receives the shared result. Eviction within each node is strict
//! least-recently-used under a byte budget.
//!
//! # Features
//! * **Byte-bounded LRU caches** - each group owns a local cache which evicts
//!   the least recently used entries once a configured memory budget is
//!   exceeded (see [lru](crate::lru)).
//! * **Consistent-hash peer routing** - the keyspace is spread over all known
//!   peers via a virtual-node hash ring, so cluster membership changes only
//!   move a small fraction of the keys (see [ring](crate::ring)).
//! * **Request coalescing** - for a given key, at most one load is in flight
//!   at any time; concurrent callers join the pending load instead of hitting
//!   the backing store again (see [singleflight](crate::singleflight)).
//! * **100% Async/Await** - the peer transport and the loader seam build upon
//!   [tokio](https://tokio.rs/) so that slow sources never block a thread.
//! * **Reload-aware config facility** which permits to update the
//!   configuration during operation. The peer endpoint re-binds on the fly if
//!   the server address changes.
//!
//! # Modules
//! * **Group**: the public cache surface which chains local lookup, peer
//!   dispatch, loader invocation and coalescing into one request pipeline.
//!   See [crate::group].
//! * **HTTP pool**: the peer-facing endpoint and the peer-picker used to route
//!   keys to their owner nodes. See [crate::http].
//!
//! # Examples
//! A complete example of running a cache node can be found in the
//! `callisto-io` member of this workspace. Setting up a standalone group:
//!
//! ```
//! use callisto::builder::Builder;
//! use callisto::group::Registry;
//! use std::sync::Arc;
//!
//! fn fetch_score(key: &str) -> anyhow::Result<Vec<u8>> {
//!     Ok(key.as_bytes().to_vec())
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let platform = Builder::new().enable_registry().build().await;
//!     let registry = platform.require::<Registry>();
//!
//!     let group = registry
//!         .create("scores", 64 * 1024, Arc::new(fetch_score))
//!         .unwrap();
//!
//!     let view = group.get("Tom").await.unwrap();
//!     assert_eq!(view.to_vec(), b"Tom".to_vec());
//! }
//! ```
#![deny(
    missing_docs,
    trivial_casts,
    trivial_numeric_casts,
    unused_extern_crates,
    unused_import_braces
)]
use simplelog::{format_description, ConfigBuilder, LevelFilter, SimpleLogger};
use std::sync::Once;

pub mod builder;
pub mod byteview;
pub mod config;
pub mod fmt;
pub mod group;
pub mod http;
pub mod lru;
pub mod peers;
pub mod platform;
pub mod ring;
pub mod signals;
pub mod singleflight;

/// Contains the version of the callisto library.
pub const CALLISTO_VERSION: &str = "DEVELOPMENT-SNAPSHOT";

/// Contains the git commit hash of the callisto build being used.
pub const CALLISTO_REVISION: &str = "NO-REVISION";

/// Initializes the logging system.
///
/// Note that most probably the simplest way is to use a
/// [Builder](builder::Builder) to set up the framework, which will also set up
/// logging if enabled.
pub fn init_logging() {
    static INIT_LOGGING: Once = Once::new();

    // Guarded by Once as otherwise integration tests would crash when several
    // of them initialize the logging system...
    INIT_LOGGING.call_once(|| {
        if let Err(error) = SimpleLogger::init(
            LevelFilter::Debug,
            ConfigBuilder::new()
                .set_time_format_custom(format_description!(
                    "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:3]"
                ))
                .set_thread_level(LevelFilter::Trace)
                .set_target_level(LevelFilter::Error)
                .set_location_level(LevelFilter::Trace)
                .build(),
        ) {
            panic!("Failed to initialize logging system: {}", error);
        }
    });
}

/// Provides a simple macro to execute an async lambda within `tokio::spawn`.
///
/// Note that this also applies std::mem::drop on the returned closure to make
/// clippy happy.
///
/// # Example
/// ```rust
/// # #[macro_use] extern crate callisto;
/// # #[tokio::main]
/// # async fn main() {
/// spawn!(async move {
///     // perform some async stuff here...
/// });
/// # }
/// ```
#[macro_export]
macro_rules! spawn {
    ($e:expr) => {{
        std::mem::drop(tokio::spawn($e));
    }};
}
