//! Contracts for locating and querying the peer owning a key.
//!
//! A [PeerPicker] decides whether a key should be served by a remote node and
//! hands out the matching [PeerFetcher] if so. The concrete implementation
//! shipped with this crate is [HttpPool](crate::http::HttpPool); both traits
//! exist so that groups stay independent of any particular transport.
use async_trait::async_trait;
use std::sync::Arc;

/// Locates the peer owning a key.
///
/// Implementations must be callable from concurrent tasks.
pub trait PeerPicker: Send + Sync {
    /// Returns a fetcher for the owner of `key`, but only if the owner is a
    /// remote node.
    ///
    /// `None` means "serve locally" - either because this node owns the key
    /// itself or because no peers are known.
    fn pick_peer(&self, key: &str) -> Option<Arc<dyn PeerFetcher>>;
}

/// Fetches the raw bytes for a key from the remote node owning it.
#[async_trait]
pub trait PeerFetcher: Send + Sync {
    /// Asks the remote node for the value of `key` within the named group.
    async fn fetch(&self, group: &str, key: &str) -> anyhow::Result<Vec<u8>>;
}
