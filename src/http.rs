//! Contains the HTTP peer transport of callisto.
//!
//! Every node of a cluster exposes its groups to its peers at
//! `/<base>/<group>/<key>`, where `<base>` defaults to **/_zcache/** and both
//! path segments are percent-encoded. A successful lookup answers with the
//! raw value bytes as `application/octet-stream`; a malformed path yields
//! **400**, an unknown group **404** and a failed load **500** with the error
//! message as body.
//!
//! The [HttpPool] plays both sides of this contract: it runs the server
//! socket answering requests from peers, and it implements
//! [PeerPicker](crate::peers::PeerPicker) by routing keys over its
//! consistent-hash [ring](crate::ring) to per-peer [HttpFetcher] clients.
//! A single GET/response exchange per connection is all that is needed here,
//! so the wire handling is written directly on top of tokio instead of
//! pulling in a full HTTP stack.
//!
//! In order to achieve zero downtime, the server periodically re-checks its
//! configured address and re-binds the socket once it changes, so a node can
//! be moved to another port without a restart (and thus without losing its
//! cache).
//!
//! # Example
//!
//! ```no_run
//! use callisto::builder::Builder;
//! use callisto::group::Registry;
//! use callisto::http::HttpPool;
//! use std::sync::Arc;
//!
//! fn lookup(key: &str) -> anyhow::Result<Vec<u8>> {
//!     Ok(key.as_bytes().to_vec())
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let platform = Builder::new().enable_all().build().await;
//!
//!     let group = platform
//!         .require::<Registry>()
//!         .create("scores", 64 * 1024, Arc::new(lookup))
//!         .unwrap();
//!
//!     let pool = platform.require::<HttpPool>();
//!     pool.set_peers(&["10.0.0.1:7410".to_owned(), "10.0.0.2:7410".to_owned()]);
//!     group.register_peers(pool.clone());
//!
//!     // Run the peer endpoint...
//!     pool.event_loop().await;
//! }
//! ```
use crate::config::Config;
use crate::group::Registry;
use crate::peers::{PeerFetcher, PeerPicker};
use crate::platform::Platform;
use crate::ring::HashRing;
use anyhow::Context;
use async_trait::async_trait;
use bytes::BytesMut;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// The default path prefix under which peers query each other.
pub const DEFAULT_BASE_PATH: &str = "/_zcache/";

/// The default number of virtual positions per peer on the hash ring.
pub const DEFAULT_REPLICAS: usize = 50;

/// The host the server binds to unless configured otherwise.
const DEFAULT_HOST: &str = "0.0.0.0";

/// The port the server binds to unless configured otherwise.
const DEFAULT_PORT: i64 = 7410;

/// The id under which a node announces itself unless configured otherwise.
const DEFAULT_SELF_ID: &str = "127.0.0.1:7410";

/// Specifies the timeout when waiting for a new incoming connection.
///
/// When waiting for a connection we need to interrupt this every once in a
/// while so that we can check if the platform has been shut down.
const CONNECT_WAIT_TIMEOUT: Duration = Duration::from_millis(500);

/// Specifies how long a peer may take to deliver its request head before the
/// connection is dropped.
const REQUEST_READ_TIMEOUT: Duration = Duration::from_secs(10);

/// Specifies the deadline for a complete fetch from a peer. A peer slower
/// than this is treated as failed so that the local loader can take over.
const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Determines the pre-allocated receive buffer size for incoming requests.
const DEFAULT_BUFFER_SIZE: usize = 8192;

/// Limits the accepted size of a request head. Peer requests are a single
/// GET line plus a few headers, so anything beyond this is garbage.
const MAX_REQUEST_SIZE: usize = 8192;

/// The routing state: the hash ring plus one fetcher per known peer.
struct Routes {
    ring: HashRing,
    fetchers: HashMap<String, Arc<HttpFetcher>>,
}

/// Serves the peer endpoint of this node and routes keys to their owners.
///
/// See the [module docs](crate::http) for the wire contract and an example.
pub struct HttpPool {
    platform: Arc<Platform>,
    self_id: String,
    base_path: String,
    replicas: usize,
    running: AtomicBool,
    current_address: Mutex<Option<String>>,
    routes: Mutex<Routes>,
}

impl HttpPool {
    /// Creates a pool which announces itself under the given id.
    ///
    /// The id must match the entry under which this node appears in the peer
    /// list handed to [set_peers](HttpPool::set_peers), otherwise the node
    /// will forward requests to itself.
    pub fn new(platform: Arc<Platform>, self_id: &str) -> Arc<Self> {
        HttpPool::create(platform, self_id, DEFAULT_BASE_PATH, DEFAULT_REPLICAS)
    }

    /// Creates a pool from the **cluster** section of the system config and
    /// installs it into the given platform.
    ///
    /// Note that this is called by the [Builder](crate::builder::Builder)
    /// unless disabled.
    pub fn install(platform: &Arc<Platform>) -> Arc<Self> {
        let pool = match platform.find::<Config>() {
            Some(config) => {
                let handle = config.current();
                let cluster = &handle.yaml()["cluster"];
                HttpPool::create(
                    platform.clone(),
                    cluster["self"].as_str().unwrap_or(DEFAULT_SELF_ID),
                    cluster["base_path"].as_str().unwrap_or(DEFAULT_BASE_PATH),
                    cluster["replicas"]
                        .as_i64()
                        .filter(|replicas| *replicas > 0)
                        .map(|replicas| replicas as usize)
                        .unwrap_or(DEFAULT_REPLICAS),
                )
            }
            None => HttpPool::create(
                platform.clone(),
                DEFAULT_SELF_ID,
                DEFAULT_BASE_PATH,
                DEFAULT_REPLICAS,
            ),
        };

        platform.register::<HttpPool>(pool.clone());

        pool
    }

    fn create(
        platform: Arc<Platform>,
        self_id: &str,
        base_path: &str,
        replicas: usize,
    ) -> Arc<Self> {
        Arc::new(HttpPool {
            platform,
            self_id: self_id.to_owned(),
            base_path: base_path.to_owned(),
            replicas,
            running: AtomicBool::new(false),
            current_address: Mutex::new(None),
            routes: Mutex::new(Routes {
                ring: HashRing::new(replicas),
                fetchers: HashMap::new(),
            }),
        })
    }

    /// Announces the full set of cluster nodes, including this one.
    ///
    /// This rebuilds the hash ring and the per-peer clients. Keys whose owner
    /// changed simply miss on their new owner and are re-loaded there; stale
    /// entries on the former owner age out of its cache naturally.
    pub fn set_peers(&self, peers: &[String]) {
        let mut routes = self.routes.lock().unwrap();

        routes.ring = HashRing::new(self.replicas);
        routes.ring.add(peers);
        routes.fetchers = peers
            .iter()
            .map(|peer| {
                (
                    peer.clone(),
                    Arc::new(HttpFetcher::new(peer, &self.base_path)),
                )
            })
            .collect();

        log::info!(
            "[{}] Serving as part of a cluster of {} node(s).",
            self.self_id,
            peers.len()
        );
    }

    /// Determines the server address based on the current configuration.
    ///
    /// If no, an invalid or a partial config is present, fallback values are
    /// used: port 7410, bound to "0.0.0.0".
    fn address(&self) -> String {
        self.platform
            .find::<Config>()
            .map(|config| {
                let handle = config.current();
                format!(
                    "{}:{}",
                    handle.yaml()["server"]["host"]
                        .as_str()
                        .unwrap_or(DEFAULT_HOST),
                    handle.yaml()["server"]["port"]
                        .as_i64()
                        .filter(|port| *port > 0 && *port <= i64::from(u16::MAX))
                        .unwrap_or(DEFAULT_PORT)
                )
            })
            .unwrap_or_else(|| format!("{}:{}", DEFAULT_HOST, DEFAULT_PORT))
    }

    /// Determines if the server socket should keep listening.
    ///
    /// This is not the shutdown signal (that is `Platform::is_running`) -
    /// the flag is toggled to false when the configured address changed so
    /// that [event_loop](HttpPool::event_loop) re-creates the socket.
    fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Determines if the server socket is currently bound.
    fn is_listening(&self) -> bool {
        self.current_address.lock().unwrap().is_some()
    }

    /// Starts the event loop in a separate task.
    ///
    /// This is most probably used by test scenarios where the test itself
    /// runs in the main task.
    pub fn fork(pool: &Arc<HttpPool>) {
        let cloned_pool = pool.clone();
        crate::spawn!(async move {
            cloned_pool.event_loop().await;
        });
    }

    /// Starts the event loop in a separate task and waits until the server
    /// socket is bound.
    ///
    /// Just like [fork](HttpPool::fork) this is intended to be used in test
    /// environments.
    pub async fn fork_and_await(pool: &Arc<HttpPool>) {
        HttpPool::fork(pool);

        while !pool.is_listening() {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    /// Tries to open the server socket on the configured address to serve
    /// incoming peer requests.
    ///
    /// Once binding was successful, [server_loop](HttpPool::server_loop)
    /// takes over. When that loop returns, either the platform is shutting
    /// down and we exit, or the config has changed and we bind the new
    /// address.
    pub async fn event_loop(&self) {
        let mut address = String::new();
        let mut last_bind_error_reported = Instant::now();

        while self.platform.is_running() {
            // If the server is started for the first time or was restarted
            // due to a config change, we need to reload the address...
            if !self.is_running() {
                address = self.address();
                self.running.store(true, Ordering::Release);
            }

            if let Ok(listener) = TcpListener::bind(&address).await {
                log::info!("Opened peer endpoint on {}...", &address);
                *self.current_address.lock().unwrap() = Some(address.clone());
                self.server_loop(&listener).await;
                log::info!("Closing peer endpoint on {}.", &address);
                *self.current_address.lock().unwrap() = None;
            } else {
                // If we were unable to bind, this is logged every once in a
                // while (every 5s). Otherwise we would jam the log as we
                // retry every 500ms.
                if Instant::now()
                    .duration_since(last_bind_error_reported)
                    .as_secs()
                    > 5
                {
                    log::error!(
                        "Cannot open peer endpoint on {}. Retrying every 500ms...",
                        &address
                    );
                    last_bind_error_reported = Instant::now();
                }
                tokio::time::sleep(Duration::from_millis(500)).await;
            }
        }
    }

    /// Runs the main server loop which processes incoming peer requests.
    ///
    /// This also listens on config changes and exits to the event_loop if
    /// necessary (server address changed...).
    async fn server_loop(&self, listener: &TcpListener) {
        // If no config is installed, we fall back to a notifier which never
        // fires. The sender is kept alive in this scope on purpose.
        let (_idle_notifier, idle_changes) = tokio::sync::broadcast::channel::<()>(1);
        let mut config_changed = self
            .platform
            .find::<Config>()
            .map(|config| config.notifier())
            .unwrap_or(idle_changes);

        while self.platform.is_running() && self.is_running() {
            tokio::select! {
                // We use a timeout here so that the while condition (esp.
                // platform.is_running()) is checked every once in a while...
                incoming = tokio::time::timeout(CONNECT_WAIT_TIMEOUT, listener.accept()) => {
                    // An Err simply indicates that the timeout was hit - in
                    // this case we do nothing, as all that needs a re-check
                    // is the while condition...
                    if let Ok(connection) = incoming {
                        if let Ok((stream, _)) = connection {
                            self.handle_connection(stream);
                        } else {
                            // The socket itself has been closed, exit to the
                            // event_loop which will either completely exit or
                            // re-create the socket.
                            return;
                        }
                    }
                }
                _ = config_changed.recv() => {
                    // If the config was changed, we need to check if the
                    // address itself changed...
                    let new_address = self.address();
                    if let Some(current_address) = &*self.current_address.lock().unwrap() {
                        if current_address != &new_address {
                            log::info!("The peer endpoint address has changed. Restarting server socket...");

                            // Force the event_loop to re-evaluate the
                            // expected server address...
                            self.running.store(false, Ordering::Release);
                            return;
                        }
                    }
                }
            }
        }
    }

    /// Handles a new incoming connection by forking a task which answers a
    /// single request.
    fn handle_connection(&self, stream: TcpStream) {
        let platform = self.platform.clone();
        let base_path = self.base_path.clone();

        crate::spawn!(async move {
            // Mark the connection as nodelay as the whole response is written
            // in one go anyway.
            let _ = stream.set_nodelay(true);

            if let Err(error) = serve_connection(platform, &base_path, stream).await {
                log::debug!("Failed to serve a peer request: {:#}", error);
            }
        });
    }
}

impl PeerPicker for HttpPool {
    fn pick_peer(&self, key: &str) -> Option<Arc<dyn PeerFetcher>> {
        let routes = self.routes.lock().unwrap();

        match routes.ring.get(key) {
            Some(owner) if owner != self.self_id => {
                log::debug!("[{}] Key '{}' is owned by {}.", self.self_id, key, owner);
                match routes.fetchers.get(owner) {
                    Some(fetcher) => {
                        let fetcher: Arc<dyn PeerFetcher> = fetcher.clone();
                        Some(fetcher)
                    }
                    None => None,
                }
            }
            _ => None,
        }
    }
}

/// Answers a single request on the given connection.
async fn serve_connection(
    platform: Arc<Platform>,
    base_path: &str,
    mut stream: TcpStream,
) -> anyhow::Result<()> {
    let head = match tokio::time::timeout(REQUEST_READ_TIMEOUT, read_request_head(&mut stream))
        .await
    {
        Ok(head) => head?,
        Err(_) => anyhow::bail!("timed out while waiting for the request head"),
    };

    let (method, target) = parse_request_line(&head)?;
    log::debug!("{} {}", method, target);

    if method != "GET" {
        return respond_with_text(&mut stream, 400, "Bad Request", "only GET is supported").await;
    }

    // Serving anything outside the announced base path means the node was
    // wired up incorrectly - abort the request loudly.
    if !target.starts_with(base_path) {
        log::error!("Received a request for an unexpected path: {}", target);
        return respond_with_text(&mut stream, 400, "Bad Request", "unexpected path").await;
    }

    // The path is expected to be <base>/<group>/<key>...
    let (group_name, key) = match target[base_path.len()..].split_once('/') {
        Some((group_name, key)) if !group_name.is_empty() => (group_name, key),
        _ => {
            return respond_with_text(
                &mut stream,
                400,
                "Bad Request",
                "expected a path of the form <base>/<group>/<key>",
            )
            .await;
        }
    };

    let (group_name, key) = match (percent_decode(group_name), percent_decode(key)) {
        (Ok(group_name), Ok(key)) => (group_name, key),
        _ => {
            return respond_with_text(&mut stream, 400, "Bad Request", "malformed path encoding")
                .await;
        }
    };

    let registry = match platform.find::<Registry>() {
        Some(registry) => registry,
        None => {
            return respond_with_text(
                &mut stream,
                500,
                "Internal Server Error",
                "no group registry is installed",
            )
            .await;
        }
    };

    let group = match registry.find_group(&group_name) {
        Some(group) => group,
        None => {
            return respond_with_text(
                &mut stream,
                404,
                "Not Found",
                &format!("no such group: {}", group_name),
            )
            .await;
        }
    };

    match group.get(&key).await {
        Ok(view) => {
            respond(
                &mut stream,
                200,
                "OK",
                "application/octet-stream",
                &view.to_vec(),
            )
            .await
        }
        Err(error) => {
            respond_with_text(
                &mut stream,
                500,
                "Internal Server Error",
                &format!("{:#}", error),
            )
            .await
        }
    }
}

/// Reads from the connection until the request head is complete.
async fn read_request_head(stream: &mut TcpStream) -> anyhow::Result<BytesMut> {
    let mut buffer = BytesMut::with_capacity(DEFAULT_BUFFER_SIZE);

    loop {
        if find_subsequence(&buffer, b"\r\n\r\n").is_some() {
            return Ok(buffer);
        }
        if buffer.len() > MAX_REQUEST_SIZE {
            anyhow::bail!("the request head exceeds {} bytes", MAX_REQUEST_SIZE);
        }

        let bytes_read = stream.read_buf(&mut buffer).await?;
        if bytes_read == 0 {
            anyhow::bail!("the connection was closed before a full request was received");
        }
    }
}

/// Extracts the method and the request target from the request head.
fn parse_request_line(head: &[u8]) -> anyhow::Result<(String, String)> {
    let head = std::str::from_utf8(head).context("the request head is not valid UTF-8")?;
    let request_line = head.lines().next().unwrap_or("");

    let mut parts = request_line.split_whitespace();
    match (parts.next(), parts.next()) {
        (Some(method), Some(target)) => Ok((method.to_owned(), target.to_owned())),
        _ => Err(anyhow::anyhow!(
            "malformed request line: '{}'",
            request_line
        )),
    }
}

/// Writes a complete response and flushes the connection.
async fn respond(
    stream: &mut TcpStream,
    status: u16,
    reason: &str,
    content_type: &str,
    body: &[u8],
) -> anyhow::Result<()> {
    let head = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        status,
        reason,
        content_type,
        body.len()
    );

    stream.write_all(head.as_bytes()).await?;
    stream.write_all(body).await?;
    stream.flush().await?;

    Ok(())
}

/// Writes a plain text response, which is how all errors are reported.
async fn respond_with_text(
    stream: &mut TcpStream,
    status: u16,
    reason: &str,
    message: &str,
) -> anyhow::Result<()> {
    respond(
        stream,
        status,
        reason,
        "text/plain; charset=utf-8",
        message.as_bytes(),
    )
    .await
}

/// Queries one specific remote node for values.
///
/// Fetchers are owned by the [HttpPool] and handed out per request via
/// [PeerPicker::pick_peer].
pub struct HttpFetcher {
    target: String,
    base_path: String,
}

impl HttpFetcher {
    /// Creates a fetcher querying the node at the given `host:port` address.
    pub fn new(target: &str, base_path: &str) -> Self {
        HttpFetcher {
            target: target.to_owned(),
            base_path: base_path.to_owned(),
        }
    }

    /// Performs the actual GET exchange.
    async fn exchange(&self, path: &str) -> anyhow::Result<Vec<u8>> {
        let mut stream = TcpStream::connect(&self.target)
            .await
            .with_context(|| format!("failed to connect to peer {}", self.target))?;
        let _ = stream.set_nodelay(true);

        let request = format!(
            "GET {} HTTP/1.1\r\nHost: {}\r\nConnection: close\r\n\r\n",
            path, self.target
        );
        stream.write_all(request.as_bytes()).await?;
        stream.flush().await?;

        let mut response = Vec::new();
        let _ = stream.read_to_end(&mut response).await?;

        parse_response(&response)
    }
}

#[async_trait]
impl PeerFetcher for HttpFetcher {
    async fn fetch(&self, group: &str, key: &str) -> anyhow::Result<Vec<u8>> {
        let path = format!(
            "{}{}/{}",
            self.base_path,
            percent_encode(group),
            percent_encode(key)
        );
        log::debug!("Fetching {} from {}...", path, self.target);

        match tokio::time::timeout(FETCH_TIMEOUT, self.exchange(&path)).await {
            Ok(result) => result,
            Err(_) => Err(anyhow::anyhow!(
                "peer {} did not answer within {:?}",
                self.target,
                FETCH_TIMEOUT
            )),
        }
    }
}

/// Extracts the body from a raw HTTP response, treating every non-200 status
/// as an error.
fn parse_response(raw: &[u8]) -> anyhow::Result<Vec<u8>> {
    let head_end = find_subsequence(raw, b"\r\n\r\n")
        .context("malformed response: missing header terminator")?;
    let head =
        std::str::from_utf8(&raw[..head_end]).context("the response head is not valid UTF-8")?;
    let body = &raw[head_end + 4..];

    let status_line = head.lines().next().unwrap_or("");
    let status: u16 = status_line
        .split_whitespace()
        .nth(1)
        .with_context(|| format!("malformed status line: '{}'", status_line))?
        .parse()
        .with_context(|| format!("malformed status code in: '{}'", status_line))?;

    if status != 200 {
        anyhow::bail!(
            "peer answered with status {}: {}",
            status,
            String::from_utf8_lossy(body).trim()
        );
    }

    // The peer closes the connection after one response, so the body is
    // simply everything after the head. Still, if a Content-Length is
    // declared, use it to detect truncated transfers.
    if let Some(expected) = content_length(head) {
        if body.len() < expected {
            anyhow::bail!(
                "truncated response: expected {} bytes but received {}",
                expected,
                body.len()
            );
        }
        return Ok(body[..expected].to_vec());
    }

    Ok(body.to_vec())
}

/// Extracts the Content-Length header if present.
fn content_length(head: &str) -> Option<usize> {
    head.lines().skip(1).find_map(|line| {
        let (name, value) = line.split_once(':')?;
        if name.trim().eq_ignore_ascii_case("content-length") {
            value.trim().parse().ok()
        } else {
            None
        }
    })
}

/// Returns the position of the first occurrence of `needle` in `haystack`.
fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// Percent-encodes a path segment, leaving only unreserved characters as-is.
fn percent_encode(segment: &str) -> String {
    let mut result = String::with_capacity(segment.len());

    for byte in segment.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                result.push(char::from(byte));
            }
            _ => result.push_str(&format!("%{:02X}", byte)),
        }
    }

    result
}

/// Decodes a percent-encoded path segment.
fn percent_decode(segment: &str) -> anyhow::Result<String> {
    let bytes = segment.as_bytes();
    let mut result = Vec::with_capacity(bytes.len());
    let mut index = 0;

    while index < bytes.len() {
        match bytes[index] {
            b'%' => {
                let digits = bytes
                    .get(index + 1..index + 3)
                    .context("incomplete percent escape")?;
                let digits = std::str::from_utf8(digits).context("malformed percent escape")?;
                result.push(
                    u8::from_str_radix(digits, 16).context("malformed percent escape")?,
                );
                index += 3;
            }
            byte => {
                result.push(byte);
                index += 1;
            }
        }
    }

    String::from_utf8(result).context("the decoded segment is not valid UTF-8")
}

#[cfg(test)]
mod tests {
    use super::{
        parse_request_line, parse_response, percent_decode, percent_encode, HttpFetcher, HttpPool,
    };
    use crate::builder::Builder;
    use crate::config::Config;
    use crate::group::Registry;
    use crate::peers::{PeerFetcher, PeerPicker};
    use crate::platform::Platform;
    use std::sync::Arc;

    #[test]
    fn segments_survive_an_encoding_round_trip() {
        for segment in ["plain", "with space", "sla/sh", "ümläute", "100%"] {
            let encoded = percent_encode(segment);
            assert!(!encoded.contains('/'));
            assert_eq!(percent_decode(&encoded).unwrap(), segment);
        }

        assert_eq!(percent_encode("a b"), "a%20b");
        assert_eq!(percent_encode("sla/sh"), "sla%2Fsh");
        assert!(percent_decode("broken%").is_err());
        assert!(percent_decode("broken%zz").is_err());
    }

    #[test]
    fn request_lines_are_parsed() {
        let (method, target) = parse_request_line(b"GET /_zcache/g/k HTTP/1.1\r\n\r\n").unwrap();
        assert_eq!(method, "GET");
        assert_eq!(target, "/_zcache/g/k");

        assert!(parse_request_line(b"GARBAGE\r\n\r\n").is_err());
        assert!(parse_request_line(b"\r\n\r\n").is_err());
    }

    #[test]
    fn responses_are_parsed() {
        let raw = b"HTTP/1.1 200 OK\r\nContent-Length: 3\r\n\r\n630";
        assert_eq!(parse_response(raw).unwrap(), b"630".to_vec());

        let error = parse_response(b"HTTP/1.1 404 Not Found\r\n\r\nno such group: x")
            .unwrap_err()
            .to_string();
        assert!(error.contains("404"));
        assert!(error.contains("no such group"));

        assert!(parse_response(b"HTTP/1.1 200 OK\r\nContent-Length: 9\r\n\r\n630").is_err());
        assert!(parse_response(b"not http at all").is_err());
    }

    #[test]
    fn keys_owned_by_this_node_are_served_locally() {
        let pool = HttpPool::new(Platform::new(), "10.0.0.1:7410");

        // Without any peers, everything is local...
        assert!(pool.pick_peer("some-key").is_none());

        // ...and so is a single node cluster consisting only of ourselves.
        pool.set_peers(&["10.0.0.1:7410".to_owned()]);
        for index in 0..50 {
            assert!(pool.pick_peer(&format!("key{}", index)).is_none());
        }
    }

    #[test]
    fn remote_keys_yield_a_fetcher() {
        let pool = HttpPool::new(Platform::new(), "10.0.0.1:7410");
        pool.set_peers(&["10.0.0.1:7410".to_owned(), "10.0.0.2:7410".to_owned()]);

        let remote_picks = (0..100)
            .filter(|index| pool.pick_peer(&format!("key{}", index)).is_some())
            .count();

        // With two evenly loaded nodes, roughly half of the keys live on the
        // remote one - certainly neither none nor all of them.
        assert!(remote_picks > 0);
        assert!(remote_picks < 100);
    }

    fn scores_loader(key: &str) -> anyhow::Result<Vec<u8>> {
        match key {
            "Tom" => Ok(b"630".to_vec()),
            _ => Err(anyhow::anyhow!("{} not exist", key)),
        }
    }

    #[test]
    fn integration_test() {
        // We want exclusive access to the server port on which we fire up a
        // node for this integration test...
        let _guard = crate::testing::SHARED_TEST_RESOURCES.lock().unwrap();

        crate::testing::test_async(async {
            let platform = Builder::new()
                .enable_config()
                .enable_registry()
                .enable_server()
                .build()
                .await;

            // Run on a port which no production instance would use...
            platform
                .require::<Config>()
                .load_from_string(
                    "
server:
    host: 127.0.0.1
    port: 1704
                    ",
                    None,
                )
                .unwrap();

            let _ = platform
                .require::<Registry>()
                .create("scores", 2 << 10, Arc::new(scores_loader))
                .unwrap();

            let pool = platform.require::<HttpPool>();
            HttpPool::fork_and_await(&pool).await;

            let fetcher = HttpFetcher::new("127.0.0.1:1704", "/_zcache/");

            // A known key is answered with its raw bytes...
            assert_eq!(
                fetcher.fetch("scores", "Tom").await.unwrap(),
                b"630".to_vec()
            );

            // ...an unknown key surfaces the loader error as 500...
            let error = fetcher.fetch("scores", "Nobody").await.unwrap_err();
            assert!(error.to_string().contains("500"));
            assert!(error.to_string().contains("not exist"));

            // ...and an unknown group yields 404.
            let error = fetcher.fetch("ratings", "Tom").await.unwrap_err();
            assert!(error.to_string().contains("404"));

            platform.terminate();
        });
    }
}
