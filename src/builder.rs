//! Provides a builder which can be used to set up and initialize a cache
//! node.
//!
//! As some parts of the framework are optional - a process embedding a few
//! standalone groups needs neither the config watcher nor the peer endpoint -
//! the builder permits to selectively enable them.
//!
//! # Example
//! Setting up a full cache node:
//! ```no_run
//! # use callisto::builder::Builder;
//! # use callisto::http::HttpPool;
//! #[tokio::main]
//! async fn main() {
//!     // Enable all features and build the platform...
//!     let platform = Builder::new().enable_all().build().await;
//!
//!     // Register groups and peers here...
//!
//!     // Start the main event loop of the peer endpoint...
//!     platform.require::<HttpPool>().event_loop().await;
//! }
//! ```
use std::sync::Arc;

use crate::group::Registry;
use crate::http::HttpPool;
use crate::platform::Platform;
use crate::{init_logging, CALLISTO_REVISION, CALLISTO_VERSION};

/// Initializes the framework by creating and wiring the enabled components.
#[derive(Default)]
pub struct Builder {
    setup_logging: bool,
    enable_signals: bool,
    setup_config: bool,
    setup_registry: bool,
    setup_server: bool,
}

impl Builder {
    /// Creates a new builder with everything disabled.
    pub fn new() -> Self {
        Builder::default()
    }

    /// Enables all features.
    pub fn enable_all(mut self) -> Self {
        self.setup_logging = true;
        self.enable_signals = true;
        self.setup_config = true;
        self.setup_registry = true;
        self.setup_server = true;

        self
    }

    /// Enables the automatic setup of the logging system.
    ///
    /// This initializes **simplelog** to log to stdout, which is all that is
    /// needed when running in a container.
    pub fn enable_logging(mut self) -> Self {
        self.setup_logging = true;
        self
    }

    /// Disables the automatic setup of the logging system after
    /// [enable_all()](Builder::enable_all) has been used.
    pub fn disable_logging(mut self) -> Self {
        self.setup_logging = false;
        self
    }

    /// Installs a signal listener which terminates the platform once
    /// **CTRL-C** or **SIGHUP** is received.
    ///
    /// For more details see: [signals](crate::signals)
    pub fn enable_signals(mut self) -> Self {
        self.enable_signals = true;
        self
    }

    /// Disables the signal listener after [enable_all()](Builder::enable_all)
    /// has been used.
    pub fn disable_signals(mut self) -> Self {
        self.enable_signals = false;
        self
    }

    /// Installs a [Config](crate::config::Config) and starts watching
    /// **config/settings.yml**.
    ///
    /// For more details see: [config](crate::config)
    pub fn enable_config(mut self) -> Self {
        self.setup_config = true;
        self
    }

    /// Disables setting up a **Config** after
    /// [enable_all()](Builder::enable_all) has been used.
    pub fn disable_config(mut self) -> Self {
        self.setup_config = false;
        self
    }

    /// Installs the group [Registry](crate::group::Registry).
    ///
    /// For more details see: [group](crate::group)
    pub fn enable_registry(mut self) -> Self {
        self.setup_registry = true;
        self
    }

    /// Disables setting up a **Registry** after
    /// [enable_all()](Builder::enable_all) has been used.
    pub fn disable_registry(mut self) -> Self {
        self.setup_registry = false;
        self
    }

    /// Installs the [HttpPool](crate::http::HttpPool) serving the peer
    /// endpoint.
    ///
    /// Note that the main event loop still has to be invoked manually via
    /// `platform.require::<HttpPool>().event_loop().await`.
    pub fn enable_server(mut self) -> Self {
        self.setup_server = true;
        self
    }

    /// Disables setting up an **HttpPool** after
    /// [enable_all()](Builder::enable_all) has been used.
    pub fn disable_server(mut self) -> Self {
        self.setup_server = false;
        self
    }

    /// Builds the [Platform](crate::platform::Platform) with all enabled
    /// components being registered.
    pub async fn build(self) -> Arc<Platform> {
        let platform = Platform::new();

        if self.setup_logging {
            init_logging();
        }

        log::info!(
            "||. CALLISTO (v {} - rev {}) running on {} core(s) in {} CPU(s)",
            CALLISTO_VERSION,
            CALLISTO_REVISION,
            num_cpus::get(),
            num_cpus::get_physical()
        );

        if self.enable_signals {
            crate::signals::install(platform.clone());
        }

        if self.setup_config {
            let _ = crate::config::install(platform.clone()).await;
        }

        if self.setup_registry {
            let _ = Registry::install(&platform);
        }

        if self.setup_server {
            let _ = HttpPool::install(&platform);
        }

        platform
    }
}
