//! Contains the system configuration.
//!
//! Provides access to the system configuration which is loaded from the
//! **config/settings.yml** file. The file is observed for changes and
//! re-loaded once a change is detected, therefore users of the config should
//! attach themselves to [Config::notifier] and re-process their settings once
//! a change message is received. Being an in-memory cache node, we want to
//! avoid restarts (and thus a cold cache) as much as possible.
//!
//! The **Config** component itself is constant and can be obtained from the
//! platform once. The [Handle] returned by [Config::current] however must not
//! be stored, as it represents a single loaded state of the file.
//!
//! # Settings
//! ```yaml
//! server:
//!     # The address the peer endpoint binds to (defaults shown).
//!     host: 0.0.0.0
//!     port: 7410
//!
//! cluster:
//!     # The id under which this node appears in the peer list.
//!     self: 192.168.0.10:7410
//!     # All nodes of the cluster, including this one.
//!     peers:
//!         - 192.168.0.10:7410
//!         - 192.168.0.11:7410
//!     # Virtual positions per peer on the hash ring.
//!     replicas: 50
//!
//! groups:
//!     scores:
//!         # The local cache budget. Supports the suffixes k, m, g and t;
//!         # 0 means unbounded.
//!         max_memory: 64m
//! ```
use crate::platform::Platform;
use anyhow::Context;
use arc_swap::ArcSwap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use yaml_rust::{Yaml, YamlLoader};

/// Specifies the file from which the configuration is read.
const CONFIG_FILE: &str = "config/settings.yml";

/// Specifies the interval in which the config file is checked for changes.
const WATCH_INTERVAL: Duration = Duration::from_secs(2);

/// Provides access to the system configuration.
///
/// Most probably a config instance is installed by the
/// [Builder](crate::builder::Builder) and can be obtained via
/// `platform.require::<Config>()`.
pub struct Config {
    filename: String,
    tx: tokio::sync::broadcast::Sender<()>,
    state: ArcSwap<(Yaml, Option<SystemTime>)>,
}

/// Represents the change listener.
///
/// The actual message being broadcast can and should be ignored; all that
/// matters is that once a message was received, the config has changed and
/// needs to be re-processed.
pub type ChangeNotifier = tokio::sync::broadcast::Receiver<()>;

/// Represents a handle to the currently loaded configuration.
///
/// Note that this handle should not be stored or kept around for long, as it
/// will not be updated once a new config is loaded.
pub struct Handle {
    state: Arc<(Yaml, Option<SystemTime>)>,
}

impl Handle {
    /// Returns the root element of the loaded configuration.
    ///
    /// Missing keys simply yield `Yaml::BadValue`, so settings can be
    /// queried without any presence checks:
    /// `handle.yaml()["server"]["port"].as_i64()`.
    pub fn yaml(&self) -> &Yaml {
        &self.state.0
    }
}

impl Config {
    /// Creates a new config reading the given file.
    ///
    /// Note that this will not install a file watcher; that is only done by
    /// [install](install).
    pub fn new(filename: &str) -> Self {
        let (tx, _) = tokio::sync::broadcast::channel(1);
        Config {
            filename: filename.to_owned(),
            tx,
            state: ArcSwap::new(Arc::new((Yaml::Null, None))),
        }
    }

    /// Obtains a change notifier which receives a message once the config
    /// changed.
    pub fn notifier(&self) -> ChangeNotifier {
        self.tx.subscribe()
    }

    /// Obtains a handle to the currently loaded configuration.
    pub fn current(&self) -> Handle {
        Handle {
            state: self.state.load_full(),
        }
    }

    /// Parses the given YAML string and makes it the current configuration.
    ///
    /// This is mainly used by tests, which have no config file at hand.
    /// All attached change listeners are notified.
    pub fn load_from_string(
        &self,
        yaml: &str,
        last_modified: Option<SystemTime>,
    ) -> anyhow::Result<()> {
        let mut documents = YamlLoader::load_from_str(yaml)
            .with_context(|| format!("Failed to parse {}", self.filename))?;

        let document = if documents.is_empty() {
            Yaml::Null
        } else {
            documents.swap_remove(0)
        };

        self.state.store(Arc::new((document, last_modified)));
        let _ = self.tx.send(());

        Ok(())
    }

    /// Determines the last modified date of the config file on disk.
    ///
    /// Within docker the file is commonly presented as a volume, therefore we
    /// also check that it actually is a file - an unmounted volume appears as
    /// a directory.
    async fn last_modified(&self) -> Option<SystemTime> {
        match tokio::fs::metadata(&self.filename).await {
            Ok(metadata) if metadata.is_file() => metadata.modified().ok(),
            _ => None,
        }
    }

    /// Loads the config file if it changed since the last load.
    ///
    /// Returns **true** if a new configuration was published.
    async fn reload_if_changed(&self) -> anyhow::Result<bool> {
        let last_modified = self.last_modified().await;
        if last_modified.is_none() || last_modified == self.state.load().1 {
            return Ok(false);
        }

        let contents = tokio::fs::read_to_string(&self.filename)
            .await
            .with_context(|| format!("Failed to read {}", self.filename))?;
        self.load_from_string(&contents, last_modified)?;

        Ok(true)
    }
}

/// Creates a config for **config/settings.yml**, installs it in the given
/// platform and forks the file watcher.
///
/// A missing file is not an error - the node then simply runs on defaults
/// until the file shows up. Note that this is called by the
/// [Builder](crate::builder::Builder) unless disabled.
pub async fn install(platform: Arc<Platform>) -> Arc<Config> {
    let config = Arc::new(Config::new(CONFIG_FILE));
    platform.register::<Config>(config.clone());

    match config.reload_if_changed().await {
        Ok(true) => log::info!("Loaded configuration from {}.", CONFIG_FILE),
        Ok(false) => log::info!(
            "No configuration present at {}. Running on defaults...",
            CONFIG_FILE
        ),
        Err(error) => log::error!("Failed to load {}: {:#}", CONFIG_FILE, error),
    }

    let watched_config = config.clone();
    let watcher_platform = platform.clone();
    crate::spawn!(async move {
        while watcher_platform.is_running() {
            tokio::time::sleep(WATCH_INTERVAL).await;

            match watched_config.reload_if_changed().await {
                Ok(true) => log::info!("Re-loaded configuration from {}.", CONFIG_FILE),
                Ok(false) => (),
                Err(error) => {
                    log::error!("Failed to re-load {}: {:#}", CONFIG_FILE, error);
                }
            }
        }
    });

    config
}

#[cfg(test)]
mod tests {
    use super::Config;

    #[test]
    fn settings_can_be_queried() {
        let config = Config::new("test.yml");
        config
            .load_from_string(
                "
server:
    port: 1704
cluster:
    peers:
        - 127.0.0.1:1704
        - 127.0.0.1:1705
                ",
                None,
            )
            .unwrap();

        let handle = config.current();
        assert_eq!(handle.yaml()["server"]["port"].as_i64(), Some(1704));
        assert_eq!(handle.yaml()["server"]["host"].as_str(), None);
        assert_eq!(
            handle.yaml()["cluster"]["peers"].as_vec().unwrap().len(),
            2
        );
    }

    #[test]
    fn listeners_are_notified_on_change() {
        crate::testing::test_async(async {
            let config = Config::new("test.yml");
            let mut notifier = config.notifier();

            config.load_from_string("server:\n    port: 1704", None).unwrap();
            assert!(notifier.recv().await.is_ok());
        });
    }

    #[test]
    fn an_empty_document_yields_defaults() {
        let config = Config::new("test.yml");
        config.load_from_string("", None).unwrap();

        let handle = config.current();
        assert_eq!(handle.yaml()["server"]["port"].as_i64(), None);
    }

    #[test]
    fn broken_yaml_is_rejected() {
        let config = Config::new("test.yml");
        assert!(config.load_from_string("server: [unbalanced", None).is_err());
    }
}
