use async_trait::async_trait;
use callisto::builder::Builder;
use callisto::config::Config;
use callisto::fmt::parse_size;
use callisto::group::{Loader, Registry};
use callisto::http::HttpPool;
use std::collections::HashMap;
use std::panic::{set_hook, take_hook};
use std::sync::Arc;
use std::time::Duration;

/// A deliberately slow in-memory table which plays the role of the
/// authoritative backing store. Replace this with a real database lookup when
/// embedding callisto in an application.
struct SlowDb {
    rows: HashMap<&'static str, &'static str>,
}

impl SlowDb {
    fn scores() -> Arc<Self> {
        let mut rows = HashMap::new();
        let _ = rows.insert("Tom", "630");
        let _ = rows.insert("Jack", "589");
        let _ = rows.insert("Sam", "567");

        Arc::new(SlowDb { rows })
    }
}

#[async_trait]
impl Loader for SlowDb {
    async fn load(&self, key: &str) -> anyhow::Result<Vec<u8>> {
        log::info!("[SlowDb] searching key '{}'...", key);
        tokio::time::sleep(Duration::from_millis(200)).await;

        match self.rows.get(key) {
            Some(value) => Ok(value.as_bytes().to_vec()),
            None => Err(anyhow::anyhow!("{} not exist", key)),
        }
    }
}

/// Creates the groups listed in the **groups** section of the config, all
/// backed by the demo table above. A missing section yields a single
/// "scores" group with a 2 KiB budget.
fn create_groups(platform: &Arc<callisto::platform::Platform>) -> Vec<Arc<callisto::group::Group>> {
    let registry = platform.require::<Registry>();
    let config = platform.require::<Config>();
    let handle = config.current();

    let mut groups = Vec::new();
    if let Some(configured) = handle.yaml()["groups"].as_hash() {
        for (name, settings) in configured {
            let name = name.as_str().unwrap_or_default();
            if name.is_empty() {
                log::error!("Skipping a group without a name in the config...");
                continue;
            }

            let max_bytes = match parse_size(settings["max_memory"].as_str().unwrap_or("")) {
                Ok(max_bytes) => max_bytes,
                Err(error) => {
                    log::error!("Skipping group '{}': {:#}", name, error);
                    continue;
                }
            };

            match registry.create(name, max_bytes, SlowDb::scores()) {
                Ok(group) => groups.push(group),
                Err(error) => log::error!("{:#}", error),
            }
        }
    }

    if groups.is_empty() {
        groups.push(
            registry
                .create("scores", 2 << 10, SlowDb::scores())
                .expect("failed to create the default group"),
        );
    }

    groups
}

#[tokio::main]
async fn main() {
    // Installs a panic handler which crashes the whole process instead of
    // trying to survive with a missing tokio background thread. Having a
    // panic in a tokio task is quite ugly, as the node seems healthy from the
    // outside but won't answer its peers.
    //
    // Therefore we crash the whole process on purpose and hope for an
    // external watchdog like docker-compose to create a new container which
    // is in a sane and consistent state.
    let original_panic_handler = take_hook();
    set_hook(Box::new(move |panic_info| {
        original_panic_handler(panic_info);
        eprintln!("PROGRAM ALARM: A panic occurred in a thread. Crashing the whole process to enable a clean restart...");
        std::process::exit(-1);
    }));

    // Build a platform and enable all features...
    let platform = Builder::new().enable_all().build().await;

    // Set up the demo groups as listed in the config...
    let groups = create_groups(&platform);

    // Wire the groups into the cluster (if one is configured)...
    let pool = platform.require::<HttpPool>();
    let handle = platform.require::<Config>().current();
    if let Some(peers) = handle.yaml()["cluster"]["peers"].as_vec() {
        let peers: Vec<String> = peers
            .iter()
            .filter_map(|peer| peer.as_str())
            .map(|peer| peer.to_owned())
            .collect();
        pool.set_peers(&peers);
    } else {
        log::info!("No cluster.peers configured. Serving all keys locally...");
    }

    for group in groups {
        group.register_peers(pool.clone());
    }

    // Run the peer endpoint...
    pool.event_loop().await;
}
