//! Provides a runnable meshcache node.
//!
//! Reads the YAML settings (path given as first argument, `config/settings.yml` by
//! default), creates a controller per configured cache and serves them via the HTTP peer
//! transport until CTRL-C or SIGHUP is received.
//!
//! The backing store of each cache is a plain directory: the value of `key` within cache
//! `name` is the content of the file `<data dir>/<name>/<key>`. The data directory is
//! taken from the **MESHCACHE_DATA** environment variable and defaults to `data`.
use std::panic::{set_hook, take_hook};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use futures::future::BoxFuture;
use tokio::signal::unix::SignalKind;

use meshcache::config::Config;
use meshcache::controller::{Loader, Registry};
use meshcache::fmt::format_size;
use meshcache::http::PeerTransport;
use meshcache::MESHCACHE_VERSION;

/// Loads cache values from files within a per-cache directory.
struct DirectoryLoader {
    directory: PathBuf,
}

impl Loader for DirectoryLoader {
    fn fetch<'a>(&'a self, key: &'a str) -> BoxFuture<'a, anyhow::Result<Vec<u8>>> {
        Box::pin(async move {
            // Keys must not escape the data directory.
            if key.contains(['/', '\\']) || key.contains("..") {
                return Err(anyhow::anyhow!("Invalid key: {}", key));
            }

            let path = self.directory.join(key);
            log::debug!("Loading {} from the backing store...", path.display());

            tokio::fs::read(&path)
                .await
                .with_context(|| format!("Failed to read '{}' from the backing store", key))
        })
    }
}

#[tokio::main]
async fn main() {
    // Installs a panic handler which crashes the whole process instead of trying to
    // survive with a missing tokio background thread. Having a panic in a tokio thread is
    // quite ugly, as the server seems to be healthy from the outside but won't handle any
    // incoming requests.
    //
    // Therefore we crash the whole process on purpose and hope for an external watchdog
    // like docker-compose to create a new container which is in a sane and consistent
    // state.
    let original_panic_handler = take_hook();
    set_hook(Box::new(move |panic_info| {
        original_panic_handler(panic_info);
        eprintln!("PROGRAM ALARM: A panic occurred in a thread. Crashing the whole process to enable a clean restart...");
        std::process::exit(-1);
    }));

    meshcache::init_logging();
    log::info!("MESHCACHE (v {}) starting up...", MESHCACHE_VERSION);

    if let Err(error) = run().await {
        log::error!("{:#}", error);
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config/settings.yml".to_owned());
    let config = if Path::new(&config_path).exists() {
        log::info!("Reading settings from {}...", config_path);
        Config::load_from_file(&config_path)?
    } else {
        log::info!("No settings found at {}. Using defaults...", config_path);
        Config::load_from_string("")?
    };

    let data_dir = std::env::var("MESHCACHE_DATA").unwrap_or_else(|_| "data".to_owned());

    let registry = Registry::new();
    let transport = PeerTransport::new(registry.clone(), config.public_url(), config.base_path());

    let caches = config.caches();
    if caches.is_empty() {
        log::info!("The config does not declare any caches. Nothing will be served...");
    }
    for settings in &caches {
        let loader = Arc::new(DirectoryLoader {
            directory: Path::new(&data_dir).join(&settings.name),
        });
        let controller = registry.create_controller(&settings.name, settings.max_memory, loader)?;
        controller.register_peers(transport.clone())?;

        log::info!(
            "Created cache '{}' with a memory budget of {}...",
            settings.name,
            format_size(settings.max_memory)
        );
    }

    let peers = config.peers();
    if !peers.is_empty() {
        transport.set_peers(&peers);
        log::info!(
            "Joined a mesh of {} node(s) as {}...",
            peers.len(),
            config.public_url()
        );
    }

    report_stats_periodically(&registry, &caches);

    let address = config.server_address();
    tokio::select! {
        result = transport.clone().event_loop(&address) => result,
        _ = shutdown_signal() => Ok(())
    }
}

/// Forks a task which logs the state of all caches once a minute.
fn report_stats_periodically(registry: &Arc<Registry>, caches: &[meshcache::config::CacheSettings]) {
    let registry = registry.clone();
    let names: Vec<String> = caches.iter().map(|settings| settings.name.clone()).collect();

    meshcache::spawn!(async move {
        loop {
            tokio::time::sleep(Duration::from_secs(60)).await;

            for name in &names {
                if let Some(controller) = registry.find(name) {
                    let stats = controller.stats();
                    log::info!(
                        "Cache '{}': {} entries using {}, {} reads ({:.0}% hit rate), {} writes",
                        name,
                        stats.entries,
                        format_size(stats.allocated_memory),
                        stats.reads,
                        stats.hit_rate,
                        stats.writes
                    );
                }
            }
        }
    });
}

/// Waits for either CTRL-C or SIGHUP and then asks the node to shut down.
async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    let mut sig_hup = tokio::signal::unix::signal(SignalKind::hangup()).unwrap();

    tokio::select! {
        _ = ctrl_c => {
            log::info!("Received CTRL-C. Shutting down...");
        },
        _ = sig_hup.recv() => {
            log::info!("Received SIGHUP. Shutting down...");
        }
    }
}
