//! Meshcache is a library for serving an in-memory key to bytes cache across a mesh of
//! peer nodes.
//!
//! # Introduction
//! A set of nodes collectively hosts a logical cache which is partitioned via consistent
//! hashing: every key has exactly one authoritative owner. Any node can be asked for any
//! key - it either answers from its own memory, forwards the request to the owning peer
//! via HTTP or invokes the application supplied [Loader](controller::Loader) against the
//! slow backing store. Concurrent requests for the same key are coalesced, so that the
//! backing store sees at most one load per key and node, no matter how many clients pile
//! up behind a cache miss.
//!
//! # Features
//! * **Byte accounted LRU caches** - every cache has a real memory budget (key bytes +
//!   value bytes) instead of a mere entry count and strictly evicts the least recently
//!   used entries once the budget is exceeded (see [lru]).
//! * **Consistent hash routing** - keys are assigned to nodes via a ring with virtual
//!   node smoothing, so that resizing the mesh only moves the keys of the affected nodes
//!   (see [ring]).
//! * **Single-flight loads** - a thundering herd of cache misses for the same key results
//!   in exactly one load, all other callers share its outcome (see [singleflight]).
//! * **100% Async/Await** - the whole transport builds upon [tokio](https://tokio.rs/)
//!   and [hyper](https://hyper.rs/); no lock is ever held across a suspension point.
//!
//! # Modules
//! * **byteview**: The immutable value payload shared between caches, peers and callers.
//! * **lru**: The size constrained LRU cache engine.
//! * **ring**: The consistent hash ring mapping keys to nodes.
//! * **singleflight**: The per-key load coalescer.
//! * **controller**: Named cache instances, the loader seam and the registry.
//! * **peers**: The traits connecting controllers to a transport.
//! * **http**: The HTTP server and client implementing the peer transport.
//! * **config**: The YAML settings of a runnable node.
//!
//! # Example
//! A minimal, purely local cache:
//! ```
//! # use std::sync::Arc;
//! # use futures::future::BoxFuture;
//! # use meshcache::controller::{Loader, Registry};
//! struct SlowDb;
//!
//! impl Loader for SlowDb {
//!     fn fetch<'a>(&'a self, key: &'a str) -> BoxFuture<'a, anyhow::Result<Vec<u8>>> {
//!         Box::pin(async move { Ok(format!("value of {}", key).into_bytes()) })
//!     }
//! }
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let registry = Registry::new();
//! let cache = registry
//!     .create_controller("demo", 64 * 1024, Arc::new(SlowDb))
//!     .unwrap();
//!
//! assert_eq!(cache.get("Tom").await.unwrap().to_string(), "value of Tom");
//! # }
//! ```
//!
//! To span a mesh, create a [PeerTransport](http::PeerTransport) around the registry,
//! announce the peer set via [set_peers](http::PeerTransport::set_peers), register the
//! transport on each controller and run its
//! [event_loop](http::PeerTransport::event_loop).
#![deny(
    warnings,
    missing_docs,
    trivial_casts,
    trivial_numeric_casts,
    unused_extern_crates,
    unused_import_braces,
    unused_results
)]
use simplelog::{format_description, ConfigBuilder, LevelFilter, SimpleLogger};
use std::sync::Once;

pub mod byteview;
pub mod config;
pub mod controller;
pub mod error;
pub mod fmt;
pub mod http;
pub mod lru;
pub mod peers;
pub mod ring;
pub mod singleflight;

/// Contains the version of the meshcache library.
pub const MESHCACHE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initializes the logging system.
pub fn init_logging() {
    static INIT_LOGGING: Once = Once::new();

    // We need to do this as otherwise the integration tests might crash as the logging
    // system is initialized several times...
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
/// # #[macro_use] extern crate meshcache;
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

#[cfg(test)]
mod testing {
    use std::sync::Mutex;

    lazy_static::lazy_static! {
        /// Provides a global lock which has to be acquired if a test operates on shared
        /// resources. This would be the fixed ports on which we start local servers for
        /// the integration tests. Using this lock, we can still execute all other tests
        /// in parallel and only block if required.
        pub static ref SHARED_TEST_RESOURCES: Mutex<()> = Mutex::new(());
    }

    /// Executes async code within a single threaded tokio runtime.
    pub fn test_async<F: std::future::Future>(future: F) {
        use tokio::runtime;

        let rt = runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        let _ = rt.block_on(future);
    }
}
