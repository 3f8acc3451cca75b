//! Contains the namespace controller which ties caching, peer routing and loading together.
//!
//! A [Controller](Controller) represents one named, isolated cache. It answers each lookup
//! from its local LRU cache if possible. On a miss, all concurrent requests for the same
//! key are funneled through a [single-flight group](crate::singleflight) so that the value
//! is produced exactly once: either by asking the authoritative peer (if a peer selector
//! has been registered and the key belongs to another node) or by invoking the
//! caller-supplied [Loader](Loader) against the slow backing store.
//!
//! Controllers are created via and looked up in a [Registry](Registry). The registry is an
//! explicit object rather than a process global, so embedding applications (and tests) can
//! own as many independent cache meshes as they like.
//!
//! # Example
//! ```
//! # use std::sync::Arc;
//! # use futures::future::BoxFuture;
//! # use meshcache::controller::{Loader, Registry};
//! struct SlowDb;
//!
//! impl Loader for SlowDb {
//!     fn fetch<'a>(&'a self, key: &'a str) -> BoxFuture<'a, anyhow::Result<Vec<u8>>> {
//!         Box::pin(async move {
//!             match key {
//!                 "Tom" => Ok(b"630".to_vec()),
//!                 _ => Err(anyhow::anyhow!("{} not exist", key)),
//!             }
//!         })
//!     }
//! }
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let registry = Registry::new();
//! let scores = registry
//!     .create_controller("scores", 2 << 10, Arc::new(SlowDb))
//!     .unwrap();
//!
//! assert_eq!(scores.get("Tom").await.unwrap().to_string(), "630");
//! # }
//! ```
use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock, RwLock};

use futures::future::BoxFuture;

use crate::byteview::ByteView;
use crate::error::CacheError;
use crate::lru::LruCache;
use crate::peers::PeerSelector;
use crate::singleflight::SingleFlight;

/// Produces values from the slow backing store whenever the cache mesh cannot.
///
/// A loader is supplied by the embedding application per controller and is invoked at most
/// once per key and node for any number of concurrent requesters.
pub trait Loader: Send + Sync {
    /// Fetches the value for the given key from the backing store.
    fn fetch<'a>(&'a self, key: &'a str) -> BoxFuture<'a, anyhow::Result<Vec<u8>>>;
}

/// Provides a point-in-time snapshot of the state of a controller's cache.
pub struct ControllerStats {
    /// Contains the number of cached entries.
    pub entries: usize,

    /// Contains the memory allocated by the cached keys and values in bytes.
    pub allocated_memory: usize,

    /// Contains the total number of cache reads.
    pub reads: usize,

    /// Contains the total number of cache writes.
    pub writes: usize,

    /// Contains the cache hit rate in percent.
    pub hit_rate: f32,
}

/// Represents a named, isolated cache with its own loader and (optional) peer routing.
pub struct Controller {
    name: String,
    loader: Arc<dyn Loader>,
    cache: Mutex<LruCache<ByteView>>,
    peers: OnceLock<Arc<dyn PeerSelector>>,
    flights: SingleFlight<ByteView>,
}

impl std::fmt::Debug for Controller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Controller")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl Controller {
    fn new(name: &str, max_memory: usize, loader: Arc<dyn Loader>) -> Arc<Self> {
        Arc::new(Controller {
            name: name.to_owned(),
            loader,
            cache: Mutex::new(LruCache::new(max_memory, None)),
            peers: OnceLock::new(),
            flights: SingleFlight::new(),
        })
    }

    /// Returns the name of this controller.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Registers the peer selector used to route keys to their authoritative nodes.
    ///
    /// This transitions the controller from purely local operation into mesh operation and
    /// can only happen once.
    ///
    /// # Errors
    /// Fails if a selector has already been registered for this controller.
    pub fn register_peers(&self, selector: Arc<dyn PeerSelector>) -> anyhow::Result<()> {
        self.peers
            .set(selector)
            .map_err(|_| CacheError::PeersAlreadyRegistered(self.name.clone()).into())
    }

    /// Returns the value for the given key.
    ///
    /// This is the central operation of the cache: a hit is answered from local memory
    /// right away. For a miss, all concurrent callers are coalesced and the one winning
    /// caller either fetches the value from the authoritative peer (without caching it
    /// locally, as the peer owns it) or invokes the loader and caches the result.
    ///
    /// # Errors
    /// Fails if the key is empty, if the loader fails or if the loaded entry is too large
    /// to ever fit into the cache.
    pub async fn get(&self, key: &str) -> anyhow::Result<ByteView> {
        if key.is_empty() {
            return Err(CacheError::EmptyKey.into());
        }

        if let Some(view) = self.lookup_cached(key) {
            log::debug!("Cache hit for '{}' in '{}'", key, self.name);
            return Ok(view);
        }

        self.flights
            .execute(key, || self.load(key))
            .await
            .map_err(|error| anyhow::anyhow!(error))
    }

    /// Performs the local cache lookup under the cache mutex.
    fn lookup_cached(&self, key: &str) -> Option<ByteView> {
        self.cache.lock().unwrap().get(key).cloned()
    }

    /// Produces the value for a key which was not locally cached.
    ///
    /// This is executed by the winning caller of the single-flight group.
    async fn load(&self, key: &str) -> anyhow::Result<ByteView> {
        if let Some(selector) = self.peers.get() {
            if let Some(peer) = selector.select_peer(key) {
                match peer.fetch(&self.name, key).await {
                    Ok(bytes) => {
                        log::debug!("Fetched '{}' of '{}' from its owning peer", key, self.name);

                        // The value is owned by the peer, so we pass it through without
                        // caching it locally...
                        return Ok(ByteView::new(bytes));
                    }
                    Err(error) => {
                        // A broken peer must not take us down. We degrade to the local
                        // loader and accept the duplicated load...
                        log::warn!(
                            "Failed to fetch '{}' of '{}' from its owning peer, \
                             falling back to the local loader: {}",
                            key,
                            self.name,
                            error
                        );
                    }
                }
            }
        }

        self.load_locally(key).await
    }

    /// Invokes the loader and caches its result.
    async fn load_locally(&self, key: &str) -> anyhow::Result<ByteView> {
        let bytes = self.loader.fetch(key).await?;
        let view = ByteView::new(bytes);

        self.cache
            .lock()
            .unwrap()
            .put(key.to_owned(), view.clone())?;

        Ok(view)
    }

    /// Returns a snapshot of the cache metrics of this controller.
    pub fn stats(&self) -> ControllerStats {
        let cache = self.cache.lock().unwrap();
        ControllerStats {
            entries: cache.len(),
            allocated_memory: cache.allocated_memory(),
            reads: cache.reads(),
            writes: cache.writes(),
            hit_rate: cache.hit_rate(),
        }
    }
}

/// Keeps track of all controllers by name.
///
/// Lookups vastly outnumber controller creations, therefore the registry is guarded by a
/// read-write lock where only [create_controller](Registry::create_controller) needs the
/// write side.
pub struct Registry {
    controllers: RwLock<HashMap<String, Arc<Controller>>>,
}

impl Registry {
    /// Creates a new, empty registry.
    pub fn new() -> Arc<Self> {
        Arc::new(Registry {
            controllers: RwLock::new(HashMap::new()),
        })
    }

    /// Creates a controller with the given name, memory budget and loader and registers it.
    ///
    /// A budget of **0** creates an unbounded cache.
    ///
    /// # Errors
    /// Fails if a controller with the given name already exists. We deliberately reject
    /// this instead of replacing the previous controller, as silently swapping out a live
    /// cache (and its loader) is almost certainly an accident.
    pub fn create_controller(
        &self,
        name: &str,
        max_memory: usize,
        loader: Arc<dyn Loader>,
    ) -> anyhow::Result<Arc<Controller>> {
        let mut controllers = self.controllers.write().unwrap();

        if controllers.contains_key(name) {
            return Err(CacheError::DuplicateController(name.to_owned()).into());
        }

        let controller = Controller::new(name, max_memory, loader);
        let _ = controllers.insert(name.to_owned(), controller.clone());

        Ok(controller)
    }

    /// Resolves the controller with the given name.
    pub fn find(&self, name: &str) -> Option<Arc<Controller>> {
        self.controllers.read().unwrap().get(name).cloned()
    }
}
