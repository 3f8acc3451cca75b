//! Contains the HTTP transport which connects the nodes of a cache mesh.
//!
//! The [PeerTransport](PeerTransport) plays both sides of the wire: as a server it answers
//! `GET {base_path}{namespace}/{key}` requests by dispatching them to the matching
//! controller of its [Registry](crate::controller::Registry), as a client factory it
//! implements [PeerSelector](crate::peers::PeerSelector) by consulting its
//! [consistent hash ring](crate::ring) and handing out an HTTP client for the owning node.
//!
//! Peer ids are URL prefixes including scheme and host (e.g. `http://cache-1:9998`). The
//! request value is written back verbatim as `application/octet-stream` - there is no
//! framing or content negotiation beyond that.
//!
//! # Example
//! ```no_run
//! # use std::sync::Arc;
//! # use meshcache::controller::Registry;
//! # use meshcache::http::PeerTransport;
//! # #[tokio::main]
//! # async fn main() -> anyhow::Result<()> {
//! let registry = Registry::new();
//! // ...create controllers within the registry here...
//!
//! let transport = PeerTransport::new(registry, "http://127.0.0.1:9998", None);
//! transport.set_peers(["http://127.0.0.1:9998", "http://127.0.0.1:9999"]);
//!
//! // Serve until the process is stopped...
//! transport.event_loop("127.0.0.1:9998").await
//! # }
//! ```
use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Context;
use hyper::client::HttpConnector;
use hyper::header::HeaderValue;
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Client, Request, Response, StatusCode, Uri};

use crate::controller::Registry;
use crate::error::CacheError;
use crate::peers::{PeerSelector, RemotePeer};
use crate::ring::{HashRing, DEFAULT_VNODE_SCALAR};
use futures::future::BoxFuture;

/// Contains the URL prefix under which the cache endpoints are served.
pub const DEFAULT_BASE_PATH: &str = "/_cacheserver/";

/// Specifies how long we wait for an answer of a peer before giving up.
///
/// Peer fetches are recovered by falling back to the local loader, therefore a dead peer
/// only delays a lookup by this long instead of failing it.
const REMOTE_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Fetches cache values from one remote node via HTTP.
struct HttpPeer {
    base_url: String,
    client: Client<HttpConnector>,
}

impl HttpPeer {
    fn new(peer_url: &str, base_path: &str) -> Self {
        HttpPeer {
            base_url: format!("{}{}", peer_url, base_path),
            client: Client::new(),
        }
    }
}

impl RemotePeer for HttpPeer {
    fn fetch<'a>(
        &'a self,
        namespace: &'a str,
        key: &'a str,
    ) -> BoxFuture<'a, anyhow::Result<Vec<u8>>> {
        Box::pin(async move {
            let uri: Uri = format!(
                "{}{}/{}",
                self.base_url,
                urlencoding::encode(namespace),
                urlencoding::encode(key)
            )
            .parse()
            .context("Failed to assemble the peer request URI")?;

            let response = tokio::time::timeout(REMOTE_FETCH_TIMEOUT, self.client.get(uri))
                .await
                .map_err(|_| {
                    anyhow::anyhow!(
                        "The peer did not answer within {}s",
                        REMOTE_FETCH_TIMEOUT.as_secs()
                    )
                })?
                .context("Failed to reach the peer")?;

            if response.status() != StatusCode::OK {
                return Err(CacheError::PeerStatus(response.status().as_u16()).into());
            }

            let bytes = hyper::body::to_bytes(response.into_body())
                .await
                .map_err(|error| CacheError::PeerRead(error.to_string()))?;

            Ok(bytes.to_vec())
        })
    }
}

/// Contains the routing state which is replaced as a whole whenever the peer set changes.
struct PeerState {
    ring: HashRing,
    clients: HashMap<String, Arc<HttpPeer>>,
}

/// Serves the local controllers via HTTP and routes keys to their owning peers.
pub struct PeerTransport {
    self_id: String,
    base_path: String,
    registry: Arc<Registry>,
    state: Mutex<PeerState>,
}

impl PeerTransport {
    /// Creates a transport for the given registry.
    ///
    /// **self_id** is the URL prefix under which this very node is reachable by its peers
    /// and is used to recognize self-owned keys on the ring. If no base path is given,
    /// [DEFAULT_BASE_PATH](DEFAULT_BASE_PATH) is used; a missing trailing slash is added
    /// automatically.
    pub fn new(
        registry: Arc<Registry>,
        self_id: impl Into<String>,
        base_path: Option<&str>,
    ) -> Arc<Self> {
        let mut base_path = base_path.unwrap_or(DEFAULT_BASE_PATH).to_owned();
        if !base_path.ends_with('/') {
            base_path.push('/');
        }

        Arc::new(PeerTransport {
            self_id: self_id.into(),
            base_path,
            registry,
            state: Mutex::new(PeerState {
                ring: HashRing::new(DEFAULT_VNODE_SCALAR, None),
                clients: HashMap::new(),
            }),
        })
    }

    /// Replaces the set of known peers.
    ///
    /// This rebuilds the consistent hash ring and the per-peer HTTP clients in one go, so
    /// that concurrent lookups either see the old or the new peer set, never a mix.
    pub fn set_peers<I, S>(&self, peers: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let peers: Vec<String> = peers
            .into_iter()
            .map(|peer| peer.as_ref().to_owned())
            .collect();

        let mut ring = HashRing::new(DEFAULT_VNODE_SCALAR, None);
        ring.add(&peers);

        let mut clients = HashMap::new();
        for peer in &peers {
            let _ = clients.insert(
                peer.clone(),
                Arc::new(HttpPeer::new(peer, &self.base_path)),
            );
        }

        let mut state = self.state.lock().unwrap();
        state.ring = ring;
        state.clients = clients;
    }

    /// Opens the server socket on the given address and serves incoming cache requests.
    ///
    /// This only returns once the server is shut down (or if the socket cannot be bound).
    pub async fn event_loop(self: Arc<Self>, address: &str) -> anyhow::Result<()> {
        let address: SocketAddr = address
            .parse()
            .with_context(|| format!("Cannot parse server address: {}", address))?;

        let transport = self.clone();
        let service = make_service_fn(move |_connection| {
            let transport = transport.clone();
            async move {
                Ok::<_, Infallible>(service_fn(move |request| {
                    let transport = transport.clone();
                    async move { Ok::<_, Infallible>(transport.handle(request).await) }
                }))
            }
        });

        let server = hyper::server::Server::try_bind(&address)
            .with_context(|| format!("Cannot open server address: {}", address))?
            .serve(service);

        log::info!("Opened cache server socket on {}...", address);
        server
            .await
            .context("The cache server terminated abnormally")?;

        Ok(())
    }

    /// Dispatches a single request against the registry.
    ///
    /// The URL grammar is `{base_path}{namespace}/{key}` with percent-encoded segments.
    /// Anything outside the base path is unknown (404), anything inside which does not
    /// split into two non-empty segments is malformed (400).
    async fn handle(self: Arc<Self>, request: Request<Body>) -> Response<Body> {
        let path = request.uri().path().to_owned();
        log::debug!("{} {}", request.method(), path);

        if !path.starts_with(&self.base_path) {
            return text_response(StatusCode::NOT_FOUND, "not found");
        }

        let mut parts = path[self.base_path.len()..].splitn(2, '/');
        let namespace = parts.next().unwrap_or("");
        let key = parts.next().unwrap_or("");
        if namespace.is_empty() || key.is_empty() {
            return text_response(StatusCode::BAD_REQUEST, "bad request");
        }

        let (namespace, key) = match (urlencoding::decode(namespace), urlencoding::decode(key)) {
            (Ok(namespace), Ok(key)) => (namespace, key),
            _ => return text_response(StatusCode::BAD_REQUEST, "bad request"),
        };

        let controller = match self.registry.find(&namespace) {
            Some(controller) => controller,
            None => {
                return text_response(
                    StatusCode::NOT_FOUND,
                    &format!("No such controller {}", namespace),
                )
            }
        };

        match controller.get(&key).await {
            Ok(view) => payload_response(view.byte_slice()),
            Err(error) => text_response(StatusCode::INTERNAL_SERVER_ERROR, &error.to_string()),
        }
    }
}

impl PeerSelector for PeerTransport {
    fn select_peer(&self, key: &str) -> Option<Arc<dyn RemotePeer>> {
        let state = self.state.lock().unwrap();

        let peer = state.ring.get(key)?;
        if peer == self.self_id {
            return None;
        }

        log::debug!("Picked peer {} for '{}'", peer, key);
        let client: Arc<dyn RemotePeer> = state.clients.get(peer)?.clone();
        Some(client)
    }
}

fn text_response(status: StatusCode, message: &str) -> Response<Body> {
    let mut response = Response::new(Body::from(message.to_owned()));
    *response.status_mut() = status;
    response
}

fn payload_response(payload: Vec<u8>) -> Response<Body> {
    let mut response = Response::new(Body::from(payload));
    let _ = response.headers_mut().insert(
        hyper::header::CONTENT_TYPE,
        HeaderValue::from_static("application/octet-stream"),
    );
    response
}
