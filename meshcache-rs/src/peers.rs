//! Defines the seam between the controller and whatever transport connects the peers.
//!
//! The [controller](crate::controller) never talks to the network itself. It only asks a
//! [PeerSelector](PeerSelector) which peer owns a key and, if that is somebody else, asks
//! the returned [RemotePeer](RemotePeer) for the value. The HTTP implementation of both
//! traits lives in [http](crate::http), but any transport answering
//! `(namespace, key) -> bytes` can be plugged in here (which is also what the tests do).
use std::sync::Arc;

use futures::future::BoxFuture;

/// Fetches a value from another node of the cache mesh.
pub trait RemotePeer: Send + Sync {
    /// Requests the value for the given key within the given namespace from the peer.
    fn fetch<'a>(&'a self, namespace: &'a str, key: &'a str)
        -> BoxFuture<'a, anyhow::Result<Vec<u8>>>;
}

/// Determines which peer is the authoritative owner of a key.
pub trait PeerSelector: Send + Sync {
    /// Returns the peer owning the given key or **None** if the key belongs to the local
    /// node (or if no peers are known at all).
    fn select_peer(&self, key: &str) -> Option<Arc<dyn RemotePeer>>;
}
