//! Enumerates the typed failures raised by the cache itself.
//!
//! Everything here travels inside an [anyhow::Error] so that call sites which only want to
//! log obtain a readable message, while call sites which need to distinguish failure kinds
//! (e.g. the peer transport falling back to the local loader) can use
//! `error.downcast_ref::<CacheError>()`.
use std::error::Error;
use std::fmt::{Display, Formatter};

use crate::fmt::format_size;

/// Represents a failure raised by a cache component.
#[derive(Debug, PartialEq, Eq)]
pub enum CacheError {
    /// Raised when a lookup is attempted with an empty key.
    EmptyKey,

    /// Raised when a controller is created for a name which is already taken.
    DuplicateController(String),

    /// Raised when a peer selector is registered for a controller which already has one.
    PeersAlreadyRegistered(String),

    /// Raised when a single entry is larger than the whole cache and can therefore never
    /// be stored without violating the memory budget.
    OversizedEntry {
        /// Contains the key of the rejected entry.
        key: String,

        /// Contains the size (key + value) of the rejected entry in bytes.
        size: usize,

        /// Contains the memory budget of the cache in bytes.
        max_memory: usize,
    },

    /// Raised when a remote peer answers with a non-OK HTTP status.
    PeerStatus(u16),

    /// Raised when the response body of a remote peer cannot be read.
    PeerRead(String),
}

impl Display for CacheError {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            CacheError::EmptyKey => write!(f, "A key is required"),
            CacheError::DuplicateController(name) => {
                write!(f, "A controller named '{}' is already registered", name)
            }
            CacheError::PeersAlreadyRegistered(name) => {
                write!(
                    f,
                    "Peers have already been registered for controller '{}'",
                    name
                )
            }
            CacheError::OversizedEntry {
                key,
                size,
                max_memory,
            } => {
                write!(
                    f,
                    "The entry for '{}' ({}) is larger than the whole cache ({})",
                    key,
                    format_size(*size),
                    format_size(*max_memory)
                )
            }
            CacheError::PeerStatus(status) => {
                write!(f, "Peer responded with HTTP status {}", status)
            }
            CacheError::PeerRead(message) => {
                write!(f, "Failed to read the peer response: {}", message)
            }
        }
    }
}

impl Error for CacheError {}
