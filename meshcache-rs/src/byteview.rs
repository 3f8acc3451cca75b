//! Provides the immutable byte payload which all caches store and serve.
//!
//! A [ByteView](ByteView) is a length-known, read-only view on a chunk of bytes. Views are
//! shared by value: cloning one only bumps a reference counter, the underlying storage is
//! never copied and never mutated. This is what makes it safe to hand the same view to the
//! local cache, a remote peer response and the caller at the same time.
//!
//! Whenever raw bytes leave a view (via [byte_slice](ByteView::byte_slice)), a fresh copy is
//! made so that no caller ever obtains an alias of cache-owned storage.
use bytes::Bytes;

use crate::lru::ByteSize;

/// Represents an immutable byte payload as stored by a cache.
///
/// # Examples
/// ```
/// # use meshcache::byteview::ByteView;
/// let view = ByteView::new(b"630".to_vec());
/// assert_eq!(view.len(), 3);
/// assert_eq!(view.to_string(), "630");
///
/// // Equality is determined by byte content...
/// assert_eq!(view, ByteView::new(b"630".to_vec()));
///
/// // ...and cloning is cheap as the underlying bytes are shared.
/// let other = view.clone();
/// assert_eq!(other.byte_slice(), vec![b'6', b'3', b'0']);
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ByteView {
    data: Bytes,
}

impl ByteView {
    /// Creates a view by taking ownership of the given bytes.
    ///
    /// As the vector is moved into the view, no copy is required and no alias of the
    /// resulting storage can remain with the caller.
    pub fn new(data: Vec<u8>) -> Self {
        ByteView { data: data.into() }
    }

    /// Returns the number of bytes in this view.
    ///
    /// This is also the size used for cache accounting.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Determines if this view contains any bytes at all.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns a copy of the underlying bytes.
    ///
    /// We deliberately copy here so that callers can do whatever they want with the result
    /// without ever touching cache-owned storage.
    pub fn byte_slice(&self) -> Vec<u8> {
        self.data.to_vec()
    }
}

impl From<&str> for ByteView {
    fn from(value: &str) -> Self {
        ByteView {
            data: Bytes::copy_from_slice(value.as_bytes()),
        }
    }
}

impl std::fmt::Display for ByteView {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.data))
    }
}

impl ByteSize for ByteView {
    fn allocated_size(&self) -> usize {
        self.data.len()
    }
}
