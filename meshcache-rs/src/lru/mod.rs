//! Provides a size constrained LRU cache.
//!
//! An LRU cache drops the least recently used entry if it is about to grow beyond the given
//! memory budget. The cache is generic over all values for which the [ByteSize](ByteSize)
//! trait is implemented and keeps exact byte accounting (key length + value size) so that
//! the budget is a real memory bound and not just an entry count.
//!
//! Note that the cache itself performs no locking at all. Concurrency is the problem of the
//! caller ([controller](crate::controller) wraps each cache in a mutex).
mod lru_cache;

pub use lru_cache::ByteSize;
pub use lru_cache::EvictionListener;
pub use lru_cache::LruCache;
