use linked_hash_map::LinkedHashMap;

use crate::error::CacheError;

/// Returns the allocated memory in bytes.
pub trait ByteSize {
    /// Returns the amount of allocated memory in bytes.
    ///
    /// Note that most probably this is an approximation and not the exact byte value. However,
    /// it should represent the "largest" part of an instance. (E.g. for a string, this would
    /// be the bytes allocated on the heap and might discard the fields allocated on the stack
    /// used to store the length and capacity as well as the pointer itself.)
    fn allocated_size(&self) -> usize;
}

impl ByteSize for String {
    fn allocated_size(&self) -> usize {
        self.capacity()
    }
}

/// Invoked for each entry which is evicted to make room in the cache.
///
/// The listener receives the key and the value of the evicted entry. The entry itself is
/// already detached from the cache once the listener runs.
pub type EvictionListener<V> = Box<dyn FnMut(&str, &V) + Send>;

/// Provides a size constrained LRU cache.
///
/// A cache behaves just like a **Map** as long as there is no shortage in storage. However,
/// once the memory allocated by its keys and values grows beyond the given budget, old
/// (least recently used) entries will be evicted - hence the name LRU cache.
///
/// A budget of **0** disables eviction entirely and lets the cache grow without bounds.
///
/// # Examples
/// ```
/// # use meshcache::lru::LruCache;
/// // Specifies a cache which can allocate up to 36 bytes of memory...
/// let mut lru = LruCache::new(36, None);
///
/// lru.put("Foo".to_owned(), "Bar".to_owned()).unwrap();
/// assert_eq!(lru.get("Foo").unwrap(), &"Bar".to_owned());
///
/// // this will still fit..
/// lru.put("Foo1".to_owned(), "X".repeat(14)).unwrap();
/// assert_eq!(lru.get("Foo").is_some(), true);
/// assert_eq!(lru.get("Foo1").is_some(), true);
///
/// // this will hit the memory budget...
/// lru.put("Foo2".to_owned(), "X".repeat(14)).unwrap();
/// // ..and therefore will throw the least recently used entry out:
/// assert_eq!(lru.get("Foo"), None);
/// assert_eq!(lru.get("Foo1").is_some(), true);
/// assert_eq!(lru.get("Foo2").is_some(), true);
/// ```
pub struct LruCache<V: ByteSize> {
    max_memory: usize,
    allocated_memory: usize,
    reads: usize,
    hits: usize,
    writes: usize,
    on_evicted: Option<EvictionListener<V>>,
    map: LinkedHashMap<String, Entry<V>>,
}

struct Entry<V: ByteSize> {
    mem_size: usize,
    value: V,
}

impl<V: ByteSize> LruCache<V> {
    /// Creates a new cache which can store entries allocating up to **max_memory** bytes.
    ///
    /// Passing **0** as budget creates an unbounded cache. The optional eviction listener is
    /// invoked for every entry which is dropped to enforce the budget.
    pub fn new(max_memory: usize, on_evicted: Option<EvictionListener<V>>) -> Self {
        LruCache {
            max_memory,
            allocated_memory: 0,
            reads: 0,
            hits: 0,
            writes: 0,
            on_evicted,
            map: LinkedHashMap::new(),
        }
    }

    /// Stores the given value for the given key.
    ///
    /// If the key is already present, its value is replaced and the entry is marked as the
    /// most recently used one. Afterwards, least recently used entries are evicted until the
    /// memory budget is honored again.
    ///
    /// # Errors
    /// Fails if the given entry on its own is larger than **max_memory** (the max total size
    /// of the cache). In this case the cache remains completely unchanged.
    ///
    /// # Examples
    /// ```
    /// # use meshcache::lru::LruCache;
    /// let mut lru = LruCache::new(1024, None);
    ///
    /// lru.put("Foo".to_owned(), "Bar".to_owned()).unwrap();
    /// assert_eq!(lru.get("Foo").unwrap(), &"Bar".to_owned());
    ///
    /// // An entry which can never fit is rejected without touching the cache...
    /// assert_eq!(lru.put("Huge".to_owned(), "X".repeat(2048)).is_err(), true);
    /// assert_eq!(lru.len(), 1);
    /// ```
    pub fn put(&mut self, key: String, value: V) -> Result<(), CacheError> {
        let mem_size = key.len() + value.allocated_size();

        // Reject entries which could not even be stored in an empty cache. This check runs
        // before any mutation so that the cache state remains untouched.
        if self.max_memory > 0 && mem_size > self.max_memory {
            return Err(CacheError::OversizedEntry {
                key,
                size: mem_size,
                max_memory: self.max_memory,
            });
        }

        self.writes += 1;

        let mut delta_mem = mem_size as isize;
        if let Some(stale_entry) = self.map.insert(key, Entry { mem_size, value }) {
            delta_mem -= stale_entry.mem_size as isize;
        }
        self.allocated_memory = (self.allocated_memory as isize + delta_mem) as usize;

        self.enforce_memory_constraint();

        Ok(())
    }

    fn enforce_memory_constraint(&mut self) {
        while self.max_memory > 0 && self.allocated_memory > self.max_memory {
            self.remove_lru();
        }
    }

    /// Removes the least recently used entry from the cache.
    ///
    /// Invokes the eviction listener (if present) and updates the memory accounting. Calling
    /// this on an empty cache does nothing.
    pub fn remove_lru(&mut self) {
        if let Some((key, entry)) = self.map.pop_front() {
            self.allocated_memory -= entry.mem_size;

            if let Some(on_evicted) = self.on_evicted.as_mut() {
                on_evicted(&key, &entry.value);
            }
        }
    }

    /// Returns the value which has previously been stored for the given key or **None** if
    /// no value is present.
    ///
    /// A successful lookup marks the entry as the most recently used one.
    ///
    /// # Examples
    /// ```
    /// # use meshcache::lru::LruCache;
    /// let mut lru = LruCache::new(1024, None);
    ///
    /// // After inserting a value...
    /// lru.put("Foo".to_owned(), "Bar".to_owned()).unwrap();
    /// // ..it can be retrieved.
    /// assert_eq!(lru.get("Foo").unwrap(), &"Bar".to_owned());
    /// ```
    pub fn get(&mut self, key: &str) -> Option<&V> {
        self.reads += 1;

        match self.map.get_refresh(key) {
            Some(entry) => {
                self.hits += 1;
                Some(&entry.value)
            }
            None => None,
        }
    }

    /// Returns the number of entries in the cache.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Determines if the cache is completely empty.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Returns the amount of memory allocated to store the data of the keys and values of
    /// this cache.
    ///
    /// The returned value is in bytes and only accounts for the payload data itself, not for
    /// the internal map or other metadata.
    pub fn allocated_memory(&self) -> usize {
        self.allocated_memory
    }

    /// Returns the maximal amount of memory to be (roughly) occupied by this cache.
    ///
    /// A budget of **0** represents an unbounded cache.
    pub fn max_memory(&self) -> usize {
        self.max_memory
    }

    /// Returns the total number of reads performed on this cache.
    pub fn reads(&self) -> usize {
        self.reads
    }

    /// Returns the total number of writes performed on this cache.
    pub fn writes(&self) -> usize {
        self.writes
    }

    /// Returns the cache hit rate in percent.
    pub fn hit_rate(&self) -> f32 {
        match self.reads {
            0 => 0.,
            n => self.hits as f32 / n as f32 * 100.,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use crate::error::CacheError;
    use crate::lru::LruCache;

    /// Computes the expected memory the given entries should account for.
    ///
    /// Note that for **String** values the accounting is based on the capacity of the
    /// value, therefore we use literals where capacity == length below.
    fn entry_size(key: &str, value: &str) -> usize {
        key.len() + value.len()
    }

    #[test]
    fn memory_accounting_is_exact() {
        let mut lru = LruCache::new(0, None);

        lru.put("Hello".to_owned(), "World".to_owned()).unwrap();
        lru.put("Hello1".to_owned(), "World1".to_owned()).unwrap();
        assert_eq!(
            lru.allocated_memory(),
            entry_size("Hello", "World") + entry_size("Hello1", "World1")
        );

        // Replacing a value only changes the accounting by the value delta...
        lru.put("Hello".to_owned(), "W".to_owned()).unwrap();
        assert_eq!(
            lru.allocated_memory(),
            entry_size("Hello", "W") + entry_size("Hello1", "World1")
        );

        // ...and growing it again restores the previous tally.
        lru.put("Hello".to_owned(), "World".to_owned()).unwrap();
        assert_eq!(
            lru.allocated_memory(),
            entry_size("Hello", "World") + entry_size("Hello1", "World1")
        );
        assert_eq!(lru.len(), 2);
    }

    #[test]
    fn memory_budget_is_enforced_in_lru_order() {
        // Four entries of 12 bytes each fit exactly...
        let mut lru = LruCache::new(12 * 4, None);
        lru.put("Hello0".to_owned(), "World0".to_owned()).unwrap();
        lru.put("Hello1".to_owned(), "World1".to_owned()).unwrap();
        lru.put("Hello2".to_owned(), "World2".to_owned()).unwrap();
        lru.put("Hello3".to_owned(), "World3".to_owned()).unwrap();
        assert_eq!(lru.len(), 4);
        assert_eq!(lru.allocated_memory(), 12 * 4);

        // "Using" the oldest entry saves it from eviction...
        assert_eq!(lru.get("Hello0").is_some(), true);

        // ...so inserting another entry now drops "Hello1" instead.
        lru.put("Hello4".to_owned(), "World4".to_owned()).unwrap();
        assert_eq!(lru.get("Hello0").is_some(), true);
        assert_eq!(lru.get("Hello1"), None);
        assert_eq!(lru.get("Hello2").is_some(), true);
        assert_eq!(lru.get("Hello3").is_some(), true);
        assert_eq!(lru.get("Hello4").is_some(), true);
        assert_eq!(lru.allocated_memory(), 12 * 4);
    }

    #[test]
    fn eviction_continues_until_the_budget_is_honored() {
        let mut lru = LruCache::new(10, None);

        // "A" -> 5 bytes of payload -> 6 bytes in total...
        lru.put("A".to_owned(), "XXXXX".to_owned()).unwrap();
        assert_eq!(lru.allocated_memory(), 6);

        // ...adding "B" would require 12 bytes, therefore "A" is dropped.
        lru.put("B".to_owned(), "XXXXX".to_owned()).unwrap();
        assert_eq!(lru.allocated_memory(), 6);
        assert_eq!(lru.len(), 1);
        assert_eq!(lru.get("A"), None);
        assert_eq!(lru.get("B").is_some(), true);
    }

    #[test]
    fn oversized_entries_are_rejected_without_any_mutation() {
        let mut lru = LruCache::new(4, None);

        let result = lru.put("longkey".to_owned(), "XXXXXXXXXX".to_owned());
        match result {
            Err(CacheError::OversizedEntry {
                key,
                size,
                max_memory,
            }) => {
                assert_eq!(key, "longkey");
                assert_eq!(size, 17);
                assert_eq!(max_memory, 4);
            }
            _ => panic!("Expected an oversized entry to be rejected"),
        }

        assert_eq!(lru.len(), 0);
        assert_eq!(lru.allocated_memory(), 0);
    }

    #[test]
    fn replacing_with_an_oversized_value_keeps_the_old_entry() {
        let mut lru = LruCache::new(16, None);

        lru.put("Foo".to_owned(), "Bar".to_owned()).unwrap();
        assert_eq!(
            lru.put("Foo".to_owned(), "X".repeat(32)).is_err(),
            true
        );

        assert_eq!(lru.get("Foo").unwrap(), &"Bar".to_owned());
        assert_eq!(lru.allocated_memory(), 6);
    }

    #[test]
    fn eviction_listener_observes_every_victim() {
        let evicted = Arc::new(AtomicUsize::new(0));
        let evicted_for_listener = evicted.clone();

        let mut lru: LruCache<String> = LruCache::new(
            12,
            Some(Box::new(move |key, _value| {
                assert_eq!(key.starts_with("Hello"), true);
                let _ = evicted_for_listener.fetch_add(1, Ordering::SeqCst);
            })),
        );

        // Each entry occupies 11 bytes, therefore each put evicts the previous one...
        lru.put("Hello0".to_owned(), "World".to_owned()).unwrap();
        lru.put("Hello1".to_owned(), "World".to_owned()).unwrap();
        lru.put("Hello2".to_owned(), "World".to_owned()).unwrap();

        assert_eq!(evicted.load(Ordering::SeqCst), 2);
        assert_eq!(lru.len(), 1);
    }

    #[test]
    fn an_unbounded_cache_never_evicts() {
        let mut lru = LruCache::new(0, None);

        for index in 0..512 {
            lru.put(format!("Key{}", index), "X".repeat(64)).unwrap();
        }

        assert_eq!(lru.len(), 512);
    }

    #[test]
    fn metrics_are_computed_correctly() {
        let mut lru = LruCache::new(0, None);

        lru.put("A".to_owned(), "A".to_owned()).unwrap();
        lru.put("B".to_owned(), "B".to_owned()).unwrap();
        lru.put("C".to_owned(), "C".to_owned()).unwrap();

        // Perform 4 reads, of which 3 hit a cache entry...
        assert_eq!(lru.get("A").is_some(), true);
        assert_eq!(lru.get("B").is_some(), true);
        assert_eq!(lru.get("C").is_some(), true);
        assert_eq!(lru.get("D").is_none(), true);

        // ...therefore we had 3 writes, 4 reads of which 3 hit a value which
        // yields a hit rate of 75%.
        assert_eq!(lru.writes(), 3);
        assert_eq!(lru.reads(), 4);
        assert_eq!(lru.hit_rate().round() as i32, 75);
    }
}
