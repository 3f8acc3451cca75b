//! Provides the consistent hash ring which assigns each key to its authoritative node.
//!
//! Each physical node is projected onto the ring as a number of virtual nodes (the
//! **vnode scalar**) to smooth out the key distribution. A key is owned by the node whose
//! vnode position is the first one at or after the key's own hash position, wrapping around
//! at the end of the ring.
//!
//! The ring is a plain data structure without any locking. The
//! [peer transport](crate::http) replaces it atomically under its own mutex whenever the
//! peer set changes.
use std::collections::HashMap;

/// Computes the ring position for a chunk of bytes.
///
/// We assume 2^32 possible positions.
pub type HashFn = fn(&[u8]) -> u32;

/// Contains the default number of virtual nodes per physical node.
pub const DEFAULT_VNODE_SCALAR: usize = 4;

/// Maps keys to physical nodes via consistent hashing with virtual node smoothing.
///
/// # Examples
/// ```
/// # use meshcache::ring::HashRing;
/// let mut ring = HashRing::new(4, None);
/// ring.add(["http://cache-1:9998", "http://cache-2:9998"]);
///
/// // Each key is deterministically owned by exactly one node...
/// let owner = ring.get("Tom").unwrap().to_owned();
/// assert_eq!(ring.get("Tom").unwrap(), owner);
/// ```
pub struct HashRing {
    hash: HashFn,
    vnode_scalar: usize,
    keys: Vec<u32>,
    vnodes: HashMap<u32, String>,
}

impl HashRing {
    /// Creates a new ring with the given number of virtual nodes per physical node.
    ///
    /// If no hash function is given, CRC32 (IEEE) is used. The vnode scalar must be at
    /// least 1, as a node without any ring position could never own a key.
    pub fn new(vnode_scalar: usize, hash: Option<HashFn>) -> Self {
        HashRing {
            hash: hash.unwrap_or(crc32fast::hash),
            vnode_scalar: vnode_scalar.max(1),
            keys: Vec::new(),
            vnodes: HashMap::new(),
        }
    }

    /// Adds the given physical nodes to the ring.
    ///
    /// For each node we record **vnode scalar** ring positions, obtained by hashing the
    /// decimal vnode index concatenated with the node id. Should two vnode positions of
    /// different nodes collide (which is vanishingly rare for a 32 bit hash), the node
    /// added last wins that position.
    pub fn add<I, S>(&mut self, nodes: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for node in nodes {
            let node = node.as_ref();
            for index in 0..self.vnode_scalar {
                let position = (self.hash)(format!("{}{}", index, node).as_bytes());
                self.keys.push(position);
                let _ = self.vnodes.insert(position, node.to_owned());
            }
        }

        self.keys.sort_unstable();
    }

    /// Returns the node owning the given key or **None** if the ring is empty.
    ///
    /// We binary search for the first vnode position at or after the key's hash position.
    /// If there is none, the search wraps around to the very first vnode on the ring.
    pub fn get(&self, key: &str) -> Option<&str> {
        if self.keys.is_empty() {
            return None;
        }

        let position = (self.hash)(key.as_bytes());
        let index = self.keys.partition_point(|&vnode| vnode < position);
        let vnode = self.keys[index % self.keys.len()];

        self.vnodes.get(&vnode).map(String::as_str)
    }

    /// Determines if any node has been added to the ring.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use crate::ring::HashRing;

    /// Provides a hash which simply parses the input as a decimal number.
    ///
    /// This keeps ring positions humanly predictable: node "6" produces the vnode
    /// positions 6, 16, 26 (vnode index prepended as decimal digit).
    fn decimal_hash(data: &[u8]) -> u32 {
        std::str::from_utf8(data).unwrap().parse::<u32>().unwrap()
    }

    #[test]
    fn keys_are_routed_to_the_next_vnode_clockwise() {
        let mut ring = HashRing::new(3, Some(decimal_hash));

        // Yields the ring positions 2, 4, 6, 12, 14, 16, 22, 24, 26...
        ring.add(["6", "4", "2"]);

        assert_eq!(ring.get("2").unwrap(), "2");
        assert_eq!(ring.get("11").unwrap(), "2");
        assert_eq!(ring.get("23").unwrap(), "4");

        // ...and positions beyond the last vnode wrap around to the first one.
        assert_eq!(ring.get("27").unwrap(), "2");
    }

    #[test]
    fn added_nodes_take_over_their_share() {
        let mut ring = HashRing::new(3, Some(decimal_hash));
        ring.add(["6", "4", "2"]);

        // 27 wraps around to node "2" as long as no better vnode exists...
        assert_eq!(ring.get("27").unwrap(), "2");

        // ...but adding "8" records position 28 which now covers 27.
        ring.add(["8"]);
        assert_eq!(ring.get("27").unwrap(), "8");
    }

    #[test]
    fn the_empty_ring_owns_nothing() {
        let ring = HashRing::new(4, None);
        assert_eq!(ring.get("Tom"), None);
        assert_eq!(ring.is_empty(), true);
    }

    #[test]
    fn routing_is_deterministic_across_instances() {
        let mut first = HashRing::new(4, None);
        first.add(["A", "B", "C"]);

        let mut second = HashRing::new(4, None);
        second.add(["A", "B", "C"]);

        for key in ["Tom", "Jack", "Sam", "Unknown", ""] {
            assert_eq!(first.get(key), second.get(key));
        }
    }

    #[test]
    fn removing_a_node_only_moves_its_own_keys() {
        let keys: Vec<String> = (0..128).map(|index| format!("key-{}", index)).collect();

        let mut full = HashRing::new(4, None);
        full.add(["A", "B", "C"]);

        // Rebuild the ring without the owner of "key-0"...
        let victim = full.get("key-0").unwrap().to_owned();
        let mut reduced = HashRing::new(4, None);
        reduced.add(["A", "B", "C"].iter().filter(|node| **node != victim));

        for key in &keys {
            let owner = full.get(key).unwrap();
            if owner == victim {
                // ...keys of the removed node must be re-routed to a survivor...
                assert_ne!(reduced.get(key).unwrap(), victim);
            } else {
                // ...while all other keys stay exactly where they were.
                assert_eq!(reduced.get(key).unwrap(), owner);
            }
        }
    }
}
