//! Direct index from user-key to node
//!
//! Updates to hot keys must not pay the ordered index's logarithmic
//! search, so the cache also keeps a hash map from user-key bytes to
//! the node linked in the skip list. The map is keyed by key value
//! (never pointer identity) and holds non-owning [`NodeHandle`]s;
//! ownership of every node stays with the skip list.
//!
//! Access is serialized with the writer: promotion inserts, updates
//! look up. Concurrent reader traffic goes through the ordered index
//! instead. The internal mutex keeps the structure safe if the
//! external serialization contract is ever violated; it is uncontended
//! in correct use.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::skiplist::NodeHandle;

/// User-key → node map for O(1) update hits
pub struct DirectIndex {
    map: Mutex<HashMap<Box<[u8]>, NodeHandle>>,
}

impl DirectIndex {
    /// Create an index sized for `capacity` keys
    ///
    /// The map rehashes as it grows past the initial capacity; sizing
    /// for the expected hot set avoids growth spikes on the write path.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            map: Mutex::new(HashMap::with_capacity(capacity)),
        }
    }

    /// Look up the node handle for `key`
    pub fn get(&self, key: &[u8]) -> Option<NodeHandle> {
        self.map.lock().get(key).copied()
    }

    /// Record the node for a freshly promoted key
    ///
    /// Each key is recorded exactly once, right after its node is
    /// linked at level 0; the unique-membership guarantee of the
    /// ordered index means nothing is ever displaced.
    pub fn insert(&self, key: Box<[u8]>, node: NodeHandle) {
        let displaced = self.map.lock().insert(key, node);
        debug_assert!(displaced.is_none());
    }

    /// Number of indexed keys
    pub fn len(&self) -> usize {
        self.map.lock().len()
    }

    /// Whether no keys are indexed
    pub fn is_empty(&self) -> bool {
        self.map.lock().is_empty()
    }
}

impl Default for DirectIndex {
    fn default() -> Self {
        Self::with_capacity(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skiplist::SkipList;
    use crate::tag::{Tag, ValueType};

    #[test]
    fn test_lookup_hits_the_linked_node() {
        let list = SkipList::new();
        let index = DirectIndex::with_capacity(4);

        let handle = list
            .insert(b"apple", Some(b"red"), Tag::new(1, ValueType::Value))
            .unwrap();
        index.insert(Box::from(&b"apple"[..]), handle);

        let found = index.get(b"apple").expect("key should be indexed");
        // Safety: `list` is alive for the whole test.
        let node = unsafe { found.as_node() };
        assert_eq!(node.key(), b"apple");
        assert_eq!(node.value().load().unwrap().read(), b"red");
    }

    #[test]
    fn test_miss_returns_none() {
        let index = DirectIndex::with_capacity(4);
        assert!(index.get(b"ghost").is_none());
        assert!(index.is_empty());
    }

    #[test]
    fn test_keyed_by_value_not_identity() {
        let list = SkipList::new();
        let index = DirectIndex::with_capacity(4);

        let handle = list
            .insert(b"key", Some(b"v"), Tag::new(1, ValueType::Value))
            .unwrap();
        index.insert(Box::from(&b"key"[..]), handle);

        // A different allocation with equal bytes must hit
        let probe: Vec<u8> = b"key".to_vec();
        assert!(index.get(&probe).is_some());
        assert_eq!(index.len(), 1);
    }
}
