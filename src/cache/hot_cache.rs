//! Hot-key cache facade
//!
//! Coordinates the ordered index, the direct index, and the byte
//! accounting under the engine's write-path contract: compaction
//! promotes keys in, user writes update them in place.

use crate::buffer::{RetireList, ValueBuf};
use crate::cache::config::HotCacheConfig;
use crate::cache::stats::{CacheReport, HotCacheStats};
use crate::direct_index::DirectIndex;
use crate::size::GIB;
use crate::skiplist::{SkipList, SkipListIterator};
use crate::tag::{Tag, ValueType, TAG_BYTES};

/// In-place update cache for hot keys
///
/// One externally serialized writer calls [`insert_from_compaction`]
/// and [`update_if_exist`]; any number of reader threads traverse the
/// ordered view concurrently via [`iter`] and [`contains`]. Entries
/// live until the cache is dropped: deletions leave a tombstone, and
/// replaced value buffers are held back until teardown so in-flight
/// readers never dangle.
///
/// [`insert_from_compaction`]: HotKeyCache::insert_from_compaction
/// [`update_if_exist`]: HotKeyCache::update_if_exist
/// [`iter`]: HotKeyCache::iter
/// [`contains`]: HotKeyCache::contains
pub struct HotKeyCache {
    table: SkipList,
    index: DirectIndex,
    retired: RetireList,
    stats: HotCacheStats,
}

impl HotKeyCache {
    /// Create a cache with the default configuration
    pub fn new() -> Self {
        Self::with_config(HotCacheConfig::default())
    }

    /// Create a cache with an explicit configuration
    pub fn with_config(config: HotCacheConfig) -> Self {
        Self {
            table: SkipList::with_geometry(
                config.max_height,
                config.branching,
                config.height_seed,
            ),
            index: DirectIndex::with_capacity(config.initial_capacity),
            retired: RetireList::new(),
            stats: HotCacheStats::new(),
        }
    }

    /// Promote a key selected by compaction into the cache
    ///
    /// `internal_key` is the user key followed by its 8-byte tag; the
    /// split happens here, so callers must never pass a bare user key.
    /// A key that is already cached is skipped silently (the compactor
    /// is free to re-pick). A Deletion-tagged promotion creates a
    /// tombstone entry.
    ///
    /// Panics if `internal_key` is shorter than a tag; that is a caller
    /// bug, unreachable from valid engine usage.
    pub fn insert_from_compaction(&self, internal_key: &[u8], value: &[u8]) {
        assert!(
            internal_key.len() >= TAG_BYTES,
            "internal key must end with an 8-byte tag"
        );
        let (user_key, tag_bytes) = internal_key.split_at(internal_key.len() - TAG_BYTES);
        let tag = Tag::decode_slice(tag_bytes);

        let stored_value = if tag.value_type().is_deletion() {
            None
        } else {
            Some(value)
        };

        match self.table.insert(user_key, stored_value, tag) {
            Some(handle) => {
                self.index.insert(user_key.into(), handle);
                if stored_value.is_some() {
                    self.stats
                        .add_bytes((user_key.len() + value.len() + TAG_BYTES) as u64);
                }
            }
            None => {
                self.stats.record_duplicate();
                tracing::debug!(key_len = user_key.len(), "skipped duplicate promotion");
            }
        }
    }

    /// Apply a user write to the cached entry for `user_key`, if any
    ///
    /// Returns `false` on a miss, leaving the cache untouched (beyond
    /// the put counter). On a hit the tag is overwritten first, then
    /// the value: a Deletion empties the entry, a same-length write
    /// patches the existing buffer in place, and a length change swaps
    /// in a fresh buffer (the old one is held until teardown). Any
    /// non-Deletion type code is treated as value-carrying and kept
    /// verbatim in the tag.
    pub fn update_if_exist(
        &self,
        sequence: u64,
        value_type: ValueType,
        user_key: &[u8],
        value: &[u8],
    ) -> bool {
        self.stats.record_put();
        let Some(handle) = self.index.get(user_key) else {
            return false;
        };
        self.stats.record_hit();
        // Safety: nodes live until the cache is dropped, and the handle
        // came from this cache's own ordered index.
        let node = unsafe { handle.as_node() };

        node.store_tag(Tag::new(sequence, value_type));

        if value_type.is_deletion() {
            if let Some(old_len) = node.value().len() {
                if let Some(retired) = node.value().replace(None) {
                    self.retired.retire(retired);
                }
                self.stats
                    .sub_bytes((user_key.len() + old_len + TAG_BYTES) as u64);
            }
            return true;
        }

        match node.value().load() {
            Some(buf) if buf.len() == value.len() => {
                buf.overwrite(value);
            }
            Some(buf) => {
                let old_len = buf.len();
                if let Some(retired) = node
                    .value()
                    .replace(Some(Box::new(ValueBuf::copy_from(value))))
                {
                    self.retired.retire(retired);
                }
                if value.len() >= old_len {
                    self.stats.add_bytes((value.len() - old_len) as u64);
                } else {
                    self.stats.sub_bytes((old_len - value.len()) as u64);
                }
            }
            None => {
                // Reviving a tombstone re-adds the whole entry's bytes
                let displaced = node
                    .value()
                    .replace(Some(Box::new(ValueBuf::copy_from(value))));
                debug_assert!(displaced.is_none());
                self.stats
                    .add_bytes((user_key.len() + value.len() + TAG_BYTES) as u64);
            }
        }
        true
    }

    /// Whether `user_key` is cached (tombstones included). Lock-free.
    pub fn contains(&self, user_key: &[u8]) -> bool {
        self.table.contains(user_key)
    }

    /// Ordered cursor over the cached entries. Lock-free; safe to use
    /// from reader threads while the writer promotes and updates.
    pub fn iter(&self) -> SkipListIterator<'_> {
        self.table.iter()
    }

    /// The ordered index, for callers that traverse it directly
    pub fn table(&self) -> &SkipList {
        &self.table
    }

    /// The cache's counters
    pub fn stats(&self) -> &HotCacheStats {
        &self.stats
    }

    /// Number of cached entries, tombstones included
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Whether the cache holds no entries
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Snapshot the counters
    pub fn report(&self) -> CacheReport {
        self.stats.summary()
    }

    /// Log cache size (GiB) and hit ratio
    pub fn print_cache_info(&self) {
        let report = self.report();
        tracing::info!(
            "cache size: {:.3} GiB, hit ratio: {:.3} ({}/{})",
            report.bytes as f64 / GIB as f64,
            report.hit_rate,
            report.hits,
            report.puts
        );
    }
}

impl Default for HotKeyCache {
    fn default() -> Self {
        Self::new()
    }
}
