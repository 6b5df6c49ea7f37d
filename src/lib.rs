//! hotkey-cache - An in-place update cache for hot keys in LSM engines
//!
//! Skewed workloads concentrate update traffic on a small set of keys;
//! the standard append-then-compact discipline keeps rewriting obsolete
//! versions of exactly those keys. This crate caches the keys that
//! compaction identifies as hot and absorbs their updates by mutating
//! the cached value in place, so compaction stops rewriting them and
//! reads can be served from a single location.
//!
//! # Structure
//!
//! - A single-writer / many-reader **ordered index** (skip list) keyed
//!   by user-key, each node carrying the current value and a packed
//!   sequence/type tag.
//! - A **direct index** (hash map) from user-key to node, so updates
//!   skip the ordered search.
//! - A **facade** coordinating both under the engine's write contract.
//!
//! Writes are externally serialized (typically by the engine's
//! write-path mutex); readers traverse lock-free.
//!
//! # Quick Start
//!
//! ```rust
//! use hotkey_cache::{HotKeyCache, Tag, ValueType};
//!
//! let cache = HotKeyCache::new();
//!
//! // Compaction promotes a hot key: user key + 8-byte tag suffix
//! let mut internal_key = b"apple".to_vec();
//! internal_key.extend_from_slice(&Tag::new(10, ValueType::Value).encode());
//! cache.insert_from_compaction(&internal_key, b"red");
//!
//! // A later user write lands in place
//! assert!(cache.update_if_exist(11, ValueType::Value, b"apple", b"blu"));
//! assert_eq!(cache.report().hits, 1);
//! ```

#![warn(missing_docs)]

pub mod buffer;
pub mod cache;
pub mod direct_index;
pub mod skiplist;
pub mod tag;

// Re-exports for convenience
pub use cache::{CacheReport, HotCacheConfig, HotCacheStats, HotKeyCache};
pub use skiplist::{SkipList, SkipListIterator};
pub use tag::{Tag, ValueType, TAG_BYTES};

/// Utility for size literals (e.g., 1_GiB)
pub mod size {
    /// 1 KiB in bytes
    pub const KIB: u64 = 1024;
    /// 1 MiB in bytes
    pub const MIB: u64 = 1024 * KIB;
    /// 1 GiB in bytes
    pub const GIB: u64 = 1024 * MIB;
}

/// Prelude module for common imports
pub mod prelude {
    pub use crate::cache::{CacheReport, HotCacheConfig, HotKeyCache};
    pub use crate::skiplist::{SkipList, SkipListIterator};
    pub use crate::tag::{Tag, ValueType};
}
