//! Ordered index over hot keys
//!
//! A skip list keyed by user-key bytes, supporting one externally
//! serialized writer and any number of lock-free readers. Each node
//! carries the key, a patchable value slot, and the entry's tag.
//!
//! Thread safety
//! -------------
//!
//! Writes require external synchronization, typically the same mutex
//! that serializes the engine's write path. Reads require only that the
//! list outlive them; they progress without locking.
//!
//! Invariants:
//!
//! (1) Nodes are never deleted until the list itself is dropped.
//!
//! (2) Everything in a node except its value bytes, tag word, and
//! forward pointers is immutable once the node is linked. `insert`
//! initializes a node fully and publishes it with release stores, so a
//! reader that reaches a node through a forward pointer observes its
//! initialized contents.

use std::ptr::{self, NonNull};
use std::sync::atomic::{AtomicPtr, AtomicU64, AtomicUsize, Ordering};

use parking_lot::Mutex;

use crate::buffer::{ValueBuf, ValueSlot};
use crate::tag::Tag;

/// One cached entry: immutable key, patchable value and tag, and the
/// per-level forward pointers linking it into the list
pub struct Node {
    key: Box<[u8]>,
    value: ValueSlot,
    tag: AtomicU64,
    next: Box<[AtomicPtr<Node>]>,
}

impl Node {
    fn new(key: &[u8], value: Option<&[u8]>, tag: Tag, height: usize) -> Box<Node> {
        let next = (0..height)
            .map(|_| AtomicPtr::new(ptr::null_mut()))
            .collect();
        Box::new(Node {
            key: key.into(),
            value: ValueSlot::new(value),
            tag: AtomicU64::new(tag.packed()),
            next,
        })
    }

    /// The user-key bytes; immutable after publication
    #[inline]
    pub fn key(&self) -> &[u8] {
        &self.key
    }

    /// The entry's value storage
    #[inline]
    pub fn value(&self) -> &ValueSlot {
        &self.value
    }

    /// The tag of the most recent write to this entry
    ///
    /// Value bytes read around the same time are authoritative only
    /// together with this tag; re-read when the sequence moves.
    #[inline]
    pub fn tag(&self) -> Tag {
        Tag::from_packed(self.tag.load(Ordering::Acquire))
    }

    /// Overwrite the tag. Single-writer only.
    #[inline]
    pub(crate) fn store_tag(&self, tag: Tag) {
        self.tag.store(tag.packed(), Ordering::Release);
    }

    /// Number of levels this node is linked at
    #[inline]
    pub fn height(&self) -> usize {
        self.next.len()
    }

    // Acquire load, so a node reached through this pointer is observed
    // fully initialized.
    #[inline]
    fn next(&self, level: usize) -> *mut Node {
        self.next[level].load(Ordering::Acquire)
    }

    // Release store: publishing through this pointer makes the inserted
    // node's contents visible to readers.
    #[inline]
    fn set_next(&self, level: usize, node: *mut Node) {
        self.next[level].store(node, Ordering::Release);
    }

    #[inline]
    fn next_relaxed(&self, level: usize) -> *mut Node {
        self.next[level].load(Ordering::Relaxed)
    }

    #[inline]
    fn set_next_relaxed(&self, level: usize, node: *mut Node) {
        self.next[level].store(node, Ordering::Relaxed);
    }
}

/// Non-owning handle to a node linked in a [`SkipList`]
///
/// The list is the single owner of every node; handles stay valid
/// because linked nodes are never freed before the list is dropped.
/// The direct index stores these for O(1) update hits.
#[derive(Clone, Copy)]
pub struct NodeHandle(NonNull<Node>);

// Safety: a handle is a read-only address; the node it points to is
// synchronized internally (atomics) and outlives every handle holder.
unsafe impl Send for NodeHandle {}
unsafe impl Sync for NodeHandle {}

impl NodeHandle {
    fn new(ptr: NonNull<Node>) -> Self {
        Self(ptr)
    }

    /// Borrow the node behind the handle
    ///
    /// # Safety
    ///
    /// The list the handle came from must still be alive; the caller
    /// picks a lifetime no longer than the list's.
    pub(crate) unsafe fn as_node<'a>(&self) -> &'a Node {
        &*self.0.as_ptr()
    }
}

/// Writer-side generator for node heights: 1 + Geometric(1/branching)
///
/// xorshift64 over a fixed seed; height sequences are deterministic for
/// a given configuration, which keeps structural tests reproducible.
struct HeightRng {
    state: u64,
}

impl HeightRng {
    fn new(seed: u64) -> Self {
        // xorshift state must be non-zero
        Self {
            state: if seed == 0 { 0xdead_beef } else { seed },
        }
    }

    fn next(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.state = x;
        x
    }

    fn one_in(&mut self, n: u32) -> bool {
        self.next() % n as u64 == 0
    }
}

/// Single-writer / many-reader ordered index over user-key bytes
///
/// Keys compare by full bytewise lexicographic order (on a common
/// prefix, the shorter key sorts first). The head sentinel's key is
/// never compared; a null forward pointer reads as past-the-end.
pub struct SkipList {
    /// Head sentinel, allocated at the full height limit
    head: NonNull<Node>,
    /// Height of the tallest linked node. Written only by `insert`;
    /// readers may observe a stale value harmlessly.
    max_height: AtomicUsize,
    /// Number of linked entries
    len: AtomicUsize,
    height_limit: usize,
    branching: u32,
    rng: Mutex<HeightRng>,
}

// Safety: readers touch only atomics (forward pointers, tag, value
// slot); the raw head pointer is owned by the list and freed in Drop.
// Writer-side state (rng) is mutex-guarded.
unsafe impl Send for SkipList {}
unsafe impl Sync for SkipList {}

/// Default height limit; supports working sets into the millions
pub const DEFAULT_HEIGHT_LIMIT: usize = 12;

/// Default branching factor for the height distribution
pub const DEFAULT_BRANCHING: u32 = 4;

/// Default seed for the height generator
pub const DEFAULT_HEIGHT_SEED: u64 = 0xdead_beef;

impl SkipList {
    /// Create an empty list with the default geometry
    pub fn new() -> Self {
        Self::with_geometry(DEFAULT_HEIGHT_LIMIT, DEFAULT_BRANCHING, DEFAULT_HEIGHT_SEED)
    }

    /// Create an empty list with explicit geometry
    ///
    /// `height_limit` is clamped to at least 1 and `branching` to at
    /// least 2.
    pub fn with_geometry(height_limit: usize, branching: u32, seed: u64) -> Self {
        let height_limit = height_limit.max(1);
        let head = Node::new(&[], None, Tag::from_packed(0), height_limit);
        // Safety: Box::into_raw never returns null.
        let head = unsafe { NonNull::new_unchecked(Box::into_raw(head)) };
        Self {
            head,
            max_height: AtomicUsize::new(1),
            len: AtomicUsize::new(0),
            height_limit,
            branching: branching.max(2),
            rng: Mutex::new(HeightRng::new(seed)),
        }
    }

    /// Number of entries in the list
    ///
    /// Writer-exact; concurrent readers may see a slightly stale count.
    #[inline]
    pub fn len(&self) -> usize {
        self.len.load(Ordering::Relaxed)
    }

    /// Whether the list holds no entries
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    fn max_height(&self) -> usize {
        self.max_height.load(Ordering::Relaxed)
    }

    #[inline]
    fn head_ptr(&self) -> *mut Node {
        self.head.as_ptr()
    }

    // Null reads as past-the-end, so only a real successor can sort
    // before the key.
    #[inline]
    fn key_is_after_node(key: &[u8], n: *mut Node) -> bool {
        // Safety: non-null forward pointers always reference live nodes.
        !n.is_null() && unsafe { (*n).key() } < key
    }

    /// Insert an entry if `key` is not already present
    ///
    /// Returns `None` when a node with the key exists; the list is left
    /// untouched and it is the caller's job to route an update instead.
    /// A `None` value creates a tombstone node (absent value).
    ///
    /// Requires external write serialization. Concurrent readers are
    /// fine; concurrent writers are a contract violation (it cannot
    /// corrupt memory, but entries may be lost).
    pub fn insert(&self, key: &[u8], value: Option<&[u8]>, tag: Tag) -> Option<NodeHandle> {
        let mut prev: Vec<*mut Node> = vec![ptr::null_mut(); self.height_limit];
        let found = self.find_greater_or_equal(key, Some(&mut prev));
        // Duplicate insertion is not allowed
        if !found.is_null() && unsafe { (*found).key() } == key {
            return None;
        }

        let height = self.random_height();
        let current_max = self.max_height();
        if height > current_max {
            for slot in prev.iter_mut().take(height).skip(current_max) {
                *slot = self.head_ptr();
            }
            // A reader observing the new height before the links below
            // either sees null at the new level (and drops down) or the
            // published node. Either way it proceeds correctly.
            self.max_height.store(height, Ordering::Relaxed);
        }

        let node = Box::into_raw(Node::new(key, value, tag, height));
        for (level, &p) in prev.iter().enumerate().take(height) {
            // Safety: `node` is unpublished, so relaxed stores into its
            // forward slots suffice; the release store into `prev` is
            // what publishes it. `prev` entries are the head or linked
            // nodes, all live.
            unsafe {
                (*node).set_next_relaxed(level, (*p).next_relaxed(level));
                (*p).set_next(level, node);
            }
        }
        self.len.fetch_add(1, Ordering::Relaxed);
        // Safety: Box::into_raw never returns null.
        Some(NodeHandle::new(unsafe { NonNull::new_unchecked(node) }))
    }

    /// Whether an entry with `key` is linked. Lock-free; correct under
    /// a concurrent insert.
    pub fn contains(&self, key: &[u8]) -> bool {
        let x = self.find_greater_or_equal(key, None);
        // Safety: non-null results reference live nodes.
        !x.is_null() && unsafe { (*x).key() } == key
    }

    /// A new iterator positioned nowhere; seek before use
    pub fn iter(&self) -> SkipListIterator<'_> {
        SkipListIterator {
            list: self,
            node: ptr::null(),
        }
    }

    fn random_height(&self) -> usize {
        let mut rng = self.rng.lock();
        let mut height = 1;
        while height < self.height_limit && rng.one_in(self.branching) {
            height += 1;
        }
        height
    }

    /// Earliest node at or after `key`, null if none. When `prev` is
    /// given, records the predecessor at every level up to the current
    /// max height.
    fn find_greater_or_equal(&self, key: &[u8], mut prev: Option<&mut Vec<*mut Node>>) -> *mut Node {
        let mut x = self.head_ptr();
        let mut level = self.max_height() - 1;
        loop {
            // Safety: `x` starts at the head and only advances to
            // non-null forward pointers, all live nodes.
            let next = unsafe { (*x).next(level) };
            if Self::key_is_after_node(key, next) {
                x = next;
            } else {
                if let Some(prev) = prev.as_deref_mut() {
                    prev[level] = x;
                }
                if level == 0 {
                    return next;
                }
                level -= 1;
            }
        }
    }

    /// Latest node with a key strictly before `key`; the head sentinel
    /// if there is none.
    fn find_less_than(&self, key: &[u8]) -> *mut Node {
        let mut x = self.head_ptr();
        let mut level = self.max_height() - 1;
        loop {
            // Safety: as in find_greater_or_equal.
            let next = unsafe { (*x).next(level) };
            if next.is_null() || unsafe { (*next).key() } >= key {
                if level == 0 {
                    return x;
                }
                level -= 1;
            } else {
                x = next;
            }
        }
    }

    /// Last node in the list; the head sentinel if empty
    fn find_last(&self) -> *mut Node {
        let mut x = self.head_ptr();
        let mut level = self.max_height() - 1;
        loop {
            // Safety: as in find_greater_or_equal.
            let next = unsafe { (*x).next(level) };
            if next.is_null() {
                if level == 0 {
                    return x;
                }
                level -= 1;
            } else {
                x = next;
            }
        }
    }
}

impl Default for SkipList {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for SkipList {
    fn drop(&mut self) {
        // Level 0 links every node, so a single walk releases them all.
        // Safety: exclusive access; no readers outlive the list.
        unsafe {
            let mut x = (*self.head_ptr()).next_relaxed(0);
            while !x.is_null() {
                let next = (*x).next_relaxed(0);
                drop(Box::from_raw(x));
                x = next;
            }
            drop(Box::from_raw(self.head_ptr()));
        }
    }
}

/// Cursor over a [`SkipList`]'s entries in key order
///
/// Freshly created iterators are not valid; position with one of the
/// seek methods first. `prev` rescans from the head (there are no back
/// pointers), so backward steps cost a search each.
pub struct SkipListIterator<'a> {
    list: &'a SkipList,
    node: *const Node,
}

impl<'a> SkipListIterator<'a> {
    /// Whether the iterator is positioned at an entry
    #[inline]
    pub fn valid(&self) -> bool {
        !self.node.is_null()
    }

    /// The entry at the current position
    ///
    /// Requires `valid()`.
    #[inline]
    pub fn node(&self) -> &'a Node {
        debug_assert!(self.valid());
        // Safety: a valid position references a linked node, which lives
        // as long as the list borrow `'a`.
        unsafe { &*self.node }
    }

    /// Key at the current position. Requires `valid()`.
    #[inline]
    pub fn key(&self) -> &'a [u8] {
        self.node().key()
    }

    /// Tag at the current position. Requires `valid()`.
    #[inline]
    pub fn tag(&self) -> Tag {
        self.node().tag()
    }

    /// Copy of the value at the current position, `None` for a
    /// tombstone. Requires `valid()`.
    ///
    /// Authoritative only together with a tag read; see [`ValueBuf`].
    pub fn read_value(&self) -> Option<Vec<u8>> {
        self.node().value().load().map(ValueBuf::read)
    }

    /// Advance to the next entry. Requires `valid()`.
    pub fn next(&mut self) {
        debug_assert!(self.valid());
        // Safety: valid position, see node().
        self.node = unsafe { (*self.node).next(0) };
    }

    /// Step back to the previous entry; becomes invalid at the front.
    /// Requires `valid()`.
    pub fn prev(&mut self) {
        debug_assert!(self.valid());
        let before = self.list.find_less_than(self.key());
        self.node = if before == self.list.head_ptr() {
            ptr::null()
        } else {
            before as *const Node
        };
    }

    /// Position at the first entry with key >= `target`
    pub fn seek(&mut self, target: &[u8]) {
        self.node = self.list.find_greater_or_equal(target, None);
    }

    /// Position at the front; valid iff the list is non-empty
    pub fn seek_to_first(&mut self) {
        // Safety: the head sentinel is live for the list's lifetime.
        self.node = unsafe { (*self.list.head_ptr()).next(0) };
    }

    /// Position at the back; valid iff the list is non-empty
    pub fn seek_to_last(&mut self) {
        let last = self.list.find_last();
        self.node = if last == self.list.head_ptr() {
            ptr::null()
        } else {
            last as *const Node
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tag::ValueType;

    fn tag(sequence: u64) -> Tag {
        Tag::new(sequence, ValueType::Value)
    }

    #[test]
    fn test_empty_list() {
        let list = SkipList::new();
        assert!(list.is_empty());
        assert!(!list.contains(b"anything"));

        let mut it = list.iter();
        assert!(!it.valid());
        it.seek_to_first();
        assert!(!it.valid());
        it.seek_to_last();
        assert!(!it.valid());
        it.seek(b"x");
        assert!(!it.valid());
    }

    #[test]
    fn test_insert_and_contains() {
        let list = SkipList::new();
        assert!(list.insert(b"apple", Some(b"red"), tag(1)).is_some());
        assert!(list.insert(b"banana", Some(b"yellow"), tag(2)).is_some());

        assert!(list.contains(b"apple"));
        assert!(list.contains(b"banana"));
        assert!(!list.contains(b"cherry"));
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn test_duplicate_insert_returns_none() {
        let list = SkipList::new();
        let first = list.insert(b"k", Some(b"a"), tag(1));
        assert!(first.is_some());
        assert!(list.insert(b"k", Some(b"b"), tag(2)).is_none());
        assert_eq!(list.len(), 1);

        // The original node is untouched
        let mut it = list.iter();
        it.seek(b"k");
        assert!(it.valid());
        assert_eq!(it.read_value().unwrap(), b"a");
        assert_eq!(it.tag().sequence(), 1);
    }

    #[test]
    fn test_insertion_order_does_not_matter() {
        let list = SkipList::new();
        list.insert(b"b", Some(b"2"), tag(2));
        list.insert(b"a", Some(b"1"), tag(1));
        list.insert(b"c", Some(b"3"), tag(3));

        let mut it = list.iter();
        it.seek_to_first();
        assert_eq!(it.key(), b"a");
        it.next();
        assert_eq!(it.key(), b"b");
        it.next();
        assert_eq!(it.key(), b"c");
        it.next();
        assert!(!it.valid());
    }

    #[test]
    fn test_seek_and_prev() {
        let list = SkipList::new();
        list.insert(b"b", Some(b"2"), tag(2));
        list.insert(b"a", Some(b"1"), tag(1));
        list.insert(b"c", Some(b"3"), tag(3));

        let mut it = list.iter();
        it.seek(b"b");
        assert!(it.valid());
        assert_eq!(it.key(), b"b");

        it.prev();
        assert!(it.valid());
        assert_eq!(it.key(), b"a");

        it.prev();
        assert!(!it.valid());
    }

    #[test]
    fn test_seek_between_keys() {
        let list = SkipList::new();
        list.insert(b"aa", Some(b"1"), tag(1));
        list.insert(b"cc", Some(b"2"), tag(2));

        let mut it = list.iter();
        it.seek(b"bb");
        assert!(it.valid());
        assert_eq!(it.key(), b"cc");

        it.seek(b"zz");
        assert!(!it.valid());
    }

    #[test]
    fn test_seek_to_last() {
        let list = SkipList::new();
        list.insert(b"m", Some(b"1"), tag(1));
        list.insert(b"z", Some(b"2"), tag(2));
        list.insert(b"a", Some(b"3"), tag(3));

        let mut it = list.iter();
        it.seek_to_last();
        assert!(it.valid());
        assert_eq!(it.key(), b"z");
    }

    #[test]
    fn test_prefix_keys_sort_shorter_first() {
        let list = SkipList::new();
        list.insert(b"abc", Some(b"1"), tag(1));
        list.insert(b"ab", Some(b"2"), tag(2));
        list.insert(b"abcd", Some(b"3"), tag(3));

        let mut it = list.iter();
        it.seek_to_first();
        assert_eq!(it.key(), b"ab");
        it.next();
        assert_eq!(it.key(), b"abc");
        it.next();
        assert_eq!(it.key(), b"abcd");
    }

    #[test]
    fn test_tombstone_node() {
        let list = SkipList::new();
        let handle = list
            .insert(b"gone", None, Tag::new(5, ValueType::Deletion))
            .unwrap();
        // Safety: list is alive for the whole test.
        let node = unsafe { handle.as_node() };
        assert!(node.value().is_absent());
        assert!(node.tag().value_type().is_deletion());
        assert!(list.contains(b"gone"));
    }

    #[test]
    fn test_heights_stay_within_limit() {
        let list = SkipList::with_geometry(4, 2, 42);
        for i in 0..200u32 {
            let key = i.to_be_bytes();
            let handle = list.insert(&key, Some(b"v"), tag(i as u64)).unwrap();
            // Safety: list is alive for the whole test.
            let height = unsafe { handle.as_node() }.height();
            assert!((1..=4).contains(&height));
        }
        assert_eq!(list.len(), 200);
    }

    #[test]
    fn test_many_keys_stay_sorted() {
        let list = SkipList::new();
        // Insertion order hits ascending, descending, and interleaved cases
        for i in (0..500u32).rev().chain(500..1000) {
            list.insert(&i.to_be_bytes(), Some(b"v"), tag(i as u64));
        }

        let mut it = list.iter();
        it.seek_to_first();
        let mut count = 0u32;
        let mut last: Option<Vec<u8>> = None;
        while it.valid() {
            let key = it.key().to_vec();
            if let Some(prev_key) = &last {
                assert!(prev_key < &key);
            }
            last = Some(key);
            count += 1;
            it.next();
        }
        assert_eq!(count, 1000);
    }

    #[test]
    fn test_empty_user_key() {
        // An internal key can be tag-only, leaving a zero-length user key
        let list = SkipList::new();
        list.insert(b"", Some(b"v"), tag(1));
        list.insert(b"a", Some(b"w"), tag(2));

        assert!(list.contains(b""));
        let mut it = list.iter();
        it.seek_to_first();
        assert_eq!(it.key(), b"");
        it.next();
        assert_eq!(it.key(), b"a");
    }
}
