//! Value-byte ownership for cached entries
//!
//! A cached entry's key bytes are written once and never touched again,
//! so they live in a plain boxed slice on the node. The value bytes are
//! different: the single writer patches them in place (same length) or
//! swaps in a replacement buffer (different length) while lock-free
//! readers may be mid-read. This module owns that contract:
//!
//! - [`ValueBuf`] stores value bytes as atomics so an in-place patch
//!   racing a read is well-defined. A reader may observe a torn mix of
//!   old and new bytes; value bytes are only authoritative together
//!   with the tag read alongside them.
//! - [`ValueSlot`] is the node's present/absent value pointer. A null
//!   slot is a tombstone. Replacement publishes the new buffer with a
//!   release store; readers load with acquire.
//! - [`RetireList`] holds replaced buffers until cache teardown, since
//!   a reader that acquired the old pointer may still be dereferencing
//!   it. Nothing is freed early.

use std::ptr::{self, NonNull};
use std::sync::atomic::{AtomicPtr, AtomicU8, Ordering};

use parking_lot::Mutex;

/// Value bytes readable while the writer patches them in place
///
/// Same-length updates store byte-by-byte with relaxed ordering, so a
/// concurrent [`read`](ValueBuf::read) may return a mix of old and new
/// bytes. Callers pair the copy with the entry's tag and re-read when
/// the tag moves.
pub struct ValueBuf {
    bytes: Box<[AtomicU8]>,
}

impl ValueBuf {
    /// Allocate a buffer holding a copy of `src`
    pub(crate) fn copy_from(src: &[u8]) -> Self {
        Self {
            bytes: src.iter().map(|&b| AtomicU8::new(b)).collect(),
        }
    }

    /// Length in bytes; fixed for the buffer's lifetime
    #[inline]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the buffer is zero-length
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Copy the current contents out
    ///
    /// The copy may be torn against a concurrent same-length patch; see
    /// the type-level contract.
    pub fn read(&self) -> Vec<u8> {
        self.bytes.iter().map(|b| b.load(Ordering::Relaxed)).collect()
    }

    /// Patch the buffer in place with same-length contents
    ///
    /// Single-writer only. Lengths must match; a length change goes
    /// through [`ValueSlot::replace`] instead.
    pub(crate) fn overwrite(&self, src: &[u8]) {
        debug_assert_eq!(src.len(), self.bytes.len());
        for (slot, &b) in self.bytes.iter().zip(src) {
            slot.store(b, Ordering::Relaxed);
        }
    }
}

/// A replaced [`ValueBuf`] awaiting teardown
///
/// The token does not free the buffer on drop; ownership transfers to
/// the [`RetireList`], which frees everything when the cache is torn
/// down.
pub struct RetiredValue(NonNull<ValueBuf>);

// Safety: the token is the sole handle used for (deferred) deallocation;
// concurrent readers only hold shared references obtained before the
// buffer was retired.
unsafe impl Send for RetiredValue {}

/// A node's value storage: present ([`ValueBuf`]) or absent (tombstone)
pub struct ValueSlot {
    ptr: AtomicPtr<ValueBuf>,
}

impl ValueSlot {
    /// Create a slot, absent when `initial` is `None`
    pub(crate) fn new(initial: Option<&[u8]>) -> Self {
        let ptr = match initial {
            Some(bytes) => Box::into_raw(Box::new(ValueBuf::copy_from(bytes))),
            None => ptr::null_mut(),
        };
        Self {
            ptr: AtomicPtr::new(ptr),
        }
    }

    /// The current buffer, or `None` for a tombstone
    ///
    /// The returned reference stays valid for the life of the cache:
    /// replaced buffers are retired, not freed.
    #[inline]
    pub fn load(&self) -> Option<&ValueBuf> {
        let p = self.ptr.load(Ordering::Acquire);
        if p.is_null() {
            None
        } else {
            // Safety: non-null buffers are heap allocations freed only at
            // cache teardown (directly by this slot's Drop or via the
            // retire list).
            Some(unsafe { &*p })
        }
    }

    /// Whether the slot currently holds no value
    #[inline]
    pub fn is_absent(&self) -> bool {
        self.ptr.load(Ordering::Acquire).is_null()
    }

    /// Current value length, `None` for a tombstone
    #[inline]
    pub fn len(&self) -> Option<usize> {
        self.load().map(ValueBuf::len)
    }

    /// Publish a new buffer (or a tombstone) and hand back the old one
    ///
    /// Single-writer only. The returned token must go to the cache's
    /// [`RetireList`]; dropping the buffer here could free memory a
    /// reader still holds.
    pub(crate) fn replace(&self, new: Option<Box<ValueBuf>>) -> Option<RetiredValue> {
        let new_ptr = new.map_or(ptr::null_mut(), Box::into_raw);
        let old = self.ptr.swap(new_ptr, Ordering::AcqRel);
        NonNull::new(old).map(RetiredValue)
    }
}

impl Drop for ValueSlot {
    fn drop(&mut self) {
        let p = *self.ptr.get_mut();
        if !p.is_null() {
            // Safety: teardown path; the slot owns its current buffer and
            // no readers outlive the cache.
            drop(unsafe { Box::from_raw(p) });
        }
    }
}

/// Replaced value buffers, freed at cache teardown only
///
/// Readers traverse without any registration, so there is no cheap way
/// to know when the last reference to a replaced buffer dies. Deferring
/// reclamation to teardown bounds retired memory by update churn, which
/// is acceptable for a hot-key working set.
pub struct RetireList {
    retired: Mutex<Vec<RetiredValue>>,
}

impl RetireList {
    /// Create an empty retire list
    pub fn new() -> Self {
        Self {
            retired: Mutex::new(Vec::new()),
        }
    }

    /// Park a replaced buffer until teardown
    pub fn retire(&self, value: RetiredValue) {
        self.retired.lock().push(value);
    }

    /// Number of buffers awaiting teardown
    pub fn len(&self) -> usize {
        self.retired.lock().len()
    }

    /// Whether no buffers are retired
    pub fn is_empty(&self) -> bool {
        self.retired.lock().is_empty()
    }
}

impl Default for RetireList {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for RetireList {
    fn drop(&mut self) {
        for value in self.retired.get_mut().drain(..) {
            // Safety: teardown path; every token in the list is the sole
            // remaining handle to its buffer.
            drop(unsafe { Box::from_raw(value.0.as_ptr()) });
        }
    }
}
