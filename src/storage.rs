//! Filepath: src/storage.rs
//!
//! Multi-producer published list with a single erasing reader.
//!
//! [`Storage`] owns a singly-linked list of variably-sized nodes. Mutator
//! threads never touch it directly: each builds a private sublist through a
//! [`Producer`] and splices the whole batch in with one publication. The
//! sole [`Iter`] walks the list concurrently with publications and may
//! unlink nodes in place.
//!
//! # Concurrency model
//!
//! - Publication is serialized by a [`parking_lot::Mutex`] over the tail.
//!   Publish happens off the hot allocation path (allocation is
//!   producer-local), so contention on this mutex is between whole
//!   batches, not individual inserts.
//! - Traversal is lock-free: the iterator follows `Acquire` loads of
//!   `head` and each node's link, pairing with the publisher's `Release`
//!   stores. A reader standing at the old tail sees either the old
//!   terminator or the first node of a fully-initialized new batch.
//! - The only publisher/reader coordination point is erasing the current
//!   tail, which takes the publish mutex and re-checks the link.
//!
//! # Ordering guarantees
//!
//! Within one producer, insert order is preserved. Across producers,
//! batches land in mutex acquisition order and never interleave. There is
//! no order between individual inserts of distinct producers.

use std::fmt as StdFmt;
use std::ptr as StdPtr;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicBool, AtomicPtr, AtomicUsize};

use parking_lot::Mutex;

use crate::node::Node;
use crate::ordering::{CLAIM_ORD, RELAXED, WRITE_ORD};
use crate::tracing_helpers::{debug_log, trace_log};

pub mod iter;
pub mod producer;



pub use iter::{Iter, NodeRef};
pub use producer::Producer;

// ============================================================================
//  AllocError
// ============================================================================

/// Errors surfaced by node allocation.
///
/// Storage invariants are unaffected by a failed allocation: no partial
/// node is ever linked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocError {
    /// The system allocator returned no memory.
    OutOfMemory,

    /// The requested payload size cannot be expressed as an allocation
    /// layout on this platform.
    LayoutOverflow,
}

impl StdFmt::Display for AllocError {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        match self {
            Self::OutOfMemory => write!(f, "memory allocation failed"),

            Self::LayoutOverflow => write!(f, "payload size overflows the maximum allocation layout"),
        }
    }
}

impl std::error::Error for AllocError {}

// ============================================================================
//  Debug counters
// ============================================================================

static PUBLISH_COUNT: AtomicUsize = AtomicUsize::new(0);
static ERASE_COUNT: AtomicUsize = AtomicUsize::new(0);

/// Snapshot the (publish, erase) counters. Diagnostic aid for stress
/// tests; counters are process-wide and monotonically increasing between
/// resets.
pub fn debug_counters() -> (usize, usize) {
    (PUBLISH_COUNT.load(RELAXED), ERASE_COUNT.load(RELAXED))
}

/// Reset the debug counters to zero.
pub fn reset_debug_counters() {
    PUBLISH_COUNT.store(0, RELAXED);
    ERASE_COUNT.store(0, RELAXED);
}

// ============================================================================
//  Batch
// ============================================================================

/// A well-formed producer sublist: `head` reaches `tail` through `len`
/// nodes, and `tail`'s link is null.
pub(crate) struct Batch<const ALIGNMENT: usize> {
    pub(crate) head: NonNull<Node<ALIGNMENT>>,
    pub(crate) tail: NonNull<Node<ALIGNMENT>>,
    pub(crate) len: usize,
}

// ============================================================================
//  Storage
// ============================================================================

/// Tail pointer, guarded by the publish mutex.
struct Tail<const ALIGNMENT: usize>(*mut Node<ALIGNMENT>);

// SAFETY: the pointer is only dereferenced under the mutex by publishers
// and the erasing iterator, both of which borrow the owning `Storage`.
unsafe impl<const ALIGNMENT: usize> Send for Tail<ALIGNMENT> {}

/// The singly-linked list behind an object factory.
///
/// `ALIGNMENT` is the payload alignment every node honors; it must be a
/// power of two. Producers append batches at the tail; the single
/// iterator walks from the head and may erase.
///
/// Live [`Producer`]s and the live [`Iter`] borrow the storage, so the
/// borrow checker statically rules out dropping a storage under them
/// (the runtime assertion the original design called for).
///
/// # Example
///
/// ```
/// use objfactory::Storage;
///
/// let storage: Storage<8> = Storage::new();
/// let mut producer = storage.producer();
/// producer.insert(7_i32).unwrap();
/// producer.publish();
///
/// let iter = storage.iter();
/// // SAFETY: the only payload ever inserted above is an i32.
/// let value = unsafe { *iter.current().unwrap().data_ref::<i32>() };
/// assert_eq!(value, 7);
/// ```
pub struct Storage<const ALIGNMENT: usize> {
    /// First node, null when empty. Read by the iterator with Acquire.
    head: AtomicPtr<Node<ALIGNMENT>>,

    /// Last node, null when empty. Only touched under the mutex.
    tail: Mutex<Tail<ALIGNMENT>>,

    /// Single-reader flag: set while an [`Iter`] is live.
    iter_live: AtomicBool,

    /// Published node count, maintained with relaxed arithmetic.
    published: AtomicUsize,
}

impl<const ALIGNMENT: usize> Storage<ALIGNMENT> {
    /// Create an empty list.
    #[must_use]
    pub fn new() -> Self {
        Self {
            head: AtomicPtr::new(StdPtr::null_mut()),
            tail: Mutex::new(Tail(StdPtr::null_mut())),
            iter_live: AtomicBool::new(false),
            published: AtomicUsize::new(0),
        }
    }

    /// Create a producer bound to this storage.
    #[must_use]
    pub fn producer(&self) -> Producer<'_, ALIGNMENT> {
        Producer::new(self)
    }

    /// Return the sole iterator over the published list.
    ///
    /// Producers may keep publishing while the iterator is live; batches
    /// appended after this call are visible only if the cursor has not
    /// yet walked past the splice point.
    ///
    /// # Panics
    ///
    /// Panics if another iterator is already live. At most one reader may
    /// exist at a time.
    #[must_use]
    pub fn iter(&self) -> Iter<'_, ALIGNMENT> {
        let was_live: bool = self.iter_live.swap(true, CLAIM_ORD);
        assert!(!was_live, "a second concurrent iterator was requested");

        Iter::new(self)
    }

    /// Published node count. Exact once all producers have published and
    /// the iterator is quiescent; a racy approximation otherwise.
    #[must_use]
    pub fn len_approx(&self) -> usize {
        self.published.load(RELAXED)
    }

    /// Splice a producer batch at the tail.
    ///
    /// The batch's internal links are fully initialized before this call,
    /// so the single Release store that makes `batch.head` reachable
    /// publishes the whole sublist to the concurrent reader.
    pub(crate) fn publish(&self, batch: Batch<ALIGNMENT>) {
        let mut tail = self.tail.lock();

        if tail.0.is_null() {
            self.head.store(batch.head.as_ptr(), WRITE_ORD);
        } else {
            // SAFETY: a non-null tail is a live published node; its link
            // is only written here and by erase-at-tail, both under this
            // mutex.
            unsafe { (*tail.0).next.store(batch.head.as_ptr(), WRITE_ORD) };
        }
        tail.0 = batch.tail.as_ptr();
        drop(tail);

        self.published.fetch_add(batch.len, RELAXED);
        PUBLISH_COUNT.fetch_add(1, RELAXED);
        trace_log!(batch_len = batch.len, "published batch");
    }
}

impl<const ALIGNMENT: usize> Default for Storage<ALIGNMENT> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const ALIGNMENT: usize> StdFmt::Debug for Storage<ALIGNMENT> {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        f.debug_struct("Storage")
            .field("alignment", &ALIGNMENT)
            .field("len_approx", &self.len_approx())
            .field("iter_live", &self.iter_live.load(RELAXED))
            .finish()
    }
}

impl<const ALIGNMENT: usize> Drop for Storage<ALIGNMENT> {
    /// Walk the list and release every node. Safe when non-empty.
    fn drop(&mut self) {
        // A leaked (mem::forget) iterator leaves the flag set with no
        // borrow to stop us; refuse to free nodes it may still reference.
        assert!(
            !self.iter_live.load(RELAXED),
            "storage dropped with a live iterator"
        );

        debug_log!(len = self.len_approx(), "storage teardown");
        let mut node: *mut Node<ALIGNMENT> = *self.head.get_mut();
        while let Some(live) = NonNull::new(node) {
            // SAFETY: `&mut self` means no producer or iterator borrows
            // remain; every published node is reachable exactly once.
            unsafe {
                node = live.as_ref().next.load(RELAXED);
                Node::free(live);
            }
        }
    }
}
