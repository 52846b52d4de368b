//! The unique erasing cursor over a [`Storage`] list.
//!
//! At most one [`Iter`] exists per storage at a time (enforced at
//! runtime). Producers keep publishing while it runs; the cursor follows
//! Acquire loads that pair with the publishers' Release stores, so it
//! only ever observes fully-initialized nodes.
//!
//! Because the iterator is the sole eraser, an unlinked node is
//! unreachable from everyone else by construction and can be freed
//! immediately; no deferred reclamation scheme is needed.

use std::marker::PhantomData;
use std::ptr as StdPtr;
use std::ptr::NonNull;

use crate::node::Node;
use crate::ordering::{READ_ORD, RELAXED, WRITE_ORD};
use crate::storage::{ERASE_COUNT, Storage};
use crate::tracing_helpers::trace_log;

/// View of the node under the cursor.
///
/// `PhantomData<*mut ()>` makes the view `!Send + !Sync`: payload access
/// is part of the single-reader protocol and must stay on the iterating
/// thread.
pub struct NodeRef<'a, const ALIGNMENT: usize> {
    node: &'a Node<ALIGNMENT>,
    _marker: PhantomData<*mut ()>,
}

impl<const ALIGNMENT: usize> NodeRef<'_, ALIGNMENT> {
    /// Stable pointer to the payload bytes. Valid until the node is
    /// erased.
    #[inline]
    #[must_use]
    pub fn data(&self) -> NonNull<u8> {
        self.node.payload()
    }

    /// Payload byte count.
    #[inline]
    #[must_use]
    pub fn payload_size(&self) -> usize {
        self.node.payload_size()
    }

    /// Borrow the payload as a `T`.
    ///
    /// # Safety
    ///
    /// The payload must hold an initialized `T`: the node must have been
    /// created by `insert::<T>` (or equivalent bytes written through
    /// [`Self::data`]).
    #[inline]
    #[must_use]
    pub unsafe fn data_ref<T>(&self) -> &T {
        // SAFETY: caller asserts the payload holds an initialized `T`;
        // the node guarantees size and alignment.
        unsafe { self.node.payload().cast::<T>().as_ref() }
    }

    /// Borrow the payload as a mutable `T`.
    ///
    /// # Safety
    ///
    /// As for [`Self::data_ref`], and no other reference into this
    /// payload may be live while the returned borrow is.
    #[inline]
    #[must_use]
    pub unsafe fn data_mut<T>(&mut self) -> &mut T {
        // SAFETY: caller asserts the payload holds an initialized `T`
        // and that this is the only live reference into it.
        unsafe { self.node.payload().cast::<T>().as_mut() }
    }
}

/// Forward cursor with in-place erase.
///
/// The cursor starts on the first node. [`Iter::current`] views the node
/// under the cursor, [`Iter::advance`] moves to the successor, and
/// [`Iter::erase_and_advance`] unlinks the current node, frees it, and
/// moves on. Both cursor moves panic past the end.
///
/// The traversal sees every node that was reachable when the iterator
/// was created and has not been erased. Batches published afterwards are
/// seen only if the cursor has not yet walked past the splice point;
/// they are never observed out of order.
pub struct Iter<'s, const ALIGNMENT: usize> {
    storage: &'s Storage<ALIGNMENT>,

    /// Node before the cursor, null while the cursor is on the head.
    /// Tracked to make unlinking O(1).
    prev: *mut Node<ALIGNMENT>,

    /// Node under the cursor, null at end.
    node: *mut Node<ALIGNMENT>,
}

impl<'s, const ALIGNMENT: usize> Iter<'s, ALIGNMENT> {
    pub(crate) fn new(storage: &'s Storage<ALIGNMENT>) -> Self {
        Self {
            storage,
            prev: StdPtr::null_mut(),
            node: storage.head.load(READ_ORD),
        }
    }

    /// View the node under the cursor, or `None` at end.
    #[must_use]
    pub fn current(&self) -> Option<NodeRef<'_, ALIGNMENT>> {
        let node = NonNull::new(self.node)?;
        // SAFETY: a non-null cursor points at a live published node, and
        // only this iterator may erase it.
        Some(NodeRef {
            node: unsafe { node.as_ref() },
            _marker: PhantomData,
        })
    }

    /// Move the cursor to the successor.
    ///
    /// # Panics
    ///
    /// Panics if the cursor is already past the end.
    pub fn advance(&mut self) {
        let node = NonNull::new(self.node).expect("iterator advanced past the end");

        self.prev = self.node;
        // SAFETY: the cursor node is live; its link pairs with the
        // publishers' Release stores.
        self.node = unsafe { node.as_ref().next.load(READ_ORD) };
    }

    /// Unlink the node under the cursor, free it, and move the cursor to
    /// its successor.
    ///
    /// Erasing the head moves the head forward; erasing the tail
    /// serializes with publishers on the publish mutex so a concurrent
    /// batch either lands after this node first (and the erase proceeds
    /// as a middle unlink) or after its predecessor.
    ///
    /// # Panics
    ///
    /// Panics if the cursor is already past the end.
    pub fn erase_and_advance(&mut self) {
        let node = NonNull::new(self.node).expect("iterator erased past the end");

        // SAFETY: the cursor node is live and reachable.
        let mut next: *mut Node<ALIGNMENT> = unsafe { node.as_ref().next.load(READ_ORD) };

        if next.is_null() {
            // Likely the tail. A publisher may splice a batch after this
            // node at any moment, so settle it under the publish mutex.
            let mut tail = self.storage.tail.lock();
            // SAFETY: still live; nothing else erases.
            next = unsafe { node.as_ref().next.load(READ_ORD) };
            if next.is_null() {
                debug_assert!(StdPtr::eq(tail.0, self.node));
                self.relink(StdPtr::null_mut());
                tail.0 = self.prev;
            }
            drop(tail);
        }

        if !next.is_null() {
            // Middle unlink. Publishers only ever touch the tail's link,
            // and neither `prev` nor this node is the tail here.
            self.relink(next);
        }

        self.node = next;
        self.storage.published.fetch_sub(1, RELAXED);
        ERASE_COUNT.fetch_add(1, RELAXED);
        trace_log!("erased node");

        // SAFETY: the node is unlinked; neither the (unique) reader nor
        // any publisher can reach it anymore.
        unsafe { Node::free(node) };
    }

    /// Point the predecessor's link (or the head) at `next`.
    fn relink(&self, next: *mut Node<ALIGNMENT>) {
        if let Some(prev) = NonNull::new(self.prev) {
            // SAFETY: `prev` is a live node strictly before the cursor.
            unsafe { prev.as_ref().next.store(next, WRITE_ORD) };
        } else {
            self.storage.head.store(next, WRITE_ORD);
        }
    }
}

impl<const ALIGNMENT: usize> Drop for Iter<'_, ALIGNMENT> {
    fn drop(&mut self) {
        self.storage.iter_live.store(false, WRITE_ORD);
    }
}
