//! Thread-local batch builder.
//!
//! A [`Producer`] accumulates nodes on a private sublist with no
//! synchronization at all; the shared list learns about them only when
//! the whole batch is spliced in by [`Producer::publish`]. Dropping a
//! producer publishes whatever is pending, so inserted nodes are never
//! lost.

use std::ptr as StdPtr;
use std::ptr::NonNull;

use crate::node::Node;
use crate::ordering::RELAXED;
use crate::storage::{AllocError, Batch, Storage};

/// A private sublist of zero or more nodes, bound to one [`Storage`].
///
/// Inserts within one producer keep their relative order in the global
/// list after publish. The producer is `Send` (a batch may be built on
/// another thread) but not `Sync`.
pub struct Producer<'s, const ALIGNMENT: usize> {
    storage: &'s Storage<ALIGNMENT>,
    head: *mut Node<ALIGNMENT>,
    tail: *mut Node<ALIGNMENT>,
    len: usize,
}

// SAFETY: the sublist is reachable only through this producer until
// publish, and `Storage` is `Sync`.
unsafe impl<const ALIGNMENT: usize> Send for Producer<'_, ALIGNMENT> {}

impl<'s, const ALIGNMENT: usize> Producer<'s, ALIGNMENT> {
    pub(crate) fn new(storage: &'s Storage<ALIGNMENT>) -> Self {
        Self {
            storage,
            head: StdPtr::null_mut(),
            tail: StdPtr::null_mut(),
            len: 0,
        }
    }

    /// Allocate a node for a value of type `T` and move `value` into its
    /// payload. Returns the stable payload pointer.
    ///
    /// `T`'s alignment must not exceed `ALIGNMENT`, and `T` must not need
    /// drop glue (payloads are freed as raw bytes, never dropped); both
    /// are enforced at compile time.
    ///
    /// # Errors
    ///
    /// [`AllocError`] if the allocation fails; the producer is unchanged.
    pub fn insert<T>(&mut self, value: T) -> Result<NonNull<T>, AllocError> {
        const {
            assert!(
                align_of::<T>() <= ALIGNMENT,
                "payload type requires a larger alignment than this storage provides"
            );
            assert!(
                !std::mem::needs_drop::<T>(),
                "payloads are freed as raw bytes and must not need drop"
            );
        }

        let payload: NonNull<u8> = self.insert_bytes(size_of::<T>())?;
        let typed: NonNull<T> = payload.cast::<T>();

        // SAFETY: the payload region has the size of `T` and at least its
        // alignment, and is uninitialized.
        unsafe { typed.write(value) };

        Ok(typed)
    }

    /// Allocate a node with `size` uninitialized payload bytes and link
    /// it at the end of the private sublist.
    ///
    /// # Errors
    ///
    /// [`AllocError`] if the allocation fails; the producer is unchanged.
    pub fn insert_bytes(&mut self, size: usize) -> Result<NonNull<u8>, AllocError> {
        let node: NonNull<Node<ALIGNMENT>> = Node::alloc(size)?;

        if let Some(tail) = NonNull::new(self.tail) {
            // SAFETY: the current tail is producer-private; nothing else
            // can observe this link until publish.
            unsafe { tail.as_ref().next.store(node.as_ptr(), RELAXED) };
        } else {
            self.head = node.as_ptr();
        }
        self.tail = node.as_ptr();
        self.len += 1;

        // SAFETY: freshly allocated node.
        Ok(unsafe { node.as_ref().payload() })
    }

    /// Hand the private sublist to the storage. No-op when empty; may be
    /// called any number of times.
    pub fn publish(&mut self) {
        let Some(head) = NonNull::new(self.head) else {
            return;
        };
        // head and tail are linked together, so tail is non-null too.
        let Some(tail) = NonNull::new(self.tail) else {
            unreachable!("non-empty producer with null tail");
        };

        self.storage.publish(Batch {
            head,
            tail,
            len: self.len,
        });

        self.head = StdPtr::null_mut();
        self.tail = StdPtr::null_mut();
        self.len = 0;
    }

    /// Pending (unpublished) node count.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the private sublist is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl<const ALIGNMENT: usize> Drop for Producer<'_, ALIGNMENT> {
    /// Publishes any pending nodes, making them globally visible.
    fn drop(&mut self) {
        self.publish();
    }
}
