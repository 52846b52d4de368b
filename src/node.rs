//! Variably-sized list cell backing [`Storage`](crate::storage::Storage).
//!
//! A node is a single heap allocation with three regions: the `#[repr(C)]`
//! header below, padding up to `ALIGNMENT`, and the payload bytes. The node
//! records only the payload's size, never its type; freeing a node releases
//! bytes without running any payload drop glue.
//!
//! Payload addresses are stable for the node's lifetime.

use std::alloc as StdAlloc;
use std::alloc::Layout;
use std::ptr::NonNull;
use std::ptr as StdPtr;
use std::sync::atomic::AtomicPtr;

use crate::storage::AllocError;

/// One list cell. `ALIGNMENT` is the payload alignment fixed at
/// [`Storage`](crate::storage::Storage) construction and must be a power
/// of two (checked at compile time).
#[repr(C)]
pub(crate) struct Node<const ALIGNMENT: usize> {
    /// Forward link. Null terminates the list.
    ///
    /// Written with Relaxed while the node is producer-private, with
    /// Release once the store makes other nodes reachable or unreachable.
    pub(crate) next: AtomicPtr<Node<ALIGNMENT>>,

    /// Payload byte count, kept to reconstruct the allocation [`Layout`]
    /// at free time.
    payload_size: usize,
}

impl<const ALIGNMENT: usize> Node<ALIGNMENT> {
    /// Byte offset of the payload region from the node base.
    ///
    /// The node base is aligned to [`Self::ALLOC_ALIGN`], a multiple of
    /// `ALIGNMENT`, so an offset that is itself a multiple of `ALIGNMENT`
    /// keeps every payload aligned.
    pub(crate) const PAYLOAD_OFFSET: usize = {
        assert!(ALIGNMENT.is_power_of_two(), "ALIGNMENT must be a power of two");
        size_of::<Self>().next_multiple_of(ALIGNMENT)
    };

    /// Alignment of the whole allocation.
    const ALLOC_ALIGN: usize = if ALIGNMENT > align_of::<Self>() {
        ALIGNMENT
    } else {
        align_of::<Self>()
    };

    /// Allocate a node with room for `payload_size` payload bytes.
    ///
    /// The payload region is left uninitialized; the link is null. No
    /// partially-initialized node is ever observable because the pointer
    /// is returned only after the header write completes.
    ///
    /// # Errors
    ///
    /// [`AllocError::LayoutOverflow`] if the total size overflows a valid
    /// [`Layout`], [`AllocError::OutOfMemory`] if the system allocator
    /// returns null.
    pub(crate) fn alloc(payload_size: usize) -> Result<NonNull<Self>, AllocError> {
        let size: usize = Self::PAYLOAD_OFFSET
            .checked_add(payload_size)
            .ok_or(AllocError::LayoutOverflow)?;
        let layout =
            Layout::from_size_align(size, Self::ALLOC_ALIGN).map_err(|_| AllocError::LayoutOverflow)?;

        // SAFETY: `layout` has non-zero size (the header alone is non-zero).
        let raw: *mut u8 = unsafe { StdAlloc::alloc(layout) };
        let Some(node) = NonNull::new(raw.cast::<Self>()) else {
            return Err(AllocError::OutOfMemory);
        };

        // SAFETY: `node` is freshly allocated with room and alignment for
        // the header.
        unsafe {
            node.write(Self {
                next: AtomicPtr::new(StdPtr::null_mut()),
                payload_size,
            });
        }

        Ok(node)
    }

    /// Free a node allocated by [`Self::alloc`].
    ///
    /// # Safety
    ///
    /// `node` must have come from [`Self::alloc`] with the same `ALIGNMENT`,
    /// must not have been freed already, and must be unreachable from any
    /// list. The payload is released as raw bytes.
    pub(crate) unsafe fn free(node: NonNull<Self>) {
        // SAFETY: caller guarantees the node is live; the header is
        // readable until the dealloc below.
        let payload_size: usize = unsafe { node.as_ref().payload_size };
        let size: usize = Self::PAYLOAD_OFFSET + payload_size;

        // SAFETY: same size/align pair that alloc() validated.
        let layout = unsafe { Layout::from_size_align_unchecked(size, Self::ALLOC_ALIGN) };

        // SAFETY: allocation came from the global allocator with this layout.
        unsafe { StdAlloc::dealloc(node.as_ptr().cast::<u8>(), layout) };
    }

    /// Stable pointer to the payload bytes.
    #[inline]
    pub(crate) fn payload(&self) -> NonNull<u8> {
        // SAFETY: the payload region lives PAYLOAD_OFFSET bytes past the
        // node base within the same allocation.
        unsafe { NonNull::from(self).cast::<u8>().add(Self::PAYLOAD_OFFSET) }
    }

    /// Payload byte count this node was allocated with.
    #[inline]
    pub(crate) fn payload_size(&self) -> usize {
        self.payload_size
    }
}
