//! Filepath: src/factory.rs
//!
//! Typed object/array facade over [`Storage`].
//!
//! An [`ObjectFactory`] allocates managed-runtime objects and arrays on
//! behalf of mutator threads. Each thread builds its allocations through
//! a [`ThreadQueue`] (a [`Producer`] plus typed helpers) and publishes
//! them in batches; the collector walks the live set through
//! [`FactoryIter`], which tells objects from arrays by the descriptor
//! stored in each payload's header.
//!
//! Payloads are plain bytes: a header ([`ObjHeader`] or [`ArrayHeader`])
//! followed by the zero-initialized body or elements. Erasing a payload
//! releases its bytes; there is no per-object drop glue.

use std::fmt as StdFmt;
use std::marker::PhantomData;
use std::ptr::NonNull;

use crate::storage::{AllocError, Iter, Producer, Storage};

pub mod header;

pub use header::{ArrayHeader, ObjHeader, TypeInfo};

/// The platform's max fundamental alignment; every payload the factory
/// hands out honors it, so any object field layout is representable.
pub const MAX_FUNDAMENTAL_ALIGNMENT: usize = align_of::<u128>();

// ============================================================================
//  ObjectFactory
// ============================================================================

/// Allocation-and-enumeration substrate for a garbage-collected runtime.
///
/// A runtime typically owns exactly one. There is no process-wide state;
/// independent factories do not interact.
///
/// # Example
///
/// ```
/// use objfactory::{ObjectFactory, TypeInfo};
///
/// static POINT: TypeInfo = TypeInfo::for_object(16);
///
/// let factory = ObjectFactory::new();
/// let mut queue = factory.thread_queue();
/// queue.create_object(&POINT).unwrap();
/// queue.publish();
///
/// let iter = factory.iter();
/// assert!(!iter.current().unwrap().is_array());
/// ```
pub struct ObjectFactory {
    storage: Storage<MAX_FUNDAMENTAL_ALIGNMENT>,
}

impl ObjectFactory {
    /// Create an empty factory.
    #[must_use]
    pub fn new() -> Self {
        Self {
            storage: Storage::new(),
        }
    }

    /// Create a thread-local allocation queue bound to this factory.
    #[must_use]
    pub fn thread_queue(&self) -> ThreadQueue<'_> {
        ThreadQueue {
            producer: self.storage.producer(),
        }
    }

    /// Return the sole iterator over published objects and arrays.
    ///
    /// # Panics
    ///
    /// Panics if another iterator is already live.
    #[must_use]
    pub fn iter(&self) -> FactoryIter<'_> {
        FactoryIter {
            iter: self.storage.iter(),
        }
    }

    /// Published payload count; see [`Storage::len_approx`].
    #[must_use]
    pub fn len_approx(&self) -> usize {
        self.storage.len_approx()
    }
}

impl Default for ObjectFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl StdFmt::Debug for ObjectFactory {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        f.debug_struct("ObjectFactory")
            .field("len_approx", &self.len_approx())
            .finish()
    }
}

// ============================================================================
//  ThreadQueue
// ============================================================================

/// Per-thread allocation queue: a [`Producer`] plus typed helpers.
///
/// Allocations are invisible to the collector until [`Self::publish`];
/// dropping the queue publishes whatever is pending.
pub struct ThreadQueue<'f> {
    producer: Producer<'f, MAX_FUNDAMENTAL_ALIGNMENT>,
}

impl ThreadQueue<'_> {
    /// Allocate an object payload: an [`ObjHeader`] carrying `type_info`,
    /// followed by `instance_size` zeroed body bytes. Returns the header
    /// pointer, stable until the payload is erased.
    ///
    /// # Errors
    ///
    /// [`AllocError`] if the allocation fails.
    ///
    /// # Panics
    ///
    /// Panics if `type_info` is an array descriptor.
    pub fn create_object(
        &mut self,
        type_info: &'static TypeInfo,
    ) -> Result<NonNull<ObjHeader>, AllocError> {
        let size: usize = size_of::<ObjHeader>() + type_info.object_size();
        let payload: NonNull<u8> = self.producer.insert_bytes(size)?;

        // SAFETY: the payload region is `size` writable bytes at
        // MAX_FUNDAMENTAL_ALIGNMENT, which satisfies the header layout.
        unsafe {
            payload.write_bytes(0, size);
            let obj: NonNull<ObjHeader> = payload.cast::<ObjHeader>();
            obj.write(ObjHeader::new(type_info));
            Ok(obj)
        }
    }

    /// Allocate an array payload: an [`ArrayHeader`] carrying `type_info`
    /// and `count`, followed by `element_size * count` zeroed element
    /// bytes. Returns the header pointer, stable until the payload is
    /// erased.
    ///
    /// # Errors
    ///
    /// [`AllocError`] if the allocation fails or the element region
    /// overflows.
    ///
    /// # Panics
    ///
    /// Panics if `type_info` is an object descriptor.
    pub fn create_array(
        &mut self,
        type_info: &'static TypeInfo,
        count: u32,
    ) -> Result<NonNull<ArrayHeader>, AllocError> {
        let elements: usize = type_info
            .element_size()
            .checked_mul(count as usize)
            .ok_or(AllocError::LayoutOverflow)?;
        let size: usize = size_of::<ArrayHeader>()
            .checked_add(elements)
            .ok_or(AllocError::LayoutOverflow)?;
        let payload: NonNull<u8> = self.producer.insert_bytes(size)?;

        // SAFETY: as in create_object.
        unsafe {
            payload.write_bytes(0, size);
            let array: NonNull<ArrayHeader> = payload.cast::<ArrayHeader>();
            array.write(ArrayHeader::new(type_info, count));
            Ok(array)
        }
    }

    /// Make pending allocations visible to the collector.
    pub fn publish(&mut self) {
        self.producer.publish();
    }

    /// Pending (unpublished) allocation count.
    #[must_use]
    pub fn len(&self) -> usize {
        self.producer.len()
    }

    /// Whether nothing is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.producer.is_empty()
    }
}

// ============================================================================
//  FactoryIter
// ============================================================================

/// View of the payload under the cursor: either an object or an array,
/// discriminated by the descriptor in its header.
pub struct HeapRef<'a> {
    payload: NonNull<u8>,
    _marker: PhantomData<&'a ()>,
}

impl HeapRef<'_> {
    /// The descriptor stored in this payload's header.
    #[must_use]
    pub fn type_info(&self) -> &'static TypeInfo {
        // SAFETY: every factory payload starts with a header whose first
        // field is the `&'static` descriptor pointer (see header.rs).
        unsafe { &*self.payload.cast::<*const TypeInfo>().read() }
    }

    /// Whether this payload is an array.
    #[must_use]
    pub fn is_array(&self) -> bool {
        self.type_info().is_array()
    }

    /// The object header.
    ///
    /// # Panics
    ///
    /// Panics if this payload is an array.
    #[must_use]
    pub fn obj_header(&self) -> NonNull<ObjHeader> {
        assert!(!self.is_array(), "payload is an array, not an object");
        self.payload.cast::<ObjHeader>()
    }

    /// The array header.
    ///
    /// # Panics
    ///
    /// Panics if this payload is an object.
    #[must_use]
    pub fn array_header(&self) -> NonNull<ArrayHeader> {
        assert!(self.is_array(), "payload is an object, not an array");
        self.payload.cast::<ArrayHeader>()
    }
}

/// The collector's cursor: [`Iter`] plus header discrimination.
///
/// Single-reader and erase semantics are those of [`Iter`].
pub struct FactoryIter<'f> {
    iter: Iter<'f, MAX_FUNDAMENTAL_ALIGNMENT>,
}

impl FactoryIter<'_> {
    /// View the payload under the cursor, or `None` at end.
    #[must_use]
    pub fn current(&self) -> Option<HeapRef<'_>> {
        let node = self.iter.current()?;
        Some(HeapRef {
            payload: node.data(),
            _marker: PhantomData,
        })
    }

    /// Move the cursor to the successor.
    ///
    /// # Panics
    ///
    /// Panics past the end.
    pub fn advance(&mut self) {
        self.iter.advance();
    }

    /// Unlink and free the payload under the cursor, then move on.
    ///
    /// # Panics
    ///
    /// Panics past the end.
    pub fn erase_and_advance(&mut self) {
        self.iter.erase_and_advance();
    }
}
