//! # objfactory
//!
//! A concurrent object factory: the allocation-and-enumeration substrate
//! of a garbage-collected runtime.
//!
//! Mutator threads allocate heap objects at low overhead through
//! thread-local batches; a single collector thread walks the global live
//! set and selectively evicts entries, all without stopping the mutators.
//!
//! ## Design
//!
//! The storage layer is a singly-linked list of variably-sized, aligned
//! nodes:
//!
//! - Each [`Producer`] builds a private sublist with no synchronization
//!   and splices it in atomically on publish (one Release store under a
//!   short mutex; allocation itself never contends).
//! - The sole [`Iter`] walks forward with Acquire loads and can unlink
//!   nodes in place; erasing the tail is the only point where it
//!   coordinates with publishers.
//! - Batches never interleave, inserts within one producer keep their
//!   order, and an erased node is freed immediately: the single reader
//!   is the only eraser, so no deferred reclamation is needed.
//!
//! The [`ObjectFactory`] adapter sits on top at the platform's max
//! fundamental alignment, discriminating objects from arrays by the sign
//! of the descriptor's `instance_size`.
//!
//! ## Concurrency
//!
//! - N producers in parallel, each touching only its private sublist.
//! - Publication serialized; traversal lock-free.
//! - At most one iterator at a time (asserted).

mod node;
mod ordering;
mod tracing_helpers;

pub mod factory;
pub mod storage;

pub use factory::{
    ArrayHeader, FactoryIter, HeapRef, MAX_FUNDAMENTAL_ALIGNMENT, ObjHeader, ObjectFactory,
    ThreadQueue, TypeInfo,
};
pub use storage::{AllocError, Iter, NodeRef, Producer, Storage, debug_counters, reset_debug_counters};
