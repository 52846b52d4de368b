//! Standard memory orderings for concurrent list access.
//!
//! These constants ensure consistent ordering usage across the codebase
//! and make the intent clear at each access point.

use std::sync::atomic::Ordering;

/// Ordering for the iterator's loads of `head` and node links.
/// Pairs with the publisher's Release stores.
pub const READ_ORD: Ordering = Ordering::Acquire;

/// Ordering for stores that make nodes reachable (or unreachable).
/// Pairs with the iterator's Acquire loads.
pub const WRITE_ORD: Ordering = Ordering::Release;

/// Ordering for claiming an exclusive slot (the single-iterator flag).
pub const CLAIM_ORD: Ordering = Ordering::AcqRel;

/// Ordering for counters and producer-private link writes.
/// Safe because publication provides the synchronization.
pub const RELAXED: Ordering = Ordering::Relaxed;
