//! Standard memory orderings for concurrent tuple access.
//!
//! These constants keep ordering usage consistent across the codebase
//! and make the intent clear at each access point.

use std::sync::atomic::Ordering;

/// Ordering for reading node fields during an optimistic snapshot.
/// Pairs with the writer's Release stores.
pub const READ_ORD: Ordering = Ordering::Acquire;

/// Ordering for writing node fields under the header lock.
/// Pairs with the reader's Acquire loads.
pub const WRITE_ORD: Ordering = Ordering::Release;

/// Ordering for the lock CAS on success.
pub const LOCK_SUCCESS: Ordering = Ordering::Acquire;

/// Ordering for the lock CAS on failure.
/// Only need to observe the current value to respin.
pub const LOCK_FAILURE: Ordering = Ordering::Relaxed;

/// Ordering for loads the header lock already serializes.
pub const RELAXED: Ordering = Ordering::Relaxed;

/// Ordering for the unlock store (counter increment + lock clear).
/// Must publish every payload store to waiting readers.
pub const UNLOCK_ORD: Ordering = Ordering::Release;
