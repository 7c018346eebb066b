//! Header word for optimistic concurrency control on a tuple node.
//!
//! [`HeaderWord`] combines the writer lock, node-shape flags, lifecycle
//! flags, and a modification counter in a single `AtomicU32`. Readers use
//! optimistic validation, writers acquire the lock bit.
//!
//! # Concurrency Model
//! 1. Readers: call [`HeaderWord::stable_version`] to capture a stable
//!    value, read the node fields, then call [`HeaderWord::check_version`].
//!    A mismatch means a writer completed in between; re-read.
//! 2. Writers: set the lock bit via CAS, mutate the node, then unlock.
//!    Unlock increments the counter and publishes with one release store.
//!
//! # Layout
//! Least significant bit first:
//!
//! | Bits  | Name       | Meaning                                        |
//! |-------|------------|------------------------------------------------|
//! | 0     | `locked`   | A writer holds the node.                       |
//! | 1     | `big`      | Node carries a chain pointer slot.             |
//! | 2     | `deleted`  | Node has been handed to the reclaimer.         |
//! | 3     | `enqueued` | Reserved; preserved across updates, never set. |
//! | 4     | `latest`   | Node is the chain head the index points at.    |
//! | 5..31 | `counter`  | Modification counter, bumped on every unlock.  |
//!
//! The counter wraps modulo 2^27. A reader that stalls across ~134M
//! modifications of one node could validate a recycled counter value;
//! that ABA window is an accepted risk of the encoding.

use std::fmt;
use std::sync::atomic::{AtomicU32, fence};

use crate::counters;
use crate::ordering::{LOCK_FAILURE, LOCK_SUCCESS, READ_ORD, RELAXED, UNLOCK_ORD, WRITE_ORD};

/// Lock bit: a writer holds the node.
const LOCKED_BIT: u32 = 1 << 0;

/// Type bit: node has a chain pointer slot (big) or not (small).
const BIG_BIT: u32 = 1 << 1;

/// Deleted bit: node is queued for (or has undergone) destruction.
const DELETED_BIT: u32 = 1 << 2;

/// Enqueued bit: reserved. Preserved by every update, never interpreted.
const ENQUEUED_BIT: u32 = 1 << 3;

/// Latest bit: node is the chain head.
const LATEST_BIT: u32 = 1 << 4;

/// First bit of the modification counter.
const COUNTER_SHIFT: u32 = 5;

/// Mask covering the modification counter (bits 5..31).
const COUNTER_MASK: u32 = !0u32 << COUNTER_SHIFT;

// ============================================================================
//  HeaderValue
// ============================================================================

/// A captured header value.
///
/// Obtained from [`HeaderWord::stable_version`] (lock bit guaranteed
/// clear) or [`HeaderWord::unstable_version`] (raw load). Decoding a
/// captured value never touches the atomic again, so a reader can test
/// flags from the same instant it will later validate with
/// [`HeaderWord::check_version`].
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct HeaderValue(u32);

impl HeaderValue {
    /// Whether the lock bit is set in this captured value.
    #[inline]
    #[must_use]
    pub const fn is_locked(self) -> bool {
        self.0 & LOCKED_BIT != 0
    }

    /// Whether this node carries a chain pointer slot.
    #[inline]
    #[must_use]
    pub const fn is_big(self) -> bool {
        self.0 & BIG_BIT != 0
    }

    /// Whether this node is a small (pointerless) node.
    #[inline]
    #[must_use]
    pub const fn is_small(self) -> bool {
        !self.is_big()
    }

    /// Whether the node was handed to the reclaimer.
    #[inline]
    #[must_use]
    pub const fn is_deleted(self) -> bool {
        self.0 & DELETED_BIT != 0
    }

    /// Whether the reserved enqueued bit is set.
    #[inline]
    #[must_use]
    pub const fn is_enqueued(self) -> bool {
        self.0 & ENQUEUED_BIT != 0
    }

    /// Whether this node is the chain head.
    #[inline]
    #[must_use]
    pub const fn is_latest(self) -> bool {
        self.0 & LATEST_BIT != 0
    }

    /// The modification counter (27 bits, wraps).
    #[inline]
    #[must_use]
    pub const fn counter(self) -> u32 {
        (self.0 & COUNTER_MASK) >> COUNTER_SHIFT
    }

    /// The raw bits. For diagnostics only.
    #[inline]
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Debug for HeaderValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for HeaderValue {
    /// Renders as `[locked | big | deleted | enqueued | latest | counter=N]`
    /// with absent flags shown as `-`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let flag = |set: bool, name: &'static str| if set { name } else { "-" };
        write!(
            f,
            "[{} | {} | {} | {} | {} | counter={}]",
            flag(self.is_locked(), "locked"),
            if self.is_big() { "big" } else { "small" },
            flag(self.is_deleted(), "deleted"),
            flag(self.is_enqueued(), "enqueued"),
            flag(self.is_latest(), "latest"),
            self.counter(),
        )
    }
}

// ============================================================================
//  HeaderWord
// ============================================================================

/// The atomic control word of a tuple node.
///
/// All cross-thread coordination on a node goes through this word: the
/// writer lock, the shape and lifecycle flags, and the counter readers
/// validate against.
pub struct HeaderWord {
    value: AtomicU32,
}

impl HeaderWord {
    /// Create a header for a freshly allocated node.
    ///
    /// `big` is fixed for the node's lifetime; `latest` reflects whether
    /// the node is born as the chain head.
    #[inline]
    pub(crate) const fn new(big: bool, latest: bool) -> Self {
        let mut v = 0;
        if big {
            v |= BIG_BIT;
        }
        if latest {
            v |= LATEST_BIT;
        }
        Self {
            value: AtomicU32::new(v),
        }
    }

    // ========================================================================
    //  Flag queries
    // ========================================================================

    /// Whether a writer currently holds the node.
    #[inline]
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.unstable_version().is_locked()
    }

    /// Whether this node carries a chain pointer slot.
    #[inline]
    #[must_use]
    pub fn is_big(&self) -> bool {
        self.unstable_version().is_big()
    }

    /// Whether this node is a small (pointerless) node.
    #[inline]
    #[must_use]
    pub fn is_small(&self) -> bool {
        !self.is_big()
    }

    /// Whether the node has been handed to the reclaimer.
    #[inline]
    #[must_use]
    pub fn is_deleted(&self) -> bool {
        self.unstable_version().is_deleted()
    }

    /// Whether the reserved enqueued bit is set.
    #[inline]
    #[must_use]
    pub fn is_enqueued(&self) -> bool {
        self.unstable_version().is_enqueued()
    }

    /// Whether this node is the chain head.
    #[inline]
    #[must_use]
    pub fn is_latest(&self) -> bool {
        self.unstable_version().is_latest()
    }

    // ========================================================================
    //  Optimistic read protocol
    // ========================================================================

    /// Capture a stable header value, spinning while the lock is held.
    ///
    /// The returned value has the lock bit clear. The acquire fence pairs
    /// with the writer's release unlock: every field store the observed
    /// unlock published is visible to loads after this call.
    #[must_use]
    pub fn stable_version(&self) -> HeaderValue {
        let mut spins: u64 = 0;
        let mut v: u32 = self.value.load(RELAXED);
        while v & LOCKED_BIT != 0 {
            std::hint::spin_loop();
            spins += 1;
            v = self.value.load(RELAXED);
        }
        fence(READ_ORD);
        counters::note_stable_version_spins(spins);
        HeaderValue(v)
    }

    /// Bounded variant of [`stable_version`](Self::stable_version).
    ///
    /// Returns `None` if the lock is still held after `spins` re-reads,
    /// so a contending caller can make a different decision instead of
    /// waiting.
    #[must_use]
    pub fn try_stable_version(&self, spins: u32) -> Option<HeaderValue> {
        let mut budget: u32 = spins;
        let mut v: u32 = self.value.load(RELAXED);
        while v & LOCKED_BIT != 0 {
            if budget == 0 {
                return None;
            }
            std::hint::spin_loop();
            budget -= 1;
            v = self.value.load(RELAXED);
        }
        fence(READ_ORD);
        Some(HeaderValue(v))
    }

    /// Raw header load with no stability guarantee.
    ///
    /// The lock bit may be set in the returned value. Useful to the lock
    /// holder (its own writes cannot race it) and for diagnostics.
    #[inline]
    #[must_use]
    pub fn unstable_version(&self) -> HeaderValue {
        HeaderValue(self.value.load(RELAXED))
    }

    /// Validate a previously captured header value.
    ///
    /// Returns true iff no writer completed (and none is in progress)
    /// since `v` was captured: field reads made between the capture and
    /// this call observed a consistent node. The acquire load keeps
    /// those field reads from drifting past the re-check.
    #[must_use]
    pub fn check_version(&self, v: HeaderValue) -> bool {
        self.value.load(READ_ORD) == v.0
    }

    // ========================================================================
    //  Writer lock
    // ========================================================================

    /// Acquire the writer lock, spinning until free.
    ///
    /// Returns the header value as observed with the lock bit set.
    pub(crate) fn lock(&self) -> HeaderValue {
        let mut spins: u64 = 0;
        loop {
            let v: u32 = self.value.load(RELAXED);
            debug_assert!(v & DELETED_BIT == 0, "locking a deleted node");
            if v & LOCKED_BIT == 0
                && self
                    .value
                    .compare_exchange_weak(v, v | LOCKED_BIT, LOCK_SUCCESS, LOCK_FAILURE)
                    .is_ok()
            {
                counters::note_lock_acquire_spins(spins);
                return HeaderValue(v | LOCKED_BIT);
            }
            spins += 1;
            std::hint::spin_loop();
        }
    }

    /// Release the writer lock.
    ///
    /// Must be called by the lock holder. Increments the modification
    /// counter (wrapping in its 27 bits) and clears the lock bit in one
    /// release store, publishing every preceding field write.
    pub(crate) fn unlock(&self) {
        let v: u32 = self.value.load(RELAXED);
        debug_assert!(v & LOCKED_BIT != 0, "unlock without holding the lock");
        let bumped: u32 = HeaderValue(v).counter().wrapping_add(1);
        let mut out: u32 = v & !(COUNTER_MASK | LOCKED_BIT);
        out |= (bumped << COUNTER_SHIFT) & COUNTER_MASK;
        self.value.store(out, UNLOCK_ORD);
    }

    // ========================================================================
    //  Flag updates
    // ========================================================================

    /// Set or clear the latest bit. Caller must hold the lock.
    pub(crate) fn set_latest(&self, latest: bool) {
        let v: u32 = self.value.load(RELAXED);
        debug_assert!(v & LOCKED_BIT != 0, "latest toggled without the lock");
        let out: u32 = if latest {
            v | LATEST_BIT
        } else {
            v & !LATEST_BIT
        };
        self.value.store(out, WRITE_ORD);
    }

    /// Mark the node deleted, immediately before handing it to the
    /// reclaimer.
    ///
    /// Set exactly once, without the lock: at this point the index no
    /// longer reaches the node, so no writer can contend. Readers still
    /// traversing the chain may observe the bit; it does not change what
    /// they read.
    pub(crate) fn mark_deleted(&self) {
        let v: u32 = self.value.load(RELAXED);
        debug_assert!(v & DELETED_BIT == 0, "deleted bit set twice");
        debug_assert!(v & ENQUEUED_BIT == 0, "enqueued and deleted are exclusive");
        self.value.store(v | DELETED_BIT, WRITE_ORD);
    }
}

impl fmt::Debug for HeaderWord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("HeaderWord")
            .field(&self.unstable_version())
            .finish()
    }
}

// ============================================================================
//  Test submodules
// ============================================================================
