//! The versioned record node an MVCC index points at.
//!
//! A [`Tuple`] is one cell: the record's current payload plus the head
//! of a chain of prior versions, newest first. The cell is a single raw
//! allocation — control word, TID, sizes, an optional chain pointer, and
//! the inline payload buffer — so the common small record costs one
//! pointer dereference and no separate value allocation.
//!
//! # Layout
//!
//! ```text
//! [ hdr | size | alloc_size | version | (next) | payload[alloc_size] ]
//!   u32   u16      u16          u64      ptr         bytes
//! ```
//!
//! The `next` slot exists only on *big* nodes. A *small* node saves that
//! word; the price is that it can never grow a history in place — the
//! first preserved overwrite replaces it with a big head (see
//! [`TupleGuard::write_record_at`]).
//!
//! # Protocol
//!
//! Readers never lock. They capture a stable header, read fields, copy
//! the payload, and re-validate; any completed write bumps the header
//! counter and the snapshot is retried. Writers serialize on the header
//! lock bit and publish with the single release store in unlock.
//!
//! Nodes behind the head are immutable from the moment they are linked
//! until the reclaimer frees them, so the chain walk only validates the
//! node it is currently reading.

use std::alloc::{Layout, alloc_zeroed, handle_alloc_error};
use std::fmt;
use std::marker::PhantomData;
use std::mem;
use std::ptr::{self, NonNull};
use std::sync::atomic::{AtomicPtr, AtomicU16, AtomicU64};

use seize::LocalGuard;

use crate::counters;
use crate::header::{HeaderValue, HeaderWord};
use crate::ordering::{READ_ORD, RELAXED, WRITE_ORD};
use crate::policy::OverwritePolicy;
use crate::tracing_helpers::trace_log;

mod reclaim;

/// Transaction identifier. Opaque to this crate; ordered by the
/// transaction manager.
pub type Tid = u64;

/// The smallest TID. Doubles as the synthetic "deleted since forever"
/// version reported when a read walks off the chain tail. Wrong under
/// TID wrap-around; wrap is not implemented, and this constant is the
/// single place the sentinel lives.
pub const MIN_TID: Tid = 0;

/// The largest TID.
pub const MAX_TID: Tid = u64::MAX;

/// Payload lengths are stored as `u16`; this is the hard ceiling for
/// both `size` and `alloc_size`.
pub const MAX_PAYLOAD: usize = u16::MAX as usize;

/// Allocation sizes round up to multiples of 16 bytes (2^4). The
/// allocator would bucket that way internally anyway, so the node takes
/// the whole class and grows `alloc_size` to match.
const SIZE_CLASS: usize = 1 << 4;

/// Spin budget for the bounded stable-header queries.
const BOUNDED_SPINS: u32 = 16;

/// Fixed prefix common to both node shapes.
const PREFIX_SIZE: usize = mem::size_of::<Tuple>();

/// Extra bytes a big node spends on its chain pointer slot.
const NEXT_SLOT_SIZE: usize = mem::size_of::<AtomicPtr<Tuple>>();

/// Round a block size up to its size class.
#[inline]
const fn round_up_size_class(n: usize) -> usize {
    (n + (SIZE_CLASS - 1)) & !(SIZE_CLASS - 1)
}

#[inline]
const fn next_slot_contrib(big: bool) -> usize {
    if big { NEXT_SLOT_SIZE } else { 0 }
}

/// Largest legal block for a node shape.
#[inline]
const fn max_block_size(big: bool) -> usize {
    MAX_PAYLOAD + PREFIX_SIZE + next_slot_contrib(big)
}

#[inline]
fn block_layout(block: usize) -> Layout {
    // align_of::<Tuple>() is 8 and block is far below isize::MAX.
    Layout::from_size_align(block, mem::align_of::<Tuple>()).expect("node block layout")
}

// ============================================================================
//  Tuple
// ============================================================================

/// One versioned record cell.
///
/// Only ever lives behind a pointer into a raw block allocated by
/// [`Tuple::alloc_first`] or [`Tuple::alloc`]; the struct itself is just
/// the fixed prefix of that block. Never constructed or moved by value.
#[repr(C)]
pub struct Tuple {
    /// Control word: lock, shape, lifecycle flags, modification counter.
    hdr: HeaderWord,

    /// Live payload length. Zero means logically deleted at `version`.
    size: AtomicU16,

    /// Inline buffer capacity. Fixed at allocation.
    alloc_size: u16,

    /// The TID this node's payload was installed at.
    version: AtomicU64,
}

impl Tuple {
    // ========================================================================
    //  Allocation
    // ========================================================================

    /// Allocate a fresh, empty cell: the head a brand-new index entry
    /// points at.
    ///
    /// The node starts logically deleted (`size = 0`) at [`MIN_TID`],
    /// with `latest` set. `requested_capacity` is rounded up to the
    /// block's size class; the actual capacity is whatever the rounded
    /// block holds.
    ///
    /// Aborts the process on allocation failure.
    #[must_use]
    pub fn alloc_first(big: bool, requested_capacity: usize) -> NonNull<Tuple> {
        debug_assert!(requested_capacity <= MAX_PAYLOAD);
        let contrib: usize = next_slot_contrib(big);
        let block: usize = round_up_size_class(PREFIX_SIZE + contrib + requested_capacity)
            .min(max_block_size(big));
        let alloc_size: usize = block - PREFIX_SIZE - contrib;
        debug_assert!(alloc_size >= requested_capacity || alloc_size == MAX_PAYLOAD);

        let node: NonNull<Tuple> = Self::alloc_block(block);
        // alloc_size <= MAX_PAYLOAD by the min() above.
        #[allow(clippy::cast_possible_truncation)]
        let alloc_size: u16 = alloc_size as u16;
        // SAFETY: `node` is a fresh, exclusively owned block of `block`
        // bytes; the prefix and the optional pointer slot lie inside it.
        unsafe {
            node.as_ptr().write(Tuple {
                hdr: HeaderWord::new(big, true),
                size: AtomicU16::new(0),
                alloc_size,
                version: AtomicU64::new(MIN_TID),
            });
            if big {
                node.as_ptr()
                    .cast::<u8>()
                    .add(PREFIX_SIZE)
                    .cast::<AtomicPtr<Tuple>>()
                    .write(AtomicPtr::new(ptr::null_mut()));
            }
        }
        counters::note_create();
        counters::note_bytes_allocated(block as u64);
        node
    }

    /// Allocate a populated node: a replacement head or a spill node.
    ///
    /// Always big. `next` becomes the node's chain pointer (may be
    /// null); `set_latest` decides whether the node is born as a head.
    ///
    /// Aborts the process on allocation failure.
    #[must_use]
    pub fn alloc(
        version: Tid,
        payload: &[u8],
        next: *mut Tuple,
        set_latest: bool,
    ) -> NonNull<Tuple> {
        let sz: usize = payload.len();
        debug_assert!(sz <= MAX_PAYLOAD);
        let block: usize =
            round_up_size_class(PREFIX_SIZE + NEXT_SLOT_SIZE + sz).min(max_block_size(true));
        let alloc_size: usize = block - PREFIX_SIZE - NEXT_SLOT_SIZE;
        debug_assert!(sz <= alloc_size);

        let node: NonNull<Tuple> = Self::alloc_block(block);
        // Both bounded by MAX_PAYLOAD: sz by the assert, alloc_size by min().
        #[allow(clippy::cast_possible_truncation)]
        let (sz16, alloc_size): (u16, u16) = (sz as u16, alloc_size as u16);
        // SAFETY: fresh exclusive block; prefix, pointer slot, and the
        // first `sz` payload bytes all lie inside its `block` bytes.
        unsafe {
            node.as_ptr().write(Tuple {
                hdr: HeaderWord::new(true, set_latest),
                size: AtomicU16::new(sz16),
                alloc_size,
                version: AtomicU64::new(version),
            });
            let base: *mut u8 = node.as_ptr().cast::<u8>();
            base.add(PREFIX_SIZE)
                .cast::<AtomicPtr<Tuple>>()
                .write(AtomicPtr::new(next));
            ptr::copy_nonoverlapping(
                payload.as_ptr(),
                base.add(PREFIX_SIZE + NEXT_SLOT_SIZE),
                sz,
            );
        }
        counters::note_create();
        counters::note_bytes_allocated(block as u64);
        node
    }

    /// Allocate one zeroed block. Zeroing keeps every payload byte
    /// initialized, so optimistic readers may copy the full buffer even
    /// when they race a size change.
    fn alloc_block(block: usize) -> NonNull<Tuple> {
        let layout: Layout = block_layout(block);
        // SAFETY: layout has nonzero size (the prefix alone is nonzero).
        let raw: *mut u8 = unsafe { alloc_zeroed(layout) };
        match NonNull::new(raw.cast::<Tuple>()) {
            Some(node) => node,
            None => handle_alloc_error(layout),
        }
    }

    // ========================================================================
    //  Field access
    // ========================================================================

    /// Bytes in the fixed part of this node: prefix plus the pointer
    /// slot if present.
    #[inline]
    #[must_use]
    pub fn base_size(&self) -> usize {
        PREFIX_SIZE + next_slot_contrib(self.hdr.is_big())
    }

    /// Inline buffer capacity in bytes.
    #[inline]
    #[must_use]
    pub fn alloc_size(&self) -> usize {
        usize::from(self.alloc_size)
    }

    /// Current payload length. Unstable: pair with the optimistic
    /// protocol (or the lock) for a consistent view.
    #[inline]
    #[must_use]
    pub fn size(&self) -> usize {
        usize::from(self.size.load(RELAXED))
    }

    /// The TID of the current version. Unstable, like [`size`](Self::size).
    #[inline]
    #[must_use]
    pub fn version(&self) -> Tid {
        self.version.load(RELAXED)
    }

    #[inline]
    fn base_ptr(&self) -> *const u8 {
        ptr::from_ref(self).cast::<u8>()
    }

    /// The chain pointer slot. Big nodes only.
    #[inline]
    fn next_slot(&self) -> &AtomicPtr<Tuple> {
        debug_assert!(self.hdr.is_big(), "small nodes have no chain pointer");
        // SAFETY: big nodes allocate the slot directly after the prefix
        // and initialize it at construction; alignment is the block's 8.
        unsafe { &*self.base_ptr().add(PREFIX_SIZE).cast::<AtomicPtr<Tuple>>() }
    }

    /// The next older node as captured under header value `v`, or null
    /// for a small node or a chain tail.
    #[inline]
    #[must_use]
    pub fn get_next(&self, v: HeaderValue) -> *mut Tuple {
        debug_assert_eq!(v.is_big(), self.hdr.is_big());
        if v.is_big() {
            self.next_slot().load(READ_ORD)
        } else {
            ptr::null_mut()
        }
    }

    /// The next older node, or null. Convenience for callers that hold
    /// the lock or otherwise do not need a validated header.
    #[inline]
    #[must_use]
    pub fn get_next_raw(&self) -> *mut Tuple {
        if self.hdr.is_big() {
            self.next_slot().load(READ_ORD)
        } else {
            ptr::null_mut()
        }
    }

    /// Null out the chain pointer. No-op on small nodes.
    ///
    /// Unlinks the tail without releasing it; the caller owns whatever
    /// the pointer referenced.
    pub fn clear_next(&self) {
        if self.hdr.is_big() {
            self.next_slot().store(ptr::null_mut(), WRITE_ORD);
        }
    }

    #[inline]
    fn payload_ptr(&self, v: HeaderValue) -> *const u8 {
        debug_assert_eq!(v.is_big(), self.hdr.is_big());
        // SAFETY: the payload region starts right after the fixed part
        // and stays inside the node's single allocation.
        unsafe { self.base_ptr().add(PREFIX_SIZE + next_slot_contrib(v.is_big())) }
    }

    // ========================================================================
    //  Header passthroughs
    // ========================================================================

    /// Capture a stable header value (spins while a writer holds the
    /// node). See [`HeaderWord::stable_version`].
    #[inline]
    #[must_use]
    pub fn stable_version(&self) -> HeaderValue {
        self.hdr.stable_version()
    }

    /// Bounded [`stable_version`](Self::stable_version); `None` if the
    /// writer did not finish within the spin budget.
    #[inline]
    #[must_use]
    pub fn try_stable_version(&self, spins: u32) -> Option<HeaderValue> {
        self.hdr.try_stable_version(spins)
    }

    /// Raw header load; the lock bit may be set.
    #[inline]
    #[must_use]
    pub fn unstable_version(&self) -> HeaderValue {
        self.hdr.unstable_version()
    }

    /// Validate a captured header value. See [`HeaderWord::check_version`].
    #[inline]
    #[must_use]
    pub fn check_version(&self, v: HeaderValue) -> bool {
        self.hdr.check_version(v)
    }

    /// Whether a writer currently holds this node.
    #[inline]
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.hdr.is_locked()
    }

    /// Whether this node carries a chain pointer slot.
    #[inline]
    #[must_use]
    pub fn is_big(&self) -> bool {
        self.hdr.is_big()
    }

    /// Whether this node is a small (pointerless) node.
    #[inline]
    #[must_use]
    pub fn is_small(&self) -> bool {
        self.hdr.is_small()
    }

    /// Whether this node has been handed to the reclaimer.
    #[inline]
    #[must_use]
    pub fn is_deleted(&self) -> bool {
        self.hdr.is_deleted()
    }

    /// Whether the reserved enqueued bit is set.
    #[inline]
    #[must_use]
    pub fn is_enqueued(&self) -> bool {
        self.hdr.is_enqueued()
    }

    /// Whether this node is the chain head.
    #[inline]
    #[must_use]
    pub fn is_latest(&self) -> bool {
        self.hdr.is_latest()
    }

    // ========================================================================
    //  Writer lock
    // ========================================================================

    /// Acquire the writer lock, spinning until free.
    ///
    /// Only the chain head is lockable; non-head nodes are immutable and
    /// protected by the head's lock.
    #[must_use = "dropping the guard immediately releases the lock"]
    pub fn lock(&self) -> TupleGuard<'_> {
        self.hdr.lock();
        TupleGuard {
            tuple: self,
            _not_send: PhantomData,
        }
    }

    // ========================================================================
    //  Optimistic reads
    // ========================================================================

    /// Read the version visible at snapshot TID `t`.
    ///
    /// Copies up to `max_len` payload bytes into `out` and returns the
    /// TID the returned version was installed at. Walking off the chain
    /// tail yields `Some(MIN_TID)` with `out` empty: the record is
    /// deleted for that snapshot. Returns `None` when this node is no
    /// longer the chain head; the caller must restart from the index.
    ///
    /// The guard witnesses that the caller is inside an epoch: every
    /// node linked from this one stays allocated for the traversal.
    ///
    /// Calling this while holding this node's lock deadlocks.
    pub fn stable_read(
        &self,
        t: Tid,
        max_len: usize,
        out: &mut Vec<u8>,
        _guard: &LocalGuard<'_>,
    ) -> Option<Tid> {
        debug_assert!(max_len > 0);
        self.read_at(t, max_len, out, true)
    }

    /// The chain walk behind [`stable_read`](Self::stable_read).
    ///
    /// `require_latest` applies only to the entry node; once the walk
    /// descends, the nodes it visits are immutable and the check no
    /// longer applies.
    fn read_at(
        &self,
        t: Tid,
        max_len: usize,
        out: &mut Vec<u8>,
        mut require_latest: bool,
    ) -> Option<Tid> {
        let mut retries: u64 = 0;
        let mut node: &Tuple = self;

        loop {
            let v: HeaderValue = node.stable_version();
            let next: *mut Tuple = node.get_next(v);
            let version: Tid = node.version.load(READ_ORD);

            if version <= t {
                if require_latest && !v.is_latest() {
                    // The index has moved on; no point validating.
                    counters::note_read_retries(retries);
                    return None;
                }
                let len: usize = usize::from(node.size.load(READ_ORD)).min(max_len);
                out.clear();
                out.reserve(len);
                // SAFETY: the copy stays inside the node's zeroed
                // allocation (`len <= alloc_size`), and `out` has `len`
                // bytes of spare capacity. The copy may race an in-place
                // writer; check_version below throws away any snapshot
                // taken across a write, exactly like the header fields.
                unsafe {
                    ptr::copy_nonoverlapping(node.payload_ptr(v), out.as_mut_ptr(), len);
                    out.set_len(len);
                }
                if !node.check_version(v) {
                    retries += 1;
                    continue;
                }
                counters::note_read_retries(retries);
                return Some(version);
            }

            if !node.check_version(v) {
                retries += 1;
                continue;
            }

            if next.is_null() {
                // Off the tail: the reclaimer never frees a suffix still
                // visible to a live reader, so a missing older version
                // means the record did not exist at `t`.
                out.clear();
                counters::note_read_retries(retries);
                return Some(MIN_TID);
            }

            #[cfg(feature = "prefetch")]
            {
                crate::prefetch::prefetch_read(next.cast::<u8>());
            }

            // SAFETY: `next` was captured under a validated header of a
            // node our epoch keeps alive, and chain links only ever lead
            // to nodes retired later than their parent.
            node = unsafe { &*next };
            require_latest = false;
        }
    }

    // ========================================================================
    //  Derived queries
    // ========================================================================

    /// Whether this node is the head and its version is visible at `t`.
    /// Unstable; see [`stable_is_latest_version`](Self::stable_is_latest_version).
    #[inline]
    #[must_use]
    pub fn is_latest_version(&self, t: Tid) -> bool {
        self.hdr.is_latest() && self.version() <= t
    }

    /// Stable variant of [`is_latest_version`](Self::is_latest_version).
    ///
    /// Answers `false` (rather than spinning indefinitely) when the node
    /// stays locked past a small budget or a writer intervenes; callers
    /// treat that as "unknown" and decide conservatively.
    #[must_use]
    pub fn stable_is_latest_version(&self, t: Tid) -> bool {
        let Some(v) = self.try_stable_version(BOUNDED_SPINS) else {
            return false;
        };
        let ret: bool = v.is_latest() && self.version.load(READ_ORD) <= t;
        // Only worth validating if the answer would be yes; a version
        // change fails the check anyway.
        ret && self.check_version(v)
    }

    /// Whether this node is the head and holds a logical delete.
    /// Unstable; see [`stable_latest_value_is_nil`](Self::stable_latest_value_is_nil).
    #[inline]
    #[must_use]
    pub fn latest_value_is_nil(&self) -> bool {
        self.hdr.is_latest() && self.size() == 0
    }

    /// Stable variant of [`latest_value_is_nil`](Self::latest_value_is_nil);
    /// same bounded-spin contract as
    /// [`stable_is_latest_version`](Self::stable_is_latest_version).
    #[must_use]
    pub fn stable_latest_value_is_nil(&self) -> bool {
        let Some(v) = self.try_stable_version(BOUNDED_SPINS) else {
            return false;
        };
        let ret: bool = v.is_latest() && self.size.load(READ_ORD) == 0;
        ret && self.check_version(v)
    }

    /// Prefetch this node's whole block: fixed part plus inline buffer.
    #[cfg(feature = "prefetch")]
    #[inline]
    pub fn prefetch(&self) {
        crate::prefetch::prefetch_span(self.base_ptr(), self.base_size() + self.alloc_size());
    }
}

impl fmt::Debug for Tuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tuple")
            .field("hdr", &self.hdr)
            .field("version", &self.version())
            .field("size", &self.size())
            .field("alloc_size", &self.alloc_size())
            .finish_non_exhaustive()
    }
}

// ============================================================================
//  TupleGuard
// ============================================================================

/// Proof that the writer lock on one node is held.
///
/// Obtained from [`Tuple::lock`]. Every locked-only mutation is a method
/// here, so holding the lock is checked at compile time. The lock is
/// released on drop — panic safe — and the release bumps the header
/// counter, which is what fires concurrent readers' re-validation.
///
/// `!Send`/`!Sync`: the lock must be released by the thread that took it.
#[must_use = "dropping the guard immediately releases the lock"]
pub struct TupleGuard<'a> {
    tuple: &'a Tuple,
    _not_send: PhantomData<*mut ()>,
}

impl Drop for TupleGuard<'_> {
    fn drop(&mut self) {
        self.tuple.hdr.unlock();
    }
}

impl<'a> TupleGuard<'a> {
    /// The locked node.
    #[inline]
    #[must_use]
    pub fn tuple(&self) -> &'a Tuple {
        self.tuple
    }

    /// Set or clear the latest flag on the locked node.
    pub fn set_latest(&mut self, latest: bool) {
        self.tuple.hdr.set_latest(latest);
    }

    /// Point the locked node's chain pointer at `next`.
    ///
    /// Big nodes only.
    ///
    /// # Safety
    ///
    /// `next` must be null or a valid node that stays allocated while
    /// reachable from this chain, with a version no newer than this
    /// node's next write.
    pub unsafe fn set_next(&mut self, next: *mut Tuple) {
        self.tuple.next_slot().store(next, WRITE_ORD);
    }

    /// Install a new version into the latest slot.
    ///
    /// The node must be the chain head. An empty `payload` is a logical
    /// delete. The policy decides whether the displaced version must be
    /// preserved; capacity and node shape decide where the new version
    /// lands:
    ///
    /// - overwritable and it fits: in place, nothing else changes;
    /// - overwritable but too large: a new big head replaces this node
    ///   (kept in the chain so cleanup stays uniform);
    /// - preserved, big, and it fits: the displaced version spills into
    ///   a fresh chain node behind this one, then the write goes in
    ///   place;
    /// - preserved otherwise (small node, or it does not fit): a new big
    ///   head replaces this node, which keeps the displaced version.
    ///
    /// Ordering along the chain is the transaction manager's contract;
    /// this method installs whatever TID it is handed.
    ///
    /// When the outcome carries a replacement, the caller must swap the
    /// index pointer to it; this node stays linked from the replacement
    /// until reclamation.
    pub fn write_record_at<P: OverwritePolicy>(
        &mut self,
        policy: &P,
        t: Tid,
        payload: &[u8],
    ) -> WriteOutcome {
        let this: &Tuple = self.tuple;
        debug_assert!(this.hdr.is_latest(), "write on a non-head node");
        let sz: usize = payload.len();
        debug_assert!(sz <= MAX_PAYLOAD);

        if sz == 0 {
            counters::note_logical_delete();
        }

        let v: HeaderValue = this.unstable_version();
        let this_ptr: *mut Tuple = ptr::from_ref(this).cast_mut();

        if policy.can_overwrite(this.version.load(RELAXED), t) {
            if sz <= this.alloc_size() {
                self.overwrite_in_place(v, t, payload);
                return WriteOutcome::InPlace;
            }

            // Too large for the inline buffer: front the chain with a
            // new head. Keeping this node linked is wasteful but not
            // incorrect, and cleanup stays a plain chain walk.
            let rep: NonNull<Tuple> = Tuple::alloc(t, payload, this_ptr, true);
            this.hdr.set_latest(false);
            counters::note_inplace_buf_insufficient();
            trace_log!(tid = t, size = sz, "head replaced on capacity overflow");
            return WriteOutcome::ReplacedHead(rep);
        }

        // The displaced version must survive.
        counters::note_spill();
        counters::note_spill_len(this.size() as u64);

        if v.is_big() && sz <= this.alloc_size() {
            // Push the current version one link down, then reuse the
            // head slot in place.
            let old_len: usize = this.size();
            // SAFETY: lock held, so no concurrent writer; the first
            // `old_len` bytes of the buffer are initialized payload.
            let old_payload: &[u8] =
                unsafe { std::slice::from_raw_parts(this.payload_ptr(v), old_len) };
            let spill: NonNull<Tuple> = Tuple::alloc(
                this.version.load(RELAXED),
                old_payload,
                this.get_next_raw(),
                false,
            );
            this.next_slot().store(spill.as_ptr(), WRITE_ORD);
            self.overwrite_in_place(v, t, payload);
            trace_log!(tid = t, preserved = old_len, "version spilled into chain");
            return WriteOutcome::Spilled;
        }

        // Small nodes have no chain pointer, so the head slot cannot be
        // reused while preserving history; oversized payloads cannot
        // reuse it either way.
        let rep: NonNull<Tuple> = Tuple::alloc(t, payload, this_ptr, true);
        this.hdr.set_latest(false);
        counters::note_inplace_buf_insufficient_on_spill();
        trace_log!(tid = t, size = sz, "head replaced to preserve history");
        WriteOutcome::SpilledReplaced(rep)
    }

    /// Store a new version into this node's own buffer. Lock held;
    /// publication happens at unlock.
    fn overwrite_in_place(&self, v: HeaderValue, t: Tid, payload: &[u8]) {
        let this: &Tuple = self.tuple;
        let sz: usize = payload.len();
        debug_assert!(sz <= this.alloc_size());
        this.version.store(t, WRITE_ORD);
        #[allow(clippy::cast_possible_truncation)]
        this.size.store(sz as u16, WRITE_ORD);
        // SAFETY: stays inside the inline buffer; concurrent readers
        // discard snapshots that overlap this write via check_version.
        unsafe {
            ptr::copy_nonoverlapping(payload.as_ptr(), this.payload_ptr(v).cast_mut(), sz);
        }
    }
}

impl fmt::Debug for TupleGuard<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TupleGuard").field(self.tuple).finish()
    }
}

// ============================================================================
//  WriteOutcome
// ============================================================================

/// What [`TupleGuard::write_record_at`] did with the new version.
#[derive(Debug)]
#[must_use = "a replacement head must be installed into the index"]
pub enum WriteOutcome {
    /// Overwrote this node's buffer; the index pointer is unchanged.
    InPlace,

    /// A new head fronts the chain; the index must swap to it. The
    /// displaced version was overwritable, so nothing spilled.
    ReplacedHead(NonNull<Tuple>),

    /// The displaced version moved into the chain; the write then went
    /// in place. The index pointer is unchanged.
    Spilled,

    /// The displaced version was preserved by fronting the chain with a
    /// new head; the index must swap to it.
    SpilledReplaced(NonNull<Tuple>),
}

impl WriteOutcome {
    /// Whether a non-latest node was inserted into the chain (the old
    /// version was preserved).
    #[inline]
    #[must_use]
    pub fn spilled(&self) -> bool {
        matches!(self, Self::Spilled | Self::SpilledReplaced(_))
    }

    /// The new head the index must install, if any.
    #[inline]
    #[must_use]
    pub fn replacement(&self) -> Option<NonNull<Tuple>> {
        match self {
            Self::InPlace | Self::Spilled => None,
            Self::ReplacedHead(rep) | Self::SpilledReplaced(rep) => Some(*rep),
        }
    }
}

// ============================================================================
//  Tests
// ============================================================================
