//! Reclamation bridge: handing superseded nodes to the epoch reclaimer.
//!
//! A node leaves the write path (its `latest` bit cleared, or its whole
//! chain unlinked from the index) while optimistic readers may still be
//! walking through it. Destruction is therefore deferred: the node is
//! marked deleted and registered with the [`seize`] collector, which
//! invokes [`reclaim_tuple`] once no guard from any thread can still
//! hold the pointer.

use seize::{Collector, Guard, LocalGuard};

use super::Tuple;
use crate::counters;
use crate::tracing_helpers::trace_log;

/// Destructor invoked by the collector once no reader epoch observes
/// the node.
///
/// # Safety
///
/// - `ptr` must point to a node allocated by [`Tuple::alloc_first`] or
///   [`Tuple::alloc`] and not freed since.
/// - Must only run after the collector determines no reader holds it.
pub(crate) unsafe fn reclaim_tuple(ptr: *mut Tuple, _collector: &Collector) {
    // SAFETY: caller guarantees a valid, unreclaimed node.
    let node: &Tuple = unsafe { &*ptr };
    debug_assert!(node.is_deleted(), "reclaiming a node never marked deleted");
    debug_assert!(!node.is_locked(), "reclaiming a locked node");
    // SAFETY: same validity as above; nothing reaches the node anymore.
    unsafe { Tuple::dealloc_block(ptr) };
}

impl Tuple {
    /// Hand one node to the reclaimer for deferred destruction.
    ///
    /// Sets the deleted bit first; from that point the node is never
    /// locked or mutated again. No-op on null.
    ///
    /// # Safety
    ///
    /// - `node`, if non-null, must be a valid node no new traversal can
    ///   reach: unlinked from the index, or linked only behind nodes
    ///   retired in the same or an earlier epoch.
    /// - No writer may hold or later acquire the node's lock.
    pub unsafe fn release(node: *mut Tuple, guard: &LocalGuard<'_>) {
        // SAFETY: null is explicitly allowed; otherwise caller
        // guarantees validity.
        let Some(node_ref) = (unsafe { node.as_ref() }) else {
            return;
        };
        node_ref.hdr.mark_deleted();
        trace_log!(tid = node_ref.version(), "node handed to reclaimer");
        // SAFETY: caller guarantees unreachability; reclaim_tuple's
        // requirements follow from this function's contract.
        unsafe { guard.defer_retire(node, reclaim_tuple) };
    }

    /// Free one node immediately, without the reclaimer.
    ///
    /// No-op on null. In checked builds this runs the full
    /// lock/mark/unlock cycle so the same assertions fire as on the
    /// deferred path.
    ///
    /// # Safety
    ///
    /// - `node`, if non-null, must be a valid node allocated by this
    ///   crate and not freed since.
    /// - No other thread may concurrently read or lock the node; the
    ///   caller asserts there are no live references at all.
    pub unsafe fn release_no_rcu(node: *mut Tuple) {
        if node.is_null() {
            return;
        }
        #[cfg(debug_assertions)]
        {
            // SAFETY: caller guarantees exclusive access.
            let node_ref: &Tuple = unsafe { &*node };
            let guard = node_ref.lock();
            node_ref.hdr.mark_deleted();
            drop(guard);
        }
        // SAFETY: caller guarantees validity and exclusivity.
        unsafe { Tuple::dealloc_block(node) };
    }

    /// Hand an entire chain to the reclaimer, head first.
    ///
    /// Each node's deleted bit is set as it is enqueued; the chain links
    /// are left intact so readers still inside the chain can finish
    /// their walk before the epoch closes.
    ///
    /// # Safety
    ///
    /// - `head`, if non-null, must be a valid chain no new traversal can
    ///   reach (the index entry was removed first).
    /// - No writer may hold or later acquire any node's lock.
    pub unsafe fn gc_chain(head: *mut Tuple, guard: &LocalGuard<'_>) {
        let mut cur: *mut Tuple = head;
        while !cur.is_null() {
            // SAFETY: chain nodes stay valid until their own retirement;
            // the link is read before the node is handed over.
            let next: *mut Tuple = unsafe { (*cur).get_next_raw() };
            // SAFETY: covered by this function's contract.
            unsafe { Self::release(cur, guard) };
            cur = next;
        }
    }

    /// Free the node's raw block.
    ///
    /// # Safety
    ///
    /// `ptr` must be a valid node with no remaining references.
    pub(super) unsafe fn dealloc_block(ptr: *mut Tuple) {
        // SAFETY: caller guarantees validity; sizes are read before the
        // block is freed.
        let block: usize = unsafe {
            let node: &Tuple = &*ptr;
            node.base_size() + node.alloc_size()
        };
        counters::note_physical_delete();
        counters::note_bytes_freed(block as u64);
        // SAFETY: the block was allocated with exactly this layout
        // (base_size and alloc_size are fixed at construction).
        unsafe {
            std::alloc::dealloc(ptr.cast::<u8>(), super::block_layout(block));
        }
    }
}
