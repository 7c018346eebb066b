//! Software prefetching for chain traversal.
//!
//! A snapshot read touches the header, the chain pointer, and up to
//! `alloc_size` payload bytes of each node it visits. Issuing a prefetch
//! for the next node's block while the current node is being validated
//! hides most of that memory latency.
//!
//! # Architecture Support
//!
//! - **`x86_64`**: `_mm_prefetch` with `_MM_HINT_T0` (all cache levels)
//! - **`aarch64`**: `_prefetch` with locality hint 3 (keep in cache)
//! - **Other**: no-op
//!
//! Prefetching is a hint; it never faults and never changes behavior.

/// Cache line granularity assumed when walking a block.
const CACHE_LINE: usize = 64;

/// Prefetch one cache line for reading.
///
/// Safe with null or dangling pointers: a prefetch is a hint, not a
/// load, and invalid addresses cause no fault.
#[inline(always)]
pub fn prefetch_read<T>(ptr: *const T) {
    if ptr.is_null() {
        return;
    }

    #[cfg(target_arch = "x86_64")]
    {
        // SAFETY: _mm_prefetch is always safe to call; the CPU may
        // ignore the hint and invalid addresses do not fault.
        unsafe {
            std::arch::x86_64::_mm_prefetch(ptr.cast::<i8>(), std::arch::x86_64::_MM_HINT_T0);
        }
    }

    #[cfg(target_arch = "aarch64")]
    {
        // SAFETY: PRFM is a hint; it never faults, even on invalid
        // addresses.
        unsafe {
            std::arch::asm!(
                "prfm pldl1keep, [{addr}]",
                addr = in(reg) ptr.cast::<u8>(),
                options(nostack, preserves_flags),
            );
        }
    }

    #[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
    {
        let _ = ptr;
    }
}

/// Prefetch `len` bytes starting at `ptr`, one hint per cache line.
///
/// Used on a node block before traversal: header, chain pointer, and
/// inline payload all sit in one contiguous allocation, so a handful of
/// line hints covers the whole node.
#[inline]
pub fn prefetch_span(ptr: *const u8, len: usize) {
    if ptr.is_null() {
        return;
    }
    let mut offset: usize = 0;
    while offset < len {
        // Hints only; wrapping_add avoids any provenance question for
        // the final partial line.
        prefetch_read(ptr.wrapping_add(offset));
        offset += CACHE_LINE;
    }
}
