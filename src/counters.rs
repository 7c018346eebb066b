//! Event counters for tuple operations.
//!
//! Observability only: counts of allocations, spills, reclamations, and
//! spin/retry activity, plus averaging counters for the hot paths. With
//! the `counters` feature disabled every recording call compiles to a
//! no-op; behavior never depends on this module.
//!
//! Counters are process-global and use relaxed atomics; snapshots are
//! best-effort under concurrency, which is all diagnostics need.

#![allow(dead_code)]

#[cfg(feature = "counters")]
use std::sync::atomic::{AtomicU64, Ordering};

// ============================================================================
//  Averaging counter
// ============================================================================

/// A counter that tracks a running sum and a sample count.
#[cfg(feature = "counters")]
struct EventAvg {
    sum: AtomicU64,
    samples: AtomicU64,
}

#[cfg(feature = "counters")]
impl EventAvg {
    const fn new() -> Self {
        Self {
            sum: AtomicU64::new(0),
            samples: AtomicU64::new(0),
        }
    }

    fn offer(&self, value: u64) {
        self.sum.fetch_add(value, Ordering::Relaxed);
        self.samples.fetch_add(1, Ordering::Relaxed);
    }

    fn mean(&self) -> f64 {
        let samples = self.samples.load(Ordering::Relaxed);
        if samples == 0 {
            return 0.0;
        }
        #[allow(clippy::cast_precision_loss)]
        {
            self.sum.load(Ordering::Relaxed) as f64 / samples as f64
        }
    }

    fn reset(&self) {
        self.sum.store(0, Ordering::Relaxed);
        self.samples.store(0, Ordering::Relaxed);
    }
}

// ============================================================================
//  Globals
// ============================================================================

#[cfg(feature = "counters")]
mod globals {
    use super::{AtomicU64, EventAvg};

    pub static CREATES: AtomicU64 = AtomicU64::new(0);
    pub static LOGICAL_DELETES: AtomicU64 = AtomicU64::new(0);
    pub static PHYSICAL_DELETES: AtomicU64 = AtomicU64::new(0);
    pub static BYTES_ALLOCATED: AtomicU64 = AtomicU64::new(0);
    pub static BYTES_FREED: AtomicU64 = AtomicU64::new(0);
    pub static SPILLS: AtomicU64 = AtomicU64::new(0);
    pub static INPLACE_BUF_INSUFFICIENT: AtomicU64 = AtomicU64::new(0);
    pub static INPLACE_BUF_INSUFFICIENT_ON_SPILL: AtomicU64 = AtomicU64::new(0);

    pub static STABLE_VERSION_SPINS: EventAvg = EventAvg::new();
    pub static LOCK_ACQUIRE_SPINS: EventAvg = EventAvg::new();
    pub static READ_RETRIES: EventAvg = EventAvg::new();
    pub static SPILL_LEN: EventAvg = EventAvg::new();
}

// ============================================================================
//  Recording hooks (no-ops without the feature)
// ============================================================================

macro_rules! note_count {
    ($(#[$meta:meta])* $name:ident => $counter:ident) => {
        $(#[$meta])*
        #[inline(always)]
        pub(crate) fn $name() {
            #[cfg(feature = "counters")]
            globals::$counter.fetch_add(1, Ordering::Relaxed);
        }
    };
}

macro_rules! note_value {
    ($(#[$meta:meta])* $name:ident => $counter:ident, add) => {
        $(#[$meta])*
        #[inline(always)]
        pub(crate) fn $name(value: u64) {
            #[cfg(feature = "counters")]
            globals::$counter.fetch_add(value, Ordering::Relaxed);
            #[cfg(not(feature = "counters"))]
            let _ = value;
        }
    };
    ($(#[$meta:meta])* $name:ident => $counter:ident, avg) => {
        $(#[$meta])*
        #[inline(always)]
        pub(crate) fn $name(value: u64) {
            #[cfg(feature = "counters")]
            globals::$counter.offer(value);
            #[cfg(not(feature = "counters"))]
            let _ = value;
        }
    };
}

note_count!(
    /// A node was allocated.
    note_create => CREATES
);
note_count!(
    /// A write installed an empty payload (logical delete).
    note_logical_delete => LOGICAL_DELETES
);
note_count!(
    /// A node's raw block was freed.
    note_physical_delete => PHYSICAL_DELETES
);
note_count!(
    /// The old version was pushed into the chain.
    note_spill => SPILLS
);
note_count!(
    /// An overwritable value did not fit the inline buffer.
    note_inplace_buf_insufficient => INPLACE_BUF_INSUFFICIENT
);
note_count!(
    /// A preserved value did not fit the inline buffer.
    note_inplace_buf_insufficient_on_spill => INPLACE_BUF_INSUFFICIENT_ON_SPILL
);

note_value!(
    /// Bytes handed out by the node allocator.
    note_bytes_allocated => BYTES_ALLOCATED, add
);
note_value!(
    /// Bytes returned to the node allocator.
    note_bytes_freed => BYTES_FREED, add
);
note_value!(
    /// Spins taken waiting for a stable header.
    note_stable_version_spins => STABLE_VERSION_SPINS, avg
);
note_value!(
    /// Spins taken acquiring the writer lock.
    note_lock_acquire_spins => LOCK_ACQUIRE_SPINS, avg
);
note_value!(
    /// Re-validation retries taken by one snapshot read.
    note_read_retries => READ_RETRIES, avg
);
note_value!(
    /// Payload length moved by a spill.
    note_spill_len => SPILL_LEN, avg
);

// ============================================================================
//  Snapshot API
// ============================================================================

/// A point-in-time copy of every counter.
#[cfg(feature = "counters")]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CounterSnapshot {
    /// Nodes allocated.
    pub creates: u64,
    /// Writes that installed an empty payload.
    pub logical_deletes: u64,
    /// Raw blocks freed.
    pub physical_deletes: u64,
    /// Bytes handed out by the node allocator.
    pub bytes_allocated: u64,
    /// Bytes returned to the node allocator.
    pub bytes_freed: u64,
    /// Old versions pushed into a chain.
    pub spills: u64,
    /// Overwritable values that outgrew the inline buffer.
    pub inplace_buf_insufficient: u64,
    /// Preserved values that outgrew the inline buffer.
    pub inplace_buf_insufficient_on_spill: u64,
    /// Mean spins waiting for a stable header.
    pub avg_stable_version_spins: f64,
    /// Mean spins acquiring the writer lock.
    pub avg_lock_acquire_spins: f64,
    /// Mean re-validation retries per snapshot read.
    pub avg_read_retries: f64,
    /// Mean payload length moved by a spill.
    pub avg_spill_len: f64,
}

/// Capture the current counter values.
#[cfg(feature = "counters")]
#[must_use]
pub fn snapshot() -> CounterSnapshot {
    use globals as g;
    CounterSnapshot {
        creates: g::CREATES.load(Ordering::Relaxed),
        logical_deletes: g::LOGICAL_DELETES.load(Ordering::Relaxed),
        physical_deletes: g::PHYSICAL_DELETES.load(Ordering::Relaxed),
        bytes_allocated: g::BYTES_ALLOCATED.load(Ordering::Relaxed),
        bytes_freed: g::BYTES_FREED.load(Ordering::Relaxed),
        spills: g::SPILLS.load(Ordering::Relaxed),
        inplace_buf_insufficient: g::INPLACE_BUF_INSUFFICIENT.load(Ordering::Relaxed),
        inplace_buf_insufficient_on_spill: g::INPLACE_BUF_INSUFFICIENT_ON_SPILL
            .load(Ordering::Relaxed),
        avg_stable_version_spins: g::STABLE_VERSION_SPINS.mean(),
        avg_lock_acquire_spins: g::LOCK_ACQUIRE_SPINS.mean(),
        avg_read_retries: g::READ_RETRIES.mean(),
        avg_spill_len: g::SPILL_LEN.mean(),
    }
}

/// Reset every counter to zero.
#[cfg(feature = "counters")]
pub fn reset() {
    use globals as g;
    g::CREATES.store(0, Ordering::Relaxed);
    g::LOGICAL_DELETES.store(0, Ordering::Relaxed);
    g::PHYSICAL_DELETES.store(0, Ordering::Relaxed);
    g::BYTES_ALLOCATED.store(0, Ordering::Relaxed);
    g::BYTES_FREED.store(0, Ordering::Relaxed);
    g::SPILLS.store(0, Ordering::Relaxed);
    g::INPLACE_BUF_INSUFFICIENT.store(0, Ordering::Relaxed);
    g::INPLACE_BUF_INSUFFICIENT_ON_SPILL.store(0, Ordering::Relaxed);
    g::STABLE_VERSION_SPINS.reset();
    g::LOCK_ACQUIRE_SPINS.reset();
    g::READ_RETRIES.reset();
    g::SPILL_LEN.reset();
}
