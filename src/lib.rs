//! # mvtuple
//!
//! The versioned record cell that sits underneath an MVCC index.
//!
//! An index maps each key to one [`Tuple`]: a single raw allocation
//! holding the record's current payload and the head of a chain of
//! prior versions, newest first. Transactions read a consistent
//! snapshot from the cell without locking; installers overwrite or
//! extend it under a one-word lock protocol.
//!
//! ## Design
//!
//! - **One control word.** Lock, node shape, lifecycle flags, and a
//!   27-bit modification counter share one `AtomicU32`
//!   ([`HeaderWord`]). Unlock is a single release store, so a completed
//!   write becomes visible atomically.
//! - **Optimistic readers.** [`Tuple::stable_read`] captures a stable
//!   header, copies the fields and payload, and re-validates; a
//!   concurrent write bumps the counter and the snapshot retries.
//!   Readers never block writers.
//! - **Inline payloads.** The value lives in the node's own buffer,
//!   sized up to its 16-byte allocation class. Small cells skip even
//!   the chain-pointer word until they first need history.
//! - **Spill or replace.** When a prior version must survive a write,
//!   it either spills one link down the chain (big nodes, fitting
//!   payloads) or the chain gets a new head the index swaps to
//!   ([`TupleGuard::write_record_at`]).
//! - **Epoch reclamation.** Superseded nodes are handed to a
//!   [`seize`] collector and freed only once no reader can still hold
//!   them ([`Tuple::release`], [`Tuple::gc_chain`]).
//!
//! ## Division of labor
//!
//! The index owns the `seize::Collector` and the head pointers; the
//! transaction manager owns TID order and the [`OverwritePolicy`]
//! judgment; this crate owns everything between a head pointer and the
//! bytes of a version.
//!
//! ## Example
//!
//! ```
//! use mvtuple::{AlwaysOverwrite, Tuple};
//! use seize::Collector;
//!
//! // The index side: one collector for the table, one cell per key.
//! let collector = Collector::new();
//! let head = Tuple::alloc_first(true, 64);
//! let cell = unsafe { head.as_ref() };
//!
//! // Install a version at TID 10.
//! let mut guard = cell.lock();
//! let outcome = guard.write_record_at(&AlwaysOverwrite, 10, b"hello");
//! assert!(outcome.replacement().is_none());
//! drop(guard);
//!
//! // A snapshot read at TID 20 sees it.
//! let epoch = collector.enter();
//! let mut buf = Vec::new();
//! assert_eq!(cell.stable_read(20, 1024, &mut buf, &epoch), Some(10));
//! assert_eq!(buf, b"hello");
//! drop(epoch);
//!
//! // Teardown with no concurrent readers.
//! unsafe { Tuple::release_no_rcu(head.as_ptr()) };
//! ```

pub mod counters;
pub mod header;
pub mod ordering;
pub mod policy;
pub mod prefetch;
mod tracing_helpers;
pub mod tuple;

pub use header::{HeaderValue, HeaderWord};
pub use policy::{AlwaysOverwrite, NeverOverwrite, OverwritePolicy};
pub use tuple::{MAX_PAYLOAD, MAX_TID, MIN_TID, Tid, Tuple, TupleGuard, WriteOutcome};
