//! Stress tests for concurrent tuple access.
//!
//! Readers run the optimistic snapshot protocol against writers doing
//! in-place overwrites, spills, and head replacements. Payloads are
//! derived from the writing TID, so any torn read that survived
//! validation shows up as a payload/TID mismatch.
//!
//! Run with:
//! ```bash
//! cargo test --test stress_tests --release
//! ```

mod common;

use std::ptr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicPtr, Ordering};
use std::thread;

use seize::Collector;

use mvtuple::{AlwaysOverwrite, MIN_TID, NeverOverwrite, Tid, Tuple};

/// Payload for TID `t`: the TID bytes repeated, length varying with `t`.
fn payload_for(t: Tid, max: usize) -> Vec<u8> {
    let len = 1 + (t as usize) % max;
    t.to_le_bytes().iter().copied().cycle().take(len).collect()
}

/// Check that a snapshot `(tid, bytes)` is self-consistent.
fn assert_untorn(tid: Tid, bytes: &[u8], max: usize) {
    if tid == MIN_TID {
        assert!(bytes.is_empty(), "tail sentinel must carry no payload");
        return;
    }
    let expected = payload_for(tid, max);
    assert_eq!(
        bytes, &expected,
        "torn read: payload does not match its version TID"
    );
}

// =============================================================================
// In-place overwrites vs. optimistic readers
// =============================================================================

#[test]
fn readers_vs_inplace_writer() {
    common::init_tracing();

    const WRITES: u64 = 20_000;
    const MAX_LEN: usize = 48;
    const READERS: usize = 4;

    let collector = Arc::new(Collector::new());
    let head = Tuple::alloc_first(true, 64);
    let head_addr = head.as_ptr() as usize;
    let done = Arc::new(AtomicBool::new(false));

    let writer = {
        let done = Arc::clone(&done);
        thread::spawn(move || {
            let node = unsafe { &*(head_addr as *mut Tuple) };
            for t in 1..=WRITES {
                let mut guard = node.lock();
                let outcome = guard.write_record_at(&AlwaysOverwrite, t, &payload_for(t, MAX_LEN));
                assert!(outcome.replacement().is_none(), "cap 64 fits every payload");
                drop(guard);
            }
            done.store(true, Ordering::Release);
        })
    };

    let readers: Vec<_> = (0..READERS)
        .map(|_| {
            let collector = Arc::clone(&collector);
            let done = Arc::clone(&done);
            thread::spawn(move || {
                let node = unsafe { &*(head_addr as *mut Tuple) };
                let mut out = Vec::new();
                let mut last_seen: Tid = 0;
                while !done.load(Ordering::Acquire) {
                    let guard = collector.enter();
                    let tid = node
                        .stable_read(Tid::MAX, usize::MAX, &mut out, &guard)
                        .expect("head is never replaced in this test");
                    assert_untorn(tid, &out, MAX_LEN);
                    // Writes to one cell are totally ordered; snapshots
                    // must never go backwards.
                    assert!(tid >= last_seen, "snapshot TID went backwards");
                    last_seen = tid;
                }
            })
        })
        .collect();

    writer.join().expect("writer panicked");
    for reader in readers {
        reader.join().expect("reader panicked");
    }

    // SAFETY: all threads joined; no references remain.
    unsafe { Tuple::release_no_rcu(head.as_ptr()) };
}

// =============================================================================
// Full write mix vs. readers restarting from a moving index entry
// =============================================================================

#[test]
fn readers_vs_spills_and_replacements() {
    common::init_tracing();

    const WRITES: u64 = 5_000;
    const MAX_LEN: usize = 24;
    const READERS: usize = 4;

    let collector = Arc::new(Collector::new());
    // Small capacity forces frequent replacements; the preserved writes
    // force spills. This exercises the stale-head restart constantly.
    let entry = Arc::new(AtomicPtr::new(Tuple::alloc_first(true, 8).as_ptr()));
    let done = Arc::new(AtomicBool::new(false));

    let writer = {
        let collector = Arc::clone(&collector);
        let entry = Arc::clone(&entry);
        let done = Arc::clone(&done);
        thread::spawn(move || {
            for t in 1..=WRITES {
                let payload = payload_for(t, MAX_LEN);
                let head = unsafe { &*entry.load(Ordering::Acquire) };
                let mut guard = head.lock();
                let outcome = if t % 4 == 0 {
                    guard.write_record_at(&AlwaysOverwrite, t, &payload)
                } else {
                    guard.write_record_at(&NeverOverwrite, t, &payload)
                };
                if let Some(rep) = outcome.replacement() {
                    entry.store(rep.as_ptr(), Ordering::Release);
                }
                drop(guard);

                // Periodically prune the chain tail so the collector
                // sees real retirements while readers are active.
                if t % 64 == 0 {
                    let guard = collector.enter();
                    let head = unsafe { &*entry.load(Ordering::Acquire) };
                    let second = head.get_next_raw();
                    if !second.is_null() {
                        let tail = unsafe { (*second).get_next_raw() };
                        if !tail.is_null() {
                            unsafe { (*second).clear_next() };
                            // SAFETY: the suffix is unlinked; readers
                            // already inside it hold epoch guards.
                            unsafe { Tuple::gc_chain(tail, &guard) };
                        }
                    }
                }
            }
            done.store(true, Ordering::Release);
        })
    };

    let readers: Vec<_> = (0..READERS)
        .map(|_| {
            let collector = Arc::clone(&collector);
            let entry = Arc::clone(&entry);
            let done = Arc::clone(&done);
            thread::spawn(move || {
                let mut out = Vec::new();
                let mut last_seen: Tid = 0;
                while !done.load(Ordering::Acquire) {
                    let guard = collector.enter();
                    let tid = loop {
                        let head = unsafe { &*entry.load(Ordering::Acquire) };
                        match head.stable_read(Tid::MAX, usize::MAX, &mut out, &guard) {
                            Some(tid) => break tid,
                            // Head went stale mid-read; restart from the
                            // entry like a real index caller.
                            None => {}
                        }
                    };
                    assert_untorn(tid, &out, MAX_LEN);
                    assert!(tid >= last_seen, "snapshot TID went backwards");
                    last_seen = tid;
                    drop(guard);
                }
            })
        })
        .collect();

    writer.join().expect("writer panicked");
    for reader in readers {
        reader.join().expect("reader panicked");
    }

    // Teardown: unlink and reclaim the surviving chain.
    let head = entry.swap(ptr::null_mut(), Ordering::AcqRel);
    {
        let head_ref = unsafe { &*head };
        let mut guard = head_ref.lock();
        guard.set_latest(false);
        drop(guard);
        let guard = collector.enter();
        // SAFETY: the entry is cleared and every thread has joined.
        unsafe { Tuple::gc_chain(head, &guard) };
    }
}

// =============================================================================
// Bounded queries under a writer that churns the lock
// =============================================================================

#[test]
fn bounded_queries_return_under_contention() {
    common::init_tracing();

    let head = Tuple::alloc_first(true, 64);
    let head_addr = head.as_ptr() as usize;
    let done = Arc::new(AtomicBool::new(false));

    let writer = {
        let done = Arc::clone(&done);
        thread::spawn(move || {
            let node = unsafe { &*(head_addr as *mut Tuple) };
            for t in 1..=50_000u64 {
                let mut guard = node.lock();
                let _ = guard.write_record_at(&AlwaysOverwrite, t, b"spin");
                drop(guard);
            }
            done.store(true, Ordering::Release);
        })
    };

    // The bounded variants must keep answering (true or false, never
    // hanging) while the lock is constantly churning.
    let node = unsafe { &*(head_addr as *mut Tuple) };
    let mut answered: u64 = 0;
    while !done.load(Ordering::Acquire) {
        let _ = node.stable_is_latest_version(Tid::MAX);
        let _ = node.stable_latest_value_is_nil();
        answered += 2;
    }
    assert!(answered > 0);

    writer.join().expect("writer panicked");
    // SAFETY: all threads joined; no references remain.
    unsafe { Tuple::release_no_rcu(head.as_ptr()) };
}

// =============================================================================
// Snapshot stability: old TIDs keep reading the same version
// =============================================================================

#[test]
fn fixed_snapshots_stay_stable_while_history_grows() {
    common::init_tracing();

    const MAX_LEN: usize = 16;

    let collector = Arc::new(Collector::new());
    let entry = Arc::new(AtomicPtr::new(Tuple::alloc_first(true, 16).as_ptr()));
    let done = Arc::new(AtomicBool::new(false));

    // Preserved writes only, so every version stays reachable.
    let writer = {
        let entry = Arc::clone(&entry);
        let done = Arc::clone(&done);
        thread::spawn(move || {
            for t in 1..=2_000u64 {
                let payload = payload_for(t, MAX_LEN);
                let head = unsafe { &*entry.load(Ordering::Acquire) };
                let mut guard = head.lock();
                let outcome = guard.write_record_at(&NeverOverwrite, t, &payload);
                if let Some(rep) = outcome.replacement() {
                    entry.store(rep.as_ptr(), Ordering::Release);
                }
                drop(guard);
            }
            done.store(true, Ordering::Release);
        })
    };

    // Each reader pins one snapshot TID; the answer must never change
    // once that version exists.
    let readers: Vec<_> = [50u64, 500, 1500]
        .into_iter()
        .map(|snapshot| {
            let collector = Arc::clone(&collector);
            let entry = Arc::clone(&entry);
            let done = Arc::clone(&done);
            thread::spawn(move || {
                let mut out = Vec::new();
                let mut pinned: Option<Tid> = None;
                while !done.load(Ordering::Acquire) {
                    let guard = collector.enter();
                    let head = unsafe { &*entry.load(Ordering::Acquire) };
                    let Some(tid) = head.stable_read(snapshot, usize::MAX, &mut out, &guard)
                    else {
                        continue;
                    };
                    assert_untorn(tid, &out, MAX_LEN);
                    assert!(tid <= snapshot, "read returned a version from the future");
                    match pinned {
                        None => pinned = Some(tid),
                        Some(p) => {
                            // The newest version <= snapshot only moves
                            // forward until it reaches the snapshot TID,
                            // then freezes.
                            assert!(tid >= p, "snapshot answer went backwards");
                            pinned = Some(tid);
                        }
                    }
                    drop(guard);
                }
                // By the end, the version right at the snapshot exists.
                let guard = collector.enter();
                let head = unsafe { &*entry.load(Ordering::Acquire) };
                let tid = head
                    .stable_read(snapshot, usize::MAX, &mut out, &guard)
                    .expect("writer is done; the head cannot go stale");
                assert_eq!(tid, snapshot, "final snapshot must land on its own TID");
            })
        })
        .collect();

    writer.join().expect("writer panicked");
    for reader in readers {
        reader.join().expect("reader panicked");
    }

    let head = entry.swap(ptr::null_mut(), Ordering::AcqRel);
    {
        let head_ref = unsafe { &*head };
        let mut guard = head_ref.lock();
        guard.set_latest(false);
        drop(guard);
        let guard = collector.enter();
        // SAFETY: the entry is cleared and every thread has joined.
        unsafe { Tuple::gc_chain(head, &guard) };
    }
}
