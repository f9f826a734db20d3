//! Per-node reader/writer latch.
//!
//! A single atomic word encodes the node's concurrency state: a writer bit,
//! an expanded bit, and a reader count. Acquisition never blocks a worker;
//! a refused acquisition is reported to the caller, which follows the
//! failure path of the simulation state machine instead of waiting.
//!
//! The expanded bit is set exactly once, by the writer that installs the
//! child list, and is never cleared. Readers are only admitted to expanded
//! nodes, writers only to unexpanded ones, so the two sides can never hold
//! the latch at the same time.

use std::sync::atomic::{AtomicU32, Ordering};

const WRITER: u32 = 1 << 31;
const EXPANDED: u32 = 1 << 30;
const READER_MASK: u32 = EXPANDED - 1;

/// Non-blocking reader/writer latch with a one-way expanded flag.
#[derive(Debug)]
pub struct Latch {
    state: AtomicU32,
}

impl Latch {
    pub fn new() -> Self {
        Self {
            state: AtomicU32::new(0),
        }
    }

    /// A latch born with the expanded flag set, admitting readers from the
    /// start. Used for the search-global root latch, which guards a slot
    /// rather than a child list.
    pub fn new_open() -> Self {
        Self {
            state: AtomicU32::new(EXPANDED),
        }
    }

    /// Try to enter as a reader. Refused while a writer is present and on
    /// nodes whose child list has not been installed yet; the latter keeps
    /// reader presence equivalent to "children exist", which the writer
    /// reservation below relies on.
    #[must_use]
    pub fn acquire_reader(&self) -> bool {
        self.state
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |s| {
                if s & WRITER != 0 || s & EXPANDED == 0 {
                    None
                } else {
                    Some(s + 1)
                }
            })
            .is_ok()
    }

    pub fn release_reader(&self) {
        let prev = self.state.fetch_sub(1, Ordering::SeqCst);
        debug_assert!(prev & READER_MASK > 0);
    }

    /// Try to reserve the node for expansion. Succeeds for exactly one
    /// caller over the node's lifetime; refused while another writer is
    /// present or once the node is expanded.
    #[must_use]
    pub fn acquire_writer(&self) -> bool {
        self.state
            .compare_exchange(0, WRITER, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Release the writer, optionally publishing the expanded flag.
    pub fn release_writer(&self, expanded: bool) {
        let next = if expanded { EXPANDED } else { 0 };
        let prev = self.state.swap(next, Ordering::SeqCst);
        debug_assert_eq!(prev & WRITER, WRITER);
    }

    /// Whether the child list has been installed.
    #[inline]
    pub fn is_expanded(&self) -> bool {
        self.state.load(Ordering::SeqCst) & EXPANDED != 0
    }

    /// Exclusive access for the controller (child re-ordering, subtree
    /// detachment). Spins until in-flight readers drain; workers refused in
    /// the meantime fail their step instead of waiting, so this cannot
    /// deadlock.
    pub fn lock_exclusive(&self) {
        loop {
            let ok = self
                .state
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |s| {
                    if s & (WRITER | READER_MASK) == 0 {
                        Some(s | WRITER)
                    } else {
                        None
                    }
                })
                .is_ok();
            if ok {
                return;
            }
            std::hint::spin_loop();
        }
    }

    pub fn unlock_exclusive(&self) {
        self.state.fetch_and(!WRITER, Ordering::SeqCst);
    }
}

impl Default for Latch {
    fn default() -> Self {
        Self::new()
    }
}
