use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

const PENDING: u8 = 0;
const COMMITTED: u8 = 1;
const ABANDONED: u8 = 2;

/// Decides the race between a deadline-bound caller and its blocking task.
///
/// The task calls `commit` right before publishing its result; the caller
/// calls `abandon` when the deadline passes. Exactly one of them wins.
#[derive(Debug)]
pub(crate) struct Ticket {
    state: AtomicU8,
    timeout: Duration,
}

impl Ticket {
    pub(crate) fn new(timeout: Duration) -> Self {
        Self { state: AtomicU8::new(PENDING), timeout }
    }

    pub(crate) fn timeout(&self) -> Duration {
        self.timeout
    }

    /// `true` if the task may publish its result.
    pub(crate) fn commit(&self) -> bool {
        self.state.compare_exchange(PENDING, COMMITTED, Ordering::AcqRel, Ordering::Acquire).is_ok()
    }

    /// `true` if the caller gave up before the task committed.
    pub(crate) fn abandon(&self) -> bool {
        self.state.compare_exchange(PENDING, ABANDONED, Ordering::AcqRel, Ordering::Acquire).is_ok()
    }
}
