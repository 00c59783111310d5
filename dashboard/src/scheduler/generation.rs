//! Monotonic generation counters for stale-response detection.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// A counter that only moves forward.
///
/// Work is tagged with the value returned by [`Generation::advance`]; when it
/// completes, [`Generation::is_current`] tells whether anything newer has
/// started since.
#[derive(Debug, Default)]
pub struct Generation(AtomicU64);

impl Generation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new generation and return its number (the first is 1).
    pub fn advance(&self) -> u64 {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn current(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }

    pub fn is_current(&self, value: u64) -> bool {
        self.current() == value
    }
}

/// Identity of one dispatched map-only request.
#[derive(Debug, Clone)]
pub struct MapTicket {
    seq: u64,
    epoch: u64,
    latest: Arc<Generation>,
}

impl MapTicket {
    pub(crate) fn new(seq: u64, epoch: u64, latest: Arc<Generation>) -> Self {
        Self { seq, epoch, latest }
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Data epoch the query was built against.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// True while no later map-only request has been dispatched.
    pub fn is_current(&self) -> bool {
        self.latest.is_current(self.seq)
    }
}
