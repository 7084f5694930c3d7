//! Counters for sink activity
//!
//! All fields use relaxed atomics so the producer path and the backend
//! completion path can record without taking the pool lock.

use std::sync::atomic::{AtomicU64, Ordering};

/// Running counters for one sink.
pub struct SinkStats {
    /// Frames handed to the dispatch path by `send`
    frames_submitted: AtomicU64,

    /// Checked-out frames discarded without a submit (drops and overflows)
    frames_discarded: AtomicU64,

    /// Total pixel bytes submitted
    bytes_submitted: AtomicU64,

    /// Times a checkout had to wait for a slot to free up
    checkout_waits: AtomicU64,

    /// Completions that arrived after their session was invalidated
    stale_completions: AtomicU64,

    /// Times streaming was aborted mid-flight
    aborts: AtomicU64,
}

impl SinkStats {
    pub fn new() -> Self {
        Self {
            frames_submitted: AtomicU64::new(0),
            frames_discarded: AtomicU64::new(0),
            bytes_submitted: AtomicU64::new(0),
            checkout_waits: AtomicU64::new(0),
            stale_completions: AtomicU64::new(0),
            aborts: AtomicU64::new(0),
        }
    }

    pub(crate) fn record_submit(&self, bytes: usize) {
        self.frames_submitted.fetch_add(1, Ordering::Relaxed);
        self.bytes_submitted
            .fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_discard(&self) {
        self.frames_discarded.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_checkout_wait(&self) {
        self.checkout_waits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_stale_completion(&self) {
        self.stale_completions.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_abort(&self) {
        self.aborts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn frames_submitted(&self) -> u64 {
        self.frames_submitted.load(Ordering::Relaxed)
    }

    pub fn frames_discarded(&self) -> u64 {
        self.frames_discarded.load(Ordering::Relaxed)
    }

    pub fn bytes_submitted(&self) -> u64 {
        self.bytes_submitted.load(Ordering::Relaxed)
    }

    pub fn checkout_waits(&self) -> u64 {
        self.checkout_waits.load(Ordering::Relaxed)
    }

    pub fn stale_completions(&self) -> u64 {
        self.stale_completions.load(Ordering::Relaxed)
    }

    pub fn aborts(&self) -> u64 {
        self.aborts.load(Ordering::Relaxed)
    }

    /// Snapshot the counters
    pub fn summary(&self) -> StatsSummary {
        StatsSummary {
            frames_submitted: self.frames_submitted(),
            frames_discarded: self.frames_discarded(),
            bytes_submitted: self.bytes_submitted(),
            checkout_waits: self.checkout_waits(),
            stale_completions: self.stale_completions(),
            aborts: self.aborts(),
        }
    }
}

impl Default for SinkStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of sink counters
#[derive(Debug, Clone)]
pub struct StatsSummary {
    pub frames_submitted: u64,
    pub frames_discarded: u64,
    pub bytes_submitted: u64,
    pub checkout_waits: u64,
    pub stale_completions: u64,
    pub aborts: u64,
}

impl std::fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} frames submitted ({} bytes), {} discarded, {} waits, {} stale completions, {} aborts",
            self.frames_submitted,
            self.bytes_submitted,
            self.frames_discarded,
            self.checkout_waits,
            self.stale_completions,
            self.aborts
        )
    }
}
