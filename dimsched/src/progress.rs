//! Progress reporting
//!
//! The scheduler only ever writes to a progress sink; it never reads
//! one back. `SharedProgress` is the readable implementation used by
//! UIs and tests; it keeps published values monotonic within a run so
//! out-of-order worker updates never make the bar jump backwards.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

/// Receives 0–100 percentage updates and an indeterminate flag.
pub trait ProgressSink: Send + Sync {
    fn set_indeterminate(&self, indeterminate: bool);
    fn set_value(&self, percent: u8);
}

/// Sink that discards all updates.
#[derive(Debug, Default)]
pub struct NoopProgress;

impl ProgressSink for NoopProgress {
    fn set_indeterminate(&self, _indeterminate: bool) {}
    fn set_value(&self, _percent: u8) {}
}

/// Sink that logs updates at debug level.
#[derive(Debug, Default)]
pub struct LogProgress;

impl ProgressSink for LogProgress {
    fn set_indeterminate(&self, indeterminate: bool) {
        log::debug!("progress indeterminate: {}", indeterminate);
    }

    fn set_value(&self, percent: u8) {
        log::debug!("progress: {}%", percent);
    }
}

/// Atomic-backed sink whose current state can be read back.
///
/// `set_value` keeps the stored value monotonic: a worker publishing a
/// stale lower percentage is ignored.
#[derive(Debug, Default)]
pub struct SharedProgress {
    value: AtomicU8,
    indeterminate: AtomicBool,
}

impl SharedProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn value(&self) -> u8 {
        self.value.load(Ordering::SeqCst)
    }

    pub fn is_indeterminate(&self) -> bool {
        self.indeterminate.load(Ordering::SeqCst)
    }

    /// Reset for a fresh run.
    pub fn reset(&self) {
        self.value.store(0, Ordering::SeqCst);
        self.indeterminate.store(false, Ordering::SeqCst);
    }
}

impl ProgressSink for SharedProgress {
    fn set_indeterminate(&self, indeterminate: bool) {
        self.indeterminate.store(indeterminate, Ordering::SeqCst);
    }

    fn set_value(&self, percent: u8) {
        self.value.fetch_max(percent.min(100), Ordering::SeqCst);
    }
}
