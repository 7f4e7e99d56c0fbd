//! Bounded parallel execution of an integer index range
//!
//! Workers pull indices from a shared atomic cursor instead of being
//! handed static partitions, so uneven per-unit cost never stalls fast
//! workers behind one slow one. The first failing unit aborts the
//! batch; cancellation is cooperative and polled once per claimed
//! unit. The range never returns before every spawned worker has
//! terminated.

use crate::decompose::WorkIndex;
use crate::error::{Result, SchedError};
use crate::progress::ProgressSink;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

/// Shared cooperative-cancellation flag.
///
/// The analog of thread interruption: tripping the token makes workers
/// finish their current unit, stop claiming new indices, and the run
/// return [`SchedError::Interrupted`] once in-flight work has drained.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(std::sync::Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Configuration for a parallel range.
#[derive(Clone, Debug)]
pub struct RangeConfig {
    /// Upper bound on worker threads; the effective count is further
    /// capped by the range length and available CPU parallelism.
    pub max_threads: usize,
    /// Base name for spawned worker threads.
    pub worker_name: String,
}

impl Default for RangeConfig {
    fn default() -> Self {
        RangeConfig {
            max_threads: usize::MAX,
            worker_name: "dim-worker".to_string(),
        }
    }
}

/// Executes an inclusive index range `[lo, hi]` across a bounded set
/// of worker threads.
pub struct ParRange {
    lo: usize,
    hi: usize,
    n_workers: usize,
    worker_name: String,
}

impl ParRange {
    /// Plan a range. The effective worker count is
    /// `min(max_threads, range length, available parallelism)`, at
    /// least 1, and forced to 1 under `no_parallelize`.
    pub fn new(lo: usize, hi: usize, no_parallelize: bool, config: &RangeConfig) -> Self {
        let total = hi.saturating_sub(lo) + 1;
        let available = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        let n_workers = if no_parallelize {
            1
        } else {
            total.min(config.max_threads).min(available).max(1)
        };
        ParRange {
            lo,
            hi,
            n_workers,
            worker_name: config.worker_name.clone(),
        }
    }

    /// Number of workers this range will spawn; also the number of
    /// worker slots an instance pool must cover.
    pub fn n_workers(&self) -> usize {
        self.n_workers
    }

    /// Drive the range to completion.
    ///
    /// `unit` is invoked once per claimed index with `(index, worker
    /// slot)`. Units are unordered; the only guarantee is that every
    /// unit has either completed or was never claimed by the time this
    /// returns. Returns `Interrupted` if the token was tripped, or the
    /// first unit failure otherwise.
    ///
    /// Per-unit progress is published capped at 99; publishing 100 is
    /// left to the caller's success path.
    pub fn run<F>(&self, progress: &dyn ProgressSink, cancel: &CancelToken, unit: F) -> Result<()>
    where
        F: Fn(WorkIndex, usize) -> Result<()> + Sync,
    {
        if self.hi < self.lo {
            return Ok(());
        }
        let total = self.hi - self.lo + 1;

        let cursor = AtomicUsize::new(self.lo);
        let completed = AtomicUsize::new(0);
        let started = AtomicBool::new(false);
        let abort = AtomicBool::new(false);
        let failure: Mutex<Option<SchedError>> = Mutex::new(None);
        // Serializes publication so the sink always sees a
        // non-decreasing sequence even when workers race.
        let last_published: Mutex<usize> = Mutex::new(0);

        log::debug!(
            "parallel range [{}, {}] across {} workers",
            self.lo,
            self.hi,
            self.n_workers
        );

        let scope_result = crossbeam::thread::scope(|s| {
            let cursor = &cursor;
            let completed = &completed;
            let started = &started;
            let abort = &abort;
            let failure = &failure;
            let last_published = &last_published;
            let unit = &unit;
            let hi = self.hi;

            for worker in 0..self.n_workers {
                let spawned = s
                    .builder()
                    .name(format!("{}-{}", self.worker_name, worker))
                    .spawn(move |_| {
                        loop {
                            // Poll once per claimed unit; finish the
                            // current unit, never abandon mid-callback.
                            if abort.load(Ordering::SeqCst) || cancel.is_cancelled() {
                                return;
                            }
                            let index = cursor.fetch_add(1, Ordering::SeqCst);
                            if index > hi {
                                return;
                            }
                            if !started.swap(true, Ordering::SeqCst) {
                                progress.set_indeterminate(false);
                            }
                            match unit(index, worker) {
                                Ok(()) => {
                                    let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                                    // Workers never publish 100; the caller
                                    // reports completion after a successful
                                    // return, so a cancellation racing the
                                    // last unit cannot show a finished bar.
                                    let percent = (done * 100 / total).min(99);
                                    let mut last = last_published.lock().unwrap();
                                    if percent > *last {
                                        *last = percent;
                                        progress.set_value(percent as u8);
                                    }
                                }
                                Err(e) => {
                                    abort.store(true, Ordering::SeqCst);
                                    let mut slot = failure.lock().unwrap();
                                    if slot.is_none() {
                                        *slot = Some(e);
                                    } else {
                                        log::warn!(
                                            "multiple unit failures; only the first propagates: {}",
                                            e
                                        );
                                    }
                                    return;
                                }
                            }
                        }
                    });
                // A failed spawn aborts the batch; workers already
                // running drain through the abort flag.
                if let Err(e) = spawned {
                    abort.store(true, Ordering::SeqCst);
                    let mut slot = failure.lock().unwrap();
                    if slot.is_none() {
                        *slot = Some(SchedError::config(format!(
                            "failed to spawn range worker: {}",
                            e
                        )));
                    }
                    break;
                }
            }
        });

        if scope_result.is_err() {
            return Err(SchedError::config("range worker panicked"));
        }

        if let Some(err) = failure.lock().unwrap().take() {
            return Err(err);
        }
        if cancel.is_cancelled() {
            return Err(SchedError::Interrupted);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::SharedProgress;
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_every_index_claimed_exactly_once() {
        let seen: Mutex<Vec<usize>> = Mutex::new(Vec::new());
        let progress = SharedProgress::new();
        let range = ParRange::new(0, 99, false, &RangeConfig::default());

        range
            .run(&progress, &CancelToken::new(), |index, _slot| {
                seen.lock().unwrap().push(index);
                Ok(())
            })
            .unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 100);
        let unique: HashSet<_> = seen.iter().collect();
        assert_eq!(unique.len(), 100);
        // The range itself tops out at 99; 100 is the caller's.
        assert_eq!(progress.value(), 99);
    }

    #[test]
    fn test_no_parallelize_forces_one_worker() {
        let range = ParRange::new(0, 63, true, &RangeConfig { max_threads: 8, ..Default::default() });
        assert_eq!(range.n_workers(), 1);

        // With one worker at most one unit is ever in flight.
        let in_flight = AtomicUsize::new(0);
        let max_in_flight = AtomicUsize::new(0);
        range
            .run(&SharedProgress::new(), &CancelToken::new(), |_index, _slot| {
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                max_in_flight.fetch_max(now, Ordering::SeqCst);
                thread::sleep(Duration::from_micros(200));
                in_flight.fetch_sub(1, Ordering::SeqCst);
                Ok(())
            })
            .unwrap();
        assert_eq!(max_in_flight.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_worker_count_capped_by_range_length() {
        let range = ParRange::new(0, 1, false, &RangeConfig::default());
        assert!(range.n_workers() <= 2);
        let range = ParRange::new(0, 999, false, &RangeConfig { max_threads: 3, ..Default::default() });
        assert!(range.n_workers() <= 3);
    }

    #[test]
    fn test_first_failure_aborts_batch() {
        let ran = AtomicUsize::new(0);
        let progress = SharedProgress::new();
        // Single worker makes the claim order deterministic.
        let range = ParRange::new(0, 9, true, &RangeConfig::default());

        let err = range
            .run(&progress, &CancelToken::new(), |index, _slot| {
                ran.fetch_add(1, Ordering::SeqCst);
                if index == 3 {
                    Err(SchedError::Unit {
                        index,
                        message: "synthetic".to_string(),
                    })
                } else {
                    Ok(())
                }
            })
            .unwrap_err();

        assert!(matches!(err, SchedError::Unit { index: 3, .. }));
        // Indices 0..3 ran, 3 failed, nothing after was claimed.
        assert_eq!(ran.load(Ordering::SeqCst), 4);
        assert!(progress.value() < 100);
    }

    #[test]
    fn test_cancellation_drains_in_flight_units() {
        let cancel = CancelToken::new();
        let entered = Arc::new(AtomicUsize::new(0));
        let exited = Arc::new(AtomicUsize::new(0));
        let progress = SharedProgress::new();
        let range = ParRange::new(0, 255, false, &RangeConfig::default());

        let err = {
            let cancel_mid = cancel.clone();
            let entered = Arc::clone(&entered);
            let exited = Arc::clone(&exited);
            range
                .run(&progress, &cancel, move |index, _slot| {
                    entered.fetch_add(1, Ordering::SeqCst);
                    if index == 0 {
                        cancel_mid.cancel();
                    }
                    thread::sleep(Duration::from_millis(2));
                    exited.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
                .unwrap_err()
        };

        assert!(err.is_interrupted());
        // Every claimed unit finished its callback before run returned.
        assert_eq!(
            entered.load(Ordering::SeqCst),
            exited.load(Ordering::SeqCst)
        );
        // The run was cut short and never reported completion.
        assert!(exited.load(Ordering::SeqCst) < 256);
        assert!(progress.value() < 100);
    }

    #[test]
    fn test_cancel_during_final_unit_never_reports_100() {
        let cancel = CancelToken::new();
        let progress = SharedProgress::new();
        let range = ParRange::new(0, 0, true, &RangeConfig::default());

        let err = {
            let cancel_mid = cancel.clone();
            range
                .run(&progress, &cancel, move |_index, _slot| {
                    // Token trips while the only unit is in flight.
                    cancel_mid.cancel();
                    Ok(())
                })
                .unwrap_err()
        };

        assert!(err.is_interrupted());
        assert!(progress.value() < 100);
    }

    #[test]
    fn test_interrupted_unit_error_surfaces_as_interrupted() {
        let range = ParRange::new(0, 9, true, &RangeConfig::default());
        let err = range
            .run(&SharedProgress::new(), &CancelToken::new(), |_index, _slot| {
                Err(SchedError::Interrupted)
            })
            .unwrap_err();
        assert!(err.is_interrupted());
    }
}
