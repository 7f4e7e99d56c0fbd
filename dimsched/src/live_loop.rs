//! Live-update loop for continuously-changing parameters
//!
//! While the user drags a slider the plugin should be re-run
//! back-to-back so the preview stays current, without queueing a
//! backlog of stale re-renders. The loop collapses an unbounded stream
//! of micro-edits into "one pass in flight, immediate restart if a
//! newer edit arrived while it ran":
//!
//! 1. snapshot the edit generation, run the unit once;
//! 2. if the parameter settled, terminate;
//! 3. otherwise redraw, stamp the response time, wake the consumer,
//!    and block until a newer edit arrives or the parameter settles.
//!
//! Passes for the same unit are strictly sequential; cancellation is
//! observed promptly even while blocked.

use crate::error::{Result, SchedError};
use crate::params::ChangingParameter;
use crate::par_range::CancelToken;

/// Optional synchronous "redraw and wait" callback, invoked once per
/// pass while the parameter is still changing. Best-effort side
/// effect; the loop ignores whatever it does.
pub type RedrawHook = dyn Fn() + Send + Sync;

/// Drives one unit of work while its parameter keeps changing.
pub struct LiveUpdateLoop<'a> {
    param: &'a ChangingParameter,
    redraw: Option<&'a RedrawHook>,
    cancel: &'a CancelToken,
}

impl<'a> LiveUpdateLoop<'a> {
    pub fn new(
        param: &'a ChangingParameter,
        redraw: Option<&'a RedrawHook>,
        cancel: &'a CancelToken,
    ) -> Self {
        LiveUpdateLoop {
            param,
            redraw,
            cancel,
        }
    }

    /// Run `unit` until the parameter settles. Returns the number of
    /// passes performed. A failing pass exits immediately with that
    /// failure; cancellation exits with `Interrupted`.
    pub fn run<F>(&self, mut unit: F) -> Result<u64>
    where
        F: FnMut() -> Result<()>,
    {
        let mut passes = 0u64;
        loop {
            if self.cancel.is_cancelled() {
                return Err(SchedError::Interrupted);
            }

            let seen_generation = self.param.generation();
            unit()?;
            passes += 1;

            if !self.param.still_changing() {
                self.param.mark_responded();
                self.param.notify_pass_done();
                log::debug!("live loop settled after {} passes", passes);
                return Ok(passes);
            }

            if let Some(redraw) = self.redraw {
                redraw();
            }
            self.param.mark_responded();
            self.param.notify_pass_done();

            // Newer edit mid-pass restarts immediately; otherwise block
            // until the parameter moves again or settles.
            match self.param.wait_for_edit(seen_generation, self.cancel)? {
                true => continue,
                false => {
                    log::debug!("live loop settled after {} passes", passes);
                    return Ok(passes);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_single_pass_when_not_changing() {
        let param = ChangingParameter::new();
        let cancel = CancelToken::new();
        let live = LiveUpdateLoop::new(&param, None, &cancel);

        let passes = live.run(|| Ok(())).unwrap();
        assert_eq!(passes, 1);
        assert_eq!(param.passes(), 1);
        assert!(param.time_last_response().is_some());
    }

    #[test]
    fn test_k_edits_during_passes_give_k_plus_one_passes() {
        // Each of the first k passes sees one simulated mid-pass edit;
        // the parameter settles during pass k+1.
        let k = 4u64;
        let param = ChangingParameter::new();
        param.edit();
        let cancel = CancelToken::new();
        let live = LiveUpdateLoop::new(&param, None, &cancel);

        let pass_no = AtomicU64::new(0);
        let passes = live
            .run(|| {
                let n = pass_no.fetch_add(1, Ordering::SeqCst) + 1;
                if n <= k {
                    param.edit();
                } else {
                    param.finish();
                }
                Ok(())
            })
            .unwrap();

        assert_eq!(passes, k + 1);
        assert_eq!(pass_no.load(Ordering::SeqCst), k + 1);
    }

    #[test]
    fn test_settle_while_blocked_terminates() {
        let param = Arc::new(ChangingParameter::new());
        param.edit();
        let cancel = CancelToken::new();

        let finisher = {
            let param = Arc::clone(&param);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(40));
                param.finish();
            })
        };

        let live = LiveUpdateLoop::new(&param, None, &cancel);
        // First pass runs, parameter is still changing with no new edit,
        // so the loop blocks until finish() wakes it.
        let passes = live.run(|| Ok(())).unwrap();
        assert_eq!(passes, 1);
        finisher.join().unwrap();
    }

    #[test]
    fn test_redraw_called_only_while_changing() {
        let param = ChangingParameter::new();
        param.edit();
        let cancel = CancelToken::new();
        let redraws = Arc::new(AtomicUsize::new(0));

        let hook = {
            let redraws = Arc::clone(&redraws);
            move || {
                redraws.fetch_add(1, Ordering::SeqCst);
            }
        };
        let live = LiveUpdateLoop::new(&param, Some(&hook), &cancel);

        let ran = AtomicUsize::new(0);
        live.run(|| {
            if ran.fetch_add(1, Ordering::SeqCst) == 0 {
                param.edit();
            } else {
                param.finish();
            }
            Ok(())
        })
        .unwrap();

        // Redraw after pass 1 (still changing); none after the final pass.
        assert_eq!(redraws.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_pass_failure_exits_loop() {
        let param = ChangingParameter::new();
        param.edit();
        let cancel = CancelToken::new();
        let live = LiveUpdateLoop::new(&param, None, &cancel);

        let err = live
            .run(|| {
                Err(SchedError::Unit {
                    index: 0,
                    message: "bad pass".to_string(),
                })
            })
            .unwrap_err();
        assert!(matches!(err, SchedError::Unit { .. }));
    }

    #[test]
    fn test_cancellation_while_blocked() {
        let param = Arc::new(ChangingParameter::new());
        param.edit();
        let cancel = CancelToken::new();

        let canceller = {
            let cancel = cancel.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(40));
                cancel.cancel();
            })
        };

        let live = LiveUpdateLoop::new(&param, None, &cancel);
        let err = live.run(|| Ok(())).unwrap_err();
        assert!(err.is_interrupted());
        canceller.join().unwrap();
    }
}
