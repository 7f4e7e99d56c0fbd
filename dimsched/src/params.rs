//! Continuously-changing parameter hand-off
//!
//! A `ChangingParameter` is the rendezvous point between a UI thread
//! dragging a slider and the scheduler's live-update loop. The UI side
//! bumps a monotonic edit generation on every micro-edit and clears
//! `still_changing` on mouse release; the compute side snapshots the
//! generation before a pass, signals after each pass, and blocks until
//! either a newer generation arrives or the parameter stops changing.
//! Comparing generations (rather than wall-clock timestamps) makes the
//! "did a newer edit arrive while I was computing" check race-free.

use crate::error::{Result, SchedError};
use crate::par_range::CancelToken;
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// Poll interval while blocked, so cancellation is observed promptly
/// even when no edit ever arrives.
const WAIT_SLICE: Duration = Duration::from_millis(25);

#[derive(Debug)]
struct ParamState {
    still_changing: bool,
    generation: u64,
    passes: u64,
    time_last_response: Option<Instant>,
}

/// Shared state of one continuously-edited parameter.
///
/// Owned by the parameter/widget layer; the scheduler only observes
/// `still_changing` and the edit generation, stamps the time of its
/// last response, and signals pass completion.
#[derive(Debug)]
pub struct ChangingParameter {
    state: Mutex<ParamState>,
    signal: Condvar,
}

impl Default for ChangingParameter {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangingParameter {
    pub fn new() -> Self {
        ChangingParameter {
            state: Mutex::new(ParamState {
                still_changing: false,
                generation: 0,
                passes: 0,
                time_last_response: None,
            }),
            signal: Condvar::new(),
        }
    }

    /// UI side: a micro-edit happened (e.g. the slider moved one step).
    pub fn edit(&self) {
        let mut st = self.state.lock().unwrap();
        st.still_changing = true;
        st.generation += 1;
        self.signal.notify_all();
    }

    /// UI side: the interaction ended (e.g. mouse released).
    pub fn finish(&self) {
        let mut st = self.state.lock().unwrap();
        st.still_changing = false;
        self.signal.notify_all();
    }

    pub fn still_changing(&self) -> bool {
        self.state.lock().unwrap().still_changing
    }

    /// Current edit generation; compared against a pre-pass snapshot to
    /// detect edits that arrived mid-pass.
    pub fn generation(&self) -> u64 {
        self.state.lock().unwrap().generation
    }

    /// Completed live passes so far.
    pub fn passes(&self) -> u64 {
        self.state.lock().unwrap().passes
    }

    pub fn time_last_response(&self) -> Option<Instant> {
        self.state.lock().unwrap().time_last_response
    }

    /// Scheduler side: stamp that a pass just responded to the latest
    /// observed edit.
    pub fn mark_responded(&self) {
        self.state.lock().unwrap().time_last_response = Some(Instant::now());
    }

    /// Scheduler side: one live pass finished; wake any consumer
    /// blocked in [`wait_for_pass`](Self::wait_for_pass).
    pub fn notify_pass_done(&self) {
        let mut st = self.state.lock().unwrap();
        st.passes += 1;
        self.signal.notify_all();
    }

    /// Scheduler side: block until an edit newer than `seen_generation`
    /// arrives or the parameter stops changing. Returns `Ok(true)` when
    /// a newer edit should trigger another pass, `Ok(false)` when the
    /// parameter settled.
    pub fn wait_for_edit(&self, seen_generation: u64, cancel: &CancelToken) -> Result<bool> {
        let mut st = self.state.lock().unwrap();
        while st.still_changing && st.generation <= seen_generation {
            if cancel.is_cancelled() {
                return Err(SchedError::Interrupted);
            }
            let (guard, _timeout) = self.signal.wait_timeout(st, WAIT_SLICE).unwrap();
            st = guard;
        }
        if cancel.is_cancelled() {
            return Err(SchedError::Interrupted);
        }
        Ok(st.still_changing)
    }

    /// Consumer side: block until the pass counter advances past
    /// `seen_passes`, returning the new counter. Used by a display
    /// thread waiting for a fresh frame.
    pub fn wait_for_pass(&self, seen_passes: u64, cancel: &CancelToken) -> Result<u64> {
        let mut st = self.state.lock().unwrap();
        while st.passes <= seen_passes {
            if cancel.is_cancelled() {
                return Err(SchedError::Interrupted);
            }
            let (guard, _timeout) = self.signal.wait_timeout(st, WAIT_SLICE).unwrap();
            st = guard;
        }
        Ok(st.passes)
    }
}
