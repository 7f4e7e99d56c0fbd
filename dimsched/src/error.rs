//! Error types for the scheduler

use thiserror::Error;

/// Result type alias for scheduler operations
pub type Result<T> = std::result::Result<T, SchedError>;

/// Errors surfaced by a scheduler run.
///
/// `Config` is fatal and never retried. `Unit` aborts the whole batch:
/// the run stops admitting new units, drains in-flight ones and
/// surfaces the first failure attributed to its work index. `Interrupted`
/// is the expected outcome of cooperative cancellation; outputs may be
/// partially computed and must be treated as advisory.
#[derive(Error, Debug)]
pub enum SchedError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("unit of work {index} failed: {message}")]
    Unit { index: usize, message: String },

    #[error("run interrupted")]
    Interrupted,

    #[error("hyperstack error: {0}")]
    Stack(#[from] hyperstack::StackError),
}

impl SchedError {
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    pub fn is_interrupted(&self) -> bool {
        matches!(self, Self::Interrupted)
    }
}
