//! Error types for the hyperstack data model

use thiserror::Error;

/// Result type alias for hyperstack operations
pub type Result<T> = std::result::Result<T, StackError>;

/// Errors that can occur constructing or accessing a hyperstack
#[derive(Error, Debug)]
pub enum StackError {
    #[error("hyperstack dimensions must all be non-zero: {width}x{height}x{depth}, {channels} channels, {time_points} time points")]
    EmptyShape {
        width: usize,
        height: usize,
        depth: usize,
        channels: usize,
        time_points: usize,
    },

    #[error("duplicate channel name: {0}")]
    DuplicateChannel(String),

    #[error("plane ({channel}, {slice}, {time}) out of range for {channels} channels, depth {depth}, {time_points} time points")]
    PlaneOutOfRange {
        channel: usize,
        slice: usize,
        time: usize,
        channels: usize,
        depth: usize,
        time_points: usize,
    },

    #[error("plane shape mismatch: expected {expected_height}x{expected_width}, got {actual_height}x{actual_width}")]
    ShapeMismatch {
        expected_height: usize,
        expected_width: usize,
        actual_height: usize,
        actual_width: usize,
    },
}
