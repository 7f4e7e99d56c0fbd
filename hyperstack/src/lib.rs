//! 5D image hyperstack data model
//!
//! This crate provides the logical 5D array (width × height × depth ×
//! channel × time) that pipeline plugins operate on, together with
//! lightweight views that scope a plugin invocation to a single plane,
//! a single channel volume, or the whole hyperstack.
//!
//! # Storage
//!
//! Pixel data is stored as one `ndarray::Array2<f32>` plane per
//! (channel, slice, time-point), each behind its own `Mutex`. Units of
//! work decomposed by a scheduler touch disjoint planes, so plane
//! locks are never contended in the common case; they exist so that
//! intentionally aliased output views stay sound.
//!
//! # Example
//!
//! ```rust,ignore
//! use hyperstack::{Hyperstack, StackView};
//! use std::sync::Arc;
//!
//! let stack = Arc::new(Hyperstack::new("dapi", 64, 64, 8, vec!["ch0".into()], 1)?);
//! let view = StackView::channel(Arc::clone(&stack), 0)?;
//! let plane = view.read_plane(0, 3, 0)?;
//! ```

pub mod error;
pub mod stack;
pub mod view;

pub use error::{Result, StackError};
pub use stack::Hyperstack;
pub use view::{Region, StackView};
