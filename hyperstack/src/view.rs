//! Region-scoped views into a hyperstack
//!
//! A `StackView` is what a decomposed unit of work receives: the whole
//! hyperstack for a 4D plugin, one channel volume for a 3D plugin, or
//! one (channel, slice) plane for a 2D plugin. Views address planes
//! with region-relative indices so plugin code iterates `0..n_channels`
//! and `0..n_slices` regardless of where its region sits in the stack.

use crate::error::{Result, StackError};
use crate::stack::Hyperstack;
use ndarray::Array2;
use std::sync::Arc;

/// The portion of a hyperstack a view exposes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Region {
    /// The whole hyperstack (4D plugins).
    Whole,
    /// One channel volume (3D plugins).
    Channel(usize),
    /// One plane of one channel (2D plugins).
    Plane { channel: usize, slice: usize },
}

/// A borrowed-for-the-run handle onto part of a hyperstack.
///
/// Views are cheap to clone (an `Arc` plus a region tag) and are
/// created by the decomposer; two views only alias when the decomposer
/// intentionally hands the same region to two units.
#[derive(Clone)]
pub struct StackView {
    stack: Arc<Hyperstack>,
    region: Region,
}

impl StackView {
    /// View covering the whole hyperstack.
    pub fn whole(stack: Arc<Hyperstack>) -> Self {
        StackView {
            stack,
            region: Region::Whole,
        }
    }

    /// View covering one channel volume.
    pub fn channel(stack: Arc<Hyperstack>, channel: usize) -> Result<Self> {
        if channel >= stack.n_channels() {
            return Err(StackError::PlaneOutOfRange {
                channel,
                slice: 0,
                time: 0,
                channels: stack.n_channels(),
                depth: stack.depth(),
                time_points: stack.time_points(),
            });
        }
        Ok(StackView {
            stack,
            region: Region::Channel(channel),
        })
    }

    /// View covering a single plane.
    pub fn plane(stack: Arc<Hyperstack>, channel: usize, slice: usize) -> Result<Self> {
        if channel >= stack.n_channels() || slice >= stack.depth() {
            return Err(StackError::PlaneOutOfRange {
                channel,
                slice,
                time: 0,
                channels: stack.n_channels(),
                depth: stack.depth(),
                time_points: stack.time_points(),
            });
        }
        Ok(StackView {
            stack,
            region: Region::Plane { channel, slice },
        })
    }

    pub fn region(&self) -> Region {
        self.region
    }

    pub fn stack(&self) -> &Arc<Hyperstack> {
        &self.stack
    }

    pub fn width(&self) -> usize {
        self.stack.width()
    }

    pub fn height(&self) -> usize {
        self.stack.height()
    }

    pub fn time_points(&self) -> usize {
        self.stack.time_points()
    }

    /// Channels addressable through this view.
    pub fn n_channels(&self) -> usize {
        match self.region {
            Region::Whole => self.stack.n_channels(),
            Region::Channel(_) | Region::Plane { .. } => 1,
        }
    }

    /// Slices addressable through this view.
    pub fn n_slices(&self) -> usize {
        match self.region {
            Region::Whole | Region::Channel(_) => self.stack.depth(),
            Region::Plane { .. } => 1,
        }
    }

    /// Map region-relative (channel, slice) to absolute stack indices.
    fn resolve(&self, channel: usize, slice: usize) -> Result<(usize, usize)> {
        if channel >= self.n_channels() || slice >= self.n_slices() {
            return Err(StackError::PlaneOutOfRange {
                channel,
                slice,
                time: 0,
                channels: self.n_channels(),
                depth: self.n_slices(),
                time_points: self.stack.time_points(),
            });
        }
        Ok(match self.region {
            Region::Whole => (channel, slice),
            Region::Channel(c) => (c, slice),
            Region::Plane { channel: c, slice: z } => (c, z),
        })
    }

    /// Copy out one plane, addressed relative to the view's region.
    pub fn read_plane(&self, channel: usize, slice: usize, time: usize) -> Result<Array2<f32>> {
        let (c, z) = self.resolve(channel, slice)?;
        self.stack.read_plane(c, z, time)
    }

    /// Replace one plane, addressed relative to the view's region.
    pub fn write_plane(
        &self,
        channel: usize,
        slice: usize,
        time: usize,
        data: Array2<f32>,
    ) -> Result<()> {
        let (c, z) = self.resolve(channel, slice)?;
        self.stack.write_plane(c, z, time, data)
    }

    /// Mutate one plane in place, addressed relative to the view's region.
    pub fn update_plane<F>(&self, channel: usize, slice: usize, time: usize, f: F) -> Result<()>
    where
        F: FnOnce(&mut Array2<f32>),
    {
        let (c, z) = self.resolve(channel, slice)?;
        self.stack.update_plane(c, z, time, f)
    }
}

impl std::fmt::Debug for StackView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StackView")
            .field("stack", &self.stack.name())
            .field("region", &self.region)
            .finish()
    }
}
