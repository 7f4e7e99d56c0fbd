//! The 5D hyperstack: width × height × depth × channel × time
//!
//! Planes are stored channel-major within a time point, matching the
//! order in which a slice-level decomposition walks them.

use crate::error::{Result, StackError};
use ndarray::Array2;
use std::sync::Mutex;

/// Logical 5D image array with named channels.
///
/// The pixel payload is one `Array2<f32>` plane (height × width) per
/// (channel, slice, time-point). Planes are individually locked so
/// concurrent units of work writing to disjoint planes never block
/// each other.
pub struct Hyperstack {
    name: String,
    width: usize,
    height: usize,
    depth: usize,
    time_points: usize,
    channel_names: Vec<String>,
    planes: Vec<Mutex<Array2<f32>>>,
}

impl Hyperstack {
    /// Create a zero-filled hyperstack. All dimensions must be non-zero
    /// and channel names must be unique.
    pub fn new(
        name: &str,
        width: usize,
        height: usize,
        depth: usize,
        channel_names: Vec<String>,
        time_points: usize,
    ) -> Result<Self> {
        if width == 0 || height == 0 || depth == 0 || time_points == 0 || channel_names.is_empty()
        {
            return Err(StackError::EmptyShape {
                width,
                height,
                depth,
                channels: channel_names.len(),
                time_points,
            });
        }
        for (i, n) in channel_names.iter().enumerate() {
            if channel_names[..i].contains(n) {
                return Err(StackError::DuplicateChannel(n.clone()));
            }
        }

        let n_planes = depth * channel_names.len() * time_points;
        let planes = (0..n_planes)
            .map(|_| Mutex::new(Array2::zeros((height, width))))
            .collect();

        log::debug!(
            "allocated hyperstack '{}': {}x{}x{}, {} channels, {} time points",
            name,
            width,
            height,
            depth,
            channel_names.len(),
            time_points
        );

        Ok(Hyperstack {
            name: name.to_string(),
            width,
            height,
            depth,
            time_points,
            channel_names,
            planes,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn time_points(&self) -> usize {
        self.time_points
    }

    pub fn n_channels(&self) -> usize {
        self.channel_names.len()
    }

    pub fn channel_names(&self) -> &[String] {
        &self.channel_names
    }

    /// Ordinal of a channel by name, if present.
    pub fn channel_index(&self, name: &str) -> Option<usize> {
        self.channel_names.iter().position(|n| n == name)
    }

    fn plane_slot(&self, channel: usize, slice: usize, time: usize) -> Result<usize> {
        if channel >= self.n_channels() || slice >= self.depth || time >= self.time_points {
            return Err(StackError::PlaneOutOfRange {
                channel,
                slice,
                time,
                channels: self.n_channels(),
                depth: self.depth,
                time_points: self.time_points,
            });
        }
        Ok((time * self.n_channels() + channel) * self.depth + slice)
    }

    /// Copy out one plane.
    pub fn read_plane(&self, channel: usize, slice: usize, time: usize) -> Result<Array2<f32>> {
        let slot = self.plane_slot(channel, slice, time)?;
        Ok(self.planes[slot].lock().unwrap().clone())
    }

    /// Replace one plane. The replacement must match the stack's
    /// height × width layout.
    pub fn write_plane(
        &self,
        channel: usize,
        slice: usize,
        time: usize,
        data: Array2<f32>,
    ) -> Result<()> {
        let slot = self.plane_slot(channel, slice, time)?;
        let (h, w) = data.dim();
        if h != self.height || w != self.width {
            return Err(StackError::ShapeMismatch {
                expected_height: self.height,
                expected_width: self.width,
                actual_height: h,
                actual_width: w,
            });
        }
        *self.planes[slot].lock().unwrap() = data;
        Ok(())
    }

    /// Mutate one plane in place while holding its lock.
    pub fn update_plane<F>(&self, channel: usize, slice: usize, time: usize, f: F) -> Result<()>
    where
        F: FnOnce(&mut Array2<f32>),
    {
        let slot = self.plane_slot(channel, slice, time)?;
        f(&mut self.planes[slot].lock().unwrap());
        Ok(())
    }

    /// Build a zero-filled hyperstack with the same spatial and temporal
    /// shape as this one but the given channel names. Used to allocate
    /// plugin outputs shaped like their input.
    pub fn duplicate_structure(&self, name: &str, channel_names: &[String]) -> Result<Hyperstack> {
        Hyperstack::new(
            name,
            self.width,
            self.height,
            self.depth,
            channel_names.to_vec(),
            self.time_points,
        )
    }
}

impl std::fmt::Debug for Hyperstack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hyperstack")
            .field("name", &self.name)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("depth", &self.depth)
            .field("channels", &self.channel_names)
            .field("time_points", &self.time_points)
            .finish()
    }
}
