//! Disparity search parameters, the matcher entry point, and map post-processing.
//!
//! [`match_disparity`] runs one ZNCC pass in a fixed direction on the
//! selected [`ExecutionBackend`]. Two passes in opposite directions are
//! consolidated with [`cross_check`] and holes are closed with
//! [`occlusion_fill`].

use crate::backend::ExecutionBackend;
use crate::image::{ChannelMode, Raster};
use crate::trace::trace_span;
use crate::util::{StereoError, StereoResult};

pub mod crosscheck;
pub mod occlusion;
pub mod partition;

pub use crosscheck::{consistency_mask, cross_check, ValidityMask, DEFAULT_THRESHOLD};
pub use occlusion::{occlusion_fill, occlusion_fill_masked, occlusion_fill_with, FillStrategy};
pub use partition::{partition_rows, Partition};

/// Largest disparity a single-byte map can hold.
pub const MAX_DISPARITY: usize = u8::MAX as usize;

/// Direction in which the other image is searched.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    /// Decreasing x in the other image (left-to-right matching).
    Left,
    /// Increasing x in the other image (right-to-left matching).
    Right,
}

impl Direction {
    /// Signed unit step along x: -1 for `Left`, +1 for `Right`.
    pub fn step(self) -> i32 {
        match self {
            Direction::Left => -1,
            Direction::Right => 1,
        }
    }

    /// Parses a signed step; negative values mean `Left`.
    pub fn from_step(step: i32) -> Self {
        if step < 0 {
            Direction::Left
        } else {
            Direction::Right
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Left => "left",
            Direction::Right => "right",
        }
    }
}

/// Parameters of one matching pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SearchParams {
    /// Side of the square correlation window; must be odd.
    pub window_size: usize,
    /// Largest candidate disparity.
    pub max_search_distance: usize,
    /// Search direction in the other image.
    pub direction: Direction,
}

impl SearchParams {
    pub fn new(window_size: usize, max_search_distance: usize, direction: Direction) -> Self {
        Self {
            window_size,
            max_search_distance,
            direction,
        }
    }

    /// Checks the window parity and the disparity range.
    pub fn validate(&self) -> StereoResult<()> {
        if self.window_size % 2 == 0 {
            return Err(StereoError::InvalidWindow {
                size: self.window_size,
            });
        }
        if self.max_search_distance > MAX_DISPARITY {
            return Err(StereoError::InvalidSearchDistance {
                max: self.max_search_distance,
                limit: MAX_DISPARITY,
            });
        }
        Ok(())
    }

    /// `(window_size - 1) / 2`.
    pub fn half_window(&self) -> usize {
        self.window_size / 2
    }

    /// Same parameters searching the opposite way.
    pub fn reversed(&self) -> Self {
        let direction = match self.direction {
            Direction::Left => Direction::Right,
            Direction::Right => Direction::Left,
        };
        Self { direction, ..*self }
    }
}

/// Computes the disparity map of `reference` against `other`.
///
/// Both rasters must be single-channel and equally sized. Pixels within
/// half a window of any edge stay 0. Every written value lies in
/// `[0, max_search_distance]`.
pub fn match_disparity(
    reference: &Raster,
    other: &Raster,
    params: SearchParams,
    backend: &ExecutionBackend,
) -> StereoResult<Raster> {
    params.validate()?;
    reference.require_gray("disparity matching")?;
    other.require_gray("disparity matching")?;
    if !reference.same_size(other) {
        return Err(StereoError::SizeMismatch {
            context: "reference and other images",
            left_width: reference.width(),
            left_height: reference.height(),
            right_width: other.width(),
            right_height: other.height(),
        });
    }

    let _span = trace_span!(
        "match_disparity",
        window = params.window_size,
        max_distance = params.max_search_distance,
        direction = params.direction.as_str(),
        backend = backend.name()
    )
    .entered();

    let data = backend.compute_disparity(reference.view()?, other.view()?, &params)?;
    Raster::from_vec(
        data,
        reference.width(),
        reference.height(),
        ChannelMode::Gray,
    )
}

/// Stretches a map's value range linearly onto `[0, 255]` for display.
///
/// A constant map is returned unchanged.
pub fn normalize_disparity(map: &Raster) -> StereoResult<Raster> {
    map.require_gray("disparity normalization")?;
    let data = map.data();
    let (min, max) = data
        .iter()
        .fold((u8::MAX, u8::MIN), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    if min >= max {
        return Ok(map.clone());
    }
    let range = u32::from(max - min);
    let scaled = data
        .iter()
        .map(|&v| ((u32::from(v - min) * 255 + range / 2) / range) as u8)
        .collect();
    Raster::from_vec(scaled, map.width(), map.height(), ChannelMode::Gray)
}
