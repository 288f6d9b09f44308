//! Left/right consistency checking.

use crate::backend::ExecutionBackend;
use crate::image::Raster;
use crate::util::{StereoError, StereoResult};

/// Default allowed disagreement between the two disparity maps.
pub const DEFAULT_THRESHOLD: u32 = 8;

/// Consolidated value for one pixel: `left` if the maps agree within
/// `threshold`, otherwise 0.
#[inline]
pub fn check_pixel(left: u8, right: u8, threshold: u32) -> u8 {
    if u32::from(left.abs_diff(right)) > threshold {
        0
    } else {
        left
    }
}

/// Cross-checks `left` against `right` row by row into `out`.
pub(crate) fn check_slices(left: &[u8], right: &[u8], threshold: u32, out: &mut [u8]) {
    for ((o, &l), &r) in out.iter_mut().zip(left).zip(right) {
        *o = check_pixel(l, r, threshold);
    }
}

/// Fails unless both maps are single-channel and equally sized.
pub(crate) fn validate_maps(left: &Raster, right: &Raster) -> StereoResult<()> {
    left.require_gray("cross-check")?;
    right.require_gray("cross-check")?;
    if !left.same_size(right) {
        return Err(StereoError::SizeMismatch {
            context: "disparity maps",
            left_width: left.width(),
            left_height: left.height(),
            right_width: right.width(),
            right_height: right.height(),
        });
    }
    Ok(())
}

/// Zeroes every pixel where `|left - right| > threshold`, keeping `left`
/// elsewhere. Runs sequentially; see [`ExecutionBackend::cross_check`] for
/// the parallel variants.
pub fn cross_check(left: &Raster, right: &Raster, threshold: u32) -> StereoResult<Raster> {
    ExecutionBackend::Sequential.cross_check(left, right, threshold)
}

/// Per-pixel validity of a cross-checked map.
///
/// Unlike the zeroed map, the mask distinguishes an invalidated pixel from a
/// pixel whose agreed disparity is genuinely 0.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidityMask {
    valid: Vec<bool>,
    width: usize,
    height: usize,
}

impl ValidityMask {
    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Returns whether `(x, y)` passed the check; out-of-range pixels are invalid.
    pub fn is_valid(&self, x: usize, y: usize) -> bool {
        x < self.width && y < self.height && self.valid[y * self.width + x]
    }

    /// Row `y` of the mask.
    pub fn row(&self, y: usize) -> Option<&[bool]> {
        if y >= self.height {
            return None;
        }
        Some(&self.valid[y * self.width..(y + 1) * self.width])
    }

    /// Number of pixels that failed the check.
    pub fn invalid_count(&self) -> usize {
        self.valid.iter().filter(|&&v| !v).count()
    }
}

/// Computes which pixels agree within `threshold`.
pub fn consistency_mask(
    left: &Raster,
    right: &Raster,
    threshold: u32,
) -> StereoResult<ValidityMask> {
    validate_maps(left, right)?;
    let valid = left
        .data()
        .iter()
        .zip(right.data())
        .map(|(&l, &r)| u32::from(l.abs_diff(r)) <= threshold)
        .collect();
    Ok(ValidityMask {
        valid,
        width: left.width(),
        height: left.height(),
    })
}
