//! Occlusion filling of invalidated (zero) disparities.

use crate::backend::ExecutionBackend;
use crate::disparity::crosscheck::ValidityMask;
use crate::image::Raster;
use crate::util::{StereoError, StereoResult};

/// How a hole takes its value from the valid pixels on its row.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FillStrategy {
    /// Nearest valid pixel to the left; holes with none stay 0.
    #[default]
    Left,
    /// Nearest valid pixel in either direction, preferring the left on ties.
    Nearest,
}

impl FillStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            FillStrategy::Left => "left",
            FillStrategy::Nearest => "nearest",
        }
    }
}

/// Fills zero pixels with the nearest non-zero pixel to their left.
///
/// Each result depends only on the original row, so the operation is
/// idempotent and rows are independent.
pub fn occlusion_fill(raster: &mut Raster) -> StereoResult<()> {
    occlusion_fill_with(raster, FillStrategy::Left)
}

/// Fills zero pixels using `strategy`. Runs sequentially; see
/// [`ExecutionBackend::occlusion_fill`] for the parallel variants.
pub fn occlusion_fill_with(raster: &mut Raster, strategy: FillStrategy) -> StereoResult<()> {
    ExecutionBackend::Sequential.occlusion_fill(raster, strategy)
}

/// Fills only the pixels `mask` marks invalid; valid pixels, including
/// valid zeros, act as sources and are never overwritten.
pub fn occlusion_fill_masked(
    raster: &mut Raster,
    mask: &ValidityMask,
    strategy: FillStrategy,
) -> StereoResult<()> {
    raster.require_gray("occlusion fill")?;
    if raster.width() != mask.width() || raster.height() != mask.height() {
        return Err(StereoError::SizeMismatch {
            context: "disparity map and validity mask",
            left_width: raster.width(),
            left_height: raster.height(),
            right_width: mask.width(),
            right_height: mask.height(),
        });
    }
    let width = raster.width();
    for (y, row) in raster.data_mut().chunks_exact_mut(width).enumerate() {
        if let Some(valid) = mask.row(y) {
            let holes: Vec<bool> = valid.iter().map(|&v| !v).collect();
            fill_row_holes(row, &holes, strategy);
        }
    }
    Ok(())
}

/// Fills the zero pixels of one row in place.
pub(crate) fn fill_row(row: &mut [u8], strategy: FillStrategy) {
    let holes: Vec<bool> = row.iter().map(|&v| v == 0).collect();
    fill_row_holes(row, &holes, strategy);
}

fn fill_row_holes(row: &mut [u8], holes: &[bool], strategy: FillStrategy) {
    match strategy {
        FillStrategy::Left => {
            let mut carry = None;
            for (value, &hole) in row.iter_mut().zip(holes) {
                if !hole {
                    carry = Some(*value);
                } else if let Some(source) = carry {
                    *value = source;
                }
            }
        }
        FillStrategy::Nearest => {
            let len = row.len();
            let mut left_src = vec![None; len];
            let mut last = None;
            for x in 0..len {
                if !holes[x] {
                    last = Some(x);
                }
                left_src[x] = last;
            }
            let mut next = None;
            for x in (0..len).rev() {
                if !holes[x] {
                    next = Some(x);
                    continue;
                }
                let source = match (left_src[x], next) {
                    (Some(l), Some(r)) => Some(if x - l <= r - x { l } else { r }),
                    (Some(l), None) => Some(l),
                    (None, Some(r)) => Some(r),
                    (None, None) => None,
                };
                if let Some(s) = source {
                    row[x] = row[s];
                }
            }
        }
    }
}

/// Left-scan fill value for pixel `x` of an unmodified row.
#[inline]
pub(crate) fn fill_left_at(row: &[u8], x: usize) -> u8 {
    row[..=x].iter().rev().copied().find(|&v| v != 0).unwrap_or(0)
}

/// Nearest-pixel fill value for pixel `x` of an unmodified row.
#[inline]
pub(crate) fn fill_nearest_at(row: &[u8], x: usize) -> u8 {
    if row[x] != 0 {
        return row[x];
    }
    for k in 1..row.len() {
        if k <= x && row[x - k] != 0 {
            return row[x - k];
        }
        if x + k < row.len() && row[x + k] != 0 {
            return row[x + k];
        }
        if k > x && x + k >= row.len() {
            break;
        }
    }
    0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn left_fill_matches_per_pixel_scan() {
        let original = [0u8, 0, 5, 0, 0, 7, 0, 3, 0];
        let mut row = original;
        fill_row(&mut row, FillStrategy::Left);
        let expected: Vec<u8> = (0..original.len())
            .map(|x| fill_left_at(&original, x))
            .collect();
        assert_eq!(row.to_vec(), expected);
        assert_eq!(row, [0, 0, 5, 5, 5, 7, 7, 3, 3]);
    }

    #[test]
    fn nearest_fill_prefers_left_on_ties() {
        let original = [0u8, 0, 5, 0, 0, 0, 9, 0];
        let mut row = original;
        fill_row(&mut row, FillStrategy::Nearest);
        assert_eq!(row, [5, 5, 5, 5, 5, 9, 9, 9]);
        let expected: Vec<u8> = (0..original.len())
            .map(|x| fill_nearest_at(&original, x))
            .collect();
        assert_eq!(row.to_vec(), expected);
    }

    #[test]
    fn empty_rows_stay_zero() {
        let mut row = [0u8; 6];
        fill_row(&mut row, FillStrategy::Nearest);
        assert_eq!(row, [0; 6]);
    }
}
