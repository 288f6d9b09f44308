//! Square convolution masks with zero-padded edges.

use crate::backend::ExecutionBackend;
use crate::image::Raster;
use crate::util::{StereoError, StereoResult};

/// A `size` x `size` convolution mask with a divisor.
///
/// Construction checks the weight count and divisor; the odd-size
/// requirement is enforced when the filter is applied.
#[derive(Clone, Debug, PartialEq)]
pub struct Filter {
    size: usize,
    divisor: f32,
    weights: Vec<f32>,
}

impl Filter {
    /// Creates a mask from row-major weights.
    pub fn new(size: usize, divisor: f32, weights: Vec<f32>) -> StereoResult<Self> {
        if size == 0 {
            return Err(StereoError::InvalidFilter {
                size,
                reason: "mask size must be positive",
            });
        }
        if weights.len() != size * size {
            return Err(StereoError::InvalidFilter {
                size,
                reason: "weight count must equal size * size",
            });
        }
        if divisor == 0.0 || !divisor.is_finite() {
            return Err(StereoError::InvalidFilter {
                size,
                reason: "divisor must be finite and non-zero",
            });
        }
        Ok(Self {
            size,
            divisor,
            weights,
        })
    }

    /// All-ones mask divided by `size * size` (box/mean filter).
    pub fn mean(size: usize) -> StereoResult<Self> {
        let count = size * size;
        Self::new(size, count as f32, vec![1.0; count])
    }

    /// Mask side length.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Divisor applied to the accumulated sum.
    pub fn divisor(&self) -> f32 {
        self.divisor
    }

    /// Row-major weights.
    pub fn weights(&self) -> &[f32] {
        &self.weights
    }

    /// Rejects masks without a centre pixel.
    pub(crate) fn check_odd(&self) -> StereoResult<()> {
        if self.size % 2 == 0 {
            return Err(StereoError::InvalidFilter {
                size: self.size,
                reason: "mask size must be odd",
            });
        }
        Ok(())
    }
}

/// Interleaved samples of a raster, as read by the convolution.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Samples<'a> {
    pub data: &'a [u8],
    pub width: usize,
    pub height: usize,
    pub channels: usize,
}

impl<'a> Samples<'a> {
    pub fn of(raster: &'a Raster) -> Self {
        Self {
            data: raster.data(),
            width: raster.width(),
            height: raster.height(),
            channels: raster.mode().channels(),
        }
    }

    /// Samples per row.
    pub fn row_len(&self) -> usize {
        self.width * self.channels
    }
}

/// Convolves every channel of `raster` with `filter` on the calling thread.
///
/// Neighbours outside the raster contribute zero. Each channel result is
/// `sum / divisor` truncated toward zero and saturated to `[0, 255]`. See
/// [`ExecutionBackend::filter`] for the other backends.
pub fn apply_filter(raster: &Raster, filter: &Filter) -> StereoResult<Raster> {
    ExecutionBackend::Sequential.filter(raster, filter)
}

/// Applies a box filter of the given size.
pub fn filter_mean(raster: &Raster, size: usize) -> StereoResult<Raster> {
    apply_filter(raster, &Filter::mean(size)?)
}

/// Filtered value of channel `c` at `(cx, cy)`.
pub(crate) fn filter_sample(
    src: Samples<'_>,
    filter: &Filter,
    cx: usize,
    cy: usize,
    c: usize,
) -> u8 {
    let half = (filter.size / 2) as isize;
    let mut acc = 0.0f32;
    let mut weight = 0usize;
    for dy in -half..=half {
        for dx in -half..=half {
            let w = filter.weights[weight];
            weight += 1;
            let x = cx as isize + dx;
            let y = cy as isize + dy;
            if x < 0 || y < 0 || x >= src.width as isize || y >= src.height as isize {
                continue;
            }
            let idx = (y as usize * src.width + x as usize) * src.channels + c;
            acc += w * f32::from(src.data[idx]);
        }
    }
    // `as` truncates toward zero and saturates; NaN maps to 0.
    (acc / filter.divisor) as u8
}

/// Filters output row `cy`; `out` holds one row of interleaved samples.
pub(crate) fn filter_row(src: Samples<'_>, filter: &Filter, cy: usize, out: &mut [u8]) {
    for (i, slot) in out.iter_mut().enumerate() {
        *slot = filter_sample(src, filter, i / src.channels, cy, i % src.channels);
    }
}
