//! Integer-factor downscaling.
//!
//! The raster is first blurred with a box filter whose size is the nearest
//! odd integer not below the factor, then every `factor`-th pixel is kept:
//! `dst(ox, oy) = blurred(ox * factor, oy * factor)`. Blurring first keeps the
//! subsampling from aliasing.

use crate::backend::ExecutionBackend;
use crate::image::Raster;
use crate::util::{StereoError, StereoResult};

/// Box filter size used before subsampling by `factor`.
pub fn blur_size(factor: usize) -> usize {
    if factor % 2 == 0 {
        factor + 1
    } else {
        factor
    }
}

/// Downscales `raster` by an integer factor on the calling thread.
///
/// Factors of 0 or 1 return the input untouched. The output is
/// `floor(width / factor)` x `floor(height / factor)`; an empty result is
/// rejected with [`StereoError::InvalidDimensions`]. See
/// [`ExecutionBackend::downscale`] for the other backends.
pub fn downscale(raster: Raster, factor: usize) -> StereoResult<Raster> {
    ExecutionBackend::Sequential.downscale(raster, factor)
}

/// Output dimensions for `factor`; fails when either would be zero.
pub(crate) fn downscaled_size(
    width: usize,
    height: usize,
    factor: usize,
) -> StereoResult<(usize, usize)> {
    let dst_width = width / factor;
    let dst_height = height / factor;
    if dst_width == 0 || dst_height == 0 {
        return Err(StereoError::InvalidDimensions {
            width: dst_width,
            height: dst_height,
        });
    }
    Ok((dst_width, dst_height))
}

/// Keeps every `factor`-th pixel of an already blurred raster.
pub(crate) fn subsample(
    blurred: &Raster,
    factor: usize,
    dst_width: usize,
    dst_height: usize,
) -> StereoResult<Raster> {
    let channels = blurred.mode().channels();
    let src_width = blurred.width();
    let src = blurred.data();
    let mut dst = vec![0u8; dst_width * dst_height * channels];
    for (oy, dst_row) in dst.chunks_exact_mut(dst_width * channels).enumerate() {
        let src_row = oy * factor * src_width;
        for ox in 0..dst_width {
            let s = (src_row + ox * factor) * channels;
            dst_row[ox * channels..(ox + 1) * channels].copy_from_slice(&src[s..s + channels]);
        }
    }
    Raster::from_vec(dst, dst_width, dst_height, blurred.mode())
}
