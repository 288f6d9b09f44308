//! RGBA to single-channel conversion.

use crate::backend::ExecutionBackend;
use crate::image::Raster;
use crate::util::StereoResult;

/// NTSC luma weights for red, green, and blue, in thousandths.
const LUMA_WEIGHTS: [u32; 3] = [299, 587, 114];

/// Converts a raster to a single-channel raster on the calling thread.
///
/// Each output value is `ceil(0.299 R + 0.587 G + 0.114 B)`, computed in
/// exact integer arithmetic; alpha is ignored. A single-channel input is
/// returned unchanged. See [`ExecutionBackend::grayscale`] for the other
/// backends.
pub fn to_grayscale(raster: Raster) -> StereoResult<Raster> {
    ExecutionBackend::Sequential.grayscale(raster)
}

/// Writes the luma of every RGBA pixel in `rgba` to `out`.
pub(crate) fn luma_row(rgba: &[u8], out: &mut [u8]) {
    for (px, slot) in rgba.chunks_exact(4).zip(out.iter_mut()) {
        *slot = luma(px[0], px[1], px[2]);
    }
}

#[inline]
pub(crate) fn luma(red: u8, green: u8, blue: u8) -> u8 {
    let weighted = LUMA_WEIGHTS[0] * u32::from(red)
        + LUMA_WEIGHTS[1] * u32::from(green)
        + LUMA_WEIGHTS[2] * u32::from(blue);
    // At most 255_000, so the quotient fits a byte.
    weighted.div_ceil(1000) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn luma_rounds_up() {
        assert_eq!(luma(0, 0, 0), 0);
        assert_eq!(luma(255, 255, 255), 255);
        // 0.299 * 100 = 29.9 -> 30
        assert_eq!(luma(100, 0, 0), 30);
        assert_eq!(luma(0, 0, 9), 2);
    }

    #[test]
    fn neutral_gray_keeps_its_value() {
        for v in [1u8, 37, 100, 128, 254] {
            assert_eq!(luma(v, v, v), v);
        }
    }

    #[test]
    fn luma_row_ignores_alpha() {
        let mut out = [0u8; 2];
        luma_row(&[10, 10, 10, 0, 10, 10, 10, 255], &mut out);
        assert_eq!(out, [10, 10]);
    }
}
