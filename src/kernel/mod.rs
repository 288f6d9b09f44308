//! ZNCC window kernels and the per-pixel disparity search.
//!
//! A kernel only computes the zero-mean window statistics for one candidate
//! placement. Everything else (search range, tie-breaking, output layout)
//! lives in [`best_disparity`] and [`match_rows`], which every execution
//! backend shares. All window statistics are exact integers, so the scalar,
//! SIMD, and device paths agree bit for bit.

use std::ops::Range;

use crate::disparity::{Direction, SearchParams};
use crate::ImageView;

pub mod scalar;

#[cfg(feature = "simd")]
pub mod simd;

#[cfg(feature = "rayon")]
pub mod rayon;

#[cfg(not(feature = "simd"))]
pub use scalar::ZnccScalar as ActiveKernel;
#[cfg(feature = "simd")]
pub use simd::ZnccSimd as ActiveKernel;

/// Zero-mean sums over one pair of windows.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WindowSums {
    /// Sum of `(ref - ref_mean) * (other - other_mean)`.
    pub cross: i64,
    /// Sum of `(ref - ref_mean)^2`.
    pub ref_sq: i64,
    /// Sum of `(other - other_mean)^2`.
    pub other_sq: i64,
}

impl WindowSums {
    /// Normalized cross-correlation of the two windows.
    ///
    /// A flat window (zero variance on either side) scores 0.
    #[inline]
    pub fn correlation(&self) -> f32 {
        if self.ref_sq == 0 || self.other_sq == 0 {
            return 0.0;
        }
        self.cross as f32 / ((self.ref_sq as f32).sqrt() * (self.other_sq as f32).sqrt())
    }
}

/// Computes window statistics for one candidate placement.
pub trait ZnccKernel {
    /// Sums over the `(2 * half + 1)^2` windows centred on `(x, y)` in
    /// `reference` and `(ox, y)` in `other`. Both windows must be in bounds.
    #[allow(clippy::too_many_arguments)]
    fn window_sums(
        reference: ImageView<'_, u8>,
        other: ImageView<'_, u8>,
        x: usize,
        ox: usize,
        y: usize,
        half: usize,
        ref_mean: i32,
        other_mean: i32,
    ) -> WindowSums;
}

/// Largest candidate distance that keeps the `other` window inside the image.
#[inline]
pub fn search_limit(width: usize, x: usize, half: usize, params: &SearchParams) -> usize {
    let room = match params.direction {
        Direction::Left => x - half,
        Direction::Right => width - 1 - half - x,
    };
    params.max_search_distance.min(room)
}

/// Returns `true` when `(x, y)` is at least `half` pixels from every edge.
#[inline]
pub fn is_searchable(x: usize, y: usize, width: usize, height: usize, half: usize) -> bool {
    x >= half && y >= half && x + half < width && y + half < height
}

/// Best disparity for the reference pixel `(x, y)`.
///
/// Candidates `d = 0..=limit` are visited in order and only a strictly
/// higher correlation replaces the current best, which starts at `(0, 0.0)`.
/// The caller guarantees `(x, y)` is searchable.
pub fn best_disparity<K: ZnccKernel>(
    reference: ImageView<'_, u8>,
    other: ImageView<'_, u8>,
    x: usize,
    y: usize,
    params: &SearchParams,
) -> u8 {
    let half = params.half_window();
    let ref_mean = reference.window_mean(x, y, half);
    let limit = search_limit(reference.width(), x, half, params);

    let mut best_d = 0usize;
    let mut best_score = 0.0f32;
    for d in 0..=limit {
        let ox = match params.direction {
            Direction::Left => x - d,
            Direction::Right => x + d,
        };
        let other_mean = other.window_mean(ox, y, half);
        let sums = K::window_sums(reference, other, x, ox, y, half, ref_mean, other_mean);
        let score = sums.correlation();
        if score > best_score {
            best_score = score;
            best_d = d;
        }
    }
    best_d as u8
}

/// Fills `out` with disparities for the rows in `rows`.
///
/// `out` holds exactly `rows.len()` full image rows; pixels closer than the
/// half window to the left/right edge are left untouched.
pub fn match_rows<K: ZnccKernel>(
    reference: ImageView<'_, u8>,
    other: ImageView<'_, u8>,
    params: &SearchParams,
    rows: Range<usize>,
    out: &mut [u8],
) {
    let width = reference.width();
    let half = params.half_window();
    if width <= 2 * half {
        return;
    }
    for (y, out_row) in rows.zip(out.chunks_exact_mut(width)) {
        for (x, slot) in out_row.iter_mut().enumerate().take(width - half).skip(half) {
            *slot = best_disparity::<K>(reference, other, x, y, params);
        }
    }
}

/// Interior row range `[half, height - half)` searched by the matcher.
pub fn searchable_rows(height: usize, half: usize) -> Range<usize> {
    if height <= 2 * half {
        return 0..0;
    }
    half..height - half
}
