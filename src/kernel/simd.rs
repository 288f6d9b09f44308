//! SIMD window kernel using the `wide` crate.
//!
//! Window rows are processed eight pixels at a time in `i32x8` lanes, with a
//! scalar tail. The lanes are folded into `i64` totals after every window
//! row, so the sums stay exact and results match
//! [`ZnccScalar`](crate::kernel::scalar::ZnccScalar) for any window size.

use crate::kernel::{WindowSums, ZnccKernel};
use crate::ImageView;
use wide::i32x8;

const LANES: usize = 8;

/// Load 8 u8 values, widen to i32 and subtract `mean`.
#[inline]
fn load_centered(slice: &[u8], mean: i32x8) -> i32x8 {
    i32x8::from([
        slice[0] as i32,
        slice[1] as i32,
        slice[2] as i32,
        slice[3] as i32,
        slice[4] as i32,
        slice[5] as i32,
        slice[6] as i32,
        slice[7] as i32,
    ]) - mean
}

/// Horizontal sum widened to i64.
#[inline]
fn hsum(v: i32x8) -> i64 {
    v.to_array().iter().map(|&lane| i64::from(lane)).sum()
}

/// Vectorized kernel.
pub struct ZnccSimd;

impl ZnccKernel for ZnccSimd {
    fn window_sums(
        reference: ImageView<'_, u8>,
        other: ImageView<'_, u8>,
        x: usize,
        ox: usize,
        y: usize,
        half: usize,
        ref_mean: i32,
        other_mean: i32,
    ) -> WindowSums {
        let side = 2 * half + 1;
        let simd_end = side / LANES * LANES;
        let ref_mean_v = i32x8::splat(ref_mean);
        let other_mean_v = i32x8::splat(other_mean);

        let mut cross = 0i64;
        let mut ref_sq = 0i64;
        let mut other_sq = 0i64;

        for wy in y - half..=y + half {
            let ref_row = &reference.row_unchecked(wy)[x - half..x - half + side];
            let other_row = &other.row_unchecked(wy)[ox - half..ox - half + side];

            // Lanes are flushed to i64 after each row.
            let mut cross_v = i32x8::splat(0);
            let mut ref_sq_v = i32x8::splat(0);
            let mut other_sq_v = i32x8::splat(0);
            let mut wx = 0;
            while wx < simd_end {
                let l = load_centered(&ref_row[wx..], ref_mean_v);
                let r = load_centered(&other_row[wx..], other_mean_v);
                cross_v += l * r;
                ref_sq_v += l * l;
                other_sq_v += r * r;
                wx += LANES;
            }
            cross += hsum(cross_v);
            ref_sq += hsum(ref_sq_v);
            other_sq += hsum(other_sq_v);

            while wx < side {
                let l = i64::from(i32::from(ref_row[wx]) - ref_mean);
                let r = i64::from(i32::from(other_row[wx]) - other_mean);
                cross += l * r;
                ref_sq += l * l;
                other_sq += r * r;
                wx += 1;
            }
        }

        WindowSums {
            cross,
            ref_sq,
            other_sq,
        }
    }
}
