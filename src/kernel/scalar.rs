//! Scalar reference kernel.

use crate::kernel::{WindowSums, ZnccKernel};
use crate::ImageView;

/// Plain loop over the window, one pixel pair at a time.
pub struct ZnccScalar;

impl ZnccKernel for ZnccScalar {
    #[inline]
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
        let mut cross = 0i64;
        let mut ref_sq = 0i64;
        let mut other_sq = 0i64;

        for wy in y - half..=y + half {
            let ref_row = &reference.row_unchecked(wy)[x - half..x - half + side];
            let other_row = &other.row_unchecked(wy)[ox - half..ox - half + side];
            for (&l, &r) in ref_row.iter().zip(other_row) {
                let left_diff = i64::from(i32::from(l) - ref_mean);
                let right_diff = i64::from(i32::from(r) - other_mean);
                cross += left_diff * right_diff;
                ref_sq += left_diff * left_diff;
                other_sq += right_diff * right_diff;
            }
        }

        WindowSums {
            cross,
            ref_sq,
            other_sq,
        }
    }
}
