//! Rayon-backed band and row-parallel helpers (feature-gated).
//!
//! The disparity pass uses static row bands: each band runs on its own
//! worker of a fixed-size pool and writes only its own slice of the output,
//! so no synchronization is needed beyond the final join.

use crate::disparity::partition::Partition;
use crate::disparity::SearchParams;
use crate::kernel::{match_rows, ZnccKernel};
use crate::trace::trace_debug;
use crate::ImageView;
use rayon::prelude::*;
use rayon::ThreadPool;

/// Runs one worker per partition on `pool` and joins them.
///
/// `out` is the full `width * height` map. Partitions must be ordered,
/// contiguous, and disjoint.
pub fn match_partitioned<K: ZnccKernel>(
    pool: &ThreadPool,
    reference: ImageView<'_, u8>,
    other: ImageView<'_, u8>,
    params: &SearchParams,
    partitions: &[Partition],
    out: &mut [u8],
) {
    let Some(first) = partitions.first() else {
        return;
    };
    let width = reference.width();
    let (_, mut rest) = out.split_at_mut(first.row_start * width);

    pool.scope(|scope| {
        for (worker, band) in partitions.iter().enumerate() {
            let rows = band.rows();
            let (band_out, tail) = std::mem::take(&mut rest).split_at_mut(rows.len() * width);
            rest = tail;
            trace_debug!(
                "band_start",
                worker = worker,
                row_start = band.row_start,
                row_end = band.row_end
            );
            scope.spawn(move |_| {
                match_rows::<K>(reference, other, params, rows, band_out);
            });
        }
    });
}

/// Applies `op` to every `width`-sized row of `out` in parallel on `pool`.
///
/// `op` receives the row index and the row slice.
pub fn for_each_row<F>(pool: &ThreadPool, out: &mut [u8], width: usize, op: F)
where
    F: Fn(usize, &mut [u8]) + Sync + Send,
{
    pool.install(|| {
        out.par_chunks_exact_mut(width)
            .enumerate()
            .for_each(|(y, row)| op(y, row));
    });
}
