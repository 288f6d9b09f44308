//! Static row partitioning for the thread-pool backend.

use std::ops::Range;

use crate::util::{StereoError, StereoResult};

/// A contiguous band of rows owned by one worker.
///
/// `row_start` is inclusive and `row_end` exclusive.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Partition {
    pub row_start: usize,
    pub row_end: usize,
}

impl Partition {
    pub fn rows(&self) -> Range<usize> {
        self.row_start..self.row_end
    }

    pub fn len(&self) -> usize {
        self.row_end - self.row_start
    }

    pub fn is_empty(&self) -> bool {
        self.row_end <= self.row_start
    }
}

/// Splits the searchable rows `[half, height - half)` into `workers` bands.
///
/// Bands are `height / workers` rows tall; the first starts at the half
/// window and the last stops half a window above the bottom edge. The union
/// covers the searchable rows exactly, with no gaps or overlaps.
///
/// Fails with [`StereoError::InsufficientRows`] when
/// `height <= workers * window_size`.
pub fn partition_rows(
    height: usize,
    window_size: usize,
    workers: usize,
) -> StereoResult<Vec<Partition>> {
    if workers == 0 {
        return Err(StereoError::InvalidInput("worker count must be positive"));
    }
    if window_size % 2 == 0 {
        return Err(StereoError::InvalidWindow { size: window_size });
    }
    if height <= workers.saturating_mul(window_size) {
        return Err(StereoError::InsufficientRows {
            height,
            workers,
            window_size,
        });
    }

    let half = window_size / 2;
    let rows_per_worker = height / workers;
    let partitions = (0..workers)
        .map(|k| {
            let row_start = if k == 0 { half } else { k * rows_per_worker };
            let row_end = if k + 1 == workers {
                height - half
            } else {
                (k + 1) * rows_per_worker
            };
            Partition { row_start, row_end }
        })
        .collect();
    Ok(partitions)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_exact_cover(parts: &[Partition], height: usize, half: usize) {
        assert_eq!(parts.first().unwrap().row_start, half);
        assert_eq!(parts.last().unwrap().row_end, height - half);
        for pair in parts.windows(2) {
            assert_eq!(pair[0].row_end, pair[1].row_start);
        }
        assert!(parts.iter().all(|p| !p.is_empty()));
    }

    #[test]
    fn bands_cover_searchable_rows() {
        let parts = partition_rows(48, 5, 4).unwrap();
        let bands: Vec<_> = parts.iter().map(|p| (p.row_start, p.row_end)).collect();
        assert_eq!(bands, vec![(2, 12), (12, 24), (24, 36), (36, 46)]);
        assert_exact_cover(&parts, 48, 2);
    }

    #[test]
    fn uneven_heights_leave_no_gap() {
        for height in 37..80 {
            let parts = partition_rows(height, 9, 4).unwrap();
            assert_exact_cover(&parts, height, 4);
        }
    }

    #[test]
    fn thin_images_are_rejected() {
        assert_eq!(
            partition_rows(40, 5, 8),
            Err(StereoError::InsufficientRows {
                height: 40,
                workers: 8,
                window_size: 5,
            })
        );
        assert!(partition_rows(41, 5, 8).is_ok());
        assert!(partition_rows(10, 3, 0).is_err());
    }
}
