//! Rasters, borrowed views, and the preprocessing stages.
//!
//! [`Raster`] owns a pixel buffer in one of two channel layouts and is what
//! pipeline stages hand to each other. [`ImageView`] is a borrowed,
//! single-channel 2D view with an explicit stride; the matching kernels read
//! through views so that bands and workers can share the inputs without
//! copying.

use crate::util::{StereoError, StereoResult};

pub mod downscale;
pub mod filter;
pub mod grayscale;
#[cfg(feature = "image-io")]
pub mod io;
pub mod raster;

pub use raster::{ChannelMode, Pixel, Raster};

/// Borrowed 2D image view with an explicit stride.
#[derive(Copy, Clone, Debug)]
pub struct ImageView<'a, T> {
    data: &'a [T],
    width: usize,
    height: usize,
    stride: usize,
}

impl<'a, T> ImageView<'a, T> {
    /// Creates a contiguous view with `stride == width`.
    pub fn from_slice(data: &'a [T], width: usize, height: usize) -> StereoResult<Self> {
        Self::new(data, width, height, width)
    }

    /// Creates a view with an explicit stride.
    pub fn new(data: &'a [T], width: usize, height: usize, stride: usize) -> StereoResult<Self> {
        let needed = required_len(width, height, stride)?;
        if data.len() < needed {
            return Err(StereoError::BufferTooSmall {
                needed,
                got: data.len(),
            });
        }
        Ok(Self {
            data,
            width,
            height,
            stride,
        })
    }

    /// Returns the image width in pixels.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Returns the image height in pixels.
    pub fn height(&self) -> usize {
        self.height
    }

    /// Returns the stride in elements between row starts.
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Returns the element at `(x, y)` if it is within bounds.
    pub fn get(&self, x: usize, y: usize) -> Option<&'a T> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = y.checked_mul(self.stride)?.checked_add(x)?;
        self.data.get(idx)
    }

    /// Returns a contiguous slice for row `y` with length `width`.
    pub fn row(&self, y: usize) -> Option<&'a [T]> {
        if y >= self.height {
            return None;
        }
        let start = y.checked_mul(self.stride)?;
        let end = start.checked_add(self.width)?;
        self.data.get(start..end)
    }

    /// Row access for kernels that have already bounded `y`.
    #[inline]
    pub(crate) fn row_unchecked(&self, y: usize) -> &'a [T] {
        let start = y * self.stride;
        &self.data[start..start + self.width]
    }

    /// Returns `true` when both views have the same width and height.
    pub fn same_size<U>(&self, other: &ImageView<'_, U>) -> bool {
        self.width == other.width && self.height == other.height
    }
}

impl ImageView<'_, u8> {
    /// Integer mean of the square window of radius `half` centred on `(cx, cy)`.
    ///
    /// The window is clipped to the view; offsets falling outside are skipped
    /// and the divisor shrinks accordingly. Returns 0 for an empty window.
    pub fn window_mean(&self, cx: usize, cy: usize, half: usize) -> i32 {
        let x0 = cx.saturating_sub(half);
        let y0 = cy.saturating_sub(half);
        let x1 = (cx + half + 1).min(self.width);
        let y1 = (cy + half + 1).min(self.height);
        if x0 >= x1 || y0 >= y1 {
            return 0;
        }

        let mut sum = 0u32;
        for y in y0..y1 {
            sum += self.row_unchecked(y)[x0..x1]
                .iter()
                .map(|&v| u32::from(v))
                .sum::<u32>();
        }
        let count = ((x1 - x0) * (y1 - y0)) as u32;
        (sum / count) as i32
    }
}

fn required_len(width: usize, height: usize, stride: usize) -> StereoResult<usize> {
    if width == 0 || height == 0 {
        return Err(StereoError::InvalidDimensions { width, height });
    }
    if stride < width {
        return Err(StereoError::InvalidInput(
            "stride must be at least the width",
        ));
    }
    let needed = (height - 1)
        .checked_mul(stride)
        .and_then(|v| v.checked_add(width))
        .ok_or(StereoError::InvalidDimensions { width, height })?;
    Ok(needed)
}

#[cfg(test)]
mod tests {
    use super::ImageView;

    #[test]
    fn window_mean_truncates() {
        // 3x3 window over values 0..9 sums to 36, mean 4.
        let data: Vec<u8> = (0u8..9).collect();
        let view = ImageView::from_slice(&data, 3, 3).unwrap();
        assert_eq!(view.window_mean(1, 1, 1), 4);
    }

    #[test]
    fn window_mean_clips_at_corner() {
        let data = [10u8, 20, 30, 40];
        let view = ImageView::from_slice(&data, 2, 2).unwrap();
        // Window of radius 1 around (0, 0) keeps all four pixels.
        assert_eq!(view.window_mean(0, 0, 1), 25);
    }

    #[test]
    fn row_respects_stride() {
        let data: Vec<u8> = (0u8..12).collect();
        let view = ImageView::new(&data, 3, 3, 4).unwrap();
        assert_eq!(view.row(1).unwrap(), &[4u8, 5, 6]);
        assert!(view.row(3).is_none());
        assert_eq!(view.get(2, 2).copied(), Some(10));
    }
}
