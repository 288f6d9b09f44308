//! Owned pixel rasters.

use crate::image::ImageView;
use crate::util::{ChannelLabel, StereoError, StereoResult};

/// Channel layout of a [`Raster`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelMode {
    /// Four interleaved bytes per pixel: red, green, blue, alpha.
    Rgba,
    /// One byte per pixel.
    Gray,
}

impl ChannelMode {
    /// Bytes per pixel.
    pub fn channels(self) -> usize {
        match self {
            ChannelMode::Rgba => 4,
            ChannelMode::Gray => 1,
        }
    }

    pub(crate) fn label(self) -> ChannelLabel {
        match self {
            ChannelMode::Rgba => ChannelLabel::Rgba,
            ChannelMode::Gray => ChannelLabel::Gray,
        }
    }
}

/// An RGBA pixel value.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Pixel {
    pub red: u8,
    pub green: u8,
    pub blue: u8,
    pub alpha: u8,
}

impl Pixel {
    pub const fn new(red: u8, green: u8, blue: u8, alpha: u8) -> Self {
        Self {
            red,
            green,
            blue,
            alpha,
        }
    }

    /// Opaque gray pixel.
    pub const fn gray(value: u8) -> Self {
        Self::new(value, value, value, 0xff)
    }

    /// Returns `true` when every channel, alpha included, is zero.
    pub fn is_zero(&self) -> bool {
        self.red == 0 && self.green == 0 && self.blue == 0 && self.alpha == 0
    }
}

/// Owned image buffer with explicit dimensions and channel layout.
///
/// Invariant: `data.len() == width * height * mode.channels()`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Raster {
    data: Vec<u8>,
    width: usize,
    height: usize,
    mode: ChannelMode,
}

impl Raster {
    /// Creates a zero-filled raster.
    pub fn new(width: usize, height: usize, mode: ChannelMode) -> StereoResult<Self> {
        let len = buffer_len(width, height, mode)?;
        Ok(Self {
            data: vec![0u8; len],
            width,
            height,
            mode,
        })
    }

    /// Wraps an existing buffer, which must match the dimensions exactly.
    pub fn from_vec(
        data: Vec<u8>,
        width: usize,
        height: usize,
        mode: ChannelMode,
    ) -> StereoResult<Self> {
        let needed = buffer_len(width, height, mode)?;
        if data.len() < needed {
            return Err(StereoError::BufferTooSmall {
                needed,
                got: data.len(),
            });
        }
        if data.len() > needed {
            return Err(StereoError::InvalidDimensions { width, height });
        }
        Ok(Self {
            data,
            width,
            height,
            mode,
        })
    }

    /// Returns the raster width in pixels.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Returns the raster height in pixels.
    pub fn height(&self) -> usize {
        self.height
    }

    /// Returns the channel layout.
    pub fn mode(&self) -> ChannelMode {
        self.mode
    }

    /// Returns the raw interleaved bytes in row-major order.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Returns the raw bytes mutably.
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Consumes the raster and returns its buffer.
    pub fn into_vec(self) -> Vec<u8> {
        self.data
    }

    /// Returns `true` when `other` has the same width and height.
    pub fn same_size(&self, other: &Raster) -> bool {
        self.width == other.width && self.height == other.height
    }

    /// Takes over `other`'s buffer, dimensions, and layout.
    ///
    /// The previous buffer is dropped.
    pub fn replace(&mut self, other: Raster) {
        *self = other;
    }

    /// Returns the pixel at `(x, y)`.
    ///
    /// Single-channel rasters report an opaque gray pixel.
    pub fn get_pixel(&self, x: usize, y: usize) -> StereoResult<Pixel> {
        let idx = self.index(x, y)?;
        Ok(match self.mode {
            ChannelMode::Rgba => Pixel::new(
                self.data[idx],
                self.data[idx + 1],
                self.data[idx + 2],
                self.data[idx + 3],
            ),
            ChannelMode::Gray => Pixel::gray(self.data[idx]),
        })
    }

    /// Writes the pixel at `(x, y)`.
    ///
    /// Single-channel rasters store the red channel.
    pub fn put_pixel(&mut self, x: usize, y: usize, pixel: Pixel) -> StereoResult<()> {
        let idx = self.index(x, y)?;
        match self.mode {
            ChannelMode::Rgba => {
                self.data[idx..idx + 4]
                    .copy_from_slice(&[pixel.red, pixel.green, pixel.blue, pixel.alpha]);
            }
            ChannelMode::Gray => self.data[idx] = pixel.red,
        }
        Ok(())
    }

    /// Returns the first channel at `(x, y)`.
    pub fn get_gray(&self, x: usize, y: usize) -> StereoResult<u8> {
        let idx = self.index(x, y)?;
        Ok(self.data[idx])
    }

    /// Writes a gray value; RGBA rasters receive an opaque gray pixel.
    pub fn put_gray(&mut self, x: usize, y: usize, value: u8) -> StereoResult<()> {
        self.put_pixel(x, y, Pixel::gray(value))
    }

    /// Integer mean of the first channel over a `w` x `h` rectangle at `(x0, y0)`.
    ///
    /// The rectangle must lie inside the raster; callers clip beforehand.
    pub fn gray_average(&self, x0: usize, y0: usize, w: usize, h: usize) -> StereoResult<u8> {
        if w == 0 || h == 0 {
            return Err(StereoError::InvalidDimensions {
                width: w,
                height: h,
            });
        }
        let x1 = x0.saturating_add(w);
        let y1 = y0.saturating_add(h);
        if x1 > self.width || y1 > self.height {
            return Err(StereoError::OutOfBounds {
                x: x1 - 1,
                y: y1 - 1,
                width: self.width,
                height: self.height,
            });
        }

        let channels = self.mode.channels();
        let mut sum = 0u64;
        for y in y0..y1 {
            let start = (y * self.width + x0) * channels;
            let end = (y * self.width + x1) * channels;
            sum += self.data[start..end]
                .iter()
                .step_by(channels)
                .map(|&v| u64::from(v))
                .sum::<u64>();
        }
        Ok((sum / (w * h) as u64) as u8)
    }

    /// Borrows a single-channel raster as an [`ImageView`].
    pub fn view(&self) -> StereoResult<ImageView<'_, u8>> {
        self.require_gray("image view")?;
        ImageView::from_slice(&self.data, self.width, self.height)
    }

    pub(crate) fn require_gray(&self, context: &'static str) -> StereoResult<()> {
        if self.mode != ChannelMode::Gray {
            return Err(StereoError::UnsupportedChannelMode {
                context,
                expected: ChannelLabel::Gray,
                got: self.mode.label(),
            });
        }
        Ok(())
    }

    fn index(&self, x: usize, y: usize) -> StereoResult<usize> {
        if x >= self.width || y >= self.height {
            return Err(StereoError::OutOfBounds {
                x,
                y,
                width: self.width,
                height: self.height,
            });
        }
        Ok((y * self.width + x) * self.mode.channels())
    }
}

fn buffer_len(width: usize, height: usize, mode: ChannelMode) -> StereoResult<usize> {
    if width == 0 || height == 0 {
        return Err(StereoError::InvalidDimensions { width, height });
    }
    width
        .checked_mul(height)
        .and_then(|v| v.checked_mul(mode.channels()))
        .ok_or(StereoError::InvalidDimensions { width, height })
}
