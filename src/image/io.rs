//! Loading and saving rasters through the `image` crate.
//!
//! Available when the `image-io` feature is enabled.

use crate::image::{ChannelMode, Raster};
use crate::util::{StereoError, StereoResult};
use std::path::Path;

/// Converts a decoded image into an RGBA raster.
pub fn raster_from_dynamic(img: &image::DynamicImage) -> StereoResult<Raster> {
    let rgba = img.to_rgba8();
    let width = rgba.width() as usize;
    let height = rgba.height() as usize;
    Raster::from_vec(rgba.into_raw(), width, height, ChannelMode::Rgba)
}

/// Converts a raster into an `image` buffer of matching depth.
pub fn raster_to_dynamic(raster: &Raster) -> StereoResult<image::DynamicImage> {
    let width = raster.width() as u32;
    let height = raster.height() as u32;
    let data = raster.data().to_vec();
    let encoded = match raster.mode() {
        ChannelMode::Gray => {
            image::GrayImage::from_raw(width, height, data).map(image::DynamicImage::ImageLuma8)
        }
        ChannelMode::Rgba => {
            image::RgbaImage::from_raw(width, height, data).map(image::DynamicImage::ImageRgba8)
        }
    };
    encoded.ok_or(StereoError::BufferTooSmall {
        needed: raster.width() * raster.height() * raster.mode().channels(),
        got: raster.data().len(),
    })
}

/// Loads an image file as an RGBA raster.
pub fn load_raster<P: AsRef<Path>>(path: P) -> StereoResult<Raster> {
    let img = image::open(path).map_err(|err| StereoError::ImageIo {
        reason: err.to_string(),
    })?;
    raster_from_dynamic(&img)
}

/// Saves a raster; the format is inferred from the file extension.
pub fn save_raster<P: AsRef<Path>>(raster: &Raster, path: P) -> StereoResult<()> {
    raster_to_dynamic(raster)?
        .save(path)
        .map_err(|err| StereoError::ImageIo {
            reason: err.to_string(),
        })
}
