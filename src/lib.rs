//! Stereomatch computes dense disparity maps from rectified stereo pairs
//! using zero-mean normalized cross-correlation (ZNCC).
//!
//! The pipeline downsamples both images, converts them to grayscale, matches
//! left-to-right and right-to-left, invalidates pixels where the two passes
//! disagree, and fills the holes from neighbouring valid pixels. Matching
//! runs on a runtime-selected [`ExecutionBackend`]: sequential, a rayon
//! worker pool (`rayon` feature), or per-pixel kernels on a
//! [`backend::ComputeDevice`] (host emulation, or wgpu with the `gpu`
//! feature). All backends produce identical maps.

pub mod backend;
pub mod disparity;
pub mod image;
pub mod kernel;
pub mod lowlevel;
pub mod pipeline;
mod trace;
pub mod util;

pub use backend::ExecutionBackend;
pub use disparity::{
    consistency_mask, cross_check, match_disparity, normalize_disparity, occlusion_fill,
    occlusion_fill_masked, occlusion_fill_with, Direction, FillStrategy, SearchParams,
    ValidityMask, DEFAULT_THRESHOLD, MAX_DISPARITY,
};
pub use image::downscale::downscale;
pub use image::filter::{apply_filter, filter_mean, Filter};
pub use image::grayscale::to_grayscale;
pub use image::{ChannelMode, ImageView, Pixel, Raster};
pub use pipeline::{StereoConfig, StereoOutput, StereoPipeline};
pub use util::{PipelineError, Stage, StereoError, StereoResult};

#[cfg(feature = "image-io")]
pub use image::io::{load_raster, save_raster};
