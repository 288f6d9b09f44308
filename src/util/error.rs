//! Error types for stereomatch.

use std::fmt;

use thiserror::Error;

/// Result alias for stereomatch operations.
pub type StereoResult<T> = std::result::Result<T, StereoError>;

/// Errors raised by raster, filtering, matching, and backend operations.
///
/// Every variant is detected before any work starts and is permanent until
/// the caller corrects the offending parameter.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StereoError {
    /// The filter mask cannot be applied (even size, bad divisor, wrong weight count).
    #[error("invalid filter of size {size}: {reason}")]
    InvalidFilter { size: usize, reason: &'static str },
    /// The matching window size is even or zero.
    #[error("window size must be odd, got {size}")]
    InvalidWindow { size: usize },
    /// The matching window is wider than the selected device supports.
    #[error("window size {size} exceeds the device limit of {limit}")]
    WindowTooLarge { size: usize, limit: usize },
    /// The maximum search distance does not fit into a disparity byte.
    #[error("max search distance must be at most {limit}, got {max}")]
    InvalidSearchDistance { max: usize, limit: usize },
    /// Two operands that must share dimensions do not.
    #[error(
        "{context} must have matching dimensions ({left_width}x{left_height} vs {right_width}x{right_height})"
    )]
    SizeMismatch {
        context: &'static str,
        left_width: usize,
        left_height: usize,
        right_width: usize,
        right_height: usize,
    },
    /// A pixel access fell outside the raster extent.
    #[error("pixel ({x}, {y}) is outside the {width}x{height} raster")]
    OutOfBounds {
        x: usize,
        y: usize,
        width: usize,
        height: usize,
    },
    /// The thread-pool partitioning cannot give every worker a full window of rows.
    #[error(
        "image height {height} is too small for {workers} workers with window size {window_size}"
    )]
    InsufficientRows {
        height: usize,
        workers: usize,
        window_size: usize,
    },
    /// A compute device was requested but could not be initialized.
    #[error("compute backend unavailable: {reason}")]
    BackendUnavailable { reason: String },
    /// A kernel program failed to build on the compute device.
    #[error("failed to build kernel `{entry_point}`: {reason}")]
    BuildFailure { entry_point: String, reason: String },
    /// A kernel was dispatched without one of its arguments bound.
    #[error("kernel `{entry_point}` is missing argument {index}")]
    MissingKernelArgument { entry_point: String, index: u32 },
    /// A compute device failed while executing or transferring data.
    #[error("compute device error: {reason}")]
    Device { reason: String },
    /// Image dimensions are zero or overflow.
    #[error("invalid dimensions: {width}x{height}")]
    InvalidDimensions { width: usize, height: usize },
    /// The provided buffer is smaller than required.
    #[error("buffer too small: needed {needed}, got {got}")]
    BufferTooSmall { needed: usize, got: usize },
    /// The raster has the wrong channel layout for the operation.
    #[error("{context} requires a {expected} raster, got {got}")]
    UnsupportedChannelMode {
        context: &'static str,
        expected: ChannelLabel,
        got: ChannelLabel,
    },
    /// The input data or parameters are invalid.
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),
    /// Image decode/encode failure.
    #[cfg(feature = "image-io")]
    #[error("image I/O failed: {reason}")]
    ImageIo { reason: String },
}

/// Channel layout name carried by [`StereoError::UnsupportedChannelMode`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelLabel {
    Gray,
    Rgba,
}

impl fmt::Display for ChannelLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelLabel::Gray => f.write_str("single-channel"),
            ChannelLabel::Rgba => f.write_str("RGBA"),
        }
    }
}

/// Pipeline stage that produced a [`PipelineError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    Downscale,
    Grayscale,
    DisparityLeftToRight,
    DisparityRightToLeft,
    CrossCheck,
    OcclusionFill,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Downscale => "downscale",
            Stage::Grayscale => "grayscale conversion",
            Stage::DisparityLeftToRight => "left-to-right disparity",
            Stage::DisparityRightToLeft => "right-to-left disparity",
            Stage::CrossCheck => "cross-check",
            Stage::OcclusionFill => "occlusion fill",
        };
        f.write_str(name)
    }
}

/// A stage failure reported by the stereo pipeline.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("{stage} failed: {source}")]
pub struct PipelineError {
    pub stage: Stage,
    #[source]
    pub source: StereoError,
}

impl PipelineError {
    pub(crate) fn at(stage: Stage) -> impl FnOnce(StereoError) -> Self {
        move |source| Self { stage, source }
    }
}
