//! Shared utility helpers.

pub mod error;

pub use error::{ChannelLabel, PipelineError, Stage, StereoError, StereoResult};
