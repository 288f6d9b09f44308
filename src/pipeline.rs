//! End-to-end stereo pipeline: downscale, grayscale, two matching passes,
//! cross-check, and occlusion fill.

use crate::backend::ExecutionBackend;
use crate::disparity::{match_disparity, Direction, FillStrategy, SearchParams, DEFAULT_THRESHOLD};
use crate::image::Raster;
use crate::trace::{trace_event, trace_span};
use crate::util::{PipelineError, Stage};

/// Pipeline parameters.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StereoConfig {
    /// Correlation window side; must be odd.
    pub window_size: usize,
    /// Largest disparity searched, in downscaled pixels.
    pub max_search_distance: usize,
    /// Largest tolerated disagreement between the two passes.
    pub cross_check_threshold: u32,
    /// Integer downscale factor applied to both inputs; 0 and 1 keep full size.
    pub downscale_factor: usize,
    /// How invalidated pixels are filled.
    pub fill: FillStrategy,
}

impl Default for StereoConfig {
    fn default() -> Self {
        Self {
            window_size: 9,
            max_search_distance: 32,
            cross_check_threshold: DEFAULT_THRESHOLD,
            downscale_factor: 4,
            fill: FillStrategy::Left,
        }
    }
}

impl StereoConfig {
    /// Left-to-right search parameters.
    pub fn search_params(&self) -> SearchParams {
        SearchParams::new(self.window_size, self.max_search_distance, Direction::Left)
    }
}

/// Every intermediate and final raster of one pipeline run.
#[derive(Clone, Debug)]
pub struct StereoOutput {
    pub gray_left: Raster,
    pub gray_right: Raster,
    /// Left image matched against the right, searching leftward.
    pub disparity_left: Raster,
    /// Right image matched against the left, searching rightward.
    pub disparity_right: Raster,
    pub cross_checked: Raster,
    pub filled: Raster,
}

/// Runs the full pipeline on one backend.
#[derive(Clone, Debug)]
pub struct StereoPipeline {
    config: StereoConfig,
    backend: ExecutionBackend,
}

impl StereoPipeline {
    pub fn new(config: StereoConfig, backend: ExecutionBackend) -> Self {
        Self { config, backend }
    }

    pub fn config(&self) -> &StereoConfig {
        &self.config
    }

    pub fn backend(&self) -> &ExecutionBackend {
        &self.backend
    }

    /// Computes the filled disparity map of `left` against `right`.
    ///
    /// Aborts at the first failing stage; the error names that stage.
    /// Search parameters are validated before any work starts.
    pub fn run(&self, left: Raster, right: Raster) -> Result<StereoOutput, PipelineError> {
        let params = self.config.search_params();
        params
            .validate()
            .map_err(PipelineError::at(Stage::DisparityLeftToRight))?;

        let _span = trace_span!(
            "stereo_pipeline",
            backend = self.backend.name(),
            width = left.width(),
            height = left.height()
        )
        .entered();

        let (left, right) = {
            let _stage = trace_span!("stage", stage = "downscale").entered();
            let factor = self.config.downscale_factor;
            let left = self.backend.downscale(left, factor);
            let right = self.backend.downscale(right, factor);
            (
                left.map_err(PipelineError::at(Stage::Downscale))?,
                right.map_err(PipelineError::at(Stage::Downscale))?,
            )
        };

        let (gray_left, gray_right) = {
            let _stage = trace_span!("stage", stage = "grayscale").entered();
            let left = self.backend.grayscale(left);
            let right = self.backend.grayscale(right);
            (
                left.map_err(PipelineError::at(Stage::Grayscale))?,
                right.map_err(PipelineError::at(Stage::Grayscale))?,
            )
        };

        let disparity_left = match_disparity(&gray_left, &gray_right, params, &self.backend)
            .map_err(PipelineError::at(Stage::DisparityLeftToRight))?;
        let disparity_right =
            match_disparity(&gray_right, &gray_left, params.reversed(), &self.backend)
                .map_err(PipelineError::at(Stage::DisparityRightToLeft))?;

        let cross_checked = {
            let _stage = trace_span!("stage", stage = "cross_check").entered();
            let checked = self
                .backend
                .cross_check(
                    &disparity_left,
                    &disparity_right,
                    self.config.cross_check_threshold,
                )
                .map_err(PipelineError::at(Stage::CrossCheck))?;
            trace_event!("cross_check_done", zero_pixels = count_zeros(&checked));
            checked
        };

        let filled = {
            let _stage = trace_span!("stage", stage = "occlusion_fill").entered();
            let mut filled = cross_checked.clone();
            let before = count_zeros(&filled);
            self.backend
                .occlusion_fill(&mut filled, self.config.fill)
                .map_err(PipelineError::at(Stage::OcclusionFill))?;
            trace_event!(
                "occlusion_fill_done",
                filled_pixels = before - count_zeros(&filled)
            );
            filled
        };

        Ok(StereoOutput {
            gray_left,
            gray_right,
            disparity_left,
            disparity_right,
            cross_checked,
            filled,
        })
    }
}

fn count_zeros(raster: &Raster) -> usize {
    raster.data().iter().filter(|&&v| v == 0).count()
}
