//! Execution backends for every image operation of the pipeline.
//!
//! Every backend produces byte-identical results: they share the per-pixel
//! routines in [`crate::image`], [`crate::kernel`], and [`crate::disparity`]
//! and differ only in how work is scheduled.
//!
//! - [`ExecutionBackend::Sequential`] walks rows on the calling thread.
//! - [`ExecutionBackend::ThreadPool`] splits matching into static bands, one
//!   per worker of a dedicated rayon pool, and runs the other operations
//!   row-parallel on the same pool.
//! - [`ExecutionBackend::KernelDispatch`] runs named kernels on a
//!   [`ComputeDevice`], one invocation per output pixel.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::disparity::crosscheck::{check_slices, validate_maps};
use crate::disparity::occlusion::fill_row;
use crate::disparity::{FillStrategy, SearchParams};
use crate::image::downscale::{blur_size, downscaled_size, subsample};
use crate::image::filter::{filter_row, Filter, Samples};
use crate::image::grayscale::luma_row;
use crate::image::{ChannelMode, Raster};
use crate::kernel::{match_rows, searchable_rows, ActiveKernel};
use crate::trace::trace_span;
use crate::util::{StereoError, StereoResult};
use crate::ImageView;

pub mod cpu;
pub mod device;
#[cfg(feature = "gpu")]
pub mod wgpu_device;

pub use cpu::CpuDevice;
pub use device::{BufferHandle, ComputeDevice, KernelArgs, ProgramHandle};
#[cfg(feature = "gpu")]
pub use wgpu_device::WgpuDevice;

use device::{
    ARG_INPUT_A, ARG_INPUT_B, ARG_OUTPUT, ARG_SCALAR_BASE, ARG_WEIGHTS, ENTRY_CROSS_CHECK,
    ENTRY_FILL_LEFT, ENTRY_FILL_NEAREST, ENTRY_FILTER, ENTRY_GRAYSCALE, ENTRY_ZNCC, KERNEL_SOURCE,
    LOCAL_SIZE, MAX_DEVICE_WINDOW,
};

/// Fixed-size worker pool for band-parallel matching.
#[cfg(feature = "rayon")]
#[derive(Clone)]
pub struct ThreadPoolBackend {
    pool: Arc<rayon::ThreadPool>,
    workers: usize,
}

#[cfg(feature = "rayon")]
impl ThreadPoolBackend {
    /// Builds a pool with exactly `workers` threads.
    pub fn new(workers: usize) -> StereoResult<Self> {
        if workers == 0 {
            return Err(StereoError::InvalidInput("worker count must be positive"));
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|idx| format!("stereomatch-{idx}"))
            .build()
            .map_err(|e| StereoError::BackendUnavailable {
                reason: format!("failed to build thread pool: {e}"),
            })?;
        Ok(Self {
            pool: Arc::new(pool),
            workers,
        })
    }

    pub fn workers(&self) -> usize {
        self.workers
    }
}

#[cfg(feature = "rayon")]
impl std::fmt::Debug for ThreadPoolBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadPoolBackend")
            .field("workers", &self.workers)
            .finish()
    }
}

/// Host data bound to one input slot of a kernel.
#[derive(Clone, Copy)]
enum KernelInput<'a> {
    Image {
        data: &'a [u8],
        width: usize,
        height: usize,
    },
    Weights(&'a [f32]),
}

fn image(data: &[u8], width: usize, height: usize) -> KernelInput<'_> {
    KernelInput::Image {
        data,
        width,
        height,
    }
}

/// Runs kernels on a compute device, compiling each entry point once.
#[derive(Clone)]
pub struct KernelDispatcher {
    device: Arc<dyn ComputeDevice>,
    programs: Arc<Mutex<HashMap<&'static str, ProgramHandle>>>,
}

impl std::fmt::Debug for KernelDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KernelDispatcher")
            .field("device", &self.device.name())
            .finish()
    }
}

impl KernelDispatcher {
    pub fn new(device: Arc<dyn ComputeDevice>) -> Self {
        Self {
            device,
            programs: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn device(&self) -> &dyn ComputeDevice {
        self.device.as_ref()
    }

    fn program(&self, entry_point: &'static str) -> StereoResult<ProgramHandle> {
        let mut programs = self.programs.lock().map_err(|_| StereoError::Device {
            reason: "program cache lock poisoned".to_string(),
        })?;
        if let Some(program) = programs.get(entry_point) {
            return Ok(program.clone());
        }
        let program = self.device.build_program(KERNEL_SOURCE, entry_point)?;
        programs.insert(entry_point, program.clone());
        Ok(program)
    }

    /// Uploads the inputs, runs `entry_point` over a `width` x `height`
    /// output, and reads it back. Device buffers are released on every path.
    fn run(
        &self,
        entry_point: &'static str,
        inputs: &[(u32, KernelInput<'_>)],
        width: usize,
        height: usize,
        scalars: &[i32],
    ) -> StereoResult<Vec<u8>> {
        let program = self.program(entry_point)?;
        let mut held = Vec::with_capacity(inputs.len() + 1);
        let result = (|| {
            let mut args = KernelArgs::new();
            for &(index, input) in inputs {
                let buffer = match input {
                    KernelInput::Image {
                        data,
                        width,
                        height,
                    } => self.device.upload_image(data, width, height)?,
                    KernelInput::Weights(weights) => self.device.upload_weights(weights)?,
                };
                held.push(buffer);
                args = args.bind_buffer(index, &buffer);
            }
            let out = self.device.create_image(width, height)?;
            held.push(out);
            args = args.bind_buffer(ARG_OUTPUT, &out);
            for (k, &value) in scalars.iter().enumerate() {
                args = args.bind_scalar(ARG_SCALAR_BASE + k as u32, value);
            }
            let _span = trace_span!(
                "kernel_dispatch",
                entry = entry_point,
                device = self.device.name(),
                width = width,
                height = height
            )
            .entered();
            self.device
                .dispatch(&program, &args, [width, height], LOCAL_SIZE)?;
            self.device.download_image(&out)
        })();
        for buffer in held {
            self.device.release(buffer);
        }
        result
    }
}

/// Strategy used to schedule the image operations.
#[derive(Clone, Debug, Default)]
pub enum ExecutionBackend {
    /// Everything on the calling thread.
    #[default]
    Sequential,
    /// Row bands on a fixed-size worker pool.
    #[cfg(feature = "rayon")]
    ThreadPool(ThreadPoolBackend),
    /// Per-pixel kernels on a compute device.
    KernelDispatch(KernelDispatcher),
}

impl ExecutionBackend {
    pub fn sequential() -> Self {
        ExecutionBackend::Sequential
    }

    /// Thread-pool backend with `workers` threads.
    #[cfg(feature = "rayon")]
    pub fn thread_pool(workers: usize) -> StereoResult<Self> {
        ThreadPoolBackend::new(workers).map(ExecutionBackend::ThreadPool)
    }

    /// Kernel-dispatch backend on `device`.
    pub fn kernel_dispatch(device: Arc<dyn ComputeDevice>) -> Self {
        ExecutionBackend::KernelDispatch(KernelDispatcher::new(device))
    }

    /// Kernel-dispatch backend on the host emulation device.
    pub fn cpu_device() -> Self {
        Self::kernel_dispatch(Arc::new(CpuDevice::new()))
    }

    /// Kernel-dispatch backend on the first available GPU.
    #[cfg(feature = "gpu")]
    pub fn gpu() -> StereoResult<Self> {
        let device = WgpuDevice::new()?;
        Ok(Self::kernel_dispatch(Arc::new(device)))
    }

    /// Always fails: the crate was built without the `gpu` feature.
    #[cfg(not(feature = "gpu"))]
    pub fn gpu() -> StereoResult<Self> {
        Err(StereoError::BackendUnavailable {
            reason: "built without the `gpu` feature".to_string(),
        })
    }

    /// Short name used in logs.
    pub fn name(&self) -> &str {
        match self {
            ExecutionBackend::Sequential => "sequential",
            #[cfg(feature = "rayon")]
            ExecutionBackend::ThreadPool(_) => "thread-pool",
            ExecutionBackend::KernelDispatch(_) => "kernel-dispatch",
        }
    }

    /// Computes a full-size disparity map; non-searchable pixels are 0.
    pub(crate) fn compute_disparity(
        &self,
        reference: ImageView<'_, u8>,
        other: ImageView<'_, u8>,
        params: &SearchParams,
    ) -> StereoResult<Vec<u8>> {
        let width = reference.width();
        let height = reference.height();
        let mut out = vec![0u8; width * height];
        match self {
            ExecutionBackend::Sequential => {
                let rows = searchable_rows(height, params.half_window());
                let band = &mut out[rows.start * width..rows.end * width];
                match_rows::<ActiveKernel>(reference, other, params, rows, band);
            }
            #[cfg(feature = "rayon")]
            ExecutionBackend::ThreadPool(tp) => {
                let partitions = crate::disparity::partition_rows(
                    height,
                    params.window_size,
                    tp.workers,
                )?;
                crate::kernel::rayon::match_partitioned::<ActiveKernel>(
                    &tp.pool,
                    reference,
                    other,
                    params,
                    &partitions,
                    &mut out,
                );
            }
            ExecutionBackend::KernelDispatch(dispatcher) => {
                if params.window_size > MAX_DEVICE_WINDOW {
                    return Err(StereoError::WindowTooLarge {
                        size: params.window_size,
                        limit: MAX_DEVICE_WINDOW,
                    });
                }
                let scalars = [
                    params.window_size as i32,
                    params.direction.step(),
                    params.max_search_distance as i32,
                ];
                let a = contiguous(reference);
                let b = contiguous(other);
                out = dispatcher.run(
                    ENTRY_ZNCC,
                    &[
                        (ARG_INPUT_A, image(&a, width, height)),
                        (ARG_INPUT_B, image(&b, width, height)),
                    ],
                    width,
                    height,
                    &scalars,
                )?;
            }
        }
        Ok(out)
    }

    /// Runs one matching pass; see [`crate::match_disparity`].
    pub fn disparity(
        &self,
        reference: &Raster,
        other: &Raster,
        params: SearchParams,
    ) -> StereoResult<Raster> {
        crate::disparity::match_disparity(reference, other, params, self)
    }

    /// Converts an RGBA raster to single-channel; see [`crate::to_grayscale`].
    pub fn grayscale(&self, raster: Raster) -> StereoResult<Raster> {
        if raster.mode() == ChannelMode::Gray {
            return Ok(raster);
        }
        let width = raster.width();
        let height = raster.height();
        let _span = trace_span!(
            "grayscale",
            backend = self.name(),
            width = width,
            height = height
        )
        .entered();

        let src = raster.data();
        let data = match self {
            ExecutionBackend::Sequential => {
                let mut out = vec![0u8; width * height];
                luma_row(src, &mut out);
                out
            }
            #[cfg(feature = "rayon")]
            ExecutionBackend::ThreadPool(tp) => {
                let mut out = vec![0u8; width * height];
                let stride = width * 4;
                crate::kernel::rayon::for_each_row(&tp.pool, &mut out, width, |y, row| {
                    luma_row(&src[y * stride..(y + 1) * stride], row);
                });
                out
            }
            ExecutionBackend::KernelDispatch(dispatcher) => {
                let rgba = image(src, width * 4, height);
                dispatcher.run(ENTRY_GRAYSCALE, &[(ARG_INPUT_A, rgba)], width, height, &[])?
            }
        };
        Raster::from_vec(data, width, height, ChannelMode::Gray)
    }

    /// Convolves every channel of `raster`; see [`crate::apply_filter`].
    pub fn filter(&self, raster: &Raster, filter: &Filter) -> StereoResult<Raster> {
        filter.check_odd()?;
        let _span = trace_span!(
            "filter",
            backend = self.name(),
            size = filter.size(),
            width = raster.width(),
            height = raster.height()
        )
        .entered();

        let src = Samples::of(raster);
        let row_len = src.row_len();
        let data = match self {
            ExecutionBackend::Sequential => {
                let mut out = vec![0u8; raster.data().len()];
                for (y, row) in out.chunks_exact_mut(row_len).enumerate() {
                    filter_row(src, filter, y, row);
                }
                out
            }
            #[cfg(feature = "rayon")]
            ExecutionBackend::ThreadPool(tp) => {
                let mut out = vec![0u8; raster.data().len()];
                crate::kernel::rayon::for_each_row(&tp.pool, &mut out, row_len, |y, row| {
                    filter_row(src, filter, y, row);
                });
                out
            }
            ExecutionBackend::KernelDispatch(dispatcher) => {
                let Ok(size) = i32::try_from(filter.size()) else {
                    return Err(StereoError::InvalidFilter {
                        size: filter.size(),
                        reason: "mask size exceeds the device range",
                    });
                };
                let divisor = filter.divisor().to_bits() as i32;
                let scalars = [size, src.channels as i32, divisor];
                dispatcher.run(
                    ENTRY_FILTER,
                    &[
                        (ARG_INPUT_A, image(src.data, row_len, src.height)),
                        (ARG_WEIGHTS, KernelInput::Weights(filter.weights())),
                    ],
                    row_len,
                    src.height,
                    &scalars,
                )?
            }
        };
        Raster::from_vec(data, raster.width(), raster.height(), raster.mode())
    }

    /// Blurs and subsamples `raster`; see [`crate::downscale`].
    ///
    /// The blur runs on this backend; subsampling is a plain copy.
    pub fn downscale(&self, raster: Raster, factor: usize) -> StereoResult<Raster> {
        if factor <= 1 {
            return Ok(raster);
        }
        let (dst_width, dst_height) = downscaled_size(raster.width(), raster.height(), factor)?;
        let _span = trace_span!(
            "downscale",
            backend = self.name(),
            factor = factor,
            width = raster.width(),
            height = raster.height()
        )
        .entered();

        let blurred = self.filter(&raster, &Filter::mean(blur_size(factor))?)?;
        drop(raster);
        subsample(&blurred, factor, dst_width, dst_height)
    }

    /// Cross-checks two disparity maps, zeroing pixels that disagree by
    /// more than `threshold`.
    pub fn cross_check(
        &self,
        left: &Raster,
        right: &Raster,
        threshold: u32,
    ) -> StereoResult<Raster> {
        validate_maps(left, right)?;
        let width = left.width();
        let data = match self {
            ExecutionBackend::Sequential => {
                let mut out = vec![0u8; left.data().len()];
                check_slices(left.data(), right.data(), threshold, &mut out);
                out
            }
            #[cfg(feature = "rayon")]
            ExecutionBackend::ThreadPool(tp) => {
                let mut out = vec![0u8; left.data().len()];
                let (l, r) = (left.data(), right.data());
                crate::kernel::rayon::for_each_row(&tp.pool, &mut out, width, |y, row| {
                    let span = y * width..(y + 1) * width;
                    check_slices(&l[span.clone()], &r[span], threshold, row);
                });
                out
            }
            ExecutionBackend::KernelDispatch(dispatcher) => {
                let threshold = i32::try_from(threshold).unwrap_or(i32::MAX);
                let height = left.height();
                dispatcher.run(
                    ENTRY_CROSS_CHECK,
                    &[
                        (ARG_INPUT_A, image(left.data(), width, height)),
                        (ARG_INPUT_B, image(right.data(), width, height)),
                    ],
                    width,
                    height,
                    &[threshold],
                )?
            }
        };
        Raster::from_vec(data, width, left.height(), ChannelMode::Gray)
    }

    /// Fills invalidated (zero) pixels in place.
    pub fn occlusion_fill(&self, raster: &mut Raster, strategy: FillStrategy) -> StereoResult<()> {
        raster.require_gray("occlusion fill")?;
        let width = raster.width();
        match self {
            ExecutionBackend::Sequential => {
                for row in raster.data_mut().chunks_exact_mut(width) {
                    fill_row(row, strategy);
                }
            }
            #[cfg(feature = "rayon")]
            ExecutionBackend::ThreadPool(tp) => {
                crate::kernel::rayon::for_each_row(&tp.pool, raster.data_mut(), width, |_, row| {
                    fill_row(row, strategy);
                });
            }
            ExecutionBackend::KernelDispatch(dispatcher) => {
                let entry = match strategy {
                    FillStrategy::Left => ENTRY_FILL_LEFT,
                    FillStrategy::Nearest => ENTRY_FILL_NEAREST,
                };
                let height = raster.height();
                let data = dispatcher.run(
                    entry,
                    &[(ARG_INPUT_A, image(raster.data(), width, height))],
                    width,
                    height,
                    &[],
                )?;
                raster.data_mut().copy_from_slice(&data);
            }
        }
        Ok(())
    }
}

fn contiguous(view: ImageView<'_, u8>) -> Vec<u8> {
    let mut data = Vec::with_capacity(view.width() * view.height());
    for y in 0..view.height() {
        data.extend_from_slice(view.row_unchecked(y));
    }
    data
}
