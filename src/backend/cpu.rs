//! Host emulation of the compute device.
//!
//! [`CpuDevice`] runs the same kernels as the GPU device, pixel by pixel,
//! on host memory. It is always available and is the reference the GPU
//! results are compared against.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use crate::backend::device::{
    grid_size, kernel_signature, source_defines_entry, BufferHandle, ComputeDevice, KernelArgs,
    KernelSignature, ProgramHandle, ARG_INPUT_A, ARG_INPUT_B, ARG_WEIGHTS, ENTRY_CROSS_CHECK,
    ENTRY_FILL_LEFT, ENTRY_FILL_NEAREST, ENTRY_FILTER, ENTRY_GRAYSCALE, ENTRY_ZNCC,
};
use crate::disparity::crosscheck::check_pixel;
use crate::disparity::occlusion::{fill_left_at, fill_nearest_at};
use crate::disparity::{Direction, SearchParams};
use crate::image::filter::{filter_sample, Filter, Samples};
use crate::image::grayscale::luma;
use crate::kernel::{best_disparity, is_searchable, ActiveKernel};
use crate::trace::trace_debug;
use crate::util::{StereoError, StereoResult};
use crate::ImageView;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum CpuKernel {
    Zncc,
    CrossCheck,
    FillLeft,
    FillNearest,
    Grayscale,
    Filter,
}

impl CpuKernel {
    fn from_entry(entry_point: &str) -> Option<Self> {
        match entry_point {
            ENTRY_ZNCC => Some(CpuKernel::Zncc),
            ENTRY_CROSS_CHECK => Some(CpuKernel::CrossCheck),
            ENTRY_FILL_LEFT => Some(CpuKernel::FillLeft),
            ENTRY_FILL_NEAREST => Some(CpuKernel::FillNearest),
            ENTRY_GRAYSCALE => Some(CpuKernel::Grayscale),
            ENTRY_FILTER => Some(CpuKernel::Filter),
            _ => None,
        }
    }
}

struct HostImage {
    data: Vec<u8>,
    width: usize,
    height: usize,
}

/// Compute device backed by host memory.
#[derive(Default)]
pub struct CpuDevice {
    programs: Mutex<HashMap<u64, CpuKernel>>,
    buffers: Mutex<HashMap<u64, HostImage>>,
    weights: Mutex<HashMap<u64, Vec<f32>>>,
    next_id: AtomicU64,
}

impl CpuDevice {
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Number of live buffers, weights included.
    pub fn buffer_count(&self) -> usize {
        let images = self.buffers.lock().map(|b| b.len()).unwrap_or(0);
        images + self.weights.lock().map(|w| w.len()).unwrap_or(0)
    }

    fn insert(&self, image: HostImage) -> StereoResult<BufferHandle> {
        let handle = BufferHandle {
            id: self.allocate_id(),
            width: image.width,
            height: image.height,
        };
        self.buffers
            .lock()
            .map_err(|_| poisoned())?
            .insert(handle.id, image);
        Ok(handle)
    }
}

impl std::fmt::Debug for CpuDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CpuDevice")
            .field("buffers", &self.buffer_count())
            .finish()
    }
}

fn poisoned() -> StereoError {
    StereoError::Device {
        reason: "device state lock poisoned".to_string(),
    }
}

fn unknown_buffer(id: u64) -> StereoError {
    StereoError::Device {
        reason: format!("unknown buffer {id}"),
    }
}

fn unsupported(entry_point: &str) -> StereoError {
    StereoError::BuildFailure {
        entry_point: entry_point.to_string(),
        reason: "no host implementation for entry point".to_string(),
    }
}

fn no_signature(program: &ProgramHandle) -> StereoError {
    StereoError::Device {
        reason: format!("no signature for {}", program.entry_point),
    }
}

impl ComputeDevice for CpuDevice {
    fn name(&self) -> &str {
        "cpu"
    }

    fn build_program(&self, source: &str, entry_point: &str) -> StereoResult<ProgramHandle> {
        if !source_defines_entry(source, entry_point) {
            return Err(StereoError::BuildFailure {
                entry_point: entry_point.to_string(),
                reason: "entry point not found in source".to_string(),
            });
        }
        let kernel = CpuKernel::from_entry(entry_point).ok_or_else(|| unsupported(entry_point))?;
        let id = self.allocate_id();
        self.programs
            .lock()
            .map_err(|_| poisoned())?
            .insert(id, kernel);
        Ok(ProgramHandle {
            id,
            entry_point: entry_point.to_string(),
        })
    }

    fn upload_image(&self, data: &[u8], width: usize, height: usize) -> StereoResult<BufferHandle> {
        let needed = width * height;
        if data.len() < needed {
            return Err(StereoError::BufferTooSmall {
                needed,
                got: data.len(),
            });
        }
        self.insert(HostImage {
            data: data[..needed].to_vec(),
            width,
            height,
        })
    }

    fn upload_weights(&self, weights: &[f32]) -> StereoResult<BufferHandle> {
        let handle = BufferHandle {
            id: self.allocate_id(),
            width: weights.len(),
            height: 1,
        };
        self.weights
            .lock()
            .map_err(|_| poisoned())?
            .insert(handle.id, weights.to_vec());
        Ok(handle)
    }

    fn create_image(&self, width: usize, height: usize) -> StereoResult<BufferHandle> {
        self.insert(HostImage {
            data: vec![0u8; width * height],
            width,
            height,
        })
    }

    fn dispatch(
        &self,
        program: &ProgramHandle,
        args: &KernelArgs,
        global: [usize; 2],
        local: [usize; 2],
    ) -> StereoResult<()> {
        let kernel = *self
            .programs
            .lock()
            .map_err(|_| poisoned())?
            .get(&program.id)
            .ok_or_else(|| StereoError::Device {
                reason: format!("unknown program for {}", program.entry_point),
            })?;
        let signature =
            kernel_signature(&program.entry_point).ok_or_else(|| no_signature(program))?;
        let (output, scalars) = args.resolve(&program.entry_point, &signature)?;
        let grid = grid_size(global, local);
        trace_debug!(
            "cpu_dispatch",
            entry = program.entry_point.as_str(),
            grid_x = grid[0],
            grid_y = grid[1]
        );

        let filter = match kernel {
            CpuKernel::Filter => Some(self.bound_filter(args, program, scalars)?),
            _ => None,
        };
        let bound = Bound {
            program,
            signature: &signature,
            args,
            scalars,
            filter,
        };

        let mut buffers = self.buffers.lock().map_err(|_| poisoned())?;
        let mut out = buffers
            .remove(&output.id)
            .ok_or_else(|| unknown_buffer(output.id))?;
        let result = run_kernel(&buffers, &mut out, kernel, &bound, grid);
        buffers.insert(output.id, out);
        result
    }

    fn download_image(&self, buffer: &BufferHandle) -> StereoResult<Vec<u8>> {
        let buffers = self.buffers.lock().map_err(|_| poisoned())?;
        let image = buffers
            .get(&buffer.id)
            .ok_or_else(|| unknown_buffer(buffer.id))?;
        Ok(image.data.clone())
    }

    fn release(&self, buffer: BufferHandle) {
        if let Ok(mut buffers) = self.buffers.lock() {
            buffers.remove(&buffer.id);
        }
        if let Ok(mut weights) = self.weights.lock() {
            weights.remove(&buffer.id);
        }
    }
}

impl CpuDevice {
    /// Rebuilds the mask of a filter dispatch from its weights and scalars.
    fn bound_filter(
        &self,
        args: &KernelArgs,
        program: &ProgramHandle,
        scalars: [i32; 4],
    ) -> StereoResult<Filter> {
        let handle = args
            .buffer(ARG_WEIGHTS)
            .ok_or_else(|| StereoError::MissingKernelArgument {
                entry_point: program.entry_point.clone(),
                index: ARG_WEIGHTS,
            })?;
        let weights = self
            .weights
            .lock()
            .map_err(|_| poisoned())?
            .get(&handle.id)
            .cloned()
            .ok_or_else(|| unknown_buffer(handle.id))?;
        let size = usize::try_from(scalars[0])
            .map_err(|_| StereoError::InvalidInput("mask size scalar must be positive"))?;
        let filter = Filter::new(size, f32::from_bits(scalars[2] as u32), weights)?;
        filter.check_odd()?;
        Ok(filter)
    }
}

/// Everything a dispatch binds besides the buffer storage.
struct Bound<'a> {
    program: &'a ProgramHandle,
    signature: &'a KernelSignature,
    args: &'a KernelArgs,
    scalars: [i32; 4],
    filter: Option<Filter>,
}

/// Input image bound at `index`, sized as the signature requires.
fn bound_input<'a>(
    buffers: &'a HashMap<u64, HostImage>,
    bound: &Bound<'_>,
    index: u32,
    out: &HostImage,
) -> StereoResult<&'a HostImage> {
    let handle = bound
        .args
        .buffer(index)
        .ok_or_else(|| StereoError::MissingKernelArgument {
            entry_point: bound.program.entry_point.clone(),
            index,
        })?;
    let image = buffers
        .get(&handle.id)
        .ok_or_else(|| unknown_buffer(handle.id))?;
    let (width, height) = bound.signature.input_size(index, out.width, out.height);
    if image.width != width || image.height != height {
        return Err(StereoError::SizeMismatch {
            context: "kernel input and output buffers",
            left_width: image.width,
            left_height: image.height,
            right_width: width,
            right_height: height,
        });
    }
    Ok(image)
}

/// Evaluates `kernel` for every grid cell that falls inside `out`.
fn run_kernel(
    buffers: &HashMap<u64, HostImage>,
    out: &mut HostImage,
    kernel: CpuKernel,
    bound: &Bound<'_>,
    grid: [usize; 2],
) -> StereoResult<()> {
    let a = bound_input(buffers, bound, ARG_INPUT_A, out)?;
    let b = match kernel {
        CpuKernel::Zncc | CpuKernel::CrossCheck => {
            Some(bound_input(buffers, bound, ARG_INPUT_B, out)?)
        }
        CpuKernel::FillLeft
        | CpuKernel::FillNearest
        | CpuKernel::Grayscale
        | CpuKernel::Filter => None,
    };
    let item = PixelKernel::new(kernel, a, b, bound)?;
    let width = out.width;
    let rows = grid[1].min(out.height);
    let cols = grid[0].min(width);
    run_rows(&mut out.data[..rows * width], width, cols, &item);
    Ok(())
}

/// One kernel bound to its inputs, evaluated per output pixel.
struct PixelKernel<'a> {
    kernel: CpuKernel,
    a: ImageView<'a, u8>,
    b: Option<ImageView<'a, u8>>,
    params: SearchParams,
    threshold: u32,
    filter: Option<(&'a Filter, Samples<'a>)>,
}

impl<'a> PixelKernel<'a> {
    fn new(
        kernel: CpuKernel,
        a: &'a HostImage,
        b: Option<&'a HostImage>,
        bound: &'a Bound<'_>,
    ) -> StereoResult<Self> {
        let scalars = bound.scalars;
        let view = ImageView::from_slice(&a.data, a.width, a.height)?;
        let b = b
            .map(|b| ImageView::from_slice(&b.data, b.width, b.height))
            .transpose()?;
        let mut params = SearchParams::new(1, 0, Direction::Left);
        if kernel == CpuKernel::Zncc {
            let window = usize::try_from(scalars[0])
                .map_err(|_| StereoError::InvalidInput("window scalar must be positive"))?;
            let max = usize::try_from(scalars[2])
                .map_err(|_| StereoError::InvalidInput("search distance scalar is negative"))?;
            params = SearchParams::new(window, max, Direction::from_step(scalars[1]));
            params.validate()?;
        }
        let filter = match &bound.filter {
            Some(filter) => {
                let channels = usize::try_from(scalars[1]).unwrap_or(0);
                if channels == 0 || a.width % channels != 0 {
                    return Err(StereoError::InvalidInput(
                        "channel scalar must divide the image width",
                    ));
                }
                let samples = Samples {
                    data: &a.data,
                    width: a.width / channels,
                    height: a.height,
                    channels,
                };
                Some((filter, samples))
            }
            None => None,
        };
        Ok(Self {
            kernel,
            a: view,
            b,
            params,
            threshold: u32::try_from(scalars[0]).unwrap_or(0),
            filter,
        })
    }

    fn eval(&self, x: usize, y: usize) -> u8 {
        let width = self.a.width();
        let row = self.a.row_unchecked(y);
        match (self.kernel, self.b) {
            (CpuKernel::Zncc, Some(b)) => {
                let half = self.params.half_window();
                if is_searchable(x, y, width, self.a.height(), half) {
                    best_disparity::<ActiveKernel>(self.a, b, x, y, &self.params)
                } else {
                    0
                }
            }
            (CpuKernel::CrossCheck, Some(b)) => {
                check_pixel(row[x], b.row_unchecked(y)[x], self.threshold)
            }
            (CpuKernel::FillLeft, _) => fill_left_at(row, x),
            (CpuKernel::FillNearest, _) => fill_nearest_at(row, x),
            (CpuKernel::Grayscale, _) => {
                let px = &row[x * 4..x * 4 + 4];
                luma(px[0], px[1], px[2])
            }
            (CpuKernel::Filter, _) => match self.filter {
                Some((filter, src)) => {
                    filter_sample(src, filter, x / src.channels, y, x % src.channels)
                }
                None => 0,
            },
            _ => 0,
        }
    }
}

#[cfg(feature = "rayon")]
fn run_rows(out: &mut [u8], width: usize, cols: usize, item: &PixelKernel<'_>) {
    use rayon::prelude::*;
    out.par_chunks_exact_mut(width)
        .enumerate()
        .for_each(|(y, row)| fill_grid_row(row, y, cols, item));
}

#[cfg(not(feature = "rayon"))]
fn run_rows(out: &mut [u8], width: usize, cols: usize, item: &PixelKernel<'_>) {
    for (y, row) in out.chunks_exact_mut(width).enumerate() {
        fill_grid_row(row, y, cols, item);
    }
}

fn fill_grid_row(row: &mut [u8], y: usize, cols: usize, item: &PixelKernel<'_>) {
    for (x, slot) in row.iter_mut().enumerate().take(cols) {
        *slot = item.eval(x, y);
    }
}
