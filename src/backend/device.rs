//! Compute-device abstraction for the kernel-dispatch backend.
//!
//! A device compiles named kernels from [`KERNEL_SOURCE`], owns image
//! buffers, and runs kernels over a 2-D grid. Buffers hold one pixel per
//! element in row-major order. Kernel arguments are positional:
//!
//! | index | argument |
//! |-------|----------|
//! | 0 | input image A |
//! | 1 | input image B, or `f32` filter weights |
//! | 2 | output image |
//! | 3.. | `i32` scalars |
//!
//! The image width and height are implied by the output buffer. Inputs
//! match the output size, except that the grayscale kernel reads four
//! interleaved samples per output pixel from input A.

use crate::util::{StereoError, StereoResult};

/// Kernel source shared by every device.
pub const KERNEL_SOURCE: &str = include_str!("kernels.wgsl");

/// Per-pixel ZNCC disparity; scalars are `window`, `direction` (±1), `max`.
pub const ENTRY_ZNCC: &str = "calc_zncc";
/// Left/right consistency check; scalar is the threshold.
pub const ENTRY_CROSS_CHECK: &str = "cross_check";
/// Left-scan occlusion fill.
pub const ENTRY_FILL_LEFT: &str = "occlusion_fill";
/// Nearest-neighbour occlusion fill.
pub const ENTRY_FILL_NEAREST: &str = "occlusion_fill_nearest";
/// RGBA to luma conversion.
pub const ENTRY_GRAYSCALE: &str = "grayscale";
/// Zero-padded convolution over interleaved samples; scalars are the mask
/// `size`, `channels` per pixel, and the divisor as `f32` bits.
pub const ENTRY_FILTER: &str = "convolve";

pub const ARG_INPUT_A: u32 = 0;
pub const ARG_INPUT_B: u32 = 1;
pub const ARG_OUTPUT: u32 = 2;
/// Filter weights share the second input slot.
pub const ARG_WEIGHTS: u32 = ARG_INPUT_B;
/// Index of the first scalar argument.
pub const ARG_SCALAR_BASE: u32 = 3;
/// Device kernels accept at most this many scalars.
pub const MAX_SCALARS: usize = 4;

/// Work-group size every kernel is compiled for.
pub const LOCAL_SIZE: [usize; 2] = [16, 16];

/// Largest matching window the device kernels accept.
///
/// Device sums are 32-bit. Around the truncated mean each squared deviation
/// averages at most `127.5² + 1` over the window, which keeps a 363 x 363
/// window below `i32::MAX`.
pub const MAX_DEVICE_WINDOW: usize = 363;

/// Buffer and scalar arguments a kernel reads.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct KernelSignature {
    pub buffers: &'static [u32],
    pub scalars: u32,
    /// Samples per output pixel in input A.
    pub input_a_samples: usize,
    /// Input B carries filter weights instead of an image.
    pub weights_in_b: bool,
}

impl KernelSignature {
    const fn images(buffers: &'static [u32], scalars: u32) -> Self {
        Self {
            buffers,
            scalars,
            input_a_samples: 1,
            weights_in_b: false,
        }
    }

    /// Dimensions an image bound at `index` must have for a
    /// `width` x `height` output.
    pub fn input_size(&self, index: u32, width: usize, height: usize) -> (usize, usize) {
        if index == ARG_INPUT_A {
            (width * self.input_a_samples, height)
        } else {
            (width, height)
        }
    }
}

/// Signature of a known entry point.
pub fn kernel_signature(entry_point: &str) -> Option<KernelSignature> {
    let sig = match entry_point {
        ENTRY_ZNCC => KernelSignature::images(&[ARG_INPUT_A, ARG_INPUT_B, ARG_OUTPUT], 3),
        ENTRY_CROSS_CHECK => KernelSignature::images(&[ARG_INPUT_A, ARG_INPUT_B, ARG_OUTPUT], 1),
        ENTRY_FILL_LEFT | ENTRY_FILL_NEAREST => {
            KernelSignature::images(&[ARG_INPUT_A, ARG_OUTPUT], 0)
        }
        ENTRY_GRAYSCALE => KernelSignature {
            input_a_samples: 4,
            ..KernelSignature::images(&[ARG_INPUT_A, ARG_OUTPUT], 0)
        },
        ENTRY_FILTER => KernelSignature {
            weights_in_b: true,
            ..KernelSignature::images(&[ARG_INPUT_A, ARG_WEIGHTS, ARG_OUTPUT], 3)
        },
        _ => return None,
    };
    Some(sig)
}

/// Returns `true` when `source` declares a function named `entry_point`.
pub fn source_defines_entry(source: &str, entry_point: &str) -> bool {
    let needle = format!("fn {entry_point}(");
    source.contains(&needle)
}

/// Rounds `global` up to a whole number of `local` work-groups per axis.
pub fn grid_size(global: [usize; 2], local: [usize; 2]) -> [usize; 2] {
    [
        global[0].div_ceil(local[0].max(1)) * local[0].max(1),
        global[1].div_ceil(local[1].max(1)) * local[1].max(1),
    ]
}

/// A compiled kernel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProgramHandle {
    pub(crate) id: u64,
    pub(crate) entry_point: String,
}

impl ProgramHandle {
    /// Handle for a program a device registered under `id`.
    pub fn new(id: u64, entry_point: impl Into<String>) -> Self {
        Self {
            id,
            entry_point: entry_point.into(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn entry_point(&self) -> &str {
        &self.entry_point
    }
}

/// A device-resident image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BufferHandle {
    pub(crate) id: u64,
    pub(crate) width: usize,
    pub(crate) height: usize,
}

impl BufferHandle {
    pub fn new(id: u64, width: usize, height: usize) -> Self {
        Self { id, width, height }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum KernelArg {
    Buffer(BufferHandle),
    Scalar(i32),
}

/// Positional kernel arguments.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct KernelArgs {
    slots: Vec<Option<KernelArg>>,
}

impl KernelArgs {
    pub fn new() -> Self {
        Self::default()
    }

    fn set(&mut self, index: u32, arg: KernelArg) {
        let index = index as usize;
        if self.slots.len() <= index {
            self.slots.resize(index + 1, None);
        }
        self.slots[index] = Some(arg);
    }

    pub fn bind_buffer(mut self, index: u32, buffer: &BufferHandle) -> Self {
        self.set(index, KernelArg::Buffer(*buffer));
        self
    }

    pub fn bind_scalar(mut self, index: u32, value: i32) -> Self {
        self.set(index, KernelArg::Scalar(value));
        self
    }

    /// Buffer bound at `index`, if any.
    pub fn buffer(&self, index: u32) -> Option<BufferHandle> {
        match self.slots.get(index as usize) {
            Some(Some(KernelArg::Buffer(b))) => Some(*b),
            _ => None,
        }
    }

    /// Scalar bound at `index`, if any.
    pub fn scalar(&self, index: u32) -> Option<i32> {
        match self.slots.get(index as usize) {
            Some(Some(KernelArg::Scalar(v))) => Some(*v),
            _ => None,
        }
    }

    /// Checks every argument `signature` needs and returns the output buffer
    /// plus the scalars in order.
    pub(crate) fn resolve(
        &self,
        entry_point: &str,
        signature: &KernelSignature,
    ) -> StereoResult<(BufferHandle, [i32; MAX_SCALARS])> {
        let missing = |index| StereoError::MissingKernelArgument {
            entry_point: entry_point.to_string(),
            index,
        };
        for &index in signature.buffers {
            self.buffer(index).ok_or_else(|| missing(index))?;
        }
        let output = self.buffer(ARG_OUTPUT).ok_or_else(|| missing(ARG_OUTPUT))?;
        for &index in signature.buffers {
            if index != ARG_OUTPUT && self.buffer(index).map(|b| b.id) == Some(output.id) {
                return Err(StereoError::Device {
                    reason: format!("{entry_point}: output buffer aliases argument {index}"),
                });
            }
        }
        let mut scalars = [0i32; MAX_SCALARS];
        let count = signature.scalars as usize;
        for (k, slot) in scalars.iter_mut().enumerate().take(count) {
            let index = ARG_SCALAR_BASE + k as u32;
            *slot = self.scalar(index).ok_or_else(|| missing(index))?;
        }
        Ok((output, scalars))
    }
}

/// A device that compiles and runs the image kernels.
pub trait ComputeDevice: Send + Sync {
    /// Human-readable device name.
    fn name(&self) -> &str;

    /// Compiles `entry_point` from `source`.
    ///
    /// Fails with [`StereoError::BuildFailure`] if the source lacks the entry
    /// point or the device rejects it.
    fn build_program(&self, source: &str, entry_point: &str) -> StereoResult<ProgramHandle>;

    /// Copies a `width * height` single-channel image to the device.
    fn upload_image(&self, data: &[u8], width: usize, height: usize) -> StereoResult<BufferHandle>;

    /// Copies filter weights to the device. The handle reports
    /// `weights.len()` x 1.
    fn upload_weights(&self, weights: &[f32]) -> StereoResult<BufferHandle>;

    /// Allocates a zeroed `width * height` image.
    fn create_image(&self, width: usize, height: usize) -> StereoResult<BufferHandle>;

    /// Runs `program` over `global` pixels in `local`-sized work-groups and
    /// waits for completion.
    fn dispatch(
        &self,
        program: &ProgramHandle,
        args: &KernelArgs,
        global: [usize; 2],
        local: [usize; 2],
    ) -> StereoResult<()>;

    /// Reads an image back to the host.
    fn download_image(&self, buffer: &BufferHandle) -> StereoResult<Vec<u8>>;

    /// Frees a buffer. Unknown handles are ignored.
    fn release(&self, buffer: BufferHandle);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kernel_source_defines_every_entry() {
        for entry in [
            ENTRY_ZNCC,
            ENTRY_CROSS_CHECK,
            ENTRY_FILL_LEFT,
            ENTRY_FILL_NEAREST,
            ENTRY_GRAYSCALE,
            ENTRY_FILTER,
        ] {
            assert!(source_defines_entry(KERNEL_SOURCE, entry), "{entry}");
            assert!(kernel_signature(entry).is_some());
        }
        assert!(!source_defines_entry(KERNEL_SOURCE, "missing_kernel"));
    }

    #[test]
    fn grayscale_reads_four_samples_per_pixel() {
        let sig = kernel_signature(ENTRY_GRAYSCALE).unwrap();
        assert_eq!(sig.input_size(ARG_INPUT_A, 5, 3), (20, 3));
        assert_eq!(sig.input_size(ARG_OUTPUT, 5, 3), (5, 3));
        assert!(kernel_signature(ENTRY_FILTER).unwrap().weights_in_b);
    }

    #[test]
    fn grid_rounds_up_to_work_groups() {
        assert_eq!(grid_size([17, 16], [16, 16]), [32, 16]);
        assert_eq!(grid_size([1, 33], [16, 16]), [16, 48]);
    }

    #[test]
    fn resolve_reports_missing_scalar() {
        let buf = |id| BufferHandle {
            id,
            width: 4,
            height: 4,
        };
        let args = KernelArgs::new()
            .bind_buffer(ARG_INPUT_A, &buf(1))
            .bind_buffer(ARG_INPUT_B, &buf(2))
            .bind_buffer(ARG_OUTPUT, &buf(3))
            .bind_scalar(3, 5);
        let sig = kernel_signature(ENTRY_ZNCC).unwrap();
        assert_eq!(
            args.resolve(ENTRY_ZNCC, &sig),
            Err(StereoError::MissingKernelArgument {
                entry_point: ENTRY_ZNCC.to_string(),
                index: 4,
            })
        );
    }

    #[test]
    fn resolve_rejects_aliased_output() {
        let a = BufferHandle {
            id: 7,
            width: 2,
            height: 2,
        };
        let args = KernelArgs::new()
            .bind_buffer(ARG_INPUT_A, &a)
            .bind_buffer(ARG_OUTPUT, &a);
        let sig = kernel_signature(ENTRY_FILL_LEFT).unwrap();
        assert!(matches!(
            args.resolve(ENTRY_FILL_LEFT, &sig),
            Err(StereoError::Device { .. })
        ));
    }
}
