//! Low-level building blocks for custom matching pipelines.
//!
//! These expose the window kernels, the per-pixel search, row partitioning,
//! and the compute-device plumbing behind [`crate::ExecutionBackend`]. Most
//! users should prefer [`crate::StereoPipeline`] or
//! [`crate::match_disparity`].

pub use crate::backend::device::{
    grid_size, kernel_signature, source_defines_entry, KernelSignature, KERNEL_SOURCE, LOCAL_SIZE,
    MAX_DEVICE_WINDOW,
};
pub use crate::backend::{
    BufferHandle, ComputeDevice, CpuDevice, KernelArgs, KernelDispatcher, ProgramHandle,
};
pub use crate::disparity::{partition_rows, Partition};
pub use crate::kernel::scalar::ZnccScalar;
#[cfg(feature = "simd")]
pub use crate::kernel::simd::ZnccSimd;
pub use crate::kernel::{
    best_disparity, is_searchable, match_rows, search_limit, searchable_rows, ActiveKernel,
    WindowSums, ZnccKernel,
};
