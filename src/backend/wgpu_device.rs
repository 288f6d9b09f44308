//! wgpu-based compute device (Vulkan / Metal / DX12).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use bytemuck::{Pod, Zeroable};
use wgpu::util::DeviceExt;

use crate::backend::device::{
    grid_size, kernel_signature, source_defines_entry, BufferHandle, ComputeDevice, KernelArgs,
    ProgramHandle, ARG_OUTPUT, ARG_WEIGHTS, LOCAL_SIZE,
};
use crate::trace::{trace_debug, trace_event};
use crate::util::{StereoError, StereoResult};

/// Uniform block; must match `Params` in `kernels.wgsl`.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct KernelParams {
    width: u32,
    height: u32,
    pad0: u32,
    pad1: u32,
    scalars: [i32; 4],
}

/// Binding of the uniform block.
const PARAMS_BINDING: u32 = 3;

struct DeviceImage {
    buffer: wgpu::Buffer,
    width: usize,
    height: usize,
}

/// Compute device running the kernels through wgpu.
pub struct WgpuDevice {
    device: wgpu::Device,
    queue: wgpu::Queue,
    adapter_name: String,
    programs: Mutex<HashMap<u64, wgpu::ComputePipeline>>,
    buffers: Mutex<HashMap<u64, DeviceImage>>,
    next_id: AtomicU64,
}

fn device_error(reason: impl Into<String>) -> StereoError {
    StereoError::Device {
        reason: reason.into(),
    }
}

fn poisoned() -> StereoError {
    device_error("device state lock poisoned")
}

impl WgpuDevice {
    /// Opens the highest-performance adapter available.
    ///
    /// Fails with [`StereoError::BackendUnavailable`] when no adapter or
    /// device can be obtained.
    pub fn new() -> StereoResult<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .map_err(|e| StereoError::BackendUnavailable {
            reason: format!("no suitable GPU adapter found: {e}"),
        })?;

        let adapter_name = adapter.get_info().name.clone();
        trace_event!("gpu_adapter", adapter = adapter_name.as_str());

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("stereomatch"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            ..Default::default()
        }))
        .map_err(|e| StereoError::BackendUnavailable {
            reason: format!("failed to create GPU device: {e}"),
        })?;

        Ok(Self {
            device,
            queue,
            adapter_name,
            programs: Mutex::new(HashMap::new()),
            buffers: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(0),
        })
    }

    fn allocate_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn insert(
        &self,
        buffer: wgpu::Buffer,
        width: usize,
        height: usize,
    ) -> StereoResult<BufferHandle> {
        let handle = BufferHandle {
            id: self.allocate_id(),
            width,
            height,
        };
        self.buffers.lock().map_err(|_| poisoned())?.insert(
            handle.id,
            DeviceImage {
                buffer,
                width,
                height,
            },
        );
        Ok(handle)
    }

    fn storage_usage() -> wgpu::BufferUsages {
        wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC | wgpu::BufferUsages::COPY_DST
    }
}

impl std::fmt::Debug for WgpuDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WgpuDevice")
            .field("adapter", &self.adapter_name)
            .finish()
    }
}

impl ComputeDevice for WgpuDevice {
    fn name(&self) -> &str {
        &self.adapter_name
    }

    fn build_program(&self, source: &str, entry_point: &str) -> StereoResult<ProgramHandle> {
        if !source_defines_entry(source, entry_point) || kernel_signature(entry_point).is_none() {
            return Err(StereoError::BuildFailure {
                entry_point: entry_point.to_string(),
                reason: "entry point not found in source".to_string(),
            });
        }

        let module = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(entry_point),
                source: wgpu::ShaderSource::Wgsl(source.into()),
            });
        let pipeline = self
            .device
            .create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(entry_point),
                layout: None,
                module: &module,
                entry_point: Some(entry_point),
                compilation_options: Default::default(),
                cache: None,
            });

        let id = self.allocate_id();
        self.programs
            .lock()
            .map_err(|_| poisoned())?
            .insert(id, pipeline);
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
        let pixels: Vec<u32> = data[..needed].iter().map(|&v| u32::from(v)).collect();
        let buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("image"),
                contents: bytemuck::cast_slice(&pixels),
                usage: Self::storage_usage(),
            });
        self.insert(buffer, width, height)
    }

    fn upload_weights(&self, weights: &[f32]) -> StereoResult<BufferHandle> {
        let buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("weights"),
                contents: bytemuck::cast_slice(weights),
                usage: Self::storage_usage(),
            });
        self.insert(buffer, weights.len(), 1)
    }

    fn create_image(&self, width: usize, height: usize) -> StereoResult<BufferHandle> {
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("image"),
            size: (width * height * std::mem::size_of::<u32>()) as u64,
            usage: Self::storage_usage(),
            mapped_at_creation: false,
        });
        self.insert(buffer, width, height)
    }

    fn dispatch(
        &self,
        program: &ProgramHandle,
        args: &KernelArgs,
        global: [usize; 2],
        local: [usize; 2],
    ) -> StereoResult<()> {
        if local != LOCAL_SIZE {
            return Err(device_error(format!(
                "{}: kernels are compiled for a {:?} work-group, got {local:?}",
                program.entry_point, LOCAL_SIZE
            )));
        }
        let signature = kernel_signature(&program.entry_point)
            .ok_or_else(|| device_error(format!("no signature for {}", program.entry_point)))?;
        let (output, scalars) = args.resolve(&program.entry_point, &signature)?;

        let programs = self.programs.lock().map_err(|_| poisoned())?;
        let pipeline = programs
            .get(&program.id)
            .ok_or_else(|| device_error(format!("unknown program for {}", program.entry_point)))?;
        let buffers = self.buffers.lock().map_err(|_| poisoned())?;
        let image = |id: u64| {
            buffers
                .get(&id)
                .ok_or_else(|| device_error(format!("unknown buffer {id}")))
        };
        let out = image(output.id)?;

        let params = KernelParams {
            width: out.width as u32,
            height: out.height as u32,
            pad0: 0,
            pad1: 0,
            scalars,
        };
        let uniform = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("params"),
                contents: bytemuck::bytes_of(&params),
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            });

        let mut entries = Vec::with_capacity(signature.buffers.len() + 1);
        for &index in signature.buffers {
            let bound = if index == ARG_OUTPUT {
                out
            } else {
                let handle = args
                    .buffer(index)
                    .ok_or_else(|| StereoError::MissingKernelArgument {
                        entry_point: program.entry_point.clone(),
                        index,
                    })?;
                let input = image(handle.id)?;
                let (width, height) = signature.input_size(index, out.width, out.height);
                let weights = signature.weights_in_b && index == ARG_WEIGHTS;
                if !weights && (input.width != width || input.height != height) {
                    return Err(StereoError::SizeMismatch {
                        context: "kernel input and output buffers",
                        left_width: input.width,
                        left_height: input.height,
                        right_width: width,
                        right_height: height,
                    });
                }
                input
            };
            entries.push(wgpu::BindGroupEntry {
                binding: index,
                resource: bound.buffer.as_entire_binding(),
            });
        }
        entries.push(wgpu::BindGroupEntry {
            binding: PARAMS_BINDING,
            resource: uniform.as_entire_binding(),
        });

        let layout = pipeline.get_bind_group_layout(0);
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: None,
            layout: &layout,
            entries: &entries,
        });

        let grid = grid_size(global, local);
        let groups = [(grid[0] / local[0]) as u32, (grid[1] / local[1]) as u32];
        trace_debug!(
            "gpu_dispatch",
            entry = program.entry_point.as_str(),
            groups_x = groups[0],
            groups_y = groups[1]
        );

        let mut enc = self.device.create_command_encoder(&Default::default());
        {
            let mut pass = enc.begin_compute_pass(&Default::default());
            pass.set_pipeline(pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.dispatch_workgroups(groups[0], groups[1], 1);
        }
        self.queue.submit(std::iter::once(enc.finish()));
        self.device
            .poll(wgpu::PollType::wait_indefinitely())
            .map_err(|e| device_error(format!("device poll failed: {e}")))?;
        Ok(())
    }

    fn download_image(&self, buffer: &BufferHandle) -> StereoResult<Vec<u8>> {
        let buffers = self.buffers.lock().map_err(|_| poisoned())?;
        let image = buffers
            .get(&buffer.id)
            .ok_or_else(|| device_error(format!("unknown buffer {}", buffer.id)))?;
        let size = (image.width * image.height * std::mem::size_of::<u32>()) as u64;
        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("staging"),
            size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let mut enc = self.device.create_command_encoder(&Default::default());
        enc.copy_buffer_to_buffer(&image.buffer, 0, &staging, 0, size);
        self.queue.submit(std::iter::once(enc.finish()));

        let slice = staging.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |r| {
            tx.send(r).ok();
        });
        self.device
            .poll(wgpu::PollType::wait_indefinitely())
            .map_err(|e| device_error(format!("device poll failed: {e}")))?;
        rx.recv()
            .map_err(|_| device_error("GPU channel closed"))?
            .map_err(|e| device_error(format!("buffer mapping failed: {e}")))?;

        let data = slice.get_mapped_range();
        let pixels: &[u32] = bytemuck::cast_slice(&data);
        let result = pixels.iter().map(|&v| v.min(255) as u8).collect();
        drop(data);
        staging.unmap();
        Ok(result)
    }

    fn release(&self, buffer: BufferHandle) {
        if let Ok(mut buffers) = self.buffers.lock() {
            if let Some(image) = buffers.remove(&buffer.id) {
                image.buffer.destroy();
            }
        }
    }
}
