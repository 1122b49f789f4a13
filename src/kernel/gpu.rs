//! wgpu compute backend
//!
//! Runs the WGSL kernel over the configured grid. The device, queue, and
//! pipeline live for the kernel's lifetime; everything a single dispatch
//! needs (input, uniform, record, and staging buffers, bind group, encoder)
//! is created inside `dispatch` and released before it returns, so repeated
//! dispatches never accumulate device resources.

use super::{check_capacity, HashKernel, KernelGrid};
use crate::block::MessageBlock;
use crate::channel::{ResultChannel, LANE_STRIDE, NONCE_SENTINEL};
use crate::types::{DifficultyTarget, DispatchBatch};
use crate::{Error, Result};
use async_trait::async_trait;
use std::borrow::Cow;
use std::path::Path;
use tracing::{debug, info};
use wgpu::util::DeviceExt;

/// Workgroup edge; must match `@workgroup_size` in the shader
const WORKGROUP_SIZE: u32 = 8;

/// Marks a block without a nonce slot in the uniform params
const NO_NONCE_SLOT: u32 = u32::MAX;

const TARGET_MODE_LEADING_ZEROS: u32 = 0;
const TARGET_MODE_EXACT_DIGEST: u32 = 1;

/// Uniform parameter layout; must match `Params` in the shader
#[repr(C)]
#[derive(Clone, Copy, Debug, bytemuck::Pod, bytemuck::Zeroable)]
struct KernelParams {
    base_nonce: u32,
    nonces_per_lane: u32,
    grid_width: u32,
    lane_count: u32,
    nonce_offset: u32,
    target_mode: u32,
    difficulty: u32,
    _pad: u32,
    expected: [u32; 8],
}

impl KernelParams {
    fn new(block: &MessageBlock, target: &DifficultyTarget, batch: &DispatchBatch, grid_width: u32) -> Self {
        let (target_mode, difficulty, expected) = match target {
            DifficultyTarget::LeadingZeroBits(bits) => (TARGET_MODE_LEADING_ZEROS, *bits, [0u32; 8]),
            DifficultyTarget::ExactDigest(digest) => {
                (TARGET_MODE_EXACT_DIGEST, 0, *digest.words())
            }
        };
        Self {
            base_nonce: batch.base_nonce(),
            nonces_per_lane: batch.nonces_per_lane(),
            grid_width,
            lane_count: batch.lane_count(),
            nonce_offset: block.nonce_offset().unwrap_or(NO_NONCE_SLOT),
            target_mode,
            difficulty,
            _pad: 0,
            expected,
        }
    }
}

/// Load the kernel source: embedded by default, overridable from disk.
///
/// A failed read of the override is fatal; there is no fallback once an
/// explicit source was requested.
fn load_kernel_source(source_override: Option<&Path>) -> Result<Cow<'static, str>> {
    match source_override {
        None => Ok(Cow::Borrowed(include_str!("../shaders/sha256.wgsl"))),
        Some(path) => std::fs::read_to_string(path)
            .map(Cow::Owned)
            .map_err(|e| Error::kernel_source(path, e)),
    }
}

/// GPU kernel backend driving the WGSL search program
pub struct GpuKernel {
    grid: KernelGrid,
    device: wgpu::Device,
    queue: wgpu::Queue,
    pipeline: wgpu::ComputePipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    adapter_name: String,
}

impl GpuKernel {
    /// Acquire a device and build the search pipeline.
    ///
    /// Fails with `ResourceUnavailable` when no adapter or device can be
    /// acquired, `KernelCompile` when the shader does not validate, and
    /// `KernelLink` when the pipeline cannot be created.
    pub async fn new(grid: KernelGrid, source_override: Option<&Path>) -> Result<Self> {
        let source = load_kernel_source(source_override)?;

        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapters: Vec<_> = instance.enumerate_adapters(wgpu::Backends::all());
        if adapters.is_empty() {
            return Err(Error::resource_unavailable("no GPU adapters found"));
        }

        // Prefer a discrete GPU when several adapters are present
        let adapter = adapters
            .iter()
            .find(|a| a.get_info().device_type == wgpu::DeviceType::DiscreteGpu)
            .unwrap_or(&adapters[0]);

        let adapter_info = adapter.get_info();
        info!(
            "selected GPU: {} ({:?})",
            adapter_info.name, adapter_info.device_type
        );

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("gridhash device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default(),
                    memory_hints: Default::default(),
                },
                None,
            )
            .await
            .map_err(|e| {
                Error::resource_unavailable(format!("failed to request GPU device: {}", e))
            })?;

        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("sha256 search shader"),
            source: wgpu::ShaderSource::Wgsl(source),
        });
        if let Some(e) = device.pop_error_scope().await {
            return Err(Error::kernel_compile(e.to_string()));
        }

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("search bind group layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Storage { read_only: true },
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Storage { read_only: false },
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("search pipeline layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("search pipeline"),
            layout: Some(&pipeline_layout),
            module: &shader,
            entry_point: Some("search_main"),
            compilation_options: Default::default(),
            cache: None,
        });
        if let Some(e) = device.pop_error_scope().await {
            return Err(Error::kernel_link(e.to_string()));
        }

        Ok(Self {
            grid,
            device,
            queue,
            pipeline,
            bind_group_layout,
            adapter_name: adapter_info.name,
        })
    }

    pub fn adapter_name(&self) -> &str {
        &self.adapter_name
    }

    /// Record buffer image with every nonce component pre-set to the
    /// sentinel, so a lane the guard skips still reads as a miss.
    fn sentinel_records(lane_count: u32) -> Vec<u32> {
        let mut raw = vec![0u32; lane_count as usize * LANE_STRIDE];
        for lane in 0..lane_count as usize {
            raw[lane * LANE_STRIDE + crate::channel::NONCE] = NONCE_SENTINEL;
        }
        raw
    }
}

#[async_trait]
impl HashKernel for GpuKernel {
    fn backend(&self) -> &'static str {
        "gpu"
    }

    fn grid(&self) -> KernelGrid {
        self.grid
    }

    async fn dispatch(
        &self,
        block: &MessageBlock,
        target: &DifficultyTarget,
        batch: DispatchBatch,
    ) -> Result<ResultChannel> {
        check_capacity(self.grid, &batch)?;

        let params = KernelParams::new(block, target, &batch, self.grid.width);
        let records_size = (batch.lane_count() as usize * LANE_STRIDE * 4) as u64;

        let block_buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("block words"),
                contents: bytemuck::cast_slice(block.words()),
                usage: wgpu::BufferUsages::STORAGE,
            });

        let params_buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("kernel params"),
                contents: bytemuck::cast_slice(&[params]),
                usage: wgpu::BufferUsages::UNIFORM,
            });

        let records_buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("lane records"),
                contents: bytemuck::cast_slice(&Self::sentinel_records(batch.lane_count())),
                usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
            });

        let staging_buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("readback staging"),
            size: records_size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("search bind group"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: block_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: params_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: records_buffer.as_entire_binding(),
                },
            ],
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("search encoder"),
            });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("search pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.pipeline);
            pass.set_bind_group(0, &bind_group, &[]);

            let rows = batch.lane_count().div_ceil(self.grid.width);
            pass.dispatch_workgroups(
                self.grid.width.div_ceil(WORKGROUP_SIZE),
                rows.div_ceil(WORKGROUP_SIZE),
                1,
            );
        }
        encoder.copy_buffer_to_buffer(&records_buffer, 0, &staging_buffer, 0, records_size);

        self.queue.submit(std::iter::once(encoder.finish()));
        debug!(
            "dispatched base_nonce={} lanes={} nonces_per_lane={}",
            batch.base_nonce(),
            batch.lane_count(),
            batch.nonces_per_lane()
        );

        let buffer_slice = staging_buffer.slice(..);
        let (tx, rx) = tokio::sync::oneshot::channel();
        buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        let _ = self.device.poll(wgpu::Maintain::Wait);

        rx.await
            .map_err(|_| Error::resource_unavailable("GPU readback channel closed"))?
            .map_err(|e| {
                Error::resource_unavailable(format!("failed to map readback buffer: {:?}", e))
            })?;

        // Copy into host memory before the per-dispatch buffers go away;
        // the mapped device view must never outlive this call.
        let raw = {
            let data = buffer_slice.get_mapped_range();
            bytemuck::cast_slice::<u8, u32>(&data).to_vec()
        };
        staging_buffer.unmap();

        ResultChannel::from_raw(raw, batch.lane_count(), target.wants_full_digest())
    }
}

/// Enumerate available GPU adapters
pub fn enumerate_devices() -> Vec<(usize, String, wgpu::DeviceType)> {
    let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
        backends: wgpu::Backends::all(),
        ..Default::default()
    });

    instance
        .enumerate_adapters(wgpu::Backends::all())
        .into_iter()
        .enumerate()
        .map(|(i, adapter)| {
            let info = adapter.get_info();
            (i, info.name, info.device_type)
        })
        .collect()
}
