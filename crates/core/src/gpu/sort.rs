//! Parallel bitonic sort over (particle, cell key) pairs.
//!
//! The compare-exchange schedule is data-independent and defined purely in
//! terms of `log2(M)` stages, so the entry count must be a power of two —
//! validated at construction instead of silently producing a wrong order.
//!
//! A first pass sorts 512-entry blocks entirely inside workgroup shared
//! memory; the remaining `(k, j)` stages are each a separate dispatch in
//! their own submission, synchronized by the queue's in-order execution
//! guarantee.

use std::sync::Arc;

use bytemuck::{Pod, Zeroable};

use super::{dispatch_size, GpuContext};
use crate::error::SimError;

/// Entries per shared-memory block (two per thread at workgroup size 256).
const BLOCK_SIZE: u32 = 512;
/// Threads per workgroup, matching `@workgroup_size` in `sort.wgsl`.
const WORKGROUP_SIZE: u32 = 256;

/// Stage parameters for one global compare-exchange dispatch.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
struct SortUniforms {
    k: u32,
    j: u32,
}

/// One (particle id, cell key) pair as laid out in the spatial lookup buffer.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Pod, Zeroable)]
pub struct SpatialEntry {
    /// Stable particle id in `[0, N)`.
    pub particle: u32,
    /// Hashed grid cell key in `[0, N)`.
    pub key: u32,
}

/// GPU bitonic sorter bound to a fixed pair buffer.
pub struct GpuSort {
    context: Arc<GpuContext>,
    params_buffer: wgpu::Buffer,
    block_pipeline: wgpu::ComputePipeline,
    stage_pipeline: wgpu::ComputePipeline,
    bind_group: wgpu::BindGroup,
    entry_count: u32,
}

impl GpuSort {
    /// Create a sorter over `target`, a buffer of `entry_count` pairs.
    ///
    /// # Errors
    /// Returns [`SimError::NotPowerOfTwo`] unless `entry_count` is a nonzero
    /// power of two.
    pub fn new(
        context: Arc<GpuContext>,
        target: &wgpu::Buffer,
        entry_count: u32,
    ) -> Result<Self, SimError> {
        if entry_count == 0 || !entry_count.is_power_of_two() {
            return Err(SimError::NotPowerOfTwo {
                what: "bitonic sort",
                len: entry_count,
            });
        }

        let params_buffer = context.device().create_buffer(&wgpu::BufferDescriptor {
            label: Some("Sort Params"),
            size: std::mem::size_of::<SortUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let shader = context
            .device()
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some("Sort Shader"),
                source: wgpu::ShaderSource::Wgsl(include_str!("sort.wgsl").into()),
            });

        let bind_group_layout =
            context
                .device()
                .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                    label: Some("Sort Bind Group Layout"),
                    entries: &[
                        wgpu::BindGroupLayoutEntry {
                            binding: 0,
                            visibility: wgpu::ShaderStages::COMPUTE,
                            ty: wgpu::BindingType::Buffer {
                                ty: wgpu::BufferBindingType::Uniform,
                                has_dynamic_offset: false,
                                min_binding_size: None,
                            },
                            count: None,
                        },
                        wgpu::BindGroupLayoutEntry {
                            binding: 1,
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

        let pipeline_layout =
            context
                .device()
                .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                    label: Some("Sort Pipeline Layout"),
                    bind_group_layouts: &[&bind_group_layout],
                    push_constant_ranges: &[],
                });

        let block_pipeline =
            context
                .device()
                .create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                    label: Some("Sort Block Pipeline"),
                    layout: Some(&pipeline_layout),
                    module: &shader,
                    entry_point: "sort_block",
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                    cache: None,
                });

        let stage_pipeline =
            context
                .device()
                .create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                    label: Some("Sort Stage Pipeline"),
                    layout: Some(&pipeline_layout),
                    module: &shader,
                    entry_point: "sort_stage",
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                    cache: None,
                });

        let bind_group = context
            .device()
            .create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("Sort Bind Group"),
                layout: &bind_group_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: params_buffer.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: target.as_entire_binding(),
                    },
                ],
            });

        Ok(Self {
            context,
            params_buffer,
            block_pipeline,
            stage_pipeline,
            bind_group,
            entry_count,
        })
    }

    /// Sort the bound buffer ascending by key, in place.
    ///
    /// Pair integrity is preserved; the relative order of duplicate keys is
    /// not (stable ordering is not required for neighbor lookup).
    pub fn sort(&self) {
        let block_count = dispatch_size(self.entry_count, BLOCK_SIZE);

        let mut encoder =
            self.context
                .device()
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("Sort Block Encoder"),
                });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Sort Block Pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.block_pipeline);
            pass.set_bind_group(0, &self.bind_group, &[]);
            pass.dispatch_workgroups(block_count, 1, 1);
        }
        self.context.queue().submit(Some(encoder.finish()));

        if self.entry_count <= BLOCK_SIZE {
            return;
        }

        // Inter-block merge stages. Every stage must be fully visible before
        // the next, so each gets its own submission.
        let stage_count = dispatch_size(self.entry_count, WORKGROUP_SIZE);
        let mut k = BLOCK_SIZE << 1;
        while k <= self.entry_count {
            let mut j = k >> 1;
            while j > 0 {
                self.context.queue().write_buffer(
                    &self.params_buffer,
                    0,
                    bytemuck::bytes_of(&SortUniforms { k, j }),
                );

                let mut encoder = self.context.device().create_command_encoder(
                    &wgpu::CommandEncoderDescriptor {
                        label: Some("Sort Stage Encoder"),
                    },
                );
                {
                    let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                        label: Some("Sort Stage Pass"),
                        timestamp_writes: None,
                    });
                    pass.set_pipeline(&self.stage_pipeline);
                    pass.set_bind_group(0, &self.bind_group, &[]);
                    pass.dispatch_workgroups(stage_count, 1, 1);
                }
                self.context.queue().submit(Some(encoder.finish()));

                j >>= 1;
            }
            k <<= 1;
        }
    }

    /// Number of pairs the sorter was built for.
    #[must_use]
    pub fn entry_count(&self) -> u32 {
        self.entry_count
    }
}
