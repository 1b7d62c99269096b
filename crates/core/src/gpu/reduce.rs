//! Parallel min/max tree reduction over scalar buffers.
//!
//! The source buffer is first duplicated into an internal scratch buffer so
//! the stride-doubling reduction may destroy intermediate values without
//! corrupting the caller's data. Each halving stage is a separate dispatch
//! in its own submission; the result lands in scratch slot 0 and is copied
//! to the destination offset.
//!
//! The simple stride-doubling schedule requires a power-of-two length,
//! validated at construction.

use std::sync::Arc;

use bytemuck::{Pod, Zeroable};

use super::{dispatch_size, GpuContext};
use crate::error::SimError;

/// Threads per workgroup, matching `@workgroup_size` in `min_max.wgsl`.
const WORKGROUP_SIZE: u32 = 256;

/// Reduction operator.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ReduceOp {
    Min,
    Max,
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
struct ReduceUniforms {
    size: u32,
    start: u32,
    end: u32,
}

/// GPU min/max reducer over f32 buffers of a fixed power-of-two length.
pub struct GpuMinMax {
    context: Arc<GpuContext>,
    params_buffer: wgpu::Buffer,
    scratch_buffer: wgpu::Buffer,
    mask_min_pipeline: wgpu::ComputePipeline,
    mask_max_pipeline: wgpu::ComputePipeline,
    reduce_min_pipeline: wgpu::ComputePipeline,
    reduce_max_pipeline: wgpu::ComputePipeline,
    bind_group: wgpu::BindGroup,
    len: u32,
}

impl GpuMinMax {
    /// Create a reducer for f32 buffers of `len` elements.
    ///
    /// # Errors
    /// Returns [`SimError::NotPowerOfTwo`] unless `len` is a nonzero power
    /// of two.
    pub fn new(context: Arc<GpuContext>, len: u32) -> Result<Self, SimError> {
        if len == 0 || !len.is_power_of_two() {
            return Err(SimError::NotPowerOfTwo {
                what: "min/max reduction",
                len,
            });
        }

        let params_buffer = context.device().create_buffer(&wgpu::BufferDescriptor {
            label: Some("Reduce Params"),
            size: std::mem::size_of::<ReduceUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let scratch_buffer = context.device().create_buffer(&wgpu::BufferDescriptor {
            label: Some("Reduce Scratch Buffer"),
            size: u64::from(len) * std::mem::size_of::<f32>() as u64,
            usage: wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::COPY_DST
                | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });

        let shader = context
            .device()
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some("Reduce Shader"),
                source: wgpu::ShaderSource::Wgsl(include_str!("min_max.wgsl").into()),
            });

        let bind_group_layout =
            context
                .device()
                .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                    label: Some("Reduce Bind Group Layout"),
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
                    label: Some("Reduce Pipeline Layout"),
                    bind_group_layouts: &[&bind_group_layout],
                    push_constant_ranges: &[],
                });

        let make_pipeline = |label: &str, entry_point: &str| {
            context
                .device()
                .create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                    label: Some(label),
                    layout: Some(&pipeline_layout),
                    module: &shader,
                    entry_point,
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                    cache: None,
                })
        };

        let mask_min_pipeline = make_pipeline("Mask Min Pipeline", "mask_min");
        let mask_max_pipeline = make_pipeline("Mask Max Pipeline", "mask_max");
        let reduce_min_pipeline = make_pipeline("Reduce Min Pipeline", "reduce_min");
        let reduce_max_pipeline = make_pipeline("Reduce Max Pipeline", "reduce_max");

        let bind_group = context
            .device()
            .create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("Reduce Bind Group"),
                layout: &bind_group_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: params_buffer.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: scratch_buffer.as_entire_binding(),
                    },
                ],
            });

        Ok(Self {
            context,
            params_buffer,
            scratch_buffer,
            mask_min_pipeline,
            mask_max_pipeline,
            reduce_min_pipeline,
            reduce_max_pipeline,
            bind_group,
            len,
        })
    }

    /// Reduce the whole of `source` and write the scalar result to
    /// `dest[write_offset]` (element offset, not bytes).
    pub fn reduce(&self, op: ReduceOp, source: &wgpu::Buffer, dest: &wgpu::Buffer, write_offset: u32) {
        self.reduce_range(op, source, 0, self.len, dest, write_offset);
    }

    /// Reduce `source[start..end)` and write the result to
    /// `dest[write_offset]`.
    ///
    /// Positions outside the range are overwritten with sentinel values in
    /// the scratch copy, so the same stride-doubling schedule applies.
    pub fn reduce_range(
        &self,
        op: ReduceOp,
        source: &wgpu::Buffer,
        start: u32,
        end: u32,
        dest: &wgpu::Buffer,
        write_offset: u32,
    ) {
        assert!(start <= end && end <= self.len, "reduction range out of bounds");

        let bytes_per_unit = std::mem::size_of::<f32>() as u64;
        let (mask_pipeline, reduce_pipeline) = match op {
            ReduceOp::Min => (&self.mask_min_pipeline, &self.reduce_min_pipeline),
            ReduceOp::Max => (&self.mask_max_pipeline, &self.reduce_max_pipeline),
        };

        self.context.queue().write_buffer(
            &self.params_buffer,
            0,
            bytemuck::bytes_of(&ReduceUniforms { size: 0, start, end }),
        );

        // Copy the caller's data into scratch; mask outside the range if this
        // is a sub-range reduction.
        let mut encoder =
            self.context
                .device()
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("Reduce Copy Encoder"),
                });
        encoder.copy_buffer_to_buffer(
            source,
            0,
            &self.scratch_buffer,
            0,
            u64::from(self.len) * bytes_per_unit,
        );
        if start > 0 || end < self.len {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Reduce Mask Pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(mask_pipeline);
            pass.set_bind_group(0, &self.bind_group, &[]);
            pass.dispatch_workgroups(dispatch_size(self.len, WORKGROUP_SIZE), 1, 1);
        }
        self.context.queue().submit(Some(encoder.finish()));

        // Tree stages: each halving is its own submission so its effects are
        // fully visible before the next stage reads them.
        let mut size = 2_u32;
        while size <= self.len {
            self.context.queue().write_buffer(
                &self.params_buffer,
                0,
                bytemuck::bytes_of(&ReduceUniforms { size, start, end }),
            );

            let active = self.len / size;
            let mut encoder = self.context.device().create_command_encoder(
                &wgpu::CommandEncoderDescriptor {
                    label: Some("Reduce Stage Encoder"),
                },
            );
            {
                let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                    label: Some("Reduce Stage Pass"),
                    timestamp_writes: None,
                });
                pass.set_pipeline(reduce_pipeline);
                pass.set_bind_group(0, &self.bind_group, &[]);
                pass.dispatch_workgroups(dispatch_size(active, WORKGROUP_SIZE), 1, 1);
            }
            self.context.queue().submit(Some(encoder.finish()));

            size *= 2;
        }

        let mut encoder =
            self.context
                .device()
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("Reduce Result Encoder"),
                });
        encoder.copy_buffer_to_buffer(
            &self.scratch_buffer,
            0,
            dest,
            u64::from(write_offset) * bytes_per_unit,
            bytes_per_unit,
        );
        self.context.queue().submit(Some(encoder.finish()));
    }

    /// Buffer length the reducer was built for.
    #[must_use]
    pub fn element_count(&self) -> u32 {
        self.len
    }
}
