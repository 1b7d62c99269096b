//! GPU-resident SPH simulation pipeline.
//!
//! Owns every particle buffer plus the embedded sorter and reducer, and
//! drives the per-step pass sequence:
//!
//! predict -> hash -> sort -> index -> density -> force -> integrate
//!
//! Each stage is its own compute pass; the pass boundary is the only
//! synchronization primitive. On alternating steps the min/max range of the
//! currently selected scalar field is refreshed for display normalization.

use std::sync::Arc;

use nalgebra::Vector2;

use super::readback::read_buffer;
use super::reduce::{GpuMinMax, ReduceOp};
use super::sort::{GpuSort, SpatialEntry};
use super::{dispatch_size, GpuContext};
use crate::error::SimError;
use crate::params::{
    validate_particle_count, InteractionMode, ScalarField, SimUniforms, SimulationSettings,
};

/// Threads per workgroup, matching `@workgroup_size` in `simulation.wgsl`.
const WORKGROUP_SIZE: u32 = 256;

struct ParticleBuffers {
    params: wgpu::Buffer,
    positions: wgpu::Buffer,
    predicted_positions: wgpu::Buffer,
    velocities: wgpu::Buffer,
    densities: wgpu::Buffer,
    near_densities: wgpu::Buffer,
    spatial_lookup: wgpu::Buffer,
    start_indices: wgpu::Buffer,
    forces: wgpu::Buffer,
    force_magnitudes: wgpu::Buffer,
    velocity_magnitudes: wgpu::Buffer,
    ranges: wgpu::Buffer,
}

struct Pipelines {
    predict: wgpu::ComputePipeline,
    hash: wgpu::ComputePipeline,
    index: wgpu::ComputePipeline,
    density: wgpu::ComputePipeline,
    force: wgpu::ComputePipeline,
    integrate: wgpu::ComputePipeline,
}

/// A complete SPH fluid simulation resident on one GPU device.
pub struct GpuSimulation {
    context: Arc<GpuContext>,
    buffers: ParticleBuffers,
    pipelines: Pipelines,
    bind_group: wgpu::BindGroup,
    sorter: GpuSort,
    reducer: GpuMinMax,
    settings: SimulationSettings,
    settings_dirty: bool,
    interaction_pos: Vector2<f32>,
    interaction_mode: InteractionMode,
    particle_count: u32,
    tick: u64,
}

impl GpuSimulation {
    /// Create a simulation for the given particles.
    ///
    /// `initial_positions` is interleaved x,y data; velocities start at
    /// zero. All buffers are allocated here and never reallocated.
    ///
    /// # Errors
    /// Returns [`SimError::OddPositionLength`] for odd-length position data,
    /// [`SimError::InvalidParticleCount`] unless the particle count is a
    /// nonzero power of two, and [`SimError::InsufficientMemory`] when the
    /// device cannot hold the working set.
    pub fn new(
        context: Arc<GpuContext>,
        settings: SimulationSettings,
        initial_positions: &[f32],
    ) -> Result<Self, SimError> {
        if initial_positions.len() % 2 != 0 {
            return Err(SimError::OddPositionLength(initial_positions.len()));
        }
        let particle_count = validate_particle_count(initial_positions.len() / 2)?;
        if !context.has_sufficient_memory(u64::from(particle_count)) {
            return Err(SimError::InsufficientMemory {
                required: GpuContext::working_set_bytes(u64::from(particle_count)),
                available: context.device().limits().max_buffer_size,
            });
        }

        tracing::info!(
            particles = particle_count,
            adapter = %context.adapter_info().name,
            "Creating GPU simulation"
        );

        let buffers = Self::create_buffers(&context, particle_count);
        context.queue().write_buffer(
            &buffers.positions,
            0,
            bytemuck::cast_slice(initial_positions),
        );

        let shader = context
            .device()
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some("Simulation Shader"),
                source: wgpu::ShaderSource::Wgsl(include_str!("simulation.wgsl").into()),
            });

        let storage_entry = |binding: u32| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Storage { read_only: false },
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        };
        let mut layout_entries = vec![wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        }];
        layout_entries.extend((1..=10).map(storage_entry));

        let bind_group_layout =
            context
                .device()
                .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                    label: Some("Simulation Bind Group Layout"),
                    entries: &layout_entries,
                });

        let pipeline_layout =
            context
                .device()
                .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                    label: Some("Simulation Pipeline Layout"),
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
        let pipelines = Pipelines {
            predict: make_pipeline("Predict Pipeline", "predict_positions_pass"),
            hash: make_pipeline("Hash Pipeline", "hash_particles"),
            index: make_pipeline("Start Indices Pipeline", "build_start_indices"),
            density: make_pipeline("Density Pipeline", "compute_densities"),
            force: make_pipeline("Force Pipeline", "compute_forces"),
            integrate: make_pipeline("Integrate Pipeline", "integrate"),
        };

        let resources: [&wgpu::Buffer; 11] = [
            &buffers.params,
            &buffers.positions,
            &buffers.predicted_positions,
            &buffers.velocities,
            &buffers.densities,
            &buffers.near_densities,
            &buffers.spatial_lookup,
            &buffers.start_indices,
            &buffers.forces,
            &buffers.force_magnitudes,
            &buffers.velocity_magnitudes,
        ];
        #[allow(clippy::cast_possible_truncation)]
        let bind_entries: Vec<wgpu::BindGroupEntry> = resources
            .iter()
            .enumerate()
            .map(|(binding, buffer)| wgpu::BindGroupEntry {
                binding: binding as u32,
                resource: buffer.as_entire_binding(),
            })
            .collect();
        let bind_group = context
            .device()
            .create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("Simulation Bind Group"),
                layout: &bind_group_layout,
                entries: &bind_entries,
            });

        let sorter = GpuSort::new(Arc::clone(&context), &buffers.spatial_lookup, particle_count)?;
        let reducer = GpuMinMax::new(Arc::clone(&context), particle_count)?;

        let mut simulation = Self {
            context,
            buffers,
            pipelines,
            bind_group,
            sorter,
            reducer,
            settings,
            settings_dirty: false,
            interaction_pos: Vector2::zeros(),
            interaction_mode: InteractionMode::None,
            particle_count,
            tick: 0,
        };
        simulation.upload_uniforms();
        Ok(simulation)
    }

    fn create_buffers(context: &GpuContext, n: u32) -> ParticleBuffers {
        let vec2_size = u64::from(n) * 8;
        let scalar_size = u64::from(n) * 4;
        let storage = wgpu::BufferUsages::STORAGE
            | wgpu::BufferUsages::COPY_DST
            | wgpu::BufferUsages::COPY_SRC;
        let make = |label: &str, size: u64| {
            context.device().create_buffer(&wgpu::BufferDescriptor {
                label: Some(label),
                size,
                usage: storage,
                mapped_at_creation: false,
            })
        };

        ParticleBuffers {
            params: context.device().create_buffer(&wgpu::BufferDescriptor {
                label: Some("Simulation Params"),
                size: std::mem::size_of::<SimUniforms>() as u64,
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            }),
            positions: make("Position Buffer", vec2_size),
            predicted_positions: make("Predicted Position Buffer", vec2_size),
            velocities: make("Velocity Buffer", vec2_size),
            densities: make("Density Buffer", scalar_size),
            near_densities: make("Near Density Buffer", scalar_size),
            spatial_lookup: make("Spatial Lookup Buffer", vec2_size),
            start_indices: make("Start Indices Buffer", scalar_size),
            forces: make("Force Buffer", vec2_size),
            force_magnitudes: make("Force Magnitude Buffer", scalar_size),
            velocity_magnitudes: make("Velocity Magnitude Buffer", scalar_size),
            ranges: make("Ranges Buffer", 8 * 4),
        }
    }

    fn upload_uniforms(&mut self) {
        let uniforms = SimUniforms::derive(
            &self.settings,
            self.particle_count,
            self.interaction_pos,
            self.interaction_mode,
        );
        self.context
            .queue()
            .write_buffer(&self.buffers.params, 0, bytemuck::bytes_of(&uniforms));
        self.settings_dirty = false;
    }

    fn encode_pass(&self, encoder: &mut wgpu::CommandEncoder, label: &str, pipeline: &wgpu::ComputePipeline) {
        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some(label),
            timestamp_writes: None,
        });
        pass.set_pipeline(pipeline);
        pass.set_bind_group(0, &self.bind_group, &[]);
        pass.dispatch_workgroups(dispatch_size(self.particle_count, WORKGROUP_SIZE), 1, 1);
    }

    /// Advance the simulation by one fixed time step.
    pub fn advance(&mut self) {
        if self.settings_dirty {
            self.upload_uniforms();
        }

        // Predicted positions and cell keys; the hash pass also resets the
        // start index slots for the index pass below.
        let mut encoder =
            self.context
                .device()
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("Simulation Prepare Encoder"),
                });
        self.encode_pass(&mut encoder, "Predict Pass", &self.pipelines.predict);
        self.encode_pass(&mut encoder, "Hash Pass", &self.pipelines.hash);
        self.context.queue().submit(Some(encoder.finish()));

        self.sorter.sort();

        let mut encoder =
            self.context
                .device()
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("Simulation Step Encoder"),
                });
        self.encode_pass(&mut encoder, "Start Indices Pass", &self.pipelines.index);
        self.encode_pass(&mut encoder, "Density Pass", &self.pipelines.density);
        self.encode_pass(&mut encoder, "Force Pass", &self.pipelines.force);
        self.encode_pass(&mut encoder, "Integrate Pass", &self.pipelines.integrate);
        self.context.queue().submit(Some(encoder.finish()));

        // Range refresh is amortized to every other step; displayed
        // normalization may lag by one step.
        if self.tick % 2 == 0 {
            self.refresh_ranges();
        }
        self.tick = self.tick.wrapping_add(1);
    }

    fn refresh_ranges(&self) {
        let field = self.settings.selected_field;
        let source = self.scalar_field_buffer(field);
        let offset = field.range_offset();

        self.context.queue().write_buffer(
            &self.buffers.ranges,
            u64::from(offset) * 4,
            bytemuck::cast_slice(&[f32::INFINITY, f32::NEG_INFINITY]),
        );
        self.reducer
            .reduce(ReduceOp::Min, source, &self.buffers.ranges, offset);
        self.reducer
            .reduce(ReduceOp::Max, source, &self.buffers.ranges, offset + 1);
    }

    /// Rebuild SpatialLookup and StartIndices without integrating.
    ///
    /// Diagnostic hook; repeated calls with unchanged positions leave both
    /// buffers semantically unchanged.
    pub fn rebuild_spatial_index(&mut self) {
        if self.settings_dirty {
            self.upload_uniforms();
        }

        let mut encoder =
            self.context
                .device()
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("Spatial Index Encoder"),
                });
        self.encode_pass(&mut encoder, "Predict Pass", &self.pipelines.predict);
        self.encode_pass(&mut encoder, "Hash Pass", &self.pipelines.hash);
        self.context.queue().submit(Some(encoder.finish()));

        self.sorter.sort();

        let mut encoder =
            self.context
                .device()
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("Start Indices Encoder"),
                });
        self.encode_pass(&mut encoder, "Start Indices Pass", &self.pipelines.index);
        self.context.queue().submit(Some(encoder.finish()));
    }

    /// Replace the settings; takes effect at the start of the next step.
    pub fn update_settings(&mut self, settings: SimulationSettings) {
        self.settings = settings;
        self.settings_dirty = true;
    }

    /// Set the pointer interaction. Persists until overwritten or cleared
    /// with [`InteractionMode::None`].
    pub fn set_interaction(&mut self, position: Vector2<f32>, mode: InteractionMode) {
        self.interaction_pos = position;
        self.interaction_mode = mode;
        self.settings_dirty = true;
    }

    #[must_use]
    pub fn settings(&self) -> &SimulationSettings {
        &self.settings
    }

    #[must_use]
    pub fn interaction(&self) -> (Vector2<f32>, InteractionMode) {
        (self.interaction_pos, self.interaction_mode)
    }

    #[must_use]
    pub fn particle_count(&self) -> u32 {
        self.particle_count
    }

    /// Steps advanced so far.
    #[must_use]
    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// Interleaved x,y particle positions, for a rendering collaborator.
    #[must_use]
    pub fn position_buffer(&self) -> &wgpu::Buffer {
        &self.buffers.positions
    }

    /// Min/max pairs per scalar field, in [`ScalarField::range_offset`]
    /// order. Only the selected field's pair is kept refreshed.
    #[must_use]
    pub fn ranges_buffer(&self) -> &wgpu::Buffer {
        &self.buffers.ranges
    }

    /// The buffer holding the given per-particle scalar field.
    #[must_use]
    pub fn scalar_field_buffer(&self, field: ScalarField) -> &wgpu::Buffer {
        match field {
            ScalarField::Density => &self.buffers.densities,
            ScalarField::NearDensity => &self.buffers.near_densities,
            ScalarField::ForceMagnitude => &self.buffers.force_magnitudes,
            ScalarField::VelocityMagnitude => &self.buffers.velocity_magnitudes,
        }
    }

    /// Read back interleaved x,y positions (blocking; debugging and tests).
    #[must_use]
    pub fn read_positions(&self) -> Vec<f32> {
        read_buffer(&self.context, &self.buffers.positions, self.len() * 2)
    }

    /// Read back interleaved x,y velocities (blocking).
    #[must_use]
    pub fn read_velocities(&self) -> Vec<f32> {
        read_buffer(&self.context, &self.buffers.velocities, self.len() * 2)
    }

    /// Read back a scalar field (blocking).
    #[must_use]
    pub fn read_scalar_field(&self, field: ScalarField) -> Vec<f32> {
        read_buffer(&self.context, self.scalar_field_buffer(field), self.len())
    }

    /// Read back the sorted spatial lookup pairs (blocking).
    #[must_use]
    pub fn read_spatial_lookup(&self) -> Vec<SpatialEntry> {
        read_buffer(&self.context, &self.buffers.spatial_lookup, self.len())
    }

    /// Read back the per-key start indices (blocking).
    #[must_use]
    pub fn read_start_indices(&self) -> Vec<u32> {
        read_buffer(&self.context, &self.buffers.start_indices, self.len())
    }

    /// Read back all eight range slots (blocking).
    #[must_use]
    pub fn read_ranges(&self) -> Vec<f32> {
        read_buffer(&self.context, &self.buffers.ranges, 8)
    }

    fn len(&self) -> usize {
        self.particle_count as usize
    }
}
