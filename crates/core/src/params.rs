//! Simulation settings, smoothing kernels and the GPU parameter block.

use bytemuck::{Pod, Zeroable};
use nalgebra::Vector2;
use serde::{Deserialize, Serialize};

use crate::error::SimError;

/// Density smoothing kernel family.
///
/// Both kernels have compact support of one smoothing radius and integrate
/// to the particle mass over the 2D disc; they differ in how sharply weight
/// concentrates near the particle.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SmoothingKernel {
    /// `(h - r)` powers. Sharp central peak, strong short-range repulsion.
    Spiky,
    /// `(h^2 - r^2)` powers. Flat near the center, smoother pressure field.
    Soft,
}

impl SmoothingKernel {
    /// Normalization constants `(K_d, K_nd)` for the density and
    /// near-density kernels, absorbed into the weights host-side so the
    /// shader only evaluates the polynomial falloff.
    #[must_use]
    pub fn normalization(self, mass: f32, smoothing_radius: f32) -> (f32, f32) {
        let h = smoothing_radius;
        match self {
            // W_d = K_d (h - r)^2, W_nd = K_nd (h - r)^3
            SmoothingKernel::Spiky => (
                6.0 * mass / (std::f32::consts::PI * h.powi(4)),
                10.0 * mass / (std::f32::consts::PI * h.powi(5)),
            ),
            // W_d = K_d (h^2 - r^2)^3, W_nd = K_nd (h^2 - r^2)^4
            SmoothingKernel::Soft => (
                4.0 * mass / (std::f32::consts::PI * h.powi(8)),
                5.0 * mass / (std::f32::consts::PI * h.powi(10)),
            ),
        }
    }

    /// Kernel selector as encoded in the GPU parameter block.
    #[must_use]
    pub fn gpu_index(self) -> u32 {
        match self {
            SmoothingKernel::Spiky => 0,
            SmoothingKernel::Soft => 1,
        }
    }
}

/// Per-particle scalar fields whose min/max range can be tracked for
/// display normalization.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScalarField {
    Density,
    NearDensity,
    ForceMagnitude,
    VelocityMagnitude,
}

impl ScalarField {
    /// Element offset of this field's `(min, max)` slot pair in the ranges
    /// buffer.
    #[must_use]
    pub fn range_offset(self) -> u32 {
        match self {
            ScalarField::Density => 0,
            ScalarField::NearDensity => 2,
            ScalarField::ForceMagnitude => 4,
            ScalarField::VelocityMagnitude => 6,
        }
    }
}

/// Pointer interaction applied as a radial force around a point.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum InteractionMode {
    /// Repel particles from the interaction point.
    Push,
    /// Attract particles toward the interaction point.
    Pull,
    /// No interaction force.
    None,
}

/// Tunable simulation parameters.
///
/// All distances are in scene units, all times in seconds. Changing settings
/// on a live simulation takes effect at the start of the next step.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SimulationSettings {
    /// Kernel support radius h. Also the spatial grid cell size.
    pub smoothing_radius: f32,
    /// Rest density the pressure term relaxes toward.
    pub base_density: f32,
    /// Mass of each particle.
    pub particle_mass: f32,
    /// Dynamic viscosity coefficient.
    pub viscosity: f32,
    /// Simulation domain extent; particles live in `[0, scene_size]`.
    pub scene_size: Vector2<f32>,
    /// Velocity retention factor on boundary reflection, in `[0, 1]`.
    pub damping_coeff: f32,
    /// Downward gravitational acceleration.
    pub gravity: f32,
    /// Stiffness of the density-error pressure response.
    pub pressure_factor: f32,
    /// Stiffness of the purely repulsive near-density response.
    pub near_pressure_factor: f32,
    /// Fixed integration time step.
    pub time_step: f32,
    /// Particle radius used for boundary collision.
    pub particle_radius: f32,
    /// Magnitude of the pointer interaction force.
    pub interaction_strength: f32,
    /// Radius of the pointer interaction force.
    pub interaction_radius: f32,
    /// Density kernel family.
    pub density_kernel: SmoothingKernel,
    /// Scalar field whose min/max range is kept refreshed.
    pub selected_field: ScalarField,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            smoothing_radius: 0.2,
            base_density: 3.0,
            particle_mass: 1.0,
            viscosity: 0.05,
            scene_size: Vector2::new(16.0, 9.0),
            damping_coeff: 0.85,
            gravity: 9.8,
            pressure_factor: 30.0,
            near_pressure_factor: 8.0,
            time_step: 1.0 / 120.0,
            particle_radius: 0.035,
            interaction_strength: 25.0,
            interaction_radius: 1.5,
            density_kernel: SmoothingKernel::Spiky,
            selected_field: ScalarField::Density,
        }
    }
}

/// GPU-side parameter block, 80 bytes, layout mirrored by `SimParams` in
/// `simulation.wgsl`.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub(crate) struct SimUniforms {
    pub particle_count: u32,
    pub smoothing_radius: f32,
    pub base_density: f32,
    pub norm_density: f32,
    pub norm_near_density: f32,
    pub norm_viscous: f32,
    pub scene_size: [f32; 2],
    pub damping_coeff: f32,
    pub gravity: f32,
    pub pressure_factor: f32,
    pub near_pressure_factor: f32,
    pub time_step: f32,
    pub particle_radius: f32,
    pub interaction_strength: f32,
    pub interaction_radius: f32,
    pub interaction_pos: [f32; 2],
    pub density_kernel: u32,
    pub _pad: u32,
}

impl SimUniforms {
    /// Bake settings and the current interaction into the parameter block.
    ///
    /// Kernel normalization constants are derived here so the shaders never
    /// divide by pi or a radius power per neighbor. `interaction_strength`
    /// carries the mode as its sign: positive pushes, negative pulls, zero
    /// disables the force.
    pub(crate) fn derive(
        settings: &SimulationSettings,
        particle_count: u32,
        interaction_pos: Vector2<f32>,
        interaction_mode: InteractionMode,
    ) -> Self {
        let (norm_density, norm_near_density) = settings
            .density_kernel
            .normalization(settings.particle_mass, settings.smoothing_radius);
        let norm_viscous = 4.0 * settings.viscosity * settings.particle_mass
            / (std::f32::consts::PI * settings.smoothing_radius.powi(8));
        let interaction_strength = match interaction_mode {
            InteractionMode::Push => settings.interaction_strength,
            InteractionMode::Pull => -settings.interaction_strength,
            InteractionMode::None => 0.0,
        };

        Self {
            particle_count,
            smoothing_radius: settings.smoothing_radius,
            base_density: settings.base_density,
            norm_density,
            norm_near_density,
            norm_viscous,
            scene_size: [settings.scene_size.x, settings.scene_size.y],
            damping_coeff: settings.damping_coeff,
            gravity: settings.gravity,
            pressure_factor: settings.pressure_factor,
            near_pressure_factor: settings.near_pressure_factor,
            time_step: settings.time_step,
            particle_radius: settings.particle_radius,
            interaction_strength,
            interaction_radius: settings.interaction_radius,
            interaction_pos: [interaction_pos.x, interaction_pos.y],
            density_kernel: settings.density_kernel.gpu_index(),
            _pad: 0,
        }
    }
}

/// Check that `n` particles can flow through the sort and reduction stages.
///
/// # Errors
/// Returns [`SimError::InvalidParticleCount`] unless `n` is a nonzero power
/// of two.
pub fn validate_particle_count(n: usize) -> Result<u32, SimError> {
    if n == 0 || !n.is_power_of_two() || n > u32::MAX as usize {
        return Err(SimError::InvalidParticleCount(n));
    }
    #[allow(clippy::cast_possible_truncation)]
    Ok(n as u32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_uniform_block_is_80_bytes() {
        assert_eq!(std::mem::size_of::<SimUniforms>(), 80);
    }

    #[test]
    fn test_kernel_normalization_integrates_to_mass() {
        // Closed-form disc integrals of the kernel polynomials:
        // spiky:  int (h-r)^2 r dr = h^4/12,  int (h-r)^3 r dr = h^5/20
        // soft:   int (h^2-r^2)^3 r dr = h^8/8, int (h^2-r^2)^4 r dr = h^10/10
        let mass = 2.5_f32;
        let h = 0.3_f32;
        let tau = 2.0 * std::f32::consts::PI;

        let (kd, knd) = SmoothingKernel::Spiky.normalization(mass, h);
        assert_relative_eq!(kd * tau * h.powi(4) / 12.0, mass, epsilon = 1e-4);
        assert_relative_eq!(knd * tau * h.powi(5) / 20.0, mass, epsilon = 1e-4);

        let (kd, knd) = SmoothingKernel::Soft.normalization(mass, h);
        assert_relative_eq!(kd * tau * h.powi(8) / 8.0, mass, epsilon = 1e-4);
        assert_relative_eq!(knd * tau * h.powi(10) / 10.0, mass, epsilon = 1e-4);
    }

    #[test]
    fn test_range_offsets_are_distinct_pairs() {
        let offsets = [
            ScalarField::Density.range_offset(),
            ScalarField::NearDensity.range_offset(),
            ScalarField::ForceMagnitude.range_offset(),
            ScalarField::VelocityMagnitude.range_offset(),
        ];
        assert_eq!(offsets, [0, 2, 4, 6]);
    }

    #[test]
    fn test_interaction_mode_signs_strength() {
        let settings = SimulationSettings::default();
        let pos = Vector2::new(1.0, 2.0);

        let push = SimUniforms::derive(&settings, 16, pos, InteractionMode::Push);
        assert!(push.interaction_strength > 0.0);

        let pull = SimUniforms::derive(&settings, 16, pos, InteractionMode::Pull);
        assert!(pull.interaction_strength < 0.0);

        let none = SimUniforms::derive(&settings, 16, pos, InteractionMode::None);
        assert_eq!(none.interaction_strength, 0.0);
        assert_eq!(none.interaction_pos, [1.0, 2.0]);
    }

    #[test]
    fn test_validate_particle_count() {
        assert!(validate_particle_count(0).is_err());
        assert!(validate_particle_count(3).is_err());
        assert!(validate_particle_count(1000).is_err());
        assert_eq!(validate_particle_count(1).ok(), Some(1));
        assert_eq!(validate_particle_count(1024).ok(), Some(1024));
    }
}
