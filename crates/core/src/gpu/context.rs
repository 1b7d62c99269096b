//! GPU context management.
//!
//! Provides wgpu device initialization and shared resources for the
//! simulation's compute passes.

use std::sync::Arc;

use crate::error::SimError;

/// GPU context for simulation compute operations.
///
/// Manages the wgpu device, queue and adapter info shared by the sorter,
/// reducer and simulation pipelines.
pub struct GpuContext {
    /// wgpu device for GPU operations
    device: Arc<wgpu::Device>,
    /// Command queue for submitting GPU work
    queue: Arc<wgpu::Queue>,
    /// Adapter information for diagnostics
    adapter_info: wgpu::AdapterInfo,
}

impl GpuContext {
    /// Create a new GPU context with default settings.
    ///
    /// Automatically selects the best available GPU adapter.
    ///
    /// # Errors
    /// Returns an error if no compatible adapter or device can be created.
    pub async fn new() -> Result<Self, SimError> {
        Self::with_power_preference(wgpu::PowerPreference::HighPerformance).await
    }

    /// Create a new GPU context with a specific power preference.
    ///
    /// # Errors
    /// Returns an error if no compatible adapter or device can be created.
    pub async fn with_power_preference(
        power_preference: wgpu::PowerPreference,
    ) -> Result<Self, SimError> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .ok_or(SimError::NoAdapter)?;

        let adapter_info = adapter.get_info();
        tracing::info!(
            "GPU adapter selected: {} ({:?})",
            adapter_info.name,
            adapter_info.backend
        );

        // The simulation shader binds 10 storage buffers in one group, above
        // the WebGPU default of 8. Request the adapter's real limit.
        let adapter_limits = adapter.limits();
        let mut required_limits = wgpu::Limits::default();
        required_limits.max_storage_buffers_per_shader_stage = adapter_limits
            .max_storage_buffers_per_shader_stage
            .max(required_limits.max_storage_buffers_per_shader_stage);

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Fluid Simulation GPU Device"),
                    required_features: wgpu::Features::empty(),
                    required_limits,
                    memory_hints: wgpu::MemoryHints::Performance,
                },
                None, // No trace path
            )
            .await
            .map_err(|e| SimError::RequestDevice(e.to_string()))?;

        Ok(Self {
            device: Arc::new(device),
            queue: Arc::new(queue),
            adapter_info,
        })
    }

    /// Get a reference to the wgpu device.
    #[must_use]
    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    /// Get a reference to the command queue.
    #[must_use]
    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// Get adapter information for diagnostics.
    #[must_use]
    pub fn adapter_info(&self) -> &wgpu::AdapterInfo {
        &self.adapter_info
    }

    /// Check whether the device can hold the working set for `n` particles.
    #[must_use]
    pub fn has_sufficient_memory(&self, n: u64) -> bool {
        Self::working_set_bytes(n) <= self.device.limits().max_buffer_size
    }

    /// Bytes the per-particle working set for `n` particles occupies (four
    /// vec2 buffers, four scalar buffers, the spatial lookup pairs and the
    /// start indices), rounded up to 64 per particle.
    #[must_use]
    pub fn working_set_bytes(n: u64) -> u64 {
        n * 64
    }
}

/// Blocking wrapper for creating a GPU context.
///
/// Uses pollster to block on async GPU initialization. Suitable for
/// non-async contexts like tests.
///
/// # Errors
/// Returns an error if GPU context creation fails.
pub fn create_gpu_context_blocking() -> Result<GpuContext, SimError> {
    pollster::block_on(GpuContext::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gpu_context_creation() {
        // Try to create a GPU context (may fail on systems without GPU)
        match create_gpu_context_blocking() {
            Ok(ctx) => {
                assert!(!ctx.adapter_info().name.is_empty());
                // 64k particles is a realistic interactive load
                assert!(ctx.has_sufficient_memory(65_536));
            }
            Err(e) => {
                // GPU not available - acceptable for CI/headless systems
                eprintln!("GPU context creation skipped: {e}");
            }
        }
    }

    #[test]
    fn test_working_set_estimate() {
        assert_eq!(GpuContext::working_set_bytes(1024), 1024 * 64);
    }
}
