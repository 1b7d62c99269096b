//! GPU compute pipeline for the fluid simulation.
//!
//! Everything particle-sized lives on the device; the CPU only writes the
//! parameter uniform and orchestrates dispatch order. Uses wgpu for
//! cross-platform compute (Vulkan/Metal/DX12).
//!
//! Synchronization model: within a submission, compute pass boundaries order
//! writes before subsequent reads; across submissions, the queue's in-order
//! execution guarantee does. No atomics, fences or events are used.

pub mod context;
pub mod readback;
pub mod reduce;
pub mod simulation;
pub mod sort;

pub use context::{create_gpu_context_blocking, GpuContext};
pub use reduce::{GpuMinMax, ReduceOp};
pub use simulation::GpuSimulation;
pub use sort::{GpuSort, SpatialEntry};

/// Workgroups needed to cover `count` items at `workgroup_size` threads
/// each, never zero.
pub(crate) fn dispatch_size(count: u32, workgroup_size: u32) -> u32 {
    count.div_ceil(workgroup_size).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatch_size() {
        assert_eq!(dispatch_size(1, 256), 1);
        assert_eq!(dispatch_size(256, 256), 1);
        assert_eq!(dispatch_size(257, 256), 2);
        assert_eq!(dispatch_size(0, 256), 1);
    }
}
