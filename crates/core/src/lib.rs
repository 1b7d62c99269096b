//! Real-time 2D SPH particle fluid simulation, GPU-resident.
//!
//! Every per-particle quantity lives in GPU storage buffers; each fixed
//! time step runs a pipeline of compute passes (predict, hash, sort, index,
//! density, force, integrate) with pass boundaries as the only
//! synchronization points. A bitonic sorter orders particles by hashed grid
//! cell so neighbor search touches at most nine cell runs, and a tree
//! reducer keeps min/max display ranges fresh without reading particle data
//! back to the CPU.

pub mod error;
pub mod gpu;
pub mod params;
pub mod spawn;

pub use error::SimError;
pub use gpu::{
    create_gpu_context_blocking, GpuContext, GpuMinMax, GpuSimulation, GpuSort, ReduceOp,
    SpatialEntry,
};
pub use params::{
    validate_particle_count, InteractionMode, ScalarField, SimulationSettings, SmoothingKernel,
};
