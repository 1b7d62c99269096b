//! Error types for simulation setup and GPU initialization.

/// Errors that can occur while building a simulation or its GPU resources
#[derive(Debug)]
pub enum SimError {
    /// Particle count is not usable by the GPU pipeline
    InvalidParticleCount(usize),
    /// A GPU stage requires a power-of-two element count
    NotPowerOfTwo {
        /// Which stage rejected the length
        what: &'static str,
        /// The offending length
        len: u32,
    },
    /// Interleaved x,y position data has an odd number of floats
    OddPositionLength(usize),
    /// No compatible GPU adapter was found
    NoAdapter,
    /// The adapter refused to provide a device
    RequestDevice(String),
    /// The device reports less memory than the particle set needs
    InsufficientMemory {
        /// Bytes the working set requires
        required: u64,
        /// Bytes the device reports as available
        available: u64,
    },
}

impl std::fmt::Display for SimError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SimError::InvalidParticleCount(n) => {
                write!(f, "Invalid particle count {n}: must be a nonzero power of two")
            }
            SimError::NotPowerOfTwo { what, len } => {
                write!(f, "{what} requires a power-of-two length, got {len}")
            }
            SimError::OddPositionLength(len) => {
                write!(f, "Interleaved position data has odd length {len}")
            }
            SimError::NoAdapter => write!(f, "No compatible GPU adapter found"),
            SimError::RequestDevice(msg) => write!(f, "Failed to acquire GPU device: {msg}"),
            SimError::InsufficientMemory { required, available } => {
                write!(
                    f,
                    "Insufficient GPU memory: need {required} bytes, {available} available"
                )
            }
        }
    }
}

impl std::error::Error for SimError {}
