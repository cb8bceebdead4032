//! Error types for FNA3D
//!
//! One error type is shared by the API crate and every driver so that device
//! entry points can surface backend failures without conversion layers.

use std::fmt;

/// Result type for FNA3D operations
pub type Result<T> = std::result::Result<T, Error>;

/// FNA3D errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Backend-specific error (Vulkan call failed, invalid state, ...)
    BackendError(String),

    /// Out of GPU memory.
    ///
    /// Memory allocation paths treat this as recoverable: the caller may retry
    /// with relaxed memory-property requirements.
    OutOfMemory,

    /// Invalid resource (unknown handle, wrong resource kind, bad size)
    InvalidResource(String),

    /// Initialization failed (device, swapchain, subsystems)
    InitializationFailed(String),

    /// The device was lost; no recovery is attempted
    DeviceLost,
}

impl Error {
    /// Whether a caller may retry the failed allocation with relaxed requirements
    pub fn is_out_of_memory(&self) -> bool {
        matches!(self, Error::OutOfMemory)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::BackendError(msg) => write!(f, "Backend error: {}", msg),
            Error::OutOfMemory => write!(f, "Out of GPU memory"),
            Error::InvalidResource(msg) => write!(f, "Invalid resource: {}", msg),
            Error::InitializationFailed(msg) => write!(f, "Initialization failed: {}", msg),
            Error::DeviceLost => write!(f, "Device lost"),
        }
    }
}

impl std::error::Error for Error {}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
