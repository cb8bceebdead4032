/*!
# FNA3D

Backend-agnostic graphics device API.

This crate describes the `Device` trait every graphics driver implements, the
parameter and state types that flow through it, and the small runtime shared by
all drivers (errors, logging, configuration and the driver registry).

## Architecture

- **Device**: the driver vtable (draws, state changes, resources, presentation)
- **Engine**: global logger and driver registry
- **Config**: environment-style hints read at device creation

Drivers (Vulkan, ...) live in their own crates and register themselves with
`Engine::register_driver`.
*/

// Internal modules
mod error;
mod engine;
pub mod log;
pub mod device;

// Main fna3d namespace module
pub mod fna3d {
    // Error types
    pub use crate::error::{Error, Result};

    // Engine singleton
    pub use crate::engine::{Engine, DriverFactory};

    // Device trait and configuration
    pub use crate::device::{Device, DeviceStats, Config};

    // Logging sub-module (types only, NOT macros)
    pub mod log {
        pub use crate::log::{Logger, LogEntry, LogSeverity, DefaultLogger};
    }

    // All device-facing types
    pub mod render {
        pub use crate::device::*;
    }
}

// Re-export math library at crate root
pub use glam;
