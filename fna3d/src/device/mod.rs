/// Device module - the driver interface and every type that flows through it

// Module declarations
pub mod device;
pub mod handles;
pub mod format;
pub mod state;
pub mod vertex;
pub mod render_target;
pub mod presentation;
pub mod effect;
pub mod sys_renderer;
pub mod config;

#[cfg(test)]
pub(crate) mod mock_device;

// Re-export everything from device.rs
pub use device::*;

// Re-export from other modules
pub use handles::*;
pub use format::*;
pub use state::*;
pub use vertex::*;
pub use render_target::*;
pub use presentation::*;
pub use effect::*;
pub use sys_renderer::*;
pub use config::*;
