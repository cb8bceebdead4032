/// Device configuration
///
/// Gathers the environment-style hints a driver reads at creation time.
/// `Config::default()` gives the documented defaults, `Config::from_env()`
/// overlays the process environment.

use crate::engine_warn;

pub const HINT_PIPELINE_CACHE_FILE_NAME: &str = "FNA3D_VULKAN_PIPELINE_CACHE_FILE_NAME";
pub const HINT_DEVICE_LOCAL_HEAP_USAGE_FACTOR: &str = "FNA3D_VULKAN_DEVICE_LOCAL_HEAP_USAGE_FACTOR";
pub const HINT_FORCE_MAILBOX_VSYNC: &str = "FNA3D_VULKAN_FORCE_MAILBOX_VSYNC";
pub const HINT_ENABLE_LATE_SWAP_TEAR: &str = "FNA3D_ENABLE_LATE_SWAP_TEAR";
pub const HINT_FORCE_DRIVER: &str = "FNA3D_FORCE_DRIVER";
pub const HINT_DESCRIPTOR_SET_DEACTIVATE_FRAMES: &str = "FNA3D_VULKAN_DESCRIPTOR_SET_DEACTIVATE_FRAMES";
pub const HINT_DEFRAG_COOLDOWN_FRAMES: &str = "FNA3D_VULKAN_DEFRAG_COOLDOWN_FRAMES";

pub const DEFAULT_PIPELINE_CACHE_FILE_NAME: &str = "FNA3D_Vulkan_PipelineCache.blob";

/// Which validation messages reach the logger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DebugSeverity {
    ErrorsOnly,
    #[default]
    ErrorsAndWarnings,
    All,
}

/// Validation message categories to display
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebugMessageFilter {
    pub show_general: bool,
    pub show_validation: bool,
    pub show_performance: bool,
}

impl Default for DebugMessageFilter {
    fn default() -> Self {
        Self {
            show_general: true,
            show_validation: true,
            show_performance: true,
        }
    }
}

/// Counters of validation messages received since device creation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ValidationStats {
    pub errors: u32,
    pub warnings: u32,
    pub info: u32,
    pub verbose: u32,
}

impl ValidationStats {
    pub fn total(&self) -> u32 {
        self.errors + self.warnings + self.info + self.verbose
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Pipeline cache blob path; `None` disables the on-disk cache
    pub pipeline_cache_file_name: Option<String>,
    /// Fraction (0, 1] of the largest device-local heap the allocator may use
    pub device_local_heap_usage_factor: f64,
    /// Use MAILBOX instead of FIFO when vsync is requested
    pub force_mailbox_vsync: bool,
    /// Use FIFO_RELAXED ("late swap tearing") when vsync is requested
    pub enable_late_swap_tear: bool,
    /// Driver name to pick from the registry
    pub force_driver: Option<String>,
    /// Frames an unused descriptor set stays cached before it is recycled
    pub descriptor_set_deactivate_frames: u32,
    /// Frames without a resource free before a pending defrag runs
    pub defrag_cooldown_frames: u32,

    /// Enable validation layers (requires the `vulkan-validation` feature)
    pub debug_mode: bool,
    pub debug_severity: DebugSeverity,
    pub debug_message_filter: DebugMessageFilter,
    pub enable_validation_stats: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            pipeline_cache_file_name: Some(DEFAULT_PIPELINE_CACHE_FILE_NAME.to_string()),
            device_local_heap_usage_factor: 1.0,
            force_mailbox_vsync: false,
            enable_late_swap_tear: false,
            force_driver: None,
            descriptor_set_deactivate_frames: 10,
            defrag_cooldown_frames: 5,
            debug_mode: false,
            debug_severity: DebugSeverity::default(),
            debug_message_filter: DebugMessageFilter::default(),
            enable_validation_stats: true,
        }
    }
}

impl Config {
    /// Defaults overlaid with the process environment
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Defaults overlaid with values from `lookup`; invalid values are logged and ignored
    pub fn from_lookup<F: Fn(&str) -> Option<String>>(lookup: F) -> Self {
        let mut config = Self::default();

        if let Some(name) = lookup(HINT_PIPELINE_CACHE_FILE_NAME) {
            config.pipeline_cache_file_name = if name.is_empty() { None } else { Some(name) };
        }

        if let Some(value) = lookup(HINT_DEVICE_LOCAL_HEAP_USAGE_FACTOR) {
            match value.trim().parse::<f64>() {
                Ok(factor) if factor > 0.0 => {
                    config.device_local_heap_usage_factor = factor.min(1.0);
                }
                _ => engine_warn!(
                    "fna3d::Config",
                    "Ignoring {}={:?}: expected a number in (0, 1]",
                    HINT_DEVICE_LOCAL_HEAP_USAGE_FACTOR,
                    value
                ),
            }
        }

        if let Some(value) = lookup(HINT_FORCE_MAILBOX_VSYNC) {
            config.force_mailbox_vsync = parse_bool(HINT_FORCE_MAILBOX_VSYNC, &value);
        }
        if let Some(value) = lookup(HINT_ENABLE_LATE_SWAP_TEAR) {
            config.enable_late_swap_tear = parse_bool(HINT_ENABLE_LATE_SWAP_TEAR, &value);
        }

        if let Some(driver) = lookup(HINT_FORCE_DRIVER) {
            if !driver.is_empty() {
                config.force_driver = Some(driver);
            }
        }

        if let Some(frames) = lookup(HINT_DESCRIPTOR_SET_DEACTIVATE_FRAMES).and_then(|v| parse_frames(HINT_DESCRIPTOR_SET_DEACTIVATE_FRAMES, &v)) {
            config.descriptor_set_deactivate_frames = frames;
        }
        if let Some(frames) = lookup(HINT_DEFRAG_COOLDOWN_FRAMES).and_then(|v| parse_frames(HINT_DEFRAG_COOLDOWN_FRAMES, &v)) {
            config.defrag_cooldown_frames = frames;
        }

        config
    }
}

fn parse_bool(name: &str, value: &str) -> bool {
    match value.trim() {
        "1" => true,
        "0" => false,
        other => {
            engine_warn!("fna3d::Config", "Ignoring {}={:?}: expected 0 or 1", name, other);
            false
        }
    }
}

fn parse_frames(name: &str, value: &str) -> Option<u32> {
    match value.trim().parse::<u32>() {
        Ok(frames) if frames > 0 => Some(frames),
        _ => {
            engine_warn!("fna3d::Config", "Ignoring {}={:?}: expected a positive frame count", name, value);
            None
        }
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
