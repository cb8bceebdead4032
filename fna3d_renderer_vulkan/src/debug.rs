/// Vulkan Debug Messenger - routes validation layer messages to the engine logger
///
/// Messages are filtered by severity and category, counted per severity and
/// grouped by text so repeated messages show how often they fired.

use ash::vk;
use colored::*;
use rustc_hash::FxHashMap;
use fna3d::fna3d::render::{DebugMessageFilter, DebugSeverity, ValidationStats};
use fna3d::{engine_debug, engine_error, engine_info, engine_warn};
use std::ffi::CStr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

/// Global debug configuration (shared across callbacks)
static DEBUG_CONFIG: Mutex<Option<DebugConfig>> = Mutex::new(None);

/// Global validation statistics
static VALIDATION_STATS: ValidationStatsTracker = ValidationStatsTracker::new();

/// Occurrences of each message text
static MESSAGE_TRACKER: Mutex<Option<FxHashMap<String, u32>>> = Mutex::new(None);

/// Debug configuration for the callback
#[derive(Debug, Clone, Copy)]
pub struct DebugConfig {
    pub severity: DebugSeverity,
    pub message_filter: DebugMessageFilter,
    pub enable_stats: bool,
}

struct ValidationStatsTracker {
    errors: AtomicU32,
    warnings: AtomicU32,
    info: AtomicU32,
    verbose: AtomicU32,
}

impl ValidationStatsTracker {
    const fn new() -> Self {
        Self {
            errors: AtomicU32::new(0),
            warnings: AtomicU32::new(0),
            info: AtomicU32::new(0),
            verbose: AtomicU32::new(0),
        }
    }

    fn increment(&self, severity: vk::DebugUtilsMessageSeverityFlagsEXT) {
        let counter = if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
            &self.errors
        } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
            &self.warnings
        } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO) {
            &self.info
        } else {
            &self.verbose
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn get(&self) -> ValidationStats {
        ValidationStats {
            errors: self.errors.load(Ordering::Relaxed),
            warnings: self.warnings.load(Ordering::Relaxed),
            info: self.info.load(Ordering::Relaxed),
            verbose: self.verbose.load(Ordering::Relaxed),
        }
    }

    fn reset(&self) {
        self.errors.store(0, Ordering::Relaxed);
        self.warnings.store(0, Ordering::Relaxed);
        self.info.store(0, Ordering::Relaxed);
        self.verbose.store(0, Ordering::Relaxed);
    }
}

/// Install the callback configuration and reset the statistics
pub fn init_debug_config(config: DebugConfig) {
    VALIDATION_STATS.reset();

    if let Ok(mut tracker) = MESSAGE_TRACKER.lock() {
        *tracker = Some(FxHashMap::default());
    }
    if let Ok(mut guard) = DEBUG_CONFIG.lock() {
        *guard = Some(config);
    }
}

/// Drop the configuration; later callbacks are ignored
pub fn cleanup_debug_config() {
    if let Ok(mut guard) = DEBUG_CONFIG.lock() {
        *guard = None;
    }
    if let Ok(mut tracker) = MESSAGE_TRACKER.lock() {
        *tracker = None;
    }
}

pub fn validation_stats() -> ValidationStats {
    VALIDATION_STATS.get()
}

/// Colored summary of the validation statistics
pub fn validation_stats_report() -> String {
    let stats = validation_stats();
    if stats.total() == 0 {
        return format!("{}", "No validation messages".green().bold());
    }

    let mut report = format!("{}\n", "=== Validation Statistics ===".bright_blue().bold());
    if stats.errors > 0 {
        report.push_str(&format!("  {} {}\n", "Errors:".red().bold(), stats.errors));
    }
    if stats.warnings > 0 {
        report.push_str(&format!("  {} {}\n", "Warnings:".yellow().bold(), stats.warnings));
    }
    if stats.info > 0 {
        report.push_str(&format!("  {} {}\n", "Info:".cyan(), stats.info));
    }
    if stats.verbose > 0 {
        report.push_str(&format!("  {} {}\n", "Verbose:".bright_black(), stats.verbose));
    }
    report.push_str(&format!("  {} {}", "Total:".white().bold(), stats.total()));

    if let Ok(tracker) = MESSAGE_TRACKER.lock() {
        let repeated = tracker
            .as_ref()
            .map_or(0, |messages| messages.values().filter(|&&count| count > 1).count());
        if repeated > 0 {
            report.push_str(&format!("\n  {} message(s) appeared multiple times", repeated));
        }
    }
    report
}

/// Severities the messenger is created with
pub fn severity_flags(severity: DebugSeverity) -> vk::DebugUtilsMessageSeverityFlagsEXT {
    use vk::DebugUtilsMessageSeverityFlagsEXT as S;
    match severity {
        DebugSeverity::ErrorsOnly => S::ERROR,
        DebugSeverity::ErrorsAndWarnings => S::ERROR | S::WARNING,
        DebugSeverity::All => S::ERROR | S::WARNING | S::INFO | S::VERBOSE,
    }
}

pub fn severity_passes(filter: DebugSeverity, severity: vk::DebugUtilsMessageSeverityFlagsEXT) -> bool {
    severity.intersects(severity_flags(filter))
}

pub fn category_passes(filter: &DebugMessageFilter, message_type: vk::DebugUtilsMessageTypeFlagsEXT) -> bool {
    if message_type.contains(vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION) {
        filter.show_validation
    } else if message_type.contains(vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE) {
        filter.show_performance
    } else {
        filter.show_general
    }
}

fn type_name(message_type: vk::DebugUtilsMessageTypeFlagsEXT) -> &'static str {
    if message_type.contains(vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION) {
        "Validation"
    } else if message_type.contains(vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE) {
        "Performance"
    } else {
        "General"
    }
}

unsafe fn c_str_or<'a>(ptr: *const std::os::raw::c_char, fallback: &'a str) -> std::borrow::Cow<'a, str> {
    if ptr.is_null() {
        std::borrow::Cow::Borrowed(fallback)
    } else {
        CStr::from_ptr(ptr).to_string_lossy()
    }
}

/// Vulkan debug messenger callback
///
/// # Safety
/// Called by the Vulkan loader with a valid callback data pointer.
pub unsafe extern "system" fn vulkan_debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _user_data: *mut std::os::raw::c_void,
) -> vk::Bool32 {
    if p_callback_data.is_null() {
        return vk::FALSE;
    }
    let callback_data = &*p_callback_data;

    let config = match DEBUG_CONFIG.lock() {
        Ok(guard) => match *guard {
            Some(config) => config,
            None => return vk::FALSE,
        },
        Err(_) => return vk::FALSE,
    };

    if !severity_passes(config.severity, message_severity)
        || !category_passes(&config.message_filter, message_type)
    {
        return vk::FALSE;
    }

    let message_id = c_str_or(callback_data.p_message_id_name, "Unknown");
    let message = c_str_or(callback_data.p_message, "No message");

    let mut occurrences = 1;
    if config.enable_stats {
        VALIDATION_STATS.increment(message_severity);
        if let Ok(mut tracker) = MESSAGE_TRACKER.lock() {
            let count = tracker.get_or_insert_with(FxHashMap::default).entry(message.to_string()).or_insert(0);
            *count += 1;
            occurrences = *count;
        }
    }
    let repeat = if occurrences > 1 { format!(" [x{}]", occurrences) } else { String::new() };

    let kind = type_name(message_type);
    if message_severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        engine_error!("fna3d::vulkan::validation", "[{}]{} {}: {}", kind, repeat, message_id, message);
    } else if message_severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        engine_warn!("fna3d::vulkan::validation", "[{}]{} {}: {}", kind, repeat, message_id, message);
    } else if message_severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO) {
        engine_info!("fna3d::vulkan::validation", "[{}]{} {}: {}", kind, repeat, message_id, message);
    } else {
        engine_debug!("fna3d::vulkan::validation", "[{}]{} {}: {}", kind, repeat, message_id, message);
    }

    vk::FALSE
}

#[cfg(test)]
#[path = "debug_tests.rs"]
mod tests;
