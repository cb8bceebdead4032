//! Unit tests for debug.rs

use ash::vk;
use fna3d::fna3d::render::{DebugMessageFilter, DebugSeverity};
use serial_test::serial;

use crate::debug::*;

type Sev = vk::DebugUtilsMessageSeverityFlagsEXT;
type Kind = vk::DebugUtilsMessageTypeFlagsEXT;

// ============================================================================
// FILTERS
// ============================================================================

#[test]
fn test_errors_only_filter() {
    assert!(severity_passes(DebugSeverity::ErrorsOnly, Sev::ERROR));
    assert!(!severity_passes(DebugSeverity::ErrorsOnly, Sev::WARNING));
    assert!(!severity_passes(DebugSeverity::ErrorsOnly, Sev::VERBOSE));
}

#[test]
fn test_errors_and_warnings_filter() {
    assert!(severity_passes(DebugSeverity::ErrorsAndWarnings, Sev::WARNING));
    assert!(!severity_passes(DebugSeverity::ErrorsAndWarnings, Sev::INFO));
}

#[test]
fn test_all_filter() {
    assert!(severity_passes(DebugSeverity::All, Sev::VERBOSE));
    assert!(severity_passes(DebugSeverity::All, Sev::INFO));
}

#[test]
fn test_category_filter() {
    let filter = DebugMessageFilter {
        show_general: false,
        show_validation: true,
        show_performance: false,
    };
    assert!(category_passes(&filter, Kind::VALIDATION));
    assert!(!category_passes(&filter, Kind::PERFORMANCE));
    assert!(!category_passes(&filter, Kind::GENERAL));
}

// ============================================================================
// STATISTICS
// ============================================================================

#[test]
#[serial]
fn test_init_resets_stats() {
    init_debug_config(DebugConfig {
        severity: DebugSeverity::All,
        message_filter: DebugMessageFilter::default(),
        enable_stats: true,
    });

    assert_eq!(validation_stats().total(), 0);
    assert!(validation_stats_report().contains("No validation messages"));

    cleanup_debug_config();
}
