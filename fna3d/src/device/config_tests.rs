//! Unit tests for config.rs

use crate::device::config::*;
use std::collections::HashMap;

fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |name| map.get(name).cloned()
}

// ============================================================================
// DEFAULTS
// ============================================================================

#[test]
fn test_config_defaults() {
    let config = Config::default();
    assert_eq!(config.pipeline_cache_file_name.as_deref(), Some("FNA3D_Vulkan_PipelineCache.blob"));
    assert_eq!(config.device_local_heap_usage_factor, 1.0);
    assert_eq!(config.descriptor_set_deactivate_frames, 10);
    assert_eq!(config.defrag_cooldown_frames, 5);
    assert!(!config.force_mailbox_vsync);
    assert!(!config.enable_late_swap_tear);
    assert!(config.force_driver.is_none());
}

#[test]
fn test_empty_lookup_gives_defaults() {
    assert_eq!(Config::from_lookup(|_| None), Config::default());
}

// ============================================================================
// OVERRIDES
// ============================================================================

#[test]
fn test_empty_pipeline_cache_name_disables_cache() {
    let config = Config::from_lookup(lookup_from(&[(HINT_PIPELINE_CACHE_FILE_NAME, "")]));
    assert!(config.pipeline_cache_file_name.is_none());
}

#[test]
fn test_custom_pipeline_cache_name() {
    let config = Config::from_lookup(lookup_from(&[(HINT_PIPELINE_CACHE_FILE_NAME, "cache.bin")]));
    assert_eq!(config.pipeline_cache_file_name.as_deref(), Some("cache.bin"));
}

#[test]
fn test_heap_usage_factor_is_clamped() {
    let config = Config::from_lookup(lookup_from(&[(HINT_DEVICE_LOCAL_HEAP_USAGE_FACTOR, "0.5")]));
    assert_eq!(config.device_local_heap_usage_factor, 0.5);

    let config = Config::from_lookup(lookup_from(&[(HINT_DEVICE_LOCAL_HEAP_USAGE_FACTOR, "3.0")]));
    assert_eq!(config.device_local_heap_usage_factor, 1.0);
}

#[test]
fn test_invalid_heap_usage_factor_is_ignored() {
    let config = Config::from_lookup(lookup_from(&[(HINT_DEVICE_LOCAL_HEAP_USAGE_FACTOR, "-1")]));
    assert_eq!(config.device_local_heap_usage_factor, 1.0);

    let config = Config::from_lookup(lookup_from(&[(HINT_DEVICE_LOCAL_HEAP_USAGE_FACTOR, "lots")]));
    assert_eq!(config.device_local_heap_usage_factor, 1.0);
}

#[test]
fn test_boolean_hints() {
    let config = Config::from_lookup(lookup_from(&[
        (HINT_FORCE_MAILBOX_VSYNC, "1"),
        (HINT_ENABLE_LATE_SWAP_TEAR, "1"),
    ]));
    assert!(config.force_mailbox_vsync);
    assert!(config.enable_late_swap_tear);

    let config = Config::from_lookup(lookup_from(&[(HINT_FORCE_MAILBOX_VSYNC, "yes")]));
    assert!(!config.force_mailbox_vsync);
}

#[test]
fn test_frame_count_hints() {
    let config = Config::from_lookup(lookup_from(&[
        (HINT_DESCRIPTOR_SET_DEACTIVATE_FRAMES, "3"),
        (HINT_DEFRAG_COOLDOWN_FRAMES, "8"),
    ]));
    assert_eq!(config.descriptor_set_deactivate_frames, 3);
    assert_eq!(config.defrag_cooldown_frames, 8);

    let config = Config::from_lookup(lookup_from(&[(HINT_DEFRAG_COOLDOWN_FRAMES, "0")]));
    assert_eq!(config.defrag_cooldown_frames, 5);
}

#[test]
fn test_force_driver() {
    let config = Config::from_lookup(lookup_from(&[(HINT_FORCE_DRIVER, "Vulkan")]));
    assert_eq!(config.force_driver.as_deref(), Some("Vulkan"));

    let config = Config::from_lookup(lookup_from(&[(HINT_FORCE_DRIVER, "")]));
    assert!(config.force_driver.is_none());
}

// ============================================================================
// VALIDATION STATS
// ============================================================================

#[test]
fn test_validation_stats_total() {
    let stats = ValidationStats { errors: 1, warnings: 2, info: 3, verbose: 4 };
    assert_eq!(stats.total(), 10);
    assert_eq!(ValidationStats::default().total(), 0);
}
