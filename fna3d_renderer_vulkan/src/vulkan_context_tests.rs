//! Unit tests for vulkan_context.rs

use ash::vk;

use crate::vulkan_context::*;

fn family(flags: vk::QueueFlags, count: u32) -> vk::QueueFamilyProperties {
    vk::QueueFamilyProperties {
        queue_flags: flags,
        queue_count: count,
        ..Default::default()
    }
}

// ============================================================================
// DEVICE RANKING
// ============================================================================

#[test]
fn test_discrete_gpu_ranks_first() {
    assert!(device_type_rank(vk::PhysicalDeviceType::DISCRETE_GPU) > device_type_rank(vk::PhysicalDeviceType::INTEGRATED_GPU));
    assert!(device_type_rank(vk::PhysicalDeviceType::INTEGRATED_GPU) > device_type_rank(vk::PhysicalDeviceType::VIRTUAL_GPU));
    assert!(device_type_rank(vk::PhysicalDeviceType::CPU) > device_type_rank(vk::PhysicalDeviceType::OTHER));
}

// ============================================================================
// QUEUE FAMILY
// ============================================================================

#[test]
fn test_first_graphics_family_that_presents() {
    let families = [
        family(vk::QueueFlags::TRANSFER, 1),
        family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE, 4),
        family(vk::QueueFlags::GRAPHICS, 1),
    ];

    assert_eq!(select_queue_family(&families, |_| true), Some(1));
    assert_eq!(select_queue_family(&families, |index| index == 2), Some(2));
}

#[test]
fn test_no_family_without_present_support() {
    let families = [family(vk::QueueFlags::GRAPHICS, 1)];
    assert_eq!(select_queue_family(&families, |_| false), None);
}

#[test]
fn test_empty_family_is_skipped() {
    let families = [family(vk::QueueFlags::GRAPHICS, 0), family(vk::QueueFlags::GRAPHICS, 1)];
    assert_eq!(select_queue_family(&families, |_| true), Some(1));
}
