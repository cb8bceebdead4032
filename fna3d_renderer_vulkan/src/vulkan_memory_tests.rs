//! Unit tests for vulkan_memory.rs
//!
//! Driven by MockDispatch: no GPU required.

use ash::vk;
use fna3d::fna3d::{Error, Result};

use crate::mock_dispatch::{MockDispatch, mock_memory_properties};
use crate::vulkan_dispatch::{BindTarget, DeviceDispatch, MemoryRequirements};
use crate::vulkan_memory::*;

const MB: u64 = 1024 * 1024;
const GB: u64 = 1024 * MB;

/// Memory type 0 of the mock layout: device-local only
const DEVICE_LOCAL_TYPE: u32 = 0;
/// Memory type 2 of the mock layout: host-visible only
const HOST_TYPE: u32 = 2;

// ============================================================================
// HELPERS
// ============================================================================

fn setup(device_local_heap: u64) -> (MockDispatch, MemoryAllocator) {
    let dispatch = MockDispatch::new();
    let allocator = MemoryAllocator::new(mock_memory_properties(device_local_heap), 1.0);
    (dispatch, allocator)
}

fn requirements(size: u64, alignment: u64) -> MemoryRequirements {
    MemoryRequirements {
        size,
        alignment,
        memory_type_bits: 0b111,
        prefers_dedicated: false,
        requires_dedicated: false,
    }
}

fn bind(
    dispatch: &MockDispatch,
    allocator: &mut MemoryAllocator,
    memory_type: u32,
    size: u64,
    alignment: u64,
) -> Result<UsedRegionKey> {
    let buffer = dispatch.create_buffer(size, vk::BufferUsageFlags::VERTEX_BUFFER).unwrap();
    allocator.bind_resource_memory(
        dispatch,
        memory_type,
        &requirements(size, alignment),
        false,
        size,
        BindTarget::Buffer(buffer),
        ResourceOwner::Internal,
    )
}

fn assert_conservation(allocator: &MemoryAllocator) {
    for (_, allocation) in allocator.allocations() {
        assert_eq!(
            allocation.used_space + allocation.free_space,
            allocation.size,
            "used {} + free {} != size {}",
            allocation.used_space,
            allocation.free_space,
            allocation.size
        );
    }
}

fn only_allocation(allocator: &MemoryAllocator) -> &MemoryAllocation {
    let mut allocations = allocator.allocations();
    let (_, allocation) = allocations.next().expect("one allocation");
    assert!(allocations.next().is_none(), "expected exactly one allocation");
    allocation
}

// ============================================================================
// ALIGNMENT
// ============================================================================

#[test]
fn test_next_highest_alignment() {
    assert_eq!(next_highest_alignment(0, 256), 0);
    assert_eq!(next_highest_alignment(1, 256), 256);
    assert_eq!(next_highest_alignment(256, 256), 256);
    assert_eq!(next_highest_alignment(257, 256), 512);
    assert_eq!(next_highest_alignment(300_000_000, ALLOCATION_INCREMENT), 304_000_000);
    assert_eq!(next_highest_alignment(17, 0), 17);
}

// ============================================================================
// ALLOCATE / FREE / REALLOCATE
// ============================================================================

#[test]
fn test_first_allocation_uses_starting_size() {
    let (dispatch, mut allocator) = setup(GB);

    let key = bind(&dispatch, &mut allocator, DEVICE_LOCAL_TYPE, MB, 256).unwrap();

    assert_eq!(dispatch.memory_allocations.get(), 1);
    assert_eq!(dispatch.allocated_sizes.borrow()[0], STARTING_ALLOCATION_SIZE);
    let allocation = only_allocation(&allocator);
    assert_eq!(allocation.used_space, MB);
    assert_eq!(allocator.used_region(key).unwrap().resource_size, MB);
    assert_conservation(&allocator);
}

#[test]
fn test_allocate_free_reallocate() {
    let (dispatch, mut allocator) = setup(GB);

    let first = bind(&dispatch, &mut allocator, DEVICE_LOCAL_TYPE, MB, 256).unwrap();
    allocator.free_resource_memory(first);
    assert_conservation(&allocator);
    assert_eq!(only_allocation(&allocator).used_regions.len(), 0);

    // Not swept yet: the empty allocation is reused
    bind(&dispatch, &mut allocator, DEVICE_LOCAL_TYPE, MB, 256).unwrap();
    assert_eq!(dispatch.memory_allocations.get(), 1);
    assert_eq!(only_allocation(&allocator).used_space, MB);
    assert_conservation(&allocator);
}

#[test]
fn test_empty_allocation_is_swept() {
    let (dispatch, mut allocator) = setup(GB);

    let key = bind(&dispatch, &mut allocator, DEVICE_LOCAL_TYPE, MB, 256).unwrap();
    assert_eq!(allocator.free_empty_allocations(&dispatch), 0);

    allocator.free_resource_memory(key);
    assert_eq!(allocator.free_empty_allocations(&dispatch), 1);
    assert_eq!(allocator.allocation_count(DEVICE_LOCAL_TYPE), 0);
    assert_eq!(dispatch.live_memory_count(), 0);
    assert_eq!(allocator.device_local_heap_usage(), 0);
    assert!(allocator.free_region_sizes(DEVICE_LOCAL_TYPE).is_empty());

    // Fresh allocation after the sweep
    bind(&dispatch, &mut allocator, DEVICE_LOCAL_TYPE, MB, 256).unwrap();
    assert_eq!(dispatch.memory_allocations.get(), 2);
    assert_eq!(only_allocation(&allocator).used_space, MB);
}

// ============================================================================
// CONSERVATION AND COALESCING
// ============================================================================

#[test]
fn test_conservation_with_alignment_padding() {
    let (dispatch, mut allocator) = setup(GB);

    let small = bind(&dispatch, &mut allocator, DEVICE_LOCAL_TYPE, 100, 1).unwrap();
    let buffer = dispatch.create_buffer(1000, vk::BufferUsageFlags::VERTEX_BUFFER).unwrap();
    let aligned = allocator
        .bind_resource_memory(
            &dispatch,
            DEVICE_LOCAL_TYPE,
            &requirements(1000, 4096),
            false,
            1000,
            BindTarget::Buffer(buffer),
            ResourceOwner::Internal,
        )
        .unwrap();

    let region = *allocator.used_region(aligned).unwrap();
    assert_eq!(region.offset, 100);
    assert_eq!(region.resource_offset, 4096);
    assert_eq!(region.size, 4096 + 1000 - 100);
    assert!(region.resource_offset + region.resource_size <= region.offset + region.size);
    assert_conservation(&allocator);

    allocator.free_resource_memory(small);
    allocator.free_resource_memory(aligned);
    assert_conservation(&allocator);
    assert_eq!(only_allocation(&allocator).free_regions.len(), 1);
}

#[test]
fn test_adjacent_frees_coalesce() {
    let (dispatch, mut allocator) = setup(GB);

    let a = bind(&dispatch, &mut allocator, DEVICE_LOCAL_TYPE, MB, 256).unwrap();
    let b = bind(&dispatch, &mut allocator, DEVICE_LOCAL_TYPE, MB, 256).unwrap();
    let _c = bind(&dispatch, &mut allocator, DEVICE_LOCAL_TYPE, MB, 256).unwrap();

    let a_region = *allocator.used_region(a).unwrap();
    let b_region = *allocator.used_region(b).unwrap();
    assert_eq!(a_region.offset + a_region.size, b_region.offset);

    allocator.free_resource_memory(a);
    allocator.free_resource_memory(b);

    let allocation = only_allocation(&allocator);
    // One region for A+B, one for the tail after C
    assert_eq!(allocation.free_regions.len(), 2);
    let sizes = allocator.free_region_sizes(DEVICE_LOCAL_TYPE);
    assert!(sizes.contains(&(2 * MB)));
    assert!(!sizes.contains(&MB));
    assert_conservation(&allocator);
}

#[test]
fn test_freeing_everything_leaves_one_region() {
    let (dispatch, mut allocator) = setup(GB);

    let keys: Vec<_> = (0..5)
        .map(|_| bind(&dispatch, &mut allocator, DEVICE_LOCAL_TYPE, MB, 256).unwrap())
        .collect();

    // Free out of order so both left and right merges happen
    for index in [1, 3, 0, 4, 2] {
        allocator.free_resource_memory(keys[index]);
        assert_conservation(&allocator);
    }

    let allocation = only_allocation(&allocator);
    assert_eq!(allocation.free_regions.len(), 1);
    assert_eq!(allocator.free_region_sizes(DEVICE_LOCAL_TYPE), vec![STARTING_ALLOCATION_SIZE]);
}

#[test]
fn test_sorted_free_regions_are_descending() {
    let (dispatch, mut allocator) = setup(GB);

    let keys: Vec<_> = [MB, 2 * MB, MB, 3 * MB, MB]
        .iter()
        .map(|size| bind(&dispatch, &mut allocator, DEVICE_LOCAL_TYPE, *size, 256).unwrap())
        .collect();
    allocator.free_resource_memory(keys[1]);
    allocator.free_resource_memory(keys[3]);

    let sizes = allocator.free_region_sizes(DEVICE_LOCAL_TYPE);
    assert_eq!(sizes.len(), 3);
    assert!(sizes.windows(2).all(|pair| pair[0] >= pair[1]));
}

#[test]
fn test_freed_region_is_reused_first_fit() {
    let (dispatch, mut allocator) = setup(GB);

    let a = bind(&dispatch, &mut allocator, DEVICE_LOCAL_TYPE, 2 * MB, 256).unwrap();
    let _b = bind(&dispatch, &mut allocator, DEVICE_LOCAL_TYPE, MB, 256).unwrap();
    allocator.free_resource_memory(a);

    // The tail is larger, so a first fit over the sorted list lands there
    let c = bind(&dispatch, &mut allocator, DEVICE_LOCAL_TYPE, MB, 256).unwrap();
    assert_eq!(allocator.used_region(c).unwrap().offset, 3 * MB);
    assert_eq!(dispatch.memory_allocations.get(), 1);
    assert_conservation(&allocator);
}

// ============================================================================
// ALLOCATION SIZING
// ============================================================================

#[test]
fn test_allocation_size_hint_doubles() {
    let (dispatch, mut allocator) = setup(8 * GB);

    bind(&dispatch, &mut allocator, DEVICE_LOCAL_TYPE, 60 * MB, 256).unwrap();
    bind(&dispatch, &mut allocator, DEVICE_LOCAL_TYPE, 10 * MB, 256).unwrap();

    let sizes = dispatch.allocated_sizes.borrow().clone();
    assert_eq!(sizes, vec![STARTING_ALLOCATION_SIZE, 2 * STARTING_ALLOCATION_SIZE]);
}

#[test]
fn test_large_request_rounds_to_increment() {
    let (dispatch, mut allocator) = setup(8 * GB);

    bind(&dispatch, &mut allocator, DEVICE_LOCAL_TYPE, 300_000_000, 256).unwrap();

    let expected = next_highest_alignment(next_highest_alignment(300_000_000, 256), ALLOCATION_INCREMENT);
    assert_eq!(dispatch.allocated_sizes.borrow()[0], expected);
}

#[test]
fn test_dedicated_allocation_is_exact_and_private() {
    let (dispatch, mut allocator) = setup(GB);

    let buffer = dispatch.create_buffer(5 * MB, vk::BufferUsageFlags::TRANSFER_SRC).unwrap();
    let key = allocator
        .bind_resource_memory(
            &dispatch,
            HOST_TYPE,
            &requirements(5 * MB, 256),
            true,
            5 * MB,
            BindTarget::Buffer(buffer),
            ResourceOwner::Staging,
        )
        .unwrap();

    let region = allocator.used_region(key).unwrap();
    let allocation = allocator.allocation(region.allocation).unwrap();
    assert!(allocation.dedicated);
    assert_eq!(allocation.size, 5 * MB);
    assert!(allocator.free_region_sizes(HOST_TYPE).is_empty());

    // A regular request never lands in the dedicated allocation
    allocator.free_resource_memory(key);
    bind(&dispatch, &mut allocator, HOST_TYPE, MB, 256).unwrap();
    assert_eq!(dispatch.memory_allocations.get(), 2);
}

// ============================================================================
// FAILURE PATHS
// ============================================================================

#[test]
fn test_device_local_budget_is_out_of_memory() {
    let (dispatch, mut allocator) = setup(100 * MB);

    bind(&dispatch, &mut allocator, DEVICE_LOCAL_TYPE, 60 * MB, 256).unwrap();
    // Next allocation would be 128MB on a 100MB heap
    let result = bind(&dispatch, &mut allocator, DEVICE_LOCAL_TYPE, 10 * MB, 256);
    assert_eq!(result, Err(Error::OutOfMemory));
    assert_eq!(dispatch.memory_allocations.get(), 1);
    assert_conservation(&allocator);
}

#[test]
fn test_driver_out_of_memory_is_retryable() {
    let (dispatch, mut allocator) = setup(GB);
    dispatch.fail_allocations.set(true);

    let result = bind(&dispatch, &mut allocator, DEVICE_LOCAL_TYPE, MB, 256);
    assert_eq!(result, Err(Error::OutOfMemory));
    assert_eq!(allocator.allocation_count(DEVICE_LOCAL_TYPE), 0);
}

#[test]
fn test_bind_failure_rolls_back() {
    let (dispatch, mut allocator) = setup(GB);
    dispatch.fail_binds.set(true);

    let result = bind(&dispatch, &mut allocator, DEVICE_LOCAL_TYPE, MB, 256);
    assert!(matches!(result, Err(Error::BackendError(_))));

    let allocation = only_allocation(&allocator);
    assert!(allocation.used_regions.is_empty());
    assert_eq!(allocation.free_regions.len(), 1);
    assert!(allocator.needs_defrag());
    assert_conservation(&allocator);
}

#[test]
fn test_fallback_from_device_local_to_host_visible() {
    let (dispatch, mut allocator) = setup(10 * MB);

    let buffer = dispatch.create_buffer(MB, vk::BufferUsageFlags::VERTEX_BUFFER).unwrap();
    let key = allocator
        .bind_memory_for_resource(
            &dispatch,
            BindTarget::Buffer(buffer),
            MB,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            false,
            ResourceOwner::Internal,
        )
        .unwrap();

    let region = allocator.used_region(key).unwrap();
    let allocation = allocator.allocation(region.allocation).unwrap();
    assert_eq!(allocation.memory_type_index, HOST_TYPE);
    assert!(allocator.is_host_visible(key));
}

#[test]
fn test_preferred_memory_used_when_available() {
    let (dispatch, mut allocator) = setup(GB);

    let buffer = dispatch.create_buffer(MB, vk::BufferUsageFlags::VERTEX_BUFFER).unwrap();
    let key = allocator
        .bind_memory_for_resource(
            &dispatch,
            BindTarget::Buffer(buffer),
            MB,
            vk::MemoryPropertyFlags::HOST_VISIBLE,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            false,
            ResourceOwner::Internal,
        )
        .unwrap();

    let region = allocator.used_region(key).unwrap();
    assert_eq!(allocator.allocation(region.allocation).unwrap().memory_type_index, 1);
    assert_eq!(allocator.device_local_bytes_used(), MB);
}

// ============================================================================
// MAPPED ACCESS
// ============================================================================

#[test]
fn test_mapped_write_read() {
    let (dispatch, mut allocator) = setup(GB);

    let _padding = bind(&dispatch, &mut allocator, HOST_TYPE, 300, 1).unwrap();
    let key = bind(&dispatch, &mut allocator, HOST_TYPE, 1024, 256).unwrap();

    let payload: Vec<u8> = (0..64).collect();
    allocator.write_mapped(key, 16, &payload).unwrap();

    let mut out = vec![0u8; 64];
    allocator.read_mapped(key, 16, &mut out).unwrap();
    assert_eq!(out, payload);
}

#[test]
fn test_mapped_access_out_of_range() {
    let (dispatch, mut allocator) = setup(GB);

    let key = bind(&dispatch, &mut allocator, HOST_TYPE, 1024, 256).unwrap();
    assert!(allocator.write_mapped(key, 1000, &[0u8; 64]).is_err());

    let device_only = bind(&dispatch, &mut allocator, DEVICE_LOCAL_TYPE, 1024, 256).unwrap();
    assert!(allocator.write_mapped(device_only, 0, &[0u8; 4]).is_err());
}

// ============================================================================
// DEFRAGMENTATION BOOKKEEPING
// ============================================================================

#[test]
fn test_defrag_timer_requires_quiet_frames() {
    let (dispatch, mut allocator) = setup(GB);

    let key = bind(&dispatch, &mut allocator, DEVICE_LOCAL_TYPE, MB, 256).unwrap();
    assert!(!allocator.tick_defrag_timer(5));

    allocator.free_resource_memory(key);
    // The frame of the free resets the timer
    assert!(!allocator.tick_defrag_timer(5));
    for _ in 0..4 {
        assert!(!allocator.tick_defrag_timer(5));
    }
    assert!(allocator.tick_defrag_timer(5));
}

#[test]
fn test_free_in_between_restarts_cooldown() {
    let (dispatch, mut allocator) = setup(GB);

    let a = bind(&dispatch, &mut allocator, DEVICE_LOCAL_TYPE, MB, 256).unwrap();
    let b = bind(&dispatch, &mut allocator, DEVICE_LOCAL_TYPE, MB, 256).unwrap();

    allocator.free_resource_memory(a);
    assert!(!allocator.tick_defrag_timer(3));
    assert!(!allocator.tick_defrag_timer(3));
    allocator.free_resource_memory(b);
    assert!(!allocator.tick_defrag_timer(3));
    assert!(!allocator.tick_defrag_timer(3));
    assert!(!allocator.tick_defrag_timer(3));
    assert!(allocator.tick_defrag_timer(3));
}

#[test]
fn test_find_and_begin_defragment() {
    let (dispatch, mut allocator) = setup(GB);

    let _a = bind(&dispatch, &mut allocator, DEVICE_LOCAL_TYPE, MB, 256).unwrap();
    let b = bind(&dispatch, &mut allocator, DEVICE_LOCAL_TYPE, MB, 256).unwrap();
    let _c = bind(&dispatch, &mut allocator, DEVICE_LOCAL_TYPE, MB, 256).unwrap();

    assert!(allocator.find_fragmented_allocation(|_| true).is_none());

    allocator.free_resource_memory(b);
    let fragmented = allocator.find_fragmented_allocation(|_| true).unwrap();
    assert!(allocator.find_fragmented_allocation(|_| false).is_none());

    let to_move = allocator.begin_defragment(fragmented);
    assert_eq!(to_move.len(), 2);
    assert!(allocator.free_region_sizes(DEVICE_LOCAL_TYPE).is_empty());
    assert!(!allocator.allocation(fragmented).unwrap().available_for_allocation);

    // New requests go to a fresh allocation
    bind(&dispatch, &mut allocator, DEVICE_LOCAL_TYPE, MB, 256).unwrap();
    assert_eq!(allocator.allocation_count(DEVICE_LOCAL_TYPE), 2);

    // Once the moved regions are released the old allocation is swept
    for key in to_move {
        allocator.free_resource_memory(key);
    }
    assert_conservation(&allocator);
    assert_eq!(allocator.free_empty_allocations(&dispatch), 1);
    assert_eq!(allocator.allocation_count(DEVICE_LOCAL_TYPE), 1);
}

#[test]
fn test_destroy_all_frees_every_allocation() {
    let (dispatch, mut allocator) = setup(GB);

    bind(&dispatch, &mut allocator, DEVICE_LOCAL_TYPE, MB, 256).unwrap();
    bind(&dispatch, &mut allocator, HOST_TYPE, MB, 256).unwrap();
    allocator.destroy_all(&dispatch);

    assert_eq!(dispatch.live_memory_count(), 0);
    assert_eq!(allocator.allocations().count(), 0);
}
