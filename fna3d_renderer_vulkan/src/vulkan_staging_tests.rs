//! Unit tests for vulkan_staging.rs

use fna3d::fna3d::Error;

use crate::mock_dispatch::{MockDispatch, mock_memory_properties};
use crate::vulkan_memory::MemoryAllocator;
use crate::vulkan_staging::*;

const MB: u64 = 1024 * 1024;
const GB: u64 = 1024 * MB;

fn setup(device_local_heap: u64) -> (MockDispatch, MemoryAllocator, StagingBuffers) {
    let dispatch = MockDispatch::new();
    let mut allocator = MemoryAllocator::new(mock_memory_properties(device_local_heap), 1.0);
    let staging = StagingBuffers::new(&dispatch, &mut allocator).unwrap();
    (dispatch, allocator, staging)
}

// ============================================================================
// CREATION
// ============================================================================

#[test]
fn test_new_creates_fast_and_slow() {
    let (_dispatch, _allocator, staging) = setup(GB);

    assert!(staging.has_fast_buffer());
    assert_eq!(staging.slow_size(), STARTING_STAGING_SIZE);
    assert!(!staging.transfer_pending());
}

#[test]
fn test_fast_buffer_disabled_without_budget() {
    let (_dispatch, _allocator, mut staging) = setup(32 * MB);

    assert!(!staging.has_fast_buffer());
    let slice = staging.reserve(1024, 4).unwrap();
    assert_eq!(slice.kind, StagingKind::Slow);
}

// ============================================================================
// RESERVATION
// ============================================================================

#[test]
fn test_round_trip_before_reuse() {
    let (_dispatch, allocator, mut staging) = setup(GB);

    let data: Vec<u8> = (0..=255u8).cycle().take(4096).collect();
    let slice = staging.copy_to_staging(&allocator, &data, data.len() as u64, 4).unwrap().unwrap();

    let mut out = vec![0u8; data.len()];
    staging.read(&allocator, &slice, &mut out).unwrap();
    assert_eq!(out, data);
    assert!(staging.transfer_pending());
}

#[test]
fn test_reservations_are_aligned_and_disjoint() {
    let (_dispatch, _allocator, mut staging) = setup(GB);

    let first = staging.reserve(3, 1).unwrap();
    let second = staging.reserve(16, 16).unwrap();
    let third = staging.reserve(8, 8).unwrap();

    assert_eq!(first.offset, 0);
    assert_eq!(second.offset, 16);
    assert_eq!(third.offset, 32);
    assert_eq!(second.offset % 16, 0);
}

#[test]
fn test_fast_full_falls_back_to_slow() {
    let (_dispatch, _allocator, mut staging) = setup(GB);

    let fast = staging.reserve(FAST_STAGING_SIZE - 16, 4).unwrap();
    assert_eq!(fast.kind, StagingKind::Fast);

    let slow = staging.reserve(1024, 4).unwrap();
    assert_eq!(slow.kind, StagingKind::Slow);
    assert_eq!(slow.offset, 0);
}

#[test]
fn test_both_full_requests_growth() {
    let (dispatch, mut allocator, mut staging) = setup(GB);

    staging.reserve(FAST_STAGING_SIZE, 1).unwrap();
    staging.reserve(STARTING_STAGING_SIZE - 8, 1).unwrap();
    assert!(staging.reserve(1024, 1).is_none());

    // Caller stalls here, then grows
    staging.on_submit(0);
    staging.on_slot_released(0);
    staging.grow(&dispatch, &mut allocator, 20_000_000).unwrap();

    assert_eq!(staging.slow_size(), 4 * STARTING_STAGING_SIZE);
    assert!(staging.reserve(1024, 1).is_some());
}

#[test]
fn test_grow_is_capped() {
    let (dispatch, mut allocator, mut staging) = setup(8 * GB);

    staging.grow(&dispatch, &mut allocator, MAX_STAGING_SIZE - 1).unwrap();
    assert_eq!(staging.slow_size(), MAX_STAGING_SIZE);

    // Larger than the cap: rejected, the capped buffer stays usable
    let result = staging.grow(&dispatch, &mut allocator, MAX_STAGING_SIZE + 4096);
    assert!(matches!(result, Err(Error::InvalidResource(_))));
    assert_eq!(staging.slow_size(), MAX_STAGING_SIZE);
    assert!(staging.reserve(1024, 1).is_some());
}

#[test]
fn test_grow_frees_old_buffer() {
    let (dispatch, mut allocator, mut staging) = setup(GB);
    let destroyed = dispatch.destroyed_buffers.get();

    staging.grow(&dispatch, &mut allocator, STARTING_STAGING_SIZE + 1).unwrap();

    assert_eq!(dispatch.destroyed_buffers.get(), destroyed + 1);
    assert_eq!(allocator.free_empty_allocations(&dispatch), 1);
}

// ============================================================================
// SUBMISSION GATING
// ============================================================================

#[test]
fn test_submit_resets_offsets_and_gates_reuse() {
    let (_dispatch, allocator, mut staging) = setup(GB);

    staging.copy_to_staging(&allocator, &[7u8; 64], 64, 4).unwrap().unwrap();
    staging.on_submit(1);

    assert!(!staging.transfer_pending());
    assert_eq!(staging.in_flight_slot(), Some(1));
    assert_eq!(staging.reserve(64, 4).unwrap().offset, 0);

    staging.on_slot_released(0);
    assert_eq!(staging.in_flight_slot(), Some(1));
    staging.on_slot_released(1);
    assert_eq!(staging.in_flight_slot(), None);
}

#[test]
fn test_submit_without_transfer_is_not_in_flight() {
    let (_dispatch, _allocator, mut staging) = setup(GB);

    staging.on_submit(0);
    assert_eq!(staging.in_flight_slot(), None);
}

#[test]
fn test_read_larger_than_slice_fails() {
    let (_dispatch, allocator, mut staging) = setup(GB);

    let slice = staging.copy_to_staging(&allocator, &[1u8; 16], 16, 4).unwrap().unwrap();
    let mut out = vec![0u8; 32];
    assert!(staging.read(&allocator, &slice, &mut out).is_err());
}

#[test]
fn test_destroy_releases_everything() {
    let (dispatch, mut allocator, staging) = setup(GB);

    staging.destroy(&dispatch, &mut allocator);
    allocator.free_empty_allocations(&dispatch);

    assert_eq!(dispatch.live_memory_count(), 0);
}
