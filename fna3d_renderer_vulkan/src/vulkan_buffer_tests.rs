//! Unit tests for vulkan_buffer.rs

use fna3d::fna3d::render::{BufferUsage, SetDataOptions};

use crate::mock_dispatch::{MockDispatch, mock_memory_properties};
use crate::vulkan_buffer::*;
use crate::vulkan_memory::MemoryAllocator;

const GB: u64 = 1024 * 1024 * 1024;

fn setup() -> (MockDispatch, MemoryAllocator, BufferStore) {
    (
        MockDispatch::new(),
        MemoryAllocator::new(mock_memory_properties(GB), 1.0),
        BufferStore::new(),
    )
}

// ============================================================================
// CREATION
// ============================================================================

#[test]
fn test_create_buffer_has_one_sub_buffer() {
    let (dispatch, mut allocator, mut store) = setup();

    let handle = store
        .create(&dispatch, &mut allocator, BufferKind::Vertex, 1024, true, BufferUsage::WriteOnly)
        .unwrap();

    let buffer = store.get(handle).unwrap();
    assert_eq!(buffer.sub_buffers.len(), 1);
    assert_eq!(buffer.size, 1024);
    assert!(store.current_vk_buffer(handle).is_some());
    assert_eq!(dispatch.binds.borrow().len(), 1);
}

#[test]
fn test_create_failure_destroys_buffer() {
    let (dispatch, mut allocator, mut store) = setup();
    dispatch.fail_allocations.set(true);

    let result = store.create(&dispatch, &mut allocator, BufferKind::Index, 1024, false, BufferUsage::None);

    assert!(result.is_err());
    assert_eq!(dispatch.destroyed_buffers.get(), 1);
    assert!(store.is_empty());
}

// ============================================================================
// WRITE PLANNING
// ============================================================================

#[test]
fn test_discard_twice_in_one_frame_rotates() {
    let (dispatch, mut allocator, mut store) = setup();
    let handle = store
        .create(&dispatch, &mut allocator, BufferKind::Vertex, 256, true, BufferUsage::WriteOnly)
        .unwrap();

    // First write + draw referencing it
    let first = store.plan_write(&dispatch, &mut allocator, handle, SetDataOptions::Discard).unwrap();
    store.mark_bound(handle, 0);

    let second = store.plan_write(&dispatch, &mut allocator, handle, SetDataOptions::Discard).unwrap();

    assert_ne!(first, second);
    assert_eq!(store.get(handle).unwrap().sub_buffers.len(), 2);
    let WritePlan::InPlace(first_key) = first else { panic!("expected in-place write") };
    assert_eq!(store.sub_buffer(first_key).unwrap().bound, Some(0));
}

#[test]
fn test_discard_reuses_released_sub_buffer() {
    let (dispatch, mut allocator, mut store) = setup();
    let handle = store
        .create(&dispatch, &mut allocator, BufferKind::Vertex, 256, true, BufferUsage::WriteOnly)
        .unwrap();

    store.mark_bound(handle, 0);
    store.plan_write(&dispatch, &mut allocator, handle, SetDataOptions::Discard).unwrap();
    store.mark_bound(handle, 1);

    // Slot 0 completes: the first sub-buffer is idle again
    store.release_slot(0);
    store.plan_write(&dispatch, &mut allocator, handle, SetDataOptions::Discard).unwrap();

    let buffer = store.get(handle).unwrap();
    assert_eq!(buffer.sub_buffers.len(), 2);
    assert_eq!(buffer.current, 0);
}

#[test]
fn test_discard_unbound_writes_in_place() {
    let (dispatch, mut allocator, mut store) = setup();
    let handle = store
        .create(&dispatch, &mut allocator, BufferKind::Index, 256, true, BufferUsage::None)
        .unwrap();
    let current = store.current(handle).unwrap();

    let plan = store.plan_write(&dispatch, &mut allocator, handle, SetDataOptions::Discard).unwrap();
    assert_eq!(plan, WritePlan::InPlace(current));
}

#[test]
fn test_none_on_bound_buffer_stalls() {
    let (dispatch, mut allocator, mut store) = setup();
    let handle = store
        .create(&dispatch, &mut allocator, BufferKind::Vertex, 256, false, BufferUsage::None)
        .unwrap();
    let current = store.current(handle).unwrap();

    assert_eq!(
        store.plan_write(&dispatch, &mut allocator, handle, SetDataOptions::None).unwrap(),
        WritePlan::InPlace(current)
    );

    store.mark_bound(handle, 1);
    assert_eq!(
        store.plan_write(&dispatch, &mut allocator, handle, SetDataOptions::None).unwrap(),
        WritePlan::Stall(current)
    );
}

#[test]
fn test_no_overwrite_ignores_binding() {
    let (dispatch, mut allocator, mut store) = setup();
    let handle = store
        .create(&dispatch, &mut allocator, BufferKind::Vertex, 256, true, BufferUsage::WriteOnly)
        .unwrap();
    let current = store.current(handle).unwrap();
    store.mark_bound(handle, 0);

    assert_eq!(
        store.plan_write(&dispatch, &mut allocator, handle, SetDataOptions::NoOverwrite).unwrap(),
        WritePlan::InPlace(current)
    );
    assert_eq!(store.get(handle).unwrap().sub_buffers.len(), 1);
}

#[test]
fn test_discard_out_of_memory_falls_back_to_stall() {
    let (dispatch, mut allocator, mut store) = setup();
    // Large enough that a second copy needs a fresh allocation
    let handle = store
        .create(&dispatch, &mut allocator, BufferKind::Vertex, 60 * 1024 * 1024, true, BufferUsage::WriteOnly)
        .unwrap();
    let current = store.current(handle).unwrap();
    store.mark_bound(handle, 0);

    dispatch.fail_allocations.set(true);
    let plan = store.plan_write(&dispatch, &mut allocator, handle, SetDataOptions::Discard).unwrap();

    assert_eq!(plan, WritePlan::Stall(current));
    assert_eq!(store.get(handle).unwrap().sub_buffers.len(), 1);
    assert_eq!(dispatch.destroyed_buffers.get(), 1);
}

#[test]
fn test_unknown_buffer_is_invalid() {
    let (dispatch, mut allocator, mut store) = setup();
    let handle = store
        .create(&dispatch, &mut allocator, BufferKind::Vertex, 256, true, BufferUsage::None)
        .unwrap();
    store.dispose(handle);

    assert!(store.plan_write(&dispatch, &mut allocator, handle, SetDataOptions::None).is_err());
}

// ============================================================================
// DATA
// ============================================================================

#[test]
fn test_write_then_read_back() {
    let (dispatch, mut allocator, mut store) = setup();
    let handle = store
        .create(&dispatch, &mut allocator, BufferKind::Vertex, 1024, false, BufferUsage::None)
        .unwrap();

    let data: Vec<u8> = (0..128u8).collect();
    let WritePlan::InPlace(key) = store.plan_write(&dispatch, &mut allocator, handle, SetDataOptions::None).unwrap() else {
        panic!("expected in-place write");
    };
    store.write(&allocator, key, 64, &data).unwrap();

    let mut out = vec![0u8; 128];
    store.read(&allocator, handle, 64, &mut out).unwrap();
    assert_eq!(out, data);
}

#[test]
fn test_rotated_sub_buffer_keeps_old_contents_intact() {
    let (dispatch, mut allocator, mut store) = setup();
    let handle = store
        .create(&dispatch, &mut allocator, BufferKind::Vertex, 16, true, BufferUsage::WriteOnly)
        .unwrap();

    let WritePlan::InPlace(first) = store.plan_write(&dispatch, &mut allocator, handle, SetDataOptions::Discard).unwrap() else {
        panic!("expected in-place write");
    };
    store.write(&allocator, first, 0, &[1u8; 16]).unwrap();
    store.mark_bound(handle, 0);

    let WritePlan::InPlace(second) = store.plan_write(&dispatch, &mut allocator, handle, SetDataOptions::Discard).unwrap() else {
        panic!("expected in-place write");
    };
    store.write(&allocator, second, 0, &[2u8; 16]).unwrap();

    let mut out = [0u8; 16];
    allocator.read_mapped(store.sub_buffer(first).unwrap().region, 0, &mut out).unwrap();
    assert_eq!(out, [1u8; 16]);
    store.read(&allocator, handle, 0, &mut out).unwrap();
    assert_eq!(out, [2u8; 16]);
}

// ============================================================================
// DISPOSAL
// ============================================================================

#[test]
fn test_dispose_returns_every_sub_buffer() {
    let (dispatch, mut allocator, mut store) = setup();
    let handle = store
        .create(&dispatch, &mut allocator, BufferKind::Vertex, 256, true, BufferUsage::WriteOnly)
        .unwrap();
    store.mark_bound(handle, 0);
    store.plan_write(&dispatch, &mut allocator, handle, SetDataOptions::Discard).unwrap();

    let retired = store.dispose(handle);
    assert_eq!(retired.len(), 2);
    assert!(store.get(handle).is_none());
    // Nothing destroyed yet: that is deferred to the caller
    assert_eq!(dispatch.destroyed_buffers.get(), 0);
}

#[test]
fn test_relocate_swaps_handles() {
    let (dispatch, mut allocator, mut store) = setup();
    let handle = store
        .create(&dispatch, &mut allocator, BufferKind::Index, 256, false, BufferUsage::None)
        .unwrap();
    let key = store.current(handle).unwrap();
    let old = *store.sub_buffer(key).unwrap();

    let new_buffer: ash::vk::Buffer = ash::vk::Handle::from_raw(9999);
    let new_region = crate::vulkan_memory::UsedRegionKey::default();
    let retired = store.relocate(key, new_buffer, new_region, 1).unwrap();

    assert_eq!(retired.buffer, old.buffer);
    assert_eq!(retired.region, old.region);
    assert_eq!(store.current_vk_buffer(handle), Some(new_buffer));
    // The copy into the new buffer is in flight on slot 1
    assert_eq!(store.sub_buffer(key).unwrap().bound, Some(1));
}

#[test]
fn test_destroy_all_frees_memory() {
    let (dispatch, mut allocator, mut store) = setup();
    for _ in 0..3 {
        store
            .create(&dispatch, &mut allocator, BufferKind::Vertex, 256, false, BufferUsage::None)
            .unwrap();
    }

    store.destroy_all(&dispatch, &mut allocator);

    assert_eq!(dispatch.destroyed_buffers.get(), 3);
    assert!(store.is_empty());
    assert_eq!(allocator.free_empty_allocations(&dispatch), 1);
}
