//! Unit tests for vulkan.rs

use crate::vulkan::*;

#[test]
fn test_vertex_upload_covers_whole_strides() {
    // 4 vertices of 12 bytes in a 16-byte stride
    assert_eq!(vertex_data_length(64, 4, 12, 16), 64);
    // Fewer elements than the data holds
    assert_eq!(vertex_data_length(64, 2, 12, 16), 32);
}

#[test]
fn test_vertex_upload_never_reads_past_data() {
    assert_eq!(vertex_data_length(60, 4, 12, 16), 60);
    assert_eq!(vertex_data_length(0, 4, 12, 16), 0);
}

#[test]
fn test_zero_stride_means_packed_elements() {
    assert_eq!(vertex_data_length(100, 3, 8, 0), 24);
}

#[test]
fn test_sampler_slot_counts() {
    assert_eq!(MAX_TEXTURE_SAMPLERS, 16);
    assert_eq!(MAX_VERTEX_TEXTURE_SAMPLERS, 4);
}
