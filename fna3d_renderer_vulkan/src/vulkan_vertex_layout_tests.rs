//! Unit tests for vulkan_vertex_layout.rs

use ash::vk;
use fna3d::fna3d::render::{
    BufferHandle, VertexBufferBinding, VertexDeclaration, VertexElement, VertexElementFormat,
    VertexElementUsage,
};

use crate::mojoshader::ShaderHandle;
use crate::vulkan_vertex_layout::*;

fn position_color_stream(instance_frequency: i32) -> VertexBufferBinding {
    VertexBufferBinding {
        vertex_buffer: BufferHandle::default(),
        vertex_declaration: VertexDeclaration {
            vertex_stride: 16,
            elements: vec![
                VertexElement {
                    offset: 0,
                    format: VertexElementFormat::Vector3,
                    usage: VertexElementUsage::Position,
                    usage_index: 0,
                },
                VertexElement {
                    offset: 12,
                    format: VertexElementFormat::Color,
                    usage: VertexElementUsage::Color,
                    usage_index: 0,
                },
            ],
        },
        vertex_offset: 0,
        instance_frequency,
    }
}

fn every_location(usage: VertexElementUsage, index: u32) -> Option<u32> {
    Some(usage as u32 * 16 + index)
}

// ============================================================================
// LAYOUT BUILDING
// ============================================================================

#[test]
fn test_build_layout() {
    let layout = build_vertex_input_layout(&[position_color_stream(0)], every_location);

    assert_eq!(layout.bindings.len(), 1);
    assert_eq!(layout.bindings[0].stride, 16);
    assert_eq!(layout.bindings[0].input_rate, vk::VertexInputRate::VERTEX);

    assert_eq!(layout.attributes.len(), 2);
    assert_eq!(layout.attributes[0].format, vk::Format::R32G32B32_SFLOAT);
    assert_eq!(layout.attributes[0].location, 0);
    assert_eq!(layout.attributes[1].format, vk::Format::R8G8B8A8_UNORM);
    assert_eq!(layout.attributes[1].offset, 12);
    assert_eq!(layout.attributes[1].location, VertexElementUsage::Color as u32 * 16);
}

#[test]
fn test_instanced_stream_uses_instance_rate() {
    let layout = build_vertex_input_layout(&[position_color_stream(0), position_color_stream(1)], every_location);

    assert_eq!(layout.bindings[1].binding, 1);
    assert_eq!(layout.bindings[1].input_rate, vk::VertexInputRate::INSTANCE);
}

#[test]
fn test_duplicate_elements_are_bound_once() {
    let layout = build_vertex_input_layout(&[position_color_stream(0), position_color_stream(0)], every_location);
    assert_eq!(layout.attributes.len(), 2);
}

#[test]
fn test_unread_elements_are_skipped() {
    let only_position = |usage: VertexElementUsage, _index: u32| {
        (usage == VertexElementUsage::Position).then_some(0)
    };
    let layout = build_vertex_input_layout(&[position_color_stream(0)], only_position);

    assert_eq!(layout.attributes.len(), 1);
    assert_eq!(layout.bindings.len(), 1);
}

// ============================================================================
// CACHE
// ============================================================================

#[test]
fn test_same_key_same_index() {
    let mut cache = VertexInputLayoutCache::new();
    let streams = [position_color_stream(0)];

    let first = cache.fetch_or_build(ShaderHandle(1), &streams, every_location);
    let second = cache.fetch_or_build(ShaderHandle(1), &streams, every_location);

    assert_eq!(first, second);
    assert_eq!(cache.len(), 1);
}

#[test]
fn test_shader_and_frequency_are_part_of_the_key() {
    let mut cache = VertexInputLayoutCache::new();

    let base = cache.fetch_or_build(ShaderHandle(1), &[position_color_stream(0)], every_location);
    let other_shader = cache.fetch_or_build(ShaderHandle(2), &[position_color_stream(0)], every_location);
    let instanced = cache.fetch_or_build(ShaderHandle(1), &[position_color_stream(1)], every_location);

    assert_ne!(base, other_shader);
    assert_ne!(base, instanced);
    assert_eq!(cache.len(), 3);
    assert!(cache.layout(instanced).is_some());
    assert!(cache.layout(99).is_none());
}

#[test]
fn test_buffer_handle_is_not_part_of_the_key() {
    let mut cache = VertexInputLayoutCache::new();
    let mut stream = position_color_stream(0);
    let first = cache.fetch_or_build(ShaderHandle(1), std::slice::from_ref(&stream), every_location);

    stream.vertex_offset = 64;
    let second = cache.fetch_or_build(ShaderHandle(1), &[stream], every_location);

    assert_eq!(first, second);
}
