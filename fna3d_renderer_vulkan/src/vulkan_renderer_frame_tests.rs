//! Unit tests for vulkan_renderer_frame.rs

use ash::vk;
use fna3d::fna3d::render::Rect;

use crate::vulkan_renderer_frame::rect_offsets;

#[test]
fn test_rect_offsets_span_the_rect() {
    let offsets = rect_offsets(Rect::new(10, 20, 640, 360));
    assert_eq!(offsets[0], vk::Offset3D { x: 10, y: 20, z: 0 });
    assert_eq!(offsets[1], vk::Offset3D { x: 650, y: 380, z: 1 });
}

#[test]
fn test_rect_offsets_full_surface() {
    let offsets = rect_offsets(Rect::new(0, 0, 1280, 720));
    assert_eq!(offsets[0], vk::Offset3D { x: 0, y: 0, z: 0 });
    assert_eq!(offsets[1], vk::Offset3D { x: 1280, y: 720, z: 1 });
}
