//! Unit tests for vulkan_renderer_pass.rs

use ash::vk;
use fna3d::fna3d::render::Rect;

use crate::vulkan_renderer_pass::clamp_scissor;

fn rect2d(x: i32, y: i32, width: u32, height: u32) -> vk::Rect2D {
    vk::Rect2D { offset: vk::Offset2D { x, y }, extent: vk::Extent2D { width, height } }
}

#[test]
fn test_scissor_inside_target_is_unchanged() {
    assert_eq!(clamp_scissor(Rect::new(10, 20, 100, 50), 800, 600), rect2d(10, 20, 100, 50));
}

#[test]
fn test_scissor_is_clipped_to_target() {
    assert_eq!(clamp_scissor(Rect::new(700, 500, 200, 200), 800, 600), rect2d(700, 500, 100, 100));
}

#[test]
fn test_negative_scissor_origin_is_clipped() {
    assert_eq!(clamp_scissor(Rect::new(-50, -10, 100, 40), 800, 600), rect2d(0, 0, 50, 30));
}

#[test]
fn test_scissor_outside_target_is_empty() {
    let clipped = clamp_scissor(Rect::new(900, 700, 10, 10), 800, 600);
    assert_eq!(clipped.extent, vk::Extent2D { width: 0, height: 0 });
}

#[test]
fn test_scissor_with_negative_size_is_empty() {
    let clipped = clamp_scissor(Rect::new(100, 100, -20, -20), 800, 600);
    assert_eq!(clipped, rect2d(100, 100, 0, 0));
}
