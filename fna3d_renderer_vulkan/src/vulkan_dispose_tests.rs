//! Unit tests for vulkan_dispose.rs

use ash::vk::{self, Handle};

use crate::mojoshader::EffectId;
use crate::vulkan_dispose::*;

fn framebuffer(raw: u64) -> PendingDestroy {
    PendingDestroy::Framebuffer(vk::Framebuffer::from_raw(raw))
}

#[test]
fn test_items_wait_for_their_slot() {
    let mut queue = DisposeQueue::new();
    queue.push(0, framebuffer(1));
    queue.push(1, framebuffer(2));
    queue.push(0, PendingDestroy::Effect(EffectId(7)));
    assert_eq!(queue.len(), 3);

    let released = queue.take(0);
    assert_eq!(released.len(), 2);
    assert!(matches!(released[1], PendingDestroy::Effect(EffectId(7))));
    assert_eq!(queue.len(), 1);

    // Taking a slot twice yields nothing new
    assert!(queue.take(0).is_empty());
}

#[test]
fn test_take_all_empties_every_slot() {
    let mut queue = DisposeQueue::new();
    queue.extend(0, [framebuffer(1), framebuffer(2)]);
    queue.push(1, framebuffer(3));

    let all = queue.take_all();
    assert_eq!(all.len(), 3);
    assert!(queue.is_empty());
}

#[test]
fn test_image_keeps_all_views() {
    let mut queue = DisposeQueue::new();
    queue.push(1, PendingDestroy::Image {
        image: vk::Image::from_raw(5),
        region: None,
        views: vec![vk::ImageView::from_raw(6), vk::ImageView::from_raw(7)],
    });

    match queue.take(1).pop() {
        Some(PendingDestroy::Image { image, region, views }) => {
            assert_eq!(image.as_raw(), 5);
            assert!(region.is_none());
            assert_eq!(views.len(), 2);
        }
        other => panic!("unexpected {:?}", other),
    }
}
