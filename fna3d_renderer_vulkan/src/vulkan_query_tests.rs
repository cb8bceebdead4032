//! Unit tests for vulkan_query.rs

use crate::vulkan_query::*;

#[test]
fn test_slots_hand_out_lowest_first() {
    let mut slots = QuerySlots::new();
    assert_eq!(slots.acquire(), Some(0));
    assert_eq!(slots.acquire(), Some(1));
    assert_eq!(slots.available(), MAX_QUERIES as usize - 2);
}

#[test]
fn test_exhaustion_returns_none() {
    let mut slots = QuerySlots::new();
    for _ in 0..MAX_QUERIES {
        assert!(slots.acquire().is_some());
    }
    assert_eq!(slots.acquire(), None);

    slots.release(7);
    assert_eq!(slots.acquire(), Some(7));
}

#[test]
fn test_double_release_is_ignored() {
    let mut slots = QuerySlots::new();
    let index = slots.acquire().unwrap();
    slots.release(index);
    slots.release(index);
    assert_eq!(slots.available(), MAX_QUERIES as usize);
}
