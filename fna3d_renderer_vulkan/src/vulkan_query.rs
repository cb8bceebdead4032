/// Occlusion query slots
///
/// All occlusion queries share one `VkQueryPool` of `MAX_QUERIES` entries;
/// a query object owns one index of it until disposed.

use fna3d::engine_warn;

pub const MAX_QUERIES: u32 = 16;

pub struct QuerySlots {
    free: Vec<u32>,
}

impl Default for QuerySlots {
    fn default() -> Self {
        Self::new()
    }
}

impl QuerySlots {
    pub fn new() -> Self {
        // Popped from the back: index 0 is handed out first
        Self { free: (0..MAX_QUERIES).rev().collect() }
    }

    pub fn acquire(&mut self) -> Option<u32> {
        let index = self.free.pop();
        if index.is_none() {
            engine_warn!("fna3d::vulkan", "All {} occlusion queries are in use", MAX_QUERIES);
        }
        index
    }

    pub fn release(&mut self, index: u32) {
        if index >= MAX_QUERIES || self.free.contains(&index) {
            engine_warn!("fna3d::vulkan", "Releasing query slot {} twice", index);
            return;
        }
        self.free.push(index);
    }

    pub fn available(&self) -> usize {
        self.free.len()
    }
}

#[cfg(test)]
#[path = "vulkan_query_tests.rs"]
mod tests;
