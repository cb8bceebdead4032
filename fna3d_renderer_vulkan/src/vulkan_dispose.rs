/// Deferred destruction of GPU objects
///
/// Objects disposed while slot N is recording may still be referenced by
/// that recording and by the submission in flight on the other slot. They are
/// queued on slot N and handed back for destruction once slot N's fence is
/// observed signaled, which implies the other slot finished before it.

use ash::vk;

use crate::mojoshader::EffectId;
use crate::vulkan_buffer::RetiredBuffer;
use crate::vulkan_command_list::MAX_FRAMES_IN_FLIGHT;
use crate::vulkan_memory::UsedRegionKey;

#[derive(Debug)]
pub enum PendingDestroy {
    Buffer(RetiredBuffer),
    /// Image, its memory (`None` when imported) and every view onto it
    Image {
        image: vk::Image,
        region: Option<UsedRegionKey>,
        views: Vec<vk::ImageView>,
    },
    Framebuffer(vk::Framebuffer),
    Effect(EffectId),
}

#[derive(Debug, Default)]
pub struct DisposeQueue {
    pending: [Vec<PendingDestroy>; MAX_FRAMES_IN_FLIGHT],
}

impl DisposeQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `item` behind the submission recording on `slot`
    pub fn push(&mut self, slot: usize, item: PendingDestroy) {
        self.pending[slot].push(item);
    }

    pub fn extend(&mut self, slot: usize, items: impl IntoIterator<Item = PendingDestroy>) {
        self.pending[slot].extend(items);
    }

    /// Everything queued on `slot`, now safe to destroy
    pub fn take(&mut self, slot: usize) -> Vec<PendingDestroy> {
        std::mem::take(&mut self.pending[slot])
    }

    /// Everything queued on any slot (device idle)
    pub fn take_all(&mut self) -> Vec<PendingDestroy> {
        let mut all = Vec::new();
        for pending in &mut self.pending {
            all.append(pending);
        }
        all
    }

    pub fn len(&self) -> usize {
        self.pending.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
#[path = "vulkan_dispose_tests.rs"]
mod tests;
