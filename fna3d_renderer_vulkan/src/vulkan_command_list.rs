/// CommandBufferScheduler - command buffer lifecycle and double-buffered submission
///
/// Command buffers move `Inactive -> Recording -> Submitted -> Inactive`.
/// Each submission goes out on one of two slots, each with its own fence.
/// Submitting slot N first waits for the previous slot's fence, recycles the
/// command buffers it carried and reports that slot as released so the caller
/// can free what those commands referenced.

use ash::vk;
use rustc_hash::FxHashMap;
use fna3d::fna3d::Result;
use fna3d::{engine_err, engine_error, engine_trace, engine_warn};

use crate::vulkan_dispatch::DeviceDispatch;

/// Submission slots (and fences)
pub const MAX_FRAMES_IN_FLIGHT: usize = 2;
pub const STARTING_COMMAND_BUFFER_COUNT: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandBufferState {
    Inactive,
    Recording,
    Submitted { slot: usize },
}

/// Result of a `submit` call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubmitOutcome {
    /// Slot the commands went out on; `None` when nothing was recorded
    pub submitted: Option<usize>,
    /// Slots whose fence was observed signaled during the call
    pub released: Vec<usize>,
}

pub struct CommandBufferScheduler {
    pool: vk::CommandPool,
    fences: [vk::Fence; MAX_FRAMES_IN_FLIGHT],

    inactive: Vec<vk::CommandBuffer>,
    /// The primary recording buffer
    current: Option<vk::CommandBuffer>,
    /// Extra recording buffers submitted after `current` (defrag copies)
    auxiliary: Vec<vk::CommandBuffer>,
    submitted: [Vec<vk::CommandBuffer>; MAX_FRAMES_IN_FLIGHT],
    states: FxHashMap<vk::CommandBuffer, CommandBufferState>,
    next_allocation_count: u32,

    slot: usize,
    has_commands: bool,
    submissions: u64,
}

impl CommandBufferScheduler {
    /// `fences` must be created signaled
    pub fn new(pool: vk::CommandPool, fences: [vk::Fence; MAX_FRAMES_IN_FLIGHT]) -> Self {
        Self {
            pool,
            fences,
            inactive: Vec::new(),
            current: None,
            auxiliary: Vec::new(),
            submitted: Default::default(),
            states: FxHashMap::default(),
            next_allocation_count: STARTING_COMMAND_BUFFER_COUNT,
            slot: 0,
            has_commands: false,
            submissions: 0,
        }
    }

    /// Slot the commands being recorded will be submitted on
    pub fn current_slot(&self) -> usize {
        self.slot
    }

    pub fn fence(&self, slot: usize) -> vk::Fence {
        self.fences[slot]
    }

    pub fn state(&self, command_buffer: vk::CommandBuffer) -> Option<CommandBufferState> {
        self.states.get(&command_buffer).copied()
    }

    pub fn has_commands(&self) -> bool {
        self.has_commands
    }

    pub fn submissions(&self) -> u64 {
        self.submissions
    }

    /// Command buffers allocated from the pool so far
    pub fn allocated_count(&self) -> usize {
        self.states.len()
    }

    // ===== RECORDING =====

    fn acquire(&mut self, dispatch: &dyn DeviceDispatch) -> Result<vk::CommandBuffer> {
        if self.inactive.is_empty() {
            let count = self.next_allocation_count;
            let buffers = dispatch
                .allocate_command_buffers(self.pool, count)
                .map_err(|e| engine_err!("fna3d::vulkan", "vkAllocateCommandBuffers failed: {:?}", e))?;
            for &buffer in &buffers {
                self.states.insert(buffer, CommandBufferState::Inactive);
            }
            self.inactive.extend(buffers);
            self.next_allocation_count *= 2;
            engine_trace!("fna3d::vulkan", "Command buffer pool grown by {}", count);
        }

        let buffer = self
            .inactive
            .pop()
            .ok_or_else(|| engine_err!("fna3d::vulkan", "Command buffer pool grew without yielding buffers"))?;
        dispatch
            .begin_command_buffer(buffer)
            .map_err(|e| engine_err!("fna3d::vulkan", "vkBeginCommandBuffer failed: {:?}", e))?;
        self.states.insert(buffer, CommandBufferState::Recording);
        Ok(buffer)
    }

    /// The recording command buffer, begun on demand
    pub fn ensure_begun(&mut self, dispatch: &dyn DeviceDispatch) -> Result<vk::CommandBuffer> {
        if let Some(current) = self.current {
            return Ok(current);
        }
        let buffer = self.acquire(dispatch)?;
        self.current = Some(buffer);
        Ok(buffer)
    }

    /// The recording command buffer, for a command that makes the next submit non-empty
    pub fn record(&mut self, dispatch: &dyn DeviceDispatch) -> Result<vk::CommandBuffer> {
        let buffer = self.ensure_begun(dispatch)?;
        self.has_commands = true;
        Ok(buffer)
    }

    /// A separate recording buffer that executes after the current one
    pub fn begin_auxiliary(&mut self, dispatch: &dyn DeviceDispatch) -> Result<vk::CommandBuffer> {
        let buffer = self.acquire(dispatch)?;
        self.auxiliary.push(buffer);
        self.has_commands = true;
        Ok(buffer)
    }

    // ===== SUBMISSION =====

    /// Submit everything recorded since the last submit
    ///
    /// Nothing is submitted when no command was recorded, unless `force`.
    /// A fresh buffer is begun afterwards so a recording buffer always exists.
    pub fn submit(
        &mut self,
        dispatch: &dyn DeviceDispatch,
        wait_semaphores: &[vk::Semaphore],
        wait_stages: &[vk::PipelineStageFlags],
        signal_semaphores: &[vk::Semaphore],
        force: bool,
    ) -> Result<SubmitOutcome> {
        let mut outcome = SubmitOutcome::default();
        if !self.has_commands && !force && wait_semaphores.is_empty() {
            return Ok(outcome);
        }

        let current = self.ensure_begun(dispatch)?;
        let mut buffers = Vec::with_capacity(1 + self.auxiliary.len());
        buffers.push(current);
        buffers.append(&mut self.auxiliary);
        self.current = None;

        for &buffer in &buffers {
            if let Err(e) = dispatch.end_command_buffer(buffer) {
                engine_error!("fna3d::vulkan", "vkEndCommandBuffer failed: {:?}", e);
            }
        }

        // The previous submission must finish before its buffers and sub-buffers are reused
        let previous = (self.slot + 1) % MAX_FRAMES_IN_FLIGHT;
        if !self.submitted[previous].is_empty() {
            self.wait_slot(dispatch, previous);
            outcome.released.push(previous);
        }

        let slot = self.slot;
        let fence = self.fences[slot];
        if let Err(e) = dispatch.reset_fences(&[fence]) {
            engine_warn!("fna3d::vulkan", "vkResetFences failed: {:?}", e);
        }

        let result = dispatch.queue_submit(&buffers, wait_semaphores, wait_stages, signal_semaphores, fence);
        if let Err(e) = result {
            for &buffer in &buffers {
                self.recycle(dispatch, buffer);
            }
            self.has_commands = false;
            if e == vk::Result::ERROR_DEVICE_LOST {
                engine_error!("fna3d::vulkan", "vkQueueSubmit: device lost");
                return Err(fna3d::fna3d::Error::DeviceLost);
            }
            return Err(engine_err!("fna3d::vulkan", "vkQueueSubmit failed: {:?}", e));
        }

        for &buffer in &buffers {
            self.states.insert(buffer, CommandBufferState::Submitted { slot });
        }
        self.submitted[slot] = buffers;
        self.submissions += 1;
        self.has_commands = false;
        self.slot = previous;
        outcome.submitted = Some(slot);

        self.ensure_begun(dispatch)?;
        Ok(outcome)
    }

    /// Submit and block until the GPU has executed the submission
    pub fn submit_and_wait(&mut self, dispatch: &dyn DeviceDispatch) -> Result<SubmitOutcome> {
        let mut outcome = self.submit(dispatch, &[], &[], &[], true)?;
        if let Some(slot) = outcome.submitted {
            self.wait_slot(dispatch, slot);
            outcome.released.push(slot);
        }
        Ok(outcome)
    }

    /// Wait for every in-flight submission; returns the released slots
    pub fn wait_idle(&mut self, dispatch: &dyn DeviceDispatch) -> Vec<usize> {
        let mut released = Vec::new();
        for slot in 0..MAX_FRAMES_IN_FLIGHT {
            if !self.submitted[slot].is_empty() {
                self.wait_slot(dispatch, slot);
                released.push(slot);
            }
        }
        released
    }

    /// Block until the submission on `slot` finished; true when one was in flight
    pub fn wait_for_slot(&mut self, dispatch: &dyn DeviceDispatch, slot: usize) -> bool {
        if self.submitted[slot].is_empty() {
            return false;
        }
        self.wait_slot(dispatch, slot);
        true
    }

    fn wait_slot(&mut self, dispatch: &dyn DeviceDispatch, slot: usize) {
        if let Err(e) = dispatch.wait_for_fences(&[self.fences[slot]], u64::MAX) {
            engine_error!("fna3d::vulkan", "vkWaitForFences (slot {}) failed: {:?}", slot, e);
        }
        let buffers = std::mem::take(&mut self.submitted[slot]);
        for buffer in buffers {
            self.recycle(dispatch, buffer);
        }
    }

    fn recycle(&mut self, dispatch: &dyn DeviceDispatch, buffer: vk::CommandBuffer) {
        if let Err(e) = dispatch.reset_command_buffer(buffer) {
            engine_warn!("fna3d::vulkan", "vkResetCommandBuffer failed: {:?}", e);
        }
        self.states.insert(buffer, CommandBufferState::Inactive);
        self.inactive.push(buffer);
    }

    /// Pool and fences for teardown; the caller destroys them once the GPU is idle
    pub fn into_handles(self) -> (vk::CommandPool, [vk::Fence; MAX_FRAMES_IN_FLIGHT]) {
        (self.pool, self.fences)
    }
}

#[cfg(test)]
#[path = "vulkan_command_list_tests.rs"]
mod tests;
