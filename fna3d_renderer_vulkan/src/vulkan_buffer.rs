/// Buffer - logical vertex/index buffers backed by a ring of sub-buffers
///
/// A logical buffer owns one or more physical `VkBuffer`s ("sub-buffers").
/// Exactly one is current; a DISCARD write while the current sub-buffer is
/// still referenced by recorded or in-flight commands moves to another
/// sub-buffer instead of overwriting it.

use ash::vk;
use slotmap::{new_key_type, SlotMap};
use fna3d::fna3d::{Error, Result};
use fna3d::fna3d::render::{BufferHandle, BufferUsage, SetDataOptions};
use fna3d::{engine_trace, engine_warn};

use crate::vulkan_dispatch::{DeviceDispatch, BindTarget};
use crate::vulkan_memory::{MemoryAllocator, ResourceOwner, UsedRegionKey};

new_key_type! {
    pub struct SubBufferKey;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferKind {
    Vertex,
    Index,
}

impl BufferKind {
    pub fn usage_flags(self) -> vk::BufferUsageFlags {
        let transfer = vk::BufferUsageFlags::TRANSFER_SRC | vk::BufferUsageFlags::TRANSFER_DST;
        match self {
            BufferKind::Vertex => vk::BufferUsageFlags::VERTEX_BUFFER | transfer,
            BufferKind::Index => vk::BufferUsageFlags::INDEX_BUFFER | transfer,
        }
    }
}

/// One physical buffer of a logical buffer's ring
#[derive(Debug, Clone, Copy)]
pub struct SubBuffer {
    pub buffer: vk::Buffer,
    pub region: UsedRegionKey,
    pub size: u64,
    pub kind: BufferKind,
    /// Submission slot whose commands last referenced this sub-buffer
    pub bound: Option<usize>,
}

pub struct VulkanBuffer {
    pub kind: BufferKind,
    pub size: u64,
    pub dynamic: bool,
    pub usage: BufferUsage,
    pub sub_buffers: Vec<SubBufferKey>,
    pub current: usize,
}

/// Where a write may land
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WritePlan {
    /// Write straight into this sub-buffer
    InPlace(SubBufferKey),
    /// The GPU may still read this sub-buffer: flush and wait first
    Stall(SubBufferKey),
}

/// Resources released by a disposed or relocated sub-buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetiredBuffer {
    pub buffer: vk::Buffer,
    pub region: UsedRegionKey,
}

#[derive(Default)]
pub struct BufferStore {
    buffers: SlotMap<BufferHandle, VulkanBuffer>,
    sub_buffers: SlotMap<SubBufferKey, SubBuffer>,
}

impl BufferStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, handle: BufferHandle) -> Option<&VulkanBuffer> {
        self.buffers.get(handle)
    }

    pub fn sub_buffer(&self, key: SubBufferKey) -> Option<&SubBuffer> {
        self.sub_buffers.get(key)
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    /// Current sub-buffer of a logical buffer
    pub fn current(&self, handle: BufferHandle) -> Option<SubBufferKey> {
        self.buffers
            .get(handle)
            .and_then(|buffer| buffer.sub_buffers.get(buffer.current).copied())
    }

    pub fn current_vk_buffer(&self, handle: BufferHandle) -> Option<vk::Buffer> {
        self.current(handle).map(|key| self.sub_buffers[key].buffer)
    }

    // ===== CREATION =====

    pub fn create(
        &mut self,
        dispatch: &dyn DeviceDispatch,
        allocator: &mut MemoryAllocator,
        kind: BufferKind,
        size: u64,
        dynamic: bool,
        usage: BufferUsage,
    ) -> Result<BufferHandle> {
        let sub_buffer = self.create_sub_buffer(dispatch, allocator, kind, size)?;

        engine_trace!("fna3d::vulkan", "Created {:?} buffer ({} bytes, dynamic: {})", kind, size, dynamic);

        Ok(self.buffers.insert(VulkanBuffer {
            kind,
            size,
            dynamic,
            usage,
            sub_buffers: vec![sub_buffer],
            current: 0,
        }))
    }

    fn create_sub_buffer(
        &mut self,
        dispatch: &dyn DeviceDispatch,
        allocator: &mut MemoryAllocator,
        kind: BufferKind,
        size: u64,
    ) -> Result<SubBufferKey> {
        let buffer = dispatch
            .create_buffer(size.max(1), kind.usage_flags())
            .map_err(|e| match e {
                vk::Result::ERROR_OUT_OF_DEVICE_MEMORY | vk::Result::ERROR_OUT_OF_HOST_MEMORY => Error::OutOfMemory,
                _ => fna3d::engine_err!("fna3d::vulkan", "vkCreateBuffer failed: {:?}", e),
            })?;

        let key = self.sub_buffers.insert(SubBuffer {
            buffer,
            region: UsedRegionKey::default(),
            size,
            kind,
            bound: None,
        });

        match allocator.bind_memory_for_resource(
            dispatch,
            BindTarget::Buffer(buffer),
            size,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            false,
            ResourceOwner::SubBuffer(key),
        ) {
            Ok(region) => {
                self.sub_buffers[key].region = region;
                Ok(key)
            }
            Err(e) => {
                self.sub_buffers.remove(key);
                dispatch.destroy_buffer(buffer);
                Err(e)
            }
        }
    }

    // ===== WRITES =====

    /// Decide where a write with `options` lands, rotating sub-buffers on DISCARD
    pub fn plan_write(
        &mut self,
        dispatch: &dyn DeviceDispatch,
        allocator: &mut MemoryAllocator,
        handle: BufferHandle,
        options: SetDataOptions,
    ) -> Result<WritePlan> {
        let buffer = self
            .buffers
            .get(handle)
            .ok_or_else(|| Error::InvalidResource("Unknown buffer".to_string()))?;
        let current = buffer.sub_buffers[buffer.current];
        let bound = self.sub_buffers[current].bound.is_some();

        match options {
            SetDataOptions::NoOverwrite => Ok(WritePlan::InPlace(current)),
            SetDataOptions::None if bound => Ok(WritePlan::Stall(current)),
            SetDataOptions::None => Ok(WritePlan::InPlace(current)),
            SetDataOptions::Discard if !bound => Ok(WritePlan::InPlace(current)),
            SetDataOptions::Discard => {
                let idle = buffer
                    .sub_buffers
                    .iter()
                    .position(|key| self.sub_buffers[*key].bound.is_none());
                if let Some(index) = idle {
                    let buffer = &mut self.buffers[handle];
                    buffer.current = index;
                    return Ok(WritePlan::InPlace(buffer.sub_buffers[index]));
                }

                let (kind, size) = (buffer.kind, buffer.size);
                match self.create_sub_buffer(dispatch, allocator, kind, size) {
                    Ok(key) => {
                        let buffer = &mut self.buffers[handle];
                        buffer.sub_buffers.push(key);
                        buffer.current = buffer.sub_buffers.len() - 1;
                        engine_trace!("fna3d::vulkan",
                            "Buffer discard: {} sub-buffers in ring", buffer.sub_buffers.len());
                        Ok(WritePlan::InPlace(key))
                    }
                    Err(Error::OutOfMemory) => {
                        engine_warn!("fna3d::vulkan", "Out of memory for a new sub-buffer, stalling instead");
                        Ok(WritePlan::Stall(current))
                    }
                    Err(e) => Err(e),
                }
            }
        }
    }

    pub fn write(&self, allocator: &MemoryAllocator, key: SubBufferKey, offset: u64, data: &[u8]) -> Result<()> {
        let sub_buffer = self
            .sub_buffers
            .get(key)
            .ok_or_else(|| Error::InvalidResource("Unknown sub-buffer".to_string()))?;
        allocator.write_mapped(sub_buffer.region, offset, data)
    }

    /// Read from the current sub-buffer
    pub fn read(&self, allocator: &MemoryAllocator, handle: BufferHandle, offset: u64, out: &mut [u8]) -> Result<()> {
        let key = self
            .current(handle)
            .ok_or_else(|| Error::InvalidResource("Unknown buffer".to_string()))?;
        allocator.read_mapped(self.sub_buffers[key].region, offset, out)
    }

    // ===== BINDING =====

    /// Record that commands of submission `slot` reference the current sub-buffer
    pub fn mark_bound(&mut self, handle: BufferHandle, slot: usize) -> Option<vk::Buffer> {
        let key = self.current(handle)?;
        let sub_buffer = &mut self.sub_buffers[key];
        sub_buffer.bound = Some(slot);
        Some(sub_buffer.buffer)
    }

    /// The fence of `slot` signaled: its sub-buffers may be rewritten
    pub fn release_slot(&mut self, slot: usize) {
        for sub_buffer in self.sub_buffers.values_mut() {
            if sub_buffer.bound == Some(slot) {
                sub_buffer.bound = None;
            }
        }
    }

    // ===== DISPOSAL / DEFRAG =====

    /// Remove a logical buffer; its sub-buffers go to the caller for deferred destruction
    pub fn dispose(&mut self, handle: BufferHandle) -> Vec<RetiredBuffer> {
        let Some(buffer) = self.buffers.remove(handle) else {
            engine_warn!("fna3d::vulkan", "Disposing unknown buffer");
            return Vec::new();
        };
        buffer
            .sub_buffers
            .into_iter()
            .filter_map(|key| self.sub_buffers.remove(key))
            .map(|sub_buffer| RetiredBuffer { buffer: sub_buffer.buffer, region: sub_buffer.region })
            .collect()
    }

    /// Swap a sub-buffer onto a new VkBuffer/region, returning the old pair
    ///
    /// The GPU copy filling the new buffer runs in submission `slot`, so the
    /// sub-buffer counts as bound there until that slot is released.
    pub fn relocate(&mut self, key: SubBufferKey, buffer: vk::Buffer, region: UsedRegionKey, slot: usize) -> Option<RetiredBuffer> {
        let sub_buffer = self.sub_buffers.get_mut(key)?;
        let retired = RetiredBuffer { buffer: sub_buffer.buffer, region: sub_buffer.region };
        sub_buffer.buffer = buffer;
        sub_buffer.region = region;
        sub_buffer.bound = Some(slot);
        Some(retired)
    }

    /// Destroy everything immediately (device teardown, GPU idle)
    pub fn destroy_all(&mut self, dispatch: &dyn DeviceDispatch, allocator: &mut MemoryAllocator) {
        for (_, sub_buffer) in self.sub_buffers.drain() {
            dispatch.destroy_buffer(sub_buffer.buffer);
            allocator.free_resource_memory(sub_buffer.region);
        }
        self.buffers.clear();
    }
}

#[cfg(test)]
#[path = "vulkan_buffer_tests.rs"]
mod tests;
