/// Mock device dispatch for testing without a GPU
///
/// Handles are sequential fake values, device memory is backed by host
/// vectors (so mapped writes can be read back), and every call is counted.

use ash::prelude::VkResult;
use ash::vk::{self, Handle};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;

use crate::vulkan_dispatch::{DeviceDispatch, BindTarget, ImageSamplerBinding, MemoryRequirements};

pub const MOCK_BUFFER_ALIGNMENT: u64 = 256;

#[derive(Default)]
pub struct MockDispatch {
    next_handle: Cell<u64>,

    /// Host backing of every live VkDeviceMemory
    memory: RefCell<HashMap<u64, Vec<u8>>>,
    pub memory_allocations: Cell<u32>,
    pub memory_frees: Cell<u32>,
    pub allocated_sizes: RefCell<Vec<u64>>,
    /// When set, allocate_memory fails with OUT_OF_DEVICE_MEMORY
    pub fail_allocations: Cell<bool>,
    /// When set, bind_memory fails
    pub fail_binds: Cell<bool>,
    pub binds: RefCell<Vec<(BindTarget, u64)>>,

    buffer_sizes: RefCell<HashMap<u64, u64>>,
    pub destroyed_buffers: Cell<u32>,
    pub destroyed_images: Cell<u32>,

    /// Remaining set capacity per descriptor pool
    pool_capacity: RefCell<HashMap<u64, u32>>,
    pub created_pool_sizes: RefCell<Vec<u32>>,
    pub descriptor_writes: Cell<u32>,
    pub uniform_writes: Cell<u32>,

    pub allocated_command_buffers: Cell<u32>,
    pub begun: Cell<u32>,
    pub ended: Cell<u32>,
    pub resets: Cell<u32>,
    pub submits: RefCell<Vec<Vec<vk::CommandBuffer>>>,
    pub fence_waits: Cell<u32>,
}

impl MockDispatch {
    pub fn new() -> Self {
        Self {
            next_handle: Cell::new(1),
            ..Default::default()
        }
    }

    fn next(&self) -> u64 {
        let handle = self.next_handle.get();
        self.next_handle.set(handle + 1);
        handle
    }

    pub fn live_memory_count(&self) -> usize {
        self.memory.borrow().len()
    }

    pub fn submit_count(&self) -> usize {
        self.submits.borrow().len()
    }
}

/// Two host-visible types on a device-local heap and a plain host heap
pub fn mock_memory_properties(device_local_heap_size: u64) -> vk::PhysicalDeviceMemoryProperties {
    let mut properties = vk::PhysicalDeviceMemoryProperties {
        memory_type_count: 3,
        memory_heap_count: 2,
        ..Default::default()
    };
    properties.memory_heaps[0] = vk::MemoryHeap {
        size: device_local_heap_size,
        flags: vk::MemoryHeapFlags::DEVICE_LOCAL,
    };
    properties.memory_heaps[1] = vk::MemoryHeap {
        size: 4 * 1024 * 1024 * 1024,
        flags: vk::MemoryHeapFlags::empty(),
    };
    properties.memory_types[0] = vk::MemoryType {
        property_flags: vk::MemoryPropertyFlags::DEVICE_LOCAL,
        heap_index: 0,
    };
    properties.memory_types[1] = vk::MemoryType {
        property_flags: vk::MemoryPropertyFlags::DEVICE_LOCAL
            | vk::MemoryPropertyFlags::HOST_VISIBLE
            | vk::MemoryPropertyFlags::HOST_COHERENT,
        heap_index: 0,
    };
    properties.memory_types[2] = vk::MemoryType {
        property_flags: vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        heap_index: 1,
    };
    properties
}

impl DeviceDispatch for MockDispatch {
    fn allocate_memory(&self, _memory_type_index: u32, size: u64, _dedicated: Option<BindTarget>) -> VkResult<vk::DeviceMemory> {
        if self.fail_allocations.get() {
            return Err(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY);
        }
        let handle = self.next();
        self.memory.borrow_mut().insert(handle, vec![0; size as usize]);
        self.memory_allocations.set(self.memory_allocations.get() + 1);
        self.allocated_sizes.borrow_mut().push(size);
        Ok(vk::DeviceMemory::from_raw(handle))
    }

    fn free_memory(&self, memory: vk::DeviceMemory) {
        self.memory.borrow_mut().remove(&memory.as_raw());
        self.memory_frees.set(self.memory_frees.get() + 1);
    }

    fn map_memory(&self, memory: vk::DeviceMemory, _size: u64) -> VkResult<*mut u8> {
        self.memory
            .borrow_mut()
            .get_mut(&memory.as_raw())
            .map(|backing| backing.as_mut_ptr())
            .ok_or(vk::Result::ERROR_MEMORY_MAP_FAILED)
    }

    fn unmap_memory(&self, _memory: vk::DeviceMemory) {}

    fn bind_memory(&self, target: BindTarget, _memory: vk::DeviceMemory, offset: u64) -> VkResult<()> {
        if self.fail_binds.get() {
            return Err(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY);
        }
        self.binds.borrow_mut().push((target, offset));
        Ok(())
    }

    fn create_buffer(&self, size: u64, _usage: vk::BufferUsageFlags) -> VkResult<vk::Buffer> {
        let handle = self.next();
        self.buffer_sizes.borrow_mut().insert(handle, size);
        Ok(vk::Buffer::from_raw(handle))
    }

    fn destroy_buffer(&self, buffer: vk::Buffer) {
        self.buffer_sizes.borrow_mut().remove(&buffer.as_raw());
        self.destroyed_buffers.set(self.destroyed_buffers.get() + 1);
    }

    fn destroy_image(&self, _image: vk::Image) {
        self.destroyed_images.set(self.destroyed_images.get() + 1);
    }

    fn memory_requirements(&self, target: BindTarget) -> MemoryRequirements {
        let size = match target {
            BindTarget::Buffer(buffer) => self.buffer_sizes.borrow().get(&buffer.as_raw()).copied().unwrap_or(0),
            BindTarget::Image(_) => 64 * 1024,
        };
        MemoryRequirements {
            size: size.div_ceil(MOCK_BUFFER_ALIGNMENT) * MOCK_BUFFER_ALIGNMENT,
            alignment: MOCK_BUFFER_ALIGNMENT,
            memory_type_bits: 0b111,
            prefers_dedicated: false,
            requires_dedicated: false,
        }
    }

    fn create_descriptor_pool(&self, max_sets: u32, _pool_sizes: &[vk::DescriptorPoolSize]) -> VkResult<vk::DescriptorPool> {
        let handle = self.next();
        self.pool_capacity.borrow_mut().insert(handle, max_sets);
        self.created_pool_sizes.borrow_mut().push(max_sets);
        Ok(vk::DescriptorPool::from_raw(handle))
    }

    fn destroy_descriptor_pool(&self, pool: vk::DescriptorPool) {
        self.pool_capacity.borrow_mut().remove(&pool.as_raw());
    }

    fn allocate_descriptor_sets(&self, pool: vk::DescriptorPool, _layout: vk::DescriptorSetLayout, count: u32) -> VkResult<Vec<vk::DescriptorSet>> {
        {
            let mut capacity = self.pool_capacity.borrow_mut();
            let remaining = capacity
                .get_mut(&pool.as_raw())
                .ok_or(vk::Result::ERROR_INITIALIZATION_FAILED)?;
            if *remaining < count {
                return Err(vk::Result::ERROR_OUT_OF_POOL_MEMORY);
            }
            *remaining -= count;
        }
        Ok((0..count).map(|_| vk::DescriptorSet::from_raw(self.next())).collect())
    }

    fn write_image_descriptors(&self, _set: vk::DescriptorSet, _bindings: &[ImageSamplerBinding]) {
        self.descriptor_writes.set(self.descriptor_writes.get() + 1);
    }

    fn write_uniform_descriptor(&self, _set: vk::DescriptorSet, _buffer: vk::Buffer, _range: u64) {
        self.uniform_writes.set(self.uniform_writes.get() + 1);
    }

    fn allocate_command_buffers(&self, _pool: vk::CommandPool, count: u32) -> VkResult<Vec<vk::CommandBuffer>> {
        self.allocated_command_buffers.set(self.allocated_command_buffers.get() + count);
        Ok((0..count).map(|_| vk::CommandBuffer::from_raw(self.next())).collect())
    }

    fn begin_command_buffer(&self, _command_buffer: vk::CommandBuffer) -> VkResult<()> {
        self.begun.set(self.begun.get() + 1);
        Ok(())
    }

    fn end_command_buffer(&self, _command_buffer: vk::CommandBuffer) -> VkResult<()> {
        self.ended.set(self.ended.get() + 1);
        Ok(())
    }

    fn reset_command_buffer(&self, _command_buffer: vk::CommandBuffer) -> VkResult<()> {
        self.resets.set(self.resets.get() + 1);
        Ok(())
    }

    fn wait_for_fences(&self, _fences: &[vk::Fence], _timeout: u64) -> VkResult<()> {
        self.fence_waits.set(self.fence_waits.get() + 1);
        Ok(())
    }

    fn reset_fences(&self, _fences: &[vk::Fence]) -> VkResult<()> {
        Ok(())
    }

    fn queue_submit(
        &self,
        command_buffers: &[vk::CommandBuffer],
        _wait_semaphores: &[vk::Semaphore],
        _wait_stages: &[vk::PipelineStageFlags],
        _signal_semaphores: &[vk::Semaphore],
        _fence: vk::Fence,
    ) -> VkResult<()> {
        self.submits.borrow_mut().push(command_buffers.to_vec());
        Ok(())
    }
}
