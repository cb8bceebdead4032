/// DeviceDispatch - the slice of the Vulkan device API used by the resource engine
///
/// Memory, descriptor, command-buffer and fence calls go through this trait so
/// the allocator, staging buffers, descriptor-set manager and command scheduler
/// can be driven by `GpuContext` (real device) or by an in-memory mock.

use ash::prelude::VkResult;
use ash::vk;

/// Memory requirements of a buffer or image, including dedicated-allocation hints
#[derive(Debug, Clone, Copy, Default)]
pub struct MemoryRequirements {
    pub size: u64,
    pub alignment: u64,
    pub memory_type_bits: u32,
    pub prefers_dedicated: bool,
    pub requires_dedicated: bool,
}

/// The resource a memory range gets bound to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindTarget {
    Buffer(vk::Buffer),
    Image(vk::Image),
}

/// One combined image/sampler descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ImageSamplerBinding {
    pub view: vk::ImageView,
    pub sampler: vk::Sampler,
}

pub trait DeviceDispatch {
    // ===== MEMORY =====

    /// Allocate device memory, optionally dedicated to one resource
    fn allocate_memory(&self, memory_type_index: u32, size: u64, dedicated: Option<BindTarget>) -> VkResult<vk::DeviceMemory>;
    fn free_memory(&self, memory: vk::DeviceMemory);
    /// Map the whole allocation persistently
    fn map_memory(&self, memory: vk::DeviceMemory, size: u64) -> VkResult<*mut u8>;
    fn unmap_memory(&self, memory: vk::DeviceMemory);
    fn bind_memory(&self, target: BindTarget, memory: vk::DeviceMemory, offset: u64) -> VkResult<()>;

    // ===== BUFFERS / IMAGES =====

    fn create_buffer(&self, size: u64, usage: vk::BufferUsageFlags) -> VkResult<vk::Buffer>;
    fn destroy_buffer(&self, buffer: vk::Buffer);
    fn destroy_image(&self, image: vk::Image);
    fn memory_requirements(&self, target: BindTarget) -> MemoryRequirements;

    // ===== DESCRIPTORS =====

    fn create_descriptor_pool(&self, max_sets: u32, pool_sizes: &[vk::DescriptorPoolSize]) -> VkResult<vk::DescriptorPool>;
    fn destroy_descriptor_pool(&self, pool: vk::DescriptorPool);
    fn allocate_descriptor_sets(&self, pool: vk::DescriptorPool, layout: vk::DescriptorSetLayout, count: u32) -> VkResult<Vec<vk::DescriptorSet>>;
    /// Write combined image samplers to bindings `0..bindings.len()` of `set`
    fn write_image_descriptors(&self, set: vk::DescriptorSet, bindings: &[ImageSamplerBinding]);
    /// Write a dynamic uniform buffer to binding 0 of `set`
    fn write_uniform_descriptor(&self, set: vk::DescriptorSet, buffer: vk::Buffer, range: u64);

    // ===== COMMAND BUFFERS =====

    fn allocate_command_buffers(&self, pool: vk::CommandPool, count: u32) -> VkResult<Vec<vk::CommandBuffer>>;
    fn begin_command_buffer(&self, command_buffer: vk::CommandBuffer) -> VkResult<()>;
    fn end_command_buffer(&self, command_buffer: vk::CommandBuffer) -> VkResult<()>;
    /// Reset with RELEASE_RESOURCES
    fn reset_command_buffer(&self, command_buffer: vk::CommandBuffer) -> VkResult<()>;

    // ===== SYNCHRONIZATION =====

    fn wait_for_fences(&self, fences: &[vk::Fence], timeout: u64) -> VkResult<()>;
    fn reset_fences(&self, fences: &[vk::Fence]) -> VkResult<()>;
    fn queue_submit(
        &self,
        command_buffers: &[vk::CommandBuffer],
        wait_semaphores: &[vk::Semaphore],
        wait_stages: &[vk::PipelineStageFlags],
        signal_semaphores: &[vk::Semaphore],
        fence: vk::Fence,
    ) -> VkResult<()>;
}

/// Raw mapped pointer into persistently mapped device memory
///
/// The mapping lives as long as its `VkDeviceMemory`; only the allocator that
/// owns the memory hands these out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MappedPtr(pub(crate) std::ptr::NonNull<u8>);

// Mapped memory is only touched from the owning renderer, which is moved
// between threads as a whole.
unsafe impl Send for MappedPtr {}

impl MappedPtr {
    pub fn new(ptr: *mut u8) -> Option<Self> {
        std::ptr::NonNull::new(ptr).map(MappedPtr)
    }

    pub fn as_ptr(self) -> *mut u8 {
        self.0.as_ptr()
    }
}
