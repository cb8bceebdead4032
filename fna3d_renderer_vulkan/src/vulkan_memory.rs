/// MemoryAllocator - sub-allocates large VkDeviceMemory blocks
///
/// Each memory type has a sub-allocator owning zero or more allocations and a
/// descending-by-size list of every free region available for new bindings.
/// Used regions include their alignment padding, so for every allocation
/// `used_space + free_space == size` holds after every operation.

use ash::vk;
use slotmap::{new_key_type, SlotMap};
use fna3d::fna3d::{Error, Result};
use fna3d::fna3d::render::{TextureHandle, RenderbufferHandle};
use fna3d::{engine_debug, engine_trace, engine_warn, engine_err};

use crate::vulkan_buffer::SubBufferKey;
use crate::vulkan_dispatch::{DeviceDispatch, BindTarget, MemoryRequirements, MappedPtr};

/// Granularity of non-dedicated allocations larger than the size hint
pub const ALLOCATION_INCREMENT: u64 = 16_000_000;
pub const STARTING_ALLOCATION_SIZE: u64 = 64_000_000;
pub const MAX_ALLOCATION_SIZE: u64 = 256_000_000;

new_key_type! {
    pub struct AllocationKey;
    pub struct FreeRegionKey;
    pub struct UsedRegionKey;
}

/// `align * ceil(n / align)`
pub fn next_highest_alignment(n: u64, align: u64) -> u64 {
    if align == 0 {
        return n;
    }
    align * n.div_ceil(align)
}

/// What a used region is bound to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceOwner {
    SubBuffer(SubBufferKey),
    Texture(TextureHandle),
    Renderbuffer(RenderbufferHandle),
    Staging,
    Internal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreeRegion {
    pub allocation: AllocationKey,
    pub offset: u64,
    pub size: u64,
}

/// A bound span: `[offset, offset + size)` covers the alignment padding,
/// the resource itself starts at `resource_offset`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsedRegion {
    pub allocation: AllocationKey,
    pub offset: u64,
    pub size: u64,
    pub resource_offset: u64,
    pub resource_size: u64,
    pub alignment: u64,
    pub owner: ResourceOwner,
}

pub struct MemoryAllocation {
    pub memory: vk::DeviceMemory,
    pub size: u64,
    pub memory_type_index: u32,
    pub dedicated: bool,
    /// Cleared while the allocation is being defragmented
    pub available_for_allocation: bool,
    pub mapped: Option<MappedPtr>,
    pub free_regions: Vec<FreeRegionKey>,
    pub used_regions: Vec<UsedRegionKey>,
    pub used_space: u64,
    pub free_space: u64,
}

/// Per-memory-type bookkeeping
struct SubAllocator {
    allocations: Vec<AllocationKey>,
    /// Free regions of available, non-dedicated allocations, largest first
    sorted_free_regions: Vec<FreeRegionKey>,
    next_allocation_size: u64,
}

impl SubAllocator {
    fn new() -> Self {
        Self {
            allocations: Vec::new(),
            sorted_free_regions: Vec::new(),
            next_allocation_size: STARTING_ALLOCATION_SIZE,
        }
    }
}

pub struct MemoryAllocator {
    memory_properties: vk::PhysicalDeviceMemoryProperties,
    sub_allocators: Vec<SubAllocator>,
    allocations: SlotMap<AllocationKey, MemoryAllocation>,
    free_regions: SlotMap<FreeRegionKey, FreeRegion>,
    used_regions: SlotMap<UsedRegionKey, UsedRegion>,

    max_device_local_heap_usage: u64,
    device_local_heap_usage: u64,

    need_defrag: bool,
    resource_freed: bool,
    defrag_timer: u32,
    empty_allocations_pending: bool,
}

impl MemoryAllocator {
    /// Create an allocator for the given device memory layout
    ///
    /// `heap_usage_factor` caps device-local allocations at that fraction of
    /// the largest device-local heap.
    pub fn new(memory_properties: vk::PhysicalDeviceMemoryProperties, heap_usage_factor: f64) -> Self {
        let largest_device_local_heap = memory_properties
            .memory_heaps
            .iter()
            .take(memory_properties.memory_heap_count as usize)
            .filter(|heap| heap.flags.contains(vk::MemoryHeapFlags::DEVICE_LOCAL))
            .map(|heap| heap.size)
            .max()
            .unwrap_or(0);

        let max_device_local_heap_usage = (largest_device_local_heap as f64 * heap_usage_factor.clamp(0.0, 1.0)) as u64;

        engine_debug!("fna3d::vulkan::memory",
            "Memory allocator: {} memory types, device-local budget {} bytes",
            memory_properties.memory_type_count, max_device_local_heap_usage);

        Self {
            memory_properties,
            sub_allocators: (0..memory_properties.memory_type_count).map(|_| SubAllocator::new()).collect(),
            allocations: SlotMap::with_key(),
            free_regions: SlotMap::with_key(),
            used_regions: SlotMap::with_key(),
            max_device_local_heap_usage,
            device_local_heap_usage: 0,
            need_defrag: false,
            resource_freed: false,
            defrag_timer: 0,
            empty_allocations_pending: false,
        }
    }

    // ===== QUERIES =====

    pub fn memory_properties(&self) -> &vk::PhysicalDeviceMemoryProperties {
        &self.memory_properties
    }

    pub fn allocation(&self, key: AllocationKey) -> Option<&MemoryAllocation> {
        self.allocations.get(key)
    }

    pub fn used_region(&self, key: UsedRegionKey) -> Option<&UsedRegion> {
        self.used_regions.get(key)
    }

    pub fn allocations(&self) -> impl Iterator<Item = (AllocationKey, &MemoryAllocation)> {
        self.allocations.iter()
    }

    pub fn allocation_count(&self, memory_type_index: u32) -> usize {
        self.sub_allocators
            .get(memory_type_index as usize)
            .map_or(0, |sub| sub.allocations.len())
    }

    /// Sizes of the sorted free-region list of one memory type
    pub fn free_region_sizes(&self, memory_type_index: u32) -> Vec<u64> {
        self.sub_allocators
            .get(memory_type_index as usize)
            .map(|sub| sub.sorted_free_regions.iter().map(|key| self.free_regions[*key].size).collect())
            .unwrap_or_default()
    }

    pub fn device_local_heap_usage(&self) -> u64 {
        self.device_local_heap_usage
    }

    /// Bytes bound to resources in device-local memory
    pub fn device_local_bytes_used(&self) -> u64 {
        self.allocations
            .values()
            .filter(|allocation| self.is_device_local(allocation.memory_type_index))
            .map(|allocation| allocation.used_space)
            .sum()
    }

    pub fn needs_defrag(&self) -> bool {
        self.need_defrag
    }

    fn memory_type_flags(&self, memory_type_index: u32) -> vk::MemoryPropertyFlags {
        self.memory_properties.memory_types[memory_type_index as usize].property_flags
    }

    fn is_device_local(&self, memory_type_index: u32) -> bool {
        self.memory_type_flags(memory_type_index).contains(vk::MemoryPropertyFlags::DEVICE_LOCAL)
    }

    /// First memory type at or after `start` allowed by `type_bits` with all `required` flags
    pub fn find_memory_type(&self, type_bits: u32, required: vk::MemoryPropertyFlags, start: u32) -> Option<u32> {
        (start..self.memory_properties.memory_type_count).find(|&index| {
            type_bits & (1 << index) != 0 && self.memory_type_flags(index).contains(required)
        })
    }

    // ===== ALLOCATION =====

    /// Allocate a new VkDeviceMemory block of `size` bytes
    ///
    /// Host-visible memory is mapped persistently. Returns `Error::OutOfMemory`
    /// when the device-local budget or the driver refuses the request; the
    /// caller may retry with other memory properties.
    pub fn allocate_memory(
        &mut self,
        dispatch: &dyn DeviceDispatch,
        memory_type_index: u32,
        size: u64,
        dedicated: Option<BindTarget>,
    ) -> Result<AllocationKey> {
        let flags = self.memory_type_flags(memory_type_index);
        let device_local = flags.contains(vk::MemoryPropertyFlags::DEVICE_LOCAL);

        if device_local && self.device_local_heap_usage + size > self.max_device_local_heap_usage {
            engine_warn!("fna3d::vulkan::memory",
                "Device-local budget exceeded ({} + {} > {} bytes)",
                self.device_local_heap_usage, size, self.max_device_local_heap_usage);
            return Err(Error::OutOfMemory);
        }

        let memory = dispatch
            .allocate_memory(memory_type_index, size, dedicated)
            .map_err(|e| match e {
                vk::Result::ERROR_OUT_OF_DEVICE_MEMORY | vk::Result::ERROR_OUT_OF_HOST_MEMORY => {
                    engine_warn!("fna3d::vulkan::memory",
                        "vkAllocateMemory({} bytes, type {}) failed: {:?}", size, memory_type_index, e);
                    Error::OutOfMemory
                }
                _ => engine_err!("fna3d::vulkan::memory", "vkAllocateMemory failed: {:?}", e),
            })?;

        let mapped = if flags.contains(vk::MemoryPropertyFlags::HOST_VISIBLE) {
            match dispatch.map_memory(memory, size) {
                Ok(ptr) => MappedPtr::new(ptr),
                Err(e) => {
                    dispatch.free_memory(memory);
                    return Err(engine_err!("fna3d::vulkan::memory", "vkMapMemory failed: {:?}", e));
                }
            }
        } else {
            None
        };

        let key = self.allocations.insert(MemoryAllocation {
            memory,
            size,
            memory_type_index,
            dedicated: dedicated.is_some(),
            available_for_allocation: true,
            mapped,
            free_regions: Vec::new(),
            used_regions: Vec::new(),
            used_space: 0,
            free_space: 0,
        });
        self.sub_allocators[memory_type_index as usize].allocations.push(key);
        if device_local {
            self.device_local_heap_usage += size;
        }
        self.add_free_region(key, 0, size);

        engine_trace!("fna3d::vulkan::memory",
            "Allocated {} bytes of memory type {}{}", size, memory_type_index,
            if dedicated.is_some() { " (dedicated)" } else { "" });

        Ok(key)
    }

    /// Find or allocate memory for `target` and bind it
    ///
    /// First fit over the type's free regions (largest first); on a miss a new
    /// allocation is made, sized by the dedicated flag or the growth hint.
    #[allow(clippy::too_many_arguments)]
    pub fn bind_resource_memory(
        &mut self,
        dispatch: &dyn DeviceDispatch,
        memory_type_index: u32,
        requirements: &MemoryRequirements,
        force_dedicated: bool,
        resource_size: u64,
        target: BindTarget,
        owner: ResourceOwner,
    ) -> Result<UsedRegionKey> {
        let dedicated = force_dedicated || requirements.requires_dedicated || requirements.prefers_dedicated;
        let required = requirements.size;
        let alignment = requirements.alignment.max(1);

        let mut found = None;
        if !dedicated {
            for &key in &self.sub_allocators[memory_type_index as usize].sorted_free_regions {
                let region = &self.free_regions[key];
                if region.size < required {
                    break;
                }
                let aligned = next_highest_alignment(region.offset, alignment);
                if aligned + required <= region.offset + region.size {
                    found = Some((key, aligned));
                    break;
                }
            }
        }

        let (region_key, aligned_offset) = match found {
            Some(hit) => hit,
            None => {
                let sub = &mut self.sub_allocators[memory_type_index as usize];
                let allocation_size = if dedicated {
                    required
                } else if required > sub.next_allocation_size {
                    next_highest_alignment(required, ALLOCATION_INCREMENT)
                } else {
                    let size = sub.next_allocation_size;
                    sub.next_allocation_size = (sub.next_allocation_size * 2).min(MAX_ALLOCATION_SIZE);
                    size
                };

                let allocation_key = self.allocate_memory(
                    dispatch,
                    memory_type_index,
                    allocation_size,
                    if dedicated { Some(target) } else { None },
                )?;
                // A fresh allocation has exactly one free region
                let region_key = self.allocations[allocation_key].free_regions[0];
                (region_key, 0)
            }
        };

        let used_key = self.carve_used_region(region_key, aligned_offset, required, resource_size, alignment, owner);

        let region = self.used_regions[used_key];
        let memory = self.allocations[region.allocation].memory;
        if let Err(e) = dispatch.bind_memory(target, memory, region.resource_offset) {
            self.free_resource_memory(used_key);
            return Err(engine_err!("fna3d::vulkan::memory", "Failed to bind {:?} memory: {:?}", target, e));
        }

        Ok(used_key)
    }

    /// Bind memory for a resource, trying `required | preferred` properties
    /// first and falling back to `required` alone when memory runs out
    pub fn bind_memory_for_resource(
        &mut self,
        dispatch: &dyn DeviceDispatch,
        target: BindTarget,
        resource_size: u64,
        required: vk::MemoryPropertyFlags,
        preferred: vk::MemoryPropertyFlags,
        force_dedicated: bool,
        owner: ResourceOwner,
    ) -> Result<UsedRegionKey> {
        let requirements = dispatch.memory_requirements(target);

        let mut attempts = vec![required | preferred];
        if !preferred.is_empty() {
            attempts.push(required);
        }

        for (attempt, flags) in attempts.into_iter().enumerate() {
            let mut start = 0;
            while let Some(memory_type_index) = self.find_memory_type(requirements.memory_type_bits, flags, start) {
                match self.bind_resource_memory(
                    dispatch,
                    memory_type_index,
                    &requirements,
                    force_dedicated,
                    resource_size,
                    target,
                    owner,
                ) {
                    Ok(key) => {
                        if attempt > 0 {
                            engine_warn!("fna3d::vulkan::memory",
                                "Out of preferred memory, {:?} bound to memory type {}", owner, memory_type_index);
                        }
                        return Ok(key);
                    }
                    Err(Error::OutOfMemory) => start = memory_type_index + 1,
                    Err(e) => return Err(e),
                }
            }
        }

        engine_warn!("fna3d::vulkan::memory", "No memory type can hold {} bytes for {:?}", requirements.size, owner);
        Err(Error::OutOfMemory)
    }

    /// Release a used region
    ///
    /// The span becomes a free region (coalesced with its neighbors); an
    /// allocation left without used regions is freed by the next
    /// `free_empty_allocations` sweep.
    pub fn free_resource_memory(&mut self, key: UsedRegionKey) {
        let Some(region) = self.used_regions.remove(key) else {
            engine_warn!("fna3d::vulkan::memory", "Freeing unknown used region");
            return;
        };

        let allocation = &mut self.allocations[region.allocation];
        allocation.used_regions.retain(|used| *used != key);
        allocation.used_space -= region.size;
        let empty = allocation.used_regions.is_empty();

        self.add_free_region(region.allocation, region.offset, region.size);

        self.need_defrag = true;
        self.resource_freed = true;
        if empty {
            self.empty_allocations_pending = true;
        }
    }

    /// Free every allocation without used regions; returns how many were freed
    pub fn free_empty_allocations(&mut self, dispatch: &dyn DeviceDispatch) -> usize {
        if !self.empty_allocations_pending {
            return 0;
        }
        self.empty_allocations_pending = false;

        let empty: Vec<AllocationKey> = self
            .allocations
            .iter()
            .filter(|(_, allocation)| allocation.used_regions.is_empty())
            .map(|(key, _)| key)
            .collect();

        for &key in &empty {
            self.destroy_allocation(dispatch, key);
        }

        if !empty.is_empty() {
            engine_debug!("fna3d::vulkan::memory", "Freed {} empty allocation(s)", empty.len());
        }
        empty.len()
    }

    /// Free every allocation regardless of use (device teardown)
    pub fn destroy_all(&mut self, dispatch: &dyn DeviceDispatch) {
        let keys: Vec<AllocationKey> = self.allocations.keys().collect();
        for key in keys {
            self.destroy_allocation(dispatch, key);
        }
        self.used_regions.clear();
    }

    fn destroy_allocation(&mut self, dispatch: &dyn DeviceDispatch, key: AllocationKey) {
        let free_keys = self.allocations[key].free_regions.clone();
        for free_key in free_keys {
            self.remove_free_region(free_key);
        }

        let Some(allocation) = self.allocations.remove(key) else {
            return;
        };
        for used_key in &allocation.used_regions {
            self.used_regions.remove(*used_key);
        }

        if allocation.mapped.is_some() {
            dispatch.unmap_memory(allocation.memory);
        }
        dispatch.free_memory(allocation.memory);

        self.sub_allocators[allocation.memory_type_index as usize]
            .allocations
            .retain(|allocation_key| *allocation_key != key);
        if self.is_device_local(allocation.memory_type_index) {
            self.device_local_heap_usage -= allocation.size;
        }
    }

    // ===== REGION BOOKKEEPING =====

    fn carve_used_region(
        &mut self,
        region_key: FreeRegionKey,
        aligned_offset: u64,
        required: u64,
        resource_size: u64,
        alignment: u64,
        owner: ResourceOwner,
    ) -> UsedRegionKey {
        let region = self.remove_free_region(region_key);
        let used_end = aligned_offset + required;

        let used_key = self.used_regions.insert(UsedRegion {
            allocation: region.allocation,
            offset: region.offset,
            size: used_end - region.offset,
            resource_offset: aligned_offset,
            resource_size,
            alignment,
            owner,
        });
        let allocation = &mut self.allocations[region.allocation];
        allocation.used_regions.push(used_key);
        allocation.used_space += used_end - region.offset;

        let region_end = region.offset + region.size;
        if region_end > used_end {
            self.add_free_region(region.allocation, used_end, region_end - used_end);
        }

        used_key
    }

    /// Insert a free region, merging it with any adjacent free region first
    fn add_free_region(&mut self, allocation_key: AllocationKey, offset: u64, size: u64) {
        let neighbor = self.allocations[allocation_key]
            .free_regions
            .iter()
            .copied()
            .find(|key| {
                let region = &self.free_regions[*key];
                region.offset + region.size == offset || offset + size == region.offset
            });

        if let Some(neighbor_key) = neighbor {
            let neighbor = self.remove_free_region(neighbor_key);
            self.add_free_region(allocation_key, neighbor.offset.min(offset), neighbor.size + size);
            return;
        }

        let key = self.free_regions.insert(FreeRegion { allocation: allocation_key, offset, size });
        let allocation = &mut self.allocations[allocation_key];
        allocation.free_regions.push(key);
        allocation.free_space += size;

        if allocation.available_for_allocation && !allocation.dedicated {
            let free_regions = &self.free_regions;
            let sorted = &mut self.sub_allocators[allocation.memory_type_index as usize].sorted_free_regions;
            let position = sorted.partition_point(|other| free_regions[*other].size > size);
            sorted.insert(position, key);
        }
    }

    fn remove_free_region(&mut self, key: FreeRegionKey) -> FreeRegion {
        let region = self.free_regions[key];
        self.free_regions.remove(key);

        let allocation = &mut self.allocations[region.allocation];
        allocation.free_regions.retain(|free| *free != key);
        allocation.free_space -= region.size;

        let sorted = &mut self.sub_allocators[allocation.memory_type_index as usize].sorted_free_regions;
        if let Some(position) = sorted.iter().position(|free| *free == key) {
            sorted.remove(position);
        }

        region
    }

    // ===== MAPPED ACCESS =====

    /// Copy `data` into a host-visible resource at `offset` bytes from its start
    pub fn write_mapped(&self, key: UsedRegionKey, offset: u64, data: &[u8]) -> Result<()> {
        let ptr = self.mapped_range(key, offset, data.len() as u64)?;
        unsafe {
            std::ptr::copy_nonoverlapping(data.as_ptr(), ptr, data.len());
        }
        Ok(())
    }

    /// Copy from a host-visible resource at `offset` bytes into `out`
    pub fn read_mapped(&self, key: UsedRegionKey, offset: u64, out: &mut [u8]) -> Result<()> {
        let ptr = self.mapped_range(key, offset, out.len() as u64)?;
        unsafe {
            std::ptr::copy_nonoverlapping(ptr as *const u8, out.as_mut_ptr(), out.len());
        }
        Ok(())
    }

    fn mapped_range(&self, key: UsedRegionKey, offset: u64, len: u64) -> Result<*mut u8> {
        let region = self
            .used_regions
            .get(key)
            .ok_or_else(|| Error::InvalidResource("Unknown memory region".to_string()))?;
        if offset + len > region.resource_size {
            return Err(Error::InvalidResource(format!(
                "Mapped access [{}, {}) outside resource of {} bytes",
                offset, offset + len, region.resource_size
            )));
        }
        let mapped = self.allocations[region.allocation]
            .mapped
            .ok_or_else(|| Error::InvalidResource("Memory is not host visible".to_string()))?;
        Ok(unsafe { mapped.as_ptr().add((region.resource_offset + offset) as usize) })
    }

    pub fn is_host_visible(&self, key: UsedRegionKey) -> bool {
        self.used_regions
            .get(key)
            .is_some_and(|region| self.allocations[region.allocation].mapped.is_some())
    }

    // ===== DEFRAGMENTATION =====

    /// Advance the defrag timer by one frame; true when a defrag should run now
    ///
    /// A defrag runs once `need_defrag` has been set for `cooldown_frames`
    /// consecutive frames without any resource being freed in between.
    pub fn tick_defrag_timer(&mut self, cooldown_frames: u32) -> bool {
        if self.resource_freed {
            self.resource_freed = false;
            self.defrag_timer = 0;
            return false;
        }
        if !self.need_defrag {
            return false;
        }
        self.defrag_timer += 1;
        if self.defrag_timer >= cooldown_frames {
            self.defrag_timer = 0;
            return true;
        }
        false
    }

    /// First available non-dedicated allocation with more than one free region
    /// whose used regions all satisfy `movable`
    pub fn find_fragmented_allocation(&self, movable: impl Fn(&ResourceOwner) -> bool) -> Option<AllocationKey> {
        self.allocations
            .iter()
            .filter(|(_, allocation)| {
                allocation.available_for_allocation && !allocation.dedicated && allocation.free_regions.len() > 1
            })
            .find(|(_, allocation)| {
                allocation
                    .used_regions
                    .iter()
                    .all(|key| movable(&self.used_regions[*key].owner))
            })
            .map(|(key, _)| key)
    }

    /// Take an allocation out of circulation and return the regions to move
    pub fn begin_defragment(&mut self, key: AllocationKey) -> Vec<UsedRegionKey> {
        let allocation = &mut self.allocations[key];
        allocation.available_for_allocation = false;
        let free_keys = allocation.free_regions.clone();
        let used = allocation.used_regions.clone();

        let sorted = &mut self.sub_allocators[allocation.memory_type_index as usize].sorted_free_regions;
        sorted.retain(|free| !free_keys.contains(free));

        used
    }

    /// Nothing left to defragment
    pub fn clear_defrag_request(&mut self) {
        self.need_defrag = false;
        self.defrag_timer = 0;
    }
}

#[cfg(test)]
#[path = "vulkan_memory_tests.rs"]
mod tests;
