/// StagingBuffers - host-visible transfer buffers for uploads and readbacks
///
/// The fast buffer lives in device-local, host-visible memory and never
/// grows; the slow buffer is plain host memory that doubles on demand up to
/// `MAX_STAGING_SIZE`. Offsets are bump-allocated and reset once per
/// submission. A buffer whose data was submitted stays "in flight" until the
/// fence of that submission is observed signaled.

use ash::vk;
use fna3d::fna3d::{Error, Result};
use fna3d::{engine_debug, engine_warn};

use crate::vulkan_dispatch::{DeviceDispatch, BindTarget};
use crate::vulkan_memory::{MemoryAllocator, ResourceOwner, UsedRegionKey, next_highest_alignment};

pub const FAST_STAGING_SIZE: u64 = 64_000_000;
pub const STARTING_STAGING_SIZE: u64 = 8_000_000;
pub const MAX_STAGING_SIZE: u64 = 256_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StagingKind {
    Fast,
    Slow,
}

/// A reserved range of a staging buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StagingSlice {
    pub buffer: vk::Buffer,
    pub offset: u64,
    pub size: u64,
    pub kind: StagingKind,
}

struct StagingBuffer {
    buffer: vk::Buffer,
    region: UsedRegionKey,
    size: u64,
    offset: u64,
}

impl StagingBuffer {
    fn create(
        dispatch: &dyn DeviceDispatch,
        allocator: &mut MemoryAllocator,
        size: u64,
        required: vk::MemoryPropertyFlags,
        preferred: vk::MemoryPropertyFlags,
    ) -> Result<Self> {
        let buffer = dispatch
            .create_buffer(size, vk::BufferUsageFlags::TRANSFER_SRC | vk::BufferUsageFlags::TRANSFER_DST)
            .map_err(|e| fna3d::engine_err!("fna3d::vulkan", "Failed to create staging buffer: {:?}", e))?;

        match allocator.bind_memory_for_resource(
            dispatch,
            BindTarget::Buffer(buffer),
            size,
            required,
            preferred,
            true,
            ResourceOwner::Staging,
        ) {
            Ok(region) => Ok(Self { buffer, region, size, offset: 0 }),
            Err(e) => {
                dispatch.destroy_buffer(buffer);
                Err(e)
            }
        }
    }

    fn reserve(&mut self, length: u64, alignment: u64) -> Option<u64> {
        let offset = next_highest_alignment(self.offset, alignment.max(1));
        if offset + length > self.size {
            return None;
        }
        self.offset = offset + length;
        Some(offset)
    }

    fn destroy(self, dispatch: &dyn DeviceDispatch, allocator: &mut MemoryAllocator) {
        dispatch.destroy_buffer(self.buffer);
        allocator.free_resource_memory(self.region);
    }
}

pub struct StagingBuffers {
    fast: Option<StagingBuffer>,
    slow: StagingBuffer,
    /// Data was copied in since the last submission
    transfer_pending: bool,
    /// Submission slot still reading the staged data
    in_flight: Option<usize>,
}

impl StagingBuffers {
    pub fn new(dispatch: &dyn DeviceDispatch, allocator: &mut MemoryAllocator) -> Result<Self> {
        let fast = match StagingBuffer::create(
            dispatch,
            allocator,
            FAST_STAGING_SIZE,
            vk::MemoryPropertyFlags::HOST_VISIBLE
                | vk::MemoryPropertyFlags::HOST_COHERENT
                | vk::MemoryPropertyFlags::DEVICE_LOCAL,
            vk::MemoryPropertyFlags::empty(),
        ) {
            Ok(buffer) => Some(buffer),
            Err(Error::OutOfMemory) => {
                engine_warn!("fna3d::vulkan", "No device-local host-visible memory, fast staging buffer disabled");
                None
            }
            Err(e) => return Err(e),
        };

        let slow = StagingBuffer::create(
            dispatch,
            allocator,
            STARTING_STAGING_SIZE,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            vk::MemoryPropertyFlags::HOST_CACHED,
        )?;

        Ok(Self {
            fast,
            slow,
            transfer_pending: false,
            in_flight: None,
        })
    }

    pub fn has_fast_buffer(&self) -> bool {
        self.fast.is_some()
    }

    pub fn slow_size(&self) -> u64 {
        self.slow.size
    }

    pub fn transfer_pending(&self) -> bool {
        self.transfer_pending
    }

    /// Submission slot whose fence must be waited on before staging more data
    pub fn in_flight_slot(&self) -> Option<usize> {
        self.in_flight
    }

    /// Reserve `length` bytes aligned to `alignment`, fast buffer first
    ///
    /// `None` means neither buffer has room: the caller flushes, waits, calls
    /// `grow` and retries.
    pub fn reserve(&mut self, length: u64, alignment: u64) -> Option<StagingSlice> {
        if let Some(fast) = self.fast.as_mut() {
            if let Some(offset) = fast.reserve(length, alignment) {
                return Some(StagingSlice { buffer: fast.buffer, offset, size: length, kind: StagingKind::Fast });
            }
        }
        self.slow
            .reserve(length, alignment)
            .map(|offset| StagingSlice { buffer: self.slow.buffer, offset, size: length, kind: StagingKind::Slow })
    }

    /// Reserve `upload_length` bytes and copy `data` to the start of the range
    pub fn copy_to_staging(
        &mut self,
        allocator: &MemoryAllocator,
        data: &[u8],
        upload_length: u64,
        alignment: u64,
    ) -> Result<Option<StagingSlice>> {
        let Some(slice) = self.reserve(upload_length.max(data.len() as u64), alignment) else {
            return Ok(None);
        };
        allocator.write_mapped(self.region(slice.kind), slice.offset, data)?;
        self.transfer_pending = true;
        Ok(Some(slice))
    }

    /// Copy a staged range back to host memory (readbacks, after a wait)
    pub fn read(&self, allocator: &MemoryAllocator, slice: &StagingSlice, out: &mut [u8]) -> Result<()> {
        if out.len() as u64 > slice.size {
            return Err(Error::InvalidResource(format!(
                "Staging read of {} bytes from a {} byte slice", out.len(), slice.size
            )));
        }
        allocator.read_mapped(self.region(slice.kind), slice.offset, out)
    }

    fn region(&self, kind: StagingKind) -> UsedRegionKey {
        match (kind, self.fast.as_ref()) {
            (StagingKind::Fast, Some(fast)) => fast.region,
            _ => self.slow.region,
        }
    }

    /// Replace the slow buffer with one of at least `required` bytes
    ///
    /// Only valid once the GPU is idle: the old buffer is destroyed immediately.
    /// Requests above `MAX_STAGING_SIZE` fail and leave the current buffer in place.
    pub fn grow(&mut self, dispatch: &dyn DeviceDispatch, allocator: &mut MemoryAllocator, required: u64) -> Result<()> {
        if required > MAX_STAGING_SIZE {
            engine_warn!("fna3d::vulkan", "Staging request of {} bytes exceeds the {} byte cap", required, MAX_STAGING_SIZE);
            return Err(Error::InvalidResource(format!(
                "Transfer of {} bytes exceeds the {} byte staging limit", required, MAX_STAGING_SIZE
            )));
        }
        let mut size = self.slow.size;
        while size < required {
            size *= 2;
        }
        let size = size.min(MAX_STAGING_SIZE);

        let slow = StagingBuffer::create(
            dispatch,
            allocator,
            size,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            vk::MemoryPropertyFlags::HOST_CACHED,
        )?;
        let old = std::mem::replace(&mut self.slow, slow);
        old.destroy(dispatch, allocator);

        engine_debug!("fna3d::vulkan", "Slow staging buffer grown to {} bytes", size);
        Ok(())
    }

    /// Data was submitted in `slot`: offsets restart, reuse waits on that slot
    pub fn on_submit(&mut self, slot: usize) {
        if self.transfer_pending {
            self.in_flight = Some(slot);
            self.transfer_pending = false;
        }
        self.reset_offsets();
    }

    /// The fence of `slot` signaled
    pub fn on_slot_released(&mut self, slot: usize) {
        if self.in_flight == Some(slot) {
            self.in_flight = None;
        }
    }

    fn reset_offsets(&mut self) {
        if let Some(fast) = self.fast.as_mut() {
            fast.offset = 0;
        }
        self.slow.offset = 0;
    }

    pub fn destroy(self, dispatch: &dyn DeviceDispatch, allocator: &mut MemoryAllocator) {
        if let Some(fast) = self.fast {
            fast.destroy(dispatch, allocator);
        }
        self.slow.destroy(dispatch, allocator);
    }
}

#[cfg(test)]
#[path = "vulkan_staging_tests.rs"]
mod tests;
