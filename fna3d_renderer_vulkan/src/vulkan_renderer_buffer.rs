/// Vertex and index buffer entry points

use fna3d::fna3d::{Error, Result};
use fna3d::fna3d::render::{BufferHandle, BufferUsage, SetDataOptions};
use fna3d::engine_trace;

use crate::vulkan::VulkanRenderer;
use crate::vulkan_buffer::{BufferKind, WritePlan};
use crate::vulkan_dispose::PendingDestroy;

/// Copy `element_count` elements of `element_size` bytes spaced `stride` apart
/// in `src` into `out`, packed
///
/// Stops at whichever of `src` and `out` runs out first; returns the elements copied.
pub(crate) fn gather_elements(src: &[u8], out: &mut [u8], element_count: usize, element_size: usize, stride: usize) -> usize {
    if element_size == 0 {
        return 0;
    }
    let stride = stride.max(element_size);
    let mut copied = 0;
    for (index, dst) in out.chunks_exact_mut(element_size).take(element_count).enumerate() {
        let start = index * stride;
        let Some(element) = src.get(start..start + element_size) else {
            break;
        };
        dst.copy_from_slice(element);
        copied += 1;
    }
    copied
}

impl VulkanRenderer {
    pub(crate) fn create_buffer(&mut self, kind: BufferKind, dynamic: bool, usage: BufferUsage, size: usize) -> Result<BufferHandle> {
        self.buffers.create(&self.ctx, &mut self.allocator, kind, size as u64, dynamic, usage)
    }

    pub(crate) fn dispose_buffer(&mut self, handle: BufferHandle) {
        let retired = self.buffers.dispose(handle);
        let slot = self.scheduler.current_slot();
        self.dispose_queue.extend(slot, retired.into_iter().map(PendingDestroy::Buffer));
    }

    fn check_range(&self, handle: BufferHandle, offset: usize, length: usize) -> Result<()> {
        let size = self.buffers.get(handle).ok_or_else(|| Self::unknown("buffer"))?.size;
        if offset as u64 + length as u64 > size {
            return Err(Error::InvalidResource(format!(
                "Buffer access of {} bytes at {} exceeds its {} bytes", length, offset, size
            )));
        }
        Ok(())
    }

    pub(crate) fn write_buffer(&mut self, handle: BufferHandle, offset: usize, data: &[u8], options: SetDataOptions) -> Result<()> {
        self.check_range(handle, offset, data.len())?;
        match self.buffers.plan_write(&self.ctx, &mut self.allocator, handle, options)? {
            WritePlan::InPlace(key) => self.buffers.write(&self.allocator, key, offset as u64, data),
            WritePlan::Stall(key) => {
                engine_trace!("fna3d::vulkan", "Buffer write waits for the GPU ({:?})", options);
                self.flush_and_wait()?;
                self.buffers.write(&self.allocator, key, offset as u64, data)
            }
        }
    }

    pub(crate) fn read_buffer(&mut self, handle: BufferHandle, offset: usize, data: &mut [u8]) -> Result<()> {
        self.check_range(handle, offset, data.len())?;
        self.buffers.read(&self.allocator, handle, offset as u64, data)
    }

    /// Read `element_count` elements, dropping the stride padding between them
    pub(crate) fn read_vertex_buffer(
        &mut self,
        handle: BufferHandle,
        offset: usize,
        data: &mut [u8],
        element_count: usize,
        element_size: usize,
        stride: usize,
    ) -> Result<()> {
        if element_count == 0 || element_size == 0 {
            return Ok(());
        }
        let packed = element_count.saturating_mul(element_size).min(data.len());
        if stride == 0 || stride == element_size {
            return self.read_buffer(handle, offset, &mut data[..packed]);
        }

        // The last element needs only its own bytes, not a full stride
        let span = (element_count - 1).saturating_mul(stride).saturating_add(element_size);
        let mut strided = vec![0u8; span];
        self.read_buffer(handle, offset, &mut strided)?;
        gather_elements(&strided, &mut data[..packed], element_count, element_size, stride);
        Ok(())
    }
}

#[cfg(test)]
#[path = "vulkan_renderer_buffer_tests.rs"]
mod tests;
