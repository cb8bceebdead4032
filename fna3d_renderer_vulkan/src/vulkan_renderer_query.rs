/// Occlusion query entry points

use ash::vk;
use fna3d::fna3d::{Error, Result};
use fna3d::fna3d::render::QueryHandle;
use fna3d::{engine_trace, engine_warn};

use crate::vulkan::VulkanRenderer;
use crate::vulkan_query::MAX_QUERIES;

impl VulkanRenderer {
    pub(crate) fn create_query_impl(&mut self) -> Result<QueryHandle> {
        let index = self
            .query_slots
            .acquire()
            .ok_or_else(|| Error::InvalidResource(format!("No free occlusion query (limit {})", MAX_QUERIES)))?;
        let handle = self.queries.insert(index);
        engine_trace!("fna3d::vulkan", "Query {:?} uses pool index {}", handle, index);
        Ok(handle)
    }

    pub(crate) fn dispose_query(&mut self, handle: QueryHandle) {
        let Some(index) = self.queries.remove(handle) else {
            engine_warn!("fna3d::vulkan", "Disposing unknown query {:?}", handle);
            return;
        };
        if self.active_query == Some(index) {
            engine_warn!("fna3d::vulkan", "Query {:?} disposed while active", handle);
        }
        self.query_slots.release(index);
    }

    /// Reset the pool index outside a pass, then count samples from a fresh pass
    pub(crate) fn query_begin_impl(&mut self, handle: QueryHandle) -> Result<()> {
        let index = *self.queries.get(handle).ok_or_else(|| Self::unknown("query"))?;
        if self.active_query.is_some() {
            engine_warn!("fna3d::vulkan", "Query begun while another is active; ending the previous one");
        }
        self.end_render_pass()?;
        let command_buffer = self.record()?;
        unsafe { self.ctx.device.cmd_reset_query_pool(command_buffer, self.query_pool, index, 1) };

        self.begin_render_pass()?;
        let flags = if self.ctx.features.occlusion_query_precise {
            vk::QueryControlFlags::PRECISE
        } else {
            vk::QueryControlFlags::empty()
        };
        let command_buffer = self.record()?;
        unsafe { self.ctx.device.cmd_begin_query(command_buffer, self.query_pool, index, flags) };
        self.active_query = Some(index);
        Ok(())
    }

    pub(crate) fn query_end_impl(&mut self, handle: QueryHandle) -> Result<()> {
        let index = *self.queries.get(handle).ok_or_else(|| Self::unknown("query"))?;
        if self.active_query != Some(index) {
            // Already ended together with its render pass
            return Ok(());
        }
        let command_buffer = self.record()?;
        unsafe { self.ctx.device.cmd_end_query(command_buffer, self.query_pool, index) };
        self.active_query = None;
        Ok(())
    }

    /// Samples that passed, or `None` while the GPU has not produced the result
    pub(crate) fn query_result(&mut self, handle: QueryHandle) -> Option<u64> {
        let index = *self.queries.get(handle)?;
        if self.active_query == Some(index) {
            return None;
        }
        let mut samples = [0u64; 1];
        let result = unsafe {
            self.ctx.device.get_query_pool_results(self.query_pool, index, &mut samples, vk::QueryResultFlags::TYPE_64)
        };
        match result {
            Ok(()) => Some(samples[0]),
            Err(vk::Result::NOT_READY) => None,
            Err(e) => {
                engine_warn!("fna3d::vulkan", "vkGetQueryPoolResults failed: {:?}", e);
                None
            }
        }
    }
}
