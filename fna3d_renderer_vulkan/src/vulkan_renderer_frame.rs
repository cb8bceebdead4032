/// Frame lifecycle of the Vulkan device
///
/// Submission bookkeeping, deferred destruction, the faux backbuffer and the
/// per-window present blit.

use std::sync::Arc;
use ash::vk;
use fna3d::fna3d::{Error, Result};
use fna3d::fna3d::render::{DepthFormat, DeviceWindow, PresentationParameters, Rect};
use fna3d::{engine_debug, engine_trace};

use crate::vulkan::{FauxBackbuffer, TargetState, VulkanRenderer};
use crate::vulkan_barrier::{image_barrier, ResourceAccessType};
use crate::vulkan_command_list::SubmitOutcome;
use crate::vulkan_dispatch::DeviceDispatch;
use crate::vulkan_dispose::PendingDestroy;
use crate::vulkan_renderer_pass::AttachmentImage;
use crate::vulkan_swapchain::{
    acquire_next_image, create_swapchain, destroy_swapchain, present, recreate_swapchain, AcquireOutcome,
    CreateSwapchainOutcome,
};
use crate::vulkan_texture::color_range;

/// Blit corners of `rect` as source/destination offsets
pub(crate) fn rect_offsets(rect: Rect) -> [vk::Offset3D; 2] {
    [
        vk::Offset3D { x: rect.x, y: rect.y, z: 0 },
        vk::Offset3D { x: rect.x + rect.w, y: rect.y + rect.h, z: 1 },
    ]
}

/// An acquired swapchain image waiting for the present call
#[derive(Debug, Clone, Copy)]
struct AcquiredImage {
    swapchain: usize,
    index: u32,
    suboptimal: bool,
}

impl VulkanRenderer {
    // ===== SUBMISSION =====

    /// Recording command buffer for a command that must be submitted
    pub(crate) fn record(&mut self) -> Result<vk::CommandBuffer> {
        self.scheduler.record(&self.ctx)
    }

    pub(crate) fn after_submit(&mut self, outcome: SubmitOutcome) {
        if let Some(slot) = outcome.submitted {
            if let Some(staging) = self.staging.as_mut() {
                staging.on_submit(slot);
            }
            self.shader_context.end_frame();
        }
        for slot in outcome.released {
            self.release_slot(slot);
        }
    }

    /// The fence of `slot` signaled: everything its commands referenced is free
    pub(crate) fn release_slot(&mut self, slot: usize) {
        self.buffers.release_slot(slot);
        self.descriptor_sets.release_slot(slot);
        if let Some(staging) = self.staging.as_mut() {
            staging.on_slot_released(slot);
        }
        for item in self.dispose_queue.take(slot) {
            self.destroy_pending(item);
        }
        let freed = self.allocator.free_empty_allocations(&self.ctx);
        if freed > 0 {
            engine_trace!("fna3d::vulkan", "Released {} empty allocations", freed);
        }
    }

    /// Block until the submission on `slot` finished and release it
    pub(crate) fn wait_for_slot(&mut self, slot: usize) {
        if self.scheduler.wait_for_slot(&self.ctx, slot) {
            self.release_slot(slot);
        }
    }

    fn wait_all_slots(&mut self) {
        for slot in self.scheduler.wait_idle(&self.ctx) {
            self.release_slot(slot);
        }
    }

    /// Uniform writes must reach the ring before the queue reads it
    fn unmap_uniforms(&mut self) {
        self.effect_tracker.unmap_uniforms(&mut **self.shader_context);
    }

    /// Submit everything recorded so far and wait for the GPU to execute it
    pub(crate) fn flush_and_wait(&mut self) -> Result<()> {
        self.end_render_pass()?;
        self.unmap_uniforms();
        let outcome = self.scheduler.submit_and_wait(&self.ctx)?;
        self.after_submit(outcome);
        Ok(())
    }

    pub(crate) fn destroy_pending(&mut self, item: PendingDestroy) {
        match item {
            PendingDestroy::Buffer(retired) => {
                self.ctx.destroy_buffer(retired.buffer);
                self.allocator.free_resource_memory(retired.region);
            }
            PendingDestroy::Image { image, region, views } => {
                unsafe {
                    for view in views {
                        self.ctx.device.destroy_image_view(view, None);
                    }
                }
                if let Some(region) = region {
                    self.ctx.destroy_image(image);
                    self.allocator.free_resource_memory(region);
                }
            }
            PendingDestroy::Framebuffer(framebuffer) => unsafe {
                self.ctx.device.destroy_framebuffer(framebuffer, None);
            },
            PendingDestroy::Effect(id) => self.shader_context.delete_effect(id),
        }
    }

    /// Drop cached descriptor sets and framebuffers that reference `views`
    pub(crate) fn forget_views(&mut self, views: &[vk::ImageView]) {
        let slot = self.scheduler.current_slot();
        for &view in views {
            self.descriptor_sets.invalidate_view(view, slot);
            let stale = self.framebuffers.remove_where(|key| key.references_view(view));
            self.dispose_queue.extend(slot, stale.into_iter().map(PendingDestroy::Framebuffer));
        }
    }

    // ===== FAUX BACKBUFFER =====

    pub(crate) fn create_backbuffer(&mut self, params: &PresentationParameters) -> Result<()> {
        let width = params.back_buffer_width.max(1);
        let height = params.back_buffer_height.max(1);
        let samples = self.supported_sample_count(params.multi_sample_count);

        let texture = self.create_texture_2d_impl(params.back_buffer_format, width, height, 1, true)?;
        let msaa = if samples > 1 {
            Some(self.create_color_renderbuffer(width, height, params.back_buffer_format, samples, texture)?)
        } else {
            None
        };
        let depth_stencil = match params.depth_stencil_format {
            DepthFormat::None => None,
            format => Some(self.create_depth_renderbuffer(width, height, format, samples)?),
        };

        if let Some(entry) = self.textures.get(texture) {
            self.ctx.set_object_name(entry.image, "Faux backbuffer");
        }

        self.backbuffer = FauxBackbuffer {
            texture,
            msaa,
            depth_stencil,
            width,
            height,
            surface_format: params.back_buffer_format,
            depth_format: params.depth_stencil_format,
            multi_sample_count: samples,
        };
        self.targets = TargetState::default();
        self.need_new_render_pass = true;
        self.preserve_next_pass = false;

        engine_debug!("fna3d::vulkan", "Faux backbuffer {}x{} {:?}, depth {:?}, {}x MSAA",
            width, height, params.back_buffer_format, params.depth_stencil_format, samples);
        Ok(())
    }

    pub(crate) fn reset_backbuffer_impl(&mut self, params: &PresentationParameters) -> Result<()> {
        self.flush_pending_clear()?;
        self.end_render_pass()?;

        let old = self.backbuffer;
        self.dispose_texture(old.texture);
        if let Some(msaa) = old.msaa {
            self.dispose_renderbuffer(msaa);
        }
        if let Some(depth_stencil) = old.depth_stencil {
            self.dispose_renderbuffer(depth_stencil);
        }
        self.create_backbuffer(params)?;

        if let Some(window) = params.device_window.as_ref() {
            self.device_window = Arc::clone(window);
        }

        if self.present_options.interval != params.presentation_interval {
            engine_debug!("fna3d::vulkan", "Present interval {:?} -> {:?}, rebuilding swapchains",
                self.present_options.interval, params.presentation_interval);
            self.present_options.interval = params.presentation_interval;
            self.flush_and_wait()?;
            self.wait_all_slots();
            self.ctx.wait_idle();
            for data in std::mem::take(&mut self.swapchains) {
                destroy_swapchain(&self.ctx, data);
            }
        }
        Ok(())
    }

    pub(crate) fn read_backbuffer_impl(&mut self, x: i32, y: i32, w: i32, h: i32, data: &mut [u8]) -> Result<()> {
        if x < 0 || y < 0 || w <= 0 || h <= 0 {
            return Err(Error::InvalidResource(format!("Invalid backbuffer region {},{} {}x{}", x, y, w, h)));
        }
        // A queued clear lands before the read
        self.flush_pending_clear()?;
        let texture = self.backbuffer.texture;
        self.download_texture(texture, [x as u32, y as u32, 0], [w as u32, h as u32, 1], 0, 0, data)
    }

    // ===== PRESENTATION =====

    /// Index of the swapchain presenting into `window`, created on first use
    ///
    /// `None` while the window has no drawable area.
    fn swapchain_for(&mut self, window: Arc<dyn DeviceWindow>) -> Result<Option<usize>> {
        let id = window.window_id();
        if let Some(index) = self.swapchains.iter().position(|data| data.window.window_id() == id) {
            return Ok(Some(index));
        }
        match create_swapchain(&self.ctx, window, &self.present_options)? {
            CreateSwapchainOutcome::Created(data) => {
                self.swapchains.push(data);
                Ok(Some(self.swapchains.len() - 1))
            }
            CreateSwapchainOutcome::SurfaceZero => Ok(None),
        }
    }

    fn recreate_swapchain_at(&mut self, index: usize) -> Result<()> {
        self.wait_all_slots();
        self.ctx.wait_idle();
        let data = self.swapchains.swap_remove(index);
        match recreate_swapchain(&self.ctx, data, &self.present_options)? {
            CreateSwapchainOutcome::Created(data) => self.swapchains.push(data),
            CreateSwapchainOutcome::SurfaceZero => {
                engine_debug!("fna3d::vulkan", "Window has no drawable area, swapchain rebuilt on a later present");
            }
        }
        Ok(())
    }

    /// Copy the faux backbuffer into swapchain image `image_index`
    fn blit_to_swapchain(
        &mut self,
        swapchain: usize,
        image_index: u32,
        source: Option<Rect>,
        destination: Option<Rect>,
    ) -> Result<()> {
        let command_buffer = self.record()?;
        let backbuffer = self.backbuffer;
        self.transition_image(command_buffer, AttachmentImage::Texture(backbuffer.texture), ResourceAccessType::TransferRead, false);
        let source_image = self.textures.get(backbuffer.texture).ok_or_else(|| Self::unknown("texture"))?.image;

        let device = &self.ctx.device;
        let data = &mut self.swapchains[swapchain];
        let index = image_index as usize;
        let image = data.images[index];
        let range = color_range(0, 1, 0, 1);

        let source = source.unwrap_or(Rect::new(0, 0, backbuffer.width as i32, backbuffer.height as i32));
        let full = Rect::new(0, 0, data.extent.width as i32, data.extent.height as i32);
        // A partial destination keeps the rest of the image
        let discard = destination.map_or(true, |rect| rect == full);
        let destination = destination.unwrap_or(full);

        let layers = vk::ImageSubresourceLayers {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            mip_level: 0,
            base_array_layer: 0,
            layer_count: 1,
        };
        let blit = vk::ImageBlit {
            src_subresource: layers,
            src_offsets: rect_offsets(source),
            dst_subresource: layers,
            dst_offsets: rect_offsets(destination),
        };

        let to_transfer = image_barrier(data.image_access[index], ResourceAccessType::TransferWrite, discard);
        let to_present = image_barrier(ResourceAccessType::TransferWrite, ResourceAccessType::Present, false);
        unsafe {
            device.cmd_pipeline_barrier(
                command_buffer,
                to_transfer.src_stage,
                to_transfer.dst_stage,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[to_transfer.to_vk(image, range)],
            );
            device.cmd_blit_image(
                command_buffer,
                source_image,
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[blit],
                vk::Filter::LINEAR,
            );
            device.cmd_pipeline_barrier(
                command_buffer,
                to_present.src_stage,
                to_present.dst_stage,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[to_present.to_vk(image, range)],
            );
        }
        data.image_access[index] = ResourceAccessType::Present;
        Ok(())
    }

    /// End the frame: blit into the window's swapchain, submit and present
    pub(crate) fn present_frame(
        &mut self,
        source: Option<Rect>,
        destination: Option<Rect>,
        window: Option<Arc<dyn DeviceWindow>>,
    ) -> Result<()> {
        self.flush_pending_clear()?;
        self.end_render_pass()?;

        let window = window.unwrap_or_else(|| Arc::clone(&self.device_window));
        let slot = self.scheduler.current_slot();

        let mut acquired = None;
        if let Some(swapchain) = self.swapchain_for(window)? {
            match acquire_next_image(&self.ctx, &self.swapchains[swapchain], slot)? {
                AcquireOutcome::Acquired { index, suboptimal } => {
                    self.blit_to_swapchain(swapchain, index, source, destination)?;
                    acquired = Some(AcquiredImage { swapchain, index, suboptimal });
                }
                AcquireOutcome::NeedsRecreate => self.recreate_swapchain_at(swapchain)?,
                AcquireOutcome::Skipped => {}
            }
        }

        self.defragment_memory()?;

        self.unmap_uniforms();
        let outcome = match acquired {
            Some(image) => {
                let data = &self.swapchains[image.swapchain];
                let waits = [data.image_available[slot]];
                let signals = [data.render_finished[slot]];
                self.scheduler.submit(&self.ctx, &waits, &[vk::PipelineStageFlags::TRANSFER], &signals, true)?
            }
            None => self.scheduler.submit(&self.ctx, &[], &[], &[], false)?,
        };
        self.after_submit(outcome);

        if let Some(image) = acquired {
            let data = &self.swapchains[image.swapchain];
            let out_of_date = present(&self.ctx, data, image.index, data.render_finished[slot])?;
            if out_of_date || image.suboptimal {
                self.recreate_swapchain_at(image.swapchain)?;
            }
        } else {
            engine_trace!("fna3d::vulkan", "Frame submitted without a present");
        }

        self.descriptor_sets.end_frame();
        self.draw_calls = 0;
        self.need_new_render_pass = true;
        self.preserve_next_pass = false;
        Ok(())
    }
}

#[cfg(test)]
#[path = "vulkan_renderer_frame_tests.rs"]
mod tests;
