/// Render pass coordination
///
/// Passes begin lazily on the first draw (or flushed clear) after the
/// attachments changed. Clears never record commands of their own: they are
/// folded into the load ops of the next pass.

use ash::vk;
use glam::Vec4;
use fna3d::fna3d::{Error, Result};
use fna3d::fna3d::render::{ClearOptions, DepthFormat, RenderTargetBinding, RenderTargetKind, RenderbufferHandle, TextureHandle};
use fna3d::{engine_debug, engine_trace, engine_warn};

use crate::vulkan::{ActivePass, ColorTarget, PendingClear, TargetState, VulkanRenderer};
use crate::vulkan_barrier::{image_barrier, needs_barrier, ImageBarrierPlan, ResourceAccessType};
use crate::vulkan_cache::{FramebufferHash, RenderPassHash, MAX_RENDERTARGET_BINDINGS};
use crate::vulkan_format::depth_bias_scale;
use crate::vulkan_pipeline::{create_framebuffer, create_render_pass};
use crate::vulkan_texture::{color_range, VulkanRenderbuffer};

/// An image with tracked access that can be attached to a pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AttachmentImage {
    Texture(TextureHandle),
    Renderbuffer(RenderbufferHandle),
}

#[derive(Debug, Clone, Copy)]
struct PassAttachment {
    image: AttachmentImage,
    view: vk::ImageView,
    format: vk::Format,
}

/// Resolved attachments of the next pass
struct PassAttachments {
    colors: Vec<PassAttachment>,
    /// One per color when multisampled
    resolves: Vec<PassAttachment>,
    depth: Option<PassAttachment>,
    depth_format: DepthFormat,
    multi_sample_count: u32,
    width: u32,
    height: u32,
}

/// Scissor rectangle clipped to a `width` x `height` attachment
pub(crate) fn clamp_scissor(rect: fna3d::fna3d::render::Rect, width: u32, height: u32) -> vk::Rect2D {
    let (width, height) = (width as i32, height as i32);
    let x0 = rect.x.clamp(0, width);
    let y0 = rect.y.clamp(0, height);
    let x1 = rect.x.saturating_add(rect.w).clamp(x0, width);
    let y1 = rect.y.saturating_add(rect.h).clamp(y0, height);
    vk::Rect2D {
        offset: vk::Offset2D { x: x0, y: y0 },
        extent: vk::Extent2D { width: (x1 - x0) as u32, height: (y1 - y0) as u32 },
    }
}

pub(crate) fn cmd_image_barrier(
    device: &ash::Device,
    command_buffer: vk::CommandBuffer,
    image: vk::Image,
    range: vk::ImageSubresourceRange,
    plan: &ImageBarrierPlan,
) {
    unsafe {
        device.cmd_pipeline_barrier(
            command_buffer,
            plan.src_stage,
            plan.dst_stage,
            vk::DependencyFlags::empty(),
            &[],
            &[],
            &[plan.to_vk(image, range)],
        );
    }
}

impl VulkanRenderer {
    // ===== BARRIERS =====

    /// Move a tracked image to `next`; must be recorded outside a render pass
    pub(crate) fn transition_image(
        &mut self,
        command_buffer: vk::CommandBuffer,
        image: AttachmentImage,
        next: ResourceAccessType,
        discard: bool,
    ) {
        let (vk_image, range, prev) = match image {
            AttachmentImage::Texture(handle) => match self.textures.get_mut(handle) {
                Some(texture) => (texture.image, texture.desc.full_range(), std::mem::replace(&mut texture.access, next)),
                None => return,
            },
            AttachmentImage::Renderbuffer(handle) => match self.renderbuffers.get_mut(handle) {
                Some(renderbuffer) => {
                    let range = renderbuffer.range();
                    let tracked = renderbuffer.image_mut();
                    (tracked.image, range, std::mem::replace(&mut tracked.access, next))
                }
                None => return,
            },
        };
        if !needs_barrier(prev, next) {
            return;
        }
        let plan = image_barrier(prev, next, discard || prev == ResourceAccessType::None);
        cmd_image_barrier(&self.ctx.device, command_buffer, vk_image, range, &plan);
    }

    // ===== CLEARS =====

    pub(crate) fn queue_clear(&mut self, options: ClearOptions, color: Vec4, depth: f32, stencil: i32) {
        if options.is_empty() {
            return;
        }
        let pending = self.pending_clear.get_or_insert(PendingClear {
            options: ClearOptions::empty(),
            color,
            depth,
            stencil,
        });
        if options.contains(ClearOptions::TARGET) {
            pending.color = color;
        }
        if options.contains(ClearOptions::DEPTH_BUFFER) {
            pending.depth = depth;
        }
        if options.contains(ClearOptions::STENCIL) {
            pending.stencil = stencil;
        }
        pending.options |= options;
        self.need_new_render_pass = true;
    }

    /// Run a queued clear now, by beginning a pass that performs it
    pub(crate) fn flush_pending_clear(&mut self) -> Result<()> {
        if self.pending_clear.is_some() {
            self.begin_render_pass()?;
        }
        Ok(())
    }

    // ===== PASSES =====

    fn pass_attachments(&self) -> Result<PassAttachments> {
        let on_backbuffer = self.targets.colors.is_empty();
        let backbuffer_color;
        let (colors, depth_handle): (&[ColorTarget], Option<RenderbufferHandle>) = if on_backbuffer {
            backbuffer_color = [ColorTarget { texture: self.backbuffer.texture, layer: 0, color_buffer: self.backbuffer.msaa }];
            (&backbuffer_color, self.backbuffer.depth_stencil)
        } else {
            (&self.targets.colors, self.targets.depth_stencil)
        };

        let mut out = PassAttachments {
            colors: Vec::with_capacity(colors.len()),
            resolves: Vec::new(),
            depth: None,
            depth_format: DepthFormat::None,
            multi_sample_count: 1,
            width: u32::MAX,
            height: u32::MAX,
        };
        let mut samples = None;

        for target in colors {
            let texture = self.textures.get(target.texture).ok_or_else(|| Self::unknown("texture"))?;
            let resolve = PassAttachment {
                image: AttachmentImage::Texture(target.texture),
                view: texture.target_view(target.layer),
                format: texture.desc.vk_format,
            };

            let multisampled = match target.color_buffer.map(|handle| (handle, self.renderbuffers.get(handle))) {
                Some((handle, Some(renderbuffer))) if renderbuffer.image().multi_sample_count > 1 => {
                    let image = renderbuffer.image();
                    out.colors.push(PassAttachment {
                        image: AttachmentImage::Renderbuffer(handle),
                        view: image.view,
                        format: image.vk_format,
                    });
                    out.resolves.push(resolve);
                    out.width = out.width.min(image.width);
                    out.height = out.height.min(image.height);
                    Some(image.multi_sample_count)
                }
                Some((_, None)) => return Err(Self::unknown("renderbuffer")),
                _ => {
                    let extent = texture.desc.dims.mip_extent(0);
                    out.colors.push(resolve);
                    out.width = out.width.min(extent.width);
                    out.height = out.height.min(extent.height);
                    None
                }
            };

            let count = multisampled.unwrap_or(1);
            if *samples.get_or_insert(count) != count {
                return Err(Error::InvalidResource(
                    "Render targets mix multisampled and single-sampled attachments".to_string(),
                ));
            }
        }
        out.multi_sample_count = samples.unwrap_or(1);
        if out.multi_sample_count == 1 {
            out.resolves.clear();
        }

        if let Some(handle) = depth_handle {
            let renderbuffer = self.renderbuffers.get(handle).ok_or_else(|| Self::unknown("renderbuffer"))?;
            let VulkanRenderbuffer::DepthStencil { image, format } = renderbuffer else {
                return Err(Error::InvalidResource("Color renderbuffer bound as depth-stencil".to_string()));
            };
            if image.multi_sample_count.max(1) != out.multi_sample_count {
                engine_warn!("fna3d::vulkan", "Depth buffer has {} samples, color targets {}",
                    image.multi_sample_count, out.multi_sample_count);
                return Err(Error::InvalidResource("Depth-stencil sample count does not match the color targets".to_string()));
            }
            out.depth = Some(PassAttachment { image: AttachmentImage::Renderbuffer(handle), view: image.view, format: image.vk_format });
            out.depth_format = *format;
            out.width = out.width.min(image.width);
            out.height = out.height.min(image.height);
        }

        if out.colors.len() > MAX_RENDERTARGET_BINDINGS {
            return Err(Error::InvalidResource(format!("{} color targets bound", out.colors.len())));
        }
        Ok(out)
    }

    fn fetch_render_pass(&mut self, key: &RenderPassHash) -> Result<vk::RenderPass> {
        if let Some(render_pass) = self.render_passes.fetch(key) {
            return Ok(render_pass);
        }
        let render_pass = create_render_pass(&self.ctx.device, key)?;
        self.render_passes.insert(*key, render_pass);
        engine_trace!("fna3d::vulkan", "Created render pass {:?}", key);
        Ok(render_pass)
    }

    fn fetch_framebuffer(&mut self, key: &FramebufferHash) -> Result<vk::Framebuffer> {
        if let Some(framebuffer) = self.framebuffers.fetch(key) {
            return Ok(framebuffer);
        }
        let framebuffer = create_framebuffer(&self.ctx.device, key)?;
        self.framebuffers.insert(*key, framebuffer);
        Ok(framebuffer)
    }

    /// Begin a pass over the current targets unless one is already valid
    pub(crate) fn begin_render_pass(&mut self) -> Result<()> {
        if self.active_pass.is_some() && !self.need_new_render_pass {
            return Ok(());
        }
        self.end_render_pass()?;

        let attachments = self.pass_attachments()?;
        let clear = self.pending_clear.take();
        let options = clear.map_or(ClearOptions::empty(), |clear| clear.options);
        let has_depth = attachments.depth.is_some();
        let clear_color = options.contains(ClearOptions::TARGET);
        let clear_depth = has_depth && options.contains(ClearOptions::DEPTH_BUFFER);
        let clear_stencil = has_depth && attachments.depth_format.has_stencil() && options.contains(ClearOptions::STENCIL);
        let preserve = self.preserve_next_pass;

        let command_buffer = self.record()?;
        for color in &attachments.colors {
            self.transition_image(command_buffer, color.image, ResourceAccessType::ColorAttachmentWrite, clear_color || !preserve);
        }
        for resolve in &attachments.resolves {
            self.transition_image(command_buffer, resolve.image, ResourceAccessType::ColorAttachmentWrite, true);
        }
        if let Some(depth) = attachments.depth {
            let fully_cleared = clear_depth && (clear_stencil || !attachments.depth_format.has_stencil());
            self.transition_image(command_buffer, depth.image, ResourceAccessType::DepthStencilAttachmentWrite, fully_cleared || !preserve);
        }

        let mut pass_key = RenderPassHash {
            color_count: attachments.colors.len() as u32,
            depth_stencil_format: attachments.depth.map_or(vk::Format::UNDEFINED, |depth| depth.format),
            clear_color,
            clear_depth,
            clear_stencil,
            preserve_target_contents: preserve,
            multi_sample_count: attachments.multi_sample_count,
            ..RenderPassHash::default()
        };
        for (slot, color) in attachments.colors.iter().enumerate() {
            pass_key.color_formats[slot] = color.format;
        }
        let render_pass = self.fetch_render_pass(&pass_key)?;

        let mut framebuffer_key = FramebufferHash {
            color_views: [vk::ImageView::null(); MAX_RENDERTARGET_BINDINGS],
            resolve_views: [vk::ImageView::null(); MAX_RENDERTARGET_BINDINGS],
            depth_stencil_view: attachments.depth.map_or(vk::ImageView::null(), |depth| depth.view),
            width: attachments.width,
            height: attachments.height,
            render_pass,
        };
        for (slot, color) in attachments.colors.iter().enumerate() {
            framebuffer_key.color_views[slot] = color.view;
        }
        for (slot, resolve) in attachments.resolves.iter().enumerate() {
            framebuffer_key.resolve_views[slot] = resolve.view;
        }
        let framebuffer = self.fetch_framebuffer(&framebuffer_key)?;

        // One value per attachment, in attachment order
        let (color, depth, stencil) = clear.map_or((Vec4::ZERO, 1.0, 0), |clear| (clear.color, clear.depth, clear.stencil));
        let color_value = vk::ClearValue { color: vk::ClearColorValue { float32: color.to_array() } };
        let mut clear_values = vec![color_value; attachments.colors.len() + attachments.resolves.len()];
        if has_depth {
            clear_values.push(vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue { depth, stencil: stencil as u32 },
            });
        }

        let begin_info = vk::RenderPassBeginInfo::default()
            .render_pass(render_pass)
            .framebuffer(framebuffer)
            .render_area(vk::Rect2D {
                offset: vk::Offset2D::default(),
                extent: vk::Extent2D { width: attachments.width, height: attachments.height },
            })
            .clear_values(&clear_values);
        unsafe {
            self.ctx.device.cmd_begin_render_pass(command_buffer, &begin_info, vk::SubpassContents::INLINE);
        }

        self.active_pass = Some(ActivePass {
            render_pass,
            color_count: attachments.colors.len() as u32,
            multi_sample_count: attachments.multi_sample_count,
            width: attachments.width,
            height: attachments.height,
            depth_format: attachments.depth_format,
        });
        self.need_new_render_pass = false;
        // Later passes over the same targets continue from this one
        self.preserve_next_pass = true;
        self.bound_pipeline = vk::Pipeline::null();
        self.apply_dynamic_state(command_buffer);
        Ok(())
    }

    pub(crate) fn end_render_pass(&mut self) -> Result<()> {
        if self.active_pass.take().is_none() {
            return Ok(());
        }
        let command_buffer = self.record()?;
        unsafe {
            if let Some(index) = self.active_query.take() {
                engine_debug!("fna3d::vulkan", "Occlusion query {} ended early with its render pass", index);
                self.ctx.device.cmd_end_query(command_buffer, self.query_pool, index);
            }
            self.ctx.device.cmd_end_render_pass(command_buffer);
        }
        self.need_new_render_pass = true;
        Ok(())
    }

    // ===== DYNAMIC STATE =====

    fn apply_dynamic_state(&self, command_buffer: vk::CommandBuffer) {
        let Some(pass) = self.active_pass else {
            return;
        };
        let device = &self.ctx.device;
        let scissor = if self.rasterizer_state.scissor_test_enable {
            clamp_scissor(self.scissor, pass.width, pass.height)
        } else {
            vk::Rect2D { offset: vk::Offset2D::default(), extent: vk::Extent2D { width: pass.width, height: pass.height } }
        };

        unsafe {
            if self.viewport.w > 0 && self.viewport.h > 0 {
                let viewport = vk::Viewport {
                    x: self.viewport.x as f32,
                    y: self.viewport.y as f32,
                    width: self.viewport.w as f32,
                    height: self.viewport.h as f32,
                    min_depth: self.viewport.min_depth,
                    max_depth: self.viewport.max_depth,
                };
                device.cmd_set_viewport(command_buffer, 0, &[viewport]);
            }
            device.cmd_set_scissor(command_buffer, 0, &[scissor]);
            device.cmd_set_blend_constants(command_buffer, &self.blend_factor.to_array());
            device.cmd_set_stencil_reference(command_buffer, vk::StencilFaceFlags::FRONT_AND_BACK, self.stencil_ref as u32);
            device.cmd_set_depth_bias(
                command_buffer,
                self.rasterizer_state.depth_bias * depth_bias_scale(pass.depth_format),
                0.0,
                self.rasterizer_state.slope_scale_depth_bias,
            );
        }
    }

    /// Re-record dynamic state after a setter changed it mid-pass
    pub(crate) fn refresh_dynamic_state(&mut self) {
        if self.active_pass.is_none() {
            return;
        }
        match self.record() {
            Ok(command_buffer) => self.apply_dynamic_state(command_buffer),
            Err(e) => engine_warn!("fna3d::vulkan", "Dynamic state update dropped: {}", e),
        }
    }

    // ===== RENDER TARGETS =====

    pub(crate) fn set_render_targets_impl(
        &mut self,
        targets: &[RenderTargetBinding],
        depth_stencil: Option<RenderbufferHandle>,
        depth_format: DepthFormat,
        preserve_target_contents: bool,
    ) -> Result<()> {
        if targets.len() > MAX_RENDERTARGET_BINDINGS {
            return Err(Error::InvalidResource(format!(
                "{} render targets bound, at most {} supported", targets.len(), MAX_RENDERTARGET_BINDINGS
            )));
        }

        // A clear queued for the old targets still applies to them
        self.flush_pending_clear()?;
        self.end_render_pass()?;

        let previous = std::mem::take(&mut self.targets);
        if !previous.colors.is_empty() {
            let command_buffer = self.record()?;
            for color in &previous.colors {
                self.transition_image(
                    command_buffer,
                    AttachmentImage::Texture(color.texture),
                    ResourceAccessType::FragmentShaderReadSampledImage,
                    false,
                );
            }
        }

        self.targets = TargetState {
            colors: targets
                .iter()
                .map(|target| ColorTarget {
                    texture: target.texture,
                    layer: match target.kind {
                        RenderTargetKind::Cube { face, .. } => face.index() as u32,
                        RenderTargetKind::TwoD { .. } => 0,
                    },
                    color_buffer: target.color_buffer,
                })
                .collect(),
            depth_stencil,
            depth_format: if depth_stencil.is_some() { depth_format } else { DepthFormat::None },
        };
        self.preserve_next_pass = preserve_target_contents;
        self.need_new_render_pass = true;
        Ok(())
    }

    /// Finish rendering into `target`: resolve happened at pass end, mips are generated here
    pub(crate) fn resolve_target_impl(&mut self, target: &RenderTargetBinding) -> Result<()> {
        self.flush_pending_clear()?;
        self.end_render_pass()?;
        if target.level_count > 1 {
            self.generate_mipmaps(target.texture)?;
        }
        Ok(())
    }

    /// Fill levels 1.. of every layer by successive linear blits
    fn generate_mipmaps(&mut self, handle: TextureHandle) -> Result<()> {
        let command_buffer = self.record()?;
        let texture = self.textures.get(handle).ok_or_else(|| Self::unknown("texture"))?;
        let (image, desc, prev) = (texture.image, texture.desc, texture.access);
        let layers = desc.dims.layer_count();
        let device = &self.ctx.device;

        let base = image_barrier(prev, ResourceAccessType::TransferRead, false);
        cmd_image_barrier(device, command_buffer, image, color_range(0, 1, 0, layers), &base);
        let rest = image_barrier(prev, ResourceAccessType::TransferWrite, true);
        cmd_image_barrier(device, command_buffer, image, color_range(1, desc.level_count - 1, 0, layers), &rest);

        let written = image_barrier(ResourceAccessType::TransferWrite, ResourceAccessType::TransferRead, false);
        for level in 1..desc.level_count {
            let src = desc.dims.mip_extent(level - 1);
            let dst = desc.dims.mip_extent(level);
            let subresource = |mip_level| vk::ImageSubresourceLayers {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                mip_level,
                base_array_layer: 0,
                layer_count: layers,
            };
            let blit = vk::ImageBlit {
                src_subresource: subresource(level - 1),
                src_offsets: [
                    vk::Offset3D::default(),
                    vk::Offset3D { x: src.width as i32, y: src.height as i32, z: src.depth as i32 },
                ],
                dst_subresource: subresource(level),
                dst_offsets: [
                    vk::Offset3D::default(),
                    vk::Offset3D { x: dst.width as i32, y: dst.height as i32, z: dst.depth as i32 },
                ],
            };
            unsafe {
                device.cmd_blit_image(
                    command_buffer,
                    image,
                    vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                    image,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    &[blit],
                    vk::Filter::LINEAR,
                );
            }
            // This level is the source of the next one
            cmd_image_barrier(device, command_buffer, image, color_range(level, 1, 0, layers), &written);
        }

        if let Some(texture) = self.textures.get_mut(handle) {
            texture.access = ResourceAccessType::TransferRead;
        }
        self.transition_image(command_buffer, AttachmentImage::Texture(handle), ResourceAccessType::FragmentShaderReadSampledImage, false);
        engine_trace!("fna3d::vulkan", "Generated {} mip levels", desc.level_count);
        Ok(())
    }
}

#[cfg(test)]
#[path = "vulkan_renderer_pass_tests.rs"]
mod tests;
