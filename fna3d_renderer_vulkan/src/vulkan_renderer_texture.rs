/// Texture and renderbuffer entry points
///
/// Uploads go through the staging buffers and are recorded into the current
/// command buffer; downloads flush and wait so the data can be read back.

use ash::vk;
use fna3d::fna3d::{Error, Result};
use fna3d::fna3d::render::{DepthFormat, RenderbufferHandle, SamplerState, SurfaceFormat, TextureAddressMode, TextureFilter, TextureHandle};
use fna3d::{engine_debug, engine_err, engine_trace, engine_warn};

use crate::vulkan::{DummyResources, VulkanRenderer, DUMMY_UNIFORM_BUFFER_SIZE};
use crate::vulkan_barrier::ResourceAccessType;
use crate::vulkan_context::GpuContext;
use crate::vulkan_descriptor_set::DummyBindings;
use crate::vulkan_dispatch::{BindTarget, DeviceDispatch, ImageSamplerBinding};
use crate::vulkan_dispose::PendingDestroy;
use crate::vulkan_format::{depth_aspect_flags, depth_format_to_vk, sample_count_to_vk, surface_format_swizzle, surface_format_to_vk};
use crate::vulkan_memory::{MemoryAllocator, ResourceOwner, UsedRegionKey};
use crate::vulkan_renderer_pass::AttachmentImage;
use crate::vulkan_staging::StagingSlice;
use crate::vulkan_texture::{
    buffer_image_copy, color_range, region_size, staging_alignment, yuv_planes, RenderbufferImage, TextureDesc,
    TextureDims, VulkanRenderbuffer, VulkanTexture,
};

/// Check a transfer region against the texture and return its byte size
pub(crate) fn validate_region(desc: &TextureDesc, origin: [u32; 3], extent: [u32; 3], level: u32, layer: u32) -> Result<u64> {
    if level >= desc.level_count {
        return Err(Error::InvalidResource(format!("Mip level {} of a {} level texture", level, desc.level_count)));
    }
    if layer >= desc.dims.layer_count() {
        return Err(Error::InvalidResource(format!("Layer {} of a {} layer texture", layer, desc.dims.layer_count())));
    }
    let mip = desc.dims.mip_extent(level);
    let limits = [mip.width, mip.height, mip.depth];
    for axis in 0..3 {
        if origin[axis].saturating_add(extent[axis]) > limits[axis] {
            return Err(Error::InvalidResource(format!(
                "Region {:?}+{:?} outside mip {} ({}x{}x{})",
                origin, extent, level, mip.width, mip.height, mip.depth
            )));
        }
    }
    Ok(region_size(desc.format, extent[0], extent[1], extent[2]))
}

fn create_texture_image(
    ctx: &GpuContext,
    allocator: &mut MemoryAllocator,
    owner: ResourceOwner,
    desc: &TextureDesc,
) -> Result<(vk::Image, UsedRegionKey)> {
    let image = vk_try!("vkCreateImage", unsafe { ctx.device.create_image(&desc.image_create_info(), None) });
    let size = ctx.memory_requirements(BindTarget::Image(image)).size;
    match allocator.bind_memory_for_resource(
        ctx,
        BindTarget::Image(image),
        size,
        vk::MemoryPropertyFlags::DEVICE_LOCAL,
        vk::MemoryPropertyFlags::empty(),
        false,
        owner,
    ) {
        Ok(region) => Ok((image, region)),
        Err(e) => {
            ctx.destroy_image(image);
            Err(e)
        }
    }
}

/// Sampling view with the format swizzle, plus one identity 2D view per layer for render targets
fn create_texture_views(device: &ash::Device, image: vk::Image, desc: &TextureDesc) -> Result<(vk::ImageView, Vec<vk::ImageView>)> {
    let info = vk::ImageViewCreateInfo::default()
        .image(image)
        .view_type(desc.dims.view_type())
        .format(desc.vk_format)
        .components(desc.swizzle)
        .subresource_range(desc.full_range());
    let view = vk_try!("vkCreateImageView", unsafe { device.create_image_view(&info, None) });

    let mut rt_views = Vec::new();
    if desc.is_render_target {
        for layer in 0..desc.dims.layer_count() {
            let info = vk::ImageViewCreateInfo::default()
                .image(image)
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(desc.vk_format)
                .subresource_range(color_range(0, 1, layer, 1));
            match unsafe { device.create_image_view(&info, None) } {
                Ok(rt_view) => rt_views.push(rt_view),
                Err(result) => {
                    unsafe {
                        for created in rt_views.into_iter().chain(std::iter::once(view)) {
                            device.destroy_image_view(created, None);
                        }
                    }
                    return Err(crate::vk_error("vkCreateImageView", result));
                }
            }
        }
    }
    Ok((view, rt_views))
}

/// Image, memory and views for `desc`; also used to move textures while defragmenting
pub(crate) fn create_texture_resources(
    ctx: &GpuContext,
    allocator: &mut MemoryAllocator,
    owner: ResourceOwner,
    desc: &TextureDesc,
) -> Result<VulkanTexture> {
    let (image, region) = create_texture_image(ctx, allocator, owner, desc)?;
    match create_texture_views(&ctx.device, image, desc) {
        Ok((view, rt_views)) => Ok(VulkanTexture {
            image,
            region: Some(region),
            view,
            rt_views,
            desc: *desc,
            access: ResourceAccessType::None,
            external: false,
        }),
        Err(e) => {
            ctx.destroy_image(image);
            allocator.free_resource_memory(region);
            Err(e)
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn create_renderbuffer_image(
    ctx: &GpuContext,
    allocator: &mut MemoryAllocator,
    owner: ResourceOwner,
    width: u32,
    height: u32,
    vk_format: vk::Format,
    multi_sample_count: u32,
    usage: vk::ImageUsageFlags,
    aspect: vk::ImageAspectFlags,
) -> Result<RenderbufferImage> {
    let info = vk::ImageCreateInfo::default()
        .image_type(vk::ImageType::TYPE_2D)
        .format(vk_format)
        .extent(vk::Extent3D { width, height, depth: 1 })
        .mip_levels(1)
        .array_layers(1)
        .samples(sample_count_to_vk(multi_sample_count))
        .tiling(vk::ImageTiling::OPTIMAL)
        .usage(usage)
        .sharing_mode(vk::SharingMode::EXCLUSIVE)
        .initial_layout(vk::ImageLayout::UNDEFINED);
    let image = vk_try!("vkCreateImage", unsafe { ctx.device.create_image(&info, None) });
    let size = ctx.memory_requirements(BindTarget::Image(image)).size;
    let region = match allocator.bind_memory_for_resource(
        ctx,
        BindTarget::Image(image),
        size,
        vk::MemoryPropertyFlags::DEVICE_LOCAL,
        vk::MemoryPropertyFlags::empty(),
        false,
        owner,
    ) {
        Ok(region) => region,
        Err(e) => {
            ctx.destroy_image(image);
            return Err(e);
        }
    };

    let view_info = vk::ImageViewCreateInfo::default()
        .image(image)
        .view_type(vk::ImageViewType::TYPE_2D)
        .format(vk_format)
        .subresource_range(vk::ImageSubresourceRange {
            aspect_mask: aspect,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        });
    let view = match unsafe { ctx.device.create_image_view(&view_info, None) } {
        Ok(view) => view,
        Err(result) => {
            ctx.destroy_image(image);
            allocator.free_resource_memory(region);
            return Err(crate::vk_error("vkCreateImageView", result));
        }
    };

    Ok(RenderbufferImage {
        image,
        region,
        view,
        vk_format,
        width,
        height,
        multi_sample_count,
        access: ResourceAccessType::None,
    })
}

impl VulkanRenderer {
    // ===== TEXTURES =====

    pub(crate) fn create_texture_2d_impl(
        &mut self,
        format: SurfaceFormat,
        width: u32,
        height: u32,
        level_count: u32,
        is_render_target: bool,
    ) -> Result<TextureHandle> {
        let dims = TextureDims::TwoD { width: width.max(1), height: height.max(1) };
        self.create_texture(dims, format, level_count, is_render_target)
    }

    pub(crate) fn create_texture_3d_impl(
        &mut self,
        format: SurfaceFormat,
        width: u32,
        height: u32,
        depth: u32,
        level_count: u32,
    ) -> Result<TextureHandle> {
        let dims = TextureDims::ThreeD { width: width.max(1), height: height.max(1), depth: depth.max(1) };
        self.create_texture(dims, format, level_count, false)
    }

    pub(crate) fn create_texture_cube_impl(
        &mut self,
        format: SurfaceFormat,
        size: u32,
        level_count: u32,
        is_render_target: bool,
    ) -> Result<TextureHandle> {
        self.create_texture(TextureDims::Cube { size: size.max(1) }, format, level_count, is_render_target)
    }

    fn create_texture(
        &mut self,
        dims: TextureDims,
        format: SurfaceFormat,
        level_count: u32,
        is_render_target: bool,
    ) -> Result<TextureHandle> {
        let desc = TextureDesc {
            dims,
            format,
            vk_format: surface_format_to_vk(format),
            swizzle: surface_format_swizzle(format),
            level_count: level_count.max(1),
            is_render_target,
        };
        let handle = self.textures.try_insert_with_key(|handle| {
            create_texture_resources(&self.ctx, &mut self.allocator, ResourceOwner::Texture(handle), &desc)
        })?;
        engine_trace!("fna3d::vulkan", "Created {:?} {:?} texture ({} levels)", dims, format, desc.level_count);
        Ok(handle)
    }

    pub(crate) fn dispose_texture(&mut self, handle: TextureHandle) {
        let Some(texture) = self.textures.remove(handle) else {
            engine_warn!("fna3d::vulkan", "Disposing unknown texture {:?}", handle);
            return;
        };
        for slot in self.fragment_samplers.iter_mut().chain(self.vertex_samplers.iter_mut()) {
            if slot.map_or(false, |bound| bound.texture == handle) {
                *slot = None;
            }
        }
        let views: Vec<vk::ImageView> = texture.views().collect();
        self.forget_views(&views);
        if texture.external {
            return;
        }
        let slot = self.scheduler.current_slot();
        self.dispose_queue.push(slot, PendingDestroy::Image { image: texture.image, region: texture.region, views });
    }

    /// Wrap an image created elsewhere; the caller keeps ownership and the shader-read layout
    pub(crate) fn import_texture(&mut self, image: vk::Image, view: vk::ImageView) -> Result<TextureHandle> {
        if image == vk::Image::null() || view == vk::ImageView::null() {
            return Err(Error::InvalidResource("Imported texture needs an image and a view".to_string()));
        }
        let format = SurfaceFormat::Color;
        let desc = TextureDesc {
            dims: TextureDims::TwoD { width: 1, height: 1 },
            format,
            vk_format: surface_format_to_vk(format),
            swizzle: surface_format_swizzle(format),
            level_count: 1,
            is_render_target: false,
        };
        let handle = self.textures.insert(VulkanTexture {
            image,
            region: None,
            view,
            rt_views: Vec::new(),
            desc,
            access: ResourceAccessType::FragmentShaderReadSampledImage,
            external: true,
        });
        engine_debug!("fna3d::vulkan", "Imported external image as {:?}", handle);
        Ok(handle)
    }

    // ===== TRANSFERS =====

    /// Staging space that no in-flight submission still reads from
    fn reserve_staging(&mut self, data: Option<&[u8]>, length: u64, alignment: u64) -> Result<StagingSlice> {
        let in_flight = self.staging.as_ref().and_then(|staging| staging.in_flight_slot());
        if let Some(slot) = in_flight {
            self.wait_for_slot(slot);
        }
        if let Some(slice) = self.try_reserve_staging(data, length, alignment)? {
            return Ok(slice);
        }

        // Out of room: everything staged so far must execute first
        self.flush_and_wait()?;
        if let Some(slice) = self.try_reserve_staging(data, length, alignment)? {
            return Ok(slice);
        }
        let staging = self.staging.as_mut().ok_or_else(|| engine_err!("fna3d::vulkan", "Staging buffers missing"))?;
        staging.grow(&self.ctx, &mut self.allocator, length + alignment)?;
        self.try_reserve_staging(data, length, alignment)?
            .ok_or_else(|| engine_err!("fna3d::vulkan", "Staging buffers cannot hold {} bytes", length))
    }

    fn try_reserve_staging(&mut self, data: Option<&[u8]>, length: u64, alignment: u64) -> Result<Option<StagingSlice>> {
        let staging = self.staging.as_mut().ok_or_else(|| engine_err!("fna3d::vulkan", "Staging buffers missing"))?;
        match data {
            Some(data) => staging.copy_to_staging(&self.allocator, data, length, alignment),
            None => Ok(staging.reserve(length, alignment)),
        }
    }

    /// Copy `data` into a region of one mip level and layer
    pub(crate) fn upload_texture(
        &mut self,
        handle: TextureHandle,
        origin: [u32; 3],
        extent: [u32; 3],
        level: u32,
        layer: u32,
        data: &[u8],
    ) -> Result<()> {
        let texture = self.textures.get(handle).ok_or_else(|| Self::unknown("texture"))?;
        if texture.external {
            return Err(Error::InvalidResource("Imported textures are read-only".to_string()));
        }
        let (image, desc) = (texture.image, texture.desc);
        let length = validate_region(&desc, origin, extent, level, layer)?;
        if length == 0 {
            return Ok(());
        }
        if (data.len() as u64) < length {
            return Err(Error::InvalidResource(format!("Texture upload needs {} bytes, got {}", length, data.len())));
        }

        let slice = self.reserve_staging(Some(&data[..length as usize]), length, staging_alignment(desc.format))?;
        self.end_render_pass()?;
        let command_buffer = self.record()?;
        self.transition_image(command_buffer, AttachmentImage::Texture(handle), ResourceAccessType::TransferWrite, false);
        let [x, y, z] = origin;
        let [w, h, d] = extent;
        let copy = buffer_image_copy(slice.offset, x, y, z, w, h, d, level, layer);
        unsafe {
            self.ctx.device.cmd_copy_buffer_to_image(
                command_buffer,
                slice.buffer,
                image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[copy],
            );
        }
        self.transition_image(
            command_buffer,
            AttachmentImage::Texture(handle),
            ResourceAccessType::FragmentShaderReadSampledImage,
            false,
        );
        Ok(())
    }

    /// Upload the three planes of a YUV frame laid out back to back in `data`
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn upload_yuv(
        &mut self,
        y: TextureHandle,
        u: TextureHandle,
        v: TextureHandle,
        y_width: u32,
        y_height: u32,
        uv_width: u32,
        uv_height: u32,
        data: &[u8],
    ) -> Result<()> {
        let planes = yuv_planes(y_width, y_height, uv_width, uv_height);
        let needed = planes[2].0 + planes[2].1;
        if data.len() < needed {
            return Err(Error::InvalidResource(format!("YUV upload needs {} bytes, got {}", needed, data.len())));
        }
        let sizes = [(y_width, y_height), (uv_width, uv_height), (uv_width, uv_height)];
        for ((handle, (offset, length)), (width, height)) in [y, u, v].into_iter().zip(planes).zip(sizes) {
            self.upload_texture(handle, [0, 0, 0], [width, height, 1], 0, 0, &data[offset..offset + length])?;
        }
        Ok(())
    }

    /// Read a region back; stalls until the GPU executed everything recorded so far
    pub(crate) fn download_texture(
        &mut self,
        handle: TextureHandle,
        origin: [u32; 3],
        extent: [u32; 3],
        level: u32,
        layer: u32,
        out: &mut [u8],
    ) -> Result<()> {
        let texture = self.textures.get(handle).ok_or_else(|| Self::unknown("texture"))?;
        let (image, desc) = (texture.image, texture.desc);
        let length = validate_region(&desc, origin, extent, level, layer)?;
        if length == 0 {
            return Ok(());
        }
        if (out.len() as u64) < length {
            return Err(Error::InvalidResource(format!("Texture download needs {} bytes, got {}", length, out.len())));
        }

        self.flush_pending_clear()?;
        let slice = self.reserve_staging(None, length, staging_alignment(desc.format))?;
        self.end_render_pass()?;
        let command_buffer = self.record()?;
        self.transition_image(command_buffer, AttachmentImage::Texture(handle), ResourceAccessType::TransferRead, false);
        let [x, y, z] = origin;
        let [w, h, d] = extent;
        let copy = buffer_image_copy(slice.offset, x, y, z, w, h, d, level, layer);
        let host_read = vk::MemoryBarrier::default()
            .src_access_mask(vk::AccessFlags::TRANSFER_WRITE)
            .dst_access_mask(vk::AccessFlags::HOST_READ);
        unsafe {
            let device = &self.ctx.device;
            device.cmd_copy_image_to_buffer(command_buffer, image, vk::ImageLayout::TRANSFER_SRC_OPTIMAL, slice.buffer, &[copy]);
            device.cmd_pipeline_barrier(
                command_buffer,
                vk::PipelineStageFlags::TRANSFER,
                vk::PipelineStageFlags::HOST,
                vk::DependencyFlags::empty(),
                &[host_read],
                &[],
                &[],
            );
        }
        self.flush_and_wait()?;

        let staging = self.staging.as_ref().ok_or_else(|| engine_err!("fna3d::vulkan", "Staging buffers missing"))?;
        staging.read(&self.allocator, &slice, &mut out[..length as usize])
    }

    // ===== RENDERBUFFERS =====

    /// Multisample color buffer resolving into `texture`
    pub(crate) fn create_color_renderbuffer(
        &mut self,
        width: u32,
        height: u32,
        format: SurfaceFormat,
        multi_sample_count: u32,
        texture: TextureHandle,
    ) -> Result<RenderbufferHandle> {
        if !self.textures.contains_key(texture) {
            return Err(Self::unknown("texture"));
        }
        let samples = self.supported_sample_count(multi_sample_count);
        let vk_format = surface_format_to_vk(format);
        let handle = self.renderbuffers.try_insert_with_key(|handle| {
            let image = create_renderbuffer_image(
                &self.ctx,
                &mut self.allocator,
                ResourceOwner::Renderbuffer(handle),
                width.max(1),
                height.max(1),
                vk_format,
                samples,
                vk::ImageUsageFlags::COLOR_ATTACHMENT,
                vk::ImageAspectFlags::COLOR,
            )?;
            Ok::<_, Error>(VulkanRenderbuffer::Color { image, format, texture })
        })?;
        engine_trace!("fna3d::vulkan", "Created {}x{} color renderbuffer ({}x MSAA)", width, height, samples);
        Ok(handle)
    }

    pub(crate) fn create_depth_renderbuffer(
        &mut self,
        width: u32,
        height: u32,
        format: DepthFormat,
        multi_sample_count: u32,
    ) -> Result<RenderbufferHandle> {
        if format == DepthFormat::None {
            return Err(Error::InvalidResource("Depth renderbuffer without a depth format".to_string()));
        }
        let samples = self.supported_sample_count(multi_sample_count);
        let vk_format = depth_format_to_vk(format, self.ctx.features.depth);
        let handle = self.renderbuffers.try_insert_with_key(|handle| {
            let image = create_renderbuffer_image(
                &self.ctx,
                &mut self.allocator,
                ResourceOwner::Renderbuffer(handle),
                width.max(1),
                height.max(1),
                vk_format,
                samples,
                vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
                depth_aspect_flags(vk_format),
            )?;
            Ok::<_, Error>(VulkanRenderbuffer::DepthStencil { image, format })
        })?;
        engine_trace!("fna3d::vulkan", "Created {}x{} {:?} renderbuffer ({}x MSAA)", width, height, vk_format, samples);
        Ok(handle)
    }

    pub(crate) fn dispose_renderbuffer(&mut self, handle: RenderbufferHandle) {
        let Some(renderbuffer) = self.renderbuffers.remove(handle) else {
            engine_warn!("fna3d::vulkan", "Disposing unknown renderbuffer {:?}", handle);
            return;
        };
        let image = renderbuffer.image();
        self.forget_views(&[image.view]);
        let slot = self.scheduler.current_slot();
        self.dispose_queue.push(
            slot,
            PendingDestroy::Image { image: image.image, region: Some(image.region), views: vec![image.view] },
        );
    }

    // ===== DUMMY RESOURCES =====

    /// Black 1x1 textures and a zeroed uniform block for unbound slots
    pub(crate) fn create_dummy_resources(&mut self) -> Result<()> {
        let texture_2d = self.create_texture_2d_impl(SurfaceFormat::Color, 1, 1, 1, false)?;
        let texture_3d = self.create_texture_3d_impl(SurfaceFormat::Color, 1, 1, 1, 1)?;
        let texture_cube = self.create_texture_cube_impl(SurfaceFormat::Color, 1, 1, false)?;
        let black = [0u8; 4];
        self.upload_texture(texture_2d, [0, 0, 0], [1, 1, 1], 0, 0, &black)?;
        self.upload_texture(texture_3d, [0, 0, 0], [1, 1, 1], 0, 0, &black)?;
        for face in 0..6 {
            self.upload_texture(texture_cube, [0, 0, 0], [1, 1, 1], 0, face, &black)?;
        }

        let sampler = self.fetch_sampler(&SamplerState {
            filter: TextureFilter::Point,
            address_u: TextureAddressMode::Clamp,
            address_v: TextureAddressMode::Clamp,
            address_w: TextureAddressMode::Clamp,
            ..SamplerState::default()
        })?;
        let binding = |renderer: &Self, handle: TextureHandle| ImageSamplerBinding {
            view: renderer.textures.get(handle).map_or(vk::ImageView::null(), |texture| texture.view),
            sampler,
        };
        let bindings = DummyBindings {
            two_d: binding(&*self, texture_2d),
            three_d: binding(&*self, texture_3d),
            cube: binding(&*self, texture_cube),
        };

        let uniform_buffer = vk_try!(
            "vkCreateBuffer",
            self.ctx.create_buffer(DUMMY_UNIFORM_BUFFER_SIZE, vk::BufferUsageFlags::UNIFORM_BUFFER)
        );
        let region = match self.allocator.bind_memory_for_resource(
            &self.ctx,
            BindTarget::Buffer(uniform_buffer),
            DUMMY_UNIFORM_BUFFER_SIZE,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            vk::MemoryPropertyFlags::empty(),
            false,
            ResourceOwner::Internal,
        ) {
            Ok(region) => region,
            Err(e) => {
                self.ctx.destroy_buffer(uniform_buffer);
                return Err(e);
            }
        };
        self.dummies = DummyResources {
            texture_2d,
            texture_3d,
            texture_cube,
            bindings,
            uniform_buffer,
            uniform_region: Some(region),
        };
        self.allocator.write_mapped(region, 0, &[0u8; DUMMY_UNIFORM_BUFFER_SIZE as usize])?;
        self.ctx.set_object_name(uniform_buffer, "Dummy uniform buffer");
        engine_debug!("fna3d::vulkan", "Dummy textures and uniform buffer created");
        Ok(())
    }
}

#[cfg(test)]
#[path = "vulkan_renderer_texture_tests.rs"]
mod tests;
