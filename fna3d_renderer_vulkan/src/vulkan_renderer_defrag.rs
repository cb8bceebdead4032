/// Memory defragmentation
///
/// Once an allocation has stayed fragmented for the configured cooldown, its
/// sub-buffers and textures are copied into fresh memory on an auxiliary
/// command buffer that runs after the frame. The old resources retire with the
/// current submission slot, which leaves the allocation empty for the next
/// sweep.

use ash::vk;
use fna3d::fna3d::render::TextureHandle;
use fna3d::fna3d::Result;
use fna3d::{engine_debug, engine_trace, engine_warn};

use crate::vulkan::VulkanRenderer;
use crate::vulkan_barrier::{buffer_barrier, image_barrier, ResourceAccessType};
use crate::vulkan_buffer::{BufferKind, SubBufferKey};
use crate::vulkan_dispatch::{BindTarget, DeviceDispatch};
use crate::vulkan_dispose::PendingDestroy;
use crate::vulkan_memory::ResourceOwner;
use crate::vulkan_renderer_pass::{cmd_image_barrier, AttachmentImage};
use crate::vulkan_renderer_texture::create_texture_resources;
use crate::vulkan_texture::TextureDesc;

/// One copy per mip level covering every layer
pub(crate) fn mip_copies(desc: &TextureDesc) -> Vec<vk::ImageCopy> {
    (0..desc.level_count)
        .map(|level| {
            let layers = vk::ImageSubresourceLayers {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                mip_level: level,
                base_array_layer: 0,
                layer_count: desc.dims.layer_count(),
            };
            vk::ImageCopy {
                src_subresource: layers,
                src_offset: vk::Offset3D::default(),
                dst_subresource: layers,
                dst_offset: vk::Offset3D::default(),
                extent: desc.dims.mip_extent(level),
            }
        })
        .collect()
}

impl VulkanRenderer {
    /// Called once per frame; moves at most one allocation
    pub(crate) fn defragment_memory(&mut self) -> Result<()> {
        if !self.allocator.tick_defrag_timer(self.config.defrag_cooldown_frames) {
            return Ok(());
        }
        let movable = |owner: &ResourceOwner| matches!(owner, ResourceOwner::SubBuffer(_) | ResourceOwner::Texture(_));
        let Some(allocation) = self.allocator.find_fragmented_allocation(movable) else {
            self.allocator.clear_defrag_request();
            return Ok(());
        };

        let regions = self.allocator.begin_defragment(allocation);
        engine_debug!("fna3d::vulkan::memory", "Defragmenting allocation with {} resources", regions.len());
        let command_buffer = self.scheduler.begin_auxiliary(&self.ctx)?;

        for key in regions {
            let Some(owner) = self.allocator.used_region(key).map(|region| region.owner) else {
                continue;
            };
            let moved = match owner {
                ResourceOwner::SubBuffer(sub_buffer) => self.move_sub_buffer(command_buffer, sub_buffer),
                ResourceOwner::Texture(texture) => self.move_texture(command_buffer, texture),
                _ => Ok(()),
            };
            // A failed move leaves the resource where it is; the allocation just stays alive
            if let Err(e) = moved {
                engine_warn!("fna3d::vulkan::memory", "Could not move {:?} during defrag: {}", owner, e);
            }
        }
        Ok(())
    }

    fn move_sub_buffer(&mut self, command_buffer: vk::CommandBuffer, key: SubBufferKey) -> Result<()> {
        let Some(old) = self.buffers.sub_buffer(key).copied() else {
            return Ok(());
        };
        let buffer = vk_try!("vkCreateBuffer", self.ctx.create_buffer(old.size.max(1), old.kind.usage_flags()));
        let region = match self.allocator.bind_memory_for_resource(
            &self.ctx,
            BindTarget::Buffer(buffer),
            old.size,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            false,
            ResourceOwner::SubBuffer(key),
        ) {
            Ok(region) => region,
            Err(e) => {
                self.ctx.destroy_buffer(buffer);
                return Err(e);
            }
        };

        let copy = vk::BufferCopy { src_offset: 0, dst_offset: 0, size: old.size.max(1) };
        let reader = match old.kind {
            BufferKind::Vertex => ResourceAccessType::VertexBuffer,
            BufferKind::Index => ResourceAccessType::IndexBuffer,
        };
        let plan = buffer_barrier(ResourceAccessType::TransferWrite, reader);
        unsafe {
            let device = &self.ctx.device;
            device.cmd_copy_buffer(command_buffer, old.buffer, buffer, &[copy]);
            device.cmd_pipeline_barrier(
                command_buffer,
                plan.src_stage,
                plan.dst_stage,
                vk::DependencyFlags::empty(),
                &[],
                &[plan.to_vk(buffer)],
                &[],
            );
        }

        let slot = self.scheduler.current_slot();
        if let Some(retired) = self.buffers.relocate(key, buffer, region, slot) {
            self.dispose_queue.push(slot, PendingDestroy::Buffer(retired));
        }
        engine_trace!("fna3d::vulkan::memory", "Moved {:?} ({} bytes)", key, old.size);
        Ok(())
    }

    fn move_texture(&mut self, command_buffer: vk::CommandBuffer, handle: TextureHandle) -> Result<()> {
        let Some(desc) = self.textures.get(handle).map(|texture| texture.desc) else {
            return Ok(());
        };
        let mut moved = create_texture_resources(&self.ctx, &mut self.allocator, ResourceOwner::Texture(handle), &desc)?;
        let had_contents = self.textures.get(handle).is_some_and(|texture| texture.access != ResourceAccessType::None);

        if had_contents {
            self.transition_image(command_buffer, AttachmentImage::Texture(handle), ResourceAccessType::TransferRead, false);
            let plan = image_barrier(ResourceAccessType::None, ResourceAccessType::TransferWrite, true);
            cmd_image_barrier(&self.ctx.device, command_buffer, moved.image, desc.full_range(), &plan);
            let old_image = self.textures.get(handle).map_or(vk::Image::null(), |texture| texture.image);
            unsafe {
                self.ctx.device.cmd_copy_image(
                    command_buffer,
                    old_image,
                    vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                    moved.image,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    &mip_copies(&desc),
                );
            }
            moved.access = ResourceAccessType::TransferWrite;
        }

        let Some(texture) = self.textures.get_mut(handle) else {
            return Ok(());
        };
        let old = std::mem::replace(texture, moved);
        let new_view = texture.view;
        for bound in self.fragment_samplers.iter_mut().chain(self.vertex_samplers.iter_mut()).flatten() {
            if bound.texture == handle {
                bound.binding.view = new_view;
            }
        }
        let views: Vec<vk::ImageView> = old.views().collect();
        self.forget_views(&views);
        let slot = self.scheduler.current_slot();
        self.dispose_queue.push(slot, PendingDestroy::Image { image: old.image, region: old.region, views });

        if had_contents {
            self.transition_image(
                command_buffer,
                AttachmentImage::Texture(handle),
                ResourceAccessType::FragmentShaderReadSampledImage,
                false,
            );
        }
        engine_trace!("fna3d::vulkan::memory", "Moved texture {:?} ({:?})", handle, desc.dims);
        Ok(())
    }
}

#[cfg(test)]
#[path = "vulkan_renderer_defrag_tests.rs"]
mod tests;
