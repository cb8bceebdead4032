/// Texture and renderbuffer records of the Vulkan driver
///
/// A texture owns one image, a sampling view and one render-target view per
/// layer when it is a render target. Renderbuffers are either a color
/// multisample buffer resolving into a texture or a depth-stencil buffer.

use ash::vk;
use fna3d::fna3d::render::{DepthFormat, SurfaceFormat, TextureHandle};

use crate::vulkan_barrier::ResourceAccessType;
use crate::vulkan_memory::UsedRegionKey;

/// Shape of a texture
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureDims {
    TwoD { width: u32, height: u32 },
    ThreeD { width: u32, height: u32, depth: u32 },
    Cube { size: u32 },
}

impl TextureDims {
    pub fn layer_count(self) -> u32 {
        match self {
            TextureDims::Cube { .. } => 6,
            _ => 1,
        }
    }

    /// Extent of mip `level`, never below one texel
    pub fn mip_extent(self, level: u32) -> vk::Extent3D {
        let shrink = |value: u32| value.checked_shr(level).unwrap_or(0).max(1);
        match self {
            TextureDims::TwoD { width, height } => vk::Extent3D { width: shrink(width), height: shrink(height), depth: 1 },
            TextureDims::ThreeD { width, height, depth } => {
                vk::Extent3D { width: shrink(width), height: shrink(height), depth: shrink(depth) }
            }
            TextureDims::Cube { size } => vk::Extent3D { width: shrink(size), height: shrink(size), depth: 1 },
        }
    }

    pub fn image_type(self) -> vk::ImageType {
        match self {
            TextureDims::ThreeD { .. } => vk::ImageType::TYPE_3D,
            _ => vk::ImageType::TYPE_2D,
        }
    }

    pub fn view_type(self) -> vk::ImageViewType {
        match self {
            TextureDims::TwoD { .. } => vk::ImageViewType::TYPE_2D,
            TextureDims::ThreeD { .. } => vk::ImageViewType::TYPE_3D,
            TextureDims::Cube { .. } => vk::ImageViewType::CUBE,
        }
    }

    pub fn create_flags(self) -> vk::ImageCreateFlags {
        match self {
            TextureDims::Cube { .. } => vk::ImageCreateFlags::CUBE_COMPATIBLE,
            _ => vk::ImageCreateFlags::empty(),
        }
    }
}

/// Everything needed to create (or recreate, when defragmenting) a texture image
#[derive(Debug, Clone, Copy)]
pub struct TextureDesc {
    pub dims: TextureDims,
    pub format: SurfaceFormat,
    pub vk_format: vk::Format,
    pub swizzle: vk::ComponentMapping,
    pub level_count: u32,
    pub is_render_target: bool,
}

impl TextureDesc {
    pub fn usage(&self) -> vk::ImageUsageFlags {
        let mut usage = vk::ImageUsageFlags::SAMPLED
            | vk::ImageUsageFlags::TRANSFER_SRC
            | vk::ImageUsageFlags::TRANSFER_DST;
        if self.is_render_target {
            usage |= vk::ImageUsageFlags::COLOR_ATTACHMENT;
        }
        usage
    }

    pub fn full_range(&self) -> vk::ImageSubresourceRange {
        color_range(0, self.level_count, 0, self.dims.layer_count())
    }

    pub fn image_create_info(&self) -> vk::ImageCreateInfo<'static> {
        vk::ImageCreateInfo::default()
            .flags(self.dims.create_flags())
            .image_type(self.dims.image_type())
            .format(self.vk_format)
            .extent(self.dims.mip_extent(0))
            .mip_levels(self.level_count)
            .array_layers(self.dims.layer_count())
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(self.usage())
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED)
    }
}

pub fn color_range(base_level: u32, level_count: u32, base_layer: u32, layer_count: u32) -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange {
        aspect_mask: vk::ImageAspectFlags::COLOR,
        base_mip_level: base_level,
        level_count,
        base_array_layer: base_layer,
        layer_count,
    }
}

/// Mip levels of a full chain down to 1x1
pub fn full_mip_chain(width: u32, height: u32) -> u32 {
    32 - width.max(height).max(1).leading_zeros()
}

/// Bytes of a `w` x `h` x `d` region of `format`
pub fn region_size(format: SurfaceFormat, w: u32, h: u32, d: u32) -> u64 {
    format.texture_size(w, h) as u64 * d.max(1) as u64
}

/// Staging offsets must be a multiple of both the texel block and 4 bytes
pub fn staging_alignment(format: SurfaceFormat) -> u64 {
    (format.texel_size() as u64).max(4)
}

/// Copy between a tightly packed staging range and one subresource region
#[allow(clippy::too_many_arguments)]
pub fn buffer_image_copy(
    buffer_offset: u64,
    x: u32,
    y: u32,
    z: u32,
    w: u32,
    h: u32,
    d: u32,
    level: u32,
    layer: u32,
) -> vk::BufferImageCopy {
    vk::BufferImageCopy {
        buffer_offset,
        buffer_row_length: 0,
        buffer_image_height: 0,
        image_subresource: vk::ImageSubresourceLayers {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            mip_level: level,
            base_array_layer: layer,
            layer_count: 1,
        },
        image_offset: vk::Offset3D { x: x as i32, y: y as i32, z: z as i32 },
        image_extent: vk::Extent3D { width: w, height: h, depth: d.max(1) },
    }
}

/// Byte offsets and lengths of the Y, U and V planes in one YUV upload
pub fn yuv_planes(y_width: u32, y_height: u32, uv_width: u32, uv_height: u32) -> [(usize, usize); 3] {
    let y_len = y_width as usize * y_height as usize;
    let uv_len = uv_width as usize * uv_height as usize;
    [(0, y_len), (y_len, uv_len), (y_len + uv_len, uv_len)]
}

pub struct VulkanTexture {
    pub image: vk::Image,
    /// `None` for imported images owned by someone else
    pub region: Option<UsedRegionKey>,
    pub view: vk::ImageView,
    /// One 2D view per layer (cube faces) for rendering
    pub rt_views: Vec<vk::ImageView>,
    pub desc: TextureDesc,
    pub access: ResourceAccessType,
    pub external: bool,
}

impl VulkanTexture {
    /// View to render into layer `layer`, falling back to the sampling view
    pub fn target_view(&self, layer: u32) -> vk::ImageView {
        self.rt_views.get(layer as usize).copied().unwrap_or(self.view)
    }

    /// Every view of the texture (sampling view first)
    pub fn views(&self) -> impl Iterator<Item = vk::ImageView> + '_ {
        std::iter::once(self.view).chain(self.rt_views.iter().copied())
    }
}

/// The image half shared by both renderbuffer kinds
pub struct RenderbufferImage {
    pub image: vk::Image,
    pub region: UsedRegionKey,
    pub view: vk::ImageView,
    pub vk_format: vk::Format,
    pub width: u32,
    pub height: u32,
    pub multi_sample_count: u32,
    pub access: ResourceAccessType,
}

pub enum VulkanRenderbuffer {
    /// Multisample color buffer resolving into `texture`
    Color {
        image: RenderbufferImage,
        format: SurfaceFormat,
        texture: TextureHandle,
    },
    DepthStencil {
        image: RenderbufferImage,
        format: DepthFormat,
    },
}

impl VulkanRenderbuffer {
    pub fn image(&self) -> &RenderbufferImage {
        match self {
            VulkanRenderbuffer::Color { image, .. } | VulkanRenderbuffer::DepthStencil { image, .. } => image,
        }
    }

    pub fn image_mut(&mut self) -> &mut RenderbufferImage {
        match self {
            VulkanRenderbuffer::Color { image, .. } | VulkanRenderbuffer::DepthStencil { image, .. } => image,
        }
    }

    pub fn aspect(&self) -> vk::ImageAspectFlags {
        match self {
            VulkanRenderbuffer::Color { .. } => vk::ImageAspectFlags::COLOR,
            VulkanRenderbuffer::DepthStencil { image, .. } => crate::vulkan_format::depth_aspect_flags(image.vk_format),
        }
    }

    pub fn range(&self) -> vk::ImageSubresourceRange {
        vk::ImageSubresourceRange {
            aspect_mask: self.aspect(),
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        }
    }
}

#[cfg(test)]
#[path = "vulkan_texture_tests.rs"]
mod tests;
