/// Resource access types and barrier computation
///
/// Each resource remembers the last way it was accessed. A transition from one
/// access type to the next yields the stage masks, access masks and image
/// layouts of the pipeline barrier to record.

use ash::vk;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ResourceAccessType {
    #[default]
    None,

    // Reads
    IndexBuffer,
    VertexBuffer,
    VertexShaderReadUniformBuffer,
    VertexShaderReadSampledImage,
    FragmentShaderReadUniformBuffer,
    FragmentShaderReadSampledImage,
    FragmentShaderReadColorInputAttachment,
    FragmentShaderReadDepthStencilInputAttachment,
    ColorAttachmentRead,
    DepthStencilAttachmentRead,
    TransferRead,
    HostRead,
    Present,

    // Writes
    ColorAttachmentWrite,
    DepthStencilAttachmentWrite,
    TransferWrite,
    HostWrite,
    ColorAttachmentReadWrite,
    General,
}

/// Stage, access and layout implied by an access type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessInfo {
    pub stage_mask: vk::PipelineStageFlags,
    pub access_mask: vk::AccessFlags,
    pub image_layout: vk::ImageLayout,
}

impl ResourceAccessType {
    pub fn info(self) -> AccessInfo {
        use vk::AccessFlags as A;
        use vk::ImageLayout as L;
        use vk::PipelineStageFlags as S;

        let fragment_tests = S::EARLY_FRAGMENT_TESTS | S::LATE_FRAGMENT_TESTS;
        let (stage_mask, access_mask, image_layout) = match self {
            ResourceAccessType::None => (S::empty(), A::empty(), L::UNDEFINED),
            ResourceAccessType::IndexBuffer => (S::VERTEX_INPUT, A::INDEX_READ, L::UNDEFINED),
            ResourceAccessType::VertexBuffer => (S::VERTEX_INPUT, A::VERTEX_ATTRIBUTE_READ, L::UNDEFINED),
            ResourceAccessType::VertexShaderReadUniformBuffer => (S::VERTEX_SHADER, A::SHADER_READ, L::UNDEFINED),
            ResourceAccessType::VertexShaderReadSampledImage => {
                (S::VERTEX_SHADER, A::SHADER_READ, L::SHADER_READ_ONLY_OPTIMAL)
            }
            ResourceAccessType::FragmentShaderReadUniformBuffer => (S::FRAGMENT_SHADER, A::UNIFORM_READ, L::UNDEFINED),
            ResourceAccessType::FragmentShaderReadSampledImage => {
                (S::FRAGMENT_SHADER, A::SHADER_READ, L::SHADER_READ_ONLY_OPTIMAL)
            }
            ResourceAccessType::FragmentShaderReadColorInputAttachment => {
                (S::FRAGMENT_SHADER, A::INPUT_ATTACHMENT_READ, L::SHADER_READ_ONLY_OPTIMAL)
            }
            ResourceAccessType::FragmentShaderReadDepthStencilInputAttachment => {
                (S::FRAGMENT_SHADER, A::INPUT_ATTACHMENT_READ, L::DEPTH_STENCIL_READ_ONLY_OPTIMAL)
            }
            ResourceAccessType::ColorAttachmentRead => {
                (S::COLOR_ATTACHMENT_OUTPUT, A::COLOR_ATTACHMENT_READ, L::COLOR_ATTACHMENT_OPTIMAL)
            }
            ResourceAccessType::DepthStencilAttachmentRead => {
                (fragment_tests, A::DEPTH_STENCIL_ATTACHMENT_READ, L::DEPTH_STENCIL_READ_ONLY_OPTIMAL)
            }
            ResourceAccessType::TransferRead => (S::TRANSFER, A::TRANSFER_READ, L::TRANSFER_SRC_OPTIMAL),
            ResourceAccessType::HostRead => (S::HOST, A::HOST_READ, L::GENERAL),
            ResourceAccessType::Present => (S::empty(), A::empty(), L::PRESENT_SRC_KHR),
            ResourceAccessType::ColorAttachmentWrite => {
                (S::COLOR_ATTACHMENT_OUTPUT, A::COLOR_ATTACHMENT_WRITE, L::COLOR_ATTACHMENT_OPTIMAL)
            }
            ResourceAccessType::DepthStencilAttachmentWrite => {
                (fragment_tests, A::DEPTH_STENCIL_ATTACHMENT_WRITE, L::DEPTH_STENCIL_ATTACHMENT_OPTIMAL)
            }
            ResourceAccessType::TransferWrite => (S::TRANSFER, A::TRANSFER_WRITE, L::TRANSFER_DST_OPTIMAL),
            ResourceAccessType::HostWrite => (S::HOST, A::HOST_WRITE, L::GENERAL),
            ResourceAccessType::ColorAttachmentReadWrite => (
                S::COLOR_ATTACHMENT_OUTPUT,
                A::COLOR_ATTACHMENT_READ | A::COLOR_ATTACHMENT_WRITE,
                L::COLOR_ATTACHMENT_OPTIMAL,
            ),
            ResourceAccessType::General => (S::ALL_COMMANDS, A::MEMORY_READ | A::MEMORY_WRITE, L::GENERAL),
        };
        AccessInfo { stage_mask, access_mask, image_layout }
    }

    pub fn is_write(self) -> bool {
        matches!(
            self,
            ResourceAccessType::ColorAttachmentWrite
                | ResourceAccessType::DepthStencilAttachmentWrite
                | ResourceAccessType::TransferWrite
                | ResourceAccessType::HostWrite
                | ResourceAccessType::ColorAttachmentReadWrite
                | ResourceAccessType::General
        )
    }
}

/// Parameters of one image memory barrier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageBarrierPlan {
    pub src_stage: vk::PipelineStageFlags,
    pub dst_stage: vk::PipelineStageFlags,
    pub src_access: vk::AccessFlags,
    pub dst_access: vk::AccessFlags,
    pub old_layout: vk::ImageLayout,
    pub new_layout: vk::ImageLayout,
}

impl ImageBarrierPlan {
    pub fn to_vk(&self, image: vk::Image, range: vk::ImageSubresourceRange) -> vk::ImageMemoryBarrier<'static> {
        vk::ImageMemoryBarrier::default()
            .src_access_mask(self.src_access)
            .dst_access_mask(self.dst_access)
            .old_layout(self.old_layout)
            .new_layout(self.new_layout)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(image)
            .subresource_range(range)
    }
}

/// Parameters of one buffer memory barrier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferBarrierPlan {
    pub src_stage: vk::PipelineStageFlags,
    pub dst_stage: vk::PipelineStageFlags,
    pub src_access: vk::AccessFlags,
    pub dst_access: vk::AccessFlags,
}

impl BufferBarrierPlan {
    pub fn to_vk(&self, buffer: vk::Buffer) -> vk::BufferMemoryBarrier<'static> {
        vk::BufferMemoryBarrier::default()
            .src_access_mask(self.src_access)
            .dst_access_mask(self.dst_access)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .buffer(buffer)
            .offset(0)
            .size(vk::WHOLE_SIZE)
    }
}

/// Source/destination masks shared by image and buffer barriers
///
/// Only a previous write makes memory available; reads need execution
/// ordering alone. Empty stage masks become TOP/BOTTOM_OF_PIPE.
fn masks(
    prev: ResourceAccessType,
    next: ResourceAccessType,
) -> (vk::PipelineStageFlags, vk::PipelineStageFlags, vk::AccessFlags, vk::AccessFlags) {
    let prev_info = prev.info();
    let next_info = next.info();

    let mut src_stage = prev_info.stage_mask;
    let src_access = if prev.is_write() { prev_info.access_mask } else { vk::AccessFlags::empty() };

    let mut dst_stage = next_info.stage_mask;
    let dst_access = if src_access.is_empty() { vk::AccessFlags::empty() } else { next_info.access_mask };

    if src_stage.is_empty() {
        src_stage = vk::PipelineStageFlags::TOP_OF_PIPE;
    }
    if dst_stage.is_empty() {
        dst_stage = vk::PipelineStageFlags::BOTTOM_OF_PIPE;
    }
    (src_stage, dst_stage, src_access, dst_access)
}

/// Barrier for an image moving from `prev` to `next`
///
/// With `discard_contents` the old layout is UNDEFINED, letting the driver
/// drop the previous contents.
pub fn image_barrier(prev: ResourceAccessType, next: ResourceAccessType, discard_contents: bool) -> ImageBarrierPlan {
    let (src_stage, dst_stage, src_access, dst_access) = masks(prev, next);
    ImageBarrierPlan {
        src_stage,
        dst_stage,
        src_access,
        dst_access,
        old_layout: if discard_contents { vk::ImageLayout::UNDEFINED } else { prev.info().image_layout },
        new_layout: next.info().image_layout,
    }
}

pub fn buffer_barrier(prev: ResourceAccessType, next: ResourceAccessType) -> BufferBarrierPlan {
    let (src_stage, dst_stage, src_access, dst_access) = masks(prev, next);
    BufferBarrierPlan { src_stage, dst_stage, src_access, dst_access }
}

/// Whether moving from `prev` to `next` needs a barrier at all
///
/// Repeated reads in the same layout do not; anything involving a write does.
pub fn needs_barrier(prev: ResourceAccessType, next: ResourceAccessType) -> bool {
    prev != next || prev.is_write()
}

#[cfg(test)]
#[path = "vulkan_barrier_tests.rs"]
mod tests;
