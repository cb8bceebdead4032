/// Render pass, framebuffer, pipeline, layout and sampler construction
///
/// Everything here turns a cache key (or the render state a key was packed
/// from) into the Vulkan object it stands for. The create-info builders are
/// pure so the mapping can be tested without a device; the `create_*`
/// functions only add the device call.

use std::ffi::CString;
use ash::vk;
use fna3d::fna3d::Result;
use fna3d::fna3d::render::{
    BlendState, ColorWriteChannels, DepthStencilState, PrimitiveType, RasterizerState, SamplerState,
    TextureFilter,
};

use crate::vulkan_cache::{DescriptorSetLayoutHash, FramebufferHash, RenderPassHash};
use crate::vulkan_format::{
    blend_function_to_vk, blend_to_vk, color_write_to_vk, compare_to_vk, cull_mode_to_vk, depth_aspect_flags,
    fill_mode_to_vk, primitive_type_to_vk, sample_count_to_vk, stencil_op_to_vk, address_mode_to_vk,
    texture_filter_to_vk,
};
use crate::vulkan_vertex_layout::VertexInputLayout;

/// States every pipeline leaves dynamic; re-applied after each render pass begins
pub const DYNAMIC_STATES: [vk::DynamicState; 5] = [
    vk::DynamicState::VIEWPORT,
    vk::DynamicState::SCISSOR,
    vk::DynamicState::BLEND_CONSTANTS,
    vk::DynamicState::STENCIL_REFERENCE,
    vk::DynamicState::DEPTH_BIAS,
];

/// Descriptor sets of every pipeline layout, in set-index order
pub const SET_VERTEX_SAMPLERS: u32 = 0;
pub const SET_FRAGMENT_SAMPLERS: u32 = 1;
pub const SET_VERTEX_UNIFORMS: u32 = 2;
pub const SET_FRAGMENT_UNIFORMS: u32 = 3;

// ============================================================================
// RENDER PASS
// ============================================================================

fn load_op(clear: bool, preserve: bool) -> vk::AttachmentLoadOp {
    if clear {
        vk::AttachmentLoadOp::CLEAR
    } else if preserve {
        vk::AttachmentLoadOp::LOAD
    } else {
        vk::AttachmentLoadOp::DONT_CARE
    }
}

/// Attachment descriptions in framebuffer order: colors, resolves, depth-stencil
pub fn render_pass_attachments(key: &RenderPassHash) -> Vec<vk::AttachmentDescription> {
    let samples = sample_count_to_vk(key.multi_sample_count);
    let multisampled = samples != vk::SampleCountFlags::TYPE_1;
    let color_count = key.color_count as usize;
    let mut attachments = Vec::with_capacity(color_count * 2 + 1);

    for &format in &key.color_formats[..color_count] {
        attachments.push(
            vk::AttachmentDescription::default()
                .format(format)
                .samples(samples)
                .load_op(load_op(key.clear_color, key.preserve_target_contents))
                .store_op(vk::AttachmentStoreOp::STORE)
                .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
                .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
                .initial_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
                .final_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL),
        );
    }

    if multisampled {
        for &format in &key.color_formats[..color_count] {
            attachments.push(
                vk::AttachmentDescription::default()
                    .format(format)
                    .samples(vk::SampleCountFlags::TYPE_1)
                    .load_op(vk::AttachmentLoadOp::DONT_CARE)
                    .store_op(vk::AttachmentStoreOp::STORE)
                    .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
                    .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
                    .initial_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
                    .final_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL),
            );
        }
    }

    if key.depth_stencil_format != vk::Format::UNDEFINED {
        let has_stencil = depth_aspect_flags(key.depth_stencil_format).contains(vk::ImageAspectFlags::STENCIL);
        let (stencil_load, stencil_store) = if has_stencil {
            (load_op(key.clear_stencil, key.preserve_target_contents), vk::AttachmentStoreOp::STORE)
        } else {
            (vk::AttachmentLoadOp::DONT_CARE, vk::AttachmentStoreOp::DONT_CARE)
        };
        attachments.push(
            vk::AttachmentDescription::default()
                .format(key.depth_stencil_format)
                .samples(samples)
                .load_op(load_op(key.clear_depth, key.preserve_target_contents))
                .store_op(vk::AttachmentStoreOp::STORE)
                .stencil_load_op(stencil_load)
                .stencil_store_op(stencil_store)
                .initial_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL)
                .final_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL),
        );
    }

    attachments
}

pub fn create_render_pass(device: &ash::Device, key: &RenderPassHash) -> Result<vk::RenderPass> {
    let attachments = render_pass_attachments(key);
    let color_count = key.color_count;
    let multisampled = sample_count_to_vk(key.multi_sample_count) != vk::SampleCountFlags::TYPE_1;

    let color_refs: Vec<vk::AttachmentReference> = (0..color_count)
        .map(|index| vk::AttachmentReference { attachment: index, layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL })
        .collect();
    let resolve_refs: Vec<vk::AttachmentReference> = if multisampled {
        (0..color_count)
            .map(|index| vk::AttachmentReference {
                attachment: color_count + index,
                layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            })
            .collect()
    } else {
        Vec::new()
    };
    let depth_ref = vk::AttachmentReference {
        attachment: attachments.len() as u32 - 1,
        layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
    };

    let mut subpass = vk::SubpassDescription::default()
        .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
        .color_attachments(&color_refs);
    if !resolve_refs.is_empty() {
        subpass = subpass.resolve_attachments(&resolve_refs);
    }
    if key.depth_stencil_format != vk::Format::UNDEFINED {
        subpass = subpass.depth_stencil_attachment(&depth_ref);
    }

    let info = vk::RenderPassCreateInfo::default()
        .attachments(&attachments)
        .subpasses(std::slice::from_ref(&subpass));

    Ok(vk_try!("vkCreateRenderPass", unsafe { device.create_render_pass(&info, None) }))
}

// ============================================================================
// FRAMEBUFFER
// ============================================================================

/// Views in the attachment order of `render_pass_attachments`
pub fn framebuffer_attachments(key: &FramebufferHash) -> Vec<vk::ImageView> {
    key.color_views
        .iter()
        .chain(key.resolve_views.iter())
        .copied()
        .filter(|view| *view != vk::ImageView::null())
        .chain((key.depth_stencil_view != vk::ImageView::null()).then_some(key.depth_stencil_view))
        .collect()
}

pub fn create_framebuffer(device: &ash::Device, key: &FramebufferHash) -> Result<vk::Framebuffer> {
    let attachments = framebuffer_attachments(key);
    let info = vk::FramebufferCreateInfo::default()
        .render_pass(key.render_pass)
        .attachments(&attachments)
        .width(key.width)
        .height(key.height)
        .layers(1);

    Ok(vk_try!("vkCreateFramebuffer", unsafe { device.create_framebuffer(&info, None) }))
}

// ============================================================================
// LAYOUTS
// ============================================================================

pub fn create_descriptor_set_layout(device: &ash::Device, key: &DescriptorSetLayoutHash) -> Result<vk::DescriptorSetLayout> {
    let bindings: Vec<vk::DescriptorSetLayoutBinding> = (0..key.binding_count)
        .map(|binding| {
            vk::DescriptorSetLayoutBinding::default()
                .binding(binding)
                .descriptor_type(key.descriptor_type)
                .descriptor_count(1)
                .stage_flags(key.stage)
        })
        .collect();
    let info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&bindings);

    Ok(vk_try!("vkCreateDescriptorSetLayout", unsafe { device.create_descriptor_set_layout(&info, None) }))
}

/// Layout over the four sets (vertex samplers, fragment samplers, vertex uniforms, fragment uniforms)
pub fn create_pipeline_layout(device: &ash::Device, set_layouts: &[vk::DescriptorSetLayout; 4]) -> Result<vk::PipelineLayout> {
    let info = vk::PipelineLayoutCreateInfo::default().set_layouts(set_layouts);
    Ok(vk_try!("vkCreatePipelineLayout", unsafe { device.create_pipeline_layout(&info, None) }))
}

// ============================================================================
// PIPELINE STATE
// ============================================================================

/// Blend attachment `index`; attachments 1..3 use their own write masks
pub fn color_blend_attachment(state: &BlendState, index: usize) -> vk::PipelineColorBlendAttachmentState {
    let write_mask = match index {
        0 => state.color_write_enable,
        1 => state.color_write_enable1,
        2 => state.color_write_enable2,
        3 => state.color_write_enable3,
        _ => ColorWriteChannels::ALL,
    };
    vk::PipelineColorBlendAttachmentState {
        blend_enable: state.is_blending() as vk::Bool32,
        src_color_blend_factor: blend_to_vk(state.color_source_blend),
        dst_color_blend_factor: blend_to_vk(state.color_destination_blend),
        color_blend_op: blend_function_to_vk(state.color_blend_function),
        src_alpha_blend_factor: blend_to_vk(state.alpha_source_blend),
        dst_alpha_blend_factor: blend_to_vk(state.alpha_destination_blend),
        alpha_blend_op: blend_function_to_vk(state.alpha_blend_function),
        color_write_mask: color_write_to_vk(write_mask),
    }
}

/// (front, back) stencil states; the back face mirrors the front unless two-sided
pub fn stencil_op_states(state: &DepthStencilState) -> (vk::StencilOpState, vk::StencilOpState) {
    let front = vk::StencilOpState {
        fail_op: stencil_op_to_vk(state.stencil_fail),
        pass_op: stencil_op_to_vk(state.stencil_pass),
        depth_fail_op: stencil_op_to_vk(state.stencil_depth_buffer_fail),
        compare_op: compare_to_vk(state.stencil_function),
        compare_mask: state.stencil_mask as u32,
        write_mask: state.stencil_write_mask as u32,
        reference: 0,
    };
    let back = if state.two_sided_stencil_mode {
        vk::StencilOpState {
            fail_op: stencil_op_to_vk(state.ccw_stencil_fail),
            pass_op: stencil_op_to_vk(state.ccw_stencil_pass),
            depth_fail_op: stencil_op_to_vk(state.ccw_stencil_depth_buffer_fail),
            compare_op: compare_to_vk(state.ccw_stencil_function),
            ..front
        }
    } else {
        front
    };
    (front, back)
}

pub fn depth_stencil_info(state: &DepthStencilState) -> vk::PipelineDepthStencilStateCreateInfo<'static> {
    let (front, back) = stencil_op_states(state);
    vk::PipelineDepthStencilStateCreateInfo::default()
        .depth_test_enable(state.depth_buffer_enable)
        .depth_write_enable(state.depth_buffer_enable && state.depth_buffer_write_enable)
        .depth_compare_op(compare_to_vk(state.depth_buffer_function))
        .depth_bounds_test_enable(false)
        .stencil_test_enable(state.stencil_enable)
        .front(front)
        .back(back)
}

pub fn rasterization_info(state: &RasterizerState) -> vk::PipelineRasterizationStateCreateInfo<'static> {
    vk::PipelineRasterizationStateCreateInfo::default()
        .depth_clamp_enable(false)
        .rasterizer_discard_enable(false)
        .polygon_mode(fill_mode_to_vk(state.fill_mode))
        .cull_mode(cull_mode_to_vk(state.cull_mode))
        .front_face(vk::FrontFace::CLOCKWISE)
        .depth_bias_enable(state.depth_bias != 0.0 || state.slope_scale_depth_bias != 0.0)
        .line_width(1.0)
}

/// Everything a graphics pipeline is built from
pub struct PipelineDesc<'a> {
    pub blend: &'a BlendState,
    pub depth_stencil: &'a DepthStencilState,
    pub rasterizer: &'a RasterizerState,
    pub primitive_type: PrimitiveType,
    pub vertex_layout: &'a VertexInputLayout,
    pub multi_sample_count: u32,
    pub sample_mask: u32,
    pub color_count: u32,
    pub vertex_module: vk::ShaderModule,
    pub fragment_module: vk::ShaderModule,
    pub vertex_entry: &'a str,
    pub fragment_entry: &'a str,
    pub layout: vk::PipelineLayout,
    pub render_pass: vk::RenderPass,
}

/// Sample mask words for `samples`; the upper word of a 64-sample mask is all ones
pub fn sample_mask_words(mask: u32, samples: vk::SampleCountFlags) -> [u32; 2] {
    if samples == vk::SampleCountFlags::TYPE_64 {
        [mask, u32::MAX]
    } else {
        [mask, 0]
    }
}

fn sample_mask_word_count(samples: vk::SampleCountFlags) -> usize {
    if samples == vk::SampleCountFlags::TYPE_64 { 2 } else { 1 }
}

pub fn create_graphics_pipeline(
    device: &ash::Device,
    cache: vk::PipelineCache,
    desc: &PipelineDesc<'_>,
) -> Result<vk::Pipeline> {
    let vertex_entry = CString::new(desc.vertex_entry)
        .map_err(|_| fna3d::engine_err!("fna3d::vulkan", "Vertex entry point contains a NUL byte"))?;
    let fragment_entry = CString::new(desc.fragment_entry)
        .map_err(|_| fna3d::engine_err!("fna3d::vulkan", "Fragment entry point contains a NUL byte"))?;

    let stages = [
        vk::PipelineShaderStageCreateInfo::default()
            .stage(vk::ShaderStageFlags::VERTEX)
            .module(desc.vertex_module)
            .name(&vertex_entry),
        vk::PipelineShaderStageCreateInfo::default()
            .stage(vk::ShaderStageFlags::FRAGMENT)
            .module(desc.fragment_module)
            .name(&fragment_entry),
    ];

    let vertex_input = vk::PipelineVertexInputStateCreateInfo::default()
        .vertex_binding_descriptions(&desc.vertex_layout.bindings)
        .vertex_attribute_descriptions(&desc.vertex_layout.attributes);

    let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::default()
        .topology(primitive_type_to_vk(desc.primitive_type))
        .primitive_restart_enable(false);

    // Counts only; values are dynamic
    let viewport_state = vk::PipelineViewportStateCreateInfo::default()
        .viewport_count(1)
        .scissor_count(1);

    let rasterization = rasterization_info(desc.rasterizer);

    let samples = sample_count_to_vk(desc.multi_sample_count);
    let sample_mask = sample_mask_words(desc.sample_mask, samples);
    let multisample = vk::PipelineMultisampleStateCreateInfo::default()
        .rasterization_samples(samples)
        .sample_shading_enable(false)
        .sample_mask(&sample_mask[..sample_mask_word_count(samples)])
        .alpha_to_coverage_enable(false)
        .alpha_to_one_enable(false);

    let depth_stencil = depth_stencil_info(desc.depth_stencil);

    let blend_attachments: Vec<vk::PipelineColorBlendAttachmentState> = (0..desc.color_count.max(1) as usize)
        .map(|index| color_blend_attachment(desc.blend, index))
        .collect();
    let color_blend = vk::PipelineColorBlendStateCreateInfo::default()
        .logic_op_enable(false)
        .attachments(&blend_attachments[..desc.color_count as usize]);

    let dynamic_state = vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&DYNAMIC_STATES);

    let info = vk::GraphicsPipelineCreateInfo::default()
        .stages(&stages)
        .vertex_input_state(&vertex_input)
        .input_assembly_state(&input_assembly)
        .viewport_state(&viewport_state)
        .rasterization_state(&rasterization)
        .multisample_state(&multisample)
        .depth_stencil_state(&depth_stencil)
        .color_blend_state(&color_blend)
        .dynamic_state(&dynamic_state)
        .layout(desc.layout)
        .render_pass(desc.render_pass)
        .subpass(0);

    let pipelines = unsafe { device.create_graphics_pipelines(cache, std::slice::from_ref(&info), None) }
        .map_err(|(_, e)| crate::vk_error("vkCreateGraphicsPipelines", e))?;
    pipelines
        .into_iter()
        .next()
        .ok_or_else(|| fna3d::engine_err!("fna3d::vulkan", "vkCreateGraphicsPipelines returned no pipeline"))
}

// ============================================================================
// SAMPLERS
// ============================================================================

pub fn sampler_create_info(state: &SamplerState, anisotropy_supported: bool) -> vk::SamplerCreateInfo<'static> {
    let (mag_filter, min_filter, mipmap_mode) = texture_filter_to_vk(state.filter);
    let anisotropy = anisotropy_supported && state.filter == TextureFilter::Anisotropic;
    vk::SamplerCreateInfo::default()
        .mag_filter(mag_filter)
        .min_filter(min_filter)
        .mipmap_mode(mipmap_mode)
        .address_mode_u(address_mode_to_vk(state.address_u))
        .address_mode_v(address_mode_to_vk(state.address_v))
        .address_mode_w(address_mode_to_vk(state.address_w))
        .mip_lod_bias(state.mip_map_level_of_detail_bias)
        .anisotropy_enable(anisotropy)
        .max_anisotropy(if anisotropy { state.max_anisotropy.clamp(1, 16) as f32 } else { 1.0 })
        .compare_enable(false)
        .min_lod(state.max_mip_level.max(0) as f32)
        .max_lod(1000.0)
        .border_color(vk::BorderColor::FLOAT_TRANSPARENT_BLACK)
        .unnormalized_coordinates(false)
}

pub fn create_sampler(device: &ash::Device, state: &SamplerState, anisotropy_supported: bool) -> Result<vk::Sampler> {
    let info = sampler_create_info(state, anisotropy_supported);
    Ok(vk_try!("vkCreateSampler", unsafe { device.create_sampler(&info, None) }))
}

#[cfg(test)]
#[path = "vulkan_pipeline_tests.rs"]
mod tests;
