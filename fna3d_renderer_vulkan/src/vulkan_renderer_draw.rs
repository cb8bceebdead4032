/// Draw preparation: samplers, layouts, pipelines, vertex streams and descriptor sets

use ash::vk;
use fna3d::fna3d::{Error, Result};
use fna3d::fna3d::render::{BufferHandle, IndexElementSize, PrimitiveType, SamplerState, TextureHandle};
use fna3d::{engine_err, engine_trace, engine_warn};

use crate::mojoshader::{ShaderHandle, ShaderParseData, ShaderStage, UniformBufferBinding};
use crate::vulkan::{ActivePass, BoundSampler, VulkanRenderer, DUMMY_UNIFORM_BUFFER_SIZE, MAX_TEXTURE_SAMPLERS, MAX_VERTEX_TEXTURE_SAMPLERS};
use crate::vulkan_barrier::ResourceAccessType;
use crate::vulkan_cache::{
    pack_blend_state, pack_depth_stencil_state, pack_rasterizer_state, pack_sampler_state, DescriptorSetLayoutHash,
    PipelineHash, PipelineLayoutHash,
};
use crate::vulkan_descriptor_set::{build_bindings, ShaderResources};
use crate::vulkan_dispatch::ImageSamplerBinding;
use crate::vulkan_format::index_type_to_vk;
use crate::vulkan_pipeline::{
    create_descriptor_set_layout, create_graphics_pipeline, create_pipeline_layout, create_sampler, PipelineDesc,
};
use crate::vulkan_renderer_pass::AttachmentImage;

/// Byte offset of a vertex stream after applying the draw's base vertex
///
/// Instance streams ignore the base vertex.
pub(crate) fn vertex_stream_offset(vertex_offset: i32, base_vertex: i32, stride: u32, per_instance: bool) -> u64 {
    let first = vertex_offset as i64 + if per_instance { 0 } else { base_vertex as i64 };
    (first * stride as i64).max(0) as u64
}

/// Layouts a draw's descriptor sets and pipeline are built against
#[derive(Debug, Clone, Copy)]
struct DrawLayouts {
    vertex_samplers: vk::DescriptorSetLayout,
    fragment_samplers: vk::DescriptorSetLayout,
    vertex_uniforms: vk::DescriptorSetLayout,
    fragment_uniforms: vk::DescriptorSetLayout,
    pipeline: vk::PipelineLayout,
}

/// Bound shaders of a draw and what they declare
struct DrawShaders {
    vertex: ShaderHandle,
    fragment: ShaderHandle,
    vertex_data: ShaderParseData,
    fragment_data: ShaderParseData,
}

impl VulkanRenderer {
    // ===== SAMPLERS =====

    pub(crate) fn bind_sampler(
        &mut self,
        stage: ShaderStage,
        index: usize,
        texture: Option<TextureHandle>,
        state: &SamplerState,
    ) -> Result<()> {
        let capacity = match stage {
            ShaderStage::Vertex => MAX_VERTEX_TEXTURE_SAMPLERS,
            ShaderStage::Fragment => MAX_TEXTURE_SAMPLERS,
        };
        if index >= capacity {
            return Err(Error::InvalidResource(format!("{:?} sampler slot {} out of range", stage, index)));
        }

        let bound = match texture {
            Some(handle) => {
                let view = self.textures.get(handle).ok_or_else(|| Self::unknown("texture"))?.view;
                let sampler = self.fetch_sampler(state)?;
                Some(BoundSampler { texture: handle, binding: ImageSamplerBinding { view, sampler } })
            }
            None => None,
        };
        match stage {
            ShaderStage::Vertex => self.vertex_samplers[index] = bound,
            ShaderStage::Fragment => self.fragment_samplers[index] = bound,
        }
        Ok(())
    }

    pub(crate) fn fetch_sampler(&mut self, state: &SamplerState) -> Result<vk::Sampler> {
        let key = pack_sampler_state(state);
        if let Some(sampler) = self.samplers.fetch(&key) {
            return Ok(sampler);
        }
        let sampler = create_sampler(&self.ctx.device, state, self.ctx.features.sampler_anisotropy)?;
        self.samplers.insert(key, sampler);
        engine_trace!("fna3d::vulkan", "Created sampler ({} cached)", self.samplers.len());
        Ok(sampler)
    }

    /// Bound textures not yet readable by shaders are transitioned outside the pass
    fn prepare_sampled_textures(&mut self) -> Result<()> {
        let vertex = self.vertex_samplers.iter().map(|slot| (slot, ResourceAccessType::VertexShaderReadSampledImage));
        let fragment = self.fragment_samplers.iter().map(|slot| (slot, ResourceAccessType::FragmentShaderReadSampledImage));
        let stale: Vec<(TextureHandle, ResourceAccessType)> = vertex
            .chain(fragment)
            .filter_map(|(slot, access)| slot.map(|bound| (bound.texture, access)))
            .filter(|(handle, _)| {
                self.textures.get(*handle).is_some_and(|texture| {
                    !texture.external && texture.access.info().image_layout != vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL
                })
            })
            .collect();
        if stale.is_empty() {
            return Ok(());
        }

        self.end_render_pass()?;
        let command_buffer = self.record()?;
        for (handle, access) in stale {
            self.transition_image(command_buffer, AttachmentImage::Texture(handle), access, false);
        }
        Ok(())
    }

    // ===== LAYOUTS AND PIPELINES =====

    fn fetch_set_layout(&mut self, descriptor_type: vk::DescriptorType, stage: ShaderStage, binding_count: u32) -> Result<vk::DescriptorSetLayout> {
        let key = DescriptorSetLayoutHash { descriptor_type, stage: stage.stage_flags(), binding_count };
        if let Some(layout) = self.set_layouts.fetch(&key) {
            return Ok(layout);
        }
        let layout = create_descriptor_set_layout(&self.ctx.device, &key)?;
        self.set_layouts.insert(key, layout);
        Ok(layout)
    }

    fn fetch_layouts(&mut self, shaders: &DrawShaders) -> Result<DrawLayouts> {
        let vertex_count = shaders.vertex_data.samplers.len() as u32;
        let fragment_count = shaders.fragment_data.samplers.len() as u32;

        let vertex_samplers = self.fetch_set_layout(vk::DescriptorType::COMBINED_IMAGE_SAMPLER, ShaderStage::Vertex, vertex_count)?;
        let fragment_samplers = self.fetch_set_layout(vk::DescriptorType::COMBINED_IMAGE_SAMPLER, ShaderStage::Fragment, fragment_count)?;
        let vertex_uniforms = self.fetch_set_layout(vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC, ShaderStage::Vertex, 1)?;
        let fragment_uniforms = self.fetch_set_layout(vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC, ShaderStage::Fragment, 1)?;

        let key = PipelineLayoutHash { vertex_sampler_count: vertex_count, fragment_sampler_count: fragment_count };
        let pipeline = match self.pipeline_layouts.fetch(&key) {
            Some(layout) => layout,
            None => {
                let layout = create_pipeline_layout(
                    &self.ctx.device,
                    &[vertex_samplers, fragment_samplers, vertex_uniforms, fragment_uniforms],
                )?;
                self.pipeline_layouts.insert(key, layout);
                layout
            }
        };

        Ok(DrawLayouts { vertex_samplers, fragment_samplers, vertex_uniforms, fragment_uniforms, pipeline })
    }

    fn fetch_pipeline(
        &mut self,
        primitive_type: PrimitiveType,
        shaders: &DrawShaders,
        layout: vk::PipelineLayout,
        pass: ActivePass,
    ) -> Result<vk::Pipeline> {
        let vertex_shader = shaders.vertex;
        let shader_context = &**self.shader_context;
        let vertex_layout_index = self.vertex_layouts.fetch_or_build(vertex_shader, &self.vertex_bindings, |usage, index| {
            shader_context.vertex_attribute_location(vertex_shader, usage, index)
        });

        let key = PipelineHash {
            blend_state: pack_blend_state(&self.blend_state),
            rasterizer_state: pack_rasterizer_state(&self.rasterizer_state, pass.multi_sample_count),
            depth_stencil_state: pack_depth_stencil_state(&self.depth_stencil_state),
            vertex_binding_layout_index: vertex_layout_index,
            primitive_type,
            sample_mask: self.multi_sample_mask as u32,
            vertex_shader,
            fragment_shader: shaders.fragment,
            render_pass: pass.render_pass,
        };
        if let Some(pipeline) = self.pipelines.fetch(&key) {
            return Ok(pipeline);
        }

        let pipeline = {
            let vertex_layout = self
                .vertex_layouts
                .layout(vertex_layout_index)
                .ok_or_else(|| engine_err!("fna3d::vulkan", "Vertex layout {} missing", vertex_layout_index))?;
            let (vertex_module, fragment_module) = self.shader_context.shader_modules();
            let desc = PipelineDesc {
                blend: &self.blend_state,
                depth_stencil: &self.depth_stencil_state,
                rasterizer: &self.rasterizer_state,
                primitive_type,
                vertex_layout,
                multi_sample_count: pass.multi_sample_count,
                sample_mask: key.sample_mask,
                color_count: pass.color_count,
                vertex_module,
                fragment_module,
                vertex_entry: &shaders.vertex_data.main_fn,
                fragment_entry: &shaders.fragment_data.main_fn,
                layout,
                render_pass: pass.render_pass,
            };
            create_graphics_pipeline(&self.ctx.device, self.pipeline_cache, &desc)?
        };
        self.pipelines.insert(key, pipeline);
        engine_trace!("fna3d::vulkan", "Created pipeline #{} for {:?}", self.pipelines.len(), primitive_type);
        Ok(pipeline)
    }

    // ===== BINDING =====

    fn bind_vertex_buffers(&mut self, command_buffer: vk::CommandBuffer) -> Result<()> {
        if self.vertex_bindings.is_empty() {
            return Ok(());
        }
        let slot = self.scheduler.current_slot();
        let mut buffers = Vec::with_capacity(self.vertex_bindings.len());
        let mut offsets = Vec::with_capacity(self.vertex_bindings.len());
        for binding in &self.vertex_bindings {
            let buffer = self.buffers.mark_bound(binding.vertex_buffer, slot).ok_or_else(|| Self::unknown("vertex buffer"))?;
            buffers.push(buffer);
            offsets.push(vertex_stream_offset(
                binding.vertex_offset,
                self.base_vertex,
                binding.vertex_declaration.vertex_stride,
                binding.instance_frequency > 0,
            ));
        }
        unsafe {
            self.ctx.device.cmd_bind_vertex_buffers(command_buffer, 0, &buffers, &offsets);
        }
        Ok(())
    }

    /// Sampler and uniform sets of one stage
    fn stage_descriptor_sets(
        &mut self,
        shader: ShaderHandle,
        data: &ShaderParseData,
        sampler_layout: vk::DescriptorSetLayout,
        uniform_layout: vk::DescriptorSetLayout,
        uniform: UniformBufferBinding,
    ) -> Result<(vk::DescriptorSet, vk::DescriptorSet)> {
        let bound: Vec<Option<ImageSamplerBinding>> = match data.stage {
            ShaderStage::Vertex => self.vertex_samplers.iter().map(|slot| slot.map(|bound| bound.binding)).collect(),
            ShaderStage::Fragment => self.fragment_samplers.iter().map(|slot| slot.map(|bound| bound.binding)).collect(),
        };
        let dummies = self.dummies.bindings;
        let ctx = &self.ctx;

        let resources = self.descriptor_sets.get_or_create(shader, || {
            Ok(ShaderResources::new(data.stage, data.samplers.clone(), sampler_layout))
        })?;
        let bindings = build_bindings(resources.samplers(), &bound, &dummies);
        let sampler_set = resources.fetch_sampler_set(ctx, &bindings)?;
        let uniform_set = resources.fetch_uniform_set(ctx, uniform_layout, uniform.buffer, uniform.size)?;
        Ok((sampler_set, uniform_set))
    }

    fn bind_descriptor_sets(&mut self, command_buffer: vk::CommandBuffer, shaders: &DrawShaders, layouts: &DrawLayouts) -> Result<()> {
        let dummy = UniformBufferBinding {
            buffer: self.dummies.uniform_buffer,
            offset: 0,
            size: DUMMY_UNIFORM_BUFFER_SIZE,
        };
        self.effect_tracker.map_uniforms(&mut **self.shader_context);
        let (vertex_uniform, fragment_uniform) = self.shader_context.uniform_buffers();
        let vertex_uniform = vertex_uniform.unwrap_or(dummy);
        let fragment_uniform = fragment_uniform.unwrap_or(dummy);

        let (vertex_samplers, vertex_uniforms) = self.stage_descriptor_sets(
            shaders.vertex,
            &shaders.vertex_data,
            layouts.vertex_samplers,
            layouts.vertex_uniforms,
            vertex_uniform,
        )?;
        let (fragment_samplers, fragment_uniforms) = self.stage_descriptor_sets(
            shaders.fragment,
            &shaders.fragment_data,
            layouts.fragment_samplers,
            layouts.fragment_uniforms,
            fragment_uniform,
        )?;

        // Set order matches SET_VERTEX_SAMPLERS..SET_FRAGMENT_UNIFORMS
        let sets = [vertex_samplers, fragment_samplers, vertex_uniforms, fragment_uniforms];
        let dynamic_offsets = [vertex_uniform.offset as u32, fragment_uniform.offset as u32];
        unsafe {
            self.ctx.device.cmd_bind_descriptor_sets(
                command_buffer,
                vk::PipelineBindPoint::GRAPHICS,
                layouts.pipeline,
                0,
                &sets,
                &dynamic_offsets,
            );
        }
        Ok(())
    }

    // ===== DRAWS =====

    /// Everything but the draw command; `None` skips the draw
    fn prepare_draw(&mut self, primitive_type: PrimitiveType) -> Result<Option<vk::CommandBuffer>> {
        let (Some(vertex), Some(fragment)) = self.shader_context.bound_shaders() else {
            engine_warn!("fna3d::vulkan", "Draw without bound shaders skipped");
            return Ok(None);
        };
        let vertex_data = self
            .shader_context
            .parse_data(vertex)
            .ok_or_else(|| engine_err!("fna3d::vulkan", "No parse data for vertex shader {:?}", vertex))?;
        let fragment_data = self
            .shader_context
            .parse_data(fragment)
            .ok_or_else(|| engine_err!("fna3d::vulkan", "No parse data for fragment shader {:?}", fragment))?;
        let shaders = DrawShaders { vertex, fragment, vertex_data, fragment_data };

        self.prepare_sampled_textures()?;
        self.begin_render_pass()?;
        let pass = self.active_pass.ok_or_else(|| engine_err!("fna3d::vulkan", "Render pass failed to begin"))?;

        let layouts = self.fetch_layouts(&shaders)?;
        let pipeline = self.fetch_pipeline(primitive_type, &shaders, layouts.pipeline, pass)?;

        let command_buffer = self.record()?;
        if pipeline != self.bound_pipeline {
            unsafe {
                self.ctx.device.cmd_bind_pipeline(command_buffer, vk::PipelineBindPoint::GRAPHICS, pipeline);
            }
            self.bound_pipeline = pipeline;
        }
        self.bind_vertex_buffers(command_buffer)?;
        self.bind_descriptor_sets(command_buffer, &shaders, &layouts)?;
        Ok(Some(command_buffer))
    }

    pub(crate) fn draw_indexed(
        &mut self,
        primitive_type: PrimitiveType,
        start_index: i32,
        primitive_count: i32,
        instance_count: i32,
        indices: BufferHandle,
        index_element_size: IndexElementSize,
    ) -> Result<()> {
        let Some(command_buffer) = self.prepare_draw(primitive_type)? else {
            return Ok(());
        };
        let slot = self.scheduler.current_slot();
        let index_buffer = self.buffers.mark_bound(indices, slot).ok_or_else(|| Self::unknown("index buffer"))?;
        let index_count = primitive_type.vertex_count(primitive_count.max(0) as u32);
        unsafe {
            self.ctx.device.cmd_bind_index_buffer(command_buffer, index_buffer, 0, index_type_to_vk(index_element_size));
            // The base vertex is already folded into the vertex buffer offsets
            self.ctx.device.cmd_draw_indexed(
                command_buffer,
                index_count,
                instance_count.max(1) as u32,
                start_index.max(0) as u32,
                0,
                0,
            );
        }
        self.draw_calls += 1;
        Ok(())
    }

    pub(crate) fn draw(&mut self, primitive_type: PrimitiveType, vertex_start: i32, primitive_count: i32) -> Result<()> {
        let Some(command_buffer) = self.prepare_draw(primitive_type)? else {
            return Ok(());
        };
        let vertex_count = primitive_type.vertex_count(primitive_count.max(0) as u32);
        unsafe {
            self.ctx.device.cmd_draw(command_buffer, vertex_count, 1, vertex_start.max(0) as u32, 0);
        }
        self.draw_calls += 1;
        Ok(())
    }
}

#[cfg(test)]
#[path = "vulkan_renderer_draw_tests.rs"]
mod tests;
