/// Mock device for testing without a GPU
///
/// Records enough state to check the engine's plumbing: created handles live
/// in slot maps, every draw bumps a counter, data round-trips through memory.

use std::sync::Arc;
use glam::Vec4;
use slotmap::SlotMap;

use crate::error::{Error, Result};
use crate::device::*;

pub struct MockDevice {
    pub params: PresentationParameters,
    pub config: Config,
    pub textures: SlotMap<TextureHandle, u32>,
    pub renderbuffers: SlotMap<RenderbufferHandle, ()>,
    pub buffers: SlotMap<BufferHandle, Vec<u8>>,
    pub effects: SlotMap<EffectHandle, ()>,
    pub queries: SlotMap<QueryHandle, ()>,
    pub draw_calls: u32,
    pub presents: u32,
    blend_factor: Color,
    multi_sample_mask: i32,
    reference_stencil: i32,
}

impl MockDevice {
    pub fn new(params: &PresentationParameters, config: &Config) -> Self {
        Self {
            params: params.clone(),
            config: config.clone(),
            textures: SlotMap::with_key(),
            renderbuffers: SlotMap::with_key(),
            buffers: SlotMap::with_key(),
            effects: SlotMap::with_key(),
            queries: SlotMap::with_key(),
            draw_calls: 0,
            presents: 0,
            blend_factor: Color::WHITE,
            multi_sample_mask: -1,
            reference_stencil: 0,
        }
    }

    fn buffer_mut(&mut self, buffer: BufferHandle) -> Result<&mut Vec<u8>> {
        self.buffers
            .get_mut(buffer)
            .ok_or_else(|| Error::InvalidResource("Unknown buffer".to_string()))
    }
}

impl Device for MockDevice {
    fn swap_buffers(&mut self, _source_rect: Option<Rect>, _destination_rect: Option<Rect>, _window: Option<Arc<dyn DeviceWindow>>) -> Result<()> {
        self.presents += 1;
        self.draw_calls = 0;
        Ok(())
    }

    fn reset_backbuffer(&mut self, params: &PresentationParameters) -> Result<()> {
        self.params = params.clone();
        Ok(())
    }

    fn read_backbuffer(&mut self, _x: i32, _y: i32, _w: i32, _h: i32, data: &mut [u8]) -> Result<()> {
        data.fill(0);
        Ok(())
    }

    fn backbuffer_size(&self) -> (u32, u32) {
        (self.params.back_buffer_width, self.params.back_buffer_height)
    }

    fn backbuffer_surface_format(&self) -> SurfaceFormat {
        self.params.back_buffer_format
    }

    fn backbuffer_depth_format(&self) -> DepthFormat {
        self.params.depth_stencil_format
    }

    fn backbuffer_multi_sample_count(&self) -> u32 {
        self.params.multi_sample_count
    }

    fn clear(&mut self, _options: ClearOptions, _color: Vec4, _depth: f32, _stencil: i32) {}

    fn draw_indexed_primitives(&mut self, _primitive_type: PrimitiveType, _base_vertex: i32, _min_vertex_index: i32, _num_vertices: i32, _start_index: i32, _primitive_count: i32, _indices: BufferHandle, _index_element_size: IndexElementSize) -> Result<()> {
        self.draw_calls += 1;
        Ok(())
    }

    fn draw_instanced_primitives(&mut self, _primitive_type: PrimitiveType, _base_vertex: i32, _min_vertex_index: i32, _num_vertices: i32, _start_index: i32, _primitive_count: i32, _instance_count: i32, _indices: BufferHandle, _index_element_size: IndexElementSize) -> Result<()> {
        self.draw_calls += 1;
        Ok(())
    }

    fn draw_primitives(&mut self, _primitive_type: PrimitiveType, _vertex_start: i32, _primitive_count: i32) -> Result<()> {
        self.draw_calls += 1;
        Ok(())
    }

    fn set_viewport(&mut self, _viewport: &Viewport) {}
    fn set_scissor_rect(&mut self, _scissor: &Rect) {}

    fn blend_factor(&self) -> Color {
        self.blend_factor
    }

    fn set_blend_factor(&mut self, blend_factor: Color) {
        self.blend_factor = blend_factor;
    }

    fn multi_sample_mask(&self) -> i32 {
        self.multi_sample_mask
    }

    fn set_multi_sample_mask(&mut self, mask: i32) {
        self.multi_sample_mask = mask;
    }

    fn reference_stencil(&self) -> i32 {
        self.reference_stencil
    }

    fn set_reference_stencil(&mut self, reference: i32) {
        self.reference_stencil = reference;
    }

    fn set_blend_state(&mut self, blend_state: &BlendState) {
        self.blend_factor = blend_state.blend_factor;
        self.multi_sample_mask = blend_state.multi_sample_mask;
    }

    fn set_depth_stencil_state(&mut self, depth_stencil_state: &DepthStencilState) {
        self.reference_stencil = depth_stencil_state.reference_stencil;
    }

    fn apply_rasterizer_state(&mut self, _rasterizer_state: &RasterizerState) {}

    fn verify_sampler(&mut self, _index: usize, _texture: Option<TextureHandle>, _sampler: &SamplerState) -> Result<()> {
        Ok(())
    }

    fn verify_vertex_sampler(&mut self, _index: usize, _texture: Option<TextureHandle>, _sampler: &SamplerState) -> Result<()> {
        Ok(())
    }

    fn apply_vertex_buffer_bindings(&mut self, _bindings: &[VertexBufferBinding], _bindings_updated: bool, _base_vertex: i32) -> Result<()> {
        Ok(())
    }

    fn set_render_targets(&mut self, _targets: &[RenderTargetBinding], _depth_stencil_buffer: Option<RenderbufferHandle>, _depth_format: DepthFormat, _preserve_target_contents: bool) -> Result<()> {
        Ok(())
    }

    fn resolve_target(&mut self, _target: &RenderTargetBinding) -> Result<()> {
        Ok(())
    }

    fn create_texture_2d(&mut self, _format: SurfaceFormat, _width: u32, _height: u32, level_count: u32, _is_render_target: bool) -> Result<TextureHandle> {
        Ok(self.textures.insert(level_count))
    }

    fn create_texture_3d(&mut self, _format: SurfaceFormat, _width: u32, _height: u32, _depth: u32, level_count: u32) -> Result<TextureHandle> {
        Ok(self.textures.insert(level_count))
    }

    fn create_texture_cube(&mut self, _format: SurfaceFormat, _size: u32, level_count: u32, _is_render_target: bool) -> Result<TextureHandle> {
        Ok(self.textures.insert(level_count))
    }

    fn add_dispose_texture(&mut self, texture: TextureHandle) {
        self.textures.remove(texture);
    }

    fn set_texture_data_2d(&mut self, _texture: TextureHandle, _x: u32, _y: u32, _w: u32, _h: u32, _level: u32, _data: &[u8]) -> Result<()> {
        Ok(())
    }

    fn set_texture_data_3d(&mut self, _texture: TextureHandle, _x: u32, _y: u32, _z: u32, _w: u32, _h: u32, _d: u32, _level: u32, _data: &[u8]) -> Result<()> {
        Ok(())
    }

    fn set_texture_data_cube(&mut self, _texture: TextureHandle, _x: u32, _y: u32, _w: u32, _h: u32, _face: CubeMapFace, _level: u32, _data: &[u8]) -> Result<()> {
        Ok(())
    }

    fn set_texture_data_yuv(&mut self, _y: TextureHandle, _u: TextureHandle, _v: TextureHandle, _y_width: u32, _y_height: u32, _uv_width: u32, _uv_height: u32, _data: &[u8]) -> Result<()> {
        Ok(())
    }

    fn get_texture_data_2d(&mut self, _texture: TextureHandle, _x: u32, _y: u32, _w: u32, _h: u32, _level: u32, data: &mut [u8]) -> Result<()> {
        data.fill(0);
        Ok(())
    }

    fn get_texture_data_3d(&mut self, _texture: TextureHandle, _x: u32, _y: u32, _z: u32, _w: u32, _h: u32, _d: u32, _level: u32, data: &mut [u8]) -> Result<()> {
        data.fill(0);
        Ok(())
    }

    fn get_texture_data_cube(&mut self, _texture: TextureHandle, _x: u32, _y: u32, _w: u32, _h: u32, _face: CubeMapFace, _level: u32, data: &mut [u8]) -> Result<()> {
        data.fill(0);
        Ok(())
    }

    fn set_texture_name(&mut self, _texture: TextureHandle, _name: &str) {}

    fn gen_color_renderbuffer(&mut self, _width: u32, _height: u32, _format: SurfaceFormat, _multi_sample_count: u32, _texture: TextureHandle) -> Result<RenderbufferHandle> {
        Ok(self.renderbuffers.insert(()))
    }

    fn gen_depth_stencil_renderbuffer(&mut self, _width: u32, _height: u32, _format: DepthFormat, _multi_sample_count: u32) -> Result<RenderbufferHandle> {
        Ok(self.renderbuffers.insert(()))
    }

    fn add_dispose_renderbuffer(&mut self, renderbuffer: RenderbufferHandle) {
        self.renderbuffers.remove(renderbuffer);
    }

    fn gen_vertex_buffer(&mut self, _dynamic: bool, _usage: BufferUsage, size_in_bytes: usize) -> Result<BufferHandle> {
        Ok(self.buffers.insert(vec![0; size_in_bytes]))
    }

    fn add_dispose_vertex_buffer(&mut self, buffer: BufferHandle) {
        self.buffers.remove(buffer);
    }

    fn set_vertex_buffer_data(&mut self, buffer: BufferHandle, offset_in_bytes: usize, data: &[u8], _element_count: usize, _element_size_in_bytes: usize, _vertex_stride: usize, options: SetDataOptions) -> Result<()> {
        self.set_index_buffer_data(buffer, offset_in_bytes, data, options)
    }

    fn get_vertex_buffer_data(&mut self, buffer: BufferHandle, offset_in_bytes: usize, data: &mut [u8], _element_count: usize, _element_size_in_bytes: usize, _vertex_stride: usize) -> Result<()> {
        self.get_index_buffer_data(buffer, offset_in_bytes, data)
    }

    fn gen_index_buffer(&mut self, _dynamic: bool, _usage: BufferUsage, size_in_bytes: usize) -> Result<BufferHandle> {
        Ok(self.buffers.insert(vec![0; size_in_bytes]))
    }

    fn add_dispose_index_buffer(&mut self, buffer: BufferHandle) {
        self.buffers.remove(buffer);
    }

    fn set_index_buffer_data(&mut self, buffer: BufferHandle, offset_in_bytes: usize, data: &[u8], _options: SetDataOptions) -> Result<()> {
        let storage = self.buffer_mut(buffer)?;
        let end = offset_in_bytes + data.len();
        if end > storage.len() {
            return Err(Error::InvalidResource("Write past end of buffer".to_string()));
        }
        storage[offset_in_bytes..end].copy_from_slice(data);
        Ok(())
    }

    fn get_index_buffer_data(&mut self, buffer: BufferHandle, offset_in_bytes: usize, data: &mut [u8]) -> Result<()> {
        let storage = self.buffer_mut(buffer)?;
        let end = offset_in_bytes + data.len();
        if end > storage.len() {
            return Err(Error::InvalidResource("Read past end of buffer".to_string()));
        }
        data.copy_from_slice(&storage[offset_in_bytes..end]);
        Ok(())
    }

    fn create_effect(&mut self, _code: &[u8]) -> Result<EffectHandle> {
        Ok(self.effects.insert(()))
    }

    fn clone_effect(&mut self, _effect: EffectHandle) -> Result<EffectHandle> {
        Ok(self.effects.insert(()))
    }

    fn add_dispose_effect(&mut self, effect: EffectHandle) {
        self.effects.remove(effect);
    }

    fn set_effect_technique(&mut self, _effect: EffectHandle, _technique: usize) -> Result<()> {
        Ok(())
    }

    fn apply_effect(&mut self, _effect: EffectHandle, _pass: u32, state_changes: &mut EffectStateChanges) -> Result<()> {
        state_changes.clear();
        Ok(())
    }

    fn begin_pass_restore(&mut self, _effect: EffectHandle, state_changes: &mut EffectStateChanges) -> Result<()> {
        state_changes.clear();
        Ok(())
    }

    fn end_pass_restore(&mut self, _effect: EffectHandle) -> Result<()> {
        Ok(())
    }

    fn create_query(&mut self) -> Result<QueryHandle> {
        Ok(self.queries.insert(()))
    }

    fn add_dispose_query(&mut self, query: QueryHandle) {
        self.queries.remove(query);
    }

    fn query_begin(&mut self, _query: QueryHandle) -> Result<()> {
        Ok(())
    }

    fn query_end(&mut self, _query: QueryHandle) -> Result<()> {
        Ok(())
    }

    fn query_complete(&mut self, _query: QueryHandle) -> bool {
        true
    }

    fn query_pixel_count(&mut self, _query: QueryHandle) -> u64 {
        0
    }

    fn supports_dxt1(&self) -> bool { true }
    fn supports_s3tc(&self) -> bool { true }
    fn supports_bc7(&self) -> bool { false }
    fn supports_hardware_instancing(&self) -> bool { true }
    fn supports_no_overwrite(&self) -> bool { true }
    fn supports_srgb_render_targets(&self) -> bool { true }

    fn max_texture_slots(&self) -> (usize, usize) {
        (16, 4)
    }

    fn max_multi_sample_count(&self, _format: SurfaceFormat, multi_sample_count: u32) -> u32 {
        multi_sample_count.min(8)
    }

    fn set_string_marker(&mut self, _text: &str) {}

    fn stats(&self) -> DeviceStats {
        DeviceStats {
            draw_calls: self.draw_calls,
            submissions: self.presents as u64,
            device_local_bytes_used: 0,
        }
    }

    fn sys_renderer(&self) -> SysRenderer {
        SysRenderer::Vulkan {
            instance: 0,
            physical_device: 0,
            logical_device: 0,
            queue_family_index: 0,
        }
    }

    fn create_sys_texture(&mut self, _texture: &SysTexture) -> Result<TextureHandle> {
        Ok(self.textures.insert(1))
    }
}
