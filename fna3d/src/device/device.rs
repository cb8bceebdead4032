/// Device trait - the interface every graphics driver implements

use std::sync::Arc;
use glam::Vec4;

use crate::error::Result;
use crate::device::{
    TextureHandle, RenderbufferHandle, BufferHandle, EffectHandle, QueryHandle,
    SurfaceFormat, DepthFormat, Color, BlendState, DepthStencilState, RasterizerState, SamplerState,
    VertexBufferBinding, PrimitiveType, IndexElementSize, BufferUsage, SetDataOptions,
    RenderTargetBinding, ClearOptions, CubeMapFace, PresentationParameters, DeviceWindow, Rect, Viewport,
    EffectStateChanges, SysRenderer, SysTexture,
};

/// Per-frame counters reported by a device
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeviceStats {
    /// Draw calls recorded since the last present
    pub draw_calls: u32,
    /// Queue submissions since device creation
    pub submissions: u64,
    /// Device-local bytes currently bound to resources
    pub device_local_bytes_used: u64,
}

/// Graphics device
///
/// One object per created device. Entry points that can fail return `Result`;
/// state setters never fail and only log. A device is not internally
/// synchronized: share it across threads behind a `Mutex`.
pub trait Device: Send {
    // ===== PRESENTATION =====

    /// Present the backbuffer into `window` (or the device window when `None`)
    fn swap_buffers(
        &mut self,
        source_rect: Option<Rect>,
        destination_rect: Option<Rect>,
        window: Option<Arc<dyn DeviceWindow>>,
    ) -> Result<()>;

    /// Recreate the faux backbuffer for new presentation parameters
    fn reset_backbuffer(&mut self, params: &PresentationParameters) -> Result<()>;

    /// Read back a region of the backbuffer as tightly packed RGBA8
    fn read_backbuffer(&mut self, x: i32, y: i32, w: i32, h: i32, data: &mut [u8]) -> Result<()>;

    fn backbuffer_size(&self) -> (u32, u32);
    fn backbuffer_surface_format(&self) -> SurfaceFormat;
    fn backbuffer_depth_format(&self) -> DepthFormat;
    fn backbuffer_multi_sample_count(&self) -> u32;

    // ===== DRAWING =====

    fn clear(&mut self, options: ClearOptions, color: Vec4, depth: f32, stencil: i32);

    #[allow(clippy::too_many_arguments)]
    fn draw_indexed_primitives(
        &mut self,
        primitive_type: PrimitiveType,
        base_vertex: i32,
        min_vertex_index: i32,
        num_vertices: i32,
        start_index: i32,
        primitive_count: i32,
        indices: BufferHandle,
        index_element_size: IndexElementSize,
    ) -> Result<()>;

    #[allow(clippy::too_many_arguments)]
    fn draw_instanced_primitives(
        &mut self,
        primitive_type: PrimitiveType,
        base_vertex: i32,
        min_vertex_index: i32,
        num_vertices: i32,
        start_index: i32,
        primitive_count: i32,
        instance_count: i32,
        indices: BufferHandle,
        index_element_size: IndexElementSize,
    ) -> Result<()>;

    fn draw_primitives(&mut self, primitive_type: PrimitiveType, vertex_start: i32, primitive_count: i32) -> Result<()>;

    // ===== MUTABLE RENDER STATE =====

    fn set_viewport(&mut self, viewport: &Viewport);
    fn set_scissor_rect(&mut self, scissor: &Rect);
    fn blend_factor(&self) -> Color;
    fn set_blend_factor(&mut self, blend_factor: Color);
    fn multi_sample_mask(&self) -> i32;
    fn set_multi_sample_mask(&mut self, mask: i32);
    fn reference_stencil(&self) -> i32;
    fn set_reference_stencil(&mut self, reference: i32);

    // ===== IMMUTABLE RENDER STATE =====

    fn set_blend_state(&mut self, blend_state: &BlendState);
    fn set_depth_stencil_state(&mut self, depth_stencil_state: &DepthStencilState);
    fn apply_rasterizer_state(&mut self, rasterizer_state: &RasterizerState);

    /// Bind a texture + sampler to fragment sampler slot `index` (`None` unbinds)
    fn verify_sampler(&mut self, index: usize, texture: Option<TextureHandle>, sampler: &SamplerState) -> Result<()>;
    fn verify_vertex_sampler(&mut self, index: usize, texture: Option<TextureHandle>, sampler: &SamplerState) -> Result<()>;

    // ===== VERTEX STATE =====

    fn apply_vertex_buffer_bindings(&mut self, bindings: &[VertexBufferBinding], bindings_updated: bool, base_vertex: i32) -> Result<()>;

    // ===== RENDER TARGETS =====

    /// Bind color targets (empty slice = backbuffer) and an optional depth-stencil buffer
    fn set_render_targets(
        &mut self,
        targets: &[RenderTargetBinding],
        depth_stencil_buffer: Option<RenderbufferHandle>,
        depth_format: DepthFormat,
        preserve_target_contents: bool,
    ) -> Result<()>;

    /// Resolve MSAA into the target texture and regenerate its mip chain
    fn resolve_target(&mut self, target: &RenderTargetBinding) -> Result<()>;

    // ===== TEXTURES =====

    fn create_texture_2d(&mut self, format: SurfaceFormat, width: u32, height: u32, level_count: u32, is_render_target: bool) -> Result<TextureHandle>;
    fn create_texture_3d(&mut self, format: SurfaceFormat, width: u32, height: u32, depth: u32, level_count: u32) -> Result<TextureHandle>;
    fn create_texture_cube(&mut self, format: SurfaceFormat, size: u32, level_count: u32, is_render_target: bool) -> Result<TextureHandle>;
    fn add_dispose_texture(&mut self, texture: TextureHandle);

    #[allow(clippy::too_many_arguments)]
    fn set_texture_data_2d(&mut self, texture: TextureHandle, x: u32, y: u32, w: u32, h: u32, level: u32, data: &[u8]) -> Result<()>;
    #[allow(clippy::too_many_arguments)]
    fn set_texture_data_3d(&mut self, texture: TextureHandle, x: u32, y: u32, z: u32, w: u32, h: u32, d: u32, level: u32, data: &[u8]) -> Result<()>;
    #[allow(clippy::too_many_arguments)]
    fn set_texture_data_cube(&mut self, texture: TextureHandle, x: u32, y: u32, w: u32, h: u32, face: CubeMapFace, level: u32, data: &[u8]) -> Result<()>;

    /// Upload planar YUV data (Y plane, then U, then V) into three Alpha8 textures
    #[allow(clippy::too_many_arguments)]
    fn set_texture_data_yuv(
        &mut self,
        y: TextureHandle,
        u: TextureHandle,
        v: TextureHandle,
        y_width: u32,
        y_height: u32,
        uv_width: u32,
        uv_height: u32,
        data: &[u8],
    ) -> Result<()>;

    #[allow(clippy::too_many_arguments)]
    fn get_texture_data_2d(&mut self, texture: TextureHandle, x: u32, y: u32, w: u32, h: u32, level: u32, data: &mut [u8]) -> Result<()>;
    #[allow(clippy::too_many_arguments)]
    fn get_texture_data_3d(&mut self, texture: TextureHandle, x: u32, y: u32, z: u32, w: u32, h: u32, d: u32, level: u32, data: &mut [u8]) -> Result<()>;
    #[allow(clippy::too_many_arguments)]
    fn get_texture_data_cube(&mut self, texture: TextureHandle, x: u32, y: u32, w: u32, h: u32, face: CubeMapFace, level: u32, data: &mut [u8]) -> Result<()>;

    fn set_texture_name(&mut self, texture: TextureHandle, name: &str);

    // ===== RENDERBUFFERS =====

    fn gen_color_renderbuffer(&mut self, width: u32, height: u32, format: SurfaceFormat, multi_sample_count: u32, texture: TextureHandle) -> Result<RenderbufferHandle>;
    fn gen_depth_stencil_renderbuffer(&mut self, width: u32, height: u32, format: DepthFormat, multi_sample_count: u32) -> Result<RenderbufferHandle>;
    fn add_dispose_renderbuffer(&mut self, renderbuffer: RenderbufferHandle);

    // ===== BUFFERS =====

    fn gen_vertex_buffer(&mut self, dynamic: bool, usage: BufferUsage, size_in_bytes: usize) -> Result<BufferHandle>;
    fn add_dispose_vertex_buffer(&mut self, buffer: BufferHandle);

    #[allow(clippy::too_many_arguments)]
    fn set_vertex_buffer_data(
        &mut self,
        buffer: BufferHandle,
        offset_in_bytes: usize,
        data: &[u8],
        element_count: usize,
        element_size_in_bytes: usize,
        vertex_stride: usize,
        options: SetDataOptions,
    ) -> Result<()>;

    fn get_vertex_buffer_data(
        &mut self,
        buffer: BufferHandle,
        offset_in_bytes: usize,
        data: &mut [u8],
        element_count: usize,
        element_size_in_bytes: usize,
        vertex_stride: usize,
    ) -> Result<()>;

    fn gen_index_buffer(&mut self, dynamic: bool, usage: BufferUsage, size_in_bytes: usize) -> Result<BufferHandle>;
    fn add_dispose_index_buffer(&mut self, buffer: BufferHandle);
    fn set_index_buffer_data(&mut self, buffer: BufferHandle, offset_in_bytes: usize, data: &[u8], options: SetDataOptions) -> Result<()>;
    fn get_index_buffer_data(&mut self, buffer: BufferHandle, offset_in_bytes: usize, data: &mut [u8]) -> Result<()>;

    // ===== EFFECTS =====

    fn create_effect(&mut self, code: &[u8]) -> Result<EffectHandle>;
    fn clone_effect(&mut self, effect: EffectHandle) -> Result<EffectHandle>;
    fn add_dispose_effect(&mut self, effect: EffectHandle);
    fn set_effect_technique(&mut self, effect: EffectHandle, technique: usize) -> Result<()>;
    fn apply_effect(&mut self, effect: EffectHandle, pass: u32, state_changes: &mut EffectStateChanges) -> Result<()>;
    fn begin_pass_restore(&mut self, effect: EffectHandle, state_changes: &mut EffectStateChanges) -> Result<()>;
    fn end_pass_restore(&mut self, effect: EffectHandle) -> Result<()>;

    // ===== QUERIES =====

    fn create_query(&mut self) -> Result<QueryHandle>;
    fn add_dispose_query(&mut self, query: QueryHandle);
    fn query_begin(&mut self, query: QueryHandle) -> Result<()>;
    fn query_end(&mut self, query: QueryHandle) -> Result<()>;
    fn query_complete(&mut self, query: QueryHandle) -> bool;
    fn query_pixel_count(&mut self, query: QueryHandle) -> u64;

    // ===== FEATURE QUERIES =====

    fn supports_dxt1(&self) -> bool;
    fn supports_s3tc(&self) -> bool;
    fn supports_bc7(&self) -> bool;
    fn supports_hardware_instancing(&self) -> bool;
    fn supports_no_overwrite(&self) -> bool;
    fn supports_srgb_render_targets(&self) -> bool;
    /// (fragment sampler slots, vertex sampler slots)
    fn max_texture_slots(&self) -> (usize, usize);
    fn max_multi_sample_count(&self, format: SurfaceFormat, multi_sample_count: u32) -> u32;

    // ===== DEBUGGING =====

    fn set_string_marker(&mut self, text: &str);

    fn stats(&self) -> DeviceStats;

    // ===== INTEROP =====

    fn sys_renderer(&self) -> SysRenderer;
    fn create_sys_texture(&mut self, texture: &SysTexture) -> Result<TextureHandle>;
}
