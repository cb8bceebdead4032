/// VulkanRenderer - Vulkan implementation of the Device trait
///
/// Owns the GPU context and every engine component. The entry points are
/// spread over the `vulkan_renderer_*` modules; this file holds the state,
/// device creation, teardown and the trait glue.

use std::mem::ManuallyDrop;
use std::path::Path;
use std::sync::Arc;
use ash::vk::{self, Handle};
use slotmap::SlotMap;
use glam::Vec4;
use fna3d::fna3d::{Config, Device, DeviceStats, Error, Result};
use fna3d::fna3d::render::{
    BlendState, BufferHandle, BufferUsage, ClearOptions, Color, CubeMapFace, DepthFormat, DepthStencilState,
    DeviceWindow, EffectHandle, EffectStateChanges, IndexElementSize, PresentationParameters, PrimitiveType,
    QueryHandle, RasterizerState, Rect, RenderTargetBinding, RenderbufferHandle, SamplerState, SetDataOptions,
    SurfaceFormat, SysRenderer, SysTexture, TextureHandle, VertexBufferBinding, Viewport,
};
use fna3d::{engine_debug, engine_error, engine_info, engine_warn};

use crate::mojoshader::{ShaderContext, ShaderContextFactory, ShaderDeviceInfo, ShaderStage};
use crate::vulkan_buffer::{BufferKind, BufferStore};
use crate::vulkan_cache::{
    DescriptorSetLayoutHash, FramebufferHash, HandleCache, PipelineHash, PipelineLayoutHash, RenderPassHash,
    SamplerStateHash,
};
use crate::vulkan_command_list::{CommandBufferScheduler, MAX_FRAMES_IN_FLIGHT};
use crate::vulkan_context::GpuContext;
use crate::vulkan_descriptor_set::{DescriptorSetManager, DummyBindings};
use crate::vulkan_dispatch::{DeviceDispatch, ImageSamplerBinding};
use crate::vulkan_dispose::DisposeQueue;
use crate::vulkan_format::max_supported_sample_count;
use crate::vulkan_memory::{MemoryAllocator, UsedRegionKey};
use crate::vulkan_pipeline_cache::{create_pipeline_cache, save_pipeline_cache};
use crate::vulkan_query::{QuerySlots, MAX_QUERIES};
use crate::vulkan_renderer_effect::{EffectTracker, VulkanEffect};
use crate::vulkan_staging::StagingBuffers;
use crate::vulkan_swapchain::{destroy_swapchain, PresentOptions, SwapchainData};
use crate::vulkan_texture::{VulkanRenderbuffer, VulkanTexture};
use crate::vulkan_vertex_layout::VertexInputLayoutCache;

/// Fragment sampler slots
pub const MAX_TEXTURE_SAMPLERS: usize = 16;
/// Vertex texture fetch slots
pub const MAX_VERTEX_TEXTURE_SAMPLERS: usize = 4;
/// Zero-filled uniform block bound for stages without uniforms
pub const DUMMY_UNIFORM_BUFFER_SIZE: u64 = 256;

// ============================================================================
// STATE RECORDS
// ============================================================================

/// A texture and sampler bound to a sampler slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct BoundSampler {
    pub texture: TextureHandle,
    pub binding: ImageSamplerBinding,
}

/// One bound color target; `layer` is the cube face for cube targets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ColorTarget {
    pub texture: TextureHandle,
    pub layer: u32,
    pub color_buffer: Option<RenderbufferHandle>,
}

/// Attachments of the next render pass; no colors means the faux backbuffer
#[derive(Debug, Clone, Default)]
pub(crate) struct TargetState {
    pub colors: Vec<ColorTarget>,
    pub depth_stencil: Option<RenderbufferHandle>,
    pub depth_format: DepthFormat,
}

/// Clear requested by `clear`, folded into the next render pass as load ops
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct PendingClear {
    pub options: ClearOptions,
    pub color: Vec4,
    pub depth: f32,
    pub stencil: i32,
}

/// The render pass being recorded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ActivePass {
    pub render_pass: vk::RenderPass,
    pub color_count: u32,
    pub multi_sample_count: u32,
    pub width: u32,
    pub height: u32,
    pub depth_format: DepthFormat,
}

/// The offscreen backbuffer every frame renders into before the present blit
#[derive(Debug, Clone, Copy)]
pub(crate) struct FauxBackbuffer {
    pub texture: TextureHandle,
    /// Multisample color resolving into `texture`
    pub msaa: Option<RenderbufferHandle>,
    pub depth_stencil: Option<RenderbufferHandle>,
    pub width: u32,
    pub height: u32,
    pub surface_format: SurfaceFormat,
    pub depth_format: DepthFormat,
    pub multi_sample_count: u32,
}

/// Stand-ins bound where the application bound nothing
pub(crate) struct DummyResources {
    pub texture_2d: TextureHandle,
    pub texture_3d: TextureHandle,
    pub texture_cube: TextureHandle,
    pub bindings: DummyBindings,
    pub uniform_buffer: vk::Buffer,
    pub uniform_region: Option<UsedRegionKey>,
}

impl DummyResources {
    fn empty() -> Self {
        let null = ImageSamplerBinding { view: vk::ImageView::null(), sampler: vk::Sampler::null() };
        Self {
            texture_2d: TextureHandle::default(),
            texture_3d: TextureHandle::default(),
            texture_cube: TextureHandle::default(),
            bindings: DummyBindings { two_d: null, three_d: null, cube: null },
            uniform_buffer: vk::Buffer::null(),
            uniform_region: None,
        }
    }
}

// ============================================================================
// RENDERER
// ============================================================================

/// Vulkan device
///
/// Single-threaded: every entry point takes `&mut self` and records into
/// the scheduler's current command buffer.
pub struct VulkanRenderer {
    pub(crate) ctx: GpuContext,
    pub(crate) config: Config,
    /// Dropped explicitly before the device is destroyed
    pub(crate) shader_context: ManuallyDrop<Box<dyn ShaderContext>>,

    // ===== RESOURCES =====
    pub(crate) allocator: MemoryAllocator,
    pub(crate) staging: Option<StagingBuffers>,
    pub(crate) buffers: BufferStore,
    pub(crate) textures: SlotMap<TextureHandle, VulkanTexture>,
    pub(crate) renderbuffers: SlotMap<RenderbufferHandle, VulkanRenderbuffer>,
    pub(crate) effects: SlotMap<EffectHandle, VulkanEffect>,
    pub(crate) effect_tracker: EffectTracker,
    pub(crate) queries: SlotMap<QueryHandle, u32>,
    pub(crate) query_slots: QuerySlots,
    pub(crate) query_pool: vk::QueryPool,
    pub(crate) active_query: Option<u32>,
    pub(crate) dispose_queue: DisposeQueue,
    pub(crate) dummies: DummyResources,

    // ===== COMMANDS =====
    pub(crate) scheduler: CommandBufferScheduler,

    // ===== CACHES =====
    pub(crate) render_passes: HandleCache<RenderPassHash, vk::RenderPass>,
    pub(crate) framebuffers: HandleCache<FramebufferHash, vk::Framebuffer>,
    pub(crate) pipelines: HandleCache<PipelineHash, vk::Pipeline>,
    pub(crate) pipeline_layouts: HandleCache<PipelineLayoutHash, vk::PipelineLayout>,
    pub(crate) set_layouts: HandleCache<DescriptorSetLayoutHash, vk::DescriptorSetLayout>,
    pub(crate) samplers: HandleCache<SamplerStateHash, vk::Sampler>,
    pub(crate) pipeline_cache: vk::PipelineCache,
    pub(crate) vertex_layouts: VertexInputLayoutCache,
    pub(crate) descriptor_sets: DescriptorSetManager,

    // ===== PRESENTATION =====
    pub(crate) swapchains: Vec<SwapchainData>,
    pub(crate) present_options: PresentOptions,
    pub(crate) device_window: Arc<dyn DeviceWindow>,
    pub(crate) backbuffer: FauxBackbuffer,

    // ===== RENDER STATE =====
    pub(crate) blend_state: BlendState,
    pub(crate) depth_stencil_state: DepthStencilState,
    pub(crate) rasterizer_state: RasterizerState,
    pub(crate) blend_factor: Color,
    pub(crate) multi_sample_mask: i32,
    pub(crate) stencil_ref: i32,
    pub(crate) viewport: Viewport,
    pub(crate) scissor: Rect,
    pub(crate) fragment_samplers: [Option<BoundSampler>; MAX_TEXTURE_SAMPLERS],
    pub(crate) vertex_samplers: [Option<BoundSampler>; MAX_VERTEX_TEXTURE_SAMPLERS],
    pub(crate) vertex_bindings: Vec<VertexBufferBinding>,
    pub(crate) base_vertex: i32,
    pub(crate) targets: TargetState,

    // ===== PASS STATE =====
    pub(crate) active_pass: Option<ActivePass>,
    pub(crate) need_new_render_pass: bool,
    pub(crate) preserve_next_pass: bool,
    pub(crate) pending_clear: Option<PendingClear>,
    pub(crate) bound_pipeline: vk::Pipeline,

    pub(crate) draw_calls: u32,
}

impl VulkanRenderer {
    /// Create the device for `params.device_window`
    pub fn new(params: &PresentationParameters, config: &Config, shader_factory: &ShaderContextFactory) -> Result<Self> {
        let window = params.device_window.clone().ok_or_else(|| {
            engine_error!("fna3d::vulkan", "Device creation requires a window");
            Error::InitializationFailed("No device window".to_string())
        })?;

        let mut ctx = GpuContext::new(window.as_ref(), config)?;

        let device_info = ShaderDeviceInfo {
            instance: &ctx.instance,
            device: &ctx.device,
            physical_device: ctx.physical_device,
            queue_family_index: ctx.queue_family_index,
            memory_properties: &ctx.memory_properties,
            limits: &ctx.properties.limits,
            frames_in_flight: MAX_FRAMES_IN_FLIGHT as u32,
        };
        let shader_context = match shader_factory(&device_info) {
            Ok(shader_context) => shader_context,
            Err(e) => {
                engine_error!("fna3d::vulkan", "Shader context creation failed: {}", e);
                ctx.destroy();
                return Err(e);
            }
        };

        let allocator = MemoryAllocator::new(ctx.memory_properties, config.device_local_heap_usage_factor);
        let (width, height) = (params.back_buffer_width.max(1), params.back_buffer_height.max(1));

        // Everything starts null; Drop tolerates a partially initialized device
        let mut renderer = Self {
            ctx,
            config: config.clone(),
            shader_context: ManuallyDrop::new(shader_context),

            allocator,
            staging: None,
            buffers: BufferStore::new(),
            textures: SlotMap::with_key(),
            renderbuffers: SlotMap::with_key(),
            effects: SlotMap::with_key(),
            effect_tracker: EffectTracker::new(),
            queries: SlotMap::with_key(),
            query_slots: QuerySlots::new(),
            query_pool: vk::QueryPool::null(),
            active_query: None,
            dispose_queue: DisposeQueue::new(),
            dummies: DummyResources::empty(),

            scheduler: CommandBufferScheduler::new(vk::CommandPool::null(), [vk::Fence::null(); MAX_FRAMES_IN_FLIGHT]),

            render_passes: HandleCache::new(),
            framebuffers: HandleCache::new(),
            pipelines: HandleCache::new(),
            pipeline_layouts: HandleCache::new(),
            set_layouts: HandleCache::new(),
            samplers: HandleCache::new(),
            pipeline_cache: vk::PipelineCache::null(),
            vertex_layouts: VertexInputLayoutCache::new(),
            descriptor_sets: DescriptorSetManager::new(config.descriptor_set_deactivate_frames),

            swapchains: Vec::new(),
            present_options: PresentOptions {
                interval: params.presentation_interval,
                force_mailbox_vsync: config.force_mailbox_vsync,
                enable_late_swap_tear: config.enable_late_swap_tear,
            },
            device_window: window,
            backbuffer: FauxBackbuffer {
                texture: TextureHandle::default(),
                msaa: None,
                depth_stencil: None,
                width,
                height,
                surface_format: params.back_buffer_format,
                depth_format: params.depth_stencil_format,
                multi_sample_count: 1,
            },

            blend_state: BlendState::default(),
            depth_stencil_state: DepthStencilState::default(),
            rasterizer_state: RasterizerState::default(),
            blend_factor: Color::WHITE,
            multi_sample_mask: -1,
            stencil_ref: 0,
            viewport: Viewport { x: 0, y: 0, w: width as i32, h: height as i32, min_depth: 0.0, max_depth: 1.0 },
            scissor: Rect::new(0, 0, width as i32, height as i32),
            fragment_samplers: [None; MAX_TEXTURE_SAMPLERS],
            vertex_samplers: [None; MAX_VERTEX_TEXTURE_SAMPLERS],
            vertex_bindings: Vec::new(),
            base_vertex: 0,
            targets: TargetState::default(),

            active_pass: None,
            need_new_render_pass: true,
            preserve_next_pass: false,
            pending_clear: None,
            bound_pipeline: vk::Pipeline::null(),

            draw_calls: 0,
        };

        renderer.init(params)?;

        engine_info!("fna3d::vulkan", "Vulkan device created: {}x{} {:?} backbuffer, {}x MSAA",
            renderer.backbuffer.width, renderer.backbuffer.height,
            renderer.backbuffer.surface_format, renderer.backbuffer.multi_sample_count);
        Ok(renderer)
    }

    fn init(&mut self, params: &PresentationParameters) -> Result<()> {
        let device = &self.ctx.device;

        // Commands
        let pool_info = vk::CommandPoolCreateInfo::default()
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
            .queue_family_index(self.ctx.queue_family_index);
        let command_pool = vk_try!("vkCreateCommandPool", unsafe { device.create_command_pool(&pool_info, None) });
        let mut fences = [vk::Fence::null(); MAX_FRAMES_IN_FLIGHT];
        let fence_info = vk::FenceCreateInfo::default().flags(vk::FenceCreateFlags::SIGNALED);
        for fence in fences.iter_mut() {
            match unsafe { device.create_fence(&fence_info, None) } {
                Ok(created) => *fence = created,
                Err(e) => {
                    // The scheduler does not own them yet
                    unsafe {
                        for created in fences.iter().filter(|f| **f != vk::Fence::null()) {
                            device.destroy_fence(*created, None);
                        }
                        device.destroy_command_pool(command_pool, None);
                    }
                    return Err(crate::vk_error("vkCreateFence", e));
                }
            }
        }
        self.scheduler = CommandBufferScheduler::new(command_pool, fences);
        self.scheduler.ensure_begun(&self.ctx)?;

        // Occlusion queries
        let query_info = vk::QueryPoolCreateInfo::default()
            .query_type(vk::QueryType::OCCLUSION)
            .query_count(MAX_QUERIES);
        self.query_pool = vk_try!("vkCreateQueryPool", unsafe { self.ctx.device.create_query_pool(&query_info, None) });

        let cache_path = self.config.pipeline_cache_file_name.clone();
        self.pipeline_cache = create_pipeline_cache(&self.ctx.device, &self.ctx.properties, cache_path.as_deref().map(Path::new))?;

        self.staging = Some(StagingBuffers::new(&self.ctx, &mut self.allocator)?);

        self.create_dummy_resources()?;
        self.create_backbuffer(params)?;

        // Dummy and backbuffer uploads go out before the first frame
        self.flush_and_wait()
    }

    pub(crate) fn unknown(what: &str) -> Error {
        engine_warn!("fna3d::vulkan", "Unknown {} handle", what);
        Error::InvalidResource(format!("Unknown {}", what))
    }

    /// Multisample count for a requested color target count
    pub(crate) fn supported_sample_count(&self, requested: u32) -> u32 {
        max_supported_sample_count(self.ctx.properties.limits.framebuffer_color_sample_counts, requested)
    }
}

impl Drop for VulkanRenderer {
    fn drop(&mut self) {
        // Nothing may be in flight past this point
        self.scheduler.wait_idle(&self.ctx);
        self.ctx.wait_idle();
        for item in self.dispose_queue.take_all() {
            self.destroy_pending(item);
        }

        if let Some(name) = self.config.pipeline_cache_file_name.as_deref() {
            if self.pipeline_cache != vk::PipelineCache::null() {
                save_pipeline_cache(&self.ctx.device, self.pipeline_cache, Path::new(name));
            }
        }

        for data in self.swapchains.drain(..) {
            destroy_swapchain(&self.ctx, data);
        }

        // Effects live in the shader context, which goes before the device
        for (_, effect) in self.effects.drain() {
            self.shader_context.delete_effect(effect.id);
        }
        unsafe { ManuallyDrop::drop(&mut self.shader_context) };

        let device = &self.ctx.device;
        unsafe {
            for (_, texture) in self.textures.drain() {
                if texture.external {
                    continue;
                }
                for view in texture.views() {
                    device.destroy_image_view(view, None);
                }
                device.destroy_image(texture.image, None);
                if let Some(region) = texture.region {
                    self.allocator.free_resource_memory(region);
                }
            }
            for (_, renderbuffer) in self.renderbuffers.drain() {
                let image = renderbuffer.image();
                device.destroy_image_view(image.view, None);
                device.destroy_image(image.image, None);
                self.allocator.free_resource_memory(image.region);
            }
        }

        self.buffers.destroy_all(&self.ctx, &mut self.allocator);
        if self.dummies.uniform_buffer != vk::Buffer::null() {
            self.ctx.destroy_buffer(self.dummies.uniform_buffer);
        }
        if let Some(region) = self.dummies.uniform_region.take() {
            self.allocator.free_resource_memory(region);
        }
        if let Some(staging) = self.staging.take() {
            staging.destroy(&self.ctx, &mut self.allocator);
        }
        self.descriptor_sets.destroy_all(&self.ctx);

        let scheduler = std::mem::replace(
            &mut self.scheduler,
            CommandBufferScheduler::new(vk::CommandPool::null(), [vk::Fence::null(); MAX_FRAMES_IN_FLIGHT]),
        );
        let (command_pool, fences) = scheduler.into_handles();

        let device = &self.ctx.device;
        unsafe {
            for (_, framebuffer) in self.framebuffers.drain() {
                device.destroy_framebuffer(framebuffer, None);
            }
            for (_, pipeline) in self.pipelines.drain() {
                device.destroy_pipeline(pipeline, None);
            }
            for (_, render_pass) in self.render_passes.drain() {
                device.destroy_render_pass(render_pass, None);
            }
            for (_, layout) in self.pipeline_layouts.drain() {
                device.destroy_pipeline_layout(layout, None);
            }
            for (_, layout) in self.set_layouts.drain() {
                device.destroy_descriptor_set_layout(layout, None);
            }
            for (_, sampler) in self.samplers.drain() {
                device.destroy_sampler(sampler, None);
            }
            device.destroy_pipeline_cache(self.pipeline_cache, None);
            device.destroy_query_pool(self.query_pool, None);
            for fence in fences {
                device.destroy_fence(fence, None);
            }
            device.destroy_command_pool(command_pool, None);
        }

        self.allocator.destroy_all(&self.ctx);

        #[cfg(feature = "vulkan-validation")]
        if self.config.enable_validation_stats {
            engine_info!("fna3d::vulkan", "{}", crate::debug::validation_stats_report());
        }

        self.ctx.destroy();
        engine_debug!("fna3d::vulkan", "Vulkan device destroyed");
    }
}

// ============================================================================
// DEVICE TRAIT
// ============================================================================

impl Device for VulkanRenderer {
    // ===== PRESENTATION =====

    fn swap_buffers(
        &mut self,
        source_rect: Option<Rect>,
        destination_rect: Option<Rect>,
        window: Option<Arc<dyn DeviceWindow>>,
    ) -> Result<()> {
        self.present_frame(source_rect, destination_rect, window)
    }

    fn reset_backbuffer(&mut self, params: &PresentationParameters) -> Result<()> {
        self.reset_backbuffer_impl(params)
    }

    fn read_backbuffer(&mut self, x: i32, y: i32, w: i32, h: i32, data: &mut [u8]) -> Result<()> {
        self.read_backbuffer_impl(x, y, w, h, data)
    }

    fn backbuffer_size(&self) -> (u32, u32) {
        (self.backbuffer.width, self.backbuffer.height)
    }

    fn backbuffer_surface_format(&self) -> SurfaceFormat {
        self.backbuffer.surface_format
    }

    fn backbuffer_depth_format(&self) -> DepthFormat {
        self.backbuffer.depth_format
    }

    fn backbuffer_multi_sample_count(&self) -> u32 {
        self.backbuffer.multi_sample_count
    }

    // ===== DRAWING =====

    fn clear(&mut self, options: ClearOptions, color: Vec4, depth: f32, stencil: i32) {
        self.queue_clear(options, color, depth, stencil);
    }

    fn draw_indexed_primitives(
        &mut self,
        primitive_type: PrimitiveType,
        _base_vertex: i32,
        _min_vertex_index: i32,
        _num_vertices: i32,
        start_index: i32,
        primitive_count: i32,
        indices: BufferHandle,
        index_element_size: IndexElementSize,
    ) -> Result<()> {
        self.draw_indexed(primitive_type, start_index, primitive_count, 1, indices, index_element_size)
    }

    fn draw_instanced_primitives(
        &mut self,
        primitive_type: PrimitiveType,
        _base_vertex: i32,
        _min_vertex_index: i32,
        _num_vertices: i32,
        start_index: i32,
        primitive_count: i32,
        instance_count: i32,
        indices: BufferHandle,
        index_element_size: IndexElementSize,
    ) -> Result<()> {
        self.draw_indexed(primitive_type, start_index, primitive_count, instance_count, indices, index_element_size)
    }

    fn draw_primitives(&mut self, primitive_type: PrimitiveType, vertex_start: i32, primitive_count: i32) -> Result<()> {
        self.draw(primitive_type, vertex_start, primitive_count)
    }

    // ===== MUTABLE RENDER STATE =====

    fn set_viewport(&mut self, viewport: &Viewport) {
        if self.viewport != *viewport {
            self.viewport = *viewport;
            self.refresh_dynamic_state();
        }
    }

    fn set_scissor_rect(&mut self, scissor: &Rect) {
        if self.scissor != *scissor {
            self.scissor = *scissor;
            self.refresh_dynamic_state();
        }
    }

    fn blend_factor(&self) -> Color {
        self.blend_factor
    }

    fn set_blend_factor(&mut self, blend_factor: Color) {
        if self.blend_factor != blend_factor {
            self.blend_factor = blend_factor;
            self.refresh_dynamic_state();
        }
    }

    fn multi_sample_mask(&self) -> i32 {
        self.multi_sample_mask
    }

    fn set_multi_sample_mask(&mut self, mask: i32) {
        if self.multi_sample_mask == mask {
            return;
        }
        if self.backbuffer.multi_sample_count > 32 || self.active_pass.is_some_and(|p| p.multi_sample_count > 32) {
            engine_warn!("fna3d::vulkan",
                "32-bit multisample mask used with a 64-sample rasterizer; the upper 32 samples stay enabled");
        }
        self.multi_sample_mask = mask;
    }

    fn reference_stencil(&self) -> i32 {
        self.stencil_ref
    }

    fn set_reference_stencil(&mut self, reference: i32) {
        if self.stencil_ref != reference {
            self.stencil_ref = reference;
            self.refresh_dynamic_state();
        }
    }

    // ===== IMMUTABLE RENDER STATE =====

    fn set_blend_state(&mut self, blend_state: &BlendState) {
        self.blend_state = *blend_state;
        self.set_blend_factor(blend_state.blend_factor);
        self.set_multi_sample_mask(blend_state.multi_sample_mask);
    }

    fn set_depth_stencil_state(&mut self, depth_stencil_state: &DepthStencilState) {
        self.depth_stencil_state = *depth_stencil_state;
        self.set_reference_stencil(depth_stencil_state.reference_stencil);
    }

    fn apply_rasterizer_state(&mut self, rasterizer_state: &RasterizerState) {
        if self.rasterizer_state != *rasterizer_state {
            self.rasterizer_state = *rasterizer_state;
            // Scissor test and depth bias are dynamic
            self.refresh_dynamic_state();
        }
    }

    fn verify_sampler(&mut self, index: usize, texture: Option<TextureHandle>, sampler: &SamplerState) -> Result<()> {
        self.bind_sampler(ShaderStage::Fragment, index, texture, sampler)
    }

    fn verify_vertex_sampler(&mut self, index: usize, texture: Option<TextureHandle>, sampler: &SamplerState) -> Result<()> {
        self.bind_sampler(ShaderStage::Vertex, index, texture, sampler)
    }

    // ===== VERTEX STATE =====

    fn apply_vertex_buffer_bindings(&mut self, bindings: &[VertexBufferBinding], bindings_updated: bool, base_vertex: i32) -> Result<()> {
        if bindings_updated || self.vertex_bindings.as_slice() != bindings {
            self.vertex_bindings = bindings.to_vec();
        }
        self.base_vertex = base_vertex;
        Ok(())
    }

    // ===== RENDER TARGETS =====

    fn set_render_targets(
        &mut self,
        targets: &[RenderTargetBinding],
        depth_stencil_buffer: Option<RenderbufferHandle>,
        depth_format: DepthFormat,
        preserve_target_contents: bool,
    ) -> Result<()> {
        self.set_render_targets_impl(targets, depth_stencil_buffer, depth_format, preserve_target_contents)
    }

    fn resolve_target(&mut self, target: &RenderTargetBinding) -> Result<()> {
        self.resolve_target_impl(target)
    }

    // ===== TEXTURES =====

    fn create_texture_2d(&mut self, format: SurfaceFormat, width: u32, height: u32, level_count: u32, is_render_target: bool) -> Result<TextureHandle> {
        self.create_texture_2d_impl(format, width, height, level_count, is_render_target)
    }

    fn create_texture_3d(&mut self, format: SurfaceFormat, width: u32, height: u32, depth: u32, level_count: u32) -> Result<TextureHandle> {
        self.create_texture_3d_impl(format, width, height, depth, level_count)
    }

    fn create_texture_cube(&mut self, format: SurfaceFormat, size: u32, level_count: u32, is_render_target: bool) -> Result<TextureHandle> {
        self.create_texture_cube_impl(format, size, level_count, is_render_target)
    }

    fn add_dispose_texture(&mut self, texture: TextureHandle) {
        self.dispose_texture(texture);
    }

    fn set_texture_data_2d(&mut self, texture: TextureHandle, x: u32, y: u32, w: u32, h: u32, level: u32, data: &[u8]) -> Result<()> {
        self.upload_texture(texture, [x, y, 0], [w, h, 1], level, 0, data)
    }

    fn set_texture_data_3d(&mut self, texture: TextureHandle, x: u32, y: u32, z: u32, w: u32, h: u32, d: u32, level: u32, data: &[u8]) -> Result<()> {
        self.upload_texture(texture, [x, y, z], [w, h, d], level, 0, data)
    }

    fn set_texture_data_cube(&mut self, texture: TextureHandle, x: u32, y: u32, w: u32, h: u32, face: CubeMapFace, level: u32, data: &[u8]) -> Result<()> {
        self.upload_texture(texture, [x, y, 0], [w, h, 1], level, face.index() as u32, data)
    }

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
    ) -> Result<()> {
        self.upload_yuv(y, u, v, y_width, y_height, uv_width, uv_height, data)
    }

    fn get_texture_data_2d(&mut self, texture: TextureHandle, x: u32, y: u32, w: u32, h: u32, level: u32, data: &mut [u8]) -> Result<()> {
        self.download_texture(texture, [x, y, 0], [w, h, 1], level, 0, data)
    }

    fn get_texture_data_3d(&mut self, texture: TextureHandle, x: u32, y: u32, z: u32, w: u32, h: u32, d: u32, level: u32, data: &mut [u8]) -> Result<()> {
        self.download_texture(texture, [x, y, z], [w, h, d], level, 0, data)
    }

    fn get_texture_data_cube(&mut self, texture: TextureHandle, x: u32, y: u32, w: u32, h: u32, face: CubeMapFace, level: u32, data: &mut [u8]) -> Result<()> {
        self.download_texture(texture, [x, y, 0], [w, h, 1], level, face.index() as u32, data)
    }

    fn set_texture_name(&mut self, texture: TextureHandle, name: &str) {
        if let Some(entry) = self.textures.get(texture) {
            self.ctx.set_object_name(entry.image, name);
        }
    }

    // ===== RENDERBUFFERS =====

    fn gen_color_renderbuffer(&mut self, width: u32, height: u32, format: SurfaceFormat, multi_sample_count: u32, texture: TextureHandle) -> Result<RenderbufferHandle> {
        self.create_color_renderbuffer(width, height, format, multi_sample_count, texture)
    }

    fn gen_depth_stencil_renderbuffer(&mut self, width: u32, height: u32, format: DepthFormat, multi_sample_count: u32) -> Result<RenderbufferHandle> {
        self.create_depth_renderbuffer(width, height, format, multi_sample_count)
    }

    fn add_dispose_renderbuffer(&mut self, renderbuffer: RenderbufferHandle) {
        self.dispose_renderbuffer(renderbuffer);
    }

    // ===== BUFFERS =====

    fn gen_vertex_buffer(&mut self, dynamic: bool, usage: BufferUsage, size_in_bytes: usize) -> Result<BufferHandle> {
        self.create_buffer(BufferKind::Vertex, dynamic, usage, size_in_bytes)
    }

    fn add_dispose_vertex_buffer(&mut self, buffer: BufferHandle) {
        self.dispose_buffer(buffer);
    }

    fn set_vertex_buffer_data(
        &mut self,
        buffer: BufferHandle,
        offset_in_bytes: usize,
        data: &[u8],
        element_count: usize,
        element_size_in_bytes: usize,
        vertex_stride: usize,
        options: SetDataOptions,
    ) -> Result<()> {
        let length = vertex_data_length(data.len(), element_count, element_size_in_bytes, vertex_stride);
        self.write_buffer(buffer, offset_in_bytes, &data[..length], options)
    }

    fn get_vertex_buffer_data(
        &mut self,
        buffer: BufferHandle,
        offset_in_bytes: usize,
        data: &mut [u8],
        element_count: usize,
        element_size_in_bytes: usize,
        vertex_stride: usize,
    ) -> Result<()> {
        self.read_vertex_buffer(buffer, offset_in_bytes, data, element_count, element_size_in_bytes, vertex_stride)
    }

    fn gen_index_buffer(&mut self, dynamic: bool, usage: BufferUsage, size_in_bytes: usize) -> Result<BufferHandle> {
        self.create_buffer(BufferKind::Index, dynamic, usage, size_in_bytes)
    }

    fn add_dispose_index_buffer(&mut self, buffer: BufferHandle) {
        self.dispose_buffer(buffer);
    }

    fn set_index_buffer_data(&mut self, buffer: BufferHandle, offset_in_bytes: usize, data: &[u8], options: SetDataOptions) -> Result<()> {
        self.write_buffer(buffer, offset_in_bytes, data, options)
    }

    fn get_index_buffer_data(&mut self, buffer: BufferHandle, offset_in_bytes: usize, data: &mut [u8]) -> Result<()> {
        self.read_buffer(buffer, offset_in_bytes, data)
    }

    // ===== EFFECTS =====

    fn create_effect(&mut self, code: &[u8]) -> Result<EffectHandle> {
        self.create_effect_impl(code)
    }

    fn clone_effect(&mut self, effect: EffectHandle) -> Result<EffectHandle> {
        self.clone_effect_impl(effect)
    }

    fn add_dispose_effect(&mut self, effect: EffectHandle) {
        self.dispose_effect(effect);
    }

    fn set_effect_technique(&mut self, effect: EffectHandle, technique: usize) -> Result<()> {
        self.set_effect_technique_impl(effect, technique)
    }

    fn apply_effect(&mut self, effect: EffectHandle, pass: u32, state_changes: &mut EffectStateChanges) -> Result<()> {
        self.apply_effect_impl(effect, pass, state_changes)
    }

    fn begin_pass_restore(&mut self, effect: EffectHandle, state_changes: &mut EffectStateChanges) -> Result<()> {
        self.begin_pass_restore_impl(effect, state_changes)
    }

    fn end_pass_restore(&mut self, effect: EffectHandle) -> Result<()> {
        self.end_pass_restore_impl(effect)
    }

    // ===== QUERIES =====

    fn create_query(&mut self) -> Result<QueryHandle> {
        self.create_query_impl()
    }

    fn add_dispose_query(&mut self, query: QueryHandle) {
        self.dispose_query(query);
    }

    fn query_begin(&mut self, query: QueryHandle) -> Result<()> {
        self.query_begin_impl(query)
    }

    fn query_end(&mut self, query: QueryHandle) -> Result<()> {
        self.query_end_impl(query)
    }

    fn query_complete(&mut self, query: QueryHandle) -> bool {
        self.query_result(query).is_some()
    }

    fn query_pixel_count(&mut self, query: QueryHandle) -> u64 {
        self.query_result(query).unwrap_or(0)
    }

    // ===== FEATURE QUERIES =====

    fn supports_dxt1(&self) -> bool {
        self.ctx.features.supports_dxt1
    }

    fn supports_s3tc(&self) -> bool {
        self.ctx.features.supports_s3tc
    }

    fn supports_bc7(&self) -> bool {
        self.ctx.features.supports_bc7
    }

    fn supports_hardware_instancing(&self) -> bool {
        true
    }

    fn supports_no_overwrite(&self) -> bool {
        true
    }

    fn supports_srgb_render_targets(&self) -> bool {
        true
    }

    fn max_texture_slots(&self) -> (usize, usize) {
        (MAX_TEXTURE_SAMPLERS, MAX_VERTEX_TEXTURE_SAMPLERS)
    }

    fn max_multi_sample_count(&self, _format: SurfaceFormat, multi_sample_count: u32) -> u32 {
        self.supported_sample_count(multi_sample_count)
    }

    // ===== DEBUGGING =====

    fn set_string_marker(&mut self, text: &str) {
        match self.scheduler.record(&self.ctx) {
            Ok(command_buffer) => self.ctx.insert_label(command_buffer, text),
            Err(e) => engine_warn!("fna3d::vulkan", "String marker dropped: {}", e),
        }
    }

    fn stats(&self) -> DeviceStats {
        DeviceStats {
            draw_calls: self.draw_calls,
            submissions: self.scheduler.submissions(),
            device_local_bytes_used: self.allocator.device_local_bytes_used(),
        }
    }

    // ===== INTEROP =====

    fn sys_renderer(&self) -> SysRenderer {
        SysRenderer::Vulkan {
            instance: self.ctx.instance.handle().as_raw(),
            physical_device: self.ctx.physical_device.as_raw(),
            logical_device: self.ctx.device.handle().as_raw(),
            queue_family_index: self.ctx.queue_family_index,
        }
    }

    fn create_sys_texture(&mut self, texture: &SysTexture) -> Result<TextureHandle> {
        let SysTexture::Vulkan { image, view } = *texture;
        self.import_texture(vk::Image::from_raw(image), vk::ImageView::from_raw(view))
    }
}

/// Bytes of a vertex upload: `element_count` whole strides, never past the source data
pub(crate) fn vertex_data_length(data_len: usize, element_count: usize, element_size: usize, vertex_stride: usize) -> usize {
    let stride = if vertex_stride == 0 { element_size } else { vertex_stride };
    element_count.saturating_mul(stride).min(data_len)
}

#[cfg(test)]
#[path = "vulkan_tests.rs"]
mod tests;
