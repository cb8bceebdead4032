/// Hash-keyed caches of immutable Vulkan objects
///
/// Render passes, framebuffers, pipelines, pipeline layouts, descriptor-set
/// layouts and samplers are created once per distinct key and reused. Keys
/// are plain structs compared field by field, so two keys that merely hash
/// alike never share a handle.

use std::hash::Hash;
use ash::vk;
use rustc_hash::FxHashMap;
use fna3d::fna3d::render::{
    BlendState, DepthStencilState, RasterizerState, SamplerState, PrimitiveType,
    FillMode, CullMode,
};

use crate::mojoshader::ShaderHandle;

/// Color attachments a render pass can have
pub const MAX_RENDERTARGET_BINDINGS: usize = 4;

/// Append-only handle cache
pub struct HandleCache<K, V> {
    map: FxHashMap<K, V>,
}

impl<K: Eq + Hash, V: Copy> Default for HandleCache<K, V> {
    fn default() -> Self {
        Self { map: FxHashMap::default() }
    }
}

impl<K: Eq + Hash, V: Copy> HandleCache<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fetch(&self, key: &K) -> Option<V> {
        self.map.get(key).copied()
    }

    pub fn insert(&mut self, key: K, value: V) {
        self.map.insert(key, value);
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Remove every entry (device teardown)
    pub fn drain(&mut self) -> impl Iterator<Item = (K, V)> + '_ {
        self.map.drain()
    }

    /// Remove every entry matching `remove`, returning their handles
    pub fn remove_where(&mut self, mut remove: impl FnMut(&K) -> bool) -> Vec<V> {
        let mut removed = Vec::new();
        self.map.retain(|key, value| {
            if remove(key) {
                removed.push(*value);
                false
            } else {
                true
            }
        });
        removed
    }
}

// ============================================================================
// KEYS
// ============================================================================

/// Everything that makes two render passes incompatible
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RenderPassHash {
    pub color_formats: [vk::Format; MAX_RENDERTARGET_BINDINGS],
    pub color_count: u32,
    pub depth_stencil_format: vk::Format,
    pub clear_color: bool,
    pub clear_depth: bool,
    pub clear_stencil: bool,
    pub preserve_target_contents: bool,
    pub multi_sample_count: u32,
}

impl Default for RenderPassHash {
    fn default() -> Self {
        Self {
            color_formats: [vk::Format::UNDEFINED; MAX_RENDERTARGET_BINDINGS],
            color_count: 0,
            depth_stencil_format: vk::Format::UNDEFINED,
            clear_color: false,
            clear_depth: false,
            clear_stencil: false,
            preserve_target_contents: false,
            multi_sample_count: 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FramebufferHash {
    pub color_views: [vk::ImageView; MAX_RENDERTARGET_BINDINGS],
    pub resolve_views: [vk::ImageView; MAX_RENDERTARGET_BINDINGS],
    pub depth_stencil_view: vk::ImageView,
    pub width: u32,
    pub height: u32,
    pub render_pass: vk::RenderPass,
}

impl FramebufferHash {
    pub fn references_view(&self, view: vk::ImageView) -> bool {
        self.depth_stencil_view == view
            || self.color_views.contains(&view)
            || self.resolve_views.contains(&view)
    }
}

/// Two 64-bit words of packed fixed-function state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PackedState {
    pub a: u64,
    pub b: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PipelineHash {
    pub blend_state: PackedState,
    pub rasterizer_state: PackedState,
    pub depth_stencil_state: PackedState,
    pub vertex_binding_layout_index: u32,
    pub primitive_type: PrimitiveType,
    pub sample_mask: u32,
    pub vertex_shader: ShaderHandle,
    pub fragment_shader: ShaderHandle,
    pub render_pass: vk::RenderPass,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PipelineLayoutHash {
    pub vertex_sampler_count: u32,
    pub fragment_sampler_count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DescriptorSetLayoutHash {
    pub descriptor_type: vk::DescriptorType,
    pub stage: vk::ShaderStageFlags,
    pub binding_count: u32,
}

// ============================================================================
// STATE PACKING
// ============================================================================

/// Blend state minus the dynamic blend factor
pub fn pack_blend_state(state: &BlendState) -> PackedState {
    let a = (state.color_source_blend as u64)
        | (state.color_destination_blend as u64) << 4
        | (state.color_blend_function as u64) << 8
        | (state.alpha_source_blend as u64) << 12
        | (state.alpha_destination_blend as u64) << 16
        | (state.alpha_blend_function as u64) << 20
        | (state.color_write_enable.bits() as u64) << 24
        | (state.color_write_enable1.bits() as u64) << 28
        | (state.color_write_enable2.bits() as u64) << 32
        | (state.color_write_enable3.bits() as u64) << 36;
    PackedState { a, b: 0 }
}

/// Depth-stencil state minus the dynamic reference value
pub fn pack_depth_stencil_state(state: &DepthStencilState) -> PackedState {
    let a = (state.depth_buffer_enable as u64)
        | (state.depth_buffer_write_enable as u64) << 1
        | (state.depth_buffer_function as u64) << 2
        | (state.stencil_enable as u64) << 5
        | (state.two_sided_stencil_mode as u64) << 6
        | (state.stencil_fail as u64) << 7
        | (state.stencil_depth_buffer_fail as u64) << 10
        | (state.stencil_pass as u64) << 13
        | (state.stencil_function as u64) << 16
        | (state.ccw_stencil_fail as u64) << 19
        | (state.ccw_stencil_depth_buffer_fail as u64) << 22
        | (state.ccw_stencil_pass as u64) << 25
        | (state.ccw_stencil_function as u64) << 28;
    let b = (state.stencil_mask as u32 as u64) | (state.stencil_write_mask as u32 as u64) << 32;
    PackedState { a, b }
}

/// Rasterizer state; depth bias values are dynamic, only their use is packed
pub fn pack_rasterizer_state(state: &RasterizerState, multi_sample_count: u32) -> PackedState {
    let fill = match state.fill_mode {
        FillMode::Solid => 0u64,
        FillMode::WireFrame => 1,
    };
    let cull = match state.cull_mode {
        CullMode::None => 0u64,
        CullMode::CullClockwiseFace => 1,
        CullMode::CullCounterClockwiseFace => 2,
    };
    let depth_bias = state.depth_bias != 0.0 || state.slope_scale_depth_bias != 0.0;
    let multi_sample = state.multi_sample_anti_alias && multi_sample_count > 1;

    let a = fill | cull << 1 | (depth_bias as u64) << 3 | (multi_sample as u64) << 4;
    PackedState { a, b: multi_sample_count as u64 }
}

/// Sampler cache key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SamplerStateHash(pub PackedState);

pub fn pack_sampler_state(state: &SamplerState) -> SamplerStateHash {
    let a = (state.filter as u64)
        | (state.address_u as u64) << 4
        | (state.address_v as u64) << 6
        | (state.address_w as u64) << 8
        | (state.max_anisotropy.clamp(0, 0xFF) as u64) << 10
        | (state.max_mip_level.clamp(0, 0xFF) as u64) << 18;
    let b = state.mip_map_level_of_detail_bias.to_bits() as u64;
    SamplerStateHash(PackedState { a, b })
}

#[cfg(test)]
#[path = "vulkan_cache_tests.rs"]
mod tests;
