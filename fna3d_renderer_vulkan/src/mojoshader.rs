/// ShaderContext - the shader translator and effect framework seen by the renderer
///
/// Shader bytecode translation, effect parsing and uniform-buffer management
/// live behind this trait. The renderer only asks which shaders are bound,
/// what they sample, where their uniforms are and which `VkShaderModule`s to
/// build pipelines from.

use ash::vk;
use fna3d::fna3d::Result;
use fna3d::fna3d::render::{EffectStateChanges, VertexElementUsage};

/// Opaque identity of a translated shader, stable for the shader's lifetime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct ShaderHandle(pub u64);

/// Opaque identity of a compiled effect inside the shader context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EffectId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl ShaderStage {
    pub fn stage_flags(self) -> vk::ShaderStageFlags {
        match self {
            ShaderStage::Vertex => vk::ShaderStageFlags::VERTEX,
            ShaderStage::Fragment => vk::ShaderStageFlags::FRAGMENT,
        }
    }
}

/// Dimensionality of a sampler a shader declares
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SamplerType {
    TwoD,
    ThreeD,
    Cube,
}

/// One sampler declared by a shader
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShaderSampler {
    /// Sampler register (texture slot) the shader reads
    pub index: u32,
    pub kind: SamplerType,
}

/// What the renderer needs to know about a translated shader
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderParseData {
    pub stage: ShaderStage,
    pub samplers: Vec<ShaderSampler>,
    /// Bytes of uniform data; 0 when the shader declares no uniforms
    pub uniform_buffer_size: u64,
    pub main_fn: String,
}

/// Current uniform block of one stage inside the shader context's ring buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UniformBufferBinding {
    pub buffer: vk::Buffer,
    pub offset: u64,
    pub size: u64,
}

/// Device information handed to a shader context factory
pub struct ShaderDeviceInfo<'a> {
    pub instance: &'a ash::Instance,
    pub device: &'a ash::Device,
    pub physical_device: vk::PhysicalDevice,
    pub queue_family_index: u32,
    pub memory_properties: &'a vk::PhysicalDeviceMemoryProperties,
    pub limits: &'a vk::PhysicalDeviceLimits,
    /// Submissions the uniform ring must cover
    pub frames_in_flight: u32,
}

/// Factory used by the Vulkan driver to create its shader context
pub type ShaderContextFactory = Box<dyn Fn(&ShaderDeviceInfo<'_>) -> Result<Box<dyn ShaderContext>> + Send + Sync>;

pub trait ShaderContext: Send {
    // ===== EFFECTS =====

    fn compile_effect(&mut self, code: &[u8]) -> Result<EffectId>;
    fn clone_effect(&mut self, effect: EffectId) -> Result<EffectId>;
    fn delete_effect(&mut self, effect: EffectId);
    fn set_technique(&mut self, effect: EffectId, technique: usize) -> Result<()>;

    /// Begin an effect; returns the pass count of the current technique
    fn effect_begin(&mut self, effect: EffectId, save_state: bool, state_changes: &mut EffectStateChanges) -> Result<u32>;
    /// Bind the shaders of `pass`
    fn effect_begin_pass(&mut self, effect: EffectId, pass: u32) -> Result<()>;
    /// Push parameter changes made since the pass began
    fn effect_commit_changes(&mut self, effect: EffectId);
    fn effect_end_pass(&mut self, effect: EffectId);
    fn effect_end(&mut self, effect: EffectId);

    // ===== SHADERS =====

    /// (vertex, fragment) shaders currently bound
    fn bound_shaders(&self) -> (Option<ShaderHandle>, Option<ShaderHandle>);
    fn parse_data(&self, shader: ShaderHandle) -> Option<ShaderParseData>;
    /// (vertex, fragment) modules of the bound shaders
    fn shader_modules(&self) -> (vk::ShaderModule, vk::ShaderModule);
    /// Input location of a vertex attribute, if the shader reads it
    fn vertex_attribute_location(&self, shader: ShaderHandle, usage: VertexElementUsage, index: u32) -> Option<u32>;

    // ===== UNIFORMS =====

    /// (vertex, fragment) uniform blocks for the next draw; `None` for a stage without uniforms
    fn uniform_buffers(&mut self) -> (Option<UniformBufferBinding>, Option<UniformBufferBinding>);
    fn map_uniform_buffer_memory(&mut self);
    fn unmap_uniform_buffer_memory(&mut self);
    /// Rotate the uniform ring after a submission
    fn end_frame(&mut self);
}
