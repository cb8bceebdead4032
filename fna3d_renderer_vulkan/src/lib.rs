/*!
# FNA3D - Vulkan Driver

Vulkan implementation of the `fna3d::Device` interface, built on ash.

The crate is organised as a resource and command engine:

- **Memory**: a sub-allocator over large `VkDeviceMemory` blocks with
  deferred defragmentation, plus fast/slow staging buffers for transfers
- **Caches**: render passes, framebuffers, pipelines, layouts and samplers
  keyed by plain-data hash structs
- **Descriptors**: per-shader descriptor pools with content-addressed sets
- **Commands**: a double-buffered command-buffer scheduler with deferred
  destruction of everything in-flight commands may still reference
- **Presentation**: a faux backbuffer blitted into one swapchain per window

Shader translation and effects are consumed through the `ShaderContext` trait.
*/

use ash::vk;
use fna3d::fna3d::Error;

/// Evaluate a `VkResult` expression, returning the decoded error from the
/// enclosing function on failure
macro_rules! vk_try {
    ($call:literal, $expr:expr) => {
        match $expr {
            Ok(value) => value,
            Err(result) => return Err($crate::vk_error($call, result)),
        }
    };
}

/// Log a failed Vulkan call and map its result onto the engine error type
///
/// Out-of-memory results become `Error::OutOfMemory` so allocation paths can
/// retry with relaxed requirements.
pub(crate) fn vk_error(call: &str, result: vk::Result) -> Error {
    match result {
        vk::Result::ERROR_OUT_OF_DEVICE_MEMORY | vk::Result::ERROR_OUT_OF_HOST_MEMORY => {
            fna3d::engine_warn!("fna3d::vulkan", "{} failed: {:?}", call, result);
            Error::OutOfMemory
        }
        vk::Result::ERROR_DEVICE_LOST => {
            fna3d::engine_error!("fna3d::vulkan", "{}: device lost", call);
            Error::DeviceLost
        }
        _ => fna3d::engine_err!("fna3d::vulkan", "{} failed: {:?}", call, result),
    }
}

// Shader translator seam
mod mojoshader;

// Device seam and context
mod vulkan_dispatch;
mod vulkan_context;
#[cfg(test)]
mod mock_dispatch;

// Resource engine
mod vulkan_format;
mod vulkan_memory;
mod vulkan_staging;
mod vulkan_buffer;
mod vulkan_texture;
mod vulkan_barrier;
mod vulkan_cache;
mod vulkan_pipeline;
mod vulkan_pipeline_cache;
mod vulkan_descriptor_set;
mod vulkan_vertex_layout;
mod vulkan_command_list;
mod vulkan_dispose;
mod vulkan_query;
mod vulkan_swapchain;

// Device facade
mod vulkan;
mod vulkan_renderer_buffer;
mod vulkan_renderer_defrag;
mod vulkan_renderer_draw;
mod vulkan_renderer_effect;
mod vulkan_renderer_frame;
mod vulkan_renderer_pass;
mod vulkan_renderer_query;
mod vulkan_renderer_texture;

#[cfg(feature = "vulkan-validation")]
pub mod debug;

pub use vulkan::VulkanRenderer;
pub use mojoshader::{
    EffectId, SamplerType, ShaderContext, ShaderContextFactory, ShaderDeviceInfo, ShaderHandle, ShaderParseData,
    ShaderSampler, ShaderStage, UniformBufferBinding,
};

/// Name the driver registers under
pub const DRIVER_NAME: &str = "Vulkan";

/// Register the Vulkan driver with the engine
///
/// `shader_factory` creates the shader context of every device the driver
/// opens.
///
/// # Example
///
/// ```no_run
/// # fn factory() -> fna3d_renderer_vulkan::ShaderContextFactory { unimplemented!() }
/// use fna3d::fna3d::Engine;
/// use fna3d::fna3d::render::PresentationParameters;
///
/// fna3d_renderer_vulkan::register(factory())?;
/// let device = Engine::create_device(&PresentationParameters::default(), false)?;
/// # Ok::<(), fna3d::fna3d::Error>(())
/// ```
pub fn register(shader_factory: ShaderContextFactory) -> fna3d::fna3d::Result<()> {
    let shader_factory = std::sync::Arc::new(shader_factory);
    fna3d::fna3d::Engine::register_driver(DRIVER_NAME, move |params, config| {
        let renderer = VulkanRenderer::new(params, config, shader_factory.as_ref())?;
        Ok(Box::new(renderer) as Box<dyn fna3d::fna3d::Device>)
    })
}
