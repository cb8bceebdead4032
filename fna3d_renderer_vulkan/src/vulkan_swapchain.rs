/// Swapchain - per-window presentation state
///
/// Every window presented into gets its own `SwapchainData`: surface,
/// swapchain, image views and the semaphores pairing acquire, render and
/// present. Recreation (resize, OUT_OF_DATE) destroys everything and builds
/// it again from the window; an existing swapchain is never patched.

use std::sync::Arc;
use ash::vk;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use fna3d::fna3d::{Error, Result};
use fna3d::fna3d::render::{DeviceWindow, PresentInterval};
use fna3d::{engine_debug, engine_err, engine_error, engine_warn};

use crate::vulkan_barrier::ResourceAccessType;
use crate::vulkan_command_list::MAX_FRAMES_IN_FLIGHT;
use crate::vulkan_context::GpuContext;

/// Acquire timeout, about ten frames at 60 Hz
pub const ACQUIRE_TIMEOUT_NS: u64 = 10 * 16_666_667;

/// Presentation hints that pick the present mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PresentOptions {
    pub interval: PresentInterval,
    pub force_mailbox_vsync: bool,
    pub enable_late_swap_tear: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct SurfaceFormatChoice {
    pub format: vk::Format,
    pub color_space: vk::ColorSpaceKHR,
    /// Applied to the image views so RGBA swapchains read like BGRA ones
    pub swizzle: vk::ComponentMapping,
}

// ============================================================================
// CHOICES
// ============================================================================

/// B8G8R8A8_UNORM in sRGB-nonlinear space, else R8G8B8A8_UNORM swizzled to BGRA
pub fn choose_surface_format(available: &[vk::SurfaceFormatKHR]) -> Option<SurfaceFormatChoice> {
    use vk::ComponentSwizzle as S;

    let find = |format: vk::Format| {
        available
            .iter()
            .find(|f| f.format == format && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR)
    };

    if let Some(found) = find(vk::Format::B8G8R8A8_UNORM) {
        return Some(SurfaceFormatChoice {
            format: found.format,
            color_space: found.color_space,
            swizzle: vk::ComponentMapping {
                r: S::IDENTITY,
                g: S::IDENTITY,
                b: S::IDENTITY,
                a: S::IDENTITY,
            },
        });
    }

    find(vk::Format::R8G8B8A8_UNORM).map(|found| SurfaceFormatChoice {
        format: found.format,
        color_space: found.color_space,
        swizzle: vk::ComponentMapping { r: S::B, g: S::G, b: S::R, a: S::A },
    })
}

/// Present mode for a presentation interval
///
/// Vsync uses FIFO, or FIFO_RELAXED when late swap tearing is enabled, or
/// MAILBOX when forced. Modes the surface lacks fall back to FIFO, which
/// every surface supports.
pub fn choose_present_mode(options: &PresentOptions, available: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    let supports = |mode: vk::PresentModeKHR| available.contains(&mode);

    match options.interval {
        PresentInterval::Immediate => {
            if supports(vk::PresentModeKHR::IMMEDIATE) {
                vk::PresentModeKHR::IMMEDIATE
            } else {
                engine_warn!("fna3d::vulkan", "IMMEDIATE present mode unsupported, falling back to FIFO");
                vk::PresentModeKHR::FIFO
            }
        }
        PresentInterval::Default | PresentInterval::One => {
            if options.enable_late_swap_tear && supports(vk::PresentModeKHR::FIFO_RELAXED) {
                vk::PresentModeKHR::FIFO_RELAXED
            } else if options.force_mailbox_vsync && supports(vk::PresentModeKHR::MAILBOX) {
                vk::PresentModeKHR::MAILBOX
            } else {
                if options.enable_late_swap_tear || options.force_mailbox_vsync {
                    engine_warn!("fna3d::vulkan", "Requested vsync present mode unsupported, using FIFO");
                }
                vk::PresentModeKHR::FIFO
            }
        }
        PresentInterval::Two => {
            engine_warn!("fna3d::vulkan", "PresentInterval::Two is not supported, using FIFO");
            vk::PresentModeKHR::FIFO
        }
    }
}

/// Swapchain extent; `None` when the surface has zero area (minimized window)
pub fn choose_extent(capabilities: &vk::SurfaceCapabilitiesKHR, drawable: (u32, u32)) -> Option<vk::Extent2D> {
    let extent = if capabilities.current_extent.width != u32::MAX {
        capabilities.current_extent
    } else {
        vk::Extent2D {
            width: drawable.0.clamp(capabilities.min_image_extent.width, capabilities.max_image_extent.width),
            height: drawable.1.clamp(capabilities.min_image_extent.height, capabilities.max_image_extent.height),
        }
    };

    if extent.width == 0 || extent.height == 0 {
        None
    } else {
        Some(extent)
    }
}

/// One image more than the minimum, capped by the maximum (0 = unbounded)
pub fn choose_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let count = capabilities.min_image_count + 1;
    if capabilities.max_image_count > 0 {
        count.min(capabilities.max_image_count)
    } else {
        count
    }
}

// ============================================================================
// SWAPCHAIN DATA
// ============================================================================

pub struct SwapchainData {
    pub window: Arc<dyn DeviceWindow>,
    pub surface: vk::SurfaceKHR,
    pub swapchain: vk::SwapchainKHR,
    pub format: vk::Format,
    pub color_space: vk::ColorSpaceKHR,
    pub swizzle: vk::ComponentMapping,
    pub present_mode: vk::PresentModeKHR,
    pub extent: vk::Extent2D,
    pub images: Vec<vk::Image>,
    pub views: Vec<vk::ImageView>,
    /// Last access of each swapchain image, for blit barriers
    pub image_access: Vec<ResourceAccessType>,
    /// Indexed by submission slot
    pub image_available: [vk::Semaphore; MAX_FRAMES_IN_FLIGHT],
    pub render_finished: [vk::Semaphore; MAX_FRAMES_IN_FLIGHT],
}

impl SwapchainData {
    fn empty(window: Arc<dyn DeviceWindow>, surface: vk::SurfaceKHR) -> Self {
        Self {
            window,
            surface,
            swapchain: vk::SwapchainKHR::null(),
            format: vk::Format::UNDEFINED,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            swizzle: vk::ComponentMapping::default(),
            present_mode: vk::PresentModeKHR::FIFO,
            extent: vk::Extent2D::default(),
            images: Vec::new(),
            views: Vec::new(),
            image_access: Vec::new(),
            image_available: [vk::Semaphore::null(); MAX_FRAMES_IN_FLIGHT],
            render_finished: [vk::Semaphore::null(); MAX_FRAMES_IN_FLIGHT],
        }
    }
}

pub enum CreateSwapchainOutcome {
    Created(SwapchainData),
    /// The surface has zero area; nothing was left allocated
    SurfaceZero,
}

/// Create a surface and swapchain for `window`
pub fn create_swapchain(
    ctx: &GpuContext,
    window: Arc<dyn DeviceWindow>,
    options: &PresentOptions,
) -> Result<CreateSwapchainOutcome> {
    let display_handle = window
        .display_handle()
        .map_err(|e| engine_err!("fna3d::vulkan", "Failed to get display handle: {}", e))?;
    let window_handle = window
        .window_handle()
        .map_err(|e| engine_err!("fna3d::vulkan", "Failed to get window handle: {}", e))?;

    let surface = unsafe {
        ash_window::create_surface(&ctx.entry, &ctx.instance, display_handle.as_raw(), window_handle.as_raw(), None)
    }
    .map_err(|e| engine_err!("fna3d::vulkan", "Failed to create surface: {:?}", e))?;

    let mut data = SwapchainData::empty(window, surface);
    match build_swapchain(ctx, &mut data, options) {
        Ok(true) => Ok(CreateSwapchainOutcome::Created(data)),
        Ok(false) => {
            destroy_swapchain(ctx, data);
            engine_debug!("fna3d::vulkan", "Surface has zero area, skipping swapchain creation");
            Ok(CreateSwapchainOutcome::SurfaceZero)
        }
        Err(e) => {
            destroy_swapchain(ctx, data);
            Err(e)
        }
    }
}

/// Fill `data` for its surface; false when the surface has zero area
fn build_swapchain(ctx: &GpuContext, data: &mut SwapchainData, options: &PresentOptions) -> Result<bool> {
    unsafe {
        let supported = ctx
            .surface_loader
            .get_physical_device_surface_support(ctx.physical_device, ctx.queue_family_index, data.surface)
            .map_err(|e| engine_err!("fna3d::vulkan", "vkGetPhysicalDeviceSurfaceSupportKHR failed: {:?}", e))?;
        if !supported {
            return Err(engine_err!("fna3d::vulkan", "The graphics queue cannot present to this window"));
        }

        let capabilities = ctx
            .surface_loader
            .get_physical_device_surface_capabilities(ctx.physical_device, data.surface)
            .map_err(|e| engine_err!("fna3d::vulkan", "Failed to get surface capabilities: {:?}", e))?;

        let Some(extent) = choose_extent(&capabilities, data.window.drawable_size()) else {
            return Ok(false);
        };

        let formats = ctx
            .surface_loader
            .get_physical_device_surface_formats(ctx.physical_device, data.surface)
            .map_err(|e| engine_err!("fna3d::vulkan", "Failed to get surface formats: {:?}", e))?;
        let surface_format = choose_surface_format(&formats)
            .ok_or_else(|| engine_err!("fna3d::vulkan", "No BGRA8 or RGBA8 UNORM surface format available"))?;

        let present_modes = ctx
            .surface_loader
            .get_physical_device_surface_present_modes(ctx.physical_device, data.surface)
            .map_err(|e| engine_err!("fna3d::vulkan", "Failed to get surface present modes: {:?}", e))?;
        let present_mode = choose_present_mode(options, &present_modes);

        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(data.surface)
            .min_image_count(choose_image_count(&capabilities))
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_DST)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(vk::SurfaceTransformFlagsKHR::IDENTITY)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true);

        data.swapchain = ctx
            .swapchain_loader
            .create_swapchain(&create_info, None)
            .map_err(|e| engine_err!("fna3d::vulkan", "Failed to create swapchain: {:?}", e))?;
        data.format = surface_format.format;
        data.color_space = surface_format.color_space;
        data.swizzle = surface_format.swizzle;
        data.present_mode = present_mode;
        data.extent = extent;

        data.images = ctx
            .swapchain_loader
            .get_swapchain_images(data.swapchain)
            .map_err(|e| engine_err!("fna3d::vulkan", "Failed to get swapchain images: {:?}", e))?;
        data.image_access = vec![ResourceAccessType::None; data.images.len()];

        for &image in &data.images {
            let create_info = vk::ImageViewCreateInfo::default()
                .image(image)
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(surface_format.format)
                .components(surface_format.swizzle)
                .subresource_range(vk::ImageSubresourceRange {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    base_mip_level: 0,
                    level_count: 1,
                    base_array_layer: 0,
                    layer_count: 1,
                });
            let view = ctx
                .device
                .create_image_view(&create_info, None)
                .map_err(|e| engine_err!("fna3d::vulkan", "Failed to create swapchain image view: {:?}", e))?;
            data.views.push(view);
        }

        let semaphore_info = vk::SemaphoreCreateInfo::default();
        for slot in 0..MAX_FRAMES_IN_FLIGHT {
            data.image_available[slot] = ctx
                .device
                .create_semaphore(&semaphore_info, None)
                .map_err(|e| engine_err!("fna3d::vulkan", "Failed to create image-available semaphore: {:?}", e))?;
            data.render_finished[slot] = ctx
                .device
                .create_semaphore(&semaphore_info, None)
                .map_err(|e| engine_err!("fna3d::vulkan", "Failed to create render-finished semaphore: {:?}", e))?;
        }
    }

    engine_debug!("fna3d::vulkan",
        "Swapchain created: {}x{}, {} images, {:?}, {:?}",
        data.extent.width, data.extent.height, data.images.len(), data.format, data.present_mode);
    Ok(true)
}

/// Destroy a swapchain and its surface; the GPU must no longer use them
pub fn destroy_swapchain(ctx: &GpuContext, data: SwapchainData) {
    unsafe {
        for semaphore in data.image_available.iter().chain(data.render_finished.iter()) {
            if *semaphore != vk::Semaphore::null() {
                ctx.device.destroy_semaphore(*semaphore, None);
            }
        }
        for &view in &data.views {
            ctx.device.destroy_image_view(view, None);
        }
        if data.swapchain != vk::SwapchainKHR::null() {
            ctx.swapchain_loader.destroy_swapchain(data.swapchain, None);
        }
        ctx.surface_loader.destroy_surface(data.surface, None);
    }
}

/// Tear down and rebuild from the same window
pub fn recreate_swapchain(
    ctx: &GpuContext,
    data: SwapchainData,
    options: &PresentOptions,
) -> Result<CreateSwapchainOutcome> {
    let window = Arc::clone(&data.window);
    destroy_swapchain(ctx, data);
    create_swapchain(ctx, window, options)
}

// ============================================================================
// ACQUIRE / PRESENT
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireOutcome {
    Acquired { index: u32, suboptimal: bool },
    /// OUT_OF_DATE: recreate and skip this present
    NeedsRecreate,
    /// Timed out (throttled display): skip this present
    Skipped,
}

pub fn acquire_next_image(ctx: &GpuContext, data: &SwapchainData, slot: usize) -> Result<AcquireOutcome> {
    let result = unsafe {
        ctx.swapchain_loader.acquire_next_image(
            data.swapchain,
            ACQUIRE_TIMEOUT_NS,
            data.image_available[slot],
            vk::Fence::null(),
        )
    };

    match result {
        Ok((index, suboptimal)) => Ok(AcquireOutcome::Acquired { index, suboptimal }),
        Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(AcquireOutcome::NeedsRecreate),
        Err(vk::Result::TIMEOUT) | Err(vk::Result::NOT_READY) => {
            engine_warn!("fna3d::vulkan", "vkAcquireNextImageKHR timed out, skipping present");
            Ok(AcquireOutcome::Skipped)
        }
        Err(vk::Result::ERROR_DEVICE_LOST) => {
            engine_error!("fna3d::vulkan", "vkAcquireNextImageKHR: device lost");
            Err(Error::DeviceLost)
        }
        Err(e) => Err(engine_err!("fna3d::vulkan", "vkAcquireNextImageKHR failed: {:?}", e)),
    }
}

/// Present `index`; true when the swapchain must be recreated
pub fn present(ctx: &GpuContext, data: &SwapchainData, index: u32, wait: vk::Semaphore) -> Result<bool> {
    let wait_semaphores = [wait];
    let swapchains = [data.swapchain];
    let indices = [index];
    let present_info = vk::PresentInfoKHR::default()
        .wait_semaphores(&wait_semaphores)
        .swapchains(&swapchains)
        .image_indices(&indices);

    match unsafe { ctx.swapchain_loader.queue_present(ctx.queue, &present_info) } {
        Ok(suboptimal) => Ok(suboptimal),
        Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(true),
        Err(vk::Result::ERROR_DEVICE_LOST) => {
            engine_error!("fna3d::vulkan", "vkQueuePresentKHR: device lost");
            Err(Error::DeviceLost)
        }
        Err(e) => Err(engine_err!("fna3d::vulkan", "vkQueuePresentKHR failed: {:?}", e)),
    }
}

#[cfg(test)]
#[path = "vulkan_swapchain_tests.rs"]
mod tests;
