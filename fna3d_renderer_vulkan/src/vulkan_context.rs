/// GpuContext - instance, device and queue of the Vulkan driver
///
/// Owns the ash loaders and implements `DeviceDispatch` for the resource
/// engine. Device and instance destruction is explicit (`destroy`), called by
/// `VulkanRenderer::drop` once every object created from the device is gone.

use std::ffi::{CStr, CString};
use ash::prelude::VkResult;
use ash::vk;
use fna3d::fna3d::{Config, Error, Result};
use fna3d::fna3d::render::DeviceWindow;
use fna3d::{engine_debug, engine_error, engine_info, engine_warn};

use crate::vulkan_dispatch::{BindTarget, DeviceDispatch, ImageSamplerBinding, MemoryRequirements};
use crate::vulkan_format::DepthFormatSupport;

/// Optional device capabilities probed at creation
#[derive(Debug, Clone, Copy, Default)]
pub struct DeviceFeatures {
    pub supports_dxt1: bool,
    pub supports_s3tc: bool,
    pub supports_bc7: bool,
    pub depth: DepthFormatSupport,
    pub sampler_anisotropy: bool,
    pub fill_mode_non_solid: bool,
    pub independent_blend: bool,
    pub occlusion_query_precise: bool,
    pub debug_utils: bool,
}

/// Higher is better; discrete GPUs first
pub fn device_type_rank(kind: vk::PhysicalDeviceType) -> u32 {
    match kind {
        vk::PhysicalDeviceType::DISCRETE_GPU => 4,
        vk::PhysicalDeviceType::INTEGRATED_GPU => 3,
        vk::PhysicalDeviceType::VIRTUAL_GPU => 2,
        vk::PhysicalDeviceType::CPU => 1,
        _ => 0,
    }
}

/// First queue family with graphics support that can present
pub fn select_queue_family(
    families: &[vk::QueueFamilyProperties],
    can_present: impl Fn(u32) -> bool,
) -> Option<u32> {
    families
        .iter()
        .enumerate()
        .filter(|(_, family)| family.queue_count > 0 && family.queue_flags.contains(vk::QueueFlags::GRAPHICS))
        .map(|(index, _)| index as u32)
        .find(|&index| can_present(index))
}

fn init_error(what: &str, detail: impl std::fmt::Display) -> Error {
    engine_error!("fna3d::vulkan", "{}: {}", what, detail);
    Error::InitializationFailed(format!("{}: {}", what, detail))
}

pub struct GpuContext {
    pub entry: ash::Entry,
    pub instance: ash::Instance,
    pub physical_device: vk::PhysicalDevice,
    pub device: ash::Device,
    pub queue: vk::Queue,
    pub queue_family_index: u32,
    pub surface_loader: ash::khr::surface::Instance,
    pub swapchain_loader: ash::khr::swapchain::Device,
    pub properties: vk::PhysicalDeviceProperties,
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    pub features: DeviceFeatures,
    /// Object names and command labels; `None` without VK_EXT_debug_utils
    pub debug_utils: Option<ash::ext::debug_utils::Device>,
    #[cfg_attr(not(feature = "vulkan-validation"), allow(dead_code))]
    debug_utils_instance: Option<ash::ext::debug_utils::Instance>,
    debug_messenger: Option<vk::DebugUtilsMessengerEXT>,
}

impl GpuContext {
    /// Create instance and device able to present to `window`
    pub fn new(window: &dyn DeviceWindow, config: &Config) -> Result<Self> {
        unsafe {
            let entry = ash::Entry::load().map_err(|e| init_error("Failed to load Vulkan library", e))?;

            let app_info = vk::ApplicationInfo::default()
                .application_name(c"FNA3D")
                .application_version(vk::make_api_version(0, 0, 1, 0))
                .engine_name(c"FNA3D")
                .engine_version(vk::make_api_version(0, 24, 0, 0))
                .api_version(vk::API_VERSION_1_1);

            let display_handle = window
                .display_handle()
                .map_err(|e| init_error("Failed to get display handle", e))?;
            let mut extension_names = ash_window::enumerate_required_extensions(display_handle.as_raw())
                .map_err(|e| init_error("Failed to get required extensions", e))?
                .to_vec();

            let available_extensions = entry
                .enumerate_instance_extension_properties(None)
                .map_err(|e| init_error("Failed to enumerate instance extensions", format!("{:?}", e)))?;
            let has_extension = |name: &CStr| {
                available_extensions
                    .iter()
                    .any(|ext| ext.extension_name_as_c_str().is_ok_and(|ext_name| ext_name == name))
            };

            let debug_utils = config.debug_mode && has_extension(ash::ext::debug_utils::NAME);
            if debug_utils {
                extension_names.push(ash::ext::debug_utils::NAME.as_ptr());
            } else if config.debug_mode {
                engine_warn!("fna3d::vulkan", "VK_EXT_debug_utils unavailable, debug labels disabled");
            }

            let layer_names = Self::validation_layers(&entry, config);

            let create_info = vk::InstanceCreateInfo::default()
                .application_info(&app_info)
                .enabled_layer_names(&layer_names)
                .enabled_extension_names(&extension_names);

            let instance = entry
                .create_instance(&create_info, None)
                .map_err(|e| init_error("Failed to create Vulkan instance", format!("{:?}", e)))?;

            let (debug_utils_instance, debug_messenger) = if debug_utils {
                let loader = ash::ext::debug_utils::Instance::new(&entry, &instance);
                let messenger = Self::create_debug_messenger(&loader, config);
                (Some(loader), messenger)
            } else {
                (None, None)
            };

            let surface_loader = ash::khr::surface::Instance::new(&entry, &instance);

            // Temporary surface for present-support queries
            let window_handle = window
                .window_handle()
                .map_err(|e| init_error("Failed to get window handle", e))?;
            let surface = ash_window::create_surface(&entry, &instance, display_handle.as_raw(), window_handle.as_raw(), None)
                .map_err(|e| init_error("Failed to create surface", format!("{:?}", e)))?;

            let selected = Self::pick_physical_device(&instance, &surface_loader, surface);
            surface_loader.destroy_surface(surface, None);
            let (physical_device, queue_family_index) = selected?;

            let properties = instance.get_physical_device_properties(physical_device);
            let memory_properties = instance.get_physical_device_memory_properties(physical_device);
            let supported = instance.get_physical_device_features(physical_device);

            let format_supports = |format: vk::Format, feature: vk::FormatFeatureFlags| {
                instance
                    .get_physical_device_format_properties(physical_device, format)
                    .optimal_tiling_features
                    .contains(feature)
            };
            let bc = supported.texture_compression_bc == vk::TRUE;
            let sampled = vk::FormatFeatureFlags::SAMPLED_IMAGE;
            let depth_attachment = vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT;
            let features = DeviceFeatures {
                supports_dxt1: bc && format_supports(vk::Format::BC1_RGBA_UNORM_BLOCK, sampled),
                supports_s3tc: bc
                    && format_supports(vk::Format::BC2_UNORM_BLOCK, sampled)
                    && format_supports(vk::Format::BC3_UNORM_BLOCK, sampled),
                supports_bc7: bc && format_supports(vk::Format::BC7_UNORM_BLOCK, sampled),
                depth: DepthFormatSupport {
                    d24: format_supports(vk::Format::X8_D24_UNORM_PACK32, depth_attachment),
                    d24s8: format_supports(vk::Format::D24_UNORM_S8_UINT, depth_attachment),
                },
                sampler_anisotropy: supported.sampler_anisotropy == vk::TRUE,
                fill_mode_non_solid: supported.fill_mode_non_solid == vk::TRUE,
                independent_blend: supported.independent_blend == vk::TRUE,
                occlusion_query_precise: supported.occlusion_query_precise == vk::TRUE,
                debug_utils,
            };

            let enabled = vk::PhysicalDeviceFeatures::default()
                .sampler_anisotropy(features.sampler_anisotropy)
                .fill_mode_non_solid(features.fill_mode_non_solid)
                .independent_blend(features.independent_blend)
                .occlusion_query_precise(features.occlusion_query_precise)
                .texture_compression_bc(bc);

            let queue_priorities = [1.0];
            let queue_create_infos = [vk::DeviceQueueCreateInfo::default()
                .queue_family_index(queue_family_index)
                .queue_priorities(&queue_priorities)];
            let device_extension_names = [ash::khr::swapchain::NAME.as_ptr()];

            let device_create_info = vk::DeviceCreateInfo::default()
                .queue_create_infos(&queue_create_infos)
                .enabled_extension_names(&device_extension_names)
                .enabled_features(&enabled);

            let device = instance
                .create_device(physical_device, &device_create_info, None)
                .map_err(|e| init_error("Failed to create logical device", format!("{:?}", e)))?;
            let queue = device.get_device_queue(queue_family_index, 0);

            let swapchain_loader = ash::khr::swapchain::Device::new(&instance, &device);
            let debug_utils_device = if debug_utils {
                Some(ash::ext::debug_utils::Device::new(&instance, &device))
            } else {
                None
            };

            let device_name = properties
                .device_name_as_c_str()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();
            engine_info!("fna3d::vulkan", "Vulkan device: {} ({:?})", device_name, properties.device_type);
            engine_debug!("fna3d::vulkan", "Device features: {:?}", features);

            Ok(Self {
                entry,
                instance,
                physical_device,
                device,
                queue,
                queue_family_index,
                surface_loader,
                swapchain_loader,
                properties,
                memory_properties,
                features,
                debug_utils: debug_utils_device,
                debug_utils_instance,
                debug_messenger,
            })
        }
    }

    #[cfg(feature = "vulkan-validation")]
    fn validation_layers(entry: &ash::Entry, config: &Config) -> Vec<*const std::ffi::c_char> {
        const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";
        if !config.debug_mode {
            return Vec::new();
        }
        let available = unsafe { entry.enumerate_instance_layer_properties() }.unwrap_or_default();
        if available
            .iter()
            .any(|layer| layer.layer_name_as_c_str().is_ok_and(|name| name == VALIDATION_LAYER))
        {
            vec![VALIDATION_LAYER.as_ptr()]
        } else {
            engine_warn!("fna3d::vulkan", "Validation layer requested but not installed");
            Vec::new()
        }
    }

    #[cfg(not(feature = "vulkan-validation"))]
    fn validation_layers(_entry: &ash::Entry, _config: &Config) -> Vec<*const std::ffi::c_char> {
        Vec::new()
    }

    #[cfg(feature = "vulkan-validation")]
    fn create_debug_messenger(
        loader: &ash::ext::debug_utils::Instance,
        config: &Config,
    ) -> Option<vk::DebugUtilsMessengerEXT> {
        crate::debug::init_debug_config(crate::debug::DebugConfig {
            severity: config.debug_severity,
            message_filter: config.debug_message_filter,
            enable_stats: config.enable_validation_stats,
        });

        let debug_info = vk::DebugUtilsMessengerCreateInfoEXT::default()
            .message_severity(crate::debug::severity_flags(config.debug_severity))
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(crate::debug::vulkan_debug_callback));

        match unsafe { loader.create_debug_utils_messenger(&debug_info, None) } {
            Ok(messenger) => Some(messenger),
            Err(e) => {
                engine_warn!("fna3d::vulkan", "Failed to create debug messenger: {:?}", e);
                None
            }
        }
    }

    #[cfg(not(feature = "vulkan-validation"))]
    fn create_debug_messenger(
        _loader: &ash::ext::debug_utils::Instance,
        _config: &Config,
    ) -> Option<vk::DebugUtilsMessengerEXT> {
        None
    }

    /// Best-ranked device with the swapchain extension and a presenting graphics queue
    unsafe fn pick_physical_device(
        instance: &ash::Instance,
        surface_loader: &ash::khr::surface::Instance,
        surface: vk::SurfaceKHR,
    ) -> Result<(vk::PhysicalDevice, u32)> {
        let physical_devices = instance
            .enumerate_physical_devices()
            .map_err(|e| init_error("Failed to enumerate physical devices", format!("{:?}", e)))?;

        let mut best: Option<(u32, vk::PhysicalDevice, u32)> = None;
        for physical_device in physical_devices {
            let has_swapchain = instance
                .enumerate_device_extension_properties(physical_device)
                .unwrap_or_default()
                .iter()
                .any(|ext| ext.extension_name_as_c_str().is_ok_and(|name| name == ash::khr::swapchain::NAME));
            if !has_swapchain {
                continue;
            }

            let families = instance.get_physical_device_queue_family_properties(physical_device);
            let Some(family) = select_queue_family(&families, |index| {
                surface_loader
                    .get_physical_device_surface_support(physical_device, index, surface)
                    .unwrap_or(false)
            }) else {
                continue;
            };

            let rank = device_type_rank(instance.get_physical_device_properties(physical_device).device_type);
            if best.is_none_or(|(best_rank, _, _)| rank > best_rank) {
                best = Some((rank, physical_device, family));
            }
        }

        best.map(|(_, physical_device, family)| (physical_device, family))
            .ok_or_else(|| init_error("No suitable Vulkan device", "none can present to the window"))
    }

    // ===== DEBUG UTILS =====

    pub fn set_object_name<H: vk::Handle>(&self, handle: H, name: &str) {
        let Some(debug_utils) = self.debug_utils.as_ref() else {
            return;
        };
        let Ok(name) = CString::new(name) else {
            engine_warn!("fna3d::vulkan", "Object name contains a NUL byte");
            return;
        };
        let info = vk::DebugUtilsObjectNameInfoEXT::default()
            .object_handle(handle)
            .object_name(&name);
        if let Err(e) = unsafe { debug_utils.set_debug_utils_object_name(&info) } {
            engine_warn!("fna3d::vulkan", "vkSetDebugUtilsObjectNameEXT failed: {:?}", e);
        }
    }

    pub fn insert_label(&self, command_buffer: vk::CommandBuffer, text: &str) {
        let Some(debug_utils) = self.debug_utils.as_ref() else {
            return;
        };
        let Ok(text) = CString::new(text) else {
            engine_warn!("fna3d::vulkan", "String marker contains a NUL byte");
            return;
        };
        let label = vk::DebugUtilsLabelEXT::default().label_name(&text);
        unsafe { debug_utils.cmd_insert_debug_utils_label(command_buffer, &label) };
    }

    pub fn wait_idle(&self) {
        if let Err(e) = unsafe { self.device.device_wait_idle() } {
            engine_warn!("fna3d::vulkan", "vkDeviceWaitIdle failed: {:?}", e);
        }
    }

    /// Destroy device, messenger and instance; nothing created from them may remain
    pub fn destroy(&mut self) {
        unsafe {
            self.device.destroy_device(None);

            #[cfg(feature = "vulkan-validation")]
            crate::debug::cleanup_debug_config();

            if let (Some(loader), Some(messenger)) = (self.debug_utils_instance.as_ref(), self.debug_messenger.take()) {
                loader.destroy_debug_utils_messenger(messenger, None);
            }
            self.instance.destroy_instance(None);
        }
    }
}

impl DeviceDispatch for GpuContext {
    fn allocate_memory(&self, memory_type_index: u32, size: u64, dedicated: Option<BindTarget>) -> VkResult<vk::DeviceMemory> {
        let mut dedicated_info = match dedicated {
            Some(BindTarget::Buffer(buffer)) => vk::MemoryDedicatedAllocateInfo::default().buffer(buffer),
            Some(BindTarget::Image(image)) => vk::MemoryDedicatedAllocateInfo::default().image(image),
            None => vk::MemoryDedicatedAllocateInfo::default(),
        };
        let mut info = vk::MemoryAllocateInfo::default()
            .allocation_size(size)
            .memory_type_index(memory_type_index);
        if dedicated.is_some() {
            info = info.push_next(&mut dedicated_info);
        }
        unsafe { self.device.allocate_memory(&info, None) }
    }

    fn free_memory(&self, memory: vk::DeviceMemory) {
        unsafe { self.device.free_memory(memory, None) }
    }

    fn map_memory(&self, memory: vk::DeviceMemory, size: u64) -> VkResult<*mut u8> {
        unsafe {
            self.device
                .map_memory(memory, 0, size, vk::MemoryMapFlags::empty())
                .map(|ptr| ptr as *mut u8)
        }
    }

    fn unmap_memory(&self, memory: vk::DeviceMemory) {
        unsafe { self.device.unmap_memory(memory) }
    }

    fn bind_memory(&self, target: BindTarget, memory: vk::DeviceMemory, offset: u64) -> VkResult<()> {
        unsafe {
            match target {
                BindTarget::Buffer(buffer) => self.device.bind_buffer_memory(buffer, memory, offset),
                BindTarget::Image(image) => self.device.bind_image_memory(image, memory, offset),
            }
        }
    }

    fn create_buffer(&self, size: u64, usage: vk::BufferUsageFlags) -> VkResult<vk::Buffer> {
        let info = vk::BufferCreateInfo::default()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);
        unsafe { self.device.create_buffer(&info, None) }
    }

    fn destroy_buffer(&self, buffer: vk::Buffer) {
        unsafe { self.device.destroy_buffer(buffer, None) }
    }

    fn destroy_image(&self, image: vk::Image) {
        unsafe { self.device.destroy_image(image, None) }
    }

    fn memory_requirements(&self, target: BindTarget) -> MemoryRequirements {
        let mut dedicated = vk::MemoryDedicatedRequirements::default();
        let requirements = {
            let mut requirements2 = vk::MemoryRequirements2::default().push_next(&mut dedicated);
            unsafe {
                match target {
                    BindTarget::Buffer(buffer) => self.device.get_buffer_memory_requirements2(
                        &vk::BufferMemoryRequirementsInfo2::default().buffer(buffer),
                        &mut requirements2,
                    ),
                    BindTarget::Image(image) => self.device.get_image_memory_requirements2(
                        &vk::ImageMemoryRequirementsInfo2::default().image(image),
                        &mut requirements2,
                    ),
                }
            }
            requirements2.memory_requirements
        };

        MemoryRequirements {
            size: requirements.size,
            alignment: requirements.alignment,
            memory_type_bits: requirements.memory_type_bits,
            prefers_dedicated: dedicated.prefers_dedicated_allocation == vk::TRUE,
            requires_dedicated: dedicated.requires_dedicated_allocation == vk::TRUE,
        }
    }

    fn create_descriptor_pool(&self, max_sets: u32, pool_sizes: &[vk::DescriptorPoolSize]) -> VkResult<vk::DescriptorPool> {
        let info = vk::DescriptorPoolCreateInfo::default()
            .max_sets(max_sets)
            .pool_sizes(pool_sizes);
        unsafe { self.device.create_descriptor_pool(&info, None) }
    }

    fn destroy_descriptor_pool(&self, pool: vk::DescriptorPool) {
        unsafe { self.device.destroy_descriptor_pool(pool, None) }
    }

    fn allocate_descriptor_sets(&self, pool: vk::DescriptorPool, layout: vk::DescriptorSetLayout, count: u32) -> VkResult<Vec<vk::DescriptorSet>> {
        let layouts = vec![layout; count as usize];
        let info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(pool)
            .set_layouts(&layouts);
        unsafe { self.device.allocate_descriptor_sets(&info) }
    }

    fn write_image_descriptors(&self, set: vk::DescriptorSet, bindings: &[ImageSamplerBinding]) {
        let image_infos: Vec<vk::DescriptorImageInfo> = bindings
            .iter()
            .map(|binding| vk::DescriptorImageInfo {
                sampler: binding.sampler,
                image_view: binding.view,
                image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            })
            .collect();
        let writes: Vec<vk::WriteDescriptorSet> = image_infos
            .iter()
            .enumerate()
            .map(|(index, info)| {
                vk::WriteDescriptorSet::default()
                    .dst_set(set)
                    .dst_binding(index as u32)
                    .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                    .image_info(std::slice::from_ref(info))
            })
            .collect();
        unsafe { self.device.update_descriptor_sets(&writes, &[]) }
    }

    fn write_uniform_descriptor(&self, set: vk::DescriptorSet, buffer: vk::Buffer, range: u64) {
        let buffer_info = [vk::DescriptorBufferInfo { buffer, offset: 0, range }];
        let write = vk::WriteDescriptorSet::default()
            .dst_set(set)
            .dst_binding(0)
            .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC)
            .buffer_info(&buffer_info);
        unsafe { self.device.update_descriptor_sets(std::slice::from_ref(&write), &[]) }
    }

    fn allocate_command_buffers(&self, pool: vk::CommandPool, count: u32) -> VkResult<Vec<vk::CommandBuffer>> {
        let info = vk::CommandBufferAllocateInfo::default()
            .command_pool(pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(count);
        unsafe { self.device.allocate_command_buffers(&info) }
    }

    fn begin_command_buffer(&self, command_buffer: vk::CommandBuffer) -> VkResult<()> {
        let info = vk::CommandBufferBeginInfo::default().flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        unsafe { self.device.begin_command_buffer(command_buffer, &info) }
    }

    fn end_command_buffer(&self, command_buffer: vk::CommandBuffer) -> VkResult<()> {
        unsafe { self.device.end_command_buffer(command_buffer) }
    }

    fn reset_command_buffer(&self, command_buffer: vk::CommandBuffer) -> VkResult<()> {
        unsafe {
            self.device
                .reset_command_buffer(command_buffer, vk::CommandBufferResetFlags::RELEASE_RESOURCES)
        }
    }

    fn wait_for_fences(&self, fences: &[vk::Fence], timeout: u64) -> VkResult<()> {
        unsafe { self.device.wait_for_fences(fences, true, timeout) }
    }

    fn reset_fences(&self, fences: &[vk::Fence]) -> VkResult<()> {
        unsafe { self.device.reset_fences(fences) }
    }

    fn queue_submit(
        &self,
        command_buffers: &[vk::CommandBuffer],
        wait_semaphores: &[vk::Semaphore],
        wait_stages: &[vk::PipelineStageFlags],
        signal_semaphores: &[vk::Semaphore],
        fence: vk::Fence,
    ) -> VkResult<()> {
        let submit = vk::SubmitInfo::default()
            .wait_semaphores(wait_semaphores)
            .wait_dst_stage_mask(wait_stages)
            .command_buffers(command_buffers)
            .signal_semaphores(signal_semaphores);
        unsafe { self.device.queue_submit(self.queue, std::slice::from_ref(&submit), fence) }
    }
}

#[cfg(test)]
#[path = "vulkan_context_tests.rs"]
mod tests;
