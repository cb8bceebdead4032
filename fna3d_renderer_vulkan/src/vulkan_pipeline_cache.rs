/// Pipeline cache blob persisted between runs
///
/// The blob is loaded at device creation and written back at destruction.
/// Any IO or header mismatch only costs a cold cache.

use std::path::Path;
use ash::vk;
use fna3d::fna3d::Result;
use fna3d::{engine_debug, engine_info, engine_warn};

/// Size of the `VkPipelineCacheHeaderVersionOne` header
pub const HEADER_SIZE: usize = 32;

fn read_u32(blob: &[u8], offset: usize) -> Option<u32> {
    blob.get(offset..offset + 4)
        .and_then(|bytes| bytes.try_into().ok())
        .map(u32::from_le_bytes)
}

/// Whether `blob` was produced by this exact device and driver
pub fn header_matches(blob: &[u8], vendor_id: u32, device_id: u32, cache_uuid: &[u8; vk::UUID_SIZE]) -> bool {
    let Some(header_length) = read_u32(blob, 0) else {
        return false;
    };
    header_length as usize >= HEADER_SIZE
        && blob.len() >= HEADER_SIZE
        && read_u32(blob, 4) == Some(vk::PipelineCacheHeaderVersion::ONE.as_raw() as u32)
        && read_u32(blob, 8) == Some(vendor_id)
        && read_u32(blob, 12) == Some(device_id)
        && &blob[16..16 + vk::UUID_SIZE] == cache_uuid
}

/// Read the blob; `None` when it is missing or unreadable
pub fn load_blob(path: &Path) -> Option<Vec<u8>> {
    match std::fs::read(path) {
        Ok(data) => Some(data),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            engine_debug!("fna3d::vulkan", "No pipeline cache at {}", path.display());
            None
        }
        Err(e) => {
            engine_warn!("fna3d::vulkan", "Failed to read pipeline cache {}: {}", path.display(), e);
            None
        }
    }
}

pub fn save_blob(path: &Path, data: &[u8]) -> bool {
    match std::fs::write(path, data) {
        Ok(()) => {
            engine_debug!("fna3d::vulkan", "Saved {} bytes of pipeline cache to {}", data.len(), path.display());
            true
        }
        Err(e) => {
            engine_warn!("fna3d::vulkan", "Failed to write pipeline cache {}: {}", path.display(), e);
            false
        }
    }
}

/// Create the pipeline cache, seeded from `path` when the blob fits this device
pub fn create_pipeline_cache(
    device: &ash::Device,
    properties: &vk::PhysicalDeviceProperties,
    path: Option<&Path>,
) -> Result<vk::PipelineCache> {
    let initial = path
        .and_then(load_blob)
        .filter(|blob| {
            let fits = header_matches(blob, properties.vendor_id, properties.device_id, &properties.pipeline_cache_uuid);
            if !fits {
                engine_info!("fna3d::vulkan", "Pipeline cache was written by another device or driver, starting cold");
            }
            fits
        })
        .unwrap_or_default();

    let info = vk::PipelineCacheCreateInfo::default().initial_data(&initial);
    match unsafe { device.create_pipeline_cache(&info, None) } {
        Ok(cache) => Ok(cache),
        Err(e) if !initial.is_empty() => {
            engine_warn!("fna3d::vulkan", "Pipeline cache rejected ({:?}), starting cold", e);
            let empty = vk::PipelineCacheCreateInfo::default();
            Ok(vk_try!("vkCreatePipelineCache", unsafe { device.create_pipeline_cache(&empty, None) }))
        }
        Err(e) => Err(fna3d::engine_err!("fna3d::vulkan", "vkCreatePipelineCache failed: {:?}", e)),
    }
}

/// Write the cache contents to `path`; failures are only logged
pub fn save_pipeline_cache(device: &ash::Device, cache: vk::PipelineCache, path: &Path) {
    match unsafe { device.get_pipeline_cache_data(cache) } {
        Ok(data) => {
            save_blob(path, &data);
        }
        Err(e) => engine_warn!("fna3d::vulkan", "vkGetPipelineCacheData failed: {:?}", e),
    }
}

#[cfg(test)]
#[path = "vulkan_pipeline_cache_tests.rs"]
mod tests;
