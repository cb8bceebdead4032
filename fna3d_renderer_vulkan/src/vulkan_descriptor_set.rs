/// Descriptor sets of translated shaders
///
/// Every shader gets a `ShaderResources`: a growing list of descriptor pools
/// whose sets are cached by the exact (image view, sampler) tuple they were
/// written with. A set unused for a few frames goes back to the free list;
/// sets are never freed individually, only with their pool. Sets dropped
/// because an image view died stay parked until the submission slot that may
/// still bind them is released.

use ash::vk;
use rustc_hash::FxHashMap;
use fna3d::fna3d::Result;
use fna3d::{engine_err, engine_trace};

use crate::mojoshader::{ShaderHandle, ShaderSampler, SamplerType, ShaderStage};
use crate::vulkan_dispatch::{DeviceDispatch, ImageSamplerBinding};

pub const STARTING_SAMPLER_DESCRIPTOR_POOL_SIZE: u32 = 16;

struct ActiveSet {
    set: vk::DescriptorSet,
    inactive_frames: u32,
}

struct UniformSet {
    pool: vk::DescriptorPool,
    set: vk::DescriptorSet,
    buffer: vk::Buffer,
    range: u64,
}

/// Descriptor state of one shader
pub struct ShaderResources {
    stage: ShaderStage,
    samplers: Vec<ShaderSampler>,
    sampler_layout: vk::DescriptorSetLayout,

    pools: Vec<vk::DescriptorPool>,
    next_pool_size: u32,
    inactive: Vec<vk::DescriptorSet>,
    active: FxHashMap<Vec<ImageSamplerBinding>, ActiveSet>,
    /// (submission slot, set) awaiting that slot's fence
    parked: Vec<(usize, vk::DescriptorSet)>,

    uniform: Option<UniformSet>,
}

impl ShaderResources {
    /// `sampler_layout` comes from the descriptor-set layout cache and is not owned
    pub fn new(stage: ShaderStage, samplers: Vec<ShaderSampler>, sampler_layout: vk::DescriptorSetLayout) -> Self {
        Self {
            stage,
            samplers,
            sampler_layout,
            pools: Vec::new(),
            next_pool_size: STARTING_SAMPLER_DESCRIPTOR_POOL_SIZE,
            inactive: Vec::new(),
            active: FxHashMap::default(),
            parked: Vec::new(),
            uniform: None,
        }
    }

    pub fn stage(&self) -> ShaderStage {
        self.stage
    }

    pub fn samplers(&self) -> &[ShaderSampler] {
        &self.samplers
    }

    pub fn sampler_layout(&self) -> vk::DescriptorSetLayout {
        self.sampler_layout
    }

    pub fn pool_count(&self) -> usize {
        self.pools.len()
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn inactive_count(&self) -> usize {
        self.inactive.len()
    }

    pub fn parked_count(&self) -> usize {
        self.parked.len()
    }

    // ===== SAMPLER SETS =====

    /// Descriptor set holding exactly `bindings`, one per declared sampler
    ///
    /// A set already written with the same tuple is returned as is.
    pub fn fetch_sampler_set(
        &mut self,
        dispatch: &dyn DeviceDispatch,
        bindings: &[ImageSamplerBinding],
    ) -> Result<vk::DescriptorSet> {
        if let Some(active) = self.active.get_mut(bindings) {
            active.inactive_frames = 0;
            return Ok(active.set);
        }

        if self.inactive.is_empty() {
            self.grow_pool(dispatch)?;
        }
        let set = self
            .inactive
            .pop()
            .ok_or_else(|| engine_err!("fna3d::vulkan", "Descriptor pool grew without yielding sets"))?;

        dispatch.write_image_descriptors(set, bindings);
        self.active.insert(bindings.to_vec(), ActiveSet { set, inactive_frames: 0 });
        Ok(set)
    }

    fn grow_pool(&mut self, dispatch: &dyn DeviceDispatch) -> Result<()> {
        let count = self.next_pool_size;
        let pool_sizes = [vk::DescriptorPoolSize {
            ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            descriptor_count: count * self.samplers.len().max(1) as u32,
        }];

        let pool = dispatch
            .create_descriptor_pool(count, &pool_sizes)
            .map_err(|e| engine_err!("fna3d::vulkan", "vkCreateDescriptorPool failed: {:?}", e))?;
        let sets = match dispatch.allocate_descriptor_sets(pool, self.sampler_layout, count) {
            Ok(sets) => sets,
            Err(e) => {
                dispatch.destroy_descriptor_pool(pool);
                return Err(engine_err!("fna3d::vulkan", "vkAllocateDescriptorSets failed: {:?}", e));
            }
        };

        self.pools.push(pool);
        self.inactive.extend(sets);
        self.next_pool_size *= 2;

        engine_trace!("fna3d::vulkan",
            "{:?} shader descriptor pool #{} with {} sets", self.stage, self.pools.len(), count);
        Ok(())
    }

    /// Age every active set by one frame, recycling those unused for more than `threshold` frames
    pub fn deactivate_unused(&mut self, threshold: u32) {
        let inactive = &mut self.inactive;
        self.active.retain(|_, active| {
            active.inactive_frames += 1;
            if active.inactive_frames > threshold {
                inactive.push(active.set);
                false
            } else {
                true
            }
        });
    }

    /// Drop every active set that references `view`; they are reusable once `slot` is released
    pub fn invalidate_view(&mut self, view: vk::ImageView, slot: usize) -> usize {
        let parked = &mut self.parked;
        let before = self.active.len();
        self.active.retain(|bindings, active| {
            if bindings.iter().any(|binding| binding.view == view) {
                parked.push((slot, active.set));
                false
            } else {
                true
            }
        });
        before - self.active.len()
    }

    /// The fence of `slot` signaled: its parked sets go back to the free list
    pub fn release_slot(&mut self, slot: usize) {
        let inactive = &mut self.inactive;
        self.parked.retain(|&(parked_slot, set)| {
            if parked_slot == slot {
                inactive.push(set);
                false
            } else {
                true
            }
        });
    }

    // ===== UNIFORM SET =====

    /// The shader's dynamic uniform-buffer set, rewritten when the buffer changes
    pub fn fetch_uniform_set(
        &mut self,
        dispatch: &dyn DeviceDispatch,
        uniform_layout: vk::DescriptorSetLayout,
        buffer: vk::Buffer,
        range: u64,
    ) -> Result<vk::DescriptorSet> {
        if self.uniform.is_none() {
            let pool_sizes = [vk::DescriptorPoolSize {
                ty: vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC,
                descriptor_count: 1,
            }];
            let pool = dispatch
                .create_descriptor_pool(1, &pool_sizes)
                .map_err(|e| engine_err!("fna3d::vulkan", "vkCreateDescriptorPool failed: {:?}", e))?;
            let set = match dispatch.allocate_descriptor_sets(pool, uniform_layout, 1) {
                Ok(sets) if !sets.is_empty() => sets[0],
                Ok(_) => {
                    dispatch.destroy_descriptor_pool(pool);
                    return Err(engine_err!("fna3d::vulkan", "vkAllocateDescriptorSets returned no set"));
                }
                Err(e) => {
                    dispatch.destroy_descriptor_pool(pool);
                    return Err(engine_err!("fna3d::vulkan", "vkAllocateDescriptorSets failed: {:?}", e));
                }
            };
            self.uniform = Some(UniformSet { pool, set, buffer: vk::Buffer::null(), range: 0 });
        }

        let Some(uniform) = self.uniform.as_mut() else {
            return Err(engine_err!("fna3d::vulkan", "Uniform descriptor set missing"));
        };
        if uniform.buffer != buffer || uniform.range != range {
            dispatch.write_uniform_descriptor(uniform.set, buffer, range);
            uniform.buffer = buffer;
            uniform.range = range;
        }
        Ok(uniform.set)
    }

    pub fn destroy(self, dispatch: &dyn DeviceDispatch) {
        for pool in self.pools {
            dispatch.destroy_descriptor_pool(pool);
        }
        if let Some(uniform) = self.uniform {
            dispatch.destroy_descriptor_pool(uniform.pool);
        }
    }
}

// ============================================================================
// MANAGER
// ============================================================================

/// Fallback bindings for sampler slots nothing is bound to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DummyBindings {
    pub two_d: ImageSamplerBinding,
    pub three_d: ImageSamplerBinding,
    pub cube: ImageSamplerBinding,
}

impl DummyBindings {
    pub fn for_type(&self, kind: SamplerType) -> ImageSamplerBinding {
        match kind {
            SamplerType::TwoD => self.two_d,
            SamplerType::ThreeD => self.three_d,
            SamplerType::Cube => self.cube,
        }
    }
}

/// One binding per declared sampler, taken from the bound slots or the dummies
///
/// Vulkan requires every combined image sampler of a set to be written, so an
/// empty slot gets the dummy texture of the declared dimensionality.
pub fn build_bindings(
    samplers: &[ShaderSampler],
    bound: &[Option<ImageSamplerBinding>],
    dummies: &DummyBindings,
) -> Vec<ImageSamplerBinding> {
    samplers
        .iter()
        .map(|sampler| {
            bound
                .get(sampler.index as usize)
                .copied()
                .flatten()
                .unwrap_or_else(|| dummies.for_type(sampler.kind))
        })
        .collect()
}

/// All shader resources, keyed by shader
pub struct DescriptorSetManager {
    resources: FxHashMap<ShaderHandle, ShaderResources>,
    deactivate_frames: u32,
}

impl DescriptorSetManager {
    pub fn new(deactivate_frames: u32) -> Self {
        Self {
            resources: FxHashMap::default(),
            deactivate_frames,
        }
    }

    pub fn get(&self, shader: ShaderHandle) -> Option<&ShaderResources> {
        self.resources.get(&shader)
    }

    /// Resources of `shader`, created by `create` on first use
    pub fn get_or_create(
        &mut self,
        shader: ShaderHandle,
        create: impl FnOnce() -> Result<ShaderResources>,
    ) -> Result<&mut ShaderResources> {
        if !self.resources.contains_key(&shader) {
            let resources = create()?;
            self.resources.insert(shader, resources);
        }
        self.resources
            .get_mut(&shader)
            .ok_or_else(|| engine_err!("fna3d::vulkan", "Shader resources vanished"))
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Once per submitted frame
    pub fn end_frame(&mut self) {
        for resources in self.resources.values_mut() {
            resources.deactivate_unused(self.deactivate_frames);
        }
    }

    /// An image view is about to be destroyed; commands of `slot` may still bind its sets
    pub fn invalidate_view(&mut self, view: vk::ImageView, slot: usize) {
        let parked: usize = self
            .resources
            .values_mut()
            .map(|resources| resources.invalidate_view(view, slot))
            .sum();
        if parked > 0 {
            engine_trace!("fna3d::vulkan", "Parked {} descriptor set(s) referencing a destroyed view", parked);
        }
    }

    pub fn release_slot(&mut self, slot: usize) {
        for resources in self.resources.values_mut() {
            resources.release_slot(slot);
        }
    }

    pub fn destroy_all(&mut self, dispatch: &dyn DeviceDispatch) {
        for (_, resources) in self.resources.drain() {
            resources.destroy(dispatch);
        }
    }
}

#[cfg(test)]
#[path = "vulkan_descriptor_set_tests.rs"]
mod tests;
