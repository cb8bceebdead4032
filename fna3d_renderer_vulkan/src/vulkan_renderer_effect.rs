/// Effect application through the shader context
///
/// The tracker remembers which effect, technique and pass were applied last
/// so reapplying the same pass only commits parameter changes, and switching
/// effects closes the previous one first. It also owns the host mapping of the
/// shader context's uniform ring: mapped before any parameter write, unmapped
/// before every queue submission.

use fna3d::fna3d::Result;
use fna3d::fna3d::render::{EffectHandle, EffectStateChanges};
use fna3d::{engine_trace, engine_warn};

use crate::mojoshader::{EffectId, ShaderContext};
use crate::vulkan::VulkanRenderer;
use crate::vulkan_dispose::PendingDestroy;

/// A compiled effect and its selected technique
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VulkanEffect {
    pub id: EffectId,
    pub technique: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct AppliedEffect {
    effect: EffectId,
    technique: usize,
    pass: u32,
}

#[derive(Debug, Default)]
pub struct EffectTracker {
    current: Option<AppliedEffect>,
    uniforms_mapped: bool,
}

impl EffectTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current_effect(&self) -> Option<EffectId> {
        self.current.map(|applied| applied.effect)
    }

    pub fn uniforms_mapped(&self) -> bool {
        self.uniforms_mapped
    }

    /// Map the uniform ring for writing; no-op while already mapped
    pub fn map_uniforms(&mut self, ctx: &mut dyn ShaderContext) {
        if !self.uniforms_mapped {
            ctx.map_uniform_buffer_memory();
            self.uniforms_mapped = true;
        }
    }

    /// Unmap the uniform ring ahead of a submission
    pub fn unmap_uniforms(&mut self, ctx: &mut dyn ShaderContext) {
        if self.uniforms_mapped {
            ctx.unmap_uniform_buffer_memory();
            self.uniforms_mapped = false;
        }
    }

    /// Bind `pass` of `effect`
    pub fn apply(
        &mut self,
        ctx: &mut dyn ShaderContext,
        effect: &VulkanEffect,
        pass: u32,
        changes: &mut EffectStateChanges,
    ) -> Result<()> {
        let next = AppliedEffect { effect: effect.id, technique: effect.technique, pass };
        self.map_uniforms(ctx);

        match self.current {
            Some(current) if current == next => {
                ctx.effect_commit_changes(effect.id);
                return Ok(());
            }
            Some(current) if current.effect == effect.id => {
                ctx.effect_end_pass(effect.id);
                // Cleared first so a failed begin leaves nothing half-applied
                self.current = None;
                ctx.effect_begin_pass(effect.id, pass)?;
                self.current = Some(next);
                return Ok(());
            }
            Some(current) => {
                ctx.effect_end_pass(current.effect);
                ctx.effect_end(current.effect);
                self.current = None;
            }
            None => {}
        }

        let passes = ctx.effect_begin(effect.id, false, changes)?;
        if pass >= passes {
            engine_warn!("fna3d::vulkan", "Pass {} out of range ({} passes)", pass, passes);
        }
        ctx.effect_begin_pass(effect.id, pass)?;
        self.current = Some(next);
        Ok(())
    }

    /// Begin pass 0 with state saving, for SpriteBatch-style restore blocks
    pub fn begin_pass_restore(
        &mut self,
        ctx: &mut dyn ShaderContext,
        effect: EffectId,
        changes: &mut EffectStateChanges,
    ) -> Result<()> {
        self.map_uniforms(ctx);
        ctx.effect_begin(effect, true, changes)?;
        ctx.effect_begin_pass(effect, 0)
    }

    pub fn end_pass_restore(&mut self, ctx: &mut dyn ShaderContext, effect: EffectId) {
        ctx.effect_end_pass(effect);
        ctx.effect_end(effect);
    }

    /// `effect` is being deleted; end it if it is still applied
    pub fn forget(&mut self, ctx: &mut dyn ShaderContext, effect: EffectId) {
        if self.current_effect() == Some(effect) {
            ctx.effect_end_pass(effect);
            ctx.effect_end(effect);
            self.current = None;
        }
    }
}

// ============================================================================
// DEVICE ENTRY POINTS
// ============================================================================

impl VulkanRenderer {
    pub(crate) fn create_effect_impl(&mut self, code: &[u8]) -> Result<EffectHandle> {
        let id = self.shader_context.compile_effect(code)?;
        engine_trace!("fna3d::vulkan", "Compiled effect {:?} ({} bytes)", id, code.len());
        Ok(self.effects.insert(VulkanEffect { id, technique: 0 }))
    }

    pub(crate) fn clone_effect_impl(&mut self, effect: EffectHandle) -> Result<EffectHandle> {
        let source = *self.effects.get(effect).ok_or_else(|| Self::unknown("effect"))?;
        let id = self.shader_context.clone_effect(source.id)?;
        Ok(self.effects.insert(VulkanEffect { id, technique: source.technique }))
    }

    pub(crate) fn dispose_effect(&mut self, effect: EffectHandle) {
        let Some(removed) = self.effects.remove(effect) else {
            engine_warn!("fna3d::vulkan", "Disposing unknown effect");
            return;
        };
        self.effect_tracker.forget(&mut **self.shader_context, removed.id);
        // Uniform data of the effect may still be read by in-flight commands
        let slot = self.scheduler.current_slot();
        self.dispose_queue.push(slot, PendingDestroy::Effect(removed.id));
    }

    pub(crate) fn set_effect_technique_impl(&mut self, effect: EffectHandle, technique: usize) -> Result<()> {
        let entry = self.effects.get_mut(effect).ok_or_else(|| Self::unknown("effect"))?;
        if entry.technique == technique {
            return Ok(());
        }
        self.shader_context.set_technique(entry.id, technique)?;
        entry.technique = technique;
        Ok(())
    }

    pub(crate) fn apply_effect_impl(&mut self, effect: EffectHandle, pass: u32, changes: &mut EffectStateChanges) -> Result<()> {
        let entry = *self.effects.get(effect).ok_or_else(|| Self::unknown("effect"))?;
        self.effect_tracker.apply(&mut **self.shader_context, &entry, pass, changes)
    }

    pub(crate) fn begin_pass_restore_impl(&mut self, effect: EffectHandle, changes: &mut EffectStateChanges) -> Result<()> {
        let entry = *self.effects.get(effect).ok_or_else(|| Self::unknown("effect"))?;
        self.effect_tracker.begin_pass_restore(&mut **self.shader_context, entry.id, changes)
    }

    pub(crate) fn end_pass_restore_impl(&mut self, effect: EffectHandle) -> Result<()> {
        let entry = *self.effects.get(effect).ok_or_else(|| Self::unknown("effect"))?;
        self.effect_tracker.end_pass_restore(&mut **self.shader_context, entry.id);
        Ok(())
    }
}

#[cfg(test)]
#[path = "vulkan_renderer_effect_tests.rs"]
mod tests;
