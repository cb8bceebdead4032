/// Effect state changes reported back to the caller by `apply_effect`
///
/// The effect framework is a black box; these lists carry the render and
/// sampler states a pass wants applied, as opaque (kind, value) pairs.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EffectRenderState {
    pub kind: u32,
    pub value: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EffectSamplerState {
    pub index: u32,
    pub kind: u32,
    pub value: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EffectStateChanges {
    pub render_state_changes: Vec<EffectRenderState>,
    pub sampler_state_changes: Vec<EffectSamplerState>,
    pub vertex_sampler_state_changes: Vec<EffectSamplerState>,
}

impl EffectStateChanges {
    pub fn clear(&mut self) {
        self.render_state_changes.clear();
        self.sampler_state_changes.clear();
        self.vertex_sampler_state_changes.clear();
    }
}
