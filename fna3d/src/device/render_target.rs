/// Render target bindings and clear flags

use bitflags::bitflags;
use crate::device::{TextureHandle, RenderbufferHandle};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CubeMapFace {
    PositiveX,
    NegativeX,
    PositiveY,
    NegativeY,
    PositiveZ,
    NegativeZ,
}

impl CubeMapFace {
    pub fn index(self) -> usize {
        self as usize
    }
}

/// Shape of a render target binding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RenderTargetKind {
    TwoD { width: u32, height: u32 },
    Cube { size: u32, face: CubeMapFace },
}

/// One color attachment passed to `set_render_targets`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RenderTargetBinding {
    pub kind: RenderTargetKind,
    pub level_count: u32,
    pub multi_sample_count: u32,
    pub texture: TextureHandle,
    /// MSAA color buffer resolved into `texture`
    pub color_buffer: Option<RenderbufferHandle>,
}

impl RenderTargetBinding {
    pub fn extent(&self) -> (u32, u32) {
        match self.kind {
            RenderTargetKind::TwoD { width, height } => (width, height),
            RenderTargetKind::Cube { size, .. } => (size, size),
        }
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ClearOptions: u32 {
        const TARGET = 1;
        const DEPTH_BUFFER = 2;
        const STENCIL = 4;
    }
}
