/// Immutable render state objects (blend, depth-stencil, rasterizer, sampler)
///
/// Defaults match the XNA "Opaque", "Default", "CullCounterClockwise" and
/// "LinearWrap" presets.

use bitflags::bitflags;

/// 8-bit RGBA color
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const WHITE: Color = Color { r: 0xFF, g: 0xFF, b: 0xFF, a: 0xFF };

    pub fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Normalized [0, 1] components
    pub fn to_array(self) -> [f32; 4] {
        [
            self.r as f32 / 255.0,
            self.g as f32 / 255.0,
            self.b as f32 / 255.0,
            self.a as f32 / 255.0,
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Blend {
    One,
    Zero,
    SourceColor,
    InverseSourceColor,
    SourceAlpha,
    InverseSourceAlpha,
    DestinationColor,
    InverseDestinationColor,
    DestinationAlpha,
    InverseDestinationAlpha,
    BlendFactor,
    InverseBlendFactor,
    SourceAlphaSaturation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendFunction {
    Add,
    Subtract,
    ReverseSubtract,
    Max,
    Min,
}

bitflags! {
    /// Per-channel color write mask
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ColorWriteChannels: u32 {
        const RED = 1;
        const GREEN = 2;
        const BLUE = 4;
        const ALPHA = 8;
        const ALL = 15;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareFunction {
    Always,
    Never,
    Less,
    LessEqual,
    Equal,
    GreaterEqual,
    Greater,
    NotEqual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StencilOperation {
    Keep,
    Zero,
    Replace,
    Increment,
    Decrement,
    IncrementSaturation,
    DecrementSaturation,
    Invert,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FillMode {
    Solid,
    WireFrame,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CullMode {
    None,
    CullClockwiseFace,
    CullCounterClockwiseFace,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureAddressMode {
    Wrap,
    Clamp,
    Mirror,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureFilter {
    Linear,
    Point,
    Anisotropic,
    LinearMipPoint,
    PointMipLinear,
    MinLinearMagPointMipLinear,
    MinLinearMagPointMipPoint,
    MinPointMagLinearMipLinear,
    MinPointMagLinearMipPoint,
}

/// Color blending state
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlendState {
    pub color_source_blend: Blend,
    pub color_destination_blend: Blend,
    pub color_blend_function: BlendFunction,
    pub alpha_source_blend: Blend,
    pub alpha_destination_blend: Blend,
    pub alpha_blend_function: BlendFunction,
    pub color_write_enable: ColorWriteChannels,
    pub color_write_enable1: ColorWriteChannels,
    pub color_write_enable2: ColorWriteChannels,
    pub color_write_enable3: ColorWriteChannels,
    pub blend_factor: Color,
    pub multi_sample_mask: i32,
}

impl Default for BlendState {
    fn default() -> Self {
        Self {
            color_source_blend: Blend::One,
            color_destination_blend: Blend::Zero,
            color_blend_function: BlendFunction::Add,
            alpha_source_blend: Blend::One,
            alpha_destination_blend: Blend::Zero,
            alpha_blend_function: BlendFunction::Add,
            color_write_enable: ColorWriteChannels::ALL,
            color_write_enable1: ColorWriteChannels::ALL,
            color_write_enable2: ColorWriteChannels::ALL,
            color_write_enable3: ColorWriteChannels::ALL,
            blend_factor: Color::WHITE,
            multi_sample_mask: -1,
        }
    }
}

impl BlendState {
    /// Whether this state actually blends (anything but One/Zero/Add)
    pub fn is_blending(&self) -> bool {
        !(self.color_source_blend == Blend::One
            && self.color_destination_blend == Blend::Zero
            && self.alpha_source_blend == Blend::One
            && self.alpha_destination_blend == Blend::Zero)
    }
}

/// Depth and stencil test state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepthStencilState {
    pub depth_buffer_enable: bool,
    pub depth_buffer_write_enable: bool,
    pub depth_buffer_function: CompareFunction,
    pub stencil_enable: bool,
    pub stencil_mask: i32,
    pub stencil_write_mask: i32,
    pub two_sided_stencil_mode: bool,
    pub stencil_fail: StencilOperation,
    pub stencil_depth_buffer_fail: StencilOperation,
    pub stencil_pass: StencilOperation,
    pub stencil_function: CompareFunction,
    pub ccw_stencil_fail: StencilOperation,
    pub ccw_stencil_depth_buffer_fail: StencilOperation,
    pub ccw_stencil_pass: StencilOperation,
    pub ccw_stencil_function: CompareFunction,
    pub reference_stencil: i32,
}

impl Default for DepthStencilState {
    fn default() -> Self {
        Self {
            depth_buffer_enable: true,
            depth_buffer_write_enable: true,
            depth_buffer_function: CompareFunction::LessEqual,
            stencil_enable: false,
            stencil_mask: -1,
            stencil_write_mask: -1,
            two_sided_stencil_mode: false,
            stencil_fail: StencilOperation::Keep,
            stencil_depth_buffer_fail: StencilOperation::Keep,
            stencil_pass: StencilOperation::Keep,
            stencil_function: CompareFunction::Always,
            ccw_stencil_fail: StencilOperation::Keep,
            ccw_stencil_depth_buffer_fail: StencilOperation::Keep,
            ccw_stencil_pass: StencilOperation::Keep,
            ccw_stencil_function: CompareFunction::Always,
            reference_stencil: 0,
        }
    }
}

/// Rasterizer state
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RasterizerState {
    pub fill_mode: FillMode,
    pub cull_mode: CullMode,
    pub depth_bias: f32,
    pub slope_scale_depth_bias: f32,
    pub scissor_test_enable: bool,
    pub multi_sample_anti_alias: bool,
}

impl Default for RasterizerState {
    fn default() -> Self {
        Self {
            fill_mode: FillMode::Solid,
            cull_mode: CullMode::CullCounterClockwiseFace,
            depth_bias: 0.0,
            slope_scale_depth_bias: 0.0,
            scissor_test_enable: false,
            multi_sample_anti_alias: true,
        }
    }
}

/// Texture sampler state
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplerState {
    pub filter: TextureFilter,
    pub address_u: TextureAddressMode,
    pub address_v: TextureAddressMode,
    pub address_w: TextureAddressMode,
    pub mip_map_level_of_detail_bias: f32,
    pub max_anisotropy: i32,
    pub max_mip_level: i32,
}

impl Default for SamplerState {
    fn default() -> Self {
        Self {
            filter: TextureFilter::Linear,
            address_u: TextureAddressMode::Wrap,
            address_v: TextureAddressMode::Wrap,
            address_w: TextureAddressMode::Wrap,
            mip_map_level_of_detail_bias: 0.0,
            max_anisotropy: 4,
            max_mip_level: 0,
        }
    }
}
