/// Conversions from FNA3D enums to Vulkan enums
///
/// Every function here is a pure table lookup so the mappings can be checked
/// without a device.

use ash::vk;
use fna3d::fna3d::render::{
    SurfaceFormat, DepthFormat, Blend, BlendFunction, ColorWriteChannels, CompareFunction,
    StencilOperation, FillMode, CullMode, PrimitiveType, IndexElementSize, VertexElementFormat,
    TextureAddressMode, TextureFilter,
};

// ============================================================================
// TEXTURE FORMATS
// ============================================================================

pub fn surface_format_to_vk(format: SurfaceFormat) -> vk::Format {
    match format {
        SurfaceFormat::Color => vk::Format::R8G8B8A8_UNORM,
        SurfaceFormat::Bgr565 => vk::Format::R5G6B5_UNORM_PACK16,
        SurfaceFormat::Bgra5551 => vk::Format::A1R5G5B5_UNORM_PACK16,
        SurfaceFormat::Bgra4444 => vk::Format::B4G4R4A4_UNORM_PACK16,
        SurfaceFormat::Dxt1 => vk::Format::BC1_RGBA_UNORM_BLOCK,
        SurfaceFormat::Dxt3 => vk::Format::BC2_UNORM_BLOCK,
        SurfaceFormat::Dxt5 => vk::Format::BC3_UNORM_BLOCK,
        SurfaceFormat::NormalizedByte2 => vk::Format::R8G8_SNORM,
        SurfaceFormat::NormalizedByte4 => vk::Format::R8G8B8A8_SNORM,
        SurfaceFormat::Rgba1010102 => vk::Format::A2R10G10B10_UNORM_PACK32,
        SurfaceFormat::Rg32 => vk::Format::R16G16_UNORM,
        SurfaceFormat::Rgba64 => vk::Format::R16G16B16A16_UNORM,
        SurfaceFormat::Alpha8 => vk::Format::R8_UNORM,
        SurfaceFormat::Single => vk::Format::R32_SFLOAT,
        SurfaceFormat::Vector2 => vk::Format::R32G32_SFLOAT,
        SurfaceFormat::Vector4 => vk::Format::R32G32B32A32_SFLOAT,
        SurfaceFormat::HalfSingle => vk::Format::R16_SFLOAT,
        SurfaceFormat::HalfVector2 => vk::Format::R16G16_SFLOAT,
        SurfaceFormat::HalfVector4 => vk::Format::R16G16B16A16_SFLOAT,
        SurfaceFormat::HdrBlendable => vk::Format::R16G16B16A16_SFLOAT,
        SurfaceFormat::ColorBgraExt => vk::Format::B8G8R8A8_UNORM,
        SurfaceFormat::ColorSrgbExt => vk::Format::R8G8B8A8_SRGB,
        SurfaceFormat::Dxt5SrgbExt => vk::Format::BC3_SRGB_BLOCK,
        SurfaceFormat::Bc7Ext => vk::Format::BC7_UNORM_BLOCK,
        SurfaceFormat::Bc7SrgbExt => vk::Format::BC7_SRGB_BLOCK,
    }
}

/// View swizzle making the Vulkan format read like the XNA one
pub fn surface_format_swizzle(format: SurfaceFormat) -> vk::ComponentMapping {
    use vk::ComponentSwizzle as S;
    match format {
        SurfaceFormat::Alpha8 => vk::ComponentMapping { r: S::ZERO, g: S::ZERO, b: S::ZERO, a: S::R },
        SurfaceFormat::Bgra4444 => vk::ComponentMapping { r: S::G, g: S::R, b: S::A, a: S::B },
        _ => vk::ComponentMapping {
            r: S::IDENTITY,
            g: S::IDENTITY,
            b: S::IDENTITY,
            a: S::IDENTITY,
        },
    }
}

/// Depth format support probed once at device creation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DepthFormatSupport {
    pub d24: bool,
    pub d24s8: bool,
}

/// Vulkan format for a depth-stencil buffer; `UNDEFINED` for `DepthFormat::None`
///
/// 24-bit formats fall back to 32-bit float depth where the device lacks them.
pub fn depth_format_to_vk(format: DepthFormat, support: DepthFormatSupport) -> vk::Format {
    match format {
        DepthFormat::None => vk::Format::UNDEFINED,
        DepthFormat::D16 => vk::Format::D16_UNORM,
        DepthFormat::D24 if support.d24 => vk::Format::X8_D24_UNORM_PACK32,
        DepthFormat::D24 => vk::Format::D32_SFLOAT,
        DepthFormat::D24S8 if support.d24s8 => vk::Format::D24_UNORM_S8_UINT,
        DepthFormat::D24S8 => vk::Format::D32_SFLOAT_S8_UINT,
    }
}

pub fn depth_aspect_flags(format: vk::Format) -> vk::ImageAspectFlags {
    match format {
        vk::Format::D24_UNORM_S8_UINT | vk::Format::D32_SFLOAT_S8_UINT | vk::Format::D16_UNORM_S8_UINT => {
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        }
        _ => vk::ImageAspectFlags::DEPTH,
    }
}

/// Resolution of the depth buffer, used to scale XNA depth bias into Vulkan units
pub fn depth_bias_scale(format: DepthFormat) -> f32 {
    match format {
        DepthFormat::None => 0.0,
        DepthFormat::D16 => ((1 << 16) - 1) as f32,
        DepthFormat::D24 | DepthFormat::D24S8 => ((1 << 24) - 1) as f32,
    }
}

// ============================================================================
// SAMPLE COUNTS
// ============================================================================

/// Sample count flag for an XNA multisample count (0 and 1 mean single-sampled)
pub fn sample_count_to_vk(count: u32) -> vk::SampleCountFlags {
    match count {
        0 | 1 => vk::SampleCountFlags::TYPE_1,
        2..=3 => vk::SampleCountFlags::TYPE_2,
        4..=7 => vk::SampleCountFlags::TYPE_4,
        8..=15 => vk::SampleCountFlags::TYPE_8,
        16..=31 => vk::SampleCountFlags::TYPE_16,
        32..=63 => vk::SampleCountFlags::TYPE_32,
        _ => vk::SampleCountFlags::TYPE_64,
    }
}

/// Largest supported sample count not above `requested`
pub fn max_supported_sample_count(supported: vk::SampleCountFlags, requested: u32) -> u32 {
    let mut count = sample_count_to_vk(requested).as_raw();
    while count > 1 && !supported.contains(vk::SampleCountFlags::from_raw(count)) {
        count >>= 1;
    }
    count.max(1)
}

// ============================================================================
// BLEND / DEPTH-STENCIL / RASTERIZER
// ============================================================================

pub fn blend_to_vk(blend: Blend) -> vk::BlendFactor {
    match blend {
        Blend::One => vk::BlendFactor::ONE,
        Blend::Zero => vk::BlendFactor::ZERO,
        Blend::SourceColor => vk::BlendFactor::SRC_COLOR,
        Blend::InverseSourceColor => vk::BlendFactor::ONE_MINUS_SRC_COLOR,
        Blend::SourceAlpha => vk::BlendFactor::SRC_ALPHA,
        Blend::InverseSourceAlpha => vk::BlendFactor::ONE_MINUS_SRC_ALPHA,
        Blend::DestinationColor => vk::BlendFactor::DST_COLOR,
        Blend::InverseDestinationColor => vk::BlendFactor::ONE_MINUS_DST_COLOR,
        Blend::DestinationAlpha => vk::BlendFactor::DST_ALPHA,
        Blend::InverseDestinationAlpha => vk::BlendFactor::ONE_MINUS_DST_ALPHA,
        Blend::BlendFactor => vk::BlendFactor::CONSTANT_COLOR,
        Blend::InverseBlendFactor => vk::BlendFactor::ONE_MINUS_CONSTANT_COLOR,
        Blend::SourceAlphaSaturation => vk::BlendFactor::SRC_ALPHA_SATURATE,
    }
}

pub fn blend_function_to_vk(function: BlendFunction) -> vk::BlendOp {
    match function {
        BlendFunction::Add => vk::BlendOp::ADD,
        BlendFunction::Subtract => vk::BlendOp::SUBTRACT,
        BlendFunction::ReverseSubtract => vk::BlendOp::REVERSE_SUBTRACT,
        BlendFunction::Max => vk::BlendOp::MAX,
        BlendFunction::Min => vk::BlendOp::MIN,
    }
}

/// XNA and Vulkan use the same RGBA bit order
pub fn color_write_to_vk(channels: ColorWriteChannels) -> vk::ColorComponentFlags {
    vk::ColorComponentFlags::from_raw(channels.bits() & 0xF)
}

pub fn compare_to_vk(function: CompareFunction) -> vk::CompareOp {
    match function {
        CompareFunction::Always => vk::CompareOp::ALWAYS,
        CompareFunction::Never => vk::CompareOp::NEVER,
        CompareFunction::Less => vk::CompareOp::LESS,
        CompareFunction::LessEqual => vk::CompareOp::LESS_OR_EQUAL,
        CompareFunction::Equal => vk::CompareOp::EQUAL,
        CompareFunction::GreaterEqual => vk::CompareOp::GREATER_OR_EQUAL,
        CompareFunction::Greater => vk::CompareOp::GREATER,
        CompareFunction::NotEqual => vk::CompareOp::NOT_EQUAL,
    }
}

pub fn stencil_op_to_vk(operation: StencilOperation) -> vk::StencilOp {
    match operation {
        StencilOperation::Keep => vk::StencilOp::KEEP,
        StencilOperation::Zero => vk::StencilOp::ZERO,
        StencilOperation::Replace => vk::StencilOp::REPLACE,
        StencilOperation::Increment => vk::StencilOp::INCREMENT_AND_WRAP,
        StencilOperation::Decrement => vk::StencilOp::DECREMENT_AND_WRAP,
        StencilOperation::IncrementSaturation => vk::StencilOp::INCREMENT_AND_CLAMP,
        StencilOperation::DecrementSaturation => vk::StencilOp::DECREMENT_AND_CLAMP,
        StencilOperation::Invert => vk::StencilOp::INVERT,
    }
}

pub fn fill_mode_to_vk(mode: FillMode) -> vk::PolygonMode {
    match mode {
        FillMode::Solid => vk::PolygonMode::FILL,
        FillMode::WireFrame => vk::PolygonMode::LINE,
    }
}

/// Cull mode assuming a clockwise front face
pub fn cull_mode_to_vk(mode: CullMode) -> vk::CullModeFlags {
    match mode {
        CullMode::None => vk::CullModeFlags::NONE,
        CullMode::CullClockwiseFace => vk::CullModeFlags::FRONT,
        CullMode::CullCounterClockwiseFace => vk::CullModeFlags::BACK,
    }
}

pub fn primitive_type_to_vk(primitive_type: PrimitiveType) -> vk::PrimitiveTopology {
    match primitive_type {
        PrimitiveType::TriangleList => vk::PrimitiveTopology::TRIANGLE_LIST,
        PrimitiveType::TriangleStrip => vk::PrimitiveTopology::TRIANGLE_STRIP,
        PrimitiveType::LineList => vk::PrimitiveTopology::LINE_LIST,
        PrimitiveType::LineStrip => vk::PrimitiveTopology::LINE_STRIP,
        PrimitiveType::PointListExt => vk::PrimitiveTopology::POINT_LIST,
    }
}

pub fn index_type_to_vk(size: IndexElementSize) -> vk::IndexType {
    match size {
        IndexElementSize::SixteenBits => vk::IndexType::UINT16,
        IndexElementSize::ThirtyTwoBits => vk::IndexType::UINT32,
    }
}

pub fn vertex_format_to_vk(format: VertexElementFormat) -> vk::Format {
    match format {
        VertexElementFormat::Single => vk::Format::R32_SFLOAT,
        VertexElementFormat::Vector2 => vk::Format::R32G32_SFLOAT,
        VertexElementFormat::Vector3 => vk::Format::R32G32B32_SFLOAT,
        VertexElementFormat::Vector4 => vk::Format::R32G32B32A32_SFLOAT,
        VertexElementFormat::Color => vk::Format::R8G8B8A8_UNORM,
        VertexElementFormat::Byte4 => vk::Format::R8G8B8A8_USCALED,
        VertexElementFormat::Short2 => vk::Format::R16G16_SSCALED,
        VertexElementFormat::Short4 => vk::Format::R16G16B16A16_SSCALED,
        VertexElementFormat::NormalizedShort2 => vk::Format::R16G16_SNORM,
        VertexElementFormat::NormalizedShort4 => vk::Format::R16G16B16A16_SNORM,
        VertexElementFormat::HalfVector2 => vk::Format::R16G16_SFLOAT,
        VertexElementFormat::HalfVector4 => vk::Format::R16G16B16A16_SFLOAT,
    }
}

// ============================================================================
// SAMPLERS
// ============================================================================

pub fn address_mode_to_vk(mode: TextureAddressMode) -> vk::SamplerAddressMode {
    match mode {
        TextureAddressMode::Wrap => vk::SamplerAddressMode::REPEAT,
        TextureAddressMode::Clamp => vk::SamplerAddressMode::CLAMP_TO_EDGE,
        TextureAddressMode::Mirror => vk::SamplerAddressMode::MIRRORED_REPEAT,
    }
}

/// (mag filter, min filter, mipmap mode)
pub fn texture_filter_to_vk(filter: TextureFilter) -> (vk::Filter, vk::Filter, vk::SamplerMipmapMode) {
    use vk::Filter as F;
    use vk::SamplerMipmapMode as M;
    match filter {
        TextureFilter::Linear | TextureFilter::Anisotropic => (F::LINEAR, F::LINEAR, M::LINEAR),
        TextureFilter::Point => (F::NEAREST, F::NEAREST, M::NEAREST),
        TextureFilter::LinearMipPoint => (F::LINEAR, F::LINEAR, M::NEAREST),
        TextureFilter::PointMipLinear => (F::NEAREST, F::NEAREST, M::LINEAR),
        TextureFilter::MinLinearMagPointMipLinear => (F::NEAREST, F::LINEAR, M::LINEAR),
        TextureFilter::MinLinearMagPointMipPoint => (F::NEAREST, F::LINEAR, M::NEAREST),
        TextureFilter::MinPointMagLinearMipLinear => (F::LINEAR, F::NEAREST, M::LINEAR),
        TextureFilter::MinPointMagLinearMipPoint => (F::LINEAR, F::NEAREST, M::NEAREST),
    }
}

#[cfg(test)]
#[path = "vulkan_format_tests.rs"]
mod tests;
