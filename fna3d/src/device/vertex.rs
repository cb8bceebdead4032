/// Vertex declarations, buffer bindings and draw-call enums

use crate::device::BufferHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexElementFormat {
    Single,
    Vector2,
    Vector3,
    Vector4,
    Color,
    Byte4,
    Short2,
    Short4,
    NormalizedShort2,
    NormalizedShort4,
    HalfVector2,
    HalfVector4,
}

impl VertexElementFormat {
    pub fn size(self) -> u32 {
        match self {
            VertexElementFormat::Single
            | VertexElementFormat::Color
            | VertexElementFormat::Byte4
            | VertexElementFormat::Short2
            | VertexElementFormat::NormalizedShort2
            | VertexElementFormat::HalfVector2 => 4,
            VertexElementFormat::Vector2
            | VertexElementFormat::Short4
            | VertexElementFormat::NormalizedShort4
            | VertexElementFormat::HalfVector4 => 8,
            VertexElementFormat::Vector3 => 12,
            VertexElementFormat::Vector4 => 16,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexElementUsage {
    Position,
    Color,
    TextureCoordinate,
    Normal,
    Binormal,
    Tangent,
    BlendIndices,
    BlendWeight,
    Depth,
    Fog,
    PointSize,
    Sample,
    TessellateFactor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexElement {
    pub offset: u32,
    pub format: VertexElementFormat,
    pub usage: VertexElementUsage,
    pub usage_index: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VertexDeclaration {
    pub vertex_stride: u32,
    pub elements: Vec<VertexElement>,
}

/// One vertex stream
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VertexBufferBinding {
    pub vertex_buffer: BufferHandle,
    pub vertex_declaration: VertexDeclaration,
    pub vertex_offset: i32,
    /// 0 for per-vertex data, otherwise per-instance
    pub instance_frequency: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveType {
    TriangleList,
    TriangleStrip,
    LineList,
    LineStrip,
    PointListExt,
}

impl PrimitiveType {
    /// Number of vertices consumed by `primitive_count` primitives
    pub fn vertex_count(self, primitive_count: u32) -> u32 {
        match self {
            PrimitiveType::TriangleList => primitive_count * 3,
            PrimitiveType::TriangleStrip => primitive_count + 2,
            PrimitiveType::LineList => primitive_count * 2,
            PrimitiveType::LineStrip => primitive_count + 1,
            PrimitiveType::PointListExt => primitive_count,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexElementSize {
    SixteenBits,
    ThirtyTwoBits,
}

impl IndexElementSize {
    pub fn size(self) -> u32 {
        match self {
            IndexElementSize::SixteenBits => 2,
            IndexElementSize::ThirtyTwoBits => 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BufferUsage {
    #[default]
    None,
    WriteOnly,
}

/// How a buffer write interacts with data the GPU may still be reading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SetDataOptions {
    /// Wait until the GPU is done with the buffer, then overwrite
    #[default]
    None,
    /// Old contents are discarded; the write may land in fresh storage
    Discard,
    /// Caller promises not to touch data in use
    NoOverwrite,
}
