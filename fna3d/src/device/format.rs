/// Surface and depth formats

/// Color surface formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SurfaceFormat {
    #[default]
    Color,
    Bgr565,
    Bgra5551,
    Bgra4444,
    Dxt1,
    Dxt3,
    Dxt5,
    NormalizedByte2,
    NormalizedByte4,
    Rgba1010102,
    Rg32,
    Rgba64,
    Alpha8,
    Single,
    Vector2,
    Vector4,
    HalfSingle,
    HalfVector2,
    HalfVector4,
    HdrBlendable,
    ColorBgraExt,
    ColorSrgbExt,
    Dxt5SrgbExt,
    Bc7Ext,
    Bc7SrgbExt,
}

impl SurfaceFormat {
    /// Size in bytes of one texel, or of one 4x4 block for compressed formats
    pub fn texel_size(self) -> u32 {
        match self {
            SurfaceFormat::Dxt1 => 8,
            SurfaceFormat::Dxt3
            | SurfaceFormat::Dxt5
            | SurfaceFormat::Dxt5SrgbExt
            | SurfaceFormat::Bc7Ext
            | SurfaceFormat::Bc7SrgbExt => 16,
            SurfaceFormat::Alpha8 => 1,
            SurfaceFormat::Bgr565
            | SurfaceFormat::Bgra4444
            | SurfaceFormat::Bgra5551
            | SurfaceFormat::HalfSingle
            | SurfaceFormat::NormalizedByte2 => 2,
            SurfaceFormat::Color
            | SurfaceFormat::Single
            | SurfaceFormat::Rg32
            | SurfaceFormat::HalfVector2
            | SurfaceFormat::NormalizedByte4
            | SurfaceFormat::Rgba1010102
            | SurfaceFormat::ColorBgraExt
            | SurfaceFormat::ColorSrgbExt => 4,
            SurfaceFormat::HalfVector4
            | SurfaceFormat::Rgba64
            | SurfaceFormat::Vector2
            | SurfaceFormat::HdrBlendable => 8,
            SurfaceFormat::Vector4 => 16,
        }
    }

    /// Edge length of a compression block (1 for uncompressed formats)
    pub fn block_size(self) -> u32 {
        if self.is_compressed() { 4 } else { 1 }
    }

    pub fn is_compressed(self) -> bool {
        matches!(
            self,
            SurfaceFormat::Dxt1
                | SurfaceFormat::Dxt3
                | SurfaceFormat::Dxt5
                | SurfaceFormat::Dxt5SrgbExt
                | SurfaceFormat::Bc7Ext
                | SurfaceFormat::Bc7SrgbExt
        )
    }

    /// Byte size of a `width` x `height` region of one mip level
    pub fn texture_size(self, width: u32, height: u32) -> usize {
        let block = self.block_size();
        let blocks_wide = width.div_ceil(block).max(1);
        let blocks_high = height.div_ceil(block).max(1);
        blocks_wide as usize * blocks_high as usize * self.texel_size() as usize
    }
}

/// Depth-stencil formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DepthFormat {
    #[default]
    None,
    D16,
    D24,
    D24S8,
}

impl DepthFormat {
    pub fn has_stencil(self) -> bool {
        self == DepthFormat::D24S8
    }
}

#[cfg(test)]
#[path = "format_tests.rs"]
mod tests;
