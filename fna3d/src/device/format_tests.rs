//! Unit tests for format.rs, vertex.rs and state.rs helpers

use crate::device::*;

// ============================================================================
// SURFACE FORMAT SIZES
// ============================================================================

#[test]
fn test_texel_sizes() {
    assert_eq!(SurfaceFormat::Color.texel_size(), 4);
    assert_eq!(SurfaceFormat::Alpha8.texel_size(), 1);
    assert_eq!(SurfaceFormat::Bgr565.texel_size(), 2);
    assert_eq!(SurfaceFormat::Vector4.texel_size(), 16);
    assert_eq!(SurfaceFormat::HdrBlendable.texel_size(), 8);
    assert_eq!(SurfaceFormat::Dxt1.texel_size(), 8);
    assert_eq!(SurfaceFormat::Dxt5.texel_size(), 16);
}

#[test]
fn test_compressed_texture_size_rounds_up_to_blocks() {
    // 5x5 DXT1 = 2x2 blocks of 8 bytes
    assert_eq!(SurfaceFormat::Dxt1.texture_size(5, 5), 32);
    // 1x1 still occupies one block
    assert_eq!(SurfaceFormat::Bc7Ext.texture_size(1, 1), 16);
}

#[test]
fn test_uncompressed_texture_size() {
    assert_eq!(SurfaceFormat::Color.texture_size(16, 8), 16 * 8 * 4);
    assert_eq!(SurfaceFormat::Alpha8.texture_size(3, 3), 9);
}

#[test]
fn test_depth_format_stencil() {
    assert!(DepthFormat::D24S8.has_stencil());
    assert!(!DepthFormat::D24.has_stencil());
    assert!(!DepthFormat::None.has_stencil());
}

// ============================================================================
// VERTEX HELPERS
// ============================================================================

#[test]
fn test_primitive_vertex_counts() {
    assert_eq!(PrimitiveType::TriangleList.vertex_count(2), 6);
    assert_eq!(PrimitiveType::TriangleStrip.vertex_count(2), 4);
    assert_eq!(PrimitiveType::LineList.vertex_count(3), 6);
    assert_eq!(PrimitiveType::LineStrip.vertex_count(3), 4);
    assert_eq!(PrimitiveType::PointListExt.vertex_count(7), 7);
}

#[test]
fn test_vertex_element_sizes() {
    assert_eq!(VertexElementFormat::Vector3.size(), 12);
    assert_eq!(VertexElementFormat::Color.size(), 4);
    assert_eq!(VertexElementFormat::HalfVector4.size(), 8);
    assert_eq!(IndexElementSize::SixteenBits.size(), 2);
    assert_eq!(IndexElementSize::ThirtyTwoBits.size(), 4);
}

// ============================================================================
// STATE DEFAULTS
// ============================================================================

#[test]
fn test_default_blend_state_is_opaque() {
    let state = BlendState::default();
    assert!(!state.is_blending());
    assert_eq!(state.color_write_enable, ColorWriteChannels::ALL);
    assert_eq!(state.multi_sample_mask, -1);

    let alpha = BlendState {
        color_source_blend: Blend::SourceAlpha,
        color_destination_blend: Blend::InverseSourceAlpha,
        ..BlendState::default()
    };
    assert!(alpha.is_blending());
}

#[test]
fn test_color_to_array() {
    assert_eq!(Color::WHITE.to_array(), [1.0, 1.0, 1.0, 1.0]);
    assert_eq!(Color::new(0, 0, 0, 0).to_array(), [0.0; 4]);
}

#[test]
fn test_render_target_extent() {
    let mut textures: slotmap::SlotMap<TextureHandle, ()> = slotmap::SlotMap::with_key();
    let texture = textures.insert(());
    let cube = RenderTargetBinding {
        kind: RenderTargetKind::Cube { size: 64, face: CubeMapFace::NegativeY },
        level_count: 1,
        multi_sample_count: 0,
        texture,
        color_buffer: None,
    };
    assert_eq!(cube.extent(), (64, 64));
    assert_eq!(CubeMapFace::NegativeY.index(), 3);
}
