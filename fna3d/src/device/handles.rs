/// Opaque resource handles handed out by a device
///
/// Handles are generational keys: a handle whose resource has been disposed
/// never aliases a newer resource.

use slotmap::new_key_type;

new_key_type! {
    /// Texture (2D, 3D or cube)
    pub struct TextureHandle;
    /// Color or depth-stencil renderbuffer
    pub struct RenderbufferHandle;
    /// Vertex or index buffer
    pub struct BufferHandle;
    /// Compiled effect
    pub struct EffectHandle;
    /// Occlusion query
    pub struct QueryHandle;
}
