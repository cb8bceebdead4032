/// Native-handle interop with code that talks to the graphics API directly
///
/// Handles are carried as raw `u64` values so this crate stays independent of
/// any backend's bindings.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SysRenderer {
    Vulkan {
        instance: u64,
        physical_device: u64,
        logical_device: u64,
        queue_family_index: u32,
    },
}

/// A foreign-owned texture to import with `create_sys_texture`
///
/// The device never destroys an imported image or view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SysTexture {
    Vulkan {
        image: u64,
        view: u64,
    },
}
