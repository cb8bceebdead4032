/// Presentation parameters, viewports and the window abstraction

use std::fmt;
use std::sync::Arc;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use crate::device::{SurfaceFormat, DepthFormat};

/// A window a device can present into
///
/// Implemented for `winit::window::Window`; hosts embedding another platform
/// layer implement it for their own window type.
pub trait DeviceWindow: HasWindowHandle + HasDisplayHandle + Send + Sync {
    /// Current drawable size in physical pixels (may be 0x0 while minimized)
    fn drawable_size(&self) -> (u32, u32);

    /// Stable identifier used to key per-window presentation state
    fn window_id(&self) -> u64;
}

impl DeviceWindow for winit::window::Window {
    fn drawable_size(&self) -> (u32, u32) {
        let size = self.inner_size();
        (size.width, size.height)
    }

    fn window_id(&self) -> u64 {
        u64::from(self.id())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PresentInterval {
    #[default]
    Default,
    One,
    Two,
    Immediate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DisplayOrientation {
    #[default]
    Default,
    LandscapeLeft,
    LandscapeRight,
    Portrait,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RenderTargetUsage {
    #[default]
    DiscardContents,
    PreserveContents,
    PlatformContents,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
}

impl Rect {
    pub fn new(x: i32, y: i32, w: i32, h: i32) -> Self {
        Self { x, y, w, h }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Viewport {
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
    pub min_depth: f32,
    pub max_depth: f32,
}

/// Backbuffer and window configuration for device creation and resets
#[derive(Clone)]
pub struct PresentationParameters {
    pub back_buffer_width: u32,
    pub back_buffer_height: u32,
    pub back_buffer_format: SurfaceFormat,
    pub multi_sample_count: u32,
    pub device_window: Option<Arc<dyn DeviceWindow>>,
    pub is_full_screen: bool,
    pub depth_stencil_format: DepthFormat,
    pub presentation_interval: PresentInterval,
    pub display_orientation: DisplayOrientation,
    pub render_target_usage: RenderTargetUsage,
}

impl Default for PresentationParameters {
    fn default() -> Self {
        Self {
            back_buffer_width: 800,
            back_buffer_height: 480,
            back_buffer_format: SurfaceFormat::Color,
            multi_sample_count: 0,
            device_window: None,
            is_full_screen: false,
            depth_stencil_format: DepthFormat::None,
            presentation_interval: PresentInterval::Default,
            display_orientation: DisplayOrientation::Default,
            render_target_usage: RenderTargetUsage::DiscardContents,
        }
    }
}

impl fmt::Debug for PresentationParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PresentationParameters")
            .field("back_buffer_width", &self.back_buffer_width)
            .field("back_buffer_height", &self.back_buffer_height)
            .field("back_buffer_format", &self.back_buffer_format)
            .field("multi_sample_count", &self.multi_sample_count)
            .field("device_window", &self.device_window.as_ref().map(|w| w.window_id()))
            .field("is_full_screen", &self.is_full_screen)
            .field("depth_stencil_format", &self.depth_stencil_format)
            .field("presentation_interval", &self.presentation_interval)
            .field("display_orientation", &self.display_orientation)
            .field("render_target_usage", &self.render_target_usage)
            .finish()
    }
}
