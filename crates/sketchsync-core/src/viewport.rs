//! Drawing surface sizing.

use kurbo::Size;
use serde::{Deserialize, Serialize};

/// Default drawing surface height in pixels.
pub const DEFAULT_SURFACE_HEIGHT: u32 = 400;

/// Pixel dimensions of the drawing surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurfaceSize {
    pub width: u32,
    pub height: u32,
}

impl SurfaceSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Whether either dimension is zero (nothing can be drawn).
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Viewport configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewportConfig {
    /// Height of the surface regardless of container height.
    pub fixed_height: u32,
}

impl Default for ViewportConfig {
    fn default() -> Self {
        Self {
            fixed_height: DEFAULT_SURFACE_HEIGHT,
        }
    }
}

/// Tracks the surface size, derived from the container on every layout event.
#[derive(Debug, Clone, Default)]
pub struct ViewportManager {
    config: ViewportConfig,
    size: Option<SurfaceSize>,
}

impl ViewportManager {
    pub fn new(config: ViewportConfig) -> Self {
        Self { config, size: None }
    }

    /// Size the surface when it is first mounted.
    pub fn attach(&mut self, container: Size) -> SurfaceSize {
        self.resize(container)
    }

    /// Recompute the surface size: container width, fixed height.
    pub fn resize(&mut self, container: Size) -> SurfaceSize {
        let width = if container.width.is_finite() && container.width > 0.0 {
            container.width.round() as u32
        } else {
            0
        };
        let size = SurfaceSize::new(width, self.config.fixed_height);
        if self.size != Some(size) {
            log::debug!("Surface resized to {}x{}", size.width, size.height);
        }
        self.size = Some(size);
        size
    }

    /// Current size, if attached.
    pub fn size(&self) -> Option<SurfaceSize> {
        self.size
    }

    pub fn is_attached(&self) -> bool {
        self.size.is_some()
    }
}
