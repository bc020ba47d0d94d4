//! Renderer trait abstraction.

use peniko::Color;
use sketchsync_core::board::BoardView;
use sketchsync_core::stroke::{Draft, Stroke};
use sketchsync_core::viewport::SurfaceSize;
use thiserror::Error;

/// Renderer errors.
#[derive(Debug, Error)]
pub enum RendererError {
    #[error("Surface error: {0}")]
    Surface(String),
}

/// Result type for renderer operations.
pub type RenderResult<T> = Result<T, RendererError>;

/// Context for a single render frame.
#[derive(Debug, Clone, Copy)]
pub struct RenderContext<'a> {
    /// Committed strokes, ascending by order.
    pub committed: &'a [Stroke],
    /// Local draft painted above everything else.
    pub in_progress: Option<&'a Draft>,
    /// Surface size in pixels.
    pub viewport_size: SurfaceSize,
    /// Background color.
    pub background_color: Color,
}

impl<'a> RenderContext<'a> {
    /// Create a new render context.
    pub fn new(committed: &'a [Stroke], viewport_size: SurfaceSize) -> Self {
        Self {
            committed,
            in_progress: None,
            viewport_size,
            background_color: Color::WHITE,
        }
    }

    /// Context for the current state of a whiteboard.
    pub fn from_view(view: BoardView<'a>, viewport_size: SurfaceSize) -> Self {
        Self::new(view.committed, viewport_size)
            .with_draft(view.draft)
            .with_background(view.background.into())
    }

    /// Set the in-progress draft.
    pub fn with_draft(mut self, draft: Option<&'a Draft>) -> Self {
        self.in_progress = draft;
        self
    }

    /// Set the background color.
    pub fn with_background(mut self, color: Color) -> Self {
        self.background_color = color;
        self
    }
}

/// Trait for rendering backends.
///
/// Every call is a full redraw: the output depends only on the context.
pub trait Renderer: Send + Sync {
    /// Draw a complete frame.
    fn render(&mut self, ctx: &RenderContext) -> RenderResult<()>;

    /// Get the background color (for clearing).
    fn background_color(&self, ctx: &RenderContext) -> Color {
        ctx.background_color
    }
}
