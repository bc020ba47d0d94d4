//! Mountable drawing surface: whiteboard, viewport and renderer together.

use kurbo::{Point, Size};
use sketchsync_core::board::Whiteboard;
use sketchsync_core::identity::Identity;
use sketchsync_core::shared_log::LogError;
use sketchsync_core::stroke::{ProjectId, SerializableColor};
use sketchsync_core::sync::SyncError;
use sketchsync_core::theme::Theme;
use sketchsync_core::tools::ToolKind;
use sketchsync_core::viewport::{SurfaceSize, ViewportConfig, ViewportManager};
use sketchsync_render::{Frame, RasterRenderer, RenderContext, Renderer, RendererError};
use std::path::Path;
use thiserror::Error;

/// Surface errors.
#[derive(Debug, Error)]
pub enum SurfaceError {
    #[error("Render error: {0}")]
    Render(#[from] RendererError),
    #[error("PNG encoding failed: {0}")]
    Png(#[from] png::EncodingError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Sync(#[from] SyncError),
    #[error(transparent)]
    Log(#[from] LogError),
    #[error("Nothing rendered yet")]
    NoFrame,
}

/// Result type for surface operations.
pub type SurfaceResult<T> = Result<T, SurfaceError>;

/// A whiteboard bound to a sized raster surface.
///
/// Every call that changes what is visible redraws the whole frame.
pub struct DrawingSurface {
    board: Whiteboard,
    viewport: ViewportManager,
    renderer: RasterRenderer,
    frame: Option<Frame>,
}

impl DrawingSurface {
    pub fn new(board: Whiteboard, config: ViewportConfig) -> Self {
        Self {
            board,
            viewport: ViewportManager::new(config),
            renderer: RasterRenderer::new(),
            frame: None,
        }
    }

    pub fn board(&self) -> &Whiteboard {
        &self.board
    }

    pub fn size(&self) -> Option<SurfaceSize> {
        self.viewport.size()
    }

    /// Mount the surface in a container of the given size.
    pub fn attach(&mut self, container: Size) -> SurfaceResult<()> {
        self.viewport.attach(container);
        self.redraw()
    }

    /// Container resized: width follows, height stays fixed.
    pub fn resize(&mut self, container: Size) -> SurfaceResult<()> {
        self.viewport.resize(container);
        self.redraw()
    }

    pub fn set_project(&mut self, project: Option<ProjectId>) -> SurfaceResult<()> {
        let result = self.board.set_project(project);
        self.redraw()?;
        Ok(result?)
    }

    /// Sign in or out of drawing.
    pub fn set_identity(&mut self, identity: Option<Identity>) -> SurfaceResult<()> {
        let changed = self.board.set_identity(identity);
        self.redraw_if(changed)
    }

    pub fn pointer_down(&mut self, point: Point) -> SurfaceResult<()> {
        let changed = self.board.pointer_down(point);
        self.redraw_if(changed)
    }

    pub fn pointer_move(&mut self, point: Point) -> SurfaceResult<()> {
        let changed = self.board.pointer_move(point);
        self.redraw_if(changed)
    }

    pub fn pointer_up(&mut self) -> SurfaceResult<()> {
        let changed = self.board.pointer_up();
        self.redraw_if(changed)
    }

    pub fn pointer_leave(&mut self) -> SurfaceResult<()> {
        let changed = self.board.pointer_leave();
        self.redraw_if(changed)
    }

    pub fn select_tool(&mut self, tool: ToolKind) -> bool {
        self.board.select_tool(tool)
    }

    pub fn set_color(&mut self, color: SerializableColor) -> bool {
        self.board.set_color(color)
    }

    pub fn set_theme(&mut self, theme: Theme) -> SurfaceResult<()> {
        let changed = self.board.set_theme(theme);
        self.redraw_if(changed)
    }

    /// Local-only "clear view".
    pub fn clear_view(&mut self) -> SurfaceResult<()> {
        let changed = self.board.clear_view();
        self.redraw_if(changed)
    }

    /// Pick up log changes. Returns true if a new frame was drawn.
    pub fn poll_updates(&mut self) -> SurfaceResult<bool> {
        if !self.board.poll_updates() {
            return Ok(false);
        }
        self.redraw()?;
        Ok(true)
    }

    /// Full redraw of the current state. Skipped until the surface has a size.
    pub fn redraw(&mut self) -> SurfaceResult<()> {
        let Some(size) = self.viewport.size().filter(|size| !size.is_empty()) else {
            log::debug!("Skipping redraw: surface not sized");
            return Ok(());
        };
        let ctx = RenderContext::from_view(self.board.render_state(), size);
        self.renderer.render(&ctx)?;
        self.frame = self.renderer.frame();
        Ok(())
    }

    fn redraw_if(&mut self, changed: bool) -> SurfaceResult<()> {
        if changed {
            self.redraw()
        } else {
            Ok(())
        }
    }

    /// The latest rendered frame.
    pub fn frame(&self) -> Option<&Frame> {
        self.frame.as_ref()
    }

    /// The latest frame as PNG bytes.
    pub fn encode_png(&self) -> SurfaceResult<Vec<u8>> {
        let frame = self.frame.as_ref().ok_or(SurfaceError::NoFrame)?;
        Ok(encode_png(&frame.rgba_data, frame.width, frame.height)?)
    }

    /// Write the latest frame to a PNG file.
    pub fn write_png(&self, path: &Path) -> SurfaceResult<()> {
        let bytes = self.encode_png()?;
        std::fs::write(path, &bytes)?;
        log::info!("Wrote {} ({} bytes)", path.display(), bytes.len());
        Ok(())
    }
}

/// Encode RGBA pixel data to PNG bytes.
pub fn encode_png(rgba_data: &[u8], width: u32, height: u32) -> Result<Vec<u8>, png::EncodingError> {
    let mut png_data = Vec::new();
    {
        let mut encoder = png::Encoder::new(&mut png_data, width, height);
        encoder.set_color(png::ColorType::Rgba);
        encoder.set_depth(png::BitDepth::Eight);

        let mut writer = encoder.write_header()?;
        writer.write_image_data(rgba_data)?;
    }
    Ok(png_data)
}
