//! SketchSync Render Library
//!
//! Renderer abstraction and implementations for SketchSync.
//! The default implementation rasterizes in software with tiny-skia.

mod raster;
mod renderer;

pub use raster::{Frame, RasterRenderer};
pub use renderer::{RenderContext, RenderResult, Renderer, RendererError};
