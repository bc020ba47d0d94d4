//! SketchSync Application
//!
//! Host-facing drawing surface that ties the whiteboard, viewport and
//! renderer together, plus the viewer configuration.

mod config;
mod surface;

pub use config::AppConfig;
pub use surface::{DrawingSurface, SurfaceError, SurfaceResult, encode_png};
