//! SketchSync Core Library
//!
//! Platform-agnostic data model, capture state machine and log sync for the
//! SketchSync collaborative whiteboard.

pub mod board;
pub mod geometry;
pub mod identity;
pub mod protocol;
pub mod shared_log;
pub mod stroke;
pub mod sync;
pub mod theme;
pub mod tools;
pub mod viewport;

pub use board::{BoardView, Whiteboard};
pub use geometry::{Outline, normalize_square, outline_of};
pub use identity::Identity;
pub use protocol::{ClientMessage, ErrorCode, ServerMessage};
pub use shared_log::{ConnectionState, LogError, LogResult, MemoryLog, RemoteLog, SharedLog, Subscription};
pub use stroke::{Draft, Drawable, ProjectId, SerializableColor, Stroke, StrokeId, StrokeRecord, StrokeShape, StrokeSnapshot};
pub use sync::{PendingCommit, SyncClient, SyncError, SyncResult};
pub use theme::Theme;
pub use tools::{CaptureMachine, CaptureState, ToolKind, ToolSettings};
pub use viewport::{DEFAULT_SURFACE_HEIGHT, SurfaceSize, ViewportConfig, ViewportManager};
