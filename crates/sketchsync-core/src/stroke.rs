//! Stroke records: the unit of replication and rendering.

use crate::geometry::{self, Outline};
use crate::identity::Identity;
use kurbo::Point;
use peniko::Color;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Serializable color representation (RGBA8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SerializableColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl SerializableColor {
    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self::new(r, g, b, 255)
    }

    pub const fn black() -> Self {
        Self::rgb(0, 0, 0)
    }

    pub const fn white() -> Self {
        Self::rgb(255, 255, 255)
    }

    /// Parse a CSS hex color like `#1f2937` or `#1f2937ff`.
    pub fn from_hex(s: &str) -> Option<Self> {
        let hex = s.trim().strip_prefix('#')?;
        if !hex.is_ascii() {
            return None;
        }
        let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
        match hex.len() {
            6 => Some(Self::rgb(channel(0)?, channel(2)?, channel(4)?)),
            8 => Some(Self::new(channel(0)?, channel(2)?, channel(4)?, channel(6)?)),
            _ => None,
        }
    }

    /// Format as `#rrggbb` (alpha is dropped when opaque).
    pub fn to_hex(&self) -> String {
        if self.a == 255 {
            format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
        } else {
            format!("#{:02x}{:02x}{:02x}{:02x}", self.r, self.g, self.b, self.a)
        }
    }
}

impl From<Color> for SerializableColor {
    fn from(color: Color) -> Self {
        let rgba = color.to_rgba8();
        Self {
            r: rgba.r,
            g: rgba.g,
            b: rgba.b,
            a: rgba.a,
        }
    }
}

impl From<SerializableColor> for Color {
    fn from(color: SerializableColor) -> Self {
        Color::from_rgba8(color.r, color.g, color.b, color.a)
    }
}

/// Unique identifier for committed strokes, assigned by the shared log.
pub type StrokeId = Uuid;

/// Identifier of the collaborative project a drawing belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectId(String);

impl ProjectId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ProjectId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for ProjectId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Geometry payload of a stroke, tagged by stroke type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StrokeShape {
    /// Polyline through the captured points.
    Freehand { points: Vec<Point> },
    /// Axis-aligned rectangle from `anchor` with signed extents.
    Rectangle { anchor: Point, width: f64, height: f64 },
    /// Rectangle whose extents are forced to equal magnitude.
    Square { anchor: Point, width: f64, height: f64 },
    /// Isosceles triangle inscribed in the anchor/extent box.
    Triangle { anchor: Point, width: f64, height: f64 },
}

impl StrokeShape {
    /// Wire name of the stroke type.
    pub fn type_name(&self) -> &'static str {
        match self {
            StrokeShape::Freehand { .. } => "freehand",
            StrokeShape::Rectangle { .. } => "rectangle",
            StrokeShape::Square { .. } => "square",
            StrokeShape::Triangle { .. } => "triangle",
        }
    }

    pub fn is_freehand(&self) -> bool {
        matches!(self, StrokeShape::Freehand { .. })
    }
}

/// Anything the render engine can paint.
pub trait Drawable {
    /// Geometry payload.
    fn shape(&self) -> &StrokeShape;

    /// Stroke color.
    fn color(&self) -> SerializableColor;

    /// Stroke width in pixels.
    fn thickness(&self) -> f64;

    /// Rendered outline of this stroke.
    fn outline(&self) -> Outline {
        geometry::outline_of(self.shape())
    }
}

/// The mutable, not-yet-committed form of a stroke while a gesture is active.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Draft {
    #[serde(flatten)]
    pub shape: StrokeShape,
    pub color: SerializableColor,
    pub thickness: f64,
}

impl Draft {
    /// Start a freehand draft at `start`.
    pub fn freehand(start: Point, color: SerializableColor, thickness: f64) -> Self {
        Self {
            shape: StrokeShape::Freehand { points: vec![start] },
            color,
            thickness,
        }
    }

    /// Tag the draft with its author, producing the record sent to the log.
    pub fn into_record(self, identity: &Identity) -> StrokeRecord {
        StrokeRecord {
            draft: self,
            author_id: identity.author_id.clone(),
            author_name: identity.author_name.clone(),
        }
    }
}

impl Drawable for Draft {
    fn shape(&self) -> &StrokeShape {
        &self.shape
    }

    fn color(&self) -> SerializableColor {
        self.color
    }

    fn thickness(&self) -> f64 {
        self.thickness
    }
}

/// A finished draft plus author identity; the payload appended to the log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrokeRecord {
    #[serde(flatten)]
    pub draft: Draft,
    pub author_id: String,
    pub author_name: String,
}

impl Drawable for StrokeRecord {
    fn shape(&self) -> &StrokeShape {
        &self.draft.shape
    }

    fn color(&self) -> SerializableColor {
        self.draft.color
    }

    fn thickness(&self) -> f64 {
        self.draft.thickness
    }
}

/// A committed, immutable stroke with its log-assigned identity and order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stroke {
    pub id: StrokeId,
    /// Replay order assigned by the log; strictly increasing per project.
    pub order: u64,
    #[serde(flatten)]
    pub record: StrokeRecord,
}

impl Stroke {
    pub fn new(id: StrokeId, order: u64, record: StrokeRecord) -> Self {
        Self { id, order, record }
    }

    pub fn author_id(&self) -> &str {
        &self.record.author_id
    }

    pub fn author_name(&self) -> &str {
        &self.record.author_name
    }
}

impl Drawable for Stroke {
    fn shape(&self) -> &StrokeShape {
        self.record.shape()
    }

    fn color(&self) -> SerializableColor {
        self.record.color()
    }

    fn thickness(&self) -> f64 {
        self.record.thickness()
    }
}

/// The full committed stroke sequence of one project, sorted by `order`.
///
/// Snapshots are never patched: every log change produces a new one that
/// replaces the previous wholesale.
#[derive(Debug, Clone)]
pub struct StrokeSnapshot {
    project: ProjectId,
    strokes: Arc<[Stroke]>,
}

impl StrokeSnapshot {
    /// Build a snapshot, sorting by `order` (stable, so ties keep delivery order).
    pub fn new(project: ProjectId, mut strokes: Vec<Stroke>) -> Self {
        strokes.sort_by_key(|s| s.order);
        Self {
            project,
            strokes: strokes.into(),
        }
    }

    pub fn empty(project: ProjectId) -> Self {
        Self {
            project,
            strokes: Arc::from(Vec::new()),
        }
    }

    pub fn project(&self) -> &ProjectId {
        &self.project
    }

    pub fn strokes(&self) -> &[Stroke] {
        &self.strokes
    }

    pub fn len(&self) -> usize {
        self.strokes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strokes.is_empty()
    }

    /// Highest order in the snapshot.
    pub fn max_order(&self) -> Option<u64> {
        self.strokes.last().map(|s| s.order)
    }
}
