//! Outline geometry for stroke shapes.

use crate::stroke::StrokeShape;
use kurbo::{BezPath, Point};

/// Drawable primitive produced for a stroke.
#[derive(Debug, Clone, PartialEq)]
pub enum Outline {
    /// Open polyline through the points in capture order.
    Polyline(Vec<Point>),
    /// Axis-aligned rectangle between two opposite corners.
    Rect { origin: Point, corner: Point },
    /// Closed triangle: apex, base right, base left.
    Triangle([Point; 3]),
}

impl Outline {
    /// Whether the outline paints nothing (a zero-extent shape).
    pub fn is_degenerate(&self) -> bool {
        match self {
            Outline::Polyline(points) => points.is_empty(),
            Outline::Rect { origin, corner } => origin == corner,
            Outline::Triangle([apex, right, left]) => apex == right && right == left,
        }
    }

    /// Whether this is a polyline collapsed onto a single location (drawn as a dot).
    pub fn is_dot(&self) -> bool {
        match self {
            Outline::Polyline(points) => points.first().is_some_and(|first| points.iter().all(|p| p == first)),
            _ => false,
        }
    }

    /// Vertices in drawing order.
    pub fn vertices(&self) -> Vec<Point> {
        match self {
            Outline::Polyline(points) => points.clone(),
            Outline::Rect { origin, corner } => vec![
                *origin,
                Point::new(corner.x, origin.y),
                *corner,
                Point::new(origin.x, corner.y),
            ],
            Outline::Triangle(points) => points.to_vec(),
        }
    }

    /// Path representation for rendering. Shapes are closed, polylines open;
    /// a single-point polyline becomes a zero-length segment.
    pub fn to_path(&self) -> BezPath {
        let mut path = BezPath::new();
        let vertices = self.vertices();
        let Some((first, rest)) = vertices.split_first() else {
            return path;
        };

        path.move_to(*first);
        match self {
            Outline::Polyline(_) => {
                if rest.is_empty() {
                    path.line_to(*first);
                }
                for point in rest {
                    path.line_to(*point);
                }
            }
            Outline::Rect { .. } | Outline::Triangle(_) => {
                for point in rest {
                    path.line_to(*point);
                }
                path.close_path();
            }
        }
        path
    }
}

/// Sign that keeps zero as zero.
fn sign(value: f64) -> f64 {
    if value > 0.0 {
        1.0
    } else if value < 0.0 {
        -1.0
    } else {
        0.0
    }
}

/// Force both extents to `max(|width|, |height|)`, keeping each original sign.
pub fn normalize_square(width: f64, height: f64) -> (f64, f64) {
    let size = width.abs().max(height.abs());
    (size * sign(width), size * sign(height))
}

/// Compute the rendered outline of a stroke payload.
pub fn outline_of(shape: &StrokeShape) -> Outline {
    match shape {
        StrokeShape::Freehand { points } => Outline::Polyline(points.clone()),
        StrokeShape::Rectangle { anchor, width, height } => rect_outline(*anchor, *width, *height),
        StrokeShape::Square { anchor, width, height } => {
            let (width, height) = normalize_square(*width, *height);
            rect_outline(*anchor, width, height)
        }
        StrokeShape::Triangle { anchor, width, height } => Outline::Triangle([
            Point::new(anchor.x + width / 2.0, anchor.y),
            Point::new(anchor.x + width, anchor.y + height),
            Point::new(anchor.x, anchor.y + height),
        ]),
    }
}

fn rect_outline(anchor: Point, width: f64, height: f64) -> Outline {
    Outline::Rect {
        origin: anchor,
        corner: Point::new(anchor.x + width, anchor.y + height),
    }
}
