//! Software raster renderer built on tiny-skia.

use crate::renderer::{RenderContext, RenderResult, Renderer, RendererError};
use kurbo::{BezPath, PathEl};
use sketchsync_core::stroke::Drawable;
use sketchsync_core::viewport::SurfaceSize;
use tiny_skia::{FillRule, LineCap, LineJoin, Paint, Path, PathBuilder, Pixmap, Stroke as LineStyle, Transform};

/// Result of rendering: straight (non-premultiplied) RGBA pixels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// RGBA pixel data (4 bytes per pixel).
    pub rgba_data: Vec<u8>,
    /// Image width in pixels.
    pub width: u32,
    /// Image height in pixels.
    pub height: u32,
}

impl Frame {
    /// RGBA of the pixel at `(x, y)`.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = ((y * self.width + x) * 4) as usize;
        self.rgba_data.get(i..i + 4).and_then(|px| px.try_into().ok())
    }
}

/// Renders the whole surface into an in-memory pixmap.
#[derive(Default)]
pub struct RasterRenderer {
    pixmap: Option<Pixmap>,
}

impl RasterRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Size of the last rendered frame.
    pub fn size(&self) -> Option<SurfaceSize> {
        self.pixmap
            .as_ref()
            .map(|pixmap| SurfaceSize::new(pixmap.width(), pixmap.height()))
    }

    /// Copy out the last rendered frame.
    pub fn frame(&self) -> Option<Frame> {
        let pixmap = self.pixmap.as_ref()?;
        let rgba_data = pixmap
            .pixels()
            .iter()
            .flat_map(|px| {
                let c = px.demultiply();
                [c.red(), c.green(), c.blue(), c.alpha()]
            })
            .collect();
        Some(Frame {
            rgba_data,
            width: pixmap.width(),
            height: pixmap.height(),
        })
    }

    /// Reuse the pixmap if the size is unchanged, otherwise allocate a new one.
    fn pixmap_for(&mut self, size: SurfaceSize) -> RenderResult<&mut Pixmap> {
        let reusable = self
            .pixmap
            .as_ref()
            .is_some_and(|pixmap| pixmap.width() == size.width && pixmap.height() == size.height);
        if !reusable {
            let pixmap = Pixmap::new(size.width, size.height).ok_or_else(|| {
                RendererError::Surface(format!("cannot allocate {}x{} surface", size.width, size.height))
            })?;
            self.pixmap = Some(pixmap);
        }
        self.pixmap
            .as_mut()
            .ok_or_else(|| RendererError::Surface("no surface".to_string()))
    }
}

impl Renderer for RasterRenderer {
    fn render(&mut self, ctx: &RenderContext) -> RenderResult<()> {
        if ctx.viewport_size.is_empty() {
            return Err(RendererError::Surface(format!(
                "empty surface {}x{}",
                ctx.viewport_size.width, ctx.viewport_size.height
            )));
        }

        let background = self.background_color(ctx).to_rgba8();
        let pixmap = self.pixmap_for(ctx.viewport_size)?;
        pixmap.fill(tiny_skia::Color::from_rgba8(
            background.r,
            background.g,
            background.b,
            background.a,
        ));

        for stroke in ctx.committed {
            paint_stroke(pixmap, stroke);
        }
        if let Some(draft) = ctx.in_progress {
            paint_stroke(pixmap, draft);
        }
        Ok(())
    }
}

fn paint_stroke(pixmap: &mut Pixmap, item: &dyn Drawable) {
    let outline = item.outline();
    if outline.is_degenerate() {
        return;
    }

    let color = item.color();
    let mut paint = Paint::default();
    paint.set_color_rgba8(color.r, color.g, color.b, color.a);
    paint.anti_alias = true;
    let width = item.thickness() as f32;

    if outline.is_dot() {
        let Some(center) = outline.vertices().first().copied() else {
            return;
        };
        if let Some(dot) = PathBuilder::from_circle(center.x as f32, center.y as f32, width / 2.0) {
            pixmap.fill_path(&dot, &paint, FillRule::Winding, Transform::identity(), None);
        }
        return;
    }

    let Some(path) = to_skia_path(&outline.to_path()) else {
        return;
    };
    let style = LineStyle {
        width,
        line_cap: LineCap::Round,
        line_join: LineJoin::Round,
        ..LineStyle::default()
    };
    pixmap.stroke_path(&path, &paint, &style, Transform::identity(), None);
}

fn to_skia_path(path: &BezPath) -> Option<Path> {
    let mut builder = PathBuilder::new();
    for el in path.elements() {
        match *el {
            PathEl::MoveTo(p) => builder.move_to(p.x as f32, p.y as f32),
            PathEl::LineTo(p) => builder.line_to(p.x as f32, p.y as f32),
            PathEl::QuadTo(c, p) => builder.quad_to(c.x as f32, c.y as f32, p.x as f32, p.y as f32),
            PathEl::CurveTo(c1, c2, p) => builder.cubic_to(
                c1.x as f32,
                c1.y as f32,
                c2.x as f32,
                c2.y as f32,
                p.x as f32,
                p.y as f32,
            ),
            PathEl::ClosePath => builder.close(),
        }
    }
    builder.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use kurbo::Point;
    use peniko::Color;
    use sketchsync_core::identity::Identity;
    use sketchsync_core::stroke::{Draft, SerializableColor, Stroke, StrokeShape};
    use uuid::Uuid;

    const RED: SerializableColor = SerializableColor::rgb(255, 0, 0);
    const BLUE: SerializableColor = SerializableColor::rgb(0, 0, 255);

    fn line(from: Point, to: Point, color: SerializableColor) -> Draft {
        Draft {
            shape: StrokeShape::Freehand { points: vec![from, to] },
            color,
            thickness: 10.0,
        }
    }

    fn commit(order: u64, draft: Draft) -> Stroke {
        Stroke::new(Uuid::new_v4(), order, draft.into_record(&Identity::new("u", "U")))
    }

    fn render(ctx: &RenderContext) -> Frame {
        let mut renderer = RasterRenderer::new();
        renderer.render(ctx).unwrap();
        renderer.frame().unwrap()
    }

    fn rgba(color: SerializableColor) -> [u8; 4] {
        [color.r, color.g, color.b, color.a]
    }

    #[test]
    fn test_background_fill() {
        let ctx = RenderContext::new(&[], SurfaceSize::new(16, 8)).with_background(Color::from_rgba8(0x1f, 0x29, 0x37, 255));
        let frame = render(&ctx);
        assert_eq!(frame.width, 16);
        assert_eq!(frame.height, 8);
        assert!(frame.rgba_data.chunks(4).all(|px| px == [0x1f, 0x29, 0x37, 255]));
    }

    #[test]
    fn test_render_idempotent() {
        let strokes = vec![
            commit(1, line(Point::new(5.0, 5.0), Point::new(60.0, 30.0), RED)),
            commit(2, line(Point::new(5.0, 30.0), Point::new(60.0, 5.0), BLUE)),
        ];
        let draft = line(Point::new(0.0, 0.0), Point::new(40.0, 40.0), SerializableColor::black());
        let ctx = RenderContext::new(&strokes, SurfaceSize::new(64, 40)).with_draft(Some(&draft));

        let mut renderer = RasterRenderer::new();
        renderer.render(&ctx).unwrap();
        let first = renderer.frame().unwrap();
        renderer.render(&ctx).unwrap();
        assert_eq!(renderer.frame().unwrap(), first);
        assert_eq!(render(&ctx), first);
    }

    #[test]
    fn test_later_order_paints_on_top() {
        let strokes = vec![
            commit(1, line(Point::new(10.0, 20.0), Point::new(90.0, 20.0), RED)),
            commit(2, line(Point::new(50.0, 0.0), Point::new(50.0, 40.0), BLUE)),
        ];
        let frame = render(&RenderContext::new(&strokes, SurfaceSize::new(100, 40)));
        assert_eq!(frame.pixel(50, 20), Some(rgba(BLUE)));
        assert_eq!(frame.pixel(20, 20), Some(rgba(RED)));
        assert_eq!(frame.pixel(20, 35), Some(rgba(SerializableColor::white())));
    }

    #[test]
    fn test_draft_paints_above_committed() {
        let strokes = vec![commit(1, line(Point::new(10.0, 20.0), Point::new(90.0, 20.0), RED))];
        let draft = line(Point::new(50.0, 0.0), Point::new(50.0, 40.0), BLUE);
        let frame = render(&RenderContext::new(&strokes, SurfaceSize::new(100, 40)).with_draft(Some(&draft)));
        assert_eq!(frame.pixel(50, 20), Some(rgba(BLUE)));
    }

    #[test]
    fn test_eraser_covers_prior_strokes() {
        let background = SerializableColor::white();
        let strokes = vec![
            commit(1, line(Point::new(10.0, 20.0), Point::new(90.0, 20.0), SerializableColor::black())),
            commit(2, line(Point::new(10.0, 20.0), Point::new(90.0, 20.0), background)),
        ];
        let frame = render(&RenderContext::new(&strokes, SurfaceSize::new(100, 40)));
        assert_eq!(frame.pixel(50, 20), Some(rgba(background)));
    }

    #[test]
    fn test_single_point_is_round_dot() {
        let dot = Draft::freehand(Point::new(20.0, 20.0), BLUE, 10.0);
        let frame = render(&RenderContext::new(&[], SurfaceSize::new(40, 40)).with_draft(Some(&dot)));
        assert_eq!(frame.pixel(20, 20), Some(rgba(BLUE)));
        assert_eq!(frame.pixel(32, 32), Some(rgba(SerializableColor::white())));
    }

    #[test]
    fn test_degenerate_shape_is_invisible() {
        let empty = render(&RenderContext::new(&[], SurfaceSize::new(20, 20)));
        let flat = Draft {
            shape: StrokeShape::Square {
                anchor: Point::new(10.0, 10.0),
                width: 0.0,
                height: 0.0,
            },
            color: RED,
            thickness: 4.0,
        };
        let strokes = vec![commit(1, flat)];
        assert_eq!(render(&RenderContext::new(&strokes, SurfaceSize::new(20, 20))), empty);
    }

    #[test]
    fn test_rectangle_outline_not_filled() {
        let rect = Draft {
            shape: StrokeShape::Rectangle {
                anchor: Point::new(10.0, 10.0),
                width: 60.0,
                height: 40.0,
            },
            color: RED,
            thickness: 4.0,
        };
        let frame = render(&RenderContext::new(&[], SurfaceSize::new(80, 60)).with_draft(Some(&rect)));
        assert_eq!(frame.pixel(40, 10), Some(rgba(RED)));
        assert_eq!(frame.pixel(40, 30), Some(rgba(SerializableColor::white())));
    }

    #[test]
    fn test_resize_keeps_content() {
        let strokes = vec![commit(1, line(Point::new(10.0, 20.0), Point::new(90.0, 20.0), RED))];
        let mut renderer = RasterRenderer::new();
        renderer.render(&RenderContext::new(&strokes, SurfaceSize::new(100, 40))).unwrap();
        renderer.render(&RenderContext::new(&strokes, SurfaceSize::new(200, 40))).unwrap();

        assert_eq!(renderer.size(), Some(SurfaceSize::new(200, 40)));
        let frame = renderer.frame().unwrap();
        assert_eq!(frame.width, 200);
        assert_eq!(frame.pixel(50, 20), Some(rgba(RED)));
    }

    #[test]
    fn test_empty_surface_is_an_error() {
        let mut renderer = RasterRenderer::new();
        let result = renderer.render(&RenderContext::new(&[], SurfaceSize::new(0, 400)));
        assert!(matches!(result, Err(RendererError::Surface(_))));
        assert!(renderer.frame().is_none());
    }
}
