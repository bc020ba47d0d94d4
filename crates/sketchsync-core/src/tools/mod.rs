//! Drawing tools and the pointer capture state machine.

use crate::geometry::normalize_square;
use crate::stroke::{Draft, SerializableColor, StrokeShape};
use kurbo::Point;
use serde::{Deserialize, Serialize};

/// Available drawing tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    #[default]
    Freehand,
    Rectangle,
    Square,
    Triangle,
    Eraser,
}

impl ToolKind {
    /// Whether this tool records a point sequence rather than an extent.
    pub fn is_freehand(self) -> bool {
        matches!(self, ToolKind::Freehand | ToolKind::Eraser)
    }

    /// Whether the color picker applies to this tool.
    pub fn uses_color(self) -> bool {
        self != ToolKind::Eraser
    }

    pub fn name(self) -> &'static str {
        match self {
            ToolKind::Freehand => "freehand",
            ToolKind::Rectangle => "rectangle",
            ToolKind::Square => "square",
            ToolKind::Triangle => "triangle",
            ToolKind::Eraser => "eraser",
        }
    }
}

/// Stroke widths per tool.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ToolSettings {
    /// Width for pencil and shape strokes.
    pub pencil_thickness: f64,
    /// Width for eraser strokes.
    pub eraser_thickness: f64,
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            pencil_thickness: 4.0,
            eraser_thickness: 10.0,
        }
    }
}

/// State of the capture machine.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum CaptureState {
    /// No gesture in progress.
    #[default]
    Idle,
    /// A gesture is active; the draft is updated in place.
    Drawing { draft: Draft },
}

/// Turns pointer gestures into stroke drafts.
///
/// Its methods are the only way the in-progress draft changes. Tool and color
/// changes are refused while a gesture is active.
#[derive(Debug, Clone)]
pub struct CaptureMachine {
    tool: ToolKind,
    color: SerializableColor,
    settings: ToolSettings,
    state: CaptureState,
}

impl CaptureMachine {
    pub fn new(settings: ToolSettings, color: SerializableColor) -> Self {
        Self {
            tool: ToolKind::default(),
            color,
            settings,
            state: CaptureState::Idle,
        }
    }

    pub fn tool(&self) -> ToolKind {
        self.tool
    }

    pub fn color(&self) -> SerializableColor {
        self.color
    }

    pub fn settings(&self) -> ToolSettings {
        self.settings
    }

    pub fn state(&self) -> &CaptureState {
        &self.state
    }

    /// Select a tool. Returns false (and changes nothing) mid-gesture.
    pub fn set_tool(&mut self, tool: ToolKind) -> bool {
        if self.is_active() {
            log::debug!("Ignoring tool change to {} while drawing", tool.name());
            return false;
        }
        self.tool = tool;
        true
    }

    /// Select the ink color. Returns false (and changes nothing) mid-gesture.
    pub fn set_color(&mut self, color: SerializableColor) -> bool {
        if self.is_active() {
            log::debug!("Ignoring color change to {} while drawing", color.to_hex());
            return false;
        }
        self.color = color;
        true
    }

    /// Pointer down: start a draft at `point`.
    ///
    /// `background` is the live surface color, used as the eraser's ink.
    /// Returns false if a gesture is already active.
    pub fn begin(&mut self, point: Point, background: SerializableColor) -> bool {
        if self.is_active() {
            return false;
        }

        let draft = match self.tool {
            ToolKind::Freehand => Draft::freehand(point, self.color, self.settings.pencil_thickness),
            ToolKind::Eraser => Draft::freehand(point, background, self.settings.eraser_thickness),
            ToolKind::Rectangle => self.shape_draft(StrokeShape::Rectangle {
                anchor: point,
                width: 0.0,
                height: 0.0,
            }),
            ToolKind::Square => self.shape_draft(StrokeShape::Square {
                anchor: point,
                width: 0.0,
                height: 0.0,
            }),
            ToolKind::Triangle => self.shape_draft(StrokeShape::Triangle {
                anchor: point,
                width: 0.0,
                height: 0.0,
            }),
        };

        self.state = CaptureState::Drawing { draft };
        true
    }

    fn shape_draft(&self, shape: StrokeShape) -> Draft {
        Draft {
            shape,
            color: self.color,
            thickness: self.settings.pencil_thickness,
        }
    }

    /// Pointer move: extend the draft. Returns false when idle.
    pub fn update(&mut self, point: Point) -> bool {
        let CaptureState::Drawing { draft } = &mut self.state else {
            return false;
        };

        match &mut draft.shape {
            StrokeShape::Freehand { points } => points.push(point),
            StrokeShape::Rectangle { anchor, width, height }
            | StrokeShape::Triangle { anchor, width, height } => {
                *width = point.x - anchor.x;
                *height = point.y - anchor.y;
            }
            StrokeShape::Square { anchor, width, height } => {
                (*width, *height) = normalize_square(point.x - anchor.x, point.y - anchor.y);
            }
        }
        true
    }

    /// Pointer up or leave: finish the gesture and hand out the draft.
    ///
    /// The machine is idle afterwards whatever happens to the draft.
    pub fn end(&mut self) -> Option<Draft> {
        match std::mem::take(&mut self.state) {
            CaptureState::Drawing { draft } => Some(draft),
            CaptureState::Idle => None,
        }
    }

    /// Abandon the current gesture without producing a draft.
    pub fn cancel(&mut self) {
        self.state = CaptureState::Idle;
    }

    /// Check if a gesture is active.
    pub fn is_active(&self) -> bool {
        matches!(self.state, CaptureState::Drawing { .. })
    }

    /// The in-progress draft, for live preview.
    pub fn draft(&self) -> Option<&Draft> {
        match &self.state {
            CaptureState::Drawing { draft } => Some(draft),
            CaptureState::Idle => None,
        }
    }
}
