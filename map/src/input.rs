//! Pointer-driven tool state machine.
//!
//! DESIGN
//! ======
//! One gesture is tracked between pointer-down and pointer-up. Pointer-down
//! selects the gesture by fixed priority: pan (secondary/middle button, shift,
//! or the held pan-lock) beats everything, then armed measurement, then the
//! background tool, then the drawing tools, then token hit-testing. Each
//! pointer-move updates only the active gesture; pointer-up commits whatever
//! the gesture accumulated (preview shape, measurement) and returns to idle.
//!
//! The machine mutates [`SceneDoc`] and [`UiState`] directly and reports what
//! changed through [`InputEffect`] values so the caller can mark dirty state
//! and notify collaborators without this module knowing about them.

#[cfg(test)]
#[path = "input_test.rs"]
mod input_test;

use crate::camera::{world_to_cell, Point, Viewport};
use crate::consts::PATH_MIN_SEGMENT_SQ;
use crate::scene::{snap_half, PreviewShape, SceneDoc, ShapeGeom, TokenId};

/// Which tool is currently active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Tool {
    /// Select and drag tokens (default).
    #[default]
    Tokens,
    /// Reposition the background image.
    Background,
    /// Draw a rectangle annotation.
    Rect,
    /// Draw a circle annotation.
    Circle,
    /// Draw a freehand path annotation.
    Freehand,
}

impl Tool {
    /// Whether this tool creates an annotation shape.
    #[must_use]
    pub fn is_drawing(self) -> bool {
        matches!(self, Self::Rect | Self::Circle | Self::Freehand)
    }
}

/// Mouse button identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Button {
    Primary,
    Middle,
    Secondary,
}

/// Transient, never-persisted UI state.
#[derive(Debug, Clone)]
pub struct UiState {
    /// Currently active tool.
    pub tool: Tool,
    /// Measurement mode is armed; the next drag measures instead of editing.
    pub measure_mode: bool,
    /// Snap drawing positions to whole cells.
    pub snap_to_grid: bool,
    /// Held pan-lock (space key); forces the pan gesture.
    pub pan_lock: bool,
    /// Stroke color for new annotations.
    pub draw_color: String,
    /// Stroke width for new annotations, in world pixels.
    pub draw_width: f64,
    /// Fill new rect/circle annotations with the stroke color.
    pub fill_shapes: bool,
    /// Cell currently under the pointer, for the hover readout.
    pub hover_cell: Option<Point>,
    /// Active measurement endpoints, in cell coordinates.
    pub measure_start: Option<Point>,
    pub measure_end: Option<Point>,
    /// In-progress annotation, rendered dashed until committed.
    pub preview: Option<PreviewShape>,
}

impl Default for UiState {
    fn default() -> Self {
        Self {
            tool: Tool::default(),
            measure_mode: false,
            snap_to_grid: true,
            pan_lock: false,
            draw_color: "#22c55e".to_string(),
            draw_width: 3.0,
            fill_shapes: false,
            hover_cell: None,
            measure_start: None,
            measure_end: None,
            preview: None,
        }
    }
}

/// The active gesture between pointer-down and pointer-up.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Gesture {
    /// No gesture in progress.
    #[default]
    Idle,
    /// Dragging the camera.
    Pan,
    /// Dragging out a measurement line.
    Measure,
    /// Dragging a token across the grid.
    DragToken { id: TokenId },
    /// Dragging the background image; `grab_offset` is the pointer's
    /// world-space offset from the image's top-left corner.
    DragBackground { grab_offset: Point },
    /// Sizing a rectangle from its anchor corner.
    DrawRect { start: Point },
    /// Sizing a circle around its fixed center.
    DrawCircle { center: Point },
    /// Appending freehand path points.
    DrawPath,
}

/// What a pointer transition changed, for the caller's bookkeeping.
#[derive(Debug, Clone, PartialEq)]
pub enum InputEffect {
    /// Selection changed; `None` means cleared.
    TokenSelected(Option<TokenId>),
    /// A token moved to a new (snapped) cell position.
    TokenMoved { id: TokenId, cell_x: f64, cell_y: f64 },
    /// The persisted document changed.
    SceneChanged,
    /// Only transient overlay state changed (hover, measure, preview).
    OverlayChanged,
}

/// Topmost token whose half-extent contains `cell` in both axes. Later
/// insertions win ties.
#[must_use]
pub fn pick_token_at(doc: &SceneDoc, cell: Point) -> Option<TokenId> {
    doc.tokens.iter().rev().find_map(|t| {
        let half = t.size / 2.0;
        ((cell.x - t.cell_x).abs() <= half && (cell.y - t.cell_y).abs() <= half).then_some(t.id)
    })
}

/// Snap a world position to the whole-cell lattice when grid snap is on.
fn snap_world(ui: &UiState, cell_size: f64, world: Point) -> Point {
    if !ui.snap_to_grid {
        return world;
    }
    Point::new(
        (world.x / cell_size).round() * cell_size,
        (world.y / cell_size).round() * cell_size,
    )
}

/// Begin a gesture. `screen` is in device pixels; `shift` reflects the
/// modifier at the time of the event.
pub fn pointer_down(
    doc: &mut SceneDoc,
    ui: &mut UiState,
    vp: &Viewport,
    screen: Point,
    button: Button,
    shift: bool,
) -> (Gesture, Vec<InputEffect>) {
    let raw_world = doc.camera.screen_to_world(vp, screen);
    let world = snap_world(ui, doc.grid.cell_size, raw_world);
    let cell = world_to_cell(world, doc.grid.cell_size);

    // Pan always wins, regardless of the active tool.
    let wants_pan =
        matches!(button, Button::Secondary | Button::Middle) || shift || ui.pan_lock;
    if wants_pan {
        return (Gesture::Pan, Vec::new());
    }

    if ui.measure_mode {
        ui.measure_start = Some(cell);
        ui.measure_end = Some(cell);
        return (Gesture::Measure, vec![InputEffect::OverlayChanged]);
    }

    if ui.tool == Tool::Background {
        let Some(bg) = doc.background.as_ref() else {
            return (Gesture::Idle, Vec::new());
        };
        let grab_offset = Point::new(world.x - bg.x, world.y - bg.y);
        return (Gesture::DragBackground { grab_offset }, Vec::new());
    }

    if ui.tool.is_drawing() {
        let fill = ui.fill_shapes.then(|| ui.draw_color.clone());
        let (gesture, geom) = match ui.tool {
            Tool::Rect => (
                Gesture::DrawRect { start: world },
                ShapeGeom::Rect { x: world.x, y: world.y, w: 0.0, h: 0.0 },
            ),
            Tool::Circle => (
                Gesture::DrawCircle { center: world },
                ShapeGeom::Circle { cx: world.x, cy: world.y, r: 0.0 },
            ),
            _ => (Gesture::DrawPath, ShapeGeom::Path { points: vec![world] }),
        };
        ui.preview = Some(PreviewShape {
            geom,
            stroke: ui.draw_color.clone(),
            stroke_width: ui.draw_width,
            fill,
        });
        return (gesture, vec![InputEffect::OverlayChanged]);
    }

    // Token mode.
    if let Some(id) = pick_token_at(doc, cell) {
        doc.selected_token = Some(id);
        (Gesture::DragToken { id }, vec![InputEffect::TokenSelected(Some(id))])
    } else {
        doc.selected_token = None;
        (Gesture::Idle, vec![InputEffect::TokenSelected(None)])
    }
}

/// Advance the active gesture. `movement_x`/`movement_y` are the pointer
/// movement deltas in host (CSS) pixels; `screen` is the absolute position in
/// device pixels.
pub fn pointer_move(
    doc: &mut SceneDoc,
    ui: &mut UiState,
    gesture: &Gesture,
    vp: &Viewport,
    screen: Point,
    movement_x: f64,
    movement_y: f64,
) -> Vec<InputEffect> {
    let world = doc.camera.screen_to_world(vp, screen);
    let mut effects = Vec::new();

    let hover = world_to_cell(world, doc.grid.cell_size);
    if ui.hover_cell != Some(hover) {
        ui.hover_cell = Some(hover);
        effects.push(InputEffect::OverlayChanged);
    }

    match gesture {
        Gesture::Idle => {}
        Gesture::Pan => {
            doc.camera.pan_by(vp, movement_x, movement_y);
            effects.push(InputEffect::SceneChanged);
        }
        Gesture::Measure => {
            let snapped = snap_world(ui, doc.grid.cell_size, world);
            ui.measure_end = Some(world_to_cell(snapped, doc.grid.cell_size));
            effects.push(InputEffect::OverlayChanged);
        }
        Gesture::DragToken { id } => {
            let cell = world_to_cell(world, doc.grid.cell_size);
            if doc.set_token_position(*id, cell.x, cell.y) {
                effects.push(InputEffect::TokenMoved {
                    id: *id,
                    cell_x: snap_half(cell.x),
                    cell_y: snap_half(cell.y),
                });
                effects.push(InputEffect::SceneChanged);
            }
        }
        Gesture::DragBackground { grab_offset } => {
            if let Some(bg) = doc.background.as_mut() {
                bg.x = world.x - grab_offset.x;
                bg.y = world.y - grab_offset.y;
                effects.push(InputEffect::SceneChanged);
            }
        }
        Gesture::DrawRect { start } => {
            let snapped = snap_world(ui, doc.grid.cell_size, world);
            if let Some(PreviewShape { geom: ShapeGeom::Rect { w, h, .. }, .. }) = &mut ui.preview
            {
                *w = snapped.x - start.x;
                *h = snapped.y - start.y;
                effects.push(InputEffect::OverlayChanged);
            }
        }
        Gesture::DrawCircle { center } => {
            let snapped = snap_world(ui, doc.grid.cell_size, world);
            if let Some(PreviewShape { geom: ShapeGeom::Circle { r, .. }, .. }) = &mut ui.preview {
                let dx = snapped.x - center.x;
                let dy = snapped.y - center.y;
                *r = (dx * dx + dy * dy).sqrt();
                effects.push(InputEffect::OverlayChanged);
            }
        }
        Gesture::DrawPath => {
            let snapped = snap_world(ui, doc.grid.cell_size, world);
            if let Some(PreviewShape { geom: ShapeGeom::Path { points }, .. }) = &mut ui.preview {
                if let Some(last) = points.last() {
                    let dx = snapped.x - last.x;
                    let dy = snapped.y - last.y;
                    if dx * dx + dy * dy > PATH_MIN_SEGMENT_SQ {
                        points.push(snapped);
                        effects.push(InputEffect::OverlayChanged);
                    }
                }
            }
        }
    }

    effects
}

/// End the active gesture, committing whatever it accumulated. Also used for
/// pointer-cancel.
pub fn pointer_up(doc: &mut SceneDoc, ui: &mut UiState, gesture: &Gesture) -> Vec<InputEffect> {
    let mut effects = Vec::new();

    if matches!(
        gesture,
        Gesture::DrawRect { .. } | Gesture::DrawCircle { .. } | Gesture::DrawPath
    ) {
        if let Some(preview) = ui.preview.take() {
            if let Some(committed) = normalize_preview(preview) {
                doc.add_shape(committed);
                effects.push(InputEffect::SceneChanged);
            }
            effects.push(InputEffect::OverlayChanged);
        }
    }

    // Measurement endpoints stay visible after release; they clear when
    // measurement mode is disarmed.
    effects
}

/// Normalize a finished preview for commit: rectangles get non-negative
/// extents regardless of drag direction, degenerate paths are discarded.
fn normalize_preview(mut preview: PreviewShape) -> Option<PreviewShape> {
    match &mut preview.geom {
        ShapeGeom::Rect { x, y, w, h } => {
            if *w < 0.0 {
                *x += *w;
                *w = -*w;
            }
            if *h < 0.0 {
                *y += *h;
                *h = -*h;
            }
        }
        ShapeGeom::Circle { .. } => {}
        ShapeGeom::Path { points } => {
            if points.len() < 2 {
                return None;
            }
        }
    }
    Some(preview)
}
