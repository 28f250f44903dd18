//! Render pipeline: turns document + transient state + overlays into a
//! display list.
//!
//! The engine is headless, so instead of touching a 2D context this module
//! emits [`DrawCmd`] values in paint order; hosts rasterize them. Commands
//! tagged [`Space::World`] are drawn under the camera transform (translate to
//! the viewport center, scale by zoom, translate by `-camera`), commands
//! tagged [`Space::Screen`] in raw device pixels. World-space stroke widths
//! are pre-divided by zoom so lines keep a constant on-screen thickness.
//!
//! Paint order: clear, background, grid, committed shapes, dashed preview,
//! tokens, ping overlay, measurement overlay.

#[cfg(test)]
#[path = "render_test.rs"]
mod render_test;

use serde::{Deserialize, Serialize};

use crate::camera::{cell_to_world, Point, Viewport};
use crate::censor::rolling_label;
use crate::consts::{PING_DURATION_MS, PING_PULSE_MS, PREVIEW_FILL_OPACITY};
use crate::distance::measure_label;
use crate::input::UiState;
use crate::scene::{SceneDoc, Shape, ShapeGeom, Token};

/// Coordinate space a draw command is expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Space {
    /// Under the camera transform.
    World,
    /// Raw device pixels, unaffected by the camera.
    Screen,
}

/// Who is looking at the map. Viewers never see HP, hidden tokens, or
/// uncensored hidden names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewRole {
    Operator,
    Viewer,
}

/// An ephemeral ping marker, injected by the replication layer. Never part of
/// the document; it expires by age.
#[derive(Debug, Clone, PartialEq)]
pub struct Ping {
    /// Ping location in cell coordinates.
    pub cell: Point,
    /// Epoch milliseconds at which the ping was raised.
    pub ts: i64,
    /// Short origin label shown on the off-screen bubble.
    pub label: String,
    /// CSS color; an empty string falls back to the role color.
    pub color: String,
    /// Role of the ping's originator; operators get the heavier marker.
    pub kind: ViewRole,
}

/// Transient overlays supplied per frame by the host.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Overlays {
    pub ping: Option<Ping>,
}

/// One paint-ordered drawing command. Serializes with an `op` tag so hosts
/// on the far side of a serialization boundary can rasterize frames.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum DrawCmd {
    /// Clear the whole surface.
    Clear,
    /// Draw a bitmap; `source` is an inline payload or URL.
    Image { source: String, x: f64, y: f64, w: f64, h: f64, opacity: f64 },
    Line {
        space: Space,
        from: Point,
        to: Point,
        stroke: String,
        width: f64,
        dash: Option<[f64; 2]>,
    },
    Rect {
        space: Space,
        x: f64,
        y: f64,
        w: f64,
        h: f64,
        stroke: Option<String>,
        stroke_width: f64,
        fill: Option<String>,
        fill_opacity: f64,
        dash: Option<[f64; 2]>,
    },
    Circle {
        space: Space,
        cx: f64,
        cy: f64,
        r: f64,
        stroke: Option<String>,
        stroke_width: f64,
        fill: Option<String>,
        fill_opacity: f64,
        dash: Option<[f64; 2]>,
    },
    Path {
        space: Space,
        points: Vec<Point>,
        stroke: String,
        width: f64,
        dash: Option<[f64; 2]>,
    },
    Polygon { space: Space, points: Vec<Point>, fill: String },
    Text { space: Space, x: f64, y: f64, text: String, size: f64, color: String },
    /// Text on a rounded backing pill.
    Label { space: Space, x: f64, y: f64, text: String, fg: String, bg: String },
    /// Composite drawn at a shared opacity (ping fade).
    Group { opacity: f64, cmds: Vec<DrawCmd> },
}

/// Selection ring and operator accent color.
const ACCENT: &str = "rgba(245,158,11,0.95)";
/// Measurement overlay color.
const MEASURE_COLOR: &str = "rgba(34,197,94,0.95)";
/// Fallback ping colors per role.
const PING_OPERATOR_FALLBACK: &str = "#ef4444";
const PING_VIEWER_FALLBACK: &str = "#f59e0b";
/// Off-screen bubble inset from the surface edge, in device pixels.
const EDGE_BUBBLE_MARGIN: f64 = 18.0;

/// Emit the full scene in paint order.
#[must_use]
pub fn draw(
    doc: &SceneDoc,
    ui: &UiState,
    overlays: &Overlays,
    view: ViewRole,
    vp: &Viewport,
    now_ms: i64,
) -> Vec<DrawCmd> {
    let zoom = doc.camera.zoom;
    let mut out = vec![DrawCmd::Clear];

    // ====== BACKGROUND ======
    if let Some(bg) = &doc.background {
        if let Some(source) = bg.data.clone().or_else(|| bg.url.clone()) {
            out.push(DrawCmd::Image {
                source,
                x: bg.x,
                y: bg.y,
                w: bg.w,
                h: bg.h,
                opacity: bg.opacity.clamp(0.0, 1.0),
            });
        }
    }

    // ====== GRID ======
    if doc.grid.show {
        push_grid(&mut out, doc, vp);
    }

    // ====== SHAPES ======
    for shape in &doc.shapes {
        push_shape(&mut out, shape, zoom);
    }
    if let Some(preview) = &ui.preview {
        push_preview(&mut out, preview, zoom);
    }

    // ====== TOKENS ======
    for token in &doc.tokens {
        if view == ViewRole::Viewer && token.hidden_from_viewers {
            continue;
        }
        push_token(&mut out, doc, token, view, now_ms);
    }

    // ====== PING ======
    if let Some(ping) = &overlays.ping {
        push_ping(&mut out, doc, ping, vp, now_ms);
    }

    // ====== MEASURE ======
    if ui.measure_mode {
        if let (Some(a), Some(b)) = (ui.measure_start, ui.measure_end) {
            push_measure(&mut out, doc, vp, a, b);
        }
    }

    out
}

/// Whether any time-based overlay is animating at `now_ms`. While this holds,
/// the frame planner keeps forcing redraws; it schedules one more clearing
/// frame after the last overlay expires.
#[must_use]
pub fn needs_animation(doc: &SceneDoc, overlays: &Overlays, view: ViewRole, now_ms: i64) -> bool {
    if let Some(ping) = &overlays.ping {
        if now_ms - ping.ts <= PING_DURATION_MS {
            return true;
        }
    }
    // The rolling censor code re-draws every tick for as long as any visible
    // token name is censored.
    view == ViewRole::Viewer
        && doc
            .tokens
            .iter()
            .any(|t| !t.hidden_from_viewers && name_is_censored(doc, t))
}

fn name_is_censored(doc: &SceneDoc, token: &Token) -> bool {
    doc.player_view.hide_all_token_names || token.name_hidden_from_viewers
}

// =============================================================
// Layers
// =============================================================

fn push_grid(out: &mut Vec<DrawCmd>, doc: &SceneDoc, vp: &Viewport) {
    let zoom = doc.camera.zoom;
    let cell = doc.grid.cell_size;
    let (left, top, right, bottom) = doc.camera.visible_world_bounds(vp);

    let start_x = (left / cell).floor() * cell;
    let end_x = (right / cell).ceil() * cell;
    let start_y = (top / cell).floor() * cell;
    let end_y = (bottom / cell).ceil() * cell;

    let mut lines = |step: f64, stroke: &str, width: f64| {
        let sx = (start_x / step).floor() * step;
        let sy = (start_y / step).floor() * step;
        let mut x = sx;
        while x <= end_x {
            out.push(DrawCmd::Line {
                space: Space::World,
                from: Point::new(x, start_y),
                to: Point::new(x, end_y),
                stroke: stroke.to_string(),
                width,
                dash: None,
            });
            x += step;
        }
        let mut y = sy;
        while y <= end_y {
            out.push(DrawCmd::Line {
                space: Space::World,
                from: Point::new(start_x, y),
                to: Point::new(end_x, y),
                stroke: stroke.to_string(),
                width,
                dash: None,
            });
            y += step;
        }
    };

    lines(cell, "rgba(0,0,0,0.12)", 1.0 / zoom);
    lines(cell * 5.0, "rgba(0,0,0,0.20)", 1.5 / zoom);

    // Accent axes through the world origin.
    out.push(DrawCmd::Line {
        space: Space::World,
        from: Point::new(0.0, start_y),
        to: Point::new(0.0, end_y),
        stroke: "rgba(245,158,11,0.32)".to_string(),
        width: 2.0 / zoom,
        dash: None,
    });
    out.push(DrawCmd::Line {
        space: Space::World,
        from: Point::new(start_x, 0.0),
        to: Point::new(end_x, 0.0),
        stroke: "rgba(245,158,11,0.32)".to_string(),
        width: 2.0 / zoom,
        dash: None,
    });
}

fn push_shape(out: &mut Vec<DrawCmd>, shape: &Shape, zoom: f64) {
    let width = shape.stroke_width.max(1.0) / zoom;
    match &shape.geom {
        ShapeGeom::Rect { x, y, w, h } => out.push(DrawCmd::Rect {
            space: Space::World,
            x: x.min(x + w),
            y: y.min(y + h),
            w: w.abs(),
            h: h.abs(),
            stroke: Some(shape.stroke.clone()),
            stroke_width: width,
            fill: shape.fill.clone(),
            fill_opacity: shape.fill_opacity,
            dash: None,
        }),
        ShapeGeom::Circle { cx, cy, r } => out.push(DrawCmd::Circle {
            space: Space::World,
            cx: *cx,
            cy: *cy,
            r: r.max(0.0),
            stroke: Some(shape.stroke.clone()),
            stroke_width: width,
            fill: shape.fill.clone(),
            fill_opacity: shape.fill_opacity,
            dash: None,
        }),
        ShapeGeom::Path { points } => {
            if points.len() >= 2 {
                out.push(DrawCmd::Path {
                    space: Space::World,
                    points: points.clone(),
                    stroke: shape.stroke.clone(),
                    width,
                    dash: None,
                });
            }
        }
    }
}

fn push_preview(out: &mut Vec<DrawCmd>, preview: &crate::scene::PreviewShape, zoom: f64) {
    let width = preview.stroke_width.max(1.0) / zoom;
    let dash = Some([10.0 / zoom, 8.0 / zoom]);
    match &preview.geom {
        ShapeGeom::Rect { x, y, w, h } => out.push(DrawCmd::Rect {
            space: Space::World,
            x: x.min(x + w),
            y: y.min(y + h),
            w: w.abs(),
            h: h.abs(),
            stroke: Some(preview.stroke.clone()),
            stroke_width: width,
            fill: preview.fill.clone(),
            fill_opacity: PREVIEW_FILL_OPACITY,
            dash,
        }),
        ShapeGeom::Circle { cx, cy, r } => out.push(DrawCmd::Circle {
            space: Space::World,
            cx: *cx,
            cy: *cy,
            r: r.max(0.0),
            stroke: Some(preview.stroke.clone()),
            stroke_width: width,
            fill: preview.fill.clone(),
            fill_opacity: PREVIEW_FILL_OPACITY,
            dash,
        }),
        ShapeGeom::Path { points } => {
            if points.len() >= 2 {
                out.push(DrawCmd::Path {
                    space: Space::World,
                    points: points.clone(),
                    stroke: preview.stroke.clone(),
                    width,
                    dash,
                });
            }
        }
    }
}

fn push_token(out: &mut Vec<DrawCmd>, doc: &SceneDoc, token: &Token, view: ViewRole, now_ms: i64) {
    let zoom = doc.camera.zoom;
    let cell = doc.grid.cell_size;
    let center = cell_to_world(Point::new(token.cell_x, token.cell_y), cell);
    let r = token.size * cell / 2.0;

    // Drop shadow.
    out.push(DrawCmd::Circle {
        space: Space::World,
        cx: center.x + 4.0,
        cy: center.y + 4.0,
        r,
        stroke: None,
        stroke_width: 0.0,
        fill: Some("rgba(0,0,0,0.22)".to_string()),
        fill_opacity: 1.0,
        dash: None,
    });

    let selected = doc.selected_token == Some(token.id);
    out.push(DrawCmd::Circle {
        space: Space::World,
        cx: center.x,
        cy: center.y,
        r,
        stroke: Some(if selected { ACCENT.to_string() } else { "rgba(0,0,0,0.25)".to_string() }),
        stroke_width: (if selected { 3.0 } else { 1.5 }) / zoom,
        fill: Some(token.color.clone()),
        fill_opacity: 1.0,
        dash: None,
    });

    // HP at center, operator view only.
    if view == ViewRole::Operator {
        if let Some(hp) = token.hp {
            out.push(DrawCmd::Text {
                space: Space::World,
                x: center.x,
                y: center.y,
                text: hp.to_string(),
                size: (cell * 0.30).max(12.0),
                color: "rgba(255,255,255,0.95)".to_string(),
            });
        }
    }

    // Caption below the disc: the name, or the rolling censor code.
    let censored = view == ViewRole::Viewer && name_is_censored(doc, token);
    let caption = if censored {
        rolling_label(token.censor_seed.as_deref(), token.id, now_ms)
    } else {
        token.name.trim().to_string()
    };
    if !caption.is_empty() {
        out.push(DrawCmd::Label {
            space: Space::World,
            x: center.x,
            y: center.y + r + 8.0 / zoom,
            text: caption,
            fg: "rgba(0,0,0,0.78)".to_string(),
            bg: "rgba(255,255,255,0.72)".to_string(),
        });
    }
}

fn push_ping(out: &mut Vec<DrawCmd>, doc: &SceneDoc, ping: &Ping, vp: &Viewport, now_ms: i64) {
    let age = (now_ms - ping.ts).max(0);
    let alpha = 1.0 - age as f64 / PING_DURATION_MS as f64;
    if alpha <= 0.0 {
        return;
    }

    let zoom = doc.camera.zoom;
    let from_operator = ping.kind == ViewRole::Operator;
    let color = if ping.color.trim().is_empty() {
        if from_operator { PING_OPERATOR_FALLBACK } else { PING_VIEWER_FALLBACK }.to_string()
    } else {
        ping.color.trim().to_string()
    };

    let world = cell_to_world(ping.cell, doc.grid.cell_size);
    let screen = doc.camera.world_to_screen(vp, world);
    let inside =
        screen.x >= 0.0 && screen.x <= vp.width && screen.y >= 0.0 && screen.y <= vp.height;
    let opacity = (alpha * 0.95).clamp(0.0, 1.0);

    if inside {
        let pulse = (age % PING_PULSE_MS) as f64 / PING_PULSE_MS as f64;
        let r_base = (doc.grid.cell_size * 0.35).max(10.0);
        let r_pulse = r_base + pulse * (doc.grid.cell_size * 0.95).max(20.0);

        let mut cmds = vec![DrawCmd::Circle {
            space: Space::World,
            cx: world.x,
            cy: world.y,
            r: r_pulse,
            stroke: Some(color.clone()),
            stroke_width: (if from_operator { 4.0 } else { 3.0 }) / zoom,
            fill: None,
            fill_opacity: 0.0,
            dash: from_operator.then_some([8.0 / zoom, 6.0 / zoom]),
        }];

        if from_operator {
            // Crosshair plus diamond.
            let s = 10.0 / zoom;
            cmds.push(DrawCmd::Line {
                space: Space::World,
                from: Point::new(world.x - s, world.y),
                to: Point::new(world.x + s, world.y),
                stroke: color.clone(),
                width: 3.0 / zoom,
                dash: None,
            });
            cmds.push(DrawCmd::Line {
                space: Space::World,
                from: Point::new(world.x, world.y - s),
                to: Point::new(world.x, world.y + s),
                stroke: color.clone(),
                width: 3.0 / zoom,
                dash: None,
            });
            cmds.push(DrawCmd::Polygon {
                space: Space::World,
                points: vec![
                    Point::new(world.x, world.y - s),
                    Point::new(world.x + s, world.y),
                    Point::new(world.x, world.y + s),
                    Point::new(world.x - s, world.y),
                ],
                fill: color,
            });
        } else {
            cmds.push(DrawCmd::Circle {
                space: Space::World,
                cx: world.x,
                cy: world.y,
                r: 5.0 / zoom,
                stroke: None,
                stroke_width: 0.0,
                fill: Some(color),
                fill_opacity: 1.0,
                dash: None,
            });
        }

        out.push(DrawCmd::Group { opacity, cmds });
    } else {
        // Off-screen: a bubble clamped to the surface edge, an arrow pointing
        // at the ping, and the origin label pulled slightly inward.
        let center = vp.center();
        let mut dx = screen.x - center.x;
        let mut dy = screen.y - center.y;
        if dx.abs() < 1e-6 {
            dx = 1e-6;
        }
        if dy.abs() < 1e-6 {
            dy = 1e-6;
        }
        let half_w = vp.width / 2.0 - EDGE_BUBBLE_MARGIN;
        let half_h = vp.height / 2.0 - EDGE_BUBBLE_MARGIN;
        let t = (half_w / dx.abs()).min(half_h / dy.abs());
        let ix = center.x + dx * t;
        let iy = center.y + dy * t;
        let ang = dy.atan2(dx);

        let label: String = if ping.label.is_empty() {
            "PING".to_string()
        } else {
            ping.label.chars().take(24).collect()
        };

        let cmds = vec![
            DrawCmd::Circle {
                space: Space::Screen,
                cx: ix,
                cy: iy,
                r: 12.0,
                stroke: Some("rgba(0,0,0,0.20)".to_string()),
                stroke_width: 1.5,
                fill: Some(color.clone()),
                fill_opacity: 1.0,
                dash: None,
            },
            DrawCmd::Polygon {
                space: Space::Screen,
                points: vec![
                    Point::new(ix + ang.cos() * 16.0, iy + ang.sin() * 16.0),
                    Point::new(ix + (ang + 2.45).cos() * 10.0, iy + (ang + 2.45).sin() * 10.0),
                    Point::new(ix + (ang - 2.45).cos() * 10.0, iy + (ang - 2.45).sin() * 10.0),
                ],
                fill: color,
            },
            DrawCmd::Label {
                space: Space::Screen,
                x: ix - ang.cos() * 26.0,
                y: iy - ang.sin() * 26.0,
                text: label,
                fg: "rgba(255,255,255,0.92)".to_string(),
                bg: "rgba(0,0,0,0.60)".to_string(),
            },
        ];
        out.push(DrawCmd::Group { opacity, cmds });
    }
}

fn push_measure(out: &mut Vec<DrawCmd>, doc: &SceneDoc, vp: &Viewport, a: Point, b: Point) {
    let zoom = doc.camera.zoom;
    let cell = doc.grid.cell_size;
    let a_world = cell_to_world(a, cell);
    let b_world = cell_to_world(b, cell);

    out.push(DrawCmd::Line {
        space: Space::World,
        from: a_world,
        to: b_world,
        stroke: MEASURE_COLOR.to_string(),
        width: 2.0 / zoom,
        dash: None,
    });
    for p in [a_world, b_world] {
        out.push(DrawCmd::Circle {
            space: Space::World,
            cx: p.x,
            cy: p.y,
            r: 4.0 / zoom,
            stroke: None,
            stroke_width: 0.0,
            fill: Some(MEASURE_COLOR.to_string()),
            fill_opacity: 1.0,
            dash: None,
        });
    }

    let mid = Point::new((a_world.x + b_world.x) / 2.0, (a_world.y + b_world.y) / 2.0);
    let mid_screen = doc.camera.world_to_screen(vp, mid);
    out.push(DrawCmd::Label {
        space: Space::Screen,
        x: mid_screen.x,
        y: mid_screen.y,
        text: measure_label(doc.grid.distance_rule, a, b, doc.grid.meters_per_cell),
        fg: "rgba(255,255,255,0.92)".to_string(),
        bg: "rgba(0,0,0,0.55)".to_string(),
    });
}
