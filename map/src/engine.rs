//! Engine facade: one document, one transient state, one active gesture.
//!
//! DESIGN
//! ======
//! `MapEngine` is the single entry point a host talks to. Pointer and wheel
//! events arrive in host (CSS) pixel coordinates and are scaled to device
//! pixels at this boundary; everything below works in device pixels. The
//! engine tracks two dirty flags with different consumers:
//! - `dirty_doc` means the persisted document changed; the replication layer
//!   drains it via [`MapEngine::take_dirty`].
//! - `dirty_render` means the next [`MapEngine::frame`] call must redraw.
//!
//! [`MapEngine::frame`] is the frame planner: it redraws when marked dirty,
//! while any time-based overlay animates, and for exactly one extra frame
//! after the last overlay expires so the stale pixels get cleared.

#[cfg(test)]
#[path = "engine_test.rs"]
mod engine_test;

use base64::Engine as _;
use image::GenericImageView;
use serde_json::Value;
use thiserror::Error;

use crate::camera::{Camera, Point, Viewport};
use crate::censor::{generate_seed, CENSOR_CODE_LEN};
use crate::consts::{
    CELL_SIZE_MAX, CELL_SIZE_MIN, METERS_PER_CELL_MAX, METERS_PER_CELL_MIN, OPERATOR_ZOOM_MAX,
    OPERATOR_ZOOM_MIN, STROKE_WIDTH_MAX, STROKE_WIDTH_MIN, VIEWER_ZOOM_MAX, VIEWER_ZOOM_MIN,
    WHEEL_ZOOM_STEP,
};
use crate::input::{self, Button, Gesture, InputEffect, Tool, UiState};
use crate::migrate::migrate;
use crate::render::{self, DrawCmd, Overlays, ViewRole};
use crate::scene::{snap_half, Background, DistanceRule, SceneDoc, Token, TokenId};

/// Background image loading failed; the previous background is untouched.
#[derive(Debug, Error)]
pub enum BackgroundError {
    #[error("could not decode image: {0}")]
    Decode(#[from] image::ImageError),
}

/// Host callbacks fired when the input machine changes selection or moves a
/// token, so the surrounding UI can mirror the map.
#[derive(Default)]
pub struct Callbacks {
    pub on_token_selected: Option<Box<dyn FnMut(Option<TokenId>)>>,
    pub on_token_moved: Option<Box<dyn FnMut(TokenId, f64, f64)>>,
}

/// Supplies transient overlays (currently the ping) to the renderer each
/// frame without the engine knowing where they come from.
pub type OverlayProvider = Box<dyn Fn(&SceneDoc) -> Overlays>;

/// A combatant as the external turn tracker sees it. The engine maps these
/// onto tokens through [`MapEngine::upsert_token`].
#[derive(Debug, Clone, Default)]
pub struct CombatantView {
    /// Tracker-side identity, used for the deterministic fallback color.
    pub id: u64,
    pub name: String,
    /// Token previously created for this combatant, if any.
    pub token_id: Option<TokenId>,
    pub size: f64,
    /// Explicit token color; empty falls back to a hue derived from `id`.
    pub color: String,
    pub hp: Option<i32>,
    pub temp_hp: i32,
    pub ac_base: i32,
    pub ac_temp: i32,
    pub hidden_from_viewers: bool,
    pub name_hidden_from_viewers: bool,
    pub censor_seed: Option<String>,
}

/// Deterministic fallback color for a combatant without an explicit one.
#[must_use]
pub fn color_from_id(id: u64) -> String {
    format!("hsl({} 70% 45%)", (id * 47) % 360)
}

/// The battle-map engine facade.
pub struct MapEngine {
    doc: SceneDoc,
    ui: UiState,
    gesture: Gesture,
    viewport: Viewport,
    view: ViewRole,
    zoom_min: f64,
    zoom_max: f64,
    dirty_doc: bool,
    dirty_render: bool,
    was_animating: bool,
    callbacks: Callbacks,
    overlay_provider: Option<OverlayProvider>,
}

impl MapEngine {
    #[must_use]
    pub fn new(view: ViewRole) -> Self {
        let (zoom_min, zoom_max) = match view {
            ViewRole::Operator => (OPERATOR_ZOOM_MIN, OPERATOR_ZOOM_MAX),
            ViewRole::Viewer => (VIEWER_ZOOM_MIN, VIEWER_ZOOM_MAX),
        };
        Self {
            doc: SceneDoc::default(),
            ui: UiState::default(),
            gesture: Gesture::default(),
            viewport: Viewport::default(),
            view,
            zoom_min,
            zoom_max,
            dirty_doc: false,
            dirty_render: true,
            was_animating: false,
            callbacks: Callbacks::default(),
            overlay_provider: None,
        }
    }

    // ====== ACCESS ======

    #[must_use]
    pub fn doc(&self) -> &SceneDoc {
        &self.doc
    }

    #[must_use]
    pub fn ui(&self) -> &UiState {
        &self.ui
    }

    #[must_use]
    pub fn camera(&self) -> Camera {
        self.doc.camera
    }

    /// Replace the camera wholesale (viewer camera-follow uses this).
    pub fn set_camera(&mut self, camera: Camera) {
        self.doc.camera = camera;
        self.doc.camera.zoom = camera.zoom.clamp(self.zoom_min, self.zoom_max);
        self.dirty_render = true;
    }

    pub fn set_viewport(&mut self, width: f64, height: f64, dpr: f64) {
        self.viewport = Viewport::new(width, height, dpr);
        self.dirty_render = true;
    }

    #[must_use]
    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    // ====== POINTER / WHEEL / KEYS ======

    /// Pointer press at host (CSS) pixel coordinates.
    pub fn pointer_down(&mut self, x: f64, y: f64, button: Button, shift: bool) {
        let screen = self.to_device(x, y);
        let (gesture, effects) =
            input::pointer_down(&mut self.doc, &mut self.ui, &self.viewport, screen, button, shift);
        self.gesture = gesture;
        self.apply_effects(&effects);
    }

    /// Pointer movement; `movement_x`/`movement_y` are host-pixel deltas.
    pub fn pointer_move(&mut self, x: f64, y: f64, movement_x: f64, movement_y: f64) {
        let screen = self.to_device(x, y);
        let effects = input::pointer_move(
            &mut self.doc,
            &mut self.ui,
            &self.gesture,
            &self.viewport,
            screen,
            movement_x,
            movement_y,
        );
        self.apply_effects(&effects);
    }

    /// Pointer release or cancel.
    pub fn pointer_up(&mut self) {
        let gesture = std::mem::take(&mut self.gesture);
        let effects = input::pointer_up(&mut self.doc, &mut self.ui, &gesture);
        self.apply_effects(&effects);
    }

    /// Wheel zoom anchored at the cursor. Negative `delta_y` zooms in.
    pub fn wheel(&mut self, x: f64, y: f64, delta_y: f64) {
        let anchor = self.to_device(x, y);
        let factor = if delta_y < 0.0 { WHEEL_ZOOM_STEP } else { 1.0 / WHEEL_ZOOM_STEP };
        let next = self.doc.camera.zoom * factor;
        self.doc
            .camera
            .zoom_to(&self.viewport, next, anchor, self.zoom_min, self.zoom_max);
        self.mark_dirty();
    }

    /// Zoom to an absolute level, anchored at the viewport center (slider
    /// zoom).
    pub fn apply_zoom(&mut self, zoom: f64) {
        let anchor = self.viewport.center();
        self.doc
            .camera
            .zoom_to(&self.viewport, zoom, anchor, self.zoom_min, self.zoom_max);
        self.mark_dirty();
    }

    /// Hold or release the space pan-lock.
    pub fn set_pan_lock(&mut self, held: bool) {
        self.ui.pan_lock = held;
    }

    /// Focus or visibility loss: release the pan-lock and any in-flight
    /// gesture so a missed key-up cannot leave panning stuck.
    pub fn window_blur(&mut self) {
        self.ui.pan_lock = false;
        if self.gesture != Gesture::Idle {
            self.pointer_up();
        }
    }

    // ====== TOOL / GRID SETTINGS ======

    pub fn set_tool(&mut self, tool: Tool) {
        self.ui.tool = tool;
        self.dirty_render = true;
    }

    pub fn set_measure_mode(&mut self, armed: bool) {
        self.ui.measure_mode = armed;
        if !armed {
            self.ui.measure_start = None;
            self.ui.measure_end = None;
        }
        self.dirty_render = true;
    }

    pub fn set_snap(&mut self, snap: bool) {
        self.ui.snap_to_grid = snap;
    }

    pub fn set_draw_color(&mut self, color: String) {
        self.ui.draw_color = color;
    }

    pub fn set_draw_width(&mut self, width: f64) {
        self.ui.draw_width = width.clamp(STROKE_WIDTH_MIN, STROKE_WIDTH_MAX);
    }

    pub fn set_fill_shapes(&mut self, fill: bool) {
        self.ui.fill_shapes = fill;
    }

    pub fn set_grid_show(&mut self, show: bool) {
        self.doc.grid.show = show;
        self.mark_dirty();
    }

    pub fn set_cell_size(&mut self, px: f64) {
        self.doc.grid.cell_size = px.clamp(CELL_SIZE_MIN, CELL_SIZE_MAX);
        self.mark_dirty();
    }

    pub fn set_meters_per_cell(&mut self, meters: f64) {
        self.doc.grid.meters_per_cell = meters.clamp(METERS_PER_CELL_MIN, METERS_PER_CELL_MAX);
        self.mark_dirty();
    }

    pub fn set_distance_rule(&mut self, rule: DistanceRule) {
        self.doc.grid.distance_rule = rule;
        self.mark_dirty();
    }

    // ====== ANNOTATIONS ======

    pub fn undo_shape(&mut self) {
        if self.doc.undo_shape().is_some() {
            self.mark_dirty();
        }
    }

    pub fn clear_shapes(&mut self) {
        if !self.doc.shapes.is_empty() {
            self.doc.clear_shapes();
            self.mark_dirty();
        }
    }

    pub fn clear_tokens(&mut self) {
        if !self.doc.tokens.is_empty() {
            self.doc.clear_tokens();
            self.mark_dirty();
        }
    }

    // ====== BACKGROUND ======

    /// Load a background image from raw file bytes: decode for the natural
    /// dimensions, embed the payload as base64, and fit it to the view.
    ///
    /// # Errors
    ///
    /// Returns [`BackgroundError`] when the bytes do not decode as an image;
    /// the previous background is left untouched.
    pub fn set_background_from_bytes(&mut self, bytes: &[u8]) -> Result<(), BackgroundError> {
        let img = image::load_from_memory(bytes)?;
        let (w, h) = img.dimensions();
        self.doc.background = Some(Background {
            data: Some(base64::engine::general_purpose::STANDARD.encode(bytes)),
            url: None,
            x: 0.0,
            y: 0.0,
            w: f64::from(w),
            h: f64::from(h),
            opacity: 0.85,
            natural_w: Some(f64::from(w)),
            natural_h: Some(f64::from(h)),
        });
        self.fit_background_to_view();
        Ok(())
    }

    /// Reference a background by URL; the host supplies the natural size via
    /// [`MapEngine::set_background_natural_size`] once it has fetched the
    /// image. An empty URL clears the background.
    pub fn set_background_url(&mut self, url: &str) {
        let clean = url.trim();
        if clean.is_empty() {
            self.clear_background();
            return;
        }
        self.doc.background = Some(Background {
            data: None,
            url: Some(clean.to_string()),
            x: 0.0,
            y: 0.0,
            w: 1000.0,
            h: 800.0,
            opacity: 0.85,
            natural_w: None,
            natural_h: None,
        });
        self.mark_dirty();
    }

    pub fn set_background_natural_size(&mut self, w: f64, h: f64) {
        if let Some(bg) = self.doc.background.as_mut() {
            bg.natural_w = Some(w);
            bg.natural_h = Some(h);
            self.fit_background_to_view();
        }
    }

    /// Scale the background to fit the visible view, centered on the camera.
    pub fn fit_background_to_view(&mut self) {
        let zoom = self.doc.camera.zoom;
        let (cam_x, cam_y) = (self.doc.camera.x, self.doc.camera.y);
        let view_w = self.viewport.width / zoom;
        let view_h = self.viewport.height / zoom;
        let Some(bg) = self.doc.background.as_mut() else {
            return;
        };
        let img_w = bg.natural_w.unwrap_or(bg.w).max(1.0);
        let img_h = bg.natural_h.unwrap_or(bg.h).max(1.0);
        let scale = (view_w / img_w).min(view_h / img_h);
        bg.w = img_w * scale;
        bg.h = img_h * scale;
        bg.x = cam_x - bg.w / 2.0;
        bg.y = cam_y - bg.h / 2.0;
        self.mark_dirty();
    }

    pub fn set_background_opacity(&mut self, opacity: f64) {
        if let Some(bg) = self.doc.background.as_mut() {
            bg.opacity = opacity.clamp(0.0, 1.0);
            self.mark_dirty();
        }
    }

    pub fn clear_background(&mut self) {
        if self.doc.background.take().is_some() {
            self.mark_dirty();
        }
    }

    // ====== PERSISTENCE ======

    /// The document as JSON; transient UI state is never included.
    #[must_use]
    pub fn serialize(&self) -> Value {
        serde_json::to_value(&self.doc).unwrap_or(Value::Null)
    }

    /// Replace the document from a persisted/remote value, preserving local
    /// transient state. Returns `false` (leaving everything untouched) when
    /// migration rejects the input.
    pub fn restore(&mut self, raw: &Value) -> bool {
        let Some(doc) = migrate(raw) else {
            return false;
        };
        self.doc = doc;
        self.doc.camera.zoom = self.doc.camera.zoom.clamp(self.zoom_min, self.zoom_max);
        self.mark_dirty();
        true
    }

    /// Reset to the default document, keeping transient UI state.
    pub fn reset(&mut self) {
        self.doc = SceneDoc::default();
        self.gesture = Gesture::Idle;
        self.mark_dirty();
    }

    // ====== COMBATANT CONTRACT ======

    /// Create or update the token for a combatant. New tokens spawn at the
    /// camera-center cell, half-snapped. Returns the token id.
    pub fn upsert_token(&mut self, combatant: &CombatantView) -> TokenId {
        let armor_class = combatant.ac_base + combatant.ac_temp;
        let color = if combatant.color.trim().is_empty() {
            color_from_id(combatant.id)
        } else {
            combatant.color.clone()
        };
        let censor_seed = normalize_seed(combatant);

        if let Some(token) = combatant.token_id.and_then(|id| self.doc.token_mut(id)) {
            if !combatant.name.is_empty() {
                token.name = combatant.name.clone();
            }
            token.size = combatant.size.max(0.25);
            token.hp = combatant.hp;
            token.temp_hp = combatant.temp_hp;
            token.armor_class = armor_class;
            token.hidden_from_viewers = combatant.hidden_from_viewers;
            token.name_hidden_from_viewers = combatant.name_hidden_from_viewers;
            token.color = color;
            if combatant.name_hidden_from_viewers {
                token.censor_seed = censor_seed.or_else(|| token.censor_seed.clone());
            }
            let id = token.id;
            self.mark_dirty();
            return id;
        }

        let center = Point::new(
            self.doc.camera.x / self.doc.grid.cell_size,
            self.doc.camera.y / self.doc.grid.cell_size,
        );
        let id = self.doc.add_token(Token {
            id: 0,
            name: if combatant.name.is_empty() { "Token".to_string() } else { combatant.name.clone() },
            cell_x: snap_half(center.x),
            cell_y: snap_half(center.y),
            size: combatant.size.max(0.25),
            color,
            hp: combatant.hp,
            temp_hp: combatant.temp_hp,
            armor_class,
            hidden_from_viewers: combatant.hidden_from_viewers,
            name_hidden_from_viewers: combatant.name_hidden_from_viewers,
            censor_seed,
        });
        self.mark_dirty();
        id
    }

    pub fn remove_token(&mut self, id: TokenId) {
        if self.doc.remove_token(id).is_some() {
            self.mark_dirty();
        }
    }

    /// Center the camera on a token.
    pub fn focus_token(&mut self, id: TokenId) {
        let Some((cell_x, cell_y)) = self.doc.token(id).map(|t| (t.cell_x, t.cell_y)) else {
            return;
        };
        self.doc.camera.x = cell_x * self.doc.grid.cell_size;
        self.doc.camera.y = cell_y * self.doc.grid.cell_size;
        self.mark_dirty();
    }

    pub fn select_token(&mut self, id: Option<TokenId>) {
        self.doc.selected_token = id.filter(|id| self.doc.token(*id).is_some());
        let selected = self.doc.selected_token;
        if let Some(cb) = self.callbacks.on_token_selected.as_mut() {
            cb(selected);
        }
        self.mark_dirty();
    }

    pub fn set_callbacks(&mut self, callbacks: Callbacks) {
        self.callbacks = callbacks;
    }

    pub fn set_overlay_provider(&mut self, provider: Option<OverlayProvider>) {
        self.overlay_provider = provider;
    }

    // ====== DIRTY / FRAME ======

    /// Mark the document changed: schedules both a redraw and a replication
    /// push.
    pub fn mark_dirty(&mut self) {
        self.dirty_doc = true;
        self.dirty_render = true;
    }

    /// Drain the replication dirty flag.
    pub fn take_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty_doc)
    }

    /// Produce the next frame's display list, or `None` when nothing needs
    /// redrawing. Keeps redrawing while a time-based overlay animates, plus
    /// one clearing frame after the last one expires.
    pub fn frame(&mut self, now_ms: i64) -> Option<Vec<DrawCmd>> {
        let overlays = self
            .overlay_provider
            .as_ref()
            .map_or_else(Overlays::default, |p| p(&self.doc));
        let animating = render::needs_animation(&self.doc, &overlays, self.view, now_ms);

        if !self.dirty_render && !animating && !self.was_animating {
            return None;
        }
        self.dirty_render = false;
        self.was_animating = animating;

        Some(render::draw(&self.doc, &self.ui, &overlays, self.view, &self.viewport, now_ms))
    }

    fn to_device(&self, x: f64, y: f64) -> Point {
        Point::new(x * self.viewport.dpr, y * self.viewport.dpr)
    }

    fn apply_effects(&mut self, effects: &[InputEffect]) {
        for effect in effects {
            match effect {
                InputEffect::TokenSelected(id) => {
                    if let Some(cb) = self.callbacks.on_token_selected.as_mut() {
                        cb(*id);
                    }
                    self.mark_dirty();
                }
                InputEffect::TokenMoved { id, cell_x, cell_y } => {
                    if let Some(cb) = self.callbacks.on_token_moved.as_mut() {
                        cb(*id, *cell_x, *cell_y);
                    }
                    self.mark_dirty();
                }
                InputEffect::SceneChanged => self.mark_dirty(),
                InputEffect::OverlayChanged => self.dirty_render = true,
            }
        }
    }
}

/// A usable censor seed from the combatant, regenerating when the name is
/// hidden but the seed is missing or malformed.
fn normalize_seed(combatant: &CombatantView) -> Option<String> {
    let trimmed = combatant
        .censor_seed
        .as_deref()
        .map(str::trim)
        .filter(|s| s.len() == CENSOR_CODE_LEN)
        .map(str::to_uppercase);
    if trimmed.is_none() && combatant.name_hidden_from_viewers {
        return Some(generate_seed(&mut rand::rng()));
    }
    trimmed
}
