//! Scene document: the versioned, serializable state of one battle map.
//!
//! Everything in [`SceneDoc`] is persisted and replicated; transient concerns
//! (active gesture, previews, hover) live in [`crate::input::UiState`] instead.
//! Field names serialize in camelCase so the on-disk and on-wire shape stays
//! stable across hosts.
//!
//! Object ids are plain `u64` counters scoped to the document. Counters only
//! ever move forward, so removing a token never frees its id for reuse.

#[cfg(test)]
#[path = "scene_test.rs"]
mod scene_test;

use serde::{Deserialize, Serialize};

use crate::camera::{Camera, Point};
use crate::consts::{CELL_SIZE_DEFAULT, SHAPE_FILL_OPACITY};

/// Current document schema version. [`crate::migrate`] upgrades anything older.
pub const SCENE_VERSION: u32 = 3;

/// Identifier for a token within one document.
pub type TokenId = u64;

/// Identifier for an annotation shape within one document.
pub type ShapeId = u64;

/// Snap a cell coordinate to the nearest half cell.
#[must_use]
pub fn snap_half(n: f64) -> f64 {
    (n * 2.0).round() / 2.0
}

/// How cell distances are measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceRule {
    /// Diagonals cost the same as orthogonal steps.
    Chebyshev,
    /// Straight-line distance.
    Euclidean,
    /// Diagonals alternate between one and two steps.
    Alternating,
}

/// Grid display and measurement settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GridSettings {
    /// Whether grid lines are drawn at all.
    pub show: bool,
    /// Cell edge length in world pixels.
    pub cell_size: f64,
    /// Real-world scale of one cell, in meters.
    pub meters_per_cell: f64,
    /// Active distance rule for the measure tool.
    pub distance_rule: DistanceRule,
}

impl Default for GridSettings {
    fn default() -> Self {
        Self {
            show: true,
            cell_size: CELL_SIZE_DEFAULT,
            meters_per_cell: 1.0,
            distance_rule: DistanceRule::Chebyshev,
        }
    }
}

/// Background image placement. The bitmap travels either inline (`data`, a
/// base64 payload) or by reference (`url`); replication strips the inline
/// payload before pushing the row.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Background {
    /// Inline image payload, base64-encoded. Stripped from replicated rows.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    /// Image location for hosts that fetch rather than embed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Top-left corner in world coordinates.
    pub x: f64,
    pub y: f64,
    /// Placed size in world pixels.
    pub w: f64,
    pub h: f64,
    /// Draw opacity, `0.0..=1.0`.
    pub opacity: f64,
    /// Source bitmap width in pixels, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub natural_w: Option<f64>,
    /// Source bitmap height in pixels, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub natural_h: Option<f64>,
}

/// Geometry of an annotation shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ShapeGeom {
    /// Axis-aligned rectangle; `w`/`h` are non-negative once committed.
    Rect { x: f64, y: f64, w: f64, h: f64 },
    /// Circle around a fixed center.
    Circle { cx: f64, cy: f64, r: f64 },
    /// Freehand polyline in world coordinates.
    Path { points: Vec<Point> },
}

/// A committed annotation shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Shape {
    pub id: ShapeId,
    #[serde(flatten)]
    pub geom: ShapeGeom,
    /// Stroke color as a CSS color string.
    pub stroke: String,
    /// Stroke width in world pixels.
    pub stroke_width: f64,
    /// Fill color; `None` draws the outline only. Older path shapes carry
    /// no fill key at all.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fill: Option<String>,
    /// Fill opacity, ignored when `fill` is `None`. Stored as `fillAlpha`
    /// by older documents.
    #[serde(default = "default_fill_opacity", alias = "fillAlpha")]
    pub fill_opacity: f64,
}

fn default_fill_opacity() -> f64 {
    SHAPE_FILL_OPACITY
}

/// An in-progress shape, rendered as a dashed preview. Never persisted;
/// committing assigns an id and promotes it to a [`Shape`].
#[derive(Debug, Clone, PartialEq)]
pub struct PreviewShape {
    pub geom: ShapeGeom,
    pub stroke: String,
    pub stroke_width: f64,
    pub fill: Option<String>,
}

impl PreviewShape {
    /// Promote the preview into a committed shape with the given id.
    #[must_use]
    pub fn into_shape(self, id: ShapeId) -> Shape {
        Shape {
            id,
            geom: self.geom,
            stroke: self.stroke,
            stroke_width: self.stroke_width,
            fill: self.fill,
            fill_opacity: SHAPE_FILL_OPACITY,
        }
    }
}

fn default_token_size() -> f64 {
    1.0
}

/// A combatant marker on the grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Token {
    pub id: TokenId,
    pub name: String,
    /// Center position in cell coordinates, always half-cell aligned.
    /// Older documents stored these as plain `x`/`y`.
    #[serde(alias = "x")]
    pub cell_x: f64,
    #[serde(alias = "y")]
    pub cell_y: f64,
    /// Diameter in cells.
    #[serde(default = "default_token_size")]
    pub size: f64,
    /// Fill color as a CSS color string.
    pub color: String,
    /// Current hit points, when tracked.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hp: Option<i32>,
    #[serde(default)]
    pub temp_hp: i32,
    #[serde(default)]
    pub armor_class: i32,
    /// Token is entirely invisible to viewers.
    #[serde(default)]
    pub hidden_from_viewers: bool,
    /// Viewers see a rolling censor code instead of the name.
    #[serde(default)]
    pub name_hidden_from_viewers: bool,
    /// Six-character seed driving the censor code for this token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub censor_seed: Option<String>,
}

/// Viewer-facing display options.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerView {
    /// Suppress every token name for viewers, censored or not.
    pub hide_all_token_names: bool,
}

/// One slot in the initiative order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnEntry {
    pub id: u64,
    pub label: String,
    /// Viewers see a rolling code in place of the label.
    #[serde(default)]
    pub is_censored: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub censor_seed: Option<String>,
}

/// Initiative order shown alongside the map.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnOrder {
    pub entries: Vec<TurnEntry>,
    /// Index into `entries` of the acting combatant, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_index: Option<usize>,
}

/// The full persisted state of one battle map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneDoc {
    /// Schema version, bumped on incompatible shape changes.
    pub version: u32,
    pub grid: GridSettings,
    pub camera: Camera,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background: Option<Background>,
    #[serde(default)]
    pub tokens: Vec<Token>,
    #[serde(default)]
    pub shapes: Vec<Shape>,
    /// Currently selected token, operator-local but persisted for restore.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_token: Option<TokenId>,
    #[serde(default)]
    pub player_view: PlayerView,
    #[serde(default)]
    pub turn_order: TurnOrder,
    /// Next token id to assign.
    pub next_token_id: TokenId,
    /// Next shape id to assign.
    pub next_shape_id: ShapeId,
}

impl Default for SceneDoc {
    fn default() -> Self {
        Self {
            version: SCENE_VERSION,
            grid: GridSettings::default(),
            camera: Camera::default(),
            background: None,
            tokens: Vec::new(),
            shapes: Vec::new(),
            selected_token: None,
            player_view: PlayerView::default(),
            turn_order: TurnOrder::default(),
            next_token_id: 1,
            next_shape_id: 1,
        }
    }
}

impl SceneDoc {
    /// Add a token, assigning it the next id and selecting it. Returns the
    /// assigned id.
    pub fn add_token(&mut self, mut token: Token) -> TokenId {
        let id = self.next_token_id;
        self.next_token_id += 1;
        token.id = id;
        token.cell_x = snap_half(token.cell_x);
        token.cell_y = snap_half(token.cell_y);
        self.tokens.push(token);
        self.selected_token = Some(id);
        id
    }

    /// Remove a token by id, returning it if present. Clears the selection
    /// when the removed token was selected.
    pub fn remove_token(&mut self, id: TokenId) -> Option<Token> {
        let idx = self.tokens.iter().position(|t| t.id == id)?;
        if self.selected_token == Some(id) {
            self.selected_token = None;
        }
        Some(self.tokens.remove(idx))
    }

    #[must_use]
    pub fn token(&self, id: TokenId) -> Option<&Token> {
        self.tokens.iter().find(|t| t.id == id)
    }

    pub fn token_mut(&mut self, id: TokenId) -> Option<&mut Token> {
        self.tokens.iter_mut().find(|t| t.id == id)
    }

    /// Move a token, snapping the new position to the half-cell lattice.
    /// Returns false if the token does not exist.
    pub fn set_token_position(&mut self, id: TokenId, cell_x: f64, cell_y: f64) -> bool {
        let Some(token) = self.token_mut(id) else {
            return false;
        };
        token.cell_x = snap_half(cell_x);
        token.cell_y = snap_half(cell_y);
        true
    }

    /// Commit an annotation shape, assigning it the next id. Returns the
    /// assigned id.
    pub fn add_shape(&mut self, preview: PreviewShape) -> ShapeId {
        let id = self.next_shape_id;
        self.next_shape_id += 1;
        self.shapes.push(preview.into_shape(id));
        id
    }

    /// Remove the most recently committed shape, if any.
    pub fn undo_shape(&mut self) -> Option<Shape> {
        self.shapes.pop()
    }

    pub fn clear_shapes(&mut self) {
        self.shapes.clear();
    }

    pub fn clear_tokens(&mut self) {
        self.tokens.clear();
        self.selected_token = None;
    }
}
