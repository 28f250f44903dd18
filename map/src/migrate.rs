//! Upgrade previously-persisted documents to the current schema.
//!
//! Migration is additive and defensive: every nested read falls back to a
//! documented default, malformed list entries are dropped, and only a
//! non-object root is rejected. Migrating an already-current document is a
//! no-op beyond normalization, so `migrate(migrate(x)) == migrate(x)`.
//!
//! Version history:
//! - v1: no real-world scale; cells default to 60 px.
//! - v2: stored `feetPerCell` instead of `metersPerCell`.
//! - v3 (current): meters, renamed distance-rule values, `hideAllTokenNames`.

#[cfg(test)]
#[path = "migrate_test.rs"]
mod migrate_test;

use serde_json::Value;

use crate::camera::Camera;
use crate::consts::{
    CELL_SIZE_LEGACY_DEFAULT, CELL_SIZE_MAX, CELL_SIZE_MIN, FEET_TO_METERS, METERS_PER_CELL_MAX,
    METERS_PER_CELL_MIN,
};
use crate::scene::{
    Background, DistanceRule, GridSettings, PlayerView, SceneDoc, Shape, Token, TurnEntry,
    TurnOrder, SCENE_VERSION,
};

/// Upgrade an arbitrarily-shaped persisted value to a current-version
/// document. Returns `None` only when `raw` is not a JSON object.
#[must_use]
pub fn migrate(raw: &Value) -> Option<SceneDoc> {
    let root = raw.as_object()?;

    let version = u64_field(raw, "version").unwrap_or(1);
    let grid = migrate_grid(root.get("grid"), version);

    let camera = root
        .get("camera")
        .and_then(|v| serde_json::from_value::<Camera>(v.clone()).ok())
        .unwrap_or_default();

    let background = root
        .get("background")
        .and_then(|v| serde_json::from_value::<Background>(v.clone()).ok());

    let tokens: Vec<Token> = array_of(root.get("tokens"));
    let shapes = migrate_shapes(root.get("shapes"));

    let selected_token = root
        .get("selectedToken")
        .or_else(|| root.get("selectedTokenId"))
        .and_then(Value::as_u64)
        .filter(|id| tokens.iter().any(|t| t.id == *id));

    let next_token_id = counter_floor(
        root.get("nextTokenId").or_else(|| root.get("nextId")),
        tokens.iter().map(|t| t.id),
    );
    let next_shape_id = counter_floor(root.get("nextShapeId"), shapes.iter().map(|s| s.id));

    Some(SceneDoc {
        version: SCENE_VERSION,
        grid,
        camera,
        background,
        tokens,
        shapes,
        selected_token,
        player_view: migrate_player_view(root.get("playerView")),
        turn_order: migrate_turn_order(root),
        next_token_id,
        next_shape_id,
    })
}

fn migrate_grid(grid: Option<&Value>, version: u64) -> GridSettings {
    let cell_size = grid
        .and_then(|g| g.get("cellSize").or_else(|| g.get("cellPx")))
        .and_then(Value::as_f64)
        .unwrap_or(CELL_SIZE_LEGACY_DEFAULT)
        .clamp(CELL_SIZE_MIN, CELL_SIZE_MAX);

    let stored_meters = grid.and_then(|g| g.get("metersPerCell")).and_then(Value::as_f64);
    let meters_per_cell = match version {
        0..=1 => 1.0,
        2 => {
            // v2 stored feet per cell; convert by the fixed factor.
            let feet = grid
                .and_then(|g| g.get("feetPerCell"))
                .and_then(Value::as_f64)
                .unwrap_or(5.0);
            stored_meters.unwrap_or(feet * FEET_TO_METERS)
        }
        _ => stored_meters.unwrap_or(1.0),
    }
    .clamp(METERS_PER_CELL_MIN, METERS_PER_CELL_MAX);

    let distance_rule = grid
        .and_then(|g| g.get("distanceRule"))
        .and_then(Value::as_str)
        .map_or(DistanceRule::Chebyshev, |s| match s {
            "euclidean" | "euclid" => DistanceRule::Euclidean,
            "alternating" | "alt" => DistanceRule::Alternating,
            _ => DistanceRule::Chebyshev,
        });

    GridSettings {
        show: grid
            .and_then(|g| g.get("show"))
            .and_then(Value::as_bool)
            .unwrap_or(true),
        cell_size,
        meters_per_cell,
        distance_rule,
    }
}

fn migrate_player_view(view: Option<&Value>) -> PlayerView {
    let hide = view
        .and_then(|v| {
            v.get("hideAllTokenNames")
                .or_else(|| v.get("hideTokenNames"))
                .or_else(|| v.get("hideNames"))
        })
        .and_then(Value::as_bool)
        .unwrap_or(false);
    PlayerView { hide_all_token_names: hide }
}

fn migrate_turn_order(root: &serde_json::Map<String, Value>) -> TurnOrder {
    let current = root.get("turnOrder");
    let legacy = root.get("turnBar").or_else(|| root.get("turn"));

    let entries: Vec<TurnEntry> = array_of(
        current
            .and_then(|v| v.get("entries"))
            .or_else(|| legacy.and_then(|v| v.get("order"))),
    );

    let active_index = current
        .or(legacy)
        .and_then(|v| v.get("activeIndex").or_else(|| v.get("active")))
        .and_then(Value::as_u64)
        .map(|i| i as usize)
        .filter(|i| *i < entries.len());

    TurnOrder { entries, active_index }
}

/// Decode the shape list, dropping malformed entries. Shapes once stored
/// their variant under `type`; rename it to `kind` before decoding.
fn migrate_shapes(value: Option<&Value>) -> Vec<Shape> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| {
                    let mut item = item.clone();
                    if let Some(obj) = item.as_object_mut() {
                        if !obj.contains_key("kind") {
                            if let Some(kind) = obj.remove("type") {
                                obj.insert("kind".to_string(), kind);
                            }
                        }
                    }
                    serde_json::from_value(item).ok()
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Parse an array field element-by-element, dropping malformed entries.
fn array_of<T: serde::de::DeserializeOwned>(value: Option<&Value>) -> Vec<T> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|v| serde_json::from_value(v.clone()).ok())
                .collect()
        })
        .unwrap_or_default()
}

/// Next-id counter: the stored value if it is still ahead of every existing
/// id, otherwise `max(id) + 1`.
fn counter_floor(stored: Option<&Value>, ids: impl Iterator<Item = u64>) -> u64 {
    let floor = ids.max().map_or(1, |max| max + 1);
    stored
        .and_then(Value::as_u64)
        .filter(|n| *n >= floor)
        .unwrap_or(floor)
}

fn u64_field(value: &Value, key: &str) -> Option<u64> {
    value.get(key).and_then(Value::as_u64)
}
