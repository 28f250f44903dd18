//! Wire model: the replicated row, broadcast records, and the JSON envelope.

#[cfg(test)]
#[path = "wire_test.rs"]
mod wire_test;

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Current time as milliseconds since Unix epoch.
#[must_use]
pub fn now_ms() -> i64 {
    let Ok(dur) = SystemTime::now().duration_since(UNIX_EPOCH) else {
        return 0;
    };
    i64::try_from(dur.as_millis()).unwrap_or(0)
}

/// Which side of the table a connected identity sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Operator,
    Viewer,
}

/// The one replicated row per room. Last write wins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomRow {
    pub room_id: String,
    /// Serialized scene document, embedded image payloads stripped.
    pub doc: Value,
    /// Milliseconds since epoch of the last write.
    pub updated_at: i64,
}

/// Ephemeral ping broadcast. Never stored; recipients expire it by age.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PingMessage {
    /// Ping location in cell coordinates, half-cell resolution.
    pub x: f64,
    pub y: f64,
    /// Milliseconds since epoch when the ping was raised.
    pub ts: i64,
    /// Display name of the originator.
    pub from: String,
    /// CSS color for the marker; empty uses the role fallback.
    pub color: String,
    pub kind: Role,
}

/// One connected identity, for the online roster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Presence {
    pub role: Role,
    pub name: String,
    pub color: String,
    pub ts: i64,
}

/// Client → server envelope. Type tags are snake_case, payload fields
/// camelCase like every other wire type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ClientMsg {
    /// Join a room; the server answers with a row snapshot.
    Subscribe { room_id: String },
    /// Overwrite the room row (operator only by convention).
    RowUpsert { row: RoomRow },
    Ping(PingMessage),
    PresenceTrack(Presence),
}

/// Server → client envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ServerMsg {
    /// Current row at subscribe time; `None` when the room has no row yet.
    RowSnapshot { row: Option<RoomRow> },
    /// The row was overwritten by another client.
    RowChanged { row: RoomRow },
    Ping(PingMessage),
    /// Full roster after a presence change.
    PresenceSync { roster: Vec<Presence> },
    Error { message: String },
}

/// Remove any embedded background image payload from a serialized document,
/// keeping the URL and placement metadata. Embedded payloads would blow up
/// the row on every push.
pub fn strip_embedded_background(doc: &mut Value) {
    if let Some(bg) = doc.get_mut("background").and_then(Value::as_object_mut) {
        bg.remove("data");
    }
}
