//! Shared relay state.
//!
//! DESIGN
//! ======
//! `AppState` is injected into Axum handlers via the `State` extractor. It
//! holds a map of live rooms. Each room carries the last written row, the
//! connected clients, and their presence records. Rooms are created on first
//! subscribe and evicted when the last client leaves; the relay itself keeps
//! nothing durable.

use std::collections::HashMap;
use std::sync::Arc;

use mapsync::wire::{Presence, RoomRow, ServerMsg};
use tokio::sync::{RwLock, mpsc};
use uuid::Uuid;

// =============================================================================
// ROOM STATE
// =============================================================================

/// Per-room live state.
pub struct RoomState {
    /// Last row written to this room, if any. Last write wins.
    pub row: Option<RoomRow>,
    /// Connected clients: `client_id` -> sender for outgoing messages.
    pub clients: HashMap<Uuid, mpsc::Sender<ServerMsg>>,
    /// Presence record per connected client, for roster sync.
    pub presence: HashMap<Uuid, Presence>,
}

impl RoomState {
    #[must_use]
    pub fn new() -> Self {
        Self { row: None, clients: HashMap::new(), presence: HashMap::new() }
    }

    /// Roster snapshot in a stable order.
    #[must_use]
    pub fn roster(&self) -> Vec<Presence> {
        let mut roster: Vec<Presence> = self.presence.values().cloned().collect();
        roster.sort_by(|a, b| a.name.cmp(&b.name).then(a.ts.cmp(&b.ts)));
        roster
    }
}

impl Default for RoomState {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// APP STATE
// =============================================================================

/// Shared relay state, injected into Axum handlers via the State extractor.
/// Clone is required by Axum; the room map is Arc-wrapped.
#[derive(Clone, Default)]
pub struct AppState {
    pub rooms: Arc<RwLock<HashMap<String, RoomState>>>,
}

impl AppState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}
