//! WebSocket handler: the room relay.
//!
//! DESIGN
//! ======
//! On upgrade, generates a client ID and enters a `select!` loop:
//! - Incoming client messages are parsed and dispatched by envelope type
//! - Broadcast messages from room peers are forwarded to the client
//!
//! The first message must be `subscribe`; it joins the room and is answered
//! with a row snapshot. After that, row upserts overwrite the room row and
//! fan out to peers, pings fan out without being stored, and presence updates
//! fan the full roster out to everyone in the room.
//!
//! LIFECYCLE
//! =========
//! 1. Upgrade
//! 2. `subscribe` joins the room, replies `row_snapshot`
//! 3. Mutations dispatch and broadcast, excluding the sender
//! 4. Close: drop the client, drop its presence, sync the roster, evict the
//!    room when empty

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use mapsync::wire::{ClientMsg, ServerMsg};

use crate::state::{AppState, RoomState};

// =============================================================================
// ERRORS
// =============================================================================

#[derive(Debug, thiserror::Error)]
enum WsError {
    #[error("invalid json: {0}")]
    BadJson(#[from] serde_json::Error),
    #[error("subscribe to a room first")]
    NotSubscribed,
}

// =============================================================================
// UPGRADE
// =============================================================================

pub async fn handle_ws(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| run_ws(socket, state))
}

// =============================================================================
// CONNECTION
// =============================================================================

async fn run_ws(mut socket: WebSocket, state: AppState) {
    let client_id = Uuid::new_v4();

    // Per-connection channel for broadcast messages from room peers.
    let (client_tx, mut client_rx) = mpsc::channel::<ServerMsg>(256);

    info!(%client_id, "ws: client connected");

    let mut current_room: Option<String> = None;

    loop {
        tokio::select! {
            msg = socket.recv() => {
                let Some(Ok(msg)) = msg else { break };
                match msg {
                    Message::Text(text) => {
                        let replies = process_inbound_text(
                            &state,
                            &mut current_room,
                            client_id,
                            &client_tx,
                            text.as_str(),
                        )
                        .await;
                        for reply in replies {
                            let _ = send_msg(&mut socket, &reply).await;
                        }
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
            Some(msg) = client_rx.recv() => {
                if send_msg(&mut socket, &msg).await.is_err() {
                    break;
                }
            }
        }
    }

    if let Some(room_id) = current_room {
        leave_room(&state, &room_id, client_id).await;
    }
    info!(%client_id, "ws: client disconnected");
}

// =============================================================================
// DISPATCH
// =============================================================================

/// Parse and process one inbound text message, returning replies for the
/// sender. Broadcasts to peers happen inside; keeping the websocket transport
/// out of here lets tests exercise the relay with plain channels.
async fn process_inbound_text(
    state: &AppState,
    current_room: &mut Option<String>,
    client_id: Uuid,
    client_tx: &mpsc::Sender<ServerMsg>,
    text: &str,
) -> Vec<ServerMsg> {
    let msg: ClientMsg = match serde_json::from_str(text) {
        Ok(msg) => msg,
        Err(e) => {
            warn!(%client_id, error = %e, "ws: invalid inbound message");
            return vec![error_msg(WsError::BadJson(e))];
        }
    };

    match msg {
        ClientMsg::Subscribe { room_id } => {
            // Re-subscribing moves the client to the new room.
            if let Some(old_room) = current_room.take() {
                leave_room(state, &old_room, client_id).await;
            }
            let row = join_room(state, &room_id, client_id, client_tx.clone()).await;
            info!(%client_id, room = %room_id, "ws: subscribed");
            *current_room = Some(room_id);
            vec![ServerMsg::RowSnapshot { row }]
        }
        ClientMsg::RowUpsert { mut row } => {
            let Some(room_id) = current_room.as_deref() else {
                return vec![error_msg(WsError::NotSubscribed)];
            };
            // The subscription decides the room, whatever the row claims.
            row.room_id = room_id.to_string();
            {
                let mut rooms = state.rooms.write().await;
                if let Some(room) = rooms.get_mut(room_id) {
                    room.row = Some(row.clone());
                }
            }
            broadcast(state, room_id, &ServerMsg::RowChanged { row }, Some(client_id)).await;
            vec![]
        }
        ClientMsg::Ping(ping) => {
            let Some(room_id) = current_room.as_deref() else {
                return vec![error_msg(WsError::NotSubscribed)];
            };
            // Ephemeral: never stored, recipients expire it by age.
            broadcast(state, room_id, &ServerMsg::Ping(ping), Some(client_id)).await;
            vec![]
        }
        ClientMsg::PresenceTrack(presence) => {
            let Some(room_id) = current_room.as_deref() else {
                return vec![error_msg(WsError::NotSubscribed)];
            };
            let roster = {
                let mut rooms = state.rooms.write().await;
                let Some(room) = rooms.get_mut(room_id) else {
                    return vec![];
                };
                room.presence.insert(client_id, presence);
                room.roster()
            };
            // Everyone sees the new roster, the sender included.
            broadcast(state, room_id, &ServerMsg::PresenceSync { roster }, None).await;
            vec![]
        }
    }
}

fn error_msg(err: WsError) -> ServerMsg {
    ServerMsg::Error { message: err.to_string() }
}

// =============================================================================
// ROOM MEMBERSHIP
// =============================================================================

/// Join a room, creating it on first subscribe. Returns the current row for
/// the snapshot reply.
async fn join_room(
    state: &AppState,
    room_id: &str,
    client_id: Uuid,
    client_tx: mpsc::Sender<ServerMsg>,
) -> Option<mapsync::wire::RoomRow> {
    let mut rooms = state.rooms.write().await;
    let room = rooms.entry(room_id.to_string()).or_insert_with(RoomState::new);
    room.clients.insert(client_id, client_tx);
    room.row.clone()
}

/// Drop a client from a room, sync the roster if its presence was tracked,
/// and evict the room once empty.
async fn leave_room(state: &AppState, room_id: &str, client_id: Uuid) {
    let roster = {
        let mut rooms = state.rooms.write().await;
        let Some(room) = rooms.get_mut(room_id) else {
            return;
        };
        room.clients.remove(&client_id);
        let had_presence = room.presence.remove(&client_id).is_some();
        if room.clients.is_empty() {
            rooms.remove(room_id);
            info!(room = %room_id, "ws: room evicted");
            return;
        }
        had_presence.then(|| room.roster())
    };
    if let Some(roster) = roster {
        broadcast(state, room_id, &ServerMsg::PresenceSync { roster }, None).await;
    }
}

// =============================================================================
// BROADCAST
// =============================================================================

/// Send a message to all clients in a room, optionally excluding one.
async fn broadcast(state: &AppState, room_id: &str, msg: &ServerMsg, exclude: Option<Uuid>) {
    let rooms = state.rooms.read().await;
    let Some(room) = rooms.get(room_id) else {
        return;
    };
    for (client_id, tx) in &room.clients {
        if exclude == Some(*client_id) {
            continue;
        }
        // Best-effort: if a client's channel is full, skip it.
        let _ = tx.try_send(msg.clone());
    }
}

// =============================================================================
// HELPERS
// =============================================================================

async fn send_msg(socket: &mut WebSocket, msg: &ServerMsg) -> Result<(), ()> {
    let json = match serde_json::to_string(msg) {
        Ok(j) => j,
        Err(e) => {
            warn!(error = %e, "ws: failed to serialize message");
            return Err(());
        }
    };
    socket.send(Message::Text(json.into())).await.map_err(|_| ())
}

#[cfg(test)]
#[path = "ws_test.rs"]
mod tests;
