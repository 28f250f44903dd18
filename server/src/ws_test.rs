use futures_util::{SinkExt, StreamExt};
use mapsync::wire::{Presence, RoomRow, Role};
use serde_json::json;
use tokio::time::{Duration, timeout};

use super::*;

async fn recv_broadcast(rx: &mut mpsc::Receiver<ServerMsg>) -> ServerMsg {
    timeout(Duration::from_millis(500), rx.recv())
        .await
        .expect("broadcast receive timed out")
        .expect("broadcast channel closed unexpectedly")
}

async fn assert_no_broadcast(rx: &mut mpsc::Receiver<ServerMsg>) {
    assert!(
        timeout(Duration::from_millis(80), rx.recv()).await.is_err(),
        "expected no broadcast message"
    );
}

fn subscribe_text(room_id: &str) -> String {
    serde_json::to_string(&ClientMsg::Subscribe { room_id: room_id.to_string() }).unwrap()
}

fn upsert_text(room_id: &str, doc: serde_json::Value) -> String {
    serde_json::to_string(&ClientMsg::RowUpsert {
        row: RoomRow { room_id: room_id.to_string(), doc, updated_at: 1234 },
    })
    .unwrap()
}

/// A connected test client: its room cursor and broadcast channel.
struct TestClient {
    id: Uuid,
    room: Option<String>,
    tx: mpsc::Sender<ServerMsg>,
    rx: mpsc::Receiver<ServerMsg>,
}

impl TestClient {
    fn new() -> Self {
        let (tx, rx) = mpsc::channel(16);
        Self { id: Uuid::new_v4(), room: None, tx, rx }
    }

    async fn send(&mut self, state: &AppState, text: &str) -> Vec<ServerMsg> {
        process_inbound_text(state, &mut self.room, self.id, &self.tx, text).await
    }
}

#[tokio::test]
async fn subscribe_creates_the_room_and_replies_with_an_empty_snapshot() {
    let state = AppState::new();
    let mut alice = TestClient::new();

    let replies = alice.send(&state, &subscribe_text("lair")).await;
    assert_eq!(replies, vec![ServerMsg::RowSnapshot { row: None }]);
    assert_eq!(alice.room.as_deref(), Some("lair"));
    assert!(state.rooms.read().await.contains_key("lair"));
}

#[tokio::test]
async fn subscribe_replies_with_the_current_row() {
    let state = AppState::new();
    let mut alice = TestClient::new();
    alice.send(&state, &subscribe_text("lair")).await;
    alice.send(&state, &upsert_text("lair", json!({ "version": 3 }))).await;

    let mut bob = TestClient::new();
    let replies = bob.send(&state, &subscribe_text("lair")).await;
    let [ServerMsg::RowSnapshot { row: Some(row) }] = replies.as_slice() else {
        panic!("expected a populated snapshot, got {replies:?}");
    };
    assert_eq!(row.doc, json!({ "version": 3 }));
}

#[tokio::test]
async fn row_upsert_broadcasts_to_peers_but_not_the_sender() {
    let state = AppState::new();
    let mut alice = TestClient::new();
    let mut bob = TestClient::new();
    alice.send(&state, &subscribe_text("lair")).await;
    bob.send(&state, &subscribe_text("lair")).await;

    let replies = alice.send(&state, &upsert_text("lair", json!({ "version": 3 }))).await;
    assert!(replies.is_empty(), "upserts are not acknowledged");

    let ServerMsg::RowChanged { row } = recv_broadcast(&mut bob.rx).await else {
        panic!("expected row_changed");
    };
    assert_eq!(row.doc, json!({ "version": 3 }));
    assert_no_broadcast(&mut alice.rx).await;
}

#[tokio::test]
async fn the_subscription_stamps_the_row_room_id() {
    let state = AppState::new();
    let mut alice = TestClient::new();
    let mut bob = TestClient::new();
    alice.send(&state, &subscribe_text("lair")).await;
    bob.send(&state, &subscribe_text("lair")).await;

    // The row claims another room; the subscription wins.
    alice.send(&state, &upsert_text("crypt", json!({ "version": 3 }))).await;

    let ServerMsg::RowChanged { row } = recv_broadcast(&mut bob.rx).await else {
        panic!("expected row_changed");
    };
    assert_eq!(row.room_id, "lair");
    assert!(!state.rooms.read().await.contains_key("crypt"));
}

#[tokio::test]
async fn mutations_before_subscribe_are_rejected() {
    let state = AppState::new();
    let mut alice = TestClient::new();

    let replies = alice.send(&state, &upsert_text("lair", json!({}))).await;
    let [ServerMsg::Error { message }] = replies.as_slice() else {
        panic!("expected an error, got {replies:?}");
    };
    assert!(message.contains("subscribe"), "unexpected message: {message}");
}

#[tokio::test]
async fn invalid_json_yields_an_error_reply() {
    let state = AppState::new();
    let mut alice = TestClient::new();

    let replies = alice.send(&state, "{not json").await;
    assert!(matches!(replies.as_slice(), [ServerMsg::Error { .. }]));
}

#[tokio::test]
async fn pings_fan_out_without_being_stored() {
    let state = AppState::new();
    let mut alice = TestClient::new();
    let mut bob = TestClient::new();
    alice.send(&state, &subscribe_text("lair")).await;
    bob.send(&state, &subscribe_text("lair")).await;

    let ping = json!({
        "type": "ping",
        "x": 3.5, "y": 2.0, "ts": 99,
        "from": "GM", "color": "", "kind": "operator"
    });
    alice.send(&state, &ping.to_string()).await;

    let ServerMsg::Ping(ping) = recv_broadcast(&mut bob.rx).await else {
        panic!("expected ping");
    };
    assert_eq!(ping.from, "GM");
    assert_no_broadcast(&mut alice.rx).await;

    // Late joiners never see it.
    let mut carol = TestClient::new();
    let replies = carol.send(&state, &subscribe_text("lair")).await;
    assert_eq!(replies, vec![ServerMsg::RowSnapshot { row: None }]);
}

#[tokio::test]
async fn presence_syncs_the_roster_to_everyone() {
    let state = AppState::new();
    let mut alice = TestClient::new();
    let mut bob = TestClient::new();
    alice.send(&state, &subscribe_text("lair")).await;
    bob.send(&state, &subscribe_text("lair")).await;

    let track = serde_json::to_string(&ClientMsg::PresenceTrack(Presence {
        role: Role::Viewer,
        name: "Bob".to_string(),
        color: "#38bdf8".to_string(),
        ts: 7,
    }))
    .unwrap();
    bob.send(&state, &track).await;

    for rx in [&mut alice.rx, &mut bob.rx] {
        let ServerMsg::PresenceSync { roster } = recv_broadcast(rx).await else {
            panic!("expected presence_sync");
        };
        assert_eq!(roster.len(), 1);
        assert_eq!(roster[0].name, "Bob");
    }
}

#[tokio::test]
async fn leaving_drops_presence_and_evicts_empty_rooms() {
    let state = AppState::new();
    let mut alice = TestClient::new();
    let mut bob = TestClient::new();
    alice.send(&state, &subscribe_text("lair")).await;
    bob.send(&state, &subscribe_text("lair")).await;

    let track = serde_json::to_string(&ClientMsg::PresenceTrack(Presence {
        role: Role::Viewer,
        name: "Bob".to_string(),
        color: "#38bdf8".to_string(),
        ts: 7,
    }))
    .unwrap();
    bob.send(&state, &track).await;
    recv_broadcast(&mut alice.rx).await;
    recv_broadcast(&mut bob.rx).await;

    leave_room(&state, "lair", bob.id).await;
    let ServerMsg::PresenceSync { roster } = recv_broadcast(&mut alice.rx).await else {
        panic!("expected presence_sync");
    };
    assert!(roster.is_empty());

    leave_room(&state, "lair", alice.id).await;
    assert!(!state.rooms.read().await.contains_key("lair"));
}

#[tokio::test]
async fn resubscribing_moves_the_client_between_rooms() {
    let state = AppState::new();
    let mut alice = TestClient::new();
    let mut bob = TestClient::new();
    alice.send(&state, &subscribe_text("lair")).await;
    bob.send(&state, &subscribe_text("lair")).await;

    bob.send(&state, &subscribe_text("crypt")).await;
    assert_eq!(bob.room.as_deref(), Some("crypt"));

    // Bob no longer hears the old room.
    alice.send(&state, &upsert_text("lair", json!({ "version": 3 }))).await;
    assert_no_broadcast(&mut bob.rx).await;
}

#[tokio::test]
async fn relay_round_trip_over_a_real_socket() {
    let state = AppState::new();
    let app = crate::app(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let url = format!("ws://{addr}/ws");
    let (mut alice, _) = tokio_tungstenite::connect_async(&url).await.unwrap();
    let (mut bob, _) = tokio_tungstenite::connect_async(&url).await.unwrap();

    alice.send(subscribe_text("lair").into()).await.unwrap();
    bob.send(subscribe_text("lair").into()).await.unwrap();
    for socket in [&mut alice, &mut bob] {
        let reply = timeout(Duration::from_secs(2), socket.next())
            .await
            .expect("snapshot timed out")
            .expect("socket closed")
            .unwrap();
        let msg: ServerMsg = serde_json::from_str(reply.to_text().unwrap()).unwrap();
        assert_eq!(msg, ServerMsg::RowSnapshot { row: None });
    }

    alice
        .send(upsert_text("lair", json!({ "version": 3 })).into())
        .await
        .unwrap();
    let reply = timeout(Duration::from_secs(2), bob.next())
        .await
        .expect("row_changed timed out")
        .expect("socket closed")
        .unwrap();
    let msg: ServerMsg = serde_json::from_str(reply.to_text().unwrap()).unwrap();
    let ServerMsg::RowChanged { row } = msg else {
        panic!("expected row_changed, got {msg:?}");
    };
    assert_eq!(row.room_id, "lair");
    assert_eq!(row.doc, json!({ "version": 3 }));
}
