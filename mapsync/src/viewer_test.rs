use map::camera::Camera;
use map::engine::MapEngine;
use map::render::ViewRole;
use serde_json::json;

use super::*;

fn doc_with_camera(x: f64, y: f64, zoom: f64) -> serde_json::Value {
    json!({
        "version": 3,
        "camera": { "x": x, "y": y, "zoom": zoom },
    })
}

fn row(room_id: &str, doc: serde_json::Value, updated_at: i64) -> RoomRow {
    RoomRow { room_id: room_id.to_string(), doc, updated_at }
}

#[test]
fn rows_coalesce_to_the_newest() {
    let mut sync = ViewerSync::new(false);
    assert_eq!(
        sync.handle(ServerMsg::RowChanged { row: row("lair", json!({ "rev": 1 }), 10) }),
        ViewerEvent::RowPending
    );
    assert_eq!(
        sync.handle(ServerMsg::RowChanged { row: row("lair", doc_with_camera(80.0, 0.0, 1.0), 20) }),
        ViewerEvent::RowPending
    );

    let mut engine = MapEngine::new(ViewRole::Viewer);
    assert!(sync.apply_pending(&mut engine));
    // The first row was superseded before application.
    assert!(!sync.has_pending());
    assert!(!sync.apply_pending(&mut engine));
}

#[test]
fn empty_snapshot_is_a_no_op() {
    let mut sync = ViewerSync::new(false);
    assert_eq!(sync.handle(ServerMsg::RowSnapshot { row: None }), ViewerEvent::None);
    assert!(!sync.has_pending());
}

#[test]
fn pings_pass_through_to_the_overlay() {
    let mut sync = ViewerSync::new(false);
    let ping = PingMessage {
        x: 3.5,
        y: 2.0,
        ts: 99,
        from: "Alice".to_string(),
        color: String::new(),
        kind: crate::wire::Role::Viewer,
    };
    assert_eq!(sync.handle(ServerMsg::Ping(ping.clone())), ViewerEvent::Ping(ping));
    assert!(!sync.has_pending());
}

#[test]
fn applying_a_row_keeps_the_local_camera() {
    let mut sync = ViewerSync::new(false);
    let mut engine = MapEngine::new(ViewRole::Viewer);
    engine.set_camera(Camera { x: 500.0, y: -200.0, zoom: 2.0 });

    sync.handle(ServerMsg::RowChanged { row: row("lair", doc_with_camera(0.0, 0.0, 1.0), 10) });
    assert!(sync.apply_pending(&mut engine));

    let camera = engine.camera();
    assert_eq!(camera.x, 500.0);
    assert_eq!(camera.y, -200.0);
    assert_eq!(camera.zoom, 2.0);
}

#[test]
fn malformed_rows_are_discarded() {
    let mut sync = ViewerSync::new(false);
    let mut engine = MapEngine::new(ViewRole::Viewer);
    sync.handle(ServerMsg::RowChanged { row: row("lair", json!("not an object"), 10) });
    assert!(!sync.apply_pending(&mut engine));
    assert!(!sync.has_pending());
}

#[test]
fn follow_animates_toward_the_remote_camera() {
    let mut sync = ViewerSync::new(true);
    let mut engine = MapEngine::new(ViewRole::Viewer);
    engine.set_camera(Camera { x: 0.0, y: 0.0, zoom: 1.0 });

    sync.handle(ServerMsg::RowChanged { row: row("lair", doc_with_camera(100.0, 0.0, 1.0), 10) });
    assert!(sync.apply_pending(&mut engine));

    // First frame pulls 22% of the way.
    assert!(sync.animate_camera(&mut engine));
    let camera = engine.camera();
    assert!((camera.x - 22.0).abs() < 1e-9);
    assert_eq!(camera.y, 0.0);

    // The pull converges and finally snaps exactly onto the target.
    let mut frames = 0;
    while sync.animate_camera(&mut engine) {
        frames += 1;
        assert!(frames < 200, "follow never settled");
    }
    let camera = engine.camera();
    assert_eq!(camera.x, 100.0);
    assert_eq!(camera.zoom, 1.0);
    assert!(!sync.animate_camera(&mut engine));
}

#[test]
fn follow_snaps_zoom_independently() {
    let mut follow = CameraFollow::default();
    follow.set_enabled(true);
    follow.set_target(Camera { x: 0.0, y: 0.0, zoom: 2.0 });

    let mut camera = Camera { x: 0.0, y: 0.0, zoom: 1.0 };
    let mut frames = 0;
    while follow.step(&mut camera) {
        frames += 1;
        assert!(frames < 200, "zoom follow never settled");
    }
    assert_eq!(camera.zoom, 2.0);
}

#[test]
fn local_gesture_breaks_follow() {
    let mut sync = ViewerSync::new(true);
    let mut engine = MapEngine::new(ViewRole::Viewer);

    sync.handle(ServerMsg::RowChanged { row: row("lair", doc_with_camera(100.0, 0.0, 1.0), 10) });
    assert!(sync.apply_pending(&mut engine));
    sync.follow.note_local_gesture();
    assert!(!sync.animate_camera(&mut engine));
    assert!(!sync.follow.is_enabled());

    // Later rows no longer retarget the camera.
    sync.handle(ServerMsg::RowChanged { row: row("lair", doc_with_camera(300.0, 0.0, 1.0), 20) });
    assert!(sync.apply_pending(&mut engine));
    assert!(!sync.animate_camera(&mut engine));
}
