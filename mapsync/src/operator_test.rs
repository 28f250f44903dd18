use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use serde_json::json;

use super::*;

#[test]
fn throttle_coalesces_marks_into_one_push() {
    let mut throttle = PushThrottle::new();
    throttle.mark_dirty(0);
    throttle.mark_dirty(10);
    assert!(throttle.should_push(10, 120));
    // Both marks were consumed by the single push.
    assert!(!throttle.should_push(20, 120));
}

#[test]
fn throttle_enforces_the_minimum_interval() {
    let mut throttle = PushThrottle::new();
    throttle.mark_dirty(0);
    assert!(throttle.should_push(0, 120));

    throttle.mark_dirty(50);
    assert!(!throttle.should_push(60, 120));
    assert!(!throttle.should_push(119, 120));
    assert!(throttle.should_push(120, 120));
}

#[test]
fn throttle_stays_quiet_without_marks() {
    let mut throttle = PushThrottle::new();
    assert!(!throttle.should_push(1_000, 120));
    assert!(!throttle.is_dirty());
}

async fn settle() {
    for _ in 0..8 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test(start_paused = true)]
async fn pushes_once_per_window_with_the_latest_snapshot() {
    let (handle, dirty_rx) = dirty_channel();
    let (out_tx, mut out_rx) = tokio::sync::mpsc::channel(16);
    let rev = Arc::new(AtomicI64::new(0));

    let snap_rev = Arc::clone(&rev);
    let task = tokio::spawn(OperatorSync::new("lair", SyncConfig::default()).run(
        dirty_rx,
        move || json!({ "rev": snap_rev.load(Ordering::SeqCst) }),
        out_tx,
    ));

    // First mutation pushes promptly.
    rev.store(1, Ordering::SeqCst);
    handle.mark_dirty();
    settle().await;
    let ClientMsg::RowUpsert { row } = out_rx.try_recv().expect("first push") else {
        panic!("expected row upsert");
    };
    assert_eq!(row.room_id, "lair");
    assert_eq!(row.doc["rev"], json!(1));

    // Two mutations inside the throttle window coalesce into one push that
    // carries the latest state.
    rev.store(2, Ordering::SeqCst);
    handle.mark_dirty();
    rev.store(3, Ordering::SeqCst);
    handle.mark_dirty();
    tokio::time::advance(Duration::from_millis(61)).await;
    settle().await;
    assert!(out_rx.try_recv().is_err(), "window still closed");

    tokio::time::advance(Duration::from_millis(61)).await;
    settle().await;
    let ClientMsg::RowUpsert { row } = out_rx.try_recv().expect("coalesced push") else {
        panic!("expected row upsert");
    };
    assert_eq!(row.doc["rev"], json!(3));
    assert!(out_rx.try_recv().is_err(), "exactly one push");

    drop(handle);
    task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn shutdown_flushes_a_pending_push() {
    let (handle, dirty_rx) = dirty_channel();
    let (out_tx, mut out_rx) = tokio::sync::mpsc::channel(16);

    let task = tokio::spawn(OperatorSync::new("lair", SyncConfig::default()).run(
        dirty_rx,
        || json!({ "rev": 7 }),
        out_tx,
    ));

    // Drain the prompt first push so a second mark is still throttled.
    handle.mark_dirty();
    settle().await;
    assert!(out_rx.try_recv().is_ok());

    handle.mark_dirty();
    drop(handle);
    task.await.unwrap();

    let ClientMsg::RowUpsert { row } = out_rx.try_recv().expect("flush on shutdown") else {
        panic!("expected row upsert");
    };
    assert_eq!(row.doc["rev"], json!(7));
}

#[tokio::test(start_paused = true)]
async fn pushed_rows_are_stripped_of_embedded_payloads() {
    let (handle, dirty_rx) = dirty_channel();
    let (out_tx, mut out_rx) = tokio::sync::mpsc::channel(16);

    let task = tokio::spawn(OperatorSync::new("lair", SyncConfig::default()).run(
        dirty_rx,
        || json!({ "background": { "data": "aGVsbG8=", "url": "https://maps.example/a.png" } }),
        out_tx,
    ));

    handle.mark_dirty();
    settle().await;
    let ClientMsg::RowUpsert { row } = out_rx.try_recv().expect("push") else {
        panic!("expected row upsert");
    };
    assert!(row.doc["background"].get("data").is_none());
    assert_eq!(row.doc["background"]["url"], json!("https://maps.example/a.png"));

    drop(handle);
    task.await.unwrap();
}
