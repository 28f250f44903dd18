//! Operator side: the dirty→push pipeline.
//!
//! Local mutations post on a dirty channel; a fine-grained ticker folds them
//! into a single pending flag and pushes the latest snapshot at most once per
//! throttle window. Continuous drag gestures therefore produce a steady
//! stream of coalesced row updates instead of one update per mutation or one
//! at gesture end. Push failures are logged and covered by the next tick.

#[cfg(test)]
#[path = "operator_test.rs"]
mod operator_test;

use std::time::Duration;

use serde_json::Value;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};

use crate::wire::{self, strip_embedded_background, ClientMsg, RoomRow};

/// Replication timing knobs.
#[derive(Debug, Clone, Copy)]
pub struct SyncConfig {
    /// How often the pipeline checks for pending work. Finer than the
    /// throttle so a push lands soon after the window opens.
    pub tick: Duration,
    /// Minimum time between two row pushes.
    pub min_push_interval: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self { tick: Duration::from_millis(60), min_push_interval: Duration::from_millis(120) }
    }
}

/// Pure throttle core: folds dirty marks and decides when a push is due.
#[derive(Debug, Clone, Default)]
pub struct PushThrottle {
    dirty_at: Option<i64>,
    last_push_at: Option<i64>,
}

impl PushThrottle {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a local mutation. Repeated marks before the next push coalesce.
    pub fn mark_dirty(&mut self, now_ms: i64) {
        self.dirty_at = Some(now_ms);
    }

    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.dirty_at.is_some()
    }

    /// Whether a push is due at `now_ms`. Consumes the dirty mark and stamps
    /// the push time when it returns true.
    pub fn should_push(&mut self, now_ms: i64, min_interval_ms: i64) -> bool {
        if self.dirty_at.is_none() {
            return false;
        }
        if let Some(last) = self.last_push_at {
            if now_ms - last < min_interval_ms {
                return false;
            }
        }
        self.dirty_at = None;
        self.last_push_at = Some(now_ms);
        true
    }
}

/// Cheap handle the engine host uses to signal "the document changed".
#[derive(Debug, Clone)]
pub struct DirtyHandle {
    tx: mpsc::Sender<()>,
}

impl DirtyHandle {
    /// Best-effort: a full channel already guarantees a pending wakeup.
    pub fn mark_dirty(&self) {
        let _ = self.tx.try_send(());
    }
}

/// Create the dirty channel: the handle for the engine host, the receiver
/// for [`OperatorSync::run`].
#[must_use]
pub fn dirty_channel() -> (DirtyHandle, mpsc::Receiver<()>) {
    let (tx, rx) = mpsc::channel(8);
    (DirtyHandle { tx }, rx)
}

/// The operator push task for one room.
pub struct OperatorSync {
    room_id: String,
    config: SyncConfig,
}

impl OperatorSync {
    #[must_use]
    pub fn new(room_id: impl Into<String>, config: SyncConfig) -> Self {
        Self { room_id: room_id.into(), config }
    }

    /// Run until the dirty channel closes. `snapshot` serializes the current
    /// document; it is called only when a push is actually due, so the row
    /// always carries the latest state. A final pending push is flushed on
    /// shutdown.
    pub async fn run<F>(
        self,
        mut dirty_rx: mpsc::Receiver<()>,
        mut snapshot: F,
        out: mpsc::Sender<ClientMsg>,
    ) where
        F: FnMut() -> Value + Send,
    {
        let min_interval_ms = i64::try_from(self.config.min_push_interval.as_millis()).unwrap_or(0);
        let start = Instant::now();
        let mut throttle = PushThrottle::new();
        let mut ticker = tokio::time::interval(self.config.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                msg = dirty_rx.recv() => {
                    let now = elapsed_ms(start);
                    match msg {
                        Some(()) => throttle.mark_dirty(now),
                        None => {
                            if throttle.is_dirty() {
                                self.push(&mut snapshot, &out).await;
                            }
                            return;
                        }
                    }
                }
            }
            if throttle.should_push(elapsed_ms(start), min_interval_ms) {
                self.push(&mut snapshot, &out).await;
            }
        }
    }

    async fn push<F>(&self, snapshot: &mut F, out: &mpsc::Sender<ClientMsg>)
    where
        F: FnMut() -> Value + Send,
    {
        let mut doc = snapshot();
        strip_embedded_background(&mut doc);
        let row = RoomRow {
            room_id: self.room_id.clone(),
            doc,
            updated_at: wire::now_ms(),
        };
        if let Err(e) = out.send(ClientMsg::RowUpsert { row }).await {
            tracing::warn!(room = %self.room_id, error = %e, "row push failed");
        }
    }
}

fn elapsed_ms(start: Instant) -> i64 {
    i64::try_from(start.elapsed().as_millis()).unwrap_or(i64::MAX)
}
