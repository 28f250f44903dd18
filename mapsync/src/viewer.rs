//! Viewer side: row application and camera follow.
//!
//! Remote rows replace the local document wholesale. Rapid successive rows
//! coalesce: only the newest pending row is applied per frame. The optional
//! camera follow animates the viewer's camera toward the operator's with an
//! exponential pull each frame and snaps once the remaining delta is
//! negligible; any local gesture breaks follow.

#[cfg(test)]
#[path = "viewer_test.rs"]
mod viewer_test;

use map::camera::Camera;
use map::engine::MapEngine;

use crate::wire::{PingMessage, RoomRow, ServerMsg};

/// Per-frame exponential pull toward the follow target.
const FOLLOW_LERP: f64 = 0.22;
/// Snap thresholds: world px for position, absolute for zoom.
const FOLLOW_SNAP_POS: f64 = 0.01;
const FOLLOW_SNAP_ZOOM: f64 = 0.001;

/// Smooth camera-follow state.
#[derive(Debug, Clone, Default)]
pub struct CameraFollow {
    enabled: bool,
    target: Option<Camera>,
}

impl CameraFollow {
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        if !enabled {
            self.target = None;
        }
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// A local pan/zoom/drag: stop following, the viewer took over.
    pub fn note_local_gesture(&mut self) {
        self.enabled = false;
        self.target = None;
    }

    pub fn set_target(&mut self, camera: Camera) {
        if self.enabled {
            self.target = Some(camera);
        }
    }

    /// Pull `camera` one frame toward the target. Returns `true` while the
    /// animation still has visible work left.
    pub fn step(&mut self, camera: &mut Camera) -> bool {
        let Some(target) = self.target else {
            return false;
        };
        let lerp = |a: f64, b: f64| a + (b - a) * FOLLOW_LERP;
        camera.x = lerp(camera.x, target.x);
        camera.y = lerp(camera.y, target.y);
        camera.zoom = lerp(camera.zoom, target.zoom);

        if (camera.x - target.x).abs() < FOLLOW_SNAP_POS
            && (camera.y - target.y).abs() < FOLLOW_SNAP_POS
            && (camera.zoom - target.zoom).abs() < FOLLOW_SNAP_ZOOM
        {
            *camera = target;
            self.target = None;
        }
        true
    }
}

/// What a server message means for the host, beyond internal bookkeeping.
#[derive(Debug, Clone, PartialEq)]
pub enum ViewerEvent {
    /// A newer row is pending; call [`ViewerSync::apply_pending`] next frame.
    RowPending,
    /// A ping to display via the overlay.
    Ping(PingMessage),
    /// Presence changed; re-derive the roster.
    Presence,
    None,
}

/// Viewer-side replication state.
#[derive(Debug, Default)]
pub struct ViewerSync {
    pending: Option<RoomRow>,
    pub follow: CameraFollow,
}

impl ViewerSync {
    #[must_use]
    pub fn new(follow_camera: bool) -> Self {
        let mut follow = CameraFollow::default();
        follow.set_enabled(follow_camera);
        Self { pending: None, follow }
    }

    /// Fold one server message. Rows coalesce so only the newest survives
    /// until the next [`ViewerSync::apply_pending`].
    pub fn handle(&mut self, msg: ServerMsg) -> ViewerEvent {
        match msg {
            ServerMsg::RowSnapshot { row: Some(row) } | ServerMsg::RowChanged { row } => {
                self.pending = Some(row);
                ViewerEvent::RowPending
            }
            ServerMsg::RowSnapshot { row: None } => ViewerEvent::None,
            ServerMsg::Ping(ping) => ViewerEvent::Ping(ping),
            ServerMsg::PresenceSync { .. } => ViewerEvent::Presence,
            ServerMsg::Error { message } => {
                tracing::warn!(error = %message, "server reported an error");
                ViewerEvent::None
            }
        }
    }

    /// Apply the newest pending row, if any. The local camera survives the
    /// wholesale document replacement: with follow on it becomes the
    /// animation start and the remote camera the target, with follow off it
    /// is simply kept. Returns `true` when a row was applied.
    pub fn apply_pending(&mut self, engine: &mut MapEngine) -> bool {
        let Some(row) = self.pending.take() else {
            return false;
        };
        let local_camera = engine.camera();
        if !engine.restore(&row.doc) {
            tracing::warn!(room = %row.room_id, "discarding malformed remote document");
            return false;
        }
        let remote_camera = engine.camera();
        engine.set_camera(local_camera);
        self.follow.set_target(remote_camera);
        true
    }

    /// Advance the follow animation one frame. Returns `true` while moving.
    pub fn animate_camera(&mut self, engine: &mut MapEngine) -> bool {
        let mut camera = engine.camera();
        if self.follow.step(&mut camera) {
            engine.set_camera(camera);
            return true;
        }
        false
    }

    #[must_use]
    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }
}
