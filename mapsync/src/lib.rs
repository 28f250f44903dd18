//! State replication between one operator and many viewers.
//!
//! ARCHITECTURE
//! ============
//! The replicated unit is a single row per room: the serialized scene
//! document (embedded image payloads stripped) plus a last-updated timestamp.
//! Replication is last-write-wins at row granularity; the operator is the
//! only writer by construction of the surrounding application.
//!
//! - [`wire`] defines the row, the ping/presence records, and the JSON
//!   envelope both directions speak.
//! - [`operator`] owns the dirty→push pipeline: a fine ticker coalesces dirty
//!   marks and pushes at most once per throttle window, always carrying the
//!   latest snapshot.
//! - [`viewer`] applies incoming rows (newest-wins coalescing) and animates
//!   the optional camera-follow.
//! - [`presence`] derives the online roster from raw presence records.
//!
//! Pings and presence travel on the broadcast channel only; they are never
//! part of the row.

pub mod operator;
pub mod presence;
pub mod viewer;
pub mod wire;
