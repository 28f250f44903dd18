//! Roster derivation from raw presence records.

#[cfg(test)]
#[path = "presence_test.rs"]
mod presence_test;

use crate::wire::{Presence, Role};

/// Viewers currently online, deduplicated and ordered for display.
///
/// The same person can hold several connections (a reconnect racing the old
/// socket's teardown, or two tabs); entries collapse by name and color so the
/// roster shows people, not sockets. Operators never appear: the roster is
/// the operator's view of who is watching.
#[must_use]
pub fn viewer_roster(records: &[Presence]) -> Vec<Presence> {
    let mut roster: Vec<Presence> = Vec::new();
    for record in records {
        if record.role != Role::Viewer {
            continue;
        }
        if roster.iter().any(|p| p.name == record.name && p.color == record.color) {
            continue;
        }
        roster.push(record.clone());
    }
    roster.sort_by(|a, b| a.name.cmp(&b.name));
    roster
}
