//! Ephemeral presence: who is in the room, where their cursor is, what they
//! have selected. Never persisted, never part of the action log.

use std::collections::{BTreeMap, BTreeSet};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use shared::{ObjectId, Point};

/// Per-client presence fields, last write wins per field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct PresenceState {
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub accent_icon: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor: Option<Point>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub selection: BTreeSet<ObjectId>,
}

/// One connected client's presence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresenceRecord {
    pub client_id: u64,
    pub state: PresenceState,
}

/// Peer presence, keyed by client id
#[derive(Debug, Default)]
pub struct PresenceMap {
    records: BTreeMap<u64, PresenceState>,
}

impl PresenceMap {
    /// Replace a peer's record (last write wins)
    pub fn apply(&mut self, client_id: u64, state: PresenceState) {
        self.records.insert(client_id, state);
    }

    /// Drop a peer on disconnect
    pub fn remove(&mut self, client_id: u64) -> bool {
        self.records.remove(&client_id).is_some()
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Derive the snapshot list consumers see
    pub fn snapshot(&self) -> Vec<PresenceRecord> {
        self.records
            .iter()
            .map(|(client_id, state)| PresenceRecord {
                client_id: *client_id,
                state: state.clone(),
            })
            .collect()
    }
}

/// Bounds cursor broadcast volume to animation-frame cadence
#[derive(Debug)]
pub struct PresenceThrottle {
    interval: Duration,
    last: Option<Instant>,
}

impl PresenceThrottle {
    /// One broadcast per ~16 ms, the cadence of a 60 Hz frame
    pub fn animation_frame() -> Self {
        Self::with_interval(Duration::from_millis(16))
    }

    pub fn with_interval(interval: Duration) -> Self {
        Self {
            interval,
            last: None,
        }
    }

    /// Whether a broadcast may go out now; marks the slot when it may
    pub fn ready(&mut self, now: Instant) -> bool {
        match self.last {
            Some(last) if now.duration_since(last) < self.interval => false,
            _ => {
                self.last = Some(now);
                true
            }
        }
    }
}
