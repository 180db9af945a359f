//! Room-side document state: the retained log, the base snapshot and the
//! presence table for one room.
//!
//! The sync server owns one of these per room; tests drive it in-process to
//! exercise the whole replication protocol without a socket. It is an
//! explicit context handed to whoever pumps the room, not a global.

use std::collections::BTreeMap;

use crate::log::{ActionLog, Integration, LogEntry};
use crate::presence::{PresenceRecord, PresenceState};
use crate::protocol::{ClientMessage, ServerMessage};
use crate::snapshot::BaseSnapshot;

#[derive(Debug, Default)]
pub struct RoomState {
    next_client_id: u64,
    snapshot: Option<BaseSnapshot>,
    log: ActionLog,
    presence: BTreeMap<u64, PresenceState>,
}

impl RoomState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Admit a client: assign its stable id and build its Welcome
    pub fn join(&mut self) -> (u64, ServerMessage) {
        self.next_client_id += 1;
        let client_id = self.next_client_id;
        let welcome = ServerMessage::Welcome {
            client_id,
            snapshot: self.snapshot.clone(),
            entries: self.log.entries().to_vec(),
            peers: self
                .presence
                .iter()
                .map(|(client_id, state)| PresenceRecord {
                    client_id: *client_id,
                    state: state.clone(),
                })
                .collect(),
        };
        (client_id, welcome)
    }

    /// Handle one client message; returns what to broadcast to the room
    pub fn handle(&mut self, client_id: u64, msg: ClientMessage) -> Vec<ServerMessage> {
        match msg {
            ClientMessage::Append { entries } => {
                let fresh: Vec<LogEntry> = entries
                    .into_iter()
                    .filter(|e| self.log.integrate(e.clone()) != Integration::Duplicate)
                    .collect();
                if fresh.is_empty() {
                    Vec::new()
                } else {
                    vec![ServerMessage::Entries { entries: fresh }]
                }
            }
            ClientMessage::PublishSnapshot { snapshot } => {
                // First writer wins; everyone hears the canonical one
                let canonical = self.snapshot.get_or_insert(snapshot).clone();
                vec![ServerMessage::Snapshot {
                    snapshot: canonical,
                }]
            }
            ClientMessage::Presence { state } => {
                self.presence.insert(client_id, state.clone());
                vec![ServerMessage::Presence { client_id, state }]
            }
        }
    }

    /// Drop a client's presence on disconnect
    pub fn leave(&mut self, client_id: u64) -> Vec<ServerMessage> {
        self.presence.remove(&client_id);
        vec![ServerMessage::PeerLeft { client_id }]
    }

    pub fn client_ids_assigned(&self) -> u64 {
        self.next_client_id
    }

    pub fn entry_count(&self) -> usize {
        self.log.len()
    }

    pub fn presence_count(&self) -> usize {
        self.presence.len()
    }

    pub fn has_snapshot(&self) -> bool {
        self.snapshot.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{Scene, SceneAction};

    #[test]
    fn test_join_assigns_distinct_stable_ids() {
        let mut room = RoomState::new();
        let (a, _) = room.join();
        let (b, _) = room.join();
        assert_ne!(a, b);
        assert_eq!(room.client_ids_assigned(), 2);
    }

    #[test]
    fn test_first_snapshot_writer_wins() {
        let mut room = RoomState::new();
        let first = BaseSnapshot::capture(&Scene::default()).unwrap();
        let mut other_scene = Scene::default();
        other_scene.next_id = 99;
        let second = BaseSnapshot::capture(&other_scene).unwrap();

        let out = room.handle(1, ClientMessage::PublishSnapshot { snapshot: first.clone() });
        assert_eq!(out, vec![ServerMessage::Snapshot { snapshot: first.clone() }]);

        // The loser hears the canonical snapshot, not its own
        let out = room.handle(2, ClientMessage::PublishSnapshot { snapshot: second });
        assert_eq!(out, vec![ServerMessage::Snapshot { snapshot: first }]);
    }

    #[test]
    fn test_duplicate_appends_are_not_rebroadcast() {
        let mut room = RoomState::new();
        let entry = LogEntry {
            seq: 1,
            origin: 1,
            action: SceneAction::Remove { ids: vec![1] },
        };
        let out = room.handle(1, ClientMessage::Append { entries: vec![entry.clone()] });
        assert_eq!(out.len(), 1);
        let out = room.handle(1, ClientMessage::Append { entries: vec![entry] });
        assert!(out.is_empty());
        assert_eq!(room.entry_count(), 1);
    }

    #[test]
    fn test_welcome_carries_retained_document() {
        let mut room = RoomState::new();
        let snap = BaseSnapshot::capture(&Scene::default()).unwrap();
        room.handle(1, ClientMessage::PublishSnapshot { snapshot: snap.clone() });
        room.handle(
            1,
            ClientMessage::Append {
                entries: vec![LogEntry {
                    seq: 1,
                    origin: 1,
                    action: SceneAction::Remove { ids: vec![9] },
                }],
            },
        );
        room.handle(1, ClientMessage::Presence { state: PresenceState::default() });

        let (_, welcome) = room.join();
        match welcome {
            ServerMessage::Welcome {
                snapshot,
                entries,
                peers,
                ..
            } => {
                assert_eq!(snapshot, Some(snap));
                assert_eq!(entries.len(), 1);
                assert_eq!(peers.len(), 1);
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn test_leave_garbage_collects_presence() {
        let mut room = RoomState::new();
        room.handle(4, ClientMessage::Presence { state: PresenceState::default() });
        assert_eq!(room.presence_count(), 1);
        let out = room.leave(4);
        assert_eq!(out, vec![ServerMessage::PeerLeft { client_id: 4 }]);
        assert_eq!(room.presence_count(), 0);
    }
}
