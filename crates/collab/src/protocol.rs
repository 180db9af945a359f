//! Wire messages between a session and the sync endpoint.
//!
//! JSON text frames over the websocket, tagged like every other enum in the
//! system. Document traffic (entries, snapshot) and the presence sub-channel
//! share the socket but never mix semantics.

use serde::{Deserialize, Serialize};

use crate::log::LogEntry;
use crate::presence::{PresenceRecord, PresenceState};
use crate::snapshot::BaseSnapshot;

/// Session → endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// One atomic committed batch, already applied at the origin
    Append { entries: Vec<LogEntry> },
    /// Offer of a base snapshot for an empty room; first writer wins
    PublishSnapshot { snapshot: BaseSnapshot },
    /// Full local presence state, last write wins
    Presence { state: PresenceState },
}

/// Endpoint → session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Sent once per connection; carries the whole room document
    Welcome {
        client_id: u64,
        snapshot: Option<BaseSnapshot>,
        entries: Vec<LogEntry>,
        peers: Vec<PresenceRecord>,
    },
    /// The canonical base snapshot after the first write won
    Snapshot { snapshot: BaseSnapshot },
    /// Newly integrated entries, relayed to every session in the room
    Entries { entries: Vec<LogEntry> },
    /// A peer's presence changed
    Presence { client_id: u64, state: PresenceState },
    /// A peer disconnected; its presence record is gone
    PeerLeft { client_id: u64 },
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::SceneAction;

    #[test]
    fn test_client_message_tags() {
        let msg = ClientMessage::Append {
            entries: vec![LogEntry {
                seq: 1,
                origin: 2,
                action: SceneAction::Remove { ids: vec![3] },
            }],
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains(r#""type":"append""#));
        let back: ClientMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(back, msg);
    }

    #[test]
    fn test_welcome_roundtrip() {
        let msg = ServerMessage::Welcome {
            client_id: 7,
            snapshot: None,
            entries: vec![],
            peers: vec![PresenceRecord {
                client_id: 2,
                state: PresenceState {
                    display_name: "ada".to_string(),
                    ..Default::default()
                },
            }],
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains(r#""type":"welcome""#));
        let back: ServerMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(back, msg);
    }

    #[test]
    fn test_unknown_message_type_fails() {
        let result: Result<ServerMessage, _> = serde_json::from_str(r#"{"type":"gossip"}"#);
        assert!(result.is_err());
    }
}
