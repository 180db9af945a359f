//! Session configuration and shareable room identity.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Default sync endpoint for local development
pub const DEFAULT_ENDPOINT: &str = "ws://127.0.0.1:3001";

/// Opaque token identifying a room, shareable as a link fragment
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomToken(String);

impl RoomToken {
    /// Fresh token, created when sharing is enabled
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Parse a `#/collab/<token>` URL fragment
    pub fn from_fragment(fragment: &str) -> Option<Self> {
        let token = fragment
            .trim_start_matches('#')
            .strip_prefix("/collab/")?;
        if token.is_empty() {
            return None;
        }
        Some(Self(token.to_string()))
    }

    /// Fragment to append to a shared link
    pub fn share_fragment(&self) -> String {
        format!("#/collab/{}", self.0)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How a session reaches the sync endpoint
#[derive(Debug, Clone, PartialEq)]
pub struct CollabConfig {
    /// Base websocket endpoint, e.g. `ws://127.0.0.1:3001`
    pub endpoint: String,
    pub room: RoomToken,
}

impl CollabConfig {
    pub fn new(room: RoomToken) -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            room,
        }
    }

    /// A config for a freshly generated room
    pub fn fresh_room() -> Self {
        Self::new(RoomToken::generate())
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Full websocket URL for this room
    pub fn ws_url(&self) -> String {
        format!("{}/ws/{}", self.endpoint.trim_end_matches('/'), self.room)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fragment_roundtrip() {
        let token = RoomToken::generate();
        let fragment = token.share_fragment();
        assert_eq!(RoomToken::from_fragment(&fragment), Some(token));
    }

    #[test]
    fn test_fragment_rejects_garbage() {
        assert_eq!(RoomToken::from_fragment("#/other/abc"), None);
        assert_eq!(RoomToken::from_fragment("#/collab/"), None);
        assert_eq!(RoomToken::from_fragment(""), None);
    }

    #[test]
    fn test_ws_url_joins_cleanly() {
        let config = CollabConfig::new(RoomToken::new("r1")).with_endpoint("ws://host:9/");
        assert_eq!(config.ws_url(), "ws://host:9/ws/r1");
    }

    #[test]
    fn test_generated_tokens_differ() {
        assert_ne!(RoomToken::generate(), RoomToken::generate());
    }
}
