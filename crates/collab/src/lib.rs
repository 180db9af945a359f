//! Collaborative editing engine for the shared scene document.
//!
//! Several independent sessions edit one scene concurrently and converge to
//! the same state: every committed edit is appended to a replicated,
//! order-converging action log and folded through the pure reducer on every
//! replica. Undo/redo stays local to the session that issued the edit;
//! presence (cursor, selection, identity) travels on a separate ephemeral
//! channel and never enters document history.

pub mod config;
pub mod connector;
pub mod controller;
pub mod diff;
pub mod history;
pub mod ids;
pub mod log;
pub mod presence;
pub mod protocol;
pub mod room;
pub mod session;
pub mod snapshot;

pub use config::{CollabConfig, RoomToken};
pub use controller::{SessionController, SessionHandle};
pub use log::{ActionLog, LogEntry};
pub use presence::{PresenceRecord, PresenceState};
pub use session::{Session, SessionEvent, SyncStatus};
pub use snapshot::BaseSnapshot;

/// Common result type for collaboration operations
pub type Result<T> = std::result::Result<T, CollabError>;

/// Errors at the collaboration boundary; nothing reducer-side is fallible
#[derive(Debug, thiserror::Error)]
pub enum CollabError {
    #[error("snapshot decode failed: {0}")]
    SnapshotDecode(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
