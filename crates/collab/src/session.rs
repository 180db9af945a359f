//! Session core: dispatch wrapper, log replication, bootstrap.
//!
//! Synchronous and IO-free so it can be driven by synthetic events in
//! tests; the async controller feeds it transport messages and drains its
//! outbox. The dispatch wrapper fills in what the UI leaves implicit:
//! pre-assigned object ids, the `next_id` hint, and materialized step
//! payloads.

use std::collections::{BTreeSet, HashMap};
use std::time::Instant;

use shared::{EditorState, ObjectId, Point, Scene, SceneAction, SceneObject, SceneStep, UNASSIGNED_ID};

use crate::history::UndoRedoBridge;
use crate::ids::IdAllocator;
use crate::log::{ActionLog, Integration, LogEntry};
use crate::presence::{PresenceMap, PresenceRecord, PresenceState, PresenceThrottle};
use crate::protocol::{ClientMessage, ServerMessage};
use crate::snapshot::BaseSnapshot;

/// Connection lifecycle of one replica
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncStatus {
    #[default]
    Disconnected,
    Connecting,
    Synced,
}

/// Typed notifications to the host UI
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Connected(bool),
    State(EditorState),
    Presence(Vec<PresenceRecord>),
    History {
        undo_possible: bool,
        redo_possible: bool,
    },
}

/// One replica of the shared scene
pub struct Session {
    status: SyncStatus,
    client_id: Option<u64>,
    allocator: IdAllocator,
    log: ActionLog,
    base: Option<BaseSnapshot>,
    base_scene: Option<Scene>,
    history: UndoRedoBridge,
    peers: PresenceMap,
    local_presence: PresenceState,
    cursor_throttle: PresenceThrottle,
    cursor_dirty: bool,
    /// Locally appended entries not yet seen echoed back
    unacked: Vec<LogEntry>,
    outbox: Vec<ClientMessage>,
    events: Vec<SessionEvent>,
}

impl Session {
    pub fn new() -> Self {
        Self::with_state(EditorState::default())
    }

    pub fn with_state(state: EditorState) -> Self {
        Self {
            status: SyncStatus::Disconnected,
            client_id: None,
            allocator: IdAllocator::solo(),
            log: ActionLog::new(),
            base: None,
            base_scene: None,
            history: UndoRedoBridge::new(state),
            peers: PresenceMap::default(),
            local_presence: PresenceState::default(),
            cursor_throttle: PresenceThrottle::animation_frame(),
            cursor_dirty: false,
            unacked: Vec::new(),
            outbox: Vec::new(),
            events: Vec::new(),
        }
    }

    // ── Host-facing state ─────────────────────────────────────

    pub fn status(&self) -> SyncStatus {
        self.status
    }

    pub fn connected(&self) -> bool {
        self.status == SyncStatus::Synced
    }

    pub fn client_id(&self) -> Option<u64> {
        self.client_id
    }

    /// Live editor state, remote and uncommitted edits included
    pub fn state(&self) -> &EditorState {
        self.history.state()
    }

    /// `[undo_possible, redo_possible]`
    pub fn history_flags(&self) -> [bool; 2] {
        [self.history.can_undo(), self.history.can_redo()]
    }

    pub fn presence(&self) -> Vec<PresenceRecord> {
        self.peers.snapshot()
    }

    pub fn take_outbox(&mut self) -> Vec<ClientMessage> {
        std::mem::take(&mut self.outbox)
    }

    pub fn take_events(&mut self) -> Vec<SessionEvent> {
        std::mem::take(&mut self.events)
    }

    // ── Dispatch ──────────────────────────────────────────────

    /// Apply one action. Non-history actions land in the transient layer
    /// immediately; history controls route to the undo/redo bridge and are
    /// never replicated themselves.
    pub fn dispatch(&mut self, action: SceneAction) {
        match action {
            SceneAction::Undo => {
                let forward = self.history.undo();
                if !forward.is_empty() {
                    self.replicate(forward);
                }
                self.emit_state();
                self.emit_history();
            }
            SceneAction::Redo => {
                let forward = self.history.redo();
                if !forward.is_empty() {
                    self.replicate(forward);
                }
                self.emit_state();
                self.emit_history();
            }
            SceneAction::Commit => {
                let batch = self.history.commit();
                if !batch.is_empty() {
                    self.replicate(batch);
                    self.emit_history();
                }
            }
            SceneAction::Rollback => {
                self.history.rollback();
                self.emit_state();
            }
            SceneAction::Reset => {
                self.history.reset();
                self.unacked.clear();
                self.emit_state();
                self.emit_history();
            }
            other => {
                if let Some(prepared) = self.prepare(other) {
                    self.history.apply_transient(&prepared);
                    self.emit_state();
                }
            }
        }
    }

    /// Stamp and queue a committed batch as one atomic delta
    fn replicate(&mut self, actions: Vec<SceneAction>) {
        let Some(client_id) = self.client_id else {
            return; // solo: nothing to replicate
        };
        let mut entries = Vec::with_capacity(actions.len());
        for action in actions {
            entries.push(self.log.append_local(client_id, action));
        }
        self.unacked.extend(entries.iter().cloned());
        if self.status == SyncStatus::Synced {
            self.outbox.push(ClientMessage::Append { entries });
        }
    }

    /// Fill in implicit fields before an action is applied or replicated
    fn prepare(&mut self, action: SceneAction) -> Option<SceneAction> {
        match action {
            SceneAction::Add { objects, .. } => {
                let mut prepared: Vec<SceneObject> = Vec::with_capacity(objects.len());
                for mut obj in objects {
                    if obj.id() == UNASSIGNED_ID {
                        let id = self.allocator.allocate(&self.history.state().scene);
                        obj.set_id(id);
                    } else if self.history.state().scene.contains_id(obj.id())
                        || prepared.iter().any(|p| p.id() == obj.id())
                    {
                        tracing::error!(id = obj.id(), "id collision on add, skipping object");
                        continue;
                    }
                    prepared.push(obj);
                }
                if prepared.is_empty() {
                    return None;
                }
                let max_id = prepared.iter().map(|o| o.id()).max().unwrap_or(0);
                let next_id = self.history.state().scene.next_id.max(max_id + 1);
                Some(SceneAction::Add {
                    objects: prepared,
                    next_id,
                })
            }
            SceneAction::AddStep {
                after,
                objects,
                next_id,
            } => {
                if !objects.is_empty() {
                    // Already materialized (replayed or host-built); trust it
                    return Some(SceneAction::AddStep {
                        after,
                        objects,
                        next_id,
                    });
                }
                // Duplicate the source step under fresh ids, keeping tether
                // links pointing at the copies
                let scene = self.history.state().scene.clone();
                let source = after.min(scene.steps.len().saturating_sub(1));
                let mut map: HashMap<ObjectId, ObjectId> = HashMap::new();
                let mut clones: Vec<SceneObject> = Vec::new();
                for obj in &scene.steps[source].objects {
                    let new_id = self.allocator.allocate(&scene);
                    map.insert(obj.id(), new_id);
                    let mut clone = obj.clone();
                    clone.set_id(new_id);
                    clones.push(clone);
                }
                for clone in &mut clones {
                    clone.remap_tether_refs(&map);
                }
                let max_id = clones.iter().map(|o| o.id()).max().unwrap_or(0);
                let next_id = scene.next_id.max(max_id + 1);
                Some(SceneAction::AddStep {
                    after,
                    objects: clones,
                    next_id,
                })
            }
            other => Some(other),
        }
    }

    // ── Transport lifecycle ───────────────────────────────────

    pub fn begin_connecting(&mut self) {
        if self.status == SyncStatus::Disconnected {
            self.status = SyncStatus::Connecting;
        }
    }

    /// The socket dropped; the connector will retry. Only the connection
    /// flag surfaces to the host.
    pub fn transport_down(&mut self) {
        if self.status == SyncStatus::Disconnected {
            return;
        }
        let was_synced = self.status == SyncStatus::Synced;
        self.status = SyncStatus::Connecting;
        self.peers.clear();
        if was_synced {
            self.events.push(SessionEvent::Connected(false));
            self.emit_presence();
        }
    }

    /// Leave the room for good; the document stays editable solo
    pub fn leave(&mut self) {
        let was_synced = self.status == SyncStatus::Synced;
        self.status = SyncStatus::Disconnected;
        self.client_id = None;
        self.allocator = IdAllocator::solo();
        self.log.clear();
        self.base = None;
        self.base_scene = None;
        self.unacked.clear();
        self.peers.clear();
        if was_synced {
            self.events.push(SessionEvent::Connected(false));
            self.emit_presence();
        }
    }

    // ── Server messages ───────────────────────────────────────

    pub fn handle_message(&mut self, msg: ServerMessage) {
        match msg {
            ServerMessage::Welcome {
                client_id,
                snapshot,
                entries,
                peers,
            } => self.handle_welcome(client_id, snapshot, entries, peers),
            ServerMessage::Snapshot { snapshot } => self.handle_snapshot(snapshot),
            ServerMessage::Entries { entries } => self.handle_entries(entries),
            ServerMessage::Presence { client_id, state } => {
                if Some(client_id) == self.client_id {
                    return;
                }
                self.peers.apply(client_id, state);
                self.emit_presence();
            }
            ServerMessage::PeerLeft { client_id } => {
                if self.peers.remove(client_id) {
                    self.emit_presence();
                }
            }
        }
    }

    fn handle_welcome(
        &mut self,
        client_id: u64,
        snapshot: Option<BaseSnapshot>,
        entries: Vec<LogEntry>,
        peers: Vec<PresenceRecord>,
    ) {
        self.client_id = Some(client_id);
        self.allocator = IdAllocator::collab(client_id);
        self.log.clear();

        match snapshot {
            Some(snapshot) => {
                let scene = self.decode_base(&snapshot);
                self.base = Some(snapshot);
                self.base_scene = Some(scene);
            }
            None => {
                // First replica to sync an empty room: capture our scene
                // once and offer it as the base
                let scene = self.history.canonical().scene.clone();
                match BaseSnapshot::capture(&scene) {
                    Ok(snapshot) => {
                        self.outbox.push(ClientMessage::PublishSnapshot {
                            snapshot: snapshot.clone(),
                        });
                        self.base = Some(snapshot);
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "failed to capture base snapshot");
                        self.base = None;
                    }
                }
                self.base_scene = Some(scene);
            }
        }

        for entry in entries {
            self.log.integrate(entry);
        }
        // Whatever we committed while offline goes back on the wire
        for entry in self.unacked.clone() {
            self.log.integrate(entry);
        }
        if !self.unacked.is_empty() {
            self.outbox.push(ClientMessage::Append {
                entries: self.unacked.clone(),
            });
        }

        let state = self.fold_log();
        self.history.bootstrap(state);

        self.peers.clear();
        for record in peers {
            if Some(record.client_id) != self.client_id {
                self.peers.apply(record.client_id, record.state);
            }
        }

        self.status = SyncStatus::Synced;
        self.outbox.push(ClientMessage::Presence {
            state: self.local_presence.clone(),
        });
        self.events.push(SessionEvent::Connected(true));
        self.emit_state();
        self.emit_presence();
        self.emit_history();
    }

    fn handle_snapshot(&mut self, snapshot: BaseSnapshot) {
        if self.base.as_ref() == Some(&snapshot) {
            return; // our offer won, or we already hold the canonical base
        }
        let scene = self.decode_base(&snapshot);
        self.base = Some(snapshot);
        self.base_scene = Some(scene);
        let state = self.fold_log();
        self.history.bootstrap(state);
        self.emit_state();
        self.emit_history();
    }

    fn handle_entries(&mut self, entries: Vec<LogEntry>) {
        let mut late: Vec<SceneAction> = Vec::new();
        let mut tail_applied = false;
        for entry in entries {
            // An echo of one of our writes counts as the ack
            self.unacked.retain(|u| u.entry_id() != entry.entry_id());
            if Some(entry.origin) == self.client_id {
                continue; // local origin, already applied optimistically
            }
            match self.log.integrate(entry.clone()) {
                Integration::Duplicate => {}
                Integration::Tail => {
                    self.history.apply_remote(&entry.action);
                    tail_applied = true;
                }
                Integration::Mid => {
                    late.push(entry.action);
                }
            }
        }
        if !late.is_empty() {
            // Late arrival sorted before applied entries: refold the log
            let state = self.fold_log();
            self.history.rebase(state, &late);
        }
        if tail_applied || !late.is_empty() {
            self.emit_state();
        }
    }

    fn decode_base(&self, snapshot: &BaseSnapshot) -> Scene {
        match snapshot.decode() {
            Ok(mut scene) => {
                // A scene always has at least one step; the reducer relies on it
                if scene.steps.is_empty() {
                    tracing::warn!("base snapshot carried no steps, inserting an empty one");
                    scene.steps.push(SceneStep::default());
                }
                scene
            }
            Err(e) => {
                tracing::error!(error = %e, "corrupt base snapshot, starting from an empty scene");
                Scene::default()
            }
        }
    }

    /// Base scene plus every log entry, folded in converged order
    fn fold_log(&self) -> EditorState {
        let scene = self.base_scene.clone().unwrap_or_default();
        let mut state = EditorState::with_scene(scene);
        for entry in self.log.entries() {
            state = state.apply(&entry.action);
        }
        state
    }

    // ── Presence ──────────────────────────────────────────────

    pub fn set_user_name(&mut self, name: impl Into<String>) {
        self.local_presence.display_name = name.into();
        self.send_presence();
    }

    pub fn set_user_icon(&mut self, icon: impl Into<String>) {
        self.local_presence.accent_icon = icon.into();
        self.send_presence();
    }

    pub fn set_local_selection(&mut self, selection: BTreeSet<ObjectId>) {
        self.local_presence.selection = selection;
        self.send_presence();
    }

    /// Cursor updates coalesce to animation-frame cadence
    pub fn set_local_cursor(&mut self, cursor: Option<Point>, now: Instant) {
        self.local_presence.cursor = cursor;
        if self.cursor_throttle.ready(now) {
            self.cursor_dirty = false;
            self.send_presence();
        } else {
            self.cursor_dirty = true;
        }
    }

    /// Send a coalesced cursor update once the throttle window reopens
    pub fn flush_cursor(&mut self, now: Instant) {
        if self.cursor_dirty && self.cursor_throttle.ready(now) {
            self.cursor_dirty = false;
            self.send_presence();
        }
    }

    fn send_presence(&mut self) {
        if self.status == SyncStatus::Synced {
            self.outbox.push(ClientMessage::Presence {
                state: self.local_presence.clone(),
            });
        }
    }

    // ── Events ────────────────────────────────────────────────

    fn emit_state(&mut self) {
        self.events
            .push(SessionEvent::State(self.history.state().clone()));
    }

    fn emit_presence(&mut self) {
        self.events
            .push(SessionEvent::Presence(self.peers.snapshot()));
    }

    fn emit_history(&mut self) {
        let [undo_possible, redo_possible] = self.history_flags();
        self.events.push(SessionEvent::History {
            undo_possible,
            redo_possible,
        });
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn untagged_circle() -> SceneObject {
        SceneObject::Circle {
            id: UNASSIGNED_ID,
            x: 0.0,
            y: 0.0,
            radius: 1.0,
        }
    }

    fn welcome_empty(client_id: u64) -> ServerMessage {
        ServerMessage::Welcome {
            client_id,
            snapshot: None,
            entries: vec![],
            peers: vec![],
        }
    }

    fn step_ids(session: &Session, step: usize) -> Vec<ObjectId> {
        session.state().scene.steps[step].object_ids()
    }

    #[test]
    fn test_solo_dispatch_assigns_sequential_ids() {
        let mut session = Session::new();
        session.dispatch(SceneAction::Add {
            objects: vec![untagged_circle(), untagged_circle()],
            next_id: 0,
        });
        assert_eq!(step_ids(&session, 0), vec![1, 2]);
        assert_eq!(session.state().scene.next_id, 3);
        session.dispatch(SceneAction::Commit);
        // Solo: nothing leaves the session
        assert!(session.take_outbox().is_empty());
    }

    #[test]
    fn test_solo_collision_skips_object_and_continues() {
        let mut session = Session::new();
        session.dispatch(SceneAction::Add {
            objects: vec![untagged_circle()],
            next_id: 0,
        });
        // Explicit id 1 collides; the untagged one still lands
        session.dispatch(SceneAction::Add {
            objects: vec![
                SceneObject::Rect {
                    id: 1,
                    x: 0.0,
                    y: 0.0,
                    width: 1.0,
                    height: 1.0,
                },
                untagged_circle(),
            ],
            next_id: 0,
        });
        assert_eq!(step_ids(&session, 0), vec![1, 2]);
        assert!(matches!(
            session.state().scene.steps[0].objects[0],
            SceneObject::Circle { .. }
        ));
    }

    #[test]
    fn test_welcome_to_empty_room_publishes_base() {
        let mut session = Session::new();
        session.dispatch(SceneAction::Add {
            objects: vec![untagged_circle()],
            next_id: 0,
        });
        session.dispatch(SceneAction::Commit);

        session.begin_connecting();
        session.handle_message(welcome_empty(1));

        assert!(session.connected());
        let outbox = session.take_outbox();
        assert!(outbox
            .iter()
            .any(|m| matches!(m, ClientMessage::PublishSnapshot { .. })));
        // The captured base holds the committed scene
        assert_eq!(step_ids(&session, 0), vec![1]);
    }

    #[test]
    fn test_collab_ids_use_client_range() {
        let mut session = Session::new();
        session.handle_message(welcome_empty(3));
        session.dispatch(SceneAction::Add {
            objects: vec![untagged_circle()],
            next_id: 0,
        });
        let id = step_ids(&session, 0)[0];
        assert_eq!(id / crate::ids::CLIENT_ID_SHIFT, 3);
    }

    #[test]
    fn test_commit_replicates_one_atomic_batch() {
        let mut session = Session::new();
        session.handle_message(welcome_empty(1));
        session.take_outbox();

        session.dispatch(SceneAction::Add {
            objects: vec![untagged_circle()],
            next_id: 0,
        });
        session.dispatch(SceneAction::SetArena {
            patch: shared::ArenaPatch {
                show_grid: Some(true),
                ..Default::default()
            },
        });
        assert!(session.take_outbox().is_empty()); // transient, not yet on the wire

        session.dispatch(SceneAction::Commit);
        let outbox = session.take_outbox();
        assert_eq!(outbox.len(), 1);
        match &outbox[0] {
            ClientMessage::Append { entries } => {
                assert_eq!(entries.len(), 2);
                assert!(entries.iter().all(|e| e.origin == 1));
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn test_echoed_own_entries_are_skipped() {
        let mut session = Session::new();
        session.handle_message(welcome_empty(1));
        session.take_outbox();

        session.dispatch(SceneAction::Add {
            objects: vec![untagged_circle()],
            next_id: 0,
        });
        session.dispatch(SceneAction::Commit);
        let outbox = session.take_outbox();
        let entries = match &outbox[0] {
            ClientMessage::Append { entries } => entries.clone(),
            other => panic!("unexpected message: {:?}", other),
        };
        let before = session.state().clone();

        // The room relays the batch back to everyone, sender included
        session.handle_message(ServerMessage::Entries { entries });
        assert_eq!(*session.state(), before);
    }

    #[test]
    fn test_corrupt_welcome_snapshot_falls_back_to_default() {
        let mut session = Session::new();
        session.handle_message(ServerMessage::Welcome {
            client_id: 2,
            snapshot: Some(BaseSnapshot {
                data: vec![0xff, 0x00, 0x99],
            }),
            entries: vec![],
            peers: vec![],
        });
        assert!(session.connected());
        assert_eq!(*session.state(), EditorState::default());
    }

    #[test]
    fn test_add_step_duplicates_current_step_with_fresh_ids() {
        let mut session = Session::new();
        session.dispatch(SceneAction::Add {
            objects: vec![
                untagged_circle(),
                untagged_circle(),
                SceneObject::Tether {
                    id: UNASSIGNED_ID,
                    start_id: 1,
                    end_id: 2,
                },
            ],
            next_id: 0,
        });
        assert_eq!(step_ids(&session, 0), vec![3, 1, 2]);

        session.dispatch(SceneAction::AddStep {
            after: 0,
            objects: vec![],
            next_id: 0,
        });
        let copy = &session.state().scene.steps[1];
        assert_eq!(copy.objects.len(), 3);
        // Fresh ids, with the tether retargeted onto the copies
        let tether = copy
            .objects
            .iter()
            .find_map(|o| o.tether_refs().map(|refs| (o.id(), refs)))
            .unwrap();
        let copied_ids: Vec<ObjectId> = copy.object_ids();
        assert!(copied_ids.iter().all(|id| ![1, 2, 3].contains(id)));
        assert!(copied_ids.contains(&tether.1 .0));
        assert!(copied_ids.contains(&tether.1 .1));
        assert_eq!(session.state().current_step, 1);
    }

    #[test]
    fn test_undo_forward_actions_are_replicated_not_undo() {
        let mut session = Session::new();
        session.handle_message(welcome_empty(1));
        session.take_outbox();

        session.dispatch(SceneAction::Add {
            objects: vec![untagged_circle()],
            next_id: 0,
        });
        session.dispatch(SceneAction::Commit);
        session.take_outbox();

        session.dispatch(SceneAction::Undo);
        let outbox = session.take_outbox();
        assert_eq!(outbox.len(), 1);
        match &outbox[0] {
            ClientMessage::Append { entries } => {
                assert!(entries
                    .iter()
                    .all(|e| !e.action.is_history_control()));
            }
            other => panic!("unexpected message: {:?}", other),
        }
        assert!(step_ids(&session, 0).is_empty());
    }

    #[test]
    fn test_presence_updates_throttle_cursor() {
        let mut session = Session::new();
        session.handle_message(welcome_empty(1));
        session.take_outbox();

        let t0 = Instant::now();
        session.set_local_cursor(Some(Point { x: 1.0, y: 1.0 }), t0);
        assert_eq!(session.take_outbox().len(), 1);

        // Inside the frame window: coalesced, nothing sent
        session.set_local_cursor(
            Some(Point { x: 2.0, y: 2.0 }),
            t0 + std::time::Duration::from_millis(5),
        );
        assert!(session.take_outbox().is_empty());

        // Window reopens: the latest position flushes
        session.flush_cursor(t0 + std::time::Duration::from_millis(32));
        let outbox = session.take_outbox();
        assert_eq!(outbox.len(), 1);
        match &outbox[0] {
            ClientMessage::Presence { state } => {
                assert_eq!(state.cursor, Some(Point { x: 2.0, y: 2.0 }));
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn test_leave_degrades_to_solo() {
        let mut session = Session::new();
        session.handle_message(welcome_empty(1));
        session.dispatch(SceneAction::Add {
            objects: vec![untagged_circle()],
            next_id: 0,
        });
        session.dispatch(SceneAction::Commit);
        let kept = session.state().clone();

        session.leave();
        assert!(!session.connected());
        assert_eq!(*session.state(), kept);

        // Still editable without a room
        session.dispatch(SceneAction::Add {
            objects: vec![untagged_circle()],
            next_id: 0,
        });
        assert_eq!(session.state().scene.object_count(), 2);
    }
}
