//! Transient/canonical state layers with bounded local undo history.
//!
//! Every dispatched action is visible immediately in the transient layer;
//! the canonical layer advances on an explicit commit, and on foreign log
//! entries, which arrive already committed by their origin. Undo and redo
//! operate on canonical snapshots and emit forward actions (see `diff`);
//! they never touch a peer's concurrent work.

use std::collections::VecDeque;

use shared::{EditorState, SceneAction};

use crate::diff;

/// Fixed capacity of the canonical snapshot stack
pub const HISTORY_CAPACITY: usize = 1000;

#[derive(Debug)]
pub struct UndoRedoBridge {
    canonical: EditorState,
    transient: EditorState,
    pending: Vec<SceneAction>,
    undo_stack: VecDeque<EditorState>,
    redo_stack: Vec<EditorState>,
}

impl UndoRedoBridge {
    pub fn new(state: EditorState) -> Self {
        Self {
            transient: state.clone(),
            canonical: state,
            pending: Vec::new(),
            undo_stack: VecDeque::new(),
            redo_stack: Vec::new(),
        }
    }

    /// Live state for interaction feedback
    pub fn state(&self) -> &EditorState {
        &self.transient
    }

    /// Durable state, last committed
    pub fn canonical(&self) -> &EditorState {
        &self.canonical
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Apply a local action to the transient layer only
    pub fn apply_transient(&mut self, action: &SceneAction) {
        self.transient = self.transient.apply(action);
        self.pending.push(action.clone());
    }

    /// Promote transient to canonical; returns the batch to replicate
    pub fn commit(&mut self) -> Vec<SceneAction> {
        if self.pending.is_empty() {
            return Vec::new();
        }
        self.push_undo(self.canonical.clone());
        self.redo_stack.clear();
        self.canonical = self.transient.clone();
        std::mem::take(&mut self.pending)
    }

    /// Discard uncommitted transient changes
    pub fn rollback(&mut self) {
        self.pending.clear();
        self.transient = self.canonical.clone();
    }

    /// Fold a foreign committed action into every layer without touching
    /// local history semantics: stored snapshots absorb it too, so a later
    /// undo diff contains only local changes
    pub fn apply_remote(&mut self, action: &SceneAction) {
        self.canonical = self.canonical.apply(action);
        for snapshot in &mut self.undo_stack {
            *snapshot = snapshot.apply(action);
        }
        for snapshot in &mut self.redo_stack {
            *snapshot = snapshot.apply(action);
        }
        self.rebuild_transient();
    }

    /// Revert the last committed local change. Returns the forward actions
    /// that realize it; only those are replicated, never "undo" itself.
    pub fn undo(&mut self) -> Vec<SceneAction> {
        let Some(target) = self.undo_stack.pop_back() else {
            return Vec::new();
        };
        let actions = diff::forward_actions(&self.canonical, &target);
        self.redo_stack.push(self.canonical.clone());
        self.fold_local(&actions);
        actions
    }

    pub fn redo(&mut self) -> Vec<SceneAction> {
        let Some(target) = self.redo_stack.pop() else {
            return Vec::new();
        };
        let actions = diff::forward_actions(&self.canonical, &target);
        self.push_undo(self.canonical.clone());
        self.fold_local(&actions);
        actions
    }

    /// Replace the canonical state wholesale (bootstrap/reset); local
    /// history does not survive, the pending batch replays on top
    pub fn bootstrap(&mut self, state: EditorState) {
        self.canonical = state;
        self.undo_stack.clear();
        self.redo_stack.clear();
        self.rebuild_transient();
    }

    /// Rebase onto a refolded canonical state, absorbing the late-arriving
    /// actions into stored snapshots like `apply_remote` does
    pub fn rebase(&mut self, canonical: EditorState, late_actions: &[SceneAction]) {
        self.canonical = canonical;
        for action in late_actions {
            for snapshot in &mut self.undo_stack {
                *snapshot = snapshot.apply(action);
            }
            for snapshot in &mut self.redo_stack {
                *snapshot = snapshot.apply(action);
            }
        }
        self.rebuild_transient();
    }

    /// Back to a fresh default document
    pub fn reset(&mut self) {
        self.pending.clear();
        self.undo_stack.clear();
        self.redo_stack.clear();
        self.canonical = EditorState::default();
        self.transient = EditorState::default();
    }

    fn fold_local(&mut self, actions: &[SceneAction]) {
        for action in actions {
            self.canonical = self.canonical.apply(action);
        }
        self.rebuild_transient();
    }

    fn rebuild_transient(&mut self) {
        let mut transient = self.canonical.clone();
        for action in &self.pending {
            transient = transient.apply(action);
        }
        self.transient = transient;
    }

    fn push_undo(&mut self, snapshot: EditorState) {
        if self.undo_stack.len() == HISTORY_CAPACITY {
            self.undo_stack.pop_front();
        }
        self.undo_stack.push_back(snapshot);
    }
}

impl Default for UndoRedoBridge {
    fn default() -> Self {
        Self::new(EditorState::default())
    }
}
