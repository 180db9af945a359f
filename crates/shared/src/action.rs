//! The closed action vocabulary of the scene editor.

use serde::{Deserialize, Serialize};

use crate::{ArenaConfig, ObjectId, SceneObject};

/// Field-wise patch of the arena config; absent fields are untouched
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ArenaPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub show_grid: Option<bool>,
}

impl ArenaPatch {
    pub fn is_empty(&self) -> bool {
        self.width.is_none()
            && self.height.is_none()
            && self.background.is_none()
            && self.show_grid.is_none()
    }

    /// Apply the set fields onto an arena config
    pub fn apply_to(&self, arena: &mut ArenaConfig) {
        if let Some(width) = self.width {
            arena.width = width;
        }
        if let Some(height) = self.height {
            arena.height = height;
        }
        if let Some(background) = &self.background {
            arena.background = background.clone();
        }
        if let Some(show_grid) = self.show_grid {
            arena.show_grid = show_grid;
        }
    }

    /// Patch turning `from` into `to`; empty when the configs match
    pub fn between(from: &ArenaConfig, to: &ArenaConfig) -> Self {
        Self {
            width: (from.width != to.width).then_some(to.width),
            height: (from.height != to.height).then_some(to.height),
            background: (from.background != to.background).then(|| to.background.clone()),
            show_grid: (from.show_grid != to.show_grid).then_some(to.show_grid),
        }
    }
}

/// One atomic edit of the scene
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SceneAction {
    /// Insert objects into the current step; ids are pre-assigned by the
    /// dispatching session, never invented here
    Add {
        objects: Vec<SceneObject>,
        #[serde(default)]
        next_id: u64,
    },
    /// Delete the listed ids plus any tether referencing them
    Remove { ids: Vec<ObjectId> },
    /// Replace objects matching by id; unmatched ids are ignored
    Update { objects: Vec<SceneObject> },
    /// Splice one object to a new index within its step
    Move { id: ObjectId, index: usize },
    MoveUp { ids: Vec<ObjectId> },
    MoveDown { ids: Vec<ObjectId> },
    MoveToTop { ids: Vec<ObjectId> },
    MoveToBottom { ids: Vec<ObjectId> },
    /// Insert a step after `after`, carrying its fully-materialized objects
    AddStep {
        after: usize,
        #[serde(default)]
        objects: Vec<SceneObject>,
        #[serde(default)]
        next_id: u64,
    },
    RemoveStep { index: usize },
    MoveStep { from: usize, to: usize },
    SelectStep { index: usize },
    SetArena { patch: ArenaPatch },
    // History control, owned by the session history layer
    Undo,
    Redo,
    Commit,
    Rollback,
    Reset,
}

impl SceneAction {
    /// History-control actions never reach the reducer or the replicated log
    pub fn is_history_control(&self) -> bool {
        matches!(
            self,
            SceneAction::Undo
                | SceneAction::Redo
                | SceneAction::Commit
                | SceneAction::Rollback
                | SceneAction::Reset
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_tag_names() {
        let add = SceneAction::Add {
            objects: vec![],
            next_id: 7,
        };
        let json = serde_json::to_string(&add).unwrap();
        assert!(json.contains(r#""type":"add""#));

        let json = serde_json::to_string(&SceneAction::MoveToTop { ids: vec![1] }).unwrap();
        assert!(json.contains(r#""type":"move_to_top""#));

        let json = serde_json::to_string(&SceneAction::Undo).unwrap();
        assert_eq!(json, r#"{"type":"undo"}"#);
    }

    #[test]
    fn test_history_control_classification() {
        assert!(SceneAction::Undo.is_history_control());
        assert!(SceneAction::Commit.is_history_control());
        assert!(!SceneAction::Remove { ids: vec![] }.is_history_control());
    }

    #[test]
    fn test_arena_patch_apply_and_between() {
        let from = ArenaConfig::default();
        let mut to = from.clone();
        to.width = 1024.0;
        to.show_grid = true;

        let patch = ArenaPatch::between(&from, &to);
        assert_eq!(patch.width, Some(1024.0));
        assert_eq!(patch.height, None);
        assert_eq!(patch.show_grid, Some(true));

        let mut arena = from;
        patch.apply_to(&mut arena);
        assert_eq!(arena, to);

        assert!(ArenaPatch::between(&to, &to).is_empty());
    }

    #[test]
    fn test_add_action_without_next_id_parses() {
        let json = r#"{"type":"add","objects":[{"type":"rect","id":3}]}"#;
        let action: SceneAction = serde_json::from_str(json).unwrap();
        match action {
            SceneAction::Add { objects, next_id } => {
                assert_eq!(objects.len(), 1);
                assert_eq!(next_id, 0);
            }
            other => panic!("unexpected action: {:?}", other),
        }
    }
}
