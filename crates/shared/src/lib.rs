use serde::{Deserialize, Serialize};

mod action;
mod reducer;

pub use action::{ArenaPatch, SceneAction};

/// Unique identifier of an object in the scene
pub type ObjectId = u64;

/// Sentinel for an object that has not been assigned an id yet
pub const UNASSIGNED_ID: ObjectId = 0;

fn default_size() -> f64 {
    1.0
}

fn default_next_id() -> u64 {
    1
}

/// A point in scene space
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

/// One object in a scene step, tagged by type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SceneObject {
    Rect {
        #[serde(default)]
        id: ObjectId,
        #[serde(default)]
        x: f64,
        #[serde(default)]
        y: f64,
        #[serde(default = "default_size")]
        width: f64,
        #[serde(default = "default_size")]
        height: f64,
    },
    Circle {
        #[serde(default)]
        id: ObjectId,
        #[serde(default)]
        x: f64,
        #[serde(default)]
        y: f64,
        #[serde(default = "default_size")]
        radius: f64,
    },
    Label {
        #[serde(default)]
        id: ObjectId,
        #[serde(default)]
        x: f64,
        #[serde(default)]
        y: f64,
        #[serde(default)]
        text: String,
    },
    /// Visual link between two other objects, referenced by id
    Tether {
        #[serde(default)]
        id: ObjectId,
        start_id: ObjectId,
        end_id: ObjectId,
    },
}

impl SceneObject {
    /// Get the object's id
    pub fn id(&self) -> ObjectId {
        match self {
            SceneObject::Rect { id, .. } => *id,
            SceneObject::Circle { id, .. } => *id,
            SceneObject::Label { id, .. } => *id,
            SceneObject::Tether { id, .. } => *id,
        }
    }

    /// Overwrite the object's id
    pub fn set_id(&mut self, new_id: ObjectId) {
        match self {
            SceneObject::Rect { id, .. } => *id = new_id,
            SceneObject::Circle { id, .. } => *id = new_id,
            SceneObject::Label { id, .. } => *id = new_id,
            SceneObject::Tether { id, .. } => *id = new_id,
        }
    }

    /// Endpoint ids if this object is a tether
    pub fn tether_refs(&self) -> Option<(ObjectId, ObjectId)> {
        match self {
            SceneObject::Tether { start_id, end_id, .. } => Some((*start_id, *end_id)),
            _ => None,
        }
    }

    /// Remap tether endpoints through `map`; ids absent from the map are kept
    pub fn remap_tether_refs(&mut self, map: &std::collections::HashMap<ObjectId, ObjectId>) {
        if let SceneObject::Tether { start_id, end_id, .. } = self {
            if let Some(mapped) = map.get(start_id) {
                *start_id = *mapped;
            }
            if let Some(mapped) = map.get(end_id) {
                *end_id = *mapped;
            }
        }
    }
}

/// Arena configuration blob, edited field-wise
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArenaConfig {
    pub width: f64,
    pub height: f64,
    pub background: String,
    pub show_grid: bool,
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self {
            width: 800.0,
            height: 600.0,
            background: "#ffffff".to_string(),
            show_grid: false,
        }
    }
}

/// One stage of the scene; object order is painter's order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct SceneStep {
    pub objects: Vec<SceneObject>,
}

impl SceneStep {
    /// Object ids in painter's order
    pub fn object_ids(&self) -> Vec<ObjectId> {
        self.objects.iter().map(|o| o.id()).collect()
    }
}

/// The full document: ordered steps of objects plus the arena config
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scene {
    /// Hint for the next object id; actual assignment may override it
    #[serde(default = "default_next_id")]
    pub next_id: u64,
    #[serde(default)]
    pub arena: ArenaConfig,
    pub steps: Vec<SceneStep>,
}

impl Default for Scene {
    fn default() -> Self {
        Self {
            next_id: 1,
            arena: ArenaConfig::default(),
            steps: vec![SceneStep::default()],
        }
    }
}

impl Scene {
    /// Whether any object in any step carries this id
    pub fn contains_id(&self, id: ObjectId) -> bool {
        self.steps
            .iter()
            .any(|s| s.objects.iter().any(|o| o.id() == id))
    }

    /// Find an object anywhere in the scene
    pub fn find_object(&self, id: ObjectId) -> Option<&SceneObject> {
        self.steps
            .iter()
            .flat_map(|s| s.objects.iter())
            .find(|o| o.id() == id)
    }

    /// Step index holding the given object, if any
    pub fn step_of(&self, id: ObjectId) -> Option<usize> {
        self.steps
            .iter()
            .position(|s| s.objects.iter().any(|o| o.id() == id))
    }

    /// Largest id present anywhere in the scene (0 when empty)
    pub fn max_id(&self) -> ObjectId {
        self.steps
            .iter()
            .flat_map(|s| s.objects.iter())
            .map(|o| o.id())
            .max()
            .unwrap_or(0)
    }

    /// Total object count across all steps
    pub fn object_count(&self) -> usize {
        self.steps.iter().map(|s| s.objects.len()).sum()
    }
}

/// Live editing state of one session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct EditorState {
    pub scene: Scene,
    #[serde(default)]
    pub current_step: usize,
}

impl EditorState {
    /// State over an existing scene, starting on the first step
    pub fn with_scene(scene: Scene) -> Self {
        Self {
            scene,
            current_step: 0,
        }
    }

    /// Current step index clamped into range
    pub fn clamped_step(&self) -> usize {
        let last = self.scene.steps.len().saturating_sub(1);
        self.current_step.min(last)
    }
}
