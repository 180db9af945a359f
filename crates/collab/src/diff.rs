//! Scene diff: the forward actions that turn one editor state into another.
//!
//! Undo and redo never replicate themselves; they replicate the output of
//! this module. The diff is object-granular, so state that is identical in
//! both ends (a peer's concurrent work, say) produces no actions at all.

use std::collections::{BTreeSet, HashMap};

use shared::{ArenaPatch, EditorState, ObjectId, SceneAction, SceneObject};

/// Actions that fold `from` into `to` through the reducer.
///
/// Exact up to `next_id` drift: the hint never decreases, which is the same
/// tolerance replay already has.
pub fn forward_actions(from: &EditorState, to: &EditorState) -> Vec<SceneAction> {
    let mut actions = Vec::new();
    let mut sim = from.clone();

    let patch = ArenaPatch::between(&sim.scene.arena, &to.scene.arena);
    if !patch.is_empty() {
        push(&mut actions, &mut sim, SceneAction::SetArena { patch });
    }

    // Where every id lives in the target
    let mut to_step_of: HashMap<ObjectId, usize> = HashMap::new();
    let mut to_object: HashMap<ObjectId, &SceneObject> = HashMap::new();
    for (s, step) in to.scene.steps.iter().enumerate() {
        for obj in &step.objects {
            to_step_of.insert(obj.id(), s);
            to_object.insert(obj.id(), obj);
        }
    }

    // Ids to drop: gone entirely, or sitting in the wrong step and due for
    // re-insertion where they belong
    let mut removed: BTreeSet<ObjectId> = BTreeSet::new();
    for (s, step) in sim.scene.steps.iter().enumerate() {
        for obj in &step.objects {
            match to_step_of.get(&obj.id()) {
                Some(target) if *target == s => {}
                _ => {
                    removed.insert(obj.id());
                }
            }
        }
    }
    // The reducer cascades tethers referencing removed ids; anything it
    // would cascade away must be re-added, so pull it into the set
    loop {
        let mut grew = false;
        for step in &sim.scene.steps {
            for obj in &step.objects {
                if removed.contains(&obj.id()) {
                    continue;
                }
                if let Some((start, end)) = obj.tether_refs() {
                    if removed.contains(&start) || removed.contains(&end) {
                        removed.insert(obj.id());
                        grew = true;
                    }
                }
            }
        }
        if !grew {
            break;
        }
    }
    if !removed.is_empty() {
        push(
            &mut actions,
            &mut sim,
            SceneAction::Remove {
                ids: removed.iter().copied().collect(),
            },
        );
    }

    // Align step counts; surplus tail steps are empty by now
    while sim.scene.steps.len() > to.scene.steps.len() {
        let index = sim.scene.steps.len() - 1;
        push(&mut actions, &mut sim, SceneAction::RemoveStep { index });
    }
    while sim.scene.steps.len() < to.scene.steps.len() {
        let s = sim.scene.steps.len();
        let objects: Vec<SceneObject> = to.scene.steps[s]
            .objects
            .iter()
            .filter(|o| !sim.scene.contains_id(o.id()))
            .cloned()
            .collect();
        push(
            &mut actions,
            &mut sim,
            SceneAction::AddStep {
                after: s - 1,
                objects,
                next_id: to.scene.next_id,
            },
        );
    }

    // Re-insert whatever each step is missing
    for s in 0..to.scene.steps.len() {
        let missing: Vec<SceneObject> = to.scene.steps[s]
            .objects
            .iter()
            .filter(|o| !sim.scene.contains_id(o.id()))
            .cloned()
            .collect();
        if missing.is_empty() {
            continue;
        }
        if sim.current_step != s {
            push(&mut actions, &mut sim, SceneAction::SelectStep { index: s });
        }
        push(
            &mut actions,
            &mut sim,
            SceneAction::Add {
                objects: missing,
                next_id: to.scene.next_id,
            },
        );
    }

    // Content updates for survivors
    let mut changed: Vec<SceneObject> = Vec::new();
    for step in &sim.scene.steps {
        for obj in &step.objects {
            if let Some(target) = to_object.get(&obj.id()) {
                if *target != obj {
                    changed.push((*target).clone());
                }
            }
        }
    }
    if !changed.is_empty() {
        push(
            &mut actions,
            &mut sim,
            SceneAction::Update { objects: changed },
        );
    }

    // Splice each step into target order
    for s in 0..to.scene.steps.len() {
        let target_ids = to.scene.steps[s].object_ids();
        if sim.scene.steps[s].object_ids() == target_ids {
            continue;
        }
        for (index, id) in target_ids.iter().enumerate() {
            push(
                &mut actions,
                &mut sim,
                SceneAction::Move { id: *id, index },
            );
        }
    }

    if sim.current_step != to.current_step {
        push(
            &mut actions,
            &mut sim,
            SceneAction::SelectStep {
                index: to.current_step,
            },
        );
    }

    actions
}

fn push(actions: &mut Vec<SceneAction>, sim: &mut EditorState, action: SceneAction) {
    *sim = sim.apply(&action);
    actions.push(action);
}
