//! Pure scene reducer: `(EditorState, SceneAction) -> EditorState`.
//!
//! Every replica folds the same action sequence through this module and
//! arrives at the same state. Invalid references no-op, out-of-range
//! indices clamp; nothing here panics or performs IO.

use std::collections::HashSet;

use crate::{EditorState, ObjectId, SceneAction, SceneObject, UNASSIGNED_ID};

impl EditorState {
    /// Compute the next state. Total and side-effect-free.
    pub fn apply(&self, action: &SceneAction) -> EditorState {
        let mut next = self.clone();
        match action {
            SceneAction::Add { objects, next_id } => next.apply_add(objects, *next_id),
            SceneAction::Remove { ids } => next.apply_remove(ids),
            SceneAction::Update { objects } => next.apply_update(objects),
            SceneAction::Move { id, index } => next.apply_move(*id, *index),
            SceneAction::MoveUp { ids } => next.apply_move_up(ids),
            SceneAction::MoveDown { ids } => next.apply_move_down(ids),
            SceneAction::MoveToTop { ids } => next.apply_move_to_top(ids),
            SceneAction::MoveToBottom { ids } => next.apply_move_to_bottom(ids),
            SceneAction::AddStep {
                after,
                objects,
                next_id,
            } => next.apply_add_step(*after, objects, *next_id),
            SceneAction::RemoveStep { index } => next.apply_remove_step(*index),
            SceneAction::MoveStep { from, to } => next.apply_move_step(*from, *to),
            SceneAction::SelectStep { index } => next.apply_select_step(*index),
            SceneAction::SetArena { patch } => patch.apply_to(&mut next.scene.arena),
            // Owned by the session history layer; inert here
            SceneAction::Undo
            | SceneAction::Redo
            | SceneAction::Commit
            | SceneAction::Rollback
            | SceneAction::Reset => {}
        }
        next
    }

    fn apply_add(&mut self, objects: &[SceneObject], next_id: u64) {
        let step = self.clamped_step();
        for obj in objects {
            // Unassigned or already-present ids are skipped; a re-delivered
            // add must not double-apply
            if obj.id() == UNASSIGNED_ID || self.scene.contains_id(obj.id()) {
                continue;
            }
            let slot = &mut self.scene.steps[step].objects;
            match obj.tether_refs() {
                Some((start, end)) => {
                    // A tether sits just before the earlier of its endpoints
                    let pos = slot.iter().position(|o| o.id() == start || o.id() == end);
                    match pos {
                        Some(i) => slot.insert(i, obj.clone()),
                        None => slot.push(obj.clone()),
                    }
                }
                None => slot.push(obj.clone()),
            }
        }
        self.scene.next_id = self.scene.next_id.max(next_id);
    }

    fn apply_remove(&mut self, ids: &[ObjectId]) {
        let removed: HashSet<ObjectId> = ids.iter().copied().collect();
        for step in &mut self.scene.steps {
            step.objects.retain(|o| {
                if removed.contains(&o.id()) {
                    return false;
                }
                // Cascade: drop tethers referencing a removed id
                match o.tether_refs() {
                    Some((start, end)) => !removed.contains(&start) && !removed.contains(&end),
                    None => true,
                }
            });
        }
    }

    fn apply_update(&mut self, objects: &[SceneObject]) {
        for replacement in objects {
            let id = replacement.id();
            for step in &mut self.scene.steps {
                if let Some(slot) = step.objects.iter_mut().find(|o| o.id() == id) {
                    *slot = replacement.clone();
                    break;
                }
            }
        }
    }

    fn apply_move(&mut self, id: ObjectId, index: usize) {
        let Some(step) = self.scene.step_of(id) else {
            return;
        };
        let objects = &mut self.scene.steps[step].objects;
        let Some(pos) = objects.iter().position(|o| o.id() == id) else {
            return;
        };
        let obj = objects.remove(pos);
        let index = index.min(objects.len());
        objects.insert(index, obj);
    }

    fn apply_move_up(&mut self, ids: &[ObjectId]) {
        let selected: HashSet<ObjectId> = ids.iter().copied().collect();
        for step in &mut self.scene.steps {
            let objects = &mut step.objects;
            if objects.len() < 2 {
                continue;
            }
            for i in (0..objects.len() - 1).rev() {
                if selected.contains(&objects[i].id()) && !selected.contains(&objects[i + 1].id())
                {
                    objects.swap(i, i + 1);
                }
            }
        }
    }

    fn apply_move_down(&mut self, ids: &[ObjectId]) {
        let selected: HashSet<ObjectId> = ids.iter().copied().collect();
        for step in &mut self.scene.steps {
            let objects = &mut step.objects;
            for i in 1..objects.len() {
                if selected.contains(&objects[i].id()) && !selected.contains(&objects[i - 1].id())
                {
                    objects.swap(i, i - 1);
                }
            }
        }
    }

    fn apply_move_to_top(&mut self, ids: &[ObjectId]) {
        let selected: HashSet<ObjectId> = ids.iter().copied().collect();
        for step in &mut self.scene.steps {
            let (chosen, rest): (Vec<_>, Vec<_>) = step
                .objects
                .drain(..)
                .partition(|o| selected.contains(&o.id()));
            step.objects = rest;
            step.objects.extend(chosen);
        }
    }

    fn apply_move_to_bottom(&mut self, ids: &[ObjectId]) {
        let selected: HashSet<ObjectId> = ids.iter().copied().collect();
        for step in &mut self.scene.steps {
            let (chosen, rest): (Vec<_>, Vec<_>) = step
                .objects
                .drain(..)
                .partition(|o| selected.contains(&o.id()));
            step.objects = chosen;
            step.objects.extend(rest);
        }
    }

    fn apply_add_step(&mut self, after: usize, objects: &[SceneObject], next_id: u64) {
        let after = after.min(self.scene.steps.len().saturating_sub(1));
        let mut step = crate::SceneStep::default();
        for obj in objects {
            if obj.id() == UNASSIGNED_ID
                || self.scene.contains_id(obj.id())
                || step.objects.iter().any(|o| o.id() == obj.id())
            {
                continue;
            }
            step.objects.push(obj.clone());
        }
        self.scene.steps.insert(after + 1, step);
        self.current_step = after + 1;
        self.scene.next_id = self.scene.next_id.max(next_id);
    }

    fn apply_remove_step(&mut self, index: usize) {
        // A scene never loses its last step
        if self.scene.steps.len() <= 1 {
            return;
        }
        let index = index.min(self.scene.steps.len() - 1);
        self.scene.steps.remove(index);
        if self.current_step > index {
            self.current_step -= 1;
        }
        self.current_step = self.clamped_step();
    }

    fn apply_move_step(&mut self, from: usize, to: usize) {
        let last = self.scene.steps.len() - 1;
        let from = from.min(last);
        let to = to.min(last);
        if from == to {
            return;
        }
        let step = self.scene.steps.remove(from);
        self.scene.steps.insert(to, step);
        // The selection follows the step the user was on
        self.current_step = if self.current_step == from {
            to
        } else if from < self.current_step && to >= self.current_step {
            self.current_step - 1
        } else if from > self.current_step && to <= self.current_step {
            self.current_step + 1
        } else {
            self.current_step
        };
    }

    fn apply_select_step(&mut self, index: usize) {
        self.current_step = index.min(self.scene.steps.len().saturating_sub(1));
    }
}
