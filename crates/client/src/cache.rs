//! Optimistic local copy of the active session.

use chrono::{DateTime, Utc};

use workout_core::Pointer;
use workout_core::model::{ProgressUpdate, SessionView, SetUpdate};
use workout_core::pointer::{next, shape_of};

/// Write-through cache of the server-owned session tree.
///
/// Mutations are applied here before delivery so the user never perceives a
/// stall; the server's copy remains the source of truth and overwrites the
/// cache on every acknowledgment or re-fetch.
#[derive(Debug, Default)]
pub struct SessionCache {
    view: Option<SessionView>,
}

impl SessionCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn view(&self) -> Option<&SessionView> {
        self.view.as_ref()
    }

    /// Installs server truth, replacing whatever the cache held.
    pub fn replace(&mut self, view: Option<SessionView>) {
        self.view = view;
    }

    pub fn clear(&mut self) {
        self.view = None;
    }

    /// Applies a mutation to the cached copy, mirroring the server's own
    /// effects: pointer overwrite, set overwrite, completion timestamp
    /// stamped on `is_done` turning true and cleared on false.
    ///
    /// A missing cache or an unknown set target is ignored; the durable
    /// queue, not the cache, is the proof of the mutation.
    pub fn apply(&mut self, update: &ProgressUpdate, now: DateTime<Utc>) {
        let Some(view) = self.view.as_mut() else {
            return;
        };
        if let Some(pointer) = update.current_pointer {
            view.session.pointer = pointer;
        }
        if let Some(set_update) = &update.set_update {
            apply_set(view, set_update, now);
        }
    }

    /// Advances the cached pointer one step through the snapshot, returning
    /// the new position or `None` once the session is exhausted.
    pub fn advance(&mut self) -> Option<Pointer> {
        let view = self.view.as_mut()?;
        let shapes = shape_of(&view.session.groups);
        let advanced = next(view.session.pointer, &shapes)?;
        view.session.pointer = advanced;
        Some(advanced)
    }
}

fn apply_set(view: &mut SessionView, update: &SetUpdate, now: DateTime<Utc>) {
    let Some(set) = view
        .session
        .groups
        .iter_mut()
        .flat_map(|g| g.items.iter_mut())
        .filter(|i| i.id == update.item_id)
        .flat_map(|i| i.sets.iter_mut())
        .find(|s| s.set_number == update.set_number)
    else {
        return;
    };
    set.weight = update.weight;
    set.reps = update.reps;
    set.rpe = update.rpe;
    set.is_done = update.is_done;
    set.completed_at = if update.is_done {
        set.completed_at.or(Some(now))
    } else {
        None
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use workout_core::model::{
        DayId, GroupKind, RepRange, RestOverrides, RestPlan, RoutineId, Session, SessionGroup,
        SessionGroupId, SessionId, SessionItem, SessionItemId, SessionStatus, SetEntry, UserId,
    };
    use workout_core::time::fixed_now;

    fn view() -> SessionView {
        let item = |id: u64, exercise: u64| SessionItem {
            id: SessionItemId::new(id),
            exercise_id: workout_core::model::ExerciseId::new(exercise),
            target_sets_total: 2,
            rep_range: RepRange::new(8, 12).unwrap(),
            notes: None,
            sets: (1..=2).map(SetEntry::planned).collect(),
        };
        SessionView {
            session: Session {
                id: SessionId::new(1),
                user_id: UserId::new(1),
                routine_id: RoutineId::new(1),
                day_id: DayId::new(1),
                status: SessionStatus::Active,
                pointer: Pointer::origin(),
                rest_overrides: RestOverrides::default(),
                started_at: fixed_now(),
                ended_at: None,
                groups: vec![SessionGroup {
                    id: SessionGroupId::new(10),
                    kind: GroupKind::Superset2,
                    rounds_total: 2,
                    round_current: 0,
                    rest: RestPlan::default(),
                    items: vec![item(100, 1), item(101, 2)],
                }],
            },
            exercises: Vec::new(),
        }
    }

    fn done(item: u64, set_number: u32) -> ProgressUpdate {
        ProgressUpdate {
            event_id: None,
            current_pointer: None,
            set_update: Some(SetUpdate {
                item_id: SessionItemId::new(item),
                set_number,
                weight: Some(50.0),
                reps: Some(9),
                rpe: None,
                is_done: true,
            }),
        }
    }

    #[test]
    fn apply_marks_set_done_and_stamps_completion() {
        let mut cache = SessionCache::new();
        cache.replace(Some(view()));

        cache.apply(&done(100, 1), fixed_now());

        let set = &cache.view().unwrap().session.groups[0].items[0].sets[0];
        assert!(set.is_done);
        assert_eq!(set.completed_at, Some(fixed_now()));
    }

    #[test]
    fn undoing_a_set_clears_the_completion_stamp() {
        let mut cache = SessionCache::new();
        cache.replace(Some(view()));
        cache.apply(&done(100, 1), fixed_now());

        let mut undo = done(100, 1);
        undo.set_update.as_mut().unwrap().is_done = false;
        cache.apply(&undo, fixed_now());

        let set = &cache.view().unwrap().session.groups[0].items[0].sets[0];
        assert!(!set.is_done);
        assert_eq!(set.completed_at, None);
    }

    #[test]
    fn advance_walks_the_superset_and_exhausts() {
        let mut cache = SessionCache::new();
        cache.replace(Some(view()));

        let mut positions = Vec::new();
        while let Some(p) = cache.advance() {
            positions.push(p);
        }
        // 2 items x 2 rounds, minus the origin already occupied.
        assert_eq!(positions.len(), 3);
        assert_eq!(
            positions.last().unwrap(),
            &Pointer {
                group_index: 0,
                exercise_index: 1,
                set_index: 1,
                round_index: 1,
            }
        );
    }

    #[test]
    fn apply_on_empty_cache_is_a_no_op() {
        let mut cache = SessionCache::new();
        cache.apply(&done(100, 1), fixed_now());
        assert!(cache.view().is_none());
        assert!(cache.advance().is_none());
    }

    #[test]
    fn unknown_set_target_leaves_cache_untouched() {
        let mut cache = SessionCache::new();
        cache.replace(Some(view()));
        let before = cache.view().unwrap().clone();

        cache.apply(&done(999, 1), fixed_now());
        assert_eq!(cache.view().unwrap(), &before);
    }
}
