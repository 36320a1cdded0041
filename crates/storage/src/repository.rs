use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use thiserror::Error;

use workout_core::Pointer;
use workout_core::model::{
    DayId, EventId, ExerciseId, ExerciseMeta, RoutineDay, RoutineId, Session, SessionGroup,
    SessionGroupId, SessionId, SessionItem, SessionItemId, SessionStatus, SetUpdate, UserId,
};
use workout_core::snapshot::SessionDraft;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Outcome of a progress mutation at the storage boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressOutcome {
    /// The mutation was applied and committed.
    Applied,
    /// The `(session_id, event_id)` fact already existed; nothing was
    /// reapplied.
    DuplicateEvent,
}

/// Read-only access to routine definitions (owned by routine storage).
#[async_trait]
pub trait RoutineRepository: Send + Sync {
    /// Fetch a routine day definition with its groups and slots.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the routine or day is missing.
    async fn get_day(&self, routine_id: RoutineId, day_id: DayId)
    -> Result<RoutineDay, StorageError>;

    /// Whether the user owns the routine or holds an active assignment to it.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the routine does not exist.
    async fn user_can_access(
        &self,
        user_id: UserId,
        routine_id: RoutineId,
    ) -> Result<bool, StorageError>;
}

/// Read-only exercise display metadata (owned by the exercise catalog).
#[async_trait]
pub trait ExerciseCatalog: Send + Sync {
    /// Fetch metadata for the given exercises. Unknown ids are skipped;
    /// the join is presentation convenience, not state.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on connection or mapping failures.
    async fn get_exercises(&self, ids: &[ExerciseId]) -> Result<Vec<ExerciseMeta>, StorageError>;
}

/// Persistence contract for sessions and their frozen subtrees.
///
/// Each mutating method runs as a single atomic transaction; the
/// one-active-session-per-user invariant is enforced here, not in callers.
#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Persist a new session tree for the user, in one transaction: any
    /// existing `Active` session is moved to `Paused`, then the draft is
    /// inserted breadth-first (session, groups, items, sets) with pointer
    /// `{0,0,0,0}` and status `Active`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the tree cannot be stored.
    async fn create_session(
        &self,
        user_id: UserId,
        draft: &SessionDraft,
        started_at: DateTime<Utc>,
    ) -> Result<Session, StorageError>;

    /// Fetch the user's `Active` session with its full subtree, if any.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on connection or mapping failures.
    async fn get_active_session(&self, user_id: UserId)
    -> Result<Option<Session>, StorageError>;

    /// Fetch a session by id with its full subtree.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if missing.
    async fn get_session(&self, session_id: SessionId) -> Result<Session, StorageError>;

    /// Apply a progress mutation in one transaction: record the event fact
    /// (when present), then overwrite the pointer and/or the addressed set.
    ///
    /// A duplicate `(session_id, event_id)` short-circuits to
    /// `ProgressOutcome::DuplicateEvent` without touching session state.
    /// When `is_done` transitions true the set's `completed_at` is stamped
    /// (and preserved if already stamped); when false it is cleared.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the session is missing or no
    /// longer `Active`, or if the addressed `(item, set_number)` row does
    /// not exist. A failed mutation leaves no event fact behind, so the
    /// same event redelivered later still applies.
    async fn apply_progress(
        &self,
        session_id: SessionId,
        event_id: Option<EventId>,
        pointer: Option<Pointer>,
        set_update: Option<&SetUpdate>,
        now: DateTime<Utc>,
    ) -> Result<ProgressOutcome, StorageError>;

    /// Move a session to a new lifecycle status, stamping `ended_at` when
    /// provided.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the session does not exist.
    async fn set_status(
        &self,
        session_id: SessionId,
        status: SessionStatus,
        ended_at: Option<DateTime<Utc>>,
    ) -> Result<(), StorageError>;

    /// Reactivate a paused session, pausing the user's current `Active`
    /// session in the same transaction.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the session does not exist.
    async fn activate_session(
        &self,
        user_id: UserId,
        session_id: SessionId,
    ) -> Result<(), StorageError>;
}

/// Aggregates the runtime's repositories behind trait objects for easy
/// backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub routines: Arc<dyn RoutineRepository>,
    pub sessions: Arc<dyn SessionRepository>,
    pub exercises: Arc<dyn ExerciseCatalog>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        let repo = InMemoryRepository::new();
        Self::from_in_memory(repo)
    }

    #[must_use]
    pub fn from_in_memory(repo: InMemoryRepository) -> Self {
        let routines: Arc<dyn RoutineRepository> = Arc::new(repo.clone());
        let sessions: Arc<dyn SessionRepository> = Arc::new(repo.clone());
        let exercises: Arc<dyn ExerciseCatalog> = Arc::new(repo);
        Self {
            routines,
            sessions,
            exercises,
        }
    }
}

//
// ─── IN-MEMORY IMPLEMENTATION ──────────────────────────────────────────────────
//

#[derive(Default)]
struct InMemoryState {
    days: HashMap<(RoutineId, DayId), RoutineDay>,
    routine_owners: HashMap<RoutineId, UserId>,
    assignments: HashSet<(RoutineId, UserId)>,
    exercises: HashMap<ExerciseId, ExerciseMeta>,
    sessions: HashMap<SessionId, Session>,
    events: HashSet<(SessionId, EventId)>,
    next_id: u64,
}

impl InMemoryState {
    fn fresh_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

/// Simple in-memory repository implementation for testing and prototyping.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    state: Arc<Mutex<InMemoryState>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, InMemoryState>, StorageError> {
        self.state
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))
    }

    /// Seeds a routine day owned by the given user.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Connection` if the state lock is poisoned.
    pub fn seed_day(&self, owner: UserId, day: RoutineDay) -> Result<(), StorageError> {
        let mut state = self.lock()?;
        state.routine_owners.insert(day.routine_id, owner);
        state.days.insert((day.routine_id, day.day_id), day);
        Ok(())
    }

    /// Grants a user an active assignment to a routine.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Connection` if the state lock is poisoned.
    pub fn seed_assignment(&self, user: UserId, routine: RoutineId) -> Result<(), StorageError> {
        let mut state = self.lock()?;
        state.assignments.insert((routine, user));
        Ok(())
    }

    /// Seeds exercise catalog metadata.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Connection` if the state lock is poisoned.
    pub fn seed_exercise(&self, meta: ExerciseMeta) -> Result<(), StorageError> {
        let mut state = self.lock()?;
        state.exercises.insert(meta.id, meta);
        Ok(())
    }
}

#[async_trait]
impl RoutineRepository for InMemoryRepository {
    async fn get_day(
        &self,
        routine_id: RoutineId,
        day_id: DayId,
    ) -> Result<RoutineDay, StorageError> {
        let state = self.lock()?;
        state
            .days
            .get(&(routine_id, day_id))
            .cloned()
            .ok_or(StorageError::NotFound)
    }

    async fn user_can_access(
        &self,
        user_id: UserId,
        routine_id: RoutineId,
    ) -> Result<bool, StorageError> {
        let state = self.lock()?;
        let owner = state
            .routine_owners
            .get(&routine_id)
            .ok_or(StorageError::NotFound)?;
        Ok(*owner == user_id || state.assignments.contains(&(routine_id, user_id)))
    }
}

#[async_trait]
impl ExerciseCatalog for InMemoryRepository {
    async fn get_exercises(&self, ids: &[ExerciseId]) -> Result<Vec<ExerciseMeta>, StorageError> {
        let state = self.lock()?;
        Ok(ids
            .iter()
            .filter_map(|id| state.exercises.get(id).cloned())
            .collect())
    }
}

#[async_trait]
impl SessionRepository for InMemoryRepository {
    async fn create_session(
        &self,
        user_id: UserId,
        draft: &SessionDraft,
        started_at: DateTime<Utc>,
    ) -> Result<Session, StorageError> {
        let mut state = self.lock()?;

        for session in state.sessions.values_mut() {
            if session.user_id == user_id && session.status == SessionStatus::Active {
                session.status = SessionStatus::Paused;
            }
        }

        let session_id = SessionId::new(state.fresh_id());
        let mut groups = Vec::with_capacity(draft.groups.len());
        for group in &draft.groups {
            let group_id = SessionGroupId::new(state.fresh_id());
            let mut items = Vec::with_capacity(group.items.len());
            for item in &group.items {
                items.push(SessionItem {
                    id: SessionItemId::new(state.fresh_id()),
                    exercise_id: item.exercise_id,
                    target_sets_total: item.target_sets_total,
                    rep_range: item.rep_range,
                    notes: item.notes.clone(),
                    sets: item.sets.clone(),
                });
            }
            groups.push(SessionGroup {
                id: group_id,
                kind: group.kind,
                rounds_total: group.rounds_total,
                round_current: 0,
                rest: group.rest,
                items,
            });
        }

        let session = Session {
            id: session_id,
            user_id,
            routine_id: draft.routine_id,
            day_id: draft.day_id,
            status: SessionStatus::Active,
            pointer: Pointer::origin(),
            rest_overrides: draft.rest_overrides,
            started_at,
            ended_at: None,
            groups,
        };
        state.sessions.insert(session_id, session.clone());
        Ok(session)
    }

    async fn get_active_session(
        &self,
        user_id: UserId,
    ) -> Result<Option<Session>, StorageError> {
        let state = self.lock()?;
        Ok(state
            .sessions
            .values()
            .find(|s| s.user_id == user_id && s.status == SessionStatus::Active)
            .cloned())
    }

    async fn get_session(&self, session_id: SessionId) -> Result<Session, StorageError> {
        let state = self.lock()?;
        state
            .sessions
            .get(&session_id)
            .cloned()
            .ok_or(StorageError::NotFound)
    }

    async fn apply_progress(
        &self,
        session_id: SessionId,
        event_id: Option<EventId>,
        pointer: Option<Pointer>,
        set_update: Option<&SetUpdate>,
        now: DateTime<Utc>,
    ) -> Result<ProgressOutcome, StorageError> {
        let mut state = self.lock()?;
        let status = state
            .sessions
            .get(&session_id)
            .map(|s| s.status)
            .ok_or(StorageError::NotFound)?;
        if status != SessionStatus::Active {
            return Err(StorageError::NotFound);
        }

        if let Some(event_id) = event_id {
            if state.events.contains(&(session_id, event_id)) {
                return Ok(ProgressOutcome::DuplicateEvent);
            }
        }

        let session = state
            .sessions
            .get_mut(&session_id)
            .ok_or(StorageError::NotFound)?;

        // Mutate the set before the pointer so a missing target leaves the
        // session untouched, matching the transactional backend.
        if let Some(update) = set_update {
            let set = session
                .groups
                .iter_mut()
                .flat_map(|g| g.items.iter_mut())
                .filter(|i| i.id == update.item_id)
                .flat_map(|i| i.sets.iter_mut())
                .find(|s| s.set_number == update.set_number)
                .ok_or(StorageError::NotFound)?;

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

        if let Some(pointer) = pointer {
            session.pointer = pointer;
        }

        // The event fact is recorded only once the effects took hold; a
        // failed mutation must not absorb a later redelivery.
        if let Some(event_id) = event_id {
            state.events.insert((session_id, event_id));
        }

        Ok(ProgressOutcome::Applied)
    }

    async fn set_status(
        &self,
        session_id: SessionId,
        status: SessionStatus,
        ended_at: Option<DateTime<Utc>>,
    ) -> Result<(), StorageError> {
        let mut state = self.lock()?;
        let session = state
            .sessions
            .get_mut(&session_id)
            .ok_or(StorageError::NotFound)?;
        session.status = status;
        if ended_at.is_some() {
            session.ended_at = ended_at;
        }
        Ok(())
    }

    async fn activate_session(
        &self,
        user_id: UserId,
        session_id: SessionId,
    ) -> Result<(), StorageError> {
        let mut state = self.lock()?;
        if !state.sessions.contains_key(&session_id) {
            return Err(StorageError::NotFound);
        }
        for session in state.sessions.values_mut() {
            if session.user_id == user_id
                && session.status == SessionStatus::Active
                && session.id != session_id
            {
                session.status = SessionStatus::Paused;
            }
        }
        let session = state
            .sessions
            .get_mut(&session_id)
            .ok_or(StorageError::NotFound)?;
        session.status = SessionStatus::Active;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use workout_core::model::{ExerciseSlot, GroupKind, RepRange, RestOverrides, RestPlan, RoutineGroup};
    use workout_core::snapshot::build_snapshot;
    use workout_core::time::fixed_now;

    fn build_day(routine: u64, day: u64) -> RoutineDay {
        RoutineDay {
            routine_id: RoutineId::new(routine),
            day_id: DayId::new(day),
            groups: vec![RoutineGroup {
                kind: GroupKind::Superset2,
                rounds_total: 3,
                rest: RestPlan::default(),
                slots: vec![
                    ExerciseSlot {
                        exercise_id: ExerciseId::new(1),
                        target_sets_per_round: 1,
                        rep_range: RepRange::new(8, 12).unwrap(),
                        notes: None,
                    },
                    ExerciseSlot {
                        exercise_id: ExerciseId::new(2),
                        target_sets_per_round: 1,
                        rep_range: RepRange::new(8, 12).unwrap(),
                        notes: None,
                    },
                ],
            }],
        }
    }

    fn draft(routine: u64, day: u64) -> SessionDraft {
        build_snapshot(&build_day(routine, day), RestOverrides::default()).unwrap()
    }

    #[tokio::test]
    async fn starting_second_session_pauses_the_first() {
        let repo = InMemoryRepository::new();
        let user = UserId::new(7);

        let first = repo
            .create_session(user, &draft(1, 1), fixed_now())
            .await
            .unwrap();
        let second = repo
            .create_session(user, &draft(1, 2), fixed_now())
            .await
            .unwrap();

        let reloaded_first = repo.get_session(first.id).await.unwrap();
        assert_eq!(reloaded_first.status, SessionStatus::Paused);
        assert_eq!(
            repo.get_active_session(user).await.unwrap().unwrap().id,
            second.id
        );
    }

    #[tokio::test]
    async fn duplicate_event_is_absorbed() {
        let repo = InMemoryRepository::new();
        let user = UserId::new(7);
        let session = repo
            .create_session(user, &draft(1, 1), fixed_now())
            .await
            .unwrap();
        let event = EventId::generate();
        let item_id = session.groups[0].items[0].id;
        let update = SetUpdate {
            item_id,
            set_number: 1,
            weight: Some(60.0),
            reps: Some(10),
            rpe: None,
            is_done: true,
        };

        let first = repo
            .apply_progress(session.id, Some(event), None, Some(&update), fixed_now())
            .await
            .unwrap();
        assert_eq!(first, ProgressOutcome::Applied);

        let second = repo
            .apply_progress(session.id, Some(event), None, Some(&update), fixed_now())
            .await
            .unwrap();
        assert_eq!(second, ProgressOutcome::DuplicateEvent);
    }

    #[tokio::test]
    async fn failed_set_mutation_does_not_consume_the_event() {
        let repo = InMemoryRepository::new();
        let user = UserId::new(7);
        let session = repo
            .create_session(user, &draft(1, 1), fixed_now())
            .await
            .unwrap();
        let event = EventId::generate();
        let item_id = session.groups[0].items[0].id;
        let pointer = Pointer {
            group_index: 0,
            exercise_index: 1,
            set_index: 0,
            round_index: 0,
        };

        let missing = SetUpdate {
            item_id,
            set_number: 99,
            weight: Some(60.0),
            reps: Some(10),
            rpe: None,
            is_done: true,
        };
        let err = repo
            .apply_progress(
                session.id,
                Some(event),
                Some(pointer),
                Some(&missing),
                fixed_now(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::NotFound));

        // Nothing took effect, not even the pointer half of the update.
        let reloaded = repo.get_session(session.id).await.unwrap();
        assert_eq!(reloaded.pointer, Pointer::origin());

        // Redelivery of the same event with a valid target must still apply.
        let valid = SetUpdate {
            set_number: 1,
            ..missing
        };
        let outcome = repo
            .apply_progress(session.id, Some(event), None, Some(&valid), fixed_now())
            .await
            .unwrap();
        assert_eq!(outcome, ProgressOutcome::Applied);
        let reloaded = repo.get_session(session.id).await.unwrap();
        assert!(reloaded.find_item(item_id).unwrap().sets[0].is_done);
    }

    #[tokio::test]
    async fn progress_on_non_active_session_is_rejected() {
        let repo = InMemoryRepository::new();
        let user = UserId::new(7);
        let session = repo
            .create_session(user, &draft(1, 1), fixed_now())
            .await
            .unwrap();
        repo.set_status(session.id, SessionStatus::Finished, Some(fixed_now()))
            .await
            .unwrap();

        let err = repo
            .apply_progress(session.id, None, Some(Pointer::origin()), None, fixed_now())
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::NotFound));
    }

    #[tokio::test]
    async fn activate_pauses_other_active_session() {
        let repo = InMemoryRepository::new();
        let user = UserId::new(3);
        let a = repo
            .create_session(user, &draft(1, 1), fixed_now())
            .await
            .unwrap();
        let b = repo
            .create_session(user, &draft(1, 2), fixed_now())
            .await
            .unwrap();

        repo.activate_session(user, a.id).await.unwrap();

        assert_eq!(
            repo.get_session(a.id).await.unwrap().status,
            SessionStatus::Active
        );
        assert_eq!(
            repo.get_session(b.id).await.unwrap().status,
            SessionStatus::Paused
        );
    }
}
