use std::sync::Arc;

use storage::repository::{
    ExerciseCatalog, ProgressOutcome, RoutineRepository, SessionRepository, Storage,
};
use workout_core::Clock;
use workout_core::model::{
    DayId, ProgressUpdate, RestOverrides, RoutineId, SessionId, SessionStatus, SessionView, UserId,
};
use workout_core::snapshot::build_snapshot;

use super::view::build_view;
use crate::error::SessionError;

/// Input for starting a session against a routine day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartRequest {
    pub routine_id: RoutineId,
    pub day_id: DayId,
    pub overrides: RestOverrides,
}

/// Orchestrates the workout session runtime: snapshot construction, progress
/// mutation, and lifecycle transitions.
///
/// All state lives behind the repositories; this service is cheap to clone
/// and holds no session data of its own.
#[derive(Clone)]
pub struct SessionRuntimeService {
    clock: Clock,
    routines: Arc<dyn RoutineRepository>,
    sessions: Arc<dyn SessionRepository>,
    exercises: Arc<dyn ExerciseCatalog>,
}

impl SessionRuntimeService {
    #[must_use]
    pub fn new(
        clock: Clock,
        routines: Arc<dyn RoutineRepository>,
        sessions: Arc<dyn SessionRepository>,
        exercises: Arc<dyn ExerciseCatalog>,
    ) -> Self {
        Self {
            clock,
            routines,
            sessions,
            exercises,
        }
    }

    #[must_use]
    pub fn from_storage(clock: Clock, storage: &Storage) -> Self {
        Self::new(
            clock,
            Arc::clone(&storage.routines),
            Arc::clone(&storage.sessions),
            Arc::clone(&storage.exercises),
        )
    }

    /// Start a new session: freeze the routine day into a snapshot and
    /// persist it, pausing any session the user already had active.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::NotFound` if the routine or day is missing,
    /// `SessionError::Forbidden` if the caller neither owns the routine nor
    /// holds an active assignment, `SessionError::Snapshot` for unusable
    /// source shapes, and storage failures otherwise.
    pub async fn start(
        &self,
        user_id: UserId,
        request: StartRequest,
    ) -> Result<SessionView, SessionError> {
        let can_access = self
            .routines
            .user_can_access(user_id, request.routine_id)
            .await
            .map_err(SessionError::from_storage)?;
        if !can_access {
            return Err(SessionError::Forbidden);
        }

        let day = self
            .routines
            .get_day(request.routine_id, request.day_id)
            .await
            .map_err(SessionError::from_storage)?;

        let draft = build_snapshot(&day, request.overrides)?;
        let session = self
            .sessions
            .create_session(user_id, &draft, self.clock.now())
            .await
            .map_err(SessionError::from_storage)?;

        build_view(&self.exercises, session).await
    }

    /// Fetch the caller's current `Active` session, if any.
    ///
    /// # Errors
    ///
    /// Returns storage failures.
    pub async fn get_active(
        &self,
        user_id: UserId,
    ) -> Result<Option<SessionView>, SessionError> {
        let Some(session) = self
            .sessions
            .get_active_session(user_id)
            .await
            .map_err(SessionError::from_storage)?
        else {
            return Ok(None);
        };
        Ok(Some(build_view(&self.exercises, session).await?))
    }

    /// Apply a progress mutation against the caller's active session.
    ///
    /// A duplicate `event_id` is absorbed: the mutation is not reapplied and
    /// the session's current state is returned unchanged. A mutation without
    /// an event id always applies (pointer saves are last-write-wins).
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Validation` for an empty or malformed update,
    /// `SessionError::NotFound` if the caller has no active session or the
    /// addressed set does not exist, and `SessionError::Forbidden` if the
    /// targeted item is not part of the caller's active session.
    pub async fn patch_progress(
        &self,
        user_id: UserId,
        update: ProgressUpdate,
    ) -> Result<SessionView, SessionError> {
        if update.is_empty() {
            return Err(SessionError::Validation(
                "progress update carries no mutation".to_string(),
            ));
        }
        if let Some(set_update) = &update.set_update {
            if set_update.set_number == 0 {
                return Err(SessionError::Validation(
                    "set_number is 1-based".to_string(),
                ));
            }
        }

        let active = self
            .sessions
            .get_active_session(user_id)
            .await
            .map_err(SessionError::from_storage)?
            .ok_or(SessionError::NotFound)?;

        if let Some(set_update) = &update.set_update {
            if active.find_item(set_update.item_id).is_none() {
                return Err(SessionError::Forbidden);
            }
        }

        let outcome = self
            .sessions
            .apply_progress(
                active.id,
                update.event_id,
                update.current_pointer,
                update.set_update.as_ref(),
                self.clock.now(),
            )
            .await
            .map_err(SessionError::from_storage)?;

        // Applied or absorbed duplicate: either way the answer is the
        // session's current persisted state.
        debug_assert!(matches!(
            outcome,
            ProgressOutcome::Applied | ProgressOutcome::DuplicateEvent
        ));
        let session = self
            .sessions
            .get_session(active.id)
            .await
            .map_err(SessionError::from_storage)?;
        build_view(&self.exercises, session).await
    }

    /// Reactivate one of the caller's paused sessions, pausing whichever
    /// session is currently active in the same transaction.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::NotFound` for a missing session,
    /// `SessionError::Forbidden` for someone else's session, and
    /// `SessionError::Validation` for a finished one.
    pub async fn resume(
        &self,
        user_id: UserId,
        session_id: SessionId,
    ) -> Result<SessionView, SessionError> {
        let session = self
            .sessions
            .get_session(session_id)
            .await
            .map_err(SessionError::from_storage)?;
        if session.user_id != user_id {
            return Err(SessionError::Forbidden);
        }
        match session.status {
            SessionStatus::Finished => {
                return Err(SessionError::Validation(
                    "cannot resume a finished session".to_string(),
                ));
            }
            SessionStatus::Active => return build_view(&self.exercises, session).await,
            SessionStatus::Paused => {}
        }

        self.sessions
            .activate_session(user_id, session_id)
            .await
            .map_err(SessionError::from_storage)?;

        let session = self
            .sessions
            .get_session(session_id)
            .await
            .map_err(SessionError::from_storage)?;
        build_view(&self.exercises, session).await
    }

    /// Mark a session `Finished` and stamp its end timestamp. Finishing an
    /// already finished session is absorbed.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::NotFound` for a missing session and
    /// `SessionError::Forbidden` for someone else's session.
    pub async fn finish(
        &self,
        user_id: UserId,
        session_id: SessionId,
    ) -> Result<SessionView, SessionError> {
        let session = self
            .sessions
            .get_session(session_id)
            .await
            .map_err(SessionError::from_storage)?;
        if session.user_id != user_id {
            return Err(SessionError::Forbidden);
        }
        if session.status == SessionStatus::Finished {
            return build_view(&self.exercises, session).await;
        }

        self.sessions
            .set_status(session_id, SessionStatus::Finished, Some(self.clock.now()))
            .await
            .map_err(SessionError::from_storage)?;

        let session = self
            .sessions
            .get_session(session_id)
            .await
            .map_err(SessionError::from_storage)?;
        build_view(&self.exercises, session).await
    }
}
