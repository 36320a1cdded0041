use std::collections::HashMap;

use chrono::{DateTime, Utc};

use workout_core::Pointer;
use workout_core::model::{
    EventId, Session, SessionGroup, SessionGroupId, SessionId, SessionItem, SessionItemId,
    SessionStatus, SetUpdate, UserId,
};
use workout_core::snapshot::SessionDraft;

use super::SqliteRepository;
use super::mapping::{id_i64, map_group_row, map_item_row, map_session_row, map_set_row, ser};
use crate::repository::{ProgressOutcome, SessionRepository, StorageError};

fn conn<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Connection(e.to_string())
}

const SESSION_COLUMNS: &str = r"
    id, user_id, routine_id, day_id, status,
    ptr_group, ptr_exercise, ptr_set, ptr_round,
    override_rest_between_exercises_seconds,
    override_rest_after_round_seconds,
    override_rest_after_set_seconds,
    started_at, ended_at
";

impl SqliteRepository {
    /// Attaches the full group/item/set subtree to a mapped session row.
    async fn load_tree(&self, mut session: Session) -> Result<Session, StorageError> {
        let session_id = id_i64("session_id", session.id.value())?;

        let group_rows = sqlx::query(
            r"
            SELECT
                id, kind, rounds_total, round_current,
                rest_between_exercises_seconds, rest_after_round_seconds,
                rest_after_set_seconds
            FROM session_groups
            WHERE session_id = ?1
            ORDER BY position ASC
            ",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        let item_rows = sqlx::query(
            r"
            SELECT
                i.id, i.group_id, i.exercise_id, i.target_sets_total,
                i.rep_min, i.rep_max, i.notes
            FROM session_items i
            JOIN session_groups g ON g.id = i.group_id
            WHERE g.session_id = ?1
            ORDER BY g.position ASC, i.position ASC
            ",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        let set_rows = sqlx::query(
            r"
            SELECT s.item_id, s.set_number, s.weight, s.reps, s.rpe, s.is_done, s.completed_at
            FROM session_sets s
            JOIN session_items i ON i.id = s.item_id
            JOIN session_groups g ON g.id = i.group_id
            WHERE g.session_id = ?1
            ORDER BY s.set_number ASC
            ",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        let mut sets_by_item: HashMap<SessionItemId, Vec<_>> = HashMap::new();
        for row in &set_rows {
            let (item_id, entry) = map_set_row(row)?;
            sets_by_item.entry(item_id).or_default().push(entry);
        }

        let mut items_by_group: HashMap<SessionGroupId, Vec<SessionItem>> = HashMap::new();
        for row in &item_rows {
            let item = map_item_row(row)?;
            items_by_group
                .entry(item.group_id)
                .or_default()
                .push(SessionItem {
                    id: item.id,
                    exercise_id: item.exercise_id,
                    target_sets_total: item.target_sets_total,
                    rep_range: item.rep_range,
                    notes: item.notes,
                    sets: sets_by_item.remove(&item.id).unwrap_or_default(),
                });
        }

        let mut groups = Vec::with_capacity(group_rows.len());
        for row in &group_rows {
            let group = map_group_row(row)?;
            groups.push(SessionGroup {
                id: group.id,
                kind: group.kind,
                rounds_total: group.rounds_total,
                round_current: group.round_current,
                rest: group.rest,
                items: items_by_group.remove(&group.id).unwrap_or_default(),
            });
        }

        session.groups = groups;
        Ok(session)
    }
}

#[async_trait::async_trait]
impl SessionRepository for SqliteRepository {
    async fn create_session(
        &self,
        user_id: UserId,
        draft: &SessionDraft,
        started_at: DateTime<Utc>,
    ) -> Result<Session, StorageError> {
        let user = id_i64("user_id", user_id.value())?;
        let routine = id_i64("routine_id", draft.routine_id.value())?;
        let day = id_i64("day_id", draft.day_id.value())?;

        let mut tx = self.pool.begin().await.map_err(conn)?;

        // Pause-then-insert keeps the one-active-per-user invariant inside
        // this transaction; the partial unique index backs it up.
        sqlx::query(
            r"
            UPDATE sessions SET status = 'paused'
            WHERE user_id = ?1 AND status = 'active'
            ",
        )
        .bind(user)
        .execute(&mut *tx)
        .await
        .map_err(conn)?;

        let res = sqlx::query(
            r"
            INSERT INTO sessions (
                user_id, routine_id, day_id, status,
                ptr_group, ptr_exercise, ptr_set, ptr_round,
                override_rest_between_exercises_seconds,
                override_rest_after_round_seconds,
                override_rest_after_set_seconds,
                started_at, ended_at
            )
            VALUES (?1, ?2, ?3, 'active', 0, 0, 0, 0, ?4, ?5, ?6, ?7, NULL)
            ",
        )
        .bind(user)
        .bind(routine)
        .bind(day)
        .bind(draft.rest_overrides.rest_between_exercises_seconds.map(i64::from))
        .bind(draft.rest_overrides.rest_after_round_seconds.map(i64::from))
        .bind(draft.rest_overrides.rest_after_set_seconds.map(i64::from))
        .bind(started_at)
        .execute(&mut *tx)
        .await
        .map_err(conn)?;
        let session_rowid = res.last_insert_rowid();

        // Breadth-first persist: groups, then items, then a batch of sets per
        // item, threading generated ids back as we go.
        let mut groups = Vec::with_capacity(draft.groups.len());
        for (group_position, group) in draft.groups.iter().enumerate() {
            let res = sqlx::query(
                r"
                INSERT INTO session_groups (
                    session_id, position, kind, rounds_total, round_current,
                    rest_between_exercises_seconds, rest_after_round_seconds,
                    rest_after_set_seconds
                )
                VALUES (?1, ?2, ?3, ?4, 0, ?5, ?6, ?7)
                ",
            )
            .bind(session_rowid)
            .bind(i64::try_from(group_position).map_err(ser)?)
            .bind(group.kind.as_str())
            .bind(i64::from(group.rounds_total))
            .bind(i64::from(group.rest.between_exercises_seconds))
            .bind(i64::from(group.rest.after_round_seconds))
            .bind(i64::from(group.rest.after_set_seconds))
            .execute(&mut *tx)
            .await
            .map_err(conn)?;
            let group_rowid = res.last_insert_rowid();

            let mut items = Vec::with_capacity(group.items.len());
            for (item_position, item) in group.items.iter().enumerate() {
                let res = sqlx::query(
                    r"
                    INSERT INTO session_items (
                        group_id, position, exercise_id, target_sets_total,
                        rep_min, rep_max, notes
                    )
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                    ",
                )
                .bind(group_rowid)
                .bind(i64::try_from(item_position).map_err(ser)?)
                .bind(id_i64("exercise_id", item.exercise_id.value())?)
                .bind(i64::from(item.target_sets_total))
                .bind(i64::from(item.rep_range.min()))
                .bind(i64::from(item.rep_range.max()))
                .bind(item.notes.as_deref())
                .execute(&mut *tx)
                .await
                .map_err(conn)?;
                let item_rowid = res.last_insert_rowid();

                if !item.sets.is_empty() {
                    let mut sql =
                        String::from("INSERT INTO session_sets (item_id, set_number) VALUES ");
                    for (i, _) in item.sets.iter().enumerate() {
                        if i > 0 {
                            sql.push_str(", ");
                        }
                        sql.push_str(&format!("(?{}, ?{})", i * 2 + 1, i * 2 + 2));
                    }
                    let mut q = sqlx::query(&sql);
                    for set in &item.sets {
                        q = q.bind(item_rowid).bind(i64::from(set.set_number));
                    }
                    q.execute(&mut *tx).await.map_err(conn)?;
                }

                items.push(SessionItem {
                    id: SessionItemId::new(
                        u64::try_from(item_rowid).map_err(|_| ser("item rowid"))?,
                    ),
                    exercise_id: item.exercise_id,
                    target_sets_total: item.target_sets_total,
                    rep_range: item.rep_range,
                    notes: item.notes.clone(),
                    sets: item.sets.clone(),
                });
            }

            groups.push(SessionGroup {
                id: SessionGroupId::new(
                    u64::try_from(group_rowid).map_err(|_| ser("group rowid"))?,
                ),
                kind: group.kind,
                rounds_total: group.rounds_total,
                round_current: 0,
                rest: group.rest,
                items,
            });
        }

        tx.commit().await.map_err(conn)?;

        Ok(Session {
            id: SessionId::new(u64::try_from(session_rowid).map_err(|_| ser("session rowid"))?),
            user_id,
            routine_id: draft.routine_id,
            day_id: draft.day_id,
            status: SessionStatus::Active,
            pointer: Pointer::origin(),
            rest_overrides: draft.rest_overrides,
            started_at,
            ended_at: None,
            groups,
        })
    }

    async fn get_active_session(
        &self,
        user_id: UserId,
    ) -> Result<Option<Session>, StorageError> {
        let user = id_i64("user_id", user_id.value())?;
        let sql = format!(
            "SELECT {SESSION_COLUMNS} FROM sessions WHERE user_id = ?1 AND status = 'active'"
        );

        let Some(row) = sqlx::query(&sql)
            .bind(user)
            .fetch_optional(&self.pool)
            .await
            .map_err(conn)?
        else {
            return Ok(None);
        };

        let session = map_session_row(&row)?;
        Ok(Some(self.load_tree(session).await?))
    }

    async fn get_session(&self, session_id: SessionId) -> Result<Session, StorageError> {
        let id = id_i64("session_id", session_id.value())?;
        let sql = format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE id = ?1");

        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(conn)?
            .ok_or(StorageError::NotFound)?;

        let session = map_session_row(&row)?;
        self.load_tree(session).await
    }

    async fn apply_progress(
        &self,
        session_id: SessionId,
        event_id: Option<EventId>,
        pointer: Option<Pointer>,
        set_update: Option<&SetUpdate>,
        now: DateTime<Utc>,
    ) -> Result<ProgressOutcome, StorageError> {
        let id = id_i64("session_id", session_id.value())?;

        let mut tx = self.pool.begin().await.map_err(conn)?;

        // The status guard closes the window between a caller's active-session
        // lookup and this transaction: a concurrently finished or paused
        // session no longer accepts mutations.
        sqlx::query("SELECT 1 FROM sessions WHERE id = ?1 AND status = 'active'")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(conn)?
            .ok_or(StorageError::NotFound)?;

        // Record the event fact first; a duplicate means a redelivery of a
        // mutation that already took effect.
        if let Some(event_id) = event_id {
            let res = sqlx::query(
                r"
                INSERT INTO session_events (session_id, event_id, recorded_at)
                VALUES (?1, ?2, ?3)
                ON CONFLICT(session_id, event_id) DO NOTHING
                ",
            )
            .bind(id)
            .bind(event_id.to_string())
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(conn)?;

            if res.rows_affected() == 0 {
                tx.rollback().await.map_err(conn)?;
                return Ok(ProgressOutcome::DuplicateEvent);
            }
        }

        if let Some(pointer) = pointer {
            sqlx::query(
                r"
                UPDATE sessions
                SET ptr_group = ?1, ptr_exercise = ?2, ptr_set = ?3, ptr_round = ?4
                WHERE id = ?5
                ",
            )
            .bind(i64::try_from(pointer.group_index).map_err(ser)?)
            .bind(i64::try_from(pointer.exercise_index).map_err(ser)?)
            .bind(i64::try_from(pointer.set_index).map_err(ser)?)
            .bind(i64::try_from(pointer.round_index).map_err(ser)?)
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(conn)?;
        }

        if let Some(update) = set_update {
            let res = sqlx::query(
                r"
                UPDATE session_sets
                SET weight = ?1,
                    reps = ?2,
                    rpe = ?3,
                    is_done = ?4,
                    completed_at = CASE
                        WHEN ?4 THEN COALESCE(completed_at, ?5)
                        ELSE NULL
                    END
                WHERE item_id = ?6 AND set_number = ?7
                ",
            )
            .bind(update.weight)
            .bind(update.reps.map(i64::from))
            .bind(update.rpe)
            .bind(update.is_done)
            .bind(now)
            .bind(id_i64("item_id", update.item_id.value())?)
            .bind(i64::from(update.set_number))
            .execute(&mut *tx)
            .await
            .map_err(conn)?;

            if res.rows_affected() == 0 {
                return Err(StorageError::NotFound);
            }
        }

        tx.commit().await.map_err(conn)?;
        Ok(ProgressOutcome::Applied)
    }

    async fn set_status(
        &self,
        session_id: SessionId,
        status: SessionStatus,
        ended_at: Option<DateTime<Utc>>,
    ) -> Result<(), StorageError> {
        let id = id_i64("session_id", session_id.value())?;

        let res = sqlx::query(
            r"
            UPDATE sessions
            SET status = ?1, ended_at = COALESCE(?2, ended_at)
            WHERE id = ?3
            ",
        )
        .bind(status.as_str())
        .bind(ended_at)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        if res.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }

    async fn activate_session(
        &self,
        user_id: UserId,
        session_id: SessionId,
    ) -> Result<(), StorageError> {
        let user = id_i64("user_id", user_id.value())?;
        let id = id_i64("session_id", session_id.value())?;

        let mut tx = self.pool.begin().await.map_err(conn)?;

        sqlx::query("SELECT 1 FROM sessions WHERE id = ?1 AND user_id = ?2")
            .bind(id)
            .bind(user)
            .fetch_optional(&mut *tx)
            .await
            .map_err(conn)?
            .ok_or(StorageError::NotFound)?;

        sqlx::query(
            r"
            UPDATE sessions SET status = 'paused'
            WHERE user_id = ?1 AND status = 'active' AND id != ?2
            ",
        )
        .bind(user)
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(conn)?;

        sqlx::query("UPDATE sessions SET status = 'active' WHERE id = ?1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(conn)?;

        tx.commit().await.map_err(conn)?;
        Ok(())
    }
}
