//! Seeding helpers for the read-only source tables.
//!
//! Routine definitions and the exercise catalog are owned by external
//! collaborators in production; these helpers exist so integration tests and
//! the dev `seed` command can populate them locally.

use workout_core::model::{ExerciseMeta, RoutineDay, RoutineId, UserId};

use super::SqliteRepository;
use super::mapping::id_i64;
use crate::repository::StorageError;

fn conn<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Connection(e.to_string())
}

impl SqliteRepository {
    /// Inserts a routine day definition owned by the given user, replacing
    /// any previous definition of the same day.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if any insert fails.
    pub async fn seed_routine_day(
        &self,
        owner: UserId,
        name: &str,
        day: &RoutineDay,
    ) -> Result<(), StorageError> {
        let routine = id_i64("routine_id", day.routine_id.value())?;
        let day_id = id_i64("day_id", day.day_id.value())?;

        let mut tx = self.pool.begin().await.map_err(conn)?;

        sqlx::query(
            r"
            INSERT INTO routines (id, owner_user_id, name)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(id) DO UPDATE SET owner_user_id = excluded.owner_user_id,
                                          name = excluded.name
            ",
        )
        .bind(routine)
        .bind(id_i64("owner_user_id", owner.value())?)
        .bind(name)
        .execute(&mut *tx)
        .await
        .map_err(conn)?;

        sqlx::query("DELETE FROM routine_days WHERE id = ?1 AND routine_id = ?2")
            .bind(day_id)
            .bind(routine)
            .execute(&mut *tx)
            .await
            .map_err(conn)?;

        sqlx::query("INSERT INTO routine_days (id, routine_id) VALUES (?1, ?2)")
            .bind(day_id)
            .bind(routine)
            .execute(&mut *tx)
            .await
            .map_err(conn)?;

        for (position, group) in day.groups.iter().enumerate() {
            let res = sqlx::query(
                r"
                INSERT INTO routine_groups (
                    routine_id, day_id, position, kind, rounds_total,
                    rest_between_exercises_seconds, rest_after_round_seconds,
                    rest_after_set_seconds
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                ",
            )
            .bind(routine)
            .bind(day_id)
            .bind(i64::try_from(position).map_err(|e| conn(e))?)
            .bind(group.kind.as_str())
            .bind(i64::from(group.rounds_total))
            .bind(i64::from(group.rest.between_exercises_seconds))
            .bind(i64::from(group.rest.after_round_seconds))
            .bind(i64::from(group.rest.after_set_seconds))
            .execute(&mut *tx)
            .await
            .map_err(conn)?;
            let group_rowid = res.last_insert_rowid();

            for (slot_position, slot) in group.slots.iter().enumerate() {
                sqlx::query(
                    r"
                    INSERT INTO routine_slots (
                        group_id, position, exercise_id, target_sets_per_round,
                        rep_min, rep_max, notes
                    )
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                    ",
                )
                .bind(group_rowid)
                .bind(i64::try_from(slot_position).map_err(|e| conn(e))?)
                .bind(id_i64("exercise_id", slot.exercise_id.value())?)
                .bind(i64::from(slot.target_sets_per_round))
                .bind(i64::from(slot.rep_range.min()))
                .bind(i64::from(slot.rep_range.max()))
                .bind(slot.notes.as_deref())
                .execute(&mut *tx)
                .await
                .map_err(conn)?;
            }
        }

        tx.commit().await.map_err(conn)?;
        Ok(())
    }

    /// Grants a user an active assignment to a routine.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the insert fails.
    pub async fn seed_assignment(
        &self,
        user: UserId,
        routine: RoutineId,
    ) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO routine_assignments (routine_id, user_id, is_active)
            VALUES (?1, ?2, 1)
            ON CONFLICT(routine_id, user_id) DO UPDATE SET is_active = 1
            ",
        )
        .bind(id_i64("routine_id", routine.value())?)
        .bind(id_i64("user_id", user.value())?)
        .execute(&self.pool)
        .await
        .map_err(conn)?;
        Ok(())
    }

    /// Inserts or updates exercise catalog metadata.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the insert fails.
    pub async fn seed_exercise(&self, meta: &ExerciseMeta) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO exercises (id, name, description, media_url)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(id) DO UPDATE SET name = excluded.name,
                                          description = excluded.description,
                                          media_url = excluded.media_url
            ",
        )
        .bind(id_i64("exercise_id", meta.id.value())?)
        .bind(meta.name.as_str())
        .bind(meta.description.as_deref())
        .bind(meta.media_url.as_deref())
        .execute(&self.pool)
        .await
        .map_err(conn)?;
        Ok(())
    }
}
