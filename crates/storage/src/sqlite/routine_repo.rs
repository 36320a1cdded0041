use sqlx::Row;

use workout_core::model::{
    DayId, ExerciseId, ExerciseSlot, RestPlan, RoutineDay, RoutineGroup, RoutineId, UserId,
};

use super::SqliteRepository;
use super::mapping::{id_i64, parse_group_kind, rep_range_from_row, ser};
use crate::repository::{RoutineRepository, StorageError};

#[async_trait::async_trait]
impl RoutineRepository for SqliteRepository {
    async fn get_day(
        &self,
        routine_id: RoutineId,
        day_id: DayId,
    ) -> Result<RoutineDay, StorageError> {
        let routine = id_i64("routine_id", routine_id.value())?;
        let day = id_i64("day_id", day_id.value())?;

        sqlx::query("SELECT 1 FROM routine_days WHERE id = ?1 AND routine_id = ?2")
            .bind(day)
            .bind(routine)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?
            .ok_or(StorageError::NotFound)?;

        let group_rows = sqlx::query(
            r"
            SELECT
                id, kind, rounds_total, rest_between_exercises_seconds,
                rest_after_round_seconds, rest_after_set_seconds
            FROM routine_groups
            WHERE day_id = ?1 AND routine_id = ?2
            ORDER BY position ASC
            ",
        )
        .bind(day)
        .bind(routine)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        let mut groups = Vec::with_capacity(group_rows.len());
        for row in group_rows {
            let group_id: i64 = row.try_get("id").map_err(ser)?;
            let kind_str: String = row.try_get("kind").map_err(ser)?;

            let slot_rows = sqlx::query(
                r"
                SELECT exercise_id, target_sets_per_round, rep_min, rep_max, notes
                FROM routine_slots
                WHERE group_id = ?1
                ORDER BY position ASC
                ",
            )
            .bind(group_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

            let mut slots = Vec::with_capacity(slot_rows.len());
            for slot in slot_rows {
                let exercise: i64 = slot.try_get("exercise_id").map_err(ser)?;
                let per_round: i64 = slot.try_get("target_sets_per_round").map_err(ser)?;
                slots.push(ExerciseSlot {
                    exercise_id: ExerciseId::new(
                        u64::try_from(exercise)
                            .map_err(|_| StorageError::Serialization("exercise_id".into()))?,
                    ),
                    target_sets_per_round: u32::try_from(per_round).map_err(|_| {
                        StorageError::Serialization(format!(
                            "invalid target_sets_per_round: {per_round}"
                        ))
                    })?,
                    rep_range: rep_range_from_row(
                        slot.try_get::<i64, _>("rep_min").map_err(ser)?,
                        slot.try_get::<i64, _>("rep_max").map_err(ser)?,
                    )?,
                    notes: slot.try_get("notes").map_err(ser)?,
                });
            }

            let rest = RestPlan {
                between_exercises_seconds: u32::try_from(
                    row.try_get::<i64, _>("rest_between_exercises_seconds")
                        .map_err(ser)?,
                )
                .map_err(|_| StorageError::Serialization("rest_between_exercises".into()))?,
                after_round_seconds: u32::try_from(
                    row.try_get::<i64, _>("rest_after_round_seconds").map_err(ser)?,
                )
                .map_err(|_| StorageError::Serialization("rest_after_round".into()))?,
                after_set_seconds: u32::try_from(
                    row.try_get::<i64, _>("rest_after_set_seconds").map_err(ser)?,
                )
                .map_err(|_| StorageError::Serialization("rest_after_set".into()))?,
            };

            groups.push(RoutineGroup {
                kind: parse_group_kind(&kind_str)?,
                rounds_total: u32::try_from(row.try_get::<i64, _>("rounds_total").map_err(ser)?)
                    .map_err(|_| StorageError::Serialization("rounds_total".into()))?,
                rest,
                slots,
            });
        }

        Ok(RoutineDay {
            routine_id,
            day_id,
            groups,
        })
    }

    async fn user_can_access(
        &self,
        user_id: UserId,
        routine_id: RoutineId,
    ) -> Result<bool, StorageError> {
        let routine = id_i64("routine_id", routine_id.value())?;
        let user = id_i64("user_id", user_id.value())?;

        let owner_row = sqlx::query("SELECT owner_user_id FROM routines WHERE id = ?1")
            .bind(routine)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?
            .ok_or(StorageError::NotFound)?;

        let owner: i64 = owner_row.try_get("owner_user_id").map_err(ser)?;
        if owner == user {
            return Ok(true);
        }

        let assigned = sqlx::query(
            r"
            SELECT 1 FROM routine_assignments
            WHERE routine_id = ?1 AND user_id = ?2 AND is_active = 1
            ",
        )
        .bind(routine)
        .bind(user)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        Ok(assigned.is_some())
    }
}
