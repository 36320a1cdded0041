use sqlx::Row;

use workout_core::Pointer;
use workout_core::model::{
    DayId, ExerciseId, GroupKind, RepRange, RestOverrides, RestPlan, RoutineId, Session,
    SessionGroupId, SessionId, SessionItemId, SessionStatus, SetEntry, UserId,
};

use crate::repository::StorageError;

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

fn i64_to_u64(field: &'static str, v: i64) -> Result<u64, StorageError> {
    u64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} sign overflow")))
}

fn i64_to_u32(field: &'static str, v: i64) -> Result<u32, StorageError> {
    u32::try_from(v).map_err(|_| StorageError::Serialization(format!("invalid {field}: {v}")))
}

fn i64_to_usize(field: &'static str, v: i64) -> Result<usize, StorageError> {
    usize::try_from(v).map_err(|_| StorageError::Serialization(format!("invalid {field}: {v}")))
}

pub(crate) fn id_i64(field: &'static str, v: u64) -> Result<i64, StorageError> {
    i64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} overflow")))
}

pub(crate) fn parse_group_kind(s: &str) -> Result<GroupKind, StorageError> {
    GroupKind::from_str_opt(s)
        .ok_or_else(|| StorageError::Serialization(format!("invalid group kind: {s}")))
}

pub(crate) fn parse_status(s: &str) -> Result<SessionStatus, StorageError> {
    SessionStatus::parse(s).map_err(ser)
}

pub(crate) fn rep_range_from_row(
    min: i64,
    max: i64,
) -> Result<RepRange, StorageError> {
    RepRange::new(i64_to_u32("rep_min", min)?, i64_to_u32("rep_max", max)?).map_err(ser)
}

/// Maps a `sessions` row into a `Session` with an empty group list; the
/// caller attaches the subtree.
pub(crate) fn map_session_row(row: &sqlx::sqlite::SqliteRow) -> Result<Session, StorageError> {
    let status_str: String = row.try_get("status").map_err(ser)?;

    let overrides = RestOverrides {
        rest_between_exercises_seconds: row
            .try_get::<Option<i64>, _>("override_rest_between_exercises_seconds")
            .map_err(ser)?
            .map(|v| i64_to_u32("override_rest_between_exercises_seconds", v))
            .transpose()?,
        rest_after_round_seconds: row
            .try_get::<Option<i64>, _>("override_rest_after_round_seconds")
            .map_err(ser)?
            .map(|v| i64_to_u32("override_rest_after_round_seconds", v))
            .transpose()?,
        rest_after_set_seconds: row
            .try_get::<Option<i64>, _>("override_rest_after_set_seconds")
            .map_err(ser)?
            .map(|v| i64_to_u32("override_rest_after_set_seconds", v))
            .transpose()?,
    };

    Ok(Session {
        id: SessionId::new(i64_to_u64("id", row.try_get::<i64, _>("id").map_err(ser)?)?),
        user_id: UserId::new(i64_to_u64(
            "user_id",
            row.try_get::<i64, _>("user_id").map_err(ser)?,
        )?),
        routine_id: RoutineId::new(i64_to_u64(
            "routine_id",
            row.try_get::<i64, _>("routine_id").map_err(ser)?,
        )?),
        day_id: DayId::new(i64_to_u64(
            "day_id",
            row.try_get::<i64, _>("day_id").map_err(ser)?,
        )?),
        status: parse_status(&status_str)?,
        pointer: Pointer {
            group_index: i64_to_usize("ptr_group", row.try_get::<i64, _>("ptr_group").map_err(ser)?)?,
            exercise_index: i64_to_usize(
                "ptr_exercise",
                row.try_get::<i64, _>("ptr_exercise").map_err(ser)?,
            )?,
            set_index: i64_to_usize("ptr_set", row.try_get::<i64, _>("ptr_set").map_err(ser)?)?,
            round_index: i64_to_usize(
                "ptr_round",
                row.try_get::<i64, _>("ptr_round").map_err(ser)?,
            )?,
        },
        rest_overrides: overrides,
        started_at: row.try_get("started_at").map_err(ser)?,
        ended_at: row.try_get("ended_at").map_err(ser)?,
        groups: Vec::new(),
    })
}

/// Partial group mapping: id, kind, rounds and rest; items attached later.
pub(crate) struct GroupRow {
    pub id: SessionGroupId,
    pub kind: GroupKind,
    pub rounds_total: u32,
    pub round_current: u32,
    pub rest: RestPlan,
}

pub(crate) fn map_group_row(row: &sqlx::sqlite::SqliteRow) -> Result<GroupRow, StorageError> {
    let kind_str: String = row.try_get("kind").map_err(ser)?;
    Ok(GroupRow {
        id: SessionGroupId::new(i64_to_u64("id", row.try_get::<i64, _>("id").map_err(ser)?)?),
        kind: parse_group_kind(&kind_str)?,
        rounds_total: i64_to_u32(
            "rounds_total",
            row.try_get::<i64, _>("rounds_total").map_err(ser)?,
        )?,
        round_current: i64_to_u32(
            "round_current",
            row.try_get::<i64, _>("round_current").map_err(ser)?,
        )?,
        rest: RestPlan {
            between_exercises_seconds: i64_to_u32(
                "rest_between_exercises_seconds",
                row.try_get::<i64, _>("rest_between_exercises_seconds")
                    .map_err(ser)?,
            )?,
            after_round_seconds: i64_to_u32(
                "rest_after_round_seconds",
                row.try_get::<i64, _>("rest_after_round_seconds").map_err(ser)?,
            )?,
            after_set_seconds: i64_to_u32(
                "rest_after_set_seconds",
                row.try_get::<i64, _>("rest_after_set_seconds").map_err(ser)?,
            )?,
        },
    })
}

/// Partial item mapping: everything but the set list.
pub(crate) struct ItemRow {
    pub id: SessionItemId,
    pub group_id: SessionGroupId,
    pub exercise_id: ExerciseId,
    pub target_sets_total: u32,
    pub rep_range: RepRange,
    pub notes: Option<String>,
}

pub(crate) fn map_item_row(row: &sqlx::sqlite::SqliteRow) -> Result<ItemRow, StorageError> {
    Ok(ItemRow {
        id: SessionItemId::new(i64_to_u64("id", row.try_get::<i64, _>("id").map_err(ser)?)?),
        group_id: SessionGroupId::new(i64_to_u64(
            "group_id",
            row.try_get::<i64, _>("group_id").map_err(ser)?,
        )?),
        exercise_id: ExerciseId::new(i64_to_u64(
            "exercise_id",
            row.try_get::<i64, _>("exercise_id").map_err(ser)?,
        )?),
        target_sets_total: i64_to_u32(
            "target_sets_total",
            row.try_get::<i64, _>("target_sets_total").map_err(ser)?,
        )?,
        rep_range: rep_range_from_row(
            row.try_get::<i64, _>("rep_min").map_err(ser)?,
            row.try_get::<i64, _>("rep_max").map_err(ser)?,
        )?,
        notes: row.try_get("notes").map_err(ser)?,
    })
}

pub(crate) fn map_set_row(
    row: &sqlx::sqlite::SqliteRow,
) -> Result<(SessionItemId, SetEntry), StorageError> {
    let item_id = SessionItemId::new(i64_to_u64(
        "item_id",
        row.try_get::<i64, _>("item_id").map_err(ser)?,
    )?);
    let entry = SetEntry {
        set_number: i64_to_u32(
            "set_number",
            row.try_get::<i64, _>("set_number").map_err(ser)?,
        )?,
        weight: row.try_get("weight").map_err(ser)?,
        reps: row
            .try_get::<Option<i64>, _>("reps")
            .map_err(ser)?
            .map(|v| i64_to_u32("reps", v))
            .transpose()?,
        rpe: row.try_get("rpe").map_err(ser)?,
        is_done: row.try_get::<i64, _>("is_done").map_err(ser)? != 0,
        completed_at: row.try_get("completed_at").map_err(ser)?,
    };
    Ok((item_id, entry))
}
