use chrono::Utc;
use sqlx::SqlitePool;

use super::SqliteInitError;

/// Runs a single, consolidated migration for the current schema.
///
/// Creates the full schema: routine source tables (read-only input), the
/// exercise catalog, session trees, the event dedupe table, and indexes.
/// The partial unique index on `sessions` backs the one-active-session-per-
/// user invariant at the constraint level; `create_session` additionally
/// pauses the previous active session inside its transaction.
#[allow(clippy::too_many_lines)]
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), SqliteInitError> {
    async fn is_applied(pool: &SqlitePool, version: i64) -> Result<bool, sqlx::Error> {
        let row = sqlx::query("SELECT 1 FROM schema_migrations WHERE version = ?1")
            .bind(version)
            .fetch_optional(pool)
            .await?;
        Ok(row.is_some())
    }

    sqlx::query(
        r"
            CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            );
            ",
    )
    .execute(pool)
    .await?;

    // Version 1: full schema.
    if !is_applied(pool, 1).await? {
        let mut tx = pool.begin().await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS routines (
                    id INTEGER PRIMARY KEY,
                    owner_user_id INTEGER NOT NULL,
                    name TEXT NOT NULL
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS routine_assignments (
                    routine_id INTEGER NOT NULL,
                    user_id INTEGER NOT NULL,
                    is_active INTEGER NOT NULL DEFAULT 1,
                    PRIMARY KEY (routine_id, user_id),
                    FOREIGN KEY (routine_id) REFERENCES routines(id) ON DELETE CASCADE
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS routine_days (
                    id INTEGER NOT NULL,
                    routine_id INTEGER NOT NULL,
                    PRIMARY KEY (id, routine_id),
                    FOREIGN KEY (routine_id) REFERENCES routines(id) ON DELETE CASCADE
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS routine_groups (
                    id INTEGER PRIMARY KEY,
                    routine_id INTEGER NOT NULL,
                    day_id INTEGER NOT NULL,
                    position INTEGER NOT NULL,
                    kind TEXT NOT NULL,
                    rounds_total INTEGER NOT NULL CHECK (rounds_total >= 1),
                    rest_between_exercises_seconds INTEGER NOT NULL CHECK (rest_between_exercises_seconds >= 0),
                    rest_after_round_seconds INTEGER NOT NULL CHECK (rest_after_round_seconds >= 0),
                    rest_after_set_seconds INTEGER NOT NULL CHECK (rest_after_set_seconds >= 0),
                    FOREIGN KEY (day_id, routine_id) REFERENCES routine_days(id, routine_id) ON DELETE CASCADE
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS routine_slots (
                    id INTEGER PRIMARY KEY,
                    group_id INTEGER NOT NULL,
                    position INTEGER NOT NULL,
                    exercise_id INTEGER NOT NULL,
                    target_sets_per_round INTEGER NOT NULL CHECK (target_sets_per_round >= 1),
                    rep_min INTEGER NOT NULL CHECK (rep_min >= 1),
                    rep_max INTEGER NOT NULL CHECK (rep_max >= rep_min),
                    notes TEXT,
                    FOREIGN KEY (group_id) REFERENCES routine_groups(id) ON DELETE CASCADE
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS exercises (
                    id INTEGER PRIMARY KEY,
                    name TEXT NOT NULL,
                    description TEXT,
                    media_url TEXT
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS sessions (
                    id INTEGER PRIMARY KEY,
                    user_id INTEGER NOT NULL,
                    routine_id INTEGER NOT NULL,
                    day_id INTEGER NOT NULL,
                    status TEXT NOT NULL,
                    ptr_group INTEGER NOT NULL CHECK (ptr_group >= 0),
                    ptr_exercise INTEGER NOT NULL CHECK (ptr_exercise >= 0),
                    ptr_set INTEGER NOT NULL CHECK (ptr_set >= 0),
                    ptr_round INTEGER NOT NULL CHECK (ptr_round >= 0),
                    override_rest_between_exercises_seconds INTEGER,
                    override_rest_after_round_seconds INTEGER,
                    override_rest_after_set_seconds INTEGER,
                    started_at TEXT NOT NULL,
                    ended_at TEXT
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE UNIQUE INDEX IF NOT EXISTS idx_sessions_one_active_per_user
                    ON sessions(user_id) WHERE status = 'active';
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS session_groups (
                    id INTEGER PRIMARY KEY,
                    session_id INTEGER NOT NULL,
                    position INTEGER NOT NULL,
                    kind TEXT NOT NULL,
                    rounds_total INTEGER NOT NULL CHECK (rounds_total >= 1),
                    round_current INTEGER NOT NULL CHECK (round_current >= 0),
                    rest_between_exercises_seconds INTEGER NOT NULL,
                    rest_after_round_seconds INTEGER NOT NULL,
                    rest_after_set_seconds INTEGER NOT NULL,
                    FOREIGN KEY (session_id) REFERENCES sessions(id) ON DELETE CASCADE
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS session_items (
                    id INTEGER PRIMARY KEY,
                    group_id INTEGER NOT NULL,
                    position INTEGER NOT NULL,
                    exercise_id INTEGER NOT NULL,
                    target_sets_total INTEGER NOT NULL CHECK (target_sets_total >= 1),
                    rep_min INTEGER NOT NULL CHECK (rep_min >= 1),
                    rep_max INTEGER NOT NULL CHECK (rep_max >= rep_min),
                    notes TEXT,
                    FOREIGN KEY (group_id) REFERENCES session_groups(id) ON DELETE CASCADE
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS session_sets (
                    id INTEGER PRIMARY KEY,
                    item_id INTEGER NOT NULL,
                    set_number INTEGER NOT NULL CHECK (set_number >= 1),
                    weight REAL,
                    reps INTEGER,
                    rpe REAL,
                    is_done INTEGER NOT NULL DEFAULT 0,
                    completed_at TEXT,
                    UNIQUE (item_id, set_number),
                    FOREIGN KEY (item_id) REFERENCES session_items(id) ON DELETE CASCADE
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS session_events (
                    session_id INTEGER NOT NULL,
                    event_id TEXT NOT NULL,
                    recorded_at TEXT NOT NULL,
                    PRIMARY KEY (session_id, event_id),
                    FOREIGN KEY (session_id) REFERENCES sessions(id) ON DELETE CASCADE
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE INDEX IF NOT EXISTS idx_sessions_user_status
                    ON sessions(user_id, status);
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE INDEX IF NOT EXISTS idx_session_groups_session_position
                    ON session_groups(session_id, position);
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE INDEX IF NOT EXISTS idx_session_items_group_position
                    ON session_items(group_id, position);
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                INSERT INTO schema_migrations (version, applied_at)
                VALUES (?1, ?2)
                ON CONFLICT(version) DO NOTHING
            ",
        )
        .bind(1_i64)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
    }

    Ok(())
}
