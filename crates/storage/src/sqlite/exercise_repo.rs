use sqlx::Row;

use workout_core::model::{ExerciseId, ExerciseMeta};

use super::SqliteRepository;
use super::mapping::{id_i64, ser};
use crate::repository::{ExerciseCatalog, StorageError};

#[async_trait::async_trait]
impl ExerciseCatalog for SqliteRepository {
    async fn get_exercises(&self, ids: &[ExerciseId]) -> Result<Vec<ExerciseMeta>, StorageError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut sql = String::from(
            r"
            SELECT id, name, description, media_url
            FROM exercises
            WHERE id IN (
            ",
        );
        for i in 0..ids.len() {
            if i > 0 {
                sql.push_str(", ");
            }
            sql.push('?');
            sql.push_str(&(i + 1).to_string());
        }
        sql.push_str(")\nORDER BY id ASC");

        let mut q = sqlx::query(&sql);
        for id in ids {
            q = q.bind(id_i64("exercise_id", id.value())?);
        }

        let rows = q
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let id: i64 = row.try_get("id").map_err(ser)?;
            out.push(ExerciseMeta {
                id: ExerciseId::new(
                    u64::try_from(id)
                        .map_err(|_| StorageError::Serialization("exercise_id".into()))?,
                ),
                name: row.try_get("name").map_err(ser)?,
                description: row.try_get("description").map_err(ser)?,
                media_url: row.try_get("media_url").map_err(ser)?,
            });
        }
        Ok(out)
    }
}
