use serde::{Deserialize, Serialize};

use crate::model::ExerciseId;

/// Display metadata for an exercise, read from the exercise catalog.
///
/// This is presentation convenience joined into session views, not session
/// state; the runtime never writes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExerciseMeta {
    pub id: ExerciseId,
    pub name: String,
    pub description: Option<String>,
    pub media_url: Option<String>,
}
