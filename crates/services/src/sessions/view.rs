use std::collections::BTreeSet;
use std::sync::Arc;

use storage::repository::ExerciseCatalog;
use workout_core::model::{ExerciseId, Session, SessionView};

use crate::error::SessionError;

/// Joins catalog display metadata onto a session tree.
///
/// The join is presentation convenience: exercises missing from the catalog
/// are simply absent from the view, never an error.
pub(crate) async fn build_view(
    catalog: &Arc<dyn ExerciseCatalog>,
    session: Session,
) -> Result<SessionView, SessionError> {
    let ids: BTreeSet<ExerciseId> = session
        .groups
        .iter()
        .flat_map(|g| g.items.iter())
        .map(|i| i.exercise_id)
        .collect();
    let ids: Vec<ExerciseId> = ids.into_iter().collect();

    let exercises = catalog
        .get_exercises(&ids)
        .await
        .map_err(SessionError::from_storage)?;

    Ok(SessionView { session, exercises })
}
