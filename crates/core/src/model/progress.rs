use serde::{Deserialize, Serialize};

use crate::model::{EventId, ExerciseMeta, Session, SessionItemId};
use crate::pointer::Pointer;

/// Recorded result for one concrete set, addressed by `(item, set_number)`.
///
/// The payload is self-describing so a replay is safe regardless of the
/// order queued mutations arrive in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetUpdate {
    #[serde(rename = "workout_exercise_item_id")]
    pub item_id: SessionItemId,
    pub set_number: u32,
    pub weight: Option<f64>,
    pub reps: Option<u32>,
    pub rpe: Option<f64>,
    pub is_done: bool,
}

/// One progress mutation: a pointer save and/or a single set's result.
///
/// `event_id` makes redelivery idempotent; a mutation without one is always
/// reapplied (pointer writes are last-write-wins on the same field).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressUpdate {
    pub event_id: Option<EventId>,
    pub current_pointer: Option<Pointer>,
    pub set_update: Option<SetUpdate>,
}

impl ProgressUpdate {
    /// True when the update carries nothing to apply.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.current_pointer.is_none() && self.set_update.is_none()
    }
}

/// The full session subtree plus catalog display metadata for the exercises
/// it references.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionView {
    pub session: Session,
    pub exercises: Vec<ExerciseMeta>,
}
