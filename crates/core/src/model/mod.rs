mod exercise;
mod ids;
mod progress;
mod routine;
mod session;

pub use exercise::ExerciseMeta;
pub use ids::{
    DayId, EventId, ExerciseId, RoutineId, SessionGroupId, SessionId, SessionItemId, UserId,
};
pub use progress::{ProgressUpdate, SessionView, SetUpdate};

pub use routine::{
    ExerciseSlot, GroupKind, RepRange, RepRangeError, RestOverrides, RestPlan, RoutineDay,
    RoutineGroup,
};
pub use session::{
    Session, SessionGroup, SessionItem, SessionStatus, SessionStatusParseError, SetEntry,
};
