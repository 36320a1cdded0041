use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{
    DayId, ExerciseId, GroupKind, RepRange, RestOverrides, RestPlan, RoutineId, SessionGroupId,
    SessionId, SessionItemId, UserId,
};
use crate::pointer::Pointer;

//
// ─── SESSION STATUS ────────────────────────────────────────────────────────────
//

/// Lifecycle of a session. `Finished` is terminal and read-only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionStatus {
    Active,
    Paused,
    Finished,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid session status: {raw}")]
pub struct SessionStatusParseError {
    pub raw: String,
}

impl SessionStatus {
    /// Storage code for this status.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Active => "active",
            SessionStatus::Paused => "paused",
            SessionStatus::Finished => "finished",
        }
    }

    /// Parses a storage code back into a status.
    ///
    /// # Errors
    ///
    /// Returns `SessionStatusParseError` for unknown codes.
    pub fn parse(s: &str) -> Result<Self, SessionStatusParseError> {
        match s {
            "active" => Ok(SessionStatus::Active),
            "paused" => Ok(SessionStatus::Paused),
            "finished" => Ok(SessionStatus::Finished),
            other => Err(SessionStatusParseError {
                raw: other.to_string(),
            }),
        }
    }
}

//
// ─── SESSION TREE ──────────────────────────────────────────────────────────────
//

/// One planned repetition unit, pre-created empty at session start and filled
/// in as the user completes it. Never deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetEntry {
    /// 1-based, contiguous within its item.
    pub set_number: u32,
    pub weight: Option<f64>,
    pub reps: Option<u32>,
    pub rpe: Option<f64>,
    pub is_done: bool,
    pub completed_at: Option<DateTime<Utc>>,
}

impl SetEntry {
    /// An empty planned set, as created by the snapshot builder.
    #[must_use]
    pub fn planned(set_number: u32) -> Self {
        Self {
            set_number,
            weight: None,
            reps: None,
            rpe: None,
            is_done: false,
            completed_at: None,
        }
    }
}

/// A frozen copy of one exercise slot, with its full run of planned sets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionItem {
    pub id: SessionItemId,
    pub exercise_id: ExerciseId,
    /// `target_sets_per_round × rounds_total` of the owning group.
    pub target_sets_total: u32,
    pub rep_range: RepRange,
    pub notes: Option<String>,
    /// Exactly `target_sets_total` entries, `set_number` 1..=N contiguous.
    pub sets: Vec<SetEntry>,
}

/// A frozen copy of one source group, with rest values resolved at start time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionGroup {
    pub id: SessionGroupId,
    pub kind: GroupKind,
    pub rounds_total: u32,
    /// Informational; navigation truth lives in the session pointer.
    pub round_current: u32,
    pub rest: RestPlan,
    pub items: Vec<SessionItem>,
}

/// One user's attempt at a routine day, with private cloned structure and
/// mutable progress. At most one session per user is `Active` at a time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub user_id: UserId,
    pub routine_id: RoutineId,
    pub day_id: DayId,
    pub status: SessionStatus,
    pub pointer: Pointer,
    pub rest_overrides: RestOverrides,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub groups: Vec<SessionGroup>,
}

impl Session {
    /// Looks up an item anywhere in the tree by id.
    #[must_use]
    pub fn find_item(&self, item_id: SessionItemId) -> Option<&SessionItem> {
        self.groups
            .iter()
            .flat_map(|g| g.items.iter())
            .find(|i| i.id == item_id)
    }

    /// The item the pointer currently denotes, if the pointer is in bounds.
    #[must_use]
    pub fn current_item(&self) -> Option<&SessionItem> {
        let group = self.groups.get(self.pointer.group_index)?;
        group.items.get(self.pointer.exercise_index)
    }

    /// The concrete set being performed at the current pointer, identified by
    /// `set_number = round_index + 1` on the current item.
    #[must_use]
    pub fn current_set(&self) -> Option<&SetEntry> {
        self.current_item()?.sets.get(self.pointer.round_index)
    }

    /// Total number of pointer steps this snapshot admits before exhaustion:
    /// `Σ rounds_total_g × items_g`.
    #[must_use]
    pub fn total_steps(&self) -> u64 {
        self.groups
            .iter()
            .map(|g| u64::from(g.rounds_total) * g.items.len() as u64)
            .sum()
    }
}
