use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{DayId, ExerciseId, RoutineId};

//
// ─── GROUP KIND ────────────────────────────────────────────────────────────────
//

/// How the exercises of a group are sequenced within a round.
///
/// A superset performs its 2–3 exercises back-to-back before the round count
/// advances; a single group has exactly one exercise per round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GroupKind {
    Single,
    Superset2,
    Superset3,
}

impl GroupKind {
    /// Number of exercise slots this kind carries.
    #[must_use]
    pub fn slot_count(&self) -> usize {
        match self {
            GroupKind::Single => 1,
            GroupKind::Superset2 => 2,
            GroupKind::Superset3 => 3,
        }
    }

    /// Storage code for this kind.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            GroupKind::Single => "single",
            GroupKind::Superset2 => "superset_2",
            GroupKind::Superset3 => "superset_3",
        }
    }

    /// Parses a storage code back into a kind.
    #[must_use]
    pub fn from_str_opt(s: &str) -> Option<Self> {
        match s {
            "single" => Some(GroupKind::Single),
            "superset_2" => Some(GroupKind::Superset2),
            "superset_3" => Some(GroupKind::Superset3),
            _ => None,
        }
    }
}

//
// ─── REP RANGE ─────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum RepRangeError {
    #[error("rep range bounds must be at least 1")]
    ZeroBound,

    #[error("rep range min ({min}) exceeds max ({max})")]
    Inverted { min: u32, max: u32 },
}

/// Planned repetition range for an exercise slot, e.g. 8–12 reps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepRange {
    min: u32,
    max: u32,
}

impl RepRange {
    /// Creates a validated rep range.
    ///
    /// # Errors
    ///
    /// Returns `RepRangeError` if either bound is zero or min exceeds max.
    pub fn new(min: u32, max: u32) -> Result<Self, RepRangeError> {
        if min == 0 || max == 0 {
            return Err(RepRangeError::ZeroBound);
        }
        if min > max {
            return Err(RepRangeError::Inverted { min, max });
        }
        Ok(Self { min, max })
    }

    #[must_use]
    pub fn min(&self) -> u32 {
        self.min
    }

    #[must_use]
    pub fn max(&self) -> u32 {
        self.max
    }
}

//
// ─── REST ──────────────────────────────────────────────────────────────────────
//

/// Resolved rest durations for a group, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RestPlan {
    pub between_exercises_seconds: u32,
    pub after_round_seconds: u32,
    pub after_set_seconds: u32,
}

/// Per-session rest overrides supplied at session start.
///
/// Each field, when present, wins over the group's default for every group in
/// the snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RestOverrides {
    pub rest_between_exercises_seconds: Option<u32>,
    pub rest_after_round_seconds: Option<u32>,
    pub rest_after_set_seconds: Option<u32>,
}

impl RestOverrides {
    /// Resolves a group's rest plan: override wins over group default.
    #[must_use]
    pub fn resolve(&self, default: RestPlan) -> RestPlan {
        RestPlan {
            between_exercises_seconds: self
                .rest_between_exercises_seconds
                .unwrap_or(default.between_exercises_seconds),
            after_round_seconds: self
                .rest_after_round_seconds
                .unwrap_or(default.after_round_seconds),
            after_set_seconds: self
                .rest_after_set_seconds
                .unwrap_or(default.after_set_seconds),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rest_between_exercises_seconds.is_none()
            && self.rest_after_round_seconds.is_none()
            && self.rest_after_set_seconds.is_none()
    }
}

//
// ─── ROUTINE DAY SOURCE ────────────────────────────────────────────────────────
//

/// One ordered exercise slot within a source group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExerciseSlot {
    pub exercise_id: ExerciseId,
    pub target_sets_per_round: u32,
    pub rep_range: RepRange,
    pub notes: Option<String>,
}

/// One ordered group within a routine day definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutineGroup {
    pub kind: GroupKind,
    pub rounds_total: u32,
    pub rest: RestPlan,
    pub slots: Vec<ExerciseSlot>,
}

/// Read-only routine day definition, the input to snapshot construction.
///
/// This is owned by routine storage (an external collaborator); the session
/// runtime only ever reads it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutineDay {
    pub routine_id: RoutineId,
    pub day_id: DayId,
    pub groups: Vec<RoutineGroup>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rep_range_rejects_inverted_bounds() {
        let err = RepRange::new(12, 8).unwrap_err();
        assert_eq!(err, RepRangeError::Inverted { min: 12, max: 8 });
    }

    #[test]
    fn rep_range_rejects_zero() {
        assert_eq!(RepRange::new(0, 5).unwrap_err(), RepRangeError::ZeroBound);
    }

    #[test]
    fn overrides_win_over_group_defaults() {
        let default = RestPlan {
            between_exercises_seconds: 30,
            after_round_seconds: 120,
            after_set_seconds: 90,
        };
        let overrides = RestOverrides {
            rest_after_round_seconds: Some(60),
            ..RestOverrides::default()
        };

        let resolved = overrides.resolve(default);
        assert_eq!(resolved.between_exercises_seconds, 30);
        assert_eq!(resolved.after_round_seconds, 60);
        assert_eq!(resolved.after_set_seconds, 90);
    }

    #[test]
    fn group_kind_codes_roundtrip() {
        for kind in [GroupKind::Single, GroupKind::Superset2, GroupKind::Superset3] {
            assert_eq!(GroupKind::from_str_opt(kind.as_str()), Some(kind));
        }
        assert_eq!(GroupKind::from_str_opt("superset_4"), None);
    }
}
