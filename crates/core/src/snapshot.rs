//! Snapshot construction: freezing a routine day into a per-session tree.
//!
//! The build is a two-pass arena strategy: this module computes the full
//! tree in memory (ids unassigned), and the storage layer persists it
//! breadth-first, threading generated ids back level by level. Freezing the
//! structure means later edits to the routine template never perturb an
//! in-progress or historical session.

use thiserror::Error;

use crate::model::{
    DayId, ExerciseId, GroupKind, RepRange, RestOverrides, RestPlan, RoutineDay, RoutineId,
    SetEntry,
};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SnapshotError {
    #[error("routine day has no groups")]
    EmptyDay,

    #[error("group {index} has no exercise slots")]
    EmptyGroup { index: usize },

    #[error("group {index} has zero rounds")]
    ZeroRounds { index: usize },

    #[error("group {index} is {kind:?} but carries {slots} slots")]
    SlotCountMismatch {
        index: usize,
        kind: GroupKind,
        slots: usize,
    },

    #[error("slot {slot} of group {group} has zero target sets per round")]
    ZeroTargetSets { group: usize, slot: usize },

    #[error("slot {slot} of group {group} overflows the total set count")]
    SetCountOverflow { group: usize, slot: usize },
}

/// One exercise item of a draft snapshot, with its planned sets pre-created.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemDraft {
    pub exercise_id: ExerciseId,
    pub target_sets_total: u32,
    pub rep_range: RepRange,
    pub notes: Option<String>,
    pub sets: Vec<SetEntry>,
}

/// One group of a draft snapshot, rest already resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupDraft {
    pub kind: GroupKind,
    pub rounds_total: u32,
    pub rest: RestPlan,
    pub items: Vec<ItemDraft>,
}

/// A fully materialized session tree awaiting id assignment and persistence.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionDraft {
    pub routine_id: RoutineId,
    pub day_id: DayId,
    pub rest_overrides: RestOverrides,
    pub groups: Vec<GroupDraft>,
}

/// Materializes an immutable snapshot tree from a routine day definition and
/// optional per-session rest overrides.
///
/// Every slot becomes an item with `target_sets_total = target_sets_per_round
/// × rounds_total` and exactly that many empty sets numbered `1..=N`.
///
/// # Errors
///
/// Returns `SnapshotError` if the source shape is unusable: no groups, a
/// group with no slots or zero rounds, a slot count that contradicts the
/// group kind, a slot with zero target sets, or a per-round count times
/// rounds that overflows.
pub fn build_snapshot(
    day: &RoutineDay,
    overrides: RestOverrides,
) -> Result<SessionDraft, SnapshotError> {
    if day.groups.is_empty() {
        return Err(SnapshotError::EmptyDay);
    }

    let mut groups = Vec::with_capacity(day.groups.len());
    for (group_index, group) in day.groups.iter().enumerate() {
        if group.slots.is_empty() {
            return Err(SnapshotError::EmptyGroup { index: group_index });
        }
        if group.rounds_total == 0 {
            return Err(SnapshotError::ZeroRounds { index: group_index });
        }
        if group.slots.len() != group.kind.slot_count() {
            return Err(SnapshotError::SlotCountMismatch {
                index: group_index,
                kind: group.kind,
                slots: group.slots.len(),
            });
        }

        let mut items = Vec::with_capacity(group.slots.len());
        for (slot_index, slot) in group.slots.iter().enumerate() {
            if slot.target_sets_per_round == 0 {
                return Err(SnapshotError::ZeroTargetSets {
                    group: group_index,
                    slot: slot_index,
                });
            }

            let target_sets_total = slot
                .target_sets_per_round
                .checked_mul(group.rounds_total)
                .ok_or(SnapshotError::SetCountOverflow {
                    group: group_index,
                    slot: slot_index,
                })?;
            let sets = (1..=target_sets_total).map(SetEntry::planned).collect();

            items.push(ItemDraft {
                exercise_id: slot.exercise_id,
                target_sets_total,
                rep_range: slot.rep_range,
                notes: slot.notes.clone(),
                sets,
            });
        }

        groups.push(GroupDraft {
            kind: group.kind,
            rounds_total: group.rounds_total,
            rest: overrides.resolve(group.rest),
            items,
        });
    }

    Ok(SessionDraft {
        routine_id: day.routine_id,
        day_id: day.day_id,
        rest_overrides: overrides,
        groups,
    })
}
