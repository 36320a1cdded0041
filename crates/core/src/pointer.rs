//! Guided-navigation pointer state machine.
//!
//! `next` is a pure function of the pointer and the snapshot's group shape.
//! The same function drives the optimistic client advance and any
//! server-side advance, so both sides agree on the walk order.

use serde::{Deserialize, Serialize};

use crate::model::SessionGroup;

/// Current navigation coordinate within a session snapshot, all zero-based.
///
/// The pointer denotes "the exercise currently being performed", not a set
/// row; the set being completed is always `set_number = round_index + 1` on
/// the current item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Pointer {
    pub group_index: usize,
    pub exercise_index: usize,
    pub set_index: usize,
    pub round_index: usize,
}

impl Pointer {
    /// The starting position of every fresh session.
    #[must_use]
    pub fn origin() -> Self {
        Self::default()
    }
}

/// The navigation-relevant shape of one group: how many items it holds and
/// how many rounds it runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupShape {
    pub items: usize,
    pub rounds_total: u32,
}

impl From<&SessionGroup> for GroupShape {
    fn from(group: &SessionGroup) -> Self {
        Self {
            items: group.items.len(),
            rounds_total: group.rounds_total,
        }
    }
}

/// Collects the shape of a session's groups for navigation.
#[must_use]
pub fn shape_of(groups: &[SessionGroup]) -> Vec<GroupShape> {
    groups.iter().map(GroupShape::from).collect()
}

/// Computes the next pointer position, or `None` once the snapshot is
/// exhausted.
///
/// Within a group the items cycle round-robin before the round advances,
/// which is what realizes superset behavior: a `Superset3` group visits all
/// three items, then moves to the next round. A single-exercise, single-round
/// group transitions straight to the following group.
///
/// Returns `None` as well if the pointer is out of bounds for the given
/// shape; a stale pointer past the end of a snapshot has nowhere to go.
#[must_use]
pub fn next(pointer: Pointer, groups: &[GroupShape]) -> Option<Pointer> {
    let group = groups.get(pointer.group_index)?;
    if pointer.exercise_index >= group.items {
        return None;
    }

    // Next exercise in the same round.
    if pointer.exercise_index + 1 < group.items {
        return Some(Pointer {
            exercise_index: pointer.exercise_index + 1,
            ..pointer
        });
    }

    // Next round of the same group. set_index tracks round_index here; it is
    // a display quantity only.
    if (pointer.round_index as u64) + 1 < u64::from(group.rounds_total) {
        return Some(Pointer {
            group_index: pointer.group_index,
            exercise_index: 0,
            set_index: pointer.set_index + 1,
            round_index: pointer.round_index + 1,
        });
    }

    // First exercise of the next group.
    if pointer.group_index + 1 < groups.len() {
        return Some(Pointer {
            group_index: pointer.group_index + 1,
            exercise_index: 0,
            set_index: 0,
            round_index: 0,
        });
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn walk(start: Pointer, groups: &[GroupShape]) -> Vec<Pointer> {
        let mut out = Vec::new();
        let mut current = Some(start);
        while let Some(p) = current {
            out.push(p);
            current = next(p, groups);
        }
        out
    }

    fn ptr(g: usize, e: usize, s: usize, r: usize) -> Pointer {
        Pointer {
            group_index: g,
            exercise_index: e,
            set_index: s,
            round_index: r,
        }
    }

    #[test]
    fn superset_2_cycles_items_before_rounds() {
        // One SUPERSET_2 group, rounds_total = 3.
        let groups = [GroupShape {
            items: 2,
            rounds_total: 3,
        }];

        let seq = walk(Pointer::origin(), &groups);
        assert_eq!(
            seq,
            vec![
                ptr(0, 0, 0, 0),
                ptr(0, 1, 0, 0),
                ptr(0, 0, 1, 1),
                ptr(0, 1, 1, 1),
                ptr(0, 0, 2, 2),
                ptr(0, 1, 2, 2),
            ]
        );
        assert_eq!(next(*seq.last().unwrap(), &groups), None);
    }

    #[test]
    fn single_group_single_round_jumps_to_next_group() {
        let groups = [
            GroupShape {
                items: 1,
                rounds_total: 1,
            },
            GroupShape {
                items: 2,
                rounds_total: 2,
            },
        ];

        assert_eq!(next(Pointer::origin(), &groups), Some(ptr(1, 0, 0, 0)));
    }

    #[test]
    fn superset_3_visits_three_items_per_round() {
        let groups = [GroupShape {
            items: 3,
            rounds_total: 2,
        }];

        let seq = walk(Pointer::origin(), &groups);
        assert_eq!(seq.len(), 6);
        assert_eq!(seq[2], ptr(0, 2, 0, 0));
        assert_eq!(seq[3], ptr(0, 0, 1, 1));
    }

    #[test]
    fn walk_terminates_after_exactly_sum_of_rounds_times_items() {
        let groups = [
            GroupShape {
                items: 2,
                rounds_total: 3,
            },
            GroupShape {
                items: 1,
                rounds_total: 4,
            },
            GroupShape {
                items: 3,
                rounds_total: 2,
            },
        ];
        let expected: usize = groups
            .iter()
            .map(|g| g.items * g.rounds_total as usize)
            .sum();

        let seq = walk(Pointer::origin(), &groups);
        assert_eq!(seq.len(), expected);
    }

    #[test]
    fn walk_is_strictly_monotonic() {
        let groups = [
            GroupShape {
                items: 2,
                rounds_total: 2,
            },
            GroupShape {
                items: 3,
                rounds_total: 3,
            },
        ];

        let seq = walk(Pointer::origin(), &groups);
        let keys: Vec<_> = seq
            .iter()
            .map(|p| (p.group_index, p.round_index, p.exercise_index))
            .collect();
        for pair in keys.windows(2) {
            assert!(pair[0] < pair[1], "walk not monotonic: {pair:?}");
        }
    }

    #[test]
    fn out_of_bounds_pointer_has_no_successor() {
        let groups = [GroupShape {
            items: 1,
            rounds_total: 1,
        }];
        assert_eq!(next(ptr(5, 0, 0, 0), &groups), None);
        assert_eq!(next(ptr(0, 9, 0, 0), &groups), None);
    }

    #[test]
    fn empty_snapshot_is_already_exhausted() {
        assert_eq!(next(Pointer::origin(), &[]), None);
    }
}
