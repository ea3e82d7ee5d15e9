//! Rank assignment for manual ordering.
//!
//! Ranks are unique among live records. New records take `max + 1`; a
//! reorder permutes the ranks the reordered records already hold, so the
//! records outside the reordered subset never move and no fresh values are
//! minted.

use std::collections::{HashMap, HashSet};

use crate::record::{Rank, Record, RecordId};

/// Stateless rank calculator.
#[derive(Clone, Copy, Debug, Default)]
pub struct RankAssigner;

impl RankAssigner {
    /// Rank for a record about to be created: one past the highest rank held
    /// by any record, active or completed. `None` once the rank space is used
    /// up, which only a renormalization pass can recover from.
    pub fn next_rank<'a, I>(records: I) -> Option<Rank>
    where
        I: IntoIterator<Item = &'a Record>,
    {
        match records.into_iter().map(|r| r.rank().value()).max() {
            Some(max) => max.checked_add(1).map(Rank),
            None => Some(Rank(1)),
        }
    }

    /// New ranks for `ordered`, given the ranks those records hold today.
    ///
    /// The subset's current ranks are sorted and handed back out in the
    /// submitted order. Every id in `ordered` must be present in `current`.
    /// Returns `None` when two of those ranks are equal: permuting equal
    /// slots cannot express the submitted order.
    pub fn reassign(
        ordered: &[RecordId],
        current: &HashMap<RecordId, Rank>,
    ) -> Option<Vec<(RecordId, Rank)>> {
        let mut slots: Vec<Rank> = ordered
            .iter()
            .filter_map(|id| current.get(id).copied())
            .collect();
        slots.sort();
        if slots.windows(2).any(|pair| pair[0] == pair[1]) {
            return None;
        }

        Some(ordered.iter().copied().zip(slots).collect())
    }

    /// Consecutive ranks from 1 for records listed in display order.
    pub fn renumber(order: &[RecordId]) -> Vec<(RecordId, Rank)> {
        order
            .iter()
            .copied()
            .zip((1..).map(Rank))
            .collect()
    }

    /// `order` with the members of `ordered` rearranged among the positions
    /// they already occupy. Everything else keeps its position.
    pub fn permute_within(order: &[RecordId], ordered: &[RecordId]) -> Vec<RecordId> {
        let members: HashSet<RecordId> = ordered.iter().copied().collect();
        let mut replacements = ordered.iter().copied();
        order
            .iter()
            .map(|id| {
                if members.contains(id) {
                    replacements.next().unwrap_or(*id)
                } else {
                    *id
                }
            })
            .collect()
    }
}
