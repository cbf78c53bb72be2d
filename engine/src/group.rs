//! Grouping and deduplication of record deltas.
//!
//! The catch-up queries overlap (a record can be returned by both the
//! created-after and the modified-after query) and carry no ordering
//! guarantee, so a fetched batch is partitioned before it touches the cache:
//!
//! 1. Deletions are split out; they are applied individually, never
//!    batch-materialized.
//! 2. Structurally incomplete deltas are dropped and counted. Retrying them
//!    would reproduce the same malformed data.
//! 3. Within a group, repeated observations of the same record are collapsed
//!    to one, first by record id, then by normalized unique id. A later array
//!    position replaces an earlier one; combined with the fetcher's
//!    `modified ++ new` concatenation this makes the newest observation win.
//! 4. Survivors are split by subtype: comments route individually into the
//!    flat thread namespace, standard records as one batch per group key.

use crate::{delta::RecordDelta, GroupKey, RecordId, RecordSubtype};
use std::collections::HashMap;

/// Result of partitioning a fetched delta batch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GroupedDeltas {
    /// Standard records, one batch per group key
    pub standard: HashMap<GroupKey, Vec<RecordDelta>>,
    /// Threaded comments, applied individually
    pub comments: Vec<RecordDelta>,
    /// Deletions, applied individually
    pub deletions: Vec<RecordDelta>,
    /// Structurally incomplete deltas that were discarded
    pub dropped: usize,
}

impl GroupedDeltas {
    pub fn is_empty(&self) -> bool {
        self.standard.is_empty() && self.comments.is_empty() && self.deletions.is_empty()
    }

    /// Total number of deltas that survived grouping.
    pub fn len(&self) -> usize {
        self.standard.values().map(Vec::len).sum::<usize>()
            + self.comments.len()
            + self.deletions.len()
    }
}

/// Per-group accumulator with replace-on-duplicate semantics.
#[derive(Default)]
struct GroupAccumulator {
    deltas: Vec<RecordDelta>,
    by_record: HashMap<RecordId, usize>,
    by_unique: HashMap<String, usize>,
}

impl GroupAccumulator {
    fn insert(&mut self, delta: RecordDelta) {
        let unique = delta.normalized_unique_id();

        let slot = self
            .by_record
            .get(&delta.record_id)
            .or_else(|| unique.as_ref().and_then(|u| self.by_unique.get(u)))
            .copied();

        match slot {
            Some(index) => {
                // Re-observation of a known record: drop the stale index
                // entries before replacing in place.
                let old = &self.deltas[index];
                self.by_record.remove(&old.record_id);
                if let Some(u) = old.normalized_unique_id() {
                    self.by_unique.remove(&u);
                }

                self.by_record.insert(delta.record_id.clone(), index);
                if let Some(u) = unique {
                    self.by_unique.insert(u, index);
                }
                self.deltas[index] = delta;
            }
            None => {
                let index = self.deltas.len();
                self.by_record.insert(delta.record_id.clone(), index);
                if let Some(u) = unique {
                    self.by_unique.insert(u, index);
                }
                self.deltas.push(delta);
            }
        }
    }
}

/// Partition a fetched delta batch by group key and subtype.
pub fn group(deltas: Vec<RecordDelta>) -> GroupedDeltas {
    let mut result = GroupedDeltas::default();
    let mut groups: HashMap<GroupKey, GroupAccumulator> = HashMap::new();
    let mut deleted_seen: HashMap<RecordId, usize> = HashMap::new();

    for delta in deltas {
        if delta.is_deleted() {
            // Deduplicate deletions by record id; the removal is idempotent
            // anyway, this just avoids redundant cache walks.
            match deleted_seen.get(&delta.record_id) {
                Some(&index) => result.deletions[index] = delta,
                None => {
                    deleted_seen.insert(delta.record_id.clone(), result.deletions.len());
                    result.deletions.push(delta);
                }
            }
            continue;
        }

        if !delta.is_complete() {
            result.dropped += 1;
            continue;
        }

        let key = delta
            .group_key
            .clone()
            .unwrap_or_default();
        groups.entry(key).or_default().insert(delta);
    }

    for (key, accumulator) in groups {
        let mut standard = Vec::new();
        for delta in accumulator.deltas {
            match delta.subtype {
                RecordSubtype::Comment => result.comments.push(delta),
                RecordSubtype::Standard => standard.push(delta),
            }
        }
        if !standard.is_empty() {
            result.standard.insert(key, standard);
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delta::DeltaState;
    use serde_json::json;

    fn delta(id: &str, group: &str, unique: &str, at: u64) -> RecordDelta {
        RecordDelta::new(
            id,
            Some(group.to_string()),
            RecordSubtype::Standard,
            DeltaState::Active,
            Some(unique.to_string()),
            at,
        )
    }

    #[test]
    fn groups_by_key() {
        let grouped = group(vec![
            delta("m-1", "c-1", "u-1", 1000),
            delta("m-2", "c-1", "u-2", 1001),
            delta("m-3", "c-2", "u-3", 1002),
        ]);

        assert_eq!(grouped.standard.len(), 2);
        assert_eq!(grouped.standard["c-1"].len(), 2);
        assert_eq!(grouped.standard["c-2"].len(), 1);
        assert_eq!(grouped.dropped, 0);
    }

    #[test]
    fn drops_incomplete_deltas() {
        let mut missing_group = delta("m-1", "c-1", "u-1", 1000);
        missing_group.group_key = None;
        let mut missing_unique = delta("m-2", "c-1", "u-2", 1001);
        missing_unique.unique_id = None;

        let grouped = group(vec![
            missing_group,
            missing_unique,
            delta("m-3", "c-1", "u-3", 1002),
        ]);

        assert_eq!(grouped.dropped, 2);
        assert_eq!(grouped.standard["c-1"].len(), 1);
    }

    #[test]
    fn deletions_are_split_out() {
        let mut deletion = delta("m-1", "c-1", "u-1", 1000);
        deletion.state = DeltaState::Deleted;

        let grouped = group(vec![deletion, delta("m-2", "c-1", "u-2", 1001)]);

        assert_eq!(grouped.deletions.len(), 1);
        assert_eq!(grouped.deletions[0].record_id, "m-1");
        assert_eq!(grouped.standard["c-1"].len(), 1);
    }

    #[test]
    fn later_observation_replaces_earlier() {
        let first = delta("m-1", "c-1", "u-1", 1010).with_payload(json!({"rev": 1}));
        let second = delta("m-1", "c-1", "u-1", 1020).with_payload(json!({"rev": 2}));

        let grouped = group(vec![first, second]);

        let survivors = &grouped.standard["c-1"];
        assert_eq!(survivors.len(), 1);
        assert_eq!(survivors[0].payload, Some(json!({"rev": 2})));
        assert_eq!(survivors[0].observed_at, 1020);
    }

    #[test]
    fn dedup_by_unique_id_ignores_format() {
        let first = delta("m-1", "c-1", "8A6B-00FF", 1000);
        // Different record id, same logical unique id in another format.
        let second = delta("m-1b", "c-1", "8a6b00ff", 1001);

        let grouped = group(vec![first, second]);

        let survivors = &grouped.standard["c-1"];
        assert_eq!(survivors.len(), 1);
        assert_eq!(survivors[0].record_id, "m-1b");
    }

    #[test]
    fn comments_route_individually() {
        let mut comment = delta("m-1", "c-1", "u-1", 1000);
        comment.subtype = RecordSubtype::Comment;

        let grouped = group(vec![comment, delta("m-2", "c-1", "u-2", 1001)]);

        assert_eq!(grouped.comments.len(), 1);
        assert_eq!(grouped.comments[0].record_id, "m-1");
        assert_eq!(grouped.standard["c-1"].len(), 1);
    }

    #[test]
    fn comments_dedup_against_same_record() {
        let mut first = delta("m-1", "c-1", "u-1", 1000);
        first.subtype = RecordSubtype::Comment;
        let mut second = delta("m-1", "c-1", "u-1", 1010);
        second.subtype = RecordSubtype::Comment;

        let grouped = group(vec![first, second]);

        assert_eq!(grouped.comments.len(), 1);
        assert_eq!(grouped.comments[0].observed_at, 1010);
    }

    #[test]
    fn duplicate_deletions_collapse() {
        let mut a = delta("m-1", "c-1", "u-1", 1000);
        a.state = DeltaState::Deleted;
        let mut b = delta("m-1", "c-1", "u-1", 1010);
        b.state = DeltaState::Deleted;

        let grouped = group(vec![a, b]);
        assert_eq!(grouped.deletions.len(), 1);
    }

    #[test]
    fn empty_input_yields_empty_groups() {
        let grouped = group(Vec::new());
        assert!(grouped.is_empty());
        assert_eq!(grouped.len(), 0);
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;
        use std::collections::HashSet;

        fn arb_delta() -> impl Strategy<Value = RecordDelta> {
            (
                0u8..8,
                0u8..3,
                0u8..6,
                prop::bool::ANY,
                1000u64..5000,
            )
                .prop_map(|(record, group, unique, comment, at)| {
                    let mut delta = RecordDelta::new(
                        format!("m-{record}"),
                        Some(format!("c-{group}")),
                        if comment {
                            RecordSubtype::Comment
                        } else {
                            RecordSubtype::Standard
                        },
                        DeltaState::Active,
                        Some(format!("u-{unique}")),
                        at,
                    );
                    if record == 0 {
                        delta.group_key = None; // occasionally malformed
                    }
                    delta
                })
        }

        proptest! {
            #[test]
            fn output_never_exceeds_input(deltas in prop::collection::vec(arb_delta(), 0..64)) {
                let input_len = deltas.len();
                let grouped = group(deltas);
                prop_assert!(grouped.len() + grouped.dropped <= input_len);
            }

            #[test]
            fn no_duplicate_record_ids_within_group(deltas in prop::collection::vec(arb_delta(), 0..64)) {
                let grouped = group(deltas);
                for survivors in grouped.standard.values() {
                    let mut seen = HashSet::new();
                    for delta in survivors {
                        prop_assert!(seen.insert(delta.record_id.clone()));
                    }
                }
            }

            #[test]
            fn grouping_is_deterministic(deltas in prop::collection::vec(arb_delta(), 0..64)) {
                let a = group(deltas.clone());
                let b = group(deltas);
                prop_assert_eq!(a, b);
            }
        }
    }
}
