//! Applying grouped deltas to the cache.
//!
//! The reconciler is the only writer of the record namespaces. Its three
//! operations (batch apply, single-record apply, delete) are idempotent and
//! commutative per record id, which is what lets catch-up passes and realtime
//! merges interleave without coordination: whatever order observations arrive
//! in, the cache ends at "latest observed state per record id".

use crate::{
    cache::{CacheStore, CachedRecord},
    delta::RecordDelta,
    group::GroupedDeltas,
    RecordSubtype,
};

/// Accounting for one reconciliation call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyOutcome {
    /// Records inserted or replaced
    pub applied: usize,
    /// Records removed by deletions
    pub removed: usize,
    /// Deltas skipped as structurally unusable
    pub skipped: usize,
}

impl ApplyOutcome {
    fn merge(&mut self, other: ApplyOutcome) {
        self.applied += other.applied;
        self.removed += other.removed;
        self.skipped += other.skipped;
    }
}

/// Applies deltas to a [`CacheStore`].
pub struct Reconciler<'a> {
    cache: &'a mut CacheStore,
}

impl<'a> Reconciler<'a> {
    pub fn new(cache: &'a mut CacheStore) -> Self {
        Self { cache }
    }

    /// Apply one group's batch of standard deltas.
    pub fn apply_group(
        &mut self,
        scope: &str,
        group_key: &str,
        deltas: &[RecordDelta],
    ) -> ApplyOutcome {
        let mut outcome = ApplyOutcome::default();
        for delta in deltas {
            outcome.merge(self.apply_single(scope, delta));
        }
        self.cache.invalidate_stats(scope, group_key);
        outcome
    }

    /// Apply a single delta, routing by state and subtype.
    pub fn apply_single(&mut self, scope: &str, delta: &RecordDelta) -> ApplyOutcome {
        let mut outcome = ApplyOutcome::default();

        if delta.is_deleted() {
            if self.apply_delete(scope, &delta.record_id) {
                outcome.removed += 1;
            }
            return outcome;
        }

        match CachedRecord::try_from(delta) {
            Ok(record) => {
                match record.subtype {
                    RecordSubtype::Comment => self.cache.insert_thread(scope, record),
                    RecordSubtype::Standard => self.cache.insert(scope, record),
                }
                outcome.applied += 1;
            }
            Err(_) => outcome.skipped += 1,
        }

        outcome
    }

    /// Remove a record by id. Returns whether anything was removed.
    pub fn apply_delete(&mut self, scope: &str, record_id: &str) -> bool {
        self.cache.remove(scope, record_id).is_some()
    }

    /// Apply a full grouped batch: deletions individually, standard records
    /// per group, comments individually into the thread namespace.
    pub fn apply_grouped(&mut self, scope: &str, grouped: &GroupedDeltas) -> ApplyOutcome {
        let mut outcome = ApplyOutcome::default();
        outcome.skipped += grouped.dropped;

        for deletion in &grouped.deletions {
            if self.apply_delete(scope, &deletion.record_id) {
                outcome.removed += 1;
            }
        }

        for (group_key, deltas) in &grouped.standard {
            outcome.merge(self.apply_group(scope, group_key, deltas));
        }

        for comment in &grouped.comments {
            outcome.merge(self.apply_single(scope, comment));
        }

        outcome
    }
}
