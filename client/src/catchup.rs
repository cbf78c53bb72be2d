//! Catch-up orchestration.
//!
//! A catch-up pass closes the gap between a scope's cursor and the origin
//! store: fetch both query windows, group the deltas, reconcile them into the
//! cache, then advance the cursor. The cursor only moves on success; a
//! failed pass changes nothing and the next trigger re-covers the window.
//!
//! Passes are serialized per scope. A trigger that arrives while a pass is in
//! flight sets a rerun flag instead of queueing; the running pass loops once
//! more when it finishes.

use std::sync::Arc;

use dashmap::DashMap;

use crate::cache::ReactiveCache;
use crate::config::SyncConfig;
use crate::cursors::CursorStore;
use crate::error::{Result, SyncError};
use crate::fetch::fetch_deltas_since;
use crate::now_ms;
use crate::origin::OriginStore;
use tether_engine::{group, ScopeId, SyncScope, Timestamp};

/// How a triggered catch-up resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatchUpOutcome {
    /// A pass ran to completion and the cursor advanced.
    Completed {
        advanced_to: Timestamp,
        applied: usize,
        removed: usize,
    },
    /// A pass was already in flight; it will run once more on our behalf.
    Coalesced,
    /// The scope has no cursor yet. Nothing was touched; the caller must
    /// bulk-load the scope outside the incremental path, then seed a cursor.
    FullReload,
}

#[derive(Debug, Default)]
struct PassFlags {
    running: bool,
    rerun: bool,
}

/// Serializes and runs catch-up passes per scope.
pub struct CatchUpOrchestrator<S> {
    origin: Arc<S>,
    cache: Arc<ReactiveCache>,
    cursors: Arc<CursorStore>,
    config: SyncConfig,
    passes: DashMap<ScopeId, PassFlags>,
}

impl<S: OriginStore> CatchUpOrchestrator<S> {
    pub fn new(
        origin: Arc<S>,
        cache: Arc<ReactiveCache>,
        cursors: Arc<CursorStore>,
        config: SyncConfig,
    ) -> Self {
        Self {
            origin,
            cache,
            cursors,
            config,
            passes: DashMap::new(),
        }
    }

    /// Trigger a catch-up pass for a scope.
    ///
    /// At most one pass per scope is in flight; concurrent triggers coalesce.
    pub async fn trigger(&self, scope: &SyncScope) -> Result<CatchUpOutcome> {
        {
            let mut flags = self.passes.entry(scope.id.clone()).or_default();
            if flags.running {
                flags.rerun = true;
                tracing::debug!(scope = %scope.id, "catch-up already in flight; coalescing");
                return Ok(CatchUpOutcome::Coalesced);
            }
            flags.running = true;
        }

        let result = loop {
            match self.run_pass(scope).await {
                Err(e) => break Err(e),
                Ok(outcome) => {
                    if !self.take_rerun(&scope.id) {
                        break Ok(outcome);
                    }
                    tracing::debug!(scope = %scope.id, "running coalesced pass");
                }
            }
        };

        if let Some(mut flags) = self.passes.get_mut(&scope.id) {
            flags.running = false;
            flags.rerun = false;
        }

        result
    }

    /// Clear and return the rerun flag.
    fn take_rerun(&self, scope_id: &str) -> bool {
        match self.passes.get_mut(scope_id) {
            Some(mut flags) => std::mem::take(&mut flags.rerun),
            None => false,
        }
    }

    async fn run_pass(&self, scope: &SyncScope) -> Result<CatchUpOutcome> {
        let Some(cursor) = self.cursors.get(&scope.id) else {
            tracing::info!(scope = %scope.id, "no cursor; scope needs a full reload");
            return Ok(CatchUpOutcome::FullReload);
        };

        let pass_started = now_ms();

        let deltas = fetch_deltas_since(
            self.origin.as_ref(),
            scope,
            cursor.last_processed_at,
            self.config.skew_buffer_ms,
        )
        .await
        .map_err(|e| {
            tracing::warn!(scope = %scope.id, error = %e, "catch-up fetch failed; cursor unchanged");
            SyncError::from(e)
        })?;

        let newest_observed = deltas.iter().map(|d| d.observed_at).max();

        let grouped = group(deltas);
        if grouped.dropped > 0 {
            tracing::debug!(
                scope = %scope.id,
                dropped = grouped.dropped,
                "discarded structurally incomplete deltas"
            );
        }

        let outcome = self
            .cache
            .with_reconciler(|r| r.apply_grouped(&scope.id, &grouped));

        let advanced_to = newest_observed.map_or(pass_started, |n| n.max(pass_started));
        self.cursors.advance(&scope.id, advanced_to);

        tracing::info!(
            scope = %scope.id,
            applied = outcome.applied,
            removed = outcome.removed,
            advanced_to,
            "catch-up pass completed"
        );

        Ok(CatchUpOutcome::Completed {
            advanced_to,
            applied: outcome.applied,
            removed: outcome.removed,
        })
    }
}
