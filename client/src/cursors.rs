//! Per-scope cursor table.
//!
//! Cursors record the last successfully processed point of each sync scope.
//! Only a completed catch-up pass advances them; a failed pass leaves them
//! untouched, so the next pass re-covers the same window.

use dashmap::DashMap;
use std::collections::BTreeMap;
use std::sync::Arc;
use tether_engine::{Cursor, ScopeId, Timestamp};

/// Thread-safe cursor table, keyed by scope.
#[derive(Debug, Default)]
pub struct CursorStore {
    cursors: DashMap<ScopeId, Cursor>,
}

impl CursorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a cursor store wrapped in `Arc` for sharing.
    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub fn get(&self, scope: &str) -> Option<Cursor> {
        self.cursors.get(scope).map(|c| *c)
    }

    pub fn contains(&self, scope: &str) -> bool {
        self.cursors.contains_key(scope)
    }

    /// Establish a cursor for a freshly bulk-loaded scope.
    ///
    /// Does nothing if the scope already has one; catch-up owns it from then
    /// on. Returns whether a cursor was created.
    pub fn seed(&self, scope: &str, at: Timestamp) -> bool {
        let mut created = false;
        self.cursors.entry(scope.to_string()).or_insert_with(|| {
            created = true;
            Cursor::new(at)
        });
        created
    }

    /// Advance a scope's cursor, creating it if absent. Backward moves are
    /// ignored. Returns whether the cursor moved.
    pub fn advance(&self, scope: &str, to: Timestamp) -> bool {
        let mut entry = self
            .cursors
            .entry(scope.to_string())
            .or_insert_with(|| Cursor::new(0));
        entry.advance(to)
    }

    /// Export all cursors with deterministic ordering, for snapshots.
    pub fn export(&self) -> BTreeMap<ScopeId, Cursor> {
        self.cursors
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect()
    }

    /// Replace the table from a snapshot export.
    pub fn import(&self, cursors: BTreeMap<ScopeId, Cursor>) {
        self.cursors.clear();
        for (scope, cursor) in cursors {
            self.cursors.insert(scope, cursor);
        }
    }
}
