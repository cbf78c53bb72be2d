//! Shared handle over the engine cache.
//!
//! Wraps the engine's [`CacheStore`] for concurrent use from event-handler
//! contexts. Reads are cheap clones; writes go through short synchronous
//! critical sections, so the reconciler and the document writer can be called
//! from any task without further coordination.

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tether_engine::{
    CacheStore, CachedRecord, GroupStats, Reconciler, ScopeId, SharedDocument, UniqueId,
};
use std::collections::BTreeMap;

/// Thread-safe cache handle, shared across the orchestrator, the realtime
/// bridge, the document writer, and the UI.
#[derive(Debug, Default)]
pub struct ReactiveCache {
    inner: RwLock<CacheStore>,
}

impl ReactiveCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a cache wrapped in `Arc` for sharing.
    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    fn read(&self) -> RwLockReadGuard<'_, CacheStore> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, CacheStore> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Read-only view of one group's records.
    pub fn cached_group(&self, scope: &str, group_key: &str) -> Vec<CachedRecord> {
        self.read()
            .group_records(scope, group_key)
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn record(&self, scope: &str, record_id: &str) -> Option<CachedRecord> {
        self.read().record(scope, record_id).cloned()
    }

    pub fn thread_record(&self, scope: &str, record_id: &str) -> Option<CachedRecord> {
        self.read().thread_record(scope, record_id).cloned()
    }

    pub fn record_count(&self, scope: &str) -> usize {
        self.read().record_count(scope)
    }

    pub fn group_stats(&self, scope: &str, group_key: &str) -> GroupStats {
        self.write().group_stats(scope, group_key)
    }

    pub fn invalidate_stats(&self, scope: &str, group_key: &str) {
        self.write().invalidate_stats(scope, group_key);
    }

    pub fn document(&self, scope: &str, unique_id: &str) -> Option<SharedDocument> {
        self.read().document(scope, unique_id).cloned()
    }

    /// The scope's single logical document, if it exists yet.
    pub fn primary_document(&self, scope: &str) -> Option<SharedDocument> {
        self.read().primary_document(scope).cloned()
    }

    /// Drop everything cached for a scope.
    pub fn clear_scope(&self, scope: &str) {
        self.write().clear_scope(scope);
    }

    pub fn export_documents(&self) -> BTreeMap<ScopeId, BTreeMap<UniqueId, SharedDocument>> {
        self.read().export_documents()
    }

    /// Run a closure against the store under the write lock.
    pub(crate) fn with_store<R>(&self, f: impl FnOnce(&mut CacheStore) -> R) -> R {
        f(&mut self.write())
    }

    /// Run a closure against a reconciler under the write lock.
    pub(crate) fn with_reconciler<R>(&self, f: impl FnOnce(&mut Reconciler<'_>) -> R) -> R {
        let mut store = self.write();
        let mut reconciler = Reconciler::new(&mut store);
        f(&mut reconciler)
    }
}
