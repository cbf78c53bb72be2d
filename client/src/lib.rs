//! # Tether Client
//!
//! Async orchestration for the Tether sync engine: keeps a local reactive
//! cache consistent with a remote multi-writer origin store.
//!
//! The deterministic logic (grouping, reconciliation, merge) lives in
//! `tether-engine`; this crate wires it to the outside world:
//!
//! - [`CatchUpOrchestrator`] runs serialized dual-cursor catch-up passes per
//!   scope, advancing cursors only on success
//! - [`RealtimeBridge`] merges push events into the cache one record at a
//!   time and triggers a catch-up pass on every reconnect
//! - [`DocumentWriter`] applies draft/read-state edits optimistically and
//!   uploads them behind a debounce timer with bounded conflict retry
//! - [`SyncClient`] assembles the pieces and is what the UI talks to
//!
//! Transports are injected through the [`OriginStore`] and [`PushChannel`]
//! port traits; this crate never opens a connection itself.
//!
//! ## Quick Start
//!
//! ```ignore
//! use tether_client::{SyncClient, SyncConfig};
//! use tether_engine::SyncScope;
//!
//! let client = SyncClient::new(my_origin_store, SyncConfig::default());
//! client.register_scope(SyncScope::new("community-1", "drive-a"));
//!
//! // After the initial bulk load:
//! client.seed_cursor("community-1", bulk_load_time);
//! client.trigger_catch_up("community-1").await?;
//!
//! // Realtime, driven by a push transport:
//! tokio::spawn(client.bridge(my_push_channel).run());
//!
//! // Optimistic draft edit, debounced upload:
//! client.submit_edit("community-1", "draft/c-42", "hello".into())?;
//! ```

pub mod cache;
pub mod catchup;
pub mod config;
pub mod cursors;
pub mod documents;
pub mod error;
pub mod fetch;
pub mod origin;
pub mod realtime;
pub mod registry;

pub use cache::ReactiveCache;
pub use catchup::{CatchUpOrchestrator, CatchUpOutcome};
pub use config::{ConfigError, SyncConfig};
pub use cursors::CursorStore;
pub use documents::DocumentWriter;
pub use error::{Result, SyncError};
pub use fetch::fetch_deltas_since;
pub use origin::{
    OriginStore, PushChannel, PushEvent, RecordEvent, RecordEventKind, RecordFilter,
    TransportError, UploadOutcome,
};
pub use realtime::RealtimeBridge;
pub use registry::ScopeRegistry;

use std::sync::Arc;

use tether_engine::{
    CachedRecord, GroupStats, SharedDocument, SyncScope, SyncSnapshot, Timestamp, UniqueId,
    VersionTag,
};

/// Current wall-clock time in milliseconds since epoch.
pub(crate) fn now_ms() -> Timestamp {
    chrono::Utc::now().timestamp_millis() as Timestamp
}

/// The assembled sync engine, as the UI layer sees it.
///
/// Cache reads are synchronous and cheap; everything that touches the origin
/// store is async. All handles are shared, so `SyncClient` is cheap to clone.
pub struct SyncClient<S> {
    origin: Arc<S>,
    config: SyncConfig,
    cache: Arc<ReactiveCache>,
    cursors: Arc<CursorStore>,
    registry: Arc<ScopeRegistry>,
    orchestrator: Arc<CatchUpOrchestrator<S>>,
    writer: Arc<DocumentWriter<S>>,
}

impl<S> Clone for SyncClient<S> {
    fn clone(&self) -> Self {
        Self {
            origin: Arc::clone(&self.origin),
            config: self.config.clone(),
            cache: Arc::clone(&self.cache),
            cursors: Arc::clone(&self.cursors),
            registry: Arc::clone(&self.registry),
            orchestrator: Arc::clone(&self.orchestrator),
            writer: Arc::clone(&self.writer),
        }
    }
}

impl<S: OriginStore + 'static> SyncClient<S> {
    pub fn new(origin: S, config: SyncConfig) -> Self {
        let origin = Arc::new(origin);
        let cache = ReactiveCache::new_shared();
        let cursors = CursorStore::new_shared();
        let registry = ScopeRegistry::new_shared();

        let orchestrator = Arc::new(CatchUpOrchestrator::new(
            Arc::clone(&origin),
            Arc::clone(&cache),
            Arc::clone(&cursors),
            config.clone(),
        ));
        let writer = Arc::new(DocumentWriter::new(
            Arc::clone(&origin),
            Arc::clone(&cache),
            config.clone(),
        ));

        Self {
            origin,
            config,
            cache,
            cursors,
            registry,
            orchestrator,
            writer,
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<ReactiveCache> {
        &self.cache
    }

    // Scope management

    /// Register a scope for syncing. The push subscription set follows.
    pub fn register_scope(&self, scope: SyncScope) {
        self.registry.register(scope);
    }

    pub fn remove_scope(&self, scope_id: &str) -> Option<SyncScope> {
        self.registry.remove(scope_id)
    }

    /// Build a realtime bridge over a push transport. Spawn its `run` future
    /// to start consuming events.
    pub fn bridge<C: PushChannel>(&self, channel: C) -> RealtimeBridge<S, C> {
        RealtimeBridge::new(
            Arc::clone(&self.origin),
            channel,
            Arc::clone(&self.cache),
            Arc::clone(&self.orchestrator),
            Arc::clone(&self.registry),
        )
    }

    // Cache reads (UI surface)

    pub fn cached_group(&self, scope_id: &str, group_key: &str) -> Vec<CachedRecord> {
        self.cache.cached_group(scope_id, group_key)
    }

    pub fn group_stats(&self, scope_id: &str, group_key: &str) -> GroupStats {
        self.cache.group_stats(scope_id, group_key)
    }

    /// The scope's shared document (drafts, read-state), if one exists.
    pub fn document(&self, scope_id: &str) -> Option<SharedDocument> {
        self.cache.primary_document(scope_id)
    }

    // Catch-up

    /// Establish a cursor after the initial bulk load of a scope.
    pub fn seed_cursor(&self, scope_id: &str, at: Timestamp) -> bool {
        self.cursors.seed(scope_id, at)
    }

    /// Manually trigger a catch-up pass (pull-to-refresh).
    pub async fn trigger_catch_up(&self, scope_id: &str) -> Result<CatchUpOutcome> {
        let scope = self
            .registry
            .get(scope_id)
            .ok_or_else(|| SyncError::UnknownScope(scope_id.to_string()))?;
        self.orchestrator.trigger(&scope).await
    }

    /// Force a full non-incremental reload: the scope's cache is dropped and
    /// the caller must bulk-load it outside the incremental path. The cursor
    /// survives and keeps advancing with later passes.
    pub fn invalidate_scope(&self, scope_id: &str) {
        tracing::info!(scope = %scope_id, "scope invalidated; cache cleared");
        self.cache.clear_scope(scope_id);
    }

    // Shared documents

    /// Apply a draft/read-state edit optimistically; the upload follows after
    /// the debounce window.
    pub fn submit_edit(
        &self,
        scope_id: &str,
        field_key: &str,
        value: serde_json::Value,
    ) -> Result<UniqueId> {
        let scope = self
            .registry
            .get(scope_id)
            .ok_or_else(|| SyncError::UnknownScope(scope_id.to_string()))?;
        Ok(self.writer.submit_edit(&scope, field_key, value))
    }

    /// Flush the scope's document immediately, bypassing the debounce.
    pub async fn save_document(&self, scope_id: &str) -> Result<VersionTag> {
        let scope = self
            .registry
            .get(scope_id)
            .ok_or_else(|| SyncError::UnknownScope(scope_id.to_string()))?;
        let document = self
            .cache
            .primary_document(scope_id)
            .ok_or_else(|| SyncError::UnknownDocument(scope_id.to_string()))?;
        self.writer.save(&scope, &document.unique_id).await
    }

    // Persistence

    /// Export the rebuildable process-local state (cursors and documents).
    pub fn snapshot(&self) -> SyncSnapshot {
        let mut snapshot = SyncSnapshot::new();
        snapshot.cursors = self.cursors.export();
        snapshot.documents = self.cache.export_documents();
        snapshot
    }

    /// Restore cursors and documents from a snapshot.
    pub fn restore(&self, snapshot: SyncSnapshot) -> Result<()> {
        snapshot.validate().map_err(SyncError::Engine)?;
        self.cursors.import(snapshot.cursors);
        self.cache
            .with_store(|store| store.import_documents(snapshot.documents));
        Ok(())
    }
}
