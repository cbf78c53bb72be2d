//! Optimistic writes for shared documents.
//!
//! Edits land in the local cache immediately; the upload happens behind a
//! debounce timer. Version conflicts are resolved by fetching the server
//! copy, merging field-by-field, and re-issuing the write with the server's
//! tag, at most five upload attempts per save cycle. Exhaustion leaves the
//! local optimistic copy in the cache untouched: nothing is lost, it is just
//! not confirmed synced.
//!
//! Saves for one document are serialized behind a per-document async mutex.
//! An edit that lands mid-retry is not raced against the in-flight upload;
//! each attempt re-reads the local copy, so the edit folds into the next one.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::cache::ReactiveCache;
use crate::config::SyncConfig;
use crate::error::{Result, SyncError};
use crate::now_ms;
use crate::origin::{OriginStore, UploadOutcome};
use tether_engine::{
    merge_documents, FieldKey, SharedDocument, SyncScope, UniqueId, VersionTag,
};

/// Writes shared documents with optimistic concurrency.
pub struct DocumentWriter<S> {
    origin: Arc<S>,
    cache: Arc<ReactiveCache>,
    config: SyncConfig,
    /// Per-document save serialization
    locks: DashMap<UniqueId, Arc<Mutex<()>>>,
    /// Debounce generation per document; a newer edit supersedes the timer
    generations: DashMap<UniqueId, u64>,
}

impl<S: OriginStore + 'static> DocumentWriter<S> {
    pub fn new(origin: Arc<S>, cache: Arc<ReactiveCache>, config: SyncConfig) -> Self {
        Self {
            origin,
            cache,
            config,
            locks: DashMap::new(),
            generations: DashMap::new(),
        }
    }

    /// Apply an edit optimistically and schedule a debounced upload.
    ///
    /// The scope's document is created on first edit. Returns the document's
    /// unique id.
    pub fn submit_edit(
        self: &Arc<Self>,
        scope: &SyncScope,
        field_key: impl Into<FieldKey>,
        value: serde_json::Value,
    ) -> UniqueId {
        let field_key = field_key.into();
        let now = now_ms();

        let unique_id = self.cache.with_store(|store| {
            let unique_id = match store.primary_document(&scope.id) {
                Some(doc) => doc.unique_id.clone(),
                None => {
                    let id = Uuid::new_v4().to_string();
                    store.put_document(&scope.id, SharedDocument::new(id.clone()));
                    id
                }
            };
            if let Some(doc) = store.document_mut(&scope.id, &unique_id) {
                doc.set_field(field_key, value, Some(now));
            }
            unique_id
        });

        let generation = {
            let mut entry = self.generations.entry(unique_id.clone()).or_insert(0);
            *entry += 1;
            *entry
        };

        let writer = Arc::clone(self);
        let scope = scope.clone();
        let id = unique_id.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(writer.config.debounce_ms)).await;

            // A newer edit re-armed the timer; let its task do the upload.
            if writer.generations.get(&id).map(|g| *g) != Some(generation) {
                return;
            }

            if let Err(e) = writer.save(&scope, &id).await {
                tracing::warn!(document = %id, error = %e, "debounced save failed");
            }
        });

        unique_id
    }

    /// Upload a document, resolving version conflicts with bounded retry.
    ///
    /// Returns the server-adopted version tag.
    pub async fn save(&self, scope: &SyncScope, unique_id: &UniqueId) -> Result<VersionTag> {
        let lock = self
            .locks
            .entry(unique_id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        let route = scope.route();

        // Garbage-collect cleared fields once per save cycle, before the
        // first attempt. Retries skip this.
        let now = now_ms();
        let collected = self.cache.with_store(|store| {
            store
                .document_mut(&scope.id, unique_id)
                .map(|doc| doc.collect_garbage(now, self.config.retention_ms))
        });
        match collected {
            Some(0) => {}
            Some(removed) => {
                tracing::debug!(document = %unique_id, removed, "collected cleared fields")
            }
            None => return Err(SyncError::UnknownDocument(unique_id.clone())),
        }

        let mut attempts = 0u32;
        loop {
            attempts += 1;

            // Re-read each attempt so edits made mid-retry fold in.
            let local = self
                .cache
                .document(&scope.id, unique_id)
                .ok_or_else(|| SyncError::UnknownDocument(unique_id.clone()))?;

            let (wire, detached) = local.detach_oversized(self.config.detach_threshold);
            let expected = local.is_saved().then_some(local.version_tag);

            let outcome = self
                .origin
                .upload_document(&route, &scope.collection, &wire, &detached, expected)
                .await?;

            match outcome {
                UploadOutcome::Accepted {
                    version_tag,
                    assigned_record_id,
                } => {
                    self.adopt_acceptance(scope, unique_id, version_tag, assigned_record_id)?;
                    tracing::debug!(
                        document = %unique_id,
                        version = version_tag,
                        attempts,
                        "document saved"
                    );
                    return Ok(version_tag);
                }
                UploadOutcome::VersionConflict => {
                    tracing::debug!(
                        document = %unique_id,
                        attempt = attempts,
                        "version conflict on upload"
                    );

                    if attempts >= self.config.retry_budget {
                        tracing::warn!(
                            document = %unique_id,
                            attempts,
                            "retry budget exhausted; local copy kept unsynced"
                        );
                        return Err(SyncError::RetryExhausted {
                            unique_id: unique_id.clone(),
                            attempts,
                        });
                    }

                    self.merge_server_copy(scope, unique_id, &local, &route).await?;
                }
            }
        }
    }

    /// Adopt the server's tag and any server-assigned identifier.
    fn adopt_acceptance(
        &self,
        scope: &SyncScope,
        unique_id: &UniqueId,
        version_tag: VersionTag,
        assigned_record_id: Option<String>,
    ) -> Result<()> {
        self.cache.with_store(|store| -> Result<()> {
            if let Some(doc) = store.document_mut(&scope.id, unique_id) {
                doc.adopt_version(version_tag)?;
            }
            Ok(())
        })?;

        if let Some(assigned) = assigned_record_id {
            if assigned != *unique_id {
                tracing::debug!(
                    document = %unique_id,
                    assigned = %assigned,
                    "adopting server-assigned document id"
                );
                self.cache
                    .with_store(|store| store.rekey_document(&scope.id, unique_id, &assigned));
                if let Some((_, generation)) = self.generations.remove(unique_id) {
                    self.generations.insert(assigned, generation);
                }
            }
        }

        Ok(())
    }

    /// Fetch the server copy and fold the field-level merge into the cache.
    async fn merge_server_copy(
        &self,
        scope: &SyncScope,
        unique_id: &UniqueId,
        local: &SharedDocument,
        route: &tether_engine::QueryRoute,
    ) -> Result<()> {
        let server = self
            .origin
            .get_document(route, &scope.collection, unique_id)
            .await?;

        let Some(server) = server else {
            // The conflicting copy vanished between upload and fetch; retry
            // the upload as-is and let the origin store arbitrate again.
            tracing::warn!(document = %unique_id, "conflicting server copy missing; retrying");
            return Ok(());
        };

        let merged = merge_documents(local, &server);

        self.cache.with_store(|store| -> Result<()> {
            let Some(doc) = store.document_mut(&scope.id, unique_id) else {
                return Ok(());
            };

            // Fold merged fields in without clobbering edits that landed
            // after this attempt snapshotted the local copy.
            for (key, entry) in merged.document.fields {
                let newer_local_edit = match (
                    doc.field(&key).and_then(|e| e.updated_at),
                    entry.updated_at,
                ) {
                    (Some(current), Some(merged_at)) => current > merged_at,
                    (Some(_), None) => true,
                    _ => false,
                };
                if !newer_local_edit {
                    doc.set_field(key, entry.value, entry.updated_at);
                }
            }

            if merged.document.version_tag > doc.version_tag {
                doc.adopt_version(merged.document.version_tag)?;
            }
            Ok(())
        })
    }
}
