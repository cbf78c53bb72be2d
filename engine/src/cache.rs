//! The local reactive cache.
//!
//! `CacheStore` is an explicit, injectable store with typed keys
//! (scope, group key, record id); no framework-managed global state. The UI
//! reads it; only the reconciler and the document writer mutate it, in
//! disjoint namespaces:
//!
//! - conversation records, indexed per group key
//! - threaded comments, a flat per-scope namespace
//! - shared documents (drafts, read-state), owned by the optimistic writer
//!
//! The cache is rebuildable from the origin store at any time; it is never a
//! source of truth.

use crate::{
    delta::RecordDelta, error::Result, document::SharedDocument, Error, GroupKey, RecordId,
    RecordSubtype, ScopeId, Timestamp, UniqueId,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

/// A materialized record as the UI sees it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedRecord {
    pub record_id: RecordId,
    pub group_key: GroupKey,
    pub unique_id: UniqueId,
    pub subtype: RecordSubtype,
    pub payload: Option<serde_json::Value>,
    /// Origin-store timestamp of the observation this entry reflects
    pub observed_at: Timestamp,
}

impl TryFrom<&RecordDelta> for CachedRecord {
    type Error = Error;

    fn try_from(delta: &RecordDelta) -> Result<Self> {
        delta.validate()?;
        let (Some(group_key), Some(unique_id)) = (&delta.group_key, &delta.unique_id) else {
            return Err(Error::IncompleteDelta(delta.record_id.clone()));
        };
        Ok(Self {
            record_id: delta.record_id.clone(),
            group_key: group_key.clone(),
            unique_id: unique_id.clone(),
            subtype: delta.subtype,
            payload: delta.payload.clone(),
            observed_at: delta.observed_at,
        })
    }
}

/// Derived per-group aggregate, recomputed lazily after invalidation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupStats {
    pub record_count: usize,
    pub latest_activity: Timestamp,
}

/// Everything cached for one sync scope.
#[derive(Debug, Clone, Default)]
struct ScopeCache {
    /// Conversation namespace, at most one entry per record id
    records: HashMap<RecordId, CachedRecord>,
    /// Group index over `records`
    groups: HashMap<GroupKey, HashSet<RecordId>>,
    /// Flat thread namespace for comments
    threads: HashMap<RecordId, CachedRecord>,
    /// Lazily cached aggregates
    stats: HashMap<GroupKey, GroupStats>,
    /// Shared documents, owned by the optimistic writer
    documents: HashMap<UniqueId, SharedDocument>,
}

/// The process-local cache, keyed by scope.
#[derive(Debug, Clone, Default)]
pub struct CacheStore {
    scopes: HashMap<ScopeId, ScopeCache>,
}

impl CacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn scope(&self, scope: &str) -> Option<&ScopeCache> {
        self.scopes.get(scope)
    }

    fn scope_mut(&mut self, scope: &str) -> &mut ScopeCache {
        self.scopes.entry(scope.to_string()).or_default()
    }

    /// Records of one group, unsorted. Ordering is a presentation concern.
    pub fn group_records(&self, scope: &str, group_key: &str) -> Vec<&CachedRecord> {
        let Some(cache) = self.scope(scope) else {
            return Vec::new();
        };
        let Some(ids) = cache.groups.get(group_key) else {
            return Vec::new();
        };
        ids.iter().filter_map(|id| cache.records.get(id)).collect()
    }

    pub fn record(&self, scope: &str, record_id: &str) -> Option<&CachedRecord> {
        self.scope(scope)?.records.get(record_id)
    }

    pub fn thread_record(&self, scope: &str, record_id: &str) -> Option<&CachedRecord> {
        self.scope(scope)?.threads.get(record_id)
    }

    /// Insert or replace a conversation record. Idempotent per record id.
    pub fn insert(&mut self, scope: &str, record: CachedRecord) {
        let cache = self.scope_mut(scope);

        if let Some(previous) = cache.records.get(&record.record_id) {
            // Group membership can move; fix the index before replacing.
            if previous.group_key != record.group_key {
                if let Some(ids) = cache.groups.get_mut(&previous.group_key) {
                    ids.remove(&record.record_id);
                    if ids.is_empty() {
                        cache.groups.remove(&previous.group_key);
                    }
                }
                cache.stats.remove(&previous.group_key);
            }
        }

        cache
            .groups
            .entry(record.group_key.clone())
            .or_default()
            .insert(record.record_id.clone());
        cache.stats.remove(&record.group_key);
        cache.records.insert(record.record_id.clone(), record);
    }

    /// Insert or replace a threaded comment. Idempotent per record id.
    pub fn insert_thread(&mut self, scope: &str, record: CachedRecord) {
        let cache = self.scope_mut(scope);
        cache.stats.remove(&record.group_key);
        cache.threads.insert(record.record_id.clone(), record);
    }

    /// Remove a record from whichever namespace holds it.
    ///
    /// Removing the last record of a group drops the group index entry and
    /// its derived stats.
    pub fn remove(&mut self, scope: &str, record_id: &str) -> Option<CachedRecord> {
        let cache = self.scopes.get_mut(scope)?;

        if let Some(record) = cache.records.remove(record_id) {
            if let Some(ids) = cache.groups.get_mut(&record.group_key) {
                ids.remove(record_id);
                if ids.is_empty() {
                    cache.groups.remove(&record.group_key);
                }
            }
            cache.stats.remove(&record.group_key);
            return Some(record);
        }

        if let Some(record) = cache.threads.remove(record_id) {
            cache.stats.remove(&record.group_key);
            return Some(record);
        }

        None
    }

    /// Aggregate stats for one group, recomputing if invalidated.
    pub fn group_stats(&mut self, scope: &str, group_key: &str) -> GroupStats {
        let cache = self.scope_mut(scope);
        if let Some(stats) = cache.stats.get(group_key) {
            return *stats;
        }

        let members = cache.groups.get(group_key);
        let stats = match members {
            Some(ids) => {
                let latest_activity = ids
                    .iter()
                    .filter_map(|id| cache.records.get(id))
                    .map(|r| r.observed_at)
                    .max()
                    .unwrap_or_default();
                GroupStats {
                    record_count: ids.len(),
                    latest_activity,
                }
            }
            None => GroupStats::default(),
        };

        cache.stats.insert(group_key.to_string(), stats);
        stats
    }

    pub fn invalidate_stats(&mut self, scope: &str, group_key: &str) {
        if let Some(cache) = self.scopes.get_mut(scope) {
            cache.stats.remove(group_key);
        }
    }

    /// Drop everything cached for a scope, documents included.
    pub fn clear_scope(&mut self, scope: &str) {
        self.scopes.remove(scope);
    }

    /// Number of conversation records cached for a scope.
    pub fn record_count(&self, scope: &str) -> usize {
        self.scope(scope).map(|c| c.records.len()).unwrap_or(0)
    }

    // Shared documents

    pub fn document(&self, scope: &str, unique_id: &str) -> Option<&SharedDocument> {
        self.scope(scope)?.documents.get(unique_id)
    }

    pub fn document_mut(&mut self, scope: &str, unique_id: &str) -> Option<&mut SharedDocument> {
        self.scopes.get_mut(scope)?.documents.get_mut(unique_id)
    }

    /// The scope's single logical document, if any exists yet.
    pub fn primary_document(&self, scope: &str) -> Option<&SharedDocument> {
        self.scope(scope)?.documents.values().next()
    }

    pub fn put_document(&mut self, scope: &str, document: SharedDocument) {
        self.scope_mut(scope)
            .documents
            .insert(document.unique_id.clone(), document);
    }

    /// Re-key a document after the server assigned it a canonical id.
    pub fn rekey_document(&mut self, scope: &str, old_id: &str, new_id: &str) -> bool {
        let Some(cache) = self.scopes.get_mut(scope) else {
            return false;
        };
        let Some(mut document) = cache.documents.remove(old_id) else {
            return false;
        };
        document.unique_id = new_id.to_string();
        cache.documents.insert(new_id.to_string(), document);
        true
    }

    /// Export all documents with deterministic ordering, for snapshots.
    pub fn export_documents(&self) -> BTreeMap<ScopeId, BTreeMap<UniqueId, SharedDocument>> {
        self.scopes
            .iter()
            .filter(|(_, cache)| !cache.documents.is_empty())
            .map(|(scope, cache)| {
                let documents = cache
                    .documents
                    .iter()
                    .map(|(id, doc)| (id.clone(), doc.clone()))
                    .collect();
                (scope.clone(), documents)
            })
            .collect()
    }

    /// Replace the document namespaces from a snapshot export.
    pub fn import_documents(
        &mut self,
        documents: BTreeMap<ScopeId, BTreeMap<UniqueId, SharedDocument>>,
    ) {
        for (scope, docs) in documents {
            let cache = self.scope_mut(&scope);
            cache.documents = docs.into_iter().collect();
        }
    }
}
