//! Registry of currently relevant sync scopes.
//!
//! The registry is the source of the push subscription set: registering or
//! removing a scope republishes the full collection list over a watch
//! channel, and the realtime bridge resubscribes wholesale. No incremental
//! subscription patching.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::watch;
use tether_engine::{CollectionId, ScopeId, SyncScope};

/// Tracks registered scopes and publishes their collection set.
#[derive(Debug)]
pub struct ScopeRegistry {
    scopes: DashMap<ScopeId, SyncScope>,
    by_collection: DashMap<CollectionId, ScopeId>,
    topics: watch::Sender<Vec<CollectionId>>,
}

impl ScopeRegistry {
    pub fn new() -> Self {
        let (topics, _) = watch::channel(Vec::new());
        Self {
            scopes: DashMap::new(),
            by_collection: DashMap::new(),
            topics,
        }
    }

    /// Create a registry wrapped in `Arc` for sharing.
    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Register a scope. Re-registering the same scope is idempotent.
    pub fn register(&self, scope: SyncScope) {
        self.by_collection
            .insert(scope.collection.clone(), scope.id.clone());
        self.scopes.insert(scope.id.clone(), scope);
        self.publish_topics();
    }

    /// Remove a scope, shrinking the subscription set.
    pub fn remove(&self, scope_id: &str) -> Option<SyncScope> {
        let (_, scope) = self.scopes.remove(scope_id)?;
        self.by_collection.remove(&scope.collection);
        self.publish_topics();
        Some(scope)
    }

    pub fn get(&self, scope_id: &str) -> Option<SyncScope> {
        self.scopes.get(scope_id).map(|s| s.value().clone())
    }

    pub fn scope_for_collection(&self, collection: &str) -> Option<SyncScope> {
        let scope_id = self.by_collection.get(collection)?.value().clone();
        self.get(&scope_id)
    }

    pub fn all(&self) -> Vec<SyncScope> {
        self.scopes
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.scopes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }

    /// Watch the collection set; the bridge resubscribes on every change.
    pub fn topics(&self) -> watch::Receiver<Vec<CollectionId>> {
        self.topics.subscribe()
    }

    fn publish_topics(&self) {
        let mut topics: Vec<CollectionId> = self
            .scopes
            .iter()
            .map(|entry| entry.collection.clone())
            .collect();
        topics.sort();
        topics.dedup();

        self.topics.send_if_modified(|current| {
            if *current != topics {
                *current = topics;
                true
            } else {
                false
            }
        });
    }
}

impl Default for ScopeRegistry {
    fn default() -> Self {
        Self::new()
    }
}
