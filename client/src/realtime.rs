//! Realtime push bridge.
//!
//! Keeps the cache warm between catch-ups: every push event becomes a single
//! targeted cache merge instead of a full pass. The bridge owns the push
//! subscription, re-establishing it wholesale whenever the registered scope
//! set changes, and triggers a catch-up pass on every connect to close
//! whatever gap accumulated while disconnected.

use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::watch;

use crate::cache::ReactiveCache;
use crate::catchup::CatchUpOrchestrator;
use crate::origin::{OriginStore, PushChannel, PushEvent, RecordEvent, RecordEventKind};
use crate::registry::ScopeRegistry;
use crate::now_ms;
use tether_engine::{CollectionId, DeltaState, SyncScope};

/// Consumes push events and merges them into the cache.
pub struct RealtimeBridge<S, C: PushChannel> {
    origin: Arc<S>,
    channel: C,
    cache: Arc<ReactiveCache>,
    orchestrator: Arc<CatchUpOrchestrator<S>>,
    registry: Arc<ScopeRegistry>,
    topics: watch::Receiver<Vec<CollectionId>>,
}

impl<S: OriginStore, C: PushChannel> RealtimeBridge<S, C> {
    pub fn new(
        origin: Arc<S>,
        channel: C,
        cache: Arc<ReactiveCache>,
        orchestrator: Arc<CatchUpOrchestrator<S>>,
        registry: Arc<ScopeRegistry>,
    ) -> Self {
        let topics = registry.topics();
        Self {
            origin,
            channel,
            cache,
            orchestrator,
            registry,
            topics,
        }
    }

    /// Run the bridge until the push stream or the scope registry goes away.
    pub async fn run(self) {
        let mut topics = self.topics.clone();
        let mut events = self.channel.subscribe(&topics.borrow_and_update().clone());

        loop {
            tokio::select! {
                changed = topics.changed() => {
                    if changed.is_err() {
                        tracing::debug!("scope registry dropped; stopping bridge");
                        break;
                    }
                    let collections = topics.borrow_and_update().clone();
                    tracing::debug!(collections = collections.len(), "re-establishing push subscription");
                    events = self.channel.subscribe(&collections);
                }
                event = events.next() => {
                    match event {
                        Some(event) => self.handle_event(event).await,
                        None => {
                            tracing::debug!("push stream ended; stopping bridge");
                            break;
                        }
                    }
                }
            }
        }
    }

    async fn handle_event(&self, event: PushEvent) {
        match event {
            PushEvent::Connected => self.on_connected().await,
            PushEvent::Disconnected => {
                // Self-heals: the next connect triggers a catch-up pass.
                tracing::debug!("push channel disconnected");
            }
            PushEvent::Record(record_event) => self.handle_record_event(record_event).await,
        }
    }

    /// Close the gap accumulated while disconnected.
    async fn on_connected(&self) {
        let scopes = self.registry.all();
        tracing::info!(scopes = scopes.len(), "push channel connected; catching up");

        for scope in scopes {
            if let Err(e) = self.orchestrator.trigger(&scope).await {
                tracing::warn!(scope = %scope.id, error = %e, "reconnect catch-up failed");
            }
        }
    }

    async fn handle_record_event(&self, event: RecordEvent) {
        let Some(scope) = self.registry.scope_for_collection(&event.collection) else {
            tracing::debug!(collection = %event.collection, "push event for unregistered collection");
            return;
        };

        match event.kind {
            RecordEventKind::Deleted => {
                self.cache
                    .with_reconciler(|r| r.apply_delete(&scope.id, &event.header.record_id));
            }
            RecordEventKind::StatisticsChanged => {
                if let Some(group_key) = &event.header.group_key {
                    self.cache.invalidate_stats(&scope.id, group_key);
                }
            }
            RecordEventKind::Created => {
                self.merge_record(&scope, event, DeltaState::Active).await;
            }
            RecordEventKind::Modified => {
                self.merge_record(&scope, event, DeltaState::Modified).await;
            }
        }
    }

    /// Merge one record via the single-record path, fetching the full content
    /// first when the push payload was header-only.
    async fn merge_record(&self, scope: &SyncScope, event: RecordEvent, state: DeltaState) {
        let delta = if event.header.payload.is_some() {
            event.header.into_delta(state, now_ms())
        } else {
            let fetched = self
                .origin
                .get_record(&scope.route(), &scope.collection, &event.header.record_id)
                .await;
            match fetched {
                Ok(Some(delta)) => delta,
                Ok(None) => {
                    tracing::debug!(record = %event.header.record_id, "pushed record no longer exists");
                    return;
                }
                Err(e) => {
                    // Transient; the next catch-up pass covers this record.
                    tracing::warn!(record = %event.header.record_id, error = %e, "record fetch failed");
                    return;
                }
            }
        };

        self.cache.with_reconciler(|r| r.apply_single(&scope.id, &delta));
    }
}
