//! Shared test doubles: an in-memory origin store and a scripted push
//! channel.
#![allow(dead_code)]

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use futures::Stream;
use tokio::sync::mpsc;

use tether_client::{OriginStore, PushChannel, PushEvent, RecordFilter, TransportError, UploadOutcome};
use tether_engine::{
    BatchCursor, CollectionId, DetachedPayload, ModifiedCursor, QueryRoute, RecordDelta, RecordId,
    SharedDocument, UniqueId, VersionTag,
};

/// Current wall-clock time in milliseconds since epoch.
pub fn now_ms() -> u64 {
    chrono::Utc::now().timestamp_millis() as u64
}

/// One record as the origin store holds it.
pub struct StoredRecord {
    pub created_at: u64,
    pub modified_at: u64,
    pub delta: RecordDelta,
}

#[derive(Default)]
struct OriginState {
    records: Vec<StoredRecord>,
    documents: HashMap<UniqueId, SharedDocument>,
    /// Server-assigned id handed out on the next accepted upload
    assign_id: Option<RecordId>,
}

#[derive(Default)]
struct OriginInner {
    state: Mutex<OriginState>,
    fail_queries: AtomicBool,
    /// Remaining uploads to reject with a conflict; `u32::MAX` means always
    forced_conflicts: AtomicU32,
    upload_attempts: AtomicU32,
    query_calls: AtomicU32,
    query_delay_ms: AtomicU64,
    detached_log: Mutex<Vec<DetachedPayload>>,
}

/// In-memory origin store. Cheap to clone; all clones share state.
#[derive(Clone, Default)]
pub struct MemoryOrigin {
    inner: Arc<OriginInner>,
}

impl MemoryOrigin {
    pub fn new() -> Self {
        Self::default()
    }

    /// Upsert a record: queries always return a record's current state.
    pub fn insert_record(&self, created_at: u64, modified_at: u64, delta: RecordDelta) {
        let mut state = self.inner.state.lock().unwrap();
        state
            .records
            .retain(|r| r.delta.record_id != delta.record_id);
        state.records.push(StoredRecord {
            created_at,
            modified_at,
            delta,
        });
    }

    pub fn put_server_document(&self, document: SharedDocument) {
        self.inner
            .state
            .lock()
            .unwrap()
            .documents
            .insert(document.unique_id.clone(), document);
    }

    pub fn server_document(&self, unique_id: &str) -> Option<SharedDocument> {
        self.inner
            .state
            .lock()
            .unwrap()
            .documents
            .get(unique_id)
            .cloned()
    }

    pub fn set_fail_queries(&self, fail: bool) {
        self.inner.fail_queries.store(fail, Ordering::SeqCst);
    }

    pub fn force_conflicts(&self, count: u32) {
        self.inner.forced_conflicts.store(count, Ordering::SeqCst);
    }

    pub fn assign_id_on_next_accept(&self, id: &str) {
        self.inner.state.lock().unwrap().assign_id = Some(id.to_string());
    }

    pub fn set_query_delay(&self, delay_ms: u64) {
        self.inner.query_delay_ms.store(delay_ms, Ordering::SeqCst);
    }

    pub fn upload_attempts(&self) -> u32 {
        self.inner.upload_attempts.load(Ordering::SeqCst)
    }

    pub fn query_calls(&self) -> u32 {
        self.inner.query_calls.load(Ordering::SeqCst)
    }

    pub fn detached_payloads(&self) -> Vec<DetachedPayload> {
        self.inner.detached_log.lock().unwrap().clone()
    }

    async fn before_query(&self) -> Result<(), TransportError> {
        self.inner.query_calls.fetch_add(1, Ordering::SeqCst);
        let delay = self.inner.query_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.inner.fail_queries.load(Ordering::SeqCst) {
            return Err(TransportError::Network("origin offline".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl OriginStore for MemoryOrigin {
    async fn query_new_since(
        &self,
        _route: &QueryRoute,
        _collection: &CollectionId,
        cursor: BatchCursor,
        filter: RecordFilter,
    ) -> Result<Vec<RecordDelta>, TransportError> {
        self.before_query().await?;
        let state = self.inner.state.lock().unwrap();
        Ok(state
            .records
            .iter()
            .filter(|r| r.created_at > cursor.created_after && filter.matches(&r.delta))
            .map(|r| r.delta.clone())
            .collect())
    }

    async fn query_modified_since(
        &self,
        _route: &QueryRoute,
        _collection: &CollectionId,
        cursor: ModifiedCursor,
        filter: RecordFilter,
    ) -> Result<Vec<RecordDelta>, TransportError> {
        self.before_query().await?;
        let cutoff = cursor.modified_after.saturating_sub(cursor.buffer_ms);
        let state = self.inner.state.lock().unwrap();
        Ok(state
            .records
            .iter()
            .filter(|r| r.modified_at > cutoff && filter.matches(&r.delta))
            .map(|r| r.delta.clone())
            .collect())
    }

    async fn get_record(
        &self,
        _route: &QueryRoute,
        _collection: &CollectionId,
        record_id: &RecordId,
    ) -> Result<Option<RecordDelta>, TransportError> {
        if self.inner.fail_queries.load(Ordering::SeqCst) {
            return Err(TransportError::Network("origin offline".into()));
        }
        let state = self.inner.state.lock().unwrap();
        Ok(state
            .records
            .iter()
            .rev()
            .find(|r| r.delta.record_id == *record_id)
            .map(|r| r.delta.clone()))
    }

    async fn get_document(
        &self,
        _route: &QueryRoute,
        _collection: &CollectionId,
        unique_id: &UniqueId,
    ) -> Result<Option<SharedDocument>, TransportError> {
        Ok(self.server_document(unique_id))
    }

    async fn upload_document(
        &self,
        _route: &QueryRoute,
        _collection: &CollectionId,
        document: &SharedDocument,
        detached: &[DetachedPayload],
        expected: Option<VersionTag>,
    ) -> Result<UploadOutcome, TransportError> {
        self.inner.upload_attempts.fetch_add(1, Ordering::SeqCst);

        let forced = self.inner.forced_conflicts.load(Ordering::SeqCst);
        if forced > 0 {
            if forced != u32::MAX {
                self.inner.forced_conflicts.fetch_sub(1, Ordering::SeqCst);
            }
            return Ok(UploadOutcome::VersionConflict);
        }

        let mut state = self.inner.state.lock().unwrap();
        let current_tag = state
            .documents
            .get(&document.unique_id)
            .map(|d| d.version_tag);

        // Accepted only when the expected tag matches the stored one
        // (both absent counts as a match for a first write).
        if expected != current_tag {
            return Ok(UploadOutcome::VersionConflict);
        }

        self.inner
            .detached_log
            .lock()
            .unwrap()
            .extend(detached.iter().cloned());

        let version_tag = current_tag.unwrap_or(0) + 1;
        let assigned_record_id = state.assign_id.take();
        let stored_id = assigned_record_id
            .clone()
            .unwrap_or_else(|| document.unique_id.clone());

        let mut stored = document.clone();
        stored.unique_id = stored_id.clone();
        stored.version_tag = version_tag;
        state.documents.insert(stored_id, stored);

        Ok(UploadOutcome::Accepted {
            version_tag,
            assigned_record_id,
        })
    }
}

/// Stream adapter over an unbounded channel.
pub struct EventStream(mpsc::UnboundedReceiver<PushEvent>);

impl Stream for EventStream {
    type Item = PushEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.0.poll_recv(cx)
    }
}

#[derive(Default)]
struct ChannelInner {
    senders: Mutex<Vec<mpsc::UnboundedSender<PushEvent>>>,
    subscriptions: Mutex<Vec<Vec<CollectionId>>>,
}

/// Push channel driven by the test. Each `subscribe` hands out a fresh
/// stream; events go to the most recent subscriber.
#[derive(Clone, Default)]
pub struct ScriptedChannel {
    inner: Arc<ChannelInner>,
}

impl ScriptedChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn send(&self, event: PushEvent) {
        if let Some(sender) = self.inner.senders.lock().unwrap().last() {
            let _ = sender.send(event);
        }
    }

    pub fn subscription_log(&self) -> Vec<Vec<CollectionId>> {
        self.inner.subscriptions.lock().unwrap().clone()
    }
}

impl PushChannel for ScriptedChannel {
    type Events = EventStream;

    fn subscribe(&self, collections: &[CollectionId]) -> EventStream {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner
            .subscriptions
            .lock()
            .unwrap()
            .push(collections.to_vec());
        self.inner.senders.lock().unwrap().push(tx);
        EventStream(rx)
    }
}
