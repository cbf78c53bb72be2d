//! Port traits for the origin store and its push channel.
//!
//! The engine never talks to a network itself. The embedding application
//! implements these traits over whatever transport it has; the contract is
//! the query semantics, not the wire format. Peer-owned scopes use the same
//! queries routed through [`QueryRoute::Peer`].

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use tether_engine::{
    BatchCursor, CollectionId, DeltaState, DetachedPayload, ModifiedCursor, QueryRoute,
    RecordDelta, RecordHeader, RecordId, RecordSubtype, SharedDocument, UniqueId, VersionTag,
};

/// Failures produced by transport implementations.
///
/// All of these are transient from the engine's point of view: catch-up
/// retries on the next trigger, the save loop on its next iteration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("network failure: {0}")]
    Network(String),

    #[error("request timed out")]
    Timeout,

    #[error("origin store unavailable")]
    Unavailable,
}

/// Optional filters supported by the catch-up queries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecordFilter {
    pub state: Option<DeltaState>,
    pub subtype: Option<RecordSubtype>,
}

impl RecordFilter {
    /// No filtering.
    pub fn any() -> Self {
        Self::default()
    }

    /// Only live records.
    pub fn active() -> Self {
        Self {
            state: Some(DeltaState::Active),
            subtype: None,
        }
    }

    /// Whether a delta passes this filter.
    pub fn matches(&self, delta: &RecordDelta) -> bool {
        let state_ok = match self.state {
            // The active filter admits both live states; it only screens
            // out deletions.
            Some(DeltaState::Active) => !delta.is_deleted(),
            Some(state) => delta.state == state,
            None => true,
        };
        let subtype_ok = self.subtype.map_or(true, |s| delta.subtype == s);
        state_ok && subtype_ok
    }
}

/// Outcome of a document upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum UploadOutcome {
    /// The write was accepted; the tag strictly increased.
    Accepted {
        version_tag: VersionTag,
        /// Set when the server minted a canonical id for the document
        #[serde(skip_serializing_if = "Option::is_none")]
        assigned_record_id: Option<RecordId>,
    },
    /// The expected tag was stale; fetch, merge, and retry.
    VersionConflict,
}

/// The origin store as the sync engine sees it.
#[async_trait]
pub trait OriginStore: Send + Sync {
    /// Records created after the batch cursor.
    async fn query_new_since(
        &self,
        route: &QueryRoute,
        collection: &CollectionId,
        cursor: BatchCursor,
        filter: RecordFilter,
    ) -> Result<Vec<RecordDelta>, TransportError>;

    /// Records modified after the modified cursor (buffer applied origin-side).
    async fn query_modified_since(
        &self,
        route: &QueryRoute,
        collection: &CollectionId,
        cursor: ModifiedCursor,
        filter: RecordFilter,
    ) -> Result<Vec<RecordDelta>, TransportError>;

    /// Fetch one record's current state, `None` if it no longer exists.
    async fn get_record(
        &self,
        route: &QueryRoute,
        collection: &CollectionId,
        record_id: &RecordId,
    ) -> Result<Option<RecordDelta>, TransportError>;

    /// Fetch the current server copy of a shared document.
    async fn get_document(
        &self,
        route: &QueryRoute,
        collection: &CollectionId,
        unique_id: &UniqueId,
    ) -> Result<Option<SharedDocument>, TransportError>;

    /// Upload a shared document with optimistic concurrency.
    ///
    /// `expected` is `None` for the first write of a document. Oversized
    /// field values arrive separately in `detached`; storing them is the
    /// transport's concern.
    async fn upload_document(
        &self,
        route: &QueryRoute,
        collection: &CollectionId,
        document: &SharedDocument,
        detached: &[DetachedPayload],
        expected: Option<VersionTag>,
    ) -> Result<UploadOutcome, TransportError>;
}

/// What happened to a record, as announced over the push channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordEventKind {
    Created,
    Modified,
    Deleted,
    StatisticsChanged,
}

/// A push notification about one record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordEvent {
    pub kind: RecordEventKind,
    pub collection: CollectionId,
    /// Header-only unless the event embeds the full record
    pub header: RecordHeader,
}

/// Events delivered by the push channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PushEvent {
    /// The channel (re)connected; any gap must be closed by a catch-up pass.
    Connected,
    /// The channel dropped; the next connect self-heals.
    Disconnected,
    /// A record changed in a subscribed collection.
    Record(RecordEvent),
}

/// A push-notification subscription source.
///
/// `subscribe` replaces any previous subscription wholesale; re-subscribing
/// with the same set is idempotent.
pub trait PushChannel: Send + Sync {
    type Events: Stream<Item = PushEvent> + Send + Unpin;

    fn subscribe(&self, collections: &[CollectionId]) -> Self::Events;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn delta(state: DeltaState, subtype: RecordSubtype) -> RecordDelta {
        RecordDelta::new(
            "m-1",
            Some("c-1".to_string()),
            subtype,
            state,
            Some("u-1".to_string()),
            1000,
        )
    }

    #[test]
    fn filter_any_matches_everything() {
        let filter = RecordFilter::any();
        assert!(filter.matches(&delta(DeltaState::Active, RecordSubtype::Standard)));
        assert!(filter.matches(&delta(DeltaState::Deleted, RecordSubtype::Comment)));
    }

    #[test]
    fn active_filter_screens_out_deletions_only() {
        let filter = RecordFilter::active();
        assert!(filter.matches(&delta(DeltaState::Active, RecordSubtype::Standard)));
        assert!(filter.matches(&delta(DeltaState::Modified, RecordSubtype::Standard)));
        assert!(!filter.matches(&delta(DeltaState::Deleted, RecordSubtype::Standard)));
    }

    #[test]
    fn subtype_filter() {
        let filter = RecordFilter {
            state: None,
            subtype: Some(RecordSubtype::Comment),
        };
        assert!(filter.matches(&delta(DeltaState::Active, RecordSubtype::Comment)));
        assert!(!filter.matches(&delta(DeltaState::Active, RecordSubtype::Standard)));
    }

    #[test]
    fn push_event_serialization() {
        let event = PushEvent::Record(RecordEvent {
            kind: RecordEventKind::Created,
            collection: "drive-a".into(),
            header: RecordHeader {
                record_id: "m-1".into(),
                group_key: Some("c-1".into()),
                subtype: RecordSubtype::Standard,
                unique_id: Some("u-1".into()),
                payload: None,
            },
        });

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"record""#));
        assert!(json.contains(r#""kind":"created""#));

        let parsed: PushEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(event, parsed);
    }

    #[test]
    fn upload_outcome_serialization() {
        let outcome = UploadOutcome::Accepted {
            version_tag: 4,
            assigned_record_id: None,
        };
        let json = serde_json::to_string(&outcome).unwrap();
        assert!(json.contains(r#""outcome":"accepted""#));
        assert!(!json.contains("assignedRecordId"));

        let conflict = UploadOutcome::VersionConflict;
        let json = serde_json::to_string(&conflict).unwrap();
        assert!(json.contains(r#""outcome":"version_conflict""#));
    }
}
