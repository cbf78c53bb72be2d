//! Record deltas observed from the origin store.
//!
//! A delta is one observation of a remote record, produced either by the
//! dual-cursor catch-up queries or by a push notification. Deltas carry no
//! history; the latest observation of a record id wins.

use crate::{error::Result, Error, GroupKey, RecordId, Timestamp, UniqueId};
use serde::{Deserialize, Serialize};

/// Lifecycle state of an observed record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeltaState {
    /// Newly created and still live
    Active,
    /// Live, changed since the cursor
    Modified,
    /// Removed at the origin; the cached entry is dropped, not tombstoned
    Deleted,
}

/// Whether a record is a top-level entry or a threaded comment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordSubtype {
    Standard,
    Comment,
}

/// One observation of a remote record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordDelta {
    /// Record identifier in the origin store
    pub record_id: RecordId,
    /// Conversation/channel grouping key; absent on malformed observations
    pub group_key: Option<GroupKey>,
    /// Top-level record or threaded comment
    pub subtype: RecordSubtype,
    /// Lifecycle state at observation time
    pub state: DeltaState,
    /// Logical unique id; absent on malformed observations
    pub unique_id: Option<UniqueId>,
    /// Full payload, or `None` for header-only observations
    pub payload: Option<serde_json::Value>,
    /// When the origin store saw this state (milliseconds since epoch)
    pub observed_at: Timestamp,
}

impl RecordDelta {
    /// Create a delta without a payload.
    pub fn new(
        record_id: impl Into<RecordId>,
        group_key: Option<GroupKey>,
        subtype: RecordSubtype,
        state: DeltaState,
        unique_id: Option<UniqueId>,
        observed_at: Timestamp,
    ) -> Self {
        Self {
            record_id: record_id.into(),
            group_key,
            subtype,
            state,
            unique_id,
            payload: None,
            observed_at,
        }
    }

    /// Attach a payload.
    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn is_deleted(&self) -> bool {
        self.state == DeltaState::Deleted
    }

    /// A delta is complete when it carries both a group key and a unique id.
    /// Deletions are exempt: they are applied by record id alone.
    pub fn is_complete(&self) -> bool {
        self.is_deleted() || (self.group_key.is_some() && self.unique_id.is_some())
    }

    /// Validate structural completeness.
    pub fn validate(&self) -> Result<()> {
        if self.is_complete() {
            Ok(())
        } else {
            Err(Error::IncompleteDelta(self.record_id.clone()))
        }
    }

    /// Unique id normalized for deduplication.
    ///
    /// Origin stores are inconsistent about casing and hyphenation of the
    /// same logical id, so comparisons ignore both.
    pub fn normalized_unique_id(&self) -> Option<String> {
        self.unique_id.as_deref().map(normalize_unique_id)
    }
}

/// Normalize a unique id for logical comparison.
pub fn normalize_unique_id(raw: &str) -> String {
    raw.chars()
        .filter(|c| *c != '-')
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Record header carried by push notifications.
///
/// Push events may be header-only; the payload is fetched separately before
/// the record is merged into the cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordHeader {
    pub record_id: RecordId,
    pub group_key: Option<GroupKey>,
    pub subtype: RecordSubtype,
    pub unique_id: Option<UniqueId>,
    /// Present when the push event embeds the full record
    pub payload: Option<serde_json::Value>,
}

impl RecordHeader {
    /// Convert this header into a delta with the given state.
    pub fn into_delta(self, state: DeltaState, observed_at: Timestamp) -> RecordDelta {
        RecordDelta {
            record_id: self.record_id,
            group_key: self.group_key,
            subtype: self.subtype,
            state,
            unique_id: self.unique_id,
            payload: self.payload,
            observed_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn delta(id: &str, group: Option<&str>, unique: Option<&str>) -> RecordDelta {
        RecordDelta::new(
            id,
            group.map(String::from),
            RecordSubtype::Standard,
            DeltaState::Active,
            unique.map(String::from),
            1000,
        )
    }

    #[test]
    fn complete_delta_validates() {
        let d = delta("m-1", Some("c-1"), Some("u-1"));
        assert!(d.is_complete());
        assert!(d.validate().is_ok());
    }

    #[test]
    fn missing_group_key_is_incomplete() {
        let d = delta("m-1", None, Some("u-1"));
        assert!(!d.is_complete());
        assert_eq!(d.validate(), Err(Error::IncompleteDelta("m-1".into())));
    }

    #[test]
    fn missing_unique_id_is_incomplete() {
        let d = delta("m-1", Some("c-1"), None);
        assert!(!d.is_complete());
    }

    #[test]
    fn deletions_are_complete_by_id_alone() {
        let mut d = delta("m-1", None, None);
        d.state = DeltaState::Deleted;
        assert!(d.is_complete());
    }

    #[test]
    fn unique_id_normalization() {
        assert_eq!(normalize_unique_id("AB-CD-12"), "abcd12");
        assert_eq!(normalize_unique_id("abcd12"), "abcd12");

        let a = delta("m-1", Some("c-1"), Some("8A6B-00FF"));
        let b = delta("m-1", Some("c-1"), Some("8a6b00ff"));
        assert_eq!(a.normalized_unique_id(), b.normalized_unique_id());
    }

    #[test]
    fn header_into_delta_keeps_payload() {
        let header = RecordHeader {
            record_id: "m-1".into(),
            group_key: Some("c-1".into()),
            subtype: RecordSubtype::Comment,
            unique_id: Some("u-1".into()),
            payload: Some(json!({"body": "hi"})),
        };

        let delta = header.into_delta(DeltaState::Modified, 2000);
        assert_eq!(delta.state, DeltaState::Modified);
        assert_eq!(delta.subtype, RecordSubtype::Comment);
        assert_eq!(delta.observed_at, 2000);
        assert_eq!(delta.payload, Some(json!({"body": "hi"})));
    }

    #[test]
    fn serialization_roundtrip() {
        let d = delta("m-1", Some("c-1"), Some("u-1")).with_payload(json!({"body": "hello"}));
        let json = serde_json::to_string(&d).unwrap();
        assert!(json.contains("\"state\":\"active\""));
        let parsed: RecordDelta = serde_json::from_str(&json).unwrap();
        assert_eq!(d, parsed);
    }
}
