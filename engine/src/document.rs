//! Shared multi-device documents (drafts, read-state metadata).
//!
//! A shared document is a small container of independently-updatable fields
//! (one per conversation draft key, read marker, and so on). Several devices
//! write it concurrently; the origin store arbitrates with a per-document
//! version tag, the merge rule with per-field `updated_at` timestamps.

use crate::{error::Result, Error, FieldKey, Timestamp, UniqueId, VersionTag};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One independently-updatable field of a shared document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldEntry {
    pub value: serde_json::Value,
    /// When this field was last written; missing on legacy entries
    pub updated_at: Option<Timestamp>,
}

impl FieldEntry {
    pub fn new(value: serde_json::Value, updated_at: Option<Timestamp>) -> Self {
        Self { value, updated_at }
    }

    /// Empty means cleared: null or an empty string.
    pub fn is_empty(&self) -> bool {
        match &self.value {
            serde_json::Value::Null => true,
            serde_json::Value::String(s) => s.is_empty(),
            _ => false,
        }
    }
}

/// Version tag of a document that has never been accepted by the server.
pub const UNSAVED: VersionTag = 0;

/// A keyed-field document shared across devices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SharedDocument {
    pub unique_id: UniqueId,
    /// Strictly increasing on every accepted server write; [`UNSAVED`] until
    /// the first acceptance
    pub version_tag: VersionTag,
    pub fields: BTreeMap<FieldKey, FieldEntry>,
}

impl SharedDocument {
    pub fn new(unique_id: impl Into<UniqueId>) -> Self {
        Self {
            unique_id: unique_id.into(),
            version_tag: UNSAVED,
            fields: BTreeMap::new(),
        }
    }

    pub fn field(&self, key: &str) -> Option<&FieldEntry> {
        self.fields.get(key)
    }

    pub fn set_field(
        &mut self,
        key: impl Into<FieldKey>,
        value: serde_json::Value,
        updated_at: Option<Timestamp>,
    ) {
        self.fields
            .insert(key.into(), FieldEntry::new(value, updated_at));
    }

    /// Whether this document has ever been accepted by the server.
    pub fn is_saved(&self) -> bool {
        self.version_tag != UNSAVED
    }

    /// Adopt a server-returned version tag.
    ///
    /// Tags only move forward; anything else is a protocol violation at the
    /// origin store and is surfaced rather than silently accepted.
    pub fn adopt_version(&mut self, tag: VersionTag) -> Result<()> {
        if tag <= self.version_tag {
            return Err(Error::VersionRegression {
                current: self.version_tag,
                proposed: tag,
            });
        }
        self.version_tag = tag;
        Ok(())
    }

    /// Drop cleared fields to bound document growth.
    ///
    /// An empty field with no timestamp is dropped immediately. An empty
    /// field with a timestamp is kept until the retention window has passed,
    /// so other devices still observe the clearing, then dropped.
    ///
    /// Returns the number of fields removed.
    pub fn collect_garbage(&mut self, now: Timestamp, retention_ms: Timestamp) -> usize {
        let horizon = now.saturating_sub(retention_ms);
        let before = self.fields.len();
        self.fields.retain(|_, entry| {
            if !entry.is_empty() {
                return true;
            }
            match entry.updated_at {
                None => false,
                Some(at) => at > horizon,
            }
        });
        before - self.fields.len()
    }

    /// Split oversized field values out for out-of-band transport.
    ///
    /// Returns a wire copy in which every field value larger than
    /// `threshold` bytes (serialized) is replaced by a reference string,
    /// plus the detached payloads themselves. Timestamps are untouched, so
    /// merge semantics are unaffected.
    pub fn detach_oversized(&self, threshold: usize) -> (SharedDocument, Vec<DetachedPayload>) {
        let mut wire = self.clone();
        let mut detached = Vec::new();

        for (key, entry) in &mut wire.fields {
            let size = entry.value.to_string().len();
            if size > threshold {
                detached.push(DetachedPayload {
                    key: key.clone(),
                    value: entry.value.clone(),
                });
                entry.value =
                    serde_json::Value::String(format!("payload://{}/{}", wire.unique_id, key));
            }
        }

        (wire, detached)
    }
}

/// A field value moved out of the embedded document for transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetachedPayload {
    pub key: FieldKey,
    pub value: serde_json::Value,
}
