//! Snapshotting rebuildable sync state.
//!
//! Only the cursor table and the shared-document namespace survive a restart;
//! the record cache is rebuilt from the origin store. Snapshots use BTreeMap
//! throughout so serialization order is deterministic.

use crate::{
    cursor::Cursor, document::SharedDocument, error::Result, Error, ScopeId, UniqueId,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Version of the snapshot format for future compatibility.
pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

/// A point-in-time export of process-local sync state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncSnapshot {
    /// Snapshot format version
    pub format_version: u32,
    /// Catch-up cursor per scope
    pub cursors: BTreeMap<ScopeId, Cursor>,
    /// Shared documents per scope
    pub documents: BTreeMap<ScopeId, BTreeMap<UniqueId, SharedDocument>>,
}

impl SyncSnapshot {
    pub fn new() -> Self {
        Self {
            format_version: SNAPSHOT_FORMAT_VERSION,
            cursors: BTreeMap::new(),
            documents: BTreeMap::new(),
        }
    }

    /// Check the snapshot is structurally usable before importing.
    pub fn validate(&self) -> Result<()> {
        if self.format_version != SNAPSHOT_FORMAT_VERSION {
            return Err(Error::InvalidSnapshot(format!(
                "unsupported format version {}",
                self.format_version
            )));
        }
        Ok(())
    }

    /// Serialize to JSON.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| Error::InvalidSnapshot(e.to_string()))
    }

    /// Deserialize from JSON and validate.
    pub fn from_json(json: &str) -> Result<Self> {
        let snapshot: SyncSnapshot =
            serde_json::from_str(json).map_err(|e| Error::InvalidSnapshot(e.to_string()))?;
        snapshot.validate()?;
        Ok(snapshot)
    }
}

impl Default for SyncSnapshot {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn roundtrip() {
        let mut snapshot = SyncSnapshot::new();
        snapshot.cursors.insert("s-1".into(), Cursor::new(1234));

        let mut doc = SharedDocument::new("d-1");
        doc.set_field("draft/c-1", json!("hello"), Some(1000));
        snapshot
            .documents
            .entry("s-1".into())
            .or_default()
            .insert("d-1".into(), doc);

        let json = snapshot.to_json().unwrap();
        let parsed = SyncSnapshot::from_json(&json).unwrap();
        assert_eq!(snapshot, parsed);
    }

    #[test]
    fn rejects_unknown_format_version() {
        let mut snapshot = SyncSnapshot::new();
        snapshot.format_version = 99;

        let json = serde_json::to_string(&snapshot).unwrap();
        let err = SyncSnapshot::from_json(&json).unwrap_err();
        assert!(matches!(err, Error::InvalidSnapshot(_)));
    }

    #[test]
    fn rejects_malformed_json() {
        assert!(matches!(
            SyncSnapshot::from_json("not json"),
            Err(Error::InvalidSnapshot(_))
        ));
    }

    #[test]
    fn deterministic_serialization() {
        let mut snapshot = SyncSnapshot::new();
        snapshot.cursors.insert("s-2".into(), Cursor::new(2));
        snapshot.cursors.insert("s-1".into(), Cursor::new(1));

        let a = snapshot.to_json().unwrap();
        let b = snapshot.to_json().unwrap();
        assert_eq!(a, b);
        // BTreeMap ordering: s-1 serializes before s-2.
        assert!(a.find("s-1").unwrap() < a.find("s-2").unwrap());
    }
}
