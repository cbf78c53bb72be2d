//! Field-level last-writer-wins document merge.
//!
//! When an upload is rejected for carrying a stale version tag, the local and
//! server copies are merged field by field:
//!
//! - a key the server lacks keeps the local value
//! - otherwise the larger `updated_at` wins
//! - equal or missing timestamps prefer the server copy
//!
//! The server preference on ties is deliberate: the server is authoritative
//! whenever the timestamps cannot prove the local edit is newer.

use crate::{
    document::{FieldEntry, SharedDocument},
    FieldKey,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Which copy supplied a merged field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldSource {
    Local,
    Server,
}

/// Result of merging a local and a server document copy.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeResult {
    /// The merged document, carrying the server's unique id and version tag
    pub document: SharedDocument,
    /// Provenance of every merged field
    pub sources: BTreeMap<FieldKey, FieldSource>,
}

/// Decide one field. Local wins only when it is provably newer.
fn pick(local: Option<&FieldEntry>, server: Option<&FieldEntry>) -> Option<FieldSource> {
    match (local, server) {
        (None, None) => None,
        (Some(_), None) => Some(FieldSource::Local),
        (None, Some(_)) => Some(FieldSource::Server),
        (Some(l), Some(s)) => match (l.updated_at, s.updated_at) {
            (Some(lt), Some(st)) if lt > st => Some(FieldSource::Local),
            _ => Some(FieldSource::Server),
        },
    }
}

/// Merge a local document copy with the current server copy.
pub fn merge_documents(local: &SharedDocument, server: &SharedDocument) -> MergeResult {
    let mut document = SharedDocument::new(server.unique_id.clone());
    document.version_tag = server.version_tag;

    let mut sources = BTreeMap::new();

    let keys: BTreeMap<&FieldKey, ()> = local
        .fields
        .keys()
        .chain(server.fields.keys())
        .map(|k| (k, ()))
        .collect();

    for (key, ()) in keys {
        let local_entry = local.field(key);
        let server_entry = server.field(key);

        if let Some(source) = pick(local_entry, server_entry) {
            let entry = match source {
                FieldSource::Local => local_entry,
                FieldSource::Server => server_entry,
            };
            // pick() only returns a source for a present entry
            if let Some(entry) = entry {
                document.fields.insert(key.clone(), entry.clone());
                sources.insert(key.clone(), source);
            }
        }
    }

    MergeResult { document, sources }
}
