//! # Tether Engine
//!
//! The deterministic core of a client-side incremental synchronization engine.
//!
//! This crate keeps a local reactive cache convergent with a remote,
//! multi-writer origin store. It contains only pure logic: the async
//! orchestration (fetching, push subscriptions, retry loops) lives in the
//! companion `tether-client` crate.
//!
//! ## Design Principles
//!
//! - **No IO**: the engine has no knowledge of transports, clocks, or platforms
//! - **Deterministic**: the same inputs always produce the same cache state
//! - **Testable**: pure logic, no mocks needed
//!
//! ## Core Concepts
//!
//! ### Deltas
//!
//! A [`RecordDelta`] is one observation of a remote record: its id, the
//! conversation it belongs to ([`GroupKey`]), whether it is a top-level record
//! or a threaded comment, and whether it was created, modified, or deleted.
//! Deltas are ephemeral; they exist for one fetch/merge cycle.
//!
//! ### Grouping
//!
//! [`group`] partitions a batch of deltas by group key and subtype,
//! deduplicating repeated observations of the same record so that the newest
//! one wins, and splitting deletions out for individual application.
//!
//! ### Reconciliation
//!
//! The [`Reconciler`] applies grouped deltas to a [`CacheStore`]. Every
//! operation is idempotent and commutative per record id, so catch-up batches
//! and realtime single-record merges may interleave freely.
//!
//! ### Shared documents
//!
//! A [`SharedDocument`] is a small keyed-field container (drafts, read-state)
//! written by several devices at once. [`merge_documents`] resolves concurrent
//! copies field-by-field with a last-writer-wins rule arbitrated by per-field
//! `updated_at` timestamps; the server copy wins ties.
//!
//! ### Cursors
//!
//! A [`Cursor`] records the last successfully processed timestamp per sync
//! scope. [`CatchUpWindow`] derives the two query encodings (created-after and
//! modified-after) used by the dual-cursor catch-up protocol, buffered
//! backward to tolerate clock skew.
//!
//! ## Persistence
//!
//! [`SyncSnapshot`] exports the rebuildable process-local state (cursor table
//! and shared documents) with deterministic ordering. The record cache itself
//! is never a source of truth and is not snapshotted.

pub mod cache;
pub mod cursor;
pub mod delta;
pub mod document;
pub mod error;
pub mod group;
pub mod merge;
pub mod reconcile;
pub mod scope;
pub mod snapshot;

// Re-export main types at crate root
pub use cache::{CacheStore, CachedRecord, GroupStats};
pub use cursor::{BatchCursor, CatchUpWindow, Cursor, ModifiedCursor, SKEW_BUFFER_MS};
pub use delta::{DeltaState, RecordDelta, RecordHeader, RecordSubtype};
pub use document::{DetachedPayload, FieldEntry, SharedDocument};
pub use error::Error;
pub use group::{group, GroupedDeltas};
pub use merge::{merge_documents, FieldSource, MergeResult};
pub use reconcile::{ApplyOutcome, Reconciler};
pub use scope::{OwningIdentity, QueryRoute, SyncScope};
pub use snapshot::{SyncSnapshot, SNAPSHOT_FORMAT_VERSION};

/// Type aliases for clarity
pub type RecordId = String;
pub type ScopeId = String;
pub type CollectionId = String;
pub type GroupKey = String;
pub type UniqueId = String;
pub type FieldKey = String;
pub type PeerId = String;
pub type Timestamp = u64;
pub type VersionTag = u64;
