//! Error types for the Tether engine.

use crate::{RecordId, VersionTag};
use thiserror::Error;

/// All possible errors from the Tether engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    /// A document was asked to adopt a version tag that does not strictly
    /// increase. Tags only move forward on accepted server writes.
    #[error("version tag regression: current {current}, proposed {proposed}")]
    VersionRegression {
        current: VersionTag,
        proposed: VersionTag,
    },

    /// The delta is structurally unusable (missing group key or unique id).
    #[error("incomplete delta for record: {0}")]
    IncompleteDelta(RecordId),

    #[error("invalid snapshot: {0}")]
    InvalidSnapshot(String),
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;
