//! Catch-up cursors and query window derivation.
//!
//! Each sync scope tracks the last successfully processed timestamp. A
//! catch-up pass derives two distinct query encodings from it: a batch cursor
//! for "created after X" and a modified cursor for "updated after X". Both
//! look further back than the cursor itself to tolerate clock skew and
//! delayed-visibility writes at the origin store.

use crate::Timestamp;
use serde::{Deserialize, Serialize};

/// Safety margin applied behind the cursor when deriving query windows.
pub const SKEW_BUFFER_MS: Timestamp = 15 * 60 * 1000;

/// Last successfully processed point of one sync scope.
///
/// Created on first successful catch-up, advanced by every completed pass,
/// never deleted. A failed pass leaves it untouched so the next pass
/// reproduces the missed deltas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cursor {
    /// Timestamp of the newest processed state (milliseconds since epoch)
    pub last_processed_at: Timestamp,
}

impl Cursor {
    pub fn new(last_processed_at: Timestamp) -> Self {
        Self { last_processed_at }
    }

    /// Advance the cursor. Backward moves are ignored.
    ///
    /// Returns whether the cursor actually moved.
    pub fn advance(&mut self, to: Timestamp) -> bool {
        if to > self.last_processed_at {
            self.last_processed_at = to;
            true
        } else {
            false
        }
    }
}

/// Cursor encoding for the "created after X" query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchCursor {
    pub created_after: Timestamp,
}

/// Cursor encoding for the "modified after X" query.
///
/// The origin store encodes this differently from the batch cursor: the
/// buffer window travels with the cursor instead of being folded into it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModifiedCursor {
    pub modified_after: Timestamp,
    pub buffer_ms: Timestamp,
}

/// The two query encodings of one catch-up pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatchUpWindow {
    pub batch: BatchCursor,
    pub modified: ModifiedCursor,
}

impl CatchUpWindow {
    /// Derive a window from a cursor position with the default skew buffer.
    pub fn from_cursor(since: Timestamp) -> Self {
        Self::with_buffer(since, SKEW_BUFFER_MS)
    }

    /// Derive a window with an explicit buffer.
    pub fn with_buffer(since: Timestamp, buffer_ms: Timestamp) -> Self {
        Self {
            batch: BatchCursor {
                created_after: since.saturating_sub(buffer_ms),
            },
            modified: ModifiedCursor {
                modified_after: since,
                buffer_ms,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advance_moves_forward() {
        let mut cursor = Cursor::new(1000);
        assert!(cursor.advance(2000));
        assert_eq!(cursor.last_processed_at, 2000);
    }

    #[test]
    fn advance_ignores_backward_and_equal() {
        let mut cursor = Cursor::new(2000);
        assert!(!cursor.advance(1000));
        assert!(!cursor.advance(2000));
        assert_eq!(cursor.last_processed_at, 2000);
    }

    #[test]
    fn window_buffers_batch_cursor_backward() {
        let window = CatchUpWindow::with_buffer(100_000, 30_000);
        assert_eq!(window.batch.created_after, 70_000);
        assert_eq!(window.modified.modified_after, 100_000);
        assert_eq!(window.modified.buffer_ms, 30_000);
    }

    #[test]
    fn window_saturates_at_epoch() {
        let window = CatchUpWindow::with_buffer(5_000, 30_000);
        assert_eq!(window.batch.created_after, 0);
    }

    #[test]
    fn default_buffer_is_fifteen_minutes() {
        let window = CatchUpWindow::from_cursor(10 * SKEW_BUFFER_MS);
        assert_eq!(window.batch.created_after, 9 * SKEW_BUFFER_MS);
        assert_eq!(window.modified.buffer_ms, SKEW_BUFFER_MS);
    }

    #[test]
    fn serialization_roundtrip() {
        let cursor = Cursor::new(123_456);
        let json = serde_json::to_string(&cursor).unwrap();
        assert!(json.contains("lastProcessedAt"));
        let parsed: Cursor = serde_json::from_str(&json).unwrap();
        assert_eq!(cursor, parsed);
    }
}
