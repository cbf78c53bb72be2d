//! Dual-cursor delta fetching.
//!
//! The origin store has no unified change feed, so one catch-up window means
//! two queries: created-after for new records and modified-after for changed
//! ones. Both are issued together and awaited jointly. The results are
//! concatenated modified-first; the grouper resolves overlap by letting the
//! later array position win.

use crate::origin::{OriginStore, RecordFilter, TransportError};
use tether_engine::{CatchUpWindow, RecordDelta, SyncScope, Timestamp};

/// Fetch every delta a scope accumulated since `since`.
///
/// The new-since query is filtered to live records (a record created and
/// already deleted inside the window is noise); the modified-since query is
/// unfiltered so deletions are observed. No ordering is guaranteed beyond
/// the modified-first concatenation.
pub async fn fetch_deltas_since<S: OriginStore>(
    origin: &S,
    scope: &SyncScope,
    since: Timestamp,
    buffer_ms: u64,
) -> Result<Vec<RecordDelta>, TransportError> {
    let window = CatchUpWindow::with_buffer(since, buffer_ms);
    let route = scope.route();

    let (modified, new) = tokio::join!(
        origin.query_modified_since(&route, &scope.collection, window.modified, RecordFilter::any()),
        origin.query_new_since(&route, &scope.collection, window.batch, RecordFilter::active()),
    );

    let mut deltas = modified?;
    let new = new?;

    tracing::debug!(
        scope = %scope.id,
        modified = deltas.len(),
        new = new.len(),
        since,
        "fetched catch-up deltas"
    );

    deltas.extend(new);
    Ok(deltas)
}
