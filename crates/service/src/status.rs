//! Read-side status query: store rows in, per-file aggregates out.

use core_types::StoreError;
use event_log::{EventStore, IngestQuery};
use ingest_status::FileStatus;

/// Reconstruct per-file status for every blob referenced by events matching
/// the batch query. A read failure fails the whole query; no partial
/// results.
pub fn file_statuses(
    store: &EventStore,
    query: &IngestQuery,
) -> Result<Vec<FileStatus>, StoreError> {
    let events = store.events_matching(query)?;
    let metadata = store.metadata_matching(query)?;
    Ok(ingest_status::reconstruct(&events, &metadata))
}
