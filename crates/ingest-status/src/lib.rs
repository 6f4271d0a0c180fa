//! Status reconstruction: folding the event log into per-file aggregates.
//!
//! Everything here is a pure function over in-memory event/metadata lists;
//! the durable store only supplies those lists. Derived status is never
//! cached; each query re-folds, so it is always a function of the log at
//! query time.
//!
//! The "stuck" detection is a heuristic, not a proven invariant: a file with
//! more than [`STUCK_EVENT_THRESHOLD`] events in the queried batch scope is
//! assumed to be cycling through an extractor retry loop that never
//! terminates. A legitimately much-re-ingested file can trip it too; the
//! flag means "look at this one", not "this is definitely broken".

use core_types::{BlobId, MediaType, Timestamp};
use event_log::{details, BlobMetadataRow, EventKind, EventStatus, IngestionEvent};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A file with strictly more events than this (within the queried scope) is
/// reported as possibly stuck, with aggregation skipped.
pub const STUCK_EVENT_THRESHOLD: usize = 100;

/// Observed state of one (file, extractor) pair at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExtractorState {
    /// Declared to run but no status event observed yet.
    Unknown,
    Started,
    Success,
    Failure,
}

impl From<EventStatus> for ExtractorState {
    fn from(status: EventStatus) -> Self {
        match status {
            EventStatus::Started => ExtractorState::Started,
            EventStatus::Success => ExtractorState::Success,
            EventStatus::Failure => ExtractorState::Failure,
        }
    }
}

/// One status update in an extractor's history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub state: ExtractorState,
    pub at: Timestamp,
    pub error: Option<String>,
}

/// Time-ordered history of one (file, extractor) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractorStatus {
    pub extractor: String,
    pub updates: Vec<StatusUpdate>,
}

impl ExtractorStatus {
    /// Most recent state, `Unknown` when no update was ever observed.
    pub fn latest(&self) -> ExtractorState {
        self.updates
            .last()
            .map_or(ExtractorState::Unknown, |u| u.state)
    }
}

/// Most recent observed size of a file under one storage path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathSize {
    pub path: String,
    pub file_size: u64,
}

/// The reconstructor's per-file output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileStatus {
    pub blob_id: BlobId,
    pub workspace: Option<String>,
    pub media_types: Vec<MediaType>,
    pub paths: Vec<PathSize>,
    pub first_event: Timestamp,
    pub last_event: Timestamp,
    pub extractors: Vec<ExtractorStatus>,
    pub errors: Vec<String>,
    pub infinite_loop: bool,
}

/// Fold a batch-scoped event/metadata snapshot into per-file statuses,
/// ordered by first-event time, most recent first.
pub fn reconstruct(events: &[IngestionEvent], metadata: &[BlobMetadataRow]) -> Vec<FileStatus> {
    let mut per_blob: BTreeMap<&BlobId, Vec<&IngestionEvent>> = BTreeMap::new();
    for event in events {
        per_blob.entry(&event.blob_id).or_default().push(event);
    }

    let mut statuses: Vec<FileStatus> = per_blob
        .into_iter()
        .map(|(blob_id, blob_events)| {
            if is_stuck(&blob_events) {
                stuck_status(blob_id, &blob_events)
            } else {
                let rows: Vec<&BlobMetadataRow> = metadata
                    .iter()
                    .filter(|r| &r.blob_id == blob_id)
                    .collect();
                aggregate_file(blob_id, &blob_events, &rows)
            }
        })
        .collect();

    statuses.sort_by(|a, b| b.first_event.cmp(&a.first_event));
    statuses
}

/// Stuck heuristic: strictly more events than the threshold.
pub fn is_stuck(events: &[&IngestionEvent]) -> bool {
    events.len() > STUCK_EVENT_THRESHOLD
}

/// Extractors declared to run, from the most recent media-detected event.
pub fn declared_extractors(events: &[&IngestionEvent]) -> Vec<String> {
    events
        .iter()
        .rev()
        .find(|e| e.kind == EventKind::MediaDetected)
        .and_then(|e| e.details.get(details::EXTRACTORS))
        .and_then(|v| v.as_array())
        .map(|names| {
            names
                .iter()
                .filter_map(|n| n.as_str().map(String::from))
                .collect()
        })
        .unwrap_or_default()
}

/// History of one extractor: every status-bearing event whose details name
/// it, in time order.
pub fn fold_extractor(events: &[&IngestionEvent], extractor: &str) -> ExtractorStatus {
    let updates = events
        .iter()
        .filter(|e| e.kind == EventKind::ExtractorRun && e.extractor() == Some(extractor))
        .map(|e| StatusUpdate {
            state: e.status.into(),
            at: e.event_time,
            error: e
                .details
                .get(details::ERROR)
                .and_then(|v| v.as_str())
                .map(String::from),
        })
        .collect();
    ExtractorStatus {
        extractor: extractor.to_string(),
        updates,
    }
}

fn stuck_status(blob_id: &BlobId, events: &[&IngestionEvent]) -> FileStatus {
    FileStatus {
        blob_id: blob_id.clone(),
        workspace: None,
        media_types: Vec::new(),
        paths: Vec::new(),
        first_event: events.iter().map(|e| e.event_time).min().unwrap_or(0),
        last_event: events.iter().map(|e| e.event_time).max().unwrap_or(0),
        extractors: Vec::new(),
        errors: Vec::new(),
        infinite_loop: true,
    }
}

/// Full aggregation of one normal (non-stuck) file.
pub fn aggregate_file(
    blob_id: &BlobId,
    events: &[&IngestionEvent],
    metadata: &[&BlobMetadataRow],
) -> FileStatus {
    let extractors = declared_extractors(events)
        .iter()
        .map(|name| fold_extractor(events, name))
        .collect();

    let mut errors: Vec<String> = Vec::new();
    for event in events {
        if event.status == EventStatus::Failure {
            if let Some(error) = event.details.get(details::ERROR).and_then(|v| v.as_str()) {
                if !errors.iter().any(|e| e == error) {
                    errors.push(error.to_string());
                }
            }
        }
    }

    let workspace = events
        .iter()
        .rev()
        .find_map(|e| e.details.get(details::WORKSPACE).and_then(|v| v.as_str()))
        .map(String::from);

    let mut media_types: Vec<MediaType> = Vec::new();
    for event in events {
        if let Some(mt) = event.details.get(details::MEDIA_TYPE).and_then(|v| v.as_str()) {
            let mt = MediaType::new(mt);
            if !media_types.contains(&mt) {
                media_types.push(mt);
            }
        }
    }

    // Most recent size per path across all metadata observations.
    let mut latest: BTreeMap<&str, (&BlobMetadataRow, Timestamp)> = BTreeMap::new();
    for &row in metadata {
        let entry = latest.entry(row.path.as_str()).or_insert((row, row.insert_time));
        if row.insert_time >= entry.1 {
            *entry = (row, row.insert_time);
        }
    }
    let paths = latest
        .into_values()
        .map(|(row, _)| PathSize {
            path: row.path.clone(),
            file_size: row.file_size,
        })
        .collect();

    FileStatus {
        blob_id: blob_id.clone(),
        workspace,
        media_types,
        paths,
        first_event: events.iter().map(|e| e.event_time).min().unwrap_or(0),
        last_event: events.iter().map(|e| e.event_time).max().unwrap_or(0),
        extractors,
        errors,
        infinite_loop: false,
    }
}
