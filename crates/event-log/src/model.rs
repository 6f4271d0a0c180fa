//! Row models of the append-only event log.

use core_types::{BlobId, IngestId, Timestamp};
use serde::{Deserialize, Serialize};

/// Detail-payload keys shared by writers and the status reconstructor.
pub mod details {
    pub const MEDIA_TYPE: &str = "media_type";
    pub const EXTRACTORS: &str = "extractors";
    pub const EXTRACTOR: &str = "extractor";
    pub const WORKSPACE: &str = "workspace";
    pub const ERROR: &str = "error";
    pub const ERROR_KIND: &str = "error_kind";
    pub const OUTPUT: &str = "output";
}

/// What an event is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    /// Media type detected; details carry the chosen extractor list.
    MediaDetected,
    /// One extractor's state transition for this blob.
    ExtractorRun,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::MediaDetected => "media_type_detected",
            EventKind::ExtractorRun => "extractor_run",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "media_type_detected" => Some(EventKind::MediaDetected),
            "extractor_run" => Some(EventKind::ExtractorRun),
            _ => None,
        }
    }
}

/// Status carried by an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventStatus {
    Started,
    Success,
    Failure,
}

impl EventStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            EventStatus::Started => "started",
            EventStatus::Success => "success",
            EventStatus::Failure => "failure",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "started" => Some(EventStatus::Started),
            "success" => Some(EventStatus::Success),
            "failure" => Some(EventStatus::Failure),
            _ => None,
        }
    }
}

/// One immutable row of `ingestion_events`.
///
/// The same (blob, extractor) pair accrues multiple rows across retries and
/// re-ingestions; history is preserved, never overwritten.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestionEvent {
    pub blob_id: BlobId,
    pub ingest_id: IngestId,
    pub kind: EventKind,
    pub status: EventStatus,
    pub details: serde_json::Value,
    pub event_time: Timestamp,
}

impl IngestionEvent {
    /// The extractor this event is about, if its details name one.
    pub fn extractor(&self) -> Option<&str> {
        self.details.get(details::EXTRACTOR).and_then(|v| v.as_str())
    }
}

/// One immutable row of `blob_metadata`: a (ingest, blob) path observation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobMetadataRow {
    pub ingest_id: IngestId,
    pub blob_id: BlobId,
    pub file_size: u64,
    pub path: String,
    pub insert_time: Timestamp,
}

/// Batch selector: one exact ingest id, or every batch sharing a prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestQuery {
    Exact(IngestId),
    Prefix(String),
}

impl IngestQuery {
    pub fn matches(&self, ingest: &IngestId) -> bool {
        match self {
            IngestQuery::Exact(id) => id == ingest,
            IngestQuery::Prefix(p) => ingest.starts_with(p),
        }
    }
}

/// Current wall-clock time in Unix milliseconds.
pub fn now_ms() -> Timestamp {
    std::time::SystemTime::now()
        .duration_since(std::time::SystemTime::UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_and_status_round_trip_their_wire_names() {
        for kind in [EventKind::MediaDetected, EventKind::ExtractorRun] {
            assert_eq!(EventKind::parse(kind.as_str()), Some(kind));
        }
        for status in [EventStatus::Started, EventStatus::Success, EventStatus::Failure] {
            assert_eq!(EventStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(EventKind::parse("unknown"), None);
    }

    #[test]
    fn query_matches_exact_and_prefix() {
        let q = IngestQuery::Exact(IngestId::new("batch-1"));
        assert!(q.matches(&IngestId::new("batch-1")));
        assert!(!q.matches(&IngestId::new("batch-10")));

        let p = IngestQuery::Prefix("batch-1".into());
        assert!(p.matches(&IngestId::new("batch-1")));
        assert!(p.matches(&IngestId::new("batch-10")));
        assert!(!p.matches(&IngestId::new("other")));
    }
}
