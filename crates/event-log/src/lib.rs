//! Append-only ingestion event log: the sole source of truth for per-file
//! extraction status.
//!
//! Events are immutable; the same (blob, extractor) pair accrues rows across
//! retries and re-ingestions, and nothing but the blob purge ever deletes.
//! The read side re-aggregates from rows on every query, so the worst a
//! concurrent reader can observe is a status that is momentarily behind the
//! latest write, never an inconsistent one.

pub mod model;
pub mod recorder;
pub mod store;

pub use model::{
    details, now_ms, BlobMetadataRow, EventKind, EventStatus, IngestQuery, IngestionEvent,
};
pub use recorder::EventRecorder;
pub use store::EventStore;
