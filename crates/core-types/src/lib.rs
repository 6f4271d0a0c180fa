//! Core identifiers and shared lightweight types for OmniExtract.
//!
//! These types intentionally avoid heavy dependencies and aim to be
//! serialization-friendly for event payloads and CLI output.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

pub mod config;
pub mod outcome;

pub use outcome::{ExtractionFailure, ExtractionOutcome, FailureKind, StoreError};

/// Unix timestamp in milliseconds; i64 for easy serde and arithmetic.
pub type Timestamp = i64;

/// Content-derived identifier of an uploaded file (hex digest of its bytes).
///
/// Stable across re-ingestions: the same bytes always map to the same blob.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlobId(pub String);

impl BlobId {
    pub fn new(id: impl Into<String>) -> Self {
        BlobId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BlobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of an ingestion batch.
///
/// Doubles as a string-prefix filter: batches that share a prefix can be
/// queried together (e.g. `2026-08-` matches every batch of that month).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IngestId(pub String);

impl IngestId {
    pub fn new(id: impl Into<String>) -> Self {
        IngestId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn starts_with(&self, prefix: &str) -> bool {
        self.0.starts_with(prefix)
    }
}

impl fmt::Display for IngestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Detected media type of a blob ("application/pdf", "image/png", ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MediaType(pub String);

impl MediaType {
    pub const PDF: &'static str = "application/pdf";

    pub fn new(mt: impl Into<String>) -> Self {
        MediaType(mt.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True for raster image types (`image/*`).
    pub fn is_image(&self) -> bool {
        self.0.starts_with("image/")
    }

    pub fn is_pdf(&self) -> bool {
        self.0 == Self::PDF
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A blob as handed to extractors: identity plus where its bytes live right now.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlobRef {
    pub id: BlobId,
    pub path: PathBuf,
    pub media_type: MediaType,
    pub size: u64,
}
