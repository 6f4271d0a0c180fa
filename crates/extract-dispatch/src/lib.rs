//! Extractor registry and dispatch policy.
//!
//! An extractor is a capability descriptor plus an async `extract` entry
//! point. For a given blob, the registry selects every capable extractor and
//! orders them cheapest-first; the dispatcher invokes them in that order,
//! recording each state transition through an event sink. The decision logic
//! here is storage-free; the durable side lives behind
//! [`ExtractionEventSink`].

use async_trait::async_trait;
use core_types::{BlobRef, ExtractionFailure, ExtractionOutcome, IngestId, MediaType, StoreError};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DispatchError {
    /// Programming/config error: a parameter the extractor cannot run
    /// without is absent. Aborts the dispatch immediately; retrying would
    /// fail the same way.
    #[error("missing required parameter `{0}`")]
    MissingParameter(&'static str),
    /// A terminal event could not be recorded. Never swallowed: losing a
    /// terminal event would corrupt status reconstruction.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Parameters handed to every extractor invocation.
#[derive(Debug, Clone)]
pub struct ExtractParams {
    /// Languages to OCR in, in tool notation. Extractors that need a
    /// language treat an empty list as a missing parameter.
    pub languages: Vec<String>,
    /// Scratch directory for intermediate and output files.
    pub scratch_dir: PathBuf,
}

/// A pluggable extraction capability.
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Stable identity; used in events, ordering ties, and status matching.
    fn name(&self) -> &'static str;

    /// Whether this extractor can process the given media type.
    fn accepts(&self, media_type: &MediaType) -> bool;

    /// Whether this extractor's output feeds the search index.
    fn indexes_content(&self) -> bool;

    /// Tie-break among equal-cost candidates; lower runs first.
    fn priority(&self) -> i32;

    /// Estimated cost of processing; candidates run cheapest-first.
    fn cost(&self, media_type: &MediaType, size: u64) -> u64;

    /// Run the extraction. `Interrupted` means a worker died mid-run and the
    /// blob stays eligible for retry; the completed payload is an optional
    /// detail string recorded with the success event.
    async fn extract(
        &self,
        blob: &BlobRef,
        params: &ExtractParams,
    ) -> Result<ExtractionOutcome<Option<String>>, DispatchError>;
}

/// Receives per-blob extraction state transitions.
///
/// Implementations append to the durable event log; progress notes do NOT
/// travel through this trait (they are best-effort and throttled
/// elsewhere).
#[async_trait]
pub trait ExtractionEventSink: Send + Sync {
    /// The media type was detected and these extractors were chosen to run.
    async fn media_type_detected(
        &self,
        blob: &BlobRef,
        ingest: &IngestId,
        extractors: &[String],
    ) -> Result<(), StoreError>;

    async fn extractor_started(
        &self,
        blob: &BlobRef,
        ingest: &IngestId,
        extractor: &str,
    ) -> Result<(), StoreError>;

    async fn extractor_succeeded(
        &self,
        blob: &BlobRef,
        ingest: &IngestId,
        extractor: &str,
        detail: Option<&str>,
    ) -> Result<(), StoreError>;

    async fn extractor_failed(
        &self,
        blob: &BlobRef,
        ingest: &IngestId,
        extractor: &str,
        failure: &ExtractionFailure,
    ) -> Result<(), StoreError>;
}

/// Registry of available extractors.
#[derive(Default, Clone)]
pub struct ExtractorRegistry {
    extractors: Vec<Arc<dyn Extractor>>,
}

impl ExtractorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, extractor: Arc<dyn Extractor>) {
        self.extractors.push(extractor);
    }

    pub fn len(&self) -> usize {
        self.extractors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.extractors.is_empty()
    }

    /// All extractors accepting `media_type`, ordered ascending by
    /// `(cost, priority, name)`. The order is a deterministic total order:
    /// re-running with the same inputs always yields the same sequence.
    pub fn candidates(&self, media_type: &MediaType, size: u64) -> Vec<Arc<dyn Extractor>> {
        let mut matching: Vec<Arc<dyn Extractor>> = self
            .extractors
            .iter()
            .filter(|e| e.accepts(media_type))
            .cloned()
            .collect();
        matching.sort_by(|a, b| {
            a.cost(media_type, size)
                .cmp(&b.cost(media_type, size))
                .then_with(|| a.priority().cmp(&b.priority()))
                .then_with(|| a.name().cmp(b.name()))
        });
        matching
    }
}

/// Outcome of one extractor within a dispatch.
#[derive(Debug, Clone)]
pub struct ExtractorRun {
    pub extractor: &'static str,
    pub outcome: ExtractionOutcome<Option<String>>,
}

/// Aggregate result of dispatching one blob.
#[derive(Debug, Clone, Default)]
pub struct DispatchReport {
    pub runs: Vec<ExtractorRun>,
    /// True if a worker termination cut the dispatch short; the blob stays
    /// eligible for another worker to retry.
    pub interrupted: bool,
}

impl DispatchReport {
    pub fn any_success(&self) -> bool {
        self.runs
            .iter()
            .any(|r| matches!(r.outcome, ExtractionOutcome::Completed(_)))
    }

    pub fn failures(&self) -> impl Iterator<Item = (&'static str, &ExtractionFailure)> + '_ {
        self.runs.iter().filter_map(|r| match &r.outcome {
            ExtractionOutcome::Failed(f) => Some((r.extractor, f)),
            _ => None,
        })
    }
}

/// Invoke every capable extractor for `blob`, cheapest first.
///
/// Failure of one extractor moves on to the next; an interrupt stops the
/// dispatch without recording a terminal event for the cut-off extractor;
/// a missing parameter or a terminal-event write failure aborts the whole
/// dispatch with an error.
pub async fn dispatch(
    registry: &ExtractorRegistry,
    sink: &dyn ExtractionEventSink,
    blob: &BlobRef,
    ingest: &IngestId,
    params: &ExtractParams,
) -> Result<DispatchReport, DispatchError> {
    let candidates = registry.candidates(&blob.media_type, blob.size);
    let names: Vec<String> = candidates.iter().map(|e| e.name().to_string()).collect();
    sink.media_type_detected(blob, ingest, &names).await?;

    if candidates.is_empty() {
        tracing::debug!(blob = %blob.id, media_type = %blob.media_type, "no capable extractor");
        return Ok(DispatchReport::default());
    }

    let mut report = DispatchReport::default();
    for extractor in candidates {
        let name = extractor.name();
        sink.extractor_started(blob, ingest, name).await?;
        tracing::debug!(blob = %blob.id, extractor = name, "extractor started");

        let outcome = extractor.extract(blob, params).await?;
        match &outcome {
            ExtractionOutcome::Completed(detail) => {
                sink.extractor_succeeded(blob, ingest, name, detail.as_deref())
                    .await?;
            }
            ExtractionOutcome::Failed(failure) => {
                tracing::warn!(blob = %blob.id, extractor = name, %failure, "extractor failed");
                sink.extractor_failed(blob, ingest, name, failure).await?;
            }
            ExtractionOutcome::Interrupted => {
                // No terminal event: the attempt must look like it never
                // happened so another worker can pick it up.
                tracing::info!(blob = %blob.id, extractor = name, "worker terminated mid-extraction");
                report.runs.push(ExtractorRun {
                    extractor: name,
                    outcome,
                });
                report.interrupted = true;
                return Ok(report);
            }
        }
        report.runs.push(ExtractorRun {
            extractor: name,
            outcome,
        });
    }

    Ok(report)
}
