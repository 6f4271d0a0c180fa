//! Narrow contracts to external collaborators.
//!
//! The search index and the progress-note sink live outside this workspace;
//! these traits are the whole surface the core depends on. Tests and the
//! CLI wire the no-op/logging implementations.

use async_trait::async_trait;
use core_types::BlobId;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("collaborator error: {0}")]
pub struct CollaboratorError(pub String);

/// Downstream search/index service.
#[async_trait]
pub trait SearchIndex: Send + Sync {
    /// Record OCR output for one blob in one language; `text` is absent when
    /// OCR produced no text. Callers must bound this with a timeout.
    async fn add_document_ocr(
        &self,
        blob: &BlobId,
        text: Option<&str>,
        language: &str,
    ) -> Result<(), CollaboratorError>;
}

/// Sink for operator-visible progress notes. Best-effort: callers log and
/// drop failures rather than failing the extraction.
pub trait ProgressNotifier: Send + Sync {
    fn set_progress_note(&self, blob: &BlobId, extractor: &str, note: &str)
        -> Result<(), CollaboratorError>;
}

/// Index that accepts everything and remembers nothing.
#[derive(Debug, Default)]
pub struct NoopSearchIndex;

#[async_trait]
impl SearchIndex for NoopSearchIndex {
    async fn add_document_ocr(
        &self,
        blob: &BlobId,
        text: Option<&str>,
        language: &str,
    ) -> Result<(), CollaboratorError> {
        tracing::debug!(%blob, language, has_text = text.is_some(), "index call (noop)");
        Ok(())
    }
}

/// Notifier that writes notes to the log only.
#[derive(Debug, Default)]
pub struct LogProgressNotifier;

impl ProgressNotifier for LogProgressNotifier {
    fn set_progress_note(
        &self,
        blob: &BlobId,
        extractor: &str,
        note: &str,
    ) -> Result<(), CollaboratorError> {
        tracing::info!(%blob, extractor, "{note}");
        Ok(())
    }
}
