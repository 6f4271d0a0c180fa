//! Extraction outcome and failure taxonomy.
//!
//! Every extraction attempt resolves to exactly one of three shapes:
//! completed, interrupted (a worker was terminated mid-run and the attempt
//! must look like it never happened), or failed with a closed set of kinds.
//! Exhaustive matching on [`FailureKind`] replaces the per-exit-code
//! exception hierarchy of runtime-dispatch languages.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result of one extraction attempt.
///
/// `Interrupted` is deliberately not a failure: it means a supervisor killed
/// the worker process mid-task. Recording it as a failure would make the
/// blob look permanently broken to operators and could block retry policies;
/// instead it must look like "no attempt yet" so another worker picks the
/// task up without penalty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractionOutcome<T> {
    Completed(T),
    Interrupted,
    Failed(ExtractionFailure),
}

impl<T> ExtractionOutcome<T> {
    pub fn is_interrupted(&self) -> bool {
        matches!(self, ExtractionOutcome::Interrupted)
    }

    /// Map the completed payload, leaving the other arms untouched.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> ExtractionOutcome<U> {
        match self {
            ExtractionOutcome::Completed(t) => ExtractionOutcome::Completed(f(t)),
            ExtractionOutcome::Interrupted => ExtractionOutcome::Interrupted,
            ExtractionOutcome::Failed(e) => ExtractionOutcome::Failed(e),
        }
    }
}

/// Terminal failure of one extraction attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionFailure {
    pub kind: FailureKind,
    pub detail: String,
}

impl ExtractionFailure {
    pub fn new(kind: FailureKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }
}

impl std::fmt::Display for ExtractionFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.detail)
    }
}

/// Closed set of extraction failure kinds.
///
/// The OCR-overlay variants map one-to-one onto the overlay tool's
/// documented exit codes; `SubprocessCrashed` covers unexpected nonzero
/// exits from tools without a documented contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailureKind {
    /// Unexpected nonzero exit; detail carries the code and captured stderr.
    SubprocessCrashed,
    /// Overlay tool rejected its arguments (exit 1).
    BadArgs,
    /// Input file invalid even for the skip-text fallback path (exit 2, terminal).
    InvalidInput,
    /// Overlay tool is missing an external dependency (exit 3).
    MissingDependency,
    /// File access error (exit 5).
    FileAccess,
    /// Input already carries a text layer (exit 6).
    AlreadyOcred,
    /// Overlay tool's own child process failed (exit 7).
    ChildProcess,
    /// Encrypted input that could not be decrypted (exit 8, terminal).
    EncryptedInput,
    /// Invalid custom configuration passed to the overlay tool (exit 9).
    InvalidConfig,
    /// Unspecified other error (exit 15).
    Other,
    /// Interrupted by a user signal at the terminal (exit 130).
    UserInterrupt,
    /// Bounded downstream call (search index) exceeded its timeout.
    IndexTimeout,
    /// Downstream search index reported an error.
    IndexRejected,
}

/// Durable-store error surface shared by the write and read sides.
///
/// Kept cause-erased so the dep-light crates can name these kinds without
/// pulling in the storage backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("event store write failed: {0}")]
    Write(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("event store read failed: {0}")]
    Read(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl StoreError {
    pub fn write(cause: impl std::error::Error + Send + Sync + 'static) -> Self {
        StoreError::Write(Box::new(cause))
    }

    pub fn read(cause: impl std::error::Error + Send + Sync + 'static) -> Self {
        StoreError::Read(Box::new(cause))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_preserves_non_completed_arms() {
        let interrupted: ExtractionOutcome<u32> = ExtractionOutcome::Interrupted;
        assert!(interrupted.map(|v| v + 1).is_interrupted());

        let failed: ExtractionOutcome<u32> =
            ExtractionOutcome::Failed(ExtractionFailure::new(FailureKind::Other, "boom"));
        match failed.map(|v| v + 1) {
            ExtractionOutcome::Failed(f) => assert_eq!(f.kind, FailureKind::Other),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }
}
