//! Exit-code contract of the OCR overlay tool.
//!
//! The numeric values are the tool's documented public interface and must
//! not drift. Classification is split in two: what the first attempt means
//! (which codes trigger a fallback) and what any final attempt means (where
//! the fallback codes become terminal failures).

use core_types::{ExtractionFailure, ExtractionOutcome, FailureKind};

pub const EXIT_OK: i32 = 0;
pub const EXIT_BAD_ARGS: i32 = 1;
pub const EXIT_INVALID_INPUT: i32 = 2;
pub const EXIT_MISSING_DEPENDENCY: i32 = 3;
pub const EXIT_PDFA_WARNING: i32 = 4;
pub const EXIT_FILE_ACCESS: i32 = 5;
pub const EXIT_ALREADY_OCRED: i32 = 6;
pub const EXIT_CHILD_PROCESS: i32 = 7;
pub const EXIT_ENCRYPTED: i32 = 8;
pub const EXIT_INVALID_CONFIG: i32 = 9;
pub const EXIT_VALIDITY_WARNING: i32 = 10;
pub const EXIT_OTHER: i32 = 15;
pub const EXIT_USER_INTERRUPT: i32 = 130;

/// What the first overlay attempt's exit code asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FirstAttempt {
    /// Output produced (possibly with a PDF/A or validity warning).
    Success,
    /// Invalid input under redo-OCR; retry once with skip-text, because some
    /// malformed-but-usable inputs (interactive form fields) are rejected
    /// only by the redo code path.
    RetrySkipText,
    /// Encrypted input; strip owner-password encryption and retry once.
    Decrypt,
    /// Terminal failure, no fallback applies.
    Fail(FailureKind),
    /// Worker terminated externally; the attempt never concluded.
    Interrupted,
}

/// Classify the first attempt (redo-OCR mode).
pub fn classify_first_attempt(code: i32) -> FirstAttempt {
    match code {
        EXIT_OK | EXIT_PDFA_WARNING | EXIT_VALIDITY_WARNING => FirstAttempt::Success,
        EXIT_INVALID_INPUT => FirstAttempt::RetrySkipText,
        EXIT_ENCRYPTED => FirstAttempt::Decrypt,
        EXIT_BAD_ARGS => FirstAttempt::Fail(FailureKind::BadArgs),
        EXIT_MISSING_DEPENDENCY => FirstAttempt::Fail(FailureKind::MissingDependency),
        EXIT_FILE_ACCESS => FirstAttempt::Fail(FailureKind::FileAccess),
        EXIT_ALREADY_OCRED => FirstAttempt::Fail(FailureKind::AlreadyOcred),
        EXIT_CHILD_PROCESS => FirstAttempt::Fail(FailureKind::ChildProcess),
        EXIT_INVALID_CONFIG => FirstAttempt::Fail(FailureKind::InvalidConfig),
        EXIT_OTHER => FirstAttempt::Fail(FailureKind::Other),
        EXIT_USER_INTERRUPT => FirstAttempt::Fail(FailureKind::UserInterrupt),
        _ => FirstAttempt::Interrupted,
    }
}

/// Classify a final attempt: the fallback-trigger codes are now terminal.
/// There are no further fallback levels; a second failure ends the
/// invocation.
pub fn classify_final_attempt(code: i32, detail: &str) -> ExtractionOutcome<()> {
    let kind = match code {
        EXIT_OK | EXIT_PDFA_WARNING | EXIT_VALIDITY_WARNING => {
            return ExtractionOutcome::Completed(());
        }
        EXIT_INVALID_INPUT => FailureKind::InvalidInput,
        EXIT_ENCRYPTED => FailureKind::EncryptedInput,
        EXIT_BAD_ARGS => FailureKind::BadArgs,
        EXIT_MISSING_DEPENDENCY => FailureKind::MissingDependency,
        EXIT_FILE_ACCESS => FailureKind::FileAccess,
        EXIT_ALREADY_OCRED => FailureKind::AlreadyOcred,
        EXIT_CHILD_PROCESS => FailureKind::ChildProcess,
        EXIT_INVALID_CONFIG => FailureKind::InvalidConfig,
        EXIT_OTHER => FailureKind::Other,
        EXIT_USER_INTERRUPT => FailureKind::UserInterrupt,
        _ => return ExtractionOutcome::Interrupted,
    };
    ExtractionOutcome::Failed(ExtractionFailure::new(kind, detail))
}
