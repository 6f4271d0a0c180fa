//! OCR execution engine.
//!
//! Two invocation modes over external CLI tools: direct OCR of an image to
//! plain text, and OCR overlay producing a new PDF with a text layer. The
//! overlay path implements a bounded fallback sequence: redo-OCR first, then
//! at most one retry either in skip-text mode (invalid input) or against a
//! decrypted copy (encrypted input). The exit-code contract lives in
//! [`exit`] and is the tool's public interface; do not alter it.

use command_runner::{run_command, CommandError, CommandOutput, StderrSink};
use core_types::config::OcrSection;
use core_types::{ExtractionFailure, ExtractionOutcome, FailureKind};
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub mod exit;

use exit::{classify_final_attempt, classify_first_attempt, FirstAttempt};

/// qpdf exits 3 when it succeeded with warnings; both count as decrypted.
const QPDF_EXIT_OK: i32 = 0;
const QPDF_EXIT_WARNINGS: i32 = 3;

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("OCR tool `{tool}` not found on PATH: {source}")]
    NotFound {
        tool: String,
        #[source]
        source: which::Error,
    },
    #[error("failed to create scratch directory {path}: {source}")]
    Scratch {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Overlay invocation mode; the fallback sequence switches between these.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OverlayMode {
    RedoOcr,
    SkipText,
}

impl OverlayMode {
    fn flag(self) -> &'static str {
        match self {
            OverlayMode::RedoOcr => "--redo-ocr",
            OverlayMode::SkipText => "--skip-text",
        }
    }
}

/// Resolved OCR toolchain plus the scratch directory for intermediate files.
#[derive(Debug, Clone)]
pub struct OcrEngine {
    tesseract: PathBuf,
    ocrmypdf: PathBuf,
    qpdf: PathBuf,
    scratch_dir: PathBuf,
}

impl OcrEngine {
    /// Resolve tool binaries from config (names looked up on PATH, absolute
    /// paths taken as-is) and make sure the scratch directory exists.
    pub fn from_config(ocr: &OcrSection, scratch_dir: &Path) -> Result<Self, ToolError> {
        let resolve = |name: &str| {
            which::which(name).map_err(|source| ToolError::NotFound {
                tool: name.to_string(),
                source,
            })
        };
        std::fs::create_dir_all(scratch_dir).map_err(|source| ToolError::Scratch {
            path: scratch_dir.to_path_buf(),
            source,
        })?;
        Ok(Self {
            tesseract: resolve(&ocr.tesseract_bin)?,
            ocrmypdf: resolve(&ocr.ocrmypdf_bin)?,
            qpdf: resolve(&ocr.qpdf_bin)?,
            scratch_dir: scratch_dir.to_path_buf(),
        })
    }

    /// Bypass PATH resolution; used by tests with scripted stand-in tools.
    pub fn with_binaries(
        tesseract: PathBuf,
        ocrmypdf: PathBuf,
        qpdf: PathBuf,
        scratch_dir: PathBuf,
    ) -> Self {
        Self {
            tesseract,
            ocrmypdf,
            qpdf,
            scratch_dir,
        }
    }

    /// Direct OCR of an image, producing plain text on stdout.
    ///
    /// Blank or whitespace-only output means "no text produced", not an
    /// error.
    pub async fn image_to_text(
        &self,
        input: &Path,
        lang: &str,
        sink: &mut dyn StderrSink,
    ) -> ExtractionOutcome<Option<String>> {
        let mut rec = Recording::new(sink);
        let args: Vec<OsString> = vec![
            input.as_os_str().to_os_string(),
            "stdout".into(),
            "-l".into(),
            lang.into(),
        ];
        let out = match self.run(&self.tesseract, &args, &mut rec).await {
            Ok(out) => out,
            Err(err) => return ExtractionOutcome::Failed(failure_from_command(&err)),
        };

        match out.exit_code {
            0 => {
                let text = out.stdout.trim();
                if text.is_empty() {
                    ExtractionOutcome::Completed(None)
                } else {
                    ExtractionOutcome::Completed(Some(text.to_string()))
                }
            }
            command_runner::WORKER_TERM_EXIT_CODE => ExtractionOutcome::Interrupted,
            code => ExtractionOutcome::Failed(ExtractionFailure::new(
                FailureKind::SubprocessCrashed,
                format!("exit code {code}: {}", rec.transcript()),
            )),
        }
    }

    /// OCR overlay on a PDF, writing a new PDF with a text layer to `output`.
    ///
    /// At most two tool attempts per invocation: redo-OCR, then one fallback
    /// retry for invalid (skip-text) or encrypted (decrypt) input.
    pub async fn pdf_overlay(
        &self,
        input: &Path,
        output: &Path,
        lang: &str,
        sink: &mut dyn StderrSink,
    ) -> ExtractionOutcome<PathBuf> {
        let mut rec = Recording::new(sink);
        let first = match self
            .run_overlay(input, output, lang, OverlayMode::RedoOcr, &mut rec)
            .await
        {
            Ok(out) => out,
            Err(err) => return ExtractionOutcome::Failed(failure_from_command(&err)),
        };

        match classify_first_attempt(first.exit_code) {
            FirstAttempt::Success => ExtractionOutcome::Completed(output.to_path_buf()),
            FirstAttempt::Interrupted => ExtractionOutcome::Interrupted,
            FirstAttempt::Fail(kind) => ExtractionOutcome::Failed(ExtractionFailure::new(
                kind,
                detail(first.exit_code, &rec),
            )),
            FirstAttempt::RetrySkipText => {
                tracing::info!(input = %input.display(), "redo-OCR rejected input, retrying with skip-text");
                self.final_overlay(input, output, lang, OverlayMode::SkipText, &mut rec)
                    .await
            }
            FirstAttempt::Decrypt => {
                let encrypted_detail = detail(first.exit_code, &rec);
                tracing::info!(input = %input.display(), "input encrypted, attempting decryption");
                match self.decrypt(input, &mut rec).await {
                    DecryptOutcome::Decrypted(copy) => {
                        self.final_overlay(&copy, output, lang, OverlayMode::RedoOcr, &mut rec)
                            .await
                    }
                    DecryptOutcome::Interrupted => ExtractionOutcome::Interrupted,
                    // Decryption failed: surface the original encrypted-input failure.
                    DecryptOutcome::Failed => ExtractionOutcome::Failed(ExtractionFailure::new(
                        FailureKind::EncryptedInput,
                        encrypted_detail,
                    )),
                }
            }
        }
    }

    /// Run the single allowed retry and map its exit code terminally.
    async fn final_overlay(
        &self,
        input: &Path,
        output: &Path,
        lang: &str,
        mode: OverlayMode,
        rec: &mut Recording<'_>,
    ) -> ExtractionOutcome<PathBuf> {
        let out = match self.run_overlay(input, output, lang, mode, rec).await {
            Ok(out) => out,
            Err(err) => return ExtractionOutcome::Failed(failure_from_command(&err)),
        };
        classify_final_attempt(out.exit_code, &detail(out.exit_code, rec))
            .map(|()| output.to_path_buf())
    }

    async fn run_overlay(
        &self,
        input: &Path,
        output: &Path,
        lang: &str,
        mode: OverlayMode,
        rec: &mut Recording<'_>,
    ) -> Result<CommandOutput, CommandError> {
        let args: Vec<OsString> = vec![
            mode.flag().into(),
            "--language".into(),
            lang.into(),
            input.as_os_str().to_os_string(),
            output.as_os_str().to_os_string(),
        ];
        self.run(&self.ocrmypdf, &args, rec).await
    }

    /// Strip owner-password encryption into a scratch copy.
    async fn decrypt(&self, input: &Path, rec: &mut Recording<'_>) -> DecryptOutcome {
        let stem = input
            .file_stem()
            .map_or_else(|| OsString::from("input"), OsStr::to_os_string);
        let mut name = stem;
        name.push(".decrypted.pdf");
        let copy = self.scratch_dir.join(name);

        let args: Vec<OsString> = vec![
            "--decrypt".into(),
            input.as_os_str().to_os_string(),
            copy.as_os_str().to_os_string(),
        ];
        match self.run(&self.qpdf, &args, rec).await {
            Ok(out) => match out.exit_code {
                QPDF_EXIT_OK | QPDF_EXIT_WARNINGS => DecryptOutcome::Decrypted(copy),
                command_runner::WORKER_TERM_EXIT_CODE => DecryptOutcome::Interrupted,
                code => {
                    tracing::warn!(input = %input.display(), code, "decryption failed");
                    DecryptOutcome::Failed
                }
            },
            Err(err) => {
                tracing::warn!(input = %input.display(), error = %err, "decryption tool failed to run");
                DecryptOutcome::Failed
            }
        }
    }

    async fn run(
        &self,
        program: &Path,
        args: &[OsString],
        rec: &mut Recording<'_>,
    ) -> Result<CommandOutput, CommandError> {
        let argrefs: Vec<&OsStr> = args.iter().map(OsString::as_os_str).collect();
        run_command(program, &argrefs, &[], rec).await
    }
}

enum DecryptOutcome {
    Decrypted(PathBuf),
    Interrupted,
    Failed,
}

fn detail(code: i32, rec: &Recording<'_>) -> String {
    format!("exit code {code}: {}", rec.transcript())
}

fn failure_from_command(err: &CommandError) -> ExtractionFailure {
    match err {
        CommandError::Spawn { .. } => {
            ExtractionFailure::new(FailureKind::MissingDependency, err.to_string())
        }
        CommandError::Io { .. } => {
            ExtractionFailure::new(FailureKind::SubprocessCrashed, err.to_string())
        }
    }
}

/// Forwards lines to the caller's sink while keeping a transcript for
/// failure detail. Spans all attempts of one invocation, so the detail of a
/// terminal failure includes what the earlier attempts printed.
struct Recording<'a> {
    inner: &'a mut dyn StderrSink,
    lines: Vec<String>,
}

impl<'a> Recording<'a> {
    fn new(inner: &'a mut dyn StderrSink) -> Self {
        Self {
            inner,
            lines: Vec::new(),
        }
    }

    fn transcript(&self) -> String {
        self.lines.join("\n")
    }
}

impl StderrSink for Recording<'_> {
    fn line(&mut self, line: &str) {
        self.lines.push(line.to_string());
        self.inner.line(line);
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use command_runner::NullSink;
    use std::os::unix::fs::PermissionsExt;

    /// Write an executable shell script into `dir`.
    fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn engine(dir: &Path, tesseract: PathBuf, ocrmypdf: PathBuf, qpdf: PathBuf) -> OcrEngine {
        OcrEngine::with_binaries(tesseract, ocrmypdf, qpdf, dir.join("scratch"))
    }

    fn noop(dir: &Path, name: &str) -> PathBuf {
        script(dir, name, "exit 0")
    }

    #[tokio::test]
    async fn direct_ocr_returns_text() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path();
        std::fs::create_dir_all(dir.join("scratch")).unwrap();
        let tess = script(dir, "tess", "echo hello");
        let eng = engine(dir, tess, noop(dir, "omp"), noop(dir, "qpdf"));

        let out = eng
            .image_to_text(&dir.join("scan.png"), "eng", &mut NullSink)
            .await;
        assert_eq!(out, ExtractionOutcome::Completed(Some("hello".into())));
    }

    #[tokio::test]
    async fn direct_ocr_blank_output_is_no_text_not_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path();
        std::fs::create_dir_all(dir.join("scratch")).unwrap();
        let tess = script(dir, "tess", "printf '  \\n '");
        let eng = engine(dir, tess, noop(dir, "omp"), noop(dir, "qpdf"));

        let out = eng
            .image_to_text(&dir.join("scan.png"), "eng", &mut NullSink)
            .await;
        assert_eq!(out, ExtractionOutcome::Completed(None));
    }

    #[tokio::test]
    async fn direct_ocr_nonzero_exit_is_subprocess_crash_with_stderr() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path();
        std::fs::create_dir_all(dir.join("scratch")).unwrap();
        let tess = script(dir, "tess", "echo 'cannot read image' >&2; exit 7");
        let eng = engine(dir, tess, noop(dir, "omp"), noop(dir, "qpdf"));

        match eng
            .image_to_text(&dir.join("scan.png"), "eng", &mut NullSink)
            .await
        {
            ExtractionOutcome::Failed(f) => {
                assert_eq!(f.kind, FailureKind::SubprocessCrashed);
                assert!(f.detail.contains("exit code 7"));
                assert!(f.detail.contains("cannot read image"));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn direct_ocr_signal_death_is_interrupt() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path();
        std::fs::create_dir_all(dir.join("scratch")).unwrap();
        let tess = script(dir, "tess", "kill -9 $$");
        let eng = engine(dir, tess, noop(dir, "omp"), noop(dir, "qpdf"));

        let out = eng
            .image_to_text(&dir.join("scan.png"), "eng", &mut NullSink)
            .await;
        assert!(out.is_interrupted());
    }

    #[tokio::test]
    async fn overlay_success_returns_output_path() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path();
        let omp = script(dir, "omp", ": > \"$5\"; exit 0");
        let eng = engine(dir, noop(dir, "tess"), omp, noop(dir, "qpdf"));

        let output = dir.join("out.pdf");
        let out = eng
            .pdf_overlay(&dir.join("in.pdf"), &output, "eng", &mut NullSink)
            .await;
        assert_eq!(out, ExtractionOutcome::Completed(output));
    }

    #[tokio::test]
    async fn invalid_input_falls_back_to_skip_text_once() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path();
        let log = dir.join("calls.log");
        let omp = script(
            dir,
            "omp",
            &format!(
                "echo \"$1\" >> {log}\ncase \"$1\" in --redo-ocr) exit 2;; --skip-text) : > \"$5\"; exit 0;; esac",
                log = log.display()
            ),
        );
        let eng = engine(dir, noop(dir, "tess"), omp, noop(dir, "qpdf"));

        let output = dir.join("out.pdf");
        let out = eng
            .pdf_overlay(&dir.join("in.pdf"), &output, "eng", &mut NullSink)
            .await;
        assert_eq!(out, ExtractionOutcome::Completed(output));

        let calls = std::fs::read_to_string(&log).unwrap();
        assert_eq!(calls, "--redo-ocr\n--skip-text\n");
    }

    #[tokio::test]
    async fn second_invalid_input_is_terminal() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path();
        let log = dir.join("calls.log");
        let omp = script(
            dir,
            "omp",
            &format!("echo \"$1\" >> {}\nexit 2", log.display()),
        );
        let eng = engine(dir, noop(dir, "tess"), omp, noop(dir, "qpdf"));

        match eng
            .pdf_overlay(&dir.join("in.pdf"), &dir.join("out.pdf"), "eng", &mut NullSink)
            .await
        {
            ExtractionOutcome::Failed(f) => assert_eq!(f.kind, FailureKind::InvalidInput),
            other => panic!("unexpected outcome: {other:?}"),
        }
        // Exactly two attempts, never a third.
        let calls = std::fs::read_to_string(&log).unwrap();
        assert_eq!(calls.lines().count(), 2);
    }

    #[tokio::test]
    async fn encrypted_input_is_decrypted_and_retried() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path();
        let log = dir.join("calls.log");
        // Exit 8 for the original, succeed for the decrypted copy.
        let omp = script(
            dir,
            "omp",
            &format!(
                "echo \"$4\" >> {log}\ncase \"$4\" in *.decrypted.pdf) : > \"$5\"; exit 0;; *) exit 8;; esac",
                log = log.display()
            ),
        );
        let qpdf = script(dir, "qpdf", "cp \"$2\" \"$3\"");
        let eng = engine(dir, noop(dir, "tess"), omp, qpdf);

        let input = dir.join("secret.pdf");
        std::fs::write(&input, b"pdf").unwrap();
        std::fs::create_dir_all(dir.join("scratch")).unwrap();

        let output = dir.join("out.pdf");
        let out = eng.pdf_overlay(&input, &output, "eng", &mut NullSink).await;
        assert_eq!(out, ExtractionOutcome::Completed(output));

        let calls = std::fs::read_to_string(&log).unwrap();
        let lines: Vec<&str> = calls.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("secret.pdf"));
        assert!(lines[1].ends_with("secret.decrypted.pdf"));
    }

    #[tokio::test]
    async fn failed_decryption_surfaces_original_encrypted_failure() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path();
        let omp = script(dir, "omp", "echo 'password required' >&2; exit 8");
        let qpdf = script(dir, "qpdf", "exit 2");
        let eng = engine(dir, noop(dir, "tess"), omp, qpdf);
        std::fs::create_dir_all(dir.join("scratch")).unwrap();

        match eng
            .pdf_overlay(&dir.join("in.pdf"), &dir.join("out.pdf"), "eng", &mut NullSink)
            .await
        {
            ExtractionOutcome::Failed(f) => {
                assert_eq!(f.kind, FailureKind::EncryptedInput);
                assert!(f.detail.contains("exit code 8"));
                assert!(f.detail.contains("password required"));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn worker_termination_interrupts_regardless_of_fallback_state() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path();
        // First attempt asks for the skip-text fallback, which then dies.
        let omp = script(
            dir,
            "omp",
            "case \"$1\" in --redo-ocr) exit 2;; *) kill -9 $$;; esac",
        );
        let eng = engine(dir, noop(dir, "tess"), omp, noop(dir, "qpdf"));

        let out = eng
            .pdf_overlay(&dir.join("in.pdf"), &dir.join("out.pdf"), "eng", &mut NullSink)
            .await;
        assert!(out.is_interrupted());
    }

    #[tokio::test]
    async fn missing_tool_is_a_missing_dependency_failure() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path();
        let eng = OcrEngine::with_binaries(
            dir.join("no-such-tesseract"),
            dir.join("no-such-ocrmypdf"),
            dir.join("no-such-qpdf"),
            dir.join("scratch"),
        );

        match eng
            .image_to_text(&dir.join("scan.png"), "eng", &mut NullSink)
            .await
        {
            ExtractionOutcome::Failed(f) => assert_eq!(f.kind, FailureKind::MissingDependency),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }
}
