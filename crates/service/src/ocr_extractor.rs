//! OCR as an extractor capability.
//!
//! Images go through direct OCR and feed the search index once per
//! configured language; PDFs get a searchable text layer written into the
//! scratch directory (promotion to permanent storage is the caller's
//! concern). Each invocation gets its own progress throttle; notes are
//! best-effort.

use crate::collaborators::{ProgressNotifier, SearchIndex};
use async_trait::async_trait;
use command_runner::ProgressThrottle;
use core_types::{BlobRef, ExtractionFailure, ExtractionOutcome, FailureKind, MediaType};
use extract_dispatch::{DispatchError, ExtractParams, Extractor};
use ocr_engine::OcrEngine;
use std::sync::Arc;
use std::time::Duration;

pub const OCR_EXTRACTOR_NAME: &str = "ocr";

pub struct OcrExtractor {
    engine: OcrEngine,
    index: Arc<dyn SearchIndex>,
    notifier: Arc<dyn ProgressNotifier>,
    index_timeout: Duration,
}

impl OcrExtractor {
    pub fn new(
        engine: OcrEngine,
        index: Arc<dyn SearchIndex>,
        notifier: Arc<dyn ProgressNotifier>,
        index_timeout: Duration,
    ) -> Self {
        Self {
            engine,
            index,
            notifier,
            index_timeout,
        }
    }

    fn throttle(&self, blob: &BlobRef) -> ProgressThrottle {
        let notifier = self.notifier.clone();
        let blob_id = blob.id.clone();
        ProgressThrottle::new(move |line: &str| {
            if let Err(err) = notifier.set_progress_note(&blob_id, OCR_EXTRACTOR_NAME, line) {
                tracing::warn!(blob = %blob_id, error = %err, "progress note dropped");
            }
        })
    }

    async fn extract_image(
        &self,
        blob: &BlobRef,
        params: &ExtractParams,
    ) -> ExtractionOutcome<Option<String>> {
        for language in &params.languages {
            let mut throttle = self.throttle(blob);
            match self
                .engine
                .image_to_text(&blob.path, language, &mut throttle)
                .await
            {
                ExtractionOutcome::Completed(text) => {
                    let call = self
                        .index
                        .add_document_ocr(&blob.id, text.as_deref(), language);
                    match tokio::time::timeout(self.index_timeout, call).await {
                        Ok(Ok(())) => {}
                        Ok(Err(err)) => {
                            return ExtractionOutcome::Failed(ExtractionFailure::new(
                                FailureKind::IndexRejected,
                                err.to_string(),
                            ));
                        }
                        Err(_) => {
                            return ExtractionOutcome::Failed(ExtractionFailure::new(
                                FailureKind::IndexTimeout,
                                format!(
                                    "index call for language {language} exceeded {}ms",
                                    self.index_timeout.as_millis()
                                ),
                            ));
                        }
                    }
                }
                ExtractionOutcome::Interrupted => return ExtractionOutcome::Interrupted,
                ExtractionOutcome::Failed(failure) => return ExtractionOutcome::Failed(failure),
            }
        }
        ExtractionOutcome::Completed(None)
    }

    async fn extract_pdf(
        &self,
        blob: &BlobRef,
        params: &ExtractParams,
    ) -> ExtractionOutcome<Option<String>> {
        let output = params
            .scratch_dir
            .join(format!("{}.ocr.pdf", blob.id));
        // The overlay tool takes one language argument; multiple languages
        // combine with '+'.
        let language = params.languages.join("+");
        let mut throttle = self.throttle(blob);
        self.engine
            .pdf_overlay(&blob.path, &output, &language, &mut throttle)
            .await
            .map(|path| Some(path.display().to_string()))
    }
}

#[async_trait]
impl Extractor for OcrExtractor {
    fn name(&self) -> &'static str {
        OCR_EXTRACTOR_NAME
    }

    fn accepts(&self, media_type: &MediaType) -> bool {
        media_type.is_image() || media_type.is_pdf()
    }

    fn indexes_content(&self) -> bool {
        true
    }

    fn priority(&self) -> i32 {
        0
    }

    /// OCR cost scales with input size; overlaying a PDF (render, OCR,
    /// rebuild) is markedly heavier than OCR of a single raster image.
    fn cost(&self, media_type: &MediaType, size: u64) -> u64 {
        if media_type.is_pdf() {
            size.saturating_mul(4)
        } else {
            size
        }
    }

    async fn extract(
        &self,
        blob: &BlobRef,
        params: &ExtractParams,
    ) -> Result<ExtractionOutcome<Option<String>>, DispatchError> {
        if params.languages.is_empty() {
            return Err(DispatchError::MissingParameter("ocr.languages"));
        }
        let outcome = if blob.media_type.is_image() {
            self.extract_image(blob, params).await
        } else {
            self.extract_pdf(blob, params).await
        };
        Ok(outcome)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::collaborators::{CollaboratorError, LogProgressNotifier};
    use core_types::BlobId;
    use parking_lot::Mutex;
    use std::os::unix::fs::PermissionsExt;
    use std::path::{Path, PathBuf};

    fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[derive(Default)]
    struct RecordingIndex {
        calls: Mutex<Vec<(String, Option<String>, String)>>,
    }

    #[async_trait]
    impl SearchIndex for RecordingIndex {
        async fn add_document_ocr(
            &self,
            blob: &BlobId,
            text: Option<&str>,
            language: &str,
        ) -> Result<(), CollaboratorError> {
            self.calls.lock().push((
                blob.as_str().to_string(),
                text.map(String::from),
                language.to_string(),
            ));
            Ok(())
        }
    }

    fn image_blob(dir: &Path) -> BlobRef {
        BlobRef {
            id: BlobId::new("imgblob"),
            path: dir.join("scan.png"),
            media_type: MediaType::new("image/png"),
            size: 2048,
        }
    }

    fn extractor_with(dir: &Path, tess_body: &str, index: Arc<RecordingIndex>) -> OcrExtractor {
        let tess = script(dir, "tess", tess_body);
        let noop = script(dir, "noop", "exit 0");
        let engine = OcrEngine::with_binaries(tess, noop.clone(), noop, dir.join("scratch"));
        OcrExtractor::new(
            engine,
            index,
            Arc::new(LogProgressNotifier),
            Duration::from_secs(5),
        )
    }

    #[tokio::test]
    async fn image_ocr_feeds_index_once_per_language() {
        let tmp = tempfile::tempdir().unwrap();
        let index = Arc::new(RecordingIndex::default());
        let ex = extractor_with(tmp.path(), "echo hello", index.clone());

        let params = ExtractParams {
            languages: vec!["eng".into(), "fra".into()],
            scratch_dir: tmp.path().join("scratch"),
        };
        let outcome = ex.extract(&image_blob(tmp.path()), &params).await.unwrap();
        assert_eq!(outcome, ExtractionOutcome::Completed(None));

        let calls = index.calls.lock();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0], ("imgblob".into(), Some("hello".into()), "eng".into()));
        assert_eq!(calls[1], ("imgblob".into(), Some("hello".into()), "fra".into()));
    }

    #[tokio::test]
    async fn blank_ocr_output_indexes_absent_text() {
        let tmp = tempfile::tempdir().unwrap();
        let index = Arc::new(RecordingIndex::default());
        let ex = extractor_with(tmp.path(), "printf ''", index.clone());

        let params = ExtractParams {
            languages: vec!["eng".into()],
            scratch_dir: tmp.path().join("scratch"),
        };
        let outcome = ex.extract(&image_blob(tmp.path()), &params).await.unwrap();
        assert_eq!(outcome, ExtractionOutcome::Completed(None));
        assert_eq!(index.calls.lock()[0].1, None);
    }

    #[tokio::test]
    async fn missing_language_config_aborts() {
        let tmp = tempfile::tempdir().unwrap();
        let index = Arc::new(RecordingIndex::default());
        let ex = extractor_with(tmp.path(), "echo hi", index);

        let params = ExtractParams {
            languages: Vec::new(),
            scratch_dir: tmp.path().join("scratch"),
        };
        let err = ex.extract(&image_blob(tmp.path()), &params).await.unwrap_err();
        assert!(matches!(err, DispatchError::MissingParameter("ocr.languages")));
    }

    #[tokio::test]
    async fn slow_index_call_times_out_as_distinct_failure() {
        struct StalledIndex;
        #[async_trait]
        impl SearchIndex for StalledIndex {
            async fn add_document_ocr(
                &self,
                _blob: &BlobId,
                _text: Option<&str>,
                _language: &str,
            ) -> Result<(), CollaboratorError> {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(())
            }
        }

        let tmp = tempfile::tempdir().unwrap();
        let tess = script(tmp.path(), "tess", "echo hello");
        let noop = script(tmp.path(), "noop", "exit 0");
        let engine = OcrEngine::with_binaries(tess, noop.clone(), noop, tmp.path().join("scratch"));
        let ex = OcrExtractor::new(
            engine,
            Arc::new(StalledIndex),
            Arc::new(LogProgressNotifier),
            Duration::from_millis(50),
        );

        let params = ExtractParams {
            languages: vec!["eng".into()],
            scratch_dir: tmp.path().join("scratch"),
        };
        match ex.extract(&image_blob(tmp.path()), &params).await.unwrap() {
            ExtractionOutcome::Failed(f) => assert_eq!(f.kind, FailureKind::IndexTimeout),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn pdf_overlay_success_reports_output_path() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path();
        let index = Arc::new(RecordingIndex::default());
        let tess = script(dir, "tess", "exit 0");
        let omp = script(dir, "omp", ": > \"$5\"; exit 0");
        let noop = script(dir, "noop", "exit 0");
        let engine = OcrEngine::with_binaries(tess, omp, noop, dir.join("scratch"));
        let ex = OcrExtractor::new(
            engine,
            index,
            Arc::new(LogProgressNotifier),
            Duration::from_secs(5),
        );

        let blob = BlobRef {
            id: BlobId::new("pdfblob"),
            path: dir.join("doc.pdf"),
            media_type: MediaType::new(MediaType::PDF),
            size: 4096,
        };
        let params = ExtractParams {
            languages: vec!["eng".into(), "deu".into()],
            scratch_dir: dir.join("scratch"),
        };
        std::fs::create_dir_all(dir.join("scratch")).unwrap();

        match ex.extract(&blob, &params).await.unwrap() {
            ExtractionOutcome::Completed(Some(detail)) => {
                assert!(detail.ends_with("pdfblob.ocr.pdf"));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }
}
