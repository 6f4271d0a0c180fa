//! Typed append API over the event store.
//!
//! Centralizes event construction so every writer stamps the same shape of
//! row; implements the dispatcher's event sink.

use crate::model::{now_ms, details, BlobMetadataRow, EventKind, EventStatus, IngestionEvent};
use crate::store::EventStore;
use async_trait::async_trait;
use core_types::{BlobRef, ExtractionFailure, IngestId, StoreError};
use extract_dispatch::ExtractionEventSink;
use serde_json::json;
use std::sync::Arc;

pub struct EventRecorder {
    store: Arc<EventStore>,
    workspace: String,
}

impl EventRecorder {
    pub fn new(store: Arc<EventStore>, workspace: impl Into<String>) -> Self {
        Self {
            store,
            workspace: workspace.into(),
        }
    }

    /// Record that a blob was observed at a path within an ingest batch.
    /// One row per observation; re-ingesting the same bytes under a new path
    /// appends rather than overwrites.
    pub fn record_blob_seen(&self, blob: &BlobRef, ingest: &IngestId) -> Result<(), StoreError> {
        self.store.append_metadata(&BlobMetadataRow {
            ingest_id: ingest.clone(),
            blob_id: blob.id.clone(),
            file_size: blob.size,
            path: blob.path.to_string_lossy().into_owned(),
            insert_time: now_ms(),
        })
    }

    fn append(
        &self,
        blob: &BlobRef,
        ingest: &IngestId,
        kind: EventKind,
        status: EventStatus,
        detail_payload: serde_json::Value,
    ) -> Result<(), StoreError> {
        self.store.append_event(&IngestionEvent {
            blob_id: blob.id.clone(),
            ingest_id: ingest.clone(),
            kind,
            status,
            details: detail_payload,
            event_time: now_ms(),
        })
    }
}

#[async_trait]
impl ExtractionEventSink for EventRecorder {
    async fn media_type_detected(
        &self,
        blob: &BlobRef,
        ingest: &IngestId,
        extractors: &[String],
    ) -> Result<(), StoreError> {
        self.append(
            blob,
            ingest,
            EventKind::MediaDetected,
            EventStatus::Success,
            json!({
                (details::MEDIA_TYPE): blob.media_type,
                (details::EXTRACTORS): extractors,
                (details::WORKSPACE): self.workspace,
            }),
        )
    }

    async fn extractor_started(
        &self,
        blob: &BlobRef,
        ingest: &IngestId,
        extractor: &str,
    ) -> Result<(), StoreError> {
        self.append(
            blob,
            ingest,
            EventKind::ExtractorRun,
            EventStatus::Started,
            json!({ (details::EXTRACTOR): extractor }),
        )
    }

    async fn extractor_succeeded(
        &self,
        blob: &BlobRef,
        ingest: &IngestId,
        extractor: &str,
        detail: Option<&str>,
    ) -> Result<(), StoreError> {
        let mut payload = json!({ (details::EXTRACTOR): extractor });
        if let Some(output) = detail {
            payload[details::OUTPUT] = json!(output);
        }
        self.append(blob, ingest, EventKind::ExtractorRun, EventStatus::Success, payload)
    }

    async fn extractor_failed(
        &self,
        blob: &BlobRef,
        ingest: &IngestId,
        extractor: &str,
        failure: &ExtractionFailure,
    ) -> Result<(), StoreError> {
        self.append(
            blob,
            ingest,
            EventKind::ExtractorRun,
            EventStatus::Failure,
            json!({
                (details::EXTRACTOR): extractor,
                (details::ERROR): failure.detail,
                (details::ERROR_KIND): failure.kind,
            }),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::IngestQuery;
    use core_types::{BlobId, FailureKind, MediaType};

    fn blob() -> BlobRef {
        BlobRef {
            id: BlobId::new("b1"),
            path: "/data/scan.pdf".into(),
            media_type: MediaType::new("application/pdf"),
            size: 1234,
        }
    }

    #[tokio::test]
    async fn records_full_run_shape() {
        let store = Arc::new(EventStore::in_memory().unwrap());
        let recorder = EventRecorder::new(store.clone(), "newsroom");
        let ingest = IngestId::new("batch-1");
        let blob = blob();

        recorder.record_blob_seen(&blob, &ingest).unwrap();
        recorder
            .media_type_detected(&blob, &ingest, &["ocr".into()])
            .await
            .unwrap();
        recorder.extractor_started(&blob, &ingest, "ocr").await.unwrap();
        recorder
            .extractor_failed(
                &blob,
                &ingest,
                "ocr",
                &ExtractionFailure::new(FailureKind::EncryptedInput, "exit code 8"),
            )
            .await
            .unwrap();

        let events = store
            .events_matching(&IngestQuery::Exact(ingest.clone()))
            .unwrap();
        assert_eq!(events.len(), 3);

        assert_eq!(events[0].kind, EventKind::MediaDetected);
        assert_eq!(events[0].details[details::WORKSPACE], "newsroom");
        assert_eq!(events[0].details[details::EXTRACTORS][0], "ocr");

        assert_eq!(events[1].status, EventStatus::Started);
        assert_eq!(events[1].extractor(), Some("ocr"));

        assert_eq!(events[2].status, EventStatus::Failure);
        assert_eq!(events[2].details[details::ERROR], "exit code 8");

        let metadata = store.metadata_matching(&IngestQuery::Exact(ingest)).unwrap();
        assert_eq!(metadata.len(), 1);
        assert_eq!(metadata[0].path, "/data/scan.pdf");
        assert_eq!(metadata[0].file_size, 1234);
    }

    #[tokio::test]
    async fn success_detail_lands_in_output_field() {
        let store = Arc::new(EventStore::in_memory().unwrap());
        let recorder = EventRecorder::new(store.clone(), "ws");
        let ingest = IngestId::new("batch-2");
        let blob = blob();

        recorder
            .extractor_succeeded(&blob, &ingest, "ocr", Some("/scratch/b1.ocr.pdf"))
            .await
            .unwrap();

        let events = store.events_matching(&IngestQuery::Exact(ingest)).unwrap();
        assert_eq!(events[0].details[details::OUTPUT], "/scratch/b1.ocr.pdf");
    }
}
