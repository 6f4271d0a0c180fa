//! Ties the pieces together: one entry point per observed blob.
//!
//! Workers are stateless; coordination happens only through the event log.
//! A dispatch is safe to run more than once for the same blob: an interrupt
//! guarantees at-least-once retry, and every event append preserves history.

use core_types::{BlobRef, IngestId};
use event_log::EventRecorder;
use extract_dispatch::{dispatch, DispatchError, DispatchReport, ExtractParams, ExtractorRegistry};
use std::sync::Arc;

pub struct ExtractionPipeline {
    registry: ExtractorRegistry,
    recorder: Arc<EventRecorder>,
    params: ExtractParams,
}

impl ExtractionPipeline {
    pub fn new(
        registry: ExtractorRegistry,
        recorder: Arc<EventRecorder>,
        params: ExtractParams,
    ) -> Self {
        Self {
            registry,
            recorder,
            params,
        }
    }

    /// Record the blob observation and run every capable extractor.
    pub async fn ingest(
        &self,
        blob: &BlobRef,
        ingest: &IngestId,
    ) -> Result<DispatchReport, DispatchError> {
        self.recorder.record_blob_seen(blob, ingest)?;
        dispatch(
            &self.registry,
            self.recorder.as_ref(),
            blob,
            ingest,
            &self.params,
        )
        .await
    }
}
