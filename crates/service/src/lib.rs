//! Service support library: tracing bootstrap, collaborator seams, the OCR
//! extractor, and the extraction pipeline + status query wiring.

pub mod collaborators;
mod logging;
pub mod ocr_extractor;
pub mod pipeline;
pub mod status;

pub use collaborators::{
    CollaboratorError, LogProgressNotifier, NoopSearchIndex, ProgressNotifier, SearchIndex,
};
pub use logging::{init_tracing, init_tracing_with_filter};
pub use ocr_extractor::{OcrExtractor, OCR_EXTRACTOR_NAME};
pub use pipeline::ExtractionPipeline;
pub use status::file_statuses;
