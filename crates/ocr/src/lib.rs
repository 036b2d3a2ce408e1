pub mod pipeline;
pub mod preprocess;
pub mod recognizer;
pub mod reporter;
pub mod types;

pub use pipeline::{ExtractionError, ExtractionPipeline, PipelineOptions, RunReport};
pub use preprocess::{prepare_for_ocr, PreprocessError};
pub use recognizer::{
    MockRecognizer, OcrBackend, OcrError, RecognitionFailure, TesseractCommand,
    UnavailableRecognizer,
};
#[cfg(feature = "tesseract")]
pub use recognizer::tesseract_backend::TesseractRecognizer;
pub use reporter::{ProgressReporter, SilentReporter, TracingReporter};
pub use types::{DocumentFailure, ExtractionOutcome, ExtractionSummary, SkipReason};
