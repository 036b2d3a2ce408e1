use folio_core::{Document, DocumentId};

use crate::types::{ExtractionOutcome, ExtractionSummary};

/// Receives progress from the extraction pipeline.
///
/// The pipeline never writes to a global logger or stdout on its own behalf;
/// whoever builds it decides where progress goes.
pub trait ProgressReporter: Send + Sync {
    fn batch_started(&self, _selected: usize) {}

    fn document_started(&self, _document: &Document) {}

    fn document_finished(&self, _document_id: DocumentId, _outcome: &ExtractionOutcome) {}

    fn batch_finished(&self, _summary: &ExtractionSummary) {}
}

/// Reports through `tracing` events.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl ProgressReporter for TracingReporter {
    fn batch_started(&self, selected: usize) {
        tracing::info!(selected, "processing extraction backlog");
    }

    fn document_started(&self, document: &Document) {
        tracing::info!(
            document_id = %document.id,
            path = document.file_path().unwrap_or_default(),
            "processing document"
        );
    }

    fn document_finished(&self, document_id: DocumentId, outcome: &ExtractionOutcome) {
        match outcome {
            ExtractionOutcome::Success { chars, .. } => {
                tracing::info!(document_id = %document_id, chars, "extracted text")
            }
            ExtractionOutcome::Skipped(reason) => {
                tracing::warn!(document_id = %document_id, %reason, "skipped document")
            }
            ExtractionOutcome::Failed(error) => {
                tracing::error!(document_id = %document_id, error = %error, "extraction failed")
            }
        }
    }

    fn batch_finished(&self, summary: &ExtractionSummary) {
        tracing::info!(
            succeeded = summary.succeeded,
            failed = summary.failed,
            skipped = summary.skipped,
            "extraction backlog completed"
        );
    }
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentReporter;

impl ProgressReporter for SilentReporter {}
