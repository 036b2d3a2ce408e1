use console::style;
use folio_core::{Document, DocumentId};
use folio_ocr::{ExtractionOutcome, ExtractionSummary, ProgressReporter, TracingReporter};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Per-document progress lines on stdout during backlog runs. Everything is
/// also forwarded to the tracing log.
#[derive(Debug, Default)]
pub struct ConsoleReporter {
    total: AtomicUsize,
    done: AtomicUsize,
    log: TracingReporter,
}

impl ConsoleReporter {
    pub fn new() -> Self {
        Self::default()
    }

    fn progress(&self) -> String {
        let done = self.done.fetch_add(1, Ordering::SeqCst) + 1;
        let total = self.total.load(Ordering::SeqCst);
        style(format!("[{done}/{total}]")).dim().to_string()
    }
}

impl ProgressReporter for ConsoleReporter {
    fn batch_started(&self, selected: usize) {
        self.total.store(selected, Ordering::SeqCst);
        self.done.store(0, Ordering::SeqCst);
        if selected == 0 {
            println!("{}", style("Nothing to extract.").dim());
        } else {
            println!("Extracting {} document(s)", style(selected).bold());
        }
        self.log.batch_started(selected);
    }

    fn document_started(&self, document: &Document) {
        self.log.document_started(document);
    }

    fn document_finished(&self, document_id: DocumentId, outcome: &ExtractionOutcome) {
        // Single-document runs print their own result.
        if self.total.load(Ordering::SeqCst) > 0 {
            let progress = self.progress();
            match outcome {
                ExtractionOutcome::Success { chars, .. } => {
                    println!("{progress} {} {document_id} ({chars} chars)", style("✓").green())
                }
                ExtractionOutcome::Skipped(reason) => {
                    println!("{progress} {} {document_id} skipped: {reason}", style("-").yellow())
                }
                ExtractionOutcome::Failed(error) => {
                    println!("{progress} {} {document_id} {error}", style("✗").red())
                }
            }
        }
        self.log.document_finished(document_id, outcome);
    }

    fn batch_finished(&self, summary: &ExtractionSummary) {
        self.log.batch_finished(summary);
    }
}
