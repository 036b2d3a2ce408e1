use folio_core::DocumentId;
use serde::{Deserialize, Serialize};

use crate::pipeline::ExtractionError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The document already had text and `force` was not set.
    AlreadyExtracted,
    /// Another run stored text between selection and write-back.
    ConcurrentlyExtracted,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::AlreadyExtracted => write!(f, "already extracted"),
            SkipReason::ConcurrentlyExtracted => write!(f, "extracted concurrently by another run"),
        }
    }
}

/// Result of processing one document.
#[derive(Debug)]
pub enum ExtractionOutcome {
    Success { text: String, chars: usize },
    Skipped(SkipReason),
    Failed(ExtractionError),
}

impl ExtractionOutcome {
    pub fn success(text: String) -> Self {
        let chars = text.chars().count();
        ExtractionOutcome::Success { text, chars }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ExtractionOutcome::Success { .. })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DocumentFailure {
    pub document_id: DocumentId,
    pub error: String,
}

/// Tally of a backlog run.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExtractionSummary {
    /// Size of the backlog at selection time.
    pub selected: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub failures: Vec<DocumentFailure>,
}

impl ExtractionSummary {
    pub fn new(selected: usize) -> Self {
        Self { selected, ..Self::default() }
    }

    pub fn record(&mut self, document_id: DocumentId, outcome: &ExtractionOutcome) {
        match outcome {
            ExtractionOutcome::Success { .. } => self.succeeded += 1,
            ExtractionOutcome::Skipped(_) => self.skipped += 1,
            ExtractionOutcome::Failed(e) => {
                self.failed += 1;
                self.failures.push(DocumentFailure {
                    document_id,
                    error: e.to_string(),
                });
            }
        }
    }

    pub fn processed(&self) -> usize {
        self.succeeded + self.failed + self.skipped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_counts_characters_not_bytes() {
        match ExtractionOutcome::success("Clínica Añil".to_string()) {
            ExtractionOutcome::Success { chars, text } => {
                assert_eq!(chars, 12);
                assert!(text.len() > 12);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn summary_tallies_outcomes() {
        let mut summary = ExtractionSummary::new(3);
        let failed_id = DocumentId::new();
        summary.record(DocumentId::new(), &ExtractionOutcome::success("x".into()));
        summary.record(
            failed_id,
            &ExtractionOutcome::Failed(ExtractionError::NoDocumentAttached(failed_id)),
        );
        summary.record(
            DocumentId::new(),
            &ExtractionOutcome::Skipped(SkipReason::ConcurrentlyExtracted),
        );

        assert_eq!((summary.succeeded, summary.failed, summary.skipped), (1, 1, 1));
        assert_eq!(summary.processed(), 3);
        assert_eq!(summary.failures[0].document_id, failed_id);
        assert!(summary.failures[0].error.contains("no file attached"));
    }

    #[test]
    fn summary_serializes_for_reporting() {
        let summary = ExtractionSummary { selected: 2, succeeded: 2, ..Default::default() };
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["succeeded"], 2);
        assert_eq!(json["failures"], serde_json::json!([]));
    }

    #[test]
    fn skip_reason_display() {
        assert_eq!(SkipReason::AlreadyExtracted.to_string(), "already extracted");
    }
}
