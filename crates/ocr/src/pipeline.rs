use folio_core::{
    Document, DocumentFilter, DocumentId, DocumentRegistry, ExtractionRequest,
    RecognitionProfile, RegistryError, SaveMode, Selection,
};
use folio_objects::{Accessor, Materializer, StorageError};
use futures::stream::{self, StreamExt};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::Instrument;

use crate::preprocess::{self, PreprocessError};
use crate::recognizer::{OcrBackend, OcrError, RecognitionFailure};
use crate::reporter::{ProgressReporter, TracingReporter};
use crate::types::{ExtractionOutcome, ExtractionSummary, SkipReason};

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("Document {0} does not exist")]
    NotFound(DocumentId),
    #[error("Document {0} has no file attached")]
    NoDocumentAttached(DocumentId),
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("Image preprocessing failed: {0}")]
    Preprocess(#[from] PreprocessError),
    #[error(transparent)]
    Recognition(#[from] RecognitionFailure),
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

impl ExtractionError {
    /// Missing document record or missing storage object.
    pub fn is_not_found(&self) -> bool {
        match self {
            ExtractionError::NotFound(_) => true,
            ExtractionError::Storage(e) => e.is_not_found(),
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineOptions {
    /// Documents processed at once during a backlog run.
    pub concurrency: usize,
    /// Upper bound for decoding plus recognition of one document.
    pub ocr_timeout: Option<Duration>,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self { concurrency: 1, ocr_timeout: None }
    }
}

#[derive(Debug)]
pub enum RunReport {
    Single {
        document_id: DocumentId,
        outcome: ExtractionOutcome,
    },
    Batch(ExtractionSummary),
}

/// Orchestrates: select → stage (in place or materialized) → normalize → OCR
/// → write-back, one document at a time or over the whole backlog.
pub struct ExtractionPipeline<G> {
    registry: G,
    accessor: Accessor,
    recognizer: Arc<dyn OcrBackend>,
    materializer: Materializer,
    reporter: Arc<dyn ProgressReporter>,
    options: PipelineOptions,
}

impl<G: DocumentRegistry> ExtractionPipeline<G> {
    pub fn new<R: OcrBackend + 'static>(registry: G, accessor: Accessor, recognizer: R) -> Self {
        Self {
            registry,
            accessor,
            recognizer: Arc::new(recognizer),
            materializer: Materializer::new(),
            reporter: Arc::new(TracingReporter),
            options: PipelineOptions::default(),
        }
    }

    pub fn with_materializer(mut self, materializer: Materializer) -> Self {
        self.materializer = materializer;
        self
    }

    pub fn with_reporter<P: ProgressReporter + 'static>(mut self, reporter: P) -> Self {
        self.reporter = Arc::new(reporter);
        self
    }

    pub fn with_options(mut self, options: PipelineOptions) -> Self {
        self.options = options;
        self
    }

    pub fn registry(&self) -> &G {
        &self.registry
    }

    pub async fn run(&self, request: &ExtractionRequest) -> Result<RunReport, ExtractionError> {
        match request.selection {
            Selection::One(id) => self
                .extract_one(id, &request.profile, request.force)
                .await
                .map(|outcome| RunReport::Single { document_id: id, outcome }),
            Selection::All => self
                .extract_all(&request.profile, request.force)
                .await
                .map(RunReport::Batch),
        }
    }

    /// Extract a single document.
    ///
    /// A missing record or a record without a file is an error; pipeline
    /// failures after that come back as [`ExtractionOutcome::Failed`].
    pub async fn extract_one(
        &self,
        id: DocumentId,
        profile: &RecognitionProfile,
        force: bool,
    ) -> Result<ExtractionOutcome, ExtractionError> {
        let document = self
            .registry
            .find_by_id(id)
            .await?
            .ok_or(ExtractionError::NotFound(id))?;

        let Some(path) = document.file_path() else {
            return Err(ExtractionError::NoDocumentAttached(id));
        };

        if document.has_text() && !force {
            let outcome = ExtractionOutcome::Skipped(SkipReason::AlreadyExtracted);
            self.reporter.document_finished(id, &outcome);
            return Ok(outcome);
        }

        let span = tracing::info_span!("extract", document_id = %id, path, %profile);
        Ok(self
            .process(&document, path, profile, force)
            .instrument(span)
            .await)
    }

    /// Extract every document in the backlog. Per-document errors are counted
    /// and the run always goes on to the end.
    pub async fn extract_all(
        &self,
        profile: &RecognitionProfile,
        force: bool,
    ) -> Result<ExtractionSummary, ExtractionError> {
        let backlog = self
            .registry
            .find_many(&DocumentFilter::backlog(force))
            .await?;

        self.reporter.batch_started(backlog.len());
        let mut summary = ExtractionSummary::new(backlog.len());

        let results = stream::iter(backlog.iter().map(|doc| doc.id))
            .map(|id| async move { (id, self.extract_backlog_item(id, profile, force).await) })
            .buffer_unordered(self.options.concurrency.max(1));
        futures::pin_mut!(results);

        while let Some((id, outcome)) = results.next().await {
            summary.record(id, &outcome);
        }

        self.reporter.batch_finished(&summary);
        Ok(summary)
    }

    async fn extract_backlog_item(
        &self,
        id: DocumentId,
        profile: &RecognitionProfile,
        force: bool,
    ) -> ExtractionOutcome {
        match self.extract_one(id, profile, force).await {
            Ok(outcome) => outcome,
            Err(error) => {
                let outcome = ExtractionOutcome::Failed(error);
                self.reporter.document_finished(id, &outcome);
                outcome
            }
        }
    }

    async fn process(
        &self,
        document: &Document,
        path: &str,
        profile: &RecognitionProfile,
        force: bool,
    ) -> ExtractionOutcome {
        self.reporter.document_started(document);

        let outcome = match self.recognize_document(path, profile).await {
            Ok(raw) => self.persist(document.id, raw.trim(), force).await,
            Err(error) => ExtractionOutcome::Failed(error),
        };

        if let ExtractionOutcome::Failed(error) = &outcome {
            if let Err(e) = self
                .registry
                .record_failure(document.id, &error.to_string())
                .await
            {
                tracing::warn!(error = %e, "could not record extraction failure");
            }
        }

        self.reporter.document_finished(document.id, &outcome);
        outcome
    }

    async fn persist(&self, id: DocumentId, text: &str, force: bool) -> ExtractionOutcome {
        match self.registry.save_text(id, text, SaveMode::for_force(force)).await {
            Ok(true) => ExtractionOutcome::success(text.to_string()),
            // Overwrite only misses when the record disappeared mid-run.
            Ok(false) if force => ExtractionOutcome::Failed(ExtractionError::NotFound(id)),
            Ok(false) => ExtractionOutcome::Skipped(SkipReason::ConcurrentlyExtracted),
            Err(e) => ExtractionOutcome::Failed(e.into()),
        }
    }

    /// Stage the document, recognize it, and drop any temporary copy before
    /// returning, whatever the result.
    async fn recognize_document(
        &self,
        path: &str,
        profile: &RecognitionProfile,
    ) -> Result<String, ExtractionError> {
        let staged = self.materializer.stage(&self.accessor, path).await?;
        let result = self.recognize_file(staged.path().to_path_buf(), profile).await;
        staged.release();
        result
    }

    async fn recognize_file(
        &self,
        path: PathBuf,
        profile: &RecognitionProfile,
    ) -> Result<String, ExtractionError> {
        let recognizer = Arc::clone(&self.recognizer);
        let task_profile = profile.clone();
        let task = tokio::task::spawn_blocking(move || -> Result<String, ExtractionError> {
            let image = preprocess::prepare_for_ocr(&path)?;
            recognizer
                .recognize(&image, &task_profile)
                .map_err(|source| RecognitionFailure::new(&task_profile, source).into())
        });

        // On timeout the blocking task is detached, not cancelled, and the caller
        // releases the staged copy right away. Backends that spawn processes
        // must enforce their own deadline (see `TesseractCommand::with_timeout`).
        let joined = match self.options.ocr_timeout {
            Some(limit) => tokio::time::timeout(limit, task)
                .await
                .map_err(|_| RecognitionFailure::new(profile, OcrError::Timeout(limit)))?,
            None => task.await,
        };

        joined.map_err(|e| RecognitionFailure::new(profile, OcrError::Aborted(e.to_string())))?
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
