use anyhow::{Context, Result};
use console::style;
use folio_core::ExtractionRequest;
use folio_objects::{Accessor, Materializer};
use folio_ocr::{
    ExtractionOutcome, ExtractionPipeline, OcrBackend, PipelineOptions, RunReport,
    TesseractCommand,
};
use folio_storage::{DbPool, SqliteRegistry};
use serde::Serialize;
use std::sync::Arc;

use crate::config::{Config, OcrEngine, StorageBackend};
use crate::reporter::ConsoleReporter;

const RECENT_FAILURES: i64 = 10;

pub async fn open_database(config: &Config) -> Result<DbPool> {
    let path = &config.database.path;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }
    folio_storage::create_db(path)
        .await
        .with_context(|| format!("Failed to open database {}", path.display()))
}

pub fn build_accessor(config: &Config) -> Result<Accessor> {
    let storage = &config.storage;
    match storage.backend {
        StorageBackend::Local => Ok(Accessor::local(&storage.root)),
        StorageBackend::Http => {
            let base_url = storage
                .base_url
                .as_deref()
                .context("storage.base_url is required for the http storage backend")?;
            Accessor::http(base_url, storage.token.clone()).context("Invalid HTTP storage settings")
        }
    }
}

pub fn build_recognizer(config: &Config) -> Arc<dyn OcrBackend> {
    let ocr = &config.ocr;
    match ocr.engine {
        OcrEngine::Command => Arc::new(
            TesseractCommand::new(&ocr.binary, ocr.tessdata_path.clone())
                .with_timeout(config.ocr_timeout()),
        ),
        #[cfg(feature = "tesseract")]
        OcrEngine::Library => Arc::new(folio_ocr::TesseractRecognizer::new(
            ocr.tessdata_path.as_ref().map(|p| p.display().to_string()),
        )),
        #[cfg(not(feature = "tesseract"))]
        OcrEngine::Library => {
            tracing::warn!("built without the `tesseract` feature; every document will fail");
            Arc::new(folio_ocr::UnavailableRecognizer)
        }
    }
}

pub fn build_pipeline(config: &Config, pool: DbPool) -> Result<ExtractionPipeline<SqliteRegistry>> {
    let accessor = build_accessor(config)?;
    let recognizer = build_recognizer(config);
    tracing::debug!(
        backend = %accessor.kind(),
        engine = recognizer.name(),
        concurrency = config.extraction.concurrency,
        "extraction pipeline ready"
    );

    let materializer = match &config.storage.temp_dir {
        Some(dir) => Materializer::in_dir(dir),
        None => Materializer::new(),
    };

    Ok(ExtractionPipeline::new(SqliteRegistry::new(pool), accessor, recognizer)
        .with_materializer(materializer)
        .with_reporter(ConsoleReporter::new())
        .with_options(PipelineOptions {
            concurrency: config.extraction.concurrency,
            ocr_timeout: config.ocr_timeout(),
        }))
}

/// `folio extract`. Errors are fatal only in single-document mode.
pub async fn extract(config: &Config, request: ExtractionRequest) -> Result<()> {
    let pool = open_database(config).await?;
    let pipeline = build_pipeline(config, pool)?;

    let report = pipeline
        .run(&request)
        .await
        .context("Extraction could not run")?;

    match report {
        RunReport::Single { document_id: id, outcome } => match outcome {
            ExtractionOutcome::Success { chars, .. } => {
                println!(
                    "{} Extracted {chars} characters from document {id}",
                    style("✓").green()
                );
            }
            ExtractionOutcome::Skipped(reason) => {
                println!(
                    "{} Document {id} skipped ({reason}). Use --force to extract again.",
                    style("warning:").yellow().bold()
                );
            }
            ExtractionOutcome::Failed(error) => {
                return Err(error).with_context(|| format!("Extraction failed for document {id}"));
            }
        },
        RunReport::Batch(summary) => {
            println!(
                "Completed: {} succeeded, {} failed",
                style(summary.succeeded).green(),
                style(summary.failed).red()
            );
        }
    }

    Ok(())
}

#[derive(Debug, Serialize)]
struct StatusReport {
    #[serde(flatten)]
    stats: folio_storage::BacklogStats,
    recent_failures: Vec<FailureEntry>,
}

#[derive(Debug, Serialize)]
struct FailureEntry {
    id: String,
    path: String,
    error: String,
    attempted_at: Option<String>,
}

/// `folio status`.
pub async fn status(config: &Config, json: bool) -> Result<()> {
    let pool = open_database(config).await?;
    let stats = folio_storage::backlog_stats(&pool)
        .await
        .context("Failed to read backlog counts")?;
    let failures = folio_storage::get_recent_failures(&pool, RECENT_FAILURES)
        .await
        .context("Failed to read recent failures")?;

    let report = StatusReport {
        stats,
        recent_failures: failures
            .into_iter()
            .map(|r| FailureEntry {
                id: r.id.to_string(),
                path: r.storage_path,
                error: r.last_error.unwrap_or_default(),
                attempted_at: r.last_attempt_at.map(|t| t.to_string()),
            })
            .collect(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("{:<10} {}", "Attached", style(report.stats.attached).bold());
    println!("{:<10} {}", "Extracted", style(report.stats.extracted).green());
    println!("{:<10} {}", "Pending", style(report.stats.pending).yellow());
    println!("{:<10} {}", "Failed", style(report.stats.failed).red());

    if !report.recent_failures.is_empty() {
        println!();
        println!("{}", style("Recent failures:").bold());
        for f in &report.recent_failures {
            println!("  {}  {}  {}", style(&f.id).dim(), f.path, f.error);
        }
    }

    Ok(())
}
