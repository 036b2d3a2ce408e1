use chrono::NaiveDateTime;
use folio_core::{Document, DocumentFilter, DocumentId, SaveMode};
use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, QueryBuilder, Sqlite};
use std::path::Path;
use uuid::Uuid;

pub type DbPool = Pool<Sqlite>;

pub async fn create_db(path: &Path) -> Result<DbPool, sqlx::Error> {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await?;

    sqlx::query("PRAGMA journal_mode = WAL")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA synchronous = NORMAL")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA busy_timeout = 5000")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA cache_size = -32000")
        .execute(&pool)
        .await?;

    run_migrations(&pool).await?;

    Ok(pool)
}

async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            id TEXT PRIMARY KEY,
            storage_path TEXT NOT NULL DEFAULT '',
            extracted_text TEXT NOT NULL DEFAULT '',
            last_error TEXT,
            last_attempt_at TEXT,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_documents_backlog ON documents (storage_path, extracted_text)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// A row of the `documents` table, including extraction diagnostics.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentRecord {
    pub id: DocumentId,
    pub storage_path: String,
    pub extracted_text: String,
    pub last_error: Option<String>,
    pub last_attempt_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
}

impl From<DocumentRecord> for Document {
    fn from(r: DocumentRecord) -> Self {
        Document {
            id: r.id,
            storage_path: if r.storage_path.is_empty() { None } else { Some(r.storage_path) },
            extracted_text: r.extracted_text,
        }
    }
}

type DocumentRow = (
    String,
    String,
    String,
    Option<String>,
    Option<NaiveDateTime>,
    NaiveDateTime,
);

const DOCUMENT_COLUMNS: &str =
    "id, storage_path, extracted_text, last_error, last_attempt_at, created_at";

fn record_from_row(r: DocumentRow) -> Result<DocumentRecord, sqlx::Error> {
    let id = Uuid::parse_str(&r.0).map_err(|e| sqlx::Error::Decode(Box::new(e)))?;
    Ok(DocumentRecord {
        id: DocumentId(id),
        storage_path: r.1,
        extracted_text: r.2,
        last_error: r.3,
        last_attempt_at: r.4,
        created_at: r.5,
    })
}

/// Register a document. Used by intake tooling and tests; extraction itself
/// never creates records.
pub async fn insert_document(pool: &DbPool, doc: &Document) -> Result<(), sqlx::Error> {
    sqlx::query("INSERT INTO documents (id, storage_path, extracted_text) VALUES (?, ?, ?)")
        .bind(doc.id.to_string())
        .bind(doc.storage_path.as_deref().unwrap_or(""))
        .bind(&doc.extracted_text)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn get_document(
    pool: &DbPool,
    id: DocumentId,
) -> Result<Option<DocumentRecord>, sqlx::Error> {
    let row = sqlx::query_as::<_, DocumentRow>(&format!(
        "SELECT {DOCUMENT_COLUMNS} FROM documents WHERE id = ?"
    ))
    .bind(id.to_string())
    .fetch_optional(pool)
    .await?;

    row.map(record_from_row).transpose()
}

pub async fn list_documents(
    pool: &DbPool,
    filter: &DocumentFilter,
) -> Result<Vec<DocumentRecord>, sqlx::Error> {
    let mut query = QueryBuilder::<Sqlite>::new(format!(
        "SELECT {DOCUMENT_COLUMNS} FROM documents WHERE 1 = 1"
    ));
    if filter.attached_only {
        query.push(" AND storage_path != ''");
    }
    if filter.pending_only {
        query.push(" AND extracted_text = ''");
    }
    query.push(" ORDER BY created_at, rowid");

    let rows = query
        .build_query_as::<DocumentRow>()
        .fetch_all(pool)
        .await?;

    rows.into_iter().map(record_from_row).collect()
}

/// Conditional write-back of extracted text. The mode check and the write are
/// one statement, so a concurrent run cannot slip in between.
pub async fn save_extracted_text(
    pool: &DbPool,
    id: DocumentId,
    text: &str,
    mode: SaveMode,
) -> Result<bool, sqlx::Error> {
    let sql = match mode {
        SaveMode::IfEmpty => {
            "UPDATE documents SET extracted_text = ?, last_error = NULL, last_attempt_at = datetime('now'), updated_at = datetime('now') WHERE id = ? AND extracted_text = ''"
        }
        SaveMode::Overwrite => {
            "UPDATE documents SET extracted_text = ?, last_error = NULL, last_attempt_at = datetime('now'), updated_at = datetime('now') WHERE id = ?"
        }
    };

    let result = sqlx::query(sql)
        .bind(text)
        .bind(id.to_string())
        .execute(pool)
        .await?;

    Ok(result.rows_affected() == 1)
}

pub async fn record_extraction_failure(
    pool: &DbPool,
    id: DocumentId,
    message: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE documents SET last_error = ?, last_attempt_at = datetime('now'), updated_at = datetime('now') WHERE id = ?",
    )
    .bind(message)
    .bind(id.to_string())
    .execute(pool)
    .await?;
    Ok(())
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BacklogStats {
    /// Documents with a file attached.
    pub attached: i64,
    pub extracted: i64,
    pub pending: i64,
    /// Pending documents whose last attempt failed.
    pub failed: i64,
}

pub async fn backlog_stats(pool: &DbPool) -> Result<BacklogStats, sqlx::Error> {
    let row = sqlx::query_as::<_, (i64, i64, i64, i64)>(
        r#"
        SELECT
            COUNT(*),
            COALESCE(SUM(CASE WHEN extracted_text != '' THEN 1 ELSE 0 END), 0),
            COALESCE(SUM(CASE WHEN extracted_text = '' THEN 1 ELSE 0 END), 0),
            COALESCE(SUM(CASE WHEN extracted_text = '' AND last_error IS NOT NULL THEN 1 ELSE 0 END), 0)
        FROM documents
        WHERE storage_path != ''
        "#,
    )
    .fetch_one(pool)
    .await?;

    Ok(BacklogStats {
        attached: row.0,
        extracted: row.1,
        pending: row.2,
        failed: row.3,
    })
}

/// Pending documents whose most recent attempt failed, newest first.
pub async fn get_recent_failures(
    pool: &DbPool,
    limit: i64,
) -> Result<Vec<DocumentRecord>, sqlx::Error> {
    let rows = sqlx::query_as::<_, DocumentRow>(&format!(
        "SELECT {DOCUMENT_COLUMNS} FROM documents WHERE extracted_text = '' AND last_error IS NOT NULL ORDER BY last_attempt_at DESC, rowid DESC LIMIT ?"
    ))
    .bind(limit)
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(record_from_row).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_db() -> (tempfile::TempDir, DbPool) {
        let dir = tempfile::tempdir().unwrap();
        let pool = create_db(&dir.path().join("folio.db")).await.unwrap();
        (dir, pool)
    }

    #[tokio::test]
    async fn migrations_are_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("folio.db");
        let pool = create_db(&path).await.unwrap();
        let doc = Document::new("invoices/a.png");
        insert_document(&pool, &doc).await.unwrap();
        pool.close().await;

        let pool = create_db(&path).await.unwrap();
        assert!(get_document(&pool, doc.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn insert_and_get_roundtrip() {
        let (_dir, pool) = test_db().await;
        let doc = Document::new("invoices/2024/scan.jpg").with_text("ACME VET");
        insert_document(&pool, &doc).await.unwrap();

        let record = get_document(&pool, doc.id).await.unwrap().unwrap();
        assert_eq!(record.storage_path, "invoices/2024/scan.jpg");
        assert!(record.last_error.is_none());
        assert_eq!(Document::from(record), doc);

        assert!(get_document(&pool, DocumentId::new()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn detached_document_maps_to_no_path() {
        let (_dir, pool) = test_db().await;
        let doc = Document::without_file();
        insert_document(&pool, &doc).await.unwrap();
        let back: Document = get_document(&pool, doc.id).await.unwrap().unwrap().into();
        assert_eq!(back.storage_path, None);
    }

    #[tokio::test]
    async fn list_applies_backlog_filter() {
        let (_dir, pool) = test_db().await;
        let pending = Document::new("a.png");
        let done = Document::new("b.png").with_text("done");
        insert_document(&pool, &pending).await.unwrap();
        insert_document(&pool, &done).await.unwrap();
        insert_document(&pool, &Document::without_file()).await.unwrap();

        let backlog = list_documents(&pool, &DocumentFilter::backlog(false)).await.unwrap();
        assert_eq!(backlog.len(), 1);
        assert_eq!(backlog[0].id, pending.id);

        let forced = list_documents(&pool, &DocumentFilter::backlog(true)).await.unwrap();
        assert_eq!(forced.len(), 2);

        let everything = list_documents(&pool, &DocumentFilter::default()).await.unwrap();
        assert_eq!(everything.len(), 3);
    }

    #[tokio::test]
    async fn save_if_empty_is_conditional() {
        let (_dir, pool) = test_db().await;
        let doc = Document::new("a.png");
        insert_document(&pool, &doc).await.unwrap();

        assert!(save_extracted_text(&pool, doc.id, "first", SaveMode::IfEmpty).await.unwrap());
        assert!(!save_extracted_text(&pool, doc.id, "second", SaveMode::IfEmpty).await.unwrap());
        let record = get_document(&pool, doc.id).await.unwrap().unwrap();
        assert_eq!(record.extracted_text, "first");
        assert!(record.last_attempt_at.is_some());

        assert!(save_extracted_text(&pool, doc.id, "third", SaveMode::Overwrite).await.unwrap());
        let record = get_document(&pool, doc.id).await.unwrap().unwrap();
        assert_eq!(record.extracted_text, "third");
    }

    #[tokio::test]
    async fn failures_are_diagnostic_only() {
        let (_dir, pool) = test_db().await;
        let doc = Document::new("a.png");
        insert_document(&pool, &doc).await.unwrap();

        record_extraction_failure(&pool, doc.id, "Object not found: a.png").await.unwrap();

        // Still part of the backlog.
        let backlog = list_documents(&pool, &DocumentFilter::backlog(false)).await.unwrap();
        assert_eq!(backlog.len(), 1);
        assert_eq!(backlog[0].last_error.as_deref(), Some("Object not found: a.png"));

        let stats = backlog_stats(&pool).await.unwrap();
        assert_eq!(stats, BacklogStats { attached: 1, extracted: 0, pending: 1, failed: 1 });
        assert_eq!(get_recent_failures(&pool, 10).await.unwrap().len(), 1);

        // A later success clears the error.
        save_extracted_text(&pool, doc.id, "text", SaveMode::IfEmpty).await.unwrap();
        let stats = backlog_stats(&pool).await.unwrap();
        assert_eq!(stats, BacklogStats { attached: 1, extracted: 1, pending: 0, failed: 0 });
        assert!(get_recent_failures(&pool, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn stats_on_empty_database() {
        let (_dir, pool) = test_db().await;
        assert_eq!(backlog_stats(&pool).await.unwrap(), BacklogStats::default());
    }
}
