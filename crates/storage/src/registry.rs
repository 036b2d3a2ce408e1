use async_trait::async_trait;
use folio_core::{Document, DocumentFilter, DocumentId, DocumentRegistry, RegistryError, SaveMode};

use crate::db::{self, DbPool};

/// [`DocumentRegistry`] backed by the SQLite `documents` table.
#[derive(Clone)]
pub struct SqliteRegistry {
    pool: DbPool,
}

impl SqliteRegistry {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

#[async_trait]
impl DocumentRegistry for SqliteRegistry {
    async fn find_by_id(&self, id: DocumentId) -> Result<Option<Document>, RegistryError> {
        let record = db::get_document(&self.pool, id)
            .await
            .map_err(RegistryError::backend)?;
        Ok(record.map(Document::from))
    }

    async fn find_many(&self, filter: &DocumentFilter) -> Result<Vec<Document>, RegistryError> {
        let records = db::list_documents(&self.pool, filter)
            .await
            .map_err(RegistryError::backend)?;
        Ok(records.into_iter().map(Document::from).collect())
    }

    async fn save_text(
        &self,
        id: DocumentId,
        text: &str,
        mode: SaveMode,
    ) -> Result<bool, RegistryError> {
        db::save_extracted_text(&self.pool, id, text, mode)
            .await
            .map_err(RegistryError::backend)
    }

    async fn record_failure(&self, id: DocumentId, message: &str) -> Result<(), RegistryError> {
        tracing::debug!(document_id = %id, "recording extraction failure");
        db::record_extraction_failure(&self.pool, id, message)
            .await
            .map_err(RegistryError::backend)
    }
}
