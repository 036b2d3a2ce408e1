use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::document::{Document, DocumentFilter, DocumentId};

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Document registry error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl RegistryError {
    pub fn backend(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        RegistryError::Backend(err.into())
    }
}

/// How a text write-back treats text that is already present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveMode {
    /// Write only while the stored text is still empty.
    IfEmpty,
    Overwrite,
}

impl SaveMode {
    pub fn for_force(force: bool) -> Self {
        if force {
            SaveMode::Overwrite
        } else {
            SaveMode::IfEmpty
        }
    }
}

/// The external store that owns document records.
///
/// Extraction never creates or deletes documents; it reads them and writes the
/// text field back. `save_text` must check the mode and write in one atomic
/// step so overlapping runs cannot overwrite each other.
#[async_trait]
pub trait DocumentRegistry: Send + Sync {
    async fn find_by_id(&self, id: DocumentId) -> Result<Option<Document>, RegistryError>;

    async fn find_many(&self, filter: &DocumentFilter) -> Result<Vec<Document>, RegistryError>;

    /// Returns `false` when nothing was written (unknown id, or text already
    /// present under [`SaveMode::IfEmpty`]).
    async fn save_text(
        &self,
        id: DocumentId,
        text: &str,
        mode: SaveMode,
    ) -> Result<bool, RegistryError>;

    /// Diagnostics only; never changes which documents are selected.
    async fn record_failure(&self, id: DocumentId, message: &str) -> Result<(), RegistryError>;
}

#[async_trait]
impl<T: DocumentRegistry + ?Sized> DocumentRegistry for Arc<T> {
    async fn find_by_id(&self, id: DocumentId) -> Result<Option<Document>, RegistryError> {
        (**self).find_by_id(id).await
    }

    async fn find_many(&self, filter: &DocumentFilter) -> Result<Vec<Document>, RegistryError> {
        (**self).find_many(filter).await
    }

    async fn save_text(
        &self,
        id: DocumentId,
        text: &str,
        mode: SaveMode,
    ) -> Result<bool, RegistryError> {
        (**self).save_text(id, text, mode).await
    }

    async fn record_failure(&self, id: DocumentId, message: &str) -> Result<(), RegistryError> {
        (**self).record_failure(id, message).await
    }
}

// ── In-memory registry (used by tests and dry runs) ───────────────────────────

#[derive(Default)]
struct MemoryState {
    documents: Vec<Document>,
    failures: HashMap<DocumentId, String>,
    writes: usize,
}

/// Keeps documents in insertion order behind a single lock.
#[derive(Default)]
pub struct MemoryRegistry {
    state: Mutex<MemoryState>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_documents(documents: impl IntoIterator<Item = Document>) -> Self {
        MemoryRegistry {
            state: Mutex::new(MemoryState {
                documents: documents.into_iter().collect(),
                ..MemoryState::default()
            }),
        }
    }

    pub async fn insert(&self, document: Document) -> DocumentId {
        let id = document.id;
        self.state.lock().await.documents.push(document);
        id
    }

    pub async fn get(&self, id: DocumentId) -> Option<Document> {
        let state = self.state.lock().await;
        state.documents.iter().find(|d| d.id == id).cloned()
    }

    pub async fn last_failure(&self, id: DocumentId) -> Option<String> {
        self.state.lock().await.failures.get(&id).cloned()
    }

    /// Number of successful text writes so far.
    pub async fn write_count(&self) -> usize {
        self.state.lock().await.writes
    }
}

#[async_trait]
impl DocumentRegistry for MemoryRegistry {
    async fn find_by_id(&self, id: DocumentId) -> Result<Option<Document>, RegistryError> {
        Ok(self.get(id).await)
    }

    async fn find_many(&self, filter: &DocumentFilter) -> Result<Vec<Document>, RegistryError> {
        let state = self.state.lock().await;
        Ok(state
            .documents
            .iter()
            .filter(|d| filter.matches(d))
            .cloned()
            .collect())
    }

    async fn save_text(
        &self,
        id: DocumentId,
        text: &str,
        mode: SaveMode,
    ) -> Result<bool, RegistryError> {
        let mut state = self.state.lock().await;
        let Some(doc) = state.documents.iter_mut().find(|d| d.id == id) else {
            return Ok(false);
        };
        if mode == SaveMode::IfEmpty && doc.has_text() {
            return Ok(false);
        }
        doc.extracted_text = text.to_string();
        state.failures.remove(&id);
        state.writes += 1;
        Ok(true)
    }

    async fn record_failure(&self, id: DocumentId, message: &str) -> Result<(), RegistryError> {
        let mut state = self.state.lock().await;
        if state.documents.iter().any(|d| d.id == id) {
            state.failures.insert(id, message.to_string());
        }
        Ok(())
    }
}
