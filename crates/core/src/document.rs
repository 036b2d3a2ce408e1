use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DocumentId(pub Uuid);

impl DocumentId {
    pub fn new() -> Self {
        DocumentId(Uuid::new_v4())
    }
}

impl Default for DocumentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for DocumentId {
    type Err = uuid::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(DocumentId)
    }
}

/// An invoice document as seen by the extraction pipeline.
///
/// The registry owns the record; extraction only reads the identity, the
/// storage path and the current text, and writes the text back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    /// Backend-opaque logical path of the attached file. `None` or an empty
    /// string means no file is attached.
    pub storage_path: Option<String>,
    /// Empty until text has been extracted.
    pub extracted_text: String,
}

impl Document {
    pub fn new(storage_path: impl Into<String>) -> Self {
        Document {
            id: DocumentId::new(),
            storage_path: Some(storage_path.into()),
            extracted_text: String::new(),
        }
    }

    pub fn without_file() -> Self {
        Document {
            id: DocumentId::new(),
            storage_path: None,
            extracted_text: String::new(),
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.extracted_text = text.into();
        self
    }

    /// The attached file's logical path, if any.
    pub fn file_path(&self) -> Option<&str> {
        self.storage_path.as_deref().filter(|p| !p.is_empty())
    }

    pub fn has_file(&self) -> bool {
        self.file_path().is_some()
    }

    pub fn has_text(&self) -> bool {
        !self.extracted_text.is_empty()
    }
}

/// Selection predicate for [`crate::DocumentRegistry::find_many`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DocumentFilter {
    /// Only documents with a file attached.
    pub attached_only: bool,
    /// Only documents whose extracted text is still empty.
    pub pending_only: bool,
}

impl DocumentFilter {
    /// The extraction backlog: every attached document, narrowed to the ones
    /// without text unless `force` is set.
    pub fn backlog(force: bool) -> Self {
        DocumentFilter {
            attached_only: true,
            pending_only: !force,
        }
    }

    pub fn matches(&self, doc: &Document) -> bool {
        (!self.attached_only || doc.has_file()) && (!self.pending_only || !doc.has_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_id_parses_and_displays() {
        let id = DocumentId::new();
        let parsed: DocumentId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
        assert!("not-a-uuid".parse::<DocumentId>().is_err());
    }

    #[test]
    fn empty_storage_path_counts_as_no_file() {
        let mut doc = Document::new("");
        assert!(!doc.has_file());
        doc.storage_path = Some("invoices/a.png".into());
        assert_eq!(doc.file_path(), Some("invoices/a.png"));
        assert!(!Document::without_file().has_file());
    }

    #[test]
    fn backlog_filter_respects_force() {
        let pending = Document::new("invoices/a.png");
        let done = Document::new("invoices/b.png").with_text("INVOICE 42");
        let detached = Document::without_file();

        let normal = DocumentFilter::backlog(false);
        assert!(normal.matches(&pending));
        assert!(!normal.matches(&done));
        assert!(!normal.matches(&detached));

        let forced = DocumentFilter::backlog(true);
        assert!(forced.matches(&pending));
        assert!(forced.matches(&done));
        assert!(!forced.matches(&detached));
    }
}
