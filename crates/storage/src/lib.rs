pub mod db;
pub mod registry;

pub use db::{
    backlog_stats, create_db, get_document, get_recent_failures, insert_document,
    list_documents, record_extraction_failure, save_extracted_text, BacklogStats, DbPool,
    DocumentRecord,
};
pub use registry::SqliteRegistry;
