pub mod accessor;
pub mod error;
pub mod materialize;

pub use accessor::{Accessor, BackendKind, HttpStore, LocalStore, MemoryStore, ObjectReader};
pub use error::StorageError;
pub use materialize::{Materializer, StagedDocument, TemporaryAsset};
