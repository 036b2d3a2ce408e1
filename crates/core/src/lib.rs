pub mod document;
pub mod profile;
pub mod registry;
pub mod request;

pub use document::{Document, DocumentFilter, DocumentId};
pub use profile::{ProfileError, RecognitionProfile, DEFAULT_PROFILE};
pub use registry::{DocumentRegistry, MemoryRegistry, RegistryError, SaveMode};
pub use request::{ExtractionRequest, Selection};
