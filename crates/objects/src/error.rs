use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Object not found: {0}")]
    NotFound(String),
    #[error("IO error on '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("HTTP error on '{path}': {source}")]
    Http {
        path: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("Unexpected HTTP status {status} for '{path}'")]
    Status { path: String, status: u16 },
    #[error("Invalid storage configuration: {0}")]
    Config(String),
}

impl StorageError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound(_))
    }

    pub(crate) fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        StorageError::Io { path: path.into(), source }
    }
}
