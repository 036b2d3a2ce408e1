use std::path::{Path, PathBuf};
use tempfile::TempPath;
use tokio::io::AsyncWriteExt;

use crate::accessor::Accessor;
use crate::error::StorageError;

const TEMP_PREFIX: &str = "folio-";

/// A local copy of a non-local document.
///
/// The file is removed by [`TemporaryAsset::release`] or, failing that, when
/// the asset is dropped. Removal never fails the caller: a file that is
/// already gone is fine, anything else is logged.
#[derive(Debug)]
pub struct TemporaryAsset {
    location: PathBuf,
    temp: Option<TempPath>,
    len: u64,
}

impl TemporaryAsset {
    fn new(temp: TempPath) -> Self {
        Self {
            location: temp.to_path_buf(),
            temp: Some(temp),
            len: 0,
        }
    }

    pub fn path(&self) -> &Path {
        &self.location
    }

    /// Bytes copied into the asset.
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn release(mut self) {
        if let Some(temp) = self.temp.take() {
            remove(temp, &self.location);
        }
    }
}

impl Drop for TemporaryAsset {
    fn drop(&mut self) {
        if let Some(temp) = self.temp.take() {
            remove(temp, &self.location);
        }
    }
}

fn remove(temp: TempPath, location: &Path) {
    match temp.close() {
        Ok(()) => tracing::debug!(path = %location.display(), "removed temporary asset"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(path = %location.display(), "temporary asset already removed")
        }
        Err(e) => tracing::warn!(
            path = %location.display(),
            error = %e,
            "failed to remove temporary asset"
        ),
    }
}

/// A document ready to be read from the local filesystem.
#[derive(Debug)]
pub enum StagedDocument {
    InPlace(PathBuf),
    Materialized(TemporaryAsset),
}

impl StagedDocument {
    pub fn path(&self) -> &Path {
        match self {
            StagedDocument::InPlace(path) => path,
            StagedDocument::Materialized(asset) => asset.path(),
        }
    }

    pub fn is_materialized(&self) -> bool {
        matches!(self, StagedDocument::Materialized(_))
    }

    /// Deletes the temporary copy, if there is one. In-place documents are
    /// left alone.
    pub fn release(self) {
        if let StagedDocument::Materialized(asset) = self {
            asset.release();
        }
    }
}

/// Copies documents out of non-local backends into scoped temporary files.
#[derive(Debug, Clone, Default)]
pub struct Materializer {
    temp_dir: Option<PathBuf>,
}

/// Suffix of the last path segment including the dot (`".png"`), so format
/// sniffing by extension still works on the copy.
fn suffix_of(path: &str) -> String {
    Path::new(path.rsplit('/').next().unwrap_or(path))
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{e}"))
        .unwrap_or_default()
}

impl Materializer {
    /// Temporary files go to the system temp dir.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        Self { temp_dir: Some(dir.into()) }
    }

    pub fn temp_dir(&self) -> PathBuf {
        self.temp_dir.clone().unwrap_or_else(std::env::temp_dir)
    }

    /// Open local documents where they are; copy everything else.
    pub async fn stage(
        &self,
        accessor: &Accessor,
        path: &str,
    ) -> Result<StagedDocument, StorageError> {
        match accessor.local_path(path).await? {
            Some(local) => {
                tracing::debug!(path, backend = %accessor.kind(), "opening document in place");
                Ok(StagedDocument::InPlace(local))
            }
            None => self
                .materialize(accessor, path)
                .await
                .map(StagedDocument::Materialized),
        }
    }

    /// Copy the full content of `path` into a new, uniquely named temp file.
    pub async fn materialize(
        &self,
        accessor: &Accessor,
        path: &str,
    ) -> Result<TemporaryAsset, StorageError> {
        // Open first: a missing object must not leave an empty file behind.
        let mut reader = accessor.open(path).await?;

        let dir = self.temp_dir();
        let named = tempfile::Builder::new()
            .prefix(TEMP_PREFIX)
            .suffix(&suffix_of(path))
            .tempfile_in(&dir)
            .map_err(|e| StorageError::io(dir.display().to_string(), e))?;
        let (file, temp) = named.into_parts();
        let mut asset = TemporaryAsset::new(temp);

        let mut file = tokio::fs::File::from_std(file);
        while let Some(chunk) = reader.chunk().await? {
            file.write_all(&chunk)
                .await
                .map_err(|e| StorageError::io(asset.path().display().to_string(), e))?;
            asset.len += chunk.len() as u64;
        }
        file.flush()
            .await
            .map_err(|e| StorageError::io(asset.path().display().to_string(), e))?;
        drop(file);

        tracing::debug!(
            path,
            backend = %accessor.kind(),
            local = %asset.path().display(),
            bytes = asset.len,
            "materialized document"
        );
        Ok(asset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accessor::MemoryStore;

    fn entries(dir: &Path) -> usize {
        std::fs::read_dir(dir).unwrap().count()
    }

    #[test]
    fn suffix_is_taken_from_last_segment() {
        assert_eq!(suffix_of("invoices/2024/scan.jpeg"), ".jpeg");
        assert_eq!(suffix_of("invoices.v2/scan"), "");
        assert_eq!(suffix_of("a.tar.png"), ".png");
    }

    #[tokio::test]
    async fn materialized_copy_keeps_suffix_and_content() {
        let tmp = tempfile::tempdir().unwrap();
        let store = MemoryStore::new();
        store.put("invoices/a.png", b"image bytes".to_vec()).await.unwrap();
        let accessor = Accessor::in_memory(store);

        let asset = Materializer::in_dir(tmp.path())
            .materialize(&accessor, "invoices/a.png")
            .await
            .unwrap();

        assert!(asset.path().starts_with(tmp.path()));
        assert_eq!(asset.path().extension().unwrap(), "png");
        assert_eq!(std::fs::read(asset.path()).unwrap(), b"image bytes");
        assert_eq!(asset.len(), 11);

        asset.release();
        assert_eq!(entries(tmp.path()), 0);
    }

    #[tokio::test]
    async fn concurrent_copies_get_distinct_names() {
        let tmp = tempfile::tempdir().unwrap();
        let store = MemoryStore::new();
        store.put("a.png", b"x".to_vec()).await.unwrap();
        let accessor = Accessor::in_memory(store);
        let materializer = Materializer::in_dir(tmp.path());

        let (a, b) = tokio::join!(
            materializer.materialize(&accessor, "a.png"),
            materializer.materialize(&accessor, "a.png"),
        );
        let (a, b) = (a.unwrap(), b.unwrap());
        assert_ne!(a.path(), b.path());
        assert_eq!(entries(tmp.path()), 2);

        drop(a);
        drop(b);
        assert_eq!(entries(tmp.path()), 0);
    }

    #[tokio::test]
    async fn release_tolerates_already_deleted_file() {
        let tmp = tempfile::tempdir().unwrap();
        let store = MemoryStore::new();
        store.put("a.png", b"x".to_vec()).await.unwrap();
        let accessor = Accessor::in_memory(store);

        let asset = Materializer::in_dir(tmp.path())
            .materialize(&accessor, "a.png")
            .await
            .unwrap();
        std::fs::remove_file(asset.path()).unwrap();
        asset.release();
        assert_eq!(entries(tmp.path()), 0);
    }

    #[tokio::test]
    async fn missing_object_leaves_no_file() {
        let tmp = tempfile::tempdir().unwrap();
        let accessor = Accessor::in_memory(MemoryStore::new());

        let err = Materializer::in_dir(tmp.path())
            .materialize(&accessor, "missing.png")
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(entries(tmp.path()), 0);
    }

    #[tokio::test]
    async fn local_documents_are_staged_in_place() {
        let root = tempfile::tempdir().unwrap();
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(root.path().join("a.png"), b"x").unwrap();
        let accessor = Accessor::local(root.path());

        let staged = Materializer::in_dir(tmp.path()).stage(&accessor, "a.png").await.unwrap();
        assert!(!staged.is_materialized());
        assert_eq!(staged.path(), root.path().join("a.png"));
        staged.release();

        // The original is untouched and nothing was copied.
        assert!(root.path().join("a.png").exists());
        assert_eq!(entries(tmp.path()), 0);
    }

    #[tokio::test]
    async fn remote_documents_are_materialized() {
        let tmp = tempfile::tempdir().unwrap();
        let store = MemoryStore::new();
        store.put("a.jpg", b"x".to_vec()).await.unwrap();
        let accessor = Accessor::in_memory(store);

        let staged = Materializer::in_dir(tmp.path()).stage(&accessor, "a.jpg").await.unwrap();
        assert!(staged.is_materialized());
        assert!(staged.path().exists());
        staged.release();
        assert_eq!(entries(tmp.path()), 0);
    }
}
