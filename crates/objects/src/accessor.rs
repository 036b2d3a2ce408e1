use reqwest::{Method, StatusCode, Url};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tokio::sync::RwLock;

use crate::error::StorageError;

const READ_CHUNK: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Local,
    Http,
    InMemory,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Local => write!(f, "local"),
            BackendKind::Http => write!(f, "http"),
            BackendKind::InMemory => write!(f, "in-memory"),
        }
    }
}

/// Split a logical path into segments. Empty, absolute and parent-relative
/// paths have no backing object in any backend.
fn segments(path: &str) -> Result<Vec<&str>, StorageError> {
    if path.starts_with('/') || path.contains('\\') {
        return Err(StorageError::NotFound(path.to_string()));
    }
    let parts: Vec<&str> = path
        .split('/')
        .filter(|s| !s.is_empty() && *s != ".")
        .collect();
    if parts.is_empty() || parts.contains(&"..") {
        return Err(StorageError::NotFound(path.to_string()));
    }
    Ok(parts)
}

// ── Readable byte stream ──────────────────────────────────────────────────────

#[derive(Debug)]
enum Source {
    File(tokio::fs::File),
    Http(reqwest::Response),
    Memory(Option<Vec<u8>>),
}

/// A streamed read of one stored object.
#[derive(Debug)]
pub struct ObjectReader {
    path: String,
    source: Source,
}

impl ObjectReader {
    /// Next chunk of content, `None` once the object is exhausted.
    pub async fn chunk(&mut self) -> Result<Option<Vec<u8>>, StorageError> {
        match &mut self.source {
            Source::File(file) => {
                let mut buf = vec![0u8; READ_CHUNK];
                let n = file
                    .read(&mut buf)
                    .await
                    .map_err(|e| StorageError::io(self.path.as_str(), e))?;
                if n == 0 {
                    return Ok(None);
                }
                buf.truncate(n);
                Ok(Some(buf))
            }
            Source::Http(response) => {
                let chunk = response.chunk().await.map_err(|source| StorageError::Http {
                    path: self.path.clone(),
                    source,
                })?;
                Ok(chunk.map(|bytes| bytes.to_vec()))
            }
            Source::Memory(data) => Ok(data.take().filter(|d| !d.is_empty())),
        }
    }

    pub async fn read_to_end(mut self) -> Result<Vec<u8>, StorageError> {
        let mut out = Vec::new();
        while let Some(chunk) = self.chunk().await? {
            out.extend_from_slice(&chunk);
        }
        Ok(out)
    }
}

// ── Local filesystem ──────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn full_path(&self, path: &str) -> Result<PathBuf, StorageError> {
        let mut full = self.root.clone();
        for segment in segments(path)? {
            full.push(segment);
        }
        Ok(full)
    }

    /// Absolute location of an existing object under the root.
    pub async fn resolve(&self, path: &str) -> Result<PathBuf, StorageError> {
        let full = self.full_path(path)?;
        match tokio::fs::metadata(&full).await {
            Ok(meta) if meta.is_file() => Ok(full),
            Ok(_) => Err(StorageError::NotFound(path.to_string())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(path.to_string()))
            }
            Err(e) => Err(StorageError::io(path, e)),
        }
    }

    async fn exists(&self, path: &str) -> Result<bool, StorageError> {
        match self.resolve(path).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn open(&self, path: &str) -> Result<ObjectReader, StorageError> {
        let full = self.resolve(path).await?;
        let file = tokio::fs::File::open(&full).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StorageError::NotFound(path.to_string())
            } else {
                StorageError::io(path, e)
            }
        })?;
        Ok(ObjectReader {
            path: path.to_string(),
            source: Source::File(file),
        })
    }
}

// ── Remote object store over HTTP ─────────────────────────────────────────────

/// Objects addressed as `<base_url>/<logical path>`, e.g. an S3-compatible
/// bucket endpoint or a gateway in front of one.
#[derive(Debug, Clone)]
pub struct HttpStore {
    client: reqwest::Client,
    base: Url,
    token: Option<String>,
}

impl HttpStore {
    pub fn new(base_url: &str, token: Option<String>) -> Result<Self, StorageError> {
        let base = Url::parse(base_url)
            .map_err(|e| StorageError::Config(format!("invalid base URL '{base_url}': {e}")))?;
        if !matches!(base.scheme(), "http" | "https") || base.cannot_be_a_base() {
            return Err(StorageError::Config(format!(
                "base URL must be an http(s) URL: '{base_url}'"
            )));
        }
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| StorageError::Config(e.to_string()))?;
        Ok(Self { client, base, token })
    }

    pub fn object_url(&self, path: &str) -> Result<Url, StorageError> {
        let parts = segments(path)?;
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| StorageError::Config(format!("cannot append to '{}'", self.base)))?
            .pop_if_empty()
            .extend(parts);
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> reqwest::RequestBuilder {
        let req = self.client.request(method, url);
        match &self.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    async fn exists(&self, path: &str) -> Result<bool, StorageError> {
        let url = self.object_url(path)?;
        let response = self
            .request(Method::HEAD, url)
            .send()
            .await
            .map_err(|source| StorageError::Http { path: path.to_string(), source })?;

        match response.status() {
            s if s.is_success() => Ok(true),
            // S3 answers 403 for missing keys when listing is not allowed.
            StatusCode::NOT_FOUND | StatusCode::FORBIDDEN => Ok(false),
            s => Err(StorageError::Status { path: path.to_string(), status: s.as_u16() }),
        }
    }

    async fn open(&self, path: &str) -> Result<ObjectReader, StorageError> {
        let url = self.object_url(path)?;
        let response = self
            .request(Method::GET, url)
            .send()
            .await
            .map_err(|source| StorageError::Http { path: path.to_string(), source })?;

        match response.status() {
            s if s.is_success() => Ok(ObjectReader {
                path: path.to_string(),
                source: Source::Http(response),
            }),
            StatusCode::NOT_FOUND | StatusCode::FORBIDDEN => {
                Err(StorageError::NotFound(path.to_string()))
            }
            s => Err(StorageError::Status { path: path.to_string(), status: s.as_u16() }),
        }
    }
}

// ── In-memory store ───────────────────────────────────────────────────────────

/// Non-local store kept in process memory. Clones share the same objects.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    objects: Arc<RwLock<HashMap<String, Arc<Vec<u8>>>>>,
}

fn memory_key(path: &str) -> Result<String, StorageError> {
    segments(path).map(|parts| parts.join("/"))
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn put(&self, path: &str, bytes: impl Into<Vec<u8>>) -> Result<(), StorageError> {
        let key = memory_key(path)?;
        self.objects.write().await.insert(key, Arc::new(bytes.into()));
        Ok(())
    }

    pub async fn remove(&self, path: &str) -> bool {
        match memory_key(path) {
            Ok(key) => self.objects.write().await.remove(&key).is_some(),
            Err(_) => false,
        }
    }

    async fn exists(&self, path: &str) -> Result<bool, StorageError> {
        match memory_key(path) {
            Ok(key) => Ok(self.objects.read().await.contains_key(&key)),
            Err(_) => Ok(false),
        }
    }

    async fn open(&self, path: &str) -> Result<ObjectReader, StorageError> {
        let key = memory_key(path)?;
        let bytes = self
            .objects
            .read()
            .await
            .get(&key)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(path.to_string()))?;
        Ok(ObjectReader {
            path: path.to_string(),
            source: Source::Memory(Some((*bytes).clone())),
        })
    }
}

// ── Accessor ──────────────────────────────────────────────────────────────────

/// Uniform read access to stored documents by logical path.
#[derive(Debug, Clone)]
pub enum Accessor {
    Local(LocalStore),
    Http(HttpStore),
    InMemory(MemoryStore),
}

impl Accessor {
    pub fn local(root: impl Into<PathBuf>) -> Self {
        Accessor::Local(LocalStore::new(root))
    }

    pub fn http(base_url: &str, token: Option<String>) -> Result<Self, StorageError> {
        HttpStore::new(base_url, token).map(Accessor::Http)
    }

    pub fn in_memory(store: MemoryStore) -> Self {
        Accessor::InMemory(store)
    }

    pub fn kind(&self) -> BackendKind {
        match self {
            Accessor::Local(_) => BackendKind::Local,
            Accessor::Http(_) => BackendKind::Http,
            Accessor::InMemory(_) => BackendKind::InMemory,
        }
    }

    /// Whether objects can be opened where they live, without a local copy.
    pub fn opens_in_place(&self) -> bool {
        matches!(self, Accessor::Local(_))
    }

    /// Filesystem path of an existing object for backends that have one;
    /// `Ok(None)` for backends that must be materialized first.
    pub async fn local_path(&self, path: &str) -> Result<Option<PathBuf>, StorageError> {
        match self {
            Accessor::Local(store) => store.resolve(path).await.map(Some),
            Accessor::Http(_) | Accessor::InMemory(_) => Ok(None),
        }
    }

    pub async fn exists(&self, path: &str) -> Result<bool, StorageError> {
        match self {
            Accessor::Local(store) => store.exists(path).await,
            Accessor::Http(store) => store.exists(path).await,
            Accessor::InMemory(store) => store.exists(path).await,
        }
    }

    pub async fn open(&self, path: &str) -> Result<ObjectReader, StorageError> {
        match self {
            Accessor::Local(store) => store.open(path).await,
            Accessor::Http(store) => store.open(path).await,
            Accessor::InMemory(store) => store.open(path).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn segments_reject_escaping_paths() {
        assert_eq!(segments("invoices/./a.png").unwrap(), vec!["invoices", "a.png"]);
        for bad in ["", "/etc/passwd", "../secret.png", "invoices/../../x", "a\\b.png", "//"] {
            assert!(segments(bad).unwrap_err().is_not_found(), "accepted {bad:?}");
        }
    }

    #[tokio::test]
    async fn local_store_opens_files_under_root() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("invoices")).unwrap();
        std::fs::write(dir.path().join("invoices/a.png"), b"png bytes").unwrap();

        let accessor = Accessor::local(dir.path());
        assert!(accessor.opens_in_place());
        assert!(accessor.exists("invoices/a.png").await.unwrap());
        assert!(!accessor.exists("invoices/missing.png").await.unwrap());
        assert!(!accessor.exists("invoices").await.unwrap());

        let local = accessor.local_path("invoices/a.png").await.unwrap().unwrap();
        assert_eq!(local, dir.path().join("invoices").join("a.png"));

        let bytes = accessor.open("invoices/a.png").await.unwrap().read_to_end().await.unwrap();
        assert_eq!(bytes, b"png bytes");
    }

    #[tokio::test]
    async fn local_store_missing_object_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let accessor = Accessor::local(dir.path());
        assert!(accessor.open("nope.png").await.unwrap_err().is_not_found());
        assert!(accessor.local_path("nope.png").await.unwrap_err().is_not_found());
        assert!(accessor.open("../outside.png").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn memory_store_is_not_local() {
        let store = MemoryStore::new();
        store.put("invoices/a.png", b"abc".to_vec()).await.unwrap();
        let accessor = Accessor::in_memory(store.clone());

        assert!(!accessor.opens_in_place());
        assert_eq!(accessor.kind(), BackendKind::InMemory);
        assert!(accessor.local_path("invoices/a.png").await.unwrap().is_none());
        assert!(accessor.exists("invoices//a.png").await.unwrap());

        let bytes = accessor.open("invoices/a.png").await.unwrap().read_to_end().await.unwrap();
        assert_eq!(bytes, b"abc");

        assert!(store.remove("invoices/a.png").await);
        assert!(accessor.open("invoices/a.png").await.unwrap_err().is_not_found());
    }

    #[test]
    fn http_object_url_encodes_segments() {
        let store = HttpStore::new("https://files.example.com/bucket/", None).unwrap();
        let url = store.object_url("invoices/my scan.png").unwrap();
        assert_eq!(url.as_str(), "https://files.example.com/bucket/invoices/my%20scan.png");

        let store = HttpStore::new("https://files.example.com/bucket", None).unwrap();
        let url = store.object_url("a.png").unwrap();
        assert_eq!(url.as_str(), "https://files.example.com/bucket/a.png");
    }

    #[test]
    fn http_store_rejects_bad_base_urls() {
        assert!(matches!(HttpStore::new("not a url", None), Err(StorageError::Config(_))));
        assert!(matches!(HttpStore::new("ftp://x/y", None), Err(StorageError::Config(_))));
    }

    #[tokio::test]
    async fn http_store_streams_objects() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/bucket/invoices/a.png"))
            .and(header("authorization", "Bearer s3cret"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"remote bytes".to_vec()))
            .mount(&server)
            .await;
        Mock::given(method("HEAD"))
            .and(path("/bucket/invoices/a.png"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let accessor =
            Accessor::http(&format!("{}/bucket", server.uri()), Some("s3cret".into())).unwrap();
        assert_eq!(accessor.kind(), BackendKind::Http);
        assert!(accessor.exists("invoices/a.png").await.unwrap());

        let bytes = accessor.open("invoices/a.png").await.unwrap().read_to_end().await.unwrap();
        assert_eq!(bytes, b"remote bytes");
    }

    #[tokio::test]
    async fn http_store_maps_statuses() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/bucket/broken.png"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        Mock::given(path("/bucket/hidden.png"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let accessor = Accessor::http(&format!("{}/bucket", server.uri()), None).unwrap();

        // Unmatched requests get wiremock's default 404.
        assert!(accessor.open("missing.png").await.unwrap_err().is_not_found());
        assert!(!accessor.exists("missing.png").await.unwrap());
        assert!(!accessor.exists("hidden.png").await.unwrap());
        // A hidden key must look the same to `open` as it does to `exists`.
        assert!(accessor.open("hidden.png").await.unwrap_err().is_not_found());

        match accessor.open("broken.png").await {
            Err(StorageError::Status { status, .. }) => assert_eq!(status, 500),
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("expected an error"),
        }
    }
}
