use anyhow::{bail, Context, Result};
use folio_core::RecognitionProfile;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

const CONFIG_FILE: &str = "folio.toml";

fn project_dirs() -> Option<directories::ProjectDirs> {
    directories::ProjectDirs::from("com", "folio", "Folio")
}

fn data_dir() -> PathBuf {
    project_dirs()
        .map(|d| d.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."))
}

/// `<platform config dir>/folio.toml`, when the platform has one.
pub fn default_config_path() -> Option<PathBuf> {
    project_dirs().map(|d| d.config_dir().join(CONFIG_FILE))
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Local,
    Http,
}

impl FromStr for StorageBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(StorageBackend::Local),
            "http" => Ok(StorageBackend::Http),
            other => Err(format!("unknown storage backend '{other}' (expected local or http)")),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OcrEngine {
    /// The `tesseract` executable.
    #[default]
    Command,
    /// libtesseract linked in; needs the `tesseract` feature.
    Library,
}

impl FromStr for OcrEngine {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "command" => Ok(OcrEngine::Command),
            "library" => Ok(OcrEngine::Library),
            other => Err(format!("unknown OCR engine '{other}' (expected command or library)")),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub database: DatabaseConfig,
    pub storage: StorageConfig,
    pub ocr: OcrConfig,
    pub extraction: ExtractionConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DatabaseConfig {
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { path: data_dir().join("folio.db") }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Root directory for the local backend.
    pub root: PathBuf,
    /// Base URL for the HTTP backend.
    pub base_url: Option<String>,
    pub token: Option<String>,
    /// Where remote documents are materialized; system temp dir if unset.
    pub temp_dir: Option<PathBuf>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Local,
            root: data_dir().join("documents"),
            base_url: None,
            token: None,
            temp_dir: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OcrConfig {
    pub engine: OcrEngine,
    pub default_profile: RecognitionProfile,
    pub tessdata_path: Option<PathBuf>,
    /// Executable used by the `command` engine.
    pub binary: String,
    pub timeout_secs: Option<u64>,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            engine: OcrEngine::Command,
            default_profile: RecognitionProfile::default(),
            tessdata_path: None,
            binary: "tesseract".to_string(),
            timeout_secs: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExtractionConfig {
    pub concurrency: usize,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self { concurrency: 1 }
    }
}

/// Parse an override, logging and ignoring values that do not parse.
fn parse_override<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, var: &str) -> Option<T>
where
    T::Err: std::fmt::Display,
{
    let val = lookup(var)?;
    match val.parse() {
        Ok(parsed) => Some(parsed),
        Err(e) => {
            tracing::warn!("Invalid value '{}' for {}: {}. Ignoring.", val, var, e);
            None
        }
    }
}

impl Config {
    /// Load the config file (explicit path, or the platform default if it
    /// exists), then apply `FOLIO_*` environment overrides.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut config = match explicit {
            Some(path) => Self::from_file(path)?,
            None => match default_config_path() {
                Some(path) if path.is_file() => Self::from_file(&path)?,
                _ => Self::default(),
            },
        };
        config.apply_overrides(|var| std::env::var(var).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config = toml::from_str(&text)
            .with_context(|| format!("Invalid config file {}", path.display()))?;
        tracing::debug!(path = %path.display(), "loaded config");
        Ok(config)
    }

    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = parse_override(&lookup, "FOLIO_DATABASE") {
            self.database.path = v;
        }
        if let Some(v) = parse_override(&lookup, "FOLIO_STORAGE_BACKEND") {
            self.storage.backend = v;
        }
        if let Some(v) = parse_override(&lookup, "FOLIO_STORAGE_ROOT") {
            self.storage.root = v;
        }
        if let Some(v) = lookup("FOLIO_STORAGE_URL") {
            self.storage.base_url = Some(v);
        }
        if let Some(v) = lookup("FOLIO_STORAGE_TOKEN") {
            self.storage.token = Some(v);
        }
        if let Some(v) = parse_override(&lookup, "FOLIO_TEMP_DIR") {
            self.storage.temp_dir = Some(v);
        }
        if let Some(v) = parse_override(&lookup, "FOLIO_OCR_ENGINE") {
            self.ocr.engine = v;
        }
        if let Some(v) = parse_override(&lookup, "FOLIO_OCR_LANG") {
            self.ocr.default_profile = v;
        }
        if let Some(v) = parse_override(&lookup, "FOLIO_TESSDATA") {
            self.ocr.tessdata_path = Some(v);
        }
        if let Some(v) = parse_override(&lookup, "FOLIO_OCR_TIMEOUT_SECS") {
            self.ocr.timeout_secs = Some(v);
        }
        if let Some(v) = parse_override::<usize>(&lookup, "FOLIO_CONCURRENCY") {
            if v == 0 {
                tracing::warn!("FOLIO_CONCURRENCY must be at least 1. Ignoring.");
            } else {
                self.extraction.concurrency = v;
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.storage.backend == StorageBackend::Http && self.storage.base_url.is_none() {
            bail!("storage.base_url is required for the http storage backend");
        }
        if self.extraction.concurrency == 0 {
            bail!("extraction.concurrency must be at least 1");
        }
        Ok(())
    }

    /// `None` when unset or zero.
    pub fn ocr_timeout(&self) -> Option<Duration> {
        self.ocr
            .timeout_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }
}
