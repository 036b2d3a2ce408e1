use folio_core::RecognitionProfile;
use image::RgbImage;
use std::fs::File;
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::preprocess;

#[derive(Debug, Error)]
pub enum OcrError {
    #[error("Image encode error: {0}")]
    ImageEncode(String),
    #[error("OCR engine error: {0}")]
    Engine(String),
    #[error("Failed to run OCR engine '{binary}': {source}")]
    Launch {
        binary: String,
        #[source]
        source: std::io::Error,
    },
    #[error("OCR engine timed out after {0:?}")]
    Timeout(Duration),
    #[error("OCR engine task aborted: {0}")]
    Aborted(String),
    #[error("Tesseract library backend not compiled in (enable the `tesseract` feature)")]
    NotAvailable,
}

/// Any failure inside the recognizer, tagged with the profile it ran under.
/// The engine's own error stays reachable through `source()`.
#[derive(Debug, Error)]
#[error("OCR recognition failed ({profile}): {source}")]
pub struct RecognitionFailure {
    pub profile: RecognitionProfile,
    #[source]
    pub source: OcrError,
}

impl RecognitionFailure {
    pub fn new(profile: &RecognitionProfile, source: OcrError) -> Self {
        Self { profile: profile.clone(), source }
    }
}

/// Abstraction over an OCR backend.
///
/// Implementations receive an RGB image; color conversion happens before the
/// call, never inside a backend.
pub trait OcrBackend: Send + Sync {
    fn name(&self) -> &'static str;

    fn recognize(&self, image: &RgbImage, profile: &RecognitionProfile) -> Result<String, OcrError>;
}

impl<T: OcrBackend + ?Sized> OcrBackend for Arc<T> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn recognize(&self, image: &RgbImage, profile: &RecognitionProfile) -> Result<String, OcrError> {
        (**self).recognize(image, profile)
    }
}

// ── Mock backend (always available, used for tests) ───────────────────────────

/// Returns a pre-set string. Lets the extraction pipeline be tested
/// without requiring Tesseract to be installed.
pub struct MockRecognizer {
    pub text: String,
}

impl MockRecognizer {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

impl OcrBackend for MockRecognizer {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn recognize(&self, _image: &RgbImage, _profile: &RecognitionProfile) -> Result<String, OcrError> {
        Ok(self.text.clone())
    }
}

// ── Tesseract executable ──────────────────────────────────────────────────────

/// Runs the `tesseract` command-line tool. The image is handed over as a
/// temporary PNG; input, output and stderr live in a scratch directory that is
/// removed when the call returns.
pub struct TesseractCommand {
    binary: String,
    tessdata_path: Option<PathBuf>,
    timeout: Option<Duration>,
}

impl Default for TesseractCommand {
    fn default() -> Self {
        Self { binary: "tesseract".to_string(), tessdata_path: None, timeout: None }
    }
}

const CHILD_POLL: Duration = Duration::from_millis(25);

impl TesseractCommand {
    pub fn new(binary: impl Into<String>, tessdata_path: Option<PathBuf>) -> Self {
        Self { binary: binary.into(), tessdata_path, timeout: None }
    }

    /// Kill the child process once it has run this long.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    fn wait(&self, child: &mut Child) -> Result<ExitStatus, OcrError> {
        let engine_err = |e: std::io::Error| OcrError::Engine(format!("waiting for tesseract: {e}"));
        let Some(limit) = self.timeout else {
            return child.wait().map_err(engine_err);
        };

        let started = Instant::now();
        loop {
            if let Some(status) = child.try_wait().map_err(engine_err)? {
                return Ok(status);
            }
            if started.elapsed() >= limit {
                if let Err(e) = child.kill() {
                    tracing::warn!(error = %e, "could not kill tesseract");
                }
                // Reap the process so it does not linger as a zombie.
                let _ = child.wait();
                return Err(OcrError::Timeout(limit));
            }
            std::thread::sleep(CHILD_POLL);
        }
    }
}

impl OcrBackend for TesseractCommand {
    fn name(&self) -> &'static str {
        "tesseract-command"
    }

    fn recognize(&self, image: &RgbImage, profile: &RecognitionProfile) -> Result<String, OcrError> {
        let png = preprocess::encode_as_png(image).map_err(|e| OcrError::ImageEncode(e.to_string()))?;

        let scratch = tempfile::Builder::new()
            .prefix("folio-ocr-")
            .tempdir()
            .map_err(|e| OcrError::Engine(format!("cannot create scratch dir: {e}")))?;
        let input = scratch.path().join("page.png");
        let output_base = scratch.path().join("page");
        let stderr_path = scratch.path().join("stderr.log");

        std::fs::write(&input, &png)
            .map_err(|e| OcrError::Engine(format!("cannot write input file: {e}")))?;
        let stderr = File::create(&stderr_path)
            .map_err(|e| OcrError::Engine(format!("cannot create stderr log: {e}")))?;

        // Output goes to `<base>.txt`, not a pipe, so a long-running child
        // can be polled without filling a pipe buffer.
        let mut cmd = Command::new(&self.binary);
        cmd.arg(&input)
            .arg(&output_base)
            .arg("-l")
            .arg(profile.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::from(stderr));
        if let Some(tessdata) = &self.tessdata_path {
            cmd.env("TESSDATA_PREFIX", tessdata);
        }

        tracing::debug!(binary = %self.binary, %profile, "running tesseract");
        let mut child = cmd.spawn().map_err(|source| OcrError::Launch {
            binary: self.binary.clone(),
            source,
        })?;
        let status = self.wait(&mut child)?;

        if !status.success() {
            let stderr = std::fs::read_to_string(&stderr_path).unwrap_or_default();
            return Err(OcrError::Engine(format!(
                "tesseract exited with {}: {}",
                status,
                stderr.trim()
            )));
        }

        let text = std::fs::read(output_base.with_extension("txt"))
            .map_err(|e| OcrError::Engine(format!("cannot read tesseract output: {e}")))?;
        Ok(String::from_utf8_lossy(&text).into_owned())
    }
}

// ── Tesseract library backend (optional, gated behind `tesseract` feature) ────

#[cfg(feature = "tesseract")]
pub mod tesseract_backend {
    use super::{OcrBackend, OcrError};
    use folio_core::RecognitionProfile;
    use image::RgbImage;
    use leptess::LepTess;

    pub struct TesseractRecognizer {
        data_path: Option<String>,
    }

    impl TesseractRecognizer {
        pub fn new(data_path: Option<String>) -> Self {
            Self { data_path }
        }
    }

    impl OcrBackend for TesseractRecognizer {
        fn name(&self) -> &'static str {
            "tesseract-library"
        }

        fn recognize(
            &self,
            image: &RgbImage,
            profile: &RecognitionProfile,
        ) -> Result<String, OcrError> {
            let png = crate::preprocess::encode_as_png(image)
                .map_err(|e| OcrError::ImageEncode(e.to_string()))?;
            let mut lt = LepTess::new(self.data_path.as_deref(), &profile.to_string())
                .map_err(|e| OcrError::Engine(e.to_string()))?;
            lt.set_image_from_mem(&png)
                .map_err(|e| OcrError::Engine(e.to_string()))?;
            lt.get_utf8_text().map_err(|e| OcrError::Engine(e.to_string()))
        }
    }
}

/// Stand-in used when the configured engine was not compiled in.
pub struct UnavailableRecognizer;

impl OcrBackend for UnavailableRecognizer {
    fn name(&self) -> &'static str {
        "unavailable"
    }

    fn recognize(&self, _image: &RgbImage, _profile: &RecognitionProfile) -> Result<String, OcrError> {
        Err(OcrError::NotAvailable)
    }
}
