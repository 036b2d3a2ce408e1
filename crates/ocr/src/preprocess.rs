use image::{DynamicImage, ImageReader, RgbImage};
use std::io::Cursor;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PreprocessError {
    #[error("Failed to read image '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to load image: {0}")]
    Load(#[from] image::ImageError),
    #[error("Failed to encode processed image: {0}")]
    Encode(String),
}

/// Load an image file and return it as three-channel RGB, ready for OCR.
pub fn prepare_for_ocr(path: &Path) -> Result<RgbImage, PreprocessError> {
    let read_err = |source| PreprocessError::Read {
        path: path.display().to_string(),
        source,
    };
    // Content sniffing first, the file extension as fallback.
    let img = ImageReader::open(path)
        .map_err(read_err)?
        .with_guessed_format()
        .map_err(read_err)?
        .decode()?;
    Ok(normalize(img))
}

/// Convert any color model (grayscale, with alpha, 16-bit, float) to RGB8.
/// Alpha is dropped, not composited.
pub fn normalize(img: DynamicImage) -> RgbImage {
    match img {
        DynamicImage::ImageRgb8(rgb) => rgb,
        other => {
            tracing::debug!(from = ?other.color(), "converting image to RGB8");
            other.to_rgb8()
        }
    }
}

pub fn encode_as_png(img: &RgbImage) -> Result<Vec<u8>, PreprocessError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .map_err(|e| PreprocessError::Encode(e.to_string()))?;
    Ok(buf)
}
