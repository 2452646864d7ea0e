//! Reading source images and writing augmented JPEGs.
//!
//! Failures map onto [`JobRejection`] so the orchestrator can count an
//! unreadable source separately from a geometric rejection.

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use image::ImageEncoder;
use image::codecs::jpeg::JpegEncoder;
use polyaug_pipeline::RgbImage;

use crate::error::JobRejection;

/// JPEG quality of augmented images.
pub const JPEG_QUALITY: u8 = 95;

/// Decode the image at `path` as 8-bit RGB. Any supported format is
/// accepted; alpha and extra bit depth are dropped.
///
/// # Errors
///
/// Returns [`JobRejection::ImageReadFailure`] if the file is missing or
/// cannot be decoded.
pub fn read_rgb(path: &Path) -> Result<RgbImage, JobRejection> {
    let failure = |message: String| JobRejection::ImageReadFailure {
        path: path.to_path_buf(),
        message,
    };
    let reader = image::ImageReader::open(path).map_err(|e| failure(e.to_string()))?;
    let reader = reader
        .with_guessed_format()
        .map_err(|e| failure(e.to_string()))?;
    let decoded = reader.decode().map_err(|e| failure(e.to_string()))?;
    Ok(decoded.into_rgb8())
}

/// Encode `image` as JPEG at `path`, overwriting any existing file.
///
/// # Errors
///
/// Returns [`JobRejection::ImageWriteFailure`] if the file cannot be
/// created or encoding fails.
pub fn write_jpeg(path: &Path, image: &RgbImage) -> Result<(), JobRejection> {
    let failure = |message: String| JobRejection::ImageWriteFailure {
        path: path.to_path_buf(),
        message,
    };
    let file = File::create(path).map_err(|e| failure(e.to_string()))?;
    let mut writer = BufWriter::new(file);
    let encoder = JpegEncoder::new_with_quality(&mut writer, JPEG_QUALITY);
    encoder
        .write_image(
            image.as_raw(),
            image.width(),
            image.height(),
            image::ExtendedColorType::Rgb8,
        )
        .map_err(|e| failure(e.to_string()))?;
    std::io::Write::flush(&mut writer).map_err(|e| failure(e.to_string()))
}
