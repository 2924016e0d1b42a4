use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;

use crate::color::ColorImage;
use crate::error::{GuardError, Result};

/// Quality used when archiving full-resolution frames.
pub const DEFAULT_JPEG_QUALITY: u8 = 100;

/// Encode an image as baseline JPEG. Alpha is dropped.
pub fn encode_jpeg(image: &ColorImage, quality: u8) -> Result<Vec<u8>> {
    if !(1..=100).contains(&quality) {
        return Err(GuardError::Persistence(format!(
            "JPEG quality {} outside 1..=100",
            quality
        )));
    }
    let rgb = RgbImage::from_raw(image.width(), image.height(), image.to_rgb_bytes()?)
        .ok_or_else(|| GuardError::Format("RGB buffer does not match image size".to_string()))?;

    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, quality)
        .encode_image(&rgb)
        .map_err(|err| GuardError::Persistence(format!("JPEG encode failed: {}", err)))?;
    Ok(out)
}
