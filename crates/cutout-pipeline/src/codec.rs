//! Image decoding and PNG encoding.
//!
//! The pipeline's only I/O-adjacent seams: raw bytes in (PNG, JPEG,
//! BMP, WebP -- whatever the `image` crate decodes), PNG bytes out.
//! Decoding should be awaited/blocked on by async callers before any
//! pixel-processing stage begins.

use image::codecs::png::PngEncoder;

use crate::types::{ExtractionError, RgbaImage};

/// Decode raw image bytes into an RGBA buffer.
///
/// # Errors
///
/// Returns [`ExtractionError::EmptyInput`] if `bytes` is empty and
/// [`ExtractionError::ImageDecode`] if the format is unrecognized or
/// the data is corrupt. No partial output in either case.
pub fn decode_rgba(bytes: &[u8]) -> Result<RgbaImage, ExtractionError> {
    if bytes.is_empty() {
        return Err(ExtractionError::EmptyInput);
    }
    Ok(image::load_from_memory(bytes)?.to_rgba8())
}

/// Encode an RGBA buffer as PNG bytes.
///
/// # Errors
///
/// Returns [`ExtractionError::PngEncode`] if encoding fails.
pub fn encode_png(image: &RgbaImage) -> Result<Vec<u8>, ExtractionError> {
    let mut buf = Vec::new();
    let encoder = PngEncoder::new(&mut buf);
    image::ImageEncoder::write_image(
        encoder,
        image.as_raw(),
        image.width(),
        image.height(),
        image::ExtendedColorType::Rgba8,
    )
    .map_err(ExtractionError::PngEncode)?;
    Ok(buf)
}
