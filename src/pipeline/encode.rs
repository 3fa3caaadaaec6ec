//! Image encoding for the OCR engines.
//!
//! PNG is lossless: JPEG artefacts around small glyphs (a `$` next to a
//! price) are exactly what makes OCR misread characters. Tesseract reads the
//! raw PNG bytes from stdin; vision models get them base64-wrapped.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use image::DynamicImage;
use std::io::Cursor;
use tracing::debug;

/// Encode a rendered page as PNG bytes.
pub fn encode_png(img: &DynamicImage) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;
    debug!("Encoded {}x{} page → {} PNG bytes", img.width(), img.height(), buf.len());
    Ok(buf)
}

/// Encode a rendered page as a base64 PNG attachment for a vision model.
///
/// `detail: "high"` keeps fine print legible for models that tile images.
pub fn encode_image_data(img: &DynamicImage) -> Result<ImageData, image::ImageError> {
    let png = encode_png(img)?;
    Ok(ImageData::new(STANDARD.encode(&png), "image/png").with_detail("high"))
}
