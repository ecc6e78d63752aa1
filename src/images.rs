//! Image loading for flow content and PDF embedding.
//!
//! Sources are either filesystem paths or `data:` URIs with base64 payloads.
//! JPEG data passes through to the PDF untouched (DCTDecode); everything
//! else decodes to raw RGB for a Flate-compressed XObject.

use base64::Engine as _;

use crate::error::{ReportError, Result};

/// A decoded image ready for embedding.
#[derive(Debug, Clone)]
pub struct DecodedImage {
    pub width: u32,
    pub height: u32,
    pub kind: ImageKind,
}

#[derive(Debug, Clone)]
pub enum ImageKind {
    /// Raw JPEG bytes, embedded as-is with DCTDecode.
    Jpeg(Vec<u8>),
    /// Decoded 8-bit RGB pixels, row-major.
    Rgb(Vec<u8>),
}

/// Fetch the raw bytes behind an image source.
pub fn load_bytes(src: &str) -> Result<Vec<u8>> {
    if let Some((_, b64)) = src.split_once("base64,") {
        return base64::engine::general_purpose::STANDARD
            .decode(b64.trim())
            .map_err(|e| ReportError::Image(format!("invalid base64 image data: {e}")));
    }
    Ok(std::fs::read(src)?)
}

/// Intrinsic pixel dimensions of an image source, if it can be read.
pub fn dimensions(src: &str) -> Option<(u32, u32)> {
    let bytes = load_bytes(src).ok()?;
    let img = image::load_from_memory(&bytes).ok()?;
    Some((img.width(), img.height()))
}

/// Decode an image source for embedding.
pub fn decode(src: &str) -> Result<DecodedImage> {
    let bytes = load_bytes(src)?;
    if bytes.starts_with(&[0xFF, 0xD8]) {
        let img = image::load_from_memory(&bytes)
            .map_err(|e| ReportError::Image(format!("cannot decode '{src}': {e}")))?;
        return Ok(DecodedImage {
            width: img.width(),
            height: img.height(),
            kind: ImageKind::Jpeg(bytes),
        });
    }
    let img = image::load_from_memory(&bytes)
        .map_err(|e| ReportError::Image(format!("cannot decode '{src}': {e}")))?;
    let rgb = img.to_rgb8();
    Ok(DecodedImage {
        width: rgb.width(),
        height: rgb.height(),
        kind: ImageKind::Rgb(rgb.into_raw()),
    })
}
