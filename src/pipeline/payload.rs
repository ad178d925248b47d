//! Image payload normalisation: data-URI / base64 text → validated bytes.
//!
//! Callers hand the engine whatever their canvas capture produced, usually
//! `data:image/png;base64,iVBOR…`. The prefix is stripped, the remainder is
//! decoded, and the decoded size is checked against the configured limit
//! before any provider sees the image.

use crate::error::ExtractionError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

static RE_DATA_URI: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^data:([\w.+-]+/[\w.+-]+)?(?:;[\w-]+=[\w.-]+)*;base64,").unwrap());

/// A decoded, size-checked image.
#[derive(Debug, Clone)]
pub struct ImagePayload {
    bytes: Vec<u8>,
    base64: String,
    mime_type: String,
}

impl ImagePayload {
    /// Normalise, decode and validate a base64 image.
    ///
    /// # Errors
    /// - [`ExtractionError::InvalidEncoding`] when the payload is empty or not base64
    /// - [`ExtractionError::PayloadTooLarge`] when the decoded size exceeds `max_bytes`
    pub fn from_base64(input: &str, max_bytes: usize) -> Result<Self, ExtractionError> {
        let body = strip_data_uri(input);
        let compact: String = body.chars().filter(|c| !c.is_ascii_whitespace()).collect();
        if compact.is_empty() {
            return Err(ExtractionError::InvalidEncoding {
                detail: "image payload is empty".into(),
            });
        }

        // Reject oversized payloads before paying for the decode.
        let estimated = compact.len() / 4 * 3;
        if estimated.saturating_sub(2) > max_bytes {
            return Err(ExtractionError::PayloadTooLarge {
                size: estimated,
                limit: max_bytes,
            });
        }

        let bytes = STANDARD
            .decode(compact.as_bytes())
            .map_err(|e| ExtractionError::InvalidEncoding {
                detail: e.to_string(),
            })?;
        if bytes.len() > max_bytes {
            return Err(ExtractionError::PayloadTooLarge {
                size: bytes.len(),
                limit: max_bytes,
            });
        }

        let mime_type = sniff_mime(&bytes).to_string();
        debug!("Decoded image payload: {} bytes, {}", bytes.len(), mime_type);

        Ok(Self {
            bytes,
            base64: compact,
            mime_type,
        })
    }

    /// Wrap raw image bytes (e.g. read from disk).
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        let base64 = STANDARD.encode(&bytes);
        let mime_type = sniff_mime(&bytes).to_string();
        Self {
            bytes,
            base64,
            mime_type,
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Canonical base64 (no prefix, no whitespace).
    pub fn base64(&self) -> &str {
        &self.base64
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// `data:<mime>;base64,<payload>` for multimodal request bodies.
    pub fn data_uri(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.base64)
    }
}

/// Remove a leading `data:<mime>;base64,` header if present.
pub fn strip_data_uri(input: &str) -> &str {
    let trimmed = input.trim();
    match RE_DATA_URI.find(trimmed) {
        Some(m) => &trimmed[m.end()..],
        None => trimmed,
    }
}

/// Guess the MIME type from magic bytes, defaulting to PNG.
fn sniff_mime(bytes: &[u8]) -> &'static str {
    match image::guess_format(bytes) {
        Ok(image::ImageFormat::Jpeg) => "image/jpeg",
        Ok(image::ImageFormat::WebP) => "image/webp",
        Ok(image::ImageFormat::Gif) => "image/gif",
        Ok(image::ImageFormat::Bmp) => "image/bmp",
        Ok(image::ImageFormat::Tiff) => "image/tiff",
        _ => "image/png",
    }
}
