//! Error types for the table-ocr library.
//!
//! Every failure the engine can hit is one variant of [`ExtractionError`].
//! None of them escape [`crate::engine::TableExtractor::extract_table`]:
//! the orchestrator folds them into an [`crate::output::ExtractionResult`]
//! with `success = false`, so callers can always render `result.markdown`
//! or `result.error` without matching on a `Result`.
//!
//! "No table detected" is deliberately *not* an error. Clustering or the
//! remote model ran fine and simply found nothing that qualifies; that is a
//! `success = true` result whose markdown explains why.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// All errors produced while extracting a table from an image region.
#[derive(Debug, Clone, Error)]
pub enum ExtractionError {
    // ── Selection errors ──────────────────────────────────────────────────
    /// No registered provider is usable in the current environment.
    #[error("No OCR provider is available in this environment.\nInstall tesseract or configure the remote vision API.")]
    UnsupportedEnvironment,

    /// The chosen (or only usable) provider needs a credential that was not supplied.
    #[error("Provider '{provider}' requires an API key but none was supplied")]
    MissingCredential { provider: String },

    /// The caller named a provider that is not registered or not usable.
    #[error("Provider '{provider}' is not available")]
    ProviderUnavailable { provider: String },

    // ── Concurrency errors ────────────────────────────────────────────────
    /// Another extraction is already in flight on this extractor.
    #[error("Another table extraction is already in progress")]
    ConcurrentRequest,

    /// The operation was aborted through the cancellation token or by the timeout.
    #[error("Extraction cancelled: {reason}")]
    Cancelled { reason: String },

    // ── Payload errors ────────────────────────────────────────────────────
    /// Decoded image is larger than the configured limit.
    #[error("Image is too large: {size} bytes (limit {limit} bytes)")]
    PayloadTooLarge { size: usize, limit: usize },

    /// Image payload is empty or is not valid base64.
    #[error("Image payload is not valid base64: {detail}")]
    InvalidEncoding { detail: String },

    // ── Provider errors ───────────────────────────────────────────────────
    /// Transport failure or non-success HTTP status from the remote API.
    #[error("Remote API request failed: {message}")]
    NetworkFailure { message: String },

    /// The remote reply failed JSON parsing or schema validation.
    #[error("Malformed response from remote API: {detail}")]
    MalformedResponse { detail: String },

    /// The local recognizer ran but did not produce usable output.
    #[error("Local recognition failed: {detail}")]
    RecognitionFailed { detail: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl ExtractionError {
    /// Shorthand for a [`ExtractionError::MalformedResponse`] naming a field.
    pub fn malformed(detail: impl Into<String>) -> Self {
        Self::MalformedResponse {
            detail: detail.into(),
        }
    }

    /// The discriminant of this error, without its payload.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnsupportedEnvironment => ErrorKind::UnsupportedEnvironment,
            Self::MissingCredential { .. } => ErrorKind::MissingCredential,
            Self::ProviderUnavailable { .. } => ErrorKind::ProviderUnavailable,
            Self::ConcurrentRequest => ErrorKind::ConcurrentRequest,
            Self::Cancelled { .. } => ErrorKind::Cancelled,
            Self::PayloadTooLarge { .. } => ErrorKind::PayloadTooLarge,
            Self::InvalidEncoding { .. } => ErrorKind::InvalidEncoding,
            Self::NetworkFailure { .. } => ErrorKind::NetworkFailure,
            Self::MalformedResponse { .. } => ErrorKind::MalformedResponse,
            Self::RecognitionFailed { .. } => ErrorKind::RecognitionFailed,
            Self::InvalidConfig(_) => ErrorKind::InvalidConfig,
        }
    }
}

/// Payload-free discriminant of [`ExtractionError`].
///
/// Stored on [`crate::output::ExtractionResult::error_kind`] so callers can
/// branch on the failure class without parsing the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    UnsupportedEnvironment,
    MissingCredential,
    ProviderUnavailable,
    ConcurrentRequest,
    Cancelled,
    PayloadTooLarge,
    InvalidEncoding,
    NetworkFailure,
    MalformedResponse,
    RecognitionFailed,
    InvalidConfig,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_too_large_reports_size() {
        let e = ExtractionError::PayloadTooLarge {
            size: 25_000_000,
            limit: 20_971_520,
        };
        let msg = e.to_string();
        assert!(msg.contains("25000000"), "got: {msg}");
        assert_eq!(e.kind(), ErrorKind::PayloadTooLarge);
    }

    #[test]
    fn malformed_names_field() {
        let e = ExtractionError::malformed("missing field 'markdown'");
        assert!(e.to_string().contains("markdown"));
        assert_eq!(e.kind(), ErrorKind::MalformedResponse);
    }

    #[test]
    fn missing_credential_display() {
        let e = ExtractionError::MissingCredential {
            provider: "remote".into(),
        };
        assert!(e.to_string().contains("remote"));
        assert!(e.to_string().contains("API key"));
    }

    #[test]
    fn kind_serialises_camel_case() {
        let json = serde_json::to_string(&ErrorKind::ConcurrentRequest).unwrap();
        assert_eq!(json, "\"concurrentRequest\"");
    }
}
