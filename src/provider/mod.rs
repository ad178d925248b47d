//! Interchangeable OCR backends behind one extraction contract.
//!
//! | Provider | Backend | Credential | Default priority |
//! |----------|---------|------------|------------------|
//! | [`remote::RemoteProvider`] | OpenAI-compatible vision model | API key | 100 |
//! | [`local::LocalProvider`]   | geometric recognizer (tesseract) + clustering | none | 50 |
//!
//! Both implement [`TableProvider`] and return the same
//! [`ExtractionResult`] shape. The concrete capability each one needs (a
//! [`local::Recognizer`], a [`transport::VisionTransport`]) is injected at
//! construction, so tests and embedders can swap in their own.

pub mod local;
pub mod remote;
pub mod tesseract;
pub mod transport;

use crate::error::ExtractionError;
use crate::output::ExtractionResult;
use crate::pipeline::payload::ImagePayload;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tokio_util::sync::CancellationToken;

/// Identifier of a provider, as callers name it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderId {
    /// Remote vision-language API.
    Remote,
    /// Local geometric recognizer.
    Local,
}

impl ProviderId {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderId::Remote => "remote",
            ProviderId::Local => "local",
        }
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderId {
    type Err = ExtractionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "remote" => Ok(ProviderId::Remote),
            "local" => Ok(ProviderId::Local),
            other => Err(ExtractionError::ProviderUnavailable {
                provider: other.to_string(),
            }),
        }
    }
}

/// Static capability metadata for a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderDescriptor {
    pub id: ProviderId,
    /// Higher is preferred during automatic selection.
    pub priority: i32,
    pub requires_credential: bool,
}

/// One OCR backend.
#[async_trait]
pub trait TableProvider: Send + Sync {
    /// Static metadata used by the registry.
    fn descriptor(&self) -> ProviderDescriptor;

    /// Whether the backing capability is usable right now.
    ///
    /// Called on every selection; implementations must not cache a negative answer.
    fn is_available(&self) -> bool;

    /// Extract a table from `image`.
    ///
    /// `cancel` must be observed at every suspension point. A "no table"
    /// outcome is `Ok` with `success = true`.
    async fn extract(
        &self,
        image: &ImagePayload,
        credential: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<ExtractionResult, ExtractionError>;
}
