//! Orchestration: one public entry point over the provider registry.
//!
//! [`TableExtractor::extract_table`] runs the fixed sequence
//!
//! ```text
//! claim slot ─▶ resolve provider ─▶ decode payload ─▶ provider.extract ─▶ result
//!     │                                                    │
//!     └── ConcurrentRequest                                 └── raced against cancel() and the timeout
//! ```
//!
//! and never returns an `Err`: every failure is folded into an
//! [`ExtractionResult`] with `success = false` and a populated `error`.

use crate::config::EngineConfig;
use crate::error::ExtractionError;
use crate::output::ExtractionResult;
use crate::pipeline::payload::ImagePayload;
use crate::provider::ProviderId;
use crate::registry::ProviderRegistry;
use std::sync::{Mutex, MutexGuard};
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Per-call choices.
#[derive(Debug, Clone, Default)]
pub struct ExtractOptions {
    /// Force a provider instead of automatic selection.
    pub provider: Option<ProviderId>,
    /// API key for providers that need one.
    pub credential: Option<String>,
}

impl ExtractOptions {
    pub fn with_provider(mut self, provider: ProviderId) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn with_credential(mut self, credential: impl Into<String>) -> Self {
        self.credential = Some(credential.into());
        self
    }
}

/// Single-flight table extractor.
///
/// At most one extraction runs per instance; a second concurrent call fails
/// fast with `ConcurrentRequest` and leaves the first untouched.
pub struct TableExtractor {
    registry: ProviderRegistry,
    config: EngineConfig,
    active: Mutex<Option<CancellationToken>>,
}

impl TableExtractor {
    /// Extractor over the default providers (remote HTTP + tesseract).
    pub fn new(config: EngineConfig) -> Result<Self, ExtractionError> {
        let registry = ProviderRegistry::with_defaults(&config)?;
        Ok(Self::with_registry(registry, config))
    }

    pub fn with_registry(registry: ProviderRegistry, config: EngineConfig) -> Self {
        Self {
            registry,
            config,
            active: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    /// Whether an extraction is currently in flight.
    pub fn is_busy(&self) -> bool {
        self.slot().is_some()
    }

    /// Abort the in-flight extraction, if any. Returns whether one was running.
    ///
    /// The aborted call settles with a `Cancelled` failure result.
    pub fn cancel(&self) -> bool {
        match self.slot().as_ref() {
            Some(token) => {
                info!("Cancelling in-flight extraction");
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Extract a table from a base64 image (a `data:` URI prefix is accepted).
    pub async fn extract_table(&self, image: &str, options: &ExtractOptions) -> ExtractionResult {
        let started = Instant::now();

        let guard = match InFlightGuard::claim(&self.active) {
            Ok(g) => g,
            Err(e) => {
                warn!("Rejected extraction: {}", e);
                return ExtractionResult::failure("none", &e);
            }
        };

        let credential = options.credential.as_deref();
        let provider = match self.registry.resolve(options.provider, credential) {
            Ok(p) => p,
            Err(e) => {
                warn!("Provider selection failed: {}", e);
                return ExtractionResult::failure("none", &e);
            }
        };
        let id = provider.descriptor().id;

        let payload = match ImagePayload::from_base64(image, self.config.max_payload_bytes) {
            Ok(p) => p,
            Err(e) => {
                warn!("Rejected image payload: {}", e);
                return ExtractionResult::failure(id.as_str(), &e);
            }
        };
        info!(
            "Extracting table with '{}' ({} bytes, {})",
            id,
            payload.len(),
            payload.mime_type()
        );

        let token = guard.token();
        let timeout = self.config.timeout();
        let outcome = tokio::select! {
            biased;
            _ = token.cancelled() => Err(ExtractionError::Cancelled {
                reason: "cancelled by caller".into(),
            }),
            r = tokio::time::timeout(timeout, provider.extract(&payload, credential, &token)) => {
                r.unwrap_or_else(|_| {
                    token.cancel();
                    Err(ExtractionError::Cancelled {
                        reason: format!("timed out after {}s", timeout.as_secs()),
                    })
                })
            }
        };

        match outcome {
            Ok(result) => {
                debug!(
                    "Extraction with '{}' finished in {:?} (table: {})",
                    id,
                    started.elapsed(),
                    result.has_table()
                );
                result
            }
            Err(e) => {
                warn!("Extraction with '{}' failed: {}", id, e);
                ExtractionResult::failure(id.as_str(), &e)
            }
        }
    }

    fn slot(&self) -> MutexGuard<'_, Option<CancellationToken>> {
        lock(&self.active)
    }
}

fn lock(m: &Mutex<Option<CancellationToken>>) -> MutexGuard<'_, Option<CancellationToken>> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Occupies the single in-flight slot; releasing it on drop covers every exit path.
struct InFlightGuard<'a> {
    slot: &'a Mutex<Option<CancellationToken>>,
    token: CancellationToken,
}

impl<'a> InFlightGuard<'a> {
    fn claim(slot: &'a Mutex<Option<CancellationToken>>) -> Result<Self, ExtractionError> {
        let mut active = lock(slot);
        if active.is_some() {
            return Err(ExtractionError::ConcurrentRequest);
        }
        let token = CancellationToken::new();
        *active = Some(token.clone());
        Ok(Self { slot, token })
    }

    fn token(&self) -> CancellationToken {
        self.token.clone()
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        *lock(self.slot) = None;
    }
}
