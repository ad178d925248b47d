//! Configuration for table extraction.
//!
//! Every tunable lives in [`EngineConfig`], built via its
//! [`EngineConfigBuilder`]. The clustering tolerances and the confidence
//! threshold are resolution-dependent tuning values: the defaults suit a
//! region captured at roughly 150 DPI, and callers scanning at other
//! resolutions should scale them.

use crate::error::ExtractionError;
use crate::pipeline::cluster::ClusterOptions;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default decoded-image limit: 20 MiB, the upload ceiling of common vision APIs.
pub const DEFAULT_MAX_PAYLOAD_BYTES: usize = 20 * 1024 * 1024;

/// Default OpenAI-compatible endpoint.
pub const DEFAULT_API_BASE_URL: &str = "https://api.openai.com/v1";

/// Default remote vision model.
pub const DEFAULT_MODEL: &str = "gpt-4o";

/// Configuration for a [`crate::engine::TableExtractor`].
///
/// # Example
/// ```rust
/// use table_ocr::EngineConfig;
///
/// let config = EngineConfig::builder()
///     .row_tolerance(8.0)
///     .column_tolerance(25.0)
///     .min_confidence(50.0)
///     .timeout_secs(45)
///     .build()
///     .unwrap();
/// assert_eq!(config.timeout_secs, 45);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Max vertical distance (px) between a fragment's top edge and a row anchor. Default: 10.
    pub row_tolerance: f64,

    /// Max horizontal distance (px) between a fragment's left edge and a column anchor. Default: 20.
    ///
    /// Wider than the row tolerance because cell text is rarely left-aligned
    /// to the pixel, while baselines within a row are.
    pub column_tolerance: f64,

    /// Fragments below this recognizer confidence (0–100) are discarded. Default: 60.
    pub min_confidence: f64,

    /// Largest accepted decoded image, in bytes. Default: 20 MiB.
    pub max_payload_bytes: usize,

    /// Upper bound on a single extraction, in seconds. Default: 30.
    ///
    /// Enforced independently of [`crate::engine::TableExtractor::cancel`];
    /// expiry yields the same `Cancelled` error kind.
    pub timeout_secs: u64,

    /// Remote vision model identifier. Default: `gpt-4o`.
    pub model: String,

    /// Base URL of the OpenAI-compatible API. Default: `https://api.openai.com/v1`.
    pub api_base_url: String,

    /// Sampling temperature for the remote call. Default: 0.1.
    ///
    /// Transcription wants the model faithful to the pixels, not creative.
    pub temperature: f32,

    /// Maximum tokens the remote model may generate. Default: 4096.
    pub max_tokens: u32,

    /// Path or name of the tesseract binary. Default: `tesseract`.
    pub tesseract_path: String,

    /// Tesseract language code(s), e.g. `eng` or `eng+deu`. Default: `eng`.
    pub language: String,

    /// Tesseract page segmentation mode. Default: 6 (single uniform block).
    pub psm: u8,

    /// Grayscale + contrast-stretch the image before local recognition. Default: true.
    pub preprocess: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            row_tolerance: 10.0,
            column_tolerance: 20.0,
            min_confidence: 60.0,
            max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
            timeout_secs: 30,
            model: DEFAULT_MODEL.to_string(),
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            temperature: 0.1,
            max_tokens: 4096,
            tesseract_path: "tesseract".to_string(),
            language: "eng".to_string(),
            psm: 6,
            preprocess: true,
        }
    }
}

impl EngineConfig {
    /// Create a new builder for `EngineConfig`.
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder {
            config: Self::default(),
        }
    }

    /// The extraction timeout as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Clustering parameters derived from this config.
    pub fn cluster_options(&self) -> ClusterOptions {
        ClusterOptions {
            row_tolerance: self.row_tolerance,
            column_tolerance: self.column_tolerance,
            min_confidence: self.min_confidence,
        }
    }
}

/// Builder for [`EngineConfig`].
#[derive(Debug)]
pub struct EngineConfigBuilder {
    config: EngineConfig,
}

impl EngineConfigBuilder {
    pub fn row_tolerance(mut self, px: f64) -> Self {
        self.config.row_tolerance = px;
        self
    }

    pub fn column_tolerance(mut self, px: f64) -> Self {
        self.config.column_tolerance = px;
        self
    }

    pub fn min_confidence(mut self, c: f64) -> Self {
        self.config.min_confidence = c.clamp(0.0, 100.0);
        self
    }

    pub fn max_payload_bytes(mut self, n: usize) -> Self {
        self.config.max_payload_bytes = n;
        self
    }

    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.config.timeout_secs = secs;
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn api_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.api_base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: u32) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn tesseract_path(mut self, path: impl Into<String>) -> Self {
        self.config.tesseract_path = path.into();
        self
    }

    pub fn language(mut self, lang: impl Into<String>) -> Self {
        self.config.language = lang.into();
        self
    }

    pub fn psm(mut self, psm: u8) -> Self {
        self.config.psm = psm.min(13);
        self
    }

    pub fn preprocess(mut self, v: bool) -> Self {
        self.config.preprocess = v;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<EngineConfig, ExtractionError> {
        let c = &self.config;
        if !(c.row_tolerance > 0.0) || !(c.column_tolerance > 0.0) {
            return Err(ExtractionError::InvalidConfig(format!(
                "tolerances must be positive, got row={} column={}",
                c.row_tolerance, c.column_tolerance
            )));
        }
        if c.timeout_secs == 0 {
            return Err(ExtractionError::InvalidConfig(
                "timeout must be at least 1 second".into(),
            ));
        }
        if c.max_payload_bytes == 0 {
            return Err(ExtractionError::InvalidConfig(
                "max payload size must be non-zero".into(),
            ));
        }
        if c.model.trim().is_empty() {
            return Err(ExtractionError::InvalidConfig("model must not be empty".into()));
        }
        Ok(self.config)
    }
}
