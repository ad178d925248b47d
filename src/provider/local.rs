//! Local geometric provider: recognizer fragments → clustering → markdown.
//!
//! The recognizer returns only words and boxes; all table structure is
//! inferred here by [`crate::pipeline::cluster`]. No credential and no
//! network are involved.

use super::{ProviderDescriptor, ProviderId, TableProvider};
use crate::error::ExtractionError;
use crate::output::{clamp_confidence, ExtractionResult, Fragment};
use crate::pipeline::cluster::{self, ClusterOptions};
use crate::pipeline::payload::ImagePayload;
use crate::pipeline::{notes, render};
use async_trait::async_trait;
use serde_json::{json, Map};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Default priority: behind the remote provider.
pub const LOCAL_PRIORITY: i32 = 50;

/// Output of one recognizer run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Recognition {
    pub fragments: Vec<Fragment>,
    /// Aggregate confidence over all recognized words, 0–100.
    pub confidence: f64,
    /// Full recognized text in reading order.
    pub text: String,
}

/// A word-level OCR engine.
#[async_trait]
pub trait Recognizer: Send + Sync {
    /// Short name reported in result metadata.
    fn name(&self) -> &str;

    /// Whether the engine can run in this environment right now.
    fn is_available(&self) -> bool;

    /// Recognize words and their boxes in `image`.
    async fn recognize(&self, image: &ImagePayload) -> Result<Recognition, ExtractionError>;
}

/// Provider backed by a [`Recognizer`] and bounding-box clustering.
pub struct LocalProvider {
    recognizer: Arc<dyn Recognizer>,
    options: ClusterOptions,
    priority: i32,
}

impl LocalProvider {
    pub fn new(recognizer: Arc<dyn Recognizer>, options: ClusterOptions) -> Self {
        Self {
            recognizer,
            options,
            priority: LOCAL_PRIORITY,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Turn a finished recognition into the provider-agnostic result.
    pub fn assemble(&self, recognition: Recognition, started: Instant) -> ExtractionResult {
        let total = recognition.fragments.len();
        let kept = recognition
            .fragments
            .iter()
            .filter(|f| f.confidence >= self.options.min_confidence)
            .count();

        let table = cluster::build_table(&recognition.fragments, &self.options);
        let markdown = render::render(&table, Some(recognition.text.as_str()));
        let confidence = if table.is_table {
            table.confidence
        } else {
            clamp_confidence(recognition.confidence)
        };

        info!(
            "Local extraction: {}/{} fragments kept, table={} ({}×{})",
            kept, total, table.is_table, table.row_count, table.column_count
        );

        let mut metadata = Map::new();
        metadata.insert("recognizer".into(), json!(self.recognizer.name()));
        metadata.insert("totalFragments".into(), json!(total));
        metadata.insert("keptFragments".into(), json!(kept));
        metadata.insert("recognizerConfidence".into(), json!(recognition.confidence));
        metadata.insert("durationMs".into(), json!(started.elapsed().as_millis() as u64));

        ExtractionResult {
            success: true,
            provider: ProviderId::Local.as_str().to_string(),
            confidence,
            notes: notes::extract_notes(&recognition.text),
            raw_text: recognition.text,
            table: Some(table),
            markdown,
            metadata,
            error: None,
            error_kind: None,
        }
    }
}

#[async_trait]
impl TableProvider for LocalProvider {
    fn descriptor(&self) -> ProviderDescriptor {
        ProviderDescriptor {
            id: ProviderId::Local,
            priority: self.priority,
            requires_credential: false,
        }
    }

    fn is_available(&self) -> bool {
        self.recognizer.is_available()
    }

    async fn extract(
        &self,
        image: &ImagePayload,
        _credential: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<ExtractionResult, ExtractionError> {
        let started = Instant::now();
        debug!("Running recognizer '{}'", self.recognizer.name());

        let recognition = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(ExtractionError::Cancelled {
                    reason: "cancelled during local recognition".into(),
                });
            }
            r = self.recognizer.recognize(image) => r?,
        };

        Ok(self.assemble(recognition, started))
    }
}
