//! # table-ocr
//!
//! Extract structured tables from cropped regions of scanned documents
//! (equipment schedules, door and finish schedules on construction
//! drawings) and render them as Markdown.
//!
//! ## Providers
//!
//! Two interchangeable backends return the same [`ExtractionResult`]:
//!
//! - **remote**: a vision-language model behind an OpenAI-compatible API
//!   reads the image and answers with a strict JSON description of the
//!   table. Needs an API key.
//! - **local**: a word-level recognizer (tesseract) returns words with
//!   bounding boxes, and the table grid is inferred by clustering the boxes
//!   into rows and columns. Needs no credential and no network.
//!
//! ## Pipeline Overview
//!
//! ```text
//! base64 image
//!  │
//!  ├─ 1. Claim     single in-flight slot (else ConcurrentRequest)
//!  ├─ 2. Select    explicit provider, or highest-priority usable one
//!  ├─ 3. Decode    strip data-URI prefix, base64 → bytes, size limit
//!  ├─ 4. Extract   remote: prompt → JSON → validate
//!  │               local:  recognize → filter → rows × columns → cells
//!  ├─ 5. Render    pipe table + confidence footer (or "no table" note)
//!  └─ 6. Result    ExtractionResult, never an Err
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use table_ocr::{EngineConfig, ExtractOptions, TableExtractor};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let extractor = TableExtractor::new(EngineConfig::default())?;
//!     let image = std::fs::read_to_string("region.b64")?;
//!     let options = ExtractOptions::default()
//!         .with_credential(std::env::var("OPENAI_API_KEY").unwrap_or_default());
//!
//!     let result = extractor.extract_table(&image, &options).await;
//!     println!("{}", result.markdown);
//!     if let Some(err) = result.error {
//!         eprintln!("failed: {err}");
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `table-ocr` binary (clap + anyhow + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! table-ocr = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod engine;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod prompts;
pub mod provider;
pub mod registry;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{EngineConfig, EngineConfigBuilder};
pub use engine::{ExtractOptions, TableExtractor};
pub use error::{ErrorKind, ExtractionError};
pub use output::{BoundingBox, Cell, ExtractionResult, Fragment, Notes, TableStructure};
pub use provider::local::{LocalProvider, Recognition, Recognizer};
pub use provider::remote::RemoteProvider;
pub use provider::tesseract::TesseractRecognizer;
pub use provider::transport::{HttpTransport, VisionTransport};
pub use provider::{ProviderDescriptor, ProviderId, TableProvider};
pub use registry::ProviderRegistry;
