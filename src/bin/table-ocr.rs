//! CLI binary for table-ocr.
//!
//! A thin shim over the library crate: reads an image file, maps flags to
//! `EngineConfig` / `ExtractOptions`, and prints the Markdown (or the full
//! result as JSON). Ctrl-C cancels the in-flight extraction.

use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use clap::Parser;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use table_ocr::{EngineConfig, ExtractOptions, ProviderId, TableExtractor};
use tracing_subscriber::EnvFilter;

const AFTER_HELP: &str = r#"EXAMPLES:
  # Auto-select: remote model when OPENAI_API_KEY is set, else local tesseract
  table-ocr schedule.png

  # Force the local recognizer with looser column grouping
  table-ocr --provider local --column-tolerance 30 schedule.png

  # Full structured result
  table-ocr --json schedule.png > schedule.json

  # Any OpenAI-compatible endpoint
  TABLE_OCR_API_BASE=http://localhost:4000/v1 TABLE_OCR_MODEL=llava table-ocr scan.jpg
"#;

/// Extract a table from a cropped scan region and print it as Markdown.
#[derive(Parser, Debug)]
#[command(
    name = "table-ocr",
    version,
    about = "Extract tables from scanned image regions as Markdown",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Image file (PNG, JPEG, WebP, ...).
    input: PathBuf,

    /// Force a provider: remote or local.
    #[arg(short, long, env = "TABLE_OCR_PROVIDER")]
    provider: Option<ProviderId>,

    /// API key for the remote vision model.
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Remote vision model ID.
    #[arg(long, env = "TABLE_OCR_MODEL")]
    model: Option<String>,

    /// Base URL of an OpenAI-compatible API.
    #[arg(long, env = "TABLE_OCR_API_BASE")]
    api_base: Option<String>,

    /// Row grouping tolerance in pixels.
    #[arg(long, default_value_t = 10.0)]
    row_tolerance: f64,

    /// Column grouping tolerance in pixels.
    #[arg(long, default_value_t = 20.0)]
    column_tolerance: f64,

    /// Minimum word confidence (0-100) for the local recognizer.
    #[arg(long, default_value_t = 60.0)]
    min_confidence: f64,

    /// Overall timeout in seconds.
    #[arg(long, env = "TABLE_OCR_TIMEOUT", default_value_t = 30)]
    timeout: u64,

    /// Tesseract binary.
    #[arg(long, env = "TESSERACT_PATH", default_value = "tesseract")]
    tesseract: String,

    /// Skip grayscale/contrast preprocessing before local recognition.
    #[arg(long)]
    no_preprocess: bool,

    /// Print the full result as JSON instead of Markdown.
    #[arg(long)]
    json: bool,

    /// Debug logging.
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let bytes = tokio::fs::read(&cli.input)
        .await
        .with_context(|| format!("Failed to read image {:?}", cli.input))?;
    let image = STANDARD.encode(&bytes);

    let config = build_config(&cli)?;
    let extractor = Arc::new(TableExtractor::new(config).context("Failed to set up extractor")?);

    let watcher = {
        let extractor = Arc::clone(&extractor);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                extractor.cancel();
            }
        })
    };

    let options = ExtractOptions {
        provider: cli.provider,
        credential: cli.api_key.clone(),
    };
    let result = extractor.extract_table(&image, &options).await;
    watcher.abort();

    let stdout = io::stdout();
    let mut handle = stdout.lock();
    if cli.json {
        let json = serde_json::to_string_pretty(&result).context("Failed to serialise result")?;
        writeln!(handle, "{json}").context("Failed to write to stdout")?;
    } else {
        handle
            .write_all(result.markdown.as_bytes())
            .context("Failed to write to stdout")?;
        if !result.markdown.ends_with('\n') {
            handle.write_all(b"\n").ok();
        }
    }
    drop(handle);

    if !result.success {
        eprintln!(
            "table-ocr: {}",
            result.error.as_deref().unwrap_or("extraction failed")
        );
        std::process::exit(1);
    }
    Ok(())
}

/// Map CLI args to `EngineConfig`.
fn build_config(cli: &Cli) -> Result<EngineConfig> {
    let mut builder = EngineConfig::builder()
        .row_tolerance(cli.row_tolerance)
        .column_tolerance(cli.column_tolerance)
        .min_confidence(cli.min_confidence)
        .timeout_secs(cli.timeout)
        .tesseract_path(&cli.tesseract)
        .preprocess(!cli.no_preprocess);
    if let Some(ref model) = cli.model {
        builder = builder.model(model);
    }
    if let Some(ref base) = cli.api_base {
        builder = builder.api_base_url(base);
    }
    builder.build().context("Invalid configuration")
}
