//! [`Recognizer`] backed by the `tesseract` command-line tool.
//!
//! The image is piped to `tesseract stdin stdout tsv`, and the word-level
//! TSV rows (level 5) become [`Fragment`]s. The child process is killed if
//! the future is dropped, so cancelling an extraction does not leave an OCR
//! process running.

use super::local::{Recognition, Recognizer};
use crate::config::EngineConfig;
use crate::error::ExtractionError;
use crate::output::{BoundingBox, Fragment};
use crate::pipeline::payload::ImagePayload;
use async_trait::async_trait;
use image::DynamicImage;
use std::io::Cursor;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

/// TSV level of a single word.
const TSV_WORD_LEVEL: u32 = 5;
/// Columns in a tesseract TSV row.
const TSV_MIN_FIELDS: usize = 12;

/// Runs the tesseract binary as a subprocess.
#[derive(Debug, Clone)]
pub struct TesseractRecognizer {
    binary: String,
    language: String,
    psm: u8,
    preprocess: bool,
}

impl TesseractRecognizer {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            language: "eng".into(),
            psm: 6,
            preprocess: true,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            binary: config.tesseract_path.clone(),
            language: config.language.clone(),
            psm: config.psm,
            preprocess: config.preprocess,
        }
    }

    /// Image bytes to feed tesseract: enhanced PNG when possible, else the original.
    fn prepare(&self, image: &ImagePayload) -> Vec<u8> {
        if !self.preprocess {
            return image.bytes().to_vec();
        }
        match enhance(image.bytes()) {
            Ok(png) => png,
            Err(e) => {
                warn!("Image preprocessing skipped: {}", e);
                image.bytes().to_vec()
            }
        }
    }
}

#[async_trait]
impl Recognizer for TesseractRecognizer {
    fn name(&self) -> &str {
        "tesseract"
    }

    fn is_available(&self) -> bool {
        which::which(&self.binary).is_ok()
    }

    async fn recognize(&self, image: &ImagePayload) -> Result<Recognition, ExtractionError> {
        let input = self.prepare(image);

        let mut child = Command::new(&self.binary)
            .arg("stdin")
            .arg("stdout")
            .arg("-l")
            .arg(&self.language)
            .arg("--psm")
            .arg(self.psm.to_string())
            .arg("tsv")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ExtractionError::RecognitionFailed {
                detail: format!("failed to execute {}: {}", self.binary, e),
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(&input)
                .await
                .map_err(|e| ExtractionError::RecognitionFailed {
                    detail: format!("failed to write image to {}: {}", self.binary, e),
                })?;
            // Dropping stdin closes the pipe so tesseract sees EOF.
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| ExtractionError::RecognitionFailed {
                detail: format!("failed to wait for {}: {}", self.binary, e),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ExtractionError::RecognitionFailed {
                detail: format!("{} exited with {}: {}", self.binary, output.status, stderr.trim()),
            });
        }

        let tsv = String::from_utf8_lossy(&output.stdout);
        let recognition = parse_tsv(&tsv);
        debug!(
            "tesseract recognized {} words, mean confidence {:.1}",
            recognition.fragments.len(),
            recognition.confidence
        );
        Ok(recognition)
    }
}

/// Parse tesseract TSV output into fragments, aggregate confidence and text.
///
/// Malformed lines and non-word levels are skipped; words with negative
/// confidence (tesseract's "no estimate") count as 0.
pub fn parse_tsv(tsv: &str) -> Recognition {
    let mut fragments = Vec::new();
    let mut lines: Vec<((u32, u32, u32, u32), Vec<String>)> = Vec::new();

    for line in tsv.lines().skip(1) {
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < TSV_MIN_FIELDS {
            continue;
        }
        if fields[0].trim().parse::<u32>().ok() != Some(TSV_WORD_LEVEL) {
            continue;
        }
        let text = fields[11].trim();
        if text.is_empty() {
            continue;
        }

        let num = |i: usize| fields[i].trim().parse::<f64>().unwrap_or(0.0);
        let id = |i: usize| fields[i].trim().parse::<u32>().unwrap_or(0);
        let (left, top, width, height) = (num(6), num(7), num(8), num(9));
        let confidence = num(10).max(0.0);

        fragments.push(Fragment::new(
            text,
            confidence,
            BoundingBox::new(left, top, left + width, top + height),
        ));

        let key = (id(1), id(2), id(3), id(4));
        match lines.last_mut() {
            Some((k, words)) if *k == key => words.push(text.to_string()),
            _ => lines.push((key, vec![text.to_string()])),
        }
    }

    let confidence = if fragments.is_empty() {
        0.0
    } else {
        fragments.iter().map(|f| f.confidence).sum::<f64>() / fragments.len() as f64
    };
    let text = lines
        .into_iter()
        .map(|(_, words)| words.join(" "))
        .collect::<Vec<_>>()
        .join("\n");

    Recognition {
        fragments,
        confidence,
        text,
    }
}

/// Grayscale and stretch contrast to the full 0–255 range, re-encoded as PNG.
fn enhance(bytes: &[u8]) -> Result<Vec<u8>, image::ImageError> {
    let mut gray = image::load_from_memory(bytes)?.into_luma8();

    let (min, max) = gray
        .pixels()
        .fold((u8::MAX, u8::MIN), |(lo, hi), p| (lo.min(p.0[0]), hi.max(p.0[0])));
    if max > min {
        let range = f32::from(max - min);
        for p in gray.pixels_mut() {
            p.0[0] = ((f32::from(p.0[0] - min) / range) * 255.0).round() as u8;
        }
    }

    let mut buf = Vec::new();
    DynamicImage::ImageLuma8(gray).write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;
    Ok(buf)
}
