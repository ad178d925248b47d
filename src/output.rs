//! Data model shared by every provider.
//!
//! [`ExtractionResult`] is the only type the orchestrator hands back. Both
//! the remote vision path and the local geometric path build exactly this
//! shape, so consumers cannot tell backends apart except through
//! [`ExtractionResult::provider`].
//!
//! Everything here is created and consumed inside one extraction call;
//! nothing is cached or mutated after construction.

use crate::error::{ErrorKind, ExtractionError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Axis-aligned pixel rectangle, `(x0, y0)` top-left and `(x1, y1)` bottom-right.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
}

impl BoundingBox {
    pub fn new(x0: f64, y0: f64, x1: f64, y1: f64) -> Self {
        Self { x0, y0, x1, y1 }
    }

    pub fn width(&self) -> f64 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f64 {
        self.y1 - self.y0
    }
}

/// One recognized text span from the local recognizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fragment {
    pub text: String,
    /// Recognizer confidence, 0–100.
    pub confidence: f64,
    #[serde(rename = "box")]
    pub bbox: BoundingBox,
}

impl Fragment {
    /// Build a fragment, clamping `confidence` into `[0, 100]`.
    pub fn new(text: impl Into<String>, confidence: f64, bbox: BoundingBox) -> Self {
        Self {
            text: text.into(),
            confidence: clamp_confidence(confidence),
            bbox,
        }
    }

    /// Top edge, the row anchor coordinate.
    pub fn top(&self) -> f64 {
        self.bbox.y0
    }

    /// Left edge, the column anchor coordinate.
    pub fn left(&self) -> f64 {
        self.bbox.x0
    }
}

/// Fragments sharing a vertical anchor. Never empty.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub anchor_y: f64,
    pub fragments: Vec<Fragment>,
}

/// Fragments sharing a horizontal anchor. Never empty.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub anchor_x: f64,
    pub fragments: Vec<Fragment>,
}

/// Intersection of one row and one column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cell {
    pub text: String,
    pub confidence: f64,
    pub is_empty: bool,
    pub fragment_count: usize,
}

impl Cell {
    /// A cell with no content.
    pub fn empty() -> Self {
        Self {
            text: String::new(),
            confidence: 0.0,
            is_empty: true,
            fragment_count: 0,
        }
    }

    /// A cell carrying text that did not come from fragments (remote path).
    pub fn from_text(text: impl Into<String>, confidence: f64) -> Self {
        let text = text.into();
        let is_empty = text.trim().is_empty();
        Self {
            text,
            confidence: if is_empty { 0.0 } else { clamp_confidence(confidence) },
            is_empty,
            fragment_count: 0,
        }
    }
}

/// The inferred grid, or the reason no grid qualified.
///
/// When `is_table` is true, `cells` is exactly `row_count × column_count`.
/// When false, `cells` is empty and `reason` says why.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableStructure {
    pub is_table: bool,
    pub row_count: usize,
    pub column_count: usize,
    pub cells: Vec<Vec<Cell>>,
    /// Arithmetic mean of all cell confidences (0 when not a table).
    pub confidence: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl TableStructure {
    /// A negative detection carrying a human-readable reason.
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self {
            is_table: false,
            row_count: 0,
            column_count: 0,
            cells: Vec::new(),
            confidence: 0.0,
            reason: Some(reason.into()),
        }
    }

    /// A detected table. The caller guarantees the grid is rectangular.
    pub fn table(cells: Vec<Vec<Cell>>) -> Self {
        let row_count = cells.len();
        let column_count = cells.first().map_or(0, Vec::len);
        debug_assert!(cells.iter().all(|r| r.len() == column_count));
        let total = row_count * column_count;
        let confidence = if total == 0 {
            0.0
        } else {
            cells.iter().flatten().map(|c| c.confidence).sum::<f64>() / total as f64
        };
        Self {
            is_table: true,
            row_count,
            column_count,
            cells,
            confidence: clamp_confidence(confidence),
            reason: None,
        }
    }

    /// Cell texts as a plain 2-D string grid.
    pub fn texts(&self) -> Vec<Vec<String>> {
        self.cells
            .iter()
            .map(|row| row.iter().map(|c| c.text.clone()).collect())
            .collect()
    }
}

/// Footnotes found alongside the table, e.g. `1) Provide isolation valves`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notes {
    #[serde(default)]
    pub has_notes: bool,
    #[serde(default)]
    pub count: usize,
    #[serde(default)]
    pub entries: Vec<String>,
}

impl Notes {
    pub fn from_entries(entries: Vec<String>) -> Self {
        Self {
            has_notes: !entries.is_empty(),
            count: entries.len(),
            entries,
        }
    }
}

/// Provider-agnostic outcome of one extraction.
///
/// Invariants: `success == false` implies `table == None` and `error` is set;
/// `confidence` lies in `[0, 100]`; `markdown` is never empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionResult {
    pub success: bool,
    /// Provider id (`"remote"`, `"local"`), or `"none"` if selection failed.
    pub provider: String,
    pub confidence: f64,
    pub raw_text: String,
    pub table: Option<TableStructure>,
    pub markdown: String,
    pub notes: Notes,
    /// Debug statistics: durations, fragment counts, model, provider metadata.
    pub metadata: Map<String, Value>,
    pub error: Option<String>,
    pub error_kind: Option<ErrorKind>,
}

impl ExtractionResult {
    /// A failed extraction. Markdown carries the error so it can be shown as-is.
    pub fn failure(provider: impl Into<String>, err: &ExtractionError) -> Self {
        let message = err.to_string();
        Self {
            success: false,
            provider: provider.into(),
            confidence: 0.0,
            raw_text: String::new(),
            table: None,
            markdown: format!("**Extraction failed:** {}", message.replace('\n', " ")),
            notes: Notes::default(),
            metadata: Map::new(),
            error: Some(message),
            error_kind: Some(err.kind()),
        }
    }

    /// True when a qualifying table was found.
    pub fn has_table(&self) -> bool {
        self.table.as_ref().is_some_and(|t| t.is_table)
    }
}

/// Clamp a confidence into `[0, 100]`, mapping NaN to 0.
pub fn clamp_confidence(c: f64) -> f64 {
    if c.is_nan() {
        0.0
    } else {
        c.clamp(0.0, 100.0)
    }
}
