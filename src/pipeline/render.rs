//! Markdown rendering of a [`TableStructure`].
//!
//! Output is a GFM pipe table: header row (row 0), a `---` separator per
//! column, the remaining rows, then a one-line summary with the overall
//! confidence and the grid dimensions. Rendering is a pure function, so the
//! same structure always yields byte-identical markdown.
//!
//! A negative detection never renders as an empty string: it becomes a short
//! notice with the reason and whatever raw text the recognizer produced.

use crate::output::TableStructure;

/// Render `table` as markdown.
///
/// `raw_text` is only used when `table` is not a table, so the caller still
/// gets the recognized text to look at.
pub fn render(table: &TableStructure, raw_text: Option<&str>) -> String {
    if !table.is_table {
        return render_rejection(table.reason.as_deref(), raw_text);
    }

    let mut out = String::new();
    for (i, row) in table.cells.iter().enumerate() {
        push_row(&mut out, row.iter().map(|c| c.text.as_str()));
        if i == 0 {
            push_row(&mut out, std::iter::repeat("---").take(table.column_count));
        }
    }
    out.push('\n');
    out.push_str(&format!(
        "*Confidence: {:.1}% · {} rows × {} columns*\n",
        table.confidence, table.row_count, table.column_count
    ));
    out
}

fn render_rejection(reason: Option<&str>, raw_text: Option<&str>) -> String {
    let mut out = format!(
        "**No table detected:** {}\n",
        reason.unwrap_or("table structure could not be determined")
    );
    if let Some(text) = raw_text.map(str::trim).filter(|t| !t.is_empty()) {
        out.push_str("\nRecognized text:\n\n```text\n");
        out.push_str(text);
        out.push_str("\n```\n");
    }
    out
}

fn push_row<'a>(out: &mut String, cells: impl Iterator<Item = &'a str>) {
    out.push('|');
    for cell in cells {
        out.push(' ');
        out.push_str(&escape_cell(cell));
        out.push_str(" |");
    }
    out.push('\n');
}

/// Keep cell text from breaking the grid: escape pipes, flatten newlines.
fn escape_cell(text: &str) -> String {
    text.trim()
        .replace('|', "\\|")
        .replace("\r\n", " ")
        .replace(['\n', '\r'], " ")
}
