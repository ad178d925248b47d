//! Footnote extraction from recognized text.
//!
//! Equipment schedules usually end with numbered notes (`1) Provide VFD`,
//! `2) Coordinate with ...`). The remote model reports these itself; on the
//! local path they are recovered from the raw text so both providers fill
//! [`Notes`] the same way.

use crate::output::Notes;
use once_cell::sync::Lazy;
use regex::Regex;

static RE_NOTE_START: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^[ \t]*(\d{1,2})\)[ \t]*").unwrap());

static RE_WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Collect numbered notes. A note runs until the next note marker or the end.
pub fn extract_notes(text: &str) -> Notes {
    let starts: Vec<(usize, usize)> = RE_NOTE_START
        .find_iter(text)
        .map(|m| (m.start(), m.end()))
        .collect();

    let entries = starts
        .iter()
        .enumerate()
        .filter_map(|(i, &(start, body_start))| {
            let end = starts.get(i + 1).map_or(text.len(), |&(next, _)| next);
            let body = RE_WHITESPACE.replace_all(text[body_start..end].trim(), " ");
            if body.is_empty() {
                return None;
            }
            let marker = text[start..body_start].trim();
            Some(format!("{marker} {body}"))
        })
        .collect();

    Notes::from_entries(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_numbered_notes() {
        let text = "TAG CFM\nAHU-1 500\n1) Provide VFD.\n2) Coordinate with\n   electrical.\n";
        let notes = extract_notes(text);
        assert!(notes.has_notes);
        assert_eq!(notes.count, 2);
        assert_eq!(notes.entries[0], "1) Provide VFD.");
        assert_eq!(notes.entries[1], "2) Coordinate with electrical.");
    }

    #[test]
    fn no_notes_in_plain_table_text() {
        let notes = extract_notes("TAG CFM HP\nEF-1 200 0.5\nEF-2 350 1.0");
        assert!(!notes.has_notes);
        assert_eq!(notes.count, 0);
        assert!(notes.entries.is_empty());
    }

    #[test]
    fn empty_marker_skipped() {
        let notes = extract_notes("1)\n2) Real note");
        assert_eq!(notes.entries, vec!["2) Real note".to_string()]);
    }
}
