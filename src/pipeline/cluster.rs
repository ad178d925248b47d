//! Bounding-box clustering: flat OCR fragments → 2-D table of cells.
//!
//! Rows and columns are found independently by the same greedy single-pass
//! clustering over one coordinate:
//!
//! ```text
//! sort by coordinate ──▶ for each fragment:
//!                          first cluster whose anchor is within tolerance? ──▶ join it
//!                          otherwise                                      ──▶ new cluster anchored here
//! ```
//!
//! Rows cluster on the top edge (`y0`), columns on the left edge (`x0`).
//! A cluster's anchor is the coordinate of the fragment that opened it and
//! never moves; clusters are never re-merged. Cost is O(n·k) for k clusters,
//! fine for the handful of rows and columns a schedule table has.
//!
//! A grid is only declared a table when it has at least two rows *and* two
//! columns. Anything smaller is rejected with a reason rather than guessed at.

use crate::output::{Cell, Column, Fragment, Row, TableStructure};
use std::cmp::Ordering;
use tracing::debug;

/// Clustering parameters. Tolerances are in pixels and resolution-dependent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClusterOptions {
    /// Max `|y0 - anchor_y|` (exclusive) for a fragment to join a row.
    pub row_tolerance: f64,
    /// Max `|x0 - anchor_x|` (exclusive) for a fragment to join a column.
    pub column_tolerance: f64,
    /// Fragments below this confidence are discarded before clustering.
    pub min_confidence: f64,
}

impl Default for ClusterOptions {
    fn default() -> Self {
        Self {
            row_tolerance: 10.0,
            column_tolerance: 20.0,
            min_confidence: 60.0,
        }
    }
}

/// Reason given when no fragment survives the confidence filter.
pub const NO_CONFIDENT_TEXT: &str = "no high-confidence text";

/// Infer a table from recognized fragments.
///
/// The result is independent of the order of `fragments`: they are sorted
/// by a total key before clustering.
pub fn build_table(fragments: &[Fragment], options: &ClusterOptions) -> TableStructure {
    let kept = filter_confident(fragments, options.min_confidence);
    if kept.is_empty() {
        return TableStructure::rejected(NO_CONFIDENT_TEXT);
    }

    let (rows, row_of) = cluster_axis(&kept, Fragment::top, options.row_tolerance);
    let (columns, column_of) = cluster_axis(&kept, Fragment::left, options.column_tolerance);
    debug!(
        "Clustered {} fragments into {} rows × {} columns",
        kept.len(),
        rows.len(),
        columns.len()
    );

    if rows.len() < 2 || columns.len() < 2 {
        return TableStructure::rejected(format!(
            "found {} row(s) and {} column(s); a table needs at least 2 of each",
            rows.len(),
            columns.len()
        ));
    }

    // A fragment belongs to the one column it joined, even if another anchor is also in range.
    let mut grid: Vec<Vec<Vec<&Fragment>>> = vec![vec![Vec::new(); columns.len()]; rows.len()];
    for (i, fragment) in kept.iter().enumerate() {
        grid[row_of[i]][column_of[i]].push(fragment);
    }

    let cells = grid
        .into_iter()
        .map(|row| row.into_iter().map(materialize_cell).collect())
        .collect();

    TableStructure::table(cells)
}

/// Group fragments into rows by top edge.
pub fn cluster_rows(fragments: &[Fragment], tolerance: f64) -> Vec<Row> {
    let sorted = sorted_fragments(fragments);
    let (clusters, _) = cluster_axis(&sorted, Fragment::top, tolerance);
    clusters
        .into_iter()
        .map(|c| Row {
            anchor_y: c.anchor,
            fragments: c.members.into_iter().map(|i| sorted[i].clone()).collect(),
        })
        .collect()
}

/// Group fragments into columns by left edge.
pub fn cluster_columns(fragments: &[Fragment], tolerance: f64) -> Vec<Column> {
    let sorted = sorted_fragments(fragments);
    let (clusters, _) = cluster_axis(&sorted, Fragment::left, tolerance);
    clusters
        .into_iter()
        .map(|c| Column {
            anchor_x: c.anchor,
            fragments: c.members.into_iter().map(|i| sorted[i].clone()).collect(),
        })
        .collect()
}

/// Drop fragments below `min_confidence` and blank ones, then sort.
fn filter_confident(fragments: &[Fragment], min_confidence: f64) -> Vec<Fragment> {
    let kept: Vec<Fragment> = fragments
        .iter()
        .filter(|f| f.confidence >= min_confidence && !f.text.trim().is_empty())
        .cloned()
        .collect();
    sorted_fragments(&kept)
}

/// Total order: top, then left, then text.
fn sorted_fragments(fragments: &[Fragment]) -> Vec<Fragment> {
    let mut sorted = fragments.to_vec();
    sorted.sort_by(|a, b| {
        cmp_f64(a.top(), b.top())
            .then_with(|| cmp_f64(a.left(), b.left()))
            .then_with(|| a.text.cmp(&b.text))
    });
    sorted
}

struct Cluster {
    anchor: f64,
    members: Vec<usize>,
}

/// Greedy one-pass clustering of `fragments` on `coord`.
///
/// Returns the clusters ordered by anchor plus, for each input index, the
/// cluster it landed in.
fn cluster_axis(
    fragments: &[Fragment],
    coord: fn(&Fragment) -> f64,
    tolerance: f64,
) -> (Vec<Cluster>, Vec<usize>) {
    let mut order: Vec<usize> = (0..fragments.len()).collect();
    order.sort_by(|&a, &b| cmp_f64(coord(&fragments[a]), coord(&fragments[b])).then(a.cmp(&b)));

    let mut clusters: Vec<Cluster> = Vec::new();
    let mut assignment = vec![0usize; fragments.len()];
    for idx in order {
        let value = coord(&fragments[idx]);
        match clusters
            .iter()
            .position(|c| (value - c.anchor).abs() < tolerance)
        {
            Some(ci) => {
                clusters[ci].members.push(idx);
                assignment[idx] = ci;
            }
            None => {
                assignment[idx] = clusters.len();
                clusters.push(Cluster {
                    anchor: value,
                    members: vec![idx],
                });
            }
        }
    }
    // Anchors are created in ascending coordinate order, so `clusters` is
    // already sorted and indices in `assignment` are stable.
    (clusters, assignment)
}

/// Join a cell's fragments left-to-right; confidence is their mean.
fn materialize_cell(mut fragments: Vec<&Fragment>) -> Cell {
    if fragments.is_empty() {
        return Cell::empty();
    }
    fragments.sort_by(|a, b| cmp_f64(a.left(), b.left()).then_with(|| cmp_f64(a.top(), b.top())));
    let text = fragments
        .iter()
        .map(|f| f.text.trim())
        .collect::<Vec<_>>()
        .join(" ");
    let confidence =
        fragments.iter().map(|f| f.confidence).sum::<f64>() / fragments.len() as f64;
    Cell {
        is_empty: text.is_empty(),
        text,
        confidence,
        fragment_count: fragments.len(),
    }
}

fn cmp_f64(a: f64, b: f64) -> Ordering {
    a.partial_cmp(&b).unwrap_or(Ordering::Equal)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::BoundingBox;

    fn frag(text: &str, conf: f64, x0: f64, y0: f64, x1: f64, y1: f64) -> Fragment {
        Fragment::new(text, conf, BoundingBox::new(x0, y0, x1, y1))
    }

    fn opts(tol: f64) -> ClusterOptions {
        ClusterOptions {
            row_tolerance: tol,
            column_tolerance: tol,
            min_confidence: 60.0,
        }
    }

    fn grid_3x4() -> Vec<Fragment> {
        let mut out = Vec::new();
        for r in 0..3 {
            for c in 0..4 {
                let x = c as f64 * 100.0;
                let y = r as f64 * 40.0;
                out.push(frag(&format!("r{r}c{c}"), 90.0, x, y, x + 60.0, y + 20.0));
            }
        }
        out
    }

    #[test]
    fn two_by_two_schedule() {
        let fragments = vec![
            frag("CFM", 95.0, 0.0, 0.0, 30.0, 10.0),
            frag("100", 92.0, 40.0, 0.0, 60.0, 10.0),
            frag("HP", 90.0, 0.0, 20.0, 30.0, 30.0),
            frag("2.5", 88.0, 40.0, 20.0, 60.0, 30.0),
        ];
        let t = build_table(&fragments, &opts(5.0));
        assert!(t.is_table);
        assert_eq!(t.row_count, 2);
        assert_eq!(t.column_count, 2);
        assert_eq!(t.texts(), vec![vec!["CFM", "100"], vec!["HP", "2.5"]]);
        assert!((t.confidence - 91.25).abs() < 1e-9);
    }

    #[test]
    fn perfect_grid_any_input_order() {
        let mut fragments = grid_3x4();
        let expected = build_table(&fragments, &opts(10.0));
        assert_eq!(expected.row_count, 3);
        assert_eq!(expected.column_count, 4);
        assert_eq!(expected.cells[2][3].text, "r2c3");
        assert_eq!(expected.cells[1][0].text, "r1c0");

        fragments.reverse();
        assert_eq!(build_table(&fragments, &opts(10.0)), expected);

        // A fixed interleaving that is neither sorted nor reversed.
        let shuffled: Vec<Fragment> = [7, 2, 11, 0, 5, 9, 3, 10, 1, 6, 8, 4]
            .iter()
            .map(|&i| grid_3x4()[i].clone())
            .collect();
        assert_eq!(build_table(&shuffled, &opts(10.0)), expected);
    }

    #[test]
    fn row_tolerance_boundary() {
        let tol = 10.0;
        let just_inside = vec![
            frag("a", 90.0, 0.0, 0.0, 10.0, 5.0),
            frag("b", 90.0, 0.0, tol - 1.0, 10.0, 15.0),
        ];
        assert_eq!(cluster_rows(&just_inside, tol).len(), 1);

        let just_outside = vec![
            frag("a", 90.0, 0.0, 0.0, 10.0, 5.0),
            frag("b", 90.0, 0.0, tol + 1.0, 10.0, 15.0),
        ];
        assert_eq!(cluster_rows(&just_outside, tol).len(), 2);
    }

    #[test]
    fn column_tolerance_boundary() {
        let tol = 20.0;
        let inside = vec![
            frag("a", 90.0, 0.0, 0.0, 10.0, 5.0),
            frag("b", 90.0, tol - 1.0, 30.0, 40.0, 35.0),
        ];
        assert_eq!(cluster_columns(&inside, tol).len(), 1);
        let outside = vec![
            frag("a", 90.0, 0.0, 0.0, 10.0, 5.0),
            frag("b", 90.0, tol + 1.0, 30.0, 40.0, 35.0),
        ];
        assert_eq!(cluster_columns(&outside, tol).len(), 2);
    }

    #[test]
    fn anchor_does_not_drift() {
        // 0, 8, 16 with tolerance 10: 8 joins the row at 0, 16 starts a new one
        // because it is compared with the anchor, not the last member.
        let fragments = vec![
            frag("a", 90.0, 0.0, 0.0, 5.0, 5.0),
            frag("b", 90.0, 0.0, 8.0, 5.0, 13.0),
            frag("c", 90.0, 0.0, 16.0, 5.0, 21.0),
        ];
        let rows = cluster_rows(&fragments, 10.0);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].anchor_y, 0.0);
        assert_eq!(rows[0].fragments.len(), 2);
        assert_eq!(rows[1].anchor_y, 16.0);
    }

    #[test]
    fn single_row_rejected() {
        let fragments: Vec<Fragment> = (0..5)
            .map(|c| frag("v", 90.0, c as f64 * 50.0, 0.0, c as f64 * 50.0 + 30.0, 10.0))
            .collect();
        let t = build_table(&fragments, &opts(5.0));
        assert!(!t.is_table);
        assert!(t.cells.is_empty());
        assert!(t.reason.unwrap().contains("1 row"));
    }

    #[test]
    fn single_column_rejected() {
        let fragments: Vec<Fragment> = (0..5)
            .map(|r| frag("v", 90.0, 0.0, r as f64 * 50.0, 30.0, r as f64 * 50.0 + 10.0))
            .collect();
        let t = build_table(&fragments, &opts(5.0));
        assert!(!t.is_table);
        assert!(t.reason.unwrap().contains("1 column"));
    }

    #[test]
    fn low_confidence_only_rejected() {
        let fragments = vec![
            frag("a", 10.0, 0.0, 0.0, 5.0, 5.0),
            frag("b", 59.9, 40.0, 40.0, 50.0, 50.0),
        ];
        let t = build_table(&fragments, &opts(5.0));
        assert!(!t.is_table);
        assert_eq!(t.reason.as_deref(), Some(NO_CONFIDENT_TEXT));
    }

    #[test]
    fn empty_input_rejected() {
        let t = build_table(&[], &ClusterOptions::default());
        assert_eq!(t.reason.as_deref(), Some(NO_CONFIDENT_TEXT));
    }

    #[test]
    fn missing_cell_is_empty_and_grid_rectangular() {
        let fragments = vec![
            frag("Tag", 95.0, 0.0, 0.0, 20.0, 10.0),
            frag("CFM", 95.0, 100.0, 0.0, 120.0, 10.0),
            frag("AHU-1", 95.0, 0.0, 30.0, 20.0, 40.0),
        ];
        let t = build_table(&fragments, &opts(5.0));
        assert!(t.is_table);
        assert_eq!(t.cells.len(), 2);
        assert!(t.cells.iter().all(|r| r.len() == 2));
        let blank = &t.cells[1][1];
        assert!(blank.is_empty);
        assert_eq!(blank.confidence, 0.0);
        assert_eq!(blank.fragment_count, 0);
    }

    #[test]
    fn multi_word_cell_joined_left_to_right() {
        let fragments = vec![
            frag("Supply", 90.0, 0.0, 0.0, 30.0, 10.0),
            frag("Fan", 80.0, 8.0, 1.0, 20.0, 10.0),
            frag("CFM", 90.0, 100.0, 0.0, 120.0, 10.0),
            frag("SF-1", 90.0, 0.0, 30.0, 20.0, 40.0),
            frag("500", 90.0, 100.0, 30.0, 120.0, 40.0),
        ];
        let t = build_table(&fragments, &opts(10.0));
        assert_eq!(t.cells[0][0].text, "Supply Fan");
        assert_eq!(t.cells[0][0].fragment_count, 2);
        assert!((t.cells[0][0].confidence - 85.0).abs() < 1e-9);
    }

    #[test]
    fn fragment_near_two_anchors_fills_one_cell() {
        // "mid" is within tolerance of both anchors (0 and 20) but joined column 0 first.
        let fragments = vec![
            frag("A", 90.0, 0.0, 0.0, 8.0, 10.0),
            frag("B", 90.0, 20.0, 0.0, 28.0, 10.0),
            frag("C", 90.0, 0.0, 40.0, 8.0, 50.0),
            frag("mid", 90.0, 10.0, 40.0, 18.0, 50.0),
            frag("D", 90.0, 20.0, 40.0, 28.0, 50.0),
        ];
        let options = ClusterOptions {
            row_tolerance: 5.0,
            column_tolerance: 20.0,
            min_confidence: 60.0,
        };
        let t = build_table(&fragments, &options);
        assert_eq!(t.texts(), vec![vec!["A", "B"], vec!["C mid", "D"]]);
        let placed: usize = t.cells.iter().flatten().map(|c| c.fragment_count).sum();
        assert_eq!(placed, fragments.len());
    }
}
