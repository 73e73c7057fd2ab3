//! Layouts and the no-red-herring fillability check.
//!
//! A layout is four row labels and four column labels. A cell (i,j) can
//! seat any word that carries exactly its two labels among the eight on
//! the board; the layout is fillable when every cell has at least one
//! such word. Because a viable word fails the six other labels by
//! definition, cells are independent and non-emptiness is enough; picking
//! the sixteen concrete words is the curator's job.
//!
//! Two entry points: a bitset path over `LabelGraph` indices for the
//! search inner loop, and a string-set path over the raw corpus for the
//! cleaner and curator, where a stored label may no longer exist at all.

use crate::adjacency::LabelGraph;
use crate::bitset::BitSet;
use crate::corpus::Corpus;
use crate::fingerprint;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// An ordered 4-row x 4-column label arrangement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Layout {
    pub rows: [String; 4],
    pub cols: [String; 4],
}

impl Layout {
    pub fn new(rows: [String; 4], cols: [String; 4]) -> Self {
        Self { rows, cols }
    }

    /// All eight labels, rows first.
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.rows
            .iter()
            .chain(self.cols.iter())
            .map(String::as_str)
    }

    /// Order-insensitive identity; the store's primary key.
    pub fn fingerprint(&self) -> String {
        let labels: Vec<&str> = self.labels().collect();
        fingerprint::fingerprint(&labels)
    }
}

/// Fillability over graph indices: every cell's viability set non-empty.
///
/// Rejects on the first empty cell.
pub fn fillable(graph: &LabelGraph, rows: &[usize; 4], cols: &[usize; 4]) -> bool {
    let pops = &graph.populations;
    let word_count = graph.words.len();

    // exclusion(i,j) = union of the six other populations
    //               = (rows except i) | (cols except j).
    let side_exclusions = |side: &[usize; 4]| -> [BitSet; 4] {
        std::array::from_fn(|k| {
            let mut union = BitSet::new(word_count);
            for (m, &label) in side.iter().enumerate() {
                if m != k {
                    union.union_with(&pops[label]);
                }
            }
            union
        })
    };
    let row_excl = side_exclusions(rows);
    let col_excl = side_exclusions(cols);

    for (i, &row) in rows.iter().enumerate() {
        for (j, &col) in cols.iter().enumerate() {
            let mut viable = pops[row].clone();
            viable.intersect_with(&pops[col]);
            viable.subtract(&row_excl[i]);
            viable.subtract(&col_excl[j]);
            if viable.is_empty() {
                return false;
            }
        }
    }
    true
}

/// The words viable at cell (i,j) under the current corpus: members of
/// both cell labels and of none of the six others. Unknown labels have
/// empty populations.
pub fn cell_viability(corpus: &Corpus, layout: &Layout, i: usize, j: usize) -> Vec<String> {
    static EMPTY: BTreeSet<String> = BTreeSet::new();
    let pop = |label: &str| corpus.population(label).unwrap_or(&EMPTY);

    let row_pop = pop(&layout.rows[i]);
    let col_pop = pop(&layout.cols[j]);
    let others: Vec<&BTreeSet<String>> = layout
        .rows
        .iter()
        .enumerate()
        .filter(|(k, _)| *k != i)
        .map(|(_, l)| pop(l))
        .chain(
            layout
                .cols
                .iter()
                .enumerate()
                .filter(|(k, _)| *k != j)
                .map(|(_, l)| pop(l)),
        )
        .collect();

    row_pop
        .intersection(col_pop)
        .filter(|word| others.iter().all(|other| !other.contains(*word)))
        .cloned()
        .collect()
}

/// Corpus-level fillability for stored layouts: true iff all sixteen
/// viability sets are non-empty.
pub fn fillable_in_corpus(corpus: &Corpus, layout: &Layout) -> bool {
    for i in 0..4 {
        for j in 0..4 {
            if cell_viability(corpus, layout, i, j).is_empty() {
                return false;
            }
        }
    }
    true
}

/// All sixteen viability sets, or `None` as soon as one is empty.
pub fn cell_options(corpus: &Corpus, layout: &Layout) -> Option<[[Vec<String>; 4]; 4]> {
    let mut cells: [[Vec<String>; 4]; 4] = Default::default();
    for i in 0..4 {
        for j in 0..4 {
            let viable = cell_viability(corpus, layout, i, j);
            if viable.is_empty() {
                return None;
            }
            cells[i][j] = viable;
        }
    }
    Some(cells)
}
