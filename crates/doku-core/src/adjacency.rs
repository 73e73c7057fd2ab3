//! Adjacency builder: from the canonical bimap to the 1-away and 2-away
//! relations over the surviving label set.
//!
//! The build is deterministic and idempotent: labels are considered in
//! sorted order, relations are rebuilt from scratch on every run, and the
//! degree prune iterates to a fixed point. The final label ordering is the
//! lexicographic order the search engine uses for positions and
//! tie-breaking.

use crate::bitset::{BitMatrix, BitSet};
use crate::corpus::Corpus;
use rayon::prelude::*;
use std::collections::HashMap;

/// Labels need at least this many words to be search-eligible.
pub const MIN_POPULATION: usize = 4;

/// Minimum independent length-2 paths for a 2-away edge.
pub const MIN_SHARED_NEIGHBORS: usize = 4;

/// Degree floors for the iterative prune: a surviving label needs four
/// 1-away neighbors (its column partners) and three 2-away neighbors (the
/// rest of its own side).
pub const MIN_R1_DEGREE: usize = 4;
pub const MIN_R2_DEGREE: usize = 3;

/// The searchable slice of the corpus: surviving labels in lexicographic
/// order, their populations as bitsets over interned word ids, and the
/// two adjacency relations.
#[derive(Debug, Clone)]
pub struct LabelGraph {
    /// Interned word list, sorted; population bits index into this.
    pub words: Vec<String>,
    /// Surviving labels (L*), sorted; all positions derive from this order.
    pub labels: Vec<String>,
    /// Population bitset per label, parallel to `labels`.
    pub populations: Vec<BitSet>,
    /// 1-away: overlapping, non-subset populations.
    pub r1: BitMatrix,
    /// 2-away: >= 4 shared 1-away neighbors, non-subset.
    pub r2: BitMatrix,
}

impl LabelGraph {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Index of `label` in the L* ordering.
    pub fn label_index(&self, label: &str) -> Option<usize> {
        self.labels.binary_search_by(|l| l.as_str().cmp(label)).ok()
    }
}

/// Build the label graph from a canonical bimap.
///
/// An empty result is a valid outcome (the search then emits zero
/// layouts); it is not an error.
pub fn build(corpus: &Corpus) -> LabelGraph {
    let words: Vec<String> = corpus.words.keys().cloned().collect();
    let word_ids: HashMap<&str, usize> = words
        .iter()
        .enumerate()
        .map(|(i, w)| (w.as_str(), i))
        .collect();

    // Seed with every eligible general label; the prune below only ever
    // shrinks this set.
    let mut labels: Vec<String> = corpus
        .general_labels()
        .filter(|(_, pop)| pop.len() >= MIN_POPULATION)
        .map(|(label, _)| label.clone())
        .collect();

    loop {
        let populations: Vec<BitSet> = labels
            .iter()
            .map(|label| {
                let mut bits = BitSet::new(words.len());
                for word in &corpus.labels[label] {
                    bits.insert(word_ids[word.as_str()]);
                }
                bits
            })
            .collect();
        let n = labels.len();

        let (r1, r2) = relations(&populations);

        let survivors: Vec<usize> = (0..n)
            .filter(|&i| r1.degree(i) >= MIN_R1_DEGREE && r2.degree(i) >= MIN_R2_DEGREE)
            .collect();

        if survivors.len() == n {
            tracing::debug!(labels = n, words = words.len(), "label graph fixed point");
            return LabelGraph {
                words,
                labels,
                populations,
                r1,
                r2,
            };
        }

        tracing::debug!(
            before = n,
            after = survivors.len(),
            "degree prune dropped labels, rebuilding"
        );
        labels = survivors.into_iter().map(|i| labels[i].clone()).collect();
    }
}

/// One pass of the relation build over a fixed population list: R1 and R2
/// with the diagonal and every subset/superset pair suppressed.
pub(crate) fn relations(populations: &[BitSet]) -> (BitMatrix, BitMatrix) {
    let n = populations.len();
    let sizes: Vec<usize> = populations.iter().map(BitSet::len).collect();

    // M(A,B) via bitset AND + popcount. Rows are independent, so this is
    // the data-parallel part of the build.
    let pair_rows: Vec<(BitSet, BitSet)> = (0..n)
        .into_par_iter()
        .map(|i| {
            let mut r1_row = BitSet::new(n);
            let mut subset_row = BitSet::new(n);
            for j in 0..n {
                if j == i {
                    continue;
                }
                let shared = populations[i].intersection_len(&populations[j]);
                if shared == sizes[i] || shared == sizes[j] {
                    // One population contains the other (collisions
                    // included); no edge of either kind.
                    subset_row.insert(j);
                } else if shared > 0 {
                    r1_row.insert(j);
                }
            }
            (r1_row, subset_row)
        })
        .collect();
    let (r1_rows, subset_rows): (Vec<BitSet>, Vec<BitSet>) = pair_rows.into_iter().unzip();
    let r1 = BitMatrix::from_rows(r1_rows);
    let subset = BitMatrix::from_rows(subset_rows);

    let r2_rows: Vec<BitSet> = (0..n)
        .into_par_iter()
        .map(|i| {
            let mut row = BitSet::new(n);
            for j in 0..n {
                if j == i || subset.contains(i, j) {
                    continue;
                }
                if r1.shared_neighbors(i, j) >= MIN_SHARED_NEIGHBORS {
                    row.insert(j);
                }
            }
            row
        })
        .collect();
    let r2 = BitMatrix::from_rows(r2_rows);

    (r1, r2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::WordMap;
    use std::collections::BTreeSet;

    fn corpus(entries: &[(&str, &[&str])]) -> Corpus {
        let raw: WordMap = entries
            .iter()
            .map(|(w, ls)| {
                (
                    w.to_string(),
                    ls.iter().map(|l| l.to_string()).collect::<BTreeSet<_>>(),
                )
            })
            .collect();
        Corpus::normalize(raw)
    }

    /// Sixteen words in a 4x4 grid of four row labels by four column
    /// labels: every word belongs to exactly one of each. This is the
    /// minimal corpus where everything is connected and nothing is a
    /// subset.
    fn grid_corpus() -> Corpus {
        let rows = ["Alpha", "Beta", "Gamma", "Delta"];
        let cols = ["East", "West", "North", "South"];
        let mut entries: Vec<(String, Vec<String>)> = Vec::new();
        for (i, r) in rows.iter().enumerate() {
            for (j, c) in cols.iter().enumerate() {
                entries.push((format!("w{i}{j}"), vec![r.to_string(), c.to_string()]));
            }
        }
        let raw: WordMap = entries
            .into_iter()
            .map(|(w, ls)| (w, ls.into_iter().collect()))
            .collect();
        Corpus::normalize(raw)
    }

    #[test]
    fn test_grid_survives_with_expected_edges() {
        let graph = build(&grid_corpus());
        assert_eq!(graph.len(), 8);

        let a = graph.label_index("Alpha").unwrap();
        let b = graph.label_index("Beta").unwrap();
        let e = graph.label_index("East").unwrap();

        // Row and column labels overlap in exactly one word.
        assert!(graph.r1.contains(a, e));
        // Two row labels never overlap, so no 1-away edge...
        assert!(!graph.r1.contains(a, b));
        // ...but they share the four column labels as 1-away neighbors.
        assert!(graph.r2.contains(a, b));
    }

    #[test]
    fn test_eligibility_closure() {
        let graph = build(&grid_corpus());
        for i in 0..graph.len() {
            assert!(graph.populations[i].len() >= MIN_POPULATION);
            assert!(graph.r1.degree(i) >= MIN_R1_DEGREE);
            assert!(graph.r2.degree(i) >= MIN_R2_DEGREE);
        }
    }

    #[test]
    fn test_colliding_labels_give_empty_graph() {
        // S1: X and Y have identical 4-word populations; mutual subset
        // kills the only possible edge and the prune empties L*.
        let corpus = corpus(&[
            ("Aa", &["X", "Y"]),
            ("Bb", &["X", "Y"]),
            ("Cc", &["X", "Y"]),
            ("Dd", &["X", "Y"]),
        ]);
        let graph = build(&corpus);
        assert!(graph.is_empty());
    }

    #[test]
    fn test_subset_suppression_in_relations() {
        // S4 shape over raw populations: label 8 ("Wide") is the union of
        // labels 0 and 1, a strict superset of both. Whatever the degree
        // prune later decides, neither relation may connect them.
        let graph = build(&grid_corpus());
        let mut populations = graph.populations.clone();
        let a = graph.label_index("Alpha").unwrap();
        let b = graph.label_index("Beta").unwrap();
        let mut wide = populations[a].clone();
        wide.union_with(&populations[b]);
        populations.push(wide);
        let w = populations.len() - 1;

        let (r1, r2) = relations(&populations);
        for i in [a, b] {
            assert!(!r1.contains(w, i), "R1 edge not suppressed");
            assert!(!r2.contains(w, i), "R2 edge not suppressed");
        }
        // Overlap with the non-subset labels is still a 1-away edge.
        let east = graph.label_index("East").unwrap();
        assert!(r1.contains(w, east));
    }

    #[test]
    fn test_superset_label_dropped_when_degrees_fail() {
        // The same shape end to end: the superset label loses its two
        // best 2-away partners to suppression and falls to the prune,
        // while the original eight labels survive untouched.
        let grid = grid_corpus();
        let wide: BTreeSet<String> = grid.labels["Alpha"]
            .union(&grid.labels["Beta"])
            .cloned()
            .collect();
        let mut raw = grid.words.clone();
        for word in &wide {
            raw.get_mut(word).unwrap().insert("Wide".to_string());
        }
        let graph = build(&Corpus::normalize(raw));

        assert!(graph.label_index("Wide").is_none());
        for name in ["Alpha", "Beta", "Gamma", "Delta", "East", "West"] {
            assert!(graph.label_index(name).is_some(), "{name} should survive");
        }
    }

    #[test]
    fn test_small_populations_never_enter() {
        let mut grid = grid_corpus();
        let mut raw = grid.words.clone();
        // A three-word label can never seat a full column.
        for word in ["w00", "w01", "w02"] {
            raw.get_mut(word).unwrap().insert("Tiny".to_string());
        }
        grid = Corpus::normalize(raw);
        let graph = build(&grid);
        assert!(graph.label_index("Tiny").is_none());
    }

    #[test]
    fn test_pattern_labels_excluded() {
        let graph = build(&grid_corpus());
        assert!(graph.labels.iter().all(|l| !l.starts_with('^')));
        assert!(graph.labels.iter().all(|l| !l.ends_with('$')));
    }

    #[test]
    fn test_build_deterministic() {
        let corpus = grid_corpus();
        let a = build(&corpus);
        let b = build(&corpus);
        assert_eq!(a.labels, b.labels);
        assert_eq!(a.r1, b.r1);
        assert_eq!(a.r2, b.r2);
        assert_eq!(a.populations, b.populations);
    }
}
