//! Curation: from a stored layout to a committed daily puzzle.
//!
//! The selector sees, per cell, every word that uniquely satisfies that
//! cell's two labels, annotated with how often the word and the board's
//! labels have appeared in committed puzzles. Singleton cells are
//! auto-assigned. A commit re-verifies membership and distinctness and
//! appends to the append-only daily list; a failed commit marks the
//! layout skipped without deleting it from the store.

use crate::corpus::Corpus;
use crate::error::Result;
use crate::layout::{self, Layout};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// A committed puzzle: the layout plus its sixteen words, row-major.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyPuzzle {
    pub hash: String,
    pub rows: [String; 4],
    pub cols: [String; 4],
    pub words: [[String; 4]; 4],
}

/// The append-only committed list, plus skip marks left by failed or
/// abandoned curations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DailyLog {
    pub puzzles: Vec<DailyPuzzle>,
    #[serde(default)]
    pub skipped: Vec<String>,
}

impl DailyLog {
    /// Load `daily.json`; a missing file is an empty log.
    pub fn load(path: &Path) -> Result<DailyLog> {
        if !path.exists() {
            return Ok(DailyLog::default());
        }
        let json = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)? + "\n")?;
        Ok(())
    }

    /// Layouts that should not be offered again.
    pub fn is_retired(&self, hash: &str) -> bool {
        self.skipped.iter().any(|h| h == hash)
            || self.puzzles.iter().any(|p| p.hash == hash)
    }

    pub fn mark_skipped(&mut self, hash: &str) {
        if !self.skipped.iter().any(|h| h == hash) {
            self.skipped.push(hash.to_string());
        }
    }

    fn word_uses(&self, word: &str) -> u64 {
        self.puzzles
            .iter()
            .flat_map(|p| p.words.iter().flatten())
            .filter(|w| w.as_str() == word)
            .count() as u64
    }

    fn label_uses(&self, label: &str) -> u64 {
        self.puzzles
            .iter()
            .flat_map(|p| p.rows.iter().chain(p.cols.iter()))
            .filter(|l| l.as_str() == label)
            .count() as u64
    }
}

/// One candidate word with its prior-use annotation.
#[derive(Debug, Clone, PartialEq)]
pub struct CellOption {
    pub word: String,
    pub uses: u64,
}

/// Everything the selector needs for one layout.
#[derive(Debug, Clone)]
pub struct CurationSheet {
    pub hash: String,
    pub layout: Layout,
    /// Candidates per cell, each with its word-use count.
    pub cells: [[Vec<CellOption>; 4]; 4],
    /// Prior-use count per board label, rows then columns.
    pub label_uses: [(String, u64); 8],
}

impl CurationSheet {
    /// Build the sheet under the current corpus. `None` means some cell
    /// is empty: the layout is invalid and should be dropped from
    /// consideration.
    pub fn build(corpus: &Corpus, layout: &Layout, daily: &DailyLog) -> Option<CurationSheet> {
        let options = layout::cell_options(corpus, layout)?;
        let cells = options.map(|row| {
            row.map(|words| {
                words
                    .into_iter()
                    .map(|word| {
                        let uses = daily.word_uses(&word);
                        CellOption { word, uses }
                    })
                    .collect::<Vec<CellOption>>()
            })
        });
        let labels: Vec<(String, u64)> = layout
            .labels()
            .map(|l| (l.to_string(), daily.label_uses(l)))
            .collect();
        Some(CurationSheet {
            hash: layout.fingerprint(),
            layout: layout.clone(),
            cells,
            label_uses: labels.try_into().expect("eight labels"),
        })
    }

    /// Words for cells with exactly one candidate; these are assigned
    /// without prompting.
    pub fn auto_assignments(&self) -> [[Option<String>; 4]; 4] {
        std::array::from_fn(|i| {
            std::array::from_fn(|j| {
                let cell = &self.cells[i][j];
                if cell.len() == 1 {
                    Some(cell[0].word.clone())
                } else {
                    None
                }
            })
        })
    }
}

/// Why a commit was rejected.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CommitError {
    #[error("duplicate word {word:?}: already placed at ({first_row},{first_col}), repeated at ({row},{col})")]
    DuplicateWord {
        word: String,
        first_row: usize,
        first_col: usize,
        row: usize,
        col: usize,
    },
    #[error("word {word:?} is not viable at ({row},{col})")]
    NotViable {
        word: String,
        row: usize,
        col: usize,
    },
}

/// Validate a sixteen-word assignment and append it to the daily list.
///
/// Cells are checked row-major; a repeated word is reported as a
/// duplicate even when it would also fail the viability check. The log
/// is untouched on failure; the caller decides whether to mark the
/// layout skipped.
pub fn commit(
    daily: &mut DailyLog,
    corpus: &Corpus,
    layout: &Layout,
    words: &[[String; 4]; 4],
) -> std::result::Result<(), CommitError> {
    let mut seen: BTreeMap<&str, (usize, usize)> = BTreeMap::new();
    for (i, row) in words.iter().enumerate() {
        for (j, word) in row.iter().enumerate() {
            if let Some(&(fi, fj)) = seen.get(word.as_str()) {
                return Err(CommitError::DuplicateWord {
                    word: word.clone(),
                    first_row: fi,
                    first_col: fj,
                    row: i,
                    col: j,
                });
            }
            seen.insert(word.as_str(), (i, j));
            if !layout::cell_viability(corpus, layout, i, j).contains(word) {
                return Err(CommitError::NotViable {
                    word: word.clone(),
                    row: i,
                    col: j,
                });
            }
        }
    }

    daily.puzzles.push(DailyPuzzle {
        hash: layout.fingerprint(),
        rows: layout.rows.clone(),
        cols: layout.cols.clone(),
        words: words.clone(),
    });
    Ok(())
}
