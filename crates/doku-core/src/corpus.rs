//! Corpus normalizer and word<->label bimap.
//!
//! The corpus on disk is `words.json` (word -> [label]). Normalization
//! canonicalizes it: pattern labels are stripped and re-derived, label
//! lists are deduplicated and sorted, near-duplicate word spellings are
//! folded into one canonical key, and the label -> [word] inverse is
//! rebuilt from scratch.
//!
//! Pattern labels encode the first three characters of a word as `^ABC`
//! and the last three as `XYZ$`, uppercased. They ride along in the bimap
//! for the word-pattern puzzles but never participate in layout search.

use crate::error::{Error, Result};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

/// Word -> label set, sorted both ways.
pub type WordMap = BTreeMap<String, BTreeSet<String>>;

/// Canonical bimap: the normalized word map plus its inverse.
#[derive(Debug, Clone, Default)]
pub struct Corpus {
    pub words: WordMap,
    pub labels: BTreeMap<String, BTreeSet<String>>,
}

/// Minimum word length (in chars) for pattern-label derivation.
const PATTERN_MIN_CHARS: usize = 3;

/// True for the derived `^ABC` / `XYZ$` forms.
pub fn is_pattern_label(label: &str) -> bool {
    label.starts_with('^') || label.ends_with('$')
}

/// The two pattern labels for a word, or `None` for words shorter than
/// three characters.
pub fn pattern_labels(word: &str) -> Option<(String, String)> {
    let chars: Vec<char> = word.chars().collect();
    if chars.len() < PATTERN_MIN_CHARS {
        return None;
    }
    let head: String = chars[..PATTERN_MIN_CHARS]
        .iter()
        .flat_map(|c| c.to_uppercase())
        .collect();
    let tail: String = chars[chars.len() - PATTERN_MIN_CHARS..]
        .iter()
        .flat_map(|c| c.to_uppercase())
        .collect();
    Some((format!("^{head}"), format!("{tail}$")))
}

/// Folding key for near-duplicate spellings: lowercase with internal
/// whitespace collapsed to single spaces.
fn fold_key(word: &str) -> String {
    word.to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Among folded spellings, the canonical key is the longest surface form;
/// ties break to the lexicographically smallest.
fn replaces_surface(candidate: &str, current: &str) -> bool {
    let (cc, cu) = (candidate.chars().count(), current.chars().count());
    cc > cu || (cc == cu && candidate < current)
}

/// What a normalization pass changed, for the CLI summary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NormalizeReport {
    pub input_words: usize,
    pub output_words: usize,
    /// Word keys merged into another spelling.
    pub folded: usize,
    /// Pattern labels found on input entries and discarded.
    pub stripped_patterns: usize,
    /// Pattern labels re-derived onto the output.
    pub added_patterns: usize,
}

impl Corpus {
    /// Normalize a raw word map into a canonical bimap.
    ///
    /// Total on well-formed input; malformed rows are rejected at parse
    /// time, not here.
    pub fn normalize(raw: WordMap) -> Corpus {
        Self::normalize_with_report(raw).0
    }

    /// Normalize and report what changed.
    pub fn normalize_with_report(raw: WordMap) -> (Corpus, NormalizeReport) {
        let mut report = NormalizeReport {
            input_words: raw.len(),
            ..Default::default()
        };

        // Strip derived labels, then fold spellings.
        let mut folded: BTreeMap<String, (String, BTreeSet<String>)> = BTreeMap::new();
        for (word, labels) in raw {
            let total = labels.len();
            let general: BTreeSet<String> = labels
                .into_iter()
                .filter(|l| !is_pattern_label(l))
                .collect();
            report.stripped_patterns += total - general.len();
            let key = fold_key(&word);
            match folded.get_mut(&key) {
                Some((surface, set)) => {
                    report.folded += 1;
                    if replaces_surface(&word, surface) {
                        *surface = word;
                    }
                    set.extend(general);
                }
                None => {
                    folded.insert(key, (word, general));
                }
            }
        }

        let mut words: WordMap = BTreeMap::new();
        for (_, (word, mut labels)) in folded {
            if let Some((head, tail)) = pattern_labels(&word) {
                report.added_patterns += 2;
                labels.insert(head);
                labels.insert(tail);
            }
            words.insert(word, labels);
        }
        report.output_words = words.len();

        let mut labels: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for (word, set) in &words {
            for label in set {
                labels
                    .entry(label.clone())
                    .or_default()
                    .insert(word.clone());
            }
        }

        (Corpus { words, labels }, report)
    }

    /// Words carrying `label`, empty for unknown labels.
    pub fn population(&self, label: &str) -> Option<&BTreeSet<String>> {
        self.labels.get(label)
    }

    /// General labels only (the ones eligible for search consideration).
    pub fn general_labels(&self) -> impl Iterator<Item = (&String, &BTreeSet<String>)> {
        self.labels
            .iter()
            .filter(|(label, _)| !is_pattern_label(label))
    }

    /// SHA-256 over the sorted canonical word list, hex encoded. Keys the
    /// search checkpoints so corpus edits invalidate stale state.
    pub fn hash(&self) -> String {
        let mut hasher = Sha256::new();
        for word in self.words.keys() {
            hasher.update(word.as_bytes());
            hasher.update(b"\n");
        }
        format!("{:x}", hasher.finalize())
    }
}

/// Parse and validate a raw `words.json` document.
///
/// The document must be a JSON object mapping non-empty word strings to
/// arrays of label strings; anything else is a corpus-integrity error
/// naming the offending entry.
pub fn parse_words(json: &str) -> Result<WordMap> {
    let value: Value =
        serde_json::from_str(json).map_err(|e| Error::CorpusIntegrity(format!("not JSON: {e}")))?;
    let obj = match value {
        Value::Object(obj) => obj,
        other => {
            return Err(Error::CorpusIntegrity(format!(
                "corpus root must be an object, got {}",
                json_kind(&other)
            )))
        }
    };

    let mut words = WordMap::new();
    for (word, labels) in obj {
        if word.trim().is_empty() {
            return Err(Error::CorpusIntegrity("empty word key".to_string()));
        }
        let arr = match labels {
            Value::Array(arr) => arr,
            other => {
                return Err(Error::CorpusIntegrity(format!(
                    "labels of {word:?} must be an array, got {}",
                    json_kind(&other)
                )))
            }
        };
        let mut set = BTreeSet::new();
        for label in arr {
            match label {
                Value::String(s) => {
                    set.insert(s);
                }
                other => {
                    return Err(Error::CorpusIntegrity(format!(
                        "label of {word:?} must be a string, got {}",
                        json_kind(&other)
                    )))
                }
            }
        }
        words.insert(word, set);
    }
    Ok(words)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Load and validate `words.json` from disk.
pub fn load_words(path: &Path) -> Result<WordMap> {
    let json = std::fs::read_to_string(path)?;
    parse_words(&json)
}

/// Write the canonical word map back to disk, sorted and pretty-printed.
pub fn save_words(path: &Path, words: &WordMap) -> Result<()> {
    let json = serde_json::to_string_pretty(words)?;
    std::fs::write(path, json + "\n")?;
    Ok(())
}

/// Write the derived label -> [word] inverse.
pub fn save_labels(path: &Path, labels: &BTreeMap<String, BTreeSet<String>>) -> Result<()> {
    let json = serde_json::to_string_pretty(labels)?;
    std::fs::write(path, json + "\n")?;
    Ok(())
}

/// Optional per-label scores used by the cleaner; a layout's score is the
/// sum over its eight labels. Labels without a score count zero.
#[derive(Debug, Clone, Default)]
pub struct LabelScores(BTreeMap<String, f64>);

impl LabelScores {
    /// Load `label_scores.json`; a missing file is an empty table.
    pub fn load(path: &Path) -> Result<LabelScores> {
        if !path.exists() {
            return Ok(LabelScores::default());
        }
        let json = std::fs::read_to_string(path)?;
        let map: BTreeMap<String, f64> = serde_json::from_str(&json)?;
        Ok(LabelScores(map))
    }

    pub fn get(&self, label: &str) -> f64 {
        self.0.get(label).copied().unwrap_or(0.0)
    }

    pub fn layout_score<'a>(&self, labels: impl Iterator<Item = &'a str>) -> f64 {
        labels.map(|l| self.get(l)).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, f64)> for LabelScores {
    fn from_iter<T: IntoIterator<Item = (String, f64)>>(iter: T) -> Self {
        LabelScores(iter.into_iter().collect())
    }
}
