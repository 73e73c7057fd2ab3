//! doku-core: Core library for the Connecdoku puzzle generator
//!
//! This crate provides:
//! - Corpus normalization and the word<->label bimap
//! - The 1-away / 2-away adjacency build with iterative pruning
//! - The checkpointed multi-worker layout search
//! - SQLite storage for discovered layouts, keyed by fingerprint
//! - The cleaner that revalidates and rescores the store
//! - The curation flow from a layout to a committed daily puzzle

pub mod adjacency;
pub mod bitset;
pub mod checkpoint;
pub mod cleaner;
pub mod corpus;
pub mod curate;
pub mod error;
pub mod fingerprint;
pub mod layout;
pub mod protocol;
pub mod search;
pub mod storage;

// Re-exports
pub use adjacency::{build as build_label_graph, LabelGraph};
pub use bitset::{BitMatrix, BitSet};
pub use checkpoint::Checkpoint;
pub use cleaner::{
    find_worker_binary, CleanConfig, CleanOutcome, CleanTick, DirectValidator, DirectWriter,
    HelperValidator, HelperWriter, LayoutValidator, LayoutWriter, DEFAULT_BATCH_SIZE,
    DEFAULT_HELPER_TIMEOUT,
};
pub use corpus::{
    is_pattern_label, load_words, parse_words, pattern_labels, save_labels, save_words, Corpus,
    LabelScores, NormalizeReport, WordMap,
};
pub use curate::{CommitError, CurationSheet, DailyLog, DailyPuzzle};
pub use error::{Error, Result};
pub use layout::{cell_options, cell_viability, fillable, fillable_in_corpus, Layout};
pub use protocol::{read_message, write_message, HelperReply, HelperRequest};
pub use search::{
    SearchConfig, SearchOutcome, SearchTick, DEFAULT_LOG_INTERVAL, DEFAULT_SAVE_INTERVAL,
    DEFAULT_WORKERS,
};
pub use storage::{InsertOutcome, Store, StoredLayout};
