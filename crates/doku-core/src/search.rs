//! Layout search engine.
//!
//! Enumerates every adjacency-valid, fillable 4-row x 4-column label
//! octet, one representative per row/column-swap class, without
//! duplicates, resumable across interrupts.
//!
//! The search runs over a position universe of size 2*|L*|: each label
//! appears as a row instance (even position) and a column instance (odd
//! position), ordered by the label ordering with the row instance first.
//! A partial layout is a strictly increasing position sequence, at most
//! four of each kind, pairwise distinct labels, adjacency-valid
//! (row-row and col-col via 2-away, row-col via 1-away). The first
//! position is always a row instance, which picks exactly one of the two
//! orientations of every octet: the board's smallest label sits on the
//! row side.
//!
//! Workers interleave root slices: worker w of W roots at position 2w
//! and advances by 2W. Each worker's DFS is deterministic, so the
//! checkpointed stack alone resumes it exactly.

use crate::adjacency::LabelGraph;
use crate::checkpoint::{self, Checkpoint};
use crate::error::Result;
use crate::layout::{self, Layout};
use crate::storage::{InsertOutcome, Store};
use crossbeam_channel::Sender;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

/// Positions in a complete layout.
const FULL_DEPTH: usize = 8;

/// Labels per side.
const SIDE: usize = 4;

pub const DEFAULT_WORKERS: usize = 6;
pub const DEFAULT_SAVE_INTERVAL: u64 = 10_000;
pub const DEFAULT_LOG_INTERVAL: u64 = 1_000;

/// Search run parameters.
#[derive(Debug, Clone)]
pub struct SearchConfig {
    pub workers: usize,
    /// Checkpoint every this many iterations (besides on discovery).
    pub save_interval: u64,
    /// Progress tick every this many iterations.
    pub log_interval: u64,
    /// Ignore existing checkpoints and restart from the roots.
    pub fresh: bool,
    pub checkpoint_dir: PathBuf,
}

/// Structured progress counters, one per `log_interval` per worker.
#[derive(Debug, Clone)]
pub struct SearchTick {
    pub worker: usize,
    pub iter: u64,
    pub depth: usize,
    pub root_ptr: u32,
    /// Size of the position universe, for scaling progress displays.
    pub positions: u32,
    pub solved: u64,
}

/// Aggregate result of a search run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SearchOutcome {
    /// Layouts newly inserted this run.
    pub inserted: u64,
    /// Fillable layouts that were already stored.
    pub duplicates: u64,
    /// Iterations spent this run, summed over workers.
    pub iterations: u64,
    /// True when the run stopped on the shutdown flag rather than
    /// exhausting the search space.
    pub interrupted: bool,
}

/// Run or resume a search. On return the store holds every layout
/// discovered up to that point; checkpoints reflect where each worker
/// stopped.
pub fn run(
    graph: &LabelGraph,
    db_path: &Path,
    corpus_hash: &str,
    config: &SearchConfig,
    progress: Option<Sender<SearchTick>>,
    shutdown: &AtomicBool,
) -> Result<SearchOutcome> {
    checkpoint::purge_stale(&config.checkpoint_dir, corpus_hash)?;
    if graph.is_empty() {
        tracing::info!("no eligible labels; nothing to search");
        return Ok(SearchOutcome::default());
    }

    let results: Vec<Result<SearchOutcome>> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..config.workers)
            .map(|worker| {
                let progress = progress.clone();
                let db_path = db_path.to_path_buf();
                scope.spawn(move || {
                    run_worker(
                        graph,
                        &db_path,
                        corpus_hash,
                        config,
                        worker,
                        progress,
                        shutdown,
                    )
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().expect("search worker panicked"))
            .collect()
    });

    let mut outcome = SearchOutcome::default();
    for result in results {
        let worker_outcome = result?;
        outcome.inserted += worker_outcome.inserted;
        outcome.duplicates += worker_outcome.duplicates;
        outcome.iterations += worker_outcome.iterations;
        outcome.interrupted |= worker_outcome.interrupted;
    }
    Ok(outcome)
}

fn label_of(pos: u32) -> usize {
    (pos / 2) as usize
}

fn is_row(pos: u32) -> bool {
    pos % 2 == 0
}

/// Can `cand` extend the partial layout on `stack`?
fn compatible(graph: &LabelGraph, stack: &[u32], cand: u32) -> bool {
    let cand_label = label_of(cand);
    let cand_row = is_row(cand);
    let mut kind_count = 0;
    for &pos in stack {
        let label = label_of(pos);
        if label == cand_label {
            return false;
        }
        if is_row(pos) == cand_row {
            kind_count += 1;
            if !graph.r2.contains(label, cand_label) {
                return false;
            }
        } else if !graph.r1.contains(label, cand_label) {
            return false;
        }
    }
    kind_count < SIDE
}

/// Smallest compatible position in `from..total`.
fn next_compatible(graph: &LabelGraph, stack: &[u32], from: u32, total: u32) -> Option<u32> {
    (from..total).find(|&cand| compatible(graph, stack, cand))
}

/// Enough row and column instances left beyond the top of the stack to
/// reach depth 8? Positions only grow, so a board that cannot seat its
/// remaining rows or columns is dead and the whole scan can be skipped.
fn can_complete(stack: &[u32], total: u32) -> bool {
    let top = *stack.last().expect("non-empty stack");
    let rows_have = stack.iter().filter(|&&pos| is_row(pos)).count();
    let cols_have = stack.len() - rows_have;
    // Even (row) positions in the open range (top, total).
    let evens_left = ((total + 1) / 2 - (top + 2) / 2) as usize;
    let odds_left = (total - top - 1) as usize - evens_left;
    SIDE - rows_have <= evens_left && SIDE - cols_have <= odds_left
}

/// Retreat after a dead end or an emission. Pops until a level has an
/// untried sibling, pushing the next one; at the root the slice advances
/// by the worker stride. Returns false when the worker's roots are
/// exhausted.
fn backtrack(graph: &LabelGraph, state: &mut Checkpoint, total: u32, stride: u32) -> bool {
    loop {
        let popped = state.stack.pop().expect("backtrack on empty stack");
        if state.stack.is_empty() {
            state.root_ptr += stride;
            if state.root_ptr >= total {
                return false;
            }
            state.stack.push(state.root_ptr);
            return true;
        }
        if let Some(next) = next_compatible(graph, &state.stack, popped + 1, total) {
            state.stack.push(next);
            return true;
        }
    }
}

/// The complete layout on `stack`, as label names split by instance kind.
/// Positions are increasing, so each side comes out in label order.
fn layout_from_stack(graph: &LabelGraph, stack: &[u32]) -> ([usize; 4], [usize; 4], Layout) {
    debug_assert_eq!(stack.len(), FULL_DEPTH);
    let mut rows = Vec::with_capacity(SIDE);
    let mut cols = Vec::with_capacity(SIDE);
    for &pos in stack {
        if is_row(pos) {
            rows.push(label_of(pos));
        } else {
            cols.push(label_of(pos));
        }
    }
    let row_idx: [usize; 4] = rows.try_into().expect("four row positions");
    let col_idx: [usize; 4] = cols.try_into().expect("four col positions");
    let layout = Layout::new(
        row_idx.map(|i| graph.labels[i].clone()),
        col_idx.map(|j| graph.labels[j].clone()),
    );
    (row_idx, col_idx, layout)
}

#[allow(clippy::too_many_arguments)]
fn run_worker(
    graph: &LabelGraph,
    db_path: &Path,
    corpus_hash: &str,
    config: &SearchConfig,
    worker: usize,
    progress: Option<Sender<SearchTick>>,
    shutdown: &AtomicBool,
) -> Result<SearchOutcome> {
    let total = (graph.len() * 2) as u32;
    let first_root = (2 * worker) as u32;
    let stride = (2 * config.workers) as u32;

    let resumed = if config.fresh {
        None
    } else {
        checkpoint::load(&config.checkpoint_dir, corpus_hash, worker)?.filter(|cp| {
            if cp.workers != config.workers {
                tracing::warn!(
                    saved = cp.workers,
                    current = config.workers,
                    "worker count changed; discarding checkpoint"
                );
                return false;
            }
            true
        })
    };
    let mut state = resumed
        .unwrap_or_else(|| Checkpoint::fresh(corpus_hash, worker, config.workers, first_root));
    let start_iter = state.iter;
    let mut outcome = SearchOutcome::default();

    if state.root_ptr >= total || state.stack.is_empty() {
        // Already finished (or this worker has no root at all).
        return Ok(outcome);
    }

    let store = Store::open(db_path)?;
    tracing::debug!(
        worker,
        root = state.root_ptr,
        depth = state.stack.len(),
        iter = state.iter,
        "worker starting"
    );

    let done = loop {
        if shutdown.load(Ordering::Relaxed) {
            break false;
        }
        state.iter += 1;

        if config.log_interval > 0 && state.iter % config.log_interval == 0 {
            if let Some(sender) = &progress {
                let _ = sender.send(SearchTick {
                    worker,
                    iter: state.iter,
                    depth: state.stack.len(),
                    root_ptr: state.root_ptr,
                    positions: total,
                    solved: state.solved,
                });
            }
        }
        if config.save_interval > 0 && state.iter % config.save_interval == 0 {
            checkpoint::save(&config.checkpoint_dir, &state)?;
        }

        if state.stack.len() == FULL_DEPTH {
            let (row_idx, col_idx, layout) = layout_from_stack(graph, &state.stack);
            if layout::fillable(graph, &row_idx, &col_idx) {
                match store.insert(&layout)? {
                    InsertOutcome::New => {
                        outcome.inserted += 1;
                        state.solved += 1;
                        tracing::info!(worker, hash = %layout.fingerprint(), "layout found");
                        checkpoint::save(&config.checkpoint_dir, &state)?;
                    }
                    InsertOutcome::Duplicate => outcome.duplicates += 1,
                }
            }
            if !backtrack(graph, &mut state, total, stride) {
                break true;
            }
        } else {
            let top = *state.stack.last().expect("non-empty stack");
            let next = if can_complete(&state.stack, total) {
                next_compatible(graph, &state.stack, top + 1, total)
            } else {
                None
            };
            match next {
                Some(next) => state.stack.push(next),
                None => {
                    if !backtrack(graph, &mut state, total, stride) {
                        break true;
                    }
                }
            }
        }
    };

    if done {
        // Terminal state: empty stack, root past the end. Resuming such
        // a checkpoint is a no-op.
        state.stack.clear();
        state.root_ptr = state.root_ptr.max(total);
    }
    checkpoint::save(&config.checkpoint_dir, &state)?;
    outcome.iterations = state.iter - start_iter;
    outcome.interrupted = !done;
    tracing::debug!(
        worker,
        iterations = outcome.iterations,
        inserted = outcome.inserted,
        interrupted = outcome.interrupted,
        "worker stopping"
    );
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adjacency;
    use crate::corpus::{Corpus, WordMap};
    use crate::fingerprint;
    use std::sync::atomic::AtomicBool;
    use tempfile::TempDir;

    /// Sixteen words, each in exactly one row label and one column
    /// label: precisely one valid octet exists.
    fn grid_corpus() -> Corpus {
        let rows = ["Alpha", "Beta", "Gamma", "Delta"];
        let cols = ["East", "West", "North", "South"];
        let mut raw = WordMap::new();
        for (i, r) in rows.iter().enumerate() {
            for (j, c) in cols.iter().enumerate() {
                raw.insert(
                    format!("w{i}{j}"),
                    [r.to_string(), c.to_string()].into_iter().collect(),
                );
            }
        }
        Corpus::normalize(raw)
    }

    fn config(dir: &TempDir, workers: usize) -> SearchConfig {
        SearchConfig {
            workers,
            save_interval: 50,
            log_interval: 0,
            fresh: false,
            checkpoint_dir: dir.path().join("checkpoints"),
        }
    }

    fn run_search(
        corpus: &Corpus,
        db: &std::path::Path,
        cfg: &SearchConfig,
    ) -> SearchOutcome {
        let graph = adjacency::build(corpus);
        let shutdown = AtomicBool::new(false);
        run(&graph, db, &corpus.hash(), cfg, None, &shutdown).unwrap()
    }

    fn stored_hashes(db: &std::path::Path) -> Vec<String> {
        let store = Store::open(db).unwrap();
        store
            .scan_chunk(None, None, None, 10_000)
            .unwrap()
            .into_iter()
            .map(|s| s.hash)
            .collect()
    }

    #[test]
    fn test_grid_emits_exactly_one_layout() {
        let corpus = grid_corpus();
        let dir = TempDir::new().unwrap();
        let db = dir.path().join("puzzles.db");
        let outcome = run_search(&corpus, &db, &config(&dir, 1));

        assert_eq!(outcome.inserted, 1);
        assert!(!outcome.interrupted);

        let hashes = stored_hashes(&db);
        let expected = fingerprint::fingerprint(&[
            "Alpha", "Beta", "Gamma", "Delta", "East", "West", "North", "South",
        ]);
        assert_eq!(hashes, vec![expected]);

        // Orientation rule: the lexicographically smallest label landed
        // on the row side.
        let store = Store::open(&db).unwrap();
        let stored = store.get(&hashes[0]).unwrap().unwrap();
        assert!(stored.layout.rows.contains(&"Alpha".to_string()));
    }

    #[test]
    fn test_rerun_emits_no_duplicates() {
        // The swapped orientation of the same octet and any rerun both
        // land on the same fingerprint.
        let corpus = grid_corpus();
        let dir = TempDir::new().unwrap();
        let db = dir.path().join("puzzles.db");
        run_search(&corpus, &db, &config(&dir, 1));

        let dir2 = TempDir::new().unwrap();
        let mut cfg = config(&dir2, 1);
        cfg.fresh = true;
        let outcome = run_search(&corpus, &db, &cfg);
        assert_eq!(outcome.inserted, 0);
        assert_eq!(outcome.duplicates, 1);
        assert_eq!(stored_hashes(&db).len(), 1);
    }

    #[test]
    fn test_worker_counts_agree() {
        let corpus = grid_corpus();
        let dir1 = TempDir::new().unwrap();
        let db1 = dir1.path().join("puzzles.db");
        run_search(&corpus, &db1, &config(&dir1, 1));

        let dir4 = TempDir::new().unwrap();
        let db4 = dir4.path().join("puzzles.db");
        run_search(&corpus, &db4, &config(&dir4, 4));

        assert_eq!(stored_hashes(&db1), stored_hashes(&db4));
    }

    #[test]
    fn test_empty_graph_is_zero_layouts() {
        // Colliding labels: L* prunes to nothing.
        let mut raw = WordMap::new();
        for w in ["Aa", "Bb", "Cc", "Dd"] {
            raw.insert(
                w.to_string(),
                ["X".to_string(), "Y".to_string()].into_iter().collect(),
            );
        }
        let corpus = Corpus::normalize(raw);
        let dir = TempDir::new().unwrap();
        let db = dir.path().join("puzzles.db");
        let outcome = run_search(&corpus, &db, &config(&dir, 2));
        assert_eq!(outcome, SearchOutcome::default());
        assert!(stored_hashes(&db).is_empty());
    }

    #[test]
    fn test_resume_after_interrupt_matches_uninterrupted() {
        let corpus = grid_corpus();
        let graph = adjacency::build(&corpus);
        let hash = corpus.hash();

        // Reference run.
        let ref_dir = TempDir::new().unwrap();
        let ref_db = ref_dir.path().join("puzzles.db");
        run_search(&corpus, &ref_db, &config(&ref_dir, 2));

        // Interrupted run: another thread raises the flag almost
        // immediately, then we resume with the same worker count until
        // it completes.
        let dir = TempDir::new().unwrap();
        let db = dir.path().join("puzzles.db");
        let cfg = config(&dir, 2);
        let shutdown = AtomicBool::new(false);
        std::thread::scope(|scope| {
            scope.spawn(|| {
                std::thread::sleep(std::time::Duration::from_millis(2));
                shutdown.store(true, Ordering::Relaxed);
            });
            run(&graph, &db, &hash, &cfg, None, &shutdown).unwrap();
        });

        let shutdown = AtomicBool::new(false);
        let outcome = run(&graph, &db, &hash, &cfg, None, &shutdown).unwrap();
        assert!(!outcome.interrupted);
        assert_eq!(stored_hashes(&db), stored_hashes(&ref_db));
    }

    #[test]
    fn test_resume_after_completion_is_noop() {
        let corpus = grid_corpus();
        let graph = adjacency::build(&corpus);
        let dir = TempDir::new().unwrap();
        let db = dir.path().join("puzzles.db");
        let cfg = config(&dir, 2);
        let shutdown = AtomicBool::new(false);
        run(&graph, &db, &corpus.hash(), &cfg, None, &shutdown).unwrap();

        let again = run(&graph, &db, &corpus.hash(), &cfg, None, &shutdown).unwrap();
        assert_eq!(again.iterations, 0);
        assert_eq!(again.inserted, 0);
        assert_eq!(stored_hashes(&db).len(), 1);
    }

    #[test]
    fn test_corpus_change_purges_checkpoints() {
        let corpus = grid_corpus();
        let dir = TempDir::new().unwrap();
        let db = dir.path().join("puzzles.db");
        let cfg = config(&dir, 1);
        run_search(&corpus, &db, &cfg);

        // A different corpus hash invalidates the old files on the next
        // run.
        let graph = adjacency::build(&corpus);
        let shutdown = AtomicBool::new(false);
        run(&graph, &db, "differenthash", &cfg, None, &shutdown).unwrap();
        assert!(
            checkpoint::load(&cfg.checkpoint_dir, &corpus.hash(), 0)
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn test_disjoint_grids_emit_one_layout_each() {
        // Two unconnected grid components; the only valid octets are the
        // two grids themselves.
        let mut raw = WordMap::new();
        for k in 0..2 {
            for i in 0..4 {
                for j in 0..4 {
                    raw.insert(
                        format!("g{k}w{i}{j}"),
                        [format!("G{k}R{i}"), format!("G{k}C{j}")]
                            .into_iter()
                            .collect(),
                    );
                }
            }
        }
        let corpus = Corpus::normalize(raw);
        let dir = TempDir::new().unwrap();
        let db = dir.path().join("puzzles.db");
        let outcome = run_search(&corpus, &db, &config(&dir, 3));
        assert_eq!(outcome.inserted, 2);

        // Every stored layout is adjacency-valid and fillable, and the
        // fingerprints are pairwise distinct.
        let graph = adjacency::build(&corpus);
        let store = Store::open(&db).unwrap();
        let stored = store.scan_chunk(None, None, None, 100).unwrap();
        assert_eq!(stored.len(), 2);
        for entry in &stored {
            let rows = entry
                .layout
                .rows
                .clone()
                .map(|l| graph.label_index(&l).unwrap());
            let cols = entry
                .layout
                .cols
                .clone()
                .map(|l| graph.label_index(&l).unwrap());
            for a in 0..4 {
                for b in 0..4 {
                    if a != b {
                        assert!(graph.r2.contains(rows[a], rows[b]));
                        assert!(graph.r2.contains(cols[a], cols[b]));
                    }
                    assert!(graph.r1.contains(rows[a], cols[b]));
                }
            }
            assert!(crate::layout::fillable(&graph, &rows, &cols));
        }
        assert_ne!(stored[0].hash, stored[1].hash);
    }

    #[test]
    fn test_worker_count_change_discards_checkpoints() {
        let corpus = grid_corpus();
        let graph = adjacency::build(&corpus);
        let dir = TempDir::new().unwrap();
        let db = dir.path().join("puzzles.db");
        let shutdown = AtomicBool::new(false);
        run(&graph, &db, &corpus.hash(), &config(&dir, 2), None, &shutdown).unwrap();

        // Terminal checkpoints exist for 2 workers; a 1-worker run must
        // not trust them and re-covers the whole space.
        let outcome = run(&graph, &db, &corpus.hash(), &config(&dir, 1), None, &shutdown).unwrap();
        assert!(outcome.iterations > 0);
        assert_eq!(outcome.duplicates, 1);
        assert_eq!(stored_hashes(&db).len(), 1);
    }

    #[test]
    fn test_can_complete_counts_remaining_instances() {
        let total = 16;
        // Fresh root: everything is still ahead.
        assert!(can_complete(&[0], total));
        // Top at the last row instance: three more rows cannot fit.
        assert!(!can_complete(&[14], total));
        // Four rows placed, four column slots left among odd positions.
        assert!(can_complete(&[0, 2, 4, 6], total));
        // One column slot to fill and one odd position (15) remains.
        assert!(can_complete(&[0, 2, 4, 6, 9, 11, 13], total));
        // A missing row can never come after the last row instance.
        assert!(!can_complete(&[0, 2, 4, 15], total));
    }

    #[test]
    fn test_compatible_respects_kinds_and_capacity() {
        let graph = adjacency::build(&grid_corpus());
        let alpha = graph.label_index("Alpha").unwrap();
        let beta = graph.label_index("Beta").unwrap();
        let east = graph.label_index("East").unwrap();

        let row = |l: usize| (2 * l) as u32;
        let col = |l: usize| (2 * l + 1) as u32;

        // Row-row needs 2-away, row-col needs 1-away.
        assert!(compatible(&graph, &[row(alpha)], row(beta)));
        assert!(compatible(&graph, &[row(alpha)], col(east)));
        // Same label twice is never allowed.
        assert!(!compatible(&graph, &[row(alpha)], col(alpha)));
        // Alpha and East are not 2-away, so not both rows.
        assert!(!compatible(&graph, &[row(alpha)], row(east)));
    }
}
