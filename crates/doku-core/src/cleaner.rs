//! Cleaner / revalidator.
//!
//! When the corpus changes, stored layouts can silently stop being
//! fillable. The cleaner partitions the store into hash ranges, rechecks
//! every layout in each range against the current bimap, deletes the
//! failures, and rescores the survivors (score = sum of the label scores
//! of the eight labels).
//!
//! Store writes go through a `LayoutWriter`: in production a
//! `doku-worker write` child process per cleaner worker, driven over the
//! line protocol with a reply timeout; `DirectWriter` applies the same
//! batches on an in-process connection. Validation has the same two
//! modes behind `LayoutValidator`: inline against the loaded corpus, or
//! a `doku-worker validate` child per worker. Either way writes are
//! batched, flushed per scan chunk, and the confirmed deletion count
//! must match the invalid count exactly; a shortfall is a fatal mismatch
//! that aborts the run.

use crate::corpus::{Corpus, LabelScores};
use crate::error::{Error, Result};
use crate::layout::{self, Layout};
use crate::protocol::{self, HelperReply, HelperRequest};
use crate::storage::Store;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use std::collections::BTreeMap;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Writes queued per worker before a flush.
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Ceiling on a single helper reply.
pub const DEFAULT_HELPER_TIMEOUT: Duration = Duration::from_secs(300);

/// Cleaner run parameters.
#[derive(Debug, Clone)]
pub struct CleanConfig {
    pub workers: usize,
    pub batch_size: usize,
    pub helper_timeout: Duration,
    /// Explicit path to the helper binary; discovered next to the
    /// current executable when unset.
    pub worker_bin: Option<PathBuf>,
    /// When set, each worker validates through a `doku-worker validate`
    /// child loaded with this corpus file instead of checking inline.
    pub validate_corpus: Option<PathBuf>,
}

impl Default for CleanConfig {
    fn default() -> Self {
        Self {
            workers: 6,
            batch_size: DEFAULT_BATCH_SIZE,
            helper_timeout: DEFAULT_HELPER_TIMEOUT,
            worker_bin: None,
            validate_corpus: None,
        }
    }
}

/// Structured progress counters, one per flushed batch.
#[derive(Debug, Clone)]
pub struct CleanTick {
    pub worker: usize,
    pub processed: u64,
    pub total: u64,
    pub valid_delta: u64,
    pub invalid_delta: u64,
    pub deleted_delta: u64,
}

/// Aggregate result of a clean run.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct CleanOutcome {
    pub processed: u64,
    pub valid: u64,
    pub invalid: u64,
    pub deleted: u64,
    /// Ranges that aborted on a non-fatal error.
    pub failed_chunks: u64,
    /// Chunk-abort counts per error kind, for the terminal summary.
    pub error_kinds: BTreeMap<&'static str, u64>,
    /// Label occurrence counts over the layouts that remained valid.
    pub tallies: BTreeMap<String, u64>,
}

/// Batched store writes on behalf of one cleaner worker.
pub trait LayoutWriter {
    fn delete(&mut self, hashes: &[String]) -> Result<usize>;
    fn upsert_scores(&mut self, items: &[(String, f64)]) -> Result<usize>;
    fn shutdown(&mut self) -> Result<()>;
}

/// Writer over an in-process store connection.
pub struct DirectWriter {
    store: Store,
}

impl DirectWriter {
    pub fn open(db_path: &Path) -> Result<Self> {
        Ok(Self {
            store: Store::open(db_path)?,
        })
    }
}

impl LayoutWriter for DirectWriter {
    fn delete(&mut self, hashes: &[String]) -> Result<usize> {
        self.store.delete(hashes)
    }

    fn upsert_scores(&mut self, items: &[(String, f64)]) -> Result<usize> {
        self.store.upsert_scores(items)
    }

    fn shutdown(&mut self) -> Result<()> {
        Ok(())
    }
}

/// One `doku-worker` child and its request/reply line discipline,
/// shared by the writer and validator fronts.
struct HelperChannel {
    child: Child,
    stdin: ChildStdin,
    replies: Receiver<String>,
    timeout: Duration,
    role: &'static str,
}

impl HelperChannel {
    /// Spawn the helper in `role`, send `init`, and wait for `Ready`.
    fn spawn(
        bin: &Path,
        role: &'static str,
        init: &HelperRequest,
        timeout: Duration,
    ) -> Result<Self> {
        let mut child = Command::new(bin)
            .arg(role)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()?;
        let stdin = child.stdin.take().expect("piped stdin");
        let stdout = child.stdout.take().expect("piped stdout");

        // A reader thread feeds replies into a channel so requests can
        // time out; pipes have no native read deadline.
        let (tx, rx) = crossbeam_channel::unbounded();
        std::thread::spawn(move || {
            use std::io::BufRead;
            let reader = BufReader::new(stdout);
            for line in reader.lines() {
                match line {
                    Ok(line) => {
                        if tx.send(line).is_err() {
                            break;
                        }
                    }
                    Err(_) => break,
                }
            }
        });

        let mut channel = Self {
            child,
            stdin,
            replies: rx,
            timeout,
            role,
        };
        match channel.request(init)? {
            HelperReply::Ready => Ok(channel),
            other => Err(Error::Protocol(format!(
                "expected Ready from {role} helper, got {other:?}"
            ))),
        }
    }

    fn request(&mut self, request: &HelperRequest) -> Result<HelperReply> {
        protocol::write_message(&mut self.stdin, request)?;
        let line = match self.replies.recv_timeout(self.timeout) {
            Ok(line) => line,
            Err(RecvTimeoutError::Timeout) => {
                return Err(Error::HelperStall {
                    role: self.role,
                    secs: self.timeout.as_secs(),
                })
            }
            Err(RecvTimeoutError::Disconnected) => {
                return Err(Error::Protocol(format!(
                    "{} helper closed its pipe",
                    self.role
                )))
            }
        };
        let reply: HelperReply = serde_json::from_str(line.trim_end())
            .map_err(|e| Error::Protocol(format!("bad reply {line:?}: {e}")))?;
        if let HelperReply::Error(msg) = reply {
            return Err(Error::Protocol(format!(
                "{} helper error: {msg}",
                self.role
            )));
        }
        Ok(reply)
    }

    fn shutdown(&mut self) {
        let _ = protocol::write_message(&mut self.stdin, &HelperRequest::Shutdown);
        let _ = self.child.wait();
    }
}

impl Drop for HelperChannel {
    fn drop(&mut self) {
        // Idempotent if shutdown() already ran.
        if matches!(self.child.try_wait(), Ok(None)) {
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}

/// Writer over a `doku-worker write` child process.
pub struct HelperWriter(HelperChannel);

impl HelperWriter {
    /// Spawn the helper, hand it the store path, and wait for `Ready`.
    pub fn spawn(bin: &Path, db_path: &Path, timeout: Duration) -> Result<Self> {
        let init = HelperRequest::Init {
            corpus: None,
            db: Some(db_path.to_path_buf()),
        };
        Ok(Self(HelperChannel::spawn(bin, "write", &init, timeout)?))
    }
}

impl LayoutWriter for HelperWriter {
    fn delete(&mut self, hashes: &[String]) -> Result<usize> {
        match self.0.request(&HelperRequest::Delete {
            hashes: hashes.to_vec(),
        })? {
            HelperReply::Ack { deleted } => Ok(deleted),
            other => Err(Error::Protocol(format!("expected Ack, got {other:?}"))),
        }
    }

    fn upsert_scores(&mut self, items: &[(String, f64)]) -> Result<usize> {
        match self.0.request(&HelperRequest::UpsertScores {
            items: items.to_vec(),
        })? {
            HelperReply::Ack { .. } => Ok(items.len()),
            other => Err(Error::Protocol(format!("expected Ack, got {other:?}"))),
        }
    }

    fn shutdown(&mut self) -> Result<()> {
        self.0.shutdown();
        Ok(())
    }
}

/// Fillability checks on behalf of one cleaner worker.
pub trait LayoutValidator {
    fn is_fillable(&mut self, layout: &Layout) -> Result<bool>;
    fn shutdown(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Inline validation against the loaded corpus.
pub struct DirectValidator<'a> {
    corpus: &'a Corpus,
}

impl<'a> DirectValidator<'a> {
    pub fn new(corpus: &'a Corpus) -> Self {
        Self { corpus }
    }
}

impl LayoutValidator for DirectValidator<'_> {
    fn is_fillable(&mut self, layout: &Layout) -> Result<bool> {
        Ok(layout::fillable_in_corpus(self.corpus, layout))
    }
}

/// Validator over a `doku-worker validate` child process.
pub struct HelperValidator(HelperChannel);

impl HelperValidator {
    /// Spawn the helper, hand it the corpus path, and wait for `Ready`.
    pub fn spawn(bin: &Path, corpus_path: &Path, timeout: Duration) -> Result<Self> {
        let init = HelperRequest::Init {
            corpus: Some(corpus_path.to_path_buf()),
            db: None,
        };
        Ok(Self(HelperChannel::spawn(bin, "validate", &init, timeout)?))
    }
}

impl LayoutValidator for HelperValidator {
    fn is_fillable(&mut self, layout: &Layout) -> Result<bool> {
        match self.0.request(&HelperRequest::Validate {
            rows: layout.rows.clone(),
            cols: layout.cols.clone(),
        })? {
            HelperReply::Valid => Ok(true),
            HelperReply::Invalid => Ok(false),
            other => Err(Error::Protocol(format!(
                "expected Valid/Invalid, got {other:?}"
            ))),
        }
    }

    fn shutdown(&mut self) -> Result<()> {
        self.0.shutdown();
        Ok(())
    }
}

/// Locate `doku-worker` next to the current executable, falling back to
/// PATH lookup.
pub fn find_worker_binary() -> PathBuf {
    if let Ok(current_exe) = std::env::current_exe() {
        if let Some(exe_dir) = current_exe.parent() {
            let candidate = exe_dir.join("doku-worker");
            if candidate.exists() {
                return candidate;
            }
        }
    }
    PathBuf::from("doku-worker")
}

/// Partition the fingerprint space into `workers` contiguous half-open
/// ranges, uniform over the first hex byte.
fn hash_ranges(workers: usize) -> Vec<(Option<String>, Option<String>)> {
    let n = workers.clamp(1, 256);
    let bound = |k: usize| format!("{:02x}", (k * 256) / n);
    (0..n)
        .map(|k| {
            let start = if k == 0 { None } else { Some(bound(k)) };
            let end = if k == n - 1 { None } else { Some(bound(k + 1)) };
            (start, end)
        })
        .collect()
}

/// Run a clean with `doku-worker write` helper children.
pub fn run(
    corpus: &Corpus,
    scores: &LabelScores,
    db_path: &Path,
    config: &CleanConfig,
    progress: Option<Sender<CleanTick>>,
    shutdown: &AtomicBool,
) -> Result<CleanOutcome> {
    let bin = config
        .worker_bin
        .clone()
        .unwrap_or_else(find_worker_binary);
    let timeout = config.helper_timeout;
    let factory = |_: usize| -> Result<Box<dyn LayoutWriter>> {
        Ok(Box::new(HelperWriter::spawn(&bin, db_path, timeout)?))
    };
    run_with(corpus, scores, db_path, config, progress, shutdown, &factory)
}

/// Run a clean with caller-supplied writers (one per worker).
pub fn run_with(
    corpus: &Corpus,
    scores: &LabelScores,
    db_path: &Path,
    config: &CleanConfig,
    progress: Option<Sender<CleanTick>>,
    shutdown: &AtomicBool,
    make_writer: &(dyn Fn(usize) -> Result<Box<dyn LayoutWriter>> + Sync),
) -> Result<CleanOutcome> {
    let total = Store::open(db_path)?.count()?;
    let ranges = hash_ranges(config.workers);

    let results: Vec<Result<WorkerSummary>> = std::thread::scope(|scope| {
        let handles: Vec<_> = ranges
            .into_iter()
            .enumerate()
            .map(|(worker, range)| {
                let progress = progress.clone();
                scope.spawn(move || {
                    let mut writer = make_writer(worker)?;
                    let result = run_worker(
                        corpus, scores, db_path, config, worker, range, total, &progress,
                        shutdown, writer.as_mut(),
                    );
                    if let Err(err) = writer.shutdown() {
                        tracing::warn!(worker, "writer shutdown failed: {err}");
                    }
                    if let Err(err) = &result {
                        if err.is_fatal() {
                            // Pull the other workers down too.
                            shutdown.store(true, Ordering::Relaxed);
                        }
                    }
                    result
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().expect("cleaner worker panicked"))
            .collect()
    });

    let mut outcome = CleanOutcome::default();
    for result in results {
        match result {
            Ok(summary) => {
                outcome.processed += summary.processed;
                outcome.valid += summary.valid;
                outcome.invalid += summary.invalid;
                outcome.deleted += summary.deleted;
                for (label, count) in summary.tallies {
                    *outcome.tallies.entry(label).or_default() += count;
                }
            }
            Err(err) if err.is_fatal() => {
                // The store is suspect; nothing downstream may trust it.
                return Err(err);
            }
            Err(err) => {
                tracing::error!(kind = err.kind(), "cleaner chunk failed: {err}");
                outcome.failed_chunks += 1;
                *outcome.error_kinds.entry(err.kind()).or_default() += 1;
            }
        }
    }
    if outcome.failed_chunks > 0 {
        tracing::warn!(
            failed = outcome.failed_chunks,
            "clean finished with aborted chunks"
        );
    }
    Ok(outcome)
}

#[derive(Debug, Default)]
struct WorkerSummary {
    processed: u64,
    valid: u64,
    invalid: u64,
    deleted: u64,
    tallies: BTreeMap<String, u64>,
}

#[allow(clippy::too_many_arguments)]
fn run_worker(
    corpus: &Corpus,
    scores: &LabelScores,
    db_path: &Path,
    config: &CleanConfig,
    worker: usize,
    range: (Option<String>, Option<String>),
    total: u64,
    progress: &Option<Sender<CleanTick>>,
    shutdown: &AtomicBool,
    writer: &mut dyn LayoutWriter,
) -> Result<WorkerSummary> {
    let mut validator: Box<dyn LayoutValidator + '_> = match &config.validate_corpus {
        Some(corpus_path) => {
            let bin = config.worker_bin.clone().unwrap_or_else(find_worker_binary);
            Box::new(HelperValidator::spawn(
                &bin,
                corpus_path,
                config.helper_timeout,
            )?)
        }
        None => Box::new(DirectValidator::new(corpus)),
    };
    let result = clean_range(
        scores,
        db_path,
        config,
        worker,
        range,
        total,
        progress,
        shutdown,
        writer,
        validator.as_mut(),
    );
    if let Err(err) = validator.shutdown() {
        tracing::warn!(worker, "validator shutdown failed: {err}");
    }
    result
}

#[allow(clippy::too_many_arguments)]
fn clean_range(
    scores: &LabelScores,
    db_path: &Path,
    config: &CleanConfig,
    worker: usize,
    range: (Option<String>, Option<String>),
    total: u64,
    progress: &Option<Sender<CleanTick>>,
    shutdown: &AtomicBool,
    writer: &mut dyn LayoutWriter,
    validator: &mut dyn LayoutValidator,
) -> Result<WorkerSummary> {
    let store = Store::open(db_path)?;
    let (start, end) = range;
    let mut summary = WorkerSummary::default();
    let mut after: Option<String> = None;
    let mut pending_deletes: Vec<String> = Vec::new();
    let mut pending_scores: Vec<(String, f64)> = Vec::new();

    loop {
        if shutdown.load(Ordering::Relaxed) {
            break;
        }
        let page = store.scan_chunk(
            start.as_deref(),
            end.as_deref(),
            after.as_deref(),
            config.batch_size,
        )?;
        if page.is_empty() {
            break;
        }
        after = Some(page.last().expect("non-empty page").hash.clone());

        let mut valid_delta = 0;
        let mut invalid_delta = 0;
        for stored in page {
            summary.processed += 1;
            if validator.is_fillable(&stored.layout)? {
                valid_delta += 1;
                let score = scores.layout_score(stored.layout.labels());
                pending_scores.push((stored.hash, score));
                for label in stored.layout.labels() {
                    *summary.tallies.entry(label.to_string()).or_default() += 1;
                }
            } else {
                // Not an error: the layout is simply unreachable under
                // the current corpus.
                invalid_delta += 1;
                pending_deletes.push(stored.hash);
            }
        }
        summary.valid += valid_delta;
        summary.invalid += invalid_delta;

        let deleted_delta = flush(writer, &mut pending_deletes, &mut pending_scores)?;
        summary.deleted += deleted_delta;

        if let Some(sender) = progress {
            let _ = sender.send(CleanTick {
                worker,
                processed: summary.processed,
                total,
                valid_delta,
                invalid_delta,
                deleted_delta,
            });
        }
    }

    // Shutdown path: whatever is still queued goes out before we stop.
    let deleted_delta = flush(writer, &mut pending_deletes, &mut pending_scores)?;
    summary.deleted += deleted_delta;
    tracing::debug!(
        worker,
        processed = summary.processed,
        valid = summary.valid,
        invalid = summary.invalid,
        "cleaner worker finished"
    );
    Ok(summary)
}

/// Flush one batch. The confirmed deletion count must cover every
/// pending invalid; anything less means the store and the writer
/// disagree about what exists, and the run cannot continue.
fn flush(
    writer: &mut dyn LayoutWriter,
    pending_deletes: &mut Vec<String>,
    pending_scores: &mut Vec<(String, f64)>,
) -> Result<u64> {
    if !pending_scores.is_empty() {
        writer.upsert_scores(pending_scores)?;
        pending_scores.clear();
    }
    if pending_deletes.is_empty() {
        return Ok(0);
    }
    let deleted = writer.delete(pending_deletes)?;
    if deleted < pending_deletes.len() {
        return Err(Error::FatalMismatch {
            invalid: pending_deletes.len(),
            deleted,
        });
    }
    pending_deletes.clear();
    Ok(deleted as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::WordMap;
    use crate::layout::Layout;
    use crossbeam_channel::unbounded;
    use tempfile::TempDir;

    /// A corpus of `grids` disjoint 4x4 grids; grid k fills the layout
    /// (GkR0..GkR3) x (GkC0..GkC3) and nothing else.
    fn multi_grid_corpus(grids: usize) -> Corpus {
        let mut raw = WordMap::new();
        for k in 0..grids {
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
        Corpus::normalize(raw)
    }

    fn grid_layout(k: usize) -> Layout {
        Layout::new(
            std::array::from_fn(|i| format!("G{k}R{i}")),
            std::array::from_fn(|j| format!("G{k}C{j}")),
        )
    }

    fn bogus_layout(k: usize) -> Layout {
        Layout::new(
            std::array::from_fn(|i| format!("X{k}R{i}")),
            std::array::from_fn(|j| format!("X{k}C{j}")),
        )
    }

    #[test]
    fn test_clean_deletes_exactly_the_unfillable() {
        // 63 fillable layouts, 37 whose labels no longer exist.
        let corpus = multi_grid_corpus(63);
        let scores: LabelScores = corpus
            .general_labels()
            .map(|(label, _)| (label.clone(), 0.5))
            .collect();

        let dir = TempDir::new().unwrap();
        let db = dir.path().join("puzzles.db");
        {
            let store = Store::open(&db).unwrap();
            for k in 0..63 {
                store.insert(&grid_layout(k)).unwrap();
            }
            for k in 0..37 {
                store.insert(&bogus_layout(k)).unwrap();
            }
            assert_eq!(store.count().unwrap(), 100);
        }

        let config = CleanConfig {
            workers: 4,
            batch_size: 10,
            ..Default::default()
        };
        let shutdown = AtomicBool::new(false);
        let (tx, rx) = unbounded();
        let factory = |_: usize| -> Result<Box<dyn LayoutWriter>> {
            Ok(Box::new(DirectWriter::open(&db)?))
        };
        let outcome = run_with(
            &corpus,
            &scores,
            &db,
            &config,
            Some(tx),
            &shutdown,
            &factory,
        )
        .unwrap();

        assert_eq!(outcome.processed, 100);
        assert_eq!(outcome.valid, 63);
        assert_eq!(outcome.invalid, 37);
        assert_eq!(outcome.deleted, 37);
        assert_eq!(outcome.failed_chunks, 0);

        let store = Store::open(&db).unwrap();
        assert_eq!(store.count().unwrap(), 63);
        for survivor in store.scan_chunk(None, None, None, 1000).unwrap() {
            // Eight labels at 0.5 apiece.
            assert_eq!(survivor.score, Some(4.0));
        }

        // Ticks carried the per-batch deltas; the totals reconcile.
        let ticks: Vec<CleanTick> = rx.try_iter().collect();
        assert!(!ticks.is_empty());
        assert_eq!(ticks.iter().map(|t| t.valid_delta).sum::<u64>(), 63);
        assert_eq!(ticks.iter().map(|t| t.invalid_delta).sum::<u64>(), 37);
        assert_eq!(ticks.iter().map(|t| t.deleted_delta).sum::<u64>(), 37);
        assert!(ticks.iter().all(|t| t.total == 100));
    }

    #[test]
    fn test_clean_tallies_count_surviving_labels() {
        let corpus = multi_grid_corpus(2);
        let scores = LabelScores::default();
        let dir = TempDir::new().unwrap();
        let db = dir.path().join("puzzles.db");
        {
            let store = Store::open(&db).unwrap();
            store.insert(&grid_layout(0)).unwrap();
            store.insert(&grid_layout(1)).unwrap();
            store.insert(&bogus_layout(0)).unwrap();
        }
        let config = CleanConfig {
            workers: 2,
            ..Default::default()
        };
        let shutdown = AtomicBool::new(false);
        let factory = |_: usize| -> Result<Box<dyn LayoutWriter>> {
            Ok(Box::new(DirectWriter::open(&db)?))
        };
        let outcome = run_with(&corpus, &scores, &db, &config, None, &shutdown, &factory).unwrap();

        assert_eq!(outcome.tallies.len(), 16);
        assert!(outcome.tallies.values().all(|&c| c == 1));
        assert!(!outcome.tallies.contains_key("X0R0"));
        // Without a score table, survivors score zero.
        let store = Store::open(&db).unwrap();
        let survivors = store.scan_chunk(None, None, None, 10).unwrap();
        assert!(survivors.iter().all(|s| s.score == Some(0.0)));
    }

    #[test]
    fn test_mismatch_is_fatal() {
        // A writer that claims one deletion fewer than asked.
        struct ShortingWriter(DirectWriter);
        impl LayoutWriter for ShortingWriter {
            fn delete(&mut self, hashes: &[String]) -> Result<usize> {
                Ok(self.0.delete(hashes)?.saturating_sub(1))
            }
            fn upsert_scores(&mut self, items: &[(String, f64)]) -> Result<usize> {
                self.0.upsert_scores(items)
            }
            fn shutdown(&mut self) -> Result<()> {
                Ok(())
            }
        }

        let corpus = multi_grid_corpus(1);
        let scores = LabelScores::default();
        let dir = TempDir::new().unwrap();
        let db = dir.path().join("puzzles.db");
        {
            let store = Store::open(&db).unwrap();
            store.insert(&bogus_layout(0)).unwrap();
        }
        let config = CleanConfig {
            workers: 1,
            ..Default::default()
        };
        let shutdown = AtomicBool::new(false);
        let factory = |_: usize| -> Result<Box<dyn LayoutWriter>> {
            Ok(Box::new(ShortingWriter(DirectWriter::open(&db)?)))
        };
        let err = run_with(&corpus, &scores, &db, &config, None, &shutdown, &factory)
            .unwrap_err();
        assert!(matches!(err, Error::FatalMismatch { invalid: 1, deleted: 0 }));
        // The run aborts hard and raises the shutdown flag.
        assert!(shutdown.load(Ordering::Relaxed));
    }

    #[test]
    fn test_hash_ranges_cover_and_do_not_overlap() {
        let ranges = hash_ranges(4);
        assert_eq!(ranges.len(), 4);
        assert_eq!(ranges[0].0, None);
        assert_eq!(ranges[3].1, None);
        for window in ranges.windows(2) {
            assert_eq!(window[0].1, window[1].0);
        }
        // A worker count beyond the byte space clamps instead of
        // producing empty bounds.
        assert_eq!(hash_ranges(1000).len(), 256);
    }

    #[test]
    fn test_empty_store_is_a_noop() {
        let corpus = multi_grid_corpus(1);
        let scores = LabelScores::default();
        let dir = TempDir::new().unwrap();
        let db = dir.path().join("puzzles.db");
        Store::open(&db).unwrap();
        let config = CleanConfig::default();
        let shutdown = AtomicBool::new(false);
        let factory = |_: usize| -> Result<Box<dyn LayoutWriter>> {
            Ok(Box::new(DirectWriter::open(&db)?))
        };
        let outcome = run_with(&corpus, &scores, &db, &config, None, &shutdown, &factory).unwrap();
        assert_eq!(outcome.processed, 0);
        assert_eq!(outcome.deleted, 0);
    }
}
