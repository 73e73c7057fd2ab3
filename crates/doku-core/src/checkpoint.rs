//! Per-worker search checkpoints.
//!
//! A checkpoint is the complete resumable state of one worker's DFS: the
//! position stack, the root pointer, and the iteration/solved counters.
//! Files are keyed by the corpus hash so that any corpus edit invalidates
//! them wholesale; stale files are purged, never migrated. Saves are
//! write-then-rename so a crash cannot leave a torn file.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Bumped when the checkpoint layout changes; older files are stale.
const CHECKPOINT_VERSION: u32 = 1;

/// Resumable state of one search worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub version: u32,
    pub corpus_hash: String,
    pub worker: usize,
    /// Worker count of the run that wrote this file. The root stride is
    /// 2x this, so resuming under a different count would skip or repeat
    /// slices; such files must be discarded.
    pub workers: usize,
    /// Current partial layout as strictly increasing positions.
    pub stack: Vec<u32>,
    /// First position of the worker's current root slice.
    pub root_ptr: u32,
    pub iter: u64,
    pub solved: u64,
}

impl Checkpoint {
    /// Initial state for a worker starting its first slice.
    pub fn fresh(corpus_hash: &str, worker: usize, workers: usize, root: u32) -> Self {
        Self {
            version: CHECKPOINT_VERSION,
            corpus_hash: corpus_hash.to_string(),
            worker,
            workers,
            stack: vec![root],
            root_ptr: root,
            iter: 0,
            solved: 0,
        }
    }
}

/// `<dir>/<corpusHash>_<workerId>.json`
pub fn path(dir: &Path, corpus_hash: &str, worker: usize) -> PathBuf {
    dir.join(format!("{corpus_hash}_{worker}.json"))
}

/// Load a worker's checkpoint. Missing files, stale versions, and
/// foreign corpus hashes all read as "no checkpoint".
pub fn load(dir: &Path, corpus_hash: &str, worker: usize) -> Result<Option<Checkpoint>> {
    let file = path(dir, corpus_hash, worker);
    if !file.exists() {
        return Ok(None);
    }
    let json = std::fs::read_to_string(&file)?;
    let checkpoint: Checkpoint = match serde_json::from_str(&json) {
        Ok(cp) => cp,
        Err(e) => {
            tracing::warn!("discarding unreadable checkpoint {:?}: {}", file, e);
            return Ok(None);
        }
    };
    if checkpoint.version != CHECKPOINT_VERSION || checkpoint.corpus_hash != corpus_hash {
        return Ok(None);
    }
    Ok(Some(checkpoint))
}

/// Persist a checkpoint atomically. Saves from one worker are strictly
/// monotonic in `iter`, so later writes always supersede earlier ones.
pub fn save(dir: &Path, checkpoint: &Checkpoint) -> Result<()> {
    std::fs::create_dir_all(dir)?;
    let file = path(dir, &checkpoint.corpus_hash, checkpoint.worker);
    let tmp = file.with_extension("json.tmp");
    std::fs::write(&tmp, serde_json::to_string(checkpoint)?)?;
    std::fs::rename(&tmp, &file)?;
    Ok(())
}

/// Delete every checkpoint that does not belong to `corpus_hash`.
/// Returns the number of files removed.
pub fn purge_stale(dir: &Path, corpus_hash: &str) -> Result<usize> {
    if !dir.exists() {
        return Ok(0);
    }
    let prefix = format!("{corpus_hash}_");
    let mut removed = 0;
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.ends_with(".json") && !name.starts_with(&prefix) {
            std::fs::remove_file(entry.path())?;
            removed += 1;
        }
    }
    if removed > 0 {
        tracing::info!(removed, "purged stale checkpoints");
    }
    Ok(removed)
}
