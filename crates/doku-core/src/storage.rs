//! SQLite layout store.
//!
//! Schema:
//! - puzzles: puzzle_hash (order-insensitive fingerprint, primary key),
//!   the eight labels, and an optional score maintained by the cleaner.
//!
//! Several workers write to the same database file concurrently, each on
//! its own connection. Every batch is one transaction; SQLITE_BUSY and
//! SQLITE_LOCKED are retried with exponential backoff before escalating.

use crate::error::{Error, Result};
use crate::layout::Layout;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use std::path::Path;
use std::time::Duration;

const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS puzzles (
    puzzle_hash TEXT PRIMARY KEY,
    row0 TEXT NOT NULL,
    row1 TEXT NOT NULL,
    row2 TEXT NOT NULL,
    row3 TEXT NOT NULL,
    col0 TEXT NOT NULL,
    col1 TEXT NOT NULL,
    col2 TEXT NOT NULL,
    col3 TEXT NOT NULL,
    score REAL
);

CREATE INDEX IF NOT EXISTS idx_puzzles_score ON puzzles(score);
";

const SELECT_COLUMNS: &str =
    "puzzle_hash, row0, row1, row2, row3, col0, col1, col2, col3, score";

/// First backoff delay on a busy store.
const BUSY_BASE_DELAY: Duration = Duration::from_millis(50);

/// Attempts per batch before a busy error escalates.
const MAX_WRITE_ATTEMPTS: u32 = 3;

/// Result of an idempotent insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    New,
    Duplicate,
}

/// A layout row as persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredLayout {
    pub hash: String,
    pub layout: Layout,
    pub score: Option<f64>,
}

/// Database connection wrapper.
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open or create the store at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        // WAL lets the cleaner scan while writers commit.
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    /// In-memory store (for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    /// Insert a layout, keyed by fingerprint. Re-inserting an existing
    /// fingerprint (including the swapped orientation of a stored
    /// layout) is a no-op reported as `Duplicate`.
    pub fn insert(&self, layout: &Layout) -> Result<InsertOutcome> {
        let hash = layout.fingerprint();
        let changed = with_busy_retry(|| {
            self.conn.execute(
                "INSERT OR IGNORE INTO puzzles
                 (puzzle_hash, row0, row1, row2, row3, col0, col1, col2, col3)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
                params![
                    hash,
                    layout.rows[0],
                    layout.rows[1],
                    layout.rows[2],
                    layout.rows[3],
                    layout.cols[0],
                    layout.cols[1],
                    layout.cols[2],
                    layout.cols[3],
                ],
            )
        })?;
        Ok(if changed == 1 {
            InsertOutcome::New
        } else {
            InsertOutcome::Duplicate
        })
    }

    /// Fetch one layout by fingerprint.
    pub fn get(&self, hash: &str) -> Result<Option<StoredLayout>> {
        let sql = format!("SELECT {SELECT_COLUMNS} FROM puzzles WHERE puzzle_hash = ?");
        Ok(self
            .conn
            .query_row(&sql, params![hash], row_to_layout)
            .optional()?)
    }

    /// Stream a page of layouts whose fingerprint lies in the half-open
    /// range `[start, end)`, continuing after `after`, ordered by
    /// fingerprint. An empty page means the range is exhausted.
    pub fn scan_chunk(
        &self,
        start: Option<&str>,
        end: Option<&str>,
        after: Option<&str>,
        limit: usize,
    ) -> Result<Vec<StoredLayout>> {
        let sql = format!(
            "SELECT {SELECT_COLUMNS} FROM puzzles
             WHERE (?1 IS NULL OR puzzle_hash >= ?1)
               AND (?2 IS NULL OR puzzle_hash < ?2)
               AND (?3 IS NULL OR puzzle_hash > ?3)
             ORDER BY puzzle_hash
             LIMIT ?4"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![start, end, after, limit as i64], row_to_layout)?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }

    /// Number of layouts in the half-open range `[start, end)`.
    pub fn count_range(&self, start: Option<&str>, end: Option<&str>) -> Result<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM puzzles
             WHERE (?1 IS NULL OR puzzle_hash >= ?1)
               AND (?2 IS NULL OR puzzle_hash < ?2)",
            params![start, end],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    /// Total stored layouts.
    pub fn count(&self) -> Result<u64> {
        self.count_range(None, None)
    }

    /// Bulk delete by fingerprint in one transaction; returns the number
    /// of rows actually removed.
    pub fn delete(&mut self, hashes: &[String]) -> Result<usize> {
        let conn = &mut self.conn;
        with_busy_retry_mut(conn, |conn| {
            let tx = conn.transaction()?;
            let mut deleted = 0;
            {
                let mut stmt = tx.prepare("DELETE FROM puzzles WHERE puzzle_hash = ?")?;
                for hash in hashes {
                    deleted += stmt.execute(params![hash])?;
                }
            }
            tx.commit()?;
            Ok(deleted)
        })
    }

    /// Bulk score update in one transaction; unknown fingerprints are
    /// skipped. Returns the number of rows updated.
    pub fn upsert_scores(&mut self, items: &[(String, f64)]) -> Result<usize> {
        let conn = &mut self.conn;
        with_busy_retry_mut(conn, |conn| {
            let tx = conn.transaction()?;
            let mut updated = 0;
            {
                let mut stmt =
                    tx.prepare("UPDATE puzzles SET score = ? WHERE puzzle_hash = ?")?;
                for (hash, score) in items {
                    updated += stmt.execute(params![score, hash])?;
                }
            }
            tx.commit()?;
            Ok(updated)
        })
    }

    /// Highest-scored layouts first (unscored last), for curation.
    pub fn top_scored(&self, limit: usize) -> Result<Vec<StoredLayout>> {
        let sql = format!(
            "SELECT {SELECT_COLUMNS} FROM puzzles
             ORDER BY score IS NULL, score DESC, puzzle_hash
             LIMIT ?"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![limit as i64], row_to_layout)?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }

    /// Database size on disk.
    pub fn storage_bytes(&self) -> Result<u64> {
        let page_count: i64 = self
            .conn
            .query_row("PRAGMA page_count", [], |row| row.get(0))?;
        let page_size: i64 = self
            .conn
            .query_row("PRAGMA page_size", [], |row| row.get(0))?;
        Ok(page_count.saturating_mul(page_size).max(0) as u64)
    }
}

fn row_to_layout(row: &rusqlite::Row<'_>) -> rusqlite::Result<StoredLayout> {
    Ok(StoredLayout {
        hash: row.get(0)?,
        layout: Layout {
            rows: [row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?],
            cols: [row.get(5)?, row.get(6)?, row.get(7)?, row.get(8)?],
        },
        score: row.get(9)?,
    })
}

fn is_busy(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == ErrorCode::DatabaseBusy || e.code == ErrorCode::DatabaseLocked
    )
}

/// Run a write, retrying busy errors with exponential backoff before
/// escalating to `Error::StoreBusy`.
fn with_busy_retry<T>(mut op: impl FnMut() -> rusqlite::Result<T>) -> Result<T> {
    let mut delay = BUSY_BASE_DELAY;
    for attempt in 1..=MAX_WRITE_ATTEMPTS {
        match op() {
            Ok(value) => return Ok(value),
            Err(err) if is_busy(&err) && attempt < MAX_WRITE_ATTEMPTS => {
                tracing::debug!(attempt, "store busy, backing off {:?}", delay);
                std::thread::sleep(delay);
                delay *= 2;
            }
            Err(err) if is_busy(&err) => {
                return Err(Error::StoreBusy {
                    attempts: MAX_WRITE_ATTEMPTS,
                })
            }
            Err(err) => return Err(Error::Store(err)),
        }
    }
    unreachable!("retry loop always returns");
}

/// Transaction-shaped variant: the closure needs `&mut Connection`.
fn with_busy_retry_mut<T>(
    conn: &mut Connection,
    mut op: impl FnMut(&mut Connection) -> Result<T>,
) -> Result<T> {
    let mut delay = BUSY_BASE_DELAY;
    for attempt in 1..=MAX_WRITE_ATTEMPTS {
        match op(conn) {
            Ok(value) => return Ok(value),
            Err(Error::Store(err)) if is_busy(&err) && attempt < MAX_WRITE_ATTEMPTS => {
                tracing::debug!(attempt, "store busy, backing off {:?}", delay);
                std::thread::sleep(delay);
                delay *= 2;
            }
            Err(Error::Store(err)) if is_busy(&err) => {
                return Err(Error::StoreBusy {
                    attempts: MAX_WRITE_ATTEMPTS,
                })
            }
            Err(err) => return Err(err),
        }
    }
    unreachable!("retry loop always returns");
}
