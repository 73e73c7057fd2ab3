//! Error types shared across the generator pipeline.
//!
//! Transient store contention is retried locally (see `storage`); only the
//! escalated form appears here. `FillUnreachable` is deliberately absent: a
//! stored layout with an empty cell is scheduled for deletion, not reported
//! as an error.

use thiserror::Error;

/// Errors that can occur during corpus processing, search, and cleaning.
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed word->labels corpus entry. Fatal to any run.
    #[error("corpus integrity: {0}")]
    CorpusIntegrity(String),

    /// Store contention that survived bounded backoff.
    #[error("store busy after {attempts} attempts")]
    StoreBusy { attempts: u32 },

    /// Non-busy store failure. Fatal to the enclosing chunk.
    #[error("store failure: {0}")]
    Store(#[from] rusqlite::Error),

    /// A helper process failed to reply within the timeout.
    #[error("{role} helper stalled after {secs}s")]
    HelperStall { role: &'static str, secs: u64 },

    /// The writer confirmed fewer deletions than the worker reported
    /// invalid. The store cannot be assumed consistent afterwards.
    #[error("fatal mismatch: {invalid} invalid layouts but {deleted} confirmed deletions")]
    FatalMismatch { invalid: usize, deleted: usize },

    /// Malformed or unexpected helper protocol message.
    #[error("helper protocol: {0}")]
    Protocol(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Short classifier used for the per-kind summary printed at
    /// termination.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::CorpusIntegrity(_) => "corpus-integrity",
            Error::StoreBusy { .. } => "store-busy",
            Error::Store(_) => "store-failure",
            Error::HelperStall { .. } => "helper-stall",
            Error::FatalMismatch { .. } => "fatal-mismatch",
            Error::Protocol(_) => "protocol",
            Error::Io(_) => "io",
            Error::Json(_) => "json",
        }
    }

    /// Whether the whole run must stop, as opposed to a single chunk.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::CorpusIntegrity(_) | Error::FatalMismatch { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
