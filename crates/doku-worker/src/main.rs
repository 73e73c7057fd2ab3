//! doku-worker: helper child process for the cleaner
//!
//! Speaks the line-delimited JSON protocol on stdin/stdout in one of two
//! roles:
//! - `validate`: fillability checks against a corpus snapshot
//! - `write`: batched store deletions and score upserts
//!
//! The first message must be `Init`; the helper replies `Ready` once its
//! inputs are loaded. Replies are whole lines, flushed before the next
//! read, so the parent never sees a partial message. Shutdown or a
//! closed pipe ends the process cleanly.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use doku_core::{
    fillable_in_corpus, load_words, read_message, write_message, Corpus, HelperReply,
    HelperRequest, Layout, Store,
};
use std::io::{BufRead, Write};

#[derive(Parser)]
#[command(name = "doku-worker")]
#[command(about = "Connecdoku helper process - layout validator and store writer")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    role: Role,
}

#[derive(Subcommand)]
enum Role {
    /// Check layouts for fillability against a corpus
    Validate,
    /// Apply batched deletions and score updates to the store
    Write,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let stdin = std::io::stdin().lock();
    let stdout = std::io::stdout().lock();
    match cli.role {
        Role::Validate => run_validate(stdin, stdout),
        Role::Write => run_write(stdin, stdout),
    }
}

/// Read the handshake. `Ok(None)` means the parent closed the pipe
/// before initializing, which is a clean exit.
fn handshake<R: BufRead>(reader: &mut R) -> Result<Option<HelperRequest>> {
    match read_message::<_, HelperRequest>(reader)? {
        Some(HelperRequest::Shutdown) | None => Ok(None),
        Some(request) => Ok(Some(request)),
    }
}

fn run_validate<R: BufRead, W: Write>(mut reader: R, mut writer: W) -> Result<()> {
    let corpus = match handshake(&mut reader)? {
        Some(HelperRequest::Init {
            corpus: Some(path), ..
        }) => {
            let raw = load_words(&path)
                .with_context(|| format!("loading corpus {}", path.display()))?;
            Corpus::normalize(raw)
        }
        Some(other) => {
            write_message(&mut writer, &HelperReply::Error("expected Init".to_string()))?;
            bail!("validator got {other:?} before Init");
        }
        None => return Ok(()),
    };
    write_message(&mut writer, &HelperReply::Ready)?;
    tracing::debug!(words = corpus.words.len(), "validator ready");

    loop {
        let request = match read_message::<_, HelperRequest>(&mut reader) {
            Ok(Some(request)) => request,
            Ok(None) => return Ok(()),
            Err(err) => {
                write_message(&mut writer, &HelperReply::Error(err.to_string()))?;
                continue;
            }
        };
        let reply = match request {
            HelperRequest::Validate { rows, cols } => {
                if fillable_in_corpus(&corpus, &Layout::new(rows, cols)) {
                    HelperReply::Valid
                } else {
                    HelperReply::Invalid
                }
            }
            HelperRequest::Shutdown => return Ok(()),
            other => HelperReply::Error(format!("validator cannot handle {other:?}")),
        };
        write_message(&mut writer, &reply)?;
    }
}

fn run_write<R: BufRead, W: Write>(mut reader: R, mut writer: W) -> Result<()> {
    let mut store = match handshake(&mut reader)? {
        Some(HelperRequest::Init { db: Some(path), .. }) => Store::open(&path)
            .with_context(|| format!("opening store {}", path.display()))?,
        Some(other) => {
            write_message(&mut writer, &HelperReply::Error("expected Init".to_string()))?;
            bail!("writer got {other:?} before Init");
        }
        None => return Ok(()),
    };
    write_message(&mut writer, &HelperReply::Ready)?;
    tracing::debug!("writer ready");

    loop {
        let request = match read_message::<_, HelperRequest>(&mut reader) {
            Ok(Some(request)) => request,
            Ok(None) => return Ok(()),
            Err(err) => {
                write_message(&mut writer, &HelperReply::Error(err.to_string()))?;
                continue;
            }
        };
        let reply = match request {
            HelperRequest::Delete { hashes } => match store.delete(&hashes) {
                Ok(deleted) => HelperReply::Ack { deleted },
                Err(err) => HelperReply::Error(err.to_string()),
            },
            HelperRequest::UpsertScores { items } => match store.upsert_scores(&items) {
                Ok(_) => HelperReply::Ack { deleted: 0 },
                Err(err) => HelperReply::Error(err.to_string()),
            },
            HelperRequest::Shutdown => return Ok(()),
            other => HelperReply::Error(format!("writer cannot handle {other:?}")),
        };
        write_message(&mut writer, &reply)?;
    }
}
