//! doku - Connecdoku puzzle generator CLI
//!
//! Usage:
//!   doku normalize            Canonicalize the corpus
//!   doku search               Find new layouts (resumable)
//!   doku clean                Revalidate and rescore stored layouts
//!   doku curate               Choose the sixteen words for a layout
//!   doku status               Show corpus and store statistics

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use crossbeam_channel::unbounded;
use doku_core::{
    cleaner, curate, search, Corpus, CurationSheet, DailyLog, LabelScores, Store, StoredLayout,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

mod config;

use config::{default_config_path, default_data_dir, load_config, Config, DataPaths};

/// Raised by the SIGINT handler; workers drain, checkpoint, and exit.
static SHUTDOWN: AtomicBool = AtomicBool::new(false);

extern "C" fn handle_sigint(_signal: libc::c_int) {
    SHUTDOWN.store(true, Ordering::Relaxed);
}

fn install_sigint_handler() {
    let handler: extern "C" fn(libc::c_int) = handle_sigint;
    unsafe {
        libc::signal(libc::SIGINT, handler as libc::sighandler_t);
    }
}

/// Candidates considered when `curate` runs without an explicit hash.
const CURATE_CANDIDATES: usize = 100;

#[derive(Parser)]
#[command(name = "doku")]
#[command(about = "Connecdoku - category grid puzzle generator and curator")]
#[command(version)]
struct Cli {
    /// Data directory (defaults to the platform data dir)
    #[arg(long, global = true, value_name = "PATH")]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Canonicalize words.json and rebuild labels.json
    Normalize,
    /// Search for new layouts
    Search {
        /// Worker count
        #[arg(long, value_name = "N")]
        workers: Option<usize>,
        /// Checkpoint every N iterations
        #[arg(long, value_name = "N")]
        save_interval: Option<u64>,
        /// Progress report every N iterations
        #[arg(long, value_name = "N")]
        log_interval: Option<u64>,
        /// Ignore existing checkpoints and restart
        #[arg(long)]
        fresh: bool,
    },
    /// Revalidate every stored layout against the current corpus
    Clean {
        /// Worker count
        #[arg(long, value_name = "N")]
        workers: Option<usize>,
        /// Writes queued per worker before a flush
        #[arg(long, value_name = "N")]
        batch_size: Option<usize>,
        /// Validate through doku-worker children instead of inline
        #[arg(long)]
        helper_validate: bool,
    },
    /// Choose the sixteen words for a stored layout
    Curate {
        /// Fingerprint of the layout to curate (default: best unused)
        #[arg(long, value_name = "HASH")]
        hash: Option<String>,
    },
    /// Show corpus and store statistics
    Status,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();
    install_sigint_handler();

    let cli = Cli::parse();
    let config = match default_config_path().and_then(|path| load_config(&path)) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Failed to load config: {err}. Using defaults.");
            Config::default()
        }
    };
    let data_dir = cli
        .data_dir
        .or_else(|| config.data_dir())
        .unwrap_or_else(default_data_dir);
    let paths = DataPaths::new(data_dir);

    let result = match cli.command {
        Commands::Normalize => cmd_normalize(&paths),
        Commands::Search {
            workers,
            save_interval,
            log_interval,
            fresh,
        } => cmd_search(&paths, &config, workers, save_interval, log_interval, fresh),
        Commands::Clean {
            workers,
            batch_size,
            helper_validate,
        } => cmd_clean(&paths, &config, workers, batch_size, helper_validate),
        Commands::Curate { hash } => cmd_curate(&paths, hash),
        Commands::Status => cmd_status(&paths),
    };

    if let Err(err) = &result {
        if let Some(core) = err.downcast_ref::<doku_core::Error>() {
            eprintln!("{} {}", "error kind:".red(), core.kind());
        }
    }
    result
}

/// Load and canonicalize the corpus from disk. Every command works from
/// the normalized form, so a stale words.json never skews a run.
fn load_corpus(paths: &DataPaths) -> Result<Corpus> {
    let raw = doku_core::load_words(&paths.words())
        .with_context(|| format!("loading corpus {}", paths.words().display()))?;
    Ok(Corpus::normalize(raw))
}

fn cmd_normalize(paths: &DataPaths) -> Result<()> {
    let raw = doku_core::load_words(&paths.words())
        .with_context(|| format!("loading corpus {}", paths.words().display()))?;
    let (corpus, report) = Corpus::normalize_with_report(raw);

    doku_core::save_words(&paths.words(), &corpus.words)?;
    doku_core::save_labels(&paths.labels(), &corpus.labels)?;

    let general = corpus.general_labels().count();
    println!(
        "{} {} words ({} folded), {} general labels",
        "normalized:".green(),
        report.output_words,
        report.folded,
        general
    );
    println!(
        "  patterns: {} stripped, {} derived",
        report.stripped_patterns, report.added_patterns
    );
    Ok(())
}

fn cmd_search(
    paths: &DataPaths,
    config: &Config,
    workers: Option<usize>,
    save_interval: Option<u64>,
    log_interval: Option<u64>,
    fresh: bool,
) -> Result<()> {
    let corpus = load_corpus(paths)?;
    let corpus_hash = corpus.hash();

    let started = std::time::Instant::now();
    let graph = doku_core::build_label_graph(&corpus);
    tracing::info!(
        labels = graph.len(),
        words = graph.words.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "label graph built"
    );

    let search_config = search::SearchConfig {
        workers: workers.unwrap_or_else(|| config.search_workers()),
        save_interval: save_interval.unwrap_or_else(|| config.save_interval()),
        log_interval: log_interval.unwrap_or_else(|| config.log_interval()),
        fresh,
        checkpoint_dir: paths.checkpoints(),
    };

    let (tx, rx) = unbounded::<search::SearchTick>();
    let render = std::thread::spawn(move || {
        let bar = spinner("searching...");
        let mut per_worker: HashMap<usize, search::SearchTick> = HashMap::new();
        for tick in rx {
            tracing::info!(
                worker = tick.worker,
                iter = tick.iter,
                depth = tick.depth,
                root = tick.root_ptr,
                solved = tick.solved,
                "search progress"
            );
            per_worker.insert(tick.worker, tick);
            let iters: u64 = per_worker.values().map(|t| t.iter).sum();
            let solved: u64 = per_worker.values().map(|t| t.solved).sum();
            let front = per_worker.values().map(|t| t.root_ptr).min().unwrap_or(0);
            let positions = per_worker.values().map(|t| t.positions).max().unwrap_or(0);
            bar.set_message(format!(
                "search: {iters} iterations, {solved} layouts, front {front}/{positions}"
            ));
        }
        bar.finish_and_clear();
    });

    let outcome = search::run(
        &graph,
        &paths.db(),
        &corpus_hash,
        &search_config,
        Some(tx),
        &SHUTDOWN,
    )?;
    render.join().expect("render thread panicked");

    let store = Store::open(&paths.db())?;
    println!(
        "{} {} new, {} duplicate, {} iterations, {} stored total{}",
        "search:".green(),
        outcome.inserted,
        outcome.duplicates,
        outcome.iterations,
        store.count()?,
        if outcome.interrupted {
            " (interrupted, resumable)".yellow().to_string()
        } else {
            String::new()
        }
    );
    Ok(())
}

fn cmd_clean(
    paths: &DataPaths,
    config: &Config,
    workers: Option<usize>,
    batch_size: Option<usize>,
    helper_validate: bool,
) -> Result<()> {
    let corpus = load_corpus(paths)?;
    let scores = LabelScores::load(&paths.label_scores())?;
    if scores.is_empty() {
        tracing::warn!("no label scores on disk; surviving layouts score zero");
    }

    let clean_config = cleaner::CleanConfig {
        workers: workers.unwrap_or_else(|| config.clean_workers()),
        batch_size: batch_size.unwrap_or_else(|| config.clean_batch_size()),
        helper_timeout: config.helper_timeout(),
        worker_bin: None,
        validate_corpus: helper_validate.then(|| paths.words()),
    };

    let total = Store::open(&paths.db())?.count()?;
    let (tx, rx) = unbounded::<cleaner::CleanTick>();
    let render = std::thread::spawn(move || {
        let bar = ProgressBar::new(total);
        bar.set_style(
            ProgressStyle::with_template("{bar:40.green} {pos}/{len} {msg}")
                .expect("static template"),
        );
        let mut per_worker: HashMap<usize, u64> = HashMap::new();
        let mut deleted = 0;
        for tick in rx {
            tracing::info!(
                worker = tick.worker,
                processed = tick.processed,
                total = tick.total,
                valid = tick.valid_delta,
                invalid = tick.invalid_delta,
                deleted = tick.deleted_delta,
                "clean progress"
            );
            per_worker.insert(tick.worker, tick.processed);
            deleted += tick.deleted_delta;
            bar.set_position(per_worker.values().sum());
            bar.set_message(format!("{deleted} deleted"));
        }
        bar.finish_and_clear();
    });

    let outcome = cleaner::run(
        &corpus,
        &scores,
        &paths.db(),
        &clean_config,
        Some(tx),
        &SHUTDOWN,
    )?;
    render.join().expect("render thread panicked");

    println!(
        "{} {} processed, {} valid, {} invalid, {} deleted",
        "clean:".green(),
        outcome.processed,
        outcome.valid,
        outcome.invalid,
        outcome.deleted
    );
    if outcome.failed_chunks > 0 {
        println!(
            "{} {} chunk(s) aborted; rerun to cover them",
            "warning:".yellow(),
            outcome.failed_chunks
        );
        for (kind, count) in &outcome.error_kinds {
            println!("  {kind}: {count}");
        }
        if outcome.processed == 0 {
            bail!("clean made no progress: every chunk aborted");
        }
    }
    if let Some((label, count)) = outcome.tallies.iter().max_by_key(|(_, c)| **c) {
        tracing::info!(label = %label, count = *count, "most common surviving label");
    }
    Ok(())
}

fn cmd_curate(paths: &DataPaths, hash: Option<String>) -> Result<()> {
    let corpus = load_corpus(paths)?;
    let store = Store::open(&paths.db())?;
    let mut daily = DailyLog::load(&paths.daily())?;

    let candidates: Vec<StoredLayout> = match &hash {
        Some(hash) => match store.get(hash)? {
            Some(stored) => vec![stored],
            None => bail!("no stored layout with fingerprint {hash}"),
        },
        None => store
            .top_scored(CURATE_CANDIDATES)?
            .into_iter()
            .filter(|stored| !daily.is_retired(&stored.hash))
            .collect(),
    };
    if candidates.is_empty() {
        println!("nothing to curate: every stored layout is used or skipped");
        return Ok(());
    }

    let stdin = std::io::stdin();
    let mut input = stdin.lock();
    let mut out = std::io::stdout();
    for stored in candidates {
        let outcome = curate_layout(&mut input, &mut out, &corpus, &mut daily, &stored)?;
        daily.save(&paths.daily())?;
        match outcome {
            CurateOutcome::Committed => {
                println!(
                    "{} puzzle #{} recorded",
                    "committed:".green(),
                    daily.puzzles.len()
                );
                return Ok(());
            }
            CurateOutcome::Skipped => {
                if hash.is_some() {
                    return Ok(());
                }
                // Fall through to the next candidate.
            }
            CurateOutcome::Aborted => return Ok(()),
        }
    }
    println!("no candidate survived curation");
    Ok(())
}

fn cmd_status(paths: &DataPaths) -> Result<()> {
    let corpus = load_corpus(paths)?;
    let general = corpus.general_labels().count();
    let eligible = corpus
        .general_labels()
        .filter(|(_, pop)| pop.len() >= doku_core::adjacency::MIN_POPULATION)
        .count();
    println!(
        "{} {} words, {} general labels ({} search-eligible)",
        "corpus:".green(),
        corpus.words.len(),
        general,
        eligible
    );

    let graph = doku_core::build_label_graph(&corpus);
    let edges = |m: &doku_core::BitMatrix| -> usize {
        (0..m.size()).map(|i| m.degree(i)).sum::<usize>() / 2
    };
    println!(
        "{} {} labels survive pruning, {} 1-away edges, {} 2-away edges",
        "graph:".green(),
        graph.len(),
        edges(&graph.r1),
        edges(&graph.r2)
    );

    let store = Store::open(&paths.db())?;
    println!(
        "{} {} layouts, {} KiB on disk",
        "store:".green(),
        store.count()?,
        store.storage_bytes()? / 1024
    );

    let daily = DailyLog::load(&paths.daily())?;
    println!(
        "{} {} committed, {} skipped",
        "daily:".green(),
        daily.puzzles.len(),
        daily.skipped.len()
    );
    Ok(())
}

fn spinner(message: &str) -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    bar.set_style(
        ProgressStyle::with_template("{spinner:.green} {msg} [{elapsed}]")
            .expect("static template"),
    );
    bar.set_message(message.to_string());
    bar.enable_steady_tick(std::time::Duration::from_millis(100));
    bar
}

enum CurateOutcome {
    Committed,
    Skipped,
    Aborted,
}

/// Walk a human through one layout: auto-assign singleton cells, prompt
/// for the rest, confirm, and commit. A failed commit or an explicit
/// skip marks the layout skipped in the daily log; the store row is
/// untouched either way.
fn curate_layout<R: BufRead, W: Write>(
    input: &mut R,
    out: &mut W,
    corpus: &Corpus,
    daily: &mut DailyLog,
    stored: &StoredLayout,
) -> Result<CurateOutcome> {
    let sheet = match CurationSheet::build(corpus, &stored.layout, daily) {
        Some(sheet) => sheet,
        None => {
            writeln!(
                out,
                "layout {} has an empty cell under the current corpus; skipping",
                stored.hash
            )?;
            daily.mark_skipped(&stored.hash);
            return Ok(CurateOutcome::Skipped);
        }
    };

    writeln!(out, "curating {}", sheet.hash)?;
    for (label, uses) in &sheet.label_uses {
        writeln!(out, "  {label} (used {uses})")?;
    }

    let auto = sheet.auto_assignments();
    let mut chosen: [[Option<String>; 4]; 4] = auto.clone();
    for i in 0..4 {
        for j in 0..4 {
            if let Some(word) = &auto[i][j] {
                writeln!(
                    out,
                    "cell ({i},{j}) {} x {}: {word} (only option)",
                    stored.layout.rows[i], stored.layout.cols[j]
                )?;
                continue;
            }
            let options = &sheet.cells[i][j];
            writeln!(
                out,
                "cell ({i},{j}) {} x {}:",
                stored.layout.rows[i], stored.layout.cols[j]
            )?;
            for (k, option) in options.iter().enumerate() {
                writeln!(out, "  {}. {} (used {})", k + 1, option.word, option.uses)?;
            }
            loop {
                write!(out, "choice [1-{}, s skips]: ", options.len())?;
                out.flush()?;
                let Some(line) = read_line(input)? else {
                    return Ok(CurateOutcome::Aborted);
                };
                let line = line.trim();
                if line.eq_ignore_ascii_case("s") {
                    daily.mark_skipped(&stored.hash);
                    return Ok(CurateOutcome::Skipped);
                }
                match line.parse::<usize>() {
                    Ok(k) if (1..=options.len()).contains(&k) => {
                        chosen[i][j] = Some(options[k - 1].word.clone());
                        break;
                    }
                    _ => writeln!(out, "enter a number between 1 and {}", options.len())?,
                }
            }
        }
    }

    let words: [[String; 4]; 4] = std::array::from_fn(|i| {
        std::array::from_fn(|j| chosen[i][j].clone().expect("all cells assigned"))
    });

    render_board(out, &stored.layout, &words)?;
    write!(out, "commit this puzzle? [y/n]: ")?;
    out.flush()?;
    match read_line(input)? {
        Some(line) if line.trim().eq_ignore_ascii_case("y") => {}
        Some(_) => {
            daily.mark_skipped(&stored.hash);
            return Ok(CurateOutcome::Skipped);
        }
        None => return Ok(CurateOutcome::Aborted),
    }

    match curate::commit(daily, corpus, &stored.layout, &words) {
        Ok(()) => Ok(CurateOutcome::Committed),
        Err(err) => {
            writeln!(out, "commit failed: {err}")?;
            daily.mark_skipped(&stored.hash);
            Ok(CurateOutcome::Skipped)
        }
    }
}

/// Print the assembled board: column labels across the top, one row per
/// row label.
fn render_board<W: Write>(
    out: &mut W,
    layout: &doku_core::Layout,
    words: &[[String; 4]; 4],
) -> Result<()> {
    let width = words
        .iter()
        .flatten()
        .map(|w| w.chars().count())
        .chain(layout.labels().map(|l| l.chars().count()))
        .max()
        .unwrap_or(0)
        .max(1);
    write!(out, "{:width$} ", "")?;
    for col in &layout.cols {
        write!(out, " {col:width$}")?;
    }
    writeln!(out)?;
    for (i, row) in layout.rows.iter().enumerate() {
        write!(out, "{row:width$} ")?;
        for j in 0..4 {
            write!(out, " {:width$}", words[i][j])?;
        }
        writeln!(out)?;
    }
    Ok(())
}

fn read_line<R: BufRead>(input: &mut R) -> Result<Option<String>> {
    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Ok(None);
    }
    Ok(Some(line))
}
