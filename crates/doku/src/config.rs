//! Configuration loading for the doku CLI.
//!
//! Precedence: command-line flags, then `config.toml` in the platform
//! config directory, then the built-in defaults.

use anyhow::{Context, Result};
use directories::ProjectDirs;
use doku_core::{cleaner, search};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize, Default, Clone)]
pub struct Config {
    pub data: Option<DataConfig>,
    pub search: Option<SearchConfig>,
    pub clean: Option<CleanConfig>,
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct DataConfig {
    pub dir: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct SearchConfig {
    pub workers: Option<usize>,
    pub save_interval: Option<u64>,
    pub log_interval: Option<u64>,
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct CleanConfig {
    pub workers: Option<usize>,
    pub batch_size: Option<usize>,
    pub helper_timeout_secs: Option<u64>,
}

impl Config {
    pub fn data_dir(&self) -> Option<PathBuf> {
        self.data.as_ref().and_then(|d| d.dir.clone())
    }

    pub fn search_workers(&self) -> usize {
        self.search
            .as_ref()
            .and_then(|s| s.workers)
            .unwrap_or(search::DEFAULT_WORKERS)
    }

    pub fn save_interval(&self) -> u64 {
        self.search
            .as_ref()
            .and_then(|s| s.save_interval)
            .unwrap_or(search::DEFAULT_SAVE_INTERVAL)
    }

    pub fn log_interval(&self) -> u64 {
        self.search
            .as_ref()
            .and_then(|s| s.log_interval)
            .unwrap_or(search::DEFAULT_LOG_INTERVAL)
    }

    pub fn clean_workers(&self) -> usize {
        self.clean
            .as_ref()
            .and_then(|c| c.workers)
            .unwrap_or(search::DEFAULT_WORKERS)
    }

    pub fn clean_batch_size(&self) -> usize {
        self.clean
            .as_ref()
            .and_then(|c| c.batch_size)
            .unwrap_or(cleaner::DEFAULT_BATCH_SIZE)
    }

    pub fn helper_timeout(&self) -> Duration {
        self.clean
            .as_ref()
            .and_then(|c| c.helper_timeout_secs)
            .map(Duration::from_secs)
            .unwrap_or(cleaner::DEFAULT_HELPER_TIMEOUT)
    }
}

pub fn default_config_path() -> Result<PathBuf> {
    let dirs = ProjectDirs::from("", "", "doku").context("Could not determine config directory")?;
    Ok(dirs.config_dir().join("config.toml"))
}

pub fn load_config(path: &Path) -> Result<Config> {
    if !path.exists() {
        return Ok(Config::default());
    }
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    let config: Config =
        toml::from_str(&contents).context("Failed to parse config file as TOML")?;
    Ok(config)
}

/// Platform data directory, or `./doku-data` when none is available.
pub fn default_data_dir() -> PathBuf {
    ProjectDirs::from("", "", "doku")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("doku-data"))
}

/// The on-disk layout under the data directory.
#[derive(Debug, Clone)]
pub struct DataPaths {
    pub root: PathBuf,
}

impl DataPaths {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn words(&self) -> PathBuf {
        self.root.join("words.json")
    }

    pub fn labels(&self) -> PathBuf {
        self.root.join("labels.json")
    }

    pub fn label_scores(&self) -> PathBuf {
        self.root.join("label_scores.json")
    }

    pub fn db(&self) -> PathBuf {
        self.root.join("puzzles.db")
    }

    pub fn daily(&self) -> PathBuf {
        self.root.join("daily.json")
    }

    pub fn checkpoints(&self) -> PathBuf {
        self.root.join("checkpoints")
    }
}
