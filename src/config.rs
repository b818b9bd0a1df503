// ⚙️ Indexer configuration - loaded from JSON, every field has a default

use crate::error::{IndexerError, Result};
use crate::jitter::DEFAULT_MAX_JITTER_MS;
use crate::journal::DEFAULT_JOURNAL_CAPACITY;
use crate::ranking::DEFAULT_CAPACITY;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Upper bound for `ranking_capacity`; rankings are scanned linearly
pub const MAX_RANKING_CAPACITY: usize = 10_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexerConfig {
    /// Ranked accounts kept per account type
    #[serde(default = "default_capacity")]
    pub ranking_capacity: usize,

    /// Upper bound of the random offset added to each callback
    #[serde(default = "default_max_jitter_ms")]
    pub max_jitter_ms: u64,

    /// Seed for reproducible jitter; entropy when unset
    #[serde(default)]
    pub jitter_seed: Option<u64>,

    /// Audit events retained in memory; older ones are dropped
    #[serde(default = "default_journal_capacity")]
    pub journal_capacity: usize,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub log_json: bool,
}

fn default_capacity() -> usize {
    DEFAULT_CAPACITY
}

fn default_max_jitter_ms() -> u64 {
    DEFAULT_MAX_JITTER_MS
}

fn default_journal_capacity() -> usize {
    DEFAULT_JOURNAL_CAPACITY
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for IndexerConfig {
    fn default() -> Self {
        IndexerConfig {
            ranking_capacity: default_capacity(),
            max_jitter_ms: default_max_jitter_ms(),
            jitter_seed: None,
            journal_capacity: default_journal_capacity(),
            log_level: default_log_level(),
            log_json: false,
        }
    }
}

impl IndexerConfig {
    /// Load config from JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| IndexerError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let config: IndexerConfig = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.ranking_capacity == 0 {
            return Err(IndexerError::Config(
                "ranking_capacity must be at least 1".to_string(),
            ));
        }
        if self.ranking_capacity > MAX_RANKING_CAPACITY {
            return Err(IndexerError::Config(format!(
                "ranking_capacity {} exceeds maximum {}",
                self.ranking_capacity, MAX_RANKING_CAPACITY
            )));
        }
        Ok(())
    }
}
