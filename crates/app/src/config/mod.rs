use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use usage_db::{DEFAULT_DAY_HISTORY, DEFAULT_MONTH_HISTORY};

use crate::error::Result;

const DEFAULT_SUMMARY_DELAY_MS: u64 = 2000;
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5000;

/// Runtime settings for the usage service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    pub db_path: PathBuf,
    /// Quiet period before a user's pending summary update runs.
    #[serde(default = "default_summary_delay_ms")]
    pub summary_delay_ms: u64,
    #[serde(default = "default_day_history_limit")]
    pub day_history_limit: usize,
    #[serde(default = "default_month_history_limit")]
    pub month_history_limit: usize,
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

impl AppConfig {
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
            summary_delay_ms: DEFAULT_SUMMARY_DELAY_MS,
            day_history_limit: DEFAULT_DAY_HISTORY,
            month_history_limit: DEFAULT_MONTH_HISTORY,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
        }
    }

    /// Reads a TOML config file. A relative `db_path` is resolved against the
    /// directory holding the file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)?;
        let mut config = Self::from_toml_str(&contents)?;
        if config.db_path.is_relative()
            && let Some(dir) = path.parent()
        {
            config.db_path = dir.join(&config.db_path);
        }
        Ok(config)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    pub fn summary_delay(&self) -> Duration {
        Duration::from_millis(self.summary_delay_ms)
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

fn default_summary_delay_ms() -> u64 {
    DEFAULT_SUMMARY_DELAY_MS
}

fn default_day_history_limit() -> usize {
    DEFAULT_DAY_HISTORY
}

fn default_month_history_limit() -> usize {
    DEFAULT_MONTH_HISTORY
}

fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}
