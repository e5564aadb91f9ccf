//! User settings loaded from `config.json`.
//!
//! Every field is optional. Command-line flags override settings, and settings
//! override built-in defaults. A missing file is the same as an empty one.
use crate::worker::RetryPolicy;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_USER_AGENT: &str = concat!("splitfetch/", env!("CARGO_PKG_VERSION"));
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_READ_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Default number of range workers.
    pub workers: Option<usize>,
    /// Default destination directory.
    pub dir: Option<PathBuf>,
    /// Attempts per range before a worker gives up.
    pub max_attempts: Option<u32>,
    pub initial_backoff_ms: Option<u64>,
    pub max_backoff_ms: Option<u64>,
    pub connect_timeout_secs: Option<u64>,
    /// Maximum idle time between two reads of a response body.
    pub read_timeout_secs: Option<u64>,
    pub user_agent: Option<String>,
}

impl Settings {
    /// `$XDG_CONFIG_HOME/splitfetch/config.json` or the platform equivalent.
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("splitfetch").join("config.json"))
    }

    /// Loads settings from the default location, falling back to defaults when
    /// there is no config file.
    pub fn load() -> Result<Self> {
        match Self::config_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Self::default()),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("Invalid settings in {}", path.display()))
    }

    /// Retry policy with any configured values applied over the defaults.
    pub fn retry_policy(&self) -> RetryPolicy {
        let defaults = RetryPolicy::default();
        RetryPolicy {
            max_attempts: self.max_attempts.unwrap_or(defaults.max_attempts).max(1),
            initial_backoff: self
                .initial_backoff_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.initial_backoff),
            max_backoff: self
                .max_backoff_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.max_backoff),
        }
    }

    /// HTTP client shared by the probe and every worker.
    ///
    /// Only connect and read timeouts are set: a total request timeout would cut
    /// off large ranges that are still making progress.
    pub fn http_client(&self) -> Result<reqwest::Client> {
        let user_agent = self.user_agent.as_deref().unwrap_or(DEFAULT_USER_AGENT);
        reqwest::Client::builder()
            .user_agent(user_agent)
            .connect_timeout(Duration::from_secs(
                self.connect_timeout_secs
                    .unwrap_or(DEFAULT_CONNECT_TIMEOUT_SECS),
            ))
            .read_timeout(Duration::from_secs(
                self.read_timeout_secs.unwrap_or(DEFAULT_READ_TIMEOUT_SECS),
            ))
            .build()
            .context("Failed to build HTTP client")
    }
}
