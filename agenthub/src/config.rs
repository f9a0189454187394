//! Client configuration.
//!
//! Loaded from `~/.agenthub/config.toml` (or an explicit path), then
//! overridden by `AGENTHUB_BASE_URL` and finally by CLI flags.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

const CONFIG_DIR: &str = ".agenthub";
const CONFIG_FILE: &str = "config.toml";
const BASE_URL_ENV: &str = "AGENTHUB_BASE_URL";

/// Runtime settings for the backend client and the local retrieval path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Backend API root, e.g. `http://127.0.0.1:58240/api`.
    pub base_url: String,
    /// Timeout for non-streaming requests.
    pub request_timeout_secs: u64,
    /// Simulated latency before a knowledge-base answer is returned.
    pub retrieval_latency_ms: u64,
    /// Capacity of the channel between the stream reader and the consumer.
    pub stream_buffer: usize,
    /// Upper bound on chunk size when ingesting documents.
    pub chunk_max_chars: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:58240/api".to_string(),
            request_timeout_secs: 30,
            retrieval_latency_ms: 600,
            stream_buffer: 64,
            chunk_max_chars: 800,
        }
    }
}

impl Config {
    /// Load config from `path`, or from the default location when `None`.
    ///
    /// A missing file is not an error; defaults are used instead.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => Some(p.to_path_buf()),
            None => default_config_path(),
        };

        let mut config = match path {
            Some(ref p) if p.exists() => Self::from_file(p)?,
            _ => Self::default(),
        };

        if let Ok(url) = std::env::var(BASE_URL_ENV) {
            if !url.trim().is_empty() {
                config.base_url = url;
            }
        }

        Ok(config)
    }

    /// Parse a TOML config file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        toml::from_str(&text)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))
    }

    /// Apply a CLI `--base-url` override.
    #[must_use]
    pub fn with_base_url(mut self, base_url: Option<String>) -> Self {
        if let Some(url) = base_url {
            self.base_url = url;
        }
        self
    }

    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub const fn retrieval_latency(&self) -> Duration {
        Duration::from_millis(self.retrieval_latency_ms)
    }

    /// Base URL without a trailing slash.
    pub fn api_root(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }
}

fn default_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(CONFIG_DIR).join(CONFIG_FILE))
}
