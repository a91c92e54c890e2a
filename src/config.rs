//! Optional YAML configuration
//!
//! Everything the config file can hold is also reachable through CLI
//! flags; flags win. The core never reads this, it is resolved up
//! front and handed down as plain values.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Aggregators used for stamping
    pub calendars: Vec<String>,
    /// Calendars trusted for upgrades
    pub whitelist: Vec<String>,
    /// Esplora-compatible block explorer for verification
    pub esplora_url: Option<String>,
    /// Proof cache location; defaults to ~/.cache/otskit/timestamps
    pub cache_dir: Option<PathBuf>,
    /// Per-request timeout in seconds
    pub timeout_secs: Option<u64>,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        serde_yaml::from_str(&text).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    /// Where proof fragments are cached between upgrade runs
    pub fn cache_dir(&self) -> Option<PathBuf> {
        if let Some(dir) = &self.cache_dir {
            return Some(dir.clone());
        }
        std::env::var_os("HOME")
            .map(|home| PathBuf::from(home).join(".cache").join("otskit").join("timestamps"))
    }
}
