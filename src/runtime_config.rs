//! Runtime configuration for the `cpmp-applyd` binary: where the database
//! and storage directory live, and where the admin API is reachable. Loaded
//! from a TOML file, not to be confused with
//! [`crate::config`], which builds the Caddy-compatible document itself.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::fs;

/// Root config structure for `cpmp-applyd`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub admin_api: AdminApiConfig,
    #[serde(default)]
    pub apply: ApplyConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file holding the relational model.
    pub path: PathBuf,
    /// Root directory for control-plane state written alongside the
    /// database: snapshots directly under it, rulesets under `coraza/`.
    pub config_dir: PathBuf,
}

impl DatabaseConfig {
    /// Caddy's own `storage.root`, nested two levels under `config_dir` so
    /// it never collides with the snapshot/ruleset files living there too.
    #[must_use]
    pub fn storage_dir(&self) -> PathBuf {
        self.config_dir.join("data/caddy")
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { path: PathBuf::from("cpmp.sqlite3"), config_dir: PathBuf::from("/var/lib/cpmp") }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AdminApiConfig {
    /// Base URL of the Caddy-compatible admin API, e.g. `http://localhost:2019`.
    pub base_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplyConfig {
    /// Number of snapshots to keep after a successful apply.
    #[serde(default = "default_snapshot_retention")]
    pub snapshot_retention: usize,
    /// Debounce window for the watch loop, so a burst of DB writes collapses
    /// into one apply.
    #[serde(default = "default_watch_debounce_ms")]
    pub watch_debounce_ms: u64,
}

impl Default for ApplyConfig {
    fn default() -> Self {
        Self {
            snapshot_retention: default_snapshot_retention(),
            watch_debounce_ms: default_watch_debounce_ms(),
        }
    }
}

fn default_snapshot_retention() -> usize {
    10
}

fn default_watch_debounce_ms() -> u64 {
    500
}

/// Reads and parses the `cpmp-applyd` runtime config from a TOML file.
///
/// # Errors
///
/// Returns an error if the file can't be read or doesn't parse as valid TOML.
pub async fn load(path: impl AsRef<Path>) -> eyre::Result<AppConfig> {
    let content = fs::read_to_string(path).await?;
    let config: AppConfig = toml::from_str(&content)?;
    Ok(config)
}
