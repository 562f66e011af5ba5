//! Configuration file support for tally.
//!
//! Configuration is loaded with the following precedence (highest to lowest):
//! 1. CLI flags
//! 2. Environment variables (prefixed with `TALLY_`, nested with `__`, e.g. `TALLY_GITHUB__TOKEN`)
//! 3. Config file (./tally.toml, then ~/.config/tally/config.toml)
//! 4. Built-in defaults
//!
//! The database URL defaults to `sqlite://~/.local/state/tally/tally.db` on Linux
//! (using the XDG state directory) if not explicitly configured.
//!
//! Example config file:
//! ```toml
//! [database]
//! url = "postgres://localhost/tally"
//!
//! [github]
//! enabled = true
//! organization = "acme"
//! token = "ghp_..."  # or use TALLY_GITHUB__TOKEN
//!
//! [bitbucket]
//! enabled = true
//! workspace = "acme"
//! username = "ci-bot"
//! app_password = "..."  # or use TALLY_BITBUCKET__APP_PASSWORD
//!
//! [ingest]
//! default_since = "2024-01-01T00:00:00Z"
//! not_ready_max_attempts = 4
//! not_ready_delay_ms = 2000
//! repository_stats = true
//!
//! [schedule]
//! interval_hours = 168
//! ```

use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use directories::ProjectDirs;
use serde::Deserialize;

use tally::ingest::{IngestOptions, default_since};
use tally::retry::{DEFAULT_NOT_READY_ATTEMPTS, DEFAULT_NOT_READY_DELAY_MS, NotReadyPolicy};

/// Default interval between scheduled runs: one week.
pub const DEFAULT_INTERVAL_HOURS: u64 = 168;

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub github: GitHubSection,
    pub bitbucket: BitbucketSection,
    pub ingest: IngestSection,
    pub schedule: ScheduleSection,
}

/// Database configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Database connection URL.
    /// Supports sqlite:// and postgres:// schemes.
    pub url: Option<String>,
}

/// GitHub source settings.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct GitHubSection {
    pub enabled: bool,
    pub organization: Option<String>,
    /// Personal access or app token. Can also be set via TALLY_GITHUB__TOKEN.
    pub token: Option<String>,
    /// API root for GitHub Enterprise, e.g. `https://ghe.example.com/api/v3`.
    pub api_url: Option<String>,
    pub requests_per_second: Option<u32>,
}

/// Bitbucket Cloud source settings.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct BitbucketSection {
    pub enabled: bool,
    pub workspace: Option<String>,
    pub username: Option<String>,
    /// Can also be set via TALLY_BITBUCKET__APP_PASSWORD.
    pub app_password: Option<String>,
    pub api_url: Option<String>,
    pub requests_per_second: Option<u32>,
    pub fetch_diffstat: bool,
    pub assume_newest_first: bool,
}

impl Default for BitbucketSection {
    fn default() -> Self {
        Self {
            enabled: false,
            workspace: None,
            username: None,
            app_password: None,
            api_url: None,
            requests_per_second: None,
            fetch_diffstat: true,
            assume_newest_first: true,
        }
    }
}

/// Ingestion defaults.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct IngestSection {
    /// Window start for filters that never completed a run.
    pub default_since: DateTime<Utc>,
    pub not_ready_max_attempts: u32,
    pub not_ready_delay_ms: u64,
    pub repository_stats: bool,
}

impl Default for IngestSection {
    fn default() -> Self {
        Self {
            default_since: default_since(),
            not_ready_max_attempts: DEFAULT_NOT_READY_ATTEMPTS,
            not_ready_delay_ms: DEFAULT_NOT_READY_DELAY_MS,
            repository_stats: true,
        }
    }
}

impl IngestSection {
    pub fn options(&self) -> IngestOptions {
        IngestOptions {
            default_since: self.default_since,
            not_ready: NotReadyPolicy::new(
                self.not_ready_max_attempts,
                Duration::from_millis(self.not_ready_delay_ms),
            ),
            repository_stats: self.repository_stats,
        }
    }
}

/// Scheduled trigger settings.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ScheduleSection {
    pub interval_hours: u64,
}

impl Default for ScheduleSection {
    fn default() -> Self {
        Self {
            interval_hours: DEFAULT_INTERVAL_HOURS,
        }
    }
}

fn environment() -> Environment {
    Environment::with_prefix("TALLY")
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}

impl Config {
    /// Load configuration using the config crate's layered approach.
    ///
    /// Sources are loaded in order (later sources override earlier):
    /// 1. Built-in defaults
    /// 2. XDG config file (~/.config/tally/config.toml)
    /// 3. Local config file (./tally.toml)
    /// 4. Environment variables with the TALLY_ prefix
    pub fn load() -> Self {
        let mut builder = ConfigBuilder::builder();

        if let Some(xdg_config) = Self::default_config_path()
            && xdg_config.exists()
        {
            tracing::debug!("Loading config from {:?}", xdg_config);
            builder = builder.add_source(
                File::from(xdg_config)
                    .format(FileFormat::Toml)
                    .required(false),
            );
        }

        let local_config = PathBuf::from("tally.toml");
        if local_config.exists() {
            tracing::debug!("Loading config from ./tally.toml");
            builder = builder.add_source(
                File::from(local_config)
                    .format(FileFormat::Toml)
                    .required(false),
            );
        }

        builder = builder.add_source(environment());

        match builder.build() {
            Ok(settings) => match settings.try_deserialize::<Config>() {
                Ok(config) => config,
                Err(e) => {
                    tracing::warn!("Failed to deserialize config: {}", e);
                    Config::default()
                }
            },
            Err(e) => {
                tracing::warn!("Failed to build config: {}", e);
                Config::default()
            }
        }
    }

    /// Get the database URL, falling back to the default state directory path.
    ///
    /// The `mode=rwc` parameter creates the SQLite file if it doesn't exist.
    pub fn database_url(&self) -> Option<String> {
        self.database.url.clone().or_else(|| {
            Self::default_state_dir().map(|state_dir| {
                let db_path = state_dir.join("tally.db");
                format!("sqlite://{}?mode=rwc", db_path.display())
            })
        })
    }

    pub fn schedule_interval(&self) -> Duration {
        Duration::from_secs(self.schedule.interval_hours.max(1) * 3600)
    }

    /// Get the default config file path.
    pub fn default_config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "tally").map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Get the default state directory path.
    ///
    /// On Linux, this is `$XDG_STATE_HOME/tally` or `~/.local/state/tally`.
    /// On macOS/Windows, falls back to the data directory.
    pub fn default_state_dir() -> Option<PathBuf> {
        ProjectDirs::from("", "", "tally").map(|dirs| {
            dirs.state_dir()
                .map(|p| p.to_path_buf())
                .unwrap_or_else(|| dirs.data_dir().to_path_buf())
        })
    }
}
