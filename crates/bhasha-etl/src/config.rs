use anyhow::{Context, Result};
use confyg::{env, Confygery};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use bhasha_core::model::{Language, Thresholds};

use crate::adapters::TrackOrder;
use crate::resilience::{RetryPolicy, DEFAULT_MAX_ATTEMPTS};

/// Configuration for bhasha.
///
/// Configuration is loaded from multiple sources with the following priority:
/// 1. CLI arguments (highest priority)
/// 2. Environment variables (BHASHA_* prefix)
/// 3. Config file (~/.config/bhasha/config.toml)
/// 4. Built-in defaults (lowest priority)
///
/// Read once at start and passed down immutably.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Path to the SQLite state store.
    ///
    /// Can be set via:
    /// - CLI: --db /path/to/db
    /// - ENV: BHASHA_DATABASE_PATH
    /// - Config: database_path = "/path/to/db"
    /// - Default: ~/.local/share/bhasha/bhasha.db
    pub database_path: PathBuf,

    /// Report of every track included in at least one playlist.
    pub songs_csv: PathBuf,

    /// Report of tracks flagged for manual review.
    pub needs_review_csv: PathBuf,

    /// Confidence at or above which a track joins a language playlist.
    pub include_threshold: f64,

    /// Inclusive review band.
    pub review_low: f64,
    pub review_high: f64,

    /// Playlists are named "{playlist_prefix} - {Language}".
    pub playlist_prefix: String,

    /// IndicLID model directory, passed to the scorer command.
    pub model_dir: Option<PathBuf>,

    /// External scorer helper. When unset the script heuristic is used.
    pub scorer_command: Option<PathBuf>,
    pub scorer_args: Vec<String>,
    pub scorer_timeout_secs: u64,

    /// Spotify app credentials.
    ///
    /// Can be set via:
    /// - ENV: BHASHA_SPOTIFY_CLIENT_ID, BHASHA_SPOTIFY_CLIENT_SECRET
    pub spotify_client_id: Option<String>,
    pub spotify_client_secret: Option<String>,

    /// Long-lived refresh token. Falls back to the token cache file.
    pub spotify_refresh_token: Option<String>,

    /// Token cache written by an earlier interactive login.
    pub spotify_cache_path: PathBuf,

    /// Genius API client access token.
    pub genius_access_token: Option<String>,

    /// Minimum spacing between Genius requests.
    pub genius_delay_ms: u64,

    /// Attempts per external call, including the first.
    pub max_attempts: u32,
    pub retry_min_delay_ms: u64,
    pub retry_max_delay_ms: u64,

    /// Consecutive failed tracks after which a run is aborted.
    pub max_consecutive_failures: u32,

    pub track_order: TrackOrder,
}

impl Default for Config {
    fn default() -> Self {
        let thresholds = Thresholds::default();
        Self {
            database_path: default_db_path(),
            songs_csv: PathBuf::from("indian_songs.csv"),
            needs_review_csv: PathBuf::from("needs_review.csv"),
            include_threshold: thresholds.include(),
            review_low: thresholds.review_low(),
            review_high: thresholds.review_high(),
            playlist_prefix: "Indian Collection".to_string(),
            model_dir: None,
            scorer_command: None,
            scorer_args: Vec::new(),
            scorer_timeout_secs: 120,
            spotify_client_id: None,
            spotify_client_secret: None,
            spotify_refresh_token: None,
            spotify_cache_path: PathBuf::from(".cache"),
            genius_access_token: None,
            genius_delay_ms: 1200,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_min_delay_ms: 2_000,
            retry_max_delay_ms: 60_000,
            max_consecutive_failures: 5,
            track_order: TrackOrder::default(),
        }
    }
}

impl Config {
    /// Load configuration from file and environment variables.
    ///
    /// Searches for config file at: ~/.config/bhasha/config.toml
    /// Reads environment variables with BHASHA_ prefix.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed, or
    /// if the thresholds are inconsistent.
    pub fn load() -> Result<Self> {
        let config_path = config_file_path();

        let mut builder = Confygery::new().context("Failed to create config builder")?;

        if config_path.exists() {
            let path_str = config_path
                .to_str()
                .ok_or_else(|| anyhow::anyhow!("Config path contains invalid UTF-8"))?;
            builder
                .add_file(path_str)
                .context("Failed to load config file")?;
        }

        let env_opts = env::Options::with_top_level("bhasha");
        builder
            .add_env(env_opts)
            .context("Failed to load environment variables")?;

        let config: Self = builder
            .build()
            .context("Failed to build configuration")?;

        config.thresholds()?;
        Ok(config)
    }

    /// Load configuration with custom database path.
    ///
    /// This is used when the --db CLI flag is provided.
    pub fn load_with_db_path(db_path: PathBuf) -> Result<Self> {
        let mut config = Self::load()?;
        config.database_path = db_path;
        Ok(config)
    }

    /// The validated threshold set.
    pub fn thresholds(&self) -> Result<Thresholds> {
        Thresholds::new(self.include_threshold, self.review_low, self.review_high)
            .context("Invalid confidence thresholds")
    }

    /// Backoff used for every external call.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_attempts,
            Duration::from_millis(self.retry_min_delay_ms),
            Duration::from_millis(self.retry_max_delay_ms),
        )
    }

    pub fn genius_delay(&self) -> Duration {
        Duration::from_millis(self.genius_delay_ms)
    }

    /// Name of the destination playlist for a language.
    pub fn playlist_name(&self, language: Language) -> String {
        playlist_name(&self.playlist_prefix, language)
    }
}

/// "{prefix} - {Language}"
pub fn playlist_name(prefix: &str, language: Language) -> String {
    format!("{prefix} - {}", language.name())
}

/// Get the default database path.
///
/// Returns: ~/.local/share/bhasha/bhasha.db (or platform equivalent)
fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("bhasha")
        .join("bhasha.db")
}

/// Get the config file path.
///
/// Returns:
/// - Linux: ~/.config/bhasha/config.toml
/// - macOS: ~/Library/Application Support/bhasha/config.toml
/// - Windows: %APPDATA%\bhasha\config.toml
pub fn config_file_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("bhasha")
        .join("config.toml")
}

/// Get the example config file content.
pub fn example_config() -> &'static str {
    r#"# Bhasha Configuration File
#
# Configuration is loaded from multiple sources with the following priority:
# 1. CLI arguments (highest priority)
# 2. Environment variables (BHASHA_* prefix)
# 3. This config file
# 4. Built-in defaults (lowest priority)

# Spotify app credentials and a refresh token with the scopes
# user-library-read, playlist-read-private, playlist-modify-private and
# playlist-modify-public.
#
# Can also be set via:
# - Environment: BHASHA_SPOTIFY_CLIENT_ID, BHASHA_SPOTIFY_CLIENT_SECRET,
#   BHASHA_SPOTIFY_REFRESH_TOKEN
spotify_client_id = "your-client-id"
spotify_client_secret = "your-client-secret"
#spotify_refresh_token = "your-refresh-token"

# Token cache from an earlier interactive login; its refresh_token is used
# when spotify_refresh_token is not set.
#spotify_cache_path = ".cache"

# Genius API client access token
#
# Create one at: https://genius.com/api-clients
genius_access_token = "your-genius-token"

# Minimum spacing between Genius requests, in milliseconds
#genius_delay_ms = 1200

# Language-identification helper. It receives {"lines": [...]} on stdin and
# prints {"results": [{"lang": "hin_Latn", "score": 0.93, "model": "..."}]}.
# Without it, only native-script lyrics are detected. scripts/indiclid-helper.py
# wraps an IndicLID checkout.
#scorer_command = "/usr/local/bin/indiclid-helper.py"
#scorer_args = ["--indiclid-root", "/opt/IndicLID"]
#model_dir = "/opt/IndicLID/models"
#scorer_timeout_secs = 120

# Confidence thresholds
#include_threshold = 0.8
#review_low = 0.4
#review_high = 0.7

# Playlists are named "<prefix> - Hindi", "<prefix> - Tamil", ...
#playlist_prefix = "Indian Collection"

# Reports
#songs_csv = "indian_songs.csv"
#needs_review_csv = "needs_review.csv"

# Processing order of saved tracks: "oldest-first" or "newest-first"
#track_order = "oldest-first"

# Retry behaviour for external calls
#max_attempts = 5
#retry_min_delay_ms = 2000
#retry_max_delay_ms = 60000
#max_consecutive_failures = 5

# Path to the SQLite state store
#
# Can also be set via:
# - CLI: bhasha --db /custom/path.db run
# - Environment: BHASHA_DATABASE_PATH=/custom/path.db
#
# Default: Platform-specific data directory
#database_path = "/path/to/custom/bhasha.db"
"#
}

/// Create default config file if it doesn't exist.
///
/// Returns true if a new file was created, false if it already existed.
pub fn ensure_config_file() -> Result<bool> {
    let config_path = config_file_path();

    if config_path.exists() {
        return Ok(false);
    }

    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent).context("Failed to create config directory")?;
    }

    std::fs::write(&config_path, example_config()).context("Failed to write config file")?;

    Ok(true)
}
