//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/fleetlens/config.toml`
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/fleetlens/` (~/.config/fleetlens/)
//! - State/Logs: `$XDG_STATE_HOME/fleetlens/` (~/.local/state/fleetlens/)
//!
//! The fleet's own data lives elsewhere (the data root, usually `~/.openclaw`)
//! and is never written to.

use crate::error::{Error, Result};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Returns a best-effort home directory path.
fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Returns XDG_CONFIG_HOME or ~/.config
fn xdg_config_home() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
}

/// Returns XDG_STATE_HOME or ~/.local/state
fn xdg_state_home() -> PathBuf {
    std::env::var("XDG_STATE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/state"))
}

/// Main configuration struct
#[derive(Debug, Deserialize, Default, Clone)]
pub struct Config {
    /// Where the fleet's files live
    #[serde(default)]
    pub sources: SourcesConfig,

    /// Query cache configuration
    #[serde(default)]
    pub cache: CacheConfig,

    /// Scan bounds
    #[serde(default)]
    pub scan: ScanConfig,

    /// Status inference thresholds
    #[serde(default)]
    pub status: StatusConfig,

    /// Fallback values used when a source carries no model
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Data root override
#[derive(Debug, Deserialize, Default, Clone)]
pub struct SourcesConfig {
    /// Explicit data root; skips auto-detection when set
    pub root: Option<PathBuf>,
}

/// Query cache configuration
#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    /// How long a query result stays valid, in milliseconds
    #[serde(default = "default_cache_ttl_ms")]
    pub ttl_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_ms: default_cache_ttl_ms(),
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }
}

fn default_cache_ttl_ms() -> u64 {
    5000
}

/// Bounds on how much of each source a scan may read
#[derive(Debug, Deserialize, Clone)]
pub struct ScanConfig {
    /// Lines read from the end of each session file
    #[serde(default = "default_tail_lines")]
    pub tail_lines: usize,

    /// Default number of turns returned by a transcript query
    #[serde(default = "default_transcript_limit")]
    pub transcript_limit: usize,

    /// Files smaller than this are read whole
    #[serde(default = "default_small_file_threshold")]
    pub small_file_threshold: u64,

    /// Estimated bytes per line when reading a suffix
    #[serde(default = "default_bytes_per_line")]
    pub bytes_per_line: u64,

    /// Largest suffix window the tail reader will grow to
    #[serde(default = "default_max_window_bytes")]
    pub max_window_bytes: u64,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            tail_lines: default_tail_lines(),
            transcript_limit: default_transcript_limit(),
            small_file_threshold: default_small_file_threshold(),
            bytes_per_line: default_bytes_per_line(),
            max_window_bytes: default_max_window_bytes(),
        }
    }
}

fn default_tail_lines() -> usize {
    50
}

fn default_transcript_limit() -> usize {
    50
}

fn default_small_file_threshold() -> u64 {
    512_000
}

fn default_bytes_per_line() -> u64 {
    2_000
}

fn default_max_window_bytes() -> u64 {
    8 * 1024 * 1024
}

/// Elapsed-time thresholds for agent status
#[derive(Debug, Deserialize, Clone)]
pub struct StatusConfig {
    /// Seen within this many minutes => active
    #[serde(default = "default_active_minutes")]
    pub active_minutes: i64,

    /// Seen within this many minutes => idle, otherwise offline
    #[serde(default = "default_idle_minutes")]
    pub idle_minutes: i64,
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            active_minutes: default_active_minutes(),
            idle_minutes: default_idle_minutes(),
        }
    }
}

fn default_active_minutes() -> i64 {
    5
}

fn default_idle_minutes() -> i64 {
    30
}

/// Fallback model names
#[derive(Debug, Deserialize, Clone)]
pub struct DefaultsConfig {
    /// Model reported for the main agent when its sessions name none
    #[serde(default = "default_main_model")]
    pub main_model: String,

    /// Model reported for sub-agent runs (the registry does not record one)
    #[serde(default = "default_subagent_model")]
    pub subagent_model: String,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            main_model: default_main_model(),
            subagent_model: default_subagent_model(),
        }
    }
}

fn default_main_model() -> String {
    "claude-opus-4-6".to_string()
}

fn default_subagent_model() -> String {
    "claude-sonnet-4-20250514".to_string()
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Maximum number of log files to keep
    #[serde(default = "default_max_log_files")]
    pub max_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            max_files: default_max_log_files(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_log_files() -> usize {
    5
}

impl Config {
    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            return Ok(Config::default());
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would make status inference or scanning meaningless
    pub fn validate(&self) -> Result<()> {
        if self.status.active_minutes <= 0 {
            return Err(Error::Config(
                "status.active_minutes must be positive".to_string(),
            ));
        }
        if self.status.idle_minutes < self.status.active_minutes {
            return Err(Error::Config(
                "status.idle_minutes must not be less than status.active_minutes".to_string(),
            ));
        }
        if self.scan.bytes_per_line == 0 {
            return Err(Error::Config(
                "scan.bytes_per_line must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Resolve the fleet data root.
    ///
    /// Order: explicit `sources.root`, then `~/.openclaw` if it exists, then
    /// `$OPENCLAW_HOME` if it exists. `None` means no data is available and
    /// every query answers with empty values.
    pub fn data_root(&self) -> Option<PathBuf> {
        if let Some(root) = &self.sources.root {
            return Some(root.clone());
        }

        let standard = home_dir().join(".openclaw");
        if standard.is_dir() {
            return Some(standard);
        }

        std::env::var_os("OPENCLAW_HOME")
            .map(PathBuf::from)
            .filter(|p| p.is_dir())
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/fleetlens/config.toml` (~/.config/fleetlens/config.toml)
    pub fn config_path() -> PathBuf {
        xdg_config_home().join("fleetlens").join("config.toml")
    }

    /// Returns the state directory path (for logs)
    ///
    /// `$XDG_STATE_HOME/fleetlens/` (~/.local/state/fleetlens/)
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join("fleetlens")
    }

    /// Returns today's log file path
    ///
    /// Logs rotate daily (UTC), so the file name carries the date:
    /// `$XDG_STATE_HOME/fleetlens/fleetlens.YYYY-MM-DD.log`
    pub fn log_path() -> PathBuf {
        Self::log_path_for(Utc::now().date_naive())
    }

    /// Log file written on `date`
    pub fn log_path_for(date: NaiveDate) -> PathBuf {
        Self::state_dir().join(format!("fleetlens.{}.log", date.format("%Y-%m-%d")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.sources.root.is_none());
        assert_eq!(config.cache.ttl(), Duration::from_secs(5));
        assert_eq!(config.scan.tail_lines, 50);
        assert_eq!(config.scan.small_file_threshold, 512_000);
        assert_eq!(config.status.active_minutes, 5);
        assert_eq!(config.status.idle_minutes, 30);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
[sources]
root = "/srv/fleet"

[cache]
ttl_ms = 1500

[scan]
tail_lines = 80

[status]
active_minutes = 2
idle_minutes = 10

[logging]
level = "debug"
"#;
        let config: Config = toml::from_str(toml).unwrap();

        assert_eq!(config.sources.root, Some(PathBuf::from("/srv/fleet")));
        assert_eq!(config.cache.ttl_ms, 1500);
        assert_eq!(config.scan.tail_lines, 80);
        // Unset keys in a present section keep their defaults
        assert_eq!(config.scan.bytes_per_line, 2_000);
        assert_eq!(config.status.idle_minutes, 10);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.defaults.main_model, "claude-opus-4-6");
    }

    #[test]
    fn test_log_path_carries_rotation_date() {
        let date = NaiveDate::from_ymd_opt(2026, 2, 18).unwrap();
        let path = Config::log_path_for(date);
        assert!(path.ends_with("fleetlens.2026-02-18.log"));
        assert_eq!(path.parent(), Some(Config::state_dir().as_path()));
    }

    #[test]
    fn test_explicit_root_wins() {
        let config = Config {
            sources: SourcesConfig {
                root: Some(PathBuf::from("/does/not/need/to/exist")),
            },
            ..Default::default()
        };
        assert_eq!(
            config.data_root(),
            Some(PathBuf::from("/does/not/need/to/exist"))
        );
    }

    #[test]
    fn test_validation_rejects_inverted_thresholds() {
        let mut config = Config::default();
        config.status.idle_minutes = 1;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.scan.bytes_per_line = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[cache]\nttl_ms = 250\n").unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.cache.ttl_ms, 250);

        std::fs::write(&path, "[cache\nttl_ms = ").unwrap();
        assert!(matches!(Config::load_from(&path), Err(Error::Config(_))));
    }
}
