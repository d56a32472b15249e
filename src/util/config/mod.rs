//! Stealpool configuration loading
//!
//! # Configuration hierarchy
//!
//! ```text
//! Priority (high → low):
//! 1. CLI arguments
//! 2. Environment variables (STEALPOOL_*)
//! 3. Config file ([scheduler] table)
//! 4. Default values
//! ```
//!
//! # Usage
//!
//! ```rust
//! use stealpool::util::config::from_toml_str;
//!
//! let config = from_toml_str("[scheduler]\nnum_workers = 4\n").unwrap();
//! assert_eq!(config.num_workers, 4);
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::runtime::scheduler::SchedulerConfig;

/// Worker count override.
pub const ENV_WORKERS: &str = "STEALPOOL_WORKERS";
/// Queue capacity override.
pub const ENV_QUEUE_CAPACITY: &str = "STEALPOOL_QUEUE_CAPACITY";
/// Steal attempts override.
pub const ENV_STEAL_ATTEMPTS: &str = "STEALPOOL_STEAL_ATTEMPTS";
/// Idle sleep override, in microseconds.
pub const ENV_IDLE_SLEEP_US: &str = "STEALPOOL_IDLE_SLEEP_US";

/// On-disk layout of a config file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileConfig {
    /// Scheduler settings
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Config serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid value for {key}: '{value}'")]
    InvalidEnv { key: &'static str, value: String },

    #[error("Cannot determine config directory")]
    NoConfigDir,
}

/// Get the user config directory
pub fn get_config_dir() -> Option<PathBuf> {
    if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
        return Some(PathBuf::from(xdg_config).join("stealpool"));
    }

    if let Ok(home) = std::env::var("HOME") {
        return Some(PathBuf::from(home).join(".config").join("stealpool"));
    }

    if let Ok(appdata) = std::env::var("APPDATA") {
        return Some(PathBuf::from(appdata).join("stealpool"));
    }

    None
}

/// Get the user config file path (~/.config/stealpool/config.toml)
pub fn get_config_path() -> Option<PathBuf> {
    get_config_dir().map(|dir| dir.join("config.toml"))
}

/// Parse a scheduler configuration from TOML text.
pub fn from_toml_str(content: &str) -> Result<SchedulerConfig, ConfigError> {
    let file: FileConfig = toml::from_str(content)?;
    Ok(file.scheduler)
}

/// Render a scheduler configuration as TOML text.
pub fn to_toml_string(config: &SchedulerConfig) -> Result<String, ConfigError> {
    let file = FileConfig {
        scheduler: config.clone(),
    };
    Ok(toml::to_string_pretty(&file)?)
}

/// Load the configuration from `path`, or from the user config file when
/// `path` is `None`. A missing user config file yields the defaults; a
/// missing explicit file is an error.
pub fn load_file(path: Option<&Path>) -> Result<SchedulerConfig, ConfigError> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => match get_config_path() {
            Some(p) if p.exists() => p,
            _ => return Ok(SchedulerConfig::default()),
        },
    };

    let content = fs::read_to_string(&path)?;
    from_toml_str(&content)
}

/// Save the configuration to the user config file.
pub fn save_user_config(config: &SchedulerConfig) -> Result<PathBuf, ConfigError> {
    let dir = get_config_dir().ok_or(ConfigError::NoConfigDir)?;
    fs::create_dir_all(&dir)?;

    let path = dir.join("config.toml");
    fs::write(&path, to_toml_string(config)?)?;
    Ok(path)
}

/// Apply `STEALPOOL_*` overrides read through `lookup`.
pub fn apply_env_with<F>(
    config: &mut SchedulerConfig,
    lookup: F,
) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(value) = parse_env(&lookup, ENV_WORKERS)? {
        config.num_workers = value;
    }
    if let Some(value) = parse_env(&lookup, ENV_QUEUE_CAPACITY)? {
        config.queue_capacity = value;
    }
    if let Some(value) = parse_env(&lookup, ENV_STEAL_ATTEMPTS)? {
        config.steal_attempts = value;
    }
    if let Some(value) = parse_env(&lookup, ENV_IDLE_SLEEP_US)? {
        config.idle_sleep_us = value;
    }
    Ok(())
}

/// Apply `STEALPOOL_*` overrides from the process environment.
pub fn apply_env(config: &mut SchedulerConfig) -> Result<(), ConfigError> {
    apply_env_with(config, |key| std::env::var(key).ok())
}

/// File (or user config) plus environment overrides.
pub fn load(path: Option<&Path>) -> Result<SchedulerConfig, ConfigError> {
    let mut config = load_file(path)?;
    apply_env(&mut config)?;
    Ok(config)
}

fn parse_env<F, T>(
    lookup: &F,
    key: &'static str,
) -> Result<Option<T>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidEnv { key, value }),
    }
}
