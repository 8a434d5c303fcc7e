//! Central configuration for runtime limits, defaults and environment knobs.
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `SRCTRACK_LOCAL_BATCH_SIZE` | 500 (Windows) / 8000 | Paths staged per commit chunk |
//! | `SRCTRACK_DISABLE_MOVE_DETECTION` | false | Report moves as delete + add |
//! | `SRCTRACK_DISABLE_REMOTE_POLLING` | false | Skip convergence polling |
//! | `SRCTRACK_REMOTE_POLL_TIMEOUT` | computed | Poll timeout in seconds |
//! | `SRCTRACK_REMOTE_POLL_EMPTY_LIMIT` | 10 | Consecutive empty polls before giving up |
//! | `SRCTRACK_TRACKING_FILE_VERSION` | 0 | Tracking file schema to write (0 or 1) |

use std::time::Duration;
use thiserror::Error;

pub mod quirks;
pub use quirks::{PollingQuirks, QuirkRule};

pub const ENV_LOCAL_BATCH_SIZE: &str = "SRCTRACK_LOCAL_BATCH_SIZE";
pub const ENV_DISABLE_MOVE_DETECTION: &str = "SRCTRACK_DISABLE_MOVE_DETECTION";
pub const ENV_DISABLE_REMOTE_POLLING: &str = "SRCTRACK_DISABLE_REMOTE_POLLING";
pub const ENV_REMOTE_POLL_TIMEOUT: &str = "SRCTRACK_REMOTE_POLL_TIMEOUT";
pub const ENV_REMOTE_POLL_EMPTY_LIMIT: &str = "SRCTRACK_REMOTE_POLL_EMPTY_LIMIT";
pub const ENV_TRACKING_FILE_VERSION: &str = "SRCTRACK_TRACKING_FILE_VERSION";

/// Commit chunk size on Windows, where open-handle limits are lower.
pub const WINDOWS_LOCAL_BATCH_SIZE: usize = 500;

/// Commit chunk size everywhere else.
pub const DEFAULT_LOCAL_BATCH_SIZE: usize = 8000;

pub const DEFAULT_POLL_EMPTY_LIMIT: u32 = 10;

/// Fixed pause between two convergence polls.
pub const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Remote tracking instances unused for this long are dropped from the registry.
pub const REMOTE_INSTANCE_TTL: Duration = Duration::from_secs(60 * 60);

/// Legacy schema; still the default output for compatibility with older readers.
pub const LEGACY_FILE_VERSION: u32 = 0;
pub const CURRENT_FILE_VERSION: u32 = 1;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

pub fn default_batch_size() -> usize {
    if cfg!(windows) {
        WINDOWS_LOCAL_BATCH_SIZE
    } else {
        DEFAULT_LOCAL_BATCH_SIZE
    }
}

/// `ceil(0.05 * expected) + 5` seconds.
pub fn computed_poll_timeout(expected: usize) -> Duration {
    let secs = (expected as f64 * 0.05).ceil() as u64 + 5;
    Duration::from_secs(secs)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackingConfig {
    pub batch_size: usize,
    pub move_detection: bool,
    pub remote_polling: bool,
    pub poll_timeout: Option<Duration>,
    pub poll_empty_limit: u32,
    pub poll_interval: Duration,
    pub file_version: u32,
    pub quirks: PollingQuirks,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            move_detection: true,
            remote_polling: true,
            poll_timeout: None,
            poll_empty_limit: DEFAULT_POLL_EMPTY_LIMIT,
            poll_interval: POLL_INTERVAL,
            file_version: LEGACY_FILE_VERSION,
            quirks: PollingQuirks::default(),
        }
    }
}

fn invalid(key: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        message: message.into(),
    }
}

fn parse_bool(key: &str, val: &str) -> Result<bool, ConfigError> {
    match val.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(invalid(key, format!("expected a boolean, got '{other}'"))),
    }
}

fn parse_positive<T>(key: &str, val: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr + PartialEq + Default,
{
    let parsed = val
        .trim()
        .parse::<T>()
        .map_err(|_| invalid(key, format!("expected positive integer, got '{val}'")))?;
    if parsed == T::default() {
        return Err(invalid(key, "must be greater than 0"));
    }
    Ok(parsed)
}

impl TrackingConfig {
    /// Build a config from a variable lookup, failing on the first invalid value.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(val) = lookup(ENV_LOCAL_BATCH_SIZE) {
            config.batch_size = parse_positive(ENV_LOCAL_BATCH_SIZE, &val)?;
        }
        if let Some(val) = lookup(ENV_DISABLE_MOVE_DETECTION) {
            config.move_detection = !parse_bool(ENV_DISABLE_MOVE_DETECTION, &val)?;
        }
        if let Some(val) = lookup(ENV_DISABLE_REMOTE_POLLING) {
            config.remote_polling = !parse_bool(ENV_DISABLE_REMOTE_POLLING, &val)?;
        }
        if let Some(val) = lookup(ENV_REMOTE_POLL_TIMEOUT) {
            let secs: u64 = parse_positive(ENV_REMOTE_POLL_TIMEOUT, &val)?;
            config.poll_timeout = Some(Duration::from_secs(secs));
        }
        if let Some(val) = lookup(ENV_REMOTE_POLL_EMPTY_LIMIT) {
            config.poll_empty_limit = parse_positive(ENV_REMOTE_POLL_EMPTY_LIMIT, &val)?;
        }
        if let Some(val) = lookup(ENV_TRACKING_FILE_VERSION) {
            config.file_version = match val.trim() {
                "0" => LEGACY_FILE_VERSION,
                "1" => CURRENT_FILE_VERSION,
                other => {
                    return Err(invalid(
                        ENV_TRACKING_FILE_VERSION,
                        format!("expected 0 or 1, got '{other}'"),
                    ))
                }
            };
        }

        Ok(config)
    }

    /// Read the process environment, falling back to defaults on invalid values.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok()).unwrap_or_else(|e| {
            tracing::warn!("{e}; using default tracking configuration");
            Self::default()
        })
    }

    /// Timeout for polling `expected` keys, honoring the override.
    pub fn poll_timeout_for(&self, expected: usize) -> Duration {
        self.poll_timeout
            .unwrap_or_else(|| computed_poll_timeout(expected))
    }
}
