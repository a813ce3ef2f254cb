//! Configuration loading for the PLUME cache.
//!
//! Every field has a default matching the blog client's behaviour; a TOML file
//! only needs to name what it overrides.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable consulted by [`CacheConfig::load`].
pub const CONFIG_ENV_VAR: &str = "PLUME_CACHE_CONFIG";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct CacheConfig {
    /// Staleness tolerance of [`QueryCache::default_freshness`](crate::QueryCache::default_freshness).
    pub default_max_staleness_ms: u64,
    /// Age after which an unwatched entry is dropped by the default sweep.
    pub retention_ms: u64,
    /// How far apart a provisional comment and its server copy may be stamped
    /// and still be matched during reconciliation.
    pub comment_match_window_ms: u64,
    /// Whether invalidating a subscribed identity schedules a background refetch.
    pub refetch_on_invalidate: bool,
    /// Buffer size of the authentication-required broadcast channel.
    pub auth_signal_capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_max_staleness_ms: 5 * 60 * 1000,
            retention_ms: 10 * 60 * 1000,
            comment_match_window_ms: 60 * 1000,
            refetch_on_invalidate: true,
            auth_signal_capacity: 16,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing configuration file path (use --config or PLUME_CACHE_CONFIG)")]
    MissingConfigPath,
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid config value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

impl CacheConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from the path given by `--config` or `PLUME_CACHE_CONFIG`.
    pub fn load() -> Result<Self, ConfigError> {
        let path = config_path_from_args().or_else(config_path_from_env);
        let path = path.ok_or(ConfigError::MissingConfigPath)?;
        Self::from_path(&path)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: CacheConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_max_staleness_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "default_max_staleness_ms",
                reason: "must be > 0".to_string(),
            });
        }
        if self.retention_ms < self.default_max_staleness_ms {
            return Err(ConfigError::InvalidValue {
                field: "retention_ms",
                reason: "must be >= default_max_staleness_ms".to_string(),
            });
        }
        if self.comment_match_window_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "comment_match_window_ms",
                reason: "must be > 0".to_string(),
            });
        }
        if self.auth_signal_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                field: "auth_signal_capacity",
                reason: "must be > 0".to_string(),
            });
        }
        Ok(())
    }

    pub fn default_max_staleness(&self) -> Duration {
        Duration::from_millis(self.default_max_staleness_ms)
    }

    pub fn retention(&self) -> Duration {
        Duration::from_millis(self.retention_ms)
    }

    pub fn comment_match_window(&self) -> Duration {
        Duration::from_millis(self.comment_match_window_ms)
    }

    pub fn with_max_staleness(mut self, duration: Duration) -> Self {
        self.default_max_staleness_ms = saturating_millis(duration);
        self
    }

    pub fn with_retention(mut self, duration: Duration) -> Self {
        self.retention_ms = saturating_millis(duration);
        self
    }

    pub fn with_comment_match_window(mut self, duration: Duration) -> Self {
        self.comment_match_window_ms = saturating_millis(duration);
        self
    }

    pub fn with_refetch_on_invalidate(mut self, enabled: bool) -> Self {
        self.refetch_on_invalidate = enabled;
        self
    }

    pub fn with_auth_signal_capacity(mut self, capacity: usize) -> Self {
        self.auth_signal_capacity = capacity;
        self
    }
}

fn saturating_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn config_path_from_env() -> Option<PathBuf> {
    std::env::var(CONFIG_ENV_VAR).ok().map(PathBuf::from)
}

fn config_path_from_args() -> Option<PathBuf> {
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config" {
            return args.next().map(PathBuf::from);
        }
    }
    None
}
