//! Sync driver configuration.

use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

/// Sync driver configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// First block to process when the cursor store is empty. `None` starts at the
    /// source's latest available height.
    pub start_height: Option<u64>,
    /// Stop after this block has been dispatched and committed. `None` follows the head forever.
    pub stop_height: Option<u64>,
    /// Sleep between polls when the driver has caught up with the source.
    pub poll_interval_ms: u64,
    /// Consecutive cursor store failures tolerated before the driver gives up.
    pub store_max_attempts: u32,
    /// Backoff after transient source errors.
    pub backoff: BackoffConfig,
}

/// Exponential backoff (initial and max milliseconds) for transient source errors.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    /// Upper bound of the random jitter added to each backoff.
    pub max_jitter_ms: u64,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("stop height {stop} is below start height {start}")]
    StopBeforeStart { start: u64, stop: u64 },
    /// Only detectable once the source is reachable: no stored cursor and the head is
    /// already past the stop height.
    #[error("stop height {stop} is below the chain head {head} and no cursor is stored")]
    StopBehindHead { head: u64, stop: u64 },
    #[error("store_max_attempts must be at least 1")]
    NoStoreAttempts,
    #[error("initial backoff {initial}ms exceeds max backoff {max}ms")]
    BackoffInverted { initial: u64, max: u64 },
    #[error("read config {path}: {reason}")]
    Load { path: String, reason: String },
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            start_height: None,
            stop_height: None,
            poll_interval_ms: 1_000,
            store_max_attempts: 3,
            backoff: BackoffConfig::default(),
        }
    }
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_backoff_ms: 1_000,
            max_backoff_ms: 60_000,
            max_jitter_ms: 500,
        }
    }
}

impl SyncConfig {
    /// Load from a JSON file; missing fields take their defaults.
    pub fn from_json_file(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let load_err = |reason: String| ConfigError::Load {
            path: path.display().to_string(),
            reason,
        };
        let raw = std::fs::read_to_string(path).map_err(|e| load_err(e.to_string()))?;
        let config: Self = serde_json::from_str(&raw).map_err(|e| load_err(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if let (Some(start), Some(stop)) = (self.start_height, self.stop_height) {
            if stop < start {
                return Err(ConfigError::StopBeforeStart { start, stop });
            }
        }
        if self.store_max_attempts == 0 {
            return Err(ConfigError::NoStoreAttempts);
        }
        if self.backoff.initial_backoff_ms > self.backoff.max_backoff_ms {
            return Err(ConfigError::BackoffInverted {
                initial: self.backoff.initial_backoff_ms,
                max: self.backoff.max_backoff_ms,
            });
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl BackoffConfig {
    /// Backoff before retry number `attempt` (1-based), without jitter: doubles per
    /// attempt from the initial value, capped at the max.
    pub fn delay(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(32);
        let ms = self
            .initial_backoff_ms
            .saturating_mul(1u64 << shift)
            .min(self.max_backoff_ms);
        Duration::from_millis(ms)
    }
}
