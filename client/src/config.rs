//! Configuration for the sync client.

use std::env;
use tether_engine::SKEW_BUFFER_MS;

/// Tunables for catch-up, debouncing, and the conflict-retry loop.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Backward buffer applied to catch-up query windows (ms)
    pub skew_buffer_ms: u64,
    /// Delay between a local edit and its upload (ms)
    pub debounce_ms: u64,
    /// Total upload attempts per save cycle, conflicts included
    pub retry_budget: u32,
    /// How long cleared document fields are kept before garbage collection (ms)
    pub retention_ms: u64,
    /// Field values larger than this (serialized bytes) travel out-of-band
    pub detach_threshold: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            skew_buffer_ms: SKEW_BUFFER_MS,
            debounce_ms: 1_000,
            retry_budget: 5,
            retention_ms: 24 * 60 * 60 * 1000,
            detach_threshold: 16 * 1024,
        }
    }
}

impl SyncConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults for anything unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        Ok(Self {
            skew_buffer_ms: read_var("TETHER_SKEW_BUFFER_MS", defaults.skew_buffer_ms)?,
            debounce_ms: read_var("TETHER_DEBOUNCE_MS", defaults.debounce_ms)?,
            retry_budget: read_var("TETHER_RETRY_BUDGET", defaults.retry_budget)?,
            retention_ms: read_var("TETHER_RETENTION_MS", defaults.retention_ms)?,
            detach_threshold: read_var("TETHER_DETACH_THRESHOLD", defaults.detach_threshold)?,
        })
    }
}

fn read_var<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw.parse().map_err(|_| ConfigError::InvalidValue(name)),
        Err(_) => Ok(default),
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {0}")]
    InvalidValue(&'static str),
}
