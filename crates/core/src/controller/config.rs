//! Retry limits for the playout loop.

use serde::{Deserialize, Serialize};

/// Backoff and failure limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Consecutive catalog load failures before giving up.
    #[serde(default = "default_max_catalog_failures")]
    pub max_consecutive_catalog_failures: u32,

    /// Pause between catalog load attempts (seconds).
    #[serde(default = "default_catalog_backoff")]
    pub catalog_backoff_secs: u64,

    /// Pause after the transmitter fails to start (seconds).
    #[serde(default = "default_spawn_backoff")]
    pub spawn_backoff_secs: u64,

    /// Consecutive spawn failures before giving up.
    #[serde(default = "default_max_spawn_failures")]
    pub max_consecutive_spawn_failures: u32,
}

fn default_max_catalog_failures() -> u32 {
    3
}

fn default_catalog_backoff() -> u64 {
    60
}

fn default_spawn_backoff() -> u64 {
    10
}

fn default_max_spawn_failures() -> u32 {
    10
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_consecutive_catalog_failures: default_max_catalog_failures(),
            catalog_backoff_secs: default_catalog_backoff(),
            spawn_backoff_secs: default_spawn_backoff(),
            max_consecutive_spawn_failures: default_max_spawn_failures(),
        }
    }
}
