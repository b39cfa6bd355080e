//! Error types for the supervisor module.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while launching or supervising a transmission.
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// Transmitter binary not found.
    #[error("transmitter not found at path: {path}")]
    BinaryNotFound { path: PathBuf },

    /// The process could not be started.
    #[error("failed to spawn transmitter for '{title}': {error}")]
    SpawnFailed {
        title: String,
        #[source]
        error: std::io::Error,
    },

    /// A local source file is missing at launch time.
    #[error("source for '{title}' is unavailable: {locator}")]
    SourceUnavailable { title: String, locator: String },

    /// The process ran and exited unsuccessfully.
    #[error("transmission of '{title}' failed with {} after {}s", describe_exit(.exit_code), .duration.as_secs())]
    TransmissionFailed {
        title: String,
        exit_code: Option<i32>,
        duration: Duration,
    },

    /// Another transmission is still running.
    #[error("a transmission is already running")]
    Busy,

    /// The sink address is missing.
    #[error("sink address is not configured")]
    SinkNotConfigured,

    /// Stopped because shutdown was requested.
    #[error("transmission of '{title}' cancelled")]
    Cancelled { title: String },

    /// I/O error while supervising the process.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {}", code),
        None => "termination by signal".to_string(),
    }
}

impl SupervisorError {
    /// The process never started; the controller backs off and retries.
    pub fn is_spawn_failure(&self) -> bool {
        matches!(
            self,
            Self::BinaryNotFound { .. } | Self::SpawnFailed { .. } | Self::SourceUnavailable { .. }
        )
    }

    /// Short label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::BinaryNotFound { .. } => "binary_not_found",
            Self::SpawnFailed { .. } => "spawn_failed",
            Self::SourceUnavailable { .. } => "source_unavailable",
            Self::TransmissionFailed { .. } => "transmission_failed",
            Self::Busy => "busy",
            Self::SinkNotConfigured => "sink_not_configured",
            Self::Cancelled { .. } => "cancelled",
            Self::Io(_) => "io",
        }
    }
}
