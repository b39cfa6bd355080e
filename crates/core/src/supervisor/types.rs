//! Types describing a single supervised transmission.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

/// Lifecycle of the supervisor's transmission slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Idle,
    Starting,
    Running,
    Succeeded,
    Failed,
}

impl RunState {
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Starting | Self::Running)
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// A transmission that has been confirmed started.
#[derive(Debug, Clone, Serialize)]
pub struct TransmissionRun {
    pub run_id: Uuid,
    pub title: String,
    pub source: String,
    pub started_at: DateTime<Utc>,
    pub pid: Option<u32>,
}

impl TransmissionRun {
    pub fn new(title: impl Into<String>, source: impl Into<String>, pid: Option<u32>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            title: title.into(),
            source: source.into(),
            started_at: Utc::now(),
            pid,
        }
    }
}

/// Outcome of a transmission that ran to completion or was terminated.
#[derive(Debug, Clone)]
pub struct RunResult {
    pub run_id: Uuid,
    pub title: String,
    pub exit_code: Option<i32>,
    pub duration: Duration,
    pub state: RunState,
    /// Output lines forwarded to the log.
    pub output_lines: u64,
}

impl RunResult {
    pub fn succeeded(&self) -> bool {
        self.state == RunState::Succeeded
    }
}

/// One line of transmitter output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLine {
    pub stream: OutputStream,
    pub line: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

impl OutputStream {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stdout => "stdout",
            Self::Stderr => "stderr",
        }
    }
}
