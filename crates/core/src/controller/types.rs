//! Types for the retry controller.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::catalog::CatalogError;
use crate::history::HistoryError;
use crate::supervisor::SupervisorError;

/// Conditions that end the playout loop with a failure.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// The catalog kept failing to load.
    #[error("catalog unavailable after {attempts} consecutive attempts: {last}")]
    CatalogExhausted {
        attempts: u32,
        #[source]
        last: CatalogError,
    },

    /// The transmitter kept failing to start.
    #[error("transmitter failed to start {attempts} consecutive times: {last}")]
    SpawnExhausted {
        attempts: u32,
        #[source]
        last: SupervisorError,
    },

    /// Play history cannot be persisted.
    #[error("play history storage unavailable: {0}")]
    HistoryUnavailable(#[source] HistoryError),

    /// Unexpected supervisor failure.
    #[error("supervisor error: {0}")]
    Supervisor(#[from] SupervisorError),
}

/// Why the loop stopped without an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitReason {
    /// An operator requested shutdown.
    Shutdown,
    /// The requested number of items was started.
    Completed { items: u64 },
}

/// What the controller is doing right now.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    #[default]
    Starting,
    LoadingCatalog,
    CatalogBackoff,
    Selecting,
    Interstitial,
    Transmitting,
    SpawnBackoff,
    Stopped,
    Failed,
}

/// The transmission currently on air.
#[derive(Debug, Clone, Serialize)]
pub struct NowPlayingStatus {
    pub title: String,
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub interstitial: bool,
}

/// Snapshot of the controller, shared with the status API.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ControllerStatus {
    pub phase: Phase,
    pub now_playing: Option<NowPlayingStatus>,
    pub catalog_items: usize,
    pub catalog_generation: u64,
    pub played_in_rotation: usize,
    pub rotations_completed: u64,
    pub items_started: u64,
    pub transmission_failures: u64,
    pub consecutive_catalog_failures: u32,
    pub consecutive_spawn_failures: u32,
    pub last_error: Option<String>,
}

/// Shared handle to the live status.
pub type StatusHandle = Arc<RwLock<ControllerStatus>>;
