//! History storage port and record type.

use std::io::ErrorKind;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors reported by history storage.
#[derive(Debug, Error)]
pub enum HistoryError {
    /// Filesystem error while reading or writing the history.
    #[error("history I/O error on {path}: {error}")]
    Io {
        path: PathBuf,
        #[source]
        error: std::io::Error,
    },

    /// The stored history could not be decoded.
    #[error("history at {path} is corrupt: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    /// Database backend error.
    #[error("history database error: {message}")]
    Database { message: String, structural: bool },
}

impl HistoryError {
    pub fn io(path: impl Into<PathBuf>, error: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            error,
        }
    }

    /// Whether the storage can never be written in its current state
    /// (read-only filesystem, missing permissions, missing directory).
    ///
    /// Structural failures are fatal for the playout loop; anything else is
    /// expected to clear up on a later flush.
    pub fn is_structural(&self) -> bool {
        match self {
            Self::Io { error, .. } => matches!(
                error.kind(),
                ErrorKind::PermissionDenied
                    | ErrorKind::ReadOnlyFilesystem
                    | ErrorKind::NotFound
                    | ErrorKind::NotADirectory
                    | ErrorKind::IsADirectory
            ),
            Self::Corrupt { .. } => false,
            Self::Database { structural, .. } => *structural,
        }
    }
}

/// Persisted state of the current rotation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRecord {
    /// Identities launched in this rotation, in launch order.
    #[serde(default)]
    pub played: Vec<String>,
    /// Catalog position of the most recently launched item.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Storage backend for the play history.
///
/// `save` must replace the stored record atomically: after a crash the
/// store holds either the previous record or the new one, never a mix.
pub trait HistoryStore: Send + Sync {
    /// Name of this backend, for logs.
    fn name(&self) -> &str;

    /// Load the stored record. A store that was never written loads as empty.
    fn load(&self) -> Result<HistoryRecord, HistoryError>;

    /// Durably replace the stored record.
    fn save(&self, record: &HistoryRecord) -> Result<(), HistoryError>;
}
