//! JSON file history store.

use std::fs::File;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::debug;

use super::store::{HistoryError, HistoryRecord, HistoryStore};

/// History kept in a JSON document (`{"played": [...], "cursor": n}`).
///
/// Every save writes a temporary file next to the target, syncs it and
/// renames it over the previous document.
pub struct JsonFileHistoryStore {
    path: PathBuf,
}

impl JsonFileHistoryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn directory(&self) -> &Path {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        }
    }
}

impl HistoryStore for JsonFileHistoryStore {
    fn name(&self) -> &str {
        "json"
    }

    fn load(&self) -> Result<HistoryRecord, HistoryError> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(HistoryRecord::default()),
            Err(e) => return Err(HistoryError::io(&self.path, e)),
        };

        if contents.trim().is_empty() {
            return Ok(HistoryRecord::default());
        }

        serde_json::from_str(&contents).map_err(|e| HistoryError::Corrupt {
            path: self.path.clone(),
            reason: e.to_string(),
        })
    }

    fn save(&self, record: &HistoryRecord) -> Result<(), HistoryError> {
        let dir = self.directory();
        let io_err = |e: std::io::Error| HistoryError::io(&self.path, e);

        let mut tmp = NamedTempFile::new_in(dir).map_err(io_err)?;
        serde_json::to_writer_pretty(&mut tmp, record)
            .map_err(|e| io_err(std::io::Error::other(e)))?;
        tmp.write_all(b"\n").map_err(io_err)?;
        tmp.as_file().sync_all().map_err(io_err)?;
        tmp.persist(&self.path).map_err(|e| io_err(e.error))?;

        // Make the rename itself durable.
        if let Err(e) = sync_dir(dir) {
            debug!(dir = %dir.display(), error = %e, "Directory fsync failed, rename may not be durable");
        }

        Ok(())
    }
}

/// Flush directory metadata so a completed rename survives a crash.
pub(crate) fn sync_dir(dir: &Path) -> std::io::Result<()> {
    File::open(dir)?.sync_all()
}
