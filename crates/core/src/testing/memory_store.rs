//! In-memory history store for testing.

use std::io::ErrorKind;
use std::sync::Mutex;

use crate::history::{HistoryError, HistoryRecord, HistoryStore};

/// History store backed by memory, with injectable write failures.
#[derive(Debug, Default)]
pub struct MemoryHistoryStore {
    record: Mutex<HistoryRecord>,
    saves: Mutex<usize>,
    fail_next: Mutex<Option<ErrorKind>>,
    fail_always: Mutex<Option<ErrorKind>>,
}

impl MemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with a rotation in progress.
    pub fn with_played(titles: &[&str]) -> Self {
        Self::with_record(HistoryRecord {
            played: titles.iter().map(|t| t.to_string()).collect(),
            ..Default::default()
        })
    }

    pub fn with_record(record: HistoryRecord) -> Self {
        Self {
            record: Mutex::new(record),
            ..Default::default()
        }
    }

    /// The last successfully saved record.
    pub fn snapshot(&self) -> HistoryRecord {
        self.record.lock().unwrap().clone()
    }

    /// Number of successful saves.
    pub fn save_count(&self) -> usize {
        *self.saves.lock().unwrap()
    }

    /// Fail the next save with an I/O error of `kind`.
    pub fn fail_next_save(&self, kind: ErrorKind) {
        *self.fail_next.lock().unwrap() = Some(kind);
    }

    /// Fail every save from now on.
    pub fn fail_all_saves(&self, kind: ErrorKind) {
        *self.fail_always.lock().unwrap() = Some(kind);
    }
}

impl HistoryStore for MemoryHistoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    fn load(&self) -> Result<HistoryRecord, HistoryError> {
        Ok(self.snapshot())
    }

    fn save(&self, record: &HistoryRecord) -> Result<(), HistoryError> {
        let failure = self
            .fail_next
            .lock()
            .unwrap()
            .take()
            .or(*self.fail_always.lock().unwrap());
        if let Some(kind) = failure {
            return Err(HistoryError::io("memory", std::io::Error::from(kind)));
        }
        *self.record.lock().unwrap() = record.clone();
        *self.saves.lock().unwrap() += 1;
        Ok(())
    }
}
