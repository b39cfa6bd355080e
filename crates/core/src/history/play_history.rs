//! Rotation-scoped play history.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, warn};

use super::store::{HistoryError, HistoryRecord, HistoryStore};

/// The set of identities already launched in the current rotation.
///
/// Every mutation updates the in-memory state first and then flushes the
/// whole record to the store before returning. A failed flush leaves the
/// in-memory state updated, so this process still honours the rotation;
/// the next successful flush rewrites the complete record.
pub struct PlayHistory {
    store: Arc<dyn HistoryStore>,
    record: HistoryRecord,
    index: HashSet<String>,
}

impl PlayHistory {
    /// Load the history from `store`.
    ///
    /// A corrupt record is logged and replaced by an empty rotation; any
    /// other storage error is returned.
    pub fn open(store: Arc<dyn HistoryStore>) -> Result<Self, HistoryError> {
        let record = match store.load() {
            Ok(record) => record,
            Err(e @ HistoryError::Corrupt { .. }) => {
                warn!(
                    backend = store.name(),
                    error = %e,
                    "Play history is unreadable, starting a fresh rotation"
                );
                HistoryRecord::default()
            }
            Err(e) => return Err(e),
        };

        let index = record.played.iter().cloned().collect();
        debug!(
            backend = store.name(),
            played = record.played.len(),
            "Play history loaded"
        );

        Ok(Self {
            store,
            record,
            index,
        })
    }

    /// Identities already played in the current rotation.
    pub fn already_played(&self) -> &HashSet<String> {
        &self.index
    }

    pub fn contains(&self, identity: &str) -> bool {
        self.index.contains(identity)
    }

    /// Number of distinct identities played in this rotation.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Catalog position of the most recently launched item.
    pub fn cursor(&self) -> Option<usize> {
        self.record.cursor
    }

    /// Identities in launch order.
    pub fn played_in_order(&self) -> &[String] {
        &self.record.played
    }

    /// Whether every identity in `identities` has been played.
    pub fn covers<'a>(&self, identities: impl IntoIterator<Item = &'a str>) -> bool {
        identities.into_iter().all(|id| self.index.contains(id))
    }

    /// Record `identity` as played and flush.
    ///
    /// Marking an identity that is already present only refreshes the
    /// stored record.
    pub fn mark_played(&mut self, identity: &str) -> Result<(), HistoryError> {
        self.mark_played_at(identity, None)
    }

    /// Record `identity` as played at catalog `position` and flush.
    pub fn mark_played_at(
        &mut self,
        identity: &str,
        position: Option<usize>,
    ) -> Result<(), HistoryError> {
        if self.index.insert(identity.to_string()) {
            self.record.played.push(identity.to_string());
        }
        if position.is_some() {
            self.record.cursor = position;
        }
        self.flush()
    }

    /// Clear the rotation and flush.
    pub fn reset(&mut self) -> Result<(), HistoryError> {
        self.index.clear();
        self.record.played.clear();
        self.record.cursor = None;
        self.flush()
    }

    /// Write the current record to the store.
    pub fn flush(&mut self) -> Result<(), HistoryError> {
        self.record.updated_at = Some(Utc::now());
        self.store.save(&self.record)
    }
}
