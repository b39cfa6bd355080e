//! Next-item selection with no repeats inside a rotation.
//!
//! The eligible pool is recomputed from the current catalog generation and
//! the play history on every call. History identities missing from the
//! catalog are ignored; new catalog items are immediately eligible.

use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::catalog::{Catalog, Item};
use crate::history::{HistoryError, PlayHistory};

/// How an item is picked from the eligible pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionPolicy {
    /// Uniform draw from the unplayed items.
    #[default]
    Random,
    /// First unplayed item in catalog order after the stored cursor.
    Sequential,
}

/// Result of a scheduling decision.
#[derive(Debug, Clone)]
pub struct Selection {
    pub item: Item,
    /// Catalog position of the chosen item.
    pub position: usize,
    /// Whether the history was reset to make this selection.
    pub rotation_reset: bool,
}

/// Chooses the next item to transmit.
pub struct Scheduler {
    policy: SelectionPolicy,
    rng: StdRng,
}

impl Scheduler {
    pub fn new(policy: SelectionPolicy) -> Self {
        Self {
            policy,
            rng: StdRng::from_os_rng(),
        }
    }

    /// Scheduler with a deterministic random source.
    pub fn with_seed(policy: SelectionPolicy, seed: u64) -> Self {
        Self {
            policy,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn policy(&self) -> SelectionPolicy {
        self.policy
    }

    /// Pick the next item.
    ///
    /// When every catalog identity has already been played the history is
    /// reset first, so a non-empty catalog always yields an item. The only
    /// possible failure is the history reset not reaching storage.
    pub fn next(
        &mut self,
        catalog: &Catalog,
        history: &mut PlayHistory,
    ) -> Result<Selection, HistoryError> {
        let mut available = Self::available(catalog, history);
        let mut rotation_reset = false;

        if available.is_empty() {
            info!(
                items = catalog.len(),
                "All items have been played, starting a new rotation"
            );
            history.reset()?;
            rotation_reset = true;
            available = catalog.items().iter().enumerate().collect();
        }

        let (position, item) = match self.policy {
            SelectionPolicy::Random => *available
                .choose(&mut self.rng)
                .unwrap_or(&available[0]),
            SelectionPolicy::Sequential => {
                let after_cursor = history
                    .cursor()
                    .and_then(|cursor| available.iter().find(|(pos, _)| *pos > cursor));
                *after_cursor.unwrap_or(&available[0])
            }
        };

        Ok(Selection {
            item: item.clone(),
            position,
            rotation_reset,
        })
    }

    /// Unplayed catalog items with their positions, in catalog order.
    fn available<'a>(catalog: &'a Catalog, history: &PlayHistory) -> Vec<(usize, &'a Item)> {
        let played = history.already_played();
        catalog
            .items()
            .iter()
            .enumerate()
            .filter(|(_, item)| !played.contains(item.identity()))
            .collect()
    }
}
