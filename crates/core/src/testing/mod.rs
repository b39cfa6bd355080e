//! Testing utilities and mock implementations.
//!
//! Mocks for every seam of the playout loop, so the controller can be driven
//! end to end without ffmpeg or real files.
//!
//! # Example
//!
//! ```rust,ignore
//! use playout_core::testing::{MockCatalog, MockSupervisor, MemoryHistoryStore};
//!
//! let catalog = MockCatalog::with_titles(&["A", "B", "C"]);
//! let supervisor = MockSupervisor::new();
//! supervisor.push_outcome(MockOutcome::Fail(1));
//! ```

mod memory_store;
mod mock_catalog;
mod mock_supervisor;

pub use memory_store::MemoryHistoryStore;
pub use mock_catalog::MockCatalog;
pub use mock_supervisor::{MockOutcome, MockSupervisor};

/// Test fixtures and helper functions.
pub mod fixtures {
    use crate::catalog::{Catalog, Item};

    /// An item with a locator derived from its title.
    pub fn item(title: &str) -> Item {
        let slug = title.to_lowercase().replace(' ', "-");
        Item::new(title, format!("https://media.example.com/{}.mp4", slug))
    }

    /// A first-generation catalog with one item per title.
    pub fn catalog(titles: &[&str]) -> Catalog {
        Catalog::new(titles.iter().map(|t| item(t)).collect(), 1, "fixture")
            .expect("fixture catalog must not be empty")
    }
}
