//! Playable catalog - the list of items the channel rotates through.
//!
//! A catalog is loaded from an external source at startup and re-read
//! between scheduling decisions. Every load produces a new generation; the
//! scheduler never caches anything derived from a previous one.

mod json;
mod types;

pub use json::JsonFileCatalog;
pub use types::*;

use async_trait::async_trait;

/// Source of catalog generations.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    /// Human-readable description of where the catalog comes from.
    fn describe(&self) -> String;

    /// Load the current catalog.
    ///
    /// Fails with [`CatalogError::Malformed`] if the source cannot be read or
    /// parsed, and with [`CatalogError::Empty`] if no valid item remains after
    /// dropping entries without a title or locator. Loading has no side
    /// effects; repeated loads may return different contents.
    async fn load(&self) -> Result<Catalog, CatalogError>;
}
