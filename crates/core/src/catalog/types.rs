//! Catalog data types.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur while loading a catalog.
#[derive(Debug, Clone, Error)]
pub enum CatalogError {
    /// The source produced no playable items.
    #[error("catalog {source_name} has no playable items ({dropped} entries dropped)")]
    Empty { source_name: String, dropped: usize },

    /// The source could not be read or is not in the expected format.
    #[error("catalog {source_name} is malformed: {reason}")]
    Malformed { source_name: String, reason: String },
}

impl CatalogError {
    /// Short label used for metrics and status reporting.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Empty { .. } => "empty",
            Self::Malformed { .. } => "malformed",
        }
    }
}

/// One playable catalog entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    /// Display title; also the identity used for play history.
    pub title: String,
    /// URI or path handed to the transmission process.
    pub source: String,
    /// Free-form descriptive fields (category, image, description, ...).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

impl Item {
    /// Create an item without metadata.
    pub fn new(title: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            source: source.into(),
            metadata: BTreeMap::new(),
        }
    }

    /// Add a metadata field.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Identity key for history and deduplication.
    pub fn identity(&self) -> &str {
        &self.title
    }

    /// Look up a metadata field.
    pub fn meta(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }
}

/// One loaded generation of the catalog.
///
/// Never empty: construction fails with [`CatalogError::Empty`] instead.
#[derive(Debug, Clone)]
pub struct Catalog {
    items: Vec<Item>,
    generation: u64,
}

impl Catalog {
    /// Build a catalog generation from already-validated items.
    pub fn new(
        items: Vec<Item>,
        generation: u64,
        source_name: impl Into<String>,
    ) -> Result<Self, CatalogError> {
        if items.is_empty() {
            return Err(CatalogError::Empty {
                source_name: source_name.into(),
                dropped: 0,
            });
        }
        Ok(Self { items, generation })
    }

    /// Items in catalog order.
    pub fn items(&self) -> &[Item] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Always false; kept for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_catalog_rejected() {
        let result = Catalog::new(Vec::new(), 1, "test");
        assert!(matches!(result, Err(CatalogError::Empty { .. })));
    }

    #[test]
    fn test_item_metadata() {
        let item = Item::new("Night of the Living Dead", "https://cdn.example.com/notld.mp4")
            .with_metadata("category", "Horror");
        assert_eq!(item.identity(), "Night of the Living Dead");
        assert_eq!(item.meta("category"), Some("Horror"));
        assert_eq!(item.meta("image"), None);
    }

    #[test]
    fn test_error_kind() {
        let err = CatalogError::Malformed {
            source_name: "movies.json".to_string(),
            reason: "expected array".to_string(),
        };
        assert_eq!(err.kind(), "malformed");
        assert_eq!(
            err.to_string(),
            "catalog movies.json is malformed: expected array"
        );
    }
}
