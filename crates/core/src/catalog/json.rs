//! JSON file catalog source.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use super::types::{Catalog, CatalogError, Item};
use super::CatalogSource;

/// Catalog read from a JSON document on disk.
///
/// Accepted shapes: a top-level array of entries, or an object with an
/// `items` array. Each entry needs a `title` and a locator (`url` or
/// `source`); other string fields become item metadata.
pub struct JsonFileCatalog {
    path: PathBuf,
    generation: AtomicU64,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CatalogDocument {
    List(Vec<RawEntry>),
    Wrapped { items: Vec<RawEntry> },
}

#[derive(Deserialize)]
struct RawEntry {
    #[serde(default)]
    title: Option<String>,
    #[serde(default, alias = "source")]
    url: Option<String>,
    #[serde(flatten)]
    extra: BTreeMap<String, serde_json::Value>,
}

impl JsonFileCatalog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            generation: AtomicU64::new(0),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Parse a catalog document. Returns the valid items and the number of
    /// dropped entries.
    pub fn parse(&self, bytes: &[u8]) -> Result<(Vec<Item>, usize), CatalogError> {
        let document: CatalogDocument =
            serde_json::from_slice(bytes).map_err(|e| CatalogError::Malformed {
                source_name: self.describe(),
                reason: e.to_string(),
            })?;

        let entries = match document {
            CatalogDocument::List(entries) => entries,
            CatalogDocument::Wrapped { items } => items,
        };

        let mut items = Vec::with_capacity(entries.len());
        let mut dropped = 0;

        for (index, entry) in entries.into_iter().enumerate() {
            let title = entry.title.map(|t| t.trim().to_string()).unwrap_or_default();
            let source = entry.url.map(|u| u.trim().to_string()).unwrap_or_default();

            if title.is_empty() || source.is_empty() {
                warn!(
                    catalog = %self.path.display(),
                    index,
                    "Dropping catalog entry without title or locator"
                );
                dropped += 1;
                continue;
            }

            let metadata = entry
                .extra
                .into_iter()
                .filter_map(|(key, value)| match value {
                    serde_json::Value::String(s) => Some((key, s)),
                    serde_json::Value::Number(n) => Some((key, n.to_string())),
                    serde_json::Value::Bool(b) => Some((key, b.to_string())),
                    _ => None,
                })
                .collect();

            items.push(Item {
                title,
                source,
                metadata,
            });
        }

        Ok((items, dropped))
    }
}

#[async_trait]
impl CatalogSource for JsonFileCatalog {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    async fn load(&self) -> Result<Catalog, CatalogError> {
        let bytes = tokio::fs::read(&self.path)
            .await
            .map_err(|e| CatalogError::Malformed {
                source_name: self.describe(),
                reason: format!("cannot read file: {}", e),
            })?;

        let (items, dropped) = self.parse(&bytes)?;
        if items.is_empty() {
            return Err(CatalogError::Empty {
                source_name: self.describe(),
                dropped,
            });
        }

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(
            catalog = %self.path.display(),
            generation,
            items = items.len(),
            dropped,
            "Catalog loaded"
        );

        Catalog::new(items, generation, self.describe())
    }
}
