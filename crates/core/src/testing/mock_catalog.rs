//! Mock catalog source for testing.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::catalog::{Catalog, CatalogError, CatalogSource, Item};

type Response = Result<Vec<Item>, CatalogError>;

/// Catalog source returning scripted responses.
///
/// Queued responses are served first; afterwards every load returns the
/// fallback response.
pub struct MockCatalog {
    queued: Mutex<VecDeque<Response>>,
    fallback: Mutex<Response>,
    loads: AtomicUsize,
    generation: AtomicU64,
}

impl MockCatalog {
    /// Always serve these items.
    pub fn with_items(items: Vec<Item>) -> Self {
        Self::with_fallback(Ok(items))
    }

    /// Always serve one item per title.
    pub fn with_titles(titles: &[&str]) -> Self {
        Self::with_items(titles.iter().map(|t| super::fixtures::item(t)).collect())
    }

    /// Always fail with `error`.
    pub fn failing(error: CatalogError) -> Self {
        Self::with_fallback(Err(error))
    }

    /// Always report an empty catalog.
    pub fn empty() -> Self {
        Self::failing(CatalogError::Empty {
            source_name: "mock".to_string(),
            dropped: 0,
        })
    }

    fn with_fallback(fallback: Response) -> Self {
        Self {
            queued: Mutex::new(VecDeque::new()),
            fallback: Mutex::new(fallback),
            loads: AtomicUsize::new(0),
            generation: AtomicU64::new(0),
        }
    }

    /// Serve `response` on the next unqueued load.
    pub fn push_response(&self, response: Response) {
        self.queued.lock().unwrap().push_back(response);
    }

    /// Replace the fallback response.
    pub fn set_fallback(&self, response: Response) {
        *self.fallback.lock().unwrap() = response;
    }

    /// Number of `load` calls so far.
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CatalogSource for MockCatalog {
    fn describe(&self) -> String {
        "mock catalog".to_string()
    }

    async fn load(&self) -> Result<Catalog, CatalogError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        let response = self
            .queued
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.lock().unwrap().clone());
        let items = response?;
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        Catalog::new(items, generation, "mock")
    }
}
