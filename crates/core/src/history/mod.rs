//! Play history - which identities have already aired in the current rotation.
//!
//! [`PlayHistory`] owns all mutation and talks to storage only through the
//! [`HistoryStore`] port, so the same rotation logic runs against a JSON file,
//! a SQLite database or an in-memory store in tests.

mod json_store;
mod play_history;
mod sqlite_store;
mod store;

pub use json_store::JsonFileHistoryStore;
pub(crate) use json_store::sync_dir;
pub use play_history::PlayHistory;
pub use sqlite_store::SqliteHistoryStore;
pub use store::{HistoryError, HistoryRecord, HistoryStore};
