//! SQLite-backed history store.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};

use super::store::{HistoryError, HistoryRecord, HistoryStore};

/// SQLite-backed play history.
pub struct SqliteHistoryStore {
    conn: Mutex<Connection>,
}

fn db_error(e: rusqlite::Error) -> HistoryError {
    let structural = matches!(
        e.sqlite_error_code(),
        Some(
            ErrorCode::ReadOnly
                | ErrorCode::CannotOpen
                | ErrorCode::PermissionDenied
                | ErrorCode::NotADatabase
        )
    );
    HistoryError::Database {
        message: e.to_string(),
        structural,
    }
}

impl SqliteHistoryStore {
    /// Open (or create) the history database at `path`.
    pub fn new(path: &Path) -> Result<Self, HistoryError> {
        let conn = Connection::open(path).map_err(db_error)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory store (useful for testing).
    pub fn in_memory() -> Result<Self, HistoryError> {
        let conn = Connection::open_in_memory().map_err(db_error)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), HistoryError> {
        conn.execute_batch(
            r#"
            -- Identities launched in the current rotation, in launch order
            CREATE TABLE IF NOT EXISTS played (
                position INTEGER PRIMARY KEY,
                title TEXT NOT NULL
            );

            -- Rotation cursor and bookkeeping
            CREATE TABLE IF NOT EXISTS history_meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            "#,
        )
        .map_err(db_error)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, HistoryError> {
        self.conn.lock().map_err(|_| HistoryError::Database {
            message: "history connection lock poisoned".to_string(),
            structural: true,
        })
    }

    fn meta(conn: &Connection, key: &str) -> Result<Option<String>, HistoryError> {
        conn.query_row(
            "SELECT value FROM history_meta WHERE key = ?1",
            params![key],
            |row| row.get(0),
        )
        .optional()
        .map_err(db_error)
    }
}

impl HistoryStore for SqliteHistoryStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn load(&self) -> Result<HistoryRecord, HistoryError> {
        let conn = self.conn()?;

        let mut stmt = conn
            .prepare("SELECT title FROM played ORDER BY position")
            .map_err(db_error)?;
        let played = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(db_error)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(db_error)?;

        let cursor = Self::meta(&conn, "cursor")?.and_then(|v| v.parse::<usize>().ok());
        let updated_at = Self::meta(&conn, "updated_at")?
            .and_then(|v| DateTime::parse_from_rfc3339(&v).ok())
            .map(|dt| dt.with_timezone(&Utc));

        Ok(HistoryRecord {
            played,
            cursor,
            updated_at,
        })
    }

    fn save(&self, record: &HistoryRecord) -> Result<(), HistoryError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(db_error)?;

        tx.execute("DELETE FROM played", []).map_err(db_error)?;
        {
            let mut insert = tx
                .prepare("INSERT INTO played (position, title) VALUES (?1, ?2)")
                .map_err(db_error)?;
            for (position, title) in record.played.iter().enumerate() {
                insert
                    .execute(params![position as i64, title])
                    .map_err(db_error)?;
            }
        }

        match record.cursor {
            Some(cursor) => {
                tx.execute(
                    "INSERT INTO history_meta (key, value) VALUES ('cursor', ?1)
                     ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                    params![cursor.to_string()],
                )
                .map_err(db_error)?;
            }
            None => {
                tx.execute("DELETE FROM history_meta WHERE key = 'cursor'", [])
                    .map_err(db_error)?;
            }
        }

        let updated_at = record.updated_at.unwrap_or_else(Utc::now);
        tx.execute(
            "INSERT INTO history_meta (key, value) VALUES ('updated_at', ?1)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![updated_at.to_rfc3339()],
        )
        .map_err(db_error)?;

        tx.commit().map_err(db_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_fresh_store_is_empty() {
        let store = SqliteHistoryStore::in_memory().unwrap();
        let record = store.load().unwrap();
        assert!(record.played.is_empty());
        assert_eq!(record.cursor, None);
    }

    #[test]
    fn test_save_replaces_record() {
        let store = SqliteHistoryStore::in_memory().unwrap();
        store
            .save(&HistoryRecord {
                played: vec!["A".to_string(), "B".to_string(), "C".to_string()],
                cursor: Some(2),
                updated_at: None,
            })
            .unwrap();
        store
            .save(&HistoryRecord {
                played: vec!["D".to_string()],
                cursor: None,
                updated_at: None,
            })
            .unwrap();

        let record = store.load().unwrap();
        assert_eq!(record.played, vec!["D"]);
        assert_eq!(record.cursor, None);
        assert!(record.updated_at.is_some());
    }

    #[test]
    fn test_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("history.db");

        {
            let store = SqliteHistoryStore::new(&path).unwrap();
            store
                .save(&HistoryRecord {
                    played: vec!["Metropolis".to_string(), "Nosferatu".to_string()],
                    cursor: Some(4),
                    updated_at: None,
                })
                .unwrap();
        }

        let store = SqliteHistoryStore::new(&path).unwrap();
        let record = store.load().unwrap();
        assert_eq!(record.played, vec!["Metropolis", "Nosferatu"]);
        assert_eq!(record.cursor, Some(4));
    }

    #[test]
    fn test_unopenable_path_is_structural() {
        let err = SqliteHistoryStore::new(Path::new("/nonexistent-dir/playout/history.db"))
            .err()
            .unwrap();
        assert!(err.is_structural());
    }
}
