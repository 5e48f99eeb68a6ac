//! SQLite-backed collection store.
//! One row per record, ordered by position; a collection write replaces all
//! of its rows inside a single transaction.

use std::path::Path;
use std::sync::Mutex;

use bizaudit_core::error::{BizAuditError, Result};
use bizaudit_core::traits::CollectionStore;
use rusqlite::{Connection, params};
use serde_json::Value;

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create the database file.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).map_err(|e| BizAuditError::Storage(format!("DB open: {e}")))?;
        Self::with_connection(conn)
    }

    /// Private in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| BizAuditError::Storage(format!("DB open: {e}")))?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.migrate()?;
        Ok(store)
    }

    /// Run migrations to create tables.
    /// In-memory databases report `memory` and ignore the WAL request.
    fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA busy_timeout = 5000;",
        )
        .map_err(|e| BizAuditError::Storage(format!("DB pragma error: {e}")))?;
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS records (
                collection TEXT NOT NULL,
                position INTEGER NOT NULL,
                body TEXT NOT NULL,           -- JSON record
                updated_at TEXT NOT NULL,
                PRIMARY KEY (collection, position)
            );
            ",
        )
        .map_err(|e| BizAuditError::Storage(format!("Migration: {e}")))?;
        Ok(())
    }

    /// Current journal mode (`wal` for file databases).
    pub fn journal_mode(&self) -> Result<String> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        conn.query_row("PRAGMA journal_mode", [], |row| row.get::<_, String>(0))
            .map_err(BizAuditError::storage)
    }

    /// Names of all non-empty collections.
    pub fn collections(&self) -> Result<Vec<String>> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let mut stmt = conn
            .prepare("SELECT DISTINCT collection FROM records ORDER BY collection")
            .map_err(BizAuditError::storage)?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(BizAuditError::storage)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(BizAuditError::storage)
    }
}

impl CollectionStore for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn read_all(&self, collection: &str) -> Result<Vec<Value>> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let mut stmt = conn
            .prepare("SELECT body FROM records WHERE collection = ?1 ORDER BY position")
            .map_err(|e| BizAuditError::Storage(format!("Load {collection}: {e}")))?;
        let rows = stmt
            .query_map([collection], |row| row.get::<_, String>(0))
            .map_err(|e| BizAuditError::Storage(format!("Load {collection}: {e}")))?;

        let mut records = Vec::new();
        for row in rows {
            let body = row.map_err(BizAuditError::storage)?;
            let value = serde_json::from_str(&body).map_err(|e| {
                BizAuditError::Storage(format!("Corrupt row in '{collection}': {e}"))
            })?;
            records.push(value);
        }
        Ok(records)
    }

    fn write_all(&self, collection: &str, records: &[Value]) -> Result<()> {
        let mut conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let tx = conn
            .transaction()
            .map_err(|e| BizAuditError::Storage(format!("Begin: {e}")))?;
        tx.execute("DELETE FROM records WHERE collection = ?1", [collection])
            .map_err(|e| BizAuditError::Storage(format!("Clear {collection}: {e}")))?;
        {
            let mut insert = tx
                .prepare(
                    "INSERT INTO records (collection, position, body, updated_at)
                     VALUES (?1, ?2, ?3, ?4)",
                )
                .map_err(BizAuditError::storage)?;
            let now = chrono::Utc::now().to_rfc3339();
            for (position, record) in records.iter().enumerate() {
                insert
                    .execute(params![collection, position as i64, record.to_string(), now])
                    .map_err(|e| BizAuditError::Storage(format!("Save {collection}: {e}")))?;
            }
        }
        tx.commit()
            .map_err(|e| BizAuditError::Storage(format!("Commit {collection}: {e}")))?;
        tracing::debug!("💾 Saved {} records to sqlite '{}'", records.len(), collection);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_open_and_migrate() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert!(store.read_all("tasks").unwrap().is_empty());
    }

    #[test]
    fn test_write_replaces_collection() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .write_all("tasks", &[json!({"id": "1"}), json!({"id": "2"}), json!({"id": "3"})])
            .unwrap();
        store.write_all("tasks", &[json!({"id": "3"})]).unwrap();
        let records = store.read_all("tasks").unwrap();
        assert_eq!(records, vec![json!({"id": "3"})]);
    }

    #[test]
    fn test_collections_listed() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.write_all("leads", &[json!({"id": "l1"})]).unwrap();
        store.write_all("tasks", &[json!({"id": "t1"})]).unwrap();
        store.write_all("empty", &[]).unwrap();
        assert_eq!(store.collections().unwrap(), vec!["leads", "tasks"]);
    }

    #[test]
    fn test_reopen_from_file() {
        let dir = std::env::temp_dir().join(format!("bizaudit-sqlite-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("test.db");
        {
            let store = SqliteStore::open(&path).unwrap();
            store.write_all("workflows", &[json!({"id": "wf-1"})]).unwrap();
        }
        let store = SqliteStore::open(&path).unwrap();
        assert_eq!(store.read_all("workflows").unwrap().len(), 1);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_file_database_uses_wal() {
        let dir = std::env::temp_dir().join(format!("bizaudit-wal-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let store = SqliteStore::open(&dir.join("wal.db")).unwrap();
        assert_eq!(store.journal_mode().unwrap().to_lowercase(), "wal");
        store.write_all("leads", &[json!({"id": "l1"})]).unwrap();
        assert_eq!(store.read_all("leads").unwrap().len(), 1);
        drop(store);
        std::fs::remove_dir_all(&dir).ok();
    }
}
