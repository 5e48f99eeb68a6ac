//! # BizAudit DB
//!
//! Backends for the whole-collection [`CollectionStore`] contract:
//! - [`SqliteStore`]: one table, one row per record, survives restarts
//! - [`JsonFileStore`]: one pretty-printed JSON file per collection
//! - [`MemoryStore`]: process-local, for tests and dry runs

pub mod json_file;
pub mod memory;
pub mod sqlite;

use std::sync::Arc;

use bizaudit_core::config::StorageConfig;
use bizaudit_core::error::{BizAuditError, Result};
use bizaudit_core::traits::CollectionStore;

pub use json_file::JsonFileStore;
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Open the store selected by `[storage]`.
pub fn open_store(config: &StorageConfig) -> Result<Arc<dyn CollectionStore>> {
    let path = config.resolved_path();
    match config.backend.as_str() {
        "sqlite" => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            Ok(Arc::new(SqliteStore::open(&path)?))
        }
        "json" => Ok(Arc::new(JsonFileStore::new(&path)?)),
        "memory" => Ok(Arc::new(MemoryStore::new())),
        other => Err(BizAuditError::Config(format!(
            "Unknown storage backend '{other}' (expected sqlite, json or memory)"
        ))),
    }
}
