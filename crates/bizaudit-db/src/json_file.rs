//! File-based collection store: one JSON file per collection.
//! Human-readable, git-friendly. Writes go to a temp file first and are
//! renamed into place so a crash never leaves a half-written collection.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use bizaudit_core::error::{BizAuditError, Result};
use bizaudit_core::traits::CollectionStore;
use serde_json::Value;

pub struct JsonFileStore {
    dir: PathBuf,
    /// Serialises file access within this process.
    io: Mutex<()>,
}

impl JsonFileStore {
    /// Create a store rooted at `dir`, creating it if needed.
    pub fn new(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
            io: Mutex::new(()),
        })
    }

    fn file(&self, collection: &str) -> Result<PathBuf> {
        if collection.is_empty()
            || !collection
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(BizAuditError::Storage(format!(
                "Invalid collection name '{collection}'"
            )));
        }
        Ok(self.dir.join(format!("{collection}.json")))
    }
}

impl CollectionStore for JsonFileStore {
    fn name(&self) -> &str {
        "json"
    }

    fn read_all(&self, collection: &str) -> Result<Vec<Value>> {
        let file = self.file(collection)?;
        let _guard = self.io.lock().unwrap_or_else(|e| e.into_inner());
        if !file.exists() {
            return Ok(Vec::new());
        }
        let json = std::fs::read_to_string(&file)
            .map_err(|e| BizAuditError::Storage(format!("Read {}: {e}", file.display())))?;
        if json.trim().is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(&json)
            .map_err(|e| BizAuditError::Storage(format!("Parse {}: {e}", file.display())))
    }

    fn write_all(&self, collection: &str, records: &[Value]) -> Result<()> {
        let file = self.file(collection)?;
        let json = serde_json::to_string_pretty(records)
            .map_err(|e| BizAuditError::Storage(format!("Serialize error: {e}")))?;

        let _guard = self.io.lock().unwrap_or_else(|e| e.into_inner());
        let tmp = file.with_extension("json.tmp");
        std::fs::write(&tmp, &json)
            .map_err(|e| BizAuditError::Storage(format!("Write {}: {e}", tmp.display())))?;
        std::fs::rename(&tmp, &file)
            .map_err(|e| BizAuditError::Storage(format!("Rename {}: {e}", file.display())))?;
        tracing::debug!("💾 Saved {} records to {}", records.len(), file.display());
        Ok(())
    }
}
