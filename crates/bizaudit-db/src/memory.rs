//! In-memory collection store.

use std::collections::HashMap;
use std::sync::Mutex;

use bizaudit_core::error::Result;
use bizaudit_core::traits::CollectionStore;
use serde_json::Value;

#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: Mutex<HashMap<String, Vec<Value>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CollectionStore for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    fn read_all(&self, collection: &str) -> Result<Vec<Value>> {
        let collections = self.collections.lock().unwrap_or_else(|e| e.into_inner());
        Ok(collections.get(collection).cloned().unwrap_or_default())
    }

    fn write_all(&self, collection: &str, records: &[Value]) -> Result<()> {
        let mut collections = self.collections.lock().unwrap_or_else(|e| e.into_inner());
        collections.insert(collection.to_string(), records.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_collections_are_isolated() {
        let store = MemoryStore::new();
        store.write_all("a", &[json!({"id": 1})]).unwrap();
        assert_eq!(store.read_all("a").unwrap().len(), 1);
        assert!(store.read_all("b").unwrap().is_empty());
    }
}
