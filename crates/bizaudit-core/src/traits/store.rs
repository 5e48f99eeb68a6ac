//! Durable store collaborator: whole-collection read/write.
//!
//! Every mutation in the engines is a read-all → modify → write-all cycle,
//! serialised by the repository that owns the collection.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{BizAuditError, Result};

pub trait CollectionStore: Send + Sync {
    /// Backend name, used in logs.
    fn name(&self) -> &str;

    /// Read every record of a collection, in stored order. Missing collection = empty.
    fn read_all(&self, collection: &str) -> Result<Vec<Value>>;

    /// Replace the whole collection.
    fn write_all(&self, collection: &str, records: &[Value]) -> Result<()>;
}

/// Read a collection and decode each record.
pub fn load<T: DeserializeOwned>(store: &dyn CollectionStore, collection: &str) -> Result<Vec<T>> {
    store
        .read_all(collection)?
        .into_iter()
        .map(|v| {
            serde_json::from_value(v).map_err(|e| {
                BizAuditError::Storage(format!("Corrupt record in '{collection}': {e}"))
            })
        })
        .collect()
}

/// Encode records and replace the collection.
pub fn save<T: Serialize>(store: &dyn CollectionStore, collection: &str, records: &[T]) -> Result<()> {
    let values = records
        .iter()
        .map(serde_json::to_value)
        .collect::<std::result::Result<Vec<_>, _>>()?;
    store.write_all(collection, &values)
}

/// A log-like collection that can drop records older than a cutoff.
/// Used by the weekly cleanup job; each owner prunes under its own lock.
#[async_trait::async_trait]
pub trait Prunable: Send + Sync {
    /// Collection label, used in logs.
    fn label(&self) -> &str;

    /// Remove records older than `cutoff`; returns how many were removed.
    async fn prune_before(&self, cutoff: chrono::DateTime<chrono::Utc>) -> Result<usize>;
}
