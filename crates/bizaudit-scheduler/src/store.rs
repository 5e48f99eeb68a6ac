//! Task store: upsert-by-id repository over the `tasks` collection.
//! Every mutation is a whole-collection read → modify → write cycle, serialised
//! by the store's own lock so concurrent upserts are never lost.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use bizaudit_core::error::Result;
use bizaudit_core::traits::store::{self, CollectionStore};
use bizaudit_core::types::collections;

use crate::tasks::{Task, TaskStatus};

pub struct TaskStore {
    store: Arc<dyn CollectionStore>,
    lock: Mutex<()>,
}

impl TaskStore {
    pub fn new(store: Arc<dyn CollectionStore>) -> Self {
        Self {
            store,
            lock: Mutex::new(()),
        }
    }

    fn load(&self) -> Result<Vec<Task>> {
        store::load(self.store.as_ref(), collections::TASKS)
    }

    /// Insert or replace by id. A replaced task keeps its position.
    pub async fn put(&self, task: &Task) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut tasks = self.load()?;
        match tasks.iter_mut().find(|t| t.id == task.id) {
            Some(existing) => *existing = task.clone(),
            None => tasks.push(task.clone()),
        }
        store::save(self.store.as_ref(), collections::TASKS, &tasks)?;
        tracing::debug!("💾 Saved task {} ({})", task.id, task.status.as_str());
        Ok(())
    }

    pub async fn get(&self, id: &str) -> Result<Option<Task>> {
        Ok(self.load()?.into_iter().find(|t| t.id == id))
    }

    /// All tasks in insertion order, optionally filtered by status.
    pub async fn list(&self, status: Option<TaskStatus>) -> Result<Vec<Task>> {
        let tasks = self.load()?;
        Ok(match status {
            Some(s) => tasks.into_iter().filter(|t| t.status == s).collect(),
            None => tasks,
        })
    }

    /// Latest first.
    pub async fn list_latest(&self, status: Option<TaskStatus>) -> Result<Vec<Task>> {
        let mut tasks = self.list(status).await?;
        tasks.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(tasks)
    }

    /// Tasks created in `[from, to)`.
    pub async fn list_between(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Vec<Task>> {
        Ok(self
            .load()?
            .into_iter()
            .filter(|t| t.timestamp >= from && t.timestamp < to)
            .collect())
    }

    /// Remove by id; false when absent.
    pub async fn delete(&self, id: &str) -> Result<bool> {
        let _guard = self.lock.lock().await;
        let mut tasks = self.load()?;
        let len = tasks.len();
        tasks.retain(|t| t.id != id);
        if tasks.len() == len {
            return Ok(false);
        }
        store::save(self.store.as_ref(), collections::TASKS, &tasks)?;
        tracing::info!("🗑️ Task deleted: {id}");
        Ok(true)
    }
}
