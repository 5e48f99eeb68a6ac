//! Workflow repository over the `workflows` and `workflow_runs` collections.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use bizaudit_core::error::{BizAuditError, Result};
use bizaudit_core::traits::store::{self, CollectionStore, Prunable};
use bizaudit_core::types::collections;

use crate::workflow::{NewWorkflow, Workflow, WorkflowRunResult};

pub struct WorkflowStore {
    store: Arc<dyn CollectionStore>,
    lock: Mutex<()>,
    runs_lock: Mutex<()>,
}

impl WorkflowStore {
    pub fn new(store: Arc<dyn CollectionStore>) -> Self {
        Self {
            store,
            lock: Mutex::new(()),
            runs_lock: Mutex::new(()),
        }
    }

    fn load(&self) -> Result<Vec<Workflow>> {
        store::load(self.store.as_ref(), collections::WORKFLOWS)
    }

    fn save(&self, workflows: &[Workflow]) -> Result<()> {
        store::save(self.store.as_ref(), collections::WORKFLOWS, workflows)
    }

    /// Validate and persist a new workflow.
    pub async fn create(&self, new: NewWorkflow, now: DateTime<Utc>) -> Result<Workflow> {
        let workflow = Workflow {
            id: uuid::Uuid::new_v4().to_string(),
            name: new.name,
            description: new.description,
            trigger: new.trigger,
            schedule: new.schedule,
            steps: new.steps,
            is_active: true,
            created_by: new.created_by,
            created_at: now,
            last_run: None,
            run_count: 0,
        };
        workflow.validate()?;

        let _guard = self.lock.lock().await;
        let mut workflows = self.load()?;
        workflows.push(workflow.clone());
        self.save(&workflows)?;
        tracing::info!("⚡ Workflow created: '{}' ({})", workflow.name, workflow.id);
        Ok(workflow)
    }

    pub async fn get(&self, id: &str) -> Result<Option<Workflow>> {
        Ok(self.load()?.into_iter().find(|w| w.id == id))
    }

    pub async fn list(&self) -> Result<Vec<Workflow>> {
        self.load()
    }

    /// Replace an existing workflow. Run bookkeeping is kept from the stored copy.
    pub async fn update(&self, workflow: Workflow) -> Result<Workflow> {
        workflow.validate()?;
        let _guard = self.lock.lock().await;
        let mut workflows = self.load()?;
        let existing = workflows
            .iter_mut()
            .find(|w| w.id == workflow.id)
            .ok_or_else(|| BizAuditError::NotFound(format!("workflow '{}'", workflow.id)))?;

        let updated = Workflow {
            run_count: existing.run_count,
            last_run: existing.last_run,
            created_at: existing.created_at,
            ..workflow
        };
        *existing = updated.clone();
        self.save(&workflows)?;
        Ok(updated)
    }

    pub async fn delete(&self, id: &str) -> Result<bool> {
        let _guard = self.lock.lock().await;
        let mut workflows = self.load()?;
        let len = workflows.len();
        workflows.retain(|w| w.id != id);
        if workflows.len() == len {
            return Ok(false);
        }
        self.save(&workflows)?;
        tracing::info!("🗑️ Workflow deleted: {id}");
        Ok(true)
    }

    pub async fn set_active(&self, id: &str, active: bool) -> Result<Workflow> {
        self.modify(id, |w| w.is_active = active).await
    }

    /// `runCount += 1`, `lastRun = at`, under the repository lock.
    pub async fn record_run(&self, id: &str, at: DateTime<Utc>) -> Result<Workflow> {
        self.modify(id, |w| {
            w.run_count += 1;
            w.last_run = Some(at);
        })
        .await
    }

    async fn modify<F>(&self, id: &str, f: F) -> Result<Workflow>
    where
        F: FnOnce(&mut Workflow),
    {
        let _guard = self.lock.lock().await;
        let mut workflows = self.load()?;
        let workflow = workflows
            .iter_mut()
            .find(|w| w.id == id)
            .ok_or_else(|| BizAuditError::NotFound(format!("workflow '{id}'")))?;
        f(workflow);
        let updated = workflow.clone();
        self.save(&workflows)?;
        Ok(updated)
    }

    /// Append a run record.
    pub async fn append_run(&self, run: &WorkflowRunResult) -> Result<()> {
        let _guard = self.runs_lock.lock().await;
        let mut runs: Vec<WorkflowRunResult> = store::load(self.store.as_ref(), collections::WORKFLOW_RUNS)?;
        runs.push(run.clone());
        store::save(self.store.as_ref(), collections::WORKFLOW_RUNS, &runs)
    }

    /// Runs of one workflow, oldest first.
    pub async fn runs(&self, workflow_id: &str) -> Result<Vec<WorkflowRunResult>> {
        let runs: Vec<WorkflowRunResult> = store::load(self.store.as_ref(), collections::WORKFLOW_RUNS)?;
        Ok(runs.into_iter().filter(|r| r.workflow_id == workflow_id).collect())
    }
}

#[async_trait]
impl Prunable for WorkflowStore {
    fn label(&self) -> &str {
        collections::WORKFLOW_RUNS
    }

    async fn prune_before(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let _guard = self.runs_lock.lock().await;
        let mut runs: Vec<WorkflowRunResult> = store::load(self.store.as_ref(), collections::WORKFLOW_RUNS)?;
        let len = runs.len();
        runs.retain(|r| r.finished_at >= cutoff);
        let removed = len - runs.len();
        if removed > 0 {
            store::save(self.store.as_ref(), collections::WORKFLOW_RUNS, &runs)?;
        }
        Ok(removed)
    }
}
