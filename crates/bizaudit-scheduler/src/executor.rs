//! Workflow engine: best-effort execution of a workflow's steps.
//!
//! ```text
//! execute(id, input?)
//!   → for each step, in order:
//!       input_i = initial input + previousResult (output of step i-1)
//!       result_i = handler(step); errors and panics become {success:false, error}
//!   → success = every result's `success` flag (missing = true)
//!   → runCount += 1, lastRun = now, append run record
//! ```
//! No step failure stops the pipeline; only store failures abort `execute`.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use serde_json::{Map, Value, json};

use bizaudit_core::error::{BizAuditError, Result};
use bizaudit_core::traits::Clock;

use crate::steps::StepRunner;
use crate::workflow::{RunTrigger, StepRunResult, Workflow, WorkflowRunResult};
use crate::workflow_store::WorkflowStore;

/// Key under which a step receives the previous step's output.
pub const PREVIOUS_RESULT: &str = "previousResult";

pub struct WorkflowEngine {
    workflows: Arc<WorkflowStore>,
    runner: StepRunner,
    clock: Arc<dyn Clock>,
}

impl WorkflowEngine {
    pub fn new(workflows: Arc<WorkflowStore>, runner: StepRunner, clock: Arc<dyn Clock>) -> Self {
        Self {
            workflows,
            runner,
            clock,
        }
    }

    pub fn workflows(&self) -> &Arc<WorkflowStore> {
        &self.workflows
    }

    /// Run a workflow manually.
    pub async fn execute(&self, workflow_id: &str, input: Option<Value>) -> Result<WorkflowRunResult> {
        self.execute_with_trigger(workflow_id, input, RunTrigger::Manual)
            .await
    }

    pub async fn execute_with_trigger(
        &self,
        workflow_id: &str,
        input: Option<Value>,
        trigger: RunTrigger,
    ) -> Result<WorkflowRunResult> {
        let workflow = self
            .workflows
            .get(workflow_id)
            .await?
            .ok_or_else(|| BizAuditError::NotFound(format!("workflow '{workflow_id}'")))?;

        let started_at = self.clock.now();
        tracing::info!(
            "▶️ Running workflow '{}' ({} steps, {:?})",
            workflow.name,
            workflow.steps.len(),
            trigger
        );

        let results = self.run_steps(&workflow, input).await;
        let success = results.iter().all(StepRunResult::succeeded);
        let finished_at = self.clock.now();

        self.workflows.record_run(&workflow.id, finished_at).await?;

        let run = WorkflowRunResult {
            id: uuid::Uuid::new_v4().to_string(),
            workflow_id: workflow.id.clone(),
            success,
            results,
            trigger,
            started_at,
            finished_at,
        };
        self.workflows.append_run(&run).await?;

        if success {
            tracing::info!("✅ Workflow '{}' succeeded", workflow.name);
        } else {
            let failed = run.results.iter().filter(|r| !r.succeeded()).count();
            tracing::warn!("⚠️ Workflow '{}' finished with {failed} failed step(s)", workflow.name);
        }
        Ok(run)
    }

    /// Execute every step and collect one result per step, in order.
    pub async fn run_steps(&self, workflow: &Workflow, input: Option<Value>) -> Vec<StepRunResult> {
        let base = initial_input(input);
        let caller_previous = base.contains_key(PREVIOUS_RESULT);
        let mut results: Vec<StepRunResult> = Vec::with_capacity(workflow.steps.len());

        for step in &workflow.steps {
            let mut fields = base.clone();
            if let Some(prev) = results.last().filter(|_| !caller_previous) {
                fields.insert(PREVIOUS_RESULT.to_string(), prev.result.clone());
            }
            let step_input = Value::Object(fields);

            let outcome = AssertUnwindSafe(self.runner.run(&step.action, &step_input))
                .catch_unwind()
                .await;
            let result = match outcome {
                Ok(Ok(value)) => value,
                Ok(Err(e)) => {
                    tracing::warn!("⚠️ Step '{}' ({}) failed: {e}", step.id, step.step_type());
                    json!({"success": false, "error": e.to_string()})
                }
                Err(panic) => {
                    let message = panic_message(panic.as_ref());
                    tracing::error!("💥 Step '{}' panicked: {message}", step.id);
                    json!({"success": false, "error": format!("Step panicked: {message}")})
                }
            };

            results.push(StepRunResult {
                step_id: step.id.clone(),
                result,
            });
        }
        results
    }
}

/// Objects are used as-is, anything else is wrapped as `{"input": value}`.
fn initial_input(input: Option<Value>) -> Map<String, Value> {
    match input {
        None | Some(Value::Null) => Map::new(),
        Some(Value::Object(map)) => map,
        Some(other) => {
            let mut map = Map::new();
            map.insert("input".to_string(), other);
            map
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
