//! Task processor: turns a `(query, type)` request into a completion and
//! persists every state the task passes through (pending, then terminal).
//!
//! Completion failures never escape as `Err`: they are recorded on the task
//! and reported back in-band through [`TaskResult`].

use std::sync::Arc;

use chrono::Duration;
use serde::Serialize;

use bizaudit_core::error::{BizAuditError, Result};
use bizaudit_core::traits::{Clock, CompletionProvider, GenerateParams};

use crate::store::TaskStore;
use crate::tasks::{Task, TaskStatus, TaskType};

/// System prompt shared by every task kind.
pub const SYSTEM_PROMPT: &str = "You are a business analyst assistant for small businesses. \
Give concrete, actionable answers in plain language. Keep the tone professional and concise.";

/// Outcome reported to the caller.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskResult {
    pub task_id: String,
    pub status: TaskStatus,
    pub result: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub struct TaskProcessor {
    store: Arc<TaskStore>,
    provider: Arc<dyn CompletionProvider>,
    clock: Arc<dyn Clock>,
    params: GenerateParams,
}

impl TaskProcessor {
    pub fn new(
        store: Arc<TaskStore>,
        provider: Arc<dyn CompletionProvider>,
        clock: Arc<dyn Clock>,
        params: GenerateParams,
    ) -> Self {
        Self {
            store,
            provider,
            clock,
            params,
        }
    }

    pub fn store(&self) -> &Arc<TaskStore> {
        &self.store
    }

    /// Process one request end to end.
    pub async fn process(&self, query: &str, task_type: &str) -> Result<TaskResult> {
        let query = query.trim();
        let task_type = task_type.trim();
        if query.is_empty() {
            return Err(BizAuditError::Validation("Task query is required".into()));
        }
        if task_type.is_empty() {
            return Err(BizAuditError::Validation("Task type is required".into()));
        }

        let task = Task::new(query, TaskType::from(task_type), self.clock.now());
        if !task.task_type.is_known() {
            tracing::debug!("Task type '{task_type}' is not built in, using generic template");
        }
        self.store.put(&task).await?;
        tracing::info!("📝 Task created: {} ({})", task.id, task.task_type);

        self.run(task).await
    }

    /// Call the completion service for a pending task and persist the outcome.
    async fn run(&self, mut task: Task) -> Result<TaskResult> {
        let instruction = build_instruction(&task.task_type, &task.query);
        let outcome = self
            .provider
            .complete(SYSTEM_PROMPT, &instruction, &self.params)
            .await;

        let error = match outcome {
            Ok(text) => {
                task.complete(text)?;
                tracing::info!("✅ Task completed: {}", task.id);
                None
            }
            Err(e) => {
                let message = e.to_string();
                task.fail(message.clone())?;
                tracing::warn!("⚠️ Task {} failed via {}: {message}", task.id, self.provider.name());
                Some(message)
            }
        };
        self.store.put(&task).await?;

        Ok(TaskResult {
            task_id: task.id,
            status: task.status,
            result: task.result,
            error,
        })
    }

    /// Re-run tasks still pending after `older_than` (e.g. left over after a crash).
    pub async fn resume_pending(&self, older_than: Duration) -> Result<Vec<TaskResult>> {
        let cutoff = self.clock.now() - older_than;
        let stale: Vec<Task> = self
            .store
            .list(Some(TaskStatus::Pending))
            .await?
            .into_iter()
            .filter(|t| t.timestamp <= cutoff)
            .collect();

        if !stale.is_empty() {
            tracing::info!("🔁 Resuming {} stale pending task(s)", stale.len());
        }

        let mut results = Vec::with_capacity(stale.len());
        for task in stale {
            results.push(self.run(task).await?);
        }
        Ok(results)
    }
}

/// Natural-language instruction for a task kind.
pub fn build_instruction(task_type: &TaskType, query: &str) -> String {
    match task_type {
        TaskType::Summarize => format!(
            "Summarize the following content in a few short bullet points, \
             keeping the key facts and figures:\n\n{query}"
        ),
        TaskType::Rewrite => format!(
            "Rewrite the following text so it is clearer and more professional, \
             keeping its meaning:\n\n{query}"
        ),
        TaskType::Audit => format!(
            "Audit the following business information. List strengths, weaknesses \
             and the three most important improvements:\n\n{query}"
        ),
        TaskType::GenerateCopy => format!(
            "Write persuasive marketing copy for a small business based on this brief. \
             Include a headline and a call to action:\n\n{query}"
        ),
        TaskType::Insights => format!(
            "Analyze the following data and give actionable business insights \
             with a short rationale for each:\n\n{query}"
        ),
        TaskType::Other(_) => format!("Complete the following request:\n\n{query}"),
    }
}
