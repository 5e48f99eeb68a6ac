//! Task definitions: one request/response unit handled by the completion service.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use bizaudit_core::error::{BizAuditError, Result};

/// A persisted task record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Unique task ID (UUID v4).
    pub id: String,
    /// Free text supplied by the user.
    pub query: String,
    /// What kind of processing was requested.
    #[serde(rename = "type")]
    pub task_type: TaskType,
    /// Completion text, or the failure message when `status = error`.
    #[serde(default)]
    pub result: String,
    pub status: TaskStatus,
    /// Creation time, set once.
    pub timestamp: DateTime<Utc>,
}

/// Requested processing kind. Unknown kinds are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TaskType {
    Summarize,
    Rewrite,
    Audit,
    GenerateCopy,
    Insights,
    Other(String),
}

impl TaskType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Summarize => "summarize",
            Self::Rewrite => "rewrite",
            Self::Audit => "audit",
            Self::GenerateCopy => "generate-copy",
            Self::Insights => "insights",
            Self::Other(s) => s,
        }
    }

    /// Whether this is one of the built-in kinds.
    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Other(_))
    }
}

impl From<String> for TaskType {
    fn from(s: String) -> Self {
        match s.as_str() {
            "summarize" => Self::Summarize,
            "rewrite" => Self::Rewrite,
            "audit" => Self::Audit,
            "generate-copy" => Self::GenerateCopy,
            "insights" => Self::Insights,
            _ => Self::Other(s),
        }
    }
}

impl From<&str> for TaskType {
    fn from(s: &str) -> Self {
        Self::from(s.to_string())
    }
}

impl From<TaskType> for String {
    fn from(t: TaskType) -> Self {
        t.as_str().to_string()
    }
}

impl std::fmt::Display for TaskType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Task status. `completed` and `error` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Completed,
    Error,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Error => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = BizAuditError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(Self::Pending),
            "completed" => Ok(Self::Completed),
            "error" => Ok(Self::Error),
            other => Err(BizAuditError::Validation(format!("Unknown task status '{other}'"))),
        }
    }
}

impl Task {
    /// New pending task.
    pub fn new(query: &str, task_type: TaskType, now: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            query: query.to_string(),
            task_type,
            result: String::new(),
            status: TaskStatus::Pending,
            timestamp: now,
        }
    }

    /// pending → completed.
    pub fn complete(&mut self, text: String) -> Result<()> {
        self.transition(TaskStatus::Completed, text)
    }

    /// pending → error; the message becomes the visible result.
    pub fn fail(&mut self, message: String) -> Result<()> {
        self.transition(TaskStatus::Error, message)
    }

    fn transition(&mut self, to: TaskStatus, result: String) -> Result<()> {
        if self.status.is_terminal() {
            return Err(BizAuditError::Validation(format!(
                "Task {} is already {}",
                self.id,
                self.status.as_str()
            )));
        }
        self.status = to;
        self.result = result;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialized_field_names() {
        let task = Task::new("Summarize X", TaskType::Summarize, Utc::now());
        let json = serde_json::to_value(&task).unwrap();
        assert_eq!(json["type"], "summarize");
        assert_eq!(json["status"], "pending");
        assert_eq!(json["result"], "");
        assert!(json.get("task_type").is_none());
    }

    #[test]
    fn test_unknown_type_kept_verbatim() {
        let json = serde_json::json!({
            "id": "t1", "query": "q", "type": "translate", "result": "",
            "status": "pending", "timestamp": "2026-03-01T10:00:00Z"
        });
        let task: Task = serde_json::from_value(json).unwrap();
        assert_eq!(task.task_type, TaskType::Other("translate".into()));
        assert!(!task.task_type.is_known());
        assert_eq!(serde_json::to_value(&task).unwrap()["type"], "translate");
        assert_eq!(TaskType::from("generate-copy"), TaskType::GenerateCopy);
    }

    #[test]
    fn test_terminal_states_are_final() {
        let mut task = Task::new("q", TaskType::Audit, Utc::now());
        task.complete("done".into()).unwrap();
        assert_eq!(task.status, TaskStatus::Completed);
        assert!(task.fail("late".into()).is_err());
        assert_eq!(task.result, "done");
    }
}
