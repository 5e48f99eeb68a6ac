//! Workflow model: named pipelines of typed steps.
//!
//! ## Shape
//! ```text
//! Workflow { trigger, schedule?, steps[] }
//!   └── WorkflowStep { id, type, config, description }
//!         ├── ai-process      → prompt the completion service
//!         ├── email-send      → render and send an email
//!         ├── data-transform  → reshape the input
//!         ├── webhook-call    → HTTP request
//!         └── condition       → compare a field, success = matched
//! ```
//!
//! Steps are persisted as `{id, type, config, description}` and decoded into
//! a typed [`StepAction`]. Unknown step types still load, and fail in-band
//! when executed.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use bizaudit_core::error::{BizAuditError, Result};

use crate::cron;

/// What starts a workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowTrigger {
    Manual,
    Schedule,
    Webhook,
    Email,
}

impl WorkflowTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Schedule => "schedule",
            Self::Webhook => "webhook",
            Self::Email => "email",
        }
    }
}

fn bool_true() -> bool {
    true
}

/// A persisted workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workflow {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub trigger: WorkflowTrigger,
    /// Cron expression, present iff `trigger = schedule`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule: Option<String>,
    pub steps: Vec<WorkflowStep>,
    #[serde(default = "bool_true")]
    pub is_active: bool,
    #[serde(default)]
    pub created_by: String,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub last_run: Option<DateTime<Utc>>,
    #[serde(default)]
    pub run_count: u64,
}

impl Workflow {
    /// Check the authoring invariants.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(BizAuditError::Validation("Workflow name is required".into()));
        }

        let mut seen = HashSet::new();
        for step in &self.steps {
            if step.id.trim().is_empty() {
                return Err(BizAuditError::Validation(format!(
                    "Workflow '{}' has a step without an id",
                    self.name
                )));
            }
            if !seen.insert(step.id.as_str()) {
                return Err(BizAuditError::Validation(format!(
                    "Duplicate step id '{}' in workflow '{}'",
                    step.id, self.name
                )));
            }
        }

        match (self.trigger, &self.schedule) {
            (WorkflowTrigger::Schedule, Some(expr)) => cron::validate(expr),
            (WorkflowTrigger::Schedule, None) => Err(BizAuditError::Validation(format!(
                "Workflow '{}' has a schedule trigger but no cron expression",
                self.name
            ))),
            (_, Some(_)) => Err(BizAuditError::Validation(format!(
                "Workflow '{}' has a cron expression but trigger '{}'",
                self.name,
                self.trigger.as_str()
            ))),
            (_, None) => Ok(()),
        }
    }

    /// Runs from the scheduler.
    pub fn is_scheduled(&self) -> bool {
        self.is_active && self.trigger == WorkflowTrigger::Schedule && self.schedule.is_some()
    }
}

/// Authoring input for a new workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewWorkflow {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_trigger")]
    pub trigger: WorkflowTrigger,
    #[serde(default)]
    pub schedule: Option<String>,
    #[serde(default)]
    pub steps: Vec<WorkflowStep>,
    #[serde(default)]
    pub created_by: String,
}

fn default_trigger() -> WorkflowTrigger {
    WorkflowTrigger::Manual
}

/// One step of a workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawStep", into = "RawStep")]
pub struct WorkflowStep {
    pub id: String,
    pub description: String,
    pub action: StepAction,
}

impl WorkflowStep {
    pub fn new(id: &str, description: &str, action: StepAction) -> Self {
        Self {
            id: id.to_string(),
            description: description.to_string(),
            action,
        }
    }

    pub fn step_type(&self) -> &str {
        self.action.step_type()
    }
}

/// Typed step payload, keyed by the step's `type`.
#[derive(Debug, Clone, PartialEq)]
pub enum StepAction {
    AiProcess(AiProcessConfig),
    EmailSend(EmailSendConfig),
    DataTransform(DataTransformConfig),
    WebhookCall(WebhookCallConfig),
    Condition(ConditionConfig),
    /// Kept so stored workflows still load.
    Unknown { step_type: String, config: Value },
}

impl StepAction {
    pub fn step_type(&self) -> &str {
        match self {
            Self::AiProcess(_) => "ai-process",
            Self::EmailSend(_) => "email-send",
            Self::DataTransform(_) => "data-transform",
            Self::WebhookCall(_) => "webhook-call",
            Self::Condition(_) => "condition",
            Self::Unknown { step_type, .. } => step_type,
        }
    }

    /// Decode a `{type, config}` pair.
    pub fn from_parts(step_type: &str, config: Value) -> Result<Self> {
        fn typed<T: serde::de::DeserializeOwned>(step_type: &str, config: Value) -> Result<T> {
            serde_json::from_value(config).map_err(|e| {
                BizAuditError::Validation(format!("Invalid config for {step_type} step: {e}"))
            })
        }

        Ok(match step_type {
            "ai-process" => Self::AiProcess(typed(step_type, config)?),
            "email-send" => Self::EmailSend(typed(step_type, config)?),
            "data-transform" => Self::DataTransform(typed(step_type, config)?),
            "webhook-call" => Self::WebhookCall(typed(step_type, config)?),
            "condition" => Self::Condition(typed(step_type, config)?),
            other => Self::Unknown {
                step_type: other.to_string(),
                config,
            },
        })
    }

    /// Config as stored.
    pub fn config(&self) -> Value {
        let value = match self {
            Self::AiProcess(c) => serde_json::to_value(c),
            Self::EmailSend(c) => serde_json::to_value(c),
            Self::DataTransform(c) => serde_json::to_value(c),
            Self::WebhookCall(c) => serde_json::to_value(c),
            Self::Condition(c) => serde_json::to_value(c),
            Self::Unknown { config, .. } => Ok(config.clone()),
        };
        value.unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiProcessConfig {
    /// `{{field}}` placeholders resolve against the step input.
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailSendConfig {
    pub to: String,
    pub subject: String,
    pub template: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataTransformConfig {
    /// Output key → dotted path into the input.
    #[serde(default)]
    pub mappings: BTreeMap<String, String>,
    /// Constant output fields.
    #[serde(default)]
    pub set: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookCallConfig {
    pub url: String,
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Request body; the step input is sent when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

fn default_method() -> String {
    "POST".into()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionConfig {
    /// Dotted path into the input.
    pub field: String,
    pub operator: ConditionOperator,
    #[serde(default)]
    pub value: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOperator {
    Equals,
    NotEquals,
    Contains,
    Exists,
    GreaterThan,
    LessThan,
}

/// Persisted step layout.
#[derive(Serialize, Deserialize)]
struct RawStep {
    id: String,
    #[serde(rename = "type")]
    step_type: String,
    #[serde(default = "empty_object")]
    config: Value,
    #[serde(default)]
    description: String,
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}

impl TryFrom<RawStep> for WorkflowStep {
    type Error = BizAuditError;

    fn try_from(raw: RawStep) -> Result<Self> {
        let config = if raw.config.is_null() { empty_object() } else { raw.config };
        Ok(Self {
            action: StepAction::from_parts(&raw.step_type, config)?,
            id: raw.id,
            description: raw.description,
        })
    }
}

impl From<WorkflowStep> for RawStep {
    fn from(step: WorkflowStep) -> Self {
        Self {
            step_type: step.step_type().to_string(),
            config: step.action.config(),
            id: step.id,
            description: step.description,
        }
    }
}

/// How a run was started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunTrigger {
    Manual,
    Schedule,
}

/// Output of one step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepRunResult {
    pub step_id: String,
    pub result: Value,
}

impl StepRunResult {
    /// A result without a `success` flag counts as successful.
    pub fn succeeded(&self) -> bool {
        self.result
            .get("success")
            .and_then(Value::as_bool)
            .unwrap_or(true)
    }
}

/// One execution of a workflow; also the `workflow_runs` record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowRunResult {
    pub id: String,
    pub workflow_id: String,
    pub success: bool,
    pub results: Vec<StepRunResult>,
    pub trigger: RunTrigger,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn workflow(steps: Value) -> Value {
        json!({
            "id": "wf-1",
            "name": "Follow up",
            "trigger": "manual",
            "steps": steps,
            "isActive": true,
            "createdBy": "owner",
            "createdAt": "2026-03-01T10:00:00Z",
            "lastRun": null,
            "runCount": 0
        })
    }

    #[test]
    fn test_typed_steps_decode() {
        let wf: Workflow = serde_json::from_value(workflow(json!([
            {"id": "s1", "type": "ai-process", "config": {"prompt": "Audit {{business}}", "maxTokens": 200}},
            {"id": "s2", "type": "condition", "config": {"field": "score", "operator": "greater_than", "value": 70}},
            {"id": "s3", "type": "data-transform"}
        ])))
        .unwrap();

        match &wf.steps[0].action {
            StepAction::AiProcess(c) => {
                assert_eq!(c.prompt, "Audit {{business}}");
                assert_eq!(c.max_tokens, Some(200));
            }
            other => panic!("unexpected {other:?}"),
        }
        match &wf.steps[1].action {
            StepAction::Condition(c) => assert_eq!(c.operator, ConditionOperator::GreaterThan),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(wf.steps[2].step_type(), "data-transform");
    }

    #[test]
    fn test_unknown_step_type_loads_and_round_trips() {
        let wf: Workflow = serde_json::from_value(workflow(json!([
            {"id": "s1", "type": "sms-send", "config": {"to": "+1"}, "description": "legacy"}
        ])))
        .unwrap();
        assert_eq!(wf.steps[0].step_type(), "sms-send");

        let back = serde_json::to_value(&wf).unwrap();
        assert_eq!(back["steps"][0]["type"], "sms-send");
        assert_eq!(back["steps"][0]["config"]["to"], "+1");
        assert_eq!(back["isActive"], true);
        assert_eq!(back["runCount"], 0);
    }

    #[test]
    fn test_malformed_known_config_rejected() {
        let result: std::result::Result<Workflow, _> = serde_json::from_value(workflow(json!([
            {"id": "s1", "type": "email-send", "config": {"subject": "hi"}}
        ])));
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_step_ids_and_schedule() {
        let mut wf: Workflow = serde_json::from_value(workflow(json!([
            {"id": "s1", "type": "data-transform"},
            {"id": "s1", "type": "data-transform"}
        ])))
        .unwrap();
        assert!(matches!(wf.validate(), Err(BizAuditError::Validation(_))));

        wf.steps.pop();
        assert!(wf.validate().is_ok());

        wf.trigger = WorkflowTrigger::Schedule;
        assert!(wf.validate().is_err());
        wf.schedule = Some("0 9 * * MON".into());
        assert!(wf.validate().is_ok());
        assert!(wf.is_scheduled());
        wf.schedule = Some("0 25 * * *".into());
        assert!(matches!(wf.validate(), Err(BizAuditError::Scheduling(_))));

        wf.trigger = WorkflowTrigger::Manual;
        wf.schedule = Some("0 9 * * *".into());
        assert!(wf.validate().is_err());
    }

    #[test]
    fn test_step_success_flag() {
        let ok = StepRunResult { step_id: "a".into(), result: json!({"text": "x"}) };
        let failed = StepRunResult { step_id: "b".into(), result: json!({"success": false}) };
        assert!(ok.succeeded());
        assert!(!failed.succeeded());
    }
}
