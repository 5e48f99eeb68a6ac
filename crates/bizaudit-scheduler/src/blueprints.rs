//! Built-in workflow templates.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::json;

use bizaudit_core::error::{BizAuditError, Result};

use crate::workflow::{
    AiProcessConfig, ConditionConfig, ConditionOperator, DataTransformConfig, EmailSendConfig,
    NewWorkflow, StepAction, WorkflowStep, WorkflowTrigger,
};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Blueprint {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub trigger: WorkflowTrigger,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schedule: Option<&'static str>,
    pub steps: Vec<WorkflowStep>,
}

impl Blueprint {
    /// Authoring input for a workflow built from this blueprint.
    pub fn instantiate(&self, created_by: &str) -> NewWorkflow {
        NewWorkflow {
            name: self.name.to_string(),
            description: self.description.to_string(),
            trigger: self.trigger,
            schedule: self.schedule.map(String::from),
            steps: self.steps.clone(),
            created_by: created_by.to_string(),
        }
    }
}

fn ai(id: &str, description: &str, prompt: &str, max_tokens: u32) -> WorkflowStep {
    WorkflowStep::new(
        id,
        description,
        StepAction::AiProcess(AiProcessConfig {
            prompt: prompt.to_string(),
            system_prompt: None,
            max_tokens: Some(max_tokens),
            temperature: None,
        }),
    )
}

fn email(id: &str, description: &str, to: &str, subject: &str, template: &str) -> WorkflowStep {
    WorkflowStep::new(
        id,
        description,
        StepAction::EmailSend(EmailSendConfig {
            to: to.to_string(),
            subject: subject.to_string(),
            template: template.to_string(),
        }),
    )
}

/// Every built-in blueprint.
pub fn catalogue() -> Vec<Blueprint> {
    vec![
        Blueprint {
            id: "audit-follow-up",
            name: "Audit follow-up",
            description: "Draft and send a personalised follow-up after a free audit.",
            trigger: WorkflowTrigger::Manual,
            schedule: None,
            steps: vec![
                ai(
                    "draft",
                    "Draft the follow-up email",
                    "Write a short, friendly follow-up email for {{contactName}} at {{businessName}} \
                     about their recent business audit. Mention one quick win.",
                    400,
                ),
                email(
                    "send",
                    "Send the draft",
                    "{{email}}",
                    "Your audit results, {{contactName}}",
                    "{{previousResult.text}}",
                ),
            ],
        },
        Blueprint {
            id: "weekly-insights-report",
            name: "Weekly insights report",
            description: "Every Monday morning, summarise the week's metrics for the owner.",
            trigger: WorkflowTrigger::Schedule,
            schedule: Some("0 9 * * MON"),
            steps: vec![
                ai(
                    "insights",
                    "Generate insights",
                    "Analyze this week's business metrics and list three actionable insights: {{metrics}}",
                    800,
                ),
                email(
                    "report",
                    "Email the report",
                    "{{ownerEmail}}",
                    "Your weekly insights",
                    "{{previousResult.text}}",
                ),
            ],
        },
        Blueprint {
            id: "lead-qualification",
            name: "Lead qualification",
            description: "Score-gate a lead and prepare a proposal brief for hot leads.",
            trigger: WorkflowTrigger::Webhook,
            schedule: None,
            steps: vec![
                WorkflowStep::new(
                    "extract",
                    "Pick the fields used below",
                    StepAction::DataTransform(DataTransformConfig {
                        mappings: BTreeMap::from([
                            ("score".to_string(), "lead.score".to_string()),
                            ("businessName".to_string(), "lead.businessName".to_string()),
                        ]),
                        set: json!({"stage": "qualification"})
                            .as_object()
                            .cloned()
                            .unwrap_or_default(),
                    }),
                ),
                WorkflowStep::new(
                    "gate",
                    "Only hot leads continue",
                    StepAction::Condition(ConditionConfig {
                        field: "previousResult.score".into(),
                        operator: ConditionOperator::GreaterThan,
                        value: json!(70),
                    }),
                ),
                ai(
                    "brief",
                    "Prepare a proposal brief",
                    "Prepare a one-paragraph proposal brief for {{lead.businessName}} \
                     ({{lead.companySize}}), whose challenges are: {{lead.challenges}}",
                    500,
                ),
            ],
        },
    ]
}

pub fn find(id: &str) -> Result<Blueprint> {
    catalogue()
        .into_iter()
        .find(|b| b.id == id)
        .ok_or_else(|| BizAuditError::NotFound(format!("blueprint '{id}'")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::Workflow;
    use chrono::Utc;

    #[test]
    fn test_every_blueprint_is_valid() {
        for blueprint in catalogue() {
            let new = blueprint.instantiate("system");
            let workflow = Workflow {
                id: "check".into(),
                name: new.name,
                description: new.description,
                trigger: new.trigger,
                schedule: new.schedule,
                steps: new.steps,
                is_active: true,
                created_by: new.created_by,
                created_at: Utc::now(),
                last_run: None,
                run_count: 0,
            };
            workflow.validate().unwrap();
        }
    }

    #[test]
    fn test_find() {
        assert_eq!(find("weekly-insights-report").unwrap().schedule, Some("0 9 * * MON"));
        assert!(matches!(find("nope"), Err(BizAuditError::NotFound(_))));
    }
}
