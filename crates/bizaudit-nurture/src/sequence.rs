//! Nurturing sequences: trigger-conditioned series of delayed emails.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use bizaudit_core::error::{BizAuditError, Result};
use bizaudit_core::template::{lookup_path, substitute};

use crate::lead::Lead;
use crate::outbox::{EmailStatus, ScheduledEmail};

/// A `field:value` predicate on the lead's field document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TriggerCondition {
    pub field: String,
    pub value: String,
}

impl TriggerCondition {
    pub fn new(field: &str, value: &str) -> Self {
        Self {
            field: field.to_string(),
            value: value.to_string(),
        }
    }

    /// Strings compare exactly, numbers and booleans by their text, arrays by membership.
    pub fn holds(&self, fields: &Value) -> bool {
        match lookup_path(fields, &self.field) {
            Some(Value::String(s)) => *s == self.value,
            Some(Value::Array(items)) => items.iter().any(|i| i.as_str() == Some(self.value.as_str())),
            Some(v @ (Value::Number(_) | Value::Bool(_))) => v.to_string() == self.value,
            _ => false,
        }
    }
}

impl TryFrom<String> for TriggerCondition {
    type Error = BizAuditError;

    fn try_from(s: String) -> Result<Self> {
        match s.split_once(':') {
            Some((field, value)) if !field.is_empty() => Ok(Self::new(field, value)),
            _ => Err(BizAuditError::Validation(format!(
                "Invalid trigger condition '{s}' (expected field:value)"
            ))),
        }
    }
}

impl From<TriggerCondition> for String {
    fn from(c: TriggerCondition) -> Self {
        format!("{}:{}", c.field, c.value)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SequenceEmail {
    pub template_id: String,
    pub subject: String,
    pub body: String,
    /// Whole hours after the sequence starts.
    pub delay_hours: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NurturingSequence {
    pub id: String,
    pub name: String,
    /// All must hold.
    pub trigger_conditions: Vec<TriggerCondition>,
    pub emails: Vec<SequenceEmail>,
}

impl NurturingSequence {
    pub fn matches(&self, lead_fields: &Value) -> bool {
        self.trigger_conditions.iter().all(|c| c.holds(lead_fields))
    }

    /// Personalised outbox entries, one per email, in authored order.
    pub fn schedule_for(&self, lead: &Lead, started_at: DateTime<Utc>) -> Vec<ScheduledEmail> {
        let fields = lead.fields();
        self.emails
            .iter()
            .map(|email| ScheduledEmail {
                id: uuid::Uuid::new_v4().to_string(),
                lead_id: lead.id.clone(),
                sequence_id: self.id.clone(),
                template_id: email.template_id.clone(),
                to: lead.email.clone(),
                subject: substitute(&email.subject, &fields),
                body: substitute(&email.body, &fields),
                send_at: started_at + Duration::hours(email.delay_hours),
                status: EmailStatus::Pending,
                sent_at: None,
                error: None,
            })
            .collect()
    }
}

fn email(template_id: &str, delay_hours: i64, subject: &str, body: &str) -> SequenceEmail {
    SequenceEmail {
        template_id: template_id.to_string(),
        subject: subject.to_string(),
        body: body.to_string(),
        delay_hours,
    }
}

/// Built-in sequences.
pub fn default_sequences() -> Vec<NurturingSequence> {
    vec![
        NurturingSequence {
            id: "audit_welcome".into(),
            name: "Free audit welcome".into(),
            trigger_conditions: vec![TriggerCondition::new("source", "free_audit")],
            emails: vec![
                email(
                    "audit_welcome_1",
                    0,
                    "Your free audit for {{businessName}} is on its way",
                    "Hi {{contactName}},\n\nThanks for requesting a free audit for {{businessName}}. \
                     We are reviewing your answers and will send the full report shortly.",
                ),
                email(
                    "audit_quick_wins",
                    48,
                    "3 quick wins for {{businessName}}",
                    "Hi {{contactName}},\n\nWhile you read your audit, here are three changes most \
                     businesses like yours can make this week.",
                ),
                email(
                    "audit_check_in",
                    168,
                    "How is it going, {{contactName}}?",
                    "Hi {{contactName}},\n\nIt has been a week since your audit. Reply to this email \
                     if you would like to walk through the results together.",
                ),
            ],
        },
        NurturingSequence {
            id: "enterprise_nurture".into(),
            name: "Enterprise nurture".into(),
            trigger_conditions: vec![TriggerCondition::new("companySize", "large")],
            emails: vec![
                email(
                    "enterprise_intro",
                    0,
                    "Audits for larger teams",
                    "Hi {{contactName}},\n\nTeams the size of {{businessName}} usually need a \
                     multi-department audit. Here is how we run them.",
                ),
                email(
                    "enterprise_case_study",
                    72,
                    "How a company like {{businessName}} cut costs",
                    "Hi {{contactName}},\n\nA short case study from a company of similar size.",
                ),
            ],
        },
        NurturingSequence {
            id: "startup_onboarding".into(),
            name: "Startup onboarding".into(),
            trigger_conditions: vec![TriggerCondition::new("companySize", "startup")],
            emails: vec![
                email(
                    "startup_welcome",
                    0,
                    "Building {{businessName}} the right way",
                    "Hi {{contactName}},\n\nEarly-stage businesses get the most from a lean audit. \
                     Here is where to start.",
                ),
                email(
                    "startup_checklist",
                    96,
                    "Your launch checklist",
                    "Hi {{contactName}},\n\nA checklist of the basics we see startups miss most often.",
                ),
            ],
        },
        NurturingSequence {
            id: "demo_follow_up".into(),
            name: "Demo follow-up".into(),
            trigger_conditions: vec![TriggerCondition::new("source", "demo_request")],
            emails: vec![email(
                "demo_confirm",
                1,
                "Your BizAudit demo",
                "Hi {{contactName}},\n\nThanks for booking a demo. Pick a time that suits {{businessName}} \
                 and we will tailor the walkthrough to your challenges.",
            )],
        },
    ]
}
