//! Lead model.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use bizaudit_core::error::{BizAuditError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompanySize {
    Startup,
    Small,
    Medium,
    Large,
}

impl CompanySize {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Startup => "startup",
            Self::Small => "small",
            Self::Medium => "medium",
            Self::Large => "large",
        }
    }
}

impl std::str::FromStr for CompanySize {
    type Err = BizAuditError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "startup" => Ok(Self::Startup),
            "small" => Ok(Self::Small),
            "medium" => Ok(Self::Medium),
            "large" => Ok(Self::Large),
            other => Err(BizAuditError::Validation(format!("Unknown company size '{other}'"))),
        }
    }
}

/// Business state of a lead. Moves forward by convention; skipping is allowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadStatus {
    New,
    Contacted,
    Qualified,
    ProposalSent,
    ClosedWon,
    ClosedLost,
}

impl LeadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Contacted => "contacted",
            Self::Qualified => "qualified",
            Self::ProposalSent => "proposal_sent",
            Self::ClosedWon => "closed_won",
            Self::ClosedLost => "closed_lost",
        }
    }

    /// No further automatic nurturing.
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::ClosedWon | Self::ClosedLost)
    }

    /// Stage a lead moves to when entering this status.
    pub fn stage(&self) -> Option<NurturingStage> {
        match self {
            Self::Contacted => Some(NurturingStage::Consideration),
            Self::Qualified | Self::ProposalSent => Some(NurturingStage::Decision),
            Self::ClosedWon => Some(NurturingStage::Retention),
            Self::New | Self::ClosedLost => None,
        }
    }
}

impl std::str::FromStr for LeadStatus {
    type Err = BizAuditError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "new" => Ok(Self::New),
            "contacted" => Ok(Self::Contacted),
            "qualified" => Ok(Self::Qualified),
            "proposal_sent" => Ok(Self::ProposalSent),
            "closed_won" => Ok(Self::ClosedWon),
            "closed_lost" => Ok(Self::ClosedLost),
            other => Err(BizAuditError::Validation(format!("Unknown lead status '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NurturingStage {
    Awareness,
    Consideration,
    Decision,
    Retention,
}

impl NurturingStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Awareness => "awareness",
            Self::Consideration => "consideration",
            Self::Decision => "decision",
            Self::Retention => "retention",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interaction {
    #[serde(rename = "type")]
    pub kind: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub metadata: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lead {
    pub id: String,
    pub email: String,
    pub business_name: String,
    #[serde(default)]
    pub contact_name: String,
    pub company_size: CompanySize,
    pub source: String,
    /// Free-text challenge description from the capture form.
    #[serde(default)]
    pub challenges: String,
    pub status: LeadStatus,
    pub score: u32,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    /// Append-only.
    #[serde(default)]
    pub interactions: Vec<Interaction>,
    pub nurturing_stage: NurturingStage,
    /// Sequence ids already started for this lead.
    #[serde(default)]
    pub automation_triggers: BTreeSet<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Lead {
    /// Field document used for trigger matching and email personalisation.
    pub fn fields(&self) -> Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

/// Lead capture input.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewLead {
    pub email: String,
    pub business_name: String,
    #[serde(default)]
    pub contact_name: String,
    pub company_size: CompanySize,
    pub source: String,
    #[serde(default)]
    pub challenges: String,
}

impl NewLead {
    pub fn validate(&self) -> Result<()> {
        let email = self.email.trim();
        if email.is_empty() || !email.contains('@') {
            return Err(BizAuditError::Validation(format!(
                "Invalid lead email '{}'",
                self.email
            )));
        }
        if self.business_name.trim().is_empty() {
            return Err(BizAuditError::Validation("Business name is required".into()));
        }
        if self.source.trim().is_empty() {
            return Err(BizAuditError::Validation("Lead source is required".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_stage_mapping() {
        assert_eq!(LeadStatus::Contacted.stage(), Some(NurturingStage::Consideration));
        assert_eq!(LeadStatus::Qualified.stage(), Some(NurturingStage::Decision));
        assert_eq!(LeadStatus::ProposalSent.stage(), Some(NurturingStage::Decision));
        assert_eq!(LeadStatus::ClosedWon.stage(), Some(NurturingStage::Retention));
        assert_eq!(LeadStatus::ClosedLost.stage(), None);
        assert!(LeadStatus::ClosedLost.is_closed());
        assert_eq!("proposal_sent".parse::<LeadStatus>().unwrap(), LeadStatus::ProposalSent);
    }

    #[test]
    fn test_new_lead_validation() {
        let lead = NewLead {
            email: "owner@cafe.test".into(),
            business_name: "Cafe Luna".into(),
            contact_name: "Ana".into(),
            company_size: CompanySize::Small,
            source: "free_audit".into(),
            challenges: String::new(),
        };
        assert!(lead.validate().is_ok());

        let bad = NewLead {
            email: "nope".into(),
            ..lead
        };
        assert!(matches!(bad.validate(), Err(BizAuditError::Validation(_))));
    }

    #[test]
    fn test_new_lead_from_json() {
        let lead: NewLead = serde_json::from_value(serde_json::json!({
            "email": "a@b.test",
            "businessName": "B",
            "companySize": "medium",
            "source": "referral"
        }))
        .unwrap();
        assert_eq!(lead.company_size, CompanySize::Medium);
        assert!(lead.challenges.is_empty());
    }
}
