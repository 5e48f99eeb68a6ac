//! Shared value types.

use serde::{Deserialize, Serialize};

/// A rendered email ready for the transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Logical collection names shared by the engines.
pub mod collections {
    pub const TASKS: &str = "tasks";
    pub const WORKFLOWS: &str = "workflows";
    pub const WORKFLOW_RUNS: &str = "workflow_runs";
    pub const LEADS: &str = "leads";
    pub const SCHEDULED_EMAILS: &str = "scheduled_emails";
    pub const EMAIL_LOG: &str = "email_log";
    pub const DAILY_SUMMARIES: &str = "daily_summaries";
}
