//! # BizAudit Nurture
//!
//! Lead nurturing state machine.
//!
//! ```text
//! add_lead ──► score + tags ──► evaluate_triggers ──► Outbox (scheduled_emails)
//!                                                        │
//! email-queue job ──► dispatch_due_emails(sender) ◄──────┘
//!                           └──► email_log
//! ```

pub mod lead;
pub mod nurturer;
pub mod outbox;
pub mod scoring;
pub mod sequence;

pub use lead::{CompanySize, Interaction, Lead, LeadStatus, NewLead, NurturingStage};
pub use nurturer::{DispatchReport, LeadNurturer, NurtureStats};
pub use outbox::{EmailLogEntry, EmailStatus, Outbox, ScheduledEmail};
pub use sequence::{NurturingSequence, SequenceEmail, TriggerCondition, default_sequences};
