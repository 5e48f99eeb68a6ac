//! # BizAudit Scheduler
//!
//! Task processing, workflow execution and cron-driven automation.
//!
//! ## Architecture
//! ```text
//! TaskProcessor.process(query, type)
//!   ├── TaskStore.put(pending)
//!   ├── CompletionProvider.complete(system, instruction)
//!   └── TaskStore.put(completed | error)
//!
//! WorkflowEngine.execute(id, input?)
//!   ├── StepRunner: ai-process, email-send, data-transform, webhook-call, condition
//!   └── WorkflowStore.record_run + append_run
//!
//! Scheduler (tokio interval)
//!   ├── pending-task-sweep  "*/5 * * * *"  → resume stale pending tasks
//!   ├── daily-summary       "0 18 * * *"   → summarise today's tasks
//!   ├── weekly-log-cleanup  "0 0 * * 0"    → prune run/email/summary logs
//!   └── workflow:<id>       per scheduled workflow
//! ```

pub mod blueprints;
pub mod cron;
pub mod dispatch;
pub mod engine;
pub mod executor;
pub mod jobs;
pub mod processor;
pub mod steps;
pub mod store;
pub mod tasks;
pub mod workflow;
pub mod workflow_store;

pub use dispatch::{LogSender, SmtpSender, email_sender_from_config};
pub use engine::{FiredJob, JobInfo, Scheduler};
pub use executor::WorkflowEngine;
pub use jobs::{DailySummary, JobContext, SummaryLog};
pub use processor::{TaskProcessor, TaskResult};
pub use steps::StepRunner;
pub use store::TaskStore;
pub use tasks::{Task, TaskStatus, TaskType};
pub use workflow::{NewWorkflow, StepAction, Workflow, WorkflowRunResult, WorkflowStep, WorkflowTrigger};
pub use workflow_store::WorkflowStore;
