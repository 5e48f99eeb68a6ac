//! Default jobs the application registers on the scheduler, plus the binding
//! of scheduled workflows to `workflow:<id>` jobs.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use bizaudit_core::config::SchedulerConfig;
use bizaudit_core::error::{BizAuditError, Result};
use bizaudit_core::traits::store::{self, CollectionStore, Prunable};
use bizaudit_core::traits::Clock;
use bizaudit_core::types::collections;

use crate::engine::Scheduler;
use crate::executor::WorkflowEngine;
use crate::processor::TaskProcessor;
use crate::tasks::{Task, TaskStatus};
use crate::workflow::RunTrigger;

pub const PENDING_TASK_SWEEP: &str = "pending-task-sweep";
pub const DAILY_SUMMARY: &str = "daily-summary";
pub const WEEKLY_LOG_CLEANUP: &str = "weekly-log-cleanup";
pub const EMAIL_QUEUE: &str = "email-queue";
pub const WORKFLOW_SYNC: &str = "workflow-sync";
const WORKFLOW_JOB_PREFIX: &str = "workflow:";

/// Job name of a scheduled workflow.
pub fn workflow_job_name(workflow_id: &str) -> String {
    format!("{WORKFLOW_JOB_PREFIX}{workflow_id}")
}

/// Task counts for one UTC day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailySummary {
    pub date: NaiveDate,
    pub total: usize,
    pub completed: usize,
    pub errored: usize,
    pub pending: usize,
    pub by_type: BTreeMap<String, usize>,
}

impl DailySummary {
    pub fn from_tasks(date: NaiveDate, tasks: &[Task]) -> Self {
        let mut summary = Self {
            date,
            total: tasks.len(),
            completed: 0,
            errored: 0,
            pending: 0,
            by_type: BTreeMap::new(),
        };
        for task in tasks {
            match task.status {
                TaskStatus::Completed => summary.completed += 1,
                TaskStatus::Error => summary.errored += 1,
                TaskStatus::Pending => summary.pending += 1,
            }
            *summary
                .by_type
                .entry(task.task_type.as_str().to_string())
                .or_default() += 1;
        }
        summary
    }
}

/// The `daily_summaries` collection. One record per date.
pub struct SummaryLog {
    store: Arc<dyn CollectionStore>,
    lock: Mutex<()>,
}

impl SummaryLog {
    pub fn new(store: Arc<dyn CollectionStore>) -> Self {
        Self {
            store,
            lock: Mutex::new(()),
        }
    }

    /// Insert, or replace the summary of the same date.
    pub async fn record(&self, summary: &DailySummary) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut all = self.list_unlocked()?;
        match all.iter_mut().find(|s| s.date == summary.date) {
            Some(existing) => *existing = summary.clone(),
            None => all.push(summary.clone()),
        }
        store::save(self.store.as_ref(), collections::DAILY_SUMMARIES, &all)
    }

    pub async fn list(&self) -> Result<Vec<DailySummary>> {
        self.list_unlocked()
    }

    fn list_unlocked(&self) -> Result<Vec<DailySummary>> {
        store::load(self.store.as_ref(), collections::DAILY_SUMMARIES)
    }
}

#[async_trait]
impl Prunable for SummaryLog {
    fn label(&self) -> &str {
        collections::DAILY_SUMMARIES
    }

    async fn prune_before(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let _guard = self.lock.lock().await;
        let mut all = self.list_unlocked()?;
        let len = all.len();
        let cutoff_date = cutoff.date_naive();
        all.retain(|s| s.date >= cutoff_date);
        let removed = len - all.len();
        if removed > 0 {
            store::save(self.store.as_ref(), collections::DAILY_SUMMARIES, &all)?;
        }
        Ok(removed)
    }
}

/// Summarise the tasks created on the clock's current UTC day and persist it.
pub async fn run_daily_summary(
    processor: &TaskProcessor,
    summaries: &SummaryLog,
    clock: &dyn Clock,
) -> Result<DailySummary> {
    let today = clock.now().date_naive();
    let start = today
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| BizAuditError::Validation(format!("Invalid date {today}")))?
        .and_utc();
    let tasks = processor
        .store()
        .list_between(start, start + Duration::days(1))
        .await?;

    let summary = DailySummary::from_tasks(today, &tasks);
    summaries.record(&summary).await?;
    tracing::info!(
        "📊 Daily summary {}: {} tasks ({} completed, {} errors, {} pending)",
        summary.date,
        summary.total,
        summary.completed,
        summary.errored,
        summary.pending
    );
    Ok(summary)
}

/// Prune every log collection older than the retention window. Tasks are never pruned.
pub async fn run_log_cleanup(
    prunables: &[Arc<dyn Prunable>],
    clock: &dyn Clock,
    retention_days: i64,
) -> Result<usize> {
    let cutoff = clock.now() - Duration::days(retention_days);
    let mut total = 0;
    let mut failures = Vec::new();
    for log in prunables {
        match log.prune_before(cutoff).await {
            Ok(removed) => {
                tracing::info!("🧹 Pruned {removed} record(s) from {}", log.label());
                total += removed;
            }
            Err(e) => {
                tracing::warn!("⚠️ Cleanup of {} failed: {e}", log.label());
                failures.push(format!("{}: {e}", log.label()));
            }
        }
    }
    if failures.is_empty() {
        Ok(total)
    } else {
        Err(BizAuditError::Storage(failures.join("; ")))
    }
}

/// Everything the default jobs touch.
#[derive(Clone)]
pub struct JobContext {
    pub processor: Arc<TaskProcessor>,
    pub summaries: Arc<SummaryLog>,
    pub clock: Arc<dyn Clock>,
    /// Collections pruned by the weekly cleanup.
    pub prunables: Vec<Arc<dyn Prunable>>,
}

/// Register the pending-task sweep, daily summary and weekly cleanup jobs.
pub fn register_default_jobs(
    scheduler: &Scheduler,
    ctx: JobContext,
    config: &SchedulerConfig,
) -> Result<()> {
    let stale_after = Duration::minutes(config.stale_after_mins);
    let processor = ctx.processor.clone();
    scheduler.schedule(PENDING_TASK_SWEEP, &config.pending_sweep_cron, move || {
        let processor = processor.clone();
        async move {
            processor.resume_pending(stale_after).await?;
            Ok(())
        }
    })?;

    let summary_ctx = ctx.clone();
    scheduler.schedule(DAILY_SUMMARY, &config.daily_summary_cron, move || {
        let ctx = summary_ctx.clone();
        async move {
            run_daily_summary(&ctx.processor, &ctx.summaries, ctx.clock.as_ref()).await?;
            Ok(())
        }
    })?;

    let retention_days = config.log_retention_days;
    scheduler.schedule(WEEKLY_LOG_CLEANUP, &config.log_cleanup_cron, move || {
        let ctx = ctx.clone();
        async move {
            run_log_cleanup(&ctx.prunables, ctx.clock.as_ref(), retention_days).await?;
            Ok(())
        }
    })?;

    Ok(())
}

/// Bind every active scheduled workflow to a `workflow:<id>` job and drop
/// bindings whose workflow is gone, paused or no longer scheduled.
pub async fn bind_scheduled_workflows(scheduler: &Scheduler, engine: Arc<WorkflowEngine>) -> Result<usize> {
    let workflows = engine.workflows().list().await?;
    let mut bound = HashSet::new();
    // Unchanged bindings keep their next run and running guard.
    let current: HashMap<String, String> = scheduler
        .jobs()
        .into_iter()
        .map(|j| (j.name, j.cron_expression))
        .collect();

    for workflow in workflows.iter().filter(|w| w.is_scheduled()) {
        let Some(expression) = workflow.schedule.as_deref() else {
            continue;
        };
        let name = workflow_job_name(&workflow.id);
        let normalised = expression.split_whitespace().collect::<Vec<_>>().join(" ");
        if current.get(&name) == Some(&normalised) {
            bound.insert(name);
            continue;
        }
        let id = workflow.id.clone();
        let engine = engine.clone();
        let result = scheduler.schedule(&name, expression, move || {
            let engine = engine.clone();
            let id = id.clone();
            async move {
                match engine.workflows().get(&id).await? {
                    Some(w) if w.is_active => {
                        engine
                            .execute_with_trigger(&id, None, RunTrigger::Schedule)
                            .await?;
                    }
                    _ => tracing::debug!("Workflow {id} paused or removed, skipping"),
                }
                Ok(())
            }
        });
        match result {
            Ok(()) => {
                bound.insert(name);
            }
            Err(e) => tracing::warn!("⚠️ Workflow '{}' not scheduled: {e}", workflow.name),
        }
    }

    for name in scheduler.list_active() {
        if name.starts_with(WORKFLOW_JOB_PREFIX) && !bound.contains(&name) {
            scheduler.unschedule(&name);
        }
    }
    Ok(bound.len())
}

/// Keep workflow bindings current while serving: every fire of the
/// `workflow-sync` job re-runs [`bind_scheduled_workflows`].
pub async fn register_workflow_sync(
    scheduler: &Arc<Scheduler>,
    engine: Arc<WorkflowEngine>,
    expression: &str,
) -> Result<usize> {
    let bound = bind_scheduled_workflows(scheduler, engine.clone()).await?;
    let weak: Weak<Scheduler> = Arc::downgrade(scheduler);
    scheduler.schedule(WORKFLOW_SYNC, expression, move || {
        let weak = weak.clone();
        let engine = engine.clone();
        async move {
            let Some(scheduler) = weak.upgrade() else {
                return Ok(());
            };
            let bound = bind_scheduled_workflows(&scheduler, engine).await?;
            tracing::debug!("🔁 Workflow sync: {bound} scheduled workflow(s) bound");
            Ok(())
        }
    })?;
    Ok(bound)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::LogSender;
    use crate::steps::StepRunner;
    use crate::store::TaskStore;
    use crate::tasks::TaskType;
    use crate::workflow::{NewWorkflow, StepAction, WorkflowStep, WorkflowTrigger};
    use crate::workflow_store::WorkflowStore;
    use bizaudit_core::traits::{CompletionProvider, GenerateParams, ManualClock};
    use bizaudit_db::MemoryStore;
    use chrono::TimeZone;

    struct Canned;

    #[async_trait]
    impl CompletionProvider for Canned {
        fn name(&self) -> &str {
            "canned"
        }

        async fn complete(&self, _s: &str, _u: &str, _p: &GenerateParams) -> Result<String> {
            Ok("ok".into())
        }
    }

    struct Fixture {
        clock: Arc<ManualClock>,
        backing: Arc<MemoryStore>,
        processor: Arc<TaskProcessor>,
        summaries: Arc<SummaryLog>,
        workflows: Arc<WorkflowStore>,
        engine: Arc<WorkflowEngine>,
    }

    fn fixture(h: u32, m: u32) -> Fixture {
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2026, 3, 2, h, m, 0).unwrap()));
        let backing = Arc::new(MemoryStore::new());
        let tasks = Arc::new(TaskStore::new(backing.clone()));
        let processor = Arc::new(TaskProcessor::new(
            tasks,
            Arc::new(Canned),
            clock.clone(),
            GenerateParams::default(),
        ));
        let workflows = Arc::new(WorkflowStore::new(backing.clone()));
        let runner = StepRunner::new(Arc::new(Canned), Arc::new(LogSender::new()), GenerateParams::default());
        let engine = Arc::new(WorkflowEngine::new(workflows.clone(), runner, clock.clone()));
        Fixture {
            clock,
            summaries: Arc::new(SummaryLog::new(backing.clone())),
            backing,
            processor,
            workflows,
            engine,
        }
    }

    fn context(f: &Fixture) -> JobContext {
        JobContext {
            processor: f.processor.clone(),
            summaries: f.summaries.clone(),
            clock: f.clock.clone(),
            prunables: vec![f.workflows.clone() as Arc<dyn Prunable>, f.summaries.clone()],
        }
    }

    #[test]
    fn test_summary_counts() {
        let now = Utc::now();
        let mut done = Task::new("a", TaskType::Summarize, now);
        done.complete("x".into()).unwrap();
        let mut failed = Task::new("b", TaskType::Audit, now);
        failed.fail("y".into()).unwrap();
        let pending = Task::new("c", TaskType::Summarize, now);

        let summary = DailySummary::from_tasks(now.date_naive(), &[done, failed, pending]);
        assert_eq!(summary.total, 3);
        assert_eq!((summary.completed, summary.errored, summary.pending), (1, 1, 1));
        assert_eq!(summary.by_type["summarize"], 2);
    }

    #[tokio::test]
    async fn test_default_jobs_registered_and_daily_summary_fires() {
        let f = fixture(17, 59);
        let scheduler = Scheduler::new(f.clock.clone());
        register_default_jobs(&scheduler, context(&f), &SchedulerConfig::default()).unwrap();
        assert_eq!(
            scheduler.list_active(),
            vec![DAILY_SUMMARY, PENDING_TASK_SWEEP, WEEKLY_LOG_CLEANUP]
        );

        f.processor.process("Summarize X", "summarize").await.unwrap();
        // Yesterday's task is outside today's window.
        let old = Task::new("old", TaskType::Audit, f.clock.now() - Duration::days(1));
        f.processor.store().put(&old).await.unwrap();

        f.clock.set(Utc.with_ymd_and_hms(2026, 3, 2, 18, 0, 0).unwrap());
        for job in scheduler.tick() {
            job.handle.await.unwrap();
        }
        let summaries = f.summaries.list().await.unwrap();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].total, 1);
        assert_eq!(summaries[0].completed, 1);
    }

    #[tokio::test]
    async fn test_cleanup_prunes_logs_not_tasks() {
        let f = fixture(0, 0);
        let old_task = Task::new("ancient", TaskType::Rewrite, f.clock.now() - Duration::days(90));
        f.processor.store().put(&old_task).await.unwrap();
        f.summaries
            .record(&DailySummary::from_tasks(
                (f.clock.now() - Duration::days(60)).date_naive(),
                &[],
            ))
            .await
            .unwrap();
        f.summaries
            .record(&DailySummary::from_tasks(f.clock.now().date_naive(), &[]))
            .await
            .unwrap();

        let removed = run_log_cleanup(&context(&f).prunables, f.clock.as_ref(), 30).await.unwrap();
        assert_eq!(removed, 1);
        assert_eq!(f.summaries.list().await.unwrap().len(), 1);
        assert!(f.processor.store().get(&old_task.id).await.unwrap().is_some());
        assert!(!f.backing.read_all(collections::TASKS).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_scheduled_workflows_bound_and_fired() {
        let f = fixture(8, 59);
        let wf = f
            .workflows
            .create(
                NewWorkflow {
                    name: "Morning report".into(),
                    description: String::new(),
                    trigger: WorkflowTrigger::Schedule,
                    schedule: Some("0 9 * * *".into()),
                    steps: vec![WorkflowStep::new("map", "", StepAction::DataTransform(Default::default()))],
                    created_by: "owner".into(),
                },
                f.clock.now(),
            )
            .await
            .unwrap();

        let scheduler = Scheduler::new(f.clock.clone());
        scheduler.schedule("workflow:deleted", "* * * * *", || async { Ok(()) }).unwrap();
        let bound = bind_scheduled_workflows(&scheduler, f.engine.clone()).await.unwrap();
        assert_eq!(bound, 1);
        assert_eq!(scheduler.list_active(), vec![workflow_job_name(&wf.id)]);

        f.clock.set(Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap());
        for job in scheduler.tick() {
            job.handle.await.unwrap();
        }
        let stored = f.workflows.get(&wf.id).await.unwrap().unwrap();
        assert_eq!(stored.run_count, 1);
        let runs = f.workflows.runs(&wf.id).await.unwrap();
        assert_eq!(runs[0].trigger, RunTrigger::Schedule);

        f.workflows.set_active(&wf.id, false).await.unwrap();
        assert_eq!(bind_scheduled_workflows(&scheduler, f.engine.clone()).await.unwrap(), 0);
        assert!(scheduler.list_active().is_empty());
    }

    #[tokio::test]
    async fn test_workflow_sync_picks_up_later_changes() {
        let f = fixture(8, 59);
        let scheduler = Arc::new(Scheduler::new(f.clock.clone()));
        let bound = register_workflow_sync(&scheduler, f.engine.clone(), "* * * * *")
            .await
            .unwrap();
        assert_eq!(bound, 0);
        assert_eq!(scheduler.list_active(), vec![WORKFLOW_SYNC]);

        // Created after startup.
        let wf = f
            .workflows
            .create(
                NewWorkflow {
                    name: "Evening digest".into(),
                    description: String::new(),
                    trigger: WorkflowTrigger::Schedule,
                    schedule: Some("0 18 * * *".into()),
                    steps: vec![WorkflowStep::new("map", "", StepAction::DataTransform(Default::default()))],
                    created_by: "owner".into(),
                },
                f.clock.now(),
            )
            .await
            .unwrap();
        let name = workflow_job_name(&wf.id);

        scheduler.trigger(WORKFLOW_SYNC).unwrap().unwrap().handle.await.unwrap();
        assert!(scheduler.list_active().contains(&name));
        scheduler.trigger(&name).unwrap().unwrap().handle.await.unwrap();
        let fires = |s: &Scheduler| s.jobs().into_iter().find(|j| j.name == name).map(|j| j.run_count);
        assert_eq!(fires(&scheduler), Some(1));

        // An unchanged binding is left alone.
        f.clock.advance(Duration::minutes(5));
        scheduler.trigger(WORKFLOW_SYNC).unwrap().unwrap().handle.await.unwrap();
        assert_eq!(fires(&scheduler), Some(1));
        assert_eq!(f.workflows.get(&wf.id).await.unwrap().unwrap().run_count, 1);

        f.workflows.set_active(&wf.id, false).await.unwrap();
        scheduler.trigger(WORKFLOW_SYNC).unwrap().unwrap().handle.await.unwrap();
        assert_eq!(scheduler.list_active(), vec![WORKFLOW_SYNC]);
    }
}
