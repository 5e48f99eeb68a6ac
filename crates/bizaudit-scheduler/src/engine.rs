//! Scheduler: named cron jobs fired from a tokio interval loop.
//!
//! Jobs are keyed by name: scheduling an existing name replaces the previous
//! registration atomically, so a stale timer can never fire again. Each fire
//! runs on its own tokio task; a fire that arrives while the previous fire of
//! the same job is still running is skipped and counted.

use std::collections::BTreeMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use futures::FutureExt;
use futures::future::BoxFuture;
use serde::Serialize;
use tokio::task::JoinHandle;

use bizaudit_core::error::{BizAuditError, Result};
use bizaudit_core::traits::Clock;

use crate::cron::CronSchedule;

/// Zero-argument job body.
pub type JobCallback = Arc<dyn Fn() -> BoxFuture<'static, Result<()>> + Send + Sync>;

struct JobEntry {
    schedule: CronSchedule,
    callback: JobCallback,
    next_run: Option<DateTime<Utc>>,
    last_run: Option<DateTime<Utc>>,
    run_count: u64,
    skipped_count: u64,
    running: Arc<AtomicBool>,
}

/// Snapshot of one job, for status output.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobInfo {
    pub name: String,
    pub cron_expression: String,
    pub next_run: Option<DateTime<Utc>>,
    pub last_run: Option<DateTime<Utc>>,
    pub run_count: u64,
    pub skipped_count: u64,
    pub running: bool,
}

/// A fire started by [`Scheduler::tick`] or [`Scheduler::trigger`].
pub struct FiredJob {
    pub name: String,
    pub handle: JoinHandle<()>,
}

/// Clears the job's running flag when the fire finishes, panics included.
struct RunningGuard(Arc<AtomicBool>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct Scheduler {
    jobs: Mutex<BTreeMap<String, JobEntry>>,
    clock: Arc<dyn Clock>,
}

impl Scheduler {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            jobs: Mutex::new(BTreeMap::new()),
            clock,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, JobEntry>> {
        self.jobs.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register `name`, replacing any previous job with that name.
    /// The expression is validated first; on error the existing job is untouched.
    pub fn schedule<F, Fut>(&self, name: &str, expression: &str, f: F) -> Result<()>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let callback: JobCallback = Arc::new(move || f().boxed());
        self.schedule_callback(name, expression, callback)
    }

    /// Same as [`Scheduler::schedule`] with an already boxed callback.
    pub fn schedule_callback(&self, name: &str, expression: &str, callback: JobCallback) -> Result<()> {
        if name.trim().is_empty() {
            return Err(BizAuditError::Validation("Job name is required".into()));
        }
        let schedule = CronSchedule::parse(expression)?;
        let next_run = schedule.next_after(self.clock.now()).ok_or_else(|| {
            BizAuditError::Scheduling(format!("Cron expression '{expression}' never fires"))
        })?;

        let entry = JobEntry {
            schedule,
            callback,
            next_run: Some(next_run),
            last_run: None,
            run_count: 0,
            skipped_count: 0,
            running: Arc::new(AtomicBool::new(false)),
        };
        let replaced = self.lock().insert(name.to_string(), entry).is_some();

        if replaced {
            tracing::info!("♻️ Job '{name}' rescheduled: {expression} (next {next_run})");
        } else {
            tracing::info!("📅 Job '{name}' scheduled: {expression} (next {next_run})");
        }
        Ok(())
    }

    /// Remove a job. An in-flight fire is not interrupted.
    pub fn unschedule(&self, name: &str) -> bool {
        let removed = self.lock().remove(name).is_some();
        if removed {
            tracing::info!("🗑️ Job '{name}' unscheduled");
        }
        removed
    }

    /// Registered job names, lexical order.
    pub fn list_active(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }

    pub fn jobs(&self) -> Vec<JobInfo> {
        self.lock()
            .iter()
            .map(|(name, job)| JobInfo {
                name: name.clone(),
                cron_expression: job.schedule.expression().to_string(),
                next_run: job.next_run,
                last_run: job.last_run,
                run_count: job.run_count,
                skipped_count: job.skipped_count,
                running: job.running.load(Ordering::SeqCst),
            })
            .collect()
    }

    pub fn job_count(&self) -> usize {
        self.lock().len()
    }

    /// Fire every job due at `clock.now()`. Must be called inside a tokio runtime.
    pub fn tick(&self) -> Vec<FiredJob> {
        let now = self.clock.now();
        let mut due = Vec::new();

        {
            let mut jobs = self.lock();
            for (name, job) in jobs.iter_mut() {
                if !job.next_run.is_some_and(|next| next <= now) {
                    continue;
                }
                job.next_run = job.schedule.next_after(now);
                if let Some(started) = Self::claim(name, job, now) {
                    due.push(started);
                }
            }
        }

        due.into_iter()
            .map(|(name, callback, guard)| Self::spawn_fire(name, callback, guard))
            .collect()
    }

    /// Fire a job now, outside its schedule. `Ok(None)` when it is still running.
    pub fn trigger(&self, name: &str) -> Result<Option<FiredJob>> {
        let now = self.clock.now();
        let claimed = {
            let mut jobs = self.lock();
            let job = jobs
                .get_mut(name)
                .ok_or_else(|| BizAuditError::NotFound(format!("job '{name}'")))?;
            Self::claim(name, job, now)
        };
        Ok(claimed.map(|(name, callback, guard)| Self::spawn_fire(name, callback, guard)))
    }

    /// Mark a job running, or count a skip when the previous fire is still going.
    fn claim(
        name: &str,
        job: &mut JobEntry,
        now: DateTime<Utc>,
    ) -> Option<(String, JobCallback, RunningGuard)> {
        if job.running.swap(true, Ordering::SeqCst) {
            job.skipped_count += 1;
            tracing::warn!("⏭️ Job '{name}' still running, skipping this fire");
            return None;
        }
        job.last_run = Some(now);
        job.run_count += 1;
        Some((
            name.to_string(),
            job.callback.clone(),
            RunningGuard(job.running.clone()),
        ))
    }

    fn spawn_fire(name: String, callback: JobCallback, guard: RunningGuard) -> FiredJob {
        tracing::info!("🔔 Job fired: '{name}'");
        let job_name = name.clone();
        let handle = tokio::spawn(async move {
            let _guard = guard;
            let outcome = AssertUnwindSafe(async move { callback().await })
                .catch_unwind()
                .await;
            match outcome {
                Ok(Ok(())) => tracing::debug!("✅ Job '{job_name}' finished"),
                Ok(Err(e)) => tracing::warn!("⚠️ Job '{job_name}' failed: {e}"),
                Err(_) => tracing::error!("💥 Job '{job_name}' panicked"),
            }
        });
        FiredJob { name, handle }
    }

    /// Run the tick loop on a background tokio task.
    pub fn spawn(self: Arc<Self>, every: std::time::Duration) -> JoinHandle<()> {
        tracing::info!("⏰ Scheduler started (check every {}s)", every.as_secs());
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            loop {
                interval.tick().await;
                let fired = self.tick();
                if !fired.is_empty() {
                    tracing::debug!("Tick fired {} job(s)", fired.len());
                }
            }
        })
    }
}
