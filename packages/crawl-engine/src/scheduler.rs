//! Recurring crawl scheduler.
//!
//! Keeps exactly one active repeating trigger per recurring job, running
//! on tokio-cron-scheduler independently of any request-handling path.
//! The job→timer association is an owned map inside the scheduler
//! instance, serialized behind a mutex; there is no ambient module state.
//!
//! A trigger firing never escapes: errors inside a triggered execution
//! are caught, logged, and attributed to the run as a failure, and the
//! job keeps firing on its original cadence regardless of prior run
//! outcomes. A trigger is skipped when a previous run for the same job
//! has not reached a terminal state.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use tokio::sync::Mutex;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::cache::ResponseCache;
use crate::error::EngineError;
use crate::executor::CrawlExecutor;
use crate::store::{JobStore, RunStore};
use crate::types::{JobId, RunStatus, Schedule};

/// Hourly cadence for the cache sweep maintenance job.
const CACHE_SWEEP_CRON: &str = "0 0 * * * *";

/// How long a non-terminal run blocks its job's triggers.
///
/// A run older than this is considered abandoned (a crashed process or a
/// lost status update) and no longer counts as active, so recurrence
/// resumes instead of being skipped forever.
const RUN_STALE_AFTER_SECS: i64 = 3_600;

struct TimerHandle {
    timer_id: Uuid,
    schedule: Schedule,
}

pub struct CrawlScheduler {
    scheduler: JobScheduler,
    jobs: Arc<dyn JobStore>,
    runs: Arc<dyn RunStore>,
    executor: Arc<CrawlExecutor>,
    timers: Mutex<HashMap<JobId, TimerHandle>>,
}

impl CrawlScheduler {
    pub async fn new(
        jobs: Arc<dyn JobStore>,
        runs: Arc<dyn RunStore>,
        executor: Arc<CrawlExecutor>,
    ) -> Result<Self> {
        let scheduler = JobScheduler::new()
            .await
            .context("Failed to create cron scheduler")?;
        Ok(Self {
            scheduler,
            jobs,
            runs,
            executor,
            timers: Mutex::new(HashMap::new()),
        })
    }

    /// Register (or replace) the repeating trigger for a job.
    ///
    /// The label is validated before any existing timer is touched, so an
    /// invalid label leaves a prior timer running. Re-scheduling with a
    /// valid label stops and discards the old timer first.
    pub async fn schedule_job(&self, job_id: JobId, label: &str) -> Result<(), EngineError> {
        let schedule = Schedule::parse(label)?;

        let runs = self.runs.clone();
        let executor = self.executor.clone();
        let timer = Job::new_async(schedule.cron_expression(), move |_uuid, _lock| {
            let runs = runs.clone();
            let executor = executor.clone();
            Box::pin(async move {
                Self::fire(runs, executor, job_id).await;
            })
        })
        .map_err(|e| EngineError::Scheduler(e.to_string()))?;

        let mut timers = self.timers.lock().await;
        if let Some(old) = timers.remove(&job_id) {
            if let Err(e) = self.scheduler.remove(&old.timer_id).await {
                warn!(job_id = %job_id, error = %e, "Failed to remove replaced timer");
            }
        }

        let timer_id = self
            .scheduler
            .add(timer)
            .await
            .map_err(|e| EngineError::Scheduler(e.to_string()))?;
        timers.insert(job_id, TimerHandle { timer_id, schedule });

        info!(job_id = %job_id, schedule = %schedule, "Scheduled recurring crawl");
        Ok(())
    }

    /// Stop and remove the job's timer; no-op if absent.
    ///
    /// An in-flight run is not cancelled: it completes (or fails) and
    /// still writes its terminal state.
    pub async fn unschedule_job(&self, job_id: JobId) -> Result<(), EngineError> {
        let mut timers = self.timers.lock().await;
        if let Some(handle) = timers.remove(&job_id) {
            self.scheduler
                .remove(&handle.timer_id)
                .await
                .map_err(|e| EngineError::Scheduler(e.to_string()))?;
            info!(job_id = %job_id, "Unscheduled recurring crawl");
        }
        Ok(())
    }

    /// Load every recurring job with a schedule label and register its
    /// timer, then start the cron runtime.
    ///
    /// Failures are isolated per job: one invalid schedule is logged and
    /// skipped without aborting the batch. Returns the count scheduled.
    pub async fn initialize(&self) -> Result<usize> {
        // Runs still pending/running from before this process started
        // have no executor working on them; fail them so they cannot
        // block future triggers.
        let reconciled = self
            .runs
            .fail_abandoned_runs(Utc::now(), "process restarted before run completed")
            .await
            .context("Failed to reconcile abandoned runs")?;
        if reconciled > 0 {
            warn!(reconciled = reconciled, "Failed abandoned runs from a previous process");
        }

        let recurring = self
            .jobs
            .list_recurring()
            .await
            .context("Failed to load recurring jobs")?;

        let mut scheduled = 0;
        for job in &recurring {
            let Some(label) = job.schedule.as_deref() else {
                continue;
            };
            match self.schedule_job(job.id, label).await {
                Ok(()) => scheduled += 1,
                Err(e) => {
                    warn!(job_id = %job.id, schedule = %label, error = %e,
                        "Skipping job with unschedulable label");
                }
            }
        }

        self.scheduler
            .start()
            .await
            .context("Failed to start cron scheduler")?;

        info!(
            scheduled = scheduled,
            total = recurring.len(),
            "Recurring crawl scheduler initialized"
        );
        Ok(scheduled)
    }

    /// Stop every active timer. Used on shutdown and before re-running
    /// `initialize`.
    pub async fn stop_all_jobs(&self) -> Result<(), EngineError> {
        let mut timers = self.timers.lock().await;
        for (job_id, handle) in timers.drain() {
            if let Err(e) = self.scheduler.remove(&handle.timer_id).await {
                warn!(job_id = %job_id, error = %e, "Failed to remove timer during stop");
            }
        }
        info!("Stopped all recurring crawl timers");
        Ok(())
    }

    /// Tear down all timers and shut down the cron runtime.
    pub async fn shutdown(&self) -> Result<(), EngineError> {
        self.stop_all_jobs().await?;
        let mut scheduler = self.scheduler.clone();
        scheduler
            .shutdown()
            .await
            .map_err(|e| EngineError::Scheduler(e.to_string()))?;
        Ok(())
    }

    /// Register the hourly cache sweep maintenance job.
    pub async fn schedule_cache_sweep(
        &self,
        cache: Arc<dyn ResponseCache>,
    ) -> Result<(), EngineError> {
        let sweep = Job::new_async(CACHE_SWEEP_CRON, move |_uuid, _lock| {
            let cache = cache.clone();
            Box::pin(async move {
                match cache.sweep_expired().await {
                    Ok(removed) => {
                        info!(removed = removed, "Swept expired cache entries");
                    }
                    Err(e) => {
                        error!(error = %e, "Cache sweep failed");
                    }
                }
            })
        })
        .map_err(|e| EngineError::Scheduler(e.to_string()))?;

        self.scheduler
            .add(sweep)
            .await
            .map_err(|e| EngineError::Scheduler(e.to_string()))?;
        Ok(())
    }

    /// The active cadence for a job, if it has a timer.
    pub async fn active_schedule(&self, job_id: JobId) -> Option<Schedule> {
        self.timers.lock().await.get(&job_id).map(|h| h.schedule)
    }

    /// Number of active timers.
    pub async fn timer_count(&self) -> usize {
        self.timers.lock().await.len()
    }

    /// Fire a job's trigger immediately, outside its cron cadence.
    ///
    /// Returns `false` without executing when the job has no active
    /// timer (an unscheduled job fires zero executions).
    pub async fn trigger_now(&self, job_id: JobId) -> bool {
        if !self.timers.lock().await.contains_key(&job_id) {
            return false;
        }
        Self::fire(self.runs.clone(), self.executor.clone(), job_id).await;
        true
    }

    /// Trigger boundary: everything a firing can raise is absorbed here.
    async fn fire(runs: Arc<dyn RunStore>, executor: Arc<CrawlExecutor>, job_id: JobId) {
        let stale_cutoff = Utc::now() - chrono::Duration::seconds(RUN_STALE_AFTER_SECS);
        match runs.has_active_run_since(job_id, stale_cutoff).await {
            Ok(true) => {
                warn!(job_id = %job_id, "Previous run still active, skipping trigger");
                return;
            }
            Ok(false) => {}
            Err(e) => {
                error!(job_id = %job_id, error = %e, "Could not check for active run, skipping trigger");
                return;
            }
        }

        match executor.run_crawl(job_id, None).await {
            Ok(run) if run.status == RunStatus::Failed => {
                warn!(
                    job_id = %job_id,
                    run_id = %run.id,
                    error = run.error.as_deref().unwrap_or(""),
                    "Triggered crawl failed; recurrence continues"
                );
            }
            Ok(run) => {
                info!(job_id = %job_id, run_id = %run.id, "Triggered crawl completed");
            }
            Err(e) => {
                error!(job_id = %job_id, error = %e, "Triggered crawl could not run");
            }
        }
    }
}
