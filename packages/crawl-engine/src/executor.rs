//! Crawl execution: one attempt per invocation, one terminal run per
//! attempt.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use tracing::{info, warn};

use crate::error::EngineError;
use crate::fetcher::PageFetcher;
use crate::gateway::CompletionGateway;
use crate::store::{JobStore, RunStore};
use crate::types::{CrawlRun, JobId, PageCapture, RunId, RunStatus};

pub struct CrawlExecutor {
    jobs: Arc<dyn JobStore>,
    runs: Arc<dyn RunStore>,
    fetcher: Arc<dyn PageFetcher>,
    gateway: Arc<dyn CompletionGateway>,
}

impl CrawlExecutor {
    pub fn new(
        jobs: Arc<dyn JobStore>,
        runs: Arc<dyn RunStore>,
        fetcher: Arc<dyn PageFetcher>,
        gateway: Arc<dyn CompletionGateway>,
    ) -> Self {
        Self {
            jobs,
            runs,
            fetcher,
            gateway,
        }
    }

    /// Perform one crawl attempt for a job.
    ///
    /// When `existing_run` is given the pre-created run record is reused;
    /// it must belong to `job_id` and still be non-terminal. Otherwise a
    /// fresh run is created in `pending`. Exactly one run reaches a
    /// terminal state per invocation. Crawl failures (fetch, empty
    /// content, provider) are recorded on the run and returned as a
    /// `failed` run, not as an `Err`; only a missing job, an invalid run
    /// handoff, or a store failure propagates.
    pub async fn run_crawl(
        &self,
        job_id: JobId,
        existing_run: Option<RunId>,
    ) -> Result<CrawlRun> {
        let Some(job) = self.jobs.get_job(job_id).await? else {
            let err = EngineError::JobNotFound(job_id);
            if let Some(run_id) = existing_run {
                self.runs
                    .mark_failed(run_id, &err.to_string(), Utc::now())
                    .await?;
            }
            return Err(err.into());
        };

        let mut run = match existing_run {
            Some(run_id) => {
                let run = self
                    .runs
                    .get_run(run_id)
                    .await?
                    .with_context(|| format!("run {run_id} not found"))?;
                if run.job_id != job_id {
                    bail!("run {run_id} belongs to job {}, not {job_id}", run.job_id);
                }
                if run.status.is_terminal() {
                    bail!("run {run_id} already finished as {}", run.status.as_str());
                }
                run
            }
            None => {
                let run = CrawlRun::pending(job_id);
                self.runs.create_run(&run).await?;
                run
            }
        };

        let started_at = Utc::now();
        self.runs.mark_running(run.id, started_at).await?;
        run.status = RunStatus::Running;
        run.started_at = Some(started_at);

        info!(job_id = %job_id, run_id = %run.id, url = %job.url, "Starting crawl run");

        let capture = match self.fetcher.fetch(&job.url).await {
            Ok(capture) => capture,
            Err(e) => return self.fail(run, &e.to_string()).await,
        };

        // An empty prompt would produce a meaningless cache key and a
        // wasted provider call; short-circuit before the gateway.
        if capture.text.trim().is_empty() {
            return self.fail(run, &EngineError::EmptyContent.to_string()).await;
        }

        let prompt = analysis_prompt(&capture);
        let analysis = match self.gateway.completion(&prompt).await {
            Ok(analysis) => analysis,
            Err(e) => return self.fail(run, &e.to_string()).await,
        };

        let completed_at = Utc::now();
        self.runs
            .mark_completed(run.id, &capture, &analysis, completed_at)
            .await?;
        run.status = RunStatus::Completed;
        run.completed_at = Some(completed_at);
        run.capture = Some(capture);
        run.analysis = Some(analysis);

        info!(job_id = %job_id, run_id = %run.id, "Crawl run completed");
        Ok(run)
    }

    async fn fail(&self, mut run: CrawlRun, message: &str) -> Result<CrawlRun> {
        warn!(job_id = %run.job_id, run_id = %run.id, error = %message, "Crawl run failed");
        let completed_at = Utc::now();
        self.runs.mark_failed(run.id, message, completed_at).await?;
        run.status = RunStatus::Failed;
        run.completed_at = Some(completed_at);
        run.error = Some(message.to_string());
        Ok(run)
    }
}

/// Deterministic analysis prompt for a page capture.
///
/// Identical captures must produce byte-identical prompts so repeated
/// crawls of unchanged pages hit the response cache.
fn analysis_prompt(capture: &PageCapture) -> String {
    let title = capture.title.as_deref().unwrap_or("(untitled)");
    format!(
        "Analyze the following content from {} for potential intellectual property concerns.\n\nTitle: {}\n\n{}",
        capture.url, title, capture.text
    )
}
