//! In-memory test doubles for the store, cache, fetcher, and gateway
//! seams. Compiled for tests only.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::cache::ResponseCache;
use crate::error::EngineError;
use crate::fetcher::{HttpFetcher, PageFetcher};
use crate::gateway::CompletionGateway;
use crate::store::{JobStore, RunStore};
use crate::types::{
    CacheEntry, CrawlRun, JobId, PageCapture, RunId, RunStatus, ScheduledJob,
};

pub struct MemoryJobStore {
    jobs: Mutex<HashMap<JobId, ScheduledJob>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self {
            jobs: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn create_job(&self, job: &ScheduledJob) -> Result<()> {
        self.jobs.lock().unwrap().insert(job.id, job.clone());
        Ok(())
    }

    async fn get_job(&self, id: JobId) -> Result<Option<ScheduledJob>> {
        Ok(self.jobs.lock().unwrap().get(&id).cloned())
    }

    async fn list_recurring(&self) -> Result<Vec<ScheduledJob>> {
        let mut jobs: Vec<ScheduledJob> = self
            .jobs
            .lock()
            .unwrap()
            .values()
            .filter(|j| j.is_recurring && j.schedule.is_some())
            .cloned()
            .collect();
        jobs.sort_by_key(|j| j.created_at);
        Ok(jobs)
    }

    async fn set_schedule(
        &self,
        id: JobId,
        schedule: Option<&str>,
        is_recurring: bool,
    ) -> Result<()> {
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs.get_mut(&id).ok_or_else(|| anyhow!("job not found"))?;
        job.schedule = schedule.map(String::from);
        job.is_recurring = is_recurring;
        Ok(())
    }

    async fn delete_job(&self, id: JobId) -> Result<()> {
        self.jobs.lock().unwrap().remove(&id);
        Ok(())
    }
}

pub struct MemoryRunStore {
    runs: Mutex<HashMap<RunId, CrawlRun>>,
    history: Mutex<HashMap<RunId, Vec<RunStatus>>>,
}

impl MemoryRunStore {
    pub fn new() -> Self {
        Self {
            runs: Mutex::new(HashMap::new()),
            history: Mutex::new(HashMap::new()),
        }
    }

    /// Every status a run has passed through, in order.
    pub fn status_history(&self, id: RunId) -> Vec<RunStatus> {
        self.history
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .unwrap_or_default()
    }

    fn record(&self, id: RunId, status: RunStatus) {
        self.history.lock().unwrap().entry(id).or_default().push(status);
    }
}

#[async_trait]
impl RunStore for MemoryRunStore {
    async fn create_run(&self, run: &CrawlRun) -> Result<()> {
        self.runs.lock().unwrap().insert(run.id, run.clone());
        self.record(run.id, run.status);
        Ok(())
    }

    async fn mark_running(&self, id: RunId, started_at: DateTime<Utc>) -> Result<()> {
        let mut runs = self.runs.lock().unwrap();
        let run = runs.get_mut(&id).ok_or_else(|| anyhow!("run not found"))?;
        run.status = RunStatus::Running;
        run.started_at = Some(started_at);
        drop(runs);
        self.record(id, RunStatus::Running);
        Ok(())
    }

    async fn mark_completed(
        &self,
        id: RunId,
        capture: &PageCapture,
        analysis: &str,
        completed_at: DateTime<Utc>,
    ) -> Result<()> {
        let mut runs = self.runs.lock().unwrap();
        let run = runs.get_mut(&id).ok_or_else(|| anyhow!("run not found"))?;
        run.status = RunStatus::Completed;
        run.capture = Some(capture.clone());
        run.analysis = Some(analysis.to_string());
        run.completed_at = Some(completed_at);
        drop(runs);
        self.record(id, RunStatus::Completed);
        Ok(())
    }

    async fn mark_failed(
        &self,
        id: RunId,
        error: &str,
        completed_at: DateTime<Utc>,
    ) -> Result<()> {
        let mut runs = self.runs.lock().unwrap();
        let run = runs.get_mut(&id).ok_or_else(|| anyhow!("run not found"))?;
        run.status = RunStatus::Failed;
        run.error = Some(error.to_string());
        run.completed_at = Some(completed_at);
        drop(runs);
        self.record(id, RunStatus::Failed);
        Ok(())
    }

    async fn get_run(&self, id: RunId) -> Result<Option<CrawlRun>> {
        Ok(self.runs.lock().unwrap().get(&id).cloned())
    }

    async fn list_runs_for_job(&self, job_id: JobId) -> Result<Vec<CrawlRun>> {
        let mut runs: Vec<CrawlRun> = self
            .runs
            .lock()
            .unwrap()
            .values()
            .filter(|r| r.job_id == job_id)
            .cloned()
            .collect();
        runs.sort_by_key(|r| r.created_at);
        Ok(runs)
    }

    async fn has_active_run_since(&self, job_id: JobId, since: DateTime<Utc>) -> Result<bool> {
        Ok(self.runs.lock().unwrap().values().any(|r| {
            r.job_id == job_id
                && !r.status.is_terminal()
                && r.started_at.unwrap_or(r.created_at) > since
        }))
    }

    async fn fail_abandoned_runs(&self, cutoff: DateTime<Utc>, error: &str) -> Result<u64> {
        let mut runs = self.runs.lock().unwrap();
        let mut reconciled = 0;
        let abandoned: Vec<RunId> = runs
            .values()
            .filter(|r| !r.status.is_terminal() && r.created_at < cutoff)
            .map(|r| r.id)
            .collect();
        for id in &abandoned {
            let run = runs.get_mut(id).expect("run disappeared under lock");
            run.status = RunStatus::Failed;
            run.error = Some(error.to_string());
            run.completed_at = Some(Utc::now());
            reconciled += 1;
        }
        drop(runs);
        for id in abandoned {
            self.record(id, RunStatus::Failed);
        }
        Ok(reconciled)
    }
}

pub struct MemoryResponseCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
    fail_reads: bool,
}

impl MemoryResponseCache {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            fail_reads: false,
        }
    }

    /// Every `get` errors, for exercising the miss-on-cache-failure path.
    pub fn failing_reads(mut self) -> Self {
        self.fail_reads = true;
        self
    }

    /// Row count, expired rows included.
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }
}

#[async_trait]
impl ResponseCache for MemoryResponseCache {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>> {
        if self.fail_reads {
            return Err(anyhow!("cache backend unavailable"));
        }
        let now = Utc::now();
        Ok(self
            .entries
            .lock()
            .unwrap()
            .get(key)
            .filter(|e| !e.is_expired_at(now))
            .cloned())
    }

    async fn put(&self, entry: &CacheEntry) -> Result<()> {
        self.entries
            .lock()
            .unwrap()
            .insert(entry.cache_key.clone(), entry.clone());
        Ok(())
    }

    async fn sweep_expired(&self) -> Result<u64> {
        let now = Utc::now();
        let mut entries = self.entries.lock().unwrap();
        let before = entries.len();
        entries.retain(|_, e| !e.is_expired_at(now));
        Ok((before - entries.len()) as u64)
    }
}

/// Fetcher that always returns the same capture.
pub struct StubFetcher {
    capture: PageCapture,
}

impl StubFetcher {
    /// Build the canned capture by running the real extraction over a
    /// fixed HTML document.
    pub fn from_html(url: &str, html: &str) -> Self {
        Self {
            capture: HttpFetcher::extract(url, html),
        }
    }
}

#[async_trait]
impl PageFetcher for StubFetcher {
    async fn fetch(&self, _url: &str) -> Result<PageCapture, EngineError> {
        Ok(self.capture.clone())
    }
}

/// Fetcher that always fails with a network-style error.
pub struct FailingFetcher {
    message: String,
}

impl FailingFetcher {
    pub fn new(message: &str) -> Self {
        Self {
            message: message.to_string(),
        }
    }
}

#[async_trait]
impl PageFetcher for FailingFetcher {
    async fn fetch(&self, _url: &str) -> Result<PageCapture, EngineError> {
        Err(EngineError::Fetch(self.message.clone()))
    }
}

/// Gateway double that counts completions and returns a fixed response
/// or a fixed provider error.
pub struct CountingGateway {
    calls: AtomicUsize,
    outcome: std::result::Result<String, String>,
}

impl CountingGateway {
    pub fn new(response: &str) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            outcome: Ok(response.to_string()),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            outcome: Err(message.to_string()),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CompletionGateway for CountingGateway {
    async fn completion(&self, _prompt: &str) -> Result<String, EngineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.outcome {
            Ok(response) => Ok(response.clone()),
            Err(message) => Err(EngineError::Provider(llm_client::LlmError::Api(
                message.clone(),
            ))),
        }
    }
}
