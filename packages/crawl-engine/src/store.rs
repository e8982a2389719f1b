//! Job and run persistence.
//!
//! The traits are the seams the scheduler and executor depend on; the
//! Postgres implementations are the production backing. Tests swap in the
//! in-memory implementations from `crate::testing`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};

use crate::types::{CrawlRun, JobId, PageCapture, RunId, RunStatus, ScheduledJob};

/// Persistence for crawl job configurations.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn create_job(&self, job: &ScheduledJob) -> Result<()>;

    async fn get_job(&self, id: JobId) -> Result<Option<ScheduledJob>>;

    /// Every job flagged recurring with a non-null schedule label.
    async fn list_recurring(&self) -> Result<Vec<ScheduledJob>>;

    async fn set_schedule(
        &self,
        id: JobId,
        schedule: Option<&str>,
        is_recurring: bool,
    ) -> Result<()>;

    async fn delete_job(&self, id: JobId) -> Result<()>;
}

/// Persistence for crawl run history (append-only).
#[async_trait]
pub trait RunStore: Send + Sync {
    /// Insert a fresh run (normally in `pending`).
    async fn create_run(&self, run: &CrawlRun) -> Result<()>;

    async fn mark_running(&self, id: RunId, started_at: DateTime<Utc>) -> Result<()>;

    async fn mark_completed(
        &self,
        id: RunId,
        capture: &PageCapture,
        analysis: &str,
        completed_at: DateTime<Utc>,
    ) -> Result<()>;

    async fn mark_failed(&self, id: RunId, error: &str, completed_at: DateTime<Utc>)
        -> Result<()>;

    async fn get_run(&self, id: RunId) -> Result<Option<CrawlRun>>;

    async fn list_runs_for_job(&self, job_id: JobId) -> Result<Vec<CrawlRun>>;

    /// Whether the job has a non-terminal run started (or created, for
    /// runs still `pending`) after `since`.
    ///
    /// The cutoff keeps a run that will never finish — left behind by a
    /// crashed process — from blocking the job forever.
    async fn has_active_run_since(&self, job_id: JobId, since: DateTime<Utc>) -> Result<bool>;

    /// Mark every non-terminal run created before `cutoff` as `failed`
    /// with the given message. Returns the count reconciled.
    ///
    /// Called at startup: a run still `pending`/`running` from before
    /// this process started has no executor working on it.
    async fn fail_abandoned_runs(&self, cutoff: DateTime<Utc>, error: &str) -> Result<u64>;
}

pub struct PostgresJobStore {
    pool: PgPool,
}

impl PostgresJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn job_from_row(row: &sqlx::postgres::PgRow) -> ScheduledJob {
    ScheduledJob {
        id: JobId(row.get("id")),
        user_id: row.get("user_id"),
        name: row.get("name"),
        url: row.get("url"),
        schedule: row.get("schedule"),
        is_recurring: row.get("is_recurring"),
        created_at: row.get("created_at"),
    }
}

#[async_trait]
impl JobStore for PostgresJobStore {
    async fn create_job(&self, job: &ScheduledJob) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO crawl_jobs (id, user_id, name, url, schedule, is_recurring, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(job.id.0)
        .bind(&job.user_id)
        .bind(&job.name)
        .bind(&job.url)
        .bind(&job.schedule)
        .bind(job.is_recurring)
        .bind(job.created_at)
        .execute(&self.pool)
        .await
        .context("Failed to create job")?;
        Ok(())
    }

    async fn get_job(&self, id: JobId) -> Result<Option<ScheduledJob>> {
        let row = sqlx::query(
            r#"
            SELECT id, user_id, name, url, schedule, is_recurring, created_at
            FROM crawl_jobs
            WHERE id = $1
            "#,
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to get job")?;

        Ok(row.map(|r| job_from_row(&r)))
    }

    async fn list_recurring(&self) -> Result<Vec<ScheduledJob>> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, name, url, schedule, is_recurring, created_at
            FROM crawl_jobs
            WHERE is_recurring = TRUE AND schedule IS NOT NULL
            ORDER BY created_at
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to list recurring jobs")?;

        Ok(rows.iter().map(job_from_row).collect())
    }

    async fn set_schedule(
        &self,
        id: JobId,
        schedule: Option<&str>,
        is_recurring: bool,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE crawl_jobs SET schedule = $2, is_recurring = $3
            WHERE id = $1
            "#,
        )
        .bind(id.0)
        .bind(schedule)
        .bind(is_recurring)
        .execute(&self.pool)
        .await
        .context("Failed to update job schedule")?;
        Ok(())
    }

    async fn delete_job(&self, id: JobId) -> Result<()> {
        sqlx::query("DELETE FROM crawl_jobs WHERE id = $1")
            .bind(id.0)
            .execute(&self.pool)
            .await
            .context("Failed to delete job")?;
        Ok(())
    }
}

pub struct PostgresRunStore {
    pool: PgPool,
}

impl PostgresRunStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn run_from_row(row: &sqlx::postgres::PgRow) -> Result<CrawlRun> {
    let status: String = row.get("status");
    let status = RunStatus::parse(&status)
        .with_context(|| format!("unknown run status in database: {status:?}"))?;
    let capture: Option<serde_json::Value> = row.get("capture");
    let capture = capture
        .map(serde_json::from_value::<PageCapture>)
        .transpose()
        .context("Failed to decode run capture")?;

    Ok(CrawlRun {
        id: RunId(row.get("id")),
        job_id: JobId(row.get("job_id")),
        status,
        started_at: row.get("started_at"),
        completed_at: row.get("completed_at"),
        capture,
        analysis: row.get("analysis"),
        error: row.get("error"),
        created_at: row.get("created_at"),
    })
}

#[async_trait]
impl RunStore for PostgresRunStore {
    async fn create_run(&self, run: &CrawlRun) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO crawl_runs (
                id, job_id, status, started_at, completed_at, capture, analysis, error, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(run.id.0)
        .bind(run.job_id.0)
        .bind(run.status.as_str())
        .bind(run.started_at)
        .bind(run.completed_at)
        .bind(
            run.capture
                .as_ref()
                .map(serde_json::to_value)
                .transpose()?,
        )
        .bind(&run.analysis)
        .bind(&run.error)
        .bind(run.created_at)
        .execute(&self.pool)
        .await
        .context("Failed to create run")?;
        Ok(())
    }

    async fn mark_running(&self, id: RunId, started_at: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE crawl_runs SET status = 'running', started_at = $2
            WHERE id = $1
            "#,
        )
        .bind(id.0)
        .bind(started_at)
        .execute(&self.pool)
        .await
        .context("Failed to mark run running")?;
        Ok(())
    }

    async fn mark_completed(
        &self,
        id: RunId,
        capture: &PageCapture,
        analysis: &str,
        completed_at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE crawl_runs
            SET status = 'completed', capture = $2, analysis = $3, completed_at = $4
            WHERE id = $1
            "#,
        )
        .bind(id.0)
        .bind(serde_json::to_value(capture)?)
        .bind(analysis)
        .bind(completed_at)
        .execute(&self.pool)
        .await
        .context("Failed to mark run completed")?;
        Ok(())
    }

    async fn mark_failed(
        &self,
        id: RunId,
        error: &str,
        completed_at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE crawl_runs
            SET status = 'failed', error = $2, completed_at = $3
            WHERE id = $1
            "#,
        )
        .bind(id.0)
        .bind(error)
        .bind(completed_at)
        .execute(&self.pool)
        .await
        .context("Failed to mark run failed")?;
        Ok(())
    }

    async fn get_run(&self, id: RunId) -> Result<Option<CrawlRun>> {
        let row = sqlx::query(
            r#"
            SELECT id, job_id, status, started_at, completed_at, capture, analysis, error, created_at
            FROM crawl_runs
            WHERE id = $1
            "#,
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to get run")?;

        row.map(|r| run_from_row(&r)).transpose()
    }

    async fn list_runs_for_job(&self, job_id: JobId) -> Result<Vec<CrawlRun>> {
        let rows = sqlx::query(
            r#"
            SELECT id, job_id, status, started_at, completed_at, capture, analysis, error, created_at
            FROM crawl_runs
            WHERE job_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(job_id.0)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list runs for job")?;

        rows.iter().map(run_from_row).collect()
    }

    async fn has_active_run_since(&self, job_id: JobId, since: DateTime<Utc>) -> Result<bool> {
        let row = sqlx::query(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM crawl_runs
                WHERE job_id = $1
                  AND status IN ('pending', 'running')
                  AND COALESCE(started_at, created_at) > $2
            ) AS active
            "#,
        )
        .bind(job_id.0)
        .bind(since)
        .fetch_one(&self.pool)
        .await
        .context("Failed to check for active run")?;

        Ok(row.get("active"))
    }

    async fn fail_abandoned_runs(&self, cutoff: DateTime<Utc>, error: &str) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE crawl_runs
            SET status = 'failed', error = $2, completed_at = $3
            WHERE status IN ('pending', 'running') AND created_at < $1
            "#,
        )
        .bind(cutoff)
        .bind(error)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .context("Failed to reconcile abandoned runs")?;
        Ok(result.rows_affected())
    }
}
