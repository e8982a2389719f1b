//! Error taxonomy for the crawl engine.

use thiserror::Error;

use crate::types::JobId;

/// Errors raised by scheduling, crawling, and completion operations.
///
/// Errors that reach a trigger boundary are converted into a `failed` run
/// plus a log line; they never crash the scheduler. Errors from direct
/// calls (`schedule_job`, `unschedule_job`) propagate to the caller.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Unrecognized schedule label; fatal to the single call, non-fatal
    /// to the scheduler as a whole.
    #[error("invalid schedule label: {0:?}")]
    InvalidSchedule(String),

    /// Run triggered for a job that no longer exists.
    #[error("job not found: {0}")]
    JobNotFound(JobId),

    /// Network failure, timeout, or non-2xx response while fetching the
    /// crawl target. The message is preserved verbatim for diagnostics.
    #[error("fetch failed: {0}")]
    Fetch(String),

    /// Extracted text was empty or whitespace-only; the run fails before
    /// any provider call is made.
    #[error("no content extracted")]
    EmptyContent,

    /// LLM provider call failed. Failures are never cached.
    #[error("provider call failed: {0}")]
    Provider(#[from] llm_client::LlmError),

    /// Cache read/write failure. Non-fatal at the gateway: logged and
    /// treated as a miss.
    #[error("cache error: {0}")]
    Cache(String),

    /// Timer registration or teardown failed inside the cron runtime.
    #[error("scheduler error: {0}")]
    Scheduler(String),
}
