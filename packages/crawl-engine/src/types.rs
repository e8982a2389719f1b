use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::EngineError;

/// Unique identifier for a crawl job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(pub Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Unique identifier for a crawl run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(pub Uuid);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Recognized recurrence cadences.
///
/// Labels are parsed case-insensitively; anything outside the three
/// recognized values is rejected. There is no custom cron input surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Schedule {
    Daily,
    Weekly,
    Monthly,
}

impl Schedule {
    /// Parse a schedule label, case-insensitive.
    pub fn parse(label: &str) -> Result<Self, EngineError> {
        match label.trim().to_ascii_lowercase().as_str() {
            "daily" => Ok(Schedule::Daily),
            "weekly" => Ok(Schedule::Weekly),
            "monthly" => Ok(Schedule::Monthly),
            _ => Err(EngineError::InvalidSchedule(label.to_string())),
        }
    }

    /// Six-field cron expression for this cadence.
    ///
    /// Daily fires at 03:00 UTC, weekly on Monday 03:00, monthly on the
    /// first day of the month at 03:00.
    pub fn cron_expression(&self) -> &'static str {
        match self {
            Schedule::Daily => "0 0 3 * * *",
            Schedule::Weekly => "0 0 3 * * MON",
            Schedule::Monthly => "0 0 3 1 * *",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Schedule::Daily => "daily",
            Schedule::Weekly => "weekly",
            Schedule::Monthly => "monthly",
        }
    }
}

impl std::fmt::Display for Schedule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A crawl job as configured by a user.
///
/// `schedule` keeps the raw label as submitted; it is validated when the
/// job is handed to the scheduler so that one bad label cannot poison
/// loading the rest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledJob {
    pub id: JobId,
    pub user_id: String,
    pub name: String,
    pub url: String,
    pub schedule: Option<String>,
    pub is_recurring: bool,
    pub created_at: DateTime<Utc>,
}

impl ScheduledJob {
    pub fn new(
        user_id: impl Into<String>,
        name: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        Self {
            id: JobId::new(),
            user_id: user_id.into(),
            name: name.into(),
            url: url.into(),
            schedule: None,
            is_recurring: false,
            created_at: Utc::now(),
        }
    }

    pub fn recurring(mut self, schedule: Schedule) -> Self {
        self.schedule = Some(schedule.as_str().to_string());
        self.is_recurring = true;
        self
    }
}

/// Lifecycle state of a crawl run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Pending => "pending",
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(RunStatus::Pending),
            "running" => Some(RunStatus::Running),
            "completed" => Some(RunStatus::Completed),
            "failed" => Some(RunStatus::Failed),
            _ => None,
        }
    }

    /// Whether this state is terminal (no further transitions).
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Failed)
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a fetch produced: title, plain text, and outbound links.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageCapture {
    pub url: String,
    pub title: Option<String>,
    pub text: String,
    pub links: Vec<String>,
}

/// One crawl execution attempt and its recorded outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlRun {
    pub id: RunId,
    pub job_id: JobId,
    pub status: RunStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub capture: Option<PageCapture>,
    pub analysis: Option<String>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl CrawlRun {
    /// A fresh run in `pending`, created at trigger time.
    pub fn pending(job_id: JobId) -> Self {
        Self {
            id: RunId::new(),
            job_id,
            status: RunStatus::Pending,
            started_at: None,
            completed_at: None,
            capture: None,
            analysis: None,
            error: None,
            created_at: Utc::now(),
        }
    }
}

/// A cached LLM completion, addressed by prompt digest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub cache_key: String,
    pub provider: String,
    pub model: String,
    pub response: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl CacheEntry {
    /// Whether this entry has passed its expiry at the given instant.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// SHA-256 hex digest of the exact prompt text.
///
/// No normalization is applied: callers wanting cache hits across
/// logically-identical calls must produce byte-identical prompts.
pub fn prompt_cache_key(prompt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(prompt.as_bytes());
    hex::encode(hasher.finalize())
}
