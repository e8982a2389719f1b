//! AIrCrawl scheduling core.
//!
//! Recurring crawl scheduling and execution: a cron-backed scheduler
//! keeps one repeating trigger per recurring job; each trigger runs one
//! crawl attempt that fetches the target page, extracts its content, and
//! asks an LLM for an intellectual-property assessment through a
//! TTL-cached completion gateway.

pub mod cache;
pub mod config;
pub mod error;
pub mod executor;
pub mod fetcher;
pub mod gateway;
pub mod scheduler;
pub mod store;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

// Re-exports for clean API
pub use cache::{PostgresResponseCache, ResponseCache};
pub use config::Config;
pub use error::EngineError;
pub use executor::CrawlExecutor;
pub use fetcher::{HttpFetcher, PageFetcher};
pub use gateway::{CompletionClient, CompletionGateway, LlmGateway};
pub use scheduler::CrawlScheduler;
pub use store::{JobStore, PostgresJobStore, PostgresRunStore, RunStore};
pub use types::{
    prompt_cache_key, CacheEntry, CrawlRun, JobId, PageCapture, RunId, RunStatus, Schedule,
    ScheduledJob,
};
