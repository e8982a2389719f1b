// Daemon entry point for the recurring crawl scheduler

use std::sync::Arc;

use anyhow::{Context, Result};
use crawl_engine::{
    Config, CrawlExecutor, CrawlScheduler, HttpFetcher, LlmGateway, PostgresJobStore,
    PostgresResponseCache, PostgresRunStore, ResponseCache,
};
use llm_client::LlmClient;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,crawl_engine=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting AIrCrawl scheduling daemon");

    // Load configuration
    let config = Config::from_env().context("Failed to load configuration")?;
    let api_key = config.provider_api_key()?.to_string();
    tracing::info!(provider = %config.provider, model = %config.model, "Configuration loaded");

    // Connect to database
    tracing::info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;
    tracing::info!("Database connected");

    // Run migrations
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run migrations")?;
    tracing::info!("Migrations complete");

    // Wire up the pipeline
    let jobs = Arc::new(PostgresJobStore::new(pool.clone()));
    let runs = Arc::new(PostgresRunStore::new(pool.clone()));
    let cache: Arc<dyn ResponseCache> = Arc::new(PostgresResponseCache::new(pool.clone()));
    let client = Arc::new(LlmClient::new(config.provider, api_key));
    let gateway = Arc::new(LlmGateway::new(
        cache.clone(),
        client,
        config.model.clone(),
        config.cache_ttl,
    ));
    let fetcher = Arc::new(HttpFetcher::new(config.fetch_timeout)?);
    let executor = Arc::new(CrawlExecutor::new(
        jobs.clone(),
        runs.clone(),
        fetcher,
        gateway,
    ));

    // Rebuild timers from persisted state and start firing
    let scheduler = CrawlScheduler::new(jobs, runs, executor).await?;
    scheduler.schedule_cache_sweep(cache).await?;
    let scheduled = scheduler.initialize().await?;
    tracing::info!(scheduled = scheduled, "Scheduler running");

    // Tear everything down on ctrl-c
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    tracing::info!("Shutdown signal received, stopping timers");
    scheduler.shutdown().await?;
    tracing::info!("Scheduler stopped");

    Ok(())
}
