use std::time::Duration;

use anyhow::{Context, Result};
use dotenvy::dotenv;
use llm_client::Provider;
use std::env;

/// Engine configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub provider: Provider,
    pub model: String,
    pub openai_api_key: Option<String>,
    pub anthropic_api_key: Option<String>,
    pub cache_ttl: Duration,
    pub fetch_timeout: Duration,
}

/// Default cache TTL: 24 hours.
const DEFAULT_CACHE_TTL_SECS: u64 = 86_400;

/// Default fetch timeout for crawl targets.
const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 30;

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        let provider_name = env::var("LLM_PROVIDER").unwrap_or_else(|_| "openai".to_string());
        let provider = Provider::parse(&provider_name)
            .map_err(|e| anyhow::anyhow!("{e}"))
            .context("LLM_PROVIDER must be 'openai' or 'anthropic'")?;

        let model = env::var("LLM_MODEL").unwrap_or_else(|_| match provider {
            Provider::OpenAi => "gpt-4o".to_string(),
            Provider::Anthropic => "claude-3-5-sonnet-latest".to_string(),
        });

        Ok(Self {
            database_url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            provider,
            model,
            openai_api_key: env::var("OPENAI_API_KEY").ok(),
            anthropic_api_key: env::var("ANTHROPIC_API_KEY").ok(),
            cache_ttl: Duration::from_secs(parse_secs("CACHE_TTL_SECS", DEFAULT_CACHE_TTL_SECS)?),
            fetch_timeout: Duration::from_secs(parse_secs(
                "FETCH_TIMEOUT_SECS",
                DEFAULT_FETCH_TIMEOUT_SECS,
            )?),
        })
    }

    /// API key for the configured provider.
    pub fn provider_api_key(&self) -> Result<&str> {
        let key = match self.provider {
            Provider::OpenAi => self.openai_api_key.as_deref(),
            Provider::Anthropic => self.anthropic_api_key.as_deref(),
        };
        key.with_context(|| format!("{} must be set", self.provider.api_key_env()))
    }
}

fn parse_secs(var: &str, default: u64) -> Result<u64> {
    match env::var(var) {
        Ok(raw) => raw
            .parse()
            .with_context(|| format!("{var} must be a number of seconds")),
        Err(_) => Ok(default),
    }
}
