//! LLM completion gateway.
//!
//! Single choke point for turning a prompt into a completion. The gateway
//! consults the response cache first, calls the configured provider on a
//! miss, and stores the new completion under the prompt's digest. Cache
//! failures are logged and treated as misses; they never abort the
//! completion pipeline. Provider errors propagate — retry, if any, is the
//! caller's responsibility, and failures are never cached.
//!
//! Two concurrent calls with the same prompt may both miss and both call
//! the provider. That is accepted: the upsert is idempotent by key and
//! values are deterministic for a given prompt and provider/model.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use llm_client::{ChatRequest, LlmClient, LlmError, Message};
use tracing::{debug, info, warn};

use crate::cache::ResponseCache;
use crate::error::EngineError;
use crate::types::{prompt_cache_key, CacheEntry};

/// System instruction sent with every analysis prompt.
const SYSTEM_INSTRUCTION: &str = "You are an intellectual property analyst. \
    Review the provided web page content and report any potential \
    intellectual property concerns: unlicensed brand usage, copied text, \
    counterfeit offerings, or trademark misuse. Reply with a concise \
    assessment.";

/// One provider call. Seam over [`LlmClient`] so tests can count calls.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(
        &self,
        model: &str,
        system: &str,
        prompt: &str,
    ) -> Result<String, LlmError>;

    /// Provider name recorded on cache entries.
    fn provider_name(&self) -> String;
}

#[async_trait]
impl CompletionClient for LlmClient {
    async fn complete(
        &self,
        model: &str,
        system: &str,
        prompt: &str,
    ) -> Result<String, LlmError> {
        let request = ChatRequest::new(model)
            .message(Message::system(system))
            .message(Message::user(prompt))
            .max_tokens(1024);
        let response = self.chat_completion(request).await?;
        Ok(response.content)
    }

    fn provider_name(&self) -> String {
        self.provider().as_str().to_string()
    }
}

/// Seam the executor depends on.
#[async_trait]
pub trait CompletionGateway: Send + Sync {
    async fn completion(&self, prompt: &str) -> Result<String, EngineError>;
}

pub struct LlmGateway {
    cache: Arc<dyn ResponseCache>,
    client: Arc<dyn CompletionClient>,
    model: String,
    ttl: chrono::Duration,
}

impl LlmGateway {
    pub fn new(
        cache: Arc<dyn ResponseCache>,
        client: Arc<dyn CompletionClient>,
        model: impl Into<String>,
        ttl: std::time::Duration,
    ) -> Self {
        let ttl = chrono::Duration::from_std(ttl).unwrap_or_else(|_| {
            warn!(
                ttl_secs = ttl.as_secs(),
                "Cache TTL out of range, falling back to 24 hours"
            );
            chrono::Duration::hours(24)
        });
        Self {
            cache,
            client,
            model: model.into(),
            ttl,
        }
    }
}

#[async_trait]
impl CompletionGateway for LlmGateway {
    async fn completion(&self, prompt: &str) -> Result<String, EngineError> {
        // The key is the digest of the prompt exactly as given.
        let key = prompt_cache_key(prompt);

        // A hit returns the stored response unchanged and never refreshes
        // its expiry.
        match self.cache.get(&key).await {
            Ok(Some(entry)) => {
                debug!(cache_key = %key, model = %entry.model, "Cache hit for prompt");
                return Ok(entry.response);
            }
            Ok(None) => {}
            Err(e) => {
                warn!(cache_key = %key, error = %e, "Cache read failed, treating as miss");
            }
        }

        info!(
            cache_key = %key,
            model = %self.model,
            prompt_length = prompt.len(),
            "Cache miss, calling provider"
        );

        let response = self
            .client
            .complete(&self.model, SYSTEM_INSTRUCTION, prompt)
            .await
            .map_err(EngineError::Provider)?;

        let now = Utc::now();
        let entry = CacheEntry {
            cache_key: key.clone(),
            provider: self.client.provider_name(),
            model: self.model.clone(),
            response: response.clone(),
            created_at: now,
            expires_at: now + self.ttl,
        };
        if let Err(e) = self.cache.put(&entry).await {
            warn!(cache_key = %key, error = %e, "Failed to store completion in cache");
        }

        Ok(response)
    }
}
