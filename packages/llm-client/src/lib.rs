//! Provider-agnostic LLM REST client.
//!
//! A minimal chat-completion client that speaks to either the OpenAI or the
//! Anthropic API behind one request/response shape. No domain logic lives
//! here — prompt construction, caching, and retries are the caller's
//! concern.
//!
//! # Example
//!
//! ```rust,ignore
//! use llm_client::{ChatRequest, LlmClient, Message, Provider};
//!
//! let client = LlmClient::new(Provider::OpenAi, api_key);
//!
//! let response = client
//!     .chat_completion(
//!         ChatRequest::new("gpt-4o")
//!             .message(Message::system("You are a helpful assistant."))
//!             .message(Message::user("Hello!")),
//!     )
//!     .await?;
//! ```

pub mod error;
pub mod types;

pub use error::{LlmError, Result};
pub use types::{ChatRequest, ChatResponse, Message};

use std::time::Duration;

use reqwest::Client;
use tracing::debug;

use types::{AnthropicRequest, AnthropicResponse, OpenAiChatResponse};

/// Request timeout for provider calls.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Anthropic API version header value.
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Supported completion providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    OpenAi,
    Anthropic,
}

impl Provider {
    /// Parse a provider name, case-insensitive.
    pub fn parse(name: &str) -> Result<Self> {
        match name.to_ascii_lowercase().as_str() {
            "openai" => Ok(Provider::OpenAi),
            "anthropic" => Ok(Provider::Anthropic),
            other => Err(LlmError::Config(format!("unknown provider: {other}"))),
        }
    }

    /// Canonical provider name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::OpenAi => "openai",
            Provider::Anthropic => "anthropic",
        }
    }

    fn default_base_url(&self) -> &'static str {
        match self {
            Provider::OpenAi => "https://api.openai.com/v1",
            Provider::Anthropic => "https://api.anthropic.com/v1",
        }
    }

    /// Environment variable holding this provider's API key.
    pub fn api_key_env(&self) -> &'static str {
        match self {
            Provider::OpenAi => "OPENAI_API_KEY",
            Provider::Anthropic => "ANTHROPIC_API_KEY",
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Chat completion client for a single provider.
#[derive(Clone)]
pub struct LlmClient {
    http_client: Client,
    provider: Provider,
    api_key: String,
    base_url: String,
}

impl LlmClient {
    /// Create a new client for the given provider and API key.
    pub fn new(provider: Provider, api_key: impl Into<String>) -> Self {
        Self {
            http_client: Client::new(),
            provider,
            api_key: api_key.into(),
            base_url: provider.default_base_url().to_string(),
        }
    }

    /// Create from the provider's conventional environment variable.
    pub fn from_env(provider: Provider) -> Result<Self> {
        let var = provider.api_key_env();
        let api_key = std::env::var(var)
            .map_err(|_| LlmError::Config(format!("{var} not set")))?;
        Ok(Self::new(provider, api_key))
    }

    /// Set a custom base URL (for proxies or compatible endpoints).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// The provider this client talks to.
    pub fn provider(&self) -> Provider {
        self.provider
    }

    /// Issue one chat completion call.
    ///
    /// Returns the completion text or an error; no retries are attempted.
    pub async fn chat_completion(&self, request: ChatRequest) -> Result<ChatResponse> {
        debug!(
            provider = %self.provider,
            model = %request.model,
            messages = request.messages.len(),
            "Sending chat completion request"
        );
        match self.provider {
            Provider::OpenAi => self.openai_completion(request).await,
            Provider::Anthropic => self.anthropic_completion(request).await,
        }
    }

    async fn openai_completion(&self, request: ChatRequest) -> Result<ChatResponse> {
        let url = format!("{}/chat/completions", self.base_url);
        let response = self
            .http_client
            .post(&url)
            .timeout(REQUEST_TIMEOUT)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| LlmError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Api(format!("HTTP {status}: {body}")));
        }

        let parsed: OpenAiChatResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Parse(e.to_string()))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| LlmError::Parse("response contained no choices".into()))?;

        Ok(ChatResponse {
            content,
            model: parsed.model,
        })
    }

    async fn anthropic_completion(&self, request: ChatRequest) -> Result<ChatResponse> {
        let (system, messages) = request.split_system();
        let body = AnthropicRequest {
            model: request.model,
            // Anthropic requires max_tokens on every request
            max_tokens: request.max_tokens.unwrap_or(1024),
            system,
            messages,
            temperature: request.temperature,
        };

        let url = format!("{}/messages", self.base_url);
        let response = self
            .http_client
            .post(&url)
            .timeout(REQUEST_TIMEOUT)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Api(format!("HTTP {status}: {body}")));
        }

        let parsed: AnthropicResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Parse(e.to_string()))?;

        let content = parsed
            .content
            .into_iter()
            .find(|block| block.kind == "text")
            .and_then(|block| block.text)
            .ok_or_else(|| LlmError::Parse("response contained no text block".into()))?;

        Ok(ChatResponse {
            content,
            model: parsed.model,
        })
    }
}
