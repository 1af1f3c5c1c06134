//! Minimal OpenAI-style chat completions client
//!
//! A clean client for OpenAI-compatible chat APIs with no domain-specific
//! logic. Supports chat completions, JSON response mode, per-request
//! timeouts, and retry with exponential backoff on transient failures.
//!
//! # Example
//!
//! ```rust,ignore
//! use openai_client::{ChatRequest, Message, OpenAIClient};
//!
//! let client = OpenAIClient::from_env()?;
//!
//! let response = client
//!     .chat_completion(
//!         ChatRequest::new("gpt-4o-mini")
//!             .message(Message::system("You are a research assistant."))
//!             .message(Message::user("Summarize this abstract..."))
//!             .temperature(0.1)
//!             .json_mode(),
//!     )
//!     .await?;
//! ```

pub mod error;
pub mod types;

pub use error::{OpenAIError, Result};
pub use types::*;

use std::time::Duration;

use rand::Rng;
use reqwest::Client;
use tracing::{debug, warn};

/// Maximum retry attempts for transient API failures.
const MAX_RETRIES: u32 = 3;

/// Base delay for exponential backoff.
const BACKOFF_BASE: Duration = Duration::from_millis(500);

/// Chat completions client.
#[derive(Clone)]
pub struct OpenAIClient {
    http_client: Client,
    api_key: String,
    base_url: String,
    timeout: Duration,
}

impl OpenAIClient {
    /// Create a new client with the given API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            http_client: Client::new(),
            api_key: api_key.into(),
            base_url: "https://api.openai.com/v1".to_string(),
            timeout: Duration::from_secs(30),
        }
    }

    /// Create from environment variable `OPENAI_API_KEY`.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| OpenAIError::Config("OPENAI_API_KEY not set".into()))?;
        Ok(Self::new(api_key))
    }

    /// Set a custom base URL (for Azure, proxies, etc.).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Set the per-request timeout (default 30s).
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Get the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Chat completion with retry on transient failures.
    ///
    /// Rate limits (429) and server errors (5xx) are retried up to
    /// `MAX_RETRIES` times with exponential backoff and jitter. Other
    /// errors return immediately.
    pub async fn chat_completion(&self, request: ChatRequest) -> Result<ChatResponse> {
        let mut attempt = 0;
        loop {
            match self.chat_completion_once(&request).await {
                Ok(response) => return Ok(response),
                Err(e) if e.is_transient() && attempt < MAX_RETRIES => {
                    let delay = backoff_delay(attempt);
                    warn!(
                        error = %e,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        "transient chat API failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Chat completion with a timeout override for this call only.
    pub async fn chat_completion_with_timeout(
        &self,
        request: ChatRequest,
        timeout: Duration,
    ) -> Result<ChatResponse> {
        let mut client = self.clone();
        client.timeout = timeout;
        client.chat_completion(request).await
    }

    async fn chat_completion_once(&self, request: &ChatRequest) -> Result<ChatResponse> {
        let start = std::time::Instant::now();

        let response = self
            .http_client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .timeout(self.timeout)
            .json(request)
            .send()
            .await
            .map_err(|e| OpenAIError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(OpenAIError::Api {
                status: status.as_u16(),
                message: error_text,
            });
        }

        let chat_response: types::ChatResponseRaw = response
            .json()
            .await
            .map_err(|e| OpenAIError::Parse(e.to_string()))?;

        let content = chat_response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| OpenAIError::Api {
                status: status.as_u16(),
                message: "no choices in response".into(),
            })?;

        debug!(
            model = %request.model,
            duration_ms = start.elapsed().as_millis() as u64,
            "chat completion"
        );

        Ok(ChatResponse {
            content,
            usage: chat_response.usage,
        })
    }
}

/// Exponential backoff with jitter: base * 2^attempt, plus up to 25% jitter.
fn backoff_delay(attempt: u32) -> Duration {
    let base = BACKOFF_BASE * 2u32.saturating_pow(attempt);
    let jitter = rand::thread_rng().gen_range(0..=base.as_millis() as u64 / 4);
    base + Duration::from_millis(jitter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_builder() {
        let client = OpenAIClient::new("sk-test")
            .with_base_url("https://custom.api.com")
            .with_timeout(Duration::from_secs(10));

        assert_eq!(client.base_url, "https://custom.api.com");
        assert_eq!(client.timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_backoff_grows() {
        let d0 = backoff_delay(0);
        let d2 = backoff_delay(2);
        assert!(d0 >= BACKOFF_BASE);
        assert!(d2 >= BACKOFF_BASE * 4);
        // jitter is bounded to a quarter of the base
        assert!(d2 <= BACKOFF_BASE * 4 + BACKOFF_BASE);
    }
}
