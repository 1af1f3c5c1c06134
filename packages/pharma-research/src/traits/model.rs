//! Language model trait for the date-extraction and relevance tiers.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::ModelError;

/// Which model tier a completion should run on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelTier {
    /// Fast, cheap model (date extraction)
    Fast,
    /// Strong model (relevance analysis)
    Main,
}

/// A single chat completion request.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub tier: ModelTier,
    pub system: String,
    pub user: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Enforce a JSON object response where the API supports it
    pub json_mode: bool,
    pub timeout: Duration,
}

impl CompletionRequest {
    pub fn new(tier: ModelTier, system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            tier,
            system: system.into(),
            user: user.into(),
            temperature: 0.0,
            max_tokens: 1000,
            json_mode: false,
            timeout: Duration::from_secs(30),
        }
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn json_mode(mut self) -> Self {
        self.json_mode = true;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// A chat-capable language model.
///
/// Implementations return the raw completion text; response parsing (and
/// the tolerant parse ladder the relevance analyzer needs) lives with the
/// callers, so malformed model output can be handled per the retention
/// policy instead of surfacing as an error here.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<String, ModelError>;
}
