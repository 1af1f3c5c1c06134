//! OpenAI-backed implementation of the [`LanguageModel`] trait.
//!
//! Routes the fast tier (date extraction) and the main tier (relevance
//! analysis) to the configured model names over one shared client.

use async_trait::async_trait;

use openai_client::{ChatRequest, Message, OpenAIClient, OpenAIError};

use crate::config::ResearchConfig;
use crate::error::{ConfigError, ModelError};
use crate::traits::{CompletionRequest, LanguageModel, ModelTier};

/// Chat client wrapper with per-tier model selection.
#[derive(Clone)]
pub struct OpenAiModel {
    client: OpenAIClient,
    main_model: String,
    fast_model: String,
}

impl OpenAiModel {
    pub fn new(client: OpenAIClient, main_model: String, fast_model: String) -> Self {
        Self {
            client,
            main_model,
            fast_model,
        }
    }

    /// Build from run configuration; the OpenAI key is required.
    pub fn from_config(config: &ResearchConfig) -> Result<Self, ConfigError> {
        let api_key = config
            .openai_api_key
            .as_ref()
            .ok_or(ConfigError::MissingCredential("OPENAI_API_KEY"))?;
        let mut client = OpenAIClient::new(api_key.expose());
        if let Some(base_url) = &config.openai_base_url {
            client = client.with_base_url(base_url.clone());
        }
        Ok(Self::new(
            client,
            config.models.main.clone(),
            config.models.date_extraction.clone(),
        ))
    }

    fn model_for(&self, tier: ModelTier) -> &str {
        match tier {
            ModelTier::Main => &self.main_model,
            ModelTier::Fast => &self.fast_model,
        }
    }
}

#[async_trait]
impl LanguageModel for OpenAiModel {
    async fn complete(&self, request: CompletionRequest) -> Result<String, ModelError> {
        let mut chat = ChatRequest::new(self.model_for(request.tier))
            .message(Message::system(request.system))
            .message(Message::user(request.user))
            .temperature(request.temperature)
            .max_tokens(request.max_tokens);
        if request.json_mode {
            chat = chat.json_mode();
        }

        let response = self
            .client
            .chat_completion_with_timeout(chat, request.timeout)
            .await
            .map_err(|e| match e {
                OpenAIError::Network(message) if message.contains("timed out") => {
                    ModelError::Timeout
                }
                other => ModelError::Call(other.to_string()),
            })?;

        Ok(response.content)
    }
}
