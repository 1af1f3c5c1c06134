//! Error types for the chat client.

use thiserror::Error;

/// Result type for chat client operations.
pub type Result<T> = std::result::Result<T, OpenAIError>;

/// Chat client errors.
#[derive(Debug, Error)]
pub enum OpenAIError {
    /// Configuration error (missing API key, invalid settings)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Network error (connection failed, timeout)
    #[error("Network error: {0}")]
    Network(String),

    /// API error (non-2xx response, rate limit, invalid request)
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Parse error (invalid JSON, unexpected response format)
    #[error("Parse error: {0}")]
    Parse(String),
}

impl OpenAIError {
    /// Transient errors are worth retrying: rate limits, server-side
    /// failures, and network-level problems.
    pub fn is_transient(&self) -> bool {
        match self {
            OpenAIError::Network(_) => true,
            OpenAIError::Api { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}
