//! Typed errors for the research pipeline.
//!
//! Uses `thiserror` for library errors (not `anyhow`) to keep the failure
//! classes explicit: configuration problems are fatal at run start, provider
//! and model failures are isolated per strategy or per article, and only
//! invariant violations abort a run.

use thiserror::Error;

use crate::types::Source;

/// Errors raised before any provider call is made.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required credential is absent for a selected provider or model.
    #[error("missing credential: {0}")]
    MissingCredential(&'static str),

    /// The query has no usable keywords.
    #[error("no keywords provided")]
    NoKeywords,

    /// No providers were enabled for the run.
    #[error("no providers enabled")]
    NoProviders,

    /// The requested date window is inverted or unparseable.
    #[error("invalid date window: {0}")]
    InvalidWindow(String),

    /// A configuration value failed to parse.
    #[error("invalid configuration value for {name}: {value}")]
    InvalidValue { name: &'static str, value: String },
}

/// How a provider call failed.
#[derive(Debug, Error)]
pub enum ProviderErrorKind {
    /// Network-level failure (connection refused, DNS, etc.)
    #[error("network error: {0}")]
    Network(String),

    /// Non-success HTTP status after retries were exhausted or skipped
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// The provider response could not be decoded
    #[error("response parse error: {0}")]
    Parse(String),

    /// The call exceeded its deadline
    #[error("timed out")]
    Timeout,
}

impl ProviderErrorKind {
    /// Rate limits, server errors, and timeouts are transient.
    pub fn is_transient(&self) -> bool {
        match self {
            ProviderErrorKind::Network(_) | ProviderErrorKind::Timeout => true,
            ProviderErrorKind::Status { status, .. } => *status == 429 || *status >= 500,
            ProviderErrorKind::Parse(_) => false,
        }
    }
}

/// A provider call failed for one strategy. Never aborts the pipeline;
/// the dispatcher records it and moves on with an empty result.
#[derive(Debug, Error)]
#[error("{provider} search failed (strategy {strategy}): {kind}")]
pub struct ProviderError {
    pub provider: Source,
    pub strategy: String,
    #[source]
    pub kind: ProviderErrorKind,
}

impl ProviderError {
    pub fn new(provider: Source, strategy: impl Into<String>, kind: ProviderErrorKind) -> Self {
        Self {
            provider,
            strategy: strategy.into(),
            kind,
        }
    }
}

/// A language-model call failed. Per-article policy applies: no date for the
/// date tier, neutral retention for the relevance tier.
#[derive(Debug, Error)]
pub enum ModelError {
    /// The upstream call failed (network, API error, exhausted retries)
    #[error("model call failed: {0}")]
    Call(String),

    /// The call exceeded its deadline
    #[error("model call timed out")]
    Timeout,
}

/// Errors that abort a whole run.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Fatal configuration problem detected before collection
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// An internal consistency check failed; this is a bug, not bad input
    #[error("invariant violation: {0}")]
    Invariant(String),

    /// The run was cancelled by an external signal
    #[error("run cancelled")]
    Cancelled,
}

/// Result alias for operations that can abort a run.
pub type Result<T> = std::result::Result<T, PipelineError>;
