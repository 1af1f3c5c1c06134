//! Search provider trait for external article discovery.
//!
//! Each adapter wraps one provider's protocol (PubMed, Exa, Tavily,
//! NewsAPI) and normalizes its native response shape onto [`Article`].
//! Adding a provider means adding a [`Source`] variant plus an adapter
//! implementation; nothing else changes.

use async_trait::async_trait;

use crate::error::ProviderError;
use crate::strategies::StrategyPlan;
use crate::types::{Article, Query, Source};

/// One external search provider.
///
/// Adapters are stateless beyond their configured credentials, so a single
/// instance is safe to invoke concurrently across strategies. Rate
/// discipline (minimum inter-call intervals) is the adapter's own
/// responsibility.
///
/// # Error policy
///
/// A failed call returns a typed [`ProviderError`]; adapters never panic
/// and never leak provider exceptions past this boundary. The dispatcher
/// turns errors into empty results and records them for the run log.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Which provider this adapter fronts.
    fn source(&self) -> Source;

    /// Execute one strategy against the provider.
    ///
    /// `limit` caps the result count; the window and keywords come from
    /// `query`, the domain filter and mode variant from `plan`.
    async fn search(
        &self,
        query: &Query,
        plan: &StrategyPlan,
        limit: usize,
    ) -> Result<Vec<Article>, ProviderError>;
}
