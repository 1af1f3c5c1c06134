//! Tavily adapter.
//!
//! Single POST against the search endpoint with `advanced` depth and an
//! allow-listed domain set. The `days` parameter is derived from the
//! requested window; results frequently lack dates.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::{ProviderError, ProviderErrorKind};
use crate::providers::send_with_retry;
use crate::security::SecretString;
use crate::strategies::StrategyPlan;
use crate::traits::SearchProvider;
use crate::types::{Article, Query, SearchMode, Source};

const SEARCH_URL: &str = "https://api.tavily.com/search";

#[derive(Debug, Serialize)]
struct TavilyRequest {
    query: String,
    search_depth: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    include_domains: Vec<String>,
    max_results: usize,
    days: i64,
}

#[derive(Debug, Deserialize)]
struct TavilyResponse {
    #[serde(default)]
    results: Vec<TavilyResult>,
}

#[derive(Debug, Deserialize)]
struct TavilyResult {
    url: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    published_date: Option<String>,
}

/// Tavily search adapter.
pub struct TavilyProvider {
    client: reqwest::Client,
    api_key: SecretString,
    timeout: Duration,
}

impl TavilyProvider {
    pub fn new(api_key: SecretString, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            timeout,
        }
    }

    fn build_query(query: &Query) -> String {
        let joiner = match query.mode {
            SearchMode::Cooccurrence => " AND ",
            _ => " OR ",
        };
        query.all_keywords().join(joiner)
    }

    /// Tavily's `days` means "this many days back from today", so it is
    /// measured from the window start, not the window width.
    fn days_back(query: &Query) -> i64 {
        let today = Utc::now().date_naive();
        (today - query.start_date).num_days().max(1)
    }
}

#[async_trait]
impl SearchProvider for TavilyProvider {
    fn source(&self) -> Source {
        Source::Tavily
    }

    async fn search(
        &self,
        query: &Query,
        plan: &StrategyPlan,
        limit: usize,
    ) -> Result<Vec<Article>, ProviderError> {
        let request = TavilyRequest {
            query: Self::build_query(query),
            search_depth: "advanced".to_string(),
            include_domains: plan.domains.clone(),
            max_results: limit,
            days: Self::days_back(query),
        };

        let response = send_with_retry(
            || {
                self.client
                    .post(SEARCH_URL)
                    .header("Content-Type", "application/json")
                    .header("Authorization", format!("Bearer {}", self.api_key.expose()))
                    .timeout(self.timeout)
                    .json(&request)
            },
            Source::Tavily,
            &plan.name,
        )
        .await?;

        let tavily_response: TavilyResponse = response.json().await.map_err(|e| {
            ProviderError::new(
                Source::Tavily,
                &plan.name,
                ProviderErrorKind::Parse(e.to_string()),
            )
        })?;

        Ok(tavily_response
            .results
            .into_iter()
            .filter(|r| !r.url.is_empty())
            .map(|r| {
                let mut article =
                    Article::new(r.title, r.content, r.url, Source::Tavily, &plan.name);
                article.raw_date = r.published_date.filter(|d| !d.is_empty());
                article
            })
            .collect())
    }
}
