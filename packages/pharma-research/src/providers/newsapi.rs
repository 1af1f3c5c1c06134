//! NewsAPI adapter for the `everything` endpoint.
//!
//! Quoted, OR-joined keywords in English, sorted by publication date. The
//! request window is clamped to the provider's maximum historical reach;
//! free plans reject `from` dates older than about a month.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, NaiveDate, Utc};
use serde::Deserialize;
use tracing::debug;

use crate::error::{ProviderError, ProviderErrorKind};
use crate::providers::send_with_retry;
use crate::security::SecretString;
use crate::strategies::StrategyPlan;
use crate::traits::SearchProvider;
use crate::types::{Article, Query, SearchMode, Source};

const EVERYTHING_URL: &str = "https://newsapi.org/v2/everything";

#[derive(Debug, Deserialize)]
struct NewsApiResponse {
    #[serde(default)]
    articles: Vec<NewsApiArticle>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NewsApiArticle {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    author: Option<String>,
    #[serde(default)]
    published_at: Option<String>,
}

/// NewsAPI search adapter.
pub struct NewsApiProvider {
    client: reqwest::Client,
    api_key: SecretString,
    timeout: Duration,
    max_age_days: i64,
}

impl NewsApiProvider {
    pub fn new(api_key: SecretString, timeout: Duration, max_age_days: i64) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            timeout,
            max_age_days,
        }
    }

    /// Primary strategy quotes each keyword as an exact phrase; the
    /// expanded variant drops the quotes for broader matching and lets
    /// dedup remove the overlap.
    fn build_query(query: &Query, broad: bool) -> String {
        let joiner = match query.mode {
            SearchMode::Cooccurrence => " AND ",
            _ => " OR ",
        };
        query
            .all_keywords()
            .iter()
            .map(|kw| {
                if broad {
                    kw.clone()
                } else {
                    format!("\"{kw}\"")
                }
            })
            .collect::<Vec<_>>()
            .join(joiner)
    }

    /// Clamp the window start to the provider's historical reach.
    fn clamp_window(&self, query: &Query) -> Option<(NaiveDate, NaiveDate)> {
        let oldest = Utc::now().date_naive() - ChronoDuration::days(self.max_age_days);
        let from = query.start_date.max(oldest);
        if from > query.end_date {
            return None;
        }
        Some((from, query.end_date))
    }
}

#[async_trait]
impl SearchProvider for NewsApiProvider {
    fn source(&self) -> Source {
        Source::Newsapi
    }

    async fn search(
        &self,
        query: &Query,
        plan: &StrategyPlan,
        limit: usize,
    ) -> Result<Vec<Article>, ProviderError> {
        let Some((from, to)) = self.clamp_window(query) else {
            debug!(
                start = %query.start_date,
                max_age_days = self.max_age_days,
                "requested window is entirely outside NewsAPI reach"
            );
            return Ok(Vec::new());
        };

        let q = Self::build_query(query, plan.broad);
        let page_size = limit.min(100).to_string();
        let from = from.format("%Y-%m-%d").to_string();
        let to = to.format("%Y-%m-%d").to_string();

        // Title-only mode maps onto the dedicated qInTitle parameter
        let keyword_param = match query.mode {
            SearchMode::TitleOnly => "qInTitle",
            _ => "q",
        };
        let params = [
            (keyword_param, q.as_str()),
            ("language", "en"),
            ("sortBy", "publishedAt"),
            ("pageSize", page_size.as_str()),
            ("from", from.as_str()),
            ("to", to.as_str()),
            ("apiKey", self.api_key.expose()),
        ];

        let response = send_with_retry(
            || {
                self.client
                    .get(EVERYTHING_URL)
                    .query(&params)
                    .timeout(self.timeout)
            },
            Source::Newsapi,
            &plan.name,
        )
        .await?;

        let news_response: NewsApiResponse = response.json().await.map_err(|e| {
            ProviderError::new(
                Source::Newsapi,
                &plan.name,
                ProviderErrorKind::Parse(e.to_string()),
            )
        })?;

        Ok(news_response
            .articles
            .into_iter()
            .filter_map(|a| normalize(a, &plan.name))
            .collect())
    }
}

/// Drop records without a title or URL; concatenate description and body.
fn normalize(raw: NewsApiArticle, strategy: &str) -> Option<Article> {
    let title = raw.title.filter(|t| !t.is_empty())?;
    let url = raw.url.filter(|u| !u.is_empty())?;

    let description = raw.description.unwrap_or_default();
    let body = raw.content.unwrap_or_default();
    let content = match (description.is_empty(), body.is_empty()) {
        (false, false) => format!("{description}\n\n{body}"),
        (false, true) => description,
        (true, _) => body,
    };

    let mut article = Article::new(title, content, url, Source::Newsapi, strategy)
        .with_authors(raw.author.unwrap_or_default());
    article.raw_date = raw.published_at.filter(|d| !d.is_empty());
    Some(article)
}
