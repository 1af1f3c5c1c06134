//! Exa adapter using the combined search-and-contents endpoint.
//!
//! One POST returns both result metadata and page text, so no second
//! fetch step is needed. Result dates come from provider metadata and are
//! often missing; the date resolver fills the gap downstream.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{ProviderError, ProviderErrorKind};
use crate::providers::send_with_retry;
use crate::security::SecretString;
use crate::strategies::{ExaSearchType, StrategyPlan};
use crate::traits::SearchProvider;
use crate::types::{Article, Query, SearchMode, Source};

const SEARCH_URL: &str = "https://api.exa.ai/search";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ExaRequest {
    query: String,
    #[serde(rename = "type")]
    search_type: String,
    num_results: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    include_domains: Vec<String>,
    contents: ExaContents,
}

#[derive(Debug, Serialize)]
struct ExaContents {
    text: bool,
}

#[derive(Debug, Deserialize)]
struct ExaResponse {
    #[serde(default)]
    results: Vec<ExaResult>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExaResult {
    url: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    published_date: Option<String>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    author: Option<String>,
}

/// Exa search adapter.
pub struct ExaProvider {
    client: reqwest::Client,
    api_key: SecretString,
    timeout: Duration,
}

impl ExaProvider {
    pub fn new(api_key: SecretString, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            timeout,
        }
    }

    /// Keyword mode gets a boolean expression; neural mode gets a natural
    /// phrase, which is what the embedding search is tuned for.
    fn build_query(query: &Query, search_type: ExaSearchType) -> String {
        let keywords = query.all_keywords();
        match search_type {
            ExaSearchType::Keyword => {
                let joiner = match query.mode {
                    SearchMode::Cooccurrence => " AND ",
                    _ => " OR ",
                };
                keywords.join(joiner)
            }
            ExaSearchType::Neural => match query.mode {
                SearchMode::Cooccurrence => format!(
                    "Pharmaceutical news covering {} together",
                    keywords.join(" and ")
                ),
                _ => format!(
                    "Latest pharmaceutical and medical news about {}",
                    keywords.join(", ")
                ),
            },
        }
    }
}

#[async_trait]
impl SearchProvider for ExaProvider {
    fn source(&self) -> Source {
        Source::Exa
    }

    async fn search(
        &self,
        query: &Query,
        plan: &StrategyPlan,
        limit: usize,
    ) -> Result<Vec<Article>, ProviderError> {
        let request = ExaRequest {
            query: Self::build_query(query, plan.exa_type),
            search_type: plan.exa_type.as_str().to_string(),
            num_results: limit,
            include_domains: plan.domains.clone(),
            contents: ExaContents { text: true },
        };

        let response = send_with_retry(
            || {
                self.client
                    .post(SEARCH_URL)
                    .header("x-api-key", self.api_key.expose())
                    .header("Content-Type", "application/json")
                    .timeout(self.timeout)
                    .json(&request)
            },
            Source::Exa,
            &plan.name,
        )
        .await?;

        let exa_response: ExaResponse = response.json().await.map_err(|e| {
            ProviderError::new(
                Source::Exa,
                &plan.name,
                ProviderErrorKind::Parse(e.to_string()),
            )
        })?;

        Ok(exa_response
            .results
            .into_iter()
            .filter_map(|r| {
                // Skip records whose URL does not parse
                let url = Url::parse(&r.url).ok()?;
                let mut article = Article::new(
                    r.title.unwrap_or_default(),
                    r.text.unwrap_or_default(),
                    url,
                    Source::Exa,
                    &plan.name,
                )
                .with_authors(r.author.unwrap_or_default());
                article.raw_date = r.published_date.filter(|d| !d.is_empty());
                Some(article)
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn query(mode: SearchMode) -> Query {
        Query::new(
            vec!["orgovyx".into(), "relugolix".into()],
            NaiveDate::from_ymd_opt(2024, 10, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 10, 17).unwrap(),
        )
        .unwrap()
        .with_mode(mode)
    }

    #[test]
    fn keyword_query_is_boolean() {
        let text = ExaProvider::build_query(&query(SearchMode::Standard), ExaSearchType::Keyword);
        assert_eq!(text, "orgovyx OR relugolix");

        let text =
            ExaProvider::build_query(&query(SearchMode::Cooccurrence), ExaSearchType::Keyword);
        assert_eq!(text, "orgovyx AND relugolix");
    }

    #[test]
    fn neural_query_is_a_phrase() {
        let text = ExaProvider::build_query(&query(SearchMode::Standard), ExaSearchType::Neural);
        assert!(text.contains("orgovyx, relugolix"));
        assert!(!text.contains(" OR "));
    }

    #[test]
    fn request_serializes_contract_fields() {
        let request = ExaRequest {
            query: "q".into(),
            search_type: "neural".into(),
            num_results: 10,
            include_domains: vec!["fda.gov".into()],
            contents: ExaContents { text: true },
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["type"], "neural");
        assert_eq!(json["numResults"], 10);
        assert_eq!(json["includeDomains"][0], "fda.gov");
        assert_eq!(json["contents"]["text"], true);
    }

    #[test]
    fn empty_domain_list_is_omitted() {
        let request = ExaRequest {
            query: "q".into(),
            search_type: "keyword".into(),
            num_results: 10,
            include_domains: vec![],
            contents: ExaContents { text: true },
        };
        let json = serde_json::to_value(&request).unwrap();
        assert!(json.get("includeDomains").is_none());
    }

    #[test]
    fn response_normalizes_missing_fields() {
        let raw = r#"{"results": [
            {"url": "https://ex.com/a", "title": "A", "publishedDate": "2024-10-02", "text": "body"},
            {"url": "https://ex.com/b"},
            {"url": ""}
        ]}"#;
        let parsed: ExaResponse = serde_json::from_str(raw).unwrap();
        let articles: Vec<Article> = parsed
            .results
            .into_iter()
            .filter_map(|r| {
                let url = Url::parse(&r.url).ok()?;
                let mut a = Article::new(
                    r.title.unwrap_or_default(),
                    r.text.unwrap_or_default(),
                    url,
                    Source::Exa,
                    "neural_open",
                );
                a.raw_date = r.published_date.filter(|d| !d.is_empty());
                Some(a)
            })
            .collect();

        assert_eq!(articles.len(), 2);
        assert_eq!(articles[0].raw_date.as_deref(), Some("2024-10-02"));
        assert!(articles[1].raw_date.is_none());
        assert!(articles[1].title.is_empty());
    }
}
