//! Testing utilities including mock implementations.
//!
//! Deterministic stand-ins for the provider and model seams, so pipeline
//! logic can be exercised without network or model calls.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;

use crate::error::{ModelError, ProviderError, ProviderErrorKind};
use crate::strategies::StrategyPlan;
use crate::traits::{CompletionRequest, LanguageModel, ModelTier, SearchProvider};
use crate::types::{Article, Query, Source};

// =============================================================================
// MockProvider
// =============================================================================

/// A provider returning canned articles per strategy name.
pub struct MockProvider {
    source: Source,
    articles: RwLock<HashMap<String, Vec<Article>>>,
    errors: RwLock<HashMap<String, String>>,
    /// Strategy names in invocation order, for assertions
    calls: RwLock<Vec<String>>,
}

impl MockProvider {
    pub fn new(source: Source) -> Self {
        Self {
            source,
            articles: RwLock::new(HashMap::new()),
            errors: RwLock::new(HashMap::new()),
            calls: RwLock::new(Vec::new()),
        }
    }

    /// Canned articles for one strategy.
    pub fn with_articles(self, strategy: impl Into<String>, articles: Vec<Article>) -> Self {
        self.articles
            .write()
            .unwrap()
            .insert(strategy.into(), articles);
        self
    }

    /// Fail one strategy with the given message (an HTTP 500 by default).
    pub fn with_error(self, strategy: impl Into<String>, message: impl Into<String>) -> Self {
        self.errors
            .write()
            .unwrap()
            .insert(strategy.into(), message.into());
        self
    }

    /// Strategy names invoked so far.
    pub fn calls(&self) -> Vec<String> {
        self.calls.read().unwrap().clone()
    }
}

#[async_trait]
impl SearchProvider for MockProvider {
    fn source(&self) -> Source {
        self.source
    }

    async fn search(
        &self,
        _query: &Query,
        plan: &StrategyPlan,
        limit: usize,
    ) -> Result<Vec<Article>, ProviderError> {
        self.calls.write().unwrap().push(plan.name.clone());

        if let Some(message) = self.errors.read().unwrap().get(&plan.name) {
            return Err(ProviderError::new(
                self.source,
                &plan.name,
                ProviderErrorKind::Status {
                    status: 500,
                    body: message.clone(),
                },
            ));
        }

        let mut articles = self
            .articles
            .read()
            .unwrap()
            .get(&plan.name)
            .cloned()
            .unwrap_or_default();
        articles.truncate(limit);
        Ok(articles)
    }
}

// =============================================================================
// MockModel
// =============================================================================

/// A language model returning canned completions.
///
/// Date-tier and relevance-tier requests are told apart by their tier;
/// per-article overrides match a substring of the user prompt (which
/// contains the article title).
#[derive(Default)]
pub struct MockModel {
    date_response: RwLock<Option<String>>,
    relevance_response: RwLock<Option<String>>,
    date_overrides: RwLock<Vec<(String, String)>>,
    relevance_overrides: RwLock<Vec<(String, String)>>,
    fail_date: RwLock<bool>,
    fail_relevance: RwLock<bool>,
    date_calls: AtomicUsize,
    relevance_calls: AtomicUsize,
}

impl MockModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Default reply for every date-extraction request.
    pub fn with_date_response(self, response: impl Into<String>) -> Self {
        *self.date_response.write().unwrap() = Some(response.into());
        self
    }

    /// Default reply for every relevance request.
    pub fn with_relevance_response(self, response: impl Into<String>) -> Self {
        *self.relevance_response.write().unwrap() = Some(response.into());
        self
    }

    /// Date reply for requests whose prompt contains `needle`.
    pub fn with_date_for(self, needle: impl Into<String>, response: impl Into<String>) -> Self {
        self.date_overrides
            .write()
            .unwrap()
            .push((needle.into(), response.into()));
        self
    }

    /// Relevance reply for requests whose prompt contains `needle`.
    pub fn with_relevance_for(
        self,
        needle: impl Into<String>,
        response: impl Into<String>,
    ) -> Self {
        self.relevance_overrides
            .write()
            .unwrap()
            .push((needle.into(), response.into()));
        self
    }

    /// Make every date-extraction call fail.
    pub fn with_date_failure(self) -> Self {
        *self.fail_date.write().unwrap() = true;
        self
    }

    /// Make every relevance call fail.
    pub fn with_relevance_failure(self) -> Self {
        *self.fail_relevance.write().unwrap() = true;
        self
    }

    pub fn date_calls(&self) -> usize {
        self.date_calls.load(Ordering::SeqCst)
    }

    pub fn relevance_calls(&self) -> usize {
        self.relevance_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LanguageModel for MockModel {
    async fn complete(&self, request: CompletionRequest) -> Result<String, ModelError> {
        match request.tier {
            ModelTier::Fast => {
                self.date_calls.fetch_add(1, Ordering::SeqCst);
                if *self.fail_date.read().unwrap() {
                    return Err(ModelError::Call("mock date failure".into()));
                }
                for (needle, response) in self.date_overrides.read().unwrap().iter() {
                    if request.user.contains(needle) {
                        return Ok(response.clone());
                    }
                }
                Ok(self
                    .date_response
                    .read()
                    .unwrap()
                    .clone()
                    .unwrap_or_else(|| "none".to_string()))
            }
            ModelTier::Main => {
                self.relevance_calls.fetch_add(1, Ordering::SeqCst);
                if *self.fail_relevance.read().unwrap() {
                    return Err(ModelError::Call("mock relevance failure".into()));
                }
                for (needle, response) in self.relevance_overrides.read().unwrap().iter() {
                    if request.user.contains(needle) {
                        return Ok(response.clone());
                    }
                }
                Ok(self
                    .relevance_response
                    .read()
                    .unwrap()
                    .clone()
                    .unwrap_or_else(default_relevance_json))
            }
        }
    }
}

/// A serviceable mid-band verdict for tests that don't care about scores.
fn default_relevance_json() -> String {
    r#"{
        "relevance_score": 70,
        "relevance_reason": "mock verdict",
        "article_type": "news",
        "mentioned_keywords": [],
        "pertinent_keywords": [],
        "clinical_significance": "None",
        "regulatory_impact": "None",
        "market_impact": "None",
        "summary": "mock summary"
    }"#
    .to_string()
}

/// Shorthand for a relevance verdict with the given score.
pub fn verdict_json(score: u8) -> String {
    format!(
        r#"{{
        "relevance_score": {score},
        "relevance_reason": "scored by mock",
        "article_type": "news",
        "mentioned_keywords": ["keyword"],
        "pertinent_keywords": [],
        "clinical_significance": "None",
        "regulatory_impact": "None",
        "market_impact": "None",
        "summary": "mock summary"
    }}"#
    )
}
