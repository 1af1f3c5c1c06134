//! The JSON response returned to callers.

use serde::{Deserialize, Serialize};

use crate::types::{Article, RunStats, Source};

/// One article as presented to the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArticleResult {
    pub title: String,
    pub url: String,
    pub source: Source,
    pub strategy: String,
    /// Resolved date in ISO form, when known
    pub date: Option<String>,
    pub relevance_score: u8,
    pub relevance_reason: String,
    pub article_type: String,
    pub mentioned_keywords: Vec<String>,
    pub pertinent_keywords: Vec<String>,
    pub clinical_significance: String,
    pub regulatory_impact: String,
    pub market_impact: String,
    pub summary: String,
    pub highlighted_content: Option<String>,
}

impl From<&Article> for ArticleResult {
    fn from(article: &Article) -> Self {
        Self {
            title: article.title.clone(),
            url: article.url.clone(),
            source: article.source,
            strategy: article.strategy.clone(),
            date: article.resolved_date.map(|d| d.to_string()),
            relevance_score: article.score_or_zero(),
            relevance_reason: article.relevance_reason.clone(),
            article_type: article.article_type.clone(),
            mentioned_keywords: article.mentioned_keywords.clone(),
            pertinent_keywords: article.pertinent_keywords.clone(),
            clinical_significance: article.clinical_significance.clone(),
            regulatory_impact: article.regulatory_impact.clone(),
            market_impact: article.market_impact.clone(),
            summary: article.summary.clone(),
            highlighted_content: article.highlighted_content.clone(),
        }
    }
}

/// The full run response: ranked results, workflow statistics, and the
/// session identifier for follow-up exports. `error` is present only on
/// failed runs; partial results are always included.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchResponse {
    pub success: bool,
    pub results: Vec<ArticleResult>,
    pub workflow_stats: RunStats,
    pub session_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
