//! The article record that flows through the pipeline.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Which external provider produced an article.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Pubmed,
    Exa,
    Tavily,
    Newsapi,
}

impl Source {
    /// All providers, in canonical order.
    pub const ALL: [Source; 4] = [Source::Pubmed, Source::Exa, Source::Tavily, Source::Newsapi];

    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Pubmed => "pubmed",
            Source::Exa => "exa",
            Source::Tavily => "tavily",
            Source::Newsapi => "newsapi",
        }
    }
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Source {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pubmed" => Ok(Source::Pubmed),
            "exa" => Ok(Source::Exa),
            "tavily" => Ok(Source::Tavily),
            "newsapi" => Ok(Source::Newsapi),
            other => Err(format!("unknown provider: {other}")),
        }
    }
}

/// Which tier of the date resolver produced `resolved_date`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DateOrigin {
    /// Parsed from the provider-supplied date string
    Metadata,
    /// Extracted by the fast language model
    Model,
    /// Matched by a date pattern in URL, title, or content
    Regex,
    /// No tier succeeded
    #[default]
    None,
}

/// One article, mutable through the pipeline and owned by a single stage
/// at a time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Article {
    /// Stable fingerprint derived from the URL (fallback: title + source)
    pub id: String,
    pub title: String,
    /// Free text; truncated only at model-prompt boundaries, never mutated
    pub content: String,
    pub url: String,
    /// Author metadata when the provider supplies it
    #[serde(default)]
    pub authors: String,
    pub source: Source,
    /// Query variant that produced this article
    pub strategy: String,
    /// Provider-supplied date string, preserved verbatim
    pub raw_date: Option<String>,
    /// Set by the date resolver
    pub resolved_date: Option<NaiveDate>,
    #[serde(default)]
    pub date_origin: DateOrigin,
    /// Set by the relevance analyzer, present for every article reaching
    /// the score filter
    pub relevance_score: Option<u8>,
    #[serde(default)]
    pub relevance_reason: String,
    #[serde(default)]
    pub article_type: String,
    #[serde(default)]
    pub mentioned_keywords: Vec<String>,
    #[serde(default)]
    pub pertinent_keywords: Vec<String>,
    #[serde(default)]
    pub clinical_significance: String,
    #[serde(default)]
    pub regulatory_impact: String,
    #[serde(default)]
    pub market_impact: String,
    #[serde(default)]
    pub summary: String,
    /// Marked-up copy of the relevant content window, produced by the
    /// content enhancer
    pub highlighted_content: Option<String>,
}

impl Article {
    /// Create a new article as produced by a provider adapter.
    pub fn new(
        title: impl Into<String>,
        content: impl Into<String>,
        url: impl Into<String>,
        source: Source,
        strategy: impl Into<String>,
    ) -> Self {
        let title = title.into();
        let url = url.into();
        let id = fingerprint(&url, &title, source);
        Self {
            id,
            title,
            content: content.into(),
            url,
            authors: String::new(),
            source,
            strategy: strategy.into(),
            raw_date: None,
            resolved_date: None,
            date_origin: DateOrigin::None,
            relevance_score: None,
            relevance_reason: String::new(),
            article_type: String::new(),
            mentioned_keywords: Vec::new(),
            pertinent_keywords: Vec::new(),
            clinical_significance: String::new(),
            regulatory_impact: String::new(),
            market_impact: String::new(),
            summary: String::new(),
            highlighted_content: None,
        }
    }

    /// Set the provider-supplied date string.
    pub fn with_raw_date(mut self, raw_date: impl Into<String>) -> Self {
        let raw = raw_date.into();
        self.raw_date = if raw.is_empty() { None } else { Some(raw) };
        self
    }

    /// Set author metadata.
    pub fn with_authors(mut self, authors: impl Into<String>) -> Self {
        self.authors = authors.into();
        self
    }

    /// Score treating unanalyzed articles as zero; used only for ordering.
    pub fn score_or_zero(&self) -> u8 {
        self.relevance_score.unwrap_or(0)
    }
}

/// Stable fingerprint: SHA-256 of the URL, or of title + source when the
/// provider omitted the URL.
fn fingerprint(url: &str, title: &str, source: Source) -> String {
    let mut hasher = Sha256::new();
    if url.is_empty() {
        hasher.update(title.as_bytes());
        hasher.update([0x1f]);
        hasher.update(source.as_str().as_bytes());
    } else {
        hasher.update(url.as_bytes());
    }
    let digest = hasher.finalize();
    digest.iter().map(|b| format!("{b:02x}")).collect()
}
