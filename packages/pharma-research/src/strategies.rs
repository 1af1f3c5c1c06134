//! Strategy generation: the query variants each provider runs.
//!
//! A strategy is a named variant of the same logical search, differing in
//! domain filter, search mode, or keyword composition. PubMed gets one
//! primary strategy; Exa varies by domain filter and keyword/neural mode;
//! Tavily varies by domain set; NewsAPI runs a primary (quoted phrases)
//! and an expanded (unquoted) variant, relying on dedup to remove overlap.

use crate::config::DomainConfig;
use crate::types::Source;

/// Exa's two retrieval modes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExaSearchType {
    #[default]
    Keyword,
    Neural,
}

impl ExaSearchType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExaSearchType::Keyword => "keyword",
            ExaSearchType::Neural => "neural",
        }
    }
}

/// One query variant to execute against a single provider.
#[derive(Debug, Clone)]
pub struct StrategyPlan {
    pub provider: Source,
    pub name: String,
    /// Domain allow-list; empty means the open web
    pub domains: Vec<String>,
    /// Keyword vs neural retrieval (Exa only)
    pub exa_type: ExaSearchType,
    /// Looser keyword composition (NewsAPI expanded variant)
    pub broad: bool,
}

impl StrategyPlan {
    fn new(provider: Source, name: &str) -> Self {
        Self {
            provider,
            name: name.to_string(),
            domains: Vec::new(),
            exa_type: ExaSearchType::Keyword,
            broad: false,
        }
    }

    fn with_domains(mut self, domains: &[String]) -> Self {
        self.domains = domains.to_vec();
        self
    }

    fn neural(mut self) -> Self {
        self.exa_type = ExaSearchType::Neural;
        self
    }

    fn broad(mut self) -> Self {
        self.broad = true;
        self
    }
}

/// Generate the strategy set for one provider, in declared execution order.
pub fn plan_strategies(provider: Source, domains: &DomainConfig) -> Vec<StrategyPlan> {
    match provider {
        Source::Pubmed => vec![StrategyPlan::new(provider, "primary")],
        Source::Exa => vec![
            StrategyPlan::new(provider, "keyword_curated").with_domains(&domains.exa_curated),
            StrategyPlan::new(provider, "neural_curated")
                .with_domains(&domains.exa_curated)
                .neural(),
            StrategyPlan::new(provider, "neural_open").neural(),
        ],
        Source::Tavily => vec![
            StrategyPlan::new(provider, "news_domains").with_domains(&domains.tavily_news),
            StrategyPlan::new(provider, "mixed_domains").with_domains(&domains.tavily_mixed),
            StrategyPlan::new(provider, "pharma_domains").with_domains(&domains.tavily_pharma),
        ],
        Source::Newsapi => vec![
            StrategyPlan::new(provider, "primary"),
            StrategyPlan::new(provider, "expanded").broad(),
        ],
    }
}
