//! Pharmaceutical-news research engine.
//!
//! Given keywords, a date window, and a search mode, the engine consults
//! several external information sources in parallel and transforms their
//! heterogeneous responses into a ranked, deduplicated, model-annotated
//! article list.
//!
//! # Pipeline
//!
//! 1. Multi-source collection with per-provider strategy fan-out
//! 2. Near-duplicate detection and representative selection
//! 3. Date extraction (metadata → model → pattern) and window filtering
//! 4. Relevance scoring via a strong model, with neutral retention when
//!    the verdict cannot be parsed
//! 5. Keyword marking and final ordering
//! 6. Per-run metadata logging for strategy effectiveness analysis
//!
//! # Usage
//!
//! ```rust,ignore
//! use pharma_research::{Engine, Query, ResearchConfig};
//!
//! let config = ResearchConfig::from_env();
//! let engine = Engine::from_config(config)?;
//!
//! let query = Query::new(keywords, start, end)?;
//! let response = engine.run(query).await;
//! println!("{} articles kept", response.workflow_stats.kept);
//! ```
//!
//! # Modules
//!
//! - [`traits`] - Core trait abstractions (SearchProvider, LanguageModel)
//! - [`types`] - Article, query, and statistics types
//! - [`providers`] - Provider adapters (PubMed, Exa, Tavily, NewsAPI)
//! - [`strategies`] - Query-variant generation per provider
//! - [`pipeline`] - The staged pipeline and its orchestrator
//! - [`metadata`] - Append-only run log and effectiveness analysis
//! - [`testing`] - Mock implementations for testing

pub mod ai;
pub mod config;
pub mod error;
pub mod metadata;
pub mod pipeline;
pub mod providers;
pub mod response;
pub mod security;
pub mod session;
pub mod strategies;
pub mod testing;
pub mod traits;
pub mod types;

// Re-export core types at crate root
pub use config::{DomainConfig, ModelConfig, ResearchConfig};
pub use error::{
    ConfigError, ModelError, PipelineError, ProviderError, ProviderErrorKind, Result,
};
pub use pipeline::{Engine, EngineBuilder};
pub use response::{ArticleResult, ResearchResponse};
pub use session::SessionStore;
pub use traits::{CompletionRequest, LanguageModel, ModelTier, SearchProvider};
pub use types::{
    Article, DateOrigin, PhaseTimings, ProviderStats, Query, RunState, RunStats, ScoreBands,
    SearchMode, Source, StrategyStats,
};

// Re-export providers
pub use providers::{ExaProvider, NewsApiProvider, PubmedProvider, TavilyProvider};

// Re-export the run record machinery
pub use metadata::{RunRecord, RunRecorder};
