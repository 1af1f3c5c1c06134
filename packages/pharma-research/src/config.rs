//! Run configuration: credentials, model names, thresholds, and timeouts.
//!
//! Configuration is captured once at engine construction and is immutable
//! for the lifetime of a run. Credentials are read from the process
//! environment; thresholds and timeouts have defaults overridable by
//! environment variables.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;
use crate::security::SecretString;
use crate::types::Source;

/// Domain allow-lists used by the Exa and Tavily strategy variants.
///
/// These are curated lists, treated as configuration rather than hard-coded
/// invariants; the defaults mirror the lists the strategies were tuned with.
#[derive(Debug, Clone)]
pub struct DomainConfig {
    /// Trusted domains for Exa's curated variants
    pub exa_curated: Vec<String>,
    /// News-heavy set for Tavily
    pub tavily_news: Vec<String>,
    /// Mixed news + clinical set for Tavily
    pub tavily_mixed: Vec<String>,
    /// Pharma-trade-press-heavy set for Tavily
    pub tavily_pharma: Vec<String>,
}

impl Default for DomainConfig {
    fn default() -> Self {
        let news = [
            "reuters.com",
            "bloomberg.com",
            "wsj.com",
            "ft.com",
            "medicalnewstoday.com",
        ];
        let pharma = [
            "pharmatimes.com",
            "fiercepharma.com",
            "biopharmadive.com",
            "pharmaceutical-technology.com",
            "drugdiscoverytoday.com",
        ];
        let clinical = ["pubmed.ncbi.nlm.nih.gov", "clinicaltrials.gov", "fda.gov"];

        let to_vec = |items: &[&str]| items.iter().map(|s| s.to_string()).collect::<Vec<_>>();

        Self {
            exa_curated: to_vec(&[&news[..], &pharma[..]].concat()),
            tavily_news: to_vec(&news),
            tavily_mixed: to_vec(&[&news[..], &clinical[..]].concat()),
            tavily_pharma: to_vec(&pharma),
        }
    }
}

/// Model identifiers for the two model tiers.
#[derive(Debug, Clone)]
pub struct ModelConfig {
    /// Strong model for relevance analysis
    pub main: String,
    /// Fast, cheap model for date extraction
    pub date_extraction: String,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            main: "gpt-4o-mini".to_string(),
            date_extraction: "gpt-3.5-turbo".to_string(),
        }
    }
}

/// Everything a pipeline run needs, captured immutably at start.
#[derive(Clone)]
pub struct ResearchConfig {
    pub openai_api_key: Option<SecretString>,
    pub openai_base_url: Option<String>,
    pub tavily_api_key: Option<SecretString>,
    pub newsapi_key: Option<SecretString>,
    pub exa_api_key: Option<SecretString>,
    /// Contact address the Entrez API asks clients to send
    pub pubmed_email: Option<String>,

    pub models: ModelConfig,
    pub domains: DomainConfig,

    /// Default minimum relevance score; a query may override it.
    /// The historical default drifted between 40 and 50 — it is explicit
    /// configuration here, defaulting to 40.
    pub min_score: u8,
    /// Title similarity at or above which articles are grouped as duplicates
    pub similarity_threshold: f64,
    pub max_results_per_source: usize,
    pub max_keywords: usize,

    /// Concurrent date-extraction model calls
    pub date_parallelism: usize,
    /// Concurrent relevance model calls
    pub relevance_parallelism: usize,
    /// Pause between relevance calls to respect model rate limits
    pub relevance_call_delay: Duration,

    pub provider_timeout: Duration,
    pub date_model_timeout: Duration,
    pub relevance_model_timeout: Duration,
    /// Optional whole-run soft deadline
    pub run_deadline: Option<Duration>,

    /// NewsAPI free plans only reach this far back; the window is clamped
    pub newsapi_max_age_days: i64,
    /// Minimum pause between PubMed calls (Entrez rate rule)
    pub pubmed_min_interval: Duration,

    /// Append-only metadata log location
    pub metadata_log_path: PathBuf,
    /// Session results kept in memory before eviction
    pub session_capacity: usize,
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            openai_api_key: None,
            openai_base_url: None,
            tavily_api_key: None,
            newsapi_key: None,
            exa_api_key: None,
            pubmed_email: None,
            models: ModelConfig::default(),
            domains: DomainConfig::default(),
            min_score: 40,
            similarity_threshold: 0.75,
            max_results_per_source: 50,
            max_keywords: 100,
            date_parallelism: 8,
            relevance_parallelism: 5,
            relevance_call_delay: Duration::from_millis(200),
            provider_timeout: Duration::from_secs(30),
            date_model_timeout: Duration::from_secs(10),
            relevance_model_timeout: Duration::from_secs(30),
            run_deadline: None,
            newsapi_max_age_days: 30,
            pubmed_min_interval: Duration::from_millis(350),
            metadata_log_path: PathBuf::from("alert_metadata.csv"),
            session_capacity: 10,
        }
    }
}

impl ResearchConfig {
    /// Read credentials and overrides from the process environment.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        config.openai_api_key = env_secret("OPENAI_API_KEY");
        config.openai_base_url = env_string("OPENAI_BASE_URL");
        config.tavily_api_key = env_secret("TAVILY_API_KEY");
        config.newsapi_key = env_secret("NEWSAPI_KEY");
        config.exa_api_key = env_secret("EXA_API_KEY");
        config.pubmed_email = env_string("PUBMED_EMAIL");

        if let Some(model) = env_string("PHARMA_MAIN_MODEL") {
            config.models.main = model;
        }
        if let Some(model) = env_string("PHARMA_DATE_MODEL") {
            config.models.date_extraction = model;
        }
        if let Some(score) = env_parse::<u8>("PHARMA_MIN_SCORE") {
            config.min_score = score.min(100);
        }
        if let Some(threshold) = env_parse::<f64>("PHARMA_SIMILARITY_THRESHOLD") {
            config.similarity_threshold = threshold.clamp(0.0, 1.0);
        }
        if let Some(limit) = env_parse::<usize>("PHARMA_MAX_RESULTS_PER_SOURCE") {
            config.max_results_per_source = limit;
        }
        if let Some(secs) = env_parse::<u64>("PHARMA_PROVIDER_TIMEOUT_SECS") {
            config.provider_timeout = Duration::from_secs(secs);
        }
        if let Some(path) = env_string("PHARMA_METADATA_LOG") {
            config.metadata_log_path = PathBuf::from(path);
        }

        config
    }

    /// Verify that every selected provider, and the model tiers, have the
    /// credentials they need. Fatal at run start, before any provider call.
    pub fn validate_for(&self, providers: &[Source]) -> Result<(), ConfigError> {
        if providers.is_empty() {
            return Err(ConfigError::NoProviders);
        }
        if self.openai_api_key.is_none() {
            return Err(ConfigError::MissingCredential("OPENAI_API_KEY"));
        }
        for provider in providers {
            match provider {
                Source::Tavily if self.tavily_api_key.is_none() => {
                    return Err(ConfigError::MissingCredential("TAVILY_API_KEY"));
                }
                Source::Newsapi if self.newsapi_key.is_none() => {
                    return Err(ConfigError::MissingCredential("NEWSAPI_KEY"));
                }
                Source::Exa if self.exa_api_key.is_none() => {
                    return Err(ConfigError::MissingCredential("EXA_API_KEY"));
                }
                // PubMed needs no key; the email parameter is optional
                _ => {}
            }
        }
        Ok(())
    }
}

impl fmt::Debug for ResearchConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResearchConfig")
            .field("openai_api_key", &self.openai_api_key.as_ref().map(|_| "[REDACTED]"))
            .field("tavily_api_key", &self.tavily_api_key.as_ref().map(|_| "[REDACTED]"))
            .field("newsapi_key", &self.newsapi_key.as_ref().map(|_| "[REDACTED]"))
            .field("exa_api_key", &self.exa_api_key.as_ref().map(|_| "[REDACTED]"))
            .field("models", &self.models)
            .field("min_score", &self.min_score)
            .field("similarity_threshold", &self.similarity_threshold)
            .field("max_results_per_source", &self.max_results_per_source)
            .finish_non_exhaustive()
    }
}

fn env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn env_secret(name: &str) -> Option<SecretString> {
    env_string(name).map(SecretString::new)
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    env_string(name).and_then(|v| v.parse().ok())
}
