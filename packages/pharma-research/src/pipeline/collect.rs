//! Multi-source collection with per-provider strategy fan-out.
//!
//! Distinct providers run in parallel; strategies within a provider run
//! sequentially to respect per-provider rate discipline. Every strategy
//! outcome is recorded verbatim for the run log, including failures,
//! which never abort the other strategies.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::ResearchConfig;
use crate::strategies::plan_strategies;
use crate::traits::SearchProvider;
use crate::types::{Article, Query, Source, StrategyStats};

/// Result of the collection phase.
#[derive(Debug, Default)]
pub struct CollectionOutcome {
    /// Merged articles with identical fingerprints collapsed, first
    /// observation wins
    pub articles: Vec<Article>,
    /// Strategy rows per provider, in declared execution order
    pub strategies: BTreeMap<Source, Vec<StrategyStats>>,
    /// Wall-clock seconds per provider
    pub provider_elapsed: BTreeMap<Source, f64>,
    /// Ids of merged articles another strategy also produced
    pub duplicated_ids: std::collections::HashSet<String>,
    /// Short error descriptions for the run log
    pub errors: Vec<String>,
}

/// Run every enabled provider's strategy set and merge the results.
pub async fn collect_articles(
    providers: &[Arc<dyn SearchProvider>],
    query: &Query,
    config: &ResearchConfig,
    cancel: &CancellationToken,
) -> CollectionOutcome {
    let mut handles = Vec::new();

    for provider in providers {
        if !query.providers.contains(&provider.source()) {
            continue;
        }
        let provider = Arc::clone(provider);
        let query = query.clone();
        let domains = config.domains.clone();
        let limit = config.max_results_per_source;
        let cancel = cancel.clone();

        handles.push(tokio::spawn(async move {
            run_provider(provider, &query, domains, limit, cancel).await
        }));
    }

    let mut outcome = CollectionOutcome::default();
    let mut per_provider: Vec<ProviderCollection> = Vec::new();

    for handle in handles {
        match handle.await {
            Ok(collection) => per_provider.push(collection),
            Err(e) => {
                warn!(error = %e, "provider task panicked");
                outcome.errors.push(format!("provider task failed: {e}"));
            }
        }
    }

    // Merge in canonical provider order so identical inputs produce
    // identical output ordering regardless of task completion order.
    per_provider.sort_by_key(|c| c.provider);

    let mut seen: HashMap<String, Source> = HashMap::new();
    for collection in per_provider {
        let mut strategy_rows = collection.strategies;
        for (strategy_index, articles) in collection.articles.into_iter().enumerate() {
            for article in articles {
                match seen.get(&article.id) {
                    None => {
                        seen.insert(article.id.clone(), article.source);
                        outcome.articles.push(article);
                    }
                    Some(first_source) => {
                        // Tie-break: first observation wins; the duplicate
                        // counts against the later strategy.
                        outcome.duplicated_ids.insert(article.id.clone());
                        let row = &mut strategy_rows[strategy_index];
                        if *first_source == article.source {
                            row.cross_strategy_duplicates += 1;
                        } else {
                            row.cross_provider_duplicates += 1;
                        }
                    }
                }
            }
        }
        for row in &strategy_rows {
            if let Some(error) = &row.error {
                outcome
                    .errors
                    .push(format!("{}/{}: {error}", collection.provider, row.strategy));
            }
        }
        outcome
            .provider_elapsed
            .insert(collection.provider, collection.elapsed_seconds);
        outcome.strategies.insert(collection.provider, strategy_rows);
    }

    info!(
        articles = outcome.articles.len(),
        providers = outcome.strategies.len(),
        "collection complete"
    );
    outcome
}

struct ProviderCollection {
    provider: Source,
    /// Articles per strategy, parallel to `strategies`
    articles: Vec<Vec<Article>>,
    strategies: Vec<StrategyStats>,
    elapsed_seconds: f64,
}

async fn run_provider(
    provider: Arc<dyn SearchProvider>,
    query: &Query,
    domains: crate::config::DomainConfig,
    limit: usize,
    cancel: CancellationToken,
) -> ProviderCollection {
    let source = provider.source();
    let provider_start = Instant::now();
    let mut articles = Vec::new();
    let mut strategies = Vec::new();

    for plan in plan_strategies(source, &domains) {
        let mut row = StrategyStats {
            strategy: plan.name.clone(),
            ..Default::default()
        };

        if cancel.is_cancelled() {
            row.error = Some("cancelled".to_string());
            articles.push(Vec::new());
            strategies.push(row);
            continue;
        }

        let start = Instant::now();
        let result = tokio::select! {
            result = provider.search(query, &plan, limit) => result,
            _ = cancel.cancelled() => {
                row.elapsed_seconds = start.elapsed().as_secs_f64();
                row.error = Some("cancelled".to_string());
                articles.push(Vec::new());
                strategies.push(row);
                continue;
            }
        };
        row.elapsed_seconds = start.elapsed().as_secs_f64();

        match result {
            Ok(batch) => {
                info!(
                    provider = %source,
                    strategy = %plan.name,
                    retrieved = batch.len(),
                    "strategy complete"
                );
                row.retrieved = batch.len();
                articles.push(batch);
            }
            Err(e) => {
                warn!(provider = %source, strategy = %plan.name, error = %e, "strategy failed");
                row.error = Some(e.kind.to_string());
                articles.push(Vec::new());
            }
        }
        strategies.push(row);
    }

    ProviderCollection {
        provider: source,
        articles,
        strategies,
        elapsed_seconds: provider_start.elapsed().as_secs_f64(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockProvider;
    use chrono::NaiveDate;

    fn query(providers: Vec<Source>) -> Query {
        Query::new(
            vec!["keytruda".into()],
            NaiveDate::from_ymd_opt(2024, 10, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 10, 17).unwrap(),
        )
        .unwrap()
        .with_providers(providers)
    }

    fn article(title: &str, url: &str, source: Source) -> Article {
        Article::new(title, "content", url, source, "x")
    }

    #[tokio::test]
    async fn merges_providers_and_tags_strategies() {
        let tavily = MockProvider::new(Source::Tavily)
            .with_articles("news_domains", vec![article("A", "https://t.com/a", Source::Tavily)])
            .with_articles("mixed_domains", vec![article("B", "https://t.com/b", Source::Tavily)]);
        let providers: Vec<Arc<dyn SearchProvider>> = vec![Arc::new(tavily)];

        let outcome = collect_articles(
            &providers,
            &query(vec![Source::Tavily]),
            &ResearchConfig::default(),
            &CancellationToken::new(),
        )
        .await;

        assert_eq!(outcome.articles.len(), 2);
        let rows = &outcome.strategies[&Source::Tavily];
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].retrieved, 1);
        assert_eq!(rows[1].retrieved, 1);
        assert_eq!(rows[2].retrieved, 0);
    }

    #[tokio::test]
    async fn first_observed_url_wins_and_duplicate_counts_against_later_strategy() {
        let tavily = MockProvider::new(Source::Tavily)
            .with_articles(
                "news_domains",
                vec![article("Same story", "https://t.com/same", Source::Tavily)],
            )
            .with_articles(
                "mixed_domains",
                vec![article("Same story again", "https://t.com/same", Source::Tavily)],
            );
        let providers: Vec<Arc<dyn SearchProvider>> = vec![Arc::new(tavily)];

        let outcome = collect_articles(
            &providers,
            &query(vec![Source::Tavily]),
            &ResearchConfig::default(),
            &CancellationToken::new(),
        )
        .await;

        assert_eq!(outcome.articles.len(), 1);
        assert_eq!(outcome.articles[0].strategy, "news_domains");
        let rows = &outcome.strategies[&Source::Tavily];
        assert_eq!(rows[1].cross_strategy_duplicates, 1);
        assert_eq!(rows[1].cross_provider_duplicates, 0);
    }

    #[tokio::test]
    async fn cross_provider_duplicates_attributed_to_later_provider() {
        let exa = MockProvider::new(Source::Exa).with_articles(
            "keyword_curated",
            vec![article("Story", "https://shared.com/story", Source::Exa)],
        );
        let tavily = MockProvider::new(Source::Tavily).with_articles(
            "news_domains",
            vec![article("Story", "https://shared.com/story", Source::Tavily)],
        );
        let providers: Vec<Arc<dyn SearchProvider>> = vec![Arc::new(exa), Arc::new(tavily)];

        let outcome = collect_articles(
            &providers,
            &query(vec![Source::Exa, Source::Tavily]),
            &ResearchConfig::default(),
            &CancellationToken::new(),
        )
        .await;

        // Exa precedes Tavily in canonical order, so its copy wins
        assert_eq!(outcome.articles.len(), 1);
        assert_eq!(outcome.articles[0].source, Source::Exa);
        let tavily_rows = &outcome.strategies[&Source::Tavily];
        assert_eq!(tavily_rows[0].cross_provider_duplicates, 1);
    }

    #[tokio::test]
    async fn failed_strategy_records_error_and_others_continue() {
        let tavily = MockProvider::new(Source::Tavily)
            .with_error("news_domains", "HTTP 500: internal error")
            .with_articles("mixed_domains", vec![article("B", "https://t.com/b", Source::Tavily)]);
        let providers: Vec<Arc<dyn SearchProvider>> = vec![Arc::new(tavily)];

        let outcome = collect_articles(
            &providers,
            &query(vec![Source::Tavily]),
            &ResearchConfig::default(),
            &CancellationToken::new(),
        )
        .await;

        assert_eq!(outcome.articles.len(), 1);
        let rows = &outcome.strategies[&Source::Tavily];
        assert!(rows[0].error.is_some());
        assert_eq!(rows[0].retrieved, 0);
        assert_eq!(rows[1].retrieved, 1);
        assert!(!outcome.errors.is_empty());
    }

    #[tokio::test]
    async fn disabled_providers_are_skipped() {
        let exa = MockProvider::new(Source::Exa)
            .with_articles("keyword_curated", vec![article("A", "https://e.com/a", Source::Exa)]);
        let providers: Vec<Arc<dyn SearchProvider>> = vec![Arc::new(exa)];

        let outcome = collect_articles(
            &providers,
            &query(vec![Source::Tavily]),
            &ResearchConfig::default(),
            &CancellationToken::new(),
        )
        .await;

        assert!(outcome.articles.is_empty());
        assert!(outcome.strategies.is_empty());
    }
}
