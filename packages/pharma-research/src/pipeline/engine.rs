//! The pipeline orchestrator.
//!
//! Sequences collection → dedup → date resolution → date filter →
//! relevance → score filter → enhancement, accumulating run statistics
//! as the single owner. Provider and per-article failures are isolated
//! inside their stages and can never fail a run; only configuration
//! problems, invariant violations, and cancellation end one early.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::config::ResearchConfig;
use crate::error::PipelineError;
use crate::metadata::{RunRecord, RunRecorder};
use crate::pipeline::{collect, dates, dedup, enhance, relevance};
use crate::response::{ArticleResult, ResearchResponse};
use crate::session::SessionStore;
use crate::traits::{LanguageModel, SearchProvider};
use crate::types::{Article, Query, RunState, RunStats, Source};

/// Builder for [`Engine`].
pub struct EngineBuilder {
    config: ResearchConfig,
    providers: Vec<Arc<dyn SearchProvider>>,
    model: Option<Arc<dyn LanguageModel>>,
    recorder: Option<RunRecorder>,
}

impl EngineBuilder {
    pub fn new(config: ResearchConfig) -> Self {
        Self {
            config,
            providers: Vec::new(),
            model: None,
            recorder: None,
        }
    }

    /// Register a provider adapter.
    pub fn provider(mut self, provider: impl SearchProvider + 'static) -> Self {
        self.providers.push(Arc::new(provider));
        self
    }

    /// Set the language model used for both model tiers.
    pub fn model(mut self, model: impl LanguageModel + 'static) -> Self {
        self.model = Some(Arc::new(model));
        self
    }

    /// Enable run-record logging to the configured metadata log path.
    pub fn with_recording(mut self) -> Self {
        self.recorder = Some(RunRecorder::new(self.config.metadata_log_path.clone()));
        self
    }

    pub fn build(self) -> Engine {
        let session_capacity = self.config.session_capacity;
        Engine {
            config: Arc::new(self.config),
            providers: self.providers,
            model: self.model.expect("engine requires a language model"),
            recorder: self.recorder,
            sessions: Arc::new(SessionStore::new(session_capacity)),
        }
    }
}

/// The pipeline engine. One instance serves many runs.
pub struct Engine {
    config: Arc<ResearchConfig>,
    providers: Vec<Arc<dyn SearchProvider>>,
    model: Arc<dyn LanguageModel>,
    recorder: Option<RunRecorder>,
    sessions: Arc<SessionStore>,
}

impl Engine {
    /// Wire an engine from configuration with the real provider adapters
    /// and the OpenAI model client. Providers whose credentials are absent
    /// are simply not registered; selecting one at run time is then a
    /// configuration error.
    pub fn from_config(config: ResearchConfig) -> Result<Self, crate::error::ConfigError> {
        use crate::ai::OpenAiModel;
        use crate::providers::{ExaProvider, NewsApiProvider, PubmedProvider, TavilyProvider};

        let model = OpenAiModel::from_config(&config)?;
        let mut builder = EngineBuilder::new(config.clone()).model(model).with_recording();

        builder = builder.provider(PubmedProvider::new(
            config.pubmed_email.clone(),
            config.provider_timeout,
            config.pubmed_min_interval,
        ));
        if let Some(key) = &config.exa_api_key {
            builder = builder.provider(ExaProvider::new(key.clone(), config.provider_timeout));
        }
        if let Some(key) = &config.tavily_api_key {
            builder = builder.provider(TavilyProvider::new(key.clone(), config.provider_timeout));
        }
        if let Some(key) = &config.newsapi_key {
            builder = builder.provider(NewsApiProvider::new(
                key.clone(),
                config.provider_timeout,
                config.newsapi_max_age_days,
            ));
        }
        Ok(builder.build())
    }

    /// Results of past runs, for exports and log retrieval.
    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Run the full pipeline for one query.
    pub async fn run(&self, query: Query) -> ResearchResponse {
        self.run_with_cancel(query, CancellationToken::new()).await
    }

    /// Run with an external cancellation signal. All descendant work
    /// inherits the token; in-flight requests observe it.
    pub async fn run_with_cancel(
        &self,
        query: Query,
        cancel: CancellationToken,
    ) -> ResearchResponse {
        // Whole-run soft deadline, when configured
        let cancel = match self.config.run_deadline {
            Some(deadline) => {
                let child = cancel.child_token();
                let timer = child.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(deadline).await;
                    timer.cancel();
                });
                child
            }
            None => cancel,
        };

        let mut run = Run {
            engine: self,
            query,
            stats: RunStats::default(),
            started: Instant::now(),
        };
        let response = run.execute(&cancel).await;
        self.finish(&run.query, &run.stats);
        response
    }

    /// Flush pending run records before process exit.
    pub async fn shutdown(&self) {
        if let Some(recorder) = &self.recorder {
            recorder.flush().await;
        }
    }

    fn finish(&self, query: &Query, stats: &RunStats) {
        if let Some(recorder) = &self.recorder {
            recorder.record(RunRecord::from_run(query, stats.clone(), "single"));
        }
    }
}

/// One in-flight run: the single owner of its statistics.
struct Run<'e> {
    engine: &'e Engine,
    query: Query,
    stats: RunStats,
    started: Instant,
}

impl Run<'_> {
    async fn execute(&mut self, cancel: &CancellationToken) -> ResearchResponse {
        let config = Arc::clone(&self.engine.config);

        if let Err(e) = config.validate_for(&self.query.providers) {
            return self.fail(PipelineError::Config(e));
        }

        // --- COLLECTING -----------------------------------------------------
        self.transition(RunState::Collecting);
        let phase = Instant::now();
        let collection = collect::collect_articles(
            &self.engine.providers,
            &self.query,
            &config,
            cancel,
        )
        .await;
        self.stats.timings.collection = phase.elapsed().as_secs_f64();
        self.stats.collected = collection.articles.len();
        self.stats.errors.extend(collection.errors.clone());
        self.seed_provider_stats(&collection);
        let mut duplicated_ids = collection.duplicated_ids;
        if cancel.is_cancelled() {
            return self.cancelled();
        }

        // --- DEDUPING -------------------------------------------------------
        self.transition(RunState::Deduping);
        let phase = Instant::now();
        let dedup_outcome = dedup::deduplicate(collection.articles, config.similarity_threshold);
        self.stats.timings.dedup = phase.elapsed().as_secs_f64();
        self.stats.unique = dedup_outcome.kept.len();
        self.stats.duplicates_removed = dedup_outcome.removed.len();
        self.stats.duplicate_groups = dedup_outcome.duplicate_groups;
        duplicated_ids.extend(dedup_outcome.duplicated_representatives.iter().cloned());
        for article in &dedup_outcome.removed {
            duplicated_ids.insert(article.id.clone());
        }
        self.bump_strategy_counts(&dedup_outcome.kept, |row, n| row.after_dedup = n);
        let mut articles = dedup_outcome.kept;

        // --- RESOLVING_DATES ------------------------------------------------
        self.transition(RunState::ResolvingDates);
        let phase = Instant::now();
        let date_stats = dates::resolve_dates(
            &mut articles,
            Arc::clone(&self.engine.model),
            &config,
            cancel,
        )
        .await;
        self.stats.timings.date_extraction = phase.elapsed().as_secs_f64();
        self.stats.with_dates = date_stats.with_dates;
        self.stats.without_dates = date_stats.without_dates;
        self.stats.model_extracted = date_stats.model_extracted;
        if cancel.is_cancelled() {
            return self.cancelled();
        }

        // --- FILTERING_DATES ------------------------------------------------
        self.transition(RunState::FilteringDates);
        let (articles, filter_stats) = dates::filter_by_window(articles, &self.query);
        self.stats.in_range = filter_stats.in_range;
        self.stats.out_of_range = filter_stats.out_of_range;
        self.stats.model_rescued = filter_stats.model_rescued;
        self.bump_strategy_counts(&articles, |row, n| row.in_date_range = n);
        let mut articles = articles;

        // --- ANALYZING ------------------------------------------------------
        self.transition(RunState::Analyzing);
        let phase = Instant::now();
        let relevance_stats = relevance::analyze_relevance(
            &mut articles,
            Arc::clone(&self.engine.model),
            &self.query,
            &config,
            cancel,
        )
        .await;
        self.stats.timings.relevance_analysis = phase.elapsed().as_secs_f64();
        self.stats.analyzed = relevance_stats.analyzed;
        self.stats.analysis_failures = relevance_stats.failures;
        if cancel.is_cancelled() {
            return self.cancelled();
        }
        self.record_score_distribution(&articles);

        // --- FILTERING_SCORES -----------------------------------------------
        self.transition(RunState::FilteringScores);
        let min_score = self.query.min_score.unwrap_or(config.min_score);
        let (mut kept, filtered) = relevance::apply_score_filter(articles, min_score);
        self.stats.kept = kept.len();
        self.stats.filtered = filtered.len();
        self.bump_strategy_counts(&kept, |row, n| row.final_kept = n);
        self.record_unique_contributions(&kept, &duplicated_ids);
        self.record_provider_relevance(kept.iter().chain(filtered.iter()));
        self.record_provider_kept(&kept);

        // --- ENHANCING ------------------------------------------------------
        self.transition(RunState::Enhancing);
        let phase = Instant::now();
        enhance::enhance_articles(&mut kept, &self.query);
        self.stats.timings.enhancement = phase.elapsed().as_secs_f64();

        // Final ordering: score desc, resolved date desc, source asc
        kept.sort_by(|a, b| {
            b.score_or_zero()
                .cmp(&a.score_or_zero())
                .then(b.resolved_date.cmp(&a.resolved_date))
                .then(a.source.cmp(&b.source))
        });

        if let Err(e) = self.stats.check_consistency() {
            return self.fail(e);
        }

        self.transition(RunState::Done);
        self.stats.success = true;
        self.stats.timings.total = self.started.elapsed().as_secs_f64();
        info!(
            kept = self.stats.kept,
            collected = self.stats.collected,
            total_seconds = self.stats.timings.total,
            "run complete"
        );
        self.respond(kept, None)
    }

    fn transition(&mut self, state: RunState) {
        info!(from = %self.stats.state, to = %state, "pipeline state");
        self.stats.state = state;
    }

    fn cancelled(&mut self) -> ResearchResponse {
        self.transition(RunState::Cancelled);
        self.stats.success = false;
        self.stats.timings.total = self.started.elapsed().as_secs_f64();
        self.stats.errors.push("run cancelled".to_string());
        self.respond(Vec::new(), Some("run cancelled".to_string()))
    }

    fn fail(&mut self, e: PipelineError) -> ResearchResponse {
        error!(error = %e, "run failed");
        self.transition(RunState::Failed);
        self.stats.success = false;
        self.stats.timings.total = self.started.elapsed().as_secs_f64();
        self.stats.errors.push(e.to_string());
        self.respond(Vec::new(), Some(e.to_string()))
    }

    fn respond(&self, articles: Vec<Article>, error: Option<String>) -> ResearchResponse {
        let mut response = ResearchResponse {
            success: self.stats.success,
            results: articles.iter().map(ArticleResult::from).collect(),
            workflow_stats: self.stats.clone(),
            session_id: String::new(),
            error,
        };
        let session_id = self.engine.sessions.insert(response.clone());
        response.session_id = session_id;
        response
    }

    fn seed_provider_stats(&mut self, collection: &collect::CollectionOutcome) {
        for (source, rows) in &collection.strategies {
            let provider = self.stats.providers.entry(*source).or_default();
            provider.retrieved = rows.iter().map(|r| r.retrieved).sum();
            provider.elapsed_seconds = collection
                .provider_elapsed
                .get(source)
                .copied()
                .unwrap_or_default();
            provider.strategies = rows.clone();
        }
    }

    /// Count surviving articles per (provider, strategy) and store the
    /// count through `apply`.
    fn bump_strategy_counts<F>(&mut self, articles: &[Article], apply: F)
    where
        F: Fn(&mut crate::types::StrategyStats, usize),
    {
        let mut counts: HashMap<(Source, &str), usize> = HashMap::new();
        for article in articles {
            *counts
                .entry((article.source, article.strategy.as_str()))
                .or_default() += 1;
        }
        for (source, provider) in self.stats.providers.iter_mut() {
            for row in provider.strategies.iter_mut() {
                let n = counts
                    .get(&(*source, row.strategy.as_str()))
                    .copied()
                    .unwrap_or(0);
                apply(row, n);
            }
        }
        // Provider-level dedup survivors and duplicate rates
        for provider in self.stats.providers.values_mut() {
            let survivors: usize = provider.strategies.iter().map(|r| r.after_dedup).sum();
            provider.after_dedup = survivors;
            if provider.retrieved > 0 {
                provider.duplicate_rate = (provider.retrieved.saturating_sub(survivors)) as f64
                    / provider.retrieved as f64
                    * 100.0;
            }
        }
    }

    fn record_score_distribution(&mut self, articles: &[Article]) {
        let mut total: u64 = 0;
        let mut counted = 0usize;
        for article in articles {
            let Some(score) = article.relevance_score else {
                continue;
            };
            self.stats.record_score(score);
            *self
                .stats
                .article_types
                .entry(if article.article_type.is_empty() {
                    "other".to_string()
                } else {
                    article.article_type.clone()
                })
                .or_default() += 1;
            total += score as u64;
            counted += 1;
        }
        if counted > 0 {
            self.stats.score_avg = total as f64 / counted as f64;
        }
    }

    /// Kept articles no other strategy also produced.
    fn record_unique_contributions(
        &mut self,
        kept: &[Article],
        duplicated_ids: &std::collections::HashSet<String>,
    ) {
        let mut counts: HashMap<(Source, &str), usize> = HashMap::new();
        for article in kept {
            if !duplicated_ids.contains(&article.id) {
                *counts
                    .entry((article.source, article.strategy.as_str()))
                    .or_default() += 1;
            }
        }
        for (source, provider) in self.stats.providers.iter_mut() {
            let mut provider_total = 0;
            for row in provider.strategies.iter_mut() {
                row.unique_contribution = counts
                    .get(&(*source, row.strategy.as_str()))
                    .copied()
                    .unwrap_or(0);
                provider_total += row.unique_contribution;
            }
            provider.unique_contribution = provider_total;
        }
    }

    fn record_provider_relevance<'a>(&mut self, analyzed: impl Iterator<Item = &'a Article>) {
        let mut sums: HashMap<Source, (u64, usize)> = HashMap::new();
        let mut strategy_sums: HashMap<(Source, String), (u64, usize)> = HashMap::new();
        for article in analyzed {
            let Some(score) = article.relevance_score else {
                continue;
            };
            let entry = sums.entry(article.source).or_default();
            entry.0 += score as u64;
            entry.1 += 1;
            let entry = strategy_sums
                .entry((article.source, article.strategy.clone()))
                .or_default();
            entry.0 += score as u64;
            entry.1 += 1;
        }
        for (source, provider) in self.stats.providers.iter_mut() {
            if let Some((sum, count)) = sums.get(source) {
                if *count > 0 {
                    provider.avg_relevance = *sum as f64 / *count as f64;
                }
            }
            for row in provider.strategies.iter_mut() {
                if let Some((sum, count)) = strategy_sums.get(&(*source, row.strategy.clone())) {
                    if *count > 0 {
                        row.avg_relevance = *sum as f64 / *count as f64;
                    }
                }
            }
        }
    }

    fn record_provider_kept(&mut self, kept: &[Article]) {
        let mut counts: HashMap<Source, usize> = HashMap::new();
        for article in kept {
            *counts.entry(article.source).or_default() += 1;
        }
        for (source, provider) in self.stats.providers.iter_mut() {
            provider.final_kept = counts.get(source).copied().unwrap_or(0);
        }
    }
}
