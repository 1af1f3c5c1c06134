//! Relevance scoring via the strong model, with tolerant response parsing.
//!
//! Every article gets exactly one verdict. When the model's reply cannot
//! be parsed, or the call itself fails, the article is retained with a
//! neutral score of 50 rather than discarded: losing an article to a
//! transient model problem costs far more than an occasional borderline
//! false positive.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use serde::Deserialize;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use openai_client::{extract_json_object, strip_code_blocks, truncate_to_char_boundary};

use crate::config::ResearchConfig;
use crate::traits::{CompletionRequest, LanguageModel, ModelTier};
use crate::types::{Article, Query};

/// Counters produced by the analysis pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelevanceStats {
    pub analyzed: usize,
    /// Verdicts that fell back to neutral retention
    pub failures: usize,
}

/// A parsed model verdict.
#[derive(Debug, Clone, Deserialize)]
pub struct RelevanceVerdict {
    #[serde(default)]
    pub relevance_score: f64,
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
}

/// Analyze every article, up to `relevance_parallelism` concurrently with
/// a small inter-call delay. Each call is independently cancellable; an
/// article whose call is cancelled before completion keeps no score and
/// the run ends as cancelled upstream.
pub async fn analyze_relevance(
    articles: &mut [Article],
    model: Arc<dyn LanguageModel>,
    query: &Query,
    config: &ResearchConfig,
    cancel: &CancellationToken,
) -> RelevanceStats {
    let semaphore = Arc::new(Semaphore::new(config.relevance_parallelism.max(1)));
    let delay = config.relevance_call_delay;
    let timeout = config.relevance_model_timeout;

    let verdicts: Vec<(usize, Option<Outcome>)> =
        stream::iter(articles.iter().enumerate().map(|(index, article)| {
            let model = Arc::clone(&model);
            let semaphore = Arc::clone(&semaphore);
            let cancel = cancel.clone();
            let query = query.clone();
            async move {
                let Ok(_permit) = semaphore.acquire().await else {
                    return (index, None);
                };
                if cancel.is_cancelled() {
                    return (index, None);
                }
                // Space out call starts to respect model rate limits
                tokio::time::sleep(delay).await;

                let request = relevance_request(article, &query, timeout);
                let outcome = tokio::select! {
                    result = model.complete(request) => match result {
                        Ok(response) => match parse_verdict(&response) {
                            Some(verdict) => Outcome::Parsed(verdict),
                            None => {
                                let prefix: String = response.chars().take(500).collect();
                                warn!(
                                    title = %article.title,
                                    response_prefix = %prefix,
                                    "relevance verdict failed to parse, retaining with neutral score"
                                );
                                Outcome::ParseFailure
                            }
                        },
                        Err(e) => {
                            warn!(
                                title = %article.title,
                                error = %e,
                                "relevance call failed, retaining with neutral score"
                            );
                            Outcome::CallFailure
                        }
                    },
                    _ = cancel.cancelled() => return (index, None),
                };
                (index, Some(outcome))
            }
        }))
        .buffer_unordered(config.relevance_parallelism.max(1))
        .collect()
        .await;

    let mut stats = RelevanceStats::default();
    for (index, outcome) in verdicts {
        let article = &mut articles[index];
        match outcome {
            Some(Outcome::Parsed(verdict)) => {
                apply_verdict(article, verdict);
                stats.analyzed += 1;
            }
            Some(Outcome::ParseFailure) => {
                apply_neutral(article, query, "parse failure; retained");
                stats.analyzed += 1;
                stats.failures += 1;
            }
            Some(Outcome::CallFailure) => {
                apply_neutral(article, query, "analysis failed; retained");
                stats.analyzed += 1;
                stats.failures += 1;
            }
            // Cancelled before a verdict: leave the article unscored;
            // the engine aborts the run before the score filter
            None => {}
        }
    }

    info!(
        analyzed = stats.analyzed,
        failures = stats.failures,
        "relevance analysis complete"
    );
    stats
}

enum Outcome {
    Parsed(RelevanceVerdict),
    ParseFailure,
    CallFailure,
}

/// Keep articles at or above the minimum score. Input order is preserved.
pub fn apply_score_filter(articles: Vec<Article>, min_score: u8) -> (Vec<Article>, Vec<Article>) {
    let (kept, filtered): (Vec<Article>, Vec<Article>) = articles
        .into_iter()
        .partition(|a| a.score_or_zero() >= min_score);

    info!(
        kept = kept.len(),
        filtered = filtered.len(),
        min_score,
        "score filtering complete"
    );
    (kept, filtered)
}

/// The defensive parse ladder: clean JSON, then fenced JSON, then the
/// first balanced object in the reply.
pub fn parse_verdict(response: &str) -> Option<RelevanceVerdict> {
    let cleaned = strip_code_blocks(response);
    if let Ok(verdict) = serde_json::from_str::<RelevanceVerdict>(cleaned) {
        return Some(verdict);
    }
    let object = extract_json_object(response)?;
    serde_json::from_str::<RelevanceVerdict>(object).ok()
}

fn apply_verdict(article: &mut Article, verdict: RelevanceVerdict) {
    // Scores are clamped into 0-100 no matter what the model said
    article.relevance_score = Some(verdict.relevance_score.clamp(0.0, 100.0).round() as u8);
    article.relevance_reason = verdict.relevance_reason;
    article.article_type = if verdict.article_type.is_empty() {
        "other".to_string()
    } else {
        verdict.article_type
    };
    article.mentioned_keywords = verdict.mentioned_keywords;
    article.pertinent_keywords = verdict.pertinent_keywords;
    article.clinical_significance = verdict.clinical_significance;
    article.regulatory_impact = verdict.regulatory_impact;
    article.market_impact = verdict.market_impact;
    article.summary = verdict.summary;
}

/// Neutral retention: score 50, keywords assumed present, summary from
/// the content head.
fn apply_neutral(article: &mut Article, query: &Query, reason: &str) {
    article.relevance_score = Some(50);
    article.relevance_reason = reason.to_string();
    article.article_type = "unknown".to_string();
    article.mentioned_keywords = query.all_keywords();
    article.summary = truncate_to_char_boundary(&article.content, 200).to_string();
}

fn relevance_request(article: &Article, query: &Query, timeout: Duration) -> CompletionRequest {
    let system = "You are an expert pharmaceutical research analyst. Your job is to evaluate medical and pharmaceutical articles for relevance, quality, and significance based SOLELY on the content and context provided.\n\nYou MUST respond with ONLY valid JSON. No markdown, no code blocks, no extra text - just raw JSON.";

    let date = article
        .resolved_date
        .map(|d| d.to_string())
        .unwrap_or_else(|| "Unknown".to_string());
    let keywords = query.all_keywords().join(", ");

    let mut context = format!(
        "ARTICLE DETAILS:\n\
         Title: {title}\n\
         Source: {source}\n\
         URL: {url}\n\
         Date: {date}\n\
         Content Preview: {content}\n\n\
         SEARCH CONTEXT:\n\
         Keywords: {keywords}\n\
         Search Type: {mode}\n\
         Domain: Pharmaceutical/Medical Research\n",
        title = article.title,
        source = article.source,
        url = article.url,
        content = truncate_to_char_boundary(&article.content, 3000),
        mode = query.mode.as_str(),
    );
    if let Some(alert_name) = &query.alert_name {
        context.push_str(&format!("Alert Title: {alert_name}\n"));
    }
    if let Some(alert_header) = &query.alert_header {
        context.push_str(&format!("Alert Header: {alert_header}\n"));
    }

    const OUTPUT_FORMAT: &str = r#"{
    "relevance_score": <number 0-100>,
    "relevance_reason": "<detailed explanation of why this score was assigned>",
    "article_type": "<research|news|press_release|company_page|clinical_trial|regulatory|other>",
    "mentioned_keywords": ["<exact keywords found in content>"],
    "pertinent_keywords": ["<additional relevant terms from the article related to the search topic>"],
    "clinical_significance": "<clinical relevance explanation or 'None'>",
    "regulatory_impact": "<regulatory implications or 'None'>",
    "market_impact": "<market implications or 'None'>",
    "summary": "<2-3 sentence summary>"
}"#;

    let user = format!(
        "{context}\n\
         TASK: Analyze this article and provide a comprehensive relevance assessment.\n\n\
         OUTPUT FORMAT (raw JSON only, no markdown):\n\
         {OUTPUT_FORMAT}\n\n\
         SCORING GUIDELINES:\n\
         - 90-100: Perfect match, highly relevant research/clinical data, directly addresses keywords\n\
         - 80-89: Very relevant, important news or study results, strong keyword presence\n\
         - 70-79: Relevant, useful information, moderate keyword presence\n\
         - 60-69: Somewhat relevant, minor connection to keywords\n\
         - 50-59: Barely relevant, weak connection to keywords\n\
         - 0-49: Not relevant, no meaningful connection to keywords\n\n\
         EVALUATION CRITERIA:\n\
         1. Keyword Presence: How many search keywords appear in title and content? (Exact matches only)\n\
         2. Content Quality: Is this credible research, news, or promotional material?\n\
         3. Clinical Significance: Does it discuss clinical trials, efficacy, safety, or patient outcomes?\n\
         4. Regulatory Relevance: Are there FDA approvals, regulatory decisions, or guidelines?\n\
         5. Market Impact: Business implications, commercial developments, or market dynamics?\n\
         6. Source Credibility: Is it from a reputable source (PubMed, peer-reviewed, official news)?\n\n\
         Return ONLY the JSON object, nothing else."
    );

    CompletionRequest::new(ModelTier::Main, system, user)
        .temperature(0.1)
        .max_tokens(2000)
        .json_mode()
        .timeout(timeout)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockModel;
    use crate::types::Source;
    use chrono::NaiveDate;

    fn query() -> Query {
        Query::new(
            vec!["prostate cancer".into(), "immunotherapy".into()],
            NaiveDate::from_ymd_opt(2024, 10, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 10, 17).unwrap(),
        )
        .unwrap()
    }

    fn article(title: &str) -> Article {
        Article::new(
            title,
            "Immunotherapy content discussing prostate cancer outcomes.",
            format!("https://ex.com/{}", title.len()),
            Source::Pubmed,
            "primary",
        )
    }

    const GOOD_VERDICT: &str = r#"{
        "relevance_score": 85,
        "relevance_reason": "Strong keyword presence",
        "article_type": "research",
        "mentioned_keywords": ["prostate cancer"],
        "pertinent_keywords": ["checkpoint inhibitor"],
        "clinical_significance": "Phase 3 data",
        "regulatory_impact": "None",
        "market_impact": "None",
        "summary": "A trial summary."
    }"#;

    #[test]
    fn parses_clean_json() {
        let verdict = parse_verdict(GOOD_VERDICT).unwrap();
        assert_eq!(verdict.relevance_score, 85.0);
        assert_eq!(verdict.article_type, "research");
    }

    #[test]
    fn parses_fenced_json() {
        let fenced = format!("```json\n{GOOD_VERDICT}\n```");
        let verdict = parse_verdict(&fenced).unwrap();
        assert_eq!(verdict.relevance_score, 85.0);
    }

    #[test]
    fn parses_json_embedded_in_prose() {
        let wrapped = format!("Sure! Here is the assessment:\n{GOOD_VERDICT}\nLet me know.");
        let verdict = parse_verdict(&wrapped).unwrap();
        assert_eq!(verdict.relevance_score, 85.0);
    }

    #[test]
    fn apology_strings_do_not_parse() {
        assert!(parse_verdict("I'm sorry, I cannot evaluate this article.").is_none());
        assert!(parse_verdict("").is_none());
    }

    #[test]
    fn scores_are_clamped() {
        let mut a = article("t");
        apply_verdict(
            &mut a,
            RelevanceVerdict {
                relevance_score: 240.0,
                relevance_reason: String::new(),
                article_type: String::new(),
                mentioned_keywords: vec![],
                pertinent_keywords: vec![],
                clinical_significance: String::new(),
                regulatory_impact: String::new(),
                market_impact: String::new(),
                summary: String::new(),
            },
        );
        assert_eq!(a.relevance_score, Some(100));
        assert_eq!(a.article_type, "other");
    }

    #[tokio::test]
    async fn good_verdicts_propagate() {
        let mut articles = vec![article("a"), article("b")];
        let model = Arc::new(MockModel::new().with_relevance_response(GOOD_VERDICT));
        let stats = analyze_relevance(
            &mut articles,
            model,
            &query(),
            &ResearchConfig::default(),
            &CancellationToken::new(),
        )
        .await;

        assert_eq!(stats.analyzed, 2);
        assert_eq!(stats.failures, 0);
        for a in &articles {
            assert_eq!(a.relevance_score, Some(85));
            assert_eq!(a.mentioned_keywords, vec!["prostate cancer"]);
        }
    }

    #[tokio::test]
    async fn fenced_verdicts_parse_and_propagate() {
        let mut articles = vec![article("a")];
        let fenced = format!("```json\n{GOOD_VERDICT}\n```");
        let model = Arc::new(MockModel::new().with_relevance_response(&fenced));
        let stats = analyze_relevance(
            &mut articles,
            model,
            &query(),
            &ResearchConfig::default(),
            &CancellationToken::new(),
        )
        .await;

        assert_eq!(stats.failures, 0);
        assert_eq!(articles[0].relevance_score, Some(85));
    }

    #[tokio::test]
    async fn unparseable_replies_retain_neutral() {
        let mut articles = vec![article("a"), article("b"), article("c")];
        let model =
            Arc::new(MockModel::new().with_relevance_response("I'm sorry, I can't help with that."));
        let stats = analyze_relevance(
            &mut articles,
            model,
            &query(),
            &ResearchConfig::default(),
            &CancellationToken::new(),
        )
        .await;

        assert_eq!(stats.analyzed, 3);
        assert_eq!(stats.failures, 3);
        for a in &articles {
            assert_eq!(a.relevance_score, Some(50));
            assert_eq!(a.relevance_reason, "parse failure; retained");
            assert_eq!(a.mentioned_keywords, query().all_keywords());
            assert!(!a.summary.is_empty());
        }
    }

    #[tokio::test]
    async fn call_failures_retain_neutral() {
        let mut articles = vec![article("a")];
        let model = Arc::new(MockModel::new().with_relevance_failure());
        let stats = analyze_relevance(
            &mut articles,
            model,
            &query(),
            &ResearchConfig::default(),
            &CancellationToken::new(),
        )
        .await;

        assert_eq!(stats.analyzed, 1);
        assert_eq!(stats.failures, 1);
        assert_eq!(articles[0].relevance_score, Some(50));
        assert_eq!(articles[0].relevance_reason, "analysis failed; retained");
    }

    #[test]
    fn score_filter_keeps_at_or_above_threshold() {
        let mut articles = Vec::new();
        for (i, score) in [85u8, 40, 39, 50].into_iter().enumerate() {
            let mut a = article(&format!("a{i}"));
            a.relevance_score = Some(score);
            articles.push(a);
        }
        let (kept, filtered) = apply_score_filter(articles, 40);
        assert_eq!(kept.len(), 3);
        assert_eq!(filtered.len(), 1);
        assert!(kept.iter().all(|a| a.score_or_zero() >= 40));
    }

    #[test]
    fn relevance_request_uses_json_mode_and_token_limit() {
        let request = relevance_request(&article("t"), &query(), Duration::from_secs(30));
        assert!(request.json_mode);
        assert_eq!(request.max_tokens, 2000);
        assert!(request.temperature <= 0.1);
        assert!(request.user.contains("prostate cancer, immunotherapy"));
        assert!(request.system.contains("expert pharmaceutical research analyst"));
    }

    #[test]
    fn alert_context_is_included_when_present() {
        let q = query().with_alert("Weekly oncology alert", Some("Oncology".into()), None);
        let request = relevance_request(&article("t"), &q, Duration::from_secs(30));
        assert!(request.user.contains("Alert Title: Weekly oncology alert"));
        assert!(request.user.contains("Alert Header: Oncology"));
    }
}
