//! End-to-end pipeline scenarios against mocked providers and models.

use std::time::Duration;

use chrono::NaiveDate;
use tokio_util::sync::CancellationToken;

use pharma_research::pipeline::dedup::title_similarity;
use pharma_research::testing::{verdict_json, MockModel, MockProvider};
use pharma_research::{
    Article, Engine, EngineBuilder, Query, ResearchConfig, RunState, Source,
};

fn date(s: &str) -> NaiveDate {
    s.parse().unwrap()
}

fn test_config(dir: &tempfile::TempDir) -> ResearchConfig {
    use pharma_research::security::SecretString;
    ResearchConfig {
        openai_api_key: Some(SecretString::new("sk-test")),
        tavily_api_key: Some(SecretString::new("tvly-test")),
        newsapi_key: Some(SecretString::new("news-test")),
        exa_api_key: Some(SecretString::new("exa-test")),
        relevance_call_delay: Duration::ZERO,
        metadata_log_path: dir.path().join("metadata.csv"),
        ..Default::default()
    }
}

fn base_query() -> Query {
    Query::new(
        vec!["prostate cancer".into(), "immunotherapy".into()],
        date("2024-10-01"),
        date("2024-10-17"),
    )
    .unwrap()
    .with_min_score(40)
}

/// Generate `n` headlines whose pairwise similarity stays safely under
/// the dedup threshold, so only the intentionally-planted duplicates
/// group together.
fn distinct_titles(n: usize) -> Vec<String> {
    const COMPANIES: [&str; 12] = [
        "Genorix", "Pharmetra", "Biovanta", "Celtrix", "Medrova", "Axiopharm", "Novendra",
        "Therazyne", "Orphicor", "Vantrelle", "Zephybio", "Curaxis",
    ];
    const DRUGS: [&str; 17] = [
        "Zilvastat", "Cortexa", "Nuvaline", "Orbitrez", "Galdemir", "Vexapril", "Lumoxen",
        "Tandrelin", "Qorvista", "Merovax", "Ibrantex", "Soltriva", "Pexidume", "Kavrelor",
        "Dexophan", "Ultravir", "Benzorin",
    ];
    const CONDITIONS: [&str; 15] = [
        "psoriasis", "glaucoma", "lymphoma", "hypertension", "migraine", "asthma", "dermatitis",
        "osteoporosis", "epilepsy", "anemia", "sepsis", "fibrosis", "melanoma", "arthritis",
        "insomnia",
    ];
    let templates: [fn(&str, &str, &str) -> String; 8] = [
        |co, d, c| format!("{co} says {d} cleared for {c}"),
        |co, d, c| format!("{co} halts {d} study in {c}"),
        |co, d, c| format!("{co} prices {d} for {c} launch"),
        |co, d, c| format!("{co} posts {d} gains in {c}"),
        |co, d, c| format!("{co} files {d} for {c}"),
        |co, d, c| format!("{co} expands {d} use in {c}"),
        |co, d, c| format!("{co} flags {d} risk in {c}"),
        |co, d, c| format!("{co} touts {d} data in {c}"),
    ];

    let space = COMPANIES.len() * templates.len() * DRUGS.len() * CONDITIONS.len();
    let mut accepted: Vec<String> = Vec::with_capacity(n);
    for i in 0..space {
        if accepted.len() == n {
            break;
        }
        let company = COMPANIES[i % COMPANIES.len()];
        let template = templates[(i / COMPANIES.len()) % templates.len()];
        let drug = DRUGS[(i / (COMPANIES.len() * templates.len())) % DRUGS.len()];
        let condition = CONDITIONS
            [(i / (COMPANIES.len() * templates.len() * DRUGS.len())) % CONDITIONS.len()];
        let candidate = template(company, drug, condition);

        // Accept well under the 0.75 dedup threshold so appending a
        // duplicate-marker suffix cannot push an unrelated pair over it
        if accepted
            .iter()
            .all(|existing| title_similarity(existing, &candidate) < 0.70)
        {
            accepted.push(candidate);
        }
    }
    assert_eq!(accepted.len(), n, "title pool exhausted");
    accepted
}

struct Fixture {
    engine: Engine,
    query: Query,
}

/// The S1 dataset: 45/32/28/20 articles across the four providers, 23
/// planted duplicates in 8 groups, 13 unresolvable dates, 12 model
/// rescues, 11 dates outside the window, 31 scores below 40.
fn s1_fixture(dir: &tempfile::TempDir) -> Fixture {
    let titles = distinct_titles(102);

    // Survivor roles by index:
    //   0..8    duplicate-group seeds (metadata date, high score)
    //   0..66   metadata date inside the window
    //   66..77  metadata date outside the window (11)
    //   77..89  no raw date, model-extracted inside the window (12)
    //   89..102 no date anywhere (13)
    // Scores for the 78 analyzed: indices 35..66 fall below 40 (31).
    let mut survivors: Vec<Article> = Vec::new();
    let mut model = MockModel::new().with_relevance_response(verdict_json(0));

    for (index, title) in titles.iter().enumerate() {
        let source_strategy: (Source, &str) = match index {
            0..=21 => (Source::Pubmed, "primary"),
            22..=53 => (Source::Exa, "keyword_curated"),
            54..=81 => (Source::Tavily, "news_domains"),
            _ => (Source::Newsapi, "primary"),
        };
        let content = if index < 8 {
            format!("Extended clinical review of {title} with trial context and commentary.")
        } else {
            format!("Clinical review of {title}.")
        };
        let mut article = Article::new(
            title.clone(),
            content,
            format!("https://example.org/item/s{index}"),
            source_strategy.0,
            source_strategy.1,
        );

        match index {
            0..=65 => {
                article.raw_date = Some(format!("2024-10-{:02}", 2 + index % 15));
            }
            66..=76 => {
                article.raw_date = Some("2024-11-20".to_string());
            }
            77..=88 => {
                model = model.with_date_for(title.clone(), "2024-10-10");
            }
            _ => {}
        }

        let analyzed = index <= 65 || (77..=88).contains(&index);
        if analyzed {
            let score: u8 = match index {
                0..=34 => 95 - index as u8,
                35..=65 => 25,
                _ => 55,
            };
            model = model.with_relevance_for(title.clone(), verdict_json(score));
        }

        survivors.push(article);
    }

    // Duplicate groups: seeds 0..8 with group sizes 5,5,4,4,4,3,3,3.
    // Variants carry shorter content so the seed stays representative.
    let group_sizes = [5usize, 5, 4, 4, 4, 3, 3, 3];
    let suffixes = [", aide says", " - wire report", " (updated)", ", sources say"];
    let mut variants: Vec<(usize, Article)> = Vec::new();
    for (seed_index, size) in group_sizes.iter().enumerate() {
        for k in 0..(size - 1) {
            let variant = Article::new(
                format!("{}{}", titles[seed_index], suffixes[k]),
                "brief duplicate wire copy",
                format!("https://example.org/item/v{seed_index}_{k}"),
                Source::Pubmed,
                "primary",
            );
            variants.push((seed_index, variant));
        }
    }
    assert_eq!(variants.len(), 23);

    // Sanity: variants must group with their seed and nothing else
    for (seed_index, variant) in &variants {
        for (index, title) in titles.iter().enumerate() {
            let similarity = title_similarity(&variant.title, title);
            if index == *seed_index {
                assert!(similarity >= 0.75, "variant must join its seed group");
            } else {
                assert!(similarity < 0.75, "variant leaked into another group");
            }
        }
    }

    // Provider batches, seeds before their variants
    let mut pubmed: Vec<Article> = Vec::new();
    for seed_index in 0..8 {
        pubmed.push(survivors[seed_index].clone());
        for (owner, variant) in &variants {
            if owner == &seed_index {
                pubmed.push(variant.clone());
            }
        }
    }
    pubmed.extend(survivors[8..22].iter().cloned());
    assert_eq!(pubmed.len(), 45);

    let exa: Vec<Article> = survivors[22..54].to_vec();
    let tavily: Vec<Article> = survivors[54..82].to_vec();
    let newsapi: Vec<Article> = survivors[82..102].to_vec();
    assert_eq!(exa.len(), 32);
    assert_eq!(tavily.len(), 28);
    assert_eq!(newsapi.len(), 20);

    let engine = EngineBuilder::new(test_config(dir))
        .provider(MockProvider::new(Source::Pubmed).with_articles("primary", pubmed))
        .provider(MockProvider::new(Source::Exa).with_articles("keyword_curated", exa))
        .provider(MockProvider::new(Source::Tavily).with_articles("news_domains", tavily))
        .provider(MockProvider::new(Source::Newsapi).with_articles("primary", newsapi))
        .model(model)
        .with_recording()
        .build();

    Fixture {
        engine,
        query: base_query(),
    }
}

#[tokio::test]
async fn s1_full_pipeline_counts_and_ordering() {
    let dir = tempfile::tempdir().unwrap();
    let fixture = s1_fixture(&dir);

    let response = fixture.engine.run(fixture.query).await;
    let stats = &response.workflow_stats;

    assert!(response.success, "errors: {:?}", stats.errors);
    assert_eq!(stats.state, RunState::Done);
    assert_eq!(stats.collected, 125);
    assert_eq!(stats.unique, 102);
    assert_eq!(stats.duplicates_removed, 23);
    assert_eq!(stats.duplicate_groups, 8);
    assert_eq!(stats.with_dates, 89);
    assert_eq!(stats.without_dates, 13);
    assert_eq!(stats.in_range, 78);
    assert_eq!(stats.out_of_range, 11);
    assert_eq!(stats.model_rescued, 12);
    assert_eq!(stats.analyzed, 78);
    assert_eq!(stats.filtered, 31);
    assert_eq!(stats.kept, 47);
    assert_eq!(response.results.len(), 47);

    // Counter consistency
    assert_eq!(stats.collected, stats.unique + stats.duplicates_removed);
    assert_eq!(stats.analyzed, stats.kept + stats.filtered);

    // Final ordering: relevance score descending
    let scores: Vec<u8> = response.results.iter().map(|r| r.relevance_score).collect();
    let mut sorted = scores.clone();
    sorted.sort_unstable_by(|a, b| b.cmp(a));
    assert_eq!(scores, sorted);
    assert!(scores.iter().all(|&s| s >= 40));

    // Session is retrievable
    let session = fixture.engine.sessions().get(&response.session_id).unwrap();
    assert_eq!(session.results.len(), 47);

    // The run record was persisted with one header and one row
    fixture.engine.shutdown().await;
    let log = std::fs::read_to_string(dir.path().join("metadata.csv")).unwrap();
    assert_eq!(log.lines().count(), 2);
    assert!(log.lines().nth(1).unwrap().contains("125"));
}

#[tokio::test]
async fn s1_is_deterministic_across_runs() {
    let dir_a = tempfile::tempdir().unwrap();
    let dir_b = tempfile::tempdir().unwrap();
    let first = s1_fixture(&dir_a);
    let second = s1_fixture(&dir_b);

    let response_a = first.engine.run(first.query).await;
    let response_b = second.engine.run(second.query).await;

    let order_a: Vec<&str> = response_a.results.iter().map(|r| r.title.as_str()).collect();
    let order_b: Vec<&str> = response_b.results.iter().map(|r| r.title.as_str()).collect();
    assert_eq!(order_a, order_b);
}

#[tokio::test]
async fn s2_provider_http_500_does_not_abort_the_run() {
    let dir = tempfile::tempdir().unwrap();

    let mut good = Article::new(
        "Cortexa wins approval for glaucoma",
        "Approval content with detail.",
        "https://example.org/good",
        Source::Pubmed,
        "primary",
    );
    good.raw_date = Some("2024-10-05".into());

    let engine = EngineBuilder::new(test_config(&dir))
        .provider(MockProvider::new(Source::Pubmed).with_articles("primary", vec![good]))
        .provider(
            MockProvider::new(Source::Tavily)
                .with_error("news_domains", "internal error")
                .with_error("mixed_domains", "internal error")
                .with_error("pharma_domains", "internal error"),
        )
        .model(MockModel::new().with_relevance_response(verdict_json(80)))
        .build();

    let query = base_query().with_providers(vec![Source::Pubmed, Source::Tavily]);
    let response = engine.run(query).await;
    let stats = &response.workflow_stats;

    assert!(response.success);
    assert_eq!(stats.kept, 1);

    let tavily = &stats.providers[&Source::Tavily];
    assert_eq!(tavily.final_kept, 0);
    assert_eq!(tavily.retrieved, 0);
    assert!(tavily.strategies.iter().all(|row| row.error.is_some()));
    assert!(!stats.errors.is_empty());
}

#[tokio::test]
async fn s3_fenced_json_verdicts_parse_end_to_end() {
    let dir = tempfile::tempdir().unwrap();

    let mut article = Article::new(
        "Nuvaline shows benefit in lymphoma study",
        "Study content.",
        "https://example.org/fenced",
        Source::Exa,
        "keyword_curated",
    );
    article.raw_date = Some("2024-10-08".into());

    let fenced = format!("```json\n{}\n```", verdict_json(91));
    let engine = EngineBuilder::new(test_config(&dir))
        .provider(MockProvider::new(Source::Exa).with_articles("keyword_curated", vec![article]))
        .model(MockModel::new().with_relevance_response(fenced))
        .build();

    let query = base_query().with_providers(vec![Source::Exa]);
    let response = engine.run(query).await;

    assert_eq!(response.workflow_stats.analysis_failures, 0);
    assert_eq!(response.results.len(), 1);
    assert_eq!(response.results[0].relevance_score, 91);
}

#[tokio::test]
async fn s4_apology_replies_retain_every_article_at_neutral() {
    let dir = tempfile::tempdir().unwrap();
    let titles = distinct_titles(6);

    let articles: Vec<Article> = titles
        .iter()
        .enumerate()
        .map(|(i, title)| {
            let mut a = Article::new(
                title.clone(),
                "Body content.",
                format!("https://example.org/a{i}"),
                Source::Tavily,
                "news_domains",
            );
            a.raw_date = Some("2024-10-09".into());
            a
        })
        .collect();

    let engine = EngineBuilder::new(test_config(&dir))
        .provider(MockProvider::new(Source::Tavily).with_articles("news_domains", articles))
        .model(MockModel::new().with_relevance_response("I'm sorry, I cannot assess this."))
        .build();

    let query = base_query().with_providers(vec![Source::Tavily]);
    let response = engine.run(query).await;
    let stats = &response.workflow_stats;

    assert_eq!(stats.analyzed, 6);
    assert_eq!(stats.analysis_failures, 6);
    // Neutral 50 clears the default threshold of 40, so everything stays
    assert_eq!(stats.kept, 6);
    assert_eq!(response.results.len(), 6);
    for result in &response.results {
        assert_eq!(result.relevance_score, 50);
        assert_eq!(result.relevance_reason, "parse failure; retained");
    }
}

#[tokio::test]
async fn s5_near_duplicate_titles_collapse_keeping_longer_content() {
    let dir = tempfile::tempdir().unwrap();

    let mut short = Article::new(
        "Biden receiving radiation therapy",
        "Short note.",
        "https://example.org/short",
        Source::Newsapi,
        "primary",
    );
    short.raw_date = Some("2024-10-11".into());
    let mut long = Article::new(
        "Biden receiving radiation therapy, aide says",
        "A longer wire story with substantially more detail about the treatment.",
        "https://example.org/long",
        Source::Newsapi,
        "primary",
    );
    long.raw_date = Some("2024-10-11".into());

    let engine = EngineBuilder::new(test_config(&dir))
        .provider(MockProvider::new(Source::Newsapi).with_articles("primary", vec![short, long]))
        .model(MockModel::new().with_relevance_response(verdict_json(75)))
        .build();

    let query = base_query().with_providers(vec![Source::Newsapi]);
    let response = engine.run(query).await;

    assert_eq!(response.workflow_stats.duplicates_removed, 1);
    assert_eq!(response.workflow_stats.duplicate_groups, 1);
    assert_eq!(response.results.len(), 1);
    assert_eq!(
        response.results[0].title,
        "Biden receiving radiation therapy, aide says"
    );
}

#[tokio::test]
async fn s6_url_date_rescues_undated_article() {
    let dir = tempfile::tempdir().unwrap();

    let article = Article::new(
        "Orbitrez label expanded to cover migraine",
        "No dates in this body.",
        "https://ex.com/2024/10/15/story",
        Source::Exa,
        "neural_open",
    );

    let engine = EngineBuilder::new(test_config(&dir))
        .provider(MockProvider::new(Source::Exa).with_articles("neural_open", vec![article]))
        .model(
            MockModel::new()
                .with_date_response("2024-10-15")
                .with_relevance_response(verdict_json(82)),
        )
        .build();

    let query = base_query().with_providers(vec![Source::Exa]);
    let response = engine.run(query).await;
    let stats = &response.workflow_stats;

    assert_eq!(stats.with_dates, 1);
    assert_eq!(stats.in_range, 1);
    assert_eq!(stats.model_rescued, 1, "model-extracted date counts as rescued");
    assert_eq!(response.results.len(), 1);
    assert_eq!(response.results[0].date.as_deref(), Some("2024-10-15"));
}

#[tokio::test]
async fn s6_regex_fallback_when_model_returns_none() {
    let dir = tempfile::tempdir().unwrap();

    let article = Article::new(
        "Galdemir supply issues hit sepsis patients",
        "No dates in this body.",
        "https://ex.com/2024/10/15/story",
        Source::Exa,
        "neural_open",
    );

    let engine = EngineBuilder::new(test_config(&dir))
        .provider(MockProvider::new(Source::Exa).with_articles("neural_open", vec![article]))
        .model(
            MockModel::new()
                .with_date_response("none")
                .with_relevance_response(verdict_json(82)),
        )
        .build();

    let query = base_query().with_providers(vec![Source::Exa]);
    let response = engine.run(query).await;
    let stats = &response.workflow_stats;

    // Pattern tier still finds the URL date, but it is not a model rescue
    assert_eq!(stats.in_range, 1);
    assert_eq!(stats.model_rescued, 0);
    assert_eq!(response.results.len(), 1);
}

#[tokio::test]
async fn cancelled_runs_emit_partial_stats() {
    let dir = tempfile::tempdir().unwrap();

    let engine = EngineBuilder::new(test_config(&dir))
        .provider(MockProvider::new(Source::Exa))
        .model(MockModel::new())
        .build();

    let cancel = CancellationToken::new();
    cancel.cancel();

    let query = base_query().with_providers(vec![Source::Exa]);
    let response = engine.run_with_cancel(query, cancel).await;

    assert!(!response.success);
    assert_eq!(response.workflow_stats.state, RunState::Cancelled);
    assert!(response.error.is_some());
    assert!(response.results.is_empty());
}

#[tokio::test]
async fn missing_credentials_fail_before_any_provider_call() {
    let dir = tempfile::tempdir().unwrap();
    let config = ResearchConfig {
        openai_api_key: None,
        ..test_config(&dir)
    };

    let provider = MockProvider::new(Source::Exa);
    let engine = EngineBuilder::new(config)
        .provider(provider)
        .model(MockModel::new())
        .build();

    let query = base_query().with_providers(vec![Source::Exa]);
    let response = engine.run(query).await;

    assert!(!response.success);
    assert_eq!(response.workflow_stats.state, RunState::Failed);
    assert!(response
        .error
        .as_deref()
        .unwrap()
        .contains("OPENAI_API_KEY"));
}

#[tokio::test]
async fn enhancement_marks_keywords_in_results() {
    let dir = tempfile::tempdir().unwrap();

    let mut article = Article::new(
        "Immunotherapy combination data released",
        "The immunotherapy arm outperformed chemotherapy in prostate cancer.",
        "https://example.org/enh",
        Source::Pubmed,
        "primary",
    );
    article.raw_date = Some("2024-10-04".into());

    let engine = EngineBuilder::new(test_config(&dir))
        .provider(MockProvider::new(Source::Pubmed).with_articles("primary", vec![article]))
        .model(MockModel::new().with_relevance_response(verdict_json(85)))
        .build();

    let query = base_query().with_providers(vec![Source::Pubmed]);
    let response = engine.run(query).await;

    let highlighted = response.results[0].highlighted_content.as_deref().unwrap();
    assert!(highlighted.contains("«immunotherapy»"));
    assert!(highlighted.contains("«prostate cancer»"));
}
