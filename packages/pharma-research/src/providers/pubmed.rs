//! PubMed adapter using the two-step Entrez protocol.
//!
//! `esearch.fcgi` returns matching PMIDs for a boolean query; `efetch.fcgi`
//! returns article detail XML for those PMIDs. Entrez asks unauthenticated
//! clients to stay under ~3 requests/second, so calls go through a
//! `governor` rate limiter.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use governor::{Quota, RateLimiter};
use regex::Regex;
use serde::Deserialize;
use tracing::debug;

use crate::error::{ProviderError, ProviderErrorKind};
use crate::providers::send_with_retry;
use crate::strategies::StrategyPlan;
use crate::traits::SearchProvider;
use crate::types::{Article, Query, SearchMode, Source};

const ESEARCH_URL: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils/esearch.fcgi";
const EFETCH_URL: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils/efetch.fcgi";

type DirectRateLimiter = RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// PubMed search adapter.
pub struct PubmedProvider {
    client: reqwest::Client,
    email: Option<String>,
    timeout: Duration,
    limiter: Arc<DirectRateLimiter>,
}

impl PubmedProvider {
    /// Create a new adapter. `min_interval` is the minimum pause between
    /// Entrez calls.
    pub fn new(email: Option<String>, timeout: Duration, min_interval: Duration) -> Self {
        let quota =
            Quota::with_period(min_interval).expect("pubmed min interval must be non-zero");
        Self {
            client: reqwest::Client::new(),
            email,
            timeout,
            limiter: Arc::new(RateLimiter::direct(quota)),
        }
    }

    /// Build the boolean term: each keyword as a Title/Abstract phrase,
    /// OR-joined (AND for co-occurrence mode), plus the publication-date
    /// range clause.
    fn build_term(query: &Query) -> String {
        let field = match query.mode {
            SearchMode::TitleOnly => "Title",
            _ => "Title/Abstract",
        };
        let joiner = match query.mode {
            SearchMode::Cooccurrence => " AND ",
            _ => " OR ",
        };
        let keyword_clause = query
            .all_keywords()
            .iter()
            .map(|kw| format!("(\"{kw}\"[{field}])"))
            .collect::<Vec<_>>()
            .join(joiner);

        let date_clause = format!(
            "({}:{}[dp])",
            query.start_date.format("%Y/%m/%d"),
            query.end_date.format("%Y/%m/%d"),
        );

        format!("({keyword_clause}) AND {date_clause}")
    }
}

#[derive(Debug, Deserialize)]
struct EsearchResponse {
    esearchresult: EsearchResult,
}

#[derive(Debug, Deserialize)]
struct EsearchResult {
    #[serde(default)]
    idlist: Vec<String>,
}

#[async_trait]
impl SearchProvider for PubmedProvider {
    fn source(&self) -> Source {
        Source::Pubmed
    }

    async fn search(
        &self,
        query: &Query,
        plan: &StrategyPlan,
        limit: usize,
    ) -> Result<Vec<Article>, ProviderError> {
        let term = Self::build_term(query);
        debug!(term = %term, "pubmed esearch");

        self.limiter.until_ready().await;
        let retmax = limit.to_string();
        let mut search_params = vec![
            ("db", "pubmed"),
            ("term", term.as_str()),
            ("retmax", retmax.as_str()),
            ("retmode", "json"),
            ("sort", "relevance"),
        ];
        if let Some(email) = &self.email {
            search_params.push(("email", email.as_str()));
        }

        let response = send_with_retry(
            || {
                self.client
                    .get(ESEARCH_URL)
                    .query(&search_params)
                    .timeout(self.timeout)
            },
            Source::Pubmed,
            &plan.name,
        )
        .await?;

        let search: EsearchResponse = response.json().await.map_err(|e| {
            ProviderError::new(
                Source::Pubmed,
                &plan.name,
                ProviderErrorKind::Parse(e.to_string()),
            )
        })?;

        let pmids = search.esearchresult.idlist;
        if pmids.is_empty() {
            return Ok(Vec::new());
        }

        self.limiter.until_ready().await;
        let id_list = pmids.join(",");
        let fetch_params = [
            ("db", "pubmed"),
            ("id", id_list.as_str()),
            ("retmode", "xml"),
        ];

        let response = send_with_retry(
            || {
                self.client
                    .get(EFETCH_URL)
                    .query(&fetch_params)
                    .timeout(self.timeout)
            },
            Source::Pubmed,
            &plan.name,
        )
        .await?;

        let xml = response.text().await.map_err(|e| {
            ProviderError::new(
                Source::Pubmed,
                &plan.name,
                ProviderErrorKind::Parse(e.to_string()),
            )
        })?;

        Ok(parse_pubmed_xml(&xml, &plan.name))
    }
}

/// Extract article records from efetch XML.
///
/// Field-level regex extraction over `<PubmedArticle>` blocks; articles
/// whose title cannot be found are skipped rather than failing the batch.
fn parse_pubmed_xml(xml: &str, strategy: &str) -> Vec<Article> {
    let article_re = regex("(?s)<PubmedArticle>(.*?)</PubmedArticle>");
    let title_re = regex("(?s)<ArticleTitle>(.*?)</ArticleTitle>");
    let abstract_re = regex("(?s)<AbstractText[^>]*>(.*?)</AbstractText>");
    let pmid_re = regex("<PMID[^>]*>([^<]+)</PMID>");
    let date_re = regex(
        "(?s)<PubDate>.*?<Year>(\\d{4})</Year>.*?<Month>([^<]+)</Month>(?:.*?<Day>(\\d{1,2})</Day>)?",
    );
    let author_re =
        regex("(?s)<Author[^>]*>.*?<LastName>(.*?)</LastName>.*?<ForeName>(.*?)</ForeName>");

    let mut results = Vec::new();

    for block in article_re.captures_iter(xml) {
        let body = &block[1];

        let Some(title) = title_re.captures(body).map(|c| strip_tags(&c[1])) else {
            continue;
        };
        let abstract_text = abstract_re
            .captures_iter(body)
            .map(|c| strip_tags(&c[1]))
            .collect::<Vec<_>>()
            .join(" ");
        let pmid = pmid_re
            .captures(body)
            .map(|c| c[1].trim().to_string())
            .unwrap_or_default();
        if pmid.is_empty() {
            continue;
        }

        let raw_date = date_re.captures(body).and_then(|c| {
            let year = &c[1];
            let month = month_number(c[2].trim())?;
            let day: u32 = c.get(3).map_or(1, |d| d.as_str().parse().unwrap_or(1));
            Some(format!("{year}-{month:02}-{day:02}"))
        });

        let authors: Vec<String> = author_re
            .captures_iter(body)
            .take(4)
            .map(|c| format!("{} {}", c[2].trim(), c[1].trim()))
            .collect();
        let authors = if authors.len() > 3 {
            format!("{} et al.", authors[..3].join("; "))
        } else {
            authors.join("; ")
        };

        let mut article = Article::new(
            title,
            abstract_text,
            format!("https://pubmed.ncbi.nlm.nih.gov/{pmid}"),
            Source::Pubmed,
            strategy,
        )
        .with_authors(authors);
        article.raw_date = raw_date;
        results.push(article);
    }

    results
}

fn regex(pattern: &str) -> Regex {
    Regex::new(pattern).expect("static pubmed pattern must compile")
}

fn strip_tags(s: &str) -> String {
    static TAG_RE: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();
    let tag_re = TAG_RE.get_or_init(|| regex("<[^>]+>"));
    tag_re.replace_all(s, "").trim().to_string()
}

/// PubDate months appear both as numbers and as English abbreviations.
fn month_number(month: &str) -> Option<u32> {
    if let Ok(n) = month.parse::<u32>() {
        return (1..=12).contains(&n).then_some(n);
    }
    match &month.to_lowercase()[..month.len().min(3)] {
        "jan" => Some(1),
        "feb" => Some(2),
        "mar" => Some(3),
        "apr" => Some(4),
        "may" => Some(5),
        "jun" => Some(6),
        "jul" => Some(7),
        "aug" => Some(8),
        "sep" => Some(9),
        "oct" => Some(10),
        "nov" => Some(11),
        "dec" => Some(12),
        _ => None,
    }
}
