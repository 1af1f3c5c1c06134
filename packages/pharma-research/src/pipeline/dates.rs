//! Three-tier date resolution and window filtering.
//!
//! Tier 1 parses the provider-supplied date string against a fixed format
//! list. Tier 2 asks the fast model, whose contract is to return exactly
//! `YYYY-MM-DD` or the literal `none`. Tier 3 scans the URL and a window
//! of title + content for date patterns. The first tier to produce a date
//! inside the validity range wins.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, NaiveDateTime, Utc};
use futures::stream::{self, StreamExt};
use regex::Regex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use openai_client::truncate_to_char_boundary;

use crate::config::ResearchConfig;
use crate::traits::{CompletionRequest, LanguageModel, ModelTier};
use crate::types::{Article, DateOrigin, Query};

/// Counters produced by the resolution pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateResolutionStats {
    pub with_dates: usize,
    pub without_dates: usize,
    /// Dates that did not come from provider metadata
    pub model_extracted: usize,
}

/// Counters produced by the window filter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateFilterStats {
    pub in_range: usize,
    pub out_of_range: usize,
    /// Kept articles whose date came from the model tier
    pub model_rescued: usize,
}

/// Resolve dates for every article, up to `date_parallelism` concurrently.
/// One in-flight model call per article.
pub async fn resolve_dates(
    articles: &mut [Article],
    model: Arc<dyn LanguageModel>,
    config: &ResearchConfig,
    cancel: &CancellationToken,
) -> DateResolutionStats {
    let timeout = config.date_model_timeout;
    let parallelism = config.date_parallelism.max(1);

    let resolutions: Vec<(usize, Option<(NaiveDate, DateOrigin)>)> =
        stream::iter(articles.iter().enumerate().map(|(index, article)| {
            let model = Arc::clone(&model);
            let cancel = cancel.clone();
            async move {
                (index, resolve_one(article, model.as_ref(), timeout, &cancel).await)
            }
        }))
        .buffer_unordered(parallelism)
        .collect()
        .await;

    let mut stats = DateResolutionStats::default();
    for (index, resolution) in resolutions {
        match resolution {
            Some((date, origin)) => {
                articles[index].resolved_date = Some(date);
                articles[index].date_origin = origin;
                stats.with_dates += 1;
                if origin != DateOrigin::Metadata {
                    stats.model_extracted += 1;
                }
            }
            None => {
                stats.without_dates += 1;
            }
        }
    }

    info!(
        with_dates = stats.with_dates,
        without_dates = stats.without_dates,
        model_extracted = stats.model_extracted,
        "date resolution complete"
    );
    stats
}

async fn resolve_one(
    article: &Article,
    model: &dyn LanguageModel,
    timeout: Duration,
    cancel: &CancellationToken,
) -> Option<(NaiveDate, DateOrigin)> {
    // Tier 1: provider metadata
    if let Some(raw) = &article.raw_date {
        if let Some(date) = parse_date_string(raw) {
            if is_valid_date(date) {
                debug!(date = %date, title = %article.title, "date from metadata");
                return Some((date, DateOrigin::Metadata));
            }
        }
    }

    // Tier 2: model-assisted, skipped once cancellation is signalled
    if !cancel.is_cancelled() {
        let request = date_extraction_request(article, timeout);
        let response = tokio::select! {
            result = model.complete(request) => result.ok(),
            _ = cancel.cancelled() => None,
        };
        if let Some(text) = response {
            if let Some(date) = parse_model_date(&text) {
                if is_valid_date(date) {
                    debug!(date = %date, title = %article.title, "date from model");
                    return Some((date, DateOrigin::Model));
                }
            }
        }
    }

    // Tier 3: pattern scan over URL, title, and content
    if let Some(date) = regex_extract_date(&article.url, &article.title, &article.content) {
        if is_valid_date(date) {
            debug!(date = %date, title = %article.title, "date from pattern");
            return Some((date, DateOrigin::Regex));
        }
    }

    debug!(title = %article.title, "no valid date found");
    None
}

/// Keep only articles whose resolved date lies inside the inclusive
/// window. Strict mode: no buffer or expansion. Input order is preserved
/// among retained articles.
pub fn filter_by_window(articles: Vec<Article>, query: &Query) -> (Vec<Article>, DateFilterStats) {
    let mut stats = DateFilterStats::default();
    let kept: Vec<Article> = articles
        .into_iter()
        .filter(|article| {
            let Some(date) = article.resolved_date else {
                return false;
            };
            if query.start_date <= date && date <= query.end_date {
                stats.in_range += 1;
                if article.date_origin == DateOrigin::Model {
                    stats.model_rescued += 1;
                }
                true
            } else {
                stats.out_of_range += 1;
                false
            }
        })
        .collect();

    info!(
        in_range = stats.in_range,
        out_of_range = stats.out_of_range,
        model_rescued = stats.model_rescued,
        "date filtering complete"
    );
    (kept, stats)
}

/// Parse a provider date string against the fixed format list.
pub fn parse_date_string(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    // Zoned timestamps first: they carry the most structure
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.date_naive());
    }
    if let Ok(dt) = DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%z") {
        return Some(dt.date_naive());
    }

    const DATETIME_FORMATS: [&str; 3] = [
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M:%SZ",
        "%Y-%m-%d %H:%M:%S",
    ];
    for format in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(dt.date());
        }
    }

    const DATE_FORMATS: [&str; 9] = [
        "%Y-%m-%d",
        "%B %d, %Y",
        "%b %d, %Y",
        "%d %B %Y",
        "%d %b %Y",
        "%m/%d/%Y",
        "%d/%m/%Y",
        "%Y/%m/%d",
        "%Y%m%d",
    ];
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(raw, format) {
            return Some(date);
        }
    }
    None
}

/// A plausible publication date: not before 1990, not more than 30 days
/// in the future.
pub fn is_valid_date(date: NaiveDate) -> bool {
    let floor = NaiveDate::from_ymd_opt(1990, 1, 1).expect("static date");
    let ceiling = Utc::now().date_naive() + ChronoDuration::days(30);
    floor <= date && date <= ceiling
}

/// The model contract: exactly `YYYY-MM-DD`, or the literal `none`.
fn parse_model_date(response: &str) -> Option<NaiveDate> {
    let text = response.trim().to_lowercase();
    if text == "none" || text.is_empty() {
        return None;
    }
    parse_date_string(&text)
}

fn date_extraction_request(article: &Article, timeout: Duration) -> CompletionRequest {
    let mut metadata = format!("Source: {}", article.source);
    if !article.authors.is_empty() {
        metadata.push_str(&format!(
            " | Authors: {}",
            truncate_to_char_boundary(&article.authors, 200)
        ));
    }

    let system = "You are a date extraction specialist. Your job is to find publication dates in medical and pharmaceutical articles.\n\nReturn ONLY the date in YYYY-MM-DD format. If no date is found, return exactly \"none\" (lowercase).\nDo not include any other text, explanation, or formatting.";

    let user = format!(
        "ARTICLE FOR DATE EXTRACTION:\n\n\
         URL: {url}\n\n\
         Title: {title}\n\n\
         Content (first 3000 characters):\n{content}\n\n\
         Metadata/Additional Info:\n{metadata}\n\n\
         TASK: Extract the publication date from this article.\n\n\
         INSTRUCTIONS:\n\
         1. Check URL first - often contains the date (e.g., /2024/03/15/ or /20240315/)\n\
         2. Look for explicit dates in content (publication date, posted date, release date)\n\
         3. Check title and metadata for dates\n\
         4. Only return dates that are clearly publication dates\n\
         5. Format: YYYY-MM-DD (e.g., 2024-03-15)\n\
         6. If no date found: return exactly \"none\"\n\n\
         Return ONLY the date or \"none\".",
        url = truncate_to_char_boundary(&article.url, 200),
        title = truncate_to_char_boundary(&article.title, 500),
        content = truncate_to_char_boundary(&article.content, 3000),
    );

    CompletionRequest::new(ModelTier::Fast, system, user)
        .temperature(0.0)
        .max_tokens(50)
        .timeout(timeout)
}

/// Scan URL plus a 2000-character window of title + content for date
/// patterns; the most recent valid match wins.
fn regex_extract_date(url: &str, title: &str, content: &str) -> Option<NaiveDate> {
    let haystack = format!("{url} {title} {content}");
    let haystack = truncate_to_char_boundary(&haystack, 2000);

    let mut candidates: Vec<NaiveDate> = Vec::new();

    for capture in url_path_pattern().captures_iter(haystack) {
        candidates.extend(date_from_ymd(&capture[1], &capture[2], &capture[3]));
    }
    for capture in url_compact_pattern().captures_iter(haystack) {
        if let Ok(date) = NaiveDate::parse_from_str(&capture[1], "%Y%m%d") {
            candidates.push(date);
        }
    }
    for capture in numeric_pattern().captures_iter(haystack) {
        candidates.extend(date_from_ymd(&capture[1], &capture[2], &capture[3]));
    }
    for capture in month_name_pattern().captures_iter(haystack) {
        let text = format!("{} {} {}", &capture[1], &capture[2], &capture[3]);
        for format in ["%B %d %Y", "%b %d %Y"] {
            if let Ok(date) = NaiveDate::parse_from_str(&text, format) {
                candidates.push(date);
                break;
            }
        }
    }
    for capture in day_first_pattern().captures_iter(haystack) {
        let text = format!("{} {} {}", &capture[1], &capture[2], &capture[3]);
        for format in ["%d %B %Y", "%d %b %Y"] {
            if let Ok(date) = NaiveDate::parse_from_str(&text, format) {
                candidates.push(date);
                break;
            }
        }
    }

    candidates.retain(|d| is_valid_date(*d));
    candidates.into_iter().max()
}

fn date_from_ymd(year: &str, month: &str, day: &str) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(
        year.parse().ok()?,
        month.parse().ok()?,
        day.parse().ok()?,
    )
}

fn url_path_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"/(\d{4})/(\d{1,2})/(\d{1,2})/").expect("static pattern"))
}

fn url_compact_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"/(\d{8})/").expect("static pattern"))
}

fn numeric_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d{4})[-/](\d{1,2})[-/](\d{1,2})").expect("static pattern"))
}

fn month_name_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)(January|February|March|April|May|June|July|August|September|October|November|December|Jan|Feb|Mar|Apr|Jun|Jul|Aug|Sep|Oct|Nov|Dec)\.?\s+(\d{1,2}),?\s+(\d{4})",
        )
        .expect("static pattern")
    })
}

fn day_first_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)(\d{1,2})\s+(January|February|March|April|May|June|July|August|September|October|November|December|Jan|Feb|Mar|Apr|Jun|Jul|Aug|Sep|Oct|Nov|Dec)\.?\s+(\d{4})",
        )
        .expect("static pattern")
    })
}
