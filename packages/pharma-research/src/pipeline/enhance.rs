//! Content enhancement: keyword marking over a relevant content window.
//!
//! Produces `highlighted_content` by wrapping whole-word keyword matches
//! in `«…»` markers, preserving the original casing. `content` itself is
//! never touched. The marking is idempotent: spans already inside markers
//! are not wrapped again.

use regex::RegexBuilder;
use tracing::debug;

use crate::types::{Article, Query};

const WINDOW_MIN_CHARS: usize = 200;
const WINDOW_MAX_CHARS: usize = 5000;

/// Enhance every article in place.
pub fn enhance_articles(articles: &mut [Article], query: &Query) {
    let search_keywords = query.all_keywords();
    for article in articles.iter_mut() {
        // Union of search, mentioned, and pertinent keywords, first
        // occurrence wins case-insensitively
        let mut seen = std::collections::HashSet::new();
        let keywords: Vec<String> = search_keywords
            .iter()
            .chain(article.mentioned_keywords.iter())
            .chain(article.pertinent_keywords.iter())
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty() && seen.insert(k.to_lowercase()))
            .collect();

        let window = relevant_window(&article.content, &keywords);
        article.highlighted_content = Some(highlight_keywords(&window, &keywords));
    }
    debug!(articles = articles.len(), "content enhancement complete");
}

/// Wrap every case-insensitive whole-word match of any keyword in `«…»`,
/// keeping the matched text's own casing. Longer keywords are applied
/// first so phrases win over their component words, and anything already
/// inside a marker is left alone.
pub fn highlight_keywords(text: &str, keywords: &[String]) -> String {
    let mut keywords: Vec<&String> = keywords.iter().filter(|k| !k.trim().is_empty()).collect();
    keywords.sort_by_key(|k| std::cmp::Reverse(k.len()));

    let mut out = text.to_string();
    for keyword in keywords {
        // The first alternation branch swallows spans that are already
        // marked so only bare occurrences (group 1) get wrapped.
        let pattern = format!("«[^«»]*»|\\b({})\\b", regex::escape(keyword));
        let Ok(re) = RegexBuilder::new(&pattern).case_insensitive(true).build() else {
            continue;
        };
        out = re
            .replace_all(&out, |caps: &regex::Captures| match caps.get(1) {
                Some(m) => format!("«{}»", m.as_str()),
                None => caps[0].to_string(),
            })
            .into_owned();
    }
    out
}

/// Pick the keyword-densest window of the content, between
/// `WINDOW_MIN_CHARS` and `WINDOW_MAX_CHARS`, with ellipses marking cut
/// edges. Falls back to the content head when no keyword appears.
pub fn relevant_window(content: &str, keywords: &[String]) -> String {
    if content.is_empty() {
        return String::new();
    }
    if content.len() <= WINDOW_MAX_CHARS {
        return content.to_string();
    }

    // Case-insensitive match positions; ASCII lowering keeps byte offsets
    // aligned with the original text
    let haystack = content.to_ascii_lowercase();
    let mut positions: Vec<usize> = Vec::new();
    for keyword in keywords {
        let needle = keyword.trim().to_ascii_lowercase();
        if needle.is_empty() {
            continue;
        }
        let mut from = 0;
        while let Some(found) = haystack[from..].find(&needle) {
            positions.push(from + found);
            from += found + 1;
            if from >= haystack.len() {
                break;
            }
        }
    }

    if positions.is_empty() {
        return format!("{}...", slice_at_boundaries(content, 0, WINDOW_MAX_CHARS));
    }
    positions.sort_unstable();

    // Try growing windows centred on each hit; densest window wins,
    // longer windows break ties
    let mut best: Option<(usize, usize, usize)> = None; // (count, start, end)
    for &position in &positions {
        for size in [
            WINDOW_MIN_CHARS,
            WINDOW_MIN_CHARS * 2,
            WINDOW_MIN_CHARS * 3,
            WINDOW_MAX_CHARS,
        ] {
            let start = position.saturating_sub(size / 2);
            let end = (start + size).min(content.len());
            let count = positions.iter().filter(|&&p| start <= p && p < end).count();
            let better = match best {
                None => true,
                Some((best_count, best_start, best_end)) => {
                    count > best_count
                        || (count == best_count && end - start > best_end - best_start)
                }
            };
            if better {
                best = Some((count, start, end));
            }
        }
    }

    let (_, start, end) = best.expect("positions are non-empty");
    let window = slice_at_boundaries(content, start, end);
    let mut out = String::new();
    if start > 0 {
        out.push_str("...");
    }
    out.push_str(window);
    if end < content.len() {
        out.push_str("...");
    }
    out
}

/// Slice by byte range, nudging both ends onto char boundaries.
fn slice_at_boundaries(text: &str, mut start: usize, mut end: usize) -> &str {
    end = end.min(text.len());
    while start > 0 && !text.is_char_boundary(start) {
        start -= 1;
    }
    while end < text.len() && !text.is_char_boundary(end) {
        end += 1;
    }
    &text[start..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Source;
    use chrono::NaiveDate;

    fn keywords(words: &[&str]) -> Vec<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    #[test]
    fn wraps_whole_word_matches_preserving_case() {
        let out = highlight_keywords(
            "Insulin therapy and INSULIN pumps improve outcomes.",
            &keywords(&["insulin"]),
        );
        assert_eq!(out, "«Insulin» therapy and «INSULIN» pumps improve outcomes.");
    }

    #[test]
    fn does_not_match_inside_words() {
        // "AI" must not light up inside "laid"
        let out = highlight_keywords("The plan was laid out with AI support.", &keywords(&["AI"]));
        assert_eq!(out, "The plan was laid out with «AI» support.");
    }

    #[test]
    fn highlighting_is_idempotent() {
        let kws = keywords(&["prostate cancer", "cancer"]);
        let once = highlight_keywords("New prostate cancer findings on cancer care.", &kws);
        let twice = highlight_keywords(&once, &kws);
        assert_eq!(once, twice);
    }

    #[test]
    fn phrases_win_over_component_words() {
        let out = highlight_keywords(
            "New prostate cancer study published.",
            &keywords(&["cancer", "prostate cancer"]),
        );
        assert_eq!(out, "New «prostate cancer» study published.");
    }

    #[test]
    fn multiple_keywords_all_marked() {
        let out = highlight_keywords(
            "FDA approves semaglutide for obesity.",
            &keywords(&["FDA", "semaglutide", "obesity"]),
        );
        assert_eq!(out, "«FDA» approves «semaglutide» for «obesity».");
    }

    #[test]
    fn empty_keywords_change_nothing() {
        let text = "Nothing to see here.";
        assert_eq!(highlight_keywords(text, &keywords(&["", "  "])), text);
    }

    #[test]
    fn short_content_returned_whole() {
        let content = "short body mentioning insulin";
        assert_eq!(relevant_window(content, &keywords(&["insulin"])), content);
    }

    #[test]
    fn long_content_is_windowed_around_keywords() {
        let mut content = "padding ".repeat(1000);
        content.push_str("the keyword semaglutide appears here");
        content.push_str(&" trailing".repeat(500));

        let window = relevant_window(&content, &keywords(&["semaglutide"]));
        assert!(window.contains("semaglutide"));
        assert!(window.len() <= WINDOW_MAX_CHARS + 6);
        assert!(window.starts_with("..."));
    }

    #[test]
    fn no_keyword_hits_fall_back_to_content_head() {
        let content = "intro text ".repeat(1000);
        let window = relevant_window(&content, &keywords(&["absent"]));
        assert!(window.starts_with("intro text"));
        assert!(window.ends_with("..."));
    }

    #[test]
    fn enhance_does_not_touch_content() {
        let mut article = Article::new(
            "Title",
            "Insulin data for the insulin cohort.",
            "https://ex.com/a",
            Source::Pubmed,
            "primary",
        );
        article.mentioned_keywords = vec!["cohort".into()];
        let original_content = article.content.clone();

        let query = Query::new(
            vec!["insulin".into()],
            NaiveDate::from_ymd_opt(2024, 10, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 10, 17).unwrap(),
        )
        .unwrap();

        let mut articles = vec![article];
        enhance_articles(&mut articles, &query);

        assert_eq!(articles[0].content, original_content);
        let highlighted = articles[0].highlighted_content.as_ref().unwrap();
        assert!(highlighted.contains("«Insulin»"));
        assert!(highlighted.contains("«cohort»"));
    }

    #[test]
    fn enhance_twice_is_stable() {
        let query = Query::new(
            vec!["insulin".into()],
            NaiveDate::from_ymd_opt(2024, 10, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 10, 17).unwrap(),
        )
        .unwrap();
        let mut articles = vec![Article::new(
            "T",
            "Insulin everywhere.",
            "https://ex.com/a",
            Source::Exa,
            "neural_open",
        )];

        enhance_articles(&mut articles, &query);
        let first = articles[0].highlighted_content.clone();
        enhance_articles(&mut articles, &query);
        assert_eq!(articles[0].highlighted_content, first);
    }
}
