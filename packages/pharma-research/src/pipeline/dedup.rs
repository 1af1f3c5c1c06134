//! Near-duplicate detection and representative selection.
//!
//! Single-pass grouping: each article is compared against the first member
//! of every existing group; at or above the similarity threshold it joins
//! that group, otherwise it starts a new one. The group member with the
//! most information survives. The pass cannot fail.

use tracing::{debug, info};

use crate::types::Article;

/// Result of the dedup pass.
#[derive(Debug, Default)]
pub struct DedupOutcome {
    /// Survivors, order-stable with respect to the input
    pub kept: Vec<Article>,
    /// Articles replaced by a group representative
    pub removed: Vec<Article>,
    /// Number of groups that actually contained duplicates
    pub duplicate_groups: usize,
    /// Ids of survivors that stood in for at least one duplicate
    pub duplicated_representatives: std::collections::HashSet<String>,
}

/// Ratio of matching characters between the lowercased titles, in the
/// difflib sequence-matcher family: `2 * LCS(a, b) / (|a| + |b|)`.
pub fn title_similarity(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.to_lowercase().chars().collect();
    let b: Vec<char> = b.to_lowercase().chars().collect();
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    // LCS length via the classic two-row DP
    let mut prev = vec![0usize; b.len() + 1];
    let mut curr = vec![0usize; b.len() + 1];
    for &ca in &a {
        for (j, &cb) in b.iter().enumerate() {
            curr[j + 1] = if ca == cb {
                prev[j] + 1
            } else {
                prev[j + 1].max(curr[j])
            };
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    let lcs = prev[b.len()];

    2.0 * lcs as f64 / (a.len() + b.len()) as f64
}

/// Group near-duplicate titles and keep one representative per group.
///
/// Articles with empty titles bypass grouping and pass through
/// individually. Identical fingerprints (same URL) collapse
/// deterministically regardless of title similarity.
pub fn deduplicate(articles: Vec<Article>, threshold: f64) -> DedupOutcome {
    if articles.is_empty() {
        return DedupOutcome::default();
    }
    let total = articles.len();
    info!(articles = total, "starting deduplication");

    // Each group remembers the input position of its first member so the
    // final output can stay order-stable.
    let mut groups: Vec<(usize, Vec<Article>)> = Vec::new();
    let mut passthrough: Vec<(usize, Article)> = Vec::new();
    let mut removed: Vec<Article> = Vec::new();

    'next_article: for (position, article) in articles.into_iter().enumerate() {
        if article.title.is_empty() {
            passthrough.push((position, article));
            continue;
        }

        for (_, group) in groups.iter_mut() {
            let representative = &group[0];
            if representative.id == article.id {
                group.push(article);
                continue 'next_article;
            }
            let similarity = title_similarity(&article.title, &representative.title);
            if similarity >= threshold {
                debug!(
                    similarity,
                    kept = %representative.title,
                    duplicate = %article.title,
                    "grouped near-duplicate title"
                );
                group.push(article);
                continue 'next_article;
            }
        }
        groups.push((position, vec![article]));
    }

    let mut duplicate_groups = 0;
    let mut duplicated_representatives = std::collections::HashSet::new();
    let mut kept: Vec<(usize, Article)> = passthrough;

    for (position, mut group) in groups {
        if group.len() == 1 {
            kept.push((position, group.pop().expect("group has one member")));
            continue;
        }
        duplicate_groups += 1;

        // Representative: longest content, then most author metadata,
        // then longest URL.
        let best = group
            .iter()
            .enumerate()
            .max_by_key(|(_, a)| (a.content.len(), a.authors.len(), a.url.len()))
            .map(|(i, _)| i)
            .expect("group is non-empty");
        let representative = group.swap_remove(best);
        debug!(
            group_size = group.len() + 1,
            kept = %representative.title,
            "selected group representative"
        );
        duplicated_representatives.insert(representative.id.clone());
        removed.extend(group);
        kept.push((position, representative));
    }

    kept.sort_by_key(|(position, _)| *position);
    let kept: Vec<Article> = kept.into_iter().map(|(_, a)| a).collect();

    info!(
        duplicates_removed = removed.len(),
        unique = kept.len(),
        duplicate_groups,
        "deduplication complete"
    );

    DedupOutcome {
        kept,
        removed,
        duplicate_groups,
        duplicated_representatives,
    }
}
