//! Readers over the metadata log for effectiveness analysis.
//!
//! These answer the questions the log exists for: which providers earn
//! their keep, and which strategies retrieve articles that survive the
//! pipeline.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;
use tracing::warn;

use crate::metadata::csv_split;
use crate::types::Source;

/// One log row as a column-name → value map.
pub type LogRow = HashMap<String, String>;

/// Load the `n` most recent rows from the log. Missing files read as
/// empty; malformed rows are skipped with a warning.
pub fn recent_runs(path: &Path, n: usize) -> std::io::Result<Vec<LogRow>> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let mut lines = content.lines();
    let Some(header_line) = lines.next() else {
        return Ok(Vec::new());
    };
    let header = csv_split(header_line);

    let mut rows = Vec::new();
    for line in lines {
        if line.trim().is_empty() {
            continue;
        }
        let fields = csv_split(line);
        if fields.len() != header.len() {
            warn!(
                expected = header.len(),
                got = fields.len(),
                "skipping misaligned metadata row"
            );
            continue;
        }
        rows.push(header.iter().cloned().zip(fields).collect());
    }

    let skip = rows.len().saturating_sub(n);
    Ok(rows.into_iter().skip(skip).collect())
}

/// Aggregated effectiveness of one provider across recent runs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProviderPerformance {
    pub runs_analyzed: usize,
    pub total_retrieved: usize,
    pub total_kept: usize,
    pub avg_relevance: f64,
    /// Kept as a share of retrieved, 0-100
    pub effectiveness_rate: f64,
}

/// Analyze one provider over the `n` most recent runs.
pub fn provider_performance(
    path: &Path,
    provider: Source,
    n: usize,
) -> std::io::Result<ProviderPerformance> {
    let rows = recent_runs(path, n)?;
    let retrieved_key = format!("{}_retrieved", provider.as_str());
    let kept_key = format!("{}_final_kept", provider.as_str());
    let relevance_key = format!("{}_avg_relevance", provider.as_str());

    let mut performance = ProviderPerformance {
        runs_analyzed: rows.len(),
        ..Default::default()
    };
    let mut relevance_samples = Vec::new();

    for row in &rows {
        performance.total_retrieved += parse_or_zero::<usize>(row.get(&retrieved_key));
        performance.total_kept += parse_or_zero::<usize>(row.get(&kept_key));
        let relevance = parse_or_zero::<f64>(row.get(&relevance_key));
        if relevance > 0.0 {
            relevance_samples.push(relevance);
        }
    }

    if !relevance_samples.is_empty() {
        performance.avg_relevance =
            relevance_samples.iter().sum::<f64>() / relevance_samples.len() as f64;
    }
    if performance.total_retrieved > 0 {
        performance.effectiveness_rate =
            performance.total_kept as f64 / performance.total_retrieved as f64 * 100.0;
    }
    Ok(performance)
}

/// Aggregated effectiveness of one strategy across recent runs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StrategyPerformance {
    pub occurrences: usize,
    pub total_retrieved: usize,
    pub total_kept: usize,
    pub effectiveness_rate: f64,
}

#[derive(Debug, Deserialize)]
struct StrategyDetail {
    strategy: String,
    #[serde(default)]
    retrieved: usize,
    #[serde(default)]
    final_kept: usize,
}

/// Analyze every strategy seen in the `n` most recent runs, keyed by
/// `provider/strategy`.
pub fn strategy_performance(
    path: &Path,
    n: usize,
) -> std::io::Result<HashMap<String, StrategyPerformance>> {
    let rows = recent_runs(path, n)?;
    let mut results: HashMap<String, StrategyPerformance> = HashMap::new();

    for row in &rows {
        let Some(blob) = row.get("strategy_details_json") else {
            continue;
        };
        let details: HashMap<String, Vec<StrategyDetail>> = match serde_json::from_str(blob) {
            Ok(details) => details,
            Err(_) => continue,
        };
        for (provider, strategies) in details {
            for strategy in strategies {
                let entry = results
                    .entry(format!("{provider}/{}", strategy.strategy))
                    .or_default();
                entry.occurrences += 1;
                entry.total_retrieved += strategy.retrieved;
                entry.total_kept += strategy.final_kept;
            }
        }
    }

    for performance in results.values_mut() {
        if performance.total_retrieved > 0 {
            performance.effectiveness_rate =
                performance.total_kept as f64 / performance.total_retrieved as f64 * 100.0;
        }
    }
    Ok(results)
}

fn parse_or_zero<T: std::str::FromStr + Default>(value: Option<&String>) -> T {
    value.and_then(|v| v.parse().ok()).unwrap_or_default()
}
