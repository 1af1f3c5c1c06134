//! The single wide row written after each run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::metadata::csv_escape;
use crate::types::{Query, RunStats, Source};

/// Complete metadata for one pipeline run. Created once per invocation
/// and written exactly once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: String,
    pub timestamp: DateTime<Utc>,
    pub alert_name: String,
    pub alert_header: String,
    pub alert_type: String,
    pub user: String,

    pub primary_keywords: Vec<String>,
    pub alias_keywords: Vec<String>,
    pub all_keywords: Vec<String>,
    pub search_type: String,
    pub start_date: String,
    pub end_date: String,
    pub providers_used: Vec<Source>,

    pub stats: RunStats,
}

impl RunRecord {
    /// Assemble the record from the finished run.
    pub fn from_run(query: &Query, stats: RunStats, alert_type: &str) -> Self {
        Self {
            run_id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            alert_name: query.alert_name.clone().unwrap_or_default(),
            alert_header: query.alert_header.clone().unwrap_or_default(),
            alert_type: alert_type.to_string(),
            user: query.user.clone().unwrap_or_default(),
            primary_keywords: query.primary_keywords.clone(),
            alias_keywords: query.alias_keywords.clone(),
            all_keywords: query.all_keywords(),
            search_type: query.mode.as_str().to_string(),
            start_date: query.start_date.to_string(),
            end_date: query.end_date.to_string(),
            providers_used: query.providers.clone(),
            stats,
        }
    }

    /// Column names, in row order. Missing values serialize as empty
    /// columns so the file stays column-aligned across versions.
    pub fn header() -> Vec<String> {
        let mut columns: Vec<String> = [
            "run_id",
            "execution_timestamp",
            "alert_name",
            "alert_header",
            "alert_type",
            "user",
            "primary_keywords",
            "alias_keywords",
            "all_keywords",
            "search_type",
            "start_date",
            "end_date",
            "providers_used",
            "num_providers",
            "total_collected",
            "total_unique_after_dedup",
            "total_duplicates_removed",
            "duplicate_groups_found",
            "overall_duplicate_rate",
            "articles_with_dates",
            "articles_model_extracted",
            "articles_without_dates",
            "articles_in_date_range",
            "articles_out_of_date_range",
            "articles_model_rescued",
            "articles_analyzed",
            "analysis_failures",
            "relevance_high_80plus",
            "relevance_medium_60_79",
            "relevance_low_40_59",
            "relevance_below_40",
            "articles_final_kept",
            "avg_relevance_score",
            "score_min",
            "score_max",
            "article_types_json",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        for provider in Source::ALL {
            let p = provider.as_str();
            for column in [
                "retrieved",
                "after_dedup",
                "strategies_used",
                "unique_contribution",
                "duplicate_rate",
                "avg_relevance",
                "final_kept",
                "elapsed_seconds",
            ] {
                columns.push(format!("{p}_{column}"));
            }
        }

        columns.extend(
            [
                "strategy_details_json",
                "collection_time",
                "dedup_time",
                "date_extraction_time",
                "relevance_time",
                "enhancement_time",
                "total_time",
                "workflow_successful",
                "errors",
            ]
            .iter()
            .map(|s| s.to_string()),
        );
        columns
    }

    /// Serialize the record into one log line.
    pub fn to_csv_row(&self) -> String {
        let stats = &self.stats;
        let duplicate_rate = if stats.collected > 0 {
            stats.duplicates_removed as f64 / stats.collected as f64 * 100.0
        } else {
            0.0
        };

        let mut fields: Vec<String> = vec![
            self.run_id.clone(),
            self.timestamp.to_rfc3339(),
            self.alert_name.clone(),
            self.alert_header.clone(),
            self.alert_type.clone(),
            self.user.clone(),
            self.primary_keywords.join(", "),
            self.alias_keywords.join(", "),
            self.all_keywords.join(", "),
            self.search_type.clone(),
            self.start_date.clone(),
            self.end_date.clone(),
            self.providers_used
                .iter()
                .map(|p| p.as_str())
                .collect::<Vec<_>>()
                .join(", "),
            self.providers_used.len().to_string(),
            stats.collected.to_string(),
            stats.unique.to_string(),
            stats.duplicates_removed.to_string(),
            stats.duplicate_groups.to_string(),
            format!("{duplicate_rate:.2}"),
            stats.with_dates.to_string(),
            stats.model_extracted.to_string(),
            stats.without_dates.to_string(),
            stats.in_range.to_string(),
            stats.out_of_range.to_string(),
            stats.model_rescued.to_string(),
            stats.analyzed.to_string(),
            stats.analysis_failures.to_string(),
            stats.score_bands.high.to_string(),
            stats.score_bands.medium.to_string(),
            stats.score_bands.low.to_string(),
            stats.score_bands.below.to_string(),
            stats.kept.to_string(),
            format!("{:.2}", stats.score_avg),
            stats.score_min.map(|s| s.to_string()).unwrap_or_default(),
            stats.score_max.map(|s| s.to_string()).unwrap_or_default(),
            serde_json::to_string(&stats.article_types).unwrap_or_default(),
        ];

        for provider in Source::ALL {
            match stats.providers.get(&provider) {
                Some(p) => {
                    fields.push(p.retrieved.to_string());
                    fields.push(p.after_dedup.to_string());
                    fields.push(
                        p.strategies
                            .iter()
                            .map(|s| s.strategy.as_str())
                            .collect::<Vec<_>>()
                            .join(", "),
                    );
                    fields.push(p.unique_contribution.to_string());
                    fields.push(format!("{:.2}", p.duplicate_rate));
                    fields.push(format!("{:.2}", p.avg_relevance));
                    fields.push(p.final_kept.to_string());
                    fields.push(format!("{:.2}", p.elapsed_seconds));
                }
                None => {
                    for _ in 0..8 {
                        fields.push(String::new());
                    }
                }
            }
        }

        let strategy_details: std::collections::BTreeMap<&str, &Vec<crate::types::StrategyStats>> =
            stats
                .providers
                .iter()
                .map(|(source, p)| (source.as_str(), &p.strategies))
                .collect();
        fields.push(serde_json::to_string(&strategy_details).unwrap_or_default());

        fields.push(format!("{:.2}", stats.timings.collection));
        fields.push(format!("{:.2}", stats.timings.dedup));
        fields.push(format!("{:.2}", stats.timings.date_extraction));
        fields.push(format!("{:.2}", stats.timings.relevance_analysis));
        fields.push(format!("{:.2}", stats.timings.enhancement));
        fields.push(format!("{:.2}", stats.timings.total));
        fields.push(stats.success.to_string());
        fields.push(stats.errors.join("; "));

        fields
            .iter()
            .map(|f| csv_escape(f))
            .collect::<Vec<_>>()
            .join(",")
    }
}
