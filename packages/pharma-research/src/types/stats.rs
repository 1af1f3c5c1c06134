//! Per-run statistics collected by the orchestrator.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::PipelineError;
use crate::types::Source;

/// Pipeline states, in execution order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    #[default]
    Init,
    Collecting,
    Deduping,
    ResolvingDates,
    FilteringDates,
    Analyzing,
    FilteringScores,
    Enhancing,
    Done,
    Cancelled,
    Failed,
}

impl RunState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunState::Init => "init",
            RunState::Collecting => "collecting",
            RunState::Deduping => "deduping",
            RunState::ResolvingDates => "resolving_dates",
            RunState::FilteringDates => "filtering_dates",
            RunState::Analyzing => "analyzing",
            RunState::FilteringScores => "filtering_scores",
            RunState::Enhancing => "enhancing",
            RunState::Done => "done",
            RunState::Cancelled => "cancelled",
            RunState::Failed => "failed",
        }
    }

    /// Terminal states end a run.
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Done | RunState::Cancelled | RunState::Failed)
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one strategy execution, recorded verbatim for the metadata log.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StrategyStats {
    pub strategy: String,
    pub retrieved: usize,
    /// Duplicate URLs already seen from an earlier strategy of the same
    /// provider; counted against this (the later) strategy
    pub cross_strategy_duplicates: usize,
    /// Duplicate URLs already seen from a different provider
    pub cross_provider_duplicates: usize,
    /// Articles surviving the title-similarity dedup pass
    pub after_dedup: usize,
    pub in_date_range: usize,
    pub final_kept: usize,
    /// Articles no other strategy produced
    pub unique_contribution: usize,
    pub avg_relevance: f64,
    pub elapsed_seconds: f64,
    pub error: Option<String>,
}

/// Aggregated per-provider numbers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderStats {
    pub retrieved: usize,
    pub after_dedup: usize,
    pub unique_contribution: usize,
    /// Share of retrieved articles lost to any dedup layer, 0-100
    pub duplicate_rate: f64,
    pub avg_relevance: f64,
    pub final_kept: usize,
    pub elapsed_seconds: f64,
    pub strategies: Vec<StrategyStats>,
}

/// Wall-clock seconds spent in each phase.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PhaseTimings {
    pub collection: f64,
    pub dedup: f64,
    pub date_extraction: f64,
    pub relevance_analysis: f64,
    pub enhancement: f64,
    pub total: f64,
}

/// Counts of scores per band.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ScoreBands {
    /// score >= 80
    pub high: usize,
    /// 60 <= score < 80
    pub medium: usize,
    /// 40 <= score < 60
    pub low: usize,
    /// score < 40
    pub below: usize,
}

impl ScoreBands {
    pub fn record(&mut self, score: u8) {
        match score {
            80.. => self.high += 1,
            60..=79 => self.medium += 1,
            40..=59 => self.low += 1,
            _ => self.below += 1,
        }
    }
}

/// Counters for every pipeline stage of one run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunStats {
    pub state: RunState,
    pub success: bool,

    // Collection + dedup
    pub collected: usize,
    pub unique: usize,
    pub duplicates_removed: usize,
    pub duplicate_groups: usize,

    // Date resolution
    pub with_dates: usize,
    pub without_dates: usize,
    /// Dates that did not come from provider metadata
    pub model_extracted: usize,

    // Date filtering
    pub in_range: usize,
    pub out_of_range: usize,
    /// Kept articles whose date came from the model tier
    pub model_rescued: usize,

    // Relevance
    pub analyzed: usize,
    /// Articles retained with a neutral score after a failed analysis
    pub analysis_failures: usize,
    pub kept: usize,
    pub filtered: usize,
    pub score_min: Option<u8>,
    pub score_max: Option<u8>,
    pub score_avg: f64,
    pub score_bands: ScoreBands,

    /// Article-type breakdown from the analyzer verdicts
    pub article_types: BTreeMap<String, usize>,

    /// Per-provider aggregates, keyed by provider name
    pub providers: BTreeMap<Source, ProviderStats>,

    pub timings: PhaseTimings,

    /// Short, non-sensitive error descriptions accumulated during the run
    pub errors: Vec<String>,
}

impl RunStats {
    /// Check the cross-stage counter invariants. A failure here is an
    /// internal bug and aborts the run as FAILED.
    pub fn check_consistency(&self) -> Result<(), PipelineError> {
        if self.collected != self.unique + self.duplicates_removed {
            return Err(PipelineError::Invariant(format!(
                "collected ({}) != unique ({}) + duplicates_removed ({})",
                self.collected, self.unique, self.duplicates_removed
            )));
        }
        if self.analyzed != self.kept + self.filtered {
            return Err(PipelineError::Invariant(format!(
                "analyzed ({}) != kept ({}) + filtered ({})",
                self.analyzed, self.kept, self.filtered
            )));
        }
        if self.unique != self.with_dates + self.without_dates {
            return Err(PipelineError::Invariant(format!(
                "unique ({}) != with_dates ({}) + without_dates ({})",
                self.unique, self.with_dates, self.without_dates
            )));
        }
        Ok(())
    }

    /// Record an analyzed score into the distribution counters.
    pub fn record_score(&mut self, score: u8) {
        self.score_bands.record(score);
        self.score_min = Some(self.score_min.map_or(score, |m| m.min(score)));
        self.score_max = Some(self.score_max.map_or(score, |m| m.max(score)));
    }
}
