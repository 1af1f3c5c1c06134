//! Core data types for the research pipeline.

mod article;
mod query;
mod stats;

pub use article::{Article, DateOrigin, Source};
pub use query::{Query, SearchMode};
pub use stats::{
    PhaseTimings, ProviderStats, RunState, RunStats, ScoreBands, StrategyStats,
};
