//! Query construction and validation.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::types::Source;

/// How keywords are matched during strategy generation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    /// Any keyword in title or content
    #[default]
    Standard,
    /// Keywords restricted to the title
    #[serde(rename = "title")]
    TitleOnly,
    /// Two or more keywords required together
    Cooccurrence,
}

impl std::str::FromStr for SearchMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "standard" => Ok(SearchMode::Standard),
            "title" => Ok(SearchMode::TitleOnly),
            "cooccurrence" | "co-occurrence" => Ok(SearchMode::Cooccurrence),
            other => Err(format!("unknown search mode: {other}")),
        }
    }
}

impl SearchMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchMode::Standard => "standard",
            SearchMode::TitleOnly => "title",
            SearchMode::Cooccurrence => "cooccurrence",
        }
    }
}

/// A validated research request.
///
/// `start_date <= end_date` holds by construction; both bounds are inclusive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Query {
    pub primary_keywords: Vec<String>,
    pub alias_keywords: Vec<String>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub mode: SearchMode,
    pub providers: Vec<Source>,
    /// Minimum relevance score override; engine default applies when unset
    pub min_score: Option<u8>,
    pub alert_name: Option<String>,
    pub alert_header: Option<String>,
    pub user: Option<String>,
}

impl Query {
    /// Build a query, validating the window and keyword set.
    pub fn new(
        primary_keywords: Vec<String>,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Self, ConfigError> {
        let primary_keywords: Vec<String> = primary_keywords
            .into_iter()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .collect();
        if primary_keywords.is_empty() {
            return Err(ConfigError::NoKeywords);
        }
        if start_date > end_date {
            return Err(ConfigError::InvalidWindow(format!(
                "{start_date} is after {end_date}"
            )));
        }
        Ok(Self {
            primary_keywords,
            alias_keywords: Vec::new(),
            start_date,
            end_date,
            mode: SearchMode::Standard,
            providers: Source::ALL.to_vec(),
            min_score: None,
            alert_name: None,
            alert_header: None,
            user: None,
        })
    }

    /// Parse a comma-joined keyword string into a query.
    pub fn from_keyword_str(
        keywords: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Self, ConfigError> {
        Self::new(
            keywords.split(',').map(|k| k.to_string()).collect(),
            start_date,
            end_date,
        )
    }

    pub fn with_alias_keywords(mut self, aliases: Vec<String>) -> Self {
        self.alias_keywords = aliases
            .into_iter()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .collect();
        self
    }

    pub fn with_mode(mut self, mode: SearchMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_providers(mut self, providers: Vec<Source>) -> Self {
        self.providers = providers;
        self
    }

    pub fn with_min_score(mut self, min_score: u8) -> Self {
        self.min_score = Some(min_score);
        self
    }

    pub fn with_alert(
        mut self,
        name: impl Into<String>,
        header: Option<String>,
        user: Option<String>,
    ) -> Self {
        self.alert_name = Some(name.into());
        self.alert_header = header;
        self.user = user;
        self
    }

    /// Union of primary and alias keywords: order preserved, duplicates
    /// collapsed case-insensitively.
    pub fn all_keywords(&self) -> Vec<String> {
        let mut seen = std::collections::HashSet::new();
        self.primary_keywords
            .iter()
            .chain(self.alias_keywords.iter())
            .filter(|k| seen.insert(k.to_lowercase()))
            .cloned()
            .collect()
    }

    /// Number of days in the inclusive window, at least 1.
    pub fn window_days(&self) -> i64 {
        ((self.end_date - self.start_date).num_days() + 1).max(1)
    }
}
