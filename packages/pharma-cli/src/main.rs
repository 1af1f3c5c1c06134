//! Command-line runner for the pharma research pipeline.
//!
//! Reads credentials from the environment, runs one search, and prints
//! the JSON response to stdout. Progress goes to stderr via tracing.

use anyhow::{bail, Context, Result};
use chrono::{Duration, NaiveDate, Utc};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use pharma_research::{Engine, Query, ResearchConfig, SearchMode, Source};

/// Search pharmaceutical news across PubMed, Exa, Tavily, and NewsAPI.
#[derive(Debug, Parser)]
#[command(name = "pharma-research", version, about)]
struct Args {
    /// Comma-separated search keywords
    #[arg(long, value_name = "KW1,KW2,...")]
    keywords: String,

    /// Comma-separated alias keywords merged into the search set
    #[arg(long, value_name = "KW1,KW2,...")]
    aliases: Option<String>,

    /// Window start (YYYY-MM-DD); default is seven days ago
    #[arg(long)]
    start_date: Option<NaiveDate>,

    /// Window end (YYYY-MM-DD); default is today
    #[arg(long)]
    end_date: Option<NaiveDate>,

    /// Search mode: standard, title, or cooccurrence
    #[arg(long, default_value = "standard")]
    search_type: String,

    /// Providers to query (repeatable); default is all four
    #[arg(long = "engine", value_name = "PROVIDER")]
    engines: Vec<String>,

    /// Minimum relevance score to keep an article
    #[arg(long)]
    min_score: Option<u8>,

    /// Alert name recorded in the metadata log
    #[arg(long)]
    alert_name: Option<String>,

    /// User recorded in the metadata log
    #[arg(long)]
    user: Option<String>,

    /// Pretty-print the JSON response
    #[arg(long)]
    pretty: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let query = build_query(&args)?;

    let config = ResearchConfig::from_env();
    let engine = Engine::from_config(config).context("failed to construct engine")?;

    info!(
        keywords = %args.keywords,
        start = %query.start_date,
        end = %query.end_date,
        "starting research run"
    );

    let response = engine.run(query).await;
    engine.shutdown().await;

    let rendered = if args.pretty {
        serde_json::to_string_pretty(&response)?
    } else {
        serde_json::to_string(&response)?
    };
    println!("{rendered}");

    if !response.success {
        bail!(
            "run did not complete: {}",
            response.error.as_deref().unwrap_or("unknown error")
        );
    }
    Ok(())
}

fn build_query(args: &Args) -> Result<Query> {
    let today = Utc::now().date_naive();
    let end_date = args.end_date.unwrap_or(today);
    let start_date = args.start_date.unwrap_or(end_date - Duration::days(7));

    let mut query = Query::from_keyword_str(&args.keywords, start_date, end_date)
        .context("invalid query")?;

    if let Some(aliases) = &args.aliases {
        query = query
            .with_alias_keywords(aliases.split(',').map(|k| k.to_string()).collect());
    }

    let mode: SearchMode = args
        .search_type
        .parse()
        .map_err(|e: String| anyhow::anyhow!(e))?;
    query = query.with_mode(mode);

    if !args.engines.is_empty() {
        let providers = args
            .engines
            .iter()
            .map(|e| e.parse::<Source>().map_err(|e| anyhow::anyhow!(e)))
            .collect::<Result<Vec<_>>>()?;
        query = query.with_providers(providers);
    }

    if let Some(min_score) = args.min_score {
        if min_score > 100 {
            bail!("min-score must be 0-100");
        }
        query = query.with_min_score(min_score);
    }

    if let Some(alert_name) = &args.alert_name {
        query = query.with_alert(alert_name.clone(), None, args.user.clone());
    }

    Ok(query)
}
