//! Provider adapters: PubMed, Exa, Tavily, and NewsAPI.
//!
//! Each adapter implements [`SearchProvider`](crate::traits::SearchProvider),
//! normalizing the provider's native response onto [`Article`](crate::types::Article)
//! with `raw_date` preserved verbatim and `source`/`strategy` tagged.

mod exa;
mod newsapi;
mod pubmed;
mod tavily;

pub use exa::ExaProvider;
pub use newsapi::NewsApiProvider;
pub use pubmed::PubmedProvider;
pub use tavily::TavilyProvider;

use std::time::Duration;

use rand::Rng;
use tracing::warn;

use crate::error::{ProviderError, ProviderErrorKind};
use crate::types::Source;

/// Maximum retry attempts for transient provider failures.
const MAX_RETRIES: u32 = 3;

/// Base delay for exponential backoff between retries.
const BACKOFF_BASE: Duration = Duration::from_millis(500);

/// Send a request, retrying transient failures (429/5xx, timeouts,
/// connection errors) with exponential backoff and jitter.
///
/// The builder closure is invoked once per attempt because a
/// `RequestBuilder` is consumed by `send`.
pub(crate) async fn send_with_retry<F>(
    mut build: F,
    provider: Source,
    strategy: &str,
) -> Result<reqwest::Response, ProviderError>
where
    F: FnMut() -> reqwest::RequestBuilder,
{
    let mut attempt = 0;
    loop {
        match build().send().await {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    return Ok(response);
                }
                let transient = status.as_u16() == 429 || status.is_server_error();
                if transient && attempt < MAX_RETRIES {
                    let delay = backoff_delay(attempt);
                    warn!(
                        provider = %provider,
                        strategy,
                        status = status.as_u16(),
                        attempt = attempt + 1,
                        "transient provider failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                    continue;
                }
                let body = response.text().await.unwrap_or_default();
                let body = body.chars().take(300).collect();
                return Err(ProviderError::new(
                    provider,
                    strategy,
                    ProviderErrorKind::Status {
                        status: status.as_u16(),
                        body,
                    },
                ));
            }
            Err(e) => {
                let kind = if e.is_timeout() {
                    ProviderErrorKind::Timeout
                } else {
                    ProviderErrorKind::Network(e.to_string())
                };
                if kind.is_transient() && attempt < MAX_RETRIES {
                    let delay = backoff_delay(attempt);
                    warn!(
                        provider = %provider,
                        strategy,
                        error = %e,
                        attempt = attempt + 1,
                        "provider request failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                    continue;
                }
                return Err(ProviderError::new(provider, strategy, kind));
            }
        }
    }
}

/// Exponential backoff with up to 25% jitter.
fn backoff_delay(attempt: u32) -> Duration {
    let base = BACKOFF_BASE * 2u32.saturating_pow(attempt);
    let jitter = rand::thread_rng().gen_range(0..=base.as_millis() as u64 / 4);
    base + Duration::from_millis(jitter)
}
