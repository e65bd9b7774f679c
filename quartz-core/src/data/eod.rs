//! EOD Historical Data provider.
//!
//! Fetches the end-of-day history for one symbol as a JSON array through the
//! `/api/eod/{symbol}` endpoint. The body is returned verbatim so the snapshot
//! store can persist exactly what the upstream sent.
//!
//! No retries: a failed fetch fails the request that triggered it.

use super::provider::{DataError, PriceFetcher};
use chrono::NaiveDate;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://eodhd.com/api/eod";

/// EOD Historical Data provider.
pub struct EodProvider {
    client: reqwest::blocking::Client,
    base_url: String,
    api_key: String,
}

impl EodProvider {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, DataError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("quartz/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| DataError::Other(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }

    /// Build the history URL for a symbol starting at `since`.
    fn history_url(&self, symbol: &str, since: NaiveDate) -> String {
        format!(
            "{}/{symbol}?api_token={}&fmt=json&from={}",
            self.base_url,
            self.api_key,
            since.format("%Y-%m-%d")
        )
    }

    fn map_status(symbol: &str, resp: &reqwest::blocking::Response) -> Option<DataError> {
        let status = resp.status();
        if status.is_success() {
            return None;
        }

        let err = match status {
            reqwest::StatusCode::UNAUTHORIZED | reqwest::StatusCode::FORBIDDEN => {
                DataError::AuthenticationRequired(format!(
                    "EOD rejected the API token (HTTP {status})"
                ))
            }
            reqwest::StatusCode::NOT_FOUND => DataError::SymbolNotFound {
                symbol: symbol.to_string(),
            },
            reqwest::StatusCode::TOO_MANY_REQUESTS => {
                let retry_after = resp
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<u64>().ok())
                    .unwrap_or(60);
                DataError::RateLimited {
                    retry_after_secs: retry_after,
                }
            }
            other => DataError::UpstreamStatus {
                status: other.as_u16(),
                symbol: symbol.to_string(),
            },
        };
        Some(err)
    }
}

impl PriceFetcher for EodProvider {
    fn name(&self) -> &str {
        "eodhd"
    }

    fn fetch(&self, symbol: &str, since: NaiveDate) -> Result<Vec<u8>, DataError> {
        let url = self.history_url(symbol, since);

        let resp = self.client.get(&url).send().map_err(|e| {
            // The token is part of the URL; keep it out of the error text.
            DataError::NetworkUnreachable(e.without_url().to_string())
        })?;

        if let Some(err) = Self::map_status(symbol, &resp) {
            return Err(err);
        }

        let body = resp
            .bytes()
            .map_err(|e| DataError::NetworkUnreachable(e.without_url().to_string()))?;
        Ok(body.to_vec())
    }
}
