//! Price fetcher trait and structured error types.
//!
//! The PriceFetcher trait abstracts over the upstream daily-price source so the
//! snapshot store can be exercised against a fake in tests. Fetchers return the
//! upstream payload untouched; decoding and validation happen in `decode`.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Structured error types for data operations.
///
/// These are displayable in both server responses and CLI output.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("rate limited by provider (retry after {retry_after_secs}s)")]
    RateLimited { retry_after_secs: u64 },

    #[error("authentication required: {0}")]
    AuthenticationRequired(String),

    #[error("symbol not found: {symbol}")]
    SymbolNotFound { symbol: String },

    #[error("upstream returned HTTP {status} for {symbol}")]
    UpstreamStatus { status: u16, symbol: String },

    #[error("response format changed: {0}")]
    ResponseFormatChanged(String),

    #[error("upstream returned no bars for {symbol}")]
    EmptySeries { symbol: String },

    #[error("invalid bar for {symbol}: {reason}")]
    InvalidBar { symbol: String, reason: String },

    #[error("invalid symbol '{symbol}': only [A-Za-z0-9._-] allowed")]
    InvalidSymbol { symbol: String },

    #[error("snapshot error: {0}")]
    SnapshotError(String),

    #[error("snapshot {key} is corrupt and was quarantined: {reason}")]
    CorruptSnapshot { key: String, reason: String },

    #[error("snapshot {key} has schema version {found}, newest supported is {supported}")]
    UnsupportedSnapshotVersion {
        key: String,
        found: u32,
        supported: u32,
    },

    #[error("data error: {0}")]
    Other(String),
}

/// Where a series came from on this request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataSource {
    /// Today's snapshot was already on disk.
    Snapshot,
    /// Pulled from the upstream provider on this request.
    Upstream,
}

/// Trait for upstream daily-price sources.
///
/// `fetch` returns the raw response body for `symbol` starting at `since`.
/// The bytes are untrusted; callers must decode and validate them.
pub trait PriceFetcher: Send + Sync {
    /// Human-readable name of this fetcher (recorded in snapshot metadata).
    fn name(&self) -> &str;

    /// Fetch the daily history for a symbol from `since` to the latest bar.
    fn fetch(&self, symbol: &str, since: NaiveDate) -> Result<Vec<u8>, DataError>;
}

impl<F: PriceFetcher + ?Sized> PriceFetcher for Box<F> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn fetch(&self, symbol: &str, since: NaiveDate) -> Result<Vec<u8>, DataError> {
        (**self).fetch(symbol, since)
    }
}

impl<F: PriceFetcher + ?Sized> PriceFetcher for std::sync::Arc<F> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn fetch(&self, symbol: &str, since: NaiveDate) -> Result<Vec<u8>, DataError> {
        (**self).fetch(symbol, since)
    }
}
