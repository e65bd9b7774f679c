//! In-memory fetcher and payload builders for tests and offline runs.
//!
//! `FixtureFetcher` serves canned payloads keyed by symbol and counts calls, so
//! tests can assert that the snapshot store did (or did not) hit upstream.

use super::provider::{DataError, PriceFetcher};
use chrono::{Duration, NaiveDate};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

/// A PriceFetcher backed by an in-memory map of symbol → payload.
#[derive(Debug, Default)]
pub struct FixtureFetcher {
    payloads: Mutex<HashMap<String, Vec<u8>>>,
    calls: AtomicUsize,
    delay: Option<std::time::Duration>,
}

impl FixtureFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep this long inside every fetch (widens race windows in tests).
    pub fn with_delay(mut self, delay: std::time::Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_payload(self, symbol: &str, payload: Vec<u8>) -> Self {
        self.set_payload(symbol, payload);
        self
    }

    pub fn set_payload(&self, symbol: &str, payload: Vec<u8>) {
        self.payloads
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(symbol.to_string(), payload);
    }

    /// Total number of `fetch` calls so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl PriceFetcher for FixtureFetcher {
    fn name(&self) -> &str {
        "fixture"
    }

    fn fetch(&self, symbol: &str, _since: NaiveDate) -> Result<Vec<u8>, DataError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        self.payloads
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(symbol)
            .cloned()
            .ok_or_else(|| DataError::SymbolNotFound {
                symbol: symbol.to_string(),
            })
    }
}

/// Build an upstream-shaped payload from `(date, adjusted_close)` pairs.
pub fn payload_from_points(points: &[(NaiveDate, f64)]) -> Vec<u8> {
    let records: Vec<serde_json::Value> = points
        .iter()
        .map(|(date, adj)| {
            serde_json::json!({
                "date": date.format("%Y-%m-%d").to_string(),
                "open": adj,
                "high": adj,
                "low": adj,
                "close": adj,
                "adjusted_close": adj,
                "volume": 1000,
            })
        })
        .collect();
    serde_json::Value::Array(records).to_string().into_bytes()
}

/// Payload with one record per consecutive calendar day starting at `start`.
pub fn daily_payload(start: NaiveDate, closes: &[f64]) -> Vec<u8> {
    let points: Vec<(NaiveDate, f64)> = closes
        .iter()
        .enumerate()
        .map(|(i, c)| (start + Duration::days(i as i64), *c))
        .collect();
    payload_from_points(&points)
}

/// Payload with one record per weekday (Mon–Fri) starting at `start`,
/// mimicking an exchange calendar without holidays.
pub fn weekday_payload(start: NaiveDate, closes: &[f64]) -> Vec<u8> {
    use chrono::{Datelike, Weekday};

    let mut points = Vec::with_capacity(closes.len());
    let mut date = start;
    for close in closes {
        while matches!(date.weekday(), Weekday::Sat | Weekday::Sun) {
            date += Duration::days(1);
        }
        points.push((date, *close));
        date += Duration::days(1);
    }
    payload_from_points(&points)
}
