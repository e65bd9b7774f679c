//! Decode and validate an upstream payload into a PriceSeries.
//!
//! The payload is untrusted. Anything that is not a non-empty JSON array of
//! well-formed daily records fails the decode; nothing is silently dropped
//! except exact-date duplicates, where the later record wins.

use super::provider::DataError;
use crate::domain::{DailyBar, PriceSeries};
use chrono::{Duration, NaiveDate, Utc};
use serde::Deserialize;

/// Bars dated before this are rejected as corrupt.
pub const EARLIEST_BAR_DATE: NaiveDate = match NaiveDate::from_ymd_opt(1900, 1, 1) {
    Some(date) => date,
    None => NaiveDate::MIN,
};

/// Days a bar may lie after the capture date (exchange-local vs UTC dating).
pub const MAX_FUTURE_DAYS: i64 = 1;

/// One record as the upstream sends it. Dates stay strings here so a bad
/// date can be reported with its position.
#[derive(Debug, Deserialize)]
struct WireBar {
    date: String,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    adjusted_close: f64,
    volume: f64,
}

/// Decode `raw` into a strictly ascending series for `symbol`, as captured today (UTC).
pub fn decode_series(symbol: &str, raw: &[u8]) -> Result<PriceSeries, DataError> {
    decode_series_as_of(symbol, raw, Utc::now().date_naive())
}

/// Decode `raw` as captured on `as_of`. Bars outside
/// `[EARLIEST_BAR_DATE, as_of + MAX_FUTURE_DAYS]` fail the decode.
pub fn decode_series_as_of(
    symbol: &str,
    raw: &[u8],
    as_of: NaiveDate,
) -> Result<PriceSeries, DataError> {
    let latest = as_of
        .checked_add_signed(Duration::days(MAX_FUTURE_DAYS))
        .unwrap_or(NaiveDate::MAX);
    let records: Vec<WireBar> = serde_json::from_slice(raw).map_err(|e| {
        DataError::ResponseFormatChanged(format!(
            "{symbol}: expected a JSON array of daily bars: {e}"
        ))
    })?;

    if records.is_empty() {
        return Err(DataError::EmptySeries {
            symbol: symbol.to_string(),
        });
    }

    let mut bars: Vec<DailyBar> = Vec::with_capacity(records.len());
    for (i, rec) in records.into_iter().enumerate() {
        let bar = to_bar(symbol, i, rec)?;
        if bar.date < EARLIEST_BAR_DATE || bar.date > latest {
            return Err(DataError::InvalidBar {
                symbol: symbol.to_string(),
                reason: format!(
                    "record {i} dated {} is outside {EARLIEST_BAR_DATE}..={latest}",
                    bar.date
                ),
            });
        }
        match bars.last_mut() {
            Some(prev) if bar.date < prev.date => {
                return Err(DataError::InvalidBar {
                    symbol: symbol.to_string(),
                    reason: format!(
                        "record {i} dated {} precedes {}",
                        bar.date, prev.date
                    ),
                });
            }
            // Same day reported twice: keep the later record
            Some(prev) if bar.date == prev.date => *prev = bar,
            _ => bars.push(bar),
        }
    }

    PriceSeries::new(symbol, bars).map_err(|e| DataError::InvalidBar {
        symbol: symbol.to_string(),
        reason: e.to_string(),
    })
}

fn to_bar(symbol: &str, index: usize, rec: WireBar) -> Result<DailyBar, DataError> {
    let invalid = |reason: String| DataError::InvalidBar {
        symbol: symbol.to_string(),
        reason,
    };

    let date = NaiveDate::parse_from_str(rec.date.trim(), "%Y-%m-%d")
        .map_err(|e| invalid(format!("record {index} has unparseable date '{}': {e}", rec.date)))?;

    if !rec.volume.is_finite() || rec.volume < 0.0 {
        return Err(invalid(format!(
            "record {index} ({date}) has invalid volume {}",
            rec.volume
        )));
    }

    let bar = DailyBar {
        date,
        open: rec.open,
        high: rec.high,
        low: rec.low,
        close: rec.close,
        adj_close: rec.adjusted_close,
        volume: rec.volume.round() as u64,
    };

    if !bar.has_valid_prices() {
        return Err(invalid(format!(
            "record {index} ({date}) has a negative or non-finite price"
        )));
    }

    Ok(bar)
}
