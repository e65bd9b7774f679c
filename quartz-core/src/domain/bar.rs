//! DailyBar and PriceSeries — one symbol's daily market history.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One calendar day of market data for one symbol.
///
/// Field names on the wire follow the upstream EOD payload, so
/// `adj_close` serializes as `adjusted_close`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyBar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    #[serde(rename = "adjusted_close")]
    pub adj_close: f64,
    pub volume: u64,
}

impl DailyBar {
    /// The same observation restamped to `date` (last observation carried forward).
    pub fn carried_to(&self, date: NaiveDate) -> Self {
        Self {
            date,
            ..self.clone()
        }
    }

    /// Returns true if every price field is finite and non-negative.
    pub fn has_valid_prices(&self) -> bool {
        [self.open, self.high, self.low, self.close, self.adj_close]
            .iter()
            .all(|p| p.is_finite() && *p >= 0.0)
    }
}

/// Violations of the strictly-ascending date invariant.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SeriesError {
    #[error("bar {index} dated {current} does not follow {previous}")]
    OutOfOrder {
        index: usize,
        previous: NaiveDate,
        current: NaiveDate,
    },
}

/// Ordered daily bars for one symbol, strictly ascending by date.
///
/// Immutable once built; alignment produces a new series.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceSeries {
    symbol: String,
    bars: Vec<DailyBar>,
}

impl PriceSeries {
    /// Build a series, rejecting duplicate or descending dates.
    pub fn new(symbol: impl Into<String>, bars: Vec<DailyBar>) -> Result<Self, SeriesError> {
        for (i, pair) in bars.windows(2).enumerate() {
            if pair[1].date <= pair[0].date {
                return Err(SeriesError::OutOfOrder {
                    index: i + 1,
                    previous: pair[0].date,
                    current: pair[1].date,
                });
            }
        }
        Ok(Self {
            symbol: symbol.into(),
            bars,
        })
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn bars(&self) -> &[DailyBar] {
        &self.bars
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn first(&self) -> Option<&DailyBar> {
        self.bars.first()
    }

    pub fn last(&self) -> Option<&DailyBar> {
        self.bars.last()
    }

    /// Look up the bar for an exact date.
    pub fn get(&self, date: NaiveDate) -> Option<&DailyBar> {
        self.bars
            .binary_search_by_key(&date, |b| b.date)
            .ok()
            .map(|i| &self.bars[i])
    }

    /// The sub-series starting at `date` (inclusive).
    pub fn since(&self, date: NaiveDate) -> Self {
        let start = self.bars.partition_point(|b| b.date < date);
        Self {
            symbol: self.symbol.clone(),
            bars: self.bars[start..].to_vec(),
        }
    }

    pub fn into_bars(self) -> Vec<DailyBar> {
        self.bars
    }
}
