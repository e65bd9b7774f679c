//! Index Composer — blends two aligned series into one rebased index.
//!
//! Given a reference series `a` and a forward-filled series `b` that share a
//! calendar position-for-position, the blended level on day `i` is
//!
//! ```text
//! raw_i = a[i].adj_close * weight_a + b[i].adj_close * weight_b
//! ```
//!
//! and the index is `raw_i / raw_0 * 100`. Day 0 is emitted as exactly `100.0`
//! rather than computed, so the rebasing point carries no rounding.

use crate::domain::{IndexPoint, PriceSeries};
use chrono::NaiveDate;
use thiserror::Error;

/// Value of the index on its first day.
pub const INDEX_BASE: f64 = 100.0;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ComposeError {
    #[error("cannot compose an empty series")]
    EmptySeries,

    #[error("series lengths differ: reference has {reference}, filled has {filled}")]
    LengthMismatch { reference: usize, filled: usize },

    #[error("series are misaligned at position {index}: {reference} vs {filled}")]
    DateMismatch {
        index: usize,
        reference: NaiveDate,
        filled: NaiveDate,
    },

    #[error("baseline blend on {date} is zero")]
    ZeroBaseline { date: NaiveDate },

    #[error("blend on {date} is not a finite number")]
    NonFinite { date: NaiveDate },
}

/// Compose the weighted, rebased index of two positionally aligned series.
///
/// Output length equals input length. Any misalignment, a zero baseline or a
/// non-finite blend is rejected instead of leaking `Inf`/`NaN` downstream.
pub fn compose_index(
    series_a: &PriceSeries,
    series_b: &PriceSeries,
    weight_a: u32,
    weight_b: u32,
) -> Result<Vec<IndexPoint>, ComposeError> {
    let a = series_a.bars();
    let b = series_b.bars();

    if a.len() != b.len() {
        return Err(ComposeError::LengthMismatch {
            reference: a.len(),
            filled: b.len(),
        });
    }
    if a.is_empty() {
        return Err(ComposeError::EmptySeries);
    }

    let (wa, wb) = (f64::from(weight_a), f64::from(weight_b));
    let blend = |i: usize| a[i].adj_close * wa + b[i].adj_close * wb;

    let baseline = blend(0);
    if !baseline.is_finite() {
        return Err(ComposeError::NonFinite { date: a[0].date });
    }
    if baseline == 0.0 {
        return Err(ComposeError::ZeroBaseline { date: a[0].date });
    }

    let mut points = Vec::with_capacity(a.len());
    for (i, (bar_a, bar_b)) in a.iter().zip(b).enumerate() {
        if bar_a.date != bar_b.date {
            return Err(ComposeError::DateMismatch {
                index: i,
                reference: bar_a.date,
                filled: bar_b.date,
            });
        }

        let value = if i == 0 {
            INDEX_BASE
        } else {
            let raw = blend(i);
            if !raw.is_finite() {
                return Err(ComposeError::NonFinite { date: bar_a.date });
            }
            raw / baseline * INDEX_BASE
        };

        points.push(IndexPoint {
            date: bar_a.date,
            value,
        });
    }

    Ok(points)
}
