//! Calendar alignment by forward fill.
//!
//! Equities trade on exchange days, crypto trades every calendar day. To compare
//! the two by position, the equity series is expanded to one bar per calendar
//! day: missing days carry the previous bar forward with the new date.

use crate::domain::{DailyBar, PriceSeries};
use chrono::NaiveDate;
use std::collections::HashMap;
use thiserror::Error;

/// Longest calendar span `forward_fill` will materialise (about a century).
pub const MAX_FILL_DAYS: i64 = 36_600;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum AlignError {
    #[error("calendar walk overflowed after {date}")]
    CalendarOverflow { date: NaiveDate },

    #[error("fill span {start}..={end} is {days} days, limit is {MAX_FILL_DAYS}")]
    SpanTooLong {
        start: NaiveDate,
        end: NaiveDate,
        days: i64,
    },

    #[error("forward-filled series violates ordering: {0}")]
    Series(String),
}

/// Forward-fill `series` over every calendar day in `[start, end]`.
///
/// Days present in the input are emitted verbatim; absent days repeat the
/// most recent observation with the current date. Days with no observation
/// on or before them are skipped, so the output may start after `start`.
/// An empty range (`start > end`) yields an empty series; a range longer
/// than [`MAX_FILL_DAYS`] is rejected before anything is allocated.
pub fn forward_fill(
    series: &PriceSeries,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<PriceSeries, AlignError> {
    let days = (end - start).num_days() + 1;
    if days > MAX_FILL_DAYS {
        return Err(AlignError::SpanTooLong { start, end, days });
    }

    let by_date: HashMap<NaiveDate, &DailyBar> =
        series.bars().iter().map(|b| (b.date, b)).collect();

    let capacity = usize::try_from(days).unwrap_or(0);
    let mut filled: Vec<DailyBar> = Vec::with_capacity(capacity);

    // Carry an observation from before the window into its first days.
    let mut carry: Option<&DailyBar> = series.bars().iter().rev().find(|b| b.date < start);

    let mut current = start;
    while current <= end {
        match by_date.get(&current) {
            Some(bar) => {
                filled.push((*bar).clone());
                carry = Some(*bar);
            }
            None => {
                if let Some(prev) = carry {
                    filled.push(prev.carried_to(current));
                }
            }
        }

        if current == end {
            break;
        }
        current = current
            .succ_opt()
            .ok_or(AlignError::CalendarOverflow { date: current })?;
    }

    PriceSeries::new(series.symbol(), filled).map_err(|e| AlignError::Series(e.to_string()))
}
