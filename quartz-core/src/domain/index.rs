//! IndexPoint — one record of the blended output series.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One day of the rebased blend index.
///
/// Serialized as `{"date": "YYYY-MM-DD", "adjusted_close": <value>}` so
/// consumers can chart it like any other adjusted-close series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IndexPoint {
    pub date: NaiveDate,
    #[serde(rename = "adjusted_close")]
    pub value: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_format() {
        let point = IndexPoint {
            date: NaiveDate::from_ymd_opt(2019, 1, 2).unwrap(),
            value: 100.0,
        };
        let json = serde_json::to_string(&point).unwrap();
        assert_eq!(json, r#"{"date":"2019-01-02","adjusted_close":100.0}"#);
    }
}
