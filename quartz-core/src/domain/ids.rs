use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of one persisted snapshot: a symbol and the UTC date it was pulled.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SnapshotKey {
    pub symbol: String,
    pub capture_date: NaiveDate,
}

impl SnapshotKey {
    pub fn new(symbol: impl Into<String>, capture_date: NaiveDate) -> Self {
        Self {
            symbol: symbol.into(),
            capture_date,
        }
    }

    /// Key for a pull made today (UTC).
    pub fn today(symbol: impl Into<String>) -> Self {
        Self::new(symbol, chrono::Utc::now().date_naive())
    }

    /// File stem used on disk: `YYYY-MM-DD`.
    pub fn file_stem(&self) -> String {
        self.capture_date.format("%Y-%m-%d").to_string()
    }
}

impl fmt::Display for SnapshotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.symbol, self.capture_date)
    }
}
