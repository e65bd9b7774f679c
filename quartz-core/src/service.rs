//! Request orchestration: preset → snapshots → alignment → index.
//!
//! `IndexService` owns everything one request needs (fetcher, snapshot store,
//! preset table, leg symbols, start date), constructed once and shared by the
//! serving layer. It is synchronous; callers on an async runtime run it on a
//! blocking thread.

use crate::composer::{compose_index, ComposeError};
use crate::config::ServiceConfig;
use crate::data::{
    forward_fill, AlignError, DataError, DataSource, EodProvider, PriceFetcher, SnapshotStore,
};
use crate::domain::{IndexPoint, PriceSeries, SnapshotKey};
use crate::preset::{PresetTable, ResolveError};
use chrono::NaiveDate;
use thiserror::Error;

/// Coarse failure class, used by the serving layer to pick a status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Bad or unknown token. The caller's fault.
    ClientInput,
    /// Upstream fetch or snapshot failure.
    Dependency,
    /// Alignment or composition rejected the data; stems from upstream data.
    Computation,
    Internal,
}

/// Errors from handling one index request.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error(transparent)]
    InvalidSymbol(#[from] ResolveError),

    #[error("loading {symbol}: {source}")]
    Dependency {
        symbol: String,
        #[source]
        source: DataError,
    },

    #[error("alignment failed: {0}")]
    Alignment(#[from] AlignError),

    #[error("index composition failed: {0}")]
    Composition(#[from] ComposeError),

    #[error("serializing index: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl IndexError {
    pub fn class(&self) -> ErrorClass {
        match self {
            IndexError::InvalidSymbol(_) => ErrorClass::ClientInput,
            IndexError::Dependency { .. } => ErrorClass::Dependency,
            IndexError::Alignment(_) | IndexError::Composition(_) => ErrorClass::Computation,
            IndexError::Serialization(_) => ErrorClass::Internal,
        }
    }
}

/// Outcome of warming one symbol's snapshot.
#[derive(Debug)]
pub struct WarmReport {
    pub symbol: String,
    pub result: Result<WarmedSnapshot, DataError>,
}

#[derive(Debug, Clone)]
pub struct WarmedSnapshot {
    pub source: DataSource,
    pub bars: usize,
    pub first_date: Option<NaiveDate>,
    pub last_date: Option<NaiveDate>,
}

/// The blend-index orchestrator.
pub struct IndexService {
    fetcher: Box<dyn PriceFetcher>,
    store: SnapshotStore,
    presets: PresetTable,
    equity_symbol: String,
    crypto_symbol: String,
    start_date: NaiveDate,
}

impl IndexService {
    /// A service with the default legs and start date; see `with_legs` and
    /// `with_start_date` to override.
    pub fn new(fetcher: Box<dyn PriceFetcher>, store: SnapshotStore, presets: PresetTable) -> Self {
        let defaults = ServiceConfig::default();
        Self {
            fetcher,
            store,
            presets,
            equity_symbol: defaults.equity_symbol,
            crypto_symbol: defaults.crypto_symbol,
            start_date: defaults.start_date,
        }
    }

    /// Wire the production service from configuration.
    pub fn from_config(config: &ServiceConfig) -> Result<Self, DataError> {
        let provider = EodProvider::new(
            config.eod_base_url.clone(),
            config.eod_api_key.clone(),
            config.fetch_timeout,
        )?;
        Ok(Self::new(
            Box::new(provider),
            SnapshotStore::new(config.snapshot_dir.clone()),
            config.presets.clone(),
        )
        .with_legs(config.equity_symbol.clone(), config.crypto_symbol.clone())
        .with_start_date(config.start_date))
    }

    pub fn with_legs(mut self, equity: impl Into<String>, crypto: impl Into<String>) -> Self {
        self.equity_symbol = equity.into();
        self.crypto_symbol = crypto.into();
        self
    }

    pub fn with_start_date(mut self, start_date: NaiveDate) -> Self {
        self.start_date = start_date;
        self
    }

    pub fn presets(&self) -> &PresetTable {
        &self.presets
    }

    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }

    pub fn equity_symbol(&self) -> &str {
        &self.equity_symbol
    }

    pub fn crypto_symbol(&self) -> &str {
        &self.crypto_symbol
    }

    pub fn start_date(&self) -> NaiveDate {
        self.start_date
    }

    /// Compute the index for a preset token.
    pub fn handle(&self, token: &str) -> Result<Vec<IndexPoint>, IndexError> {
        let (name, preset) = self.presets.resolve(token)?;

        let crypto = self.load(&self.crypto_symbol)?;
        let equity = self.load(&self.equity_symbol)?;

        let (crypto, equity) = align_legs(&crypto, &equity)?;
        let points = compose_index(&crypto, &equity, preset.crypto, preset.equity)?;

        tracing::info!(
            preset = name,
            points = points.len(),
            first = ?points.first().map(|p| p.date),
            last = ?points.last().map(|p| p.date),
            "index computed"
        );
        Ok(points)
    }

    /// `handle`, serialized as the JSON array the endpoint returns.
    pub fn handle_json(&self, token: &str) -> Result<String, IndexError> {
        let points = self.handle(token)?;
        Ok(serde_json::to_string(&points)?)
    }

    /// Load or fetch today's snapshot for each symbol. Failures are reported
    /// per symbol and do not stop the remaining ones.
    pub fn warm(&self, symbols: &[String]) -> Vec<WarmReport> {
        symbols
            .iter()
            .map(|symbol| {
                let key = SnapshotKey::today(symbol.as_str());
                let result = self
                    .store
                    .get_or_fetch_on(&key, self.start_date, self.fetcher.as_ref())
                    .map(|loaded| WarmedSnapshot {
                        source: loaded.source,
                        bars: loaded.series.len(),
                        first_date: loaded.series.first().map(|b| b.date),
                        last_date: loaded.series.last().map(|b| b.date),
                    });
                WarmReport {
                    symbol: symbol.clone(),
                    result,
                }
            })
            .collect()
    }

    fn load(&self, symbol: &str) -> Result<PriceSeries, IndexError> {
        self.store
            .get_or_fetch(symbol, self.start_date, self.fetcher.as_ref())
            .map_err(|source| IndexError::Dependency {
                symbol: symbol.to_string(),
                source,
            })
    }
}

/// Put both legs on the crypto leg's calendar and cut them to the first date
/// both have data for, so position `i` is the same day in each.
fn align_legs(
    crypto: &PriceSeries,
    equity: &PriceSeries,
) -> Result<(PriceSeries, PriceSeries), IndexError> {
    let (Some(first), Some(last)) = (crypto.first(), crypto.last()) else {
        return Err(ComposeError::EmptySeries.into());
    };
    let (start, end) = (first.date, last.date);

    let crypto = forward_fill(crypto, start, end)?;
    let equity = forward_fill(equity, start, end)?;

    let common_start = match (crypto.first(), equity.first()) {
        (Some(c), Some(e)) => c.date.max(e.date),
        _ => return Err(ComposeError::EmptySeries.into()),
    };
    Ok((crypto.since(common_start), equity.since(common_start)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::fixture::{daily_payload, payload_from_points, weekday_payload, FixtureFetcher};
    use crate::preset::BlendPreset;
    use std::sync::Arc;

    const EQUITY: &str = "VOO.US";
    const CRYPTO: &str = "BTC-USD.CC";

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn service(fetcher: Arc<FixtureFetcher>, root: &std::path::Path) -> IndexService {
        IndexService::new(
            Box::new(fetcher),
            SnapshotStore::new(root),
            PresetTable::builtin(),
        )
        .with_legs(EQUITY, CRYPTO)
        .with_start_date(d(2019, 1, 2))
    }

    fn round2(v: f64) -> f64 {
        (v * 100.0).round() / 100.0
    }

    #[test]
    fn quartz5_worked_example() {
        let dir = tempfile::tempdir().unwrap();
        let start = d(2019, 1, 2);
        let fetcher = Arc::new(
            FixtureFetcher::new()
                .with_payload(EQUITY, daily_payload(start, &[100.0, 110.0, 90.0]))
                .with_payload(CRYPTO, daily_payload(start, &[200.0, 180.0, 220.0])),
        );
        let svc = service(fetcher, dir.path());

        let points = svc.handle("QUARTZ5").unwrap();
        let values: Vec<f64> = points.iter().map(|p| round2(p.value)).collect();
        assert_eq!(values, vec![100.0, 96.67, 103.33]);
        assert_eq!(points[0].value, 100.0);
        assert_eq!(points[0].date, start);
        assert_eq!(points[2].date, d(2019, 1, 4));
    }

    #[test]
    fn token_resolution_is_case_insensitive() {
        let dir = tempfile::tempdir().unwrap();
        let start = d(2019, 1, 2);
        let fetcher = Arc::new(
            FixtureFetcher::new()
                .with_payload(EQUITY, daily_payload(start, &[100.0, 101.0]))
                .with_payload(CRYPTO, daily_payload(start, &[200.0, 190.0])),
        );
        let svc = service(fetcher, dir.path());

        let upper = svc.handle_json("QUARTZ9").unwrap();
        assert_eq!(svc.handle_json("quartz9").unwrap(), upper);
        assert_eq!(svc.handle_json("Quartz9").unwrap(), upper);
    }

    #[test]
    fn bad_tokens_are_client_errors_and_do_not_fetch() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = Arc::new(FixtureFetcher::new());
        let svc = service(Arc::clone(&fetcher), dir.path());

        for token in ["FOO", "", "  "] {
            let err = svc.handle(token).unwrap_err();
            assert_eq!(err.class(), ErrorClass::ClientInput, "token {token:?}");
        }
        assert_eq!(fetcher.calls(), 0);
    }

    #[test]
    fn upstream_failure_is_a_dependency_error() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = Arc::new(FixtureFetcher::new().with_payload(CRYPTO, b"[]".to_vec()));
        let svc = service(fetcher, dir.path());

        let err = svc.handle("QUARTZ7").unwrap_err();
        assert_eq!(err.class(), ErrorClass::Dependency);
        assert!(matches!(
            err,
            IndexError::Dependency {
                source: DataError::EmptySeries { .. },
                ..
            }
        ));
    }

    #[test]
    fn far_future_bar_is_a_dependency_error_and_not_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let start = d(2019, 1, 2);
        let fetcher = Arc::new(
            FixtureFetcher::new()
                .with_payload(EQUITY, daily_payload(start, &[100.0, 101.0]))
                .with_payload(
                    CRYPTO,
                    payload_from_points(&[(start, 200.0), (d(9999, 12, 31), 210.0)]),
                ),
        );
        let svc = service(fetcher, dir.path());

        let err = svc.handle("QUARTZ5").unwrap_err();
        assert!(
            matches!(
                err,
                IndexError::Dependency {
                    source: DataError::InvalidBar { .. },
                    ..
                }
            ),
            "{err:?}"
        );
        assert!(svc.store().status().unwrap().iter().all(|row| row.symbol != CRYPTO));
    }

    #[test]
    fn weekend_gaps_in_equity_are_forward_filled() {
        let dir = tempfile::tempdir().unwrap();
        // 2019-01-04 is a Friday; crypto trades through the weekend
        let start = d(2019, 1, 4);
        let fetcher = Arc::new(
            FixtureFetcher::new()
                .with_payload(EQUITY, weekday_payload(start, &[100.0, 110.0]))
                .with_payload(CRYPTO, daily_payload(start, &[200.0, 200.0, 200.0, 200.0])),
        );
        let svc = service(fetcher, dir.path());

        let points = svc.handle("QUARTZ5").unwrap();
        assert_eq!(points.len(), 4);
        // Saturday and Sunday carry Friday's equity close
        assert_eq!(points[1].value, 100.0);
        assert_eq!(points[2].value, 100.0);
        assert_eq!(round2(points[3].value), round2(1550.0 / 1500.0 * 100.0));
    }

    #[test]
    fn index_starts_at_first_common_date() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = Arc::new(
            FixtureFetcher::new()
                .with_payload(
                    EQUITY,
                    payload_from_points(&[(d(2019, 1, 3), 100.0), (d(2019, 1, 4), 100.0)]),
                )
                .with_payload(CRYPTO, daily_payload(d(2019, 1, 1), &[50.0, 60.0, 70.0, 80.0])),
        );
        let svc = service(fetcher, dir.path());

        let points = svc.handle("QUARTZ5").unwrap();
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].date, d(2019, 1, 3));
        assert_eq!(points[0].value, 100.0);
    }

    #[test]
    fn disjoint_histories_are_a_computation_error() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = Arc::new(
            FixtureFetcher::new()
                .with_payload(EQUITY, daily_payload(d(2020, 1, 1), &[100.0]))
                .with_payload(CRYPTO, daily_payload(d(2019, 1, 1), &[50.0, 60.0])),
        );
        let svc = service(fetcher, dir.path());

        let err = svc.handle("QUARTZ5").unwrap_err();
        assert_eq!(err.class(), ErrorClass::Computation);
    }

    #[test]
    fn second_request_is_served_from_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let start = d(2019, 1, 2);
        let fetcher = Arc::new(
            FixtureFetcher::new()
                .with_payload(EQUITY, daily_payload(start, &[100.0, 110.0]))
                .with_payload(CRYPTO, daily_payload(start, &[200.0, 180.0])),
        );
        let svc = service(Arc::clone(&fetcher), dir.path());

        let first = svc.handle_json("QUARTZ5").unwrap();
        assert_eq!(fetcher.calls(), 2);
        let second = svc.handle_json("QUARTZ5").unwrap();
        assert_eq!(fetcher.calls(), 2);
        assert_eq!(first, second);
    }

    #[test]
    fn custom_presets_are_honoured() {
        let dir = tempfile::tempdir().unwrap();
        let start = d(2019, 1, 2);
        let fetcher = Arc::new(
            FixtureFetcher::new()
                .with_payload(EQUITY, daily_payload(start, &[100.0, 100.0]))
                .with_payload(CRYPTO, daily_payload(start, &[100.0, 200.0])),
        );
        let presets = PresetTable::new([("ALLCRYPTO", BlendPreset::new(1, 1_000_000))]).unwrap();
        let svc = IndexService::new(Box::new(fetcher), SnapshotStore::new(dir.path()), presets)
            .with_legs(EQUITY, CRYPTO)
            .with_start_date(start);

        let points = svc.handle("allcrypto").unwrap();
        assert!((points[1].value - 200.0).abs() < 0.01);
        assert!(svc.handle("QUARTZ5").is_err());
    }

    #[test]
    fn warm_reports_each_symbol() {
        let dir = tempfile::tempdir().unwrap();
        let start = d(2019, 1, 2);
        let fetcher = Arc::new(
            FixtureFetcher::new().with_payload(EQUITY, daily_payload(start, &[1.0, 2.0, 3.0])),
        );
        let svc = service(Arc::clone(&fetcher), dir.path());

        let reports = svc.warm(&[EQUITY.to_string(), "MISSING".to_string()]);
        assert_eq!(reports.len(), 2);
        let warmed = reports[0].result.as_ref().unwrap();
        assert_eq!(warmed.source, DataSource::Upstream);
        assert_eq!(warmed.bars, 3);
        assert_eq!(warmed.last_date, Some(d(2019, 1, 4)));
        assert!(reports[1].result.is_err());

        let again = svc.warm(&[EQUITY.to_string()]);
        assert_eq!(again[0].result.as_ref().unwrap().source, DataSource::Snapshot);
    }

    #[test]
    fn error_classes() {
        assert_eq!(
            IndexError::from(ResolveError::EmptyToken).class(),
            ErrorClass::ClientInput
        );
        assert_eq!(
            IndexError::from(ComposeError::ZeroBaseline { date: d(2019, 1, 2) }).class(),
            ErrorClass::Computation
        );
        assert_eq!(
            IndexError::from(AlignError::CalendarOverflow { date: NaiveDate::MAX }).class(),
            ErrorClass::Computation
        );
    }
}
