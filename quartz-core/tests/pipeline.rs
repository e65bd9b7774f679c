//! End-to-end pipeline tests: fixture upstream → snapshot store → alignment → index.

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use quartz_core::data::fixture::{daily_payload, weekday_payload, FixtureFetcher};
use quartz_core::data::snapshot::SNAPSHOT_SCHEMA_VERSION;
use quartz_core::data::SnapshotStore;
use quartz_core::domain::SnapshotKey;
use quartz_core::{ErrorClass, IndexService, PresetTable};
use std::sync::Arc;

const EQUITY: &str = "VOO.US";
const CRYPTO: &str = "BTC-USD.CC";

fn start() -> NaiveDate {
    NaiveDate::from_ymd_opt(2019, 1, 2).unwrap()
}

/// Six weeks of synthetic history: equity on weekdays, crypto every day.
fn fetcher() -> Arc<FixtureFetcher> {
    let crypto: Vec<f64> = (0..42).map(|i| 3_800.0 + 25.0 * i as f64).collect();
    let equity: Vec<f64> = (0..30).map(|i| 230.0 + (i as f64 * 0.4).sin() * 5.0).collect();
    Arc::new(
        FixtureFetcher::new()
            .with_payload(EQUITY, weekday_payload(start(), &equity))
            .with_payload(CRYPTO, daily_payload(start(), &crypto)),
    )
}

fn service(fetcher: Arc<FixtureFetcher>, root: &std::path::Path) -> IndexService {
    IndexService::new(Box::new(fetcher), SnapshotStore::new(root), PresetTable::builtin())
        .with_legs(EQUITY, CRYPTO)
        .with_start_date(start())
}

#[test]
fn every_builtin_preset_yields_a_daily_index() {
    let dir = tempfile::tempdir().unwrap();
    let svc = service(fetcher(), dir.path());

    for (name, _) in PresetTable::builtin().iter() {
        let points = svc.handle(name).unwrap();
        assert_eq!(points.len(), 42, "{name}");
        assert_eq!(points[0].value, 100.0, "{name}");
        assert_eq!(points[0].date, start());
        for pair in points.windows(2) {
            assert_eq!(pair[1].date - pair[0].date, Duration::days(1), "{name}");
        }
    }
}

#[test]
fn weekend_moves_come_only_from_crypto() {
    let dir = tempfile::tempdir().unwrap();
    let svc = service(fetcher(), dir.path());

    // With equity frozen over the weekend, a 9/1 blend moves less than a 5/5
    // blend between Saturday and Sunday because crypto carries less weight.
    let q9 = svc.handle("QUARTZ9").unwrap();
    let q5 = svc.handle("QUARTZ5").unwrap();
    let saturday = q9
        .iter()
        .position(|p| p.date.weekday() == Weekday::Sat)
        .unwrap();

    let move9 = q9[saturday + 1].value - q9[saturday].value;
    let move5 = q5[saturday + 1].value - q5[saturday].value;
    assert!(move9 > 0.0);
    assert!(move5 > move9);
}

#[test]
fn snapshots_are_written_once_per_day() {
    let dir = tempfile::tempdir().unwrap();
    let upstream = fetcher();
    let svc = service(Arc::clone(&upstream), dir.path());

    svc.handle("QUARTZ9").unwrap();
    svc.handle("QUARTZ7").unwrap();
    svc.handle("quartz5").unwrap();
    assert_eq!(upstream.calls(), 2);

    let status = svc.store().status().unwrap();
    let symbols: Vec<&str> = status.iter().map(|s| s.symbol.as_str()).collect();
    assert_eq!(symbols, vec![CRYPTO, EQUITY]);
    for row in &status {
        let meta = row.meta.as_ref().unwrap();
        assert_eq!(meta.schema_version, SNAPSHOT_SCHEMA_VERSION);
        assert_eq!(meta.fetched_by, "fixture");
        assert_eq!(meta.since, start());
    }
}

#[test]
fn a_fresh_service_reuses_todays_snapshots() {
    let dir = tempfile::tempdir().unwrap();
    let first = fetcher();
    let expected = service(Arc::clone(&first), dir.path())
        .handle_json("QUARTZ7")
        .unwrap();

    // A restarted process with an upstream that would now fail
    let dead = Arc::new(FixtureFetcher::new());
    let restarted = service(Arc::clone(&dead), dir.path());
    assert_eq!(restarted.handle_json("QUARTZ7").unwrap(), expected);
    assert_eq!(dead.calls(), 0);
}

#[test]
fn corrupt_snapshot_fails_once_then_recovers() {
    let dir = tempfile::tempdir().unwrap();
    let upstream = fetcher();
    let svc = service(Arc::clone(&upstream), dir.path());
    svc.handle("QUARTZ5").unwrap();

    let key = SnapshotKey::today(CRYPTO);
    std::fs::write(svc.store().payload_path(&key), b"{\"truncated\":").unwrap();

    let err = svc.handle("QUARTZ5").unwrap_err();
    assert_eq!(err.class(), ErrorClass::Dependency);

    // Quarantined; the next request re-fetches and succeeds
    let points = svc.handle("QUARTZ5").unwrap();
    assert_eq!(points.len(), 42);
    assert_eq!(upstream.calls(), 3);
}

#[test]
fn json_body_matches_wire_contract() {
    let dir = tempfile::tempdir().unwrap();
    let svc = service(fetcher(), dir.path());

    let body = svc.handle_json("QUARTZ9").unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&body).unwrap();
    let first = &parsed.as_array().unwrap()[0];
    assert_eq!(first["date"], "2019-01-02");
    assert_eq!(first["adjusted_close"], 100.0);
    assert_eq!(first.as_object().unwrap().len(), 2);
}
