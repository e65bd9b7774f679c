//! Daily snapshot store.
//!
//! Layout: `{root}/{SYMBOL}/{YYYY-MM-DD}.json` with a metadata sidecar at
//! `{root}/{SYMBOL}/{YYYY-MM-DD}.meta.json`.
//!
//! Features:
//! - One immutable snapshot per (symbol, UTC capture date); first writer wins
//! - Raw upstream bytes stored verbatim, sidecar carries schema version + BLAKE3 hash
//! - Atomic publish (write to a unique temp file, hard-link into place)
//! - In-process single-flight per key, so concurrent cold requests fetch once
//! - Integrity validation on load; corrupt files are quarantined ({file}.quarantined)

use super::decode::decode_series_as_of;
use super::provider::{DataError, DataSource, PriceFetcher};
use crate::domain::{PriceSeries, SnapshotKey};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

/// Newest sidecar schema this build understands.
pub const SNAPSHOT_SCHEMA_VERSION: u32 = 1;

/// Metadata sidecar for one snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotMeta {
    pub schema_version: u32,
    pub symbol: String,
    pub capture_date: NaiveDate,
    pub since: NaiveDate,
    pub bar_count: usize,
    pub first_date: NaiveDate,
    pub last_date: NaiveDate,
    pub payload_hash: String,
    pub fetched_by: String,
    pub captured_at: NaiveDateTime,
}

/// A snapshot read back from disk.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub key: SnapshotKey,
    pub raw: Vec<u8>,
    pub series: PriceSeries,
    pub meta: Option<SnapshotMeta>,
}

impl Snapshot {
    /// The `since` this snapshot was fetched with, when it differs from `requested`.
    ///
    /// Snapshots without a sidecar report no mismatch.
    pub fn since_mismatch(&self, requested: NaiveDate) -> Option<NaiveDate> {
        self.meta
            .as_ref()
            .map(|meta| meta.since)
            .filter(|recorded| *recorded != requested)
    }
}

/// A series plus where it came from on this call.
#[derive(Debug, Clone)]
pub struct LoadedSeries {
    pub series: PriceSeries,
    pub source: DataSource,
}

/// One row of `SnapshotStore::status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotStatus {
    pub symbol: String,
    pub capture_date: NaiveDate,
    pub bytes: u64,
    pub meta: Option<SnapshotMeta>,
}

/// The on-disk snapshot store.
#[derive(Debug)]
pub struct SnapshotStore {
    root: PathBuf,
    inflight: Mutex<HashMap<SnapshotKey, Arc<Mutex<()>>>>,
}

impl SnapshotStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            inflight: Mutex::new(HashMap::new()),
        }
    }

    /// Root directory of the store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory for a specific symbol: `{root}/{SYMBOL}/`
    fn symbol_dir(&self, symbol: &str) -> PathBuf {
        self.root.join(symbol)
    }

    /// Path to the raw payload: `{root}/{SYMBOL}/{YYYY-MM-DD}.json`
    pub fn payload_path(&self, key: &SnapshotKey) -> PathBuf {
        self.symbol_dir(&key.symbol)
            .join(format!("{}.json", key.file_stem()))
    }

    /// Path to the metadata sidecar: `{root}/{SYMBOL}/{YYYY-MM-DD}.meta.json`
    pub fn meta_path(&self, key: &SnapshotKey) -> PathBuf {
        self.symbol_dir(&key.symbol)
            .join(format!("{}.meta.json", key.file_stem()))
    }

    /// Whether a payload exists for `key` (does not validate it).
    pub fn contains(&self, key: &SnapshotKey) -> bool {
        self.payload_path(key).is_file()
    }

    /// Today's (UTC) snapshot for `symbol`, fetching and persisting it on a miss.
    pub fn get_or_fetch(
        &self,
        symbol: &str,
        since: NaiveDate,
        fetcher: &dyn PriceFetcher,
    ) -> Result<PriceSeries, DataError> {
        self.get_or_fetch_on(&SnapshotKey::today(symbol), since, fetcher)
            .map(|loaded| loaded.series)
    }

    /// Load the snapshot for `key`, or fetch → decode → persist it.
    ///
    /// A decode failure (fresh or persisted) is fatal and nothing is persisted.
    /// A persist failure is logged and the freshly fetched series is still returned.
    pub fn get_or_fetch_on(
        &self,
        key: &SnapshotKey,
        since: NaiveDate,
        fetcher: &dyn PriceFetcher,
    ) -> Result<LoadedSeries, DataError> {
        validate_symbol(&key.symbol)?;

        let lock = self.key_lock(key);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        match self.load(key) {
            Ok(Some(snapshot)) => {
                if let Some(recorded) = snapshot.since_mismatch(since) {
                    tracing::warn!(
                        %key,
                        requested = %since,
                        %recorded,
                        "snapshot was fetched with a different start date, serving it anyway"
                    );
                }
                tracing::debug!(%key, bars = snapshot.series.len(), "snapshot hit");
                return Ok(LoadedSeries {
                    series: snapshot.series,
                    source: DataSource::Snapshot,
                });
            }
            Ok(None) => {}
            // Unreadable store (I/O, not content): behave like a miss
            Err(DataError::SnapshotError(reason)) => {
                tracing::warn!(%key, %reason, "snapshot store unreadable, fetching instead");
            }
            Err(e) => return Err(e),
        }

        tracing::info!(%key, %since, fetcher = fetcher.name(), "snapshot miss, fetching");
        let raw = fetcher.fetch(&key.symbol, since)?;
        let series = decode_series_as_of(&key.symbol, &raw, key.capture_date)?;

        match self.persist(key, since, fetcher.name(), &raw, &series) {
            Ok(true) => tracing::info!(%key, bars = series.len(), "snapshot written"),
            Ok(false) => tracing::debug!(%key, "snapshot already published by another writer"),
            Err(e) => tracing::warn!(%key, error = %e, "snapshot write failed, serving fetched data"),
        }

        Ok(LoadedSeries {
            series,
            source: DataSource::Upstream,
        })
    }

    /// Read and validate the snapshot for `key`. `Ok(None)` means not stored.
    pub fn load(&self, key: &SnapshotKey) -> Result<Option<Snapshot>, DataError> {
        validate_symbol(&key.symbol)?;

        let path = self.payload_path(key);
        let raw = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(DataError::SnapshotError(format!(
                    "read {}: {e}",
                    path.display()
                )))
            }
        };

        let meta = match self.read_meta(key) {
            Ok(meta) => meta,
            Err(reason) => return Err(self.quarantine(key, &reason)),
        };

        if let Some(meta) = &meta {
            if meta.schema_version > SNAPSHOT_SCHEMA_VERSION {
                return Err(DataError::UnsupportedSnapshotVersion {
                    key: key.to_string(),
                    found: meta.schema_version,
                    supported: SNAPSHOT_SCHEMA_VERSION,
                });
            }
            if payload_hash(&raw) != meta.payload_hash {
                return Err(self.quarantine(key, "payload hash does not match metadata"));
            }
        }

        match decode_series_as_of(&key.symbol, &raw, key.capture_date) {
            Ok(series) => Ok(Some(Snapshot {
                key: key.clone(),
                raw,
                series,
                meta,
            })),
            Err(e) => Err(self.quarantine(key, &e.to_string())),
        }
    }

    /// Publish `raw` under `key`, then its sidecar.
    ///
    /// Returns `Ok(false)` when a snapshot for the key already exists; the
    /// existing one is left untouched.
    pub fn persist(
        &self,
        key: &SnapshotKey,
        since: NaiveDate,
        fetched_by: &str,
        raw: &[u8],
        series: &PriceSeries,
    ) -> Result<bool, DataError> {
        validate_symbol(&key.symbol)?;

        let (first_date, last_date) = match (series.first(), series.last()) {
            (Some(first), Some(last)) => (first.date, last.date),
            _ => {
                return Err(DataError::SnapshotError(format!(
                    "refusing to persist empty series for {key}"
                )))
            }
        };

        let dir = self.symbol_dir(&key.symbol);
        fs::create_dir_all(&dir)
            .map_err(|e| DataError::SnapshotError(format!("create {}: {e}", dir.display())))?;

        if !publish_atomic(&dir, &self.payload_path(key), raw)? {
            return Ok(false);
        }

        let meta = SnapshotMeta {
            schema_version: SNAPSHOT_SCHEMA_VERSION,
            symbol: key.symbol.clone(),
            capture_date: key.capture_date,
            since,
            bar_count: series.len(),
            first_date,
            last_date,
            payload_hash: payload_hash(raw),
            fetched_by: fetched_by.to_string(),
            captured_at: chrono::Utc::now().naive_utc(),
        };
        let meta_json = serde_json::to_vec_pretty(&meta)
            .map_err(|e| DataError::SnapshotError(format!("meta serialization: {e}")))?;
        publish_atomic(&dir, &self.meta_path(key), &meta_json)?;

        Ok(true)
    }

    /// Every stored snapshot, sorted by symbol then capture date.
    pub fn status(&self) -> Result<Vec<SnapshotStatus>, DataError> {
        let mut rows = Vec::new();
        let symbols = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(rows),
            Err(e) => return Err(DataError::SnapshotError(format!("read root: {e}"))),
        };

        for sym_entry in symbols {
            let sym_entry =
                sym_entry.map_err(|e| DataError::SnapshotError(format!("dir entry: {e}")))?;
            if !sym_entry.path().is_dir() {
                continue;
            }
            let symbol = sym_entry.file_name().to_string_lossy().to_string();
            if validate_symbol(&symbol).is_err() {
                continue;
            }

            let files = fs::read_dir(sym_entry.path())
                .map_err(|e| DataError::SnapshotError(format!("read {symbol}: {e}")))?;
            for file in files {
                let file = file.map_err(|e| DataError::SnapshotError(format!("dir entry: {e}")))?;
                let name = file.file_name().to_string_lossy().to_string();

                // Skip sidecars, temp files and quarantined payloads
                let Some(stem) = name.strip_suffix(".json") else {
                    continue;
                };
                let Ok(capture_date) = NaiveDate::parse_from_str(stem, "%Y-%m-%d") else {
                    continue;
                };

                let key = SnapshotKey::new(symbol.clone(), capture_date);
                rows.push(SnapshotStatus {
                    bytes: file.metadata().map(|m| m.len()).unwrap_or(0),
                    meta: self.read_meta(&key).ok().flatten(),
                    symbol: symbol.clone(),
                    capture_date,
                });
            }
        }

        rows.sort_by(|a, b| {
            a.symbol
                .cmp(&b.symbol)
                .then(a.capture_date.cmp(&b.capture_date))
        });
        Ok(rows)
    }

    /// The single-flight lock for `key`. Locks for earlier days that nobody
    /// holds are pruned on the way in.
    fn key_lock(&self, key: &SnapshotKey) -> Arc<Mutex<()>> {
        let mut inflight = self.inflight.lock().unwrap_or_else(PoisonError::into_inner);
        inflight.retain(|k, lock| k.capture_date >= key.capture_date || Arc::strong_count(lock) > 1);
        Arc::clone(inflight.entry(key.clone()).or_default())
    }

    fn read_meta(&self, key: &SnapshotKey) -> Result<Option<SnapshotMeta>, String> {
        let path = self.meta_path(key);
        let content = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(format!("read metadata: {e}")),
        };
        serde_json::from_slice(&content)
            .map(Some)
            .map_err(|e| format!("parse metadata: {e}"))
    }

    /// Move a bad snapshot (and its sidecar) aside so the next request re-fetches.
    fn quarantine(&self, key: &SnapshotKey, reason: &str) -> DataError {
        for path in [self.payload_path(key), self.meta_path(key)] {
            if path.exists() {
                let target = quarantine_path(&path);
                if let Err(e) = fs::rename(&path, &target) {
                    tracing::error!(path = %path.display(), error = %e, "failed to quarantine snapshot file");
                }
            }
        }
        tracing::warn!(%key, reason, "quarantined corrupt snapshot");
        DataError::CorruptSnapshot {
            key: key.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// BLAKE3 hex digest of a payload.
pub fn payload_hash(raw: &[u8]) -> String {
    blake3::hash(raw).to_hex().to_string()
}

/// Symbols become directory names, so keep them to a safe alphabet.
pub fn validate_symbol(symbol: &str) -> Result<(), DataError> {
    let ok = !symbol.is_empty()
        && !symbol.starts_with('.')
        && symbol
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
    if ok {
        Ok(())
    } else {
        Err(DataError::InvalidSymbol {
            symbol: symbol.to_string(),
        })
    }
}

fn quarantine_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".quarantined");
    path.with_file_name(name)
}

// ── Atomic publish ──────────────────────────────────────────────────

/// Write `bytes` to a unique temp file in `dir` and link it to `dest`.
///
/// Returns `Ok(false)` if `dest` already exists. Readers never observe a
/// partially written `dest`.
fn publish_atomic(dir: &Path, dest: &Path, bytes: &[u8]) -> Result<bool, DataError> {
    let file_name = dest
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let tmp = dir.join(format!(
        ".{file_name}.{}.{:016x}.tmp",
        std::process::id(),
        rand::random::<u64>()
    ));

    let written = fs::File::create(&tmp).and_then(|mut file| {
        file.write_all(bytes)?;
        file.sync_all()
    });
    if let Err(e) = written {
        let _ = fs::remove_file(&tmp);
        return Err(DataError::SnapshotError(format!(
            "write {}: {e}",
            tmp.display()
        )));
    }

    let outcome = match fs::hard_link(&tmp, dest) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(false),
        Err(link_err) => {
            // Some mounted volumes have no hard links; rename is still atomic
            // but replaces, so check first and accept the narrow race.
            if dest.exists() {
                Ok(false)
            } else {
                tracing::debug!(error = %link_err, "hard link unsupported, falling back to rename");
                fs::rename(&tmp, dest).map(|_| true).map_err(|e| {
                    DataError::SnapshotError(format!("atomic rename failed: {e}"))
                })
            }
        }
    };

    let _ = fs::remove_file(&tmp);
    outcome
}
