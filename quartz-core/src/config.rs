//! Service configuration derived from environment variables.
//!
//! Everything the orchestrator needs is resolved here once at startup and
//! injected; nothing reads the environment on the request path.

use crate::data::eod::DEFAULT_BASE_URL;
use crate::preset::{PresetError, PresetTable};
use chrono::NaiveDate;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Snapshot root when running on the managed container platform (mounted bucket).
pub const CLOUD_SNAPSHOT_DIR: &str = "/gcs-fund-service-cache";
/// Snapshot root for local runs.
pub const LOCAL_SNAPSHOT_DIR: &str = "./gcs-fund-service-cache";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{name} must be a YYYY-MM-DD date, got '{value}'")]
    InvalidDate { name: &'static str, value: String },

    #[error("{name} must be a positive integer, got '{value}'")]
    InvalidNumber { name: &'static str, value: String },

    #[error("preset table: {0}")]
    Presets(#[from] PresetError),
}

/// Resolved service configuration.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub bind: String,
    pub port: u16,

    // ── Snapshot store ────────────────────────────────────────────
    pub snapshot_dir: PathBuf,

    // ── Upstream ──────────────────────────────────────────────────
    pub eod_base_url: String,
    /// Empty ⇒ upstream calls will be rejected by the provider.
    pub eod_api_key: String,
    pub fetch_timeout: Duration,

    // ── Blend ─────────────────────────────────────────────────────
    pub equity_symbol: String,
    pub crypto_symbol: String,
    pub start_date: NaiveDate,
    pub presets: PresetTable,

    // ── Serving ───────────────────────────────────────────────────
    pub request_timeout: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: 8080,
            snapshot_dir: PathBuf::from(LOCAL_SNAPSHOT_DIR),
            eod_base_url: DEFAULT_BASE_URL.to_string(),
            eod_api_key: String::new(),
            fetch_timeout: Duration::from_secs(30),
            equity_symbol: "VOO.US".to_string(),
            crypto_symbol: "BTC-USD.CC".to_string(),
            start_date: NaiveDate::from_ymd_opt(2019, 1, 2).unwrap_or_default(),
            presets: PresetTable::builtin(),
            request_timeout: Duration::from_secs(60),
        }
    }
}

impl ServiceConfig {
    /// Resolve from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Resolve from an arbitrary variable lookup (tests pass a map).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let get = |name: &str| {
            lookup(name)
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        };

        let snapshot_dir = match get("QUARTZ_SNAPSHOT_DIR") {
            Some(dir) => PathBuf::from(dir),
            None if get("RUNNING_IN_CLOUD_RUN").is_some_and(|v| is_truthy(&v)) => {
                PathBuf::from(CLOUD_SNAPSHOT_DIR)
            }
            None => PathBuf::from(LOCAL_SNAPSHOT_DIR),
        };

        let start_date = match get("QUARTZ_START_DATE") {
            Some(value) => NaiveDate::parse_from_str(&value, "%Y-%m-%d").map_err(|_| {
                ConfigError::InvalidDate {
                    name: "QUARTZ_START_DATE",
                    value,
                }
            })?,
            None => defaults.start_date,
        };

        let presets = match get("QUARTZ_PRESETS_FILE") {
            Some(path) => PresetTable::from_file(&PathBuf::from(path))?,
            None => defaults.presets,
        };

        let port = match get("PORT") {
            Some(value) => value
                .parse::<u16>()
                .map_err(|_| ConfigError::InvalidNumber { name: "PORT", value })?,
            None => defaults.port,
        };

        let equity_symbol = get("QUARTZ_EQUITY_SYMBOL").unwrap_or(defaults.equity_symbol);
        let crypto_symbol = get("QUARTZ_CRYPTO_SYMBOL").unwrap_or(defaults.crypto_symbol);

        Ok(Self {
            bind: get("QUARTZ_BIND").unwrap_or(defaults.bind),
            port,
            snapshot_dir,
            eod_base_url: get("EOD_BASE_URL").unwrap_or(defaults.eod_base_url),
            eod_api_key: get("EOD_API_KEY").unwrap_or_default(),
            fetch_timeout: secs(&get, "QUARTZ_FETCH_TIMEOUT_SECS", defaults.fetch_timeout)?,
            equity_symbol,
            crypto_symbol,
            start_date,
            presets,
            request_timeout: secs(&get, "QUARTZ_REQUEST_TIMEOUT_SECS", defaults.request_timeout)?,
        })
    }
}

fn secs<G>(get: &G, name: &'static str, default: Duration) -> Result<Duration, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    match get(name) {
        None => Ok(default),
        Some(value) => match value.parse::<u64>() {
            Ok(n) if n > 0 => Ok(Duration::from_secs(n)),
            _ => Err(ConfigError::InvalidNumber { name, value }),
        },
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.to_lowercase().as_str(),
        "1" | "true" | "yes" | "y" | "on"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preset::BlendPreset;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> Result<ServiceConfig, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServiceConfig::from_lookup(|name| map.get(name).cloned())
    }

    #[test]
    fn defaults_when_unset() {
        let cfg = config_from(&[]).unwrap();
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.snapshot_dir, PathBuf::from(LOCAL_SNAPSHOT_DIR));
        assert_eq!(cfg.equity_symbol, "VOO.US");
        assert_eq!(cfg.crypto_symbol, "BTC-USD.CC");
        assert_eq!(cfg.start_date, NaiveDate::from_ymd_opt(2019, 1, 2).unwrap());
        assert_eq!(cfg.presets, PresetTable::builtin());
        assert!(cfg.eod_api_key.is_empty());
    }

    #[test]
    fn cloud_flag_selects_mounted_volume() {
        let cfg = config_from(&[("RUNNING_IN_CLOUD_RUN", "true")]).unwrap();
        assert_eq!(cfg.snapshot_dir, PathBuf::from(CLOUD_SNAPSHOT_DIR));

        let cfg = config_from(&[("RUNNING_IN_CLOUD_RUN", "false")]).unwrap();
        assert_eq!(cfg.snapshot_dir, PathBuf::from(LOCAL_SNAPSHOT_DIR));
    }

    #[test]
    fn explicit_dir_overrides_cloud_flag() {
        let cfg = config_from(&[
            ("RUNNING_IN_CLOUD_RUN", "true"),
            ("QUARTZ_SNAPSHOT_DIR", "/data/snapshots"),
        ])
        .unwrap();
        assert_eq!(cfg.snapshot_dir, PathBuf::from("/data/snapshots"));
    }

    #[test]
    fn overrides_are_applied() {
        let cfg = config_from(&[
            ("PORT", "9090"),
            ("EOD_API_KEY", " secret "),
            ("QUARTZ_START_DATE", "2020-06-01"),
            ("QUARTZ_FETCH_TIMEOUT_SECS", "5"),
            ("QUARTZ_EQUITY_SYMBOL", "SPY.US"),
        ])
        .unwrap();
        assert_eq!(cfg.port, 9090);
        assert_eq!(cfg.eod_api_key, "secret");
        assert_eq!(cfg.start_date, NaiveDate::from_ymd_opt(2020, 6, 1).unwrap());
        assert_eq!(cfg.fetch_timeout, Duration::from_secs(5));
        assert_eq!(cfg.equity_symbol, "SPY.US");
    }

    #[test]
    fn invalid_values_are_errors() {
        assert!(matches!(
            config_from(&[("QUARTZ_START_DATE", "01/02/2019")]),
            Err(ConfigError::InvalidDate { .. })
        ));
        assert!(matches!(
            config_from(&[("QUARTZ_FETCH_TIMEOUT_SECS", "0")]),
            Err(ConfigError::InvalidNumber { .. })
        ));
        assert!(matches!(
            config_from(&[("PORT", "http")]),
            Err(ConfigError::InvalidNumber { .. })
        ));
    }

    #[test]
    fn presets_file_is_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("presets.toml");
        std::fs::write(&path, "[presets.QUARTZ8]\nequity = 8\ncrypto = 2\n").unwrap();

        let cfg = config_from(&[("QUARTZ_PRESETS_FILE", path.to_str().unwrap())]).unwrap();
        assert_eq!(cfg.presets.len(), 1);
        assert_eq!(cfg.presets.resolve("quartz8").unwrap().1, BlendPreset::new(8, 2));
    }

    #[test]
    fn missing_presets_file_is_an_error() {
        assert!(matches!(
            config_from(&[("QUARTZ_PRESETS_FILE", "/nonexistent/presets.toml")]),
            Err(ConfigError::Presets(_))
        ));
    }
}
