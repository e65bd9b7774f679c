//! Quartz Core — daily snapshots, calendar alignment and blend-index composition.
//!
//! This crate contains the data-reconciliation pipeline behind the index service:
//! - Domain types (daily bars, price series, index points, snapshot keys)
//! - Upstream fetch abstraction and the EOD provider
//! - Idempotent per-day snapshot store with atomic publication
//! - Forward-fill calendar alignment
//! - Rebased weighted index composition
//! - Preset table, configuration and the request orchestrator

pub mod composer;
pub mod config;
pub mod data;
pub mod domain;
pub mod preset;
pub mod service;

pub use composer::{compose_index, ComposeError};
pub use config::{ConfigError, ServiceConfig};
pub use preset::{BlendPreset, PresetTable, ResolveError};
pub use service::{ErrorClass, IndexError, IndexService};
