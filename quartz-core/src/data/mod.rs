//! Data acquisition, snapshots and calendar alignment

pub mod align;
pub mod decode;
pub mod eod;
pub mod fixture;
pub mod provider;
pub mod snapshot;

pub use align::{forward_fill, AlignError};
pub use decode::{decode_series, decode_series_as_of};
pub use eod::EodProvider;
pub use provider::{DataError, DataSource, PriceFetcher};
pub use snapshot::{LoadedSeries, Snapshot, SnapshotMeta, SnapshotStatus, SnapshotStore};
