//! Domain types for the blend index

pub mod bar;
pub mod ids;
pub mod index;

pub use bar::{DailyBar, PriceSeries, SeriesError};
pub use ids::SnapshotKey;
pub use index::IndexPoint;
