//! fxcache core: FX time-series storage and reshaping.
//!
//! This crate contains:
//! - The uniform in-memory time series (naive or zone-aware index, typed columns)
//! - CSV and Excel readers and writers with pluggable date parsing
//! - Storage engines behind one read / write / delete trait
//! - The FX hourly volume reshaper over a market-data collaborator
//! - TOML configuration and logging setup for binaries

pub mod config;
pub mod convert;
pub mod dateparse;
pub mod error;
pub mod formats;
pub mod logging;
pub mod naming;
pub mod series;
pub mod store;
pub mod volume;

pub use config::{ConfigError, FxCacheConfig};
pub use error::DataError;
pub use series::{Column, ColumnValues, DateRange, Frequency, TimeSeries};
pub use store::{EngineKind, StorageEngine, TimeSeriesStore, WriteOptions};
