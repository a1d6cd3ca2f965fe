//! Storage engines behind one read / write / delete capability.
//!
//! The engine is a closed enum picked once from configuration:
//!
//! - [`HierarchicalStore`]: one compressed container per name holding a single
//!   sub-table, `fixed` (replace only) or `table` (appendable).
//! - [`ColumnarStore`]: one directory per name, escaped column names.
//! - [`DocumentStore`]: library per name on a document server.

pub mod columnar;
pub mod document;
pub mod hierarchical;

pub use columnar::ColumnarStore;
pub use document::{
    DocumentBackend, DocumentSession, DocumentStore, InMemoryBackend, SocketTimeouts,
};
pub use hierarchical::{HdfFormat, HierarchicalStore, StoreMeta};

use crate::config::FxCacheConfig;
use crate::error::DataError;
use crate::series::{DateRange, TimeSeries};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use tracing::Span;

/// Per-call write switches.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteOptions {
    /// Append to the stored series instead of replacing it.
    pub append: bool,
    /// Document engine only: drop columns whose name contains this.
    pub filter_out_matching: Option<String>,
}

impl WriteOptions {
    pub fn replace() -> Self {
        Self::default()
    }

    pub fn append() -> Self {
        Self {
            append: true,
            ..Self::default()
        }
    }

    pub fn with_filter_out_matching(mut self, pattern: impl Into<String>) -> Self {
        self.filter_out_matching = Some(pattern.into());
        self
    }
}

/// Uniform capability every engine offers.
pub trait TimeSeriesStore {
    fn write(&self, name: &str, data: &TimeSeries, opts: &WriteOptions) -> Result<(), DataError>;

    /// `Ok(None)` when nothing is stored under `name`.
    fn read(&self, name: &str, range: Option<&DateRange>)
        -> Result<Option<TimeSeries>, DataError>;

    /// Remove whatever is stored under `name`. Missing artifacts are not an
    /// error.
    fn delete(&self, name: &str) -> Result<(), DataError>;

    /// Physical artifact (path or library) a logical name maps to.
    fn physical_name(&self, name: &str) -> String;
}

/// Engine tag as it appears in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EngineKind {
    #[default]
    #[serde(rename = "hdf5_fixed", alias = "hdf5")]
    Hdf5Fixed,
    #[serde(rename = "hdf5_table")]
    Hdf5Table,
    #[serde(rename = "bcolz")]
    Columnar,
    #[serde(rename = "arctic")]
    Document,
}

impl EngineKind {
    pub fn tag(&self) -> &'static str {
        match self {
            EngineKind::Hdf5Fixed => "hdf5_fixed",
            EngineKind::Hdf5Table => "hdf5_table",
            EngineKind::Columnar => "bcolz",
            EngineKind::Document => "arctic",
        }
    }
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for EngineKind {
    type Err = DataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "hdf5" | "hdf5_fixed" => Ok(EngineKind::Hdf5Fixed),
            "hdf5_table" => Ok(EngineKind::Hdf5Table),
            "bcolz" => Ok(EngineKind::Columnar),
            "arctic" => Ok(EngineKind::Document),
            _ => Err(DataError::UnknownEngine(s.to_string())),
        }
    }
}

/// The configured engine.
pub enum StorageEngine {
    Hierarchical(HierarchicalStore),
    Columnar(ColumnarStore),
    Document(DocumentStore),
}

impl StorageEngine {
    /// Resolve the engine once. The document engine needs a backend; the
    /// file engines ignore it.
    pub fn from_config(
        config: &FxCacheConfig,
        backend: Option<Arc<dyn DocumentBackend>>,
    ) -> Result<Self, DataError> {
        let root = config.cache_dir.clone();
        Ok(match config.engine.kind {
            EngineKind::Hdf5Fixed => {
                StorageEngine::Hierarchical(HierarchicalStore::new(root, HdfFormat::Fixed))
            }
            EngineKind::Hdf5Table => {
                StorageEngine::Hierarchical(HierarchicalStore::new(root, HdfFormat::Table))
            }
            EngineKind::Columnar => StorageEngine::Columnar(ColumnarStore::new(root)),
            EngineKind::Document => {
                let backend = backend.ok_or_else(|| {
                    DataError::Document("no document backend configured".to_string())
                })?;
                StorageEngine::Document(
                    DocumentStore::new(backend, config.engine.db_server.clone())
                        .with_timeouts(config.engine.timeouts),
                )
            }
        })
    }

    pub fn kind(&self) -> EngineKind {
        match self {
            StorageEngine::Hierarchical(s) => match s.format() {
                HdfFormat::Fixed => EngineKind::Hdf5Fixed,
                HdfFormat::Table => EngineKind::Hdf5Table,
            },
            StorageEngine::Columnar(_) => EngineKind::Columnar,
            StorageEngine::Document(_) => EngineKind::Document,
        }
    }

    /// Route this engine's events through `span`.
    pub fn with_span(self, span: Span) -> Self {
        match self {
            StorageEngine::Hierarchical(s) => StorageEngine::Hierarchical(s.with_span(span)),
            StorageEngine::Columnar(s) => StorageEngine::Columnar(s.with_span(span)),
            StorageEngine::Document(s) => StorageEngine::Document(s.with_span(span)),
        }
    }

    fn as_store(&self) -> &dyn TimeSeriesStore {
        match self {
            StorageEngine::Hierarchical(s) => s,
            StorageEngine::Columnar(s) => s,
            StorageEngine::Document(s) => s,
        }
    }
}

impl TimeSeriesStore for StorageEngine {
    fn write(&self, name: &str, data: &TimeSeries, opts: &WriteOptions) -> Result<(), DataError> {
        self.as_store().write(name, data, opts)
    }

    fn read(
        &self,
        name: &str,
        range: Option<&DateRange>,
    ) -> Result<Option<TimeSeries>, DataError> {
        self.as_store().read(name, range)
    }

    fn delete(&self, name: &str) -> Result<(), DataError> {
        self.as_store().delete(name)
    }

    fn physical_name(&self, name: &str) -> String {
        self.as_store().physical_name(name)
    }
}

// ── Shared append logic ─────────────────────────────────────────────

/// Number of leading rows of a sorted `index` strictly before `boundary`.
///
/// Scans backward from the end, so the cost is the size of the overlap, not
/// of the store.
pub fn overlap_boundary(index: &[NaiveDateTime], boundary: NaiveDateTime) -> usize {
    let mut keep = index.len();
    while keep > 0 && index[keep - 1] >= boundary {
        keep -= 1;
    }
    keep
}

/// Merge a batch onto stored rows so that no timestamp repeats and the
/// batch wins wherever they overlap.
///
/// Stored rows at or after the batch's first timestamp are dropped; if that
/// is every stored row the batch replaces the store outright.
pub fn merge_append(stored: &TimeSeries, batch: &TimeSeries) -> Result<TimeSeries, DataError> {
    let batch = prepare_batch(batch)?;
    let Some(first) = batch.first_timestamp() else {
        return Ok(stored.clone());
    };
    stored.check_schema(&batch)?;

    let keep = overlap_boundary(stored.index(), first);
    if keep == 0 {
        return Ok(batch.with_index_name(stored.index_name()));
    }
    let mut merged = stored.clone();
    merged.truncate(keep);
    merged.vstack(&batch)?;
    Ok(merged)
}

/// Sort a batch and reject repeated timestamps.
pub(crate) fn prepare_batch(batch: &TimeSeries) -> Result<TimeSeries, DataError> {
    let mut batch = batch.clone();
    batch.sort_by_index();
    if let Some(t) = batch.first_duplicate() {
        return Err(DataError::DuplicateIndex(format!(
            "batch repeats timestamp {t}"
        )));
    }
    Ok(batch)
}

// ── Filesystem helpers ──────────────────────────────────────────────

/// Delete a file; a missing file is fine.
pub(crate) fn remove_file_if_exists(path: &Path) -> Result<(), DataError> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != ErrorKind::NotFound => Err(DataError::io(path)(e)),
        _ => Ok(()),
    }
}

/// Delete a directory tree; a missing directory is fine.
pub(crate) fn remove_dir_if_exists(path: &Path) -> Result<(), DataError> {
    match fs::remove_dir_all(path) {
        Err(e) if e.kind() != ErrorKind::NotFound => Err(DataError::io(path)(e)),
        _ => Ok(()),
    }
}

/// `<path><suffix>`, keeping the full file name.
pub(crate) fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut s = OsString::from(path.as_os_str());
    s.push(suffix);
    PathBuf::from(s)
}
