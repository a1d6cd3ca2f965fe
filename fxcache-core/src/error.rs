//! Structured error types for storage, parsing and reshaping.
//!
//! Two failure classes never surface here: a missing artifact on read is
//! `Ok(None)`, and a not-found during a cleanup delete is swallowed.
//! Everything else propagates to the caller.

use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DataError {
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("spreadsheet read error: {0}")]
    ExcelRead(#[from] calamine::Error),

    #[error("spreadsheet write error: {0}")]
    ExcelWrite(#[from] rust_xlsxwriter::XlsxError),

    #[error("metadata error: {0}")]
    Metadata(#[from] serde_json::Error),

    #[error("could not parse date '{value}' ({parser})")]
    DateParse { value: String, parser: &'static str },

    #[error("could not parse value '{value}' in column '{column}'")]
    ValueParse { column: String, value: String },

    #[error("missing column '{column}'")]
    MissingColumn { column: String },

    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("duplicate timestamps in index: {0}")]
    DuplicateIndex(String),

    #[error("invalid series: {0}")]
    InvalidSeries(String),

    #[error("append is not supported by the '{format}' sub-format")]
    AppendUnsupported { format: &'static str },

    #[error("timezone error: {0}")]
    Timezone(String),

    #[error("unknown storage engine '{0}'")]
    UnknownEngine(String),

    #[error("document store error: {0}")]
    Document(String),

    #[error("market data error: {0}")]
    MarketData(String),
}

impl DataError {
    /// Adapter for `map_err` that attaches the offending path.
    pub(crate) fn io(path: &Path) -> impl FnOnce(std::io::Error) -> DataError {
        let path = path.to_path_buf();
        move |source| DataError::Io { path, source }
    }
}
