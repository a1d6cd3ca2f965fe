//! Columnar directory store.
//!
//! Layout: `{root}/{name}.bcolz/data.parquet` and `{root}/{name}.bcolz/meta.json`.
//!
//! Column names are escaped and prefixed `A_`; the index is the `DTS_`
//! column. Writes always replace the whole directory. Any failure to decode
//! a stored directory reads as "nothing stored".

use super::{remove_dir_if_exists, TimeSeriesStore, WriteOptions};
use crate::error::DataError;
use crate::naming::{columnar_column_name, columnar_dirname, series_column_name, COLUMNAR_INDEX};
use crate::series::frame::{from_dataframe, to_dataframe};
use crate::series::{parse_timezone, Column, DateRange, TimeSeries};
use polars::prelude::{ParquetReader, ParquetWriter, SerReader};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn, Span};

const DATA_FILE: &str = "data.parquet";
const META_FILE: &str = "meta.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ColumnarMeta {
    index_name: String,
    timezone: Option<String>,
    rows: usize,
    data_hash: String,
}

pub struct ColumnarStore {
    root: PathBuf,
    span: Span,
}

impl ColumnarStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            span: Span::none(),
        }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn dir_for(&self, name: &str) -> PathBuf {
        self.root.join(columnar_dirname(name))
    }

    fn write_dir(&self, dir: &Path, data: &TimeSeries) -> Result<(), DataError> {
        remove_dir_if_exists(dir)?;
        fs::create_dir_all(dir).map_err(DataError::io(dir))?;

        let mut data = data.clone();
        data.sort_by_index();

        let stored_columns = data
            .columns()
            .iter()
            .map(|c| Column::new(columnar_column_name(c.name()), c.values().clone()))
            .collect();
        let stored = TimeSeries::new(data.index().to_vec(), stored_columns)?;

        let mut df = to_dataframe(&stored, COLUMNAR_INDEX)?;
        let data_path = dir.join(DATA_FILE);
        let file = File::create(&data_path).map_err(DataError::io(&data_path))?;
        ParquetWriter::new(file).finish(&mut df)?;

        let meta = ColumnarMeta {
            index_name: data.index_name().to_string(),
            timezone: data.timezone().map(|tz| tz.name().to_string()),
            rows: data.len(),
            data_hash: data.content_hash(),
        };
        let meta_path = dir.join(META_FILE);
        fs::write(&meta_path, serde_json::to_string_pretty(&meta)?)
            .map_err(DataError::io(&meta_path))?;
        Ok(())
    }

    fn read_dir(&self, dir: &Path) -> Result<TimeSeries, DataError> {
        let meta_path = dir.join(META_FILE);
        let meta: ColumnarMeta = serde_json::from_str(
            &fs::read_to_string(&meta_path).map_err(DataError::io(&meta_path))?,
        )?;

        let data_path = dir.join(DATA_FILE);
        let file = File::open(&data_path).map_err(DataError::io(&data_path))?;
        let df = ParquetReader::new(file).finish()?;
        let stored = from_dataframe(&df, COLUMNAR_INDEX)?;

        let columns = stored
            .columns()
            .iter()
            .map(|c| {
                series_column_name(c.name())
                    .map(|name| Column::new(name, c.values().clone()))
                    .ok_or_else(|| {
                        DataError::SchemaMismatch(format!("unexpected stored column '{}'", c.name()))
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut series =
            TimeSeries::new(stored.index().to_vec(), columns)?.with_index_name(meta.index_name);
        if let Some(tz) = meta.timezone {
            series.set_timezone(Some(parse_timezone(&tz)?));
        }
        Ok(series)
    }
}

impl TimeSeriesStore for ColumnarStore {
    /// Always a full replacement, append or not.
    fn write(&self, name: &str, data: &TimeSeries, opts: &WriteOptions) -> Result<(), DataError> {
        let _guard = self.span.enter();
        if opts.append {
            debug!(name, "columnar store replaces on append");
        }
        let dir = self.dir_for(name);
        self.write_dir(&dir, data)?;
        info!(name, dir = %dir.display(), rows = data.len(), "wrote columnar directory");
        Ok(())
    }

    fn read(
        &self,
        name: &str,
        range: Option<&DateRange>,
    ) -> Result<Option<TimeSeries>, DataError> {
        let _guard = self.span.enter();
        let dir = self.dir_for(name);
        if !dir.is_dir() {
            debug!(name, "no columnar directory stored");
            return Ok(None);
        }
        match self.read_dir(&dir) {
            Ok(series) => Ok(Some(match range {
                Some(range) => series.retain_range(range),
                None => series,
            })),
            Err(e) => {
                warn!(name, dir = %dir.display(), error = %e, "unreadable columnar directory");
                Ok(None)
            }
        }
    }

    fn delete(&self, name: &str) -> Result<(), DataError> {
        let _guard = self.span.enter();
        let dir = self.dir_for(name);
        remove_dir_if_exists(&dir)?;
        info!(name, dir = %dir.display(), "deleted columnar directory");
        Ok(())
    }

    fn physical_name(&self, name: &str) -> String {
        self.dir_for(name).display().to_string()
    }
}
