//! Hierarchical container store.
//!
//! Layout: `{root}/{name}.h5` plus a sidecar `{root}/{name}.h5.meta.json`.
//!
//! The container is a zstd-compressed Arrow IPC file holding one sub-table.
//! `fixed` uses the IPC file format and can only be replaced; `table` uses
//! the IPC stream format and accepts appends. The sidecar names the sub-table
//! key and format and carries what the frame cannot: the index timezone and
//! index name, the row count and range, and a BLAKE3 content hash.
//!
//! Every write goes to `{name}.temp.h5` first and is renamed into place.

use super::{
    merge_append, prepare_batch, remove_file_if_exists, with_suffix, TimeSeriesStore,
    WriteOptions,
};
use crate::error::DataError;
use crate::naming::h5_filename;
use crate::series::frame::{from_dataframe, to_dataframe};
use crate::series::{
    is_intraday_name, parse_timezone, Column, DateRange, TimeSeries, DEFAULT_INDEX_NAME,
};
use chrono::{Datelike, NaiveDateTime, Timelike};
use polars::prelude::{
    IpcCompression, IpcReader, IpcStreamReader, IpcStreamWriter, IpcWriter, SerReader, SerWriter,
};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info, Span};

/// Sub-table key for ordinary series.
pub const DATA_KEY: &str = "data";

/// Sub-table key for [`HierarchicalStore::write_r_compatible`] exports.
pub const R_COMPATIBLE_KEY: &str = "df_for_r";

const META_SUFFIX: &str = ".meta.json";

/// Columns prepended by [`HierarchicalStore::write_r_compatible`].
const R_TIME_COLUMNS: [&str; 7] = [
    "Year",
    "Month",
    "Day",
    "Hour",
    "Minute",
    "Second",
    "Millisecond",
];

/// Container sub-format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HdfFormat {
    /// Written in one go, replace only.
    #[default]
    Fixed,
    /// Appendable.
    Table,
}

impl HdfFormat {
    pub fn name(&self) -> &'static str {
        match self {
            HdfFormat::Fixed => "fixed",
            HdfFormat::Table => "table",
        }
    }
}

/// Metadata sidecar for a stored container.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreMeta {
    pub key: String,
    pub format: HdfFormat,
    pub timezone: Option<String>,
    pub index_name: String,
    pub rows: usize,
    pub first: Option<NaiveDateTime>,
    pub last: Option<NaiveDateTime>,
    pub data_hash: String,
    pub written_at: NaiveDateTime,
}

impl StoreMeta {
    fn describe(series: &TimeSeries, key: &str, format: HdfFormat) -> Self {
        Self {
            key: key.to_string(),
            format,
            timezone: series.timezone().map(|tz| tz.name().to_string()),
            index_name: series.index_name().to_string(),
            rows: series.len(),
            first: series.first_timestamp(),
            last: series.last_timestamp(),
            data_hash: series.content_hash(),
            written_at: chrono::Utc::now().naive_utc(),
        }
    }
}

/// The hierarchical container store.
pub struct HierarchicalStore {
    root: PathBuf,
    format: HdfFormat,
    span: Span,
}

impl HierarchicalStore {
    pub fn new(root: impl Into<PathBuf>, format: HdfFormat) -> Self {
        Self {
            root: root.into(),
            format,
            span: Span::none(),
        }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn format(&self) -> HdfFormat {
        self.format
    }

    /// Container path for a logical name. Absolute names ignore the root.
    pub fn path_for(&self, name: &str) -> PathBuf {
        self.root.join(h5_filename(name))
    }

    fn temp_path_for(&self, name: &str) -> PathBuf {
        self.path_for(&format!("{name}.temp"))
    }

    /// Sidecar of the container stored under `name`, if any.
    pub fn read_meta(&self, name: &str) -> Result<Option<StoreMeta>, DataError> {
        read_meta_file(&with_suffix(&self.path_for(name), META_SUFFIX))
    }

    /// Store `data` under `name`, replacing or appending.
    ///
    /// Intraday names are narrowed to `f32` first. Appending to a `fixed`
    /// store fails; appending where nothing is stored is a fresh write; an
    /// empty batch is a no-op.
    pub fn write_series(&self, name: &str, data: &TimeSeries, append: bool) -> Result<(), DataError> {
        let _guard = self.span.enter();
        let data = if is_intraday_name(name) {
            data.clone().to_f32()
        } else {
            data.clone()
        };

        if !append {
            let mut data = data;
            data.sort_by_index();
            return self.commit(name, &data, DATA_KEY, self.format);
        }

        if self.format == HdfFormat::Fixed {
            return Err(DataError::AppendUnsupported {
                format: HdfFormat::Fixed.name(),
            });
        }
        if data.is_empty() {
            debug!(name, "empty batch, nothing to append");
            return Ok(());
        }

        match self.load(&self.path_for(name))? {
            None => {
                debug!(name, "nothing stored yet, appending as a fresh write");
                self.commit(name, &prepare_batch(&data)?, DATA_KEY, HdfFormat::Table)
            }
            Some((_, HdfFormat::Fixed)) => Err(DataError::AppendUnsupported {
                format: HdfFormat::Fixed.name(),
            }),
            Some((stored, HdfFormat::Table)) => {
                let merged = merge_append(&stored, &data)?;
                info!(
                    name,
                    stored = stored.len(),
                    batch = data.len(),
                    total = merged.len(),
                    "appended batch"
                );
                self.commit(name, &merged, DATA_KEY, HdfFormat::Table)
            }
        }
    }

    /// Stored series, `None` when no container exists. Intraday names come
    /// back as `f32`.
    pub fn read_series(&self, name: &str) -> Result<Option<TimeSeries>, DataError> {
        let _guard = self.span.enter();
        let Some((series, _)) = self.load(&self.path_for(name))? else {
            debug!(name, "no container stored");
            return Ok(None);
        };
        debug!(name, rows = series.len(), "read series");
        Ok(Some(if is_intraday_name(name) {
            series.to_f32()
        } else {
            series
        }))
    }

    /// Export for consumers that cannot read timestamps: every value is
    /// `f32`, and the index is also spelled out as `Year`, `Month`, `Day`,
    /// `Hour`, `Minute`, `Second`, `Millisecond` columns (wall clock in the
    /// series' zone) ahead of the selected `fields`. Stored under key
    /// `df_for_r` in the `fixed` format.
    pub fn write_r_compatible(
        &self,
        name: &str,
        data: &TimeSeries,
        fields: Option<&[&str]>,
    ) -> Result<(), DataError> {
        let _guard = self.span.enter();
        let selected = match fields {
            Some(fields) => data.select(fields)?,
            None => data.clone(),
        };

        let mut parts: [Vec<Option<f32>>; 7] = Default::default();
        for row in 0..data.len() {
            let Some(t) = data.local_timestamp(row) else {
                continue;
            };
            let values = [
                t.year() as f32,
                t.month() as f32,
                t.day() as f32,
                t.hour() as f32,
                t.minute() as f32,
                t.second() as f32,
                (t.nanosecond() / 1_000_000) as f32,
            ];
            for (part, value) in parts.iter_mut().zip(values) {
                part.push(Some(value));
            }
        }

        let mut columns: Vec<Column> = R_TIME_COLUMNS
            .iter()
            .zip(parts)
            .map(|(name, values)| Column::f32(*name, values))
            .collect();
        columns.extend(selected.to_f32().columns().iter().cloned());

        let mut export = TimeSeries::new(data.index().to_vec(), columns)?
            .with_index_name(data.index_name());
        export.set_timezone(data.timezone());
        export.sort_by_index();
        self.commit(name, &export, R_COMPATIBLE_KEY, HdfFormat::Fixed)
    }

    /// Write to the temporary container, drop the old one, rename into place,
    /// then write the sidecar.
    fn commit(
        &self,
        name: &str,
        series: &TimeSeries,
        key: &str,
        format: HdfFormat,
    ) -> Result<(), DataError> {
        let path = self.path_for(name);
        let temp = self.temp_path_for(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(DataError::io(parent))?;
        }

        remove_file_if_exists(&temp)?;
        if let Err(e) = write_container(&temp, series, format) {
            let _ = fs::remove_file(&temp);
            return Err(e);
        }

        let meta_path = with_suffix(&path, META_SUFFIX);
        remove_file_if_exists(&path)?;
        remove_file_if_exists(&meta_path)?;
        fs::rename(&temp, &path).map_err(|e| {
            let _ = fs::remove_file(&temp);
            DataError::io(&path)(e)
        })?;

        let meta = StoreMeta::describe(series, key, format);
        fs::write(&meta_path, serde_json::to_string_pretty(&meta)?)
            .map_err(DataError::io(&meta_path))?;

        info!(
            name,
            path = %path.display(),
            format = format.name(),
            key,
            rows = series.len(),
            "wrote container"
        );
        Ok(())
    }

    /// Stored series and its sub-format. Without a sidecar the store's own
    /// format and a naive `Date` index are assumed.
    fn load(&self, path: &Path) -> Result<Option<(TimeSeries, HdfFormat)>, DataError> {
        let file = match File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(DataError::io(path)(e)),
        };
        let meta = read_meta_file(&with_suffix(path, META_SUFFIX))?;
        let (format, index_name, timezone) = match meta {
            Some(m) => (m.format, m.index_name, m.timezone),
            None => (self.format, DEFAULT_INDEX_NAME.to_string(), None),
        };

        let df = match format {
            HdfFormat::Fixed => IpcReader::new(file).finish()?,
            HdfFormat::Table => IpcStreamReader::new(file).finish()?,
        };
        let mut series = from_dataframe(&df, &index_name)?;
        if let Some(tz) = timezone {
            series.set_timezone(Some(parse_timezone(&tz)?));
        }
        Ok(Some((series, format)))
    }
}

impl TimeSeriesStore for HierarchicalStore {
    fn write(&self, name: &str, data: &TimeSeries, opts: &WriteOptions) -> Result<(), DataError> {
        self.write_series(name, data, opts.append)
    }

    fn read(
        &self,
        name: &str,
        range: Option<&DateRange>,
    ) -> Result<Option<TimeSeries>, DataError> {
        let series = self.read_series(name)?;
        Ok(match range {
            Some(range) => series.map(|s| s.retain_range(range)),
            None => series,
        })
    }

    fn delete(&self, name: &str) -> Result<(), DataError> {
        let _guard = self.span.enter();
        let path = self.path_for(name);
        remove_file_if_exists(&path)?;
        remove_file_if_exists(&with_suffix(&path, META_SUFFIX))?;
        info!(name, path = %path.display(), "deleted container");
        Ok(())
    }

    fn physical_name(&self, name: &str) -> String {
        self.path_for(name).display().to_string()
    }
}

fn write_container(path: &Path, series: &TimeSeries, format: HdfFormat) -> Result<(), DataError> {
    let mut df = to_dataframe(series, series.index_name())?;
    let file = File::create(path).map_err(DataError::io(path))?;
    match format {
        HdfFormat::Fixed => IpcWriter::new(file)
            .with_compression(Some(IpcCompression::ZSTD))
            .finish(&mut df)?,
        HdfFormat::Table => IpcStreamWriter::new(file)
            .with_compression(Some(IpcCompression::ZSTD))
            .finish(&mut df)?,
    }
    Ok(())
}

fn read_meta_file(path: &Path) -> Result<Option<StoreMeta>, DataError> {
    match fs::read_to_string(path) {
        Ok(text) => Ok(Some(serde_json::from_str(&text)?)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(DataError::io(path)(e)),
    }
}
