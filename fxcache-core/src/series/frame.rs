//! Conversions between `TimeSeries` and Polars `DataFrame`.
//!
//! The index is stored as a `Datetime(ns)` column of UTC instants. The zone
//! of an aware series is not written into the frame; the stores keep it in
//! their metadata sidecar.

use super::{Column, ColumnValues, TimeSeries};
use crate::error::DataError;
use chrono::{DateTime, NaiveDateTime};
use polars::prelude::{
    Column as PlColumn, DataFrame, DataType, NamedFrom, PlSmallStr, Series, TimeUnit,
};

const NANOS_PER_SEC: i64 = 1_000_000_000;

/// Build a frame with the index as column `index_col` followed by the data
/// columns in order.
pub(crate) fn to_dataframe(ts: &TimeSeries, index_col: &str) -> Result<DataFrame, DataError> {
    let nanos = ts
        .index()
        .iter()
        .map(|t| {
            t.and_utc().timestamp_nanos_opt().ok_or_else(|| {
                DataError::InvalidSeries(format!("timestamp {t} outside nanosecond range"))
            })
        })
        .collect::<Result<Vec<i64>, _>>()?;

    let mut columns = Vec::with_capacity(ts.width() + 1);
    columns.push(
        PlColumn::new(PlSmallStr::from(index_col), nanos)
            .cast(&DataType::Datetime(TimeUnit::Nanoseconds, None))?,
    );

    for col in ts.columns() {
        let name = PlSmallStr::from(col.name());
        let series = match col.values() {
            ColumnValues::F64(v) => Series::new(name, v.as_slice()),
            ColumnValues::F32(v) => Series::new(name, v.as_slice()),
            ColumnValues::Text(v) => Series::new(name, v.as_slice()),
        };
        columns.push(PlColumn::from(series));
    }

    Ok(DataFrame::new(columns)?)
}

/// Read a frame back. `index_col` holds the timestamps; every other column
/// becomes a data column. Integer and boolean columns widen to `f64`.
pub(crate) fn from_dataframe(df: &DataFrame, index_col: &str) -> Result<TimeSeries, DataError> {
    let index_raw = df.column(index_col).map_err(|_| DataError::MissingColumn {
        column: index_col.to_string(),
    })?;
    let index_ns = index_raw
        .cast(&DataType::Datetime(TimeUnit::Nanoseconds, None))?
        .cast(&DataType::Int64)?;
    let index_ca = index_ns.i64()?;

    let mut index = Vec::with_capacity(df.height());
    for row in 0..df.height() {
        let nanos = index_ca
            .get(row)
            .ok_or_else(|| DataError::InvalidSeries(format!("null timestamp at row {row}")))?;
        index.push(nanos_to_naive(nanos)?);
    }

    let mut columns = Vec::with_capacity(df.width().saturating_sub(1));
    for col in df.get_columns() {
        let name = col.name().as_str();
        if name == index_col {
            continue;
        }
        let values = match col.dtype() {
            DataType::Float64 => ColumnValues::F64(col.f64()?.into_iter().collect()),
            DataType::Float32 => ColumnValues::F32(col.f32()?.into_iter().collect()),
            DataType::String => ColumnValues::Text(
                col.str()?
                    .into_iter()
                    .map(|v| v.map(str::to_string))
                    .collect(),
            ),
            DataType::Datetime(_, _) | DataType::Date | DataType::Null => {
                return Err(DataError::SchemaMismatch(format!(
                    "column '{name}' has unsupported type {}",
                    col.dtype()
                )))
            }
            _ => {
                let widened = col.cast(&DataType::Float64)?;
                ColumnValues::F64(widened.f64()?.into_iter().collect())
            }
        };
        columns.push(Column::new(name, values));
    }

    Ok(TimeSeries::new(index, columns)?.with_index_name(index_col))
}

fn nanos_to_naive(nanos: i64) -> Result<NaiveDateTime, DataError> {
    let secs = nanos.div_euclid(NANOS_PER_SEC);
    let sub = nanos.rem_euclid(NANOS_PER_SEC) as u32;
    DateTime::from_timestamp(secs, sub)
        .map(|d| d.naive_utc())
        .ok_or_else(|| DataError::InvalidSeries(format!("timestamp {nanos}ns out of range")))
}
