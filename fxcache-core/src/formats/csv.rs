//! CSV reader and writer.

use super::{IndexColumn, RawCell, RawTable, ReadOptions};
use crate::error::DataError;
use crate::series::{Frequency, TimeSeries};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tracing::debug;

/// Read a CSV with a header row into a series.
///
/// Intraday files use the first column as the index. Daily files look for a
/// `DATE` (then `Date`) column.
pub fn read_csv(path: &Path, opts: &ReadOptions) -> Result<TimeSeries, DataError> {
    let file = File::open(path).map_err(DataError::io(path))?;
    let mut reader = ::csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(BufReader::new(file));

    let headers = reader
        .headers()?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(
            record
                .iter()
                .map(|field| {
                    if field.is_empty() {
                        RawCell::Empty
                    } else {
                        RawCell::Text(field.to_string())
                    }
                })
                .collect(),
        );
    }
    debug!(path = %path.display(), rows = rows.len(), "read CSV");

    let index_column = match opts.freq {
        Frequency::Intraday => IndexColumn::First,
        Frequency::Daily => IndexColumn::DailyHeader,
    };
    RawTable { headers, rows }.into_series(index_column, opts)
}

/// Write a series as CSV: a header row with the index name, then one row per
/// timestamp. Nulls are written as empty cells.
pub fn write_csv(path: &Path, series: &TimeSeries) -> Result<(), DataError> {
    let file = File::create(path).map_err(DataError::io(path))?;
    let mut writer = ::csv::Writer::from_writer(file);

    let mut header = Vec::with_capacity(series.width() + 1);
    header.push(series.index_name().to_string());
    header.extend(series.column_names().into_iter().map(str::to_string));
    writer.write_record(&header)?;

    for row in 0..series.len() {
        let mut record = Vec::with_capacity(series.width() + 1);
        record.push(series.format_timestamp(row).unwrap_or_default());
        for col in series.columns() {
            record.push(col.values().format_cell(row));
        }
        writer.write_record(&record)?;
    }

    writer.flush().map_err(DataError::io(path))?;
    Ok(())
}
