//! Excel reader and writer.
//!
//! Reading goes through calamine, writing through rust_xlsxwriter. The writer
//! cannot edit a workbook in place, so when other sheets must survive they
//! are read back with calamine and rewritten cell by cell.

use super::{IndexColumn, RawCell, RawTable, ReadOptions};
use crate::error::DataError;
use crate::series::{ColumnValues, TimeSeries};
use calamine::{open_workbook_auto, Data, DataType, Range, Reader};
use rust_xlsxwriter::{Format, Workbook, Worksheet};
use std::path::Path;
use tracing::debug;

const DATETIME_FORMAT: &str = "yyyy-mm-dd hh:mm:ss";

/// Read one sheet. The first column is the index; the first row holds the
/// headers. Native date cells are taken as-is.
pub fn read_excel(path: &Path, sheet: &str, opts: &ReadOptions) -> Result<TimeSeries, DataError> {
    let mut workbook = open_workbook_auto(path)?;
    let range = workbook.worksheet_range(sheet)?;

    let mut rows = range.rows();
    let headers = rows
        .next()
        .map(|row| row.iter().map(|c| c.to_string().trim().to_string()).collect())
        .unwrap_or_default();
    let rows: Vec<Vec<RawCell>> = rows.map(|row| row.iter().map(raw_cell).collect()).collect();
    debug!(path = %path.display(), sheet, rows = rows.len(), "read sheet");

    RawTable { headers, rows }.into_series(IndexColumn::First, opts)
}

fn raw_cell(cell: &Data) -> RawCell {
    match cell {
        Data::Empty | Data::Error(_) => RawCell::Empty,
        Data::String(s) => RawCell::Text(s.clone()),
        Data::Float(x) => RawCell::Number(*x),
        Data::Int(i) => RawCell::Number(*i as f64),
        Data::Bool(b) => RawCell::Number(f64::from(u8::from(*b))),
        Data::DateTime(_) | Data::DateTimeIso(_) => match cell.as_datetime() {
            Some(t) => RawCell::DateTime(t),
            None => RawCell::Text(cell.to_string()),
        },
        Data::DurationIso(s) => RawCell::Text(s.clone()),
    }
}

/// Write `series` to `sheet`.
///
/// With `create_new` the workbook is created from scratch. Otherwise the
/// sheets of an existing workbook are kept and a sheet named `sheet` is
/// replaced where it stood; a new sheet goes last.
pub fn write_excel(
    path: &Path,
    sheet: &str,
    series: &TimeSeries,
    create_new: bool,
) -> Result<(), DataError> {
    let existing = if !create_new && path.exists() {
        read_all_sheets(path)?
    } else {
        Vec::new()
    };

    let mut workbook = Workbook::new();
    let date_format = Format::new().set_num_format(DATETIME_FORMAT);
    let mut written = false;

    for (name, range) in &existing {
        let worksheet = workbook.add_worksheet();
        worksheet.set_name(name)?;
        if name == sheet {
            write_series(worksheet, series, &date_format)?;
            written = true;
        } else {
            copy_range(worksheet, range, &date_format)?;
        }
    }
    if !written {
        let worksheet = workbook.add_worksheet();
        worksheet.set_name(sheet)?;
        write_series(worksheet, series, &date_format)?;
    }

    workbook.save(path)?;
    debug!(
        path = %path.display(),
        sheet,
        rows = series.len(),
        kept_sheets = existing.len(),
        "wrote workbook"
    );
    Ok(())
}

fn read_all_sheets(path: &Path) -> Result<Vec<(String, Range<Data>)>, DataError> {
    let mut workbook = open_workbook_auto(path)?;
    let mut sheets = Vec::new();
    for name in workbook.sheet_names() {
        let range = workbook.worksheet_range(&name)?;
        sheets.push((name, range));
    }
    Ok(sheets)
}

/// Aware indexes are written as wall-clock time in their own zone.
fn write_series(
    worksheet: &mut Worksheet,
    series: &TimeSeries,
    date_format: &Format,
) -> Result<(), DataError> {
    worksheet.write_string(0, 0, series.index_name())?;
    for (c, col) in series.columns().iter().enumerate() {
        worksheet.write_string(0, sheet_col(c + 1)?, col.name())?;
    }

    for row in 0..series.len() {
        let r = sheet_row(row + 1)?;
        if let Some(t) = series.local_timestamp(row) {
            worksheet.write_datetime_with_format(r, 0, &t, date_format)?;
        }
        for (c, col) in series.columns().iter().enumerate() {
            let c = sheet_col(c + 1)?;
            match col.values() {
                ColumnValues::F64(_) | ColumnValues::F32(_) => {
                    if let Some(x) = col.values().get_f64(row) {
                        worksheet.write_number(r, c, x)?;
                    }
                }
                ColumnValues::Text(v) => {
                    if let Some(s) = &v[row] {
                        worksheet.write_string(r, c, s)?;
                    }
                }
            }
        }
    }
    Ok(())
}

fn copy_range(
    worksheet: &mut Worksheet,
    range: &Range<Data>,
    date_format: &Format,
) -> Result<(), DataError> {
    let (row0, col0) = range.start().unwrap_or((0, 0));
    for (r, c, cell) in range.used_cells() {
        let r = row0 + sheet_row(r)?;
        let c = u16::try_from(col0 as usize + c)
            .map_err(|_| DataError::InvalidSeries(format!("sheet column {c} out of range")))?;
        match cell {
            Data::Empty | Data::Error(_) => {}
            Data::String(s) | Data::DurationIso(s) => {
                worksheet.write_string(r, c, s)?;
            }
            Data::Float(x) => {
                worksheet.write_number(r, c, *x)?;
            }
            Data::Int(i) => {
                worksheet.write_number(r, c, *i as f64)?;
            }
            Data::Bool(b) => {
                worksheet.write_boolean(r, c, *b)?;
            }
            Data::DateTime(_) | Data::DateTimeIso(_) => match cell.as_datetime() {
                Some(t) => {
                    worksheet.write_datetime_with_format(r, c, &t, date_format)?;
                }
                None => {
                    worksheet.write_string(r, c, cell.to_string())?;
                }
            },
        }
    }
    Ok(())
}

fn sheet_row(row: usize) -> Result<u32, DataError> {
    u32::try_from(row).map_err(|_| DataError::InvalidSeries(format!("sheet row {row} out of range")))
}

fn sheet_col(col: usize) -> Result<u16, DataError> {
    u16::try_from(col)
        .map_err(|_| DataError::InvalidSeries(format!("sheet column {col} out of range")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::series::Column;
    use chrono::NaiveDate;

    fn daily() -> TimeSeries {
        let day = |d| {
            NaiveDate::from_ymd_opt(2022, 3, d)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap()
        };
        TimeSeries::new(
            vec![day(1), day(2), day(3)],
            vec![
                Column::f64("EURUSD.close", vec![Some(1.1), None, Some(1.125)]),
                Column::text("note", vec![Some("roll".into()), None, None]),
            ],
        )
        .unwrap()
    }

    #[test]
    fn write_then_read_sheet() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fx.xlsx");
        let series = daily();

        write_excel(&path, "prices", &series, true).unwrap();
        let back = read_excel(&path, "prices", &ReadOptions::daily()).unwrap();

        assert_eq!(back.index(), series.index());
        assert_eq!(back.column_names(), vec!["EURUSD.close", "note"]);
        assert_eq!(
            back.column("EURUSD.close").unwrap().values(),
            series.column("EURUSD.close").unwrap().values()
        );
    }

    #[test]
    fn other_sheets_survive_and_same_name_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fx.xlsx");
        let series = daily();

        write_excel(&path, "first", &series, true).unwrap();
        write_excel(&path, "second", &series, false).unwrap();
        let shorter = series.take_rows(&[0]);
        write_excel(&path, "first", &shorter, false).unwrap();

        let workbook = open_workbook_auto(&path).unwrap();
        assert_eq!(workbook.sheet_names(), vec!["first", "second"]);

        let first = read_excel(&path, "first", &ReadOptions::daily()).unwrap();
        let second = read_excel(&path, "second", &ReadOptions::daily()).unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(second.len(), 3);
    }

    #[test]
    fn create_new_drops_other_sheets() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fx.xlsx");
        write_excel(&path, "a", &daily(), true).unwrap();
        write_excel(&path, "b", &daily(), true).unwrap();

        let workbook = open_workbook_auto(&path).unwrap();
        assert_eq!(workbook.sheet_names(), vec!["b"]);
    }

    #[test]
    fn missing_sheet_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fx.xlsx");
        write_excel(&path, "a", &daily(), true).unwrap();
        assert!(read_excel(&path, "zzz", &ReadOptions::daily()).is_err());
    }
}
