//! CSV and Excel readers and writers.
//!
//! Both readers load the file into a `RawTable` of loosely typed cells and
//! share one conversion into a `TimeSeries`, so intraday/daily handling,
//! suffixing, localization and cutoff filtering behave the same for both.

pub mod csv;
pub mod excel;

use crate::dateparse::{self, DateParser};
use crate::error::DataError;
use crate::series::{Column, ColumnValues, Frequency, TimeSeries, DEFAULT_INDEX_NAME};
use chrono::{Duration, NaiveDate, NaiveDateTime};
use chrono_tz::Tz;

pub use self::csv::{read_csv, write_csv};
pub use self::excel::{read_excel, write_excel};

/// Column suffix applied to intraday value columns by default.
pub const DEFAULT_POSTFIX: &str = ".close";

/// Header names accepted for the daily index column, in order of preference.
const DAILY_INDEX_NAMES: [&str; 2] = ["DATE", "Date"];

/// Cell strings read as null.
const NA_VALUES: [&str; 7] = ["", "NA", "N/A", "NaN", "nan", "null", "#N/A"];

/// Rows at or after the cutoff are dropped.
#[derive(Debug, Clone, PartialEq)]
pub enum Cutoff {
    At(NaiveDateTime),
    /// Parsed with [`dateparse::parse_flexible`] when the read runs.
    Text(String),
}

impl Cutoff {
    pub fn resolve(&self) -> Result<NaiveDateTime, DataError> {
        match self {
            Cutoff::At(t) => Ok(*t),
            Cutoff::Text(s) => dateparse::parse_flexible(s),
        }
    }
}

impl From<NaiveDateTime> for Cutoff {
    fn from(t: NaiveDateTime) -> Self {
        Cutoff::At(t)
    }
}

impl From<NaiveDate> for Cutoff {
    fn from(d: NaiveDate) -> Self {
        Cutoff::At(d.and_time(chrono::NaiveTime::MIN))
    }
}

impl From<&str> for Cutoff {
    fn from(s: &str) -> Self {
        Cutoff::Text(s.to_string())
    }
}

impl From<String> for Cutoff {
    fn from(s: String) -> Self {
        Cutoff::Text(s)
    }
}

/// Options for [`read_csv`] and [`read_excel`].
#[derive(Debug, Clone, PartialEq)]
pub struct ReadOptions {
    pub freq: Frequency,
    pub cutoff: Option<Cutoff>,
    /// Intraday: `None` means [`DateParser::Default`]. Daily: `None` means
    /// flexible parsing.
    pub date_parser: Option<DateParser>,
    /// Appended to every intraday column name.
    pub postfix: String,
    /// Zone the intraday wall-clock timestamps are in.
    pub intraday_tz: Tz,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            freq: Frequency::Daily,
            cutoff: None,
            date_parser: None,
            postfix: DEFAULT_POSTFIX.to_string(),
            intraday_tz: Tz::UTC,
        }
    }
}

impl ReadOptions {
    pub fn daily() -> Self {
        Self::default()
    }

    pub fn intraday() -> Self {
        Self {
            freq: Frequency::Intraday,
            ..Self::default()
        }
    }

    pub fn with_cutoff(mut self, cutoff: impl Into<Cutoff>) -> Self {
        self.cutoff = Some(cutoff.into());
        self
    }

    pub fn with_date_parser(mut self, parser: DateParser) -> Self {
        self.date_parser = Some(parser);
        self
    }

    pub fn with_postfix(mut self, postfix: impl Into<String>) -> Self {
        self.postfix = postfix.into();
        self
    }

    pub fn with_timezone(mut self, tz: Tz) -> Self {
        self.intraday_tz = tz;
        self
    }
}

/// A loosely typed cell as it came out of the file.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum RawCell {
    Empty,
    Text(String),
    Number(f64),
    DateTime(NaiveDateTime),
}

/// Where the index lives in a raw table.
#[derive(Debug, Clone, Copy)]
pub(crate) enum IndexColumn {
    First,
    /// Daily CSV: `DATE`, falling back to `Date`.
    DailyHeader,
}

/// A header row plus data rows, before typing.
#[derive(Debug, Default)]
pub(crate) struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<RawCell>>,
}

impl RawTable {
    fn cell(&self, row: usize, col: usize) -> &RawCell {
        self.rows[row].get(col).unwrap_or(&RawCell::Empty)
    }

    fn index_position(&self, which: IndexColumn) -> Result<usize, DataError> {
        match which {
            IndexColumn::First if !self.headers.is_empty() => Ok(0),
            IndexColumn::First => Err(DataError::MissingColumn {
                column: "index".to_string(),
            }),
            IndexColumn::DailyHeader => DAILY_INDEX_NAMES
                .iter()
                .find_map(|name| self.headers.iter().position(|h| h == name))
                .ok_or_else(|| DataError::MissingColumn {
                    column: DAILY_INDEX_NAMES.join("' or '"),
                }),
        }
    }

    /// Type the table according to `opts`.
    pub fn into_series(
        self,
        index_column: IndexColumn,
        opts: &ReadOptions,
    ) -> Result<TimeSeries, DataError> {
        let index_pos = self.index_position(index_column)?;

        let parser = match opts.freq {
            Frequency::Intraday => Some(opts.date_parser.unwrap_or_default()),
            Frequency::Daily => opts.date_parser,
        };
        let index = (0..self.rows.len())
            .map(|row| parse_index_cell(self.cell(row, index_pos), parser))
            .collect::<Result<Vec<_>, _>>()?;

        let mut columns = Vec::with_capacity(self.headers.len().saturating_sub(1));
        for (pos, header) in self.headers.iter().enumerate() {
            if pos == index_pos {
                continue;
            }
            let cells: Vec<&RawCell> = (0..self.rows.len()).map(|r| self.cell(r, pos)).collect();
            let values = match opts.freq {
                Frequency::Intraday => ColumnValues::F32(
                    cells
                        .iter()
                        .map(|c| parse_number(header, c).map(|v| v.map(|x| x as f32)))
                        .collect::<Result<_, _>>()?,
                ),
                Frequency::Daily => infer_daily_values(header, &cells),
            };
            columns.push(Column::new(header.clone(), values));
        }

        let mut series = TimeSeries::new(index, columns)?;
        series = match opts.freq {
            Frequency::Intraday => {
                series.add_suffix(&opts.postfix);
                series
                    .with_index_name(DEFAULT_INDEX_NAME)
                    .localize(opts.intraday_tz)?
            }
            Frequency::Daily => series.with_index_name(self.headers[index_pos].clone()),
        };

        match &opts.cutoff {
            Some(cutoff) => {
                let at = series.to_index_space(cutoff.resolve()?)?;
                Ok(series.retain_before(at))
            }
            None => Ok(series),
        }
    }
}

fn parse_index_cell(
    cell: &RawCell,
    parser: Option<DateParser>,
) -> Result<NaiveDateTime, DataError> {
    match cell {
        RawCell::DateTime(t) => Ok(*t),
        RawCell::Text(s) => match parser {
            Some(p) => p.parse(s),
            None => dateparse::parse_flexible(s),
        },
        RawCell::Number(serial) => excel_serial_to_datetime(*serial),
        RawCell::Empty => Err(DataError::DateParse {
            value: String::new(),
            parser: "index",
        }),
    }
}

/// Spreadsheet serial day number (1900 system) to a timestamp.
fn excel_serial_to_datetime(serial: f64) -> Result<NaiveDateTime, DataError> {
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30).and_then(|d| d.and_hms_opt(0, 0, 0));
    let millis = (serial * 86_400_000.0).round();
    match epoch {
        Some(epoch) if millis.is_finite() => epoch
            .checked_add_signed(Duration::milliseconds(millis as i64))
            .ok_or_else(|| DataError::DateParse {
                value: serial.to_string(),
                parser: "spreadsheet serial",
            }),
        _ => Err(DataError::DateParse {
            value: serial.to_string(),
            parser: "spreadsheet serial",
        }),
    }
}

fn is_na(s: &str) -> bool {
    NA_VALUES.contains(&s.trim())
}

fn parse_number(column: &str, cell: &RawCell) -> Result<Option<f64>, DataError> {
    match cell {
        RawCell::Empty => Ok(None),
        RawCell::Number(x) if x.is_nan() => Ok(None),
        RawCell::Number(x) => Ok(Some(*x)),
        RawCell::Text(s) if is_na(s) => Ok(None),
        RawCell::Text(s) => {
            s.trim()
                .parse::<f64>()
                .map(|x| (!x.is_nan()).then_some(x))
                .map_err(|_| DataError::ValueParse {
                    column: column.to_string(),
                    value: s.clone(),
                })
        }
        RawCell::DateTime(t) => Err(DataError::ValueParse {
            column: column.to_string(),
            value: t.to_string(),
        }),
    }
}

/// Daily columns are `f64` when every cell is numeric or null, text otherwise.
fn infer_daily_values(column: &str, cells: &[&RawCell]) -> ColumnValues {
    let numeric: Result<Vec<Option<f64>>, _> =
        cells.iter().map(|c| parse_number(column, c)).collect();
    match numeric {
        Ok(values) => ColumnValues::F64(values),
        Err(_) => ColumnValues::Text(
            cells
                .iter()
                .map(|c| match c {
                    RawCell::Empty => None,
                    RawCell::Text(s) if is_na(s) => None,
                    RawCell::Text(s) => Some(s.clone()),
                    RawCell::Number(x) => Some(x.to_string()),
                    RawCell::DateTime(t) => Some(t.to_string()),
                })
                .collect(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> RawCell {
        RawCell::Text(s.to_string())
    }

    fn intraday_table() -> RawTable {
        RawTable {
            headers: vec!["Time".into(), "EURUSD".into(), "GBPUSD".into()],
            rows: vec![
                vec![text("02/01/2020 00:00:00"), text("1.1"), text("1.3")],
                vec![text("02/01/2020 00:01:00"), text("NA"), text("1.31")],
                vec![text("02/01/2020 00:02:00"), text("1.12"), RawCell::Empty],
            ],
        }
    }

    #[test]
    fn intraday_narrows_suffixes_and_localizes() {
        let series = intraday_table()
            .into_series(IndexColumn::First, &ReadOptions::intraday())
            .unwrap();

        assert_eq!(series.column_names(), vec!["EURUSD.close", "GBPUSD.close"]);
        assert_eq!(series.index_name(), "Date");
        assert_eq!(series.timezone(), Some(Tz::UTC));
        assert_eq!(
            series.column("EURUSD.close").unwrap().values(),
            &ColumnValues::F32(vec![Some(1.1), None, Some(1.12)])
        );
    }

    #[test]
    fn intraday_rejects_text_values() {
        let mut table = intraday_table();
        table.rows[0][1] = text("bid");
        let err = table
            .into_series(IndexColumn::First, &ReadOptions::intraday())
            .unwrap_err();
        assert!(matches!(err, DataError::ValueParse { .. }));
    }

    #[test]
    fn intraday_localizes_to_requested_zone() {
        let tz: Tz = "America/New_York".parse().unwrap();
        let series = intraday_table()
            .into_series(IndexColumn::First, &ReadOptions::intraday().with_timezone(tz))
            .unwrap();
        assert_eq!(series.timezone(), Some(tz));
        assert_eq!(series.index()[0].format("%H:%M").to_string(), "05:00");
    }

    #[test]
    fn cutoff_drops_rows_at_or_after() {
        let series = intraday_table()
            .into_series(
                IndexColumn::First,
                &ReadOptions::intraday().with_cutoff("2020-01-02 00:01:00"),
            )
            .unwrap();
        assert_eq!(series.len(), 1);
    }

    #[test]
    fn daily_falls_back_to_date_header_and_infers_types() {
        let table = RawTable {
            headers: vec!["Date".into(), "close".into(), "source".into()],
            rows: vec![
                vec![text("2020-01-02"), text("1.5"), text("BBG")],
                vec![text("2020-01-03"), text(""), text("NA")],
            ],
        };
        let series = table
            .into_series(IndexColumn::DailyHeader, &ReadOptions::daily())
            .unwrap();

        assert_eq!(series.index_name(), "Date");
        assert_eq!(series.timezone(), None);
        assert_eq!(
            series.column("close").unwrap().values(),
            &ColumnValues::F64(vec![Some(1.5), None])
        );
        assert_eq!(
            series.column("source").unwrap().values(),
            &ColumnValues::Text(vec![Some("BBG".into()), None])
        );
    }

    #[test]
    fn daily_prefers_upper_case_header() {
        let table = RawTable {
            headers: vec!["x".into(), "DATE".into()],
            rows: vec![vec![text("1"), text("2020-01-02")]],
        };
        let series = table
            .into_series(IndexColumn::DailyHeader, &ReadOptions::daily())
            .unwrap();
        assert_eq!(series.index_name(), "DATE");
        assert_eq!(series.column_names(), vec!["x"]);
    }

    #[test]
    fn daily_without_date_header_fails() {
        let table = RawTable {
            headers: vec!["when".into(), "x".into()],
            rows: vec![],
        };
        assert!(matches!(
            table.into_series(IndexColumn::DailyHeader, &ReadOptions::daily()),
            Err(DataError::MissingColumn { .. })
        ));
    }

    #[test]
    fn spreadsheet_serials_convert() {
        let t = excel_serial_to_datetime(43_831.5).unwrap();
        assert_eq!(t.to_string(), "2020-01-01 12:00:00");
    }
}
