//! The uniform in-memory tabular time series.
//!
//! A `TimeSeries` is a timestamp index plus named, equally long columns.
//! Timezone-aware series keep their instants as UTC wall-clock values and
//! carry the zone alongside, so comparisons across series never need
//! conversion.

pub(crate) mod frame;
pub mod join;

use crate::error::DataError;
use chrono::{NaiveDateTime, TimeZone};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::str::FromStr;

pub use join::outer_join;

/// Name given to the index when a reader does not supply one.
pub const DEFAULT_INDEX_NAME: &str = "Date";

/// Sampling frequency of a source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Frequency {
    Intraday,
    #[default]
    Daily,
}

impl FromStr for Frequency {
    type Err = std::convert::Infallible;

    /// Anything other than `intraday` is treated as daily data.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(if s.eq_ignore_ascii_case("intraday") {
            Frequency::Intraday
        } else {
            Frequency::Daily
        })
    }
}

/// True when a logical series name marks intraday data.
pub fn is_intraday_name(name: &str) -> bool {
    name.contains("intraday")
}

/// Parse an IANA zone name such as `Europe/London` or `UTC`.
pub fn parse_timezone(name: &str) -> Result<Tz, DataError> {
    name.parse::<Tz>()
        .map_err(|_| DataError::Timezone(format!("unknown zone '{name}'")))
}

/// Inclusive date range for bounded reads. Open ends are `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DateRange {
    pub start: Option<NaiveDateTime>,
    pub finish: Option<NaiveDateTime>,
}

impl DateRange {
    pub fn new(start: Option<NaiveDateTime>, finish: Option<NaiveDateTime>) -> Self {
        Self { start, finish }
    }

    pub fn contains(&self, t: NaiveDateTime) -> bool {
        self.start.map_or(true, |s| t >= s) && self.finish.map_or(true, |f| t <= f)
    }
}

/// Cell storage for one column.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValues {
    F64(Vec<Option<f64>>),
    /// Reduced precision, used for intraday data.
    F32(Vec<Option<f32>>),
    Text(Vec<Option<String>>),
}

macro_rules! map_values {
    ($values:expr, $v:ident => $body:expr) => {
        match $values {
            ColumnValues::F64($v) => ColumnValues::F64($body),
            ColumnValues::F32($v) => ColumnValues::F32($body),
            ColumnValues::Text($v) => ColumnValues::Text($body),
        }
    };
}

impl ColumnValues {
    pub fn len(&self) -> usize {
        match self {
            ColumnValues::F64(v) => v.len(),
            ColumnValues::F32(v) => v.len(),
            ColumnValues::Text(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dtype_name(&self) -> &'static str {
        match self {
            ColumnValues::F64(_) => "f64",
            ColumnValues::F32(_) => "f32",
            ColumnValues::Text(_) => "text",
        }
    }

    /// Numeric view of a cell. Text cells read as `None`.
    pub fn get_f64(&self, row: usize) -> Option<f64> {
        match self {
            ColumnValues::F64(v) => v.get(row).copied().flatten(),
            ColumnValues::F32(v) => v.get(row).copied().flatten().map(f64::from),
            ColumnValues::Text(_) => None,
        }
    }

    pub fn is_null(&self, row: usize) -> bool {
        match self {
            ColumnValues::F64(v) => v.get(row).map_or(true, Option::is_none),
            ColumnValues::F32(v) => v.get(row).map_or(true, Option::is_none),
            ColumnValues::Text(v) => v.get(row).map_or(true, Option::is_none),
        }
    }

    /// Narrow numeric storage to `f32`. Text is left alone.
    pub fn to_f32(&self) -> ColumnValues {
        match self {
            ColumnValues::F64(v) => ColumnValues::F32(v.iter().map(|x| x.map(|x| x as f32)).collect()),
            other => other.clone(),
        }
    }

    /// Render a cell for text output. Nulls render as the empty string.
    pub fn format_cell(&self, row: usize) -> String {
        match self {
            ColumnValues::F64(v) => v.get(row).copied().flatten().map(|x| x.to_string()),
            ColumnValues::F32(v) => v.get(row).copied().flatten().map(|x| x.to_string()),
            ColumnValues::Text(v) => v.get(row).cloned().flatten(),
        }
        .unwrap_or_default()
    }

    pub(crate) fn take(&self, rows: &[usize]) -> ColumnValues {
        map_values!(self, v => rows.iter().map(|&i| v[i].clone()).collect())
    }

    pub(crate) fn take_opt(&self, rows: &[Option<usize>]) -> ColumnValues {
        map_values!(self, v => rows.iter().map(|r| r.and_then(|i| v[i].clone())).collect())
    }

    pub(crate) fn truncate(&mut self, len: usize) {
        match self {
            ColumnValues::F64(v) => v.truncate(len),
            ColumnValues::F32(v) => v.truncate(len),
            ColumnValues::Text(v) => v.truncate(len),
        }
    }

    pub(crate) fn extend_from(&mut self, other: &ColumnValues) -> Result<(), DataError> {
        match (self, other) {
            (ColumnValues::F64(a), ColumnValues::F64(b)) => a.extend_from_slice(b),
            (ColumnValues::F32(a), ColumnValues::F32(b)) => a.extend_from_slice(b),
            (ColumnValues::Text(a), ColumnValues::Text(b)) => a.extend_from_slice(b),
            (a, b) => {
                return Err(DataError::SchemaMismatch(format!(
                    "cannot extend {} column with {} values",
                    a.dtype_name(),
                    b.dtype_name()
                )))
            }
        }
        Ok(())
    }
}

/// A named column.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    name: String,
    values: ColumnValues,
}

impl Column {
    pub fn new(name: impl Into<String>, values: ColumnValues) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }

    pub fn f64(name: impl Into<String>, values: Vec<Option<f64>>) -> Self {
        Self::new(name, ColumnValues::F64(values))
    }

    pub fn f32(name: impl Into<String>, values: Vec<Option<f32>>) -> Self {
        Self::new(name, ColumnValues::F32(values))
    }

    pub fn text(name: impl Into<String>, values: Vec<Option<String>>) -> Self {
        Self::new(name, ColumnValues::Text(values))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn values(&self) -> &ColumnValues {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn rename(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }
}

/// Ordered-by-time table keyed by a timestamp index.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeSeries {
    index_name: String,
    index: Vec<NaiveDateTime>,
    tz: Option<Tz>,
    columns: Vec<Column>,
}

impl TimeSeries {
    /// Build a naive series. Every column must match the index length and
    /// column names must be unique.
    pub fn new(index: Vec<NaiveDateTime>, columns: Vec<Column>) -> Result<Self, DataError> {
        let mut seen = HashSet::new();
        for col in &columns {
            if col.len() != index.len() {
                return Err(DataError::InvalidSeries(format!(
                    "column '{}' has {} rows, index has {}",
                    col.name(),
                    col.len(),
                    index.len()
                )));
            }
            if !seen.insert(col.name()) {
                return Err(DataError::InvalidSeries(format!(
                    "duplicate column name '{}'",
                    col.name()
                )));
            }
        }
        Ok(Self {
            index_name: DEFAULT_INDEX_NAME.to_string(),
            index,
            tz: None,
            columns,
        })
    }

    pub fn empty() -> Self {
        Self {
            index_name: DEFAULT_INDEX_NAME.to_string(),
            index: Vec::new(),
            tz: None,
            columns: Vec::new(),
        }
    }

    pub fn with_index_name(mut self, name: impl Into<String>) -> Self {
        self.index_name = name.into();
        self
    }

    pub fn index_name(&self) -> &str {
        &self.index_name
    }

    /// Index values. For an aware series these are UTC instants.
    pub fn index(&self) -> &[NaiveDateTime] {
        &self.index
    }

    pub fn timezone(&self) -> Option<Tz> {
        self.tz
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name() == name)
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(Column::name).collect()
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn width(&self) -> usize {
        self.columns.len()
    }

    pub fn first_timestamp(&self) -> Option<NaiveDateTime> {
        self.index.first().copied()
    }

    pub fn last_timestamp(&self) -> Option<NaiveDateTime> {
        self.index.last().copied()
    }

    /// Attach a zone to instants that are already UTC (storage round-trips).
    pub(crate) fn set_timezone(&mut self, tz: Option<Tz>) {
        self.tz = tz;
    }

    /// Interpret the naive index as wall-clock time in `tz`.
    ///
    /// Fails on an already aware series and on wall-clock times that are
    /// ambiguous or skipped by a DST transition in `tz`.
    pub fn localize(mut self, tz: Tz) -> Result<Self, DataError> {
        if let Some(existing) = self.tz {
            return Err(DataError::Timezone(format!(
                "series is already localized to {existing}"
            )));
        }
        for t in self.index.iter_mut() {
            let local = tz.from_local_datetime(t).single().ok_or_else(|| {
                DataError::Timezone(format!("{t} is ambiguous or nonexistent in {tz}"))
            })?;
            *t = local.naive_utc();
        }
        self.tz = Some(tz);
        Ok(self)
    }

    /// Wall-clock value of row `i` in the series' own zone.
    pub fn local_timestamp(&self, i: usize) -> Option<NaiveDateTime> {
        let t = *self.index.get(i)?;
        Some(match self.tz {
            Some(tz) => tz.from_utc_datetime(&t).naive_local(),
            None => t,
        })
    }

    /// Row `i` formatted as ISO text, with the UTC offset for aware series.
    pub fn format_timestamp(&self, i: usize) -> Option<String> {
        let t = *self.index.get(i)?;
        Some(match self.tz {
            Some(tz) => tz
                .from_utc_datetime(&t)
                .format("%Y-%m-%d %H:%M:%S%:z")
                .to_string(),
            None => t.format("%Y-%m-%d %H:%M:%S").to_string(),
        })
    }

    /// Convert a wall-clock time in the series' zone to index space.
    pub fn to_index_space(&self, t: NaiveDateTime) -> Result<NaiveDateTime, DataError> {
        match self.tz {
            Some(tz) => tz
                .from_local_datetime(&t)
                .earliest()
                .map(|d| d.naive_utc())
                .ok_or_else(|| DataError::Timezone(format!("{t} does not exist in {tz}"))),
            None => Ok(t),
        }
    }

    /// Narrow every numeric column to `f32`.
    pub fn to_f32(mut self) -> Self {
        for col in self.columns.iter_mut() {
            col.values = col.values.to_f32();
        }
        self
    }

    /// Append `suffix` to every column name.
    pub fn add_suffix(&mut self, suffix: &str) {
        for col in self.columns.iter_mut() {
            col.name.push_str(suffix);
        }
    }

    pub fn rename_columns(&mut self, mut f: impl FnMut(&str) -> String) {
        for col in self.columns.iter_mut() {
            col.name = f(&col.name);
        }
    }

    /// Keep only the named columns, in the order given.
    pub fn select(&self, names: &[&str]) -> Result<Self, DataError> {
        let columns = names
            .iter()
            .map(|n| {
                self.column(n).cloned().ok_or_else(|| DataError::MissingColumn {
                    column: n.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            columns,
            ..self.without_columns()
        })
    }

    /// Drop every column whose name contains `pattern`.
    pub fn drop_matching(mut self, pattern: &str) -> Self {
        self.columns.retain(|c| !c.name().contains(pattern));
        self
    }

    /// Append a column. Its length must match the index.
    pub fn push_column(&mut self, column: Column) -> Result<(), DataError> {
        if column.len() != self.len() {
            return Err(DataError::InvalidSeries(format!(
                "column '{}' has {} rows, index has {}",
                column.name(),
                column.len(),
                self.len()
            )));
        }
        if self.column(column.name()).is_some() {
            return Err(DataError::InvalidSeries(format!(
                "duplicate column name '{}'",
                column.name()
            )));
        }
        self.columns.push(column);
        Ok(())
    }

    /// Keep rows strictly before `cutoff`, given in index space.
    pub fn retain_before(&self, cutoff: NaiveDateTime) -> Self {
        let rows: Vec<usize> = (0..self.len()).filter(|&i| self.index[i] < cutoff).collect();
        self.take_rows(&rows)
    }

    /// Keep rows inside an inclusive range, given in index space.
    pub fn retain_range(&self, range: &DateRange) -> Self {
        let rows: Vec<usize> = (0..self.len())
            .filter(|&i| range.contains(self.index[i]))
            .collect();
        self.take_rows(&rows)
    }

    /// Stable sort by timestamp.
    pub fn sort_by_index(&mut self) {
        if self.is_sorted() {
            return;
        }
        let mut order: Vec<usize> = (0..self.len()).collect();
        order.sort_by_key(|&i| self.index[i]);
        *self = self.take_rows(&order);
    }

    pub fn is_sorted(&self) -> bool {
        self.index.windows(2).all(|w| w[0] <= w[1])
    }

    /// First repeated timestamp of a sorted index, if any.
    pub fn first_duplicate(&self) -> Option<NaiveDateTime> {
        self.index
            .windows(2)
            .find(|w| w[0] == w[1])
            .map(|w| w[0])
    }

    /// Drop every row from `len` onward.
    pub fn truncate(&mut self, len: usize) {
        self.index.truncate(len);
        for col in self.columns.iter_mut() {
            col.values.truncate(len);
        }
    }

    /// Error unless `other` has the same zone and the same columns, in order,
    /// with the same storage types.
    pub fn check_schema(&self, other: &TimeSeries) -> Result<(), DataError> {
        if self.tz != other.tz {
            return Err(DataError::SchemaMismatch(format!(
                "timezone {:?} vs {:?}",
                self.tz, other.tz
            )));
        }
        if self.width() != other.width() {
            return Err(DataError::SchemaMismatch(format!(
                "{} columns vs {} columns",
                self.width(),
                other.width()
            )));
        }
        for (a, b) in self.columns.iter().zip(&other.columns) {
            if a.name() != b.name() || a.values.dtype_name() != b.values.dtype_name() {
                return Err(DataError::SchemaMismatch(format!(
                    "column '{}' ({}) vs '{}' ({})",
                    a.name(),
                    a.values.dtype_name(),
                    b.name(),
                    b.values.dtype_name()
                )));
            }
        }
        Ok(())
    }

    /// Append the rows of `other` below this series.
    pub fn vstack(&mut self, other: &TimeSeries) -> Result<(), DataError> {
        self.check_schema(other)?;
        self.index.extend_from_slice(&other.index);
        for (a, b) in self.columns.iter_mut().zip(&other.columns) {
            a.values.extend_from(&b.values)?;
        }
        Ok(())
    }

    pub fn take_rows(&self, rows: &[usize]) -> Self {
        Self {
            index_name: self.index_name.clone(),
            index: rows.iter().map(|&i| self.index[i]).collect(),
            tz: self.tz,
            columns: self
                .columns
                .iter()
                .map(|c| Column::new(c.name(), c.values.take(rows)))
                .collect(),
        }
    }

    /// BLAKE3 over index, zone, column names and cell values.
    pub fn content_hash(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.index_name.as_bytes());
        if let Some(tz) = self.tz {
            hasher.update(tz.name().as_bytes());
        }
        for t in &self.index {
            hasher.update(&t.and_utc().timestamp_micros().to_le_bytes());
        }
        for col in &self.columns {
            hasher.update(col.name().as_bytes());
            hasher.update(col.values.dtype_name().as_bytes());
            for row in 0..col.len() {
                hasher.update(col.values.format_cell(row).as_bytes());
                hasher.update(&[u8::from(col.values.is_null(row))]);
            }
        }
        hasher.finalize().to_hex().to_string()
    }

    fn without_columns(&self) -> Self {
        Self {
            index_name: self.index_name.clone(),
            index: self.index.clone(),
            tz: self.tz,
            columns: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn ts(day: u32, hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, day)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    fn sample() -> TimeSeries {
        TimeSeries::new(
            vec![ts(2, 0), ts(3, 0), ts(4, 0)],
            vec![
                Column::f64("EURUSD.close", vec![Some(1.1), None, Some(1.3)]),
                Column::text("note", vec![Some("a".into()), Some("b".into()), None]),
            ],
        )
        .unwrap()
    }

    #[test]
    fn new_rejects_length_mismatch() {
        let err = TimeSeries::new(vec![ts(2, 0)], vec![Column::f64("x", vec![])]);
        assert!(matches!(err, Err(DataError::InvalidSeries(_))));
    }

    #[test]
    fn new_rejects_duplicate_column_names() {
        let err = TimeSeries::new(
            vec![ts(2, 0)],
            vec![Column::f64("x", vec![None]), Column::f64("x", vec![None])],
        );
        assert!(matches!(err, Err(DataError::InvalidSeries(_))));
    }

    #[test]
    fn localize_converts_wall_clock_to_utc() {
        let tz: Tz = "Europe/London".parse().unwrap();
        let s = TimeSeries::new(vec![ts(2, 12)], vec![]).unwrap();
        let summer = TimeSeries::new(
            vec![NaiveDate::from_ymd_opt(2024, 7, 1)
                .unwrap()
                .and_hms_opt(12, 0, 0)
                .unwrap()],
            vec![],
        )
        .unwrap();

        let winter = s.localize(tz).unwrap();
        assert_eq!(winter.index()[0], ts(2, 12));
        assert_eq!(winter.timezone(), Some(tz));

        let summer = summer.localize(tz).unwrap();
        assert_eq!(summer.index()[0].format("%H").to_string(), "11");
        assert_eq!(summer.local_timestamp(0).unwrap().format("%H").to_string(), "12");
    }

    #[test]
    fn localize_twice_is_an_error() {
        let s = sample().localize(Tz::UTC).unwrap();
        assert!(matches!(s.localize(Tz::UTC), Err(DataError::Timezone(_))));
    }

    #[test]
    fn to_f32_leaves_text_alone() {
        let s = sample().to_f32();
        assert_eq!(s.columns()[0].values().dtype_name(), "f32");
        assert_eq!(s.columns()[1].values().dtype_name(), "text");
    }

    #[test]
    fn retain_before_is_strict() {
        let s = sample().retain_before(ts(3, 0));
        assert_eq!(s.len(), 1);
        assert_eq!(s.index()[0], ts(2, 0));
    }

    #[test]
    fn retain_range_is_inclusive() {
        let s = sample().retain_range(&DateRange::new(Some(ts(3, 0)), Some(ts(4, 0))));
        assert_eq!(s.index(), &[ts(3, 0), ts(4, 0)]);
    }

    #[test]
    fn sort_by_index_is_stable() {
        let s = TimeSeries::new(
            vec![ts(3, 0), ts(2, 0), ts(3, 0)],
            vec![Column::f64("v", vec![Some(1.0), Some(2.0), Some(3.0)])],
        )
        .unwrap();
        let mut sorted = s.clone();
        sorted.sort_by_index();
        assert_eq!(
            sorted.columns()[0].values(),
            &ColumnValues::F64(vec![Some(2.0), Some(1.0), Some(3.0)])
        );
        assert_eq!(sorted.first_duplicate(), Some(ts(3, 0)));
    }

    #[test]
    fn vstack_requires_matching_schema() {
        let mut a = sample();
        let b = sample().to_f32();
        assert!(matches!(a.vstack(&b), Err(DataError::SchemaMismatch(_))));

        let c = sample();
        a.vstack(&c).unwrap();
        assert_eq!(a.len(), 6);
    }

    #[test]
    fn select_and_drop_matching() {
        let s = sample();
        let only = s.select(&["note"]).unwrap();
        assert_eq!(only.column_names(), vec!["note"]);
        assert!(s.select(&["missing"]).is_err());

        let dropped = s.drop_matching(".close");
        assert_eq!(dropped.column_names(), vec!["note"]);
    }

    #[test]
    fn content_hash_tracks_values() {
        let a = sample();
        let mut b = sample();
        assert_eq!(a.content_hash(), b.content_hash());
        b.truncate(2);
        assert_ne!(a.content_hash(), b.content_hash());
    }

    #[test]
    fn frequency_tags() {
        assert_eq!("intraday".parse::<Frequency>().unwrap(), Frequency::Intraday);
        assert_eq!("daily".parse::<Frequency>().unwrap(), Frequency::Daily);
        assert_eq!("weekly".parse::<Frequency>().unwrap(), Frequency::Daily);
    }
}
