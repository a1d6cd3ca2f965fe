//! Outer join of several series on their timestamp index.
//!
//! The joined index is the sorted union of every input index. Each input
//! contributes its columns unchanged, with nulls at timestamps it lacks.
//! Missing values are strict nulls, never forward-filled.

use super::{Column, TimeSeries};
use crate::error::DataError;
use chrono::NaiveDateTime;
use std::collections::{BTreeSet, HashMap};

/// Outer-join `frames` on their index.
///
/// All inputs must share the same timezone (or all be naive) and column
/// names must not collide. If an input repeats a timestamp, its first row at
/// that timestamp is used.
pub fn outer_join(frames: &[TimeSeries]) -> Result<TimeSeries, DataError> {
    let Some(first) = frames.first() else {
        return Ok(TimeSeries::empty());
    };

    if let Some(other) = frames.iter().find(|f| f.timezone() != first.timezone()) {
        return Err(DataError::SchemaMismatch(format!(
            "cannot join series in {:?} with series in {:?}",
            first.timezone(),
            other.timezone()
        )));
    }

    let index: Vec<NaiveDateTime> = frames
        .iter()
        .flat_map(|f| f.index().iter().copied())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let mut columns: Vec<Column> = Vec::new();
    for frame in frames {
        let mut position: HashMap<NaiveDateTime, usize> = HashMap::with_capacity(frame.len());
        for (row, t) in frame.index().iter().enumerate() {
            position.entry(*t).or_insert(row);
        }
        let rows: Vec<Option<usize>> = index.iter().map(|t| position.get(t).copied()).collect();

        for col in frame.columns() {
            columns.push(Column::new(col.name(), col.values().take_opt(&rows)));
        }
    }

    let mut joined = TimeSeries::new(index, columns)?.with_index_name(first.index_name());
    joined.set_timezone(first.timezone());
    Ok(joined)
}
