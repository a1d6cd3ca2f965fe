//! Timestamp parsing strategies for file readers.
//!
//! A strategy is picked once per read call and applied to every index cell.
//! The positional strategies read fixed character offsets and ignore the
//! delimiters, which keeps them fast on large intraday files.

use crate::error::DataError;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Date parsing strategy for the index column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateParser {
    /// Day first: `dd/mm/yyyy HH:MM:SS`.
    #[default]
    Default,
    /// Year first: `yyyy.mm.dd HH:MM:SS` (any delimiters).
    Dukascopy,
    /// ISO-8601, with or without offset. Offsets are normalized to UTC.
    #[serde(alias = "c")]
    Iso8601,
}

/// (start, end) byte offsets of year, month, day, hour, minute, second.
type Layout = [(usize, usize); 6];

const DAY_FIRST: Layout = [(6, 10), (3, 5), (0, 2), (11, 13), (14, 16), (17, 19)];
const YEAR_FIRST: Layout = [(0, 4), (5, 7), (8, 10), (11, 13), (14, 16), (17, 19)];

const ISO_DATETIME_FORMATS: [&str; 7] = [
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
    "%Y%m%dT%H%M%S",
];
const ISO_DATE_FORMATS: [&str; 2] = ["%Y-%m-%d", "%Y%m%d"];

/// Formats tried by [`parse_flexible`] after the ISO ones. Slash dates are
/// month-first, then day-first when that fails.
const FLEXIBLE_DATETIME_FORMATS: [&str; 8] = [
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%Y.%m.%d %H:%M:%S",
    "%d %b %Y %H:%M:%S",
    "%d-%b-%Y %H:%M:%S",
];
const FLEXIBLE_DATE_FORMATS: [&str; 8] = [
    "%m/%d/%Y", "%d/%m/%Y", "%Y/%m/%d", "%Y.%m.%d", "%d %b %Y", "%d-%b-%Y", "%b %d %Y",
    "%B %d %Y",
];

impl DateParser {
    pub fn name(&self) -> &'static str {
        match self {
            DateParser::Default => "default",
            DateParser::Dukascopy => "dukascopy",
            DateParser::Iso8601 => "iso8601",
        }
    }

    pub fn parse(&self, s: &str) -> Result<NaiveDateTime, DataError> {
        let s = s.trim();
        let parsed = match self {
            DateParser::Default => positional(s, &DAY_FIRST),
            DateParser::Dukascopy => positional(s, &YEAR_FIRST),
            DateParser::Iso8601 => iso8601(s),
        };
        parsed.ok_or_else(|| DataError::DateParse {
            value: s.to_string(),
            parser: self.name(),
        })
    }
}

impl FromStr for DateParser {
    type Err = DataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "default" => Ok(DateParser::Default),
            "dukascopy" => Ok(DateParser::Dukascopy),
            "c" | "iso8601" | "ciso8601" => Ok(DateParser::Iso8601),
            other => Err(DataError::DateParse {
                value: other.to_string(),
                parser: "strategy name",
            }),
        }
    }
}

/// Parse a timestamp without a declared layout: ISO forms first, then common
/// slash, dot and month-name layouts.
pub fn parse_flexible(s: &str) -> Result<NaiveDateTime, DataError> {
    let s = s.trim();
    iso8601(s)
        .or_else(|| {
            FLEXIBLE_DATETIME_FORMATS
                .iter()
                .find_map(|f| NaiveDateTime::parse_from_str(s, f).ok())
        })
        .or_else(|| {
            FLEXIBLE_DATE_FORMATS
                .iter()
                .find_map(|f| NaiveDate::parse_from_str(s, f).ok())
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
        .ok_or_else(|| DataError::DateParse {
            value: s.to_string(),
            parser: "flexible",
        })
}

/// Fixed-offset parse. A date-only string (10 chars) reads as midnight.
fn positional(s: &str, layout: &Layout) -> Option<NaiveDateTime> {
    let field = |i: usize| -> Option<u32> {
        let (a, b) = layout[i];
        s.get(a..b)?.parse().ok()
    };
    let date = NaiveDate::from_ymd_opt(field(0)? as i32, field(1)?, field(2)?)?;
    if s.len() <= 10 {
        return date.and_hms_opt(0, 0, 0);
    }
    date.and_hms_opt(field(3)?, field(4)?, field(5)?)
}

fn iso8601(s: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_utc());
    }
    ISO_DATETIME_FORMATS
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(s, f).ok())
        .or_else(|| {
            ISO_DATE_FORMATS
                .iter()
                .find_map(|f| NaiveDate::parse_from_str(s, f).ok())
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}
