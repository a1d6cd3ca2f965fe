//! FX hourly volume reshaping.
//!
//! The market-data collaborator returns one row per day with 24 columns per
//! pair, `<pair>.0h` .. `<pair>.23h`. [`FxVolume::get_fx_volume`] turns that
//! into one row per hour with a single `<pair>.volume` column per pair,
//! indexed in UTC.

use crate::error::DataError;
use crate::series::{outer_join, Column, Frequency, TimeSeries, DEFAULT_INDEX_NAME};
use crate::store::{TimeSeriesStore, WriteOptions};
use chrono::{Duration, NaiveDate, NaiveDateTime, Timelike};
use chrono_tz::Tz;
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, info, Span};

pub const VOLUME_CATEGORY: &str = "fx-spot-volume";
pub const DEFAULT_CUT: &str = "LOC";
pub const DEFAULT_SOURCE: &str = "quandl";
pub const DEFAULT_CACHE_ALGO: &str = "internet_load_return";
pub const BACKTEST_ENVIRONMENT: &str = "backtest";

const HOURS_PER_DAY: u32 = 24;

/// A request to the market-data collaborator.
#[derive(Debug, Clone, PartialEq)]
pub struct MarketDataRequest {
    pub start_date: NaiveDate,
    pub finish_date: NaiveDate,
    pub data_source: String,
    pub category: String,
    pub freq: Frequency,
    pub cut: String,
    pub tickers: Vec<String>,
    pub fields: Vec<String>,
    pub cache_algo: String,
    pub environment: String,
}

/// Source of market data. Retrieval, caching and authentication are the
/// implementor's business.
pub trait MarketDataGenerator {
    fn fetch_market_data(&self, request: &MarketDataRequest) -> Result<TimeSeries, DataError>;
}

impl<T: MarketDataGenerator + ?Sized> MarketDataGenerator for &T {
    fn fetch_market_data(&self, request: &MarketDataRequest) -> Result<TimeSeries, DataError> {
        (**self).fetch_market_data(request)
    }
}

/// One or more currency pairs. A single pair converts to a one-element list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrencyPairs(Vec<String>);

impl CurrencyPairs {
    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn into_vec(self) -> Vec<String> {
        self.0
    }
}

impl From<&str> for CurrencyPairs {
    fn from(pair: &str) -> Self {
        Self(vec![pair.to_string()])
    }
}

impl From<String> for CurrencyPairs {
    fn from(pair: String) -> Self {
        Self(vec![pair])
    }
}

impl From<Vec<String>> for CurrencyPairs {
    fn from(pairs: Vec<String>) -> Self {
        Self(pairs)
    }
}

impl From<&[&str]> for CurrencyPairs {
    fn from(pairs: &[&str]) -> Self {
        Self(pairs.iter().map(|p| p.to_string()).collect())
    }
}

impl<const N: usize> From<[&str; N]> for CurrencyPairs {
    fn from(pairs: [&str; N]) -> Self {
        Self(pairs.iter().map(|p| p.to_string()).collect())
    }
}

/// Request knobs with their usual defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeOptions {
    pub cut: String,
    pub source: String,
    pub cache_algo: String,
}

impl Default for VolumeOptions {
    fn default() -> Self {
        Self {
            cut: DEFAULT_CUT.to_string(),
            source: DEFAULT_SOURCE.to_string(),
            cache_algo: DEFAULT_CACHE_ALGO.to_string(),
        }
    }
}

/// `0h` .. `23h`.
pub fn hourly_fields() -> Vec<String> {
    (0..HOURS_PER_DAY).map(|h| format!("{h}h")).collect()
}

fn hour_column(pair: &str, hour: u32) -> String {
    format!("{pair}.{hour}h")
}

fn volume_column(pair: &str) -> String {
    format!("{pair}.volume")
}

/// Daily-wide to hourly-long.
///
/// For every pair, column `<pair>.<h>h` becomes rows at `date + h hours`
/// under `<pair>.volume`. The 24 pieces are concatenated and stably sorted,
/// the pairs are outer-joined and the result is localized to UTC.
pub fn reshape_hourly(wide: &TimeSeries, pairs: &[String]) -> Result<TimeSeries, DataError> {
    if wide.is_empty() {
        let columns = pairs
            .iter()
            .map(|p| Column::f64(volume_column(p), Vec::new()))
            .collect();
        return TimeSeries::new(Vec::new(), columns)?.localize(Tz::UTC);
    }

    let mut per_pair = Vec::with_capacity(pairs.len());
    for pair in pairs {
        let mut long: Option<TimeSeries> = None;
        for hour in 0..HOURS_PER_DAY {
            let name = hour_column(pair, hour);
            let column = wide
                .column(&name)
                .ok_or(DataError::MissingColumn { column: name })?;
            let shift = Duration::hours(i64::from(hour));
            let piece = TimeSeries::new(
                wide.index().iter().map(|t| *t + shift).collect(),
                vec![Column::new(volume_column(pair), column.values().clone())],
            )?;
            match long.as_mut() {
                Some(long) => long.vstack(&piece)?,
                None => long = Some(piece),
            }
        }
        if let Some(mut long) = long {
            long.sort_by_index();
            per_pair.push(long);
        }
    }

    outer_join(&per_pair)?
        .with_index_name(DEFAULT_INDEX_NAME)
        .localize(Tz::UTC)
}

/// Hourly-long back to daily-wide, the inverse of [`reshape_hourly`].
///
/// The date index is every calendar day present in `hourly` (in its own
/// zone); columns come out pair by pair, `<pair>.0h` .. `<pair>.23h`. Hours
/// with no row read as null.
pub fn daily_from_hourly(hourly: &TimeSeries, pairs: &[String]) -> Result<TimeSeries, DataError> {
    let mut position: HashMap<(NaiveDate, u32), usize> = HashMap::with_capacity(hourly.len());
    let mut dates = BTreeSet::new();
    for row in 0..hourly.len() {
        if let Some(t) = hourly.local_timestamp(row) {
            dates.insert(t.date());
            position.entry((t.date(), t.hour())).or_insert(row);
        }
    }
    let dates: Vec<NaiveDate> = dates.into_iter().collect();

    let mut columns = Vec::with_capacity(pairs.len() * HOURS_PER_DAY as usize);
    for pair in pairs {
        let name = volume_column(pair);
        let volume = hourly
            .column(&name)
            .ok_or(DataError::MissingColumn { column: name })?;
        for hour in 0..HOURS_PER_DAY {
            let rows: Vec<Option<usize>> = dates
                .iter()
                .map(|d| position.get(&(*d, hour)).copied())
                .collect();
            columns.push(Column::new(
                hour_column(pair, hour),
                volume.values().take_opt(&rows),
            ));
        }
    }

    let index: Vec<NaiveDateTime> = dates
        .iter()
        .map(|d| d.and_time(chrono::NaiveTime::MIN))
        .collect();
    Ok(TimeSeries::new(index, columns)?.with_index_name(DEFAULT_INDEX_NAME))
}

/// Hourly FX volume over a market-data collaborator.
pub struct FxVolume<G> {
    generator: G,
    span: Span,
}

impl<G: MarketDataGenerator> FxVolume<G> {
    pub fn new(generator: G) -> Self {
        Self {
            generator,
            span: Span::none(),
        }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// The request sent for a date range and set of pairs.
    pub fn request(
        start: NaiveDate,
        end: NaiveDate,
        pairs: &CurrencyPairs,
        opts: &VolumeOptions,
    ) -> MarketDataRequest {
        MarketDataRequest {
            start_date: start,
            finish_date: end,
            data_source: opts.source.clone(),
            category: VOLUME_CATEGORY.to_string(),
            freq: Frequency::Daily,
            cut: opts.cut.clone(),
            tickers: pairs.as_slice().to_vec(),
            fields: hourly_fields(),
            cache_algo: opts.cache_algo.clone(),
            environment: BACKTEST_ENVIRONMENT.to_string(),
        }
    }

    /// Hourly UTC volume with one `<pair>.volume` column per pair.
    pub fn get_fx_volume(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        pairs: impl Into<CurrencyPairs>,
        opts: &VolumeOptions,
    ) -> Result<TimeSeries, DataError> {
        let _guard = self.span.enter();
        let pairs = pairs.into();
        let request = Self::request(start, end, &pairs, opts);
        info!(
            %start,
            %end,
            pairs = ?pairs.as_slice(),
            source = %request.data_source,
            cut = %request.cut,
            "fetching hourly FX volume"
        );

        let wide = self.generator.fetch_market_data(&request)?;
        debug!(rows = wide.len(), columns = wide.width(), "collaborator returned");

        let hourly = reshape_hourly(&wide, pairs.as_slice())?;
        debug!(rows = hourly.len(), "reshaped to hourly");
        Ok(hourly)
    }

    /// [`get_fx_volume`](Self::get_fx_volume), then persist under `name`.
    #[allow(clippy::too_many_arguments)]
    pub fn fetch_and_store(
        &self,
        store: &dyn TimeSeriesStore,
        name: &str,
        start: NaiveDate,
        end: NaiveDate,
        pairs: impl Into<CurrencyPairs>,
        opts: &VolumeOptions,
        write: &WriteOptions,
    ) -> Result<TimeSeries, DataError> {
        let hourly = self.get_fx_volume(start, end, pairs, opts)?;
        store.write(name, &hourly, write)?;
        let _guard = self.span.enter();
        info!(
            name,
            target_name = %store.physical_name(name),
            rows = hourly.len(),
            "stored hourly FX volume"
        );
        Ok(hourly)
    }
}
