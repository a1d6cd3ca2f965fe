//! fxcache CLI: move FX time series between files and the cache.
//!
//! Commands:
//! - `convert`: read a CSV and store it under a logical name
//! - `show`: print the head and tail of a cached series
//! - `export`: write a cached series to CSV or Excel
//! - `delete`: remove a cached series
//! - `clean-csv`: strip NUL bytes from a CSV in place

use anyhow::{bail, Context, Result};
use chrono::{NaiveDate, NaiveDateTime};
use clap::{Parser, Subcommand};
use fxcache_core::convert::{clean_csv_file, convert_csv_to_cache};
use fxcache_core::dateparse::{self, DateParser};
use fxcache_core::formats::{write_csv, write_excel};
use fxcache_core::logging::init_logging;
use fxcache_core::series::parse_timezone;
use fxcache_core::{
    DateRange, EngineKind, Frequency, FxCacheConfig, StorageEngine, TimeSeries, TimeSeriesStore,
    WriteOptions,
};
use std::path::{Path, PathBuf};
use tracing::info_span;

#[derive(Parser)]
#[command(name = "fxcache", about = "FX time-series cache: convert, inspect, export")]
struct Cli {
    /// Path to a TOML config file. Defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the configured engine (hdf5, hdf5_table, bcolz, arctic).
    #[arg(long, global = true)]
    engine: Option<EngineKind>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Read a CSV file and store it in the cache.
    Convert {
        /// Source CSV file.
        csv: PathBuf,

        /// Logical name to store under (e.g. fx.intraday.eurusd).
        name: String,

        /// `intraday` or `daily`. Anything else is daily.
        #[arg(long, default_value = "daily")]
        freq: Frequency,

        /// Timestamp parser: default, dukascopy or c (ISO-8601).
        #[arg(long)]
        date_parser: Option<DateParser>,

        /// Zone of intraday wall-clock timestamps. Defaults to the config.
        #[arg(long)]
        tz: Option<String>,

        /// Drop rows at or after this timestamp.
        #[arg(long)]
        cutoff: Option<String>,

        /// Append to what is already stored instead of replacing it.
        #[arg(long, default_value_t = false)]
        append: bool,
    },
    /// Print the first and last rows of a cached series.
    Show {
        name: String,

        /// Rows to print from each end.
        #[arg(long, default_value_t = 5)]
        rows: usize,

        /// Inclusive start (YYYY-MM-DD or a full timestamp).
        #[arg(long)]
        start: Option<String>,

        /// Inclusive end (YYYY-MM-DD or a full timestamp).
        #[arg(long)]
        end: Option<String>,
    },
    /// Write a cached series to a CSV or Excel file.
    Export {
        name: String,

        /// Output file. `.xlsx` writes a workbook, anything else CSV.
        output: PathBuf,

        /// Sheet name for Excel output. Defaults to the logical name.
        #[arg(long)]
        sheet: Option<String>,

        /// Keep the other sheets of an existing workbook.
        #[arg(long, default_value_t = false)]
        keep_sheets: bool,
    },
    /// Remove a cached series.
    Delete { name: String },
    /// Strip NUL bytes from a CSV file in place.
    CleanCsv { path: PathBuf },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => FxCacheConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => FxCacheConfig::default(),
    };
    if let Some(kind) = cli.engine {
        config.engine.kind = kind;
    }
    init_logging(&config.logging).map_err(|e| anyhow::anyhow!(e))?;

    match cli.command {
        Commands::Convert {
            csv,
            name,
            freq,
            date_parser,
            tz,
            cutoff,
            append,
        } => run_convert(&config, &csv, &name, freq, date_parser, tz, cutoff, append),
        Commands::Show {
            name,
            rows,
            start,
            end,
        } => run_show(&config, &name, rows, start.as_deref(), end.as_deref()),
        Commands::Export {
            name,
            output,
            sheet,
            keep_sheets,
        } => run_export(&config, &name, &output, sheet.as_deref(), keep_sheets),
        Commands::Delete { name } => run_delete(&config, &name),
        Commands::CleanCsv { path } => run_clean_csv(&path),
    }
}

fn open_engine(config: &FxCacheConfig) -> Result<StorageEngine> {
    if config.engine.kind == EngineKind::Document {
        bail!(
            "the arctic engine needs a document-store backend; the CLI only drives the file engines"
        );
    }
    let engine = StorageEngine::from_config(config, None)?;
    Ok(engine.with_span(info_span!("engine", kind = %config.engine.kind)))
}

#[allow(clippy::too_many_arguments)]
fn run_convert(
    config: &FxCacheConfig,
    csv: &Path,
    name: &str,
    freq: Frequency,
    date_parser: Option<DateParser>,
    tz: Option<String>,
    cutoff: Option<String>,
    append: bool,
) -> Result<()> {
    let mut read = config.csv.read_options(freq)?;
    if let Some(parser) = date_parser {
        read = read.with_date_parser(parser);
    }
    if let Some(tz) = tz {
        read = read.with_timezone(parse_timezone(&tz)?);
    }
    if let Some(cutoff) = cutoff {
        read = read.with_cutoff(cutoff);
    }
    let write = if append {
        WriteOptions::append()
    } else {
        WriteOptions::replace()
    };

    let engine = open_engine(config)?;
    let series = convert_csv_to_cache(&engine, csv, name, &read, &write)?;
    println!(
        "Stored {} rows x {} columns as {}",
        series.len(),
        series.width(),
        engine.physical_name(name)
    );
    Ok(())
}

fn run_show(
    config: &FxCacheConfig,
    name: &str,
    rows: usize,
    start: Option<&str>,
    end: Option<&str>,
) -> Result<()> {
    let range = DateRange::new(
        start.map(parse_bound).transpose()?,
        end.map(parse_end_bound).transpose()?,
    );
    let engine = open_engine(config)?;
    let bounded = range.start.is_some() || range.finish.is_some();
    let Some(series) = engine.read(name, bounded.then_some(&range))? else {
        println!("Nothing stored under {}", engine.physical_name(name));
        return Ok(());
    };

    println!("Name:     {name}");
    println!("Artifact: {}", engine.physical_name(name));
    println!("Engine:   {}", engine.kind());
    if let StorageEngine::Hierarchical(store) = &engine {
        if let Some(meta) = store.read_meta(name)? {
            println!("Format:   {} (key {})", meta.format.name(), meta.key);
            println!("Written:  {}", meta.written_at);
            println!("Hash:     {}", meta.data_hash);
        }
    }
    println!(
        "Zone:     {}",
        series
            .timezone()
            .map_or_else(|| "naive".to_string(), |tz| tz.to_string())
    );
    println!("Rows:     {}", series.len());
    println!();
    print_rows(&series, rows);
    Ok(())
}

fn run_export(
    config: &FxCacheConfig,
    name: &str,
    output: &Path,
    sheet: Option<&str>,
    keep_sheets: bool,
) -> Result<()> {
    let engine = open_engine(config)?;
    let Some(series) = engine.read(name, None)? else {
        bail!("nothing stored under {}", engine.physical_name(name));
    };

    let is_excel = output
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("xlsx"));
    if is_excel {
        write_excel(output, &sheet_name(sheet, name), &series, !keep_sheets)?;
    } else {
        write_csv(output, &series)?;
    }
    println!("Exported {} rows to {}", series.len(), output.display());
    Ok(())
}

fn run_delete(config: &FxCacheConfig, name: &str) -> Result<()> {
    let engine = open_engine(config)?;
    engine.delete(name)?;
    println!("Removed: {}", engine.physical_name(name));
    Ok(())
}

fn run_clean_csv(path: &Path) -> Result<()> {
    if clean_csv_file(path)? {
        println!("Cleaned: {}", path.display());
    } else {
        println!("No NUL bytes in {}", path.display());
    }
    Ok(())
}

/// Sheet names are capped at 31 characters and may not contain `[]:*?/\`.
fn sheet_name(requested: Option<&str>, name: &str) -> String {
    let raw = requested.unwrap_or(name);
    raw.chars()
        .map(|c| if "[]:*?/\\".contains(c) { '_' } else { c })
        .take(31)
        .collect()
}

fn parse_bound(s: &str) -> Result<NaiveDateTime> {
    Ok(dateparse::parse_flexible(s)?)
}

/// A bare date as an end bound covers the whole day.
fn parse_end_bound(s: &str) -> Result<NaiveDateTime> {
    if let Ok(day) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        if let Some(end) = day.and_hms_milli_opt(23, 59, 59, 999) {
            return Ok(end);
        }
    }
    parse_bound(s)
}

fn print_rows(series: &TimeSeries, rows: usize) {
    let names = series.column_names();
    println!("{:<26} {}", series.index_name(), names.join("  "));
    println!("{}", "-".repeat(26 + names.iter().map(|n| n.len() + 2).sum::<usize>()));

    let len = series.len();
    let print_row = |row: usize| {
        let cells: Vec<String> = series
            .columns()
            .iter()
            .zip(&names)
            .map(|(col, name)| format!("{:>width$}", col.values().format_cell(row), width = name.len()))
            .collect();
        println!(
            "{:<26} {}",
            series.format_timestamp(row).unwrap_or_default(),
            cells.join("  ")
        );
    };

    if len <= rows * 2 {
        (0..len).for_each(print_row);
    } else {
        (0..rows).for_each(print_row);
        println!("... {} rows omitted ...", len - rows * 2);
        (len - rows..len).for_each(print_row);
    }
}
