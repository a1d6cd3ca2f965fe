//! Criterion benchmarks for fxcache hot paths.
//!
//! Benchmarks:
//! 1. Wide daily volume table to hourly rows
//! 2. Hourly rows back to the wide table
//! 3. Outer join of per-pair hourly series
//! 4. Overlapping append merge

use chrono::{Duration, NaiveDate, NaiveDateTime};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use fxcache_core::series::outer_join;
use fxcache_core::store::merge_append;
use fxcache_core::volume::{daily_from_hourly, reshape_hourly};
use fxcache_core::{Column, TimeSeries};

const PAIRS: [&str; 6] = ["EURUSD", "GBPUSD", "USDJPY", "AUDUSD", "USDCAD", "USDCHF"];

// ── Helpers ──────────────────────────────────────────────────────────

fn day(i: usize) -> NaiveDateTime {
    let base = NaiveDate::from_ymd_opt(2015, 1, 5).unwrap();
    (base + Duration::days(i as i64)).and_hms_opt(0, 0, 0).unwrap()
}

fn pairs(n: usize) -> Vec<String> {
    PAIRS.iter().take(n).map(|p| p.to_string()).collect()
}

fn make_wide(days: usize, pairs: &[String]) -> TimeSeries {
    let mut columns = Vec::with_capacity(pairs.len() * 24);
    for (p, pair) in pairs.iter().enumerate() {
        for h in 0..24 {
            columns.push(Column::f64(
                format!("{pair}.{h}h"),
                (0..days)
                    .map(|d| Some(1_000.0 + (p * 24 + h) as f64 + (d as f64 * 0.1).sin() * 50.0))
                    .collect(),
            ));
        }
    }
    TimeSeries::new((0..days).map(day).collect(), columns).unwrap()
}

fn make_minutes(start: usize, n: usize, name: &str) -> TimeSeries {
    let t0 = day(0);
    TimeSeries::new(
        (start..start + n)
            .map(|m| t0 + Duration::minutes(m as i64))
            .collect(),
        vec![Column::f64(name, (0..n).map(|i| Some(i as f64)).collect())],
    )
    .unwrap()
}

// ── 1. Reshape ───────────────────────────────────────────────────────

fn bench_reshape(c: &mut Criterion) {
    let mut group = c.benchmark_group("reshape_hourly");

    for &days in &[30, 260, 1300] {
        let pairs = pairs(6);
        let wide = make_wide(days, &pairs);
        group.bench_with_input(BenchmarkId::new("6_pairs", days), &days, |b, _| {
            b.iter(|| reshape_hourly(black_box(&wide), black_box(&pairs)).unwrap());
        });
    }

    group.finish();
}

// ── 2. Re-widen ──────────────────────────────────────────────────────

fn bench_widen(c: &mut Criterion) {
    let mut group = c.benchmark_group("daily_from_hourly");

    for &days in &[30, 260, 1300] {
        let pairs = pairs(6);
        let hourly = reshape_hourly(&make_wide(days, &pairs), &pairs).unwrap();
        group.bench_with_input(BenchmarkId::new("6_pairs", days), &days, |b, _| {
            b.iter(|| daily_from_hourly(black_box(&hourly), black_box(&pairs)).unwrap());
        });
    }

    group.finish();
}

// ── 3. Outer join ────────────────────────────────────────────────────

fn bench_outer_join(c: &mut Criterion) {
    let mut group = c.benchmark_group("outer_join");

    // Offset starts so the indexes only partly overlap.
    let frames: Vec<TimeSeries> = PAIRS
        .iter()
        .enumerate()
        .map(|(i, p)| make_minutes(i * 500, 50_000, p))
        .collect();
    group.bench_function("6_series_50k_rows", |b| {
        b.iter(|| outer_join(black_box(&frames)).unwrap());
    });

    group.finish();
}

// ── 4. Append merge ──────────────────────────────────────────────────

fn bench_merge_append(c: &mut Criterion) {
    let mut group = c.benchmark_group("merge_append");

    let stored = make_minutes(0, 500_000, "EURUSD.close");
    let batch = make_minutes(499_000, 5_000, "EURUSD.close");
    group.bench_function("500k_stored_5k_batch", |b| {
        b.iter(|| merge_append(black_box(&stored), black_box(&batch)).unwrap());
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_reshape,
    bench_widen,
    bench_outer_join,
    bench_merge_append,
);
criterion_main!(benches);
