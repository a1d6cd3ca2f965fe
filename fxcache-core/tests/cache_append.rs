//! Storage engine properties.
//!
//! Uses proptest and temp directories to verify:
//! 1. Appending an overlapping batch leaves no duplicates and new values win
//! 2. Hierarchical write then read is bit-for-bit (f32 for intraday names)
//! 3. Reading a name that was never written is `None`
//! 4. The configured engine behaves the same through `StorageEngine`
//! 5. Every engine stores a replaced series in index order

use chrono::{Duration, NaiveDate, NaiveDateTime};
use fxcache_core::store::{ColumnarStore, HdfFormat, HierarchicalStore, InMemoryBackend};
use fxcache_core::{
    Column, ColumnValues, DataError, EngineKind, FxCacheConfig, StorageEngine, TimeSeries,
    TimeSeriesStore, WriteOptions,
};
use proptest::prelude::*;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

// ── Helpers ──────────────────────────────────────────────────────────

fn minute(m: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2019, 8, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
        + Duration::minutes(i64::from(m))
}

fn series(minutes: &BTreeSet<u32>, value: impl Fn(u32) -> f64) -> TimeSeries {
    TimeSeries::new(
        minutes.iter().map(|&m| minute(m)).collect(),
        vec![Column::f64(
            "EURUSD.close",
            minutes.iter().map(|&m| Some(value(m))).collect(),
        )],
    )
    .unwrap()
}

fn values(ts: &TimeSeries) -> Vec<Option<f64>> {
    let col = ts.column("EURUSD.close").unwrap().values();
    (0..ts.len()).map(|i| col.get_f64(i)).collect()
}

// ── 1. Idempotent append ─────────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// After an append the index is strictly increasing, every batch row is
    /// present with the batch value, and stored rows before the batch survive.
    #[test]
    fn append_has_no_duplicates_and_new_values_win(
        stored in prop::collection::btree_set(0..500u32, 1..60),
        batch in prop::collection::btree_set(0..500u32, 1..60),
    ) {
        let dir = tempfile::tempdir().unwrap();
        let store = HierarchicalStore::new(dir.path(), HdfFormat::Table);
        store.write("fx", &series(&stored, |m| f64::from(m)), &WriteOptions::replace()).unwrap();
        store.write("fx", &series(&batch, |m| -f64::from(m)), &WriteOptions::append()).unwrap();

        let back = store.read("fx", None).unwrap().unwrap();
        prop_assert!(back.index().windows(2).all(|w| w[0] < w[1]));

        let by_time: BTreeMap<NaiveDateTime, Option<f64>> =
            back.index().iter().copied().zip(values(&back)).collect();
        for m in &batch {
            prop_assert_eq!(by_time.get(&minute(*m)), Some(&Some(-f64::from(*m))));
        }
        let first = *batch.iter().next().unwrap();
        for m in stored.iter().filter(|&&m| m < first) {
            prop_assert_eq!(by_time.get(&minute(*m)), Some(&Some(f64::from(*m))));
        }
        prop_assert_eq!(
            back.len(),
            stored.iter().filter(|&&m| m < first).count() + batch.len()
        );
    }

    /// The in-memory document backend follows the same append rule.
    #[test]
    fn document_append_matches_hierarchical(
        stored in prop::collection::btree_set(0..200u32, 1..30),
        batch in prop::collection::btree_set(0..200u32, 1..30),
    ) {
        let dir = tempfile::tempdir().unwrap();
        let file_store = HierarchicalStore::new(dir.path(), HdfFormat::Table);
        let config = FxCacheConfig {
            engine: fxcache_core::config::EngineConfig {
                kind: EngineKind::Document,
                ..Default::default()
            },
            ..Default::default()
        };
        let doc_store =
            StorageEngine::from_config(&config, Some(Arc::new(InMemoryBackend::new()))).unwrap();

        for store in [&file_store as &dyn TimeSeriesStore, &doc_store] {
            store.write("fx", &series(&stored, |m| f64::from(m)), &WriteOptions::replace()).unwrap();
            store.write("fx", &series(&batch, |m| -f64::from(m)), &WriteOptions::append()).unwrap();
        }
        let from_file = file_store.read("fx", None).unwrap().unwrap();
        let from_doc = doc_store.read("fx", None).unwrap().unwrap();
        prop_assert_eq!(from_file.index(), from_doc.index());
        prop_assert_eq!(values(&from_file), values(&from_doc));
    }
}

#[test]
fn batch_older_than_store_replaces_it() {
    let dir = tempfile::tempdir().unwrap();
    let store = HierarchicalStore::new(dir.path(), HdfFormat::Table);
    let late: BTreeSet<u32> = [100, 101].into();
    let early: BTreeSet<u32> = [1, 2, 3].into();
    store.write("fx", &series(&late, f64::from), &WriteOptions::replace()).unwrap();
    store.write("fx", &series(&early, f64::from), &WriteOptions::append()).unwrap();

    let back = store.read("fx", None).unwrap().unwrap();
    assert_eq!(back.index(), &[minute(1), minute(2), minute(3)]);
}

#[test]
fn append_with_repeated_timestamps_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let store = HierarchicalStore::new(dir.path(), HdfFormat::Table);
    let stored: BTreeSet<u32> = [1, 2].into();
    store.write("fx", &series(&stored, f64::from), &WriteOptions::replace()).unwrap();

    let dup = TimeSeries::new(
        vec![minute(5), minute(5)],
        vec![Column::f64("EURUSD.close", vec![Some(1.0), Some(2.0)])],
    )
    .unwrap();
    let err = store.write("fx", &dup, &WriteOptions::append()).unwrap_err();
    assert!(matches!(err, DataError::DuplicateIndex(_)));
    assert_eq!(store.read("fx", None).unwrap().unwrap().len(), 2);
}

// ── 2. Bit-for-bit round trip ────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn hierarchical_roundtrip_is_exact(
        cells in prop::collection::vec(
            prop::option::of(any::<f64>().prop_filter("finite", |x| x.is_finite())),
            1..100,
        ),
        table in any::<bool>(),
    ) {
        let dir = tempfile::tempdir().unwrap();
        let format = if table { HdfFormat::Table } else { HdfFormat::Fixed };
        let store = HierarchicalStore::new(dir.path(), format);
        let index = (0..cells.len() as u32).map(minute).collect();
        let ts = TimeSeries::new(index, vec![Column::f64("x", cells.clone())]).unwrap();

        store.write("fx_daily", &ts, &WriteOptions::replace()).unwrap();
        let back = store.read("fx_daily", None).unwrap().unwrap();

        let ColumnValues::F64(read) = back.columns()[0].values() else {
            panic!("expected f64 column");
        };
        let bits = |v: &[Option<f64>]| v.iter().map(|x| x.map(f64::to_bits)).collect::<Vec<_>>();
        prop_assert_eq!(bits(read), bits(&cells));
        prop_assert_eq!(back.index(), ts.index());
    }

    #[test]
    fn intraday_roundtrip_is_exact_in_f32(
        cells in prop::collection::vec(prop::option::of(-1e6..1e6_f64), 1..100),
    ) {
        let dir = tempfile::tempdir().unwrap();
        let store = HierarchicalStore::new(dir.path(), HdfFormat::Fixed);
        let index = (0..cells.len() as u32).map(minute).collect();
        let ts = TimeSeries::new(index, vec![Column::f64("x", cells.clone())]).unwrap();

        store.write("fx.intraday.EURUSD", &ts, &WriteOptions::replace()).unwrap();
        let back = store.read("fx.intraday.EURUSD", None).unwrap().unwrap();

        let expected: Vec<Option<f32>> = cells.iter().map(|x| x.map(|x| x as f32)).collect();
        prop_assert_eq!(back.columns()[0].values(), &ColumnValues::F32(expected));
    }
}

// ── 3. Not-found sentinel ────────────────────────────────────────────

#[test]
fn never_written_names_read_none() {
    let dir = tempfile::tempdir().unwrap();
    let stores: Vec<Box<dyn TimeSeriesStore>> = vec![
        Box::new(HierarchicalStore::new(dir.path(), HdfFormat::Fixed)),
        Box::new(HierarchicalStore::new(dir.path(), HdfFormat::Table)),
        Box::new(ColumnarStore::new(dir.path())),
    ];
    for store in &stores {
        assert!(store.read("never_written", None).unwrap().is_none());
        store.delete("never_written").unwrap();
    }
}

// ── 4. Configured engine ─────────────────────────────────────────────

#[test]
fn engine_from_config_round_trips_each_kind() {
    let dir = tempfile::tempdir().unwrap();
    let data: BTreeSet<u32> = (0..10).collect();
    let ts = series(&data, |m| f64::from(m) / 4.0);

    for (kind, tag) in [
        ("hdf5", "hdf5_fixed"),
        ("hdf5_table", "hdf5_table"),
        ("bcolz", "bcolz"),
        ("arctic", "arctic"),
    ] {
        let config = FxCacheConfig::from_toml(&format!(
            "cache_dir = {:?}\n[engine]\nkind = \"{kind}\"\n",
            dir.path().join(kind)
        ))
        .unwrap();
        let engine =
            StorageEngine::from_config(&config, Some(Arc::new(InMemoryBackend::new()))).unwrap();
        assert_eq!(engine.kind().tag(), tag);

        engine.write("fx", &ts, &WriteOptions::replace()).unwrap();
        assert_eq!(engine.read("fx", None).unwrap().unwrap(), ts);
        engine.delete("fx").unwrap();
        assert!(engine.read("fx", None).unwrap().is_none());
    }
}

#[test]
fn document_engine_needs_a_backend() {
    let config = FxCacheConfig::from_toml("[engine]\nkind = \"arctic\"").unwrap();
    assert!(matches!(
        StorageEngine::from_config(&config, None),
        Err(DataError::Document(_))
    ));
}

// ── 5. Index order after replace ─────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    /// Whatever order the rows arrive in, every engine reads them back
    /// sorted with each value still on its own timestamp.
    #[test]
    fn replace_stores_any_order_sorted(
        order in Just((0..40u32).collect::<Vec<_>>()).prop_shuffle(),
    ) {
        let dir = tempfile::tempdir().unwrap();
        let shuffled = TimeSeries::new(
            order.iter().map(|&m| minute(m)).collect(),
            vec![Column::f64(
                "EURUSD.close",
                order.iter().map(|&m| Some(f64::from(m))).collect(),
            )],
        )
        .unwrap();
        let sorted: BTreeSet<u32> = order.iter().copied().collect();

        for kind in ["hdf5", "hdf5_table", "bcolz", "arctic"] {
            let config = FxCacheConfig::from_toml(&format!(
                "cache_dir = {:?}\n[engine]\nkind = \"{kind}\"\n",
                dir.path().join(kind)
            ))
            .unwrap();
            let engine =
                StorageEngine::from_config(&config, Some(Arc::new(InMemoryBackend::new()))).unwrap();

            engine.write("fx", &shuffled, &WriteOptions::replace()).unwrap();
            let back = engine.read("fx", None).unwrap().unwrap();
            prop_assert!(back.is_sorted(), "{} stored rows out of order", kind);
            prop_assert_eq!(&back, &series(&sorted, f64::from));
        }
    }
}
