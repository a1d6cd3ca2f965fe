//! File conversion helpers.

use crate::error::DataError;
use crate::formats::{read_csv, ReadOptions};
use crate::series::TimeSeries;
use crate::store::{with_suffix, TimeSeriesStore, WriteOptions};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

/// Read a CSV and store it under `name`. Returns what was stored.
pub fn convert_csv_to_cache(
    store: &dyn TimeSeriesStore,
    csv_path: &Path,
    name: &str,
    read: &ReadOptions,
    write: &WriteOptions,
) -> Result<TimeSeries, DataError> {
    let series = read_csv(csv_path, read)?;
    store.write(name, &series, write)?;
    info!(
        source = %csv_path.display(),
        name,
        target = %store.physical_name(name),
        rows = series.len(),
        "converted CSV into cache"
    );
    Ok(series)
}

/// Strip NUL bytes from a file in place.
///
/// The cleaned copy is written to `<file>.tmp` and renamed over the original.
/// Returns `false` (and leaves the file alone) when there was nothing to strip.
pub fn clean_csv_file(path: &Path) -> Result<bool, DataError> {
    let bytes = fs::read(path).map_err(DataError::io(path))?;
    let nuls = bytes.iter().filter(|&&b| b == 0).count();
    if nuls == 0 {
        debug!(path = %path.display(), "no NUL bytes");
        return Ok(false);
    }

    let cleaned: Vec<u8> = bytes.into_iter().filter(|&b| b != 0).collect();
    let tmp = with_suffix(path, ".tmp");
    fs::write(&tmp, &cleaned).map_err(DataError::io(&tmp))?;
    fs::rename(&tmp, path).map_err(|e| {
        let _ = fs::remove_file(&tmp);
        DataError::io(path)(e)
    })?;
    info!(path = %path.display(), removed = nuls, "stripped NUL bytes");
    Ok(true)
}
