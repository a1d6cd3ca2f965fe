//! TOML configuration.
//!
//! ```toml
//! cache_dir = "/data/fx"
//!
//! [engine]
//! kind = "hdf5_table"          # hdf5 | hdf5_fixed | hdf5_table | bcolz | arctic
//! db_server = "127.0.0.1"
//! timeouts = { read_secs = 2, write_secs = 30, delete_secs = 10 }
//!
//! [csv]
//! postfix = ".close"
//! intraday_tz = "UTC"
//! date_parser = "dukascopy"    # default | dukascopy | iso8601
//!
//! [logging]
//! level = "info"
//! format = "pretty"            # pretty | compact | json
//! ```
//!
//! Every field is optional.

use crate::dateparse::DateParser;
use crate::error::DataError;
use crate::formats::{ReadOptions, DEFAULT_POSTFIX};
use crate::logging::LogConfig;
use crate::series::{parse_timezone, Frequency};
use crate::store::document::DEFAULT_SERVER;
use crate::store::{EngineKind, SocketTimeouts};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FxCacheConfig {
    /// Root every file engine stores under; relative names join onto it.
    pub cache_dir: PathBuf,
    pub engine: EngineConfig,
    pub csv: CsvConfig,
    pub logging: LogConfig,
}

impl Default for FxCacheConfig {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from("cache"),
            engine: EngineConfig::default(),
            csv: CsvConfig::default(),
            logging: LogConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub kind: EngineKind,
    /// Document engine only.
    pub db_server: String,
    /// Document engine only.
    pub timeouts: SocketTimeouts,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            kind: EngineKind::default(),
            db_server: DEFAULT_SERVER.to_string(),
            timeouts: SocketTimeouts::default(),
        }
    }
}

/// Defaults for the CSV / Excel readers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CsvConfig {
    pub postfix: String,
    /// IANA zone of intraday wall-clock timestamps.
    pub intraday_tz: String,
    pub date_parser: Option<DateParser>,
}

impl Default for CsvConfig {
    fn default() -> Self {
        Self {
            postfix: DEFAULT_POSTFIX.to_string(),
            intraday_tz: "UTC".to_string(),
            date_parser: None,
        }
    }
}

impl CsvConfig {
    /// Reader options for `freq` with these defaults applied.
    pub fn read_options(&self, freq: Frequency) -> Result<ReadOptions, DataError> {
        Ok(ReadOptions {
            freq,
            cutoff: None,
            date_parser: self.date_parser,
            postfix: self.postfix.clone(),
            intraday_tz: parse_timezone(&self.intraday_tz)?,
        })
    }
}

impl FxCacheConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        parse_timezone(&config.csv.intraday_tz)
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::LogFormat;
    use std::time::Duration;

    #[test]
    fn empty_document_gives_defaults() {
        let config = FxCacheConfig::from_toml("").unwrap();
        assert_eq!(config, FxCacheConfig::default());
        assert_eq!(config.engine.kind, EngineKind::Hdf5Fixed);
        assert_eq!(config.engine.timeouts.write(), Duration::from_secs(30));
    }

    #[test]
    fn full_document_parses() {
        let config = FxCacheConfig::from_toml(
            r#"
            cache_dir = "/data/fx"

            [engine]
            kind = "arctic"
            db_server = "mongo.internal"
            timeouts = { read_secs = 5 }

            [csv]
            postfix = ".mid"
            intraday_tz = "Europe/London"
            date_parser = "dukascopy"

            [logging]
            level = "debug"
            format = "json"
            "#,
        )
        .unwrap();

        assert_eq!(config.cache_dir, PathBuf::from("/data/fx"));
        assert_eq!(config.engine.kind, EngineKind::Document);
        assert_eq!(config.engine.db_server, "mongo.internal");
        assert_eq!(config.engine.timeouts.read_secs, 5);
        assert_eq!(config.engine.timeouts.delete_secs, 10);
        assert_eq!(config.csv.date_parser, Some(DateParser::Dukascopy));
        assert_eq!(config.logging.format, LogFormat::Json);

        let opts = config.csv.read_options(Frequency::Intraday).unwrap();
        assert_eq!(opts.postfix, ".mid");
        assert_eq!(opts.intraday_tz.name(), "Europe/London");
    }

    #[test]
    fn bare_hdf5_tag_means_fixed() {
        let config = FxCacheConfig::from_toml("[engine]\nkind = \"hdf5\"").unwrap();
        assert_eq!(config.engine.kind, EngineKind::Hdf5Fixed);
    }

    #[test]
    fn bad_values_are_rejected() {
        assert!(matches!(
            FxCacheConfig::from_toml("[engine]\nkind = \"sqlite\""),
            Err(ConfigError::Parse(_))
        ));
        assert!(matches!(
            FxCacheConfig::from_toml("[csv]\nintraday_tz = \"Mars/Olympus\""),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            FxCacheConfig::from_file(&dir.path().join("fxcache.toml")),
            Err(ConfigError::Read { .. })
        ));
    }
}
