//! Document-oriented time-series store.
//!
//! Each logical name maps to a library (basename, `.` replaced by `_`) holding
//! one symbol of the same name. The server is reached through
//! [`DocumentBackend`]; a session is opened per operation with that
//! operation's socket timeout and closed when it goes out of scope.

use super::{merge_append, TimeSeriesStore, WriteOptions};
use crate::error::DataError;
use crate::naming::library_name;
use crate::series::{is_intraday_name, DateRange, TimeSeries};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info, Span};

/// Server used when none is configured.
pub const DEFAULT_SERVER: &str = "127.0.0.1";

/// Socket timeouts per operation kind, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SocketTimeouts {
    pub read_secs: u64,
    pub write_secs: u64,
    pub delete_secs: u64,
}

impl Default for SocketTimeouts {
    fn default() -> Self {
        Self {
            read_secs: 2,
            write_secs: 30,
            delete_secs: 10,
        }
    }
}

impl SocketTimeouts {
    pub fn read(&self) -> Duration {
        Duration::from_secs(self.read_secs)
    }

    pub fn write(&self) -> Duration {
        Duration::from_secs(self.write_secs)
    }

    pub fn delete(&self) -> Duration {
        Duration::from_secs(self.delete_secs)
    }
}

/// An open connection. Dropping it closes the connection.
pub trait DocumentSession {
    fn library_exists(&self, library: &str) -> Result<bool, DataError>;

    fn initialize_library(&mut self, library: &str) -> Result<(), DataError>;

    /// Replace the symbol's data.
    fn write(&mut self, library: &str, symbol: &str, data: &TimeSeries) -> Result<(), DataError>;

    /// Add rows after the symbol's data; creates the symbol if absent.
    fn append(&mut self, library: &str, symbol: &str, data: &TimeSeries)
        -> Result<(), DataError>;

    /// `Ok(None)` when the symbol does not exist.
    fn read(
        &self,
        library: &str,
        symbol: &str,
        range: Option<&DateRange>,
    ) -> Result<Option<TimeSeries>, DataError>;

    fn delete_library(&mut self, library: &str) -> Result<(), DataError>;
}

/// Client factory for a document server.
pub trait DocumentBackend: Send + Sync {
    fn connect(
        &self,
        server: &str,
        timeout: Duration,
    ) -> Result<Box<dyn DocumentSession + '_>, DataError>;
}

type Libraries = BTreeMap<String, BTreeMap<String, TimeSeries>>;

/// Process-local backend. Libraries live as long as the backend; the server
/// name is ignored.
#[derive(Default)]
pub struct InMemoryBackend {
    libraries: Mutex<Libraries>,
    open_sessions: AtomicUsize,
    connections: AtomicUsize,
    last_timeout: Mutex<Option<Duration>>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sessions currently open.
    pub fn open_sessions(&self) -> usize {
        self.open_sessions.load(Ordering::SeqCst)
    }

    /// Sessions opened so far.
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// Timeout passed to the most recent `connect`.
    pub fn last_timeout(&self) -> Option<Duration> {
        self.last_timeout.lock().ok().and_then(|t| *t)
    }

    pub fn library_names(&self) -> Vec<String> {
        self.libraries
            .lock()
            .map(|libs| libs.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Libraries>, DataError> {
        self.libraries
            .lock()
            .map_err(|_| DataError::Document("library map lock poisoned".to_string()))
    }
}

impl DocumentBackend for InMemoryBackend {
    fn connect(
        &self,
        _server: &str,
        timeout: Duration,
    ) -> Result<Box<dyn DocumentSession + '_>, DataError> {
        if let Ok(mut last) = self.last_timeout.lock() {
            *last = Some(timeout);
        }
        self.connections.fetch_add(1, Ordering::SeqCst);
        self.open_sessions.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(InMemorySession { backend: self }))
    }
}

struct InMemorySession<'a> {
    backend: &'a InMemoryBackend,
}

impl Drop for InMemorySession<'_> {
    fn drop(&mut self) {
        self.backend.open_sessions.fetch_sub(1, Ordering::SeqCst);
    }
}

fn missing_library(library: &str) -> DataError {
    DataError::Document(format!("library '{library}' does not exist"))
}

impl DocumentSession for InMemorySession<'_> {
    fn library_exists(&self, library: &str) -> Result<bool, DataError> {
        Ok(self.backend.lock()?.contains_key(library))
    }

    fn initialize_library(&mut self, library: &str) -> Result<(), DataError> {
        self.backend
            .lock()?
            .entry(library.to_string())
            .or_default();
        Ok(())
    }

    fn write(&mut self, library: &str, symbol: &str, data: &TimeSeries) -> Result<(), DataError> {
        let mut libs = self.backend.lock()?;
        let lib = libs.get_mut(library).ok_or_else(|| missing_library(library))?;
        let mut data = data.clone();
        data.sort_by_index();
        lib.insert(symbol.to_string(), data);
        Ok(())
    }

    fn append(
        &mut self,
        library: &str,
        symbol: &str,
        data: &TimeSeries,
    ) -> Result<(), DataError> {
        let mut libs = self.backend.lock()?;
        let lib = libs.get_mut(library).ok_or_else(|| missing_library(library))?;
        let merged = match lib.get(symbol) {
            Some(stored) => merge_append(stored, data)?,
            None => super::prepare_batch(data)?,
        };
        lib.insert(symbol.to_string(), merged);
        Ok(())
    }

    fn read(
        &self,
        library: &str,
        symbol: &str,
        range: Option<&DateRange>,
    ) -> Result<Option<TimeSeries>, DataError> {
        let libs = self.backend.lock()?;
        let lib = libs.get(library).ok_or_else(|| missing_library(library))?;
        Ok(lib.get(symbol).map(|s| match range {
            Some(range) => s.retain_range(range),
            None => s.clone(),
        }))
    }

    fn delete_library(&mut self, library: &str) -> Result<(), DataError> {
        self.backend.lock()?.remove(library);
        Ok(())
    }
}

/// Store backed by a document server.
pub struct DocumentStore {
    backend: Arc<dyn DocumentBackend>,
    server: String,
    timeouts: SocketTimeouts,
    span: Span,
}

impl DocumentStore {
    pub fn new(backend: Arc<dyn DocumentBackend>, server: impl Into<String>) -> Self {
        Self {
            backend,
            server: server.into(),
            timeouts: SocketTimeouts::default(),
            span: Span::none(),
        }
    }

    pub fn with_timeouts(mut self, timeouts: SocketTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn server(&self) -> &str {
        &self.server
    }
}

impl TimeSeriesStore for DocumentStore {
    fn write(&self, name: &str, data: &TimeSeries, opts: &WriteOptions) -> Result<(), DataError> {
        let _guard = self.span.enter();
        let library = library_name(name);
        let mut session = self.backend.connect(&self.server, self.timeouts.write())?;

        if !session.library_exists(&library)? {
            debug!(library = %library, "creating library");
            session.initialize_library(&library)?;
        }

        let mut data = if is_intraday_name(name) {
            data.clone().to_f32()
        } else {
            data.clone()
        };
        if let Some(pattern) = &opts.filter_out_matching {
            data = data.drop_matching(pattern);
        }

        if opts.append {
            session.append(&library, &library, &data)?;
        } else {
            session.write(&library, &library, &data)?;
        }
        info!(
            library = %library,
            server = %self.server,
            rows = data.len(),
            append = opts.append,
            "wrote document library"
        );
        Ok(())
    }

    fn read(
        &self,
        name: &str,
        range: Option<&DateRange>,
    ) -> Result<Option<TimeSeries>, DataError> {
        let _guard = self.span.enter();
        let library = library_name(name);
        let session = self.backend.connect(&self.server, self.timeouts.read())?;

        if !session.library_exists(&library)? {
            debug!(library = %library, "no such library");
            return Ok(None);
        }
        let series = session.read(&library, &library, range)?;
        debug!(
            library = %library,
            rows = series.as_ref().map_or(0, TimeSeries::len),
            "read document library"
        );
        Ok(series.map(|s| if is_intraday_name(name) { s.to_f32() } else { s }))
    }

    fn delete(&self, name: &str) -> Result<(), DataError> {
        let _guard = self.span.enter();
        let library = library_name(name);
        let mut session = self.backend.connect(&self.server, self.timeouts.delete())?;

        if session.library_exists(&library)? {
            session.delete_library(&library)?;
            info!(library = %library, "deleted document library");
        } else {
            debug!(library = %library, "library already absent");
        }
        Ok(())
    }

    fn physical_name(&self, name: &str) -> String {
        library_name(name)
    }
}
