pub mod cancel;
pub mod cleanup;
pub mod config;
pub mod date;
pub mod error;
pub mod geo;
pub mod layout;
pub mod media;
pub mod metadata;
pub mod naming;
mod organize;
pub mod paths;
pub mod scan;
pub mod writer;

#[cfg(test)]
pub(crate) mod test_support;

use std::cell::Cell;
use std::fmt;
use std::sync::mpsc::{self, Receiver};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use serde::{Deserialize, Serialize};

pub use cancel::{CancellationToken, Cancelled};
pub use config::{
    ClassLevel, ExifToolOptions, FileNameTag, FolderSpec, GeoOptions, Labels, OrganizeOptions,
    Separator, TimePolicy, TransferMode,
};
pub use error::{ConfigError, GeoError, OrganizeError, TransferError};
pub use geo::{BoundaryIndex, GeoResolver, GeocodeStore, JsonGeocodeStore, Place};
pub use media::{MediaKind, MetadataRecord};
pub use metadata::{ExifTool, MetadataExtractor};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warning => "WARNING",
            LogLevel::Error => "ERROR",
        })
    }
}

/// Aggregate counters of one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferResult {
    pub success_count: u64,
    pub fail_count: u64,
    pub processed_count: u64,
    pub total_count: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunOutcome {
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub outcome: RunOutcome,
    pub counts: TransferResult,
    /// Empty source directories removed after an in-place move.
    pub removed_dirs: usize,
}

/// Everything a run reports to its caller.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Integer percent in `0..=100`; 100 only once the run has completed.
    Progress(u8),
    Log { level: LogLevel, message: String },
    Finished(RunSummary),
}

pub type EventCallback = dyn Fn(Event) + Send + Sync;

/// Wraps the caller's callback: mirrors log events into `tracing` and
/// drops progress updates that would repeat the last percentage.
pub struct Reporter<'a> {
    inner: &'a EventCallback,
    last_percent: Cell<Option<u8>>,
}

impl<'a> Reporter<'a> {
    pub fn new(inner: &'a EventCallback) -> Self {
        Self {
            inner,
            last_percent: Cell::new(None),
        }
    }

    pub fn log(&self, level: LogLevel, message: impl Into<String>) {
        let message = message.into();
        match level {
            LogLevel::Debug => tracing::debug!("{message}"),
            LogLevel::Info => tracing::info!("{message}"),
            LogLevel::Warning => tracing::warn!("{message}"),
            LogLevel::Error => tracing::error!("{message}"),
        }
        (self.inner)(Event::Log { level, message });
    }

    pub fn progress(&self, percent: u8) {
        let percent = percent.min(100);
        if self.last_percent.get() == Some(percent) {
            return;
        }
        self.last_percent.set(Some(percent));
        (self.inner)(Event::Progress(percent));
    }

    pub fn finished(&self, summary: RunSummary) {
        (self.inner)(Event::Finished(summary));
    }
}

/// Long-lived collaborators handed to a run.
#[derive(Clone, Default)]
pub struct Context {
    pub boundaries: Option<Arc<BoundaryIndex>>,
    /// Cross-run geocode cache.
    pub geocode_store: Option<Arc<dyn GeocodeStore>>,
    pub exiftool: Option<ExifTool>,
}

impl Context {
    /// Load boundary datasets, open the geocode cache and look for exiftool.
    pub fn from_options(options: &OrganizeOptions) -> Result<Self, GeoError> {
        let geo = &options.geo;
        let boundaries = if geo.provinces.is_some() || geo.cities.is_some() {
            Some(Arc::new(BoundaryIndex::load(
                geo.provinces.as_deref(),
                geo.cities.as_deref(),
            )?))
        } else {
            None
        };
        let geocode_store = match (&geo.cache_file, &boundaries) {
            (Some(path), Some(index)) => {
                let store = JsonGeocodeStore::open(path, index.fingerprint())?;
                tracing::info!(
                    path = %store.path().display(),
                    entries = store.len(),
                    "geocode cache ready"
                );
                let store: Arc<dyn GeocodeStore> = Arc::new(store);
                Some(store)
            }
            _ => None,
        };
        Ok(Self {
            boundaries,
            geocode_store,
            exiftool: ExifTool::locate(&options.exiftool),
        })
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("boundaries", &self.boundaries.is_some())
            .field("geocode_store", &self.geocode_store.is_some())
            .field("exiftool", &self.exiftool)
            .finish()
    }
}

/// Control options for a run.
#[derive(Debug, Clone, Default)]
pub struct ProcessControl {
    /// Cancellation token polled by the worker.
    pub cancel_token: Option<CancellationToken>,
}

impl ProcessControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel_token = Some(token);
        self
    }
}

/// Run the whole pipeline on the calling thread.
pub fn process(
    options: &OrganizeOptions,
    context: &Context,
    callback: &EventCallback,
) -> Result<RunSummary, OrganizeError> {
    process_with_control(options, context, &ProcessControl::default(), callback)
}

/// Run the whole pipeline on the calling thread with a cancellation token.
pub fn process_with_control(
    options: &OrganizeOptions,
    context: &Context,
    control: &ProcessControl,
    callback: &EventCallback,
) -> Result<RunSummary, OrganizeError> {
    organize::run(options, context, control, callback)
}

/// A run on its own thread. Events arrive on [`Worker::events`].
pub struct Worker {
    events: Receiver<Event>,
    token: CancellationToken,
    handle: JoinHandle<Result<RunSummary, OrganizeError>>,
}

impl Worker {
    pub fn events(&self) -> &Receiver<Event> {
        &self.events
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn join(self) -> Result<RunSummary, OrganizeError> {
        self.handle.join().map_err(|_| OrganizeError::WorkerPanicked)?
    }
}

/// Start a run on a dedicated background thread.
pub fn spawn(options: OrganizeOptions, context: Context) -> std::io::Result<Worker> {
    let (tx, rx) = mpsc::channel();
    let token = CancellationToken::new();
    let control = ProcessControl::new().with_cancel_token(token.clone());
    let handle = thread::Builder::new()
        .name("pixsort-worker".into())
        .spawn(move || {
            let callback = move |event: Event| {
                // receiver gone means nobody is listening any more
                let _ = tx.send(event);
            };
            process_with_control(&options, &context, &control, &callback)
        })?;
    Ok(Worker {
        events: rx,
        token,
        handle,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::Recorder;

    #[test]
    fn test_progress_is_deduplicated() {
        let recorder = Recorder::new();
        let reporter = recorder.reporter();
        for p in [0, 0, 1, 1, 1, 50, 100, 100] {
            reporter.progress(p);
        }
        assert_eq!(recorder.progress(), vec![0, 1, 50, 100]);
    }

    #[test]
    fn test_log_events_reach_callback() {
        let recorder = Recorder::new();
        recorder.reporter().log(LogLevel::Warning, "careful");
        assert!(recorder.logged(LogLevel::Warning, "careful"));
        assert!(!recorder.logged(LogLevel::Error, "careful"));
    }

    #[test]
    fn test_context_without_geography() {
        let options = OrganizeOptions {
            exiftool: ExifToolOptions {
                program: Some("/nonexistent/exiftool".into()),
                ..Default::default()
            },
            ..Default::default()
        };
        let context = Context::from_options(&options).unwrap();
        assert!(context.boundaries.is_none());
        assert!(context.geocode_store.is_none());
        assert!(context.exiftool.is_none());
    }
}
