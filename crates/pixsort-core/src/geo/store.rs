//! Reverse-geocode results kept between runs.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use super::{CoordKey, Place};
use crate::error::GeoError;

/// Narrow read/write interface to a cache that outlives one run.
pub trait GeocodeStore: Send + Sync {
    fn lookup(&self, key: CoordKey) -> Option<Place>;
    fn record(&self, key: CoordKey, place: &Place);
    fn flush(&self) -> Result<(), GeoError>;
}

#[derive(Serialize, Deserialize)]
struct CacheFile {
    fingerprint: String,
    entries: BTreeMap<String, Place>,
}

#[derive(Default)]
struct State {
    entries: HashMap<CoordKey, Place>,
    dirty: bool,
}

/// JSON file store. Entries are tied to the boundary datasets they were
/// computed from; a different fingerprint starts an empty cache.
pub struct JsonGeocodeStore {
    path: PathBuf,
    fingerprint: String,
    state: Mutex<State>,
}

impl JsonGeocodeStore {
    pub fn open(path: impl Into<PathBuf>, fingerprint: &str) -> Result<Self, GeoError> {
        let path = path.into();
        let mut state = State::default();
        match fs::read_to_string(&path) {
            Ok(json) => match serde_json::from_str::<CacheFile>(&json) {
                Ok(file) if file.fingerprint == fingerprint => {
                    state.entries = file
                        .entries
                        .into_iter()
                        .filter_map(|(key, place)| Some((key.parse().ok()?, place)))
                        .collect();
                    tracing::debug!(path = %path.display(), entries = state.entries.len(), "geocode cache loaded");
                }
                Ok(_) => {
                    tracing::info!(path = %path.display(), "boundary datasets changed, discarding geocode cache");
                    state.dirty = true;
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "unreadable geocode cache, starting empty");
                    state.dirty = true;
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(source) => return Err(GeoError::Cache { path, source }),
        }
        Ok(Self {
            path,
            fingerprint: fingerprint.to_string(),
            state: Mutex::new(state),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl GeocodeStore for JsonGeocodeStore {
    fn lookup(&self, key: CoordKey) -> Option<Place> {
        self.lock().entries.get(&key).cloned()
    }

    fn record(&self, key: CoordKey, place: &Place) {
        let mut state = self.lock();
        if state.entries.get(&key) != Some(place) {
            state.entries.insert(key, place.clone());
            state.dirty = true;
        }
    }

    /// Write to a temp file and rename over the cache.
    fn flush(&self) -> Result<(), GeoError> {
        let mut state = self.lock();
        if !state.dirty {
            return Ok(());
        }
        let file = CacheFile {
            fingerprint: self.fingerprint.clone(),
            entries: state
                .entries
                .iter()
                .map(|(key, place)| (key.to_string(), place.clone()))
                .collect(),
        };
        let cache_err = |source| GeoError::Cache {
            path: self.path.clone(),
            source,
        };
        let json = serde_json::to_string_pretty(&file).map_err(|e| cache_err(e.into()))?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(cache_err)?;
        }
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        fs::write(&tmp, json).map_err(cache_err)?;
        fs::rename(&tmp, &self.path).map_err(cache_err)?;
        state.dirty = false;
        tracing::debug!(path = %self.path.display(), entries = state.entries.len(), "geocode cache saved");
        Ok(())
    }
}
